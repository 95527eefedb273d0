//! Data model shared by the pump, jobs and the orchestrator.
//!
//! Everything here is a plain value: engine snapshots are immutable once
//! constructed, and records are cloned into job streams rather than shared.
//!
//! # Components
//!
//! - [`Update`] / [`UpdateIdentity`]: the items engine batches act on
//! - [`OperationResultCode`], [`OperationResult`], [`BatchResult`], [`SearchResult`]:
//!   terminal results reported by the engine
//! - [`DownloadProgress`] / [`InstallProgress`]: per-callback progress snapshots
//! - [`ProgressRecord`], [`ErrorRecord`], [`StreamItem`]: what reaches the host
//! - [`OrchestratorConfig`]: serialized settings loaded by `ConfigManager`

pub mod config;
pub mod progress;
pub mod record;
pub mod result;
pub mod update;

pub use config::{LoggingConfig, OrchestrationSettings, OrchestratorConfig};
pub use progress::{
    DownloadPhase, DownloadProgress, InstallProgress, ItemProgress, ProgressRecord,
    ProgressRecordType,
};
pub use record::{ErrorCategory, ErrorRecord, StreamItem};
pub use result::{BatchResult, EngineWarning, OperationResult, OperationResultCode, SearchResult};
pub use update::{Update, UpdateIdentity};
