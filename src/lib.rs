// updatejobs - asynchronous job orchestration for update search, download and install
//
// Long-running, callback-driven engine operations are bridged into futures,
// composed into parent/child job trees and delivered to a single-threaded host
// through a work pump or a drain loop.

pub mod cache;
pub mod config;
pub mod drain;
pub mod engine;
pub mod error;
pub mod host;
pub mod jobs;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod pump;

// Re-export commonly used types for convenience
pub use cache::UpdateCache;
pub use config::ConfigManager;
pub use drain::{DrainQueue, DrainSink, OperationLease, drain_job};
pub use error::{EngineError, HostError, JobError, PumpError, RegistryError};
pub use host::{Host, HostContext, ShouldContinue};
pub use jobs::{Job, JobContext, JobEvent, JobInfo, JobRegistry, JobState, JobTask};
pub use metrics::Metrics;
pub use models::{ErrorRecord, OrchestratorConfig, StreamItem, Update};
pub use orchestrator::{Capabilities, UpdateOrchestrator};
pub use pump::{Pump, RunExit, WorkChannel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
