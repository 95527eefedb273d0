//! Capability seams onto the external update engine.
//!
//! The engine is consumed through three begin/end style capabilities. Each
//! `begin_*` call takes callback shims, returns an [`OperationHandle`] and fires
//! callbacks from engine-owned threads. `end_*` must be called exactly once per
//! begin and yields the terminal result; [`OperationHandle::cleanup`] must run
//! once tracking is finished.
//!
//! Orchestration code never sees the raw callbacks: [`bridge`] turns each
//! begin/end pair into a future with cancellation wired to `request_abort`.

pub mod bridge;

use crate::error::EngineError;
use crate::models::{BatchResult, DownloadProgress, InstallProgress, SearchResult, Update};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use bridge::{download_async, install_async, search_async};

/// Progress callback shim. Called from engine threads.
pub type ProgressCallback<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Completion callback shim. Fired once, after any abort has been acknowledged.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// Handle to one in-flight engine operation.
pub trait OperationHandle: Send + Sync {
    /// Ask the engine to abort cooperatively. Completion still fires afterwards.
    fn request_abort(&self);

    fn is_completed(&self) -> bool;

    /// Release engine resources held by the operation.
    fn cleanup(&self);
}

pub type OperationHandleRef = Arc<dyn OperationHandle>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    /// Download even if the engine believes the payload is present.
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    pub force: bool,
    /// Suppress installer UI.
    pub force_quiet: bool,
}

/// Search capability: completion only, no incremental progress.
pub trait UpdateSearcher: Send + Sync {
    fn begin_search(
        &self,
        criteria: &str,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError>;

    fn end_search(&self, handle: &dyn OperationHandle) -> Result<SearchResult, EngineError>;
}

/// Download capability: per-item bytes, phase and percent.
pub trait UpdateDownloader: Send + Sync {
    fn begin_download(
        &self,
        updates: &[Update],
        options: &DownloadOptions,
        on_progress: ProgressCallback<DownloadProgress>,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError>;

    fn end_download(&self, handle: &dyn OperationHandle) -> Result<BatchResult, EngineError>;
}

/// Install capability: per-item percent only.
pub trait UpdateInstaller: Send + Sync {
    fn begin_install(
        &self,
        updates: &[Update],
        options: &InstallOptions,
        on_progress: ProgressCallback<InstallProgress>,
        on_completed: CompletionCallback,
    ) -> Result<OperationHandleRef, EngineError>;

    fn end_install(&self, handle: &dyn OperationHandle) -> Result<BatchResult, EngineError>;
}
