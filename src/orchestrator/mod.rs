//! Orchestration of search, download and install against the engine.
//!
//! [`UpdateOrchestrator`] owns the engine capabilities and the explicitly
//! shared state (update cache, progress ids, metrics). It exposes each
//! operation in the two host-facing modes:
//!
//! - background: a [`Job`] tree the caller registers and returns from
//!   ([`UpdateOrchestrator::search_as_job`], [`UpdateOrchestrator::install_as_job`])
//! - foreground: items stream into a [`DrainQueue`](crate::drain::DrainQueue)
//!   drained on the host thread ([`UpdateOrchestrator::run_foreground_install`])
//!
//! # Composite install
//!
//! ```text
//! Install (parent)
//!   ├── Download (child) ── per item 100% ──► error, or handed to install
//!   └── Install  (child) ── per item 100% ──► Output, or error
//! ```
//!
//! The parent awaits both children, blends their percent onto one overall bar
//! and stamps the aggregate result code.

mod composite;
mod foreground;
mod interactive;
mod mode;
mod phase;
mod progress;
mod search;
mod tracker;

pub use foreground::{ForegroundRun, ForegroundSummary};
pub use mode::{InstallMode, InstallPlan};
pub use phase::PhaseReport;
pub use progress::{Phase, PhasePlan, ProgressIds, blend};
pub use search::SearchOutcome;
pub use tracker::{ItemStep, ItemTracker};

use crate::cache::UpdateCache;
use crate::engine::{
    DownloadOptions, InstallOptions, UpdateDownloader, UpdateInstaller, UpdateSearcher,
};
use crate::jobs::Job;
use crate::metrics::Metrics;
use crate::models::{OrchestrationSettings, Update};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use uuid::Uuid;

/// The three engine capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Capabilities {
    pub searcher: Arc<dyn UpdateSearcher>,
    pub downloader: Arc<dyn UpdateDownloader>,
    pub installer: Arc<dyn UpdateInstaller>,
}

impl Capabilities {
    /// Use one engine object for all three capabilities.
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: UpdateSearcher + UpdateDownloader + UpdateInstaller + 'static,
    {
        Self {
            searcher: engine.clone(),
            downloader: engine.clone(),
            installer: engine,
        }
    }
}

#[derive(Clone)]
pub struct UpdateOrchestrator {
    engine: Capabilities,
    settings: OrchestrationSettings,
    ids: Arc<ProgressIds>,
    cache: Arc<UpdateCache>,
    metrics: Arc<Metrics>,
    runtime: Handle,
}

impl UpdateOrchestrator {
    /// # Arguments
    /// * `engine` - Engine capabilities
    /// * `settings` - Orchestration settings, usually from `OrchestratorConfig`
    /// * `runtime` - Runtime that jobs and engine completions run on
    pub fn new(engine: Capabilities, settings: OrchestrationSettings, runtime: Handle) -> Self {
        Self {
            engine,
            ids: Arc::new(ProgressIds::new(settings.progress_id_base)),
            settings,
            cache: Arc::new(UpdateCache::new()),
            metrics: Arc::new(Metrics::new()),
            runtime,
        }
    }

    /// Share an existing cache, e.g. one also used for argument completion.
    pub fn with_cache(mut self, cache: Arc<UpdateCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn cache(&self) -> &Arc<UpdateCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn settings(&self) -> &OrchestrationSettings {
        &self.settings
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            force: self.settings.force,
        }
    }

    fn install_options(&self) -> InstallOptions {
        InstallOptions {
            force: self.settings.force,
            force_quiet: self.settings.force_quiet,
        }
    }

    /// One progress id per update, reused for its download and install records.
    fn assign_item_ids<'a>(
        &self,
        updates: impl IntoIterator<Item = &'a Update>,
    ) -> Arc<HashMap<Uuid, i32>> {
        Arc::new(
            updates
                .into_iter()
                .map(|update| (update.id(), self.ids.next()))
                .collect(),
        )
    }

    /// Count a started root job and record its terminal state once reached.
    fn track(&self, job: &Arc<Job<Update>>) {
        self.metrics.record_job_started();
        let job = Arc::clone(job);
        let metrics = Arc::clone(&self.metrics);
        self.runtime.spawn(async move {
            let state = job.wait().await;
            tracing::info!("Job '{}' ({}) finished: {}", job.name(), job.id(), state);
            metrics.record_job_finished(state);
        });
    }
}
