// Orchestration metrics
//
// Lightweight counters for jobs, engine operations and drained stream items

use crate::jobs::JobState;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Process-wide orchestration counters.
///
/// Uses atomic operations so engine callback threads, job tasks and the drain
/// loop can all record without locks. Logged on demand via [`Metrics::log_summary`].
#[derive(Debug)]
pub struct Metrics {
    /// Root and child jobs started
    pub jobs_started: AtomicUsize,

    /// Jobs that reached Completed
    pub jobs_completed: AtomicUsize,

    /// Jobs that reached Failed
    pub jobs_failed: AtomicUsize,

    /// Jobs that reached Stopped
    pub jobs_stopped: AtomicUsize,

    /// Searches run against the engine
    pub searches: AtomicUsize,

    /// Items whose download finished successfully
    pub updates_downloaded: AtomicUsize,

    /// Items whose install finished successfully
    pub updates_installed: AtomicUsize,

    /// Items that finished with a failure code
    pub item_failures: AtomicUsize,

    /// Engine operations (search, download or install batches) completed
    pub operations: AtomicU64,

    /// Total wall time spent in engine operations in milliseconds
    pub total_operation_time_ms: AtomicU64,

    /// Host actions executed by a pump
    pub work_items_executed: AtomicU64,

    /// Stream items handed to a host by a drain loop
    pub items_drained: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_started: AtomicUsize::new(0),
            jobs_completed: AtomicUsize::new(0),
            jobs_failed: AtomicUsize::new(0),
            jobs_stopped: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            updates_downloaded: AtomicUsize::new(0),
            updates_installed: AtomicUsize::new(0),
            item_failures: AtomicUsize::new(0),
            operations: AtomicU64::new(0),
            total_operation_time_ms: AtomicU64::new(0),
            work_items_executed: AtomicU64::new(0),
            items_drained: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal state of a job. Non-terminal states are ignored.
    pub fn record_job_finished(&self, state: JobState) {
        let counter = match state {
            JobState::Completed => &self.jobs_completed,
            JobState::Failed => &self.jobs_failed,
            JobState::Stopped => &self.jobs_stopped,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self) {
        self.updates_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_installed(&self) {
        self.updates_installed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_failed(&self) {
        self.item_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the wall time of one engine operation
    pub fn record_operation_time(&self, duration: Duration) {
        self.operations.fetch_add(1, Ordering::Relaxed);
        self.total_operation_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_work_executed(&self, count: u64) {
        self.work_items_executed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_drained(&self, count: u64) {
        self.items_drained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average engine operation time in milliseconds
    pub fn avg_operation_time_ms(&self) -> f64 {
        let total = self.total_operation_time_ms.load(Ordering::Relaxed);
        let count = self.operations.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Orchestration Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Jobs: {} started, {} completed, {} failed, {} stopped",
            self.jobs_started.load(Ordering::Relaxed),
            self.jobs_completed.load(Ordering::Relaxed),
            self.jobs_failed.load(Ordering::Relaxed),
            self.jobs_stopped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Updates: {} downloaded, {} installed, {} item failures, {} searches",
            self.updates_downloaded.load(Ordering::Relaxed),
            self.updates_installed.load(Ordering::Relaxed),
            self.item_failures.load(Ordering::Relaxed),
            self.searches.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Engine operations: {} (avg: {:.2}ms), host actions: {}, items drained: {}",
            self.operations.load(Ordering::Relaxed),
            self.avg_operation_time_ms(),
            self.work_items_executed.load(Ordering::Relaxed),
            self.items_drained.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
