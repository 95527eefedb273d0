// Per-batch progress handling shared by background jobs and the foreground path
//
// A PhaseSink turns engine progress snapshots for one download or install batch
// into item records, overall batch progress and exactly one terminal record per
// item. Where those records go is decided by the Emit it was built with: a
// job's streams or a drain queue.

use crate::drain::DrainSink;
use crate::error::JobError;
use crate::jobs::JobContext;
use crate::metrics::Metrics;
use crate::models::{
    BatchResult, DownloadProgress, ErrorRecord, InstallProgress, ItemProgress, OperationResult,
    OperationResultCode, ProgressRecord, StreamItem, Update,
};
use crate::orchestrator::progress::{
    Phase, PhasePlan, batch_record, blend, download_record, install_record,
};
use crate::orchestrator::tracker::{ItemStep, ItemTracker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub(crate) type Emit = Arc<dyn Fn(StreamItem<Update>) + Send + Sync>;
pub(crate) type OnDownloaded = Arc<dyn Fn(Update) + Send + Sync>;

pub(crate) fn job_emitter(ctx: JobContext<Update>) -> Emit {
    Arc::new(move |item| match item {
        StreamItem::Output(update) => ctx.write_object(update),
        StreamItem::Progress(record) => ctx.write_progress(record),
        StreamItem::Error(record) => ctx.write_error(record),
        StreamItem::Verbose(message) => ctx.write_verbose(message),
        StreamItem::Debug(message) => ctx.write_debug(message),
    })
}

pub(crate) fn drain_emitter(sink: DrainSink<Update>) -> Emit {
    Arc::new(move |item| {
        sink.push(item);
    })
}

/// What the batches of one install request share.
#[derive(Clone)]
pub(crate) struct BatchContext {
    pub plan: PhasePlan,
    pub batch_id: i32,
    pub item_ids: Arc<HashMap<Uuid, i32>>,
    pub emit_batch: Emit,
}

/// Per-item outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    pub succeeded: Vec<Update>,
    pub failed: usize,
    /// Aborted or never started. Not a failure.
    pub unfinished: usize,
}

struct PhaseState {
    tracker: ItemTracker,
    report: PhaseReport,
}

pub(crate) struct PhaseSink {
    phase: Phase,
    batch: BatchContext,
    items: Vec<(Update, i32)>,
    state: Mutex<PhaseState>,
    emit: Emit,
    on_downloaded: Option<OnDownloaded>,
    metrics: Arc<Metrics>,
}

impl PhaseSink {
    pub fn new(
        phase: Phase,
        batch: BatchContext,
        updates: &[Update],
        emit: Emit,
        metrics: Arc<Metrics>,
    ) -> Self {
        let items = updates
            .iter()
            .map(|update| {
                let id = batch.item_ids.get(&update.id()).copied();
                (update.clone(), id.unwrap_or(batch.batch_id))
            })
            .collect::<Vec<_>>();
        Self {
            phase,
            state: Mutex::new(PhaseState {
                tracker: ItemTracker::new(items.len()),
                report: PhaseReport::default(),
            }),
            batch,
            items,
            emit,
            on_downloaded: None,
            metrics,
        }
    }

    /// Called with each update as soon as its download succeeds.
    pub fn on_downloaded(mut self, next: OnDownloaded) -> Self {
        self.on_downloaded = Some(next);
        self
    }

    fn lock(&self) -> MutexGuard<'_, PhaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn observe_download(&self, snapshot: &DownloadProgress) {
        let batch_id = self.batch.batch_id;
        self.observe(snapshot, |update, item_id, percent| {
            download_record(item_id, batch_id, update, snapshot, percent)
        });
    }

    pub fn observe_install(&self, snapshot: &InstallProgress) {
        let batch_id = self.batch.batch_id;
        self.observe(snapshot, |update, item_id, percent| {
            install_record(item_id, batch_id, update, percent)
        });
    }

    fn observe<P, D>(&self, snapshot: &P, describe: D)
    where
        P: ItemProgress,
        D: Fn(&Update, i32, u8) -> ProgressRecord,
    {
        let index = snapshot.current_item_index();
        let Some((update, item_id)) = self.items.get(index) else {
            tracing::warn!(
                "Progress for item {} of a {} item batch ignored",
                index,
                self.items.len()
            );
            return;
        };

        // Released before emitting: emit and on_downloaded may re-enter the engine.
        let step = self.lock().tracker.observe(snapshot);
        match step {
            ItemStep::Ignored => return,
            ItemStep::Progress(percent) => {
                (self.emit)(StreamItem::Progress(describe(update, *item_id, percent)));
            }
            ItemStep::Finished(result) => {
                (self.emit)(StreamItem::Progress(describe(update, *item_id, 100).completed()));
                self.settle_item(index, result);
            }
        }

        let overall = blend(self.batch.plan, self.phase, snapshot.percent_complete());
        (self.batch.emit_batch)(StreamItem::Progress(batch_record(
            self.batch.batch_id,
            self.phase,
            overall,
        )));
    }

    fn settle_item(&self, index: usize, result: OperationResult) {
        let Some((update, _)) = self.items.get(index) else {
            return;
        };

        match result.code {
            OperationResultCode::Succeeded | OperationResultCode::SucceededWithErrors => {
                let mut done = update.clone();
                match self.phase {
                    Phase::Download => done.is_downloaded = true,
                    Phase::Install => done.is_installed = true,
                }
                self.lock().report.succeeded.push(done.clone());

                match self.phase {
                    Phase::Download => {
                        tracing::info!("Downloaded '{}'", done.title);
                        self.metrics.record_downloaded();
                        if let Some(next) = &self.on_downloaded {
                            next(done);
                        }
                    }
                    Phase::Install => {
                        tracing::info!("Installed '{}'", done.title);
                        self.metrics.record_installed();
                        (self.emit)(StreamItem::Output(done));
                    }
                }
            }
            OperationResultCode::Failed => {
                self.lock().report.failed += 1;
                self.metrics.record_item_failed();
                (self.emit)(StreamItem::Error(ErrorRecord::for_code(
                    result.hresult,
                    Some(&update.title),
                )));
            }
            OperationResultCode::Aborted
            | OperationResultCode::NotStarted
            | OperationResultCode::InProgress => {
                tracing::debug!("'{}' did not finish: {:?}", update.title, result.code);
                self.lock().report.unfinished += 1;
                (self.emit)(StreamItem::Verbose(format!(
                    "'{}' did not finish ({:?})",
                    update.title, result.code
                )));
            }
        }
    }

    /// Settle items the progress callbacks never finished from the batch result,
    /// then map the batch code.
    ///
    /// # Errors
    /// `JobError::Aborted` for an aborted batch, `JobError::BatchFailed` for a
    /// failed one. Per-item records are written either way.
    pub fn finish(&self, batch: BatchResult) -> Result<PhaseReport, JobError> {
        let pending = self.lock().tracker.unfinished();
        for index in pending {
            let Some(result) = batch.item(index).copied() else {
                continue;
            };
            if self.lock().tracker.finish(index) {
                self.settle_item(index, result);
            }
        }

        (self.emit)(StreamItem::Debug(format!(
            "{:?} batch {} ended {:?} (0x{:08X})",
            self.phase, self.batch.batch_id, batch.code, batch.hresult
        )));
        match batch.code {
            OperationResultCode::Aborted => Err(JobError::Aborted),
            OperationResultCode::Failed => Err(JobError::BatchFailed {
                hresult: batch.hresult,
            }),
            _ => Ok(self.report()),
        }
    }

    pub fn report(&self) -> PhaseReport {
        self.lock().report.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting() -> (Emit, Arc<Mutex<Vec<StreamItem<Update>>>>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&items);
        let emit: Emit = Arc::new(move |item| sink.lock().unwrap().push(item));
        (emit, items)
    }

    fn install_snapshot(
        index: usize,
        percent: i32,
        result: Option<OperationResult>,
    ) -> InstallProgress {
        InstallProgress {
            percent_complete: percent,
            current_item_index: index,
            current_item_percent_complete: percent,
            current_item_result: result,
        }
    }

    fn sink_for(updates: &[Update]) -> (PhaseSink, Arc<Mutex<Vec<StreamItem<Update>>>>) {
        let (emit, items) = collecting();
        let (emit_batch, _) = collecting();
        let batch = BatchContext {
            plan: PhasePlan::Single,
            batch_id: 2001,
            item_ids: Arc::new(HashMap::new()),
            emit_batch,
        };
        let metrics = Arc::new(Metrics::new());
        let sink = PhaseSink::new(Phase::Install, batch, updates, emit, metrics);
        (sink, items)
    }

    #[test]
    fn test_one_terminal_record_per_item() {
        let updates = vec![Update::new("A"), Update::new("B")];
        let (sink, items) = sink_for(&updates);

        sink.observe_install(&install_snapshot(0, 50, None));
        sink.observe_install(&install_snapshot(0, 100, Some(OperationResult::succeeded())));
        sink.observe_install(&install_snapshot(0, 100, Some(OperationResult::succeeded())));
        let failed = OperationResult::failed(0x80240022);
        sink.observe_install(&install_snapshot(1, 100, Some(failed)));

        let report = sink
            .finish(BatchResult {
                code: OperationResultCode::SucceededWithErrors,
                hresult: 0,
                item_results: vec![OperationResult::succeeded(), failed],
            })
            .unwrap();

        assert_eq!(report.succeeded.len(), 1);
        assert!(report.succeeded[0].is_installed);
        assert_eq!(report.failed, 1);

        let items = items.lock().unwrap();
        let outputs = items
            .iter()
            .filter(|i| matches!(i, StreamItem::Output(_)))
            .count();
        let errors = items.iter().filter(|i| i.is_error()).count();
        assert_eq!((outputs, errors), (1, 1));
    }

    #[test]
    fn test_batch_result_settles_silent_items() {
        let updates = vec![Update::new("A")];
        let (sink, items) = sink_for(&updates);

        let result = sink.finish(BatchResult {
            code: OperationResultCode::Failed,
            hresult: 0x80240022,
            item_results: vec![OperationResult::failed(0x80240022)],
        });

        assert!(matches!(result, Err(JobError::BatchFailed { hresult: 0x80240022 })));
        assert_eq!(sink.report().failed, 1);
        assert_eq!(items.lock().unwrap().iter().filter(|i| i.is_error()).count(), 1);
    }

    #[test]
    fn test_aborted_items_are_not_failures() {
        let updates = vec![Update::new("A")];
        let (sink, items) = sink_for(&updates);

        let result = sink.finish(BatchResult {
            code: OperationResultCode::Aborted,
            hresult: 0,
            item_results: vec![OperationResult::aborted()],
        });

        assert!(matches!(result, Err(JobError::Aborted)));
        assert_eq!(sink.report().unfinished, 1);
        let items = items.lock().unwrap();
        assert!(!items.iter().any(|i| i.is_error()));
        assert!(items.contains(&StreamItem::Verbose("'A' did not finish (Aborted)".to_string())));
    }

    #[test]
    fn test_abort_keeps_items_finished_before_it() {
        let updates = vec![Update::new("A"), Update::new("B")];
        let (sink, items) = sink_for(&updates);

        sink.observe_install(&install_snapshot(1, 50, None));
        let result = sink.finish(BatchResult {
            code: OperationResultCode::Aborted,
            hresult: 0,
            item_results: vec![OperationResult::succeeded(), OperationResult::aborted()],
        });

        assert!(matches!(result, Err(JobError::Aborted)));
        let report = sink.report();
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.succeeded[0].title, "A");
        assert_eq!(report.unfinished, 1);
        let outputs = items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| matches!(i, StreamItem::Output(_)))
            .count();
        assert_eq!(outputs, 1);
    }
}
