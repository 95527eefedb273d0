// Foreground install - engine operations feeding a drain queue directly
//
// No jobs are created. Every download or install batch holds an OperationLease
// on the queue while it runs; a download that finishes an item starts that
// item's install from inside the progress callback, taking the install's lease
// before the download's is released, so the drain loop never sees a gap.

use crate::drain::{DrainQueue, DrainSink};
use crate::engine::{download_async, install_async};
use crate::error::{HostError, JobError};
use crate::host::Host;
use crate::jobs::JobState;
use crate::models::{
    DownloadProgress, ErrorRecord, InstallProgress, OperationResultCode, StreamItem, Update,
};
use crate::orchestrator::UpdateOrchestrator;
use crate::orchestrator::mode::InstallPlan;
use crate::orchestrator::phase::{BatchContext, PhaseReport, PhaseSink, drain_emitter};
use crate::orchestrator::progress::Phase;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a foreground install ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundSummary {
    pub state: JobState,
    pub code: OperationResultCode,
    pub installed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Tally {
    installed: usize,
    failed: usize,
    aborted: bool,
    batch_failed: bool,
}

/// Shared outcome of the batches started by one foreground install.
#[derive(Debug)]
pub struct ForegroundRun {
    tally: Mutex<Tally>,
    cancel: CancellationToken,
}

impl ForegroundRun {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            tally: Mutex::new(Tally::default()),
            cancel,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(
        &self,
        phase: Phase,
        outcome: Result<PhaseReport, JobError>,
        report: PhaseReport,
        sink: &DrainSink<Update>,
    ) {
        let mut tally = self.lock();
        if phase == Phase::Install {
            tally.installed += report.succeeded.len();
        }
        tally.failed += report.failed;

        match outcome {
            Ok(_) => {}
            Err(e) if e.is_stop() => tally.aborted = true,
            Err(e) => {
                tally.batch_failed = true;
                let target = match phase {
                    Phase::Download => "download batch",
                    Phase::Install => "install batch",
                };
                sink.push(StreamItem::Error(ErrorRecord::from_job_error(&e, Some(target))));
            }
        }
    }

    /// Summarize the run. Only meaningful once the drain queue has closed.
    ///
    /// An abort, whether requested through the token or reported by the engine,
    /// ends the run `Stopped`; abort is not a failure.
    pub fn summary(&self) -> ForegroundSummary {
        let tally = self.lock();
        let aborted = tally.aborted || self.cancel.is_cancelled();
        let state = if aborted {
            JobState::Stopped
        } else if tally.batch_failed && tally.installed == 0 {
            JobState::Failed
        } else {
            JobState::Completed
        };

        ForegroundSummary {
            state,
            code: OperationResultCode::aggregate(tally.installed, tally.failed, aborted),
            installed: tally.installed,
            failed: tally.failed,
        }
    }
}

impl UpdateOrchestrator {
    /// Start a foreground install whose records flow into `sink`.
    ///
    /// Each batch takes its own lease on `sink`; the caller seals the sink
    /// once this returns and drains the queue on the host thread.
    pub fn install_foreground(
        &self,
        updates: Vec<Update>,
        sink: &DrainSink<Update>,
        cancel: &CancellationToken,
    ) -> Arc<ForegroundRun> {
        let run = Arc::new(ForegroundRun::new(cancel.clone()));
        let plan = InstallPlan::build(updates, self.settings.download_before_install);

        for update in &plan.rejected {
            sink.push(StreamItem::Error(ErrorRecord::not_downloaded(update)));
        }
        run.lock().failed += plan.rejected.len();

        let batch = BatchContext {
            plan: plan.phases(),
            batch_id: self.ids.next(),
            item_ids: self.assign_item_ids(plan.to_download.iter().chain(&plan.ready)),
            emit_batch: drain_emitter(sink.clone()),
        };

        if !plan.ready.is_empty() {
            self.spawn_install(plan.ready, batch.clone(), sink, &run);
        }
        if !plan.to_download.is_empty() {
            self.spawn_download(plan.to_download, batch, sink, &run);
        }
        run
    }

    /// Run a foreground install to completion, draining to `host` on the
    /// calling thread.
    ///
    /// Cancelling `cancel` asks the engine to abort; the call still returns
    /// only after every batch has acknowledged and its records were written.
    pub fn run_foreground_install<H>(
        &self,
        host: &mut H,
        updates: Vec<Update>,
        cancel: &CancellationToken,
    ) -> Result<ForegroundSummary, HostError>
    where
        H: Host<Item = Update>,
    {
        let mut queue = DrainQueue::new();
        let sink = queue.sink();
        let run = self.install_foreground(updates, &sink, cancel);
        sink.seal();
        drop(sink);

        let drained = queue.drain_to_host(host, &self.runtime)?;
        self.metrics.record_drained(drained);

        let summary = run.summary();
        tracing::info!(
            "Foreground install ended {} ({:?}): {} installed, {} failed",
            summary.state,
            summary.code,
            summary.installed,
            summary.failed
        );
        Ok(summary)
    }

    fn spawn_download(
        &self,
        updates: Vec<Update>,
        batch: BatchContext,
        sink: &DrainSink<Update>,
        run: &Arc<ForegroundRun>,
    ) {
        let lease = sink.begin_operation();
        let chain = {
            let this = self.clone();
            let batch = batch.clone();
            let sink = sink.clone();
            let run = Arc::clone(run);
            Arc::new(move |update: Update| {
                this.spawn_install(vec![update], batch.clone(), &sink, &run);
            })
        };
        let phase = Arc::new(
            PhaseSink::new(
                Phase::Download,
                batch,
                &updates,
                drain_emitter(sink.clone()),
                Arc::clone(&self.metrics),
            )
            .on_downloaded(chain),
        );

        let this = self.clone();
        let sink = sink.clone();
        let run = Arc::clone(run);
        self.runtime.spawn(async move {
            let _lease = lease;
            let progress = {
                let phase = Arc::clone(&phase);
                move |snapshot: &DownloadProgress| phase.observe_download(snapshot)
            };

            let started = Instant::now();
            let result = download_async(
                this.engine.downloader.as_ref(),
                &updates,
                &this.download_options(),
                progress,
                &run.cancel,
            )
            .await;
            this.metrics.record_operation_time(started.elapsed());

            let outcome = result.and_then(|batch| phase.finish(batch));
            run.settle(Phase::Download, outcome, phase.report(), &sink);
        });
    }

    fn spawn_install(
        &self,
        updates: Vec<Update>,
        batch: BatchContext,
        sink: &DrainSink<Update>,
        run: &Arc<ForegroundRun>,
    ) {
        let lease = sink.begin_operation();
        let phase = Arc::new(PhaseSink::new(
            Phase::Install,
            batch,
            &updates,
            drain_emitter(sink.clone()),
            Arc::clone(&self.metrics),
        ));

        let this = self.clone();
        let sink = sink.clone();
        let run = Arc::clone(run);
        self.runtime.spawn(async move {
            let _lease = lease;
            let progress = {
                let phase = Arc::clone(&phase);
                move |snapshot: &InstallProgress| phase.observe_install(snapshot)
            };

            let started = Instant::now();
            let result = install_async(
                this.engine.installer.as_ref(),
                &updates,
                &this.install_options(),
                progress,
                &run.cancel,
            )
            .await;
            this.metrics.record_operation_time(started.elapsed());

            let outcome = result.and_then(|batch| phase.finish(batch));
            run.settle(Phase::Install, outcome, phase.report(), &sink);
        });
    }
}
