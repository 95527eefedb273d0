// Composite install job - a parent with download and install children
//
// The parent splits the request by InstallMode, runs the download child for
// updates that need it, installs whatever is ready afterwards, and stamps the
// aggregate result code. A failed download batch does not keep already
// downloaded updates from installing. Children write their own item records;
// the parent writes the blended overall progress.

use crate::engine::{download_async, install_async};
use crate::error::JobError;
use crate::jobs::{Job, JobContext, JobInfo, JobTask};
use crate::models::{
    BatchResult, DownloadProgress, ErrorRecord, InstallProgress, OperationResultCode, Update,
};
use crate::orchestrator::UpdateOrchestrator;
use crate::orchestrator::mode::InstallPlan;
use crate::orchestrator::phase::{BatchContext, PhaseReport, PhaseSink, job_emitter};
use crate::orchestrator::progress::{Phase, batch_record};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where a phase child leaves its per-item report, failed batch or not.
type ReportSlot = Arc<Mutex<PhaseReport>>;

struct PhaseOutcome {
    report: PhaseReport,
    failed: usize,
    error: Option<JobError>,
}

async fn join_phase(task: JobTask<()>, slot: &ReportSlot, total: usize) -> PhaseOutcome {
    let result = task.await;
    let report = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
    let failed = match &result {
        Err(e) if !e.is_stop() => {
            // Items the failed batch never settled count against it.
            total.saturating_sub(report.succeeded.len() + report.unfinished)
        }
        _ => report.failed,
    };
    PhaseOutcome {
        report,
        failed,
        error: result.err(),
    }
}

impl UpdateOrchestrator {
    /// Start a background download-then-install job for `updates`.
    ///
    /// # Returns
    /// The root job. Its children (Download, Install) appear as they start.
    pub fn install_as_job(&self, updates: Vec<Update>) -> Result<Arc<Job<Update>>, JobError> {
        let job = Job::new(
            JobInfo::new(
                "Install",
                format!("Install-WindowsUpdate ({} update(s))", updates.len()),
            )
            .with_type("UpdateInstallJob"),
        );

        let this = self.clone();
        let _guard = self.runtime.enter();
        let task = job.start(move |ctx, token| this.run_install(ctx, token, updates))?;
        drop(task);

        self.track(&job);
        Ok(job)
    }

    /// Work function of the composite install job.
    ///
    /// The job fails only when a batch failed and nothing was installed;
    /// otherwise per-item failures show up in the result code.
    pub(crate) async fn run_install(
        self,
        ctx: JobContext<Update>,
        token: CancellationToken,
        updates: Vec<Update>,
    ) -> Result<(), JobError> {
        let plan = InstallPlan::build(updates, self.settings.download_before_install);
        for update in &plan.rejected {
            ctx.write_error(ErrorRecord::not_downloaded(update));
        }
        let mut failed = plan.rejected.len();

        let batch = BatchContext {
            plan: plan.phases(),
            batch_id: self.ids.next(),
            item_ids: self.assign_item_ids(plan.to_download.iter().chain(&plan.ready)),
            emit_batch: job_emitter(ctx.clone()),
        };

        let mut ready = plan.ready;
        let mut stopped = None;
        let mut batch_error = None;

        if !plan.to_download.is_empty() {
            let total = plan.to_download.len();
            ctx.write_verbose(format!("Downloading {} update(s)", total));
            let info = JobInfo::new("Download", format!("Download {} update(s)", total))
                .with_type("UpdateDownloadJob");
            let slot = ReportSlot::default();
            let this = self.clone();
            let batch = batch.clone();
            let updates = plan.to_download;
            let settled = Arc::clone(&slot);
            let (_child, task) = ctx.start_child(info, move |child, token| {
                this.run_download_phase(child, token, batch, updates, settled)
            })?;

            let outcome = join_phase(task, &slot, total).await;
            failed += outcome.failed;
            ready.extend(outcome.report.succeeded);
            match outcome.error {
                Some(e) if e.is_stop() => stopped = Some(e),
                Some(e) => {
                    tracing::warn!(
                        "Download batch failed, {} update(s) still ready to install: {}",
                        ready.len(),
                        e
                    );
                    batch_error = Some(e);
                }
                None => {}
            }
        }
        if stopped.is_none() && token.is_cancelled() {
            stopped = Some(JobError::Cancelled);
        }

        let mut installed = 0;
        if stopped.is_none() && !ready.is_empty() {
            let total = ready.len();
            ctx.write_verbose(format!("Installing {} update(s)", total));
            let info = JobInfo::new("Install", format!("Install {} update(s)", total))
                .with_type("UpdateInstallPhaseJob");
            let slot = ReportSlot::default();
            let this = self.clone();
            let batch = batch.clone();
            let settled = Arc::clone(&slot);
            let (_child, task) = ctx.start_child(info, move |child, token| {
                this.run_install_phase(child, token, batch, ready, settled)
            })?;

            let outcome = join_phase(task, &slot, total).await;
            installed = outcome.report.succeeded.len();
            failed += outcome.failed;
            match outcome.error {
                Some(e) if e.is_stop() => stopped = Some(e),
                Some(e) => batch_error = Some(e),
                None => {}
            }
        }

        let code = OperationResultCode::aggregate(installed, failed, stopped.is_some());
        ctx.set_result_code(code);
        if let Some(stop) = stopped {
            tracing::info!(
                "Install job stopped: {} installed, {} failed before the stop",
                installed,
                failed
            );
            return Err(stop);
        }

        ctx.write_progress(batch_record(batch.batch_id, Phase::Install, 100).completed());
        tracing::info!(
            "Install job finished with {:?}: {} installed, {} failed",
            code,
            installed,
            failed
        );
        match batch_error {
            Some(e) if installed == 0 => Err(e),
            _ => Ok(()),
        }
    }

    async fn run_download_phase(
        self,
        ctx: JobContext<Update>,
        token: CancellationToken,
        batch: BatchContext,
        updates: Vec<Update>,
        settled: ReportSlot,
    ) -> Result<(), JobError> {
        let sink = Arc::new(PhaseSink::new(
            Phase::Download,
            batch,
            &updates,
            job_emitter(ctx.clone()),
            Arc::clone(&self.metrics),
        ));
        let progress = {
            let sink = Arc::clone(&sink);
            move |snapshot: &DownloadProgress| sink.observe_download(snapshot)
        };

        let started = Instant::now();
        let result = download_async(
            self.engine.downloader.as_ref(),
            &updates,
            &self.download_options(),
            progress,
            &token,
        )
        .await;
        self.metrics.record_operation_time(started.elapsed());

        finish_phase(&ctx, &sink, result, &settled)
    }

    async fn run_install_phase(
        self,
        ctx: JobContext<Update>,
        token: CancellationToken,
        batch: BatchContext,
        updates: Vec<Update>,
        settled: ReportSlot,
    ) -> Result<(), JobError> {
        let sink = Arc::new(PhaseSink::new(
            Phase::Install,
            batch,
            &updates,
            job_emitter(ctx.clone()),
            Arc::clone(&self.metrics),
        ));
        let progress = {
            let sink = Arc::clone(&sink);
            move |snapshot: &InstallProgress| sink.observe_install(snapshot)
        };

        let started = Instant::now();
        let result = install_async(
            self.engine.installer.as_ref(),
            &updates,
            &self.install_options(),
            progress,
            &token,
        )
        .await;
        self.metrics.record_operation_time(started.elapsed());

        finish_phase(&ctx, &sink, result, &settled)
    }
}

/// Settle a phase from its batch result and publish the report to `settled`.
fn finish_phase(
    ctx: &JobContext<Update>,
    sink: &PhaseSink,
    result: Result<BatchResult, JobError>,
    settled: &ReportSlot,
) -> Result<(), JobError> {
    let outcome = result.and_then(|batch_result| {
        ctx.set_result_code(batch_result.code);
        sink.finish(batch_result)
    });
    *settled.lock().unwrap_or_else(PoisonError::into_inner) = sink.report();
    outcome.map(drop)
}
