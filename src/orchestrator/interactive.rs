use crate::error::JobError;
use crate::host::{Host, HostContext};
use crate::jobs::Job;
use crate::models::{StreamItem, Update};
use crate::orchestrator::UpdateOrchestrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

impl UpdateOrchestrator {
    /// Confirm each update with the host, install the confirmed ones as a
    /// composite job and stream the job's records back through the host.
    ///
    /// Meant to run as pumped work: every host interaction goes through `ctx`.
    /// Cancelling `cancel` stops the job; its remaining records are still
    /// forwarded before this returns.
    ///
    /// # Returns
    /// The finished root job, or `None` when nothing was confirmed.
    ///
    /// # Example
    /// ```ignore
    /// let pump = Pump::new(runtime.handle().clone()).cancel_on_interrupt(true);
    /// pump.run(&mut host, &cancel, move |ctx, token| async move {
    ///     orchestrator.install_interactive(ctx, updates, token).await?;
    ///     Ok(())
    /// })?;
    /// ```
    pub async fn install_interactive<H>(
        &self,
        ctx: HostContext<H>,
        updates: Vec<Update>,
        cancel: CancellationToken,
    ) -> Result<Option<Arc<Job<Update>>>, JobError>
    where
        H: Host<Item = Update> + 'static,
    {
        let mut confirmed = Vec::with_capacity(updates.len());
        for update in updates {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            if ctx.should_process(update.title.clone(), "Install").await? {
                confirmed.push(update);
            } else {
                ctx.write_verbose(format!("Skipping '{}'", update.title)).await?;
            }
        }
        if confirmed.is_empty() {
            tracing::info!("No updates confirmed for install");
            return Ok(None);
        }

        let job = self.install_as_job(confirmed)?;
        let mut changes = job.watch_changes();
        let mut stop_requested = false;

        loop {
            for item in job.receive() {
                match item {
                    StreamItem::Output(update) => ctx.write_object(update).await?,
                    StreamItem::Progress(record) => ctx.write_progress(record).await?,
                    StreamItem::Error(record) => ctx.write_error(record).await?,
                    StreamItem::Verbose(message) => ctx.write_verbose(message).await?,
                    StreamItem::Debug(message) => ctx.write_debug(message).await?,
                }
            }
            if job.is_finished() && !job.has_more_data() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !stop_requested => {
                    tracing::info!("Interactive install cancelled, stopping job");
                    job.stop();
                    stop_requested = true;
                }
                _ = changes.changed() => {}
            }
        }

        Ok(Some(job))
    }
}
