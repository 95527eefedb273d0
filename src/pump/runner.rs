// Pump - runs an async lifecycle on the runtime while the calling thread
// services host actions

use crate::error::PumpError;
use crate::host::HostContext;
use crate::metrics::Metrics;
use crate::pump::{RunExit, WorkChannel, WorkSender};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Completes the channel when the lifecycle task ends, including by panic.
struct CompleteOnDrop<H: 'static>(WorkSender<H>);

impl<H: 'static> Drop for CompleteOnDrop<H> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Drives an asynchronous unit of work from a single-threaded host.
///
/// The work future runs on the tokio runtime and talks to the host only through
/// the [`HostContext`] it is given. Meanwhile the calling thread executes the
/// marshalled host actions in FIFO order. `run` returns once the work finishes
/// and every action it queued has executed.
///
/// # Example
/// ```ignore
/// let pump = Pump::new(runtime.handle().clone()).cancel_on_interrupt(true);
/// pump.run(&mut host, &CancellationToken::new(), |ctx, token| async move {
///     let updates = orchestrator.search("IsInstalled=0", None, &token).await?;
///     for update in updates.updates {
///         ctx.write_object(update).await?;
///     }
///     Ok(())
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct Pump {
    runtime: Handle,
    cancel_on_interrupt: bool,
    metrics: Option<Arc<Metrics>>,
}

impl Pump {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            cancel_on_interrupt: false,
            metrics: None,
        }
    }

    /// Count executed work items into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Cancel the work when the process receives Ctrl-C.
    pub fn cancel_on_interrupt(mut self, enabled: bool) -> Self {
        self.cancel_on_interrupt = enabled;
        self
    }

    /// Run `work` to completion, servicing host actions on the calling thread.
    ///
    /// # Arguments
    /// * `host` - The thread-affine host; only ever touched from this thread
    /// * `cancel` - Caller token; the work receives a token derived from it
    /// * `work` - Factory for the lifecycle future
    ///
    /// # Returns
    /// `RunExit::Completed` once the work and its queued actions are done, or
    /// `RunExit::Cancelled` if the token fired first. An error returned by the
    /// work is rethrown here as [`PumpError::Faulted`].
    pub fn run<H, F, Fut>(
        &self,
        host: &mut H,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<RunExit, PumpError>
    where
        H: 'static,
        F: FnOnce(HostContext<H>, CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut channel = WorkChannel::new(self.runtime.clone());
        let token = cancel.child_token();
        let _stop_listeners = token.clone().drop_guard();

        if self.cancel_on_interrupt {
            let interrupt = token.clone();
            self.runtime.spawn(async move {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => match signal {
                        Ok(()) => {
                            tracing::info!("Interrupt received, cancelling pumped work");
                            interrupt.cancel();
                        }
                        Err(e) => tracing::warn!("Failed to listen for interrupt: {}", e),
                    },
                    _ = interrupt.cancelled() => {}
                }
            });
        }

        let sender = channel.sender();
        let future = {
            let _entered = self.runtime.enter();
            work(HostContext::new(sender.clone()), token.clone())
        };

        let lifecycle = self.runtime.spawn(async move {
            let completion = CompleteOnDrop(sender);
            if let Err(error) = future.await {
                completion.0.fault(error);
            }
        });

        let exit = channel.run(host, &token);
        if let Some(metrics) = &self.metrics {
            metrics.record_work_executed(channel.executed());
        }
        let exit = exit?;
        if exit == RunExit::Cancelled {
            return Ok(exit);
        }

        match self.runtime.block_on(lifecycle) {
            Ok(()) => Ok(exit),
            Err(e) if e.is_panic() => Err(PumpError::Panicked(e.to_string())),
            Err(_) => Ok(RunExit::Cancelled),
        }
    }
}
