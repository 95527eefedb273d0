// Drain loop - forwards buffered stream items to a host on the host's thread
//
// Producers push StreamItems through a DrainSink from any thread. The queue
// stays open while the setup phase is unsealed or any OperationLease is alive;
// once the outstanding count reaches zero the sender is dropped and the drain
// loop returns after everything buffered has been dispatched.

use crate::error::HostError;
use crate::host::Host;
use crate::jobs::{Job, JobState};
use crate::models::StreamItem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Shared<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<StreamItem<T>>>>,
    outstanding: AtomicUsize,
    sealed: AtomicBool,
}

impl<T> Shared<T> {
    fn release(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            tracing::debug!("No operations outstanding, drain queue closed");
        }
    }
}

/// Consumer side of a shared stream collection.
pub struct DrainQueue<T> {
    rx: mpsc::UnboundedReceiver<StreamItem<T>>,
    shared: Arc<Shared<T>>,
}

impl<T> DrainQueue<T> {
    /// Create an open queue. The setup phase counts as one outstanding
    /// operation until [`DrainSink::seal`] is called.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            rx,
            shared: Arc::new(Shared {
                tx: Mutex::new(Some(tx)),
                outstanding: AtomicUsize::new(1),
                sealed: AtomicBool::new(false),
            }),
        }
    }

    pub fn sink(&self) -> DrainSink<T> {
        DrainSink {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Dispatch items to `host` until the queue closes.
    ///
    /// Blocks the calling thread, which must not be a runtime worker.
    ///
    /// # Returns
    /// The number of items dispatched.
    pub fn drain_to_host<H>(&mut self, host: &mut H, runtime: &Handle) -> Result<u64, HostError>
    where
        H: Host<Item = T>,
    {
        let mut dispatched = 0;
        while let Some(item) = runtime.block_on(self.rx.recv()) {
            dispatch(host, item)?;
            dispatched += 1;
        }
        tracing::debug!("Drain loop finished after {} item(s)", dispatched);
        Ok(dispatched)
    }
}

impl<T> Default for DrainQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of a [`DrainQueue`]. Cheap to clone and usable from any thread.
pub struct DrainSink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for DrainSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> DrainSink<T> {
    /// Returns false if the queue has already closed.
    pub fn push(&self, item: StreamItem<T>) -> bool {
        let tx = self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => {
                tracing::warn!("Drain queue already closed, dropping stream item");
                false
            }
        }
    }

    /// Register one more concurrent operation. The queue cannot close while
    /// the returned lease is alive.
    pub fn begin_operation(&self) -> OperationLease<T> {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        OperationLease {
            shared: Arc::clone(&self.shared),
        }
    }

    /// End the setup phase. Idempotent.
    pub fn seal(&self) {
        if !self.shared.sealed.swap(true, Ordering::AcqRel) {
            self.shared.release();
        }
    }

    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// One outstanding operation feeding a [`DrainQueue`]; released on drop.
#[must_use = "dropping the lease immediately releases the operation"]
pub struct OperationLease<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Drop for OperationLease<T> {
    fn drop(&mut self) {
        self.shared.release();
    }
}

fn dispatch<H: Host>(host: &mut H, item: StreamItem<H::Item>) -> Result<(), HostError> {
    match item {
        StreamItem::Output(item) => host.write_object(item),
        StreamItem::Progress(record) => host.write_progress(record),
        StreamItem::Error(record) => host.write_error(record),
        StreamItem::Verbose(message) => host.write_verbose(&message),
        StreamItem::Debug(message) => host.write_debug(&message),
    }
}

/// Forward a job's streams, and its descendants', to `host` until the job is
/// terminal and fully read.
///
/// Cancelling `cancel` stops the job; draining continues until the stop lands
/// so nothing the job wrote on its way out is lost. Blocks the calling thread.
/// A job that was never started has nothing to wait for and is returned
/// as `NotStarted` right away.
pub fn drain_job<H>(
    job: &Job<H::Item>,
    host: &mut H,
    runtime: &Handle,
    cancel: &CancellationToken,
) -> Result<JobState, HostError>
where
    H: Host,
    H::Item: Clone + Send + Sync + 'static,
{
    if job.state() == JobState::NotStarted {
        tracing::warn!("Job '{}' was never started, nothing to drain", job.name());
        return Ok(JobState::NotStarted);
    }

    let mut changes = job.watch_changes();
    let mut stop_requested = false;

    loop {
        for item in job.receive() {
            dispatch(host, item)?;
        }
        if job.is_finished() && !job.has_more_data() {
            return Ok(job.state());
        }

        let cancelled = runtime.block_on(async {
            tokio::select! {
                _ = cancel.cancelled(), if !stop_requested => true,
                _ = changes.changed() => false,
            }
        });
        if cancelled {
            tracing::info!("Drain cancelled, stopping job '{}'", job.name());
            job.stop();
            stop_requested = true;
        }
    }
}
