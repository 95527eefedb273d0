// WorkChannel - marshals closures from any thread onto the single host thread
//
// Producers (tokio tasks, engine callback threads) enqueue boxed actions and get
// back a PendingWork future. The owning thread parks in `run` and executes the
// actions one by one against the host it owns. The host itself never leaves that
// thread; only the closures cross.

use crate::error::{HostError, PumpError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type Action<H> = Box<dyn FnOnce(&mut H) + Send>;

pub(crate) enum WorkItem<H> {
    Action(Action<H>),
    /// Error from the lifecycle future, rethrown when the pump reaches it.
    Fault(anyhow::Error),
}

/// How a call to [`WorkChannel::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The channel was completed and every queued item executed.
    Completed,
    /// The cancellation token fired; queued items were left in place.
    Cancelled,
}

/// Cloneable producer side of a [`WorkChannel`].
///
/// Completion is shared: once any clone calls [`complete`](Self::complete),
/// every clone rejects new work.
pub struct WorkSender<H> {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<WorkItem<H>>>>>,
}

impl<H> Clone for WorkSender<H> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<H: 'static> WorkSender<H> {
    /// Schedule `action` to run on the host thread.
    ///
    /// Never blocks. The item is queued immediately, before the returned future
    /// is first polled; awaiting it yields the action's result.
    ///
    /// # Example
    /// ```ignore
    /// let written = sender.enqueue(|host| host.write_verbose("hello")).await;
    /// ```
    pub fn enqueue<T, F>(&self, action: F) -> PendingWork<T>
    where
        F: FnOnce(&mut H) -> Result<T, HostError> + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let item = WorkItem::Action(Box::new(move |host: &mut H| {
            let result = action(host);
            if result_tx.send(result).is_err() {
                tracing::debug!("Work item finished after its caller stopped waiting");
            }
        }));

        match self.send(item) {
            Ok(()) => PendingWork::waiting(result_rx),
            Err(_) => PendingWork::rejected(HostError::ChannelClosed),
        }
    }

    /// Queue a lifecycle fault so `run` returns it on the host thread.
    pub(crate) fn fault(&self, error: anyhow::Error) {
        if let Err(WorkItem::Fault(error)) = self.send(WorkItem::Fault(error)) {
            tracing::error!("Pumped work faulted after the channel closed: {:#}", error);
        }
    }

    /// Mark that no further items will be enqueued.
    pub fn complete(&self) {
        let sender = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if sender.is_some() {
            tracing::debug!("Work channel completed");
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn send(&self, item: WorkItem<H>) -> Result<(), WorkItem<H>> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(item).map_err(|e| e.0),
            None => Err(item),
        }
    }
}

/// Multi-producer, single-consumer queue of host actions.
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let mut channel = WorkChannel::<MyHost>::new(runtime.handle().clone());
/// let sender = channel.sender();
///
/// runtime.spawn(async move {
///     sender.enqueue(|host| host.write_verbose("from a task")).await.ok();
///     sender.complete();
/// });
///
/// channel.run(&mut host, &CancellationToken::new())?;
/// ```
pub struct WorkChannel<H> {
    sender: WorkSender<H>,
    rx: mpsc::UnboundedReceiver<WorkItem<H>>,
    runtime: Handle,
    executed: u64,
}

impl<H: 'static> WorkChannel<H> {
    pub fn new(runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: WorkSender {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
            runtime,
            executed: 0,
        }
    }

    pub fn sender(&self) -> WorkSender<H> {
        self.sender.clone()
    }

    pub fn enqueue<T, F>(&self, action: F) -> PendingWork<T>
    where
        F: FnOnce(&mut H) -> Result<T, HostError> + Send + 'static,
        T: Send + 'static,
    {
        self.sender.enqueue(action)
    }

    pub fn complete(&self) {
        self.sender.complete();
    }

    /// Number of actions executed by `run` so far.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Execute queued actions on the calling thread until the channel is
    /// completed and drained, or `cancel` fires.
    ///
    /// Must be called from a thread that is not driving the runtime: the wait
    /// for the next item parks the thread with `Handle::block_on`.
    ///
    /// Cancellation leaves undelivered items queued; a later `run` with a live
    /// token picks up where this one stopped.
    pub fn run(&mut self, host: &mut H, cancel: &CancellationToken) -> Result<RunExit, PumpError> {
        loop {
            let rx = &mut self.rx;
            let next = self.runtime.block_on(async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = rx.recv() => Some(item),
                }
            });

            match next {
                None => {
                    tracing::warn!(
                        "Work channel run cancelled after {} item(s)",
                        self.executed
                    );
                    return Ok(RunExit::Cancelled);
                }
                Some(None) => {
                    tracing::debug!("Work channel drained after {} item(s)", self.executed);
                    return Ok(RunExit::Completed);
                }
                Some(Some(WorkItem::Action(action))) => {
                    action(host);
                    self.executed += 1;
                }
                Some(Some(WorkItem::Fault(error))) => {
                    tracing::error!("Pumped work faulted: {:#}", error);
                    return Err(PumpError::Faulted(error));
                }
            }
        }
    }
}

enum PendingState<T> {
    Waiting(oneshot::Receiver<Result<T, HostError>>),
    Rejected(Option<HostError>),
}

/// Future for the result of an enqueued action.
///
/// Resolves to the action's own result, to [`HostError::ChannelClosed`] if the
/// channel was already completed, or to [`HostError::Abandoned`] if the channel
/// was dropped before the action ran.
#[must_use = "dropping PendingWork discards the action's result"]
pub struct PendingWork<T> {
    state: PendingState<T>,
}

impl<T> PendingWork<T> {
    fn waiting(rx: oneshot::Receiver<Result<T, HostError>>) -> Self {
        Self {
            state: PendingState::Waiting(rx),
        }
    }

    fn rejected(error: HostError) -> Self {
        Self {
            state: PendingState::Rejected(Some(error)),
        }
    }
}

impl<T> Future for PendingWork<T> {
    type Output = Result<T, HostError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(HostError::Abandoned))),
            PendingState::Rejected(error) => {
                Poll::Ready(Err(error.take().unwrap_or(HostError::ChannelClosed)))
            }
        }
    }
}
