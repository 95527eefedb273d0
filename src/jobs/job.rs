// Job - identity, lifecycle, streams and child composition for one unit of work
//
// A Job is shared as Arc<Job<T>>. Its state lives in a watch channel so waiters
// can await terminal states, and every transition is also broadcast as a
// JobEvent. Only the task running the job's work function settles it; stop()
// merely requests cancellation and moves Running to Stopping.

use crate::error::JobError;
use crate::jobs::{JobState, JobStream};
use crate::models::{ErrorRecord, OperationResultCode, ProgressRecord, StreamItem};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::task::{Context, Poll, ready};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events emitted by a job as it progresses.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    StateChanged {
        job: Uuid,
        from: JobState,
        to: JobState,
    },
    ChildAdded {
        parent: Uuid,
        child: Uuid,
        name: String,
    },
}

/// Descriptive identity of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub name: String,
    pub command: String,
    pub type_name: String,
}

impl JobInfo {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            type_name: "UpdateJob".to_string(),
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }
}

enum Outcome<'a> {
    Succeeded,
    Stopped,
    Failed(&'a JobError),
}

/// A long-running unit of work with streams a consumer can drain.
pub struct Job<T> {
    id: Uuid,
    info: JobInfo,
    parent: Option<Weak<Job<T>>>,
    parent_id: Option<Uuid>,
    cancel: CancellationToken,
    state: watch::Sender<JobState>,
    events: broadcast::Sender<JobEvent>,
    changed: watch::Sender<u64>,
    output: JobStream<T>,
    progress: JobStream<ProgressRecord>,
    errors: JobStream<ErrorRecord>,
    verbose: JobStream<String>,
    debug: JobStream<String>,
    children: RwLock<Vec<Arc<Job<T>>>>,
    result_code: Mutex<Option<OperationResultCode>>,
}

impl<T> Job<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a root job with its own cancellation token.
    pub fn new(info: JobInfo) -> Arc<Self> {
        Self::build(info, CancellationToken::new(), None)
    }

    /// Create a root job whose token is derived from `parent_token`.
    pub fn with_parent_token(info: JobInfo, parent_token: &CancellationToken) -> Arc<Self> {
        Self::build(info, parent_token.child_token(), None)
    }

    fn build(info: JobInfo, cancel: CancellationToken, parent: Option<&Arc<Job<T>>>) -> Arc<Self> {
        let (state, _) = watch::channel(JobState::NotStarted);
        let (events, _) = broadcast::channel(100);
        let (changed, _) = watch::channel(0);
        Arc::new(Self {
            id: Uuid::new_v4(),
            info,
            parent: parent.map(Arc::downgrade),
            parent_id: parent.map(|p| p.id),
            cancel,
            state,
            events,
            changed,
            output: JobStream::new(),
            progress: JobStream::new(),
            errors: JobStream::new(),
            verbose: JobStream::new(),
            debug: JobStream::new(),
            children: RwLock::new(Vec::new()),
            result_code: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn command(&self) -> &str {
        &self.info.command
    }

    pub fn type_name(&self) -> &str {
        &self.info.type_name
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// The job's cancellation token. Children hold tokens derived from it.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn output(&self) -> &JobStream<T> {
        &self.output
    }

    pub fn progress(&self) -> &JobStream<ProgressRecord> {
        &self.progress
    }

    pub fn errors(&self) -> &JobStream<ErrorRecord> {
        &self.errors
    }

    pub fn verbose(&self) -> &JobStream<String> {
        &self.verbose
    }

    pub fn debug(&self) -> &JobStream<String> {
        &self.debug
    }

    pub fn children(&self) -> Vec<Arc<Job<T>>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Aggregate engine result stamped by the orchestrator, if any.
    pub fn result_code(&self) -> Option<OperationResultCode> {
        *self.result_code.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Receiver bumped whenever this job or a descendant gains data or changes state.
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self) -> JobState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Whether this job or any descendant has unread data in any stream.
    pub fn has_more_data(&self) -> bool {
        self.output.has_unread()
            || self.progress.has_unread()
            || self.errors.has_unread()
            || self.verbose.has_unread()
            || self.debug.has_unread()
            || self.children().iter().any(|child| child.has_more_data())
    }

    /// Take unread items from this job and then from each descendant.
    pub fn receive(&self) -> Vec<StreamItem<T>> {
        let mut items = Vec::new();
        self.collect_unread(&mut items);
        items
    }

    fn collect_unread(&self, items: &mut Vec<StreamItem<T>>) {
        items.extend(self.output.read_new().into_iter().map(StreamItem::Output));
        items.extend(self.progress.read_new().into_iter().map(StreamItem::Progress));
        items.extend(self.errors.read_new().into_iter().map(StreamItem::Error));
        items.extend(self.verbose.read_new().into_iter().map(StreamItem::Verbose));
        items.extend(self.debug.read_new().into_iter().map(StreamItem::Debug));
        for child in self.children() {
            child.collect_unread(items);
        }
    }

    /// Start running `work` on the current tokio runtime.
    ///
    /// The returned task resolves with the work's result. Failures are also
    /// recorded in the Error stream before the task resolves.
    ///
    /// # Errors
    /// `JobError::InvalidState` if the job was already started or stopped.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime context.
    pub fn start<R, F, Fut>(self: &Arc<Self>, work: F) -> Result<JobTask<R>, JobError>
    where
        F: FnOnce(JobContext<T>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<R, JobError>> + Send + 'static,
        R: Send + 'static,
    {
        let started = self.advance(|state| match state {
            JobState::NotStarted => &[JobState::Running],
            _ => &[],
        });
        if !started {
            return Err(JobError::InvalidState {
                name: self.info.name.clone(),
                action: "start",
                state: self.state(),
            });
        }

        tracing::info!("Job '{}' ({}) started: {}", self.info.name, self.id, self.info.command);

        let inner = tokio::spawn(work(JobContext::new(Arc::clone(self)), self.cancel.clone()));
        let job = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = match inner.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(JobError::Panicked(e.to_string())),
                Err(_) => Err(JobError::Cancelled),
            };
            job.settle(&result);
            result
        });

        Ok(JobTask {
            handle,
            child_name: None,
        })
    }

    /// Request a cooperative stop.
    ///
    /// A running job moves to `Stopping` and stays there until its work observes
    /// the cancellation and returns; a job that never started stops immediately.
    pub fn stop(&self) {
        self.advance(|state| match state {
            JobState::NotStarted => &[JobState::Stopped],
            JobState::Running => &[JobState::Stopping],
            _ => &[],
        });
        self.cancel.cancel();
    }

    /// Record the work's result and move to the matching terminal state.
    ///
    /// A stop that was already requested wins: a job in `Stopping` always ends
    /// `Stopped`, even when its work then fails for another reason. That failure
    /// is still written to the Error stream so it is not lost.
    fn settle<R>(&self, result: &Result<R, JobError>) {
        let outcome = match result {
            Ok(_) => Outcome::Succeeded,
            Err(JobError::Aborted) => Outcome::Stopped,
            Err(JobError::Cancelled) if self.cancel.is_cancelled() => Outcome::Stopped,
            Err(e) => Outcome::Failed(e),
        };

        if let Outcome::Failed(error) = &outcome {
            tracing::error!("Job '{}' failed: {}", self.info.name, error);
            // Child failures were recorded by the child itself.
            if !matches!(error, JobError::Child { .. }) {
                self.push_error(ErrorRecord::from_job_error(error, Some(&self.info.name)));
            }
        }

        self.advance(|state| match (state, &outcome) {
            (JobState::Stopping, _) => &[JobState::Stopped],
            (JobState::Running, Outcome::Succeeded) => &[JobState::Completed],
            (JobState::Running, Outcome::Stopped) => &[JobState::Stopping, JobState::Stopped],
            (JobState::Running, Outcome::Failed(_)) => &[JobState::Failed],
            _ => &[],
        });
    }

    /// Apply the path chosen by `decide` for the current state atomically.
    /// Returns whether any transition happened.
    fn advance(&self, decide: impl FnOnce(JobState) -> &'static [JobState]) -> bool {
        let mut steps = Vec::new();
        self.state.send_if_modified(|state| {
            for &next in decide(*state) {
                if !state.can_transition_to(next) {
                    break;
                }
                steps.push((*state, next));
                *state = next;
            }
            !steps.is_empty()
        });

        for &(from, to) in &steps {
            tracing::debug!("Job '{}' {} -> {}", self.info.name, from, to);
            let _ = self.events.send(JobEvent::StateChanged {
                job: self.id,
                from,
                to,
            });
        }
        if !steps.is_empty() {
            self.notify_changed();
        }
        !steps.is_empty()
    }

    fn add_child(self: &Arc<Self>, info: JobInfo) -> Arc<Job<T>> {
        let child = Self::build(info, self.cancel.child_token(), Some(self));
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&child));
        let _ = self.events.send(JobEvent::ChildAdded {
            parent: self.id,
            child: child.id,
            name: child.info.name.clone(),
        });
        child
    }

    fn notify_changed(&self) {
        self.changed.send_modify(|version| *version = version.wrapping_add(1));
        if let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) {
            parent.notify_changed();
        }
    }

    fn push_output(&self, item: T) {
        self.output.push(item);
        self.notify_changed();
    }

    fn push_progress(&self, record: ProgressRecord) {
        self.progress.push(record);
        self.notify_changed();
    }

    fn push_error(&self, record: ErrorRecord) {
        self.errors.push(record);
        self.notify_changed();
    }

    fn push_message(&self, stream: &JobStream<String>, message: String) {
        stream.push(message);
        self.notify_changed();
    }
}

/// Handle given to a job's work function for writing into the job.
pub struct JobContext<T> {
    job: Arc<Job<T>>,
}

impl<T> Clone for JobContext<T> {
    fn clone(&self) -> Self {
        Self {
            job: Arc::clone(&self.job),
        }
    }
}

impl<T> JobContext<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(job: Arc<Job<T>>) -> Self {
        Self { job }
    }

    pub fn job(&self) -> &Arc<Job<T>> {
        &self.job
    }

    pub fn write_object(&self, item: T) {
        self.job.push_output(item);
    }

    pub fn write_progress(&self, record: ProgressRecord) {
        self.job.push_progress(record);
    }

    pub fn write_error(&self, record: ErrorRecord) {
        tracing::warn!("Job '{}' error: {}", self.job.info.name, record);
        self.job.push_error(record);
    }

    pub fn write_verbose(&self, message: impl Into<String>) {
        self.job.push_message(&self.job.verbose, message.into());
    }

    pub fn write_debug(&self, message: impl Into<String>) {
        self.job.push_message(&self.job.debug, message.into());
    }

    pub fn set_result_code(&self, code: OperationResultCode) {
        *self
            .job
            .result_code
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    /// Create and start a child job with a token derived from this job's token.
    ///
    /// The parent does not wait for the child implicitly; await the returned
    /// task to make the parent's completion depend on it. A failed child
    /// surfaces as [`JobError::Child`], which the parent does not record again.
    pub fn start_child<R, F, Fut>(
        &self,
        info: JobInfo,
        work: F,
    ) -> Result<(Arc<Job<T>>, JobTask<R>), JobError>
    where
        F: FnOnce(JobContext<T>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<R, JobError>> + Send + 'static,
        R: Send + 'static,
    {
        let child = self.job.add_child(info);
        let mut task = child.start(work)?;
        task.child_name = Some(child.info.name.clone());
        Ok((child, task))
    }
}

/// Awaitable result of a job's work function.
#[must_use = "a JobTask does nothing unless awaited; drop it explicitly to detach"]
pub struct JobTask<R> {
    handle: JoinHandle<Result<R, JobError>>,
    child_name: Option<String>,
}

impl<R> JobTask<R> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<R> Future for JobTask<R> {
    type Output = Result<R, JobError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let joined = ready!(Pin::new(&mut this.handle).poll(cx));
        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(JobError::Panicked(e.to_string())),
            Err(_) => Err(JobError::Cancelled),
        };

        Poll::Ready(match (result, &this.child_name) {
            (Err(e), Some(name)) if !e.is_stop() => Err(JobError::Child {
                name: name.clone(),
                source: Box::new(e),
            }),
            (result, _) => result,
        })
    }
}
