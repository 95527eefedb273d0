//! Host surface and its asynchronous adapter.
//!
//! [`Host`] is the thread-affine sink a command surface provides. [`HostContext`]
//! wraps each host method in a [`WorkSender::enqueue`] call so async code can
//! await host interaction without ever touching the host directly.

use crate::error::HostError;
use crate::models::{ErrorRecord, ProgressRecord};
use crate::pump::{PendingWork, WorkSender};
use std::sync::{Arc, Mutex, PoisonError};

/// Answer to a yes/no confirmation that can also apply to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShouldContinue {
    Yes,
    No,
    YesToAll,
    NoToAll,
}

impl ShouldContinue {
    pub fn is_yes(self) -> bool {
        matches!(self, Self::Yes | Self::YesToAll)
    }

    fn is_sticky(self) -> bool {
        matches!(self, Self::YesToAll | Self::NoToAll)
    }
}

/// Single-threaded host surface.
///
/// Implementations need not be `Send`: the pump guarantees every call happens
/// on the thread that owns the host.
pub trait Host {
    type Item;

    fn write_object(&mut self, item: Self::Item) -> Result<(), HostError>;
    fn write_progress(&mut self, record: ProgressRecord) -> Result<(), HostError>;
    fn write_error(&mut self, record: ErrorRecord) -> Result<(), HostError>;
    fn write_warning(&mut self, message: &str) -> Result<(), HostError>;
    fn write_verbose(&mut self, message: &str) -> Result<(), HostError>;
    fn write_debug(&mut self, message: &str) -> Result<(), HostError>;

    /// Ask whether `action` should be performed on `target`.
    fn should_process(&mut self, target: &str, action: &str) -> Result<bool, HostError>;

    /// Ask a free-form confirmation question.
    fn should_continue(&mut self, query: &str, caption: &str) -> Result<ShouldContinue, HostError>;
}

/// Async Host Adapter handed to pumped work.
///
/// Every method returns a future that resolves after the host call has run on
/// the host thread. Calls are serialized with each other and with the pump loop.
pub struct HostContext<H> {
    sender: WorkSender<H>,
    remembered: Arc<Mutex<Option<ShouldContinue>>>,
}

impl<H> Clone for HostContext<H> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            remembered: Arc::clone(&self.remembered),
        }
    }
}

impl<H: 'static> HostContext<H> {
    pub fn new(sender: WorkSender<H>) -> Self {
        Self {
            sender,
            remembered: Arc::new(Mutex::new(None)),
        }
    }

    /// Run an arbitrary closure against the host.
    pub fn invoke<T, F>(&self, action: F) -> PendingWork<T>
    where
        F: FnOnce(&mut H) -> Result<T, HostError> + Send + 'static,
        T: Send + 'static,
    {
        self.sender.enqueue(action)
    }
}

impl<H> HostContext<H>
where
    H: Host + 'static,
    H::Item: Send + 'static,
{
    pub fn write_object(&self, item: H::Item) -> PendingWork<()> {
        self.invoke(move |host| host.write_object(item))
    }

    pub fn write_progress(&self, record: ProgressRecord) -> PendingWork<()> {
        self.invoke(move |host| host.write_progress(record))
    }

    pub fn write_error(&self, record: ErrorRecord) -> PendingWork<()> {
        self.invoke(move |host| host.write_error(record))
    }

    pub fn write_warning(&self, message: impl Into<String>) -> PendingWork<()> {
        let message = message.into();
        self.invoke(move |host| host.write_warning(&message))
    }

    pub fn write_verbose(&self, message: impl Into<String>) -> PendingWork<()> {
        let message = message.into();
        self.invoke(move |host| host.write_verbose(&message))
    }

    pub fn write_debug(&self, message: impl Into<String>) -> PendingWork<()> {
        let message = message.into();
        self.invoke(move |host| host.write_debug(&message))
    }

    pub fn should_process(
        &self,
        target: impl Into<String>,
        action: impl Into<String>,
    ) -> PendingWork<bool> {
        let (target, action) = (target.into(), action.into());
        self.invoke(move |host| host.should_process(&target, &action))
    }

    /// Ask for confirmation. A previous YesToAll or NoToAll answer from this
    /// context (or a clone of it) is returned without asking again.
    pub async fn should_continue(
        &self,
        query: impl Into<String>,
        caption: impl Into<String>,
    ) -> Result<ShouldContinue, HostError> {
        if let Some(answer) = *self.remembered.lock().unwrap_or_else(PoisonError::into_inner) {
            return Ok(answer);
        }

        let (query, caption) = (query.into(), caption.into());
        let answer = self
            .invoke(move |host| host.should_continue(&query, &caption))
            .await?;

        if answer.is_sticky() {
            *self.remembered.lock().unwrap_or_else(PoisonError::into_inner) = Some(answer);
        }
        Ok(answer)
    }
}
