use std::sync::{Mutex, PoisonError};

struct Buffer<T> {
    items: Vec<T>,
    read: usize,
}

/// Append-only, thread-safe sequence owned by a job.
///
/// Any number of producers may push; one consumer reads incrementally with
/// [`read_new`](Self::read_new). Items are kept after they are read so the job
/// can still be inspected once it is finished.
pub struct JobStream<T> {
    inner: Mutex<Buffer<T>>,
}

impl<T: Clone> JobStream<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Buffer {
                items: Vec::new(),
                read: 0,
            }),
        }
    }

    pub(crate) fn push(&self, item: T) {
        self.lock().items.push(item);
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Every item appended so far, read or not.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    /// Items appended since the previous `read_new`.
    pub fn read_new(&self) -> Vec<T> {
        let mut buffer = self.lock();
        let fresh = buffer.items[buffer.read..].to_vec();
        buffer.read = buffer.items.len();
        fresh
    }

    pub fn has_unread(&self) -> bool {
        let buffer = self.lock();
        buffer.read < buffer.items.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffer<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for JobStream<T> {
    fn default() -> Self {
        Self::new()
    }
}
