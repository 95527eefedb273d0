// Job registry for background ("as job") mode
//
// Commands that return immediately add their root job here; consumers look it
// up later to watch, receive from, stop or remove it.

use crate::error::RegistryError;
use crate::jobs::Job;
use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Insertion-ordered registry of root jobs.
pub struct JobRegistry<T> {
    jobs: RwLock<IndexMap<Uuid, Arc<Job<T>>>>,
}

impl<T> JobRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(IndexMap::new()),
        }
    }

    pub fn add(&self, job: Arc<Job<T>>) {
        tracing::info!("Registered job '{}' ({})", job.name(), job.id());
        self.write().insert(job.id(), job);
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<Job<T>>> {
        self.read().get(&id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Vec<Arc<Job<T>>> {
        self.read()
            .values()
            .filter(|job| job.name() == name)
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<Arc<Job<T>>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove a finished job. Running jobs must be stopped first.
    pub fn remove(&self, id: Uuid) -> Result<Arc<Job<T>>, RegistryError> {
        let mut jobs = self.write();
        let job = jobs.get(&id).ok_or(RegistryError::NotFound(id))?;
        if !job.is_finished() {
            return Err(RegistryError::StillRunning {
                id,
                state: job.state(),
            });
        }
        jobs.shift_remove(&id).ok_or(RegistryError::NotFound(id))
    }

    /// Request a stop on every registered job.
    pub fn stop_all(&self) {
        for job in self.list() {
            if !job.is_finished() {
                tracing::info!("Stopping job '{}' ({})", job.name(), job.id());
                job.stop();
            }
        }
    }

    /// Drop jobs that are finished and fully drained. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.is_finished() && !job.has_more_data()));
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::debug!("Pruned {} finished job(s)", removed);
        }
        removed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<Uuid, Arc<Job<T>>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<Uuid, Arc<Job<T>>>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for JobRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
