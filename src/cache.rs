// Update cache - explicit, shared lookup of updates seen by searches
//
// Keyed by update id; a re-published update replaces the cached one only when
// its revision is at least as high.

use crate::jobs::take_until_cancelled;
use crate::models::Update;
use indexmap::IndexMap;
use std::sync::{PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct UpdateCache {
    updates: RwLock<IndexMap<Uuid, Update>>,
}

impl UpdateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `update` unless a higher revision is already cached.
    ///
    /// # Returns
    /// Whether the cache now holds this revision.
    pub fn set(&self, update: Update) -> bool {
        let mut updates = self.updates.write().unwrap_or_else(PoisonError::into_inner);
        match updates.get(&update.id()) {
            Some(cached) if cached.identity.revision > update.identity.revision => {
                tracing::debug!(
                    "Keeping revision {} of '{}' over {}",
                    cached.identity.revision,
                    cached.title,
                    update.identity.revision
                );
                false
            }
            _ => {
                updates.insert(update.id(), update);
                true
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Update> {
        self.updates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn list(&self) -> Vec<Update> {
        self.updates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.updates.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Titles starting with `prefix` (case-insensitive), in insertion order.
    ///
    /// Stops early once `token` is cancelled and returns what was matched so far.
    pub fn complete_titles(&self, prefix: &str, token: &CancellationToken) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let updates = self.updates.read().unwrap_or_else(PoisonError::into_inner);
        let matches = updates
            .values()
            .filter(|update| update.title.to_lowercase().starts_with(&prefix))
            .map(|update| update.title.clone());
        take_until_cancelled(matches, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_revision_wins() {
        let cache = UpdateCache::new();
        let v2 = Update::new("Cumulative Update").with_revision(2);
        let mut v1 = v2.clone().with_revision(1);
        v1.title = "Cumulative Update (old)".to_string();

        assert!(cache.set(v2.clone()));
        assert!(!cache.set(v1));
        assert_eq!(cache.get(v2.id()).unwrap().title, "Cumulative Update");

        let v3 = v2.clone().with_revision(3);
        assert!(cache.set(v3));
        assert_eq!(cache.get(v2.id()).unwrap().identity.revision, 3);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_complete_titles_prefix() {
        let cache = UpdateCache::new();
        cache.set(Update::new("Security Update for Windows"));
        cache.set(Update::new("Definition Update"));
        cache.set(Update::new("security intelligence"));

        let titles = cache.complete_titles("SECURITY", &CancellationToken::new());
        assert_eq!(
            titles,
            vec!["Security Update for Windows", "security intelligence"]
        );
    }

    #[test]
    fn test_complete_titles_after_timeout_is_empty() {
        let cache = UpdateCache::new();
        cache.set(Update::new("KB1"));
        let token = CancellationToken::new();
        token.cancel();
        assert!(cache.complete_titles("KB", &token).is_empty());
    }
}
