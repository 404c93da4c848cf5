// list_cache.rs — Cached episode listings, one per work.
//
// Listing views read through this cache. Anything that changes an episode's
// visible state (publishing, mostly) invalidates the work's entry so the next
// read refetches.

use std::collections::HashMap;

use crate::backend::{BackendError, EpisodeBackend};
use crate::episode::{Episode, WorkId};

#[derive(Debug, Default)]
pub struct EpisodeListCache {
    lists: HashMap<WorkId, Vec<Episode>>,
}

impl EpisodeListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached listing, fetching it on a miss.
    pub fn get_or_fetch(
        &mut self,
        backend: &dyn EpisodeBackend,
        work_id: WorkId,
    ) -> Result<&[Episode], BackendError> {
        if !self.lists.contains_key(&work_id) {
            let mut episodes = backend.list_episodes(work_id)?;
            episodes.sort_by_key(|e| e.order);
            self.lists.insert(work_id, episodes);
        }
        Ok(self.lists.get(&work_id).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn get(&self, work_id: WorkId) -> Option<&[Episode]> {
        self.lists.get(&work_id).map(Vec::as_slice)
    }

    /// Drop the cached listing for a work. Returns whether one was cached.
    pub fn invalidate(&mut self, work_id: WorkId) -> bool {
        let removed = self.lists.remove(&work_id).is_some();
        if removed {
            tracing::debug!(work_id = %work_id, "episode list cache invalidated");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.lists.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::EpisodeId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        list_calls: AtomicUsize,
    }

    impl EpisodeBackend for CountingBackend {
        fn get_episode(&self, _: WorkId, _: EpisodeId) -> Result<Episode, BackendError> {
            Err(BackendError::Transport("unused".into()))
        }

        fn update_episode(&self, _: WorkId, _: EpisodeId, _: &str) -> Result<(), BackendError> {
            Ok(())
        }

        fn list_episodes(&self, work_id: WorkId) -> Result<Vec<Episode>, BackendError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut second = Episode::new(work_id, EpisodeId(2), "2화", "");
            second.order = 2;
            let mut first = Episode::new(work_id, EpisodeId(1), "1화", "");
            first.order = 1;
            Ok(vec![second, first])
        }
    }

    #[test]
    fn listing_is_fetched_once_and_sorted() {
        let backend = CountingBackend::default();
        let mut cache = EpisodeListCache::new();

        let ids: Vec<_> = cache
            .get_or_fetch(&backend, WorkId(1))
            .unwrap()
            .iter()
            .map(|e| e.episode_id)
            .collect();
        assert_eq!(ids, vec![EpisodeId(1), EpisodeId(2)]);

        cache.get_or_fetch(&backend, WorkId(1)).unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_refetch() {
        let backend = CountingBackend::default();
        let mut cache = EpisodeListCache::new();
        cache.get_or_fetch(&backend, WorkId(1)).unwrap();

        assert!(cache.invalidate(WorkId(1)));
        assert!(!cache.invalidate(WorkId(1)));
        assert!(cache.get(WorkId(1)).is_none());

        cache.get_or_fetch(&backend, WorkId(1)).unwrap();
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
    }
}
