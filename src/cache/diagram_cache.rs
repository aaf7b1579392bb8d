use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of rendered diagrams kept in memory
pub const DEFAULT_CAPACITY: usize = 256;

/// Thread-safe LRU cache of rendered Mermaid diagrams
///
/// Entries are keyed by filename and remember the content hash they were
/// rendered from; a lookup with a different hash is a miss, so re-indexed
/// workflows never serve a stale diagram.
pub struct DiagramCache {
    cache: Mutex<LruCache<String, (String, String)>>,
}

impl DiagramCache {
    /// Create a new diagram cache; a capacity of 0 is raised to 1
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, (String, String)>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached diagram for `filename`, if it was rendered from `file_hash`
    pub fn get(&self, filename: &str, file_hash: &str) -> Option<String> {
        let mut cache = self.lock();
        match cache.get(filename) {
            Some((hash, diagram)) if hash == file_hash => Some(diagram.clone()),
            Some(_) => {
                cache.pop(filename);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, filename: String, file_hash: String, diagram: String) {
        self.lock().put(filename, (file_hash, diagram));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for DiagramCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_put_and_get() {
        let cache = DiagramCache::new(10);
        cache.put("a.json".into(), "h1".into(), "graph TD".into());

        assert_eq!(cache.get("a.json", "h1").as_deref(), Some("graph TD"));
        assert!(cache.get("b.json", "h1").is_none());
    }

    #[test]
    fn test_stale_hash_is_a_miss() {
        let cache = DiagramCache::new(10);
        cache.put("a.json".into(), "h1".into(), "old".into());

        assert!(cache.get("a.json", "h2").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_eviction() {
        let cache = DiagramCache::new(2);
        cache.put("a".into(), "h".into(), "A".into());
        cache.put("b".into(), "h".into(), "B".into());
        cache.put("c".into(), "h".into(), "C".into());

        assert!(cache.get("a", "h").is_none());
        assert!(cache.get("b", "h").is_some());
        assert!(cache.get("c", "h").is_some());
    }

    #[test]
    fn test_zero_capacity_and_clear() {
        let cache = DiagramCache::new(0);
        cache.put("a".into(), "h".into(), "A".into());
        cache.put("b".into(), "h".into(), "B".into());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b", "h").as_deref(), Some("B"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
