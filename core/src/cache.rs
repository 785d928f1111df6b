//! Memo of recent query results.
//!
//! Entries are stamped with the store generation they were computed against;
//! any ingest or remove makes them unreachable.

use crate::config::CacheConfig;
use crate::search::SearchResults;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Trimmed query text, not folded.
    pub text: String,
    pub tags: Vec<String>,
    pub top_k: usize,
}

struct Entry {
    generation: u64,
    stored_at: Instant,
    results: SearchResults,
}

pub struct QueryCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self { entries: Mutex::new(LruCache::new(capacity)), ttl: Duration::from_secs(config.ttl_secs) }
    }

    pub fn get(&self, key: &CacheKey, generation: u64) -> Option<SearchResults> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(e) => e.generation == generation && e.stored_at.elapsed() < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(key).map(|e| e.results.clone())
        } else {
            entries.pop(key);
            None
        }
    }

    pub fn put(&self, key: CacheKey, generation: u64, results: SearchResults) {
        self.entries.lock().put(key, Entry { generation, stored_at: Instant::now(), results });
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.lock().pop(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> CacheKey {
        CacheKey { text: text.into(), tags: vec![], top_k: 10 }
    }

    fn results(total: usize) -> SearchResults {
        SearchResults { total_hits: total, hits: vec![] }
    }

    #[test]
    fn hit_requires_same_generation() {
        let cache = QueryCache::new(&CacheConfig::default());
        cache.put(key("squat"), 3, results(1));
        assert_eq!(cache.get(&key("squat"), 3).unwrap().total_hits, 1);
        assert!(cache.get(&key("squat"), 4).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_entries_miss() {
        let cache = QueryCache::new(&CacheConfig { ttl_secs: 0, ..CacheConfig::default() });
        cache.put(key("squat"), 0, results(1));
        assert!(cache.get(&key("squat"), 0).is_none());
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = QueryCache::new(&CacheConfig { capacity: 1, ..CacheConfig::default() });
        cache.put(key("a"), 0, results(1));
        cache.put(key("b"), 0, results(2));
        assert!(cache.get(&key("a"), 0).is_none());
        assert!(cache.get(&key("b"), 0).is_some());
    }

    #[test]
    fn clear_and_invalidate() {
        let cache = QueryCache::new(&CacheConfig::default());
        cache.put(key("a"), 0, results(1));
        cache.put(key("b"), 0, results(1));
        cache.invalidate(&key("a"));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
