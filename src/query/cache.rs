//! Query result cache with TTL and LRU eviction

use super::{QueryScope, TimeWindow};
use crate::models::SampleEvent;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Content hash of everything that determines a query's result
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(scope: &QueryScope, query: &str, window: &TimeWindow, limit: u32) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            scope.as_str().as_bytes(),
            query.as_bytes(),
            window.start.to_rfc3339().as_bytes(),
            window.end.to_rfc3339().as_bytes(),
            limit.to_string().as_bytes(),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

struct CachedResult {
    events: Arc<Vec<SampleEvent>>,
    created_at: Instant,
}

/// Thread-safe cache shared by every worker of a batch
pub struct QueryCache {
    entries: Mutex<LruCache<CacheKey, CachedResult>>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh entry. Expired entries are dropped on access.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<SampleEvent>>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(cached) if cached.created_at.elapsed() < self.ttl => {
                return Some(Arc::clone(&cached.events));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            debug!("Evicting expired cache entry {}", key.as_str());
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: CacheKey, events: Arc<Vec<SampleEvent>>) {
        let mut entries = self.entries.lock();
        entries.put(
            key,
            CachedResult {
                events,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop an entry whose backing data is known to have changed
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_key_includes_scope() {
        let a = CacheKey::new(&QueryScope::new("tenant-a"), "parser = 'x'", &window(), 50);
        let b = CacheKey::new(&QueryScope::new("tenant-b"), "parser = 'x'", &window(), 50);
        let a2 = CacheKey::new(&QueryScope::new("tenant-a"), "parser = 'x'", &window(), 50);
        assert_ne!(a, b);
        assert_eq!(a, a2);
        assert_eq!(a.as_str().len(), 64);

        let limited = CacheKey::new(&QueryScope::new("tenant-a"), "parser = 'x'", &window(), 10);
        assert_ne!(a, limited);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = QueryCache::new(4, Duration::from_millis(0));
        let key = CacheKey::new(&QueryScope::new("t"), "q", &window(), 1);
        cache.insert(key.clone(), Arc::new(vec![]));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_entry() {
        let cache = QueryCache::new(4, Duration::from_secs(60));
        let key = CacheKey::new(&QueryScope::new("t"), "q", &window(), 1);
        cache.insert(key.clone(), Arc::new(vec![]));
        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = QueryCache::new(2, Duration::from_secs(60));
        let keys: Vec<CacheKey> = (0..3)
            .map(|i| CacheKey::new(&QueryScope::new("t"), &format!("q{}", i), &window(), 1))
            .collect();

        cache.insert(keys[0].clone(), Arc::new(vec![]));
        cache.insert(keys[1].clone(), Arc::new(vec![]));
        assert!(cache.get(&keys[0]).is_some());
        cache.insert(keys[2].clone(), Arc::new(vec![]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_some());
        assert!(cache.get(&keys[1]).is_none());
    }
}
