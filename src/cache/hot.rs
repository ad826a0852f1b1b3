//! In-memory LRU hot tier in front of the SQLite store.
//! Holds full entries so expiry and staleness are judged on the entry's own
//! timestamps, exactly as for persisted rows.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use super::key::CacheKey;
use super::CacheEntry;

pub struct HotCache {
    inner: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl HotCache {
    /// Returns `None` when `capacity` is zero (hot tier disabled).
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Look up an entry. Expired entries are evicted and not returned.
    pub fn get(&self, key: &CacheKey, now_ms: i64) -> Option<CacheEntry> {
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(key) {
            if entry.expires_at_ms > now_ms {
                return Some(entry.clone());
            }
            cache.pop(key);
        }
        None
    }

    pub fn insert(&self, entry: CacheEntry) {
        self.inner.lock().put(entry.key, entry);
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.inner.lock().pop(key).is_some()
    }

    /// Drop every entry with `expires_at <= now`. Returns how many went.
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let mut cache = self.inner.lock();
        let expired: Vec<CacheKey> = cache
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms <= now_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
