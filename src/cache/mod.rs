//! Result cache: key derivation, an in-memory hot tier, the SQLite store and
//! the single-flight refresh coordinator, composed by [`CacheService`].
//!
//! Reads apply stale-while-revalidate: an entry past `stale_after` but before
//! `expires_at` is still returned, and one background refresh is scheduled
//! for its key. Store failures degrade to misses and are only logged.

pub mod hot;
pub mod key;
pub mod refresh;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::StoreError;
use crate::freshness::FreshnessMetadata;
use crate::style::Style;

use self::hot::HotCache;
use self::key::{normalize_text, CacheKey};
use self::refresh::{RefreshCoordinator, RefreshJob};
use self::sqlite::SqliteStore;

/// Longest source text, in characters, the cache (and pipeline) accepts.
pub const MAX_TEXT_CHARS: usize = 5000;

/// Per-entry metadata, persisted as JSON and replayed on refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMeta {
    pub use_latest_slang: bool,
    pub context: Option<String>,
    pub freshness: Option<FreshnessMetadata>,
    pub refreshed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub source_text: String,
    pub from_style: Style,
    pub to_style: Style,
    pub output_text: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    pub meta: EntryMeta,
}

/// Row counts by freshness at the moment of the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: u64,
    pub expired: u64,
    pub stale: u64,
    pub fresh: u64,
}

/// A valid (unexpired) cache entry as seen by a reader.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: CacheEntry,
    pub age_ms: i64,
    pub stale: bool,
    /// True when this read is the one that scheduled the refresh.
    pub refresh_scheduled: bool,
}

pub struct CacheService {
    store: SqliteStore,
    hot: Option<HotCache>,
    refresh: Arc<RefreshCoordinator>,
    clock: Arc<dyn Clock>,
    ttl_ms: i64,
    stale_after_ms: i64,
    refresh_workers: usize,
}

impl CacheService {
    pub fn new(store: SqliteStore, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hot: HotCache::new(config.hot_capacity),
            refresh: Arc::new(RefreshCoordinator::new(config.refresh_queue)),
            clock,
            ttl_ms: config.ttl_ms(),
            stale_after_ms: config.stale_after_ms(),
            refresh_workers: config.refresh_workers.max(1),
        }
    }

    /// Configured size of the refresh worker pool.
    pub fn refresh_workers(&self) -> usize {
        self.refresh_workers
    }

    pub fn refresh_coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.refresh
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Look up a translation. Only unexpired entries are returned; a stale
    /// one also schedules a background refresh if none is in flight.
    pub fn get(&self, from: Style, to: Style, text: &str) -> Option<CacheHit> {
        self.get_by_key(&CacheKey::compute(from, to, text))
    }

    pub fn get_by_key(&self, key: &CacheKey) -> Option<CacheHit> {
        let now = self.clock.now_ms();
        let entry = self.lookup(key, now)?;

        let age_ms = now - entry.created_at_ms;
        let stale = age_ms > self.stale_after_ms;
        let refresh_scheduled = stale
            && self.refresh.try_schedule(RefreshJob {
                key: entry.key,
                from: entry.from_style,
                to: entry.to_style,
                source_text: entry.source_text.clone(),
                meta: entry.meta.clone(),
                created_at_ms: entry.created_at_ms,
            });

        debug!(key = %key, age_ms, stale, refresh_scheduled, "cache hit");
        Some(CacheHit {
            entry,
            age_ms,
            stale,
            refresh_scheduled,
        })
    }

    fn lookup(&self, key: &CacheKey, now: i64) -> Option<CacheEntry> {
        if let Some(entry) = self.hot.as_ref().and_then(|hot| hot.get(key, now)) {
            return Some(entry);
        }

        let entry = match self.store.get(key) {
            Ok(Some(entry)) if entry.expires_at_ms > now => entry,
            Ok(_) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        if let Some(hot) = &self.hot {
            hot.insert(entry.clone());
        }
        Some(entry)
    }

    /// Store a translation. Returns false (and stores nothing) when the text
    /// is empty or too long, or the output is empty. A store failure is
    /// logged; the entry then lives only in the hot tier, if any.
    pub fn set(&self, from: Style, to: Style, text: &str, output: &str, meta: EntryMeta) -> bool {
        match self.try_set(from, to, text, output, meta) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(from = %from, to = %to, error = %e, "cache write failed");
                self.hot.is_some()
            }
        }
    }

    /// Like [`set`](Self::set) but reports a failed persistent write.
    pub fn try_set(
        &self,
        from: Style,
        to: Style,
        text: &str,
        output: &str,
        meta: EntryMeta,
    ) -> Result<bool, StoreError> {
        let Some(entry) = self.build_entry(from, to, text, output, meta) else {
            debug!(from = %from, to = %to, "cache set rejected");
            return Ok(false);
        };

        let persisted = self.store.upsert(&entry);
        if let Some(hot) = &self.hot {
            hot.insert(entry);
        }
        persisted.map(|()| true)
    }

    /// Store a refreshed translation over the entry `job` was taken from.
    /// Returns false, writing nothing, when that entry has since been
    /// invalidated, expired away or overwritten.
    pub fn try_replace(
        &self,
        job: &RefreshJob,
        output: &str,
        meta: EntryMeta,
    ) -> Result<bool, StoreError> {
        let Some(entry) = self.build_entry(job.from, job.to, &job.source_text, output, meta) else {
            return Ok(false);
        };
        let replaced = self.store.replace_if_created(&entry, job.created_at_ms)?;
        // Readers back-fill the new row; never re-insert into the hot tier
        // here or a concurrent invalidate could be undone.
        if let Some(hot) = &self.hot {
            hot.remove(&entry.key);
        }
        if !replaced {
            debug!(key = %entry.key, "entry changed during refresh, result dropped");
        }
        Ok(replaced)
    }

    fn build_entry(
        &self,
        from: Style,
        to: Style,
        text: &str,
        output: &str,
        meta: EntryMeta,
    ) -> Option<CacheEntry> {
        let source_text = normalize_text(text);
        if source_text.is_empty()
            || text.chars().count() > MAX_TEXT_CHARS
            || output.trim().is_empty()
        {
            return None;
        }

        let now = self.clock.now_ms();
        Some(CacheEntry {
            key: CacheKey::compute(from, to, &source_text),
            source_text,
            from_style: from,
            to_style: to,
            output_text: output.to_string(),
            created_at_ms: now,
            expires_at_ms: now + self.ttl_ms,
            meta,
        })
    }

    /// Delete one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        // Store first: a refresh that lost the row cannot repopulate either tier.
        let in_store = self.store.delete(key).unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "cache delete failed");
            false
        });
        let in_hot = self.hot.as_ref().is_some_and(|hot| hot.remove(key));
        let existed = in_hot || in_store;
        info!(key = %key, existed, "cache entry invalidated");
        existed
    }

    pub fn invalidate_text(&self, from: Style, to: Style, text: &str) -> bool {
        self.invalidate(&CacheKey::compute(from, to, text))
    }

    /// Remove every entry with `expires_at <= now`.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let hot_removed = self.hot.as_ref().map_or(0, |hot| hot.purge_expired(now));
        let removed = match self.store.delete_expired(now) {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "cache cleanup failed");
                hot_removed
            }
        };
        if removed > 0 {
            info!(removed, "expired cache entries removed");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        self.store
            .stats(now, now - self.stale_after_ms)
            .unwrap_or_else(|e| {
                warn!(error = %e, "cache stats failed");
                CacheStats::default()
            })
    }

    /// Run `cleanup_expired` every `interval` until the refresh coordinator
    /// shuts down.
    pub fn spawn_cleanup_loop(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let shutdown = self.refresh.shutdown_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; startup cleanup is separate.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.cleanup_expired();
                    }
                }
            }
            debug!("cache cleanup loop exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    fn service(hot_capacity: usize) -> (CacheService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config = CacheConfig {
            hot_capacity,
            ..CacheConfig::default()
        };
        let store = SqliteStore::open_in_memory().unwrap();
        (CacheService::new(store, &config, clock.clone()), clock)
    }

    #[test]
    fn set_then_get_round_trips() {
        for capacity in [0, 16] {
            let (cache, _) = service(capacity);
            assert!(cache.set(Style::Standard, Style::Formal, "hi there", "Good day.", EntryMeta::default()));
            let hit = cache.get(Style::Standard, Style::Formal, "  hi   there ").unwrap();
            assert_eq!(hit.entry.output_text, "Good day.");
            assert_eq!(hit.entry.source_text, "hi there");
            assert!(!hit.stale);
            assert_eq!(hit.entry.expires_at_ms - hit.entry.created_at_ms, 30 * DAY.as_millis() as i64);
        }
    }

    #[test]
    fn set_rejects_bad_input() {
        let (cache, _) = service(16);
        assert!(!cache.set(Style::Standard, Style::Formal, "   ", "x", EntryMeta::default()));
        assert!(!cache.set(Style::Standard, Style::Formal, "hi", " ", EntryMeta::default()));
        let long = "a".repeat(MAX_TEXT_CHARS + 1);
        assert!(!cache.set(Style::Standard, Style::Formal, &long, "x", EntryMeta::default()));
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn expired_entries_are_never_returned() {
        for capacity in [0, 16] {
            let (cache, clock) = service(capacity);
            cache.set(Style::Standard, Style::Formal, "hi", "Hello.", EntryMeta::default());
            clock.advance(DAY * 30);
            assert!(cache.get(Style::Standard, Style::Formal, "hi").is_none());

            let stats = cache.stats();
            assert_eq!((stats.total, stats.expired), (1, 1));
            assert_eq!(cache.cleanup_expired(), 1);
            assert_eq!(cache.stats().total, 0);
        }
    }

    #[test]
    fn stale_read_schedules_exactly_one_refresh() {
        let (cache, clock) = service(16);
        cache.set(Style::Standard, Style::TrendSlang, "hello", "heyyy", EntryMeta::default());
        clock.advance(DAY * 8);

        let first = cache.get(Style::Standard, Style::TrendSlang, "hello").unwrap();
        let second = cache.get(Style::Standard, Style::TrendSlang, "hello").unwrap();
        assert!(first.stale && second.stale);
        assert!(first.refresh_scheduled);
        assert!(!second.refresh_scheduled);
        assert_eq!(second.entry.output_text, "heyyy");
        assert_eq!(cache.refresh_coordinator().in_flight_len(), 1);
        assert_eq!(cache.stats().stale, 1);
    }

    #[test]
    fn fresh_read_schedules_nothing() {
        let (cache, clock) = service(16);
        cache.set(Style::Standard, Style::TrendSlang, "hello", "heyyy", EntryMeta::default());
        clock.advance(DAY * 6);
        let hit = cache.get(Style::Standard, Style::TrendSlang, "hello").unwrap();
        assert!(!hit.stale && !hit.refresh_scheduled);
        assert!(hit.age_ms > 0);
        assert_eq!(cache.refresh_coordinator().in_flight_len(), 0);
    }

    #[test]
    fn invalidate_reports_existence() {
        let (cache, _) = service(16);
        assert!(!cache.invalidate_text(Style::Standard, Style::Formal, "hi"));
        cache.set(Style::Standard, Style::Formal, "hi", "Hello.", EntryMeta::default());
        let key = CacheKey::compute(Style::Standard, Style::Formal, "hi");
        assert!(cache.invalidate(&key));
        assert!(cache.get_by_key(&key).is_none());
        assert!(!cache.invalidate(&key));
    }

    #[test]
    fn store_hit_backfills_hot_tier() {
        let (cache, _) = service(16);
        let entry = CacheEntry {
            key: CacheKey::compute(Style::Standard, Style::French, "thanks"),
            source_text: "thanks".into(),
            from_style: Style::Standard,
            to_style: Style::French,
            output_text: "merci".into(),
            created_at_ms: cache.clock().now_ms(),
            expires_at_ms: cache.clock().now_ms() + 1000,
            meta: EntryMeta::default(),
        };
        cache.store.upsert(&entry).unwrap();
        assert!(cache.hot.as_ref().unwrap().is_empty());
        assert!(cache.get_by_key(&entry.key).is_some());
        assert_eq!(cache.hot.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn worker_count_comes_from_config() {
        let clock = Arc::new(ManualClock::new(0));
        for (configured, expected) in [(3, 3), (0, 1)] {
            let config = CacheConfig {
                refresh_workers: configured,
                ..CacheConfig::default()
            };
            let cache = CacheService::new(SqliteStore::open_in_memory().unwrap(), &config, clock.clone());
            assert_eq!(cache.refresh_workers(), expected);
        }
    }

    #[test]
    fn replace_only_overwrites_the_snapshotted_entry() {
        let (cache, clock) = service(16);
        cache.set(Style::Standard, Style::TrendSlang, "hello", "heyyy", EntryMeta::default());
        clock.advance(DAY * 8);
        let stale = cache.get(Style::Standard, Style::TrendSlang, "hello").unwrap();
        let job = RefreshJob {
            key: stale.entry.key,
            from: Style::Standard,
            to: Style::TrendSlang,
            source_text: stale.entry.source_text.clone(),
            meta: EntryMeta::default(),
            created_at_ms: stale.entry.created_at_ms,
        };

        assert!(cache.try_replace(&job, "hiii", EntryMeta::default()).unwrap());
        let hit = cache.get_by_key(&job.key).unwrap();
        assert_eq!(hit.entry.output_text, "hiii");
        assert_eq!(hit.age_ms, 0);

        // The snapshot no longer matches the stored row.
        assert!(!cache.try_replace(&job, "yo", EntryMeta::default()).unwrap());
        assert_eq!(cache.get_by_key(&job.key).unwrap().entry.output_text, "hiii");

        assert!(cache.invalidate(&job.key));
        assert!(!cache.try_replace(&job, "yo", EntryMeta::default()).unwrap());
        assert!(cache.get_by_key(&job.key).is_none());
    }

    #[tokio::test]
    async fn cleanup_loop_stops_on_shutdown() {
        let (cache, _) = service(16);
        let cache = Arc::new(cache);
        let handle = cache.spawn_cleanup_loop(Duration::from_millis(10));
        cache.refresh_coordinator().shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cleanup loop did not stop")
            .unwrap();
    }
}
