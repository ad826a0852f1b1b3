//! Persistent result store backed by SQLite.
//! One row per cache key; expiry is an absolute epoch-ms column indexed for
//! cleanup. Upserts are last-writer-wins.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::key::CacheKey;
use super::{CacheEntry, CacheStats, EntryMeta};
use crate::error::StoreError;
use crate::style::Style;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS translation_cache (
        cache_key BLOB PRIMARY KEY,
        source_text TEXT NOT NULL,
        from_style TEXT NOT NULL,
        to_style TEXT NOT NULL,
        output_text TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        expires_at INTEGER NOT NULL,
        meta_json TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cache_expires
        ON translation_cache(expires_at);";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the cache database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), "result store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and ephemeral services.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch a row regardless of expiry; the caller judges freshness.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT cache_key, source_text, from_style, to_style, output_text,
                        created_at, expires_at, meta_json
                 FROM translation_cache WHERE cache_key = ?1",
                params![key.as_bytes().as_slice()],
                read_row,
            )
            .optional()?;

        match row {
            Some((entry, meta_json)) => {
                let meta: EntryMeta = serde_json::from_str(&meta_json)?;
                Ok(Some(CacheEntry { meta, ..entry }))
            }
            None => Ok(None),
        }
    }

    pub fn upsert(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        let meta_json = serde_json::to_string(&entry.meta)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO translation_cache
             (cache_key, source_text, from_style, to_style, output_text,
              created_at, expires_at, meta_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.key.as_bytes().as_slice(),
                entry.source_text,
                entry.from_style.as_str(),
                entry.to_style.as_str(),
                entry.output_text,
                entry.created_at_ms,
                entry.expires_at_ms,
                meta_json,
            ],
        )?;
        debug!(key = %entry.key, "result stored");
        Ok(())
    }

    /// Overwrite the row for `entry.key` only if it still carries
    /// `expected_created_at_ms`. Returns whether a row was replaced.
    pub fn replace_if_created(
        &self,
        entry: &CacheEntry,
        expected_created_at_ms: i64,
    ) -> Result<bool, StoreError> {
        let meta_json = serde_json::to_string(&entry.meta)?;
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE translation_cache
             SET output_text = ?1, created_at = ?2, expires_at = ?3, meta_json = ?4
             WHERE cache_key = ?5 AND created_at = ?6",
            params![
                entry.output_text,
                entry.created_at_ms,
                entry.expires_at_ms,
                meta_json,
                entry.key.as_bytes().as_slice(),
                expected_created_at_ms,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Returns whether a row existed.
    pub fn delete(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM translation_cache WHERE cache_key = ?1",
            params![key.as_bytes().as_slice()],
        )?;
        Ok(removed > 0)
    }

    pub fn delete_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM translation_cache WHERE expires_at <= ?1",
            params![now_ms],
        )?;
        Ok(removed)
    }

    /// Classify every row against `now_ms`. A valid row created before
    /// `stale_cutoff_ms` counts as stale.
    pub fn stats(&self, now_ms: i64, stale_cutoff_ms: i64) -> Result<CacheStats, StoreError> {
        let conn = self.conn.lock();
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN expires_at > ?1 AND created_at < ?2 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN expires_at > ?1 AND created_at >= ?2 THEN 1 ELSE 0 END), 0)
             FROM translation_cache",
            params![now_ms, stale_cutoff_ms],
            |row| {
                Ok(CacheStats {
                    total: row.get::<_, i64>(0)? as u64,
                    expired: row.get::<_, i64>(1)? as u64,
                    stale: row.get::<_, i64>(2)? as u64,
                    fresh: row.get::<_, i64>(3)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<(CacheEntry, String)> {
    let key_bytes: Vec<u8> = row.get(0)?;
    let key: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(0, "cache_key".into(), Type::Blob))?;
    let entry = CacheEntry {
        key: CacheKey::from_bytes(key),
        source_text: row.get(1)?,
        from_style: read_style(row, 2)?,
        to_style: read_style(row, 3)?,
        output_text: row.get(4)?,
        created_at_ms: row.get(5)?,
        expires_at_ms: row.get(6)?,
        meta: EntryMeta::default(),
    };
    Ok((entry, row.get(7)?))
}

fn read_style(row: &Row<'_>, idx: usize) -> rusqlite::Result<Style> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, created: i64, expires: i64) -> CacheEntry {
        CacheEntry {
            key: CacheKey::compute(Style::Standard, Style::TrendSlang, text),
            source_text: text.into(),
            from_style: Style::Standard,
            to_style: Style::TrendSlang,
            output_text: format!("{text}, fr"),
            created_at_ms: created,
            expires_at_ms: expires,
            meta: EntryMeta {
                use_latest_slang: true,
                ..EntryMeta::default()
            },
        }
    }

    #[test]
    fn upsert_then_get_returns_the_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = entry("hello", 10, 20);
        store.upsert(&e).unwrap();

        let got = store.get(&e.key).unwrap().unwrap();
        assert_eq!(got.output_text, "hello, fr");
        assert_eq!(got.to_style, Style::TrendSlang);
        assert!(got.meta.use_latest_slang);
    }

    #[test]
    fn upsert_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = entry("hello", 10, 20);
        store.upsert(&e).unwrap();
        e.output_text = "second".into();
        store.upsert(&e).unwrap();
        assert_eq!(store.get(&e.key).unwrap().unwrap().output_text, "second");
    }

    #[test]
    fn conditional_replace_checks_created_at() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = entry("hello", 10, 20);
        assert!(!store.replace_if_created(&e, 10).unwrap());
        store.upsert(&e).unwrap();

        e.output_text = "refreshed".into();
        e.created_at_ms = 15;
        assert!(!store.replace_if_created(&e, 11).unwrap());
        assert!(store.replace_if_created(&e, 10).unwrap());
        let got = store.get(&e.key).unwrap().unwrap();
        assert_eq!((got.output_text.as_str(), got.created_at_ms), ("refreshed", 15));
    }

    #[test]
    fn delete_reports_existence() {
        let store = SqliteStore::open_in_memory().unwrap();
        let e = entry("hello", 10, 20);
        assert!(!store.delete(&e.key).unwrap());
        store.upsert(&e).unwrap();
        assert!(store.delete(&e.key).unwrap());
        assert!(store.get(&e.key).unwrap().is_none());
    }

    #[test]
    fn stats_and_expiry_cleanup() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.upsert(&entry("expired", 0, 50)).unwrap();
        store.upsert(&entry("stale", 10, 500)).unwrap();
        store.upsert(&entry("fresh", 90, 500)).unwrap();

        let stats = store.stats(100, 80).unwrap();
        assert_eq!(
            stats,
            CacheStats { total: 3, expired: 1, stale: 1, fresh: 1 }
        );

        assert_eq!(store.delete_expired(100).unwrap(), 1);
        assert_eq!(store.stats(100, 80).unwrap().total, 2);
    }

    #[test]
    fn file_backed_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let e = entry("persist me", 1, 2);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert(&e).unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.get(&e.key).unwrap().is_some());
    }
}
