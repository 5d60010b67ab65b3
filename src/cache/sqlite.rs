//! Persistent cache tier in a single SQLite file. Entries are stored as
//! MessagePack blobs keyed by fingerprint, with the category and expiry kept
//! in plain columns for invalidation and purging.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::{CacheEntry, CacheTier, Fingerprint};
use crate::error::{Result, UnifyError};
use crate::model::CategoryId;

pub struct SqliteTier {
    conn: Arc<Mutex<Connection>>,
    ttl: Duration,
}

impl SqliteTier {
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| UnifyError::Cache {
                message: format!("cannot create cache dir {}: {}", parent.display(), e),
            })?;
        }
        let conn = Connection::open(path)?;
        let tier = Self::init(conn, ttl)?;
        info!(path = %path.display(), "persistent cache opened");
        Ok(tier)
    }

    pub fn open_in_memory(ttl: Duration) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, ttl)
    }

    fn init(conn: Connection, ttl: Duration) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                fingerprint TEXT PRIMARY KEY,
                category_id TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_cache_entries_category
             ON cache_entries(category_id)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| UnifyError::Cache {
            message: "sqlite tier lock poisoned".into(),
        })
    }

    /// Deletes every expired row; returns how many went.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )?;
        if removed > 0 {
            debug!(removed, "purged expired cache rows");
        }
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl CacheTier for SqliteTier {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn max_ttl(&self) -> Duration {
        self.ttl
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;
        let row: Option<(Vec<u8>, i64)> = conn
            .query_row(
                "SELECT payload, expires_at FROM cache_entries WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, expires_at)) = row else {
            return Ok(None);
        };
        if expires_at <= Utc::now().timestamp_millis() {
            conn.execute(
                "DELETE FROM cache_entries WHERE fingerprint = ?1",
                params![fingerprint.as_str()],
            )?;
            return Ok(None);
        }
        let entry: CacheEntry = rmp_serde::from_slice(&payload)?;
        Ok(Some(entry))
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let payload = rmp_serde::to_vec_named(entry)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                (fingerprint, category_id, payload, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.fingerprint.as_str(),
                entry.category.as_str(),
                payload,
                entry.created_at.to_rfc3339(),
                entry.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn invalidate(&self, category: &CategoryId) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE category_id = ?1",
            params![category.as_str()],
        )?;
        Ok(removed)
    }
}
