use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use lru::LruCache;

use super::{CacheEntry, CacheTier, Fingerprint};
use crate::error::{Result, UnifyError};
use crate::model::CategoryId;

/// Bounded LRU; the least recently used entry goes first once full.
pub struct MemoryTier {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    ttl: Duration,
}

impl MemoryTier {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<Fingerprint, CacheEntry>>> {
        self.entries.lock().map_err(|_| UnifyError::Cache {
            message: "memory tier lock poisoned".into(),
        })
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn max_ttl(&self) -> Duration {
        self.ttl
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let mut entries = self.lock()?;
        match entries.get(fingerprint) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(Utc::now()) => return Ok(Some(entry.clone())),
            Some(_) => {}
        }
        entries.pop(fingerprint);
        Ok(None)
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.lock()?.put(entry.fingerprint.clone(), entry.clone());
        Ok(())
    }

    fn invalidate(&self, category: &CategoryId) -> Result<usize> {
        let mut entries = self.lock()?;
        let doomed: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, e)| e.category == *category)
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in &doomed {
            entries.pop(fp);
        }
        Ok(doomed.len())
    }
}
