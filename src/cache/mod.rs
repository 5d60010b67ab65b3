//! Fingerprint-keyed result cache.
//!
//! Tiers implement [`CacheTier`] and are composed by [`CacheStore`] in a fixed
//! order, fastest first. A hit in a later tier is copied into the earlier
//! ones. Tier failures are logged and read as misses: the cache can make a
//! run cheaper but never make it fail.

pub mod memory;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup::DeduplicatedPool;
use crate::error::Result;
use crate::model::{CategoryId, ConsolidationResult, FrameworkSelection};

pub use memory::MemoryTier;
pub use sqlite::SqliteTier;

/// Bumped whenever the cached payload layout or its meaning changes.
const FINGERPRINT_VERSION: &str = "unify-v1";

/// Hash of `(category, sorted selection, pool content hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(
        category: &CategoryId,
        selection: &FrameworkSelection,
        pool: &DeduplicatedPool,
    ) -> Self {
        let selection_key = selection.canonical_key();
        let content_hash = pool.content_hash();
        let mut hasher = blake3::Hasher::new();
        for part in [
            FINGERPRINT_VERSION,
            category.as_str(),
            selection_key.as_str(),
            content_hash.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0x1f]);
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub category: CategoryId,
    pub result: ConsolidationResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        fingerprint: Fingerprint,
        category: CategoryId,
        result: ConsolidationResult,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            fingerprint,
            category,
            result,
            created_at,
            expires_at: expiry(created_at, ttl),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Same entry with its expiry capped at `created_at + ttl`.
    pub fn capped(&self, ttl: Duration) -> Self {
        let mut entry = self.clone();
        entry.expires_at = entry.expires_at.min(expiry(entry.created_at, ttl));
        entry
    }
}

pub(crate) fn expiry(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One storage layer. Every operation is atomic with respect to the others.
pub trait CacheTier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Longest lifetime this tier keeps an entry.
    fn max_ttl(&self) -> Duration;

    /// Live entry for the fingerprint; expired entries read as `None`.
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>>;

    fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Drops every entry of the category; returns how many went.
    fn invalidate(&self, category: &CategoryId) -> Result<usize>;
}

#[derive(Clone)]
pub struct CacheStore {
    tiers: Vec<Arc<dyn CacheTier>>,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tiers.iter().map(|t| t.name()).collect();
        f.debug_struct("CacheStore").field("tiers", &names).finish()
    }
}

impl CacheStore {
    /// Memory in front of an optional persistent tier.
    pub fn layered(memory: MemoryTier, persistent: Option<SqliteTier>) -> Self {
        let mut tiers: Vec<Arc<dyn CacheTier>> = vec![Arc::new(memory)];
        if let Some(persistent) = persistent {
            tiers.push(Arc::new(persistent));
        }
        Self { tiers }
    }

    pub fn from_tiers(tiers: Vec<Arc<dyn CacheTier>>) -> Self {
        Self { tiers }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        for (idx, tier) in self.tiers.iter().enumerate() {
            match tier.get(fingerprint) {
                Ok(Some(entry)) => {
                    debug!(tier = tier.name(), %fingerprint, "cache hit");
                    for upper in &self.tiers[..idx] {
                        if let Err(e) = upper.put(&entry.capped(upper.max_ttl())) {
                            warn!(tier = upper.name(), error = %e, "cache promotion failed");
                        }
                    }
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "cache read failed; treating as miss")
                }
            }
        }
        debug!(%fingerprint, "cache miss");
        None
    }

    /// Stores the result in every tier, each capping `ttl` at its own maximum.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        category: CategoryId,
        result: ConsolidationResult,
        ttl: Duration,
    ) -> CacheEntry {
        let entry = CacheEntry::new(fingerprint, category, result, ttl);
        for tier in &self.tiers {
            if let Err(e) = tier.put(&entry.capped(tier.max_ttl())) {
                warn!(tier = tier.name(), error = %e, "cache write failed");
            }
        }
        entry
    }

    /// Removes the category from every tier; returns the total dropped.
    pub fn invalidate(&self, category: &CategoryId) -> usize {
        let mut removed = 0;
        for tier in &self.tiers {
            match tier.invalidate(category) {
                Ok(n) => removed += n,
                Err(e) => warn!(tier = tier.name(), error = %e, "cache invalidation failed"),
            }
        }
        debug!(%category, removed, "cache invalidated");
        removed
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::{FallbackReason, Method};
    use crate::validation::QualityScore;

    pub fn result(text: &str) -> ConsolidationResult {
        ConsolidationResult {
            text: text.to_string(),
            method: Method::Fallback {
                reason: FallbackReason::AiDisabled,
                merged_bullets: 0,
            },
            quality: QualityScore::compose(&Default::default(), 1.0, 1.0, 1.0, 1.0, Vec::new()),
            framework_references: Vec::new(),
        }
    }

    pub fn fp(s: &str) -> Fingerprint {
        Fingerprint(s.to_string())
    }
}
