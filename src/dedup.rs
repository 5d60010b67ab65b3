//! Two-tier deduplication of a category pool.
//!
//! Stage 1 drops repeated `framework:code` pairs. Stage 2 folds entries whose
//! normalized content shares a leading-prefix hash into the first such entry;
//! the folded entry's citation and any protected details it alone carries are
//! kept on the survivor.

use std::collections::HashSet;

use blake3::Hasher;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::details;
use crate::model::{Citation, RawRequirement};

#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub requirement: RawRequirement,
    /// Near-duplicates folded into this entry.
    pub absorbed: Vec<RawRequirement>,
    /// Protected details present only in absorbed text.
    pub carried_details: Vec<String>,
}

impl PoolEntry {
    fn new(requirement: RawRequirement) -> Self {
        Self {
            requirement,
            absorbed: Vec::new(),
            carried_details: Vec::new(),
        }
    }

    fn absorb(&mut self, other: RawRequirement) {
        for detail in details::extract(other.content()) {
            let already = details::contains_detail(self.requirement.content(), &detail.token)
                || self
                    .carried_details
                    .iter()
                    .any(|c| details::contains_detail(c, &detail.token));
            if !already {
                self.carried_details.push(detail.token);
            }
        }
        self.absorbed.push(other);
    }

    pub fn citations(&self) -> impl Iterator<Item = Citation> + '_ {
        std::iter::once(self.requirement.citation())
            .chain(self.absorbed.iter().map(|r| r.citation()))
    }
}

/// A category pool after both dedup stages. Entry order is input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeduplicatedPool {
    entries: Vec<PoolEntry>,
    input_len: usize,
    exact_removed: usize,
}

impl DeduplicatedPool {
    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn input_len(&self) -> usize {
        self.input_len
    }

    pub fn exact_removed(&self) -> usize {
        self.exact_removed
    }

    pub fn absorbed_count(&self) -> usize {
        self.entries.iter().map(|e| e.absorbed.len()).sum()
    }

    /// Share of the input removed by either stage.
    pub fn dedup_rate(&self) -> f64 {
        if self.input_len == 0 {
            0.0
        } else {
            1.0 - self.entries.len() as f64 / self.input_len as f64
        }
    }

    pub fn requirements(&self) -> Vec<RawRequirement> {
        self.entries.iter().map(|e| e.requirement.clone()).collect()
    }

    /// Retained and absorbed citations, in pool order.
    pub fn citations(&self) -> Vec<Citation> {
        self.entries.iter().flat_map(|e| e.citations()).collect()
    }

    /// Distinct section headers in order of first appearance.
    pub fn section_headers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter_map(|e| e.requirement.section.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// Every protected detail the consolidated text must carry.
    pub fn protected_details(&self) -> Vec<details::ProtectedDetail> {
        let texts = self.entries.iter().flat_map(|e| {
            std::iter::once(e.requirement.content())
                .chain(e.carried_details.iter().map(String::as_str))
        });
        details::extract_all(texts)
    }

    /// Hash over the full text of every retained and absorbed entry, so any
    /// edit to pooled source content changes it.
    pub fn content_hash(&self) -> String {
        let mut hasher = Hasher::new();
        for entry in &self.entries {
            hash_requirement(&mut hasher, b"R", &entry.requirement);
            for absorbed in &entry.absorbed {
                hash_requirement(&mut hasher, b"A", absorbed);
            }
            for detail in &entry.carried_details {
                hasher.update(b"D");
                hasher.update(detail.as_bytes());
                hasher.update(&[0x1e]);
            }
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_requirement(hasher: &mut Hasher, tag: &[u8], req: &RawRequirement) {
    hasher.update(tag);
    for part in [
        req.framework.as_str(),
        req.code.as_str(),
        req.title.as_str(),
        req.description.as_str(),
        req.section.as_deref().unwrap_or(""),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    hasher.update(&[0x1e]);
}

/// NFKC, lower-cased, whitespace collapsed.
pub fn normalize_content(text: &str) -> String {
    text.nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    prefix_chars: usize,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Deduplicator {
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            prefix_chars: prefix_chars.max(1),
        }
    }

    /// Hash of the first `prefix_chars` characters of normalized content.
    pub fn semantic_key(&self, content: &str) -> String {
        let normalized = normalize_content(content);
        let prefix: String = normalized.chars().take(self.prefix_chars).collect();
        blake3::hash(prefix.as_bytes()).to_hex().to_string()
    }

    pub fn dedupe(&self, pool: &[RawRequirement]) -> DeduplicatedPool {
        let mut exact_seen: HashSet<String> = HashSet::new();
        let mut exact_removed = 0;
        let mut semantic_index: Vec<(String, usize)> = Vec::new();
        let mut entries: Vec<PoolEntry> = Vec::new();

        for req in pool {
            if !exact_seen.insert(req.exact_key()) {
                exact_removed += 1;
                continue;
            }
            let key = self.semantic_key(req.content());
            let found = semantic_index
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, idx)| *idx);
            match found {
                Some(idx) => {
                    debug!(
                        kept = %entries[idx].requirement.exact_key(),
                        folded = %req.exact_key(),
                        "semantic duplicate folded"
                    );
                    entries[idx].absorb(req.clone());
                }
                None => {
                    semantic_index.push((key, entries.len()));
                    entries.push(PoolEntry::new(req.clone()));
                }
            }
        }

        DeduplicatedPool {
            entries,
            input_len: pool.len(),
            exact_removed,
        }
    }
}
