//! Resolves raw requirements into taxonomy categories.
//!
//! Scoring is structural: fixed keyword lists per category, weighted by where
//! they occur (title counts double) and how specific they are (multi-word
//! phrases weigh more). A source-provided category hint that closely matches a
//! category name is treated as authoritative. A requirement may land in
//! several categories; one that lands in none is logged and reported, never
//! dropped silently.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MappingConfig;
use crate::error::Result;
use crate::model::{Category, CategoryId, Citation, FrameworkSelection, RawRequirement};

const TITLE_WEIGHT: f64 = 2.0;
const BODY_WEIGHT: f64 = 1.0;
/// Best keyword score that maps to full confidence.
const CONFIDENT_SCORE: f64 = 3.0;

#[derive(Debug, Clone, Serialize)]
pub struct MappingAudit {
    pub citation: Citation,
    pub confidence: f64,
    pub categories: Vec<CategoryId>,
}

/// Outcome of one resolve call.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMapping {
    pub pools: BTreeMap<CategoryId, Vec<RawRequirement>>,
    pub unmapped: Vec<Citation>,
    pub low_confidence: Vec<MappingAudit>,
    /// Requirements that passed the selection filter.
    pub considered: usize,
}

impl ResolvedMapping {
    pub fn pool(&self, category: &CategoryId) -> &[RawRequirement] {
        self.pools.get(category).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
struct Matcher {
    category: Category,
    keywords: Vec<String>,
    name_parts: Vec<String>,
}

pub struct MappingResolver {
    matchers: Vec<Matcher>,
    config: MappingConfig,
}

impl MappingResolver {
    pub fn new(categories: Vec<Category>, config: MappingConfig) -> Self {
        let matchers = categories
            .into_iter()
            .map(|category| {
                let keywords = if category.keywords.is_empty() {
                    category
                        .name
                        .to_lowercase()
                        .split(|c: char| !c.is_alphanumeric())
                        .filter(|w| w.len() > 3)
                        .map(str::to_string)
                        .collect()
                } else {
                    category.keywords.clone()
                };
                let name_parts = name_parts(&category.name);
                Matcher {
                    category,
                    keywords,
                    name_parts,
                }
            })
            .collect();
        Self { matchers, config }
    }

    /// Map every selected requirement to its categories. A malformed
    /// requirement anywhere in the input fails the whole call.
    pub fn resolve(
        &self,
        requirements: &[RawRequirement],
        selection: &FrameworkSelection,
    ) -> Result<ResolvedMapping> {
        for req in requirements {
            req.check_well_formed()?;
        }

        let mut resolved = ResolvedMapping::default();
        for req in requirements.iter().filter(|r| is_selected(r, selection)) {
            resolved.considered += 1;
            let (categories, confidence) = self.assign(req);

            if categories.is_empty() {
                warn!(
                    target: "mapping_quality",
                    framework = %req.framework,
                    code = %req.code,
                    title = %req.title,
                    "requirement matched no category; excluded"
                );
                resolved.unmapped.push(req.citation());
                continue;
            }

            if confidence < self.config.confidence_threshold {
                warn!(
                    target: "mapping_quality",
                    framework = %req.framework,
                    code = %req.code,
                    confidence,
                    categories = ?categories,
                    "low-confidence mapping"
                );
                resolved.low_confidence.push(MappingAudit {
                    citation: req.citation(),
                    confidence,
                    categories: categories.clone(),
                });
            }

            for category in categories {
                resolved.pools.entry(category).or_default().push(req.clone());
            }
        }

        debug!(
            considered = resolved.considered,
            categories = resolved.pools.len(),
            unmapped = resolved.unmapped.len(),
            "mapping resolved"
        );
        Ok(resolved)
    }

    /// Categories for one requirement, best first, with a confidence in [0,1].
    fn assign(&self, req: &RawRequirement) -> (Vec<CategoryId>, f64) {
        let hinted = req
            .category_hint
            .as_deref()
            .and_then(|hint| self.match_hint(hint));

        let title = req.title.to_lowercase();
        let mut body = req.description.to_lowercase();
        for tag in &req.tags {
            body.push(' ');
            body.push_str(&tag.to_lowercase());
        }

        let mut scored: Vec<(usize, f64)> = self
            .matchers
            .iter()
            .enumerate()
            .map(|(idx, m)| (idx, keyword_score(&m.keywords, &title, &body)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        // Highest score first; taxonomy order breaks ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let best = scored.first().map(|(_, s)| *s).unwrap_or(0.0);
        let mut picked: Vec<usize> = Vec::new();
        if let Some(idx) = hinted {
            picked.push(idx);
        }
        for (idx, score) in &scored {
            if picked.len() >= self.config.max_categories {
                break;
            }
            if *score >= best * self.config.secondary_ratio && !picked.contains(idx) {
                picked.push(*idx);
            }
        }

        let confidence = if hinted.is_some() {
            1.0
        } else if scored.is_empty() {
            0.0
        } else {
            let base = (best / CONFIDENT_SCORE).min(1.0);
            let ambiguous = scored.get(1).is_some_and(|(_, s)| *s >= best * 0.9);
            if ambiguous { base * 0.8 } else { base }
        };

        let categories = picked
            .into_iter()
            .map(|idx| self.matchers[idx].category.id.clone())
            .collect();
        (categories, confidence)
    }

    fn match_hint(&self, hint: &str) -> Option<usize> {
        let hint = hint.trim().to_lowercase();
        if hint.is_empty() {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (idx, m) in self.matchers.iter().enumerate() {
            let sim = m
                .name_parts
                .iter()
                .chain(std::iter::once(&m.category.id.as_str().replace('_', " ")))
                .map(|part| strsim::normalized_levenshtein(&hint, part))
                .fold(0.0_f64, f64::max);
            if best.is_none_or(|(_, b)| sim > b) {
                best = Some((idx, sim));
            }
        }
        best.filter(|(_, sim)| *sim >= self.config.hint_similarity)
            .map(|(idx, _)| idx)
    }
}

fn is_selected(req: &RawRequirement, selection: &FrameworkSelection) -> bool {
    match selection.tier_of(&req.framework) {
        None => false,
        Some(None) => true,
        Some(Some(selected)) => req.tier.is_none_or(|t| t <= selected),
    }
}

/// Lower-case full name plus its `&`/`and`-separated parts.
fn name_parts(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let mut parts = vec![lower.clone()];
    for part in lower.split(['&', '/']).flat_map(|p| p.split(" and ")) {
        let part = part.trim();
        if !part.is_empty() && part != lower {
            parts.push(part.to_string());
        }
    }
    parts
}

fn keyword_score(keywords: &[String], title: &str, body: &str) -> f64 {
    keywords
        .iter()
        .map(|kw| {
            let specificity = 1.0 + 0.5 * (kw.split_whitespace().count() - 1) as f64;
            let mut score = 0.0;
            if contains_phrase(title, kw) {
                score += TITLE_WEIGHT * specificity;
            }
            if contains_phrase(body, kw) {
                score += BODY_WEIGHT * specificity;
            }
            score
        })
        .sum()
}

/// Phrase match anchored at a word start; the phrase may be a word prefix
/// ("encrypt" matches "encryption").
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}
