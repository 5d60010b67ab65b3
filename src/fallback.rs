//! Deterministic rule-based consolidation.
//!
//! Entries are grouped per section header, then by a topic signature (the
//! action verb class plus the first key noun). Same-topic entries merge into
//! one lettered bullet: sentences that repeat an earlier sentence and carry no
//! new protected detail are dropped, everything else is kept verbatim. Any
//! protected detail still absent from a bullet is appended as "(also: ...)",
//! so no detail is lost.

use std::collections::HashSet;

use tracing::debug;

use crate::dedup::{DeduplicatedPool, PoolEntry};
use crate::details;
use crate::model::{Draft, FallbackReason, Method};

/// Word-overlap ratio above which a sentence counts as a repeat.
const REDUNDANT_OVERLAP: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum VerbClass {
    Establish,
    Maintain,
    Monitor,
    Review,
    Report,
    Train,
    Other,
}

const VERB_CLASSES: &[(VerbClass, &[&str])] = &[
    (
        VerbClass::Establish,
        &[
            "establish", "implement", "define", "develop", "create", "document", "adopt", "set",
            "put", "introduce", "approve", "deploy", "apply",
        ],
    ),
    (
        VerbClass::Maintain,
        &[
            "maintain", "manage", "keep", "update", "retain", "protect", "ensure", "enforce", "use",
            "configure", "restrict", "limit", "control", "secure", "encrypt", "install",
        ],
    ),
    (
        VerbClass::Monitor,
        &["monitor", "log", "track", "detect", "record", "collect", "alert"],
    ),
    (
        VerbClass::Review,
        &[
            "review", "assess", "audit", "test", "evaluate", "verify", "check", "analyse", "analyze",
            "scan",
        ],
    ),
    (
        VerbClass::Report,
        &["report", "notify", "communicate", "inform", "disclose"],
    ),
    (VerbClass::Train, &["train", "educate", "raise"]),
];

const KEY_NOUNS: &[&str] = &[
    "policy", "policies", "procedure", "inventor", "asset", "backup", "access", "password",
    "account", "log", "incident", "training", "awareness", "supplier", "risk", "encryption",
    "cryptograph", "key", "vulnerabilit", "patch", "malware", "network", "firewall",
    "configuration", "data", "privacy", "continuity", "recovery", "audit", "change",
    "development", "screening", "physical",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TopicSignature {
    verb: VerbClass,
    noun: Option<&'static str>,
}

impl TopicSignature {
    fn of(text: &str) -> Self {
        let words = words(text);
        let verb = words
            .iter()
            .find_map(|w| verb_class(w))
            .unwrap_or(VerbClass::Other);
        let noun = words.iter().find_map(|w| key_noun(w));
        Self { verb, noun }
    }

    /// Only signatures with a key noun are allowed to merge.
    fn mergeable(&self) -> bool {
        self.noun.is_some()
    }
}

fn verb_class(word: &str) -> Option<VerbClass> {
    VERB_CLASSES.iter().find_map(|(class, verbs)| {
        verbs
            .iter()
            .any(|verb| is_verb_form(word, verb))
            .then_some(*class)
    })
}

fn is_verb_form(word: &str, verb: &str) -> bool {
    match word.strip_prefix(verb) {
        Some(rest) => matches!(rest, "" | "s" | "es" | "d" | "ed" | "ing"),
        None => false,
    }
}

fn key_noun(word: &str) -> Option<&'static str> {
    let noun = KEY_NOUNS.iter().find(|noun| word.starts_with(*noun))?;
    // "policies" and "policy" are one topic.
    Some(if *noun == "policies" { "policy" } else { noun })
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Splits after `.`, `!` or `?` when whitespace and an upper-case letter
/// follow, so "ISO 27001." and "e.g. the" stay intact.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut start = 0;
    for i in 0..chars.len() {
        let (idx, c) = chars[i];
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, ws)) = chars.get(i + 1) else {
            continue;
        };
        if !ws.is_whitespace() {
            continue;
        }
        let next = chars[i + 1..].iter().find(|(_, ch)| !ch.is_whitespace());
        if let Some(&(_, upper)) = next
            && upper.is_uppercase()
        {
            let end = idx + c.len_utf8();
            sentences.push(text[start..end].trim().to_string());
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn overlap(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = words(a).into_iter().filter(|w| w.len() > 2).collect();
    let b: HashSet<String> = words(b).into_iter().filter(|w| w.len() > 2).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    shared as f64 / a.union(&b).count() as f64
}

/// Letters a) .. z), then aa) .. zz), aaa), ... (bijective base 26).
pub fn bullet_label(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    let mut label: String = letters.into_iter().rev().collect();
    label.push(')');
    label
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Bullet<'a> {
    signature: TopicSignature,
    first_seen: usize,
    members: Vec<&'a PoolEntry>,
}

impl Bullet<'_> {
    fn render(&self) -> String {
        let mut sentences: Vec<String> = Vec::new();
        for entry in &self.members {
            for sentence in split_sentences(&entry_text(entry)) {
                let repeat = sentences
                    .iter()
                    .any(|kept| overlap(kept, &sentence) >= REDUNDANT_OVERLAP);
                let adds_detail = details::extract(&sentence)
                    .iter()
                    .any(|d| {
                        !sentences
                            .iter()
                            .any(|kept| details::contains_detail(kept, &d.token))
                    });
                if !repeat || adds_detail {
                    sentences.push(sentence);
                }
            }
        }

        let mut text = sentences.join(" ");
        let expected = details::extract_all(self.members.iter().flat_map(|e| {
            std::iter::once(e.requirement.content())
                .chain(e.carried_details.iter().map(String::as_str))
        }));
        let missing: Vec<String> = expected
            .into_iter()
            .filter(|d| !details::contains_detail(&text, &d.token))
            .map(|d| d.token)
            .collect();
        if !missing.is_empty() {
            let trimmed = text.trim_end_matches(['.', ' ']).to_string();
            text = format!("{} (also: {})", trimmed, missing.join(", "));
        }
        if !text.ends_with(['.', '!', '?']) {
            text.push('.');
        }
        text
    }
}

fn entry_text(entry: &PoolEntry) -> String {
    let content = collapse_whitespace(entry.requirement.content());
    if content.is_empty() {
        entry.requirement.citation().to_string()
    } else {
        content
    }
}

#[derive(Debug, Clone, Default)]
pub struct FallbackConsolidator;

impl FallbackConsolidator {
    pub fn new() -> Self {
        Self
    }

    /// Never fails. An empty pool yields empty text.
    pub fn consolidate(&self, pool: &DeduplicatedPool, reason: FallbackReason) -> Draft {
        let mut sections: Vec<(Option<String>, Vec<&PoolEntry>)> = vec![(None, Vec::new())];
        for entry in pool.entries() {
            let header = entry
                .requirement
                .section
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            match sections.iter_mut().find(|(h, _)| *h == header) {
                Some((_, members)) => members.push(entry),
                None => sections.push((header, vec![entry])),
            }
        }

        let mut blocks = Vec::new();
        let mut bullet_count = 0;
        for (header, entries) in sections.iter().filter(|(_, e)| !e.is_empty()) {
            let bullets = group_bullets(entries);
            bullet_count += bullets.len();
            let mut lines = Vec::with_capacity(bullets.len() + 1);
            if let Some(header) = header {
                lines.push(header.clone());
            }
            for (idx, bullet) in bullets.iter().enumerate() {
                lines.push(format!("{} {}", bullet_label(idx), bullet.render()));
            }
            blocks.push(lines.join("\n"));
        }

        let merged_bullets = pool.len().saturating_sub(bullet_count);
        debug!(
            entries = pool.len(),
            bullets = bullet_count,
            merged_bullets,
            ?reason,
            "fallback consolidation"
        );
        Draft {
            text: blocks.join("\n\n"),
            method: Method::Fallback { reason, merged_bullets },
        }
    }
}

/// Same-signature entries share a bullet; bullets run in verb-class order,
/// then by first appearance.
fn group_bullets<'a>(entries: &[&'a PoolEntry]) -> Vec<Bullet<'a>> {
    let mut bullets: Vec<Bullet<'a>> = Vec::new();
    for (position, &entry) in entries.iter().enumerate() {
        let signature = TopicSignature::of(&entry_text(entry));
        let existing = bullets
            .iter()
            .position(|b| signature.mergeable() && b.signature == signature);
        match existing {
            Some(idx) => bullets[idx].members.push(entry),
            None => bullets.push(Bullet {
                signature,
                first_seen: position,
                members: vec![entry],
            }),
        }
    }
    bullets.sort_by_key(|b| (b.signature.verb, b.first_seen));
    bullets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::dedup::Deduplicator;
    use crate::model::RawRequirement;
    use crate::validation::{BatchContext, ValidationEngine};

    fn pool(reqs: &[RawRequirement]) -> DeduplicatedPool {
        Deduplicator::default().dedupe(reqs)
    }

    #[test]
    fn labels_roll_over_after_z() {
        assert_eq!(bullet_label(0), "a)");
        assert_eq!(bullet_label(25), "z)");
        assert_eq!(bullet_label(26), "aa)");
        assert_eq!(bullet_label(27), "ab)");
        assert_eq!(bullet_label(701), "zz)");
        assert_eq!(bullet_label(702), "aaa)");
        let labels: HashSet<String> = (0..2000).map(bullet_label).collect();
        assert_eq!(labels.len(), 2000);
    }

    #[test]
    fn sentences_split_on_capitals_only() {
        let s = split_sentences("Apply ISO 27001. Review e.g. the scope quarterly. done");
        assert_eq!(s, vec!["Apply ISO 27001.", "Review e.g. the scope quarterly. done"]);
    }

    #[test]
    fn same_topic_entries_share_a_bullet() {
        let p = pool(&[
            RawRequirement::new("a", "A.1", "Policy", "Establish an information security policy."),
            RawRequirement::new("b", "B.7", "Policy", "Implement a security policy."),
        ]);
        let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::AiDisabled);
        assert_eq!(draft.text.lines().count(), 1);
        assert!(draft.text.starts_with("a) Establish an information security policy."));
        assert!(matches!(draft.method, Method::Fallback { merged_bullets: 1, .. }));
    }

    #[test]
    fn details_survive_redundant_sentences() {
        let p = pool(&[
            RawRequirement::new(
                "a",
                "1",
                "Review",
                "Review the access policy quarterly. Align with ISO 27001.",
            ),
            RawRequirement::new(
                "b",
                "2",
                "Review",
                "Review the access policy annually. Notify ENISA.",
            ),
        ]);
        let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::RateLimited);
        for token in ["quarterly", "annually", "ISO 27001", "ENISA"] {
            assert!(draft.text.contains(token), "missing {token} in {}", draft.text);
        }
    }

    #[test]
    fn overlapping_numeric_details_are_both_kept() {
        let p = pool(&[
            RawRequirement::new(
                "a",
                "1",
                "Reporting",
                "Report the incident to the CSIRT within 24 hours.",
            ),
            RawRequirement::new(
                "b",
                "2",
                "Reporting",
                "Report the incident to the CSIRT within 4 hours.",
            ),
            RawRequirement::new("c", "3", "Lockout", "Lock the account after 15 attempts."),
            RawRequirement::new("d", "4", "Lockout", "Lock the account after 5 attempts."),
        ]);
        let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::AiDisabled);
        for token in ["24 hours", "4 hours", "15 attempts", "5 attempts"] {
            assert!(details::contains_detail(&draft.text, token), "lost {token} in {}", draft.text);
        }
        assert!(draft.text.contains("within 4 hours."));
        assert!(draft.text.contains("after 5 attempts."));
    }

    #[test]
    fn sections_keep_headers_and_restart_letters() {
        let p = pool(&[
            RawRequirement::new("a", "1", "t", "Maintain an asset inventory.")
                .with_section("Assets"),
            RawRequirement::new("a", "2", "t", "Encrypt data at rest.")
                .with_section("Cryptography"),
            RawRequirement::new("b", "3", "t", "Monitor network traffic.").with_section("Assets"),
        ]);
        let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::AiDisabled);
        let lines: Vec<&str> = draft.text.lines().collect();
        assert_eq!(lines[0], "Assets");
        assert!(lines[1].starts_with("a) Maintain"));
        assert!(lines[2].starts_with("b) Monitor"));
        assert!(lines.contains(&"Cryptography"));
        assert!(draft.text.contains("a) Encrypt data at rest."));
    }

    #[test]
    fn bullets_follow_verb_class_order() {
        let p = pool(&[
            RawRequirement::new("a", "1", "t", "Report incidents to the CSIRT."),
            RawRequirement::new("a", "2", "t", "Establish an incident response plan."),
        ]);
        let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::AiDisabled);
        assert!(draft.text.starts_with("a) Establish"));
    }

    #[test]
    fn empty_pool_gives_empty_text() {
        let draft = FallbackConsolidator::new().consolidate(&pool(&[]), FallbackReason::AiDisabled);
        assert!(draft.text.is_empty());
    }

    #[test]
    fn fallback_output_is_accepted() {
        let pools = [
            vec![RawRequirement::new("a", "1", "Only title", "")],
            vec![
                RawRequirement::new("a", "1", "t", "Use MFA for remote access and")
                    .with_section("Access to"),
                RawRequirement::new("b", "2", "t", "Lock accounts after 5 attempts, etc."),
            ],
            vec![
                RawRequirement::new("a", "1", "t", "**Keep** logs for 12 months as appropriate."),
                RawRequirement::new(
                    "b",
                    "2",
                    "t",
                    "Keep logs for 12 months as appropriate. Report to the competent authority.",
                ),
                RawRequirement::new("c", "3", "t", "Review logs weekly per NIST SP 800-92."),
            ],
        ];
        let engine = ValidationEngine::new(ValidationConfig::default());
        for reqs in pools {
            let p = pool(&reqs);
            let draft = FallbackConsolidator::new().consolidate(&p, FallbackReason::AiDisabled);
            let score = engine.validate(&draft, &p, &BatchContext::new());
            assert!(engine.accept(&score), "rejected {:?}: {:?}", draft.text, score);
        }
    }
}
