//! Protected details: tokens consolidation must never drop.
//!
//! Each kind is detected by its own named predicate so fallback merging and
//! validation scoring share one definition.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    StandardReference,
    StandardNumber,
    Date,
    Timeframe,
    Threshold,
    Authority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedDetail {
    pub kind: DetailKind,
    pub token: String,
}

static STANDARD_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ISO(?:/IEC)?|IEC|NIST(?:\s+SP)?|PCI[\s-]DSS|SOC\s?2|GDPR|NIS\s?2|DORA|HIPAA)\s+(?:Art(?:icle)?\.?\s*)?\d[\w.\-:]*",
    )
    .expect("standard reference regex")
});

static STANDARD_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4,5}(?:-\d{1,3})?\b").expect("standard number regex"));

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("date regex")
});

static TIMEFRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:semi-annually|bi-annually|annually|annual|quarterly|monthly|weekly|daily|yearly|hourly)\b",
    )
    .expect("timeframe regex")
});

static THRESHOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:\.\d+)?(?:\s*%|-bit\b|\s+(?:percent|characters?|bits?|attempts?|minutes?|hours?|days?|weeks?|months?|years?)\b)",
    )
    .expect("threshold regex")
});

static AUTHORITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:ENISA|NCSC|CISA|ICO|EDPB|CNIL|BSI|ANSSI|CSIRTs?|CERT-EU|FCA|BaFin|NIST)\b|(?i:\b(?:(?:lead\s+)?supervisory|competent|data\s+protection|national)\s+authorit(?:y|ies)\b|\b(?:certification\s+body|external\s+auditors?|law\s+enforcement)\b)",
    )
    .expect("authority regex")
});

impl DetailKind {
    const ALL: [DetailKind; 6] = [
        DetailKind::StandardReference,
        DetailKind::StandardNumber,
        DetailKind::Date,
        DetailKind::Timeframe,
        DetailKind::Threshold,
        DetailKind::Authority,
    ];

    fn pattern(self) -> &'static Regex {
        match self {
            DetailKind::StandardReference => &STANDARD_REFERENCE,
            DetailKind::StandardNumber => &STANDARD_NUMBER,
            DetailKind::Date => &DATE,
            DetailKind::Timeframe => &TIMEFRAME,
            DetailKind::Threshold => &THRESHOLD,
            DetailKind::Authority => &AUTHORITY,
        }
    }
}

pub fn is_standard_reference(text: &str) -> bool {
    DetailKind::StandardReference.pattern().is_match(text)
        || DetailKind::StandardNumber.pattern().is_match(text)
}

pub fn is_timeframe(text: &str) -> bool {
    DetailKind::Timeframe.pattern().is_match(text) || DetailKind::Date.pattern().is_match(text)
}

pub fn is_threshold(text: &str) -> bool {
    DetailKind::Threshold.pattern().is_match(text)
}

pub fn is_authority(text: &str) -> bool {
    DetailKind::Authority.pattern().is_match(text)
}

pub fn has_protected_detail(text: &str) -> bool {
    is_standard_reference(text) || is_timeframe(text) || is_threshold(text) || is_authority(text)
}

/// Protected details in order of first appearance, each token once
/// (case-insensitive).
pub fn extract(text: &str) -> Vec<ProtectedDetail> {
    if !has_protected_detail(text) {
        return Vec::new();
    }
    let mut found: Vec<(usize, DetailKind, String)> = Vec::new();
    for kind in DetailKind::ALL {
        for m in kind.pattern().find_iter(text) {
            let token = m.as_str().trim_end_matches(['.', ':', '-', ',']).to_string();
            if !token.is_empty() {
                found.push((m.start(), kind, token));
            }
        }
    }
    found.sort_by_key(|(start, _, _)| *start);

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|(_, _, token)| seen.insert(normalize(token)))
        .map(|(_, kind, token)| ProtectedDetail { kind, token })
        .collect()
}

/// Union of details over several texts, first appearance wins.
pub fn extract_all<'a, I>(texts: I) -> Vec<ProtectedDetail>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .flat_map(extract)
        .filter(|d| seen.insert(normalize(&d.token)))
        .collect()
}

/// Case-insensitive, whitespace-insensitive containment of a whole token:
/// the match may not sit inside a longer word or number, so "4 hours" is not
/// found in "24 hours".
pub fn contains_detail(text: &str, token: &str) -> bool {
    let text = normalize(text);
    let token = normalize(token);
    if token.is_empty() {
        return true;
    }
    text.match_indices(&token).any(|(idx, m)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + m.len()..].chars().next();
        before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
    })
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
