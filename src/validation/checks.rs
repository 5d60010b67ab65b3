//! Named heuristic predicates used by the validation engine. Each one is a
//! pure function over the text so its detection logic can be tested apart
//! from the scoring weights.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::details::{self, ProtectedDetail};

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:(?P<letter>\(?[a-z]{1,3}\))|(?P<dash>[-*•])|(?P<number>\d{1,3}[.)]))\s+\S")
        .expect("list marker regex")
});

static MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*|__|```|</?[a-zA-Z][a-zA-Z0-9]*(?:\s[^>]*)?>|\[object Object\]|\{\{|\}\}|\\n|^\s*#{1,6}\s")
        .expect("markup regex")
});

static VAGUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:as|where|when|if)\s+(?:appropriate|necessary|applicable|needed|required)\b|\bappropriate(?:ly)?\s*[.,;:)]|\betc\b\.?|\band so on\b",
    )
    .expect("vague term regex")
});

const CONNECTORS: &[&str] = &[
    "and",
    "or",
    "but",
    "the",
    "a",
    "an",
    "of",
    "to",
    "with",
    "for",
    "including",
    "by",
    "in",
    "on",
    "that",
    "which",
    "such",
    "as",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListStyle {
    Letter,
    Dash,
    Number,
}

pub fn list_style(line: &str) -> Option<ListStyle> {
    let caps = LIST_MARKER.captures(line)?;
    if caps.name("letter").is_some() {
        Some(ListStyle::Letter)
    } else if caps.name("dash").is_some() {
        Some(ListStyle::Dash)
    } else {
        Some(ListStyle::Number)
    }
}

/// Most common list style in the text; ties go to the first seen.
pub fn dominant_list_style(text: &str) -> Option<ListStyle> {
    let mut counts: Vec<(ListStyle, usize)> = Vec::new();
    for style in text.lines().filter_map(list_style) {
        match counts.iter_mut().find(|(s, _)| *s == style) {
            Some((_, n)) => *n += 1,
            None => counts.push((style, 1)),
        }
    }
    let max = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == max).map(|(s, _)| s)
}

pub fn has_list_structure(text: &str) -> bool {
    text.lines().any(|l| list_style(l).is_some())
}

/// Header present verbatim somewhere in the text.
pub fn has_header(text: &str, header: &str) -> bool {
    text.contains(header.trim())
}

/// A line whose last word is a connector ("... and", "... such as").
pub fn ends_with_connector(line: &str) -> bool {
    let trimmed = line.trim_end_matches(|c: char| c.is_whitespace() || c == '.' || c == ',');
    if trimmed.is_empty() || trimmed.ends_with(':') {
        return false;
    }
    trimmed
        .rsplit(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .is_some_and(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
}

/// List items and prose lines ending mid-sentence.
pub fn incomplete_sentences(text: &str, headers: &[String]) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !headers.iter().any(|h| h.trim() == *l))
        .filter(|l| ends_with_connector(l))
        .map(str::to_string)
        .collect()
}

pub fn markup_artifacts(text: &str) -> Vec<String> {
    text.lines()
        .flat_map(|line| MARKUP.find_iter(line).map(|m| m.as_str().trim().to_string()))
        .collect()
}

pub fn vague_terms(text: &str) -> Vec<String> {
    VAGUE
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

pub fn missing_details<'a>(
    text: &str,
    expected: &'a [ProtectedDetail],
) -> Vec<&'a ProtectedDetail> {
    expected
        .iter()
        .filter(|d| !details::contains_detail(text, &d.token))
        .collect()
}
