//! Cross-category consistency within one generation run.

use std::collections::HashMap;

use super::checks::{self, ListStyle};
use super::{IssueKind, Severity, ValidationIssue};

/// Spelling variants that should not alternate between categories of one run.
const TERM_VARIANTS: &[&[&str]] = &[
    &["e-mail", "email"],
    &["third-party", "third party"],
    &["anti-virus", "antivirus"],
    &["log-in", "login", "log-on", "logon"],
    &["multi-factor", "multifactor"],
    &["cyber-security", "cyber security", "cybersecurity"],
    &["back-up", "backup"],
    &["organisation", "organization"],
    &["authorisation", "authorization"],
];

/// What earlier categories of the same run settled on.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    recorded: usize,
    list_style: Option<ListStyle>,
    terms: HashMap<usize, &'static str>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recorded
    }

    pub fn is_empty(&self) -> bool {
        self.recorded == 0
    }

    /// Consistency of `text` against what the batch has seen so far. The first
    /// category of a run is consistent by definition.
    pub fn score(&self, text: &str, penalty: f64) -> (f64, Vec<ValidationIssue>) {
        let mut issues = Vec::new();
        if self.recorded == 0 {
            return (1.0, issues);
        }

        if let (Some(expected), Some(found)) = (self.list_style, checks::dominant_list_style(text))
            && expected != found
        {
            issues.push(ValidationIssue {
                kind: IssueKind::InconsistentFormatting,
                severity: Severity::Warning,
                message: format!("list style {:?} differs from batch style {:?}", found, expected),
            });
        }

        for (group, used) in term_usage(text) {
            if let Some(established) = self.terms.get(&group)
                && *established != used
            {
                issues.push(ValidationIssue {
                    kind: IssueKind::InconsistentTerminology,
                    severity: Severity::Warning,
                    message: format!(
                        "uses '{}' where earlier categories use '{}'",
                        used, established
                    ),
                });
            }
        }

        let score = (1.0 - penalty * issues.len() as f64).max(0.0);
        (score, issues)
    }

    /// Fold an accepted category's text into the batch. Choices already made
    /// are kept; new term groups and the first list style are adopted.
    pub fn record(&mut self, text: &str) {
        self.recorded += 1;
        if self.list_style.is_none() {
            self.list_style = checks::dominant_list_style(text);
        }
        for (group, used) in term_usage(text) {
            self.terms.entry(group).or_insert(used);
        }
    }
}

/// Dominant variant per term group present in the text.
fn term_usage(text: &str) -> Vec<(usize, &'static str)> {
    let lower = text.to_lowercase();
    TERM_VARIANTS
        .iter()
        .enumerate()
        .filter_map(|(group, variants)| {
            variants
                .iter()
                .map(|v| (*v, count_word(&lower, v)))
                .filter(|(_, n)| *n > 0)
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.len().cmp(&a.0.len())))
                .map(|(v, _)| (group, v))
        })
        .collect()
}

fn count_word(haystack: &str, word: &str) -> usize {
    haystack
        .match_indices(word)
        .filter(|(idx, _)| {
            let before = haystack[..*idx].chars().next_back();
            let after = haystack[idx + word.len()..].chars().next();
            before.is_none_or(|c| !c.is_alphanumeric() && c != '-')
                && after.is_none_or(|c| !c.is_alphanumeric() && c != '-')
        })
        .count()
}
