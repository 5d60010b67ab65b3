//! Multi-dimensional scoring of consolidated text.
//!
//! Four sub-scores in [0,1] (content preservation, structure, readability,
//! cross-category consistency) are combined with fixed weights from
//! [`ValidationConfig`]. Acceptance needs the composite at or above the
//! configured threshold and no critical issue; an empty output or a missing
//! protected detail is critical.

pub mod checks;
pub mod consistency;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ScoreWeights, ValidationConfig};
use crate::dedup::DeduplicatedPool;
use crate::model::Draft;

pub use consistency::BatchContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    EmptyOutput,
    MissingDetail,
    MissingHeader,
    NoListStructure,
    IncompleteSentence,
    MarkupArtifact,
    VagueTerm,
    InconsistentTerminology,
    InconsistentFormatting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    fn critical(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub content_preservation: f64,
    pub structure: f64,
    pub readability: f64,
    pub consistency: f64,
    pub composite: f64,
    pub issues: Vec<ValidationIssue>,
}

impl QualityScore {
    /// Weighted composite, clamped to [0,1].
    pub fn compose(
        weights: &ScoreWeights,
        content_preservation: f64,
        structure: f64,
        readability: f64,
        consistency: f64,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        let composite = (weights.content_preservation * content_preservation
            + weights.structure * structure
            + weights.readability * readability
            + weights.consistency * consistency)
            .clamp(0.0, 1.0);
        Self {
            content_preservation,
            structure,
            readability,
            consistency,
            composite,
            issues,
        }
    }

    pub fn critical_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct ValidationEngine {
    config: ValidationConfig,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn validate(
        &self,
        draft: &Draft,
        pool: &DeduplicatedPool,
        batch: &BatchContext,
    ) -> QualityScore {
        let text = draft.text.trim();
        if text.is_empty() {
            return QualityScore::compose(
                &self.config.weights,
                0.0,
                0.0,
                0.0,
                0.0,
                vec![ValidationIssue::critical(
                    IssueKind::EmptyOutput,
                    "consolidated text is empty",
                )],
            );
        }

        let mut issues = Vec::new();
        let content = self.content_preservation(text, pool, &mut issues);
        let headers = pool.section_headers();
        let structure = self.structure(text, &headers, &mut issues);
        let readability = self.readability(text, &headers, &mut issues);
        let (consistency, drift) = batch.score(text, self.config.consistency_penalty);
        issues.extend(drift);

        let score = QualityScore::compose(
            &self.config.weights,
            content,
            structure,
            readability,
            consistency,
            issues,
        );
        debug!(
            content = score.content_preservation,
            structure = score.structure,
            readability = score.readability,
            consistency = score.consistency,
            composite = score.composite,
            issues = score.issues.len(),
            "draft scored"
        );
        score
    }

    pub fn accept(&self, score: &QualityScore) -> bool {
        score.composite >= self.config.threshold && score.critical_count() == 0
    }

    /// Fraction of the pool's protected details present in the text.
    fn content_preservation(
        &self,
        text: &str,
        pool: &DeduplicatedPool,
        issues: &mut Vec<ValidationIssue>,
    ) -> f64 {
        let expected = pool.protected_details();
        if expected.is_empty() {
            return 1.0;
        }
        let missing = checks::missing_details(text, &expected);
        for detail in &missing {
            issues.push(ValidationIssue::critical(
                IssueKind::MissingDetail,
                format!("protected detail '{}' ({:?}) missing", detail.token, detail.kind),
            ));
        }
        (expected.len() - missing.len()) as f64 / expected.len() as f64
    }

    /// Half for verbatim section headers, half for a recognizable list.
    fn structure(&self, text: &str, headers: &[String], issues: &mut Vec<ValidationIssue>) -> f64 {
        let header_fraction = if headers.is_empty() {
            1.0
        } else {
            let mut present = 0;
            for header in headers {
                if checks::has_header(text, header) {
                    present += 1;
                } else {
                    issues.push(ValidationIssue::warning(
                        IssueKind::MissingHeader,
                        format!("section header '{}' not retained", header),
                    ));
                }
            }
            present as f64 / headers.len() as f64
        };

        let list = if checks::has_list_structure(text) {
            1.0
        } else {
            issues.push(ValidationIssue::warning(
                IssueKind::NoListStructure,
                "no bullet or letter list found",
            ));
            0.0
        };

        0.5 * header_fraction + 0.5 * list
    }

    fn readability(
        &self,
        text: &str,
        headers: &[String],
        issues: &mut Vec<ValidationIssue>,
    ) -> f64 {
        let before = issues.len();
        for line in checks::incomplete_sentences(text, headers) {
            issues.push(ValidationIssue::warning(
                IssueKind::IncompleteSentence,
                format!("ends mid-sentence: '{}'", line),
            ));
        }
        for artifact in checks::markup_artifacts(text) {
            issues.push(ValidationIssue::warning(
                IssueKind::MarkupArtifact,
                format!("markup artifact '{}'", artifact),
            ));
        }
        for term in checks::vague_terms(text) {
            issues.push(ValidationIssue::warning(
                IssueKind::VagueTerm,
                format!("vague term '{}'", term),
            ));
        }
        let found = issues.len() - before;
        (1.0 - self.config.readability_penalty * found as f64).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::Deduplicator;
    use crate::model::{FallbackReason, Method, RawRequirement};

    fn engine() -> ValidationEngine {
        ValidationEngine::new(ValidationConfig::default())
    }

    fn draft(text: &str) -> Draft {
        Draft {
            text: text.to_string(),
            method: Method::Fallback {
                reason: FallbackReason::AiDisabled,
                merged_bullets: 0,
            },
        }
    }

    fn pool() -> DeduplicatedPool {
        Deduplicator::default().dedupe(&[
            RawRequirement::new(
                "iso",
                "5.1",
                "Policy",
                "Establish a policy aligned with ISO 27001.",
            )
            .with_section("Policies"),
            RawRequirement::new("nis2", "21", "Review", "Review the policy quarterly.")
                .with_section("Policies"),
        ])
    }

    #[test]
    fn good_draft_is_accepted() {
        let text = "Policies\n\
                    a) Establish a policy aligned with ISO 27001.\n\
                    b) Review the policy quarterly.";
        let score = engine().validate(&draft(text), &pool(), &BatchContext::new());
        assert_eq!(score.content_preservation, 1.0);
        assert_eq!(score.structure, 1.0);
        assert_eq!(score.readability, 1.0);
        assert!((score.composite - 1.0).abs() < 1e-9);
        assert!(engine().accept(&score));
    }

    #[test]
    fn missing_detail_is_critical() {
        let text = "Policies\na) Establish a policy aligned with ISO 27001.\nb) Review the policy.";
        let score = engine().validate(&draft(text), &pool(), &BatchContext::new());
        assert!(score.critical_count() >= 1);
        assert!(score.composite >= 0.6);
        assert!(!engine().accept(&score));
    }

    #[test]
    fn detail_inside_longer_number_does_not_count() {
        let pool = Deduplicator::default().dedupe(&[
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
        let text = "a) Report the incident to the CSIRT within 24 hours.\n\
                    b) Lock the account after 15 attempts.";
        let score = engine().validate(&draft(text), &pool, &BatchContext::new());
        let missing: Vec<&str> = score
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::MissingDetail)
            .map(|i| i.message.as_str())
            .collect();
        assert_eq!(missing.len(), 2, "{:?}", score.issues);
        assert!(score.content_preservation < 1.0);
        assert!(!engine().accept(&score));
    }

    #[test]
    fn empty_output_is_rejected() {
        let score = engine().validate(&draft("   "), &pool(), &BatchContext::new());
        assert_eq!(score.composite, 0.0);
        assert_eq!(score.issues[0].kind, IssueKind::EmptyOutput);
        assert!(!engine().accept(&score));
    }

    #[test]
    fn readability_penalties_floor_at_zero() {
        let text = "**Policies**\n<b>a) Establish ISO 27001 quarterly as appropriate, etc. and</b>";
        let score = engine().validate(&draft(text), &pool(), &BatchContext::new());
        assert!(score.readability < 1.0);
        assert!(score.readability >= 0.0);
    }

    #[test]
    fn prose_without_list_loses_structure() {
        let text = "Policies: establish a policy aligned with ISO 27001 and review it quarterly.";
        let score = engine().validate(&draft(text), &pool(), &BatchContext::new());
        assert_eq!(score.structure, 0.5);
        assert!(score.issues.iter().any(|i| i.kind == IssueKind::NoListStructure));
    }

    #[test]
    fn composite_stays_in_unit_interval() {
        let weights = ScoreWeights::default();
        let score = QualityScore::compose(&weights, 1.0, 1.0, 1.0, 1.0, Vec::new());
        assert!(score.composite <= 1.0);
        let score = QualityScore::compose(&weights, 0.0, 0.0, 0.0, 0.0, Vec::new());
        assert_eq!(score.composite, 0.0);
    }
}
