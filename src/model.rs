//! Core data model: frameworks, requirements, categories and the content the
//! engine hands back to collaborators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, UnifyError};
use crate::validation::QualityScore;

/// Stable identifier of a regulatory framework (e.g. `iso-27001`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameworkId(String);

impl FrameworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameworkId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Stable identifier of a taxonomy category (e.g. `governance`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A framework and its ordered tier profiles. Tier `k` (1-based) implies every
/// control of tiers `1..k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framework {
    pub id: FrameworkId,
    pub name: String,
    #[serde(default)]
    pub tiers: Vec<String>,
}

impl Framework {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: FrameworkId::new(id),
            name: name.into(),
            tiers: Vec::new(),
        }
    }

    pub fn with_tiers(mut self, tiers: &[&str]) -> Self {
        self.tiers = tiers.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn is_tiered(&self) -> bool {
        !self.tiers.is_empty()
    }

    pub fn max_tier(&self) -> Option<u8> {
        u8::try_from(self.tiers.len()).ok().filter(|&n| n > 0)
    }
}

/// One clause of a framework as delivered by the requirement source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRequirement {
    pub framework: FrameworkId,
    pub code: String,
    pub title: String,
    pub description: String,
    /// Lowest tier this control belongs to; `None` for untiered frameworks.
    #[serde(default)]
    pub tier: Option<u8>,
    /// Section header the clause sits under, reproduced verbatim in output.
    #[serde(default)]
    pub section: Option<String>,
    /// Category name assigned by the source, if any.
    #[serde(default)]
    pub category_hint: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawRequirement {
    pub fn new(
        framework: impl Into<String>,
        code: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            framework: FrameworkId::new(framework),
            code: code.into(),
            title: title.into(),
            description: description.into(),
            tier: None,
            section: None,
            category_hint: None,
            tags: Vec::new(),
        }
    }

    pub fn with_tier(mut self, tier: u8) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_category_hint(mut self, hint: impl Into<String>) -> Self {
        self.category_hint = Some(hint.into());
        self
    }

    /// Exact-duplicate key: `framework:code`.
    pub fn exact_key(&self) -> String {
        format!("{}:{}", self.framework, self.code)
    }

    /// Guidance text used for consolidation; falls back to the title when the
    /// source carries no description.
    pub fn content(&self) -> &str {
        let description = self.description.trim();
        if description.is_empty() {
            self.title.trim()
        } else {
            description
        }
    }

    pub fn citation(&self) -> Citation {
        Citation {
            framework: self.framework.clone(),
            code: self.code.clone(),
        }
    }

    /// Structural check applied before mapping.
    pub fn check_well_formed(&self) -> Result<()> {
        if self.framework.as_str().trim().is_empty() {
            return Err(UnifyError::Mapping {
                message: format!("requirement '{}' has no framework", self.code),
            });
        }
        if self.code.trim().is_empty() {
            return Err(UnifyError::Mapping {
                message: format!(
                    "requirement in framework '{}' has no control code (title: '{}')",
                    self.framework, self.title
                ),
            });
        }
        Ok(())
    }
}

/// A `(framework, code)` pair pointing back at a source clause.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub framework: FrameworkId,
    pub code: String,
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.framework, self.code)
    }
}

/// A canonical topic bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Lower-case phrases that indicate the category. Empty means the words
    /// of `name` are used.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Category {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(id),
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }
}

/// Chosen frameworks, and for tiered ones the chosen tier. Kept sorted so the
/// canonical key (and hence cache fingerprints) do not depend on the order in
/// which frameworks were picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSelection {
    frameworks: BTreeMap<FrameworkId, Option<u8>>,
}

impl FrameworkSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, framework: impl Into<String>, tier: Option<u8>) -> Self {
        self.select(FrameworkId::new(framework), tier);
        self
    }

    pub fn select(&mut self, framework: FrameworkId, tier: Option<u8>) {
        self.frameworks.insert(framework, tier);
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frameworks.len()
    }

    pub fn contains(&self, framework: &FrameworkId) -> bool {
        self.frameworks.contains_key(framework)
    }

    /// `None` if the framework is not selected, `Some(None)` if it is selected
    /// without an explicit tier.
    pub fn tier_of(&self, framework: &FrameworkId) -> Option<Option<u8>> {
        self.frameworks.get(framework).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FrameworkId, Option<u8>)> {
        self.frameworks.iter().map(|(id, tier)| (id, *tier))
    }

    /// Sorted `framework:tier` list, `*` for "no explicit tier".
    pub fn canonical_key(&self) -> String {
        self.frameworks
            .iter()
            .map(|(id, tier)| match tier {
                Some(t) => format!("{}:{}", id, t),
                None => format!("{}:*", id),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse `framework[:tier]` specs as typed on the command line.
    pub fn parse_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut selection = Self::new();
        for spec in specs {
            let spec = spec.as_ref().trim();
            if spec.is_empty() {
                continue;
            }
            let (id, tier) = match spec.rsplit_once(':') {
                Some((id, tier)) => {
                    let tier = tier.parse::<u8>().map_err(|_| UnifyError::Config {
                        message: format!("invalid tier in framework selection '{}'", spec),
                    })?;
                    (id, Some(tier))
                }
                None => (spec, None),
            };
            selection.select(FrameworkId::new(id), tier);
        }
        Ok(selection)
    }
}

/// Why the deterministic path produced a category's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    AiDisabled,
    RateLimited,
    ApiError,
    Timeout,
    ValidationRejected,
}

/// How a consolidation was produced, with method-specific details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Method {
    Ai {
        model: String,
        latency_ms: u64,
    },
    Fallback {
        reason: FallbackReason,
        merged_bullets: usize,
    },
}

impl Method {
    pub fn kind(&self) -> MethodKind {
        match self {
            Method::Ai { .. } => MethodKind::Ai,
            Method::Fallback { .. } => MethodKind::Fallback,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    Ai,
    Fallback,
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodKind::Ai => f.write_str("ai"),
            MethodKind::Fallback => f.write_str("fallback"),
        }
    }
}

/// Consolidated text that has not been validated yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub text: String,
    pub method: Method,
}

/// Whether a framework reference comes from an actual mapping or is the
/// "selected, verify applicability" placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    Mapped,
    VerifyApplicability,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkReference {
    pub framework: FrameworkId,
    pub name: String,
    pub codes: Vec<String>,
    pub applicability: Applicability,
}

/// Validated consolidation for one `(category, selection, content)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub text: String,
    pub method: Method,
    pub quality: QualityScore,
    pub framework_references: Vec<FrameworkReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub input_count: usize,
    pub retained_count: usize,
    pub absorbed_count: usize,
    pub dedup_rate: f64,
    pub method: Option<MethodKind>,
    pub from_cache: bool,
}

/// What collaborators receive per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedCategoryContent {
    pub category: Category,
    pub requirements: Vec<RawRequirement>,
    pub consolidated: Option<ConsolidationResult>,
    pub framework_references: Vec<FrameworkReference>,
    pub statistics: Statistics,
}

impl UnifiedCategoryContent {
    pub fn text(&self) -> Option<&str> {
        self.consolidated.as_ref().map(|c| c.text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_key_is_order_independent() {
        let a = FrameworkSelection::new()
            .with("nis2", None)
            .with("cis", Some(2));
        let b = FrameworkSelection::new()
            .with("cis", Some(2))
            .with("nis2", None);
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_eq!(a.canonical_key(), "cis:2,nis2:*");
    }

    #[test]
    fn parse_specs_reads_tiers() {
        let sel = FrameworkSelection::parse_specs(&["iso-27001", "cis-controls-v8:3"]).unwrap();
        assert_eq!(sel.tier_of(&FrameworkId::new("iso-27001")), Some(None));
        assert_eq!(sel.tier_of(&FrameworkId::new("cis-controls-v8")), Some(Some(3)));
        assert!(FrameworkSelection::parse_specs(&["cis:x"]).is_err());
    }

    #[test]
    fn malformed_requirement_is_rejected() {
        let missing_code = RawRequirement::new("iso-27001", " ", "Policy", "text");
        assert!(matches!(
            missing_code.check_well_formed(),
            Err(UnifyError::Mapping { .. })
        ));
        let missing_fw = RawRequirement::new("", "5.2", "Policy", "text");
        assert!(missing_fw.check_well_formed().is_err());
    }

    #[test]
    fn content_falls_back_to_title() {
        let req = RawRequirement::new("gdpr", "32", "Security of processing", "   ");
        assert_eq!(req.content(), "Security of processing");
    }

    #[test]
    fn method_serializes_with_tag() {
        let m = Method::Fallback {
            reason: FallbackReason::RateLimited,
            merged_bullets: 3,
        };
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["method"], "fallback");
        assert_eq!(v["reason"], "rate_limited");
    }
}
