//! Collaborator contracts: where requirements and the taxonomy come from.

pub mod dump;

use std::sync::RwLock;

use crate::error::{Result, UnifyError};
use crate::model::{Category, Framework, FrameworkId, RawRequirement};
use crate::taxonomy;

/// Supplies raw requirements. Implementations are expected to be cheap to call
/// repeatedly; the engine calls them once per generation request.
pub trait RequirementSource: Send + Sync {
    fn frameworks(&self) -> Vec<Framework>;

    /// Requirements of one framework. With a tier, only controls of tiers
    /// `1..=tier` (and untiered controls) are returned.
    fn list_requirements(
        &self,
        framework: &FrameworkId,
        tier: Option<u8>,
    ) -> Result<Vec<RawRequirement>>;
}

pub trait TaxonomySource: Send + Sync {
    fn list_categories(&self) -> Vec<Category>;
}

/// Fixed taxonomy, defaulting to the built-in category list.
#[derive(Debug, Clone)]
pub struct StaticTaxonomy {
    categories: Vec<Category>,
}

impl StaticTaxonomy {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }
}

impl Default for StaticTaxonomy {
    fn default() -> Self {
        Self::new(taxonomy::default_categories())
    }
}

impl TaxonomySource for StaticTaxonomy {
    fn list_categories(&self) -> Vec<Category> {
        self.categories.clone()
    }
}

/// Requirement source held in memory. Requirements can be edited in place to
/// model source content changing between generation runs.
#[derive(Debug, Default)]
pub struct InMemorySource {
    frameworks: Vec<Framework>,
    requirements: RwLock<Vec<RawRequirement>>,
}

impl InMemorySource {
    pub fn new(frameworks: Vec<Framework>, requirements: Vec<RawRequirement>) -> Self {
        Self {
            frameworks,
            requirements: RwLock::new(requirements),
        }
    }

    pub fn len(&self) -> usize {
        self.requirements.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an edit to the stored requirements.
    pub fn update<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<RawRequirement>),
    {
        let mut guard = self.requirements.write().map_err(|_| UnifyError::Internal {
            message: "requirement store lock poisoned".to_string(),
        })?;
        edit(&mut guard);
        Ok(())
    }
}

impl RequirementSource for InMemorySource {
    fn frameworks(&self) -> Vec<Framework> {
        self.frameworks.clone()
    }

    fn list_requirements(
        &self,
        framework: &FrameworkId,
        tier: Option<u8>,
    ) -> Result<Vec<RawRequirement>> {
        if !self.frameworks.iter().any(|f| &f.id == framework) {
            return Err(UnifyError::UnknownFramework {
                framework: framework.to_string(),
            });
        }
        let guard = self.requirements.read().map_err(|_| UnifyError::Internal {
            message: "requirement store lock poisoned".to_string(),
        })?;
        Ok(guard
            .iter()
            .filter(|r| &r.framework == framework)
            .filter(|r| match (tier, r.tier) {
                (Some(selected), Some(req_tier)) => req_tier <= selected,
                _ => true,
            })
            .cloned()
            .collect())
    }
}
