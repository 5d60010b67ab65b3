//! Generation orchestrator.
//!
//! One request resolves the selection, maps every selected requirement once,
//! then walks the taxonomy in canonical order. Each category moves through
//! `Pending -> Mapped -> Deduped -> (AiAttempted | Fallback) -> Validated ->
//! Cached`; a fallback that fails validation ends in `Fatal` for that category
//! only. Categories run one after another so the shared rate limiter and the
//! batch consistency check both see a stable sequence.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CacheStore, Fingerprint, MemoryTier, SqliteTier};
use crate::clients::{ChatCompletionsClient, RateLimiter};
use crate::config::Config;
use crate::consolidate::AiConsolidator;
use crate::dedup::{DeduplicatedPool, Deduplicator};
use crate::error::{Result, UnifyError};
use crate::fallback::FallbackConsolidator;
use crate::mapping::{MappingAudit, MappingResolver};
use crate::model::{
    Applicability, Category, CategoryId, Citation, ConsolidationResult, Draft, FallbackReason,
    Framework, FrameworkId, FrameworkReference, FrameworkSelection, RawRequirement, Statistics,
    UnifiedCategoryContent,
};
use crate::source::{RequirementSource, TaxonomySource};
use crate::validation::{BatchContext, QualityScore, ValidationEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryStage {
    Pending,
    Mapped,
    Deduped,
    AiAttempted,
    Fallback,
    Validated,
    Cached,
    Fatal,
}

impl fmt::Display for CategoryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CategoryStage::Pending => "pending",
            CategoryStage::Mapped => "mapped",
            CategoryStage::Deduped => "deduped",
            CategoryStage::AiAttempted => "ai_attempted",
            CategoryStage::Fallback => "fallback",
            CategoryStage::Validated => "validated",
            CategoryStage::Cached => "cached",
            CategoryStage::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

struct StageTracker<'a> {
    category: &'a CategoryId,
    stage: CategoryStage,
}

impl<'a> StageTracker<'a> {
    fn new(category: &'a CategoryId) -> Self {
        Self {
            category,
            stage: CategoryStage::Pending,
        }
    }

    fn advance(&mut self, next: CategoryStage) {
        debug!(category = %self.category, from = %self.stage, to = %next, "category stage");
        self.stage = next;
    }
}

/// Per-category result of a generation run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Ready(UnifiedCategoryContent),
    /// The fallback text itself failed validation.
    Fatal {
        category: Category,
        message: String,
        quality: QualityScore,
    },
}

impl CategoryOutcome {
    pub fn category(&self) -> &Category {
        match self {
            CategoryOutcome::Ready(content) => &content.category,
            CategoryOutcome::Fatal { category, .. } => category,
        }
    }

    pub fn content(&self) -> Option<&UnifiedCategoryContent> {
        match self {
            CategoryOutcome::Ready(content) => Some(content),
            CategoryOutcome::Fatal { .. } => None,
        }
    }

    pub fn error(&self) -> Option<UnifyError> {
        match self {
            CategoryOutcome::Ready(_) => None,
            CategoryOutcome::Fatal {
                category, message, ..
            } => Some(UnifyError::FatalConfiguration {
                category: category.id.to_string(),
                message: message.clone(),
            }),
        }
    }
}

/// Everything one `generate` call produced, categories in taxonomy order.
#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub run_id: Uuid,
    pub selection: FrameworkSelection,
    pub categories: Vec<CategoryOutcome>,
    pub unmapped: Vec<Citation>,
    pub low_confidence: Vec<MappingAudit>,
}

impl Generation {
    pub fn get(&self, category: &CategoryId) -> Option<&CategoryOutcome> {
        self.categories.iter().find(|o| o.category().id == *category)
    }

    pub fn content(&self, category: &CategoryId) -> Option<&UnifiedCategoryContent> {
        self.get(category).and_then(CategoryOutcome::content)
    }

    pub fn contents(&self) -> impl Iterator<Item = &UnifiedCategoryContent> {
        self.categories.iter().filter_map(CategoryOutcome::content)
    }

    pub fn fatal(&self) -> impl Iterator<Item = &CategoryOutcome> {
        self.categories
            .iter()
            .filter(|o| matches!(o, CategoryOutcome::Fatal { .. }))
    }
}

pub struct Engine {
    source: Arc<dyn RequirementSource>,
    categories: Vec<Category>,
    resolver: MappingResolver,
    deduplicator: Deduplicator,
    fallback: FallbackConsolidator,
    ai: Option<AiConsolidator>,
    validator: ValidationEngine,
    cache: CacheStore,
    cache_ttl: Duration,
}

impl Engine {
    /// Fallback-only engine; attach AI with [`Engine::with_ai`].
    pub fn new(
        config: &Config,
        source: Arc<dyn RequirementSource>,
        taxonomy: &dyn TaxonomySource,
        cache: CacheStore,
    ) -> Self {
        let categories = taxonomy.list_categories();
        Self {
            source,
            resolver: MappingResolver::new(categories.clone(), config.mapping.clone()),
            categories,
            deduplicator: Deduplicator::new(config.dedup.prefix_chars),
            fallback: FallbackConsolidator::new(),
            ai: None,
            validator: ValidationEngine::new(config.validation.clone()),
            cache,
            cache_ttl: config.cache.persistent_ttl(),
        }
    }

    pub fn with_ai(mut self, ai: AiConsolidator) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Engine wired from configuration: memory cache in front of the SQLite
    /// tier, and the chat-completions client when AI is enabled. Pass the same
    /// limiter to every engine sharing an API key.
    pub fn from_config(
        config: &Config,
        source: Arc<dyn RequirementSource>,
        taxonomy: &dyn TaxonomySource,
        limiter: RateLimiter,
    ) -> Result<Self> {
        let memory = MemoryTier::new(config.cache.memory_capacity, config.cache.memory_ttl());
        let persistent = config.cache.resolved_persistent_path().and_then(|path| {
            match SqliteTier::open(&path, config.cache.persistent_ttl()) {
                Ok(tier) => Some(tier),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "persistent cache unavailable; memory only"
                    );
                    None
                }
            }
        });
        if let Some(tier) = &persistent
            && let Err(e) = tier.purge_expired()
        {
            warn!(error = %e, "failed to purge expired cache rows");
        }

        let engine = Self::new(config, source, taxonomy, CacheStore::layered(memory, persistent));
        match (config.ai.enabled, config.runtime.api_key.as_deref()) {
            (true, Some(key)) => {
                let client = ChatCompletionsClient::new(&config.ai, key)?;
                let ai = AiConsolidator::new(Arc::new(client), limiter, config.ai.timeout());
                info!(model = %ai.model(), "AI consolidation enabled");
                Ok(engine.with_ai(ai))
            }
            _ => {
                info!("AI consolidation disabled; using fallback only");
                Ok(engine)
            }
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Drops cached results of one category from every tier.
    pub fn invalidate_category(&self, category: &CategoryId) -> usize {
        let removed = self.cache.invalidate(category);
        info!(%category, removed, "category cache invalidated");
        removed
    }

    pub async fn generate(&self, selection: &FrameworkSelection) -> Result<Generation> {
        self.generate_with_cancel(selection, &CancellationToken::new())
            .await
    }

    /// Like [`Engine::generate`], checking `cancel` before each category.
    pub async fn generate_with_cancel(
        &self,
        selection: &FrameworkSelection,
        cancel: &CancellationToken,
    ) -> Result<Generation> {
        let run_id = Uuid::new_v4();
        let frameworks = self.resolve_selection(selection)?;
        let selection = normalized(selection, &frameworks);

        let mut requirements: Vec<RawRequirement> = Vec::new();
        for (framework, tier) in selection.iter() {
            requirements.extend(self.source.list_requirements(framework, tier)?);
        }
        let mapping = self.resolver.resolve(&requirements, &selection)?;
        info!(
            %run_id,
            frameworks = selection.len(),
            requirements = mapping.considered,
            unmapped = mapping.unmapped.len(),
            "generation started"
        );

        let mut batch = BatchContext::new();
        let mut outcomes = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            if cancel.is_cancelled() {
                info!(%run_id, completed = outcomes.len(), "generation cancelled");
                return Err(UnifyError::Cancelled {
                    completed: outcomes.len(),
                });
            }
            let pool = mapping.pool(&category.id);
            let outcome = self
                .process_category(category, pool, &selection, &frameworks, &mut batch)
                .await;
            outcomes.push(outcome);
        }

        let generation = Generation {
            run_id,
            selection,
            categories: outcomes,
            unmapped: mapping.unmapped,
            low_confidence: mapping.low_confidence,
        };
        log_summary(&generation);
        Ok(generation)
    }

    /// Every selected framework must exist; an explicit tier must be within
    /// the framework's range.
    fn resolve_selection(
        &self,
        selection: &FrameworkSelection,
    ) -> Result<HashMap<FrameworkId, Framework>> {
        let known: HashMap<FrameworkId, Framework> = self
            .source
            .frameworks()
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        for (id, tier) in selection.iter() {
            let framework = known.get(id).ok_or_else(|| UnifyError::UnknownFramework {
                framework: id.to_string(),
            })?;
            if let Some(tier) = tier {
                let max = framework.max_tier().unwrap_or(0);
                if tier == 0 || tier > max {
                    return Err(UnifyError::Config {
                        message: format!(
                            "tier {} out of range for {} (available: {})",
                            tier,
                            id,
                            if max == 0 { "none".to_string() } else { format!("1..={}", max) }
                        ),
                    });
                }
            }
        }
        Ok(known)
    }

    async fn process_category(
        &self,
        category: &Category,
        pool: &[RawRequirement],
        selection: &FrameworkSelection,
        frameworks: &HashMap<FrameworkId, Framework>,
        batch: &mut BatchContext,
    ) -> CategoryOutcome {
        let mut stage = StageTracker::new(&category.id);
        stage.advance(CategoryStage::Mapped);

        if pool.is_empty() {
            return CategoryOutcome::Ready(UnifiedCategoryContent {
                category: category.clone(),
                requirements: Vec::new(),
                consolidated: None,
                framework_references: unmapped_references(selection, frameworks),
                statistics: Statistics {
                    input_count: 0,
                    retained_count: 0,
                    absorbed_count: 0,
                    dedup_rate: 0.0,
                    method: None,
                    from_cache: false,
                },
            });
        }

        let deduped = self.deduplicator.dedupe(pool);
        stage.advance(CategoryStage::Deduped);
        let references = mapped_references(&deduped, selection, frameworks);
        let fingerprint = Fingerprint::compute(&category.id, selection, &deduped);

        if let Some(entry) = self.cache.get(&fingerprint) {
            stage.advance(CategoryStage::Cached);
            batch.record(&entry.result.text);
            return CategoryOutcome::Ready(content(
                category,
                &deduped,
                entry.result,
                references,
                true,
            ));
        }

        let draft = match self.try_ai(category, &deduped, batch, &mut stage).await {
            Ok(accepted) => Ok(accepted),
            Err(reason) => {
                stage.advance(CategoryStage::Fallback);
                Err(self.fallback.consolidate(&deduped, reason))
            }
        };
        let (draft, quality) = match draft {
            Ok(accepted) => accepted,
            Err(fallback) => {
                let quality = self.validator.validate(&fallback, &deduped, batch);
                if !self.validator.accept(&quality) {
                    stage.advance(CategoryStage::Fatal);
                    let message = format!(
                        "fallback output failed validation (composite {:.3}, {} critical issue(s))",
                        quality.composite,
                        quality.critical_count()
                    );
                    error!(category = %category.id, %message, "category failed");
                    return CategoryOutcome::Fatal {
                        category: category.clone(),
                        message,
                        quality,
                    };
                }
                (fallback, quality)
            }
        };
        stage.advance(CategoryStage::Validated);

        let result = ConsolidationResult {
            text: draft.text,
            method: draft.method,
            quality,
            framework_references: references.clone(),
        };
        batch.record(&result.text);
        let entry = self
            .cache
            .put(fingerprint, category.id.clone(), result, self.cache_ttl);
        stage.advance(CategoryStage::Cached);
        CategoryOutcome::Ready(content(category, &deduped, entry.result, references, false))
    }

    /// Accepted AI draft with its score, or the reason to fall back. Exactly
    /// one generation call; no retries.
    async fn try_ai(
        &self,
        category: &Category,
        pool: &DeduplicatedPool,
        batch: &BatchContext,
        stage: &mut StageTracker<'_>,
    ) -> std::result::Result<(Draft, QualityScore), FallbackReason> {
        let Some(ai) = &self.ai else {
            return Err(FallbackReason::AiDisabled);
        };
        stage.advance(CategoryStage::AiAttempted);
        let draft = match ai.consolidate(category, pool).await {
            Ok(draft) => draft,
            Err(e) => {
                let reason = match e {
                    UnifyError::RateLimit { .. } => FallbackReason::RateLimited,
                    UnifyError::Timeout { .. } => FallbackReason::Timeout,
                    _ => FallbackReason::ApiError,
                };
                warn!(
                    category = %category.id,
                    error = %e,
                    ?reason,
                    "AI consolidation failed; using fallback"
                );
                return Err(reason);
            }
        };

        let quality = self.validator.validate(&draft, pool, batch);
        if self.validator.accept(&quality) {
            return Ok((draft, quality));
        }
        let rejection = UnifyError::ValidationRejected {
            category: category.id.to_string(),
            composite: quality.composite,
            critical: quality.critical_count(),
        };
        warn!(category = %category.id, error = %rejection, "AI draft rejected; using fallback");
        Err(FallbackReason::ValidationRejected)
    }
}

/// Tiered frameworks selected without a tier resolve to their highest tier.
fn normalized(
    selection: &FrameworkSelection,
    frameworks: &HashMap<FrameworkId, Framework>,
) -> FrameworkSelection {
    let mut out = FrameworkSelection::new();
    for (id, tier) in selection.iter() {
        let tier = tier.or_else(|| frameworks.get(id).and_then(Framework::max_tier));
        out.select(id.clone(), tier);
    }
    out
}

fn framework_name(id: &FrameworkId, frameworks: &HashMap<FrameworkId, Framework>) -> String {
    frameworks
        .get(id)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// One reference per selected framework that contributed to the pool, in
/// selection order, with retained and absorbed codes.
fn mapped_references(
    pool: &DeduplicatedPool,
    selection: &FrameworkSelection,
    frameworks: &HashMap<FrameworkId, Framework>,
) -> Vec<FrameworkReference> {
    let citations = pool.citations();
    selection
        .iter()
        .filter_map(|(id, _)| {
            let mut codes: Vec<String> = Vec::new();
            for c in citations.iter().filter(|c| c.framework == *id) {
                if !codes.contains(&c.code) {
                    codes.push(c.code.clone());
                }
            }
            (!codes.is_empty()).then(|| FrameworkReference {
                framework: id.clone(),
                name: framework_name(id, frameworks),
                codes,
                applicability: Applicability::Mapped,
            })
        })
        .collect()
}

/// "Selected, verify applicability" references for a category nothing mapped
/// into. Empty when nothing is selected.
fn unmapped_references(
    selection: &FrameworkSelection,
    frameworks: &HashMap<FrameworkId, Framework>,
) -> Vec<FrameworkReference> {
    selection
        .iter()
        .map(|(id, _)| FrameworkReference {
            framework: id.clone(),
            name: framework_name(id, frameworks),
            codes: Vec::new(),
            applicability: Applicability::VerifyApplicability,
        })
        .collect()
}

fn content(
    category: &Category,
    pool: &DeduplicatedPool,
    result: ConsolidationResult,
    references: Vec<FrameworkReference>,
    from_cache: bool,
) -> UnifiedCategoryContent {
    UnifiedCategoryContent {
        category: category.clone(),
        requirements: pool.requirements(),
        statistics: Statistics {
            input_count: pool.input_len(),
            retained_count: pool.len(),
            absorbed_count: pool.absorbed_count(),
            dedup_rate: pool.dedup_rate(),
            method: Some(result.method.kind()),
            from_cache,
        },
        framework_references: references,
        consolidated: Some(result),
    }
}

fn log_summary(generation: &Generation) {
    let mut ai = 0;
    let mut fallback = 0;
    let mut cached = 0;
    for content in generation.contents() {
        if content.statistics.from_cache {
            cached += 1;
        }
        match content.statistics.method {
            Some(crate::model::MethodKind::Ai) => ai += 1,
            Some(crate::model::MethodKind::Fallback) => fallback += 1,
            None => {}
        }
    }
    info!(
        run_id = %generation.run_id,
        categories = generation.categories.len(),
        ai,
        fallback,
        cached,
        fatal = generation.fatal().count(),
        "generation finished"
    );
}
