use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure loaded from unify.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub ai: AiConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Mapping resolver tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Mappings below this confidence are written to the mapping-quality log.
    pub confidence_threshold: f64,
    /// Secondary categories must score at least this share of the best score.
    pub secondary_ratio: f64,
    /// Minimum similarity for a source category hint to count as a match.
    pub hint_similarity: f64,
    pub max_categories: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            secondary_ratio: 0.5,
            hint_similarity: 0.85,
            max_categories: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Characters of normalized content compared by the semantic stage.
    pub prefix_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { prefix_chars: 100 }
    }
}

/// Fixed weights of the composite quality score
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub content_preservation: f64,
    pub structure: f64,
    pub readability: f64,
    pub consistency: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            content_preservation: 0.40,
            structure: 0.25,
            readability: 0.20,
            consistency: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.content_preservation + self.structure + self.readability + self.consistency
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub threshold: f64,
    pub weights: ScoreWeights,
    /// Subtracted from readability per detected issue.
    pub readability_penalty: f64,
    /// Subtracted from consistency per cross-category disagreement.
    pub consistency_penalty: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            weights: ScoreWeights::default(),
            readability_penalty: 0.1,
            consistency_penalty: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    pub memory_ttl_secs: u64,
    pub persistent_ttl_secs: u64,
    /// `false` keeps the cache in memory only.
    pub persistent_enabled: bool,
    /// SQLite file for the persistent tier; `None` uses
    /// [`CacheConfig::default_persistent_path`].
    pub persistent_path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 100,
            memory_ttl_secs: 300,
            persistent_ttl_secs: 7 * 24 * 60 * 60,
            persistent_enabled: true,
            persistent_path: None,
        }
    }
}

impl CacheConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_secs)
    }

    pub fn persistent_ttl(&self) -> Duration {
        Duration::from_secs(self.persistent_ttl_secs)
    }

    /// Default location of the persistent tier (~/.cache/compliance-unify/cache.db)
    pub fn default_persistent_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("compliance-unify").join("cache.db"))
    }

    /// SQLite file to open, or `None` when the persistent tier is off.
    pub fn resolved_persistent_path(&self) -> Option<PathBuf> {
        if !self.persistent_enabled {
            return None;
        }
        self.persistent_path
            .clone()
            .or_else(Self::default_persistent_path)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    /// Minimum spacing between generation calls across all categories and requests.
    pub min_interval_ms: u64,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            min_interval_ms: 2000,
            timeout_ms: 15_000,
            temperature: 0.2,
            max_tokens: 2000,
        }
    }
}

impl AiConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_key: Option<String>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            log_level: "compliance_unify=info".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn load_from_env() -> Self {
        Self {
            api_key: std::env::var("UNIFY_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "compliance_unify=info".to_string()),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses UNIFY_CONFIG environment variable or defaults to "unify.toml"
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("UNIFY_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let config_path =
            std::env::var("UNIFY_CONFIG").unwrap_or_else(|_| "unify.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            Self::from_toml_str(&content)?
        } else {
            tracing::warn!("Config file {} not found, using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();

        if config.ai.enabled && config.runtime.api_key.is_none() {
            tracing::warn!("AI consolidation enabled but no API key set; using fallback only");
            config.ai.enabled = false;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("UNIFY_AI_ENABLED") {
            self.ai.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("UNIFY_AI_BASE_URL") {
            self.ai.base_url = v;
        }
        if let Ok(v) = std::env::var("UNIFY_AI_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = std::env::var("UNIFY_AI_MIN_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.ai.min_interval_ms = v;
        }
        if let Some(v) = std::env::var("UNIFY_AI_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.ai.timeout_ms = v;
        }
        if let Some(v) = std::env::var("UNIFY_DEDUP_PREFIX_CHARS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.dedup.prefix_chars = v;
        }
        if let Some(v) = std::env::var("UNIFY_VALIDATION_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            self.validation.threshold = v;
        }
        if let Ok(v) = std::env::var("UNIFY_CACHE_PERSISTENT") {
            self.cache.persistent_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("UNIFY_CACHE_PATH") {
            self.cache.persistent_path = Some(PathBuf::from(v));
            tracing::debug!("UNIFY_CACHE_PATH env override applied");
        }
        if let Some(v) = std::env::var("UNIFY_CACHE_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.cache.memory_capacity = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if (self.validation.weights.sum() - 1.0).abs() > 1e-6 {
            anyhow::bail!(
                "validation weights must sum to 1.0, got {:.4}",
                self.validation.weights.sum()
            );
        }
        if !(0.0..=1.0).contains(&self.validation.threshold) {
            anyhow::bail!("validation.threshold must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&self.mapping.confidence_threshold) {
            anyhow::bail!("mapping.confidence_threshold must be between 0.0 and 1.0");
        }
        if self.dedup.prefix_chars == 0 {
            anyhow::bail!("dedup.prefix_chars must be > 0");
        }
        if self.cache.memory_capacity == 0 {
            anyhow::bail!("cache.memory_capacity must be > 0");
        }
        if self.mapping.max_categories == 0 {
            anyhow::bail!("mapping.max_categories must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dedup.prefix_chars, 100);
        assert_eq!(config.validation.threshold, 0.6);
        assert_eq!(config.cache.memory_capacity, 100);
        assert_eq!(config.ai.min_interval_ms, 2000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [dedup]
            prefix_chars = 60

            [validation]
            threshold = 0.7
            "#,
        )
        .unwrap();
        assert_eq!(config.dedup.prefix_chars, 60);
        assert_eq!(config.validation.threshold, 0.7);
        assert_eq!(config.validation.weights, ScoreWeights::default());
        assert_eq!(config.cache.memory_ttl_secs, 300);
    }

    #[test]
    fn persistent_tier_can_be_switched_off() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            persistent_enabled = false
            persistent_path = "/tmp/ignored.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.resolved_persistent_path(), None);

        let config = Config::from_toml_str(
            r#"
            [cache]
            persistent_path = "/tmp/unify-cache.db"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.cache.resolved_persistent_path(),
            Some(PathBuf::from("/tmp/unify-cache.db"))
        );
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut config = Config::default();
        config.validation.weights.readability = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_prefix_is_rejected() {
        let mut config = Config::default();
        config.dedup.prefix_chars = 0;
        assert!(config.validate().is_err());
    }
}
