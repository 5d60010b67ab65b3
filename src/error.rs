//! Domain-specific error types for compliance-unify

use thiserror::Error;

/// Main error type for the unified requirements engine
#[derive(Error, Debug)]
pub enum UnifyError {
    #[error("Mapping error: {message}")]
    Mapping { message: String },

    #[error("Unknown framework: {framework}")]
    UnknownFramework { framework: String },

    #[error("Generation API rate limited: {message}")]
    RateLimit { message: String },

    #[error("Generation API error: {message}")]
    Api { message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Validation rejected output for {category}: composite {composite:.3}, {critical} critical issue(s)")]
    ValidationRejected {
        category: String,
        composite: f64,
        critical: usize,
    },

    #[error("Fatal configuration error for {category}: {message}")]
    FatalConfiguration { category: String, message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Requirement source error: {message}")]
    Source { message: String },

    #[error("Generation cancelled after {completed} categories")]
    Cancelled { completed: usize },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl UnifyError {
    /// Category-level failures that the orchestrator resolves by substituting
    /// the fallback consolidator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UnifyError::RateLimit { .. }
                | UnifyError::Api { .. }
                | UnifyError::Timeout { .. }
                | UnifyError::ValidationRejected { .. }
        )
    }
}

impl From<anyhow::Error> for UnifyError {
    fn from(err: anyhow::Error) -> Self {
        UnifyError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for UnifyError {
    fn from(err: serde_json::Error) -> Self {
        UnifyError::Internal {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<rusqlite::Error> for UnifyError {
    fn from(err: rusqlite::Error) -> Self {
        UnifyError::Cache {
            message: format!("sqlite: {}", err),
        }
    }
}

impl From<rmp_serde::encode::Error> for UnifyError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        UnifyError::Cache {
            message: format!("encode cache payload: {}", err),
        }
    }
}

impl From<rmp_serde::decode::Error> for UnifyError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        UnifyError::Cache {
            message: format!("decode cache payload: {}", err),
        }
    }
}

impl From<csv::Error> for UnifyError {
    fn from(err: csv::Error) -> Self {
        UnifyError::Source {
            message: format!("malformed dump row: {}", err),
        }
    }
}

impl From<std::io::Error> for UnifyError {
    fn from(err: std::io::Error) -> Self {
        UnifyError::Source {
            message: err.to_string(),
        }
    }
}

impl From<crate::clients::GenerationError> for UnifyError {
    fn from(err: crate::clients::GenerationError) -> Self {
        use crate::clients::GenerationError;
        match err {
            GenerationError::RateLimited { body } => UnifyError::RateLimit { message: body },
            GenerationError::Timeout { timeout_ms } => UnifyError::Timeout {
                operation: "generation call".to_string(),
                timeout_ms,
            },
            other => UnifyError::Api {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, UnifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(
            UnifyError::RateLimit {
                message: "429".into()
            }
            .is_recoverable()
        );
        assert!(
            UnifyError::Timeout {
                operation: "generate".into(),
                timeout_ms: 15_000
            }
            .is_recoverable()
        );
        assert!(
            !UnifyError::Mapping {
                message: "missing code".into()
            }
            .is_recoverable()
        );
        assert!(!UnifyError::Cancelled { completed: 2 }.is_recoverable());
    }

    #[test]
    fn generation_errors_map_to_recoverable_kinds() {
        use crate::clients::GenerationError;
        let err: UnifyError = GenerationError::RateLimited { body: "slow down".into() }.into();
        assert!(matches!(err, UnifyError::RateLimit { .. }));
        let err: UnifyError = GenerationError::Http { status: 500, body: "boom".into() }.into();
        assert!(matches!(err, UnifyError::Api { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn timeout_message_names_operation() {
        let err = UnifyError::Timeout {
            operation: "ai consolidation".into(),
            timeout_ms: 15_000,
        };
        assert_eq!(
            err.to_string(),
            "Timeout error: ai consolidation timed out after 15000ms"
        );
    }
}
