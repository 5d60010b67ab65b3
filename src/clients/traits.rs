use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("rate limited by generation API: {body}")]
    RateLimited { body: String },
    #[error("generation API returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("generation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("generation API returned no content")]
    EmptyResponse,
}

/// A text-completion endpoint. One call per category; implementations must
/// not retry internally.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
