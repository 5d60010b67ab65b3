use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use super::traits::{GenerationClient, GenerationError};
use crate::config::AiConfig;

const SYSTEM_PROMPT: &str = "You consolidate regulatory requirements. Never drop dates, \
standard numbers, thresholds or named authorities. Output plain text only.";

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone, Debug)]
pub struct ChatCompletionsClient {
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(config: &AiConfig, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let client = Client::builder()
            // The consolidator enforces its own deadline; this only stops
            // orphaned connections.
            .timeout(config.timeout() + Duration::from_secs(5))
            .build()
            .map_err(|e| {
                GenerationError::Transport(format!("failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            endpoint: chat_endpoint(&config.base_url),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens
        });

        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            return Err(status_error(status, text));
        }

        let val: Value = res
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        let content = extract_content(&val)?;
        debug!(model = %self.model, chars = content.len(), "generation response received");
        Ok(content)
    }
}

fn chat_endpoint(base: &str) -> String {
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

fn status_error(status: StatusCode, body: String) -> GenerationError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited { body }
    } else {
        GenerationError::Http {
            status: status.as_u16(),
            body,
        }
    }
}

/// First choice's message content, code fences removed.
pub fn extract_content(val: &Value) -> Result<String, GenerationError> {
    let content = val
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            GenerationError::Parse("response has no choices[0].message.content".into())
        })?;
    let cleaned = strip_code_fences(content);
    if cleaned.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(cleaned)
}

/// Models often wrap plain text in ``` fences despite instructions.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_normalized() {
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://localhost:8111/v1/chat/completions"),
            "http://localhost:8111/v1/chat/completions"
        );
    }

    #[test]
    fn too_many_requests_is_rate_limit() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow".into()),
            GenerationError::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "x".into()),
            GenerationError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn content_is_extracted_and_unfenced() {
        let val = json!({"choices": [{"message": {"content": "```text\na) Keep logs.\n```"}}]});
        assert_eq!(extract_content(&val).unwrap(), "a) Keep logs.");
        let empty = json!({"choices": [{"message": {"content": "  "}}]});
        assert!(matches!(extract_content(&empty), Err(GenerationError::EmptyResponse)));
        assert!(matches!(extract_content(&json!({})), Err(GenerationError::Parse(_))));
    }
}
