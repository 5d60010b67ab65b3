//! AI-assisted consolidation of one category pool.
//!
//! One generation call per category, throttled by the shared [`RateLimiter`]
//! and bounded by a timeout. The returned text is untrusted: it becomes a
//! [`Draft`] that still has to pass validation.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::clients::{GenerationClient, RateLimiter};
use crate::dedup::DeduplicatedPool;
use crate::error::{Result, UnifyError};
use crate::model::{Category, Draft, Method};

#[derive(Clone)]
pub struct AiConsolidator {
    client: Arc<dyn GenerationClient>,
    limiter: RateLimiter,
    timeout: Duration,
}

impl AiConsolidator {
    pub fn new(client: Arc<dyn GenerationClient>, limiter: RateLimiter, timeout: Duration) -> Self {
        Self {
            client,
            limiter,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Single attempt. Rate limits, API failures and timeouts come back as
    /// recoverable errors; the caller decides on fallback.
    pub async fn consolidate(&self, category: &Category, pool: &DeduplicatedPool) -> Result<Draft> {
        let prompt = build_prompt(category, pool);
        self.limiter.acquire().await;

        let started = Instant::now();
        let timeout_ms = self.timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(self.timeout, self.client.generate(&prompt)).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let text = match outcome {
            Err(_) => {
                warn!(category = %category.id, timeout_ms, "generation call timed out");
                return Err(UnifyError::Timeout {
                    operation: format!("ai consolidation of {}", category.id),
                    timeout_ms,
                });
            }
            Ok(Err(e)) => {
                warn!(category = %category.id, error = %e, "generation call failed");
                return Err(e.into());
            }
            Ok(Ok(text)) => text,
        };

        debug!(
            category = %category.id,
            latency_ms,
            prompt_chars = prompt.len(),
            output_chars = text.len(),
            "ai consolidation returned"
        );
        Ok(Draft {
            text: text.trim().to_string(),
            method: Method::Ai {
                model: self.client.model().to_string(),
                latency_ms,
            },
        })
    }
}

/// Prompt carrying the full text of every retained entry, the headers to keep
/// and the details that must survive.
pub fn build_prompt(category: &Category, pool: &DeduplicatedPool) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Consolidate the following requirements for the category \"{}\" into one coherent guidance text.",
        category.name
    );
    prompt.push_str(
        "Rules:\n\
         - Merge requirements that say the same thing into one bullet.\n\
         - Use lettered bullets: a), b), c) ...\n\
         - Keep every section header below exactly as written, on its own line.\n\
         - Keep every protected detail below verbatim.\n\
         - Plain text only: no markdown, no HTML, no code fences.\n",
    );

    let headers = pool.section_headers();
    if !headers.is_empty() {
        prompt.push_str("\nSection headers:\n");
        for header in &headers {
            let _ = writeln!(prompt, "{}", header);
        }
    }

    let details = pool.protected_details();
    if !details.is_empty() {
        prompt.push_str("\nProtected details:\n");
        for detail in &details {
            let _ = writeln!(prompt, "- {}", detail.token);
        }
    }

    prompt.push_str("\nRequirements:\n");
    for entry in pool.entries() {
        let req = &entry.requirement;
        let sources = entry
            .citations()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        let _ = write!(prompt, "[{}]", sources);
        if let Some(section) = req.section.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = write!(prompt, " ({})", section.trim());
        }
        let _ = writeln!(prompt, " {}: {}", req.title, req.content());
        if !entry.carried_details.is_empty() {
            let _ = writeln!(prompt, "  also: {}", entry.carried_details.join(", "));
        }
    }
    prompt
}
