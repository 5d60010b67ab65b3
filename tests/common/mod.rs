#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use compliance_unify::cache::{CacheStore, MemoryTier, SqliteTier};
use compliance_unify::clients::{GenerationClient, GenerationError, RateLimiter};
use compliance_unify::consolidate::AiConsolidator;
use compliance_unify::source::{InMemorySource, StaticTaxonomy};
use compliance_unify::{Config, Engine, Framework, RawRequirement};

#[derive(Clone)]
pub enum Behavior {
    /// Rebuilds the pool's content as lettered bullets from the prompt.
    Echo,
    Canned(String),
    RateLimited,
    ServerError,
    Hang(Duration),
    /// Echo, but cancels the token on the first call.
    CancelAfterFirst(CancellationToken),
    /// Echo with one phrase rewritten, e.g. to drop a protected detail.
    EchoReplacing { from: String, to: String },
}

/// Generation client driven by a fixed behavior; records every call.
pub struct ScriptedClient {
    behavior: Behavior,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedClient {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().unwrap().push(Instant::now());
        match &self.behavior {
            Behavior::Echo => Ok(echo(prompt)),
            Behavior::Canned(text) => Ok(text.clone()),
            Behavior::RateLimited => Err(GenerationError::RateLimited {
                body: "Too Many Requests".into(),
            }),
            Behavior::ServerError => Err(GenerationError::Http {
                status: 500,
                body: "internal".into(),
            }),
            Behavior::Hang(d) => {
                tokio::time::sleep(*d).await;
                Ok(echo(prompt))
            }
            Behavior::CancelAfterFirst(token) => {
                token.cancel();
                Ok(echo(prompt))
            }
            Behavior::EchoReplacing { from, to } => Ok(echo(prompt).replace(from.as_str(), to)),
        }
    }
}

/// Section headers first, then one lettered bullet per requirement line with
/// its carried details appended.
pub fn echo(prompt: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut block = "";
    let mut bullets = 0usize;
    for line in prompt.lines() {
        match line {
            "Section headers:" | "Protected details:" | "Requirements:" => {
                block = line;
                continue;
            }
            "" => {
                block = "";
                continue;
            }
            _ => {}
        }
        match block {
            "Section headers:" => out.push(line.to_string()),
            "Requirements:" if line.starts_with('[') => {
                let rest = &line[line.find(']').map(|i| i + 1).unwrap_or(0)..];
                let content = rest.split_once(": ").map(|(_, c)| c).unwrap_or(rest).trim();
                let label = char::from(b'a' + (bullets % 26) as u8);
                out.push(format!("{}) {}", label, content));
                bullets += 1;
            }
            "Requirements:" if line.starts_with("  also: ") => {
                if let Some(last) = out.last_mut() {
                    last.push_str(&format!(" Also {}.", line.trim_start_matches("  also: ")));
                }
            }
            _ => {}
        }
    }
    out.join("\n")
}

pub fn memory_cache() -> CacheStore {
    CacheStore::layered(MemoryTier::new(100, Duration::from_secs(300)), None)
}

pub fn layered_cache() -> CacheStore {
    let sqlite = SqliteTier::open_in_memory(Duration::from_secs(7 * 24 * 3600)).unwrap();
    CacheStore::layered(MemoryTier::new(100, Duration::from_secs(300)), Some(sqlite))
}

pub fn fallback_engine(source: Arc<InMemorySource>, cache: CacheStore) -> Engine {
    Engine::new(&Config::default(), source, &StaticTaxonomy::default(), cache)
}

pub fn ai_engine(
    source: Arc<InMemorySource>,
    cache: CacheStore,
    client: Arc<ScriptedClient>,
    limiter: RateLimiter,
    timeout: Duration,
) -> Engine {
    let ai = AiConsolidator::new(client, limiter, timeout);
    fallback_engine(source, cache).with_ai(ai)
}

/// Three frameworks covering several categories; `cis` is tiered.
pub fn sample_source() -> Arc<InMemorySource> {
    Arc::new(InMemorySource::new(
        vec![
            Framework::new("iso", "ISO/IEC 27001:2022"),
            Framework::new("cis", "CIS Controls v8").with_tiers(&["IG1", "IG2", "IG3"]),
            Framework::new("nis2", "NIS2 Directive"),
        ],
        vec![
            RawRequirement::new(
                "iso",
                "5.2",
                "Information security policy",
                "Top management shall establish an information security policy aligned with ISO 27001.",
            )
            .with_section("Leadership"),
            RawRequirement::new(
                "iso",
                "8.13",
                "Information backup",
                "Backup copies of information shall be maintained and tested quarterly.",
            ),
            RawRequirement::new(
                "iso",
                "8.15",
                "Logging",
                "Logs that record activities shall be produced, stored and reviewed monthly.",
            ),
            RawRequirement::new(
                "cis",
                "1.1",
                "Establish and maintain detailed enterprise asset inventory",
                "Establish and maintain an accurate, detailed and up-to-date inventory of all enterprise assets. Review and update the inventory bi-annually.",
            )
            .with_tier(1),
            RawRequirement::new(
                "cis",
                "6.5",
                "Require MFA for administrative access",
                "Require multi-factor authentication for all administrative access accounts.",
            )
            .with_tier(2),
            RawRequirement::new(
                "cis",
                "13.1",
                "Centralize security event alerting",
                "Centralize security event alerting across enterprise assets for log correlation and analysis.",
            )
            .with_tier(3),
            RawRequirement::new(
                "nis2",
                "21.2.a",
                "Policies on risk analysis",
                "Entities shall implement policies on risk analysis and information system security.",
            ),
            RawRequirement::new(
                "nis2",
                "23.4",
                "Incident reporting",
                "Notify the CSIRT or the competent authority of any significant incident within 24 hours.",
            ),
            RawRequirement::new(
                "nis2",
                "21.2.c",
                "Business continuity",
                "Ensure business continuity, such as backup management and disaster recovery, and crisis management.",
            ),
        ],
    ))
}
