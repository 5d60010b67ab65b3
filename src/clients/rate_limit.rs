//! Minimum-interval limiter shared by every AI call in the process.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use tracing::debug;

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock>;

/// One permit per `min_interval`, no bursts. Clones share state, so every
/// consolidator built from one limiter is throttled together.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Option<Arc<DirectLimiter>>,
    min_interval: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

impl RateLimiter {
    /// A zero interval disables throttling.
    pub fn new(min_interval: Duration) -> Self {
        let inner = Quota::with_period(min_interval)
            .map(|q| q.allow_burst(NonZeroU32::MIN))
            .map(|q| Arc::new(Governor::direct(q)));
        Self { inner, min_interval }
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits until the next call may go out.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.inner {
            if limiter.check().is_ok() {
                return;
            }
            debug!(interval_ms = self.min_interval.as_millis() as u64, "waiting for rate limiter");
            limiter.until_ready().await;
        }
    }
}
