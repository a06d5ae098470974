//! Request pacing
//!
//! Pipelines fetch one page at a time, so the limiter only has to space
//! requests out evenly. Off unless `requests_per_second` is configured.

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Steady request rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub requests_per_second: NonZeroU32,
}

impl RateLimiterConfig {
    /// `None` for a zero rate, which means unlimited
    pub fn per_second(requests_per_second: u32) -> Option<Self> {
        NonZeroU32::new(requests_per_second).map(|requests_per_second| Self {
            requests_per_second,
        })
    }

    /// Gap between two consecutive requests
    pub fn interval(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second.get()
    }
}

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Shared pacing gate in front of the HTTP client
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    limiter: Arc<DirectLimiter>,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        // Burst of one: no request may run ahead of the steady rate
        let quota = Quota::per_second(config.requests_per_second).allow_burst(NonZeroU32::MIN);
        Self {
            config: *config,
            limiter: Arc::new(Governor::direct(quota)),
            clock: DefaultClock::default(),
        }
    }

    /// Wait for the next request slot
    pub async fn wait(&self) {
        if let Err(not_until) = self.limiter.check() {
            let delay = not_until.wait_time_from(self.clock.now());
            debug!(
                delay_ms = delay.as_millis() as u64,
                requests_per_second = self.config.requests_per_second.get(),
                "Pacing request"
            );
            self.limiter.until_ready().await;
        }
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.config.requests_per_second)
            .finish_non_exhaustive()
    }
}
