//! Per-domain politeness: a fixed delay between requests plus random jitter

use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::time::Duration;
use tracing::trace;

/// Spaces out requests to one domain. A zero delay disables limiting.
pub struct DomainRateLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    jitter: Duration,
}

impl DomainRateLimiter {
    pub fn new(delay: Duration, jitter: Duration) -> Self {
        let limiter = Quota::with_period(delay)
            .map(|quota| RateLimiter::direct(quota.allow_burst(nonzero!(1u32))));

        Self { limiter, jitter }
    }

    /// Wait until the next request to this domain is allowed. The first
    /// request goes straight through.
    pub async fn wait(&self) {
        if let Some(limiter) = &self.limiter {
            trace!("Rate limiting: waiting for a slot");
            limiter
                .until_ready_with_jitter(Jitter::up_to(self.jitter))
                .await;
        }
    }
}
