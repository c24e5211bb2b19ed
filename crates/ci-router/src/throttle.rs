//! Message throttle
//!
//! Bounds how many messages per second the router starts processing,
//! independent of how many streams deliver them.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::info;

use crate::router_metrics;

#[derive(Clone)]
pub struct Throttle {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    per_second: u32,
}

impl Throttle {
    /// Evenly spaced permits, no burst. Zero disables throttling.
    pub fn per_second(messages_per_second: u32) -> Option<Self> {
        let nz = NonZeroU32::new(messages_per_second)?;
        let quota = Quota::per_second(nz).allow_burst(nonzero!(1u32));

        info!(messages_per_second, "Throttle enabled");

        Some(Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            per_second: messages_per_second,
        })
    }

    pub fn messages_per_second(&self) -> u32 {
        self.per_second
    }

    /// Wait until the next message may be processed
    pub async fn acquire(&self) {
        let start = Instant::now();
        self.limiter.until_ready().await;
        router_metrics::record_throttle_wait(start.elapsed());
    }
}
