//! Log Throttling using the GCRA Algorithm
//!
//! The acquisition thread runs every few milliseconds, and formatting a log
//! line costs more than a drain pass. Warnings raised on that path go through
//! a [`WarnLimiter`], which allows a burst and then one message per period,
//! counting what it suppressed in between.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window in milliseconds over which `burst` messages may be emitted
    pub interval_ms: u64,
    /// Messages allowed at once before throttling kicks in
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5000,
            burst: 10,
        }
    }
}

impl RateLimitConfig {
    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.burst).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_millis(self.interval_ms) / burst.get();
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// Throttle for one class of warning
pub struct WarnLimiter {
    limiter: DefaultDirectRateLimiter,
    suppressed: AtomicU64,
}

impl WarnLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::direct(config.quota()),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Whether a message may be emitted now.
    ///
    /// Returns `Some(n)` where `n` is the number of messages suppressed since
    /// the last one that went through, or `None` if this one must be dropped.
    pub fn allow(&self) -> Option<u64> {
        if self.limiter.check().is_ok() {
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}
