//! Inbound packet flood limiting.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use tracing::debug;

/// Limits how fast one client may send packets.
///
/// Allows `rate` packets per second with bursts of up to `burst`.
pub struct PacketLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl PacketLimiter {
    /// Zero values fall back to one packet per second with no burst.
    pub fn new(rate: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(rate).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    /// Whether a packet arriving now may be processed.
    pub fn check(&self) -> bool {
        let allowed = self.limiter.check().is_ok();
        if !allowed {
            debug!("packet rate limit exceeded");
        }
        allowed
    }
}
