//! Token bucket for the submission methods
//!
//! Lock-free: the bucket level and the last refill instant share one atomic word.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Fixed-point scale for the bucket level (1 token = 1000 units)
const UNIT: u64 = 1000;

/// Burst size and sustained rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub burst: u32,
    pub per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 20,
            per_second: 5,
        }
    }
}

pub struct RateLimiter {
    // Upper 32 bits: level in UNITs. Lower 32 bits: ms since `epoch` at last refill.
    bucket: AtomicU64,
    epoch: Instant,
    config: RateLimitConfig,
}

fn pack(level: u64, at_ms: u64) -> u64 {
    (level << 32) | (at_ms & 0xFFFF_FFFF)
}

fn unpack(word: u64) -> (u64, u64) {
    (word >> 32, word & 0xFFFF_FFFF)
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let capacity = config.burst.max(1) as u64 * UNIT;
        Self {
            bucket: AtomicU64::new(pack(capacity, 0)),
            epoch: Instant::now(),
            config,
        }
    }

    fn capacity(&self) -> u64 {
        self.config.burst.max(1) as u64 * UNIT
    }

    /// Take one token. Returns false when the caller should be throttled.
    pub fn try_acquire(&self) -> bool {
        let now_ms = (self.epoch.elapsed().as_millis() as u64) & 0xFFFF_FFFF;
        loop {
            let current = self.bucket.load(Ordering::Acquire);
            let (level, last_ms) = unpack(current);

            // per_second tokens per 1000 ms, so UNIT cancels out
            let refill = now_ms.saturating_sub(last_ms) * self.config.per_second as u64;
            let level = (level + refill).min(self.capacity());

            let (next, allowed) = if level >= UNIT {
                (level - UNIT, true)
            } else {
                (level, false)
            };

            if self
                .bucket
                .compare_exchange(
                    current,
                    pack(next, now_ms),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return allowed;
            }
        }
    }

    /// Whole tokens currently available, without refilling
    pub fn available(&self) -> u32 {
        let (level, _) = unpack(self.bucket.load(Ordering::Acquire));
        (level / UNIT) as u32
    }
}
