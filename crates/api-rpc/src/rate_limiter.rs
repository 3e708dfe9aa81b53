//! Rate Limiter (Token Bucket)
//!
//! Caps the request rate of the RPC layer. State is a single packed atomic,
//! so concurrent handlers never block each other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Token bucket with lock-free refill
pub struct RateLimiter {
    /// Upper 32 bits: available tokens. Lower 32 bits: ms since `epoch` of the last refill.
    packed: AtomicU64,
    epoch: Instant,
    burst: u32,
    per_second: u32,
}

fn pack(tokens: u32, at_ms: u32) -> u64 {
    ((tokens as u64) << 32) | at_ms as u64
}

fn unpack(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, (packed & 0xFFFF_FFFF) as u32)
}

impl RateLimiter {
    /// `burst` tokens at most, refilled at `per_second`
    pub fn new(burst: u32, per_second: u32) -> Self {
        Self {
            packed: AtomicU64::new(pack(burst, 0)),
            epoch: Instant::now(),
            burst,
            per_second,
        }
    }

    /// Take one token
    ///
    /// Returns false when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        loop {
            let current = self.packed.load(Ordering::Acquire);
            let (tokens, last_ms) = unpack(current);

            let now_ms = self.epoch.elapsed().as_millis() as u32;
            let refill = (now_ms.saturating_sub(last_ms) as u64 * self.per_second as u64) / 1000;
            let available = (tokens as u64 + refill).min(self.burst as u64) as u32;

            // Keep the old timestamp until at least one token was earned
            let stamp = if refill > 0 { now_ms } else { last_ms };

            if available == 0 {
                let _ = self.packed.compare_exchange(
                    current,
                    pack(0, stamp),
                    Ordering::Release,
                    Ordering::Acquire,
                );
                return false;
            }

            if self
                .packed
                .compare_exchange(
                    current,
                    pack(available - 1, stamp),
                    Ordering::Release,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Tokens left as of the last update
    pub fn remaining(&self) -> u32 {
        unpack(self.packed.load(Ordering::Acquire)).0
    }
}
