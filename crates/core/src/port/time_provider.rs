// Time Provider Port (for testability)

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock that only moves when told to
    pub struct ManualTimeProvider {
        now: AtomicI64,
    }

    impl ManualTimeProvider {
        pub fn new(start_millis: i64) -> Self {
            Self {
                now: AtomicI64::new(start_millis),
            }
        }

        pub fn advance(&self, millis: i64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }

        pub fn set(&self, millis: i64) {
            self.now.store(millis, Ordering::SeqCst);
        }
    }

    impl TimeProvider for ManualTimeProvider {
        fn now_millis(&self) -> i64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    /// Epoch clock driven by tokio's clock
    ///
    /// Under `#[tokio::test(start_paused = true)]` this advances together
    /// with `tokio::time::sleep`, so timer-driven code sees consistent time.
    pub struct TokioClock {
        base_millis: i64,
        started: tokio::time::Instant,
    }

    impl TokioClock {
        pub fn new(base_millis: i64) -> Self {
            Self {
                base_millis,
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl TimeProvider for TokioClock {
        fn now_millis(&self) -> i64 {
            self.base_millis + self.started.elapsed().as_millis() as i64
        }
    }
}
