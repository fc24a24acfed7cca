//! Injectable time source for the rate limiter and tunnel supervisor.
//!
//! The original gateway tolerates a malformed or mocked clock in tests; the
//! Rust equivalent is a small trait so production code uses the wall clock
//! while tests can hand in a fixed or stepped one.

use std::sync::atomic::{AtomicI64, Ordering};

/// Seconds since the Unix epoch. Signed so a clock that reports times before
/// 1970 (malformed in practice) does not panic on subtraction.
pub trait Clock: Send + Sync {
    /// Current time, in seconds since the Unix epoch.
    fn now_secs(&self) -> i64;
}

/// The real wall clock, used by every production code path.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock a test can advance explicitly, standing in for the "malformed or
/// mocked clock" case the rate limiter must tolerate: a fresh `now()` is
/// always available even if a caller never advances it.
#[derive(Debug, Default)]
pub struct TestClock {
    secs: AtomicI64,
}

impl TestClock {
    /// Construct a clock starting at `secs`.
    pub fn new(secs: i64) -> Self {
        Self {
            secs: AtomicI64::new(secs),
        }
    }

    /// Move the clock forward by `delta` seconds.
    pub fn advance(&self, delta: i64) {
        self.secs.fetch_add(delta, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set(&self, secs: i64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_secs(&self) -> i64 {
        self.secs.load(Ordering::SeqCst)
    }
}
