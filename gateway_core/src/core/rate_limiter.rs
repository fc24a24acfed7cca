//! Per-(class, client) sliding-window admission control.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::model::{ConnectionClass, RateLimits};

/// Class-keyed bucket table, one ordered timestamp sequence per client id.
///
/// The clock is injectable so tests don't depend on wall-clock timing; the
/// admission check itself is synchronous so it never becomes a suspension
/// point in the per-connection read loop.
pub struct RateLimiter {
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<(ConnectionClass, String), Vec<i64>>>,
}

impl RateLimiter {
    /// Build a limiter using the real wall clock.
    pub fn new(limits: RateLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    /// Build a limiter against an explicit clock, for tests.
    pub fn with_clock(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one request for `(class, client_id)`. Prunes timestamps older
    /// than `now - window` before deciding. Returns `false` once the
    /// class's cap is reached within the window.
    pub async fn admit(&self, class: ConnectionClass, client_id: &str) -> bool {
        let (cap, window) = self.limits.for_class(class);
        let now = self.now();
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry((class, client_id.to_string()))
            .or_insert_with(Vec::new);
        bucket.retain(|ts| now - *ts < window);
        if bucket.len() as u32 >= cap {
            return false;
        }
        bucket.push(now);
        true
    }

    /// Current timestamp from the injected clock. Kept as a distinct method
    /// so the call site reads clearly rather than being buried in `admit`.
    fn now(&self) -> i64 {
        self.clock.now_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn limiter_with_cap(cap: u32, window: i64) -> (RateLimiter, Arc<TestClock>) {
        let clock = Arc::new(TestClock::new(0));
        let limits = RateLimits {
            local: (cap, window),
            vpn: (cap, window),
            tunneled: (cap, window),
            direct: (cap, window),
        };
        (RateLimiter::with_clock(limits, clock.clone()), clock)
    }

    #[tokio::test]
    async fn admits_up_to_cap_then_denies() {
        let (limiter, _clock) = limiter_with_cap(3, 60);
        for _ in 0..3 {
            assert!(limiter.admit(ConnectionClass::Local, "c1").await);
        }
        assert!(!limiter.admit(ConnectionClass::Local, "c1").await);
    }

    #[tokio::test]
    async fn window_elapsing_restores_admission() {
        let (limiter, clock) = limiter_with_cap(1, 60);
        assert!(limiter.admit(ConnectionClass::Local, "c1").await);
        assert!(!limiter.admit(ConnectionClass::Local, "c1").await);
        clock.advance(61);
        assert!(limiter.admit(ConnectionClass::Local, "c1").await);
    }

    #[tokio::test]
    async fn classes_and_clients_are_independent() {
        let (limiter, _clock) = limiter_with_cap(1, 60);
        assert!(limiter.admit(ConnectionClass::Local, "c1").await);
        assert!(limiter.admit(ConnectionClass::Vpn, "c1").await);
        assert!(limiter.admit(ConnectionClass::Local, "c2").await);
        assert!(!limiter.admit(ConnectionClass::Local, "c1").await);
    }
}
