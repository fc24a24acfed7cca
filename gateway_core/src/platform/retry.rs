//! Bounded retry with backoff for platform adapters that call rate-limited
//! remote APIs. Centralizes what the original adapters each did ad hoc.

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;

/// Build an HTTP client that retries transient failures (timeouts, 5xx, and
/// a single retry on 429) with exponential backoff, and does not retry
/// 401/403/404. `max_retries` bounds total attempts.
pub fn retrying_client(max_retries: u32) -> ClientWithMiddleware {
    let backoff = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(200), Duration::from_secs(5))
        .build_with_max_retries(max_retries);

    ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(backoff))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_client() {
        let _client = retrying_client(3);
    }
}
