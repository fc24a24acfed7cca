//! Structured logging setup, the ambient-stack stand-in for the original
//! project's bespoke local logger.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` layer reading its level from `RUST_LOG`,
/// defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
