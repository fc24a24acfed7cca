//! Error types for the boundaries that are allowed to raise.
//!
//! Per the error handling design, almost every internal surface in this
//! crate returns a short string, a bool, or `None` rather than a
//! `Result<_, GatewayError>`. `GatewayError` exists only for the two places
//! an outer caller needs a real error: loading TLS/config material and
//! binding the accept socket.

use thiserror::Error;

/// Failure surfaced at startup, before the gateway is accepting connections.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The workspace root configured for the filesystem tools does not
    /// exist or is not a directory.
    #[error("workspace root {0:?} is not a directory")]
    InvalidWorkspace(std::path::PathBuf),

    /// TLS certificate or key material failed to load.
    #[error("failed to load TLS material: {0}")]
    Tls(String),

    /// The accept socket could not be bound.
    #[error("failed to bind {0}: {1}")]
    Bind(std::net::SocketAddr, std::io::Error),

    /// Generic I/O failure during startup.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
