//! # Core Engine Module
//!
//! Aggregates the Unified Gateway and its direct collaborators: connection
//! classification, rate limiting, the frame codec, tunnel supervision,
//! health monitoring, and the connection registry.

#![forbid(unsafe_code)]

/// Symmetric encrypt/decrypt of frame payloads.
pub mod codec;
/// Ties classification, admission, the registry, and tunnels together.
pub mod gateway;
/// Periodic liveness probe of the Tunnel Supervisor.
pub mod health;
/// Per-(class, client) sliding-window admission control.
pub mod rate_limiter;
/// Tracks active client connections.
pub mod registry;
/// Maps a new connection to a trust class.
pub mod trust;
/// Starts and supervises external tunnel processes.
pub mod tunnel;

pub use codec::FrameCodec;
pub use gateway::{DesiredTunnels, FrameHandler, IngestOutcome, Transport, UnifiedGateway};
pub use health::{HealthMonitor, HealthState, VpnStatusProbe};
pub use rate_limiter::RateLimiter;
pub use registry::ConnectionRegistry;
pub use trust::{Classification, TrustClassifier};
pub use tunnel::{SharedTunnelSupervisor, TunnelSpec, TunnelSupervisor};
