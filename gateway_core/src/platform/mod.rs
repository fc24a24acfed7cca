//! Platform Adapter Fabric: the uniform contract every platform implements
//! and the registry that wires adapters on demand.

/// The uniform send/receive/shutdown contract, plus the no-op fallback.
pub mod adapter;
/// On-demand adapter instantiation and supersede-and-shutdown bookkeeping.
pub mod registry;
/// Bounded retry with backoff for adapters calling rate-limited APIs.
pub mod retry;

pub use adapter::{NoopAdapter, PlatformAdapter};
pub use registry::{AdapterFactory, PlatformRegistry};
pub use retry::retrying_client;
