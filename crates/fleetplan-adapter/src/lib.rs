//! fleetplan-adapter
//!
//! Executes operations against fleet devices over an unreliable
//! dual-transport management channel:
//! - structured API first, restricted command fallback only for
//!   allowlisted, sanitized operations
//! - transparent bounded-backoff retries for reads, never for writes
//! - per-device connection pooling and circuit breaking

pub mod adapter;
pub mod breaker;
pub mod pool;
pub mod retry;
pub mod sanitize;
pub mod transport;

pub use adapter::{AdapterConfig, DeviceAdapter};

pub mod prelude {
    pub use crate::adapter::{AdapterConfig, DeviceAdapter};
    pub use crate::breaker::{BreakerConfig, CircuitBreaker};
    pub use crate::pool::ConnectionPool;
    pub use crate::retry::RetryPolicy;
    pub use crate::sanitize::{build_read_command, build_write_command, FallbackCommand};
    pub use crate::transport::{
        ApiTransport, ApplyOutcome, CapabilityProbe, ChangeRequest, CommandOutput,
        CommandTransport, TransportKind,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
