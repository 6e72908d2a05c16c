//! fleetplan-core
//!
//! Shared foundation for the fleetplan workspace:
//! - identifier and device model types
//! - the closed error taxonomy surfaced to callers
//! - the append-only, hash-chained audit trail
//! - keyed-hash approval-token primitives
//! - traits for the external registry, credential store, and health checker

pub mod audit;
pub mod error;
pub mod external;
pub mod token;
pub mod types;

pub use error::{ErrorCode, FleetError};
pub use types::*;

pub mod prelude {
    pub use crate::audit::{AuditError, AuditEvent, AuditSink, MemoryAuditSink};
    pub use crate::error::{ErrorCode, ErrorContext, FleetError};
    pub use crate::external::{
        CredentialStore, Credentials, DeviceFilter, DeviceRegistry, HealthChecker, HealthVerdict,
    };
    pub use crate::token::{ApprovalToken, TokenSecret};
    pub use crate::types::{
        Capability, CapabilitySet, ConfigMap, CorrelationId, Device, DeviceHealth, DeviceId,
        EnvironmentTag, EventId, OperationKind, PlanId,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
