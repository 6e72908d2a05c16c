//! Interfaces to external collaborators.
//!
//! The registry, credential store, and health checker live outside this
//! system; the core consumes them read-only through these traits. Concrete
//! implementations are injected into constructors, never reached through
//! globals.

use crate::error::FleetError;
use crate::types::{Device, DeviceHealth, DeviceId, EnvironmentTag};
use std::fmt;

/// Opaque device credentials, resolved per call and dropped with it.
#[derive(Clone)]
pub struct Credentials {
    pub handle: String,
    pub username: String,
    secret: String,
}

impl Credentials {
    pub fn new(
        handle: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// The secret material, handed to transports only.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub environment: Option<EnvironmentTag>,
    pub health: Option<DeviceHealth>,
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        self.environment.map_or(true, |env| device.environment == env)
            && self.health.map_or(true, |h| device.health == h)
    }
}

/// Read-only view of the device inventory.
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn lookup_device(&self, id: DeviceId) -> Result<Device, FleetError>;

    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, FleetError>;
}

/// Read-only credential resolution. Results are never logged or cached.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, device_id: DeviceId) -> Result<Credentials, FleetError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    Pass,
    Fail,
}

impl HealthVerdict {
    pub fn is_pass(self) -> bool {
        matches!(self, HealthVerdict::Pass)
    }
}

/// Post-batch health verification, also used after rollback.
#[async_trait::async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, device_id: DeviceId) -> Result<HealthVerdict, FleetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_never_prints_secret() {
        let creds = Credentials::new("handle-1", "admin", "p4ssw0rd");
        let debug = format!("{creds:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("p4ssw0rd"));
    }

    #[test]
    fn filter_matches_on_environment_and_health() {
        use crate::types::{CapabilitySet, Device};
        let device = Device {
            id: DeviceId::new(),
            name: "edge-1".to_string(),
            address: "10.0.0.1".to_string(),
            environment: EnvironmentTag::Staging,
            capabilities: CapabilitySet::all(),
            credential_handle: "h".to_string(),
            management_path: "interface/mgmt0".to_string(),
            health: DeviceHealth::Healthy,
        };
        assert!(DeviceFilter::default().matches(&device));
        let staging = DeviceFilter {
            environment: Some(EnvironmentTag::Staging),
            ..DeviceFilter::default()
        };
        assert!(staging.matches(&device));
        let production = DeviceFilter {
            environment: Some(EnvironmentTag::Production),
            ..DeviceFilter::default()
        };
        assert!(!production.matches(&device));
    }
}
