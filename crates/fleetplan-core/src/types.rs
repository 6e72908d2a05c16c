//! Core identifiers and the device model shared by every fleetplan crate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Threads one logical request through every component and audit event it
/// touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable classification constraining which operations may target a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EnvironmentTag {
    Lab,
    Staging,
    Production,
}

impl EnvironmentTag {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentTag::Lab => "lab",
            EnvironmentTag::Staging => "staging",
            EnvironmentTag::Production => "production",
        }
    }
}

/// Operation classes a device's capability flags may permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Interfaces,
    Routing,
    Vlans,
    System,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Interfaces => "interfaces",
            Capability::Routing => "routing",
            Capability::Vlans => "vlans",
            Capability::System => "system",
        }
    }
}

/// The set of capability flags granted to a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(capabilities: &[Capability]) -> Self {
        Self(capabilities.iter().copied().collect())
    }

    pub fn all() -> Self {
        Self::of(&[
            Capability::Interfaces,
            Capability::Routing,
            Capability::Vlans,
            Capability::System,
        ])
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Whether this capability set permits the given operation class.
    pub fn permits(&self, kind: OperationKind) -> bool {
        self.contains(kind.required_capability())
    }
}

/// Classification of a configuration change, derived from the leading segment
/// of its config path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Interface,
    Route,
    Vlan,
    System,
}

impl OperationKind {
    /// Maps a slash-separated config path onto its operation class.
    /// Paths outside the known roots fall into the system class.
    pub fn from_path(path: &str) -> Self {
        match path.split('/').next().unwrap_or("") {
            "interface" => OperationKind::Interface,
            "route" => OperationKind::Route,
            "vlan" => OperationKind::Vlan,
            _ => OperationKind::System,
        }
    }

    pub fn required_capability(self) -> Capability {
        match self {
            OperationKind::Interface => Capability::Interfaces,
            OperationKind::Route => Capability::Routing,
            OperationKind::Vlan => Capability::Vlans,
            OperationKind::System => Capability::System,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Interface => "interface",
            OperationKind::Route => "route",
            OperationKind::Vlan => "vlan",
            OperationKind::System => "system",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known health classification for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceHealth {
    Healthy,
    Degraded,
    Unreachable,
    Unknown,
}

/// A device's configuration as an ordered map of config paths to values.
pub type ConfigMap = BTreeMap<String, String>;

/// A network device, owned by the external registry and referenced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub address: String,
    pub environment: EnvironmentTag,
    pub capabilities: CapabilitySet,
    /// Opaque handle resolved through the credential store per call.
    pub credential_handle: String,
    /// Config path prefix reserved for the management plane. Changes under
    /// this prefix are never permitted.
    pub management_path: String,
    pub health: DeviceHealth,
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_from_path() {
        assert_eq!(OperationKind::from_path("interface/ge-0/0/1/mtu"), OperationKind::Interface);
        assert_eq!(OperationKind::from_path("route/static/10.0.0.0-24"), OperationKind::Route);
        assert_eq!(OperationKind::from_path("vlan/200/name"), OperationKind::Vlan);
        assert_eq!(OperationKind::from_path("ntp/server"), OperationKind::System);
        assert_eq!(OperationKind::from_path(""), OperationKind::System);
    }

    #[test]
    fn capability_set_permits_operation_classes() {
        let caps = CapabilitySet::of(&[Capability::Interfaces, Capability::Routing]);
        assert!(caps.permits(OperationKind::Interface));
        assert!(caps.permits(OperationKind::Route));
        assert!(!caps.permits(OperationKind::Vlan));
        assert!(!caps.permits(OperationKind::System));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(DeviceId::new(), DeviceId::new());
        assert_ne!(PlanId::new(), PlanId::new());
        assert_ne!(CorrelationId::new(), CorrelationId::new());
    }
}
