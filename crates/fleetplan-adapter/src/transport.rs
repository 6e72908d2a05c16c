//! Transport seams.
//!
//! The adapter is transport-agnostic to its callers. The structured API is
//! the preferred channel; the restricted command channel is a fallback only.
//! Both report results through the same [`ApplyOutcome`] shape.

use crate::sanitize::FallbackCommand;
use fleetplan_core::error::FleetError;
use fleetplan_core::external::Credentials;
use fleetplan_core::types::{ConfigMap, Device, DeviceId, OperationKind};
use serde::{Deserialize, Serialize};

/// Result of probing whether the structured API supports an operation on a
/// given device version/configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityProbe {
    Supported,
    Unsupported,
}

/// One write as seen by a transport: set a config path, or clear it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub kind: OperationKind,
    pub path: String,
    /// `None` removes the path.
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Api,
    Command,
}

/// Structurally identical regardless of which transport carried the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub device_id: DeviceId,
    pub path: String,
    pub transport: TransportKind,
}

/// The structured management API.
#[async_trait::async_trait]
pub trait ApiTransport: Send + Sync {
    async fn probe(
        &self,
        device: &Device,
        credentials: &Credentials,
        kind: OperationKind,
    ) -> Result<CapabilityProbe, FleetError>;

    async fn read_config(
        &self,
        device: &Device,
        credentials: &Credentials,
    ) -> Result<ConfigMap, FleetError>;

    async fn apply(
        &self,
        device: &Device,
        credentials: &Credentials,
        change: &ChangeRequest,
    ) -> Result<(), FleetError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
}

/// The restricted command channel. Only ever handed pre-sanitized,
/// allowlisted [`FallbackCommand`]s.
#[async_trait::async_trait]
pub trait CommandTransport: Send + Sync {
    async fn run(
        &self,
        device: &Device,
        credentials: &Credentials,
        command: &FallbackCommand,
    ) -> Result<CommandOutput, FleetError>;
}

/// Parses `show-config` output: one `path value` pair per line.
pub fn parse_show_config(stdout: &str) -> ConfigMap {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let (path, value) = line.split_once(char::is_whitespace)?;
            Some((path.to_string(), value.trim().to_string()))
        })
        .collect()
}
