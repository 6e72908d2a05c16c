//! Pre-flight plan validation.
//!
//! Collects every violation before returning, never failing fast on the
//! first: operators need the complete picture to fix a plan in one pass.
//! Capability policy is decided here, once, against the tagged capability
//! set; the adapter only ever re-checks its own fallback allowlist.

use crate::plan::Plan;
use fleetplan_core::error::FleetError;
use fleetplan_core::external::DeviceRegistry;
use fleetplan_core::types::{Device, DeviceId, EnvironmentTag};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationRule {
    UnknownDevice,
    MixedEnvironments,
    CapabilityDenied,
    ProtectedPath,
    DuplicateChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: ViolationRule,
    pub device_id: Option<DeviceId>,
    pub detail: String,
}

impl Violation {
    fn new(rule: ViolationRule, device_id: Option<DeviceId>, detail: impl Into<String>) -> Self {
        Self {
            rule,
            device_id,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidatorConfig {
    /// Plans mixing environment tags are rejected unless this is set.
    pub allow_cross_environment: bool,
}

pub struct PlanValidator {
    registry: Arc<dyn DeviceRegistry>,
    config: ValidatorConfig,
}

impl PlanValidator {
    pub fn new(registry: Arc<dyn DeviceRegistry>, config: ValidatorConfig) -> Self {
        Self { registry, config }
    }

    /// Returns every violation found in the plan. An empty list means the
    /// plan may move to Validated.
    pub async fn validate(&self, plan: &Plan) -> Result<Vec<Violation>, FleetError> {
        let mut violations = Vec::new();
        let mut devices: BTreeMap<DeviceId, Device> = BTreeMap::new();

        for device_id in &plan.device_order {
            match self.registry.lookup_device(*device_id).await {
                Ok(device) => {
                    devices.insert(*device_id, device);
                }
                Err(err) if err.code == fleetplan_core::ErrorCode::NotFound => {
                    violations.push(Violation::new(
                        ViolationRule::UnknownDevice,
                        Some(*device_id),
                        format!("device {device_id} is not in the registry"),
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        let environments: BTreeSet<EnvironmentTag> =
            devices.values().map(|d| d.environment).collect();
        if environments.len() > 1 && !self.config.allow_cross_environment {
            violations.push(Violation::new(
                ViolationRule::MixedEnvironments,
                None,
                format!(
                    "plan spans environments {:?} without cross-environment permission",
                    environments.iter().map(|e| e.as_str()).collect::<Vec<_>>()
                ),
            ));
        }

        for change in &plan.changes {
            let Some(device) = devices.get(&change.device_id) else {
                continue;
            };
            if !device.capabilities.permits(change.kind) {
                violations.push(Violation::new(
                    ViolationRule::CapabilityDenied,
                    Some(device.id),
                    format!(
                        "device {} lacks the {} capability for {}",
                        device.name,
                        change.kind.required_capability().as_str(),
                        change.path
                    ),
                ));
            }
            if change.path.starts_with(&device.management_path) {
                violations.push(Violation::new(
                    ViolationRule::ProtectedPath,
                    Some(device.id),
                    format!("{} targets the protected management path", change.path),
                ));
            }
        }

        let mut seen = BTreeSet::new();
        for change in &plan.changes {
            if !seen.insert(change.idempotency_key.clone()) {
                violations.push(Violation::new(
                    ViolationRule::DuplicateChange,
                    Some(change.device_id),
                    format!("duplicate change for {}", change.path),
                ));
            }
        }

        Ok(violations)
    }
}
