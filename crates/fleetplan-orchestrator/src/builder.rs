//! Plan construction.
//!
//! Reads current state per device through the adapter (read-only), diffs it
//! against the desired overlay, and produces an ordered change list plus a
//! human-readable summary. Pure with respect to devices: no writes.

use crate::plan::{Change, Plan, RiskRating};
use fleetplan_adapter::DeviceAdapter;
use fleetplan_core::error::FleetError;
use fleetplan_core::external::DeviceRegistry;
use fleetplan_core::types::{ConfigMap, Device, DeviceId, EnvironmentTag};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Desired configuration, one partial overlay per target device. Paths not
/// listed are left untouched.
pub type DesiredState = BTreeMap<DeviceId, ConfigMap>;

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Ceiling on a plan's target device set.
    pub max_devices: usize,
    /// Change count beyond which a plan is rated high risk.
    pub high_risk_change_count: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_devices: 16,
            high_risk_change_count: 20,
        }
    }
}

pub struct PlanBuilder {
    adapter: Arc<DeviceAdapter>,
    registry: Arc<dyn DeviceRegistry>,
    config: BuilderConfig,
}

impl PlanBuilder {
    pub fn new(
        adapter: Arc<DeviceAdapter>,
        registry: Arc<dyn DeviceRegistry>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            adapter,
            registry,
            config,
        }
    }

    pub async fn compute_plan(
        &self,
        targets: &[DeviceId],
        desired: &DesiredState,
        creator: &str,
    ) -> Result<Plan, FleetError> {
        if targets.is_empty() {
            return Err(FleetError::validation("plan targets no devices"));
        }
        let mut ordered: Vec<DeviceId> = Vec::with_capacity(targets.len());
        for target in targets {
            if !ordered.contains(target) {
                ordered.push(*target);
            }
        }
        if ordered.len() > self.config.max_devices {
            return Err(FleetError::validation(format!(
                "plan targets {} devices, ceiling is {}",
                ordered.len(),
                self.config.max_devices
            )));
        }

        let mut changes = Vec::new();
        let mut devices = Vec::with_capacity(ordered.len());
        for device_id in &ordered {
            let device = self.registry.lookup_device(*device_id).await?;
            let overlay = desired.get(device_id).ok_or_else(|| {
                FleetError::validation(format!(
                    "no desired state provided for device {device_id}"
                ))
                .with_device(*device_id)
            })?;
            let current = self.adapter.read_state(&device).await?;
            changes.extend(diff_device(*device_id, &current, overlay));
            devices.push(device);
        }

        let risk = self.rate_risk(&devices, changes.len());
        let summary = summarize(&devices, &changes);
        tracing::debug!(
            devices = devices.len(),
            changes = changes.len(),
            "plan computed"
        );
        Ok(Plan::new(creator, ordered, changes, summary, risk))
    }

    fn rate_risk(&self, devices: &[Device], change_count: usize) -> RiskRating {
        let production = devices
            .iter()
            .any(|d| d.environment == EnvironmentTag::Production);
        if production || change_count > self.config.high_risk_change_count {
            RiskRating::High
        } else if devices.len() > 1
            || devices.iter().any(|d| d.environment == EnvironmentTag::Staging)
        {
            RiskRating::Moderate
        } else {
            RiskRating::Low
        }
    }
}

/// Changes for one device: every overlay path whose current value differs.
fn diff_device(device_id: DeviceId, current: &ConfigMap, overlay: &ConfigMap) -> Vec<Change> {
    overlay
        .iter()
        .filter(|(path, value)| current.get(*path) != Some(*value))
        .map(|(path, value)| {
            Change::new(device_id, path, current.get(path).cloned(), Some(value.clone()))
        })
        .collect()
}

fn summarize(devices: &[Device], changes: &[Change]) -> String {
    let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
    for change in changes {
        *by_kind.entry(change.kind.as_str()).or_default() += 1;
    }
    let kinds = if by_kind.is_empty() {
        "no changes".to_string()
    } else {
        by_kind
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("{} change(s) across {} device(s): {kinds}", changes.len(), devices.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_emits_only_divergent_paths() {
        let device = DeviceId::new();
        let mut current = ConfigMap::new();
        current.insert("interface/ge-0/0/1/mtu".into(), "1500".into());
        current.insert("vlan/200/name".into(), "storage".into());

        let mut overlay = ConfigMap::new();
        overlay.insert("interface/ge-0/0/1/mtu".into(), "9000".into());
        overlay.insert("vlan/200/name".into(), "storage".into());
        overlay.insert("route/default".into(), "10.0.0.1".into());

        let changes = diff_device(device, &current, &overlay);
        assert_eq!(changes.len(), 2);
        let mtu = changes.iter().find(|c| c.path.contains("mtu")).unwrap();
        assert_eq!(mtu.before.as_deref(), Some("1500"));
        assert_eq!(mtu.after.as_deref(), Some("9000"));
        let route = changes.iter().find(|c| c.path.contains("route")).unwrap();
        assert_eq!(route.before, None);
    }

    #[test]
    fn unlisted_paths_are_never_touched() {
        let device = DeviceId::new();
        let mut current = ConfigMap::new();
        current.insert("interface/ge-0/0/9/descr".into(), "uplink".into());
        let overlay = ConfigMap::new();
        assert!(diff_device(device, &current, &overlay).is_empty());
    }
}
