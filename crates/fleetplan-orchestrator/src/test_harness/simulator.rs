//! Deterministic fleet simulator.
//!
//! One `SimFleet` stands in for the registry, the credential store, the
//! health checker, and both device transports. Tests inject failures per
//! device: rejected applies (optionally after N successes), unreachable
//! APIs, unsupported operations, and failing health checks. Every write
//! attempt is recorded so tests can assert which devices were ever touched.

use fleetplan_adapter::sanitize::{FallbackCommand, SHOW_CONFIG};
use fleetplan_adapter::transport::{
    ApiTransport, CapabilityProbe, ChangeRequest, CommandOutput, CommandTransport,
};
use fleetplan_core::error::FleetError;
use fleetplan_core::external::{
    CredentialStore, Credentials, DeviceFilter, DeviceRegistry, HealthChecker, HealthVerdict,
};
use fleetplan_core::types::{
    CapabilitySet, ConfigMap, Device, DeviceHealth, DeviceId, EnvironmentTag, OperationKind,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub type SimFleetHandle = Arc<SimFleet>;

/// One recorded write attempt: device, path, value (`None` = delete).
pub type WriteAttempt = (DeviceId, String, Option<String>);

#[derive(Default)]
pub struct SimFleet {
    devices: Mutex<BTreeMap<DeviceId, Device>>,
    configs: Mutex<BTreeMap<DeviceId, ConfigMap>>,
    /// Remaining successful applies before a device starts rejecting.
    fail_after: Mutex<HashMap<DeviceId, u32>>,
    unhealthy: Mutex<HashSet<DeviceId>>,
    api_unreachable: Mutex<HashSet<DeviceId>>,
    unsupported: Mutex<HashSet<(DeviceId, OperationKind)>>,
    write_attempts: Mutex<Vec<WriteAttempt>>,
}

impl SimFleet {
    pub fn new() -> SimFleetHandle {
        Arc::new(Self::default())
    }

    pub fn add_device(
        &self,
        name: &str,
        environment: EnvironmentTag,
        capabilities: CapabilitySet,
        initial: &[(&str, &str)],
    ) -> DeviceId {
        let id = DeviceId::new();
        let device = Device {
            id,
            name: name.to_string(),
            address: format!("198.51.100.{}", self.devices.lock().len() + 1),
            environment,
            capabilities,
            credential_handle: format!("cred-{name}"),
            management_path: "interface/mgmt0".to_string(),
            health: DeviceHealth::Healthy,
        };
        self.devices.lock().insert(id, device);
        self.configs.lock().insert(
            id,
            initial
                .iter()
                .map(|(path, value)| ((*path).to_string(), (*value).to_string()))
                .collect(),
        );
        id
    }

    pub fn config_of(&self, device_id: DeviceId) -> ConfigMap {
        self.configs.lock().get(&device_id).cloned().unwrap_or_default()
    }

    /// Every apply against this device is rejected.
    pub fn fail_applies_on(&self, device_id: DeviceId) {
        self.fail_after.lock().insert(device_id, 0);
    }

    /// The next `successes` applies succeed, then the device rejects. Lets
    /// tests make an apply succeed and its later revert fail.
    pub fn fail_applies_after(&self, device_id: DeviceId, successes: u32) {
        self.fail_after.lock().insert(device_id, successes);
    }

    pub fn mark_unhealthy(&self, device_id: DeviceId) {
        self.unhealthy.lock().insert(device_id);
    }

    pub fn mark_healthy(&self, device_id: DeviceId) {
        self.unhealthy.lock().remove(&device_id);
    }

    pub fn mark_api_unreachable(&self, device_id: DeviceId) {
        self.api_unreachable.lock().insert(device_id);
    }

    pub fn mark_unsupported(&self, device_id: DeviceId, kind: OperationKind) {
        self.unsupported.lock().insert((device_id, kind));
    }

    pub fn write_attempts(&self) -> Vec<WriteAttempt> {
        self.write_attempts.lock().clone()
    }

    /// The set of devices that ever received a write attempt.
    pub fn devices_written(&self) -> HashSet<DeviceId> {
        self.write_attempts
            .lock()
            .iter()
            .map(|(device_id, _, _)| *device_id)
            .collect()
    }

    fn apply_to_config(
        &self,
        device_id: DeviceId,
        path: &str,
        value: Option<&str>,
    ) -> Result<(), FleetError> {
        self.write_attempts
            .lock()
            .push((device_id, path.to_string(), value.map(str::to_string)));

        let mut fail_after = self.fail_after.lock();
        if let Some(remaining) = fail_after.get_mut(&device_id) {
            if *remaining == 0 {
                return Err(FleetError::rejected("commit rejected by device")
                    .with_device(device_id));
            }
            *remaining -= 1;
        }
        drop(fail_after);

        let mut configs = self.configs.lock();
        let config = configs.entry(device_id).or_default();
        match value {
            Some(value) => {
                config.insert(path.to_string(), value.to_string());
            }
            None => {
                config.remove(path);
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for SimFleet {
    async fn lookup_device(&self, id: DeviceId) -> Result<Device, FleetError> {
        self.devices
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| FleetError::not_found(format!("device {id} not found")).with_device(id))
    }

    async fn list_devices(&self, filter: &DeviceFilter) -> Result<Vec<Device>, FleetError> {
        Ok(self
            .devices
            .lock()
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl CredentialStore for SimFleet {
    async fn resolve(&self, device_id: DeviceId) -> Result<Credentials, FleetError> {
        let devices = self.devices.lock();
        let device = devices.get(&device_id).ok_or_else(|| {
            FleetError::not_found(format!("no credentials for device {device_id}"))
                .with_device(device_id)
        })?;
        Ok(Credentials::new(
            device.credential_handle.clone(),
            "automation",
            "simulated-secret",
        ))
    }
}

#[async_trait::async_trait]
impl HealthChecker for SimFleet {
    async fn check(&self, device_id: DeviceId) -> Result<HealthVerdict, FleetError> {
        if self.unhealthy.lock().contains(&device_id) {
            Ok(HealthVerdict::Fail)
        } else {
            Ok(HealthVerdict::Pass)
        }
    }
}

#[async_trait::async_trait]
impl ApiTransport for SimFleet {
    async fn probe(
        &self,
        device: &Device,
        _credentials: &Credentials,
        kind: OperationKind,
    ) -> Result<CapabilityProbe, FleetError> {
        if self.api_unreachable.lock().contains(&device.id) {
            return Err(FleetError::unreachable("api endpoint unreachable").with_device(device.id));
        }
        if self.unsupported.lock().contains(&(device.id, kind)) {
            Ok(CapabilityProbe::Unsupported)
        } else {
            Ok(CapabilityProbe::Supported)
        }
    }

    async fn read_config(
        &self,
        device: &Device,
        _credentials: &Credentials,
    ) -> Result<ConfigMap, FleetError> {
        if self.api_unreachable.lock().contains(&device.id) {
            return Err(FleetError::unreachable("api endpoint unreachable").with_device(device.id));
        }
        Ok(self.config_of(device.id))
    }

    async fn apply(
        &self,
        device: &Device,
        _credentials: &Credentials,
        change: &ChangeRequest,
    ) -> Result<(), FleetError> {
        self.apply_to_config(device.id, &change.path, change.value.as_deref())
    }
}

#[async_trait::async_trait]
impl CommandTransport for SimFleet {
    async fn run(
        &self,
        device: &Device,
        _credentials: &Credentials,
        command: &FallbackCommand,
    ) -> Result<CommandOutput, FleetError> {
        if command.program == SHOW_CONFIG {
            let stdout = self
                .config_of(device.id)
                .iter()
                .map(|(path, value)| format!("{path} {value}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Ok(CommandOutput { stdout });
        }
        let path = command.args.first().cloned().unwrap_or_default();
        let value = match command.args.get(1).map(String::as_str) {
            Some("--delete") | None => None,
            Some(value) => Some(value),
        };
        self.apply_to_config(device.id, &path, value)?;
        Ok(CommandOutput {
            stdout: String::new(),
        })
    }
}
