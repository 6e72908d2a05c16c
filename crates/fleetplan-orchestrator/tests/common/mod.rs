//! Shared setup for integration tests: a simulated fleet wired into a full
//! service stack with short timeouts.
#![allow(dead_code)]

use fleetplan_adapter::prelude::*;
use fleetplan_core::audit::MemoryAuditSink;
use fleetplan_core::token::TokenSecret;
use fleetplan_core::types::{CapabilitySet, ConfigMap, DeviceId, EnvironmentTag};
use fleetplan_orchestrator::prelude::*;
use fleetplan_orchestrator::test_harness::SimFleetHandle;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const SECRET: &[u8; 32] = b"integration test signing secret!";

/// Best-effort tracing setup; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fast_config() -> ServiceConfig {
    ServiceConfig {
        orchestrator: OrchestratorConfig {
            batch_size: 1,
            apply_concurrency: 2,
            health_timeout: Duration::from_secs(2),
            health_retries: 2,
            health_retry_delay: Duration::from_millis(10),
        },
        ..ServiceConfig::default()
    }
}

pub fn service_with(
    fleet: &SimFleetHandle,
    config: ServiceConfig,
) -> (FleetService, Arc<MemoryAuditSink>) {
    init_tracing();
    let audit = Arc::new(MemoryAuditSink::new());
    let adapter = Arc::new(DeviceAdapter::new(
        fleet.clone(),
        fleet.clone(),
        fleet.clone(),
        audit.clone(),
        AdapterConfig {
            read_retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            ..AdapterConfig::default()
        },
    ));
    let service = FleetService::new(
        adapter,
        fleet.clone(),
        fleet.clone(),
        audit.clone(),
        TokenSecret::from_bytes(*SECRET),
        config,
    );
    (service, audit)
}

pub fn lab_device(fleet: &SimFleetHandle, name: &str, mtu: &str) -> DeviceId {
    fleet.add_device(
        name,
        EnvironmentTag::Lab,
        CapabilitySet::all(),
        &[("interface/ge-0/0/1/mtu", mtu)],
    )
}

pub fn desired_mtu(devices: &[DeviceId], mtu: &str) -> DesiredState {
    devices
        .iter()
        .map(|id| {
            let mut overlay = ConfigMap::new();
            overlay.insert("interface/ge-0/0/1/mtu".to_string(), mtu.to_string());
            (*id, overlay)
        })
        .collect::<BTreeMap<_, _>>()
}
