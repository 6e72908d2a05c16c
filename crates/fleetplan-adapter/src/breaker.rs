//! Per-device circuit breaker.
//!
//! After a run of consecutive transport failures the breaker opens and
//! short-circuits further calls for a cool-down window, returning a distinct
//! circuit-open error instead of continuing to hammer a failing device.

use dashmap::DashMap;
use fleetplan_core::error::FleetError;
use fleetplan_core::types::{unix_now, DeviceId};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Cool-down window once open, in seconds.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<u64>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    states: DashMap<DeviceId, BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            states: DashMap::new(),
        }
    }

    pub fn check(&self, device_id: DeviceId) -> Result<(), FleetError> {
        self.check_at(device_id, unix_now())
    }

    /// Open circuit rejects the call with a retry-after hint; an elapsed
    /// cool-down closes the circuit again and lets the next call probe.
    pub fn check_at(&self, device_id: DeviceId, now: u64) -> Result<(), FleetError> {
        let mut state = self.states.entry(device_id).or_default();
        match state.open_until {
            Some(until) if now < until => Err(FleetError::rate_limited(
                format!("circuit open for device {device_id}"),
                until - now,
            )
            .with_device(device_id)),
            Some(_) => {
                state.open_until = None;
                state.consecutive_failures = 0;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self, device_id: DeviceId) {
        if let Some(mut state) = self.states.get_mut(&device_id) {
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    pub fn record_failure(&self, device_id: DeviceId) {
        self.record_failure_at(device_id, unix_now());
    }

    pub fn record_failure_at(&self, device_id: DeviceId, now: u64) {
        let mut state = self.states.entry(device_id).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.config.failure_threshold {
            state.open_until = Some(now + self.config.cooldown_secs);
            tracing::warn!(
                device = %device_id,
                failures = state.consecutive_failures,
                cooldown_secs = self.config.cooldown_secs,
                "circuit opened"
            );
        }
    }

    pub fn is_open(&self, device_id: DeviceId, now: u64) -> bool {
        self.states
            .get(&device_id)
            .and_then(|s| s.open_until)
            .is_some_and(|until| now < until)
    }
}
