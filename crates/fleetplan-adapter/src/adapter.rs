//! The dual-transport device adapter.
//!
//! Callers see `read_state` and `execute`; transport selection, retries,
//! circuit breaking, pooling, and credential resolution all happen behind
//! this seam. Reads retry transparently with bounded backoff. Writes are
//! never retried; a failed write surfaces immediately.

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::pool::ConnectionPool;
use crate::retry::{retry_read, RetryPolicy};
use crate::sanitize::{build_read_command, build_write_command};
use crate::transport::{
    parse_show_config, ApiTransport, ApplyOutcome, CapabilityProbe, ChangeRequest,
    CommandTransport, TransportKind,
};
use fleetplan_core::audit::{AuditEvent, AuditSink};
use fleetplan_core::error::{ErrorCode, FleetError};
use fleetplan_core::external::{CredentialStore, Credentials};
use fleetplan_core::types::{ConfigMap, CorrelationId, Device};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// In-flight call cap per device.
    pub per_device_inflight: usize,
    pub read_retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            per_device_inflight: 2,
            read_retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

pub struct DeviceAdapter {
    api: Arc<dyn ApiTransport>,
    command: Arc<dyn CommandTransport>,
    credentials: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
    breaker: CircuitBreaker,
    pool: ConnectionPool,
    read_retry: RetryPolicy,
}

impl DeviceAdapter {
    pub fn new(
        api: Arc<dyn ApiTransport>,
        command: Arc<dyn CommandTransport>,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
        config: AdapterConfig,
    ) -> Self {
        Self {
            api,
            command,
            credentials,
            audit,
            breaker: CircuitBreaker::new(config.breaker),
            pool: ConnectionPool::new(config.per_device_inflight),
            read_retry: config.read_retry,
        }
    }

    /// Reads the device's current configuration. Read-only, retried with
    /// bounded backoff; falls back to the command channel's `show-config`
    /// when the API is unreachable.
    pub async fn read_state(&self, device: &Device) -> Result<ConfigMap, FleetError> {
        self.breaker.check(device.id)?;
        let _permit = self.pool.acquire(device.id).await?;
        let credentials = self.credentials.resolve(device.id).await?;

        let api_result = retry_read(&self.read_retry, || {
            self.api.read_config(device, &credentials)
        })
        .await;

        let result = match api_result {
            Ok(config) => Ok(config),
            Err(err) if err.code == ErrorCode::DeviceUnreachable => {
                tracing::debug!(device = %device.id, "api unreachable, reading via command channel");
                self.command
                    .run(device, &credentials, &build_read_command())
                    .await
                    .map(|output| parse_show_config(&output.stdout))
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => self.breaker.record_success(device.id),
            Err(err) if counts_for_breaker(err.code) => self.breaker.record_failure(device.id),
            Err(_) => {}
        }
        result.map_err(|err| err.with_device(device.id))
    }

    /// Executes one write. Never retried. Prefers the structured API; on a
    /// probe reporting the operation unsupported, or on unreachability,
    /// falls back to the allowlisted command channel. Every attempt, success
    /// or failure, lands in the audit trail.
    pub async fn execute(
        &self,
        device: &Device,
        change: &ChangeRequest,
        correlation: CorrelationId,
    ) -> Result<ApplyOutcome, FleetError> {
        self.breaker.check(device.id)?;
        let _permit = self.pool.acquire(device.id).await?;
        let credentials = self.credentials.resolve(device.id).await?;

        let result = self.execute_once(device, &credentials, change).await;

        let event = match &result {
            Ok(outcome) => AuditEvent::new(correlation, "device-adapter", "adapter.apply", "ok")
                .with_device(device.id)
                .with_payload(json!({
                    "path": change.path,
                    "kind": change.kind.as_str(),
                    "transport": outcome.transport,
                })),
            Err(err) => AuditEvent::new(
                correlation,
                "device-adapter",
                "adapter.apply",
                err.code.as_str(),
            )
            .with_device(device.id)
            .with_payload(json!({
                "path": change.path,
                "kind": change.kind.as_str(),
            })),
        };
        self.audit
            .append(event)
            .map_err(|e| FleetError::internal(format!("audit append failed: {e}")))?;

        match &result {
            Ok(_) => self.breaker.record_success(device.id),
            Err(err) if counts_for_breaker(err.code) => self.breaker.record_failure(device.id),
            Err(_) => {}
        }
        result.map_err(|err| err.with_device(device.id))
    }

    async fn execute_once(
        &self,
        device: &Device,
        credentials: &Credentials,
        change: &ChangeRequest,
    ) -> Result<ApplyOutcome, FleetError> {
        match self.api.probe(device, credentials, change.kind).await {
            Ok(CapabilityProbe::Supported) => {
                self.api.apply(device, credentials, change).await?;
                Ok(ApplyOutcome {
                    device_id: device.id,
                    path: change.path.clone(),
                    transport: TransportKind::Api,
                })
            }
            Ok(CapabilityProbe::Unsupported) => {
                self.execute_fallback(device, credentials, change).await
            }
            Err(err) if err.code == ErrorCode::DeviceUnreachable => {
                self.execute_fallback(device, credentials, change).await
            }
            Err(err) => Err(err),
        }
    }

    async fn execute_fallback(
        &self,
        device: &Device,
        credentials: &Credentials,
        change: &ChangeRequest,
    ) -> Result<ApplyOutcome, FleetError> {
        let command = build_write_command(change.kind, &change.path, change.value.as_deref())?;
        tracing::debug!(device = %device.id, program = command.program, "using command fallback");
        self.command.run(device, credentials, &command).await?;
        Ok(ApplyOutcome {
            device_id: device.id,
            path: change.path.clone(),
            transport: TransportKind::Command,
        })
    }
}

/// Only transport-level failures trip the breaker; a device that answers
/// with a rejection is alive, and locally-rejected unsafe input never left
/// the process.
fn counts_for_breaker(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::Timeout
            | ErrorCode::DeviceUnreachable
            | ErrorCode::DeviceAuthFailed
            | ErrorCode::Internal
    )
}
