//! Append-only audit trail.
//!
//! Every plan transition, adapter write attempt, and token event produces
//! exactly one [`AuditEvent`] carrying the correlation id of the originating
//! request. Events are hash-chained so the trail can be verified end to end.

use crate::types::{unix_now, CorrelationId, DeviceId, EventId, PlanId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Payload keys whose values are never written to the trail verbatim.
const REDACTED_KEYS: &[&str] = &["password", "secret", "credential", "credentials", "token"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: EventId,
    pub correlation_id: CorrelationId,
    pub plan_id: Option<PlanId>,
    pub device_id: Option<DeviceId>,
    pub actor: String,
    pub action: String,
    pub result: String,
    pub timestamp: u64,
    pub payload: serde_json::Value,
    pub prev_hash: [u8; 32],
    pub hash: [u8; 32],
}

impl AuditEvent {
    pub fn new(
        correlation_id: CorrelationId,
        actor: impl Into<String>,
        action: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            correlation_id,
            plan_id: None,
            device_id: None,
            actor: actor.into(),
            action: action.into(),
            result: result.into(),
            timestamp: unix_now(),
            payload: serde_json::Value::Null,
            prev_hash: [0u8; 32],
            hash: [0u8; 32],
        }
    }

    pub fn with_plan(mut self, plan_id: PlanId) -> Self {
        self.plan_id = Some(plan_id);
        self
    }

    pub fn with_device(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Attaches a payload, redacting sensitive keys first.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = redact(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit chain integrity violation")]
    IntegrityViolation,
    #[error("audit sink unavailable: {0}")]
    SinkUnavailable(String),
}

/// Append-only event sink. No updates, no deletes.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<EventId, AuditError>;

    fn events(&self) -> Vec<AuditEvent>;

    fn events_for_plan(&self, plan_id: PlanId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.plan_id == Some(plan_id))
            .collect()
    }

    fn events_for_correlation(&self, correlation_id: CorrelationId) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.correlation_id == correlation_id)
            .collect()
    }
}

/// In-memory hash-chained audit sink.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    inner: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks the chain and checks every link and every event hash.
    pub fn verify_integrity(&self) -> Result<(), AuditError> {
        let guard = self.inner.lock();
        let mut prev = [0u8; 32];
        for event in guard.iter() {
            if event.prev_hash != prev {
                return Err(AuditError::IntegrityViolation);
            }
            if event.hash != compute_hash(event) {
                return Err(AuditError::IntegrityViolation);
            }
            prev = event.hash;
        }
        Ok(())
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, mut event: AuditEvent) -> Result<EventId, AuditError> {
        let mut guard = self.inner.lock();
        event.prev_hash = guard.last().map(|e| e.hash).unwrap_or([0u8; 32]);
        event.hash = compute_hash(&event);
        tracing::debug!(
            correlation = %event.correlation_id,
            action = %event.action,
            result = %event.result,
            "audit event appended"
        );
        guard.push(event.clone());
        Ok(event.event_id)
    }

    fn events(&self) -> Vec<AuditEvent> {
        self.inner.lock().clone()
    }
}

fn compute_hash(event: &AuditEvent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(event.event_id.0.as_bytes());
    hasher.update(event.correlation_id.0.as_bytes());
    if let Some(plan_id) = event.plan_id {
        hasher.update(plan_id.0.as_bytes());
    }
    if let Some(device_id) = event.device_id {
        hasher.update(device_id.0.as_bytes());
    }
    hasher.update(event.actor.as_bytes());
    hasher.update([0]);
    hasher.update(event.action.as_bytes());
    hasher.update([0]);
    hasher.update(event.result.as_bytes());
    hasher.update([0]);
    hasher.update(event.timestamp.to_le_bytes());
    hasher.update(event.payload.to_string().as_bytes());
    hasher.update(event.prev_hash);
    hasher.finalize().into()
}

/// Replaces the values of sensitive keys, recursively.
fn redact(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if REDACTED_KEYS.iter().any(|r| k.to_ascii_lowercase().contains(r)) {
                        (k, serde_json::Value::String("<redacted>".to_string()))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(redact).collect())
        }
        other => other,
    }
}
