//! The plan data model and its status state machine.
//!
//! A plan is an ordered set of device-scoped changes with captured
//! before/after state. Once approved it is immutable except for status,
//! execution log, and remediation flags, and it is never deleted.

use fleetplan_core::error::FleetError;
use fleetplan_core::types::{unix_now, DeviceId, OperationKind, PlanId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Draft,
    Validated,
    Approved,
    Executing,
    Completed,
    Failed,
    RolledBack,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Draft => "draft",
            PlanStatus::Validated => "validated",
            PlanStatus::Approved => "approved",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
            PlanStatus::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::Failed | PlanStatus::RolledBack
        )
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full transition table. Failed doubles as the terminal state for
/// pre-execution cancellation.
pub fn allowed_transitions(from: PlanStatus) -> Vec<PlanStatus> {
    use PlanStatus::*;
    match from {
        Draft => vec![Validated, Failed],
        Validated => vec![Approved, Failed],
        Approved => vec![Executing, Failed],
        Executing => vec![Completed, RolledBack, Failed],
        Completed => vec![],
        Failed => vec![],
        RolledBack => vec![],
    }
}

pub fn validate_transition(from: PlanStatus, to: PlanStatus) -> Result<(), FleetError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(FleetError::forbidden(format!(
            "illegal plan transition {from} -> {to}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskRating {
    Low,
    Moderate,
    High,
}

/// One device-scoped operation within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub device_id: DeviceId,
    pub kind: OperationKind,
    pub path: String,
    /// Value captured from the device before the plan runs.
    pub before: Option<String>,
    /// Desired value; `None` removes the path.
    pub after: Option<String>,
    /// Stable hash of {device, kind, path, after}, used to detect duplicate
    /// or retried steps.
    pub idempotency_key: String,
}

impl Change {
    pub fn new(
        device_id: DeviceId,
        path: impl Into<String>,
        before: Option<String>,
        after: Option<String>,
    ) -> Self {
        let path = path.into();
        let kind = OperationKind::from_path(&path);
        let idempotency_key = idempotency_key(device_id, kind, &path, after.as_deref());
        Self {
            device_id,
            kind,
            path,
            before,
            after,
            idempotency_key,
        }
    }
}

pub fn idempotency_key(
    device_id: DeviceId,
    kind: OperationKind,
    path: &str,
    after: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_id.0.as_bytes());
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(path.as_bytes());
    hasher.update([0]);
    if let Some(after) = after {
        hasher.update(after.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionAction {
    Apply,
    Revert,
    HealthCheck,
}

/// One line of a plan's execution log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub batch: usize,
    pub device_id: DeviceId,
    pub action: ExecutionAction,
    pub detail: String,
    pub success: bool,
    pub timestamp: u64,
}

impl ExecutionRecord {
    pub fn new(
        batch: usize,
        device_id: DeviceId,
        action: ExecutionAction,
        detail: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            batch,
            device_id,
            action,
            detail: detail.into(),
            success,
            timestamp: unix_now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub status: PlanStatus,
    pub creator: String,
    pub created_at: u64,
    /// Targets in application order. Bounded by the configured ceiling.
    pub device_order: Vec<DeviceId>,
    pub changes: Vec<Change>,
    pub summary: String,
    pub risk: RiskRating,
    pub approval_expires_at: Option<u64>,
    pub execution_log: Vec<ExecutionRecord>,
    /// Devices whose rollback could not complete; flagged for manual
    /// remediation.
    pub remediation: Vec<DeviceId>,
}

impl Plan {
    pub fn new(
        creator: impl Into<String>,
        device_order: Vec<DeviceId>,
        changes: Vec<Change>,
        summary: impl Into<String>,
        risk: RiskRating,
    ) -> Self {
        Self {
            id: PlanId::new(),
            status: PlanStatus::Draft,
            creator: creator.into(),
            created_at: unix_now(),
            device_order,
            changes,
            summary: summary.into(),
            risk,
            approval_expires_at: None,
            execution_log: Vec::new(),
            remediation: Vec::new(),
        }
    }

    pub fn changes_for(&self, device_id: DeviceId) -> Vec<Change> {
        self.changes
            .iter()
            .filter(|c| c.device_id == device_id)
            .cloned()
            .collect()
    }

    /// Partitions targets into bounded batches, preserving order.
    pub fn batches(&self, batch_size: usize) -> Vec<Vec<DeviceId>> {
        self.device_order
            .chunks(batch_size.max(1))
            .map(<[DeviceId]>::to_vec)
            .collect()
    }
}
