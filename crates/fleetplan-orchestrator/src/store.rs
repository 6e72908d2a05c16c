//! In-memory plan store.
//!
//! The status field is the sole arbiter of who may act on a plan next. All
//! status updates go through a compare-and-swap held under the entry lock,
//! and each successful swap emits exactly one audit event. Plans are never
//! deleted, only retained.

use crate::plan::{validate_transition, ExecutionRecord, Plan, PlanStatus};
use dashmap::DashMap;
use fleetplan_core::audit::{AuditEvent, AuditSink};
use fleetplan_core::error::FleetError;
use fleetplan_core::types::{CorrelationId, DeviceId, PlanId};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanFilter {
    pub status: Option<PlanStatus>,
    pub creator: Option<String>,
    pub device: Option<DeviceId>,
}

impl PlanFilter {
    fn matches(&self, plan: &Plan) -> bool {
        self.status.map_or(true, |s| plan.status == s)
            && self.creator.as_ref().map_or(true, |c| &plan.creator == c)
            && self
                .device
                .map_or(true, |d| plan.device_order.contains(&d))
    }
}

pub struct PlanStore {
    plans: DashMap<PlanId, Plan>,
    audit: Arc<dyn AuditSink>,
}

impl PlanStore {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            plans: DashMap::new(),
            audit,
        }
    }

    pub fn insert(&self, plan: Plan) {
        self.plans.insert(plan.id, plan);
    }

    pub fn get(&self, plan_id: PlanId) -> Result<Plan, FleetError> {
        self.plans
            .get(&plan_id)
            .map(|p| p.clone())
            .ok_or_else(|| FleetError::not_found(format!("plan {plan_id} not found")).with_plan(plan_id))
    }

    pub fn status(&self, plan_id: PlanId) -> Result<PlanStatus, FleetError> {
        Ok(self.get(plan_id)?.status)
    }

    pub fn list(&self, filter: &PlanFilter) -> Vec<Plan> {
        let mut plans: Vec<Plan> = self
            .plans
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        plans.sort_by_key(|p| p.created_at);
        plans
    }

    /// Mutates a plan's non-status fields under the entry lock.
    pub fn update<F>(&self, plan_id: PlanId, mutate: F) -> Result<(), FleetError>
    where
        F: FnOnce(&mut Plan),
    {
        let mut entry = self
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| FleetError::not_found(format!("plan {plan_id} not found")).with_plan(plan_id))?;
        mutate(&mut entry);
        Ok(())
    }

    pub fn append_record(&self, plan_id: PlanId, record: ExecutionRecord) -> Result<(), FleetError> {
        self.update(plan_id, |plan| plan.execution_log.push(record))
    }

    /// Compare-and-swap on the status field. Fails without side effects if
    /// the plan is not exactly in `from`; the error names the actual status
    /// so callers can tell "already executing" from "already finished".
    pub fn transition(
        &self,
        plan_id: PlanId,
        from: PlanStatus,
        to: PlanStatus,
        correlation: CorrelationId,
        actor: &str,
        reason: &str,
    ) -> Result<(), FleetError> {
        let mut entry = self
            .plans
            .get_mut(&plan_id)
            .ok_or_else(|| FleetError::not_found(format!("plan {plan_id} not found")).with_plan(plan_id))?;
        if entry.status != from {
            let current = entry.status;
            return Err(FleetError::forbidden(format!(
                "plan is {current}, expected {from}"
            ))
            .with_plan(plan_id));
        }
        validate_transition(from, to).map_err(|e| e.with_plan(plan_id))?;
        entry.status = to;
        tracing::info!(plan = %plan_id, %from, %to, reason, "plan transition");
        self.audit
            .append(
                AuditEvent::new(correlation, actor, format!("plan.{to}"), "ok")
                    .with_plan(plan_id)
                    .with_payload(json!({ "from": from, "to": to, "reason": reason })),
            )
            .map_err(|e| FleetError::internal(format!("audit append failed: {e}")))?;
        Ok(())
    }
}
