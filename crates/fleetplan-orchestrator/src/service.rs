//! The service facade exposed to the outer protocol layer.
//!
//! Every entry point mints a correlation id and threads it through each
//! component and audit event it touches. Responses are structured records;
//! failures carry the closed taxonomy codes.

use crate::builder::{BuilderConfig, DesiredState, PlanBuilder};
use crate::gate::{ApprovalGate, GateConfig};
use crate::orchestrator::{ApplyOrchestrator, OrchestratorConfig};
use crate::plan::{Plan, PlanStatus};
use crate::store::{PlanFilter, PlanStore};
use crate::validator::{PlanValidator, ValidatorConfig, Violation};
use fleetplan_adapter::DeviceAdapter;
use fleetplan_core::audit::{AuditEvent, AuditSink};
use fleetplan_core::error::{ErrorCode, FleetError};
use fleetplan_core::external::{DeviceRegistry, HealthChecker};
use fleetplan_core::token::{ApprovalToken, TokenSecret};
use fleetplan_core::types::{CorrelationId, DeviceId, PlanId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub builder: BuilderConfig,
    pub validator: ValidatorConfig,
    pub gate: GateConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Outcome of a validation pass: either the plan moved to Validated, or the
/// complete set of violations to fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub plan_id: PlanId,
    pub valid: bool,
    pub violations: Vec<Violation>,
}

pub struct FleetService {
    store: Arc<PlanStore>,
    builder: PlanBuilder,
    validator: PlanValidator,
    gate: ApprovalGate,
    orchestrator: ApplyOrchestrator,
    audit: Arc<dyn AuditSink>,
}

impl FleetService {
    pub fn new(
        adapter: Arc<DeviceAdapter>,
        registry: Arc<dyn DeviceRegistry>,
        health: Arc<dyn HealthChecker>,
        audit: Arc<dyn AuditSink>,
        secret: TokenSecret,
        config: ServiceConfig,
    ) -> Self {
        let store = Arc::new(PlanStore::new(Arc::clone(&audit)));
        let builder = PlanBuilder::new(Arc::clone(&adapter), Arc::clone(&registry), config.builder);
        let validator = PlanValidator::new(Arc::clone(&registry), config.validator);
        let gate = ApprovalGate::new(secret, config.gate, Arc::clone(&audit));
        let orchestrator = ApplyOrchestrator::new(
            Arc::clone(&store),
            adapter,
            registry,
            health,
            Arc::clone(&audit),
            config.orchestrator,
        );
        Self {
            store,
            builder,
            validator,
            gate,
            orchestrator,
            audit,
        }
    }

    /// Computes a draft plan from desired state. Read-only against devices.
    pub async fn create_plan(
        &self,
        targets: &[DeviceId],
        desired: &DesiredState,
        creator: &str,
    ) -> Result<Plan, FleetError> {
        let correlation = CorrelationId::new();
        let plan = self.builder.compute_plan(targets, desired, creator).await?;
        self.store.insert(plan.clone());
        self.append_audit(
            AuditEvent::new(correlation, creator, "plan.created", "ok")
                .with_plan(plan.id)
                .with_payload(json!({
                    "devices": plan.device_order.len(),
                    "changes": plan.changes.len(),
                    "risk": plan.risk,
                })),
        )?;
        Ok(plan)
    }

    /// Runs every pre-flight check, collecting all violations. Zero
    /// violations moves the plan to Validated.
    pub async fn validate(&self, plan_id: PlanId) -> Result<ValidationOutcome, FleetError> {
        let correlation = CorrelationId::new();
        let plan = self.store.get(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Err(FleetError::forbidden(format!(
                "plan is {}, only draft plans can be validated",
                plan.status
            ))
            .with_plan(plan_id));
        }
        let violations = self.validator.validate(&plan).await?;
        if violations.is_empty() {
            self.store.transition(
                plan_id,
                PlanStatus::Draft,
                PlanStatus::Validated,
                correlation,
                "validator",
                "all checks passed",
            )?;
        }
        Ok(ValidationOutcome {
            plan_id,
            valid: violations.is_empty(),
            violations,
        })
    }

    /// Issues a single-use approval token bound to a validated plan.
    pub async fn issue_approval(
        &self,
        plan_id: PlanId,
        actor: &str,
    ) -> Result<ApprovalToken, FleetError> {
        let correlation = CorrelationId::new();
        let plan = self.store.get(plan_id)?;
        let token = self.gate.issue_token(&plan, correlation, actor)?;
        self.store
            .update(plan_id, |p| p.approval_expires_at = Some(token.expires_at))?;
        Ok(token)
    }

    /// Consumes the approval and executes the plan. The token must be bound
    /// to this plan; in self-approval mode the token may be omitted.
    pub async fn apply(
        &self,
        plan_id: PlanId,
        encoded_token: Option<&str>,
        actor: &str,
    ) -> Result<Plan, FleetError> {
        let correlation = CorrelationId::new();
        match encoded_token {
            Some(encoded) => {
                let token = ApprovalToken::decode(encoded)?;
                if token.plan_id != plan_id {
                    return Err(FleetError::forbidden(
                        "approval token is bound to a different plan",
                    )
                    .with_plan(plan_id));
                }
                self.gate.verify_and_consume(&token, correlation, actor)?;
                self.store
                    .transition(
                        plan_id,
                        PlanStatus::Validated,
                        PlanStatus::Approved,
                        correlation,
                        actor,
                        "approval token consumed",
                    )
                    .map_err(|err| self.map_apply_conflict(plan_id, err))?;
            }
            None if self.gate.self_approval() => {
                self.store
                    .transition(
                        plan_id,
                        PlanStatus::Validated,
                        PlanStatus::Approved,
                        correlation,
                        actor,
                        "self-approval",
                    )
                    .map_err(|err| self.map_apply_conflict(plan_id, err))?;
            }
            None => {
                return Err(FleetError::not_approved("approval token required").with_plan(plan_id))
            }
        }
        self.orchestrator.execute(plan_id, correlation, actor).await
    }

    /// Cancellation is only possible before execution begins.
    pub async fn cancel(&self, plan_id: PlanId, actor: &str) -> Result<Plan, FleetError> {
        let correlation = CorrelationId::new();
        let status = self.store.status(plan_id)?;
        match status {
            PlanStatus::Draft | PlanStatus::Validated | PlanStatus::Approved => {
                self.store
                    .transition(plan_id, status, PlanStatus::Failed, correlation, actor, "cancelled")?;
                self.store.get(plan_id)
            }
            PlanStatus::Executing => Err(FleetError::forbidden(
                "cannot cancel an executing plan; rollback is the only interruption",
            )
            .with_plan(plan_id)),
            status => Err(FleetError::forbidden(format!(
                "plan already finished ({status})"
            ))
            .with_plan(plan_id)),
        }
    }

    /// The plan record including its execution log.
    pub fn get_plan(&self, plan_id: PlanId) -> Result<Plan, FleetError> {
        self.store.get(plan_id)
    }

    pub fn list_plans(&self, filter: &PlanFilter) -> Vec<Plan> {
        self.store.list(filter)
    }

    /// The audit trail for one plan, oldest first.
    pub fn audit_trail(&self, plan_id: PlanId) -> Vec<AuditEvent> {
        self.audit.events_for_plan(plan_id)
    }

    /// A failed claim during apply surfaces as "already executing" or
    /// "already finished" so callers can tell the loser of a race from a
    /// policy failure.
    fn map_apply_conflict(&self, plan_id: PlanId, err: FleetError) -> FleetError {
        if err.code != ErrorCode::Forbidden {
            return err;
        }
        match self.store.status(plan_id) {
            Ok(PlanStatus::Approved | PlanStatus::Executing) => {
                FleetError::forbidden("plan is already executing").with_plan(plan_id)
            }
            Ok(status) if status.is_terminal() => {
                FleetError::forbidden(format!("plan already finished ({status})")).with_plan(plan_id)
            }
            _ => err,
        }
    }

    fn append_audit(&self, event: AuditEvent) -> Result<(), FleetError> {
        self.audit
            .append(event)
            .map(|_| ())
            .map_err(|e| FleetError::internal(format!("audit append failed: {e}")))
    }
}
