//! The approval gate.
//!
//! Issues short-lived, single-use approval tokens for validated plans and
//! consumes them exactly once. Signature failure, prior consumption, and
//! expiry are three distinct outcomes so a caller can tell a forged token
//! from a replayed one from one presented too late.

use crate::plan::{Plan, PlanStatus};
use fleetplan_core::audit::{AuditEvent, AuditSink};
use fleetplan_core::error::FleetError;
use fleetplan_core::token::{ApprovalToken, TokenSecret, TOKEN_TAG_LEN};
use fleetplan_core::types::{unix_now, CorrelationId, PlanId};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Token lifetime in seconds.
    pub ttl_secs: u64,
    /// Single-operator deployments may execute without a token. Approval is
    /// still audited.
    pub self_approval: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 900,
            self_approval: false,
        }
    }
}

pub struct ApprovalGate {
    secret: TokenSecret,
    config: GateConfig,
    consumed: Mutex<HashSet<[u8; TOKEN_TAG_LEN]>>,
    audit: Arc<dyn AuditSink>,
}

impl ApprovalGate {
    pub fn new(secret: TokenSecret, config: GateConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            secret,
            config,
            consumed: Mutex::new(HashSet::new()),
            audit,
        }
    }

    pub fn self_approval(&self) -> bool {
        self.config.self_approval
    }

    /// Issues a token bound to one validated plan.
    pub fn issue_token(
        &self,
        plan: &Plan,
        correlation: CorrelationId,
        actor: &str,
    ) -> Result<ApprovalToken, FleetError> {
        if plan.status != PlanStatus::Validated {
            return Err(FleetError::not_approved(format!(
                "plan is {}, approval requires a validated plan",
                plan.status
            ))
            .with_plan(plan.id));
        }
        let token = self.secret.sign(plan.id, self.config.ttl_secs);
        self.append_audit(
            AuditEvent::new(correlation, actor, "token.issued", "ok")
                .with_plan(plan.id)
                .with_payload(json!({ "expires_at": token.expires_at })),
        )?;
        Ok(token)
    }

    /// Verifies the token and atomically flips it to consumed.
    ///
    /// Checks in order: signature (constant-time), prior consumption, then
    /// expiry. A replayed token therefore reports "already consumed", never
    /// "expired".
    pub fn verify_and_consume(
        &self,
        token: &ApprovalToken,
        correlation: CorrelationId,
        actor: &str,
    ) -> Result<PlanId, FleetError> {
        if !self.secret.verify(token) {
            return self.reject(token, correlation, actor, FleetError::forbidden(
                "approval token signature invalid",
            ));
        }

        let mut consumed = self.consumed.lock();
        if consumed.contains(&token.tag) {
            drop(consumed);
            return self.reject(
                token,
                correlation,
                actor,
                FleetError::forbidden("approval token already consumed").with_plan(token.plan_id),
            );
        }
        if token.is_expired(unix_now()) {
            drop(consumed);
            return self.reject(
                token,
                correlation,
                actor,
                FleetError::expired("approval token expired").with_plan(token.plan_id),
            );
        }
        consumed.insert(token.tag);
        drop(consumed);

        self.append_audit(
            AuditEvent::new(correlation, actor, "token.consumed", "ok").with_plan(token.plan_id),
        )?;
        Ok(token.plan_id)
    }

    fn reject(
        &self,
        token: &ApprovalToken,
        correlation: CorrelationId,
        actor: &str,
        err: FleetError,
    ) -> Result<PlanId, FleetError> {
        self.append_audit(
            AuditEvent::new(correlation, actor, "token.rejected", err.code.as_str())
                .with_plan(token.plan_id)
                .with_payload(json!({ "message": err.message })),
        )?;
        Err(err)
    }

    fn append_audit(&self, event: AuditEvent) -> Result<(), FleetError> {
        self.audit
            .append(event)
            .map(|_| ())
            .map_err(|e| FleetError::internal(format!("audit append failed: {e}")))
    }
}
