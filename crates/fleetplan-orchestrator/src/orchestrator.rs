//! The batched apply orchestrator.
//!
//! Claims an approved plan via compare-and-swap, applies its changes in
//! fixed-size batches (strictly sequential) with bounded concurrency inside
//! each batch, health-checks every touched device after each batch, and on
//! any failure halts forward progress and rolls back everything applied in
//! reverse order. Devices whose rollback cannot complete are flagged for
//! manual remediation and the plan ends Failed.

use crate::plan::{Change, ExecutionAction, ExecutionRecord, Plan, PlanStatus};
use crate::store::PlanStore;
use fleetplan_adapter::transport::ChangeRequest;
use fleetplan_adapter::DeviceAdapter;
use fleetplan_core::audit::{AuditEvent, AuditSink};
use fleetplan_core::error::{ErrorCode, FleetError};
use fleetplan_core::external::{DeviceRegistry, HealthChecker, HealthVerdict};
use fleetplan_core::types::{CorrelationId, DeviceId, PlanId};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Devices per batch. Small by default to bound blast radius.
    pub batch_size: usize,
    /// Concurrent device applications within one batch.
    pub apply_concurrency: usize,
    pub health_timeout: Duration,
    pub health_retries: u32,
    pub health_retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            apply_concurrency: 4,
            health_timeout: Duration::from_secs(5),
            health_retries: 3,
            health_retry_delay: Duration::from_millis(200),
        }
    }
}

/// A halted run: the error that stopped it plus everything applied so far,
/// in application order.
struct ExecutionFailure {
    error: FleetError,
    applied: Vec<Change>,
}

pub struct ApplyOrchestrator {
    store: Arc<PlanStore>,
    adapter: Arc<DeviceAdapter>,
    registry: Arc<dyn DeviceRegistry>,
    health: Arc<dyn HealthChecker>,
    audit: Arc<dyn AuditSink>,
    config: OrchestratorConfig,
}

impl ApplyOrchestrator {
    pub fn new(
        store: Arc<PlanStore>,
        adapter: Arc<DeviceAdapter>,
        registry: Arc<dyn DeviceRegistry>,
        health: Arc<dyn HealthChecker>,
        audit: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            registry,
            health,
            audit,
            config,
        }
    }

    /// Runs an approved plan to a terminal or rolled-back state.
    ///
    /// Exactly one caller can claim a plan: the Approved -> Executing swap
    /// is the sole entry into execution, so duplicate calls are rejected
    /// outright with no side effects.
    pub async fn execute(
        &self,
        plan_id: PlanId,
        correlation: CorrelationId,
        actor: &str,
    ) -> Result<Plan, FleetError> {
        if let Err(err) = self.store.transition(
            plan_id,
            PlanStatus::Approved,
            PlanStatus::Executing,
            correlation,
            actor,
            "claimed for execution",
        ) {
            if err.code == ErrorCode::NotFound {
                return Err(err);
            }
            let current = self.store.status(plan_id)?;
            return Err(match current {
                PlanStatus::Executing => {
                    FleetError::forbidden("plan is already executing").with_plan(plan_id)
                }
                status if status.is_terminal() => FleetError::forbidden(format!(
                    "plan already finished ({status}); a failed plan is never retried, create a new one"
                ))
                .with_plan(plan_id),
                _ => err,
            });
        }

        let plan = self.store.get(plan_id)?;
        tracing::info!(plan = %plan_id, devices = plan.device_order.len(), "execution started");

        match self.run(&plan, correlation).await {
            Ok(()) => {
                self.store.transition(
                    plan_id,
                    PlanStatus::Executing,
                    PlanStatus::Completed,
                    correlation,
                    actor,
                    "all batches applied and healthy",
                )?;
                self.store.get(plan_id)
            }
            Err(failure) => {
                let unrecovered = self.rollback(&plan, &failure.applied, correlation).await;
                if unrecovered.is_empty() {
                    self.store.transition(
                        plan_id,
                        PlanStatus::Executing,
                        PlanStatus::RolledBack,
                        correlation,
                        actor,
                        "rolled back after batch failure",
                    )?;
                } else {
                    self.store
                        .update(plan_id, |p| p.remediation = unrecovered.clone())?;
                    self.store.transition(
                        plan_id,
                        PlanStatus::Executing,
                        PlanStatus::Failed,
                        correlation,
                        actor,
                        "rollback incomplete, manual remediation required",
                    )?;
                }
                Err(failure.error)
            }
        }
    }

    async fn run(&self, plan: &Plan, correlation: CorrelationId) -> Result<(), ExecutionFailure> {
        let batches = plan.batches(self.config.batch_size);
        let mut applied: Vec<Change> = Vec::new();
        let mut touched: Vec<DeviceId> = Vec::new();

        for (batch_idx, batch) in batches.iter().enumerate() {
            let results = self.apply_batch(plan, batch_idx, batch, correlation).await;

            let mut batch_error: Option<FleetError> = None;
            for device_id in batch {
                match results.get(device_id) {
                    Some((device_applied, error)) => {
                        applied.extend(device_applied.iter().cloned());
                        if batch_error.is_none() {
                            batch_error = error.clone();
                        }
                    }
                    None => {
                        if batch_error.is_none() {
                            batch_error = Some(
                                FleetError::internal("apply task aborted")
                                    .with_device(*device_id),
                            );
                        }
                    }
                }
            }
            touched.extend(batch.iter().copied());

            // Any failure halts forward progress; later batches never start.
            if let Some(error) = batch_error {
                return Err(ExecutionFailure { error, applied });
            }
            if let Err(error) = self.verify_health(plan.id, batch_idx, &touched).await {
                return Err(ExecutionFailure { error, applied });
            }
        }
        Ok(())
    }

    /// Applies one batch, fanning out across devices up to the configured
    /// concurrency. Each device's changes run in order; a device stops at
    /// its first failure but keeps what it already applied for rollback.
    async fn apply_batch(
        &self,
        plan: &Plan,
        batch_idx: usize,
        batch: &[DeviceId],
        correlation: CorrelationId,
    ) -> BTreeMap<DeviceId, (Vec<Change>, Option<FleetError>)> {
        let semaphore = Arc::new(Semaphore::new(self.config.apply_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for device_id in batch.iter().copied() {
            let changes = plan.changes_for(device_id);
            let adapter = Arc::clone(&self.adapter);
            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let plan_id = plan.id;
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            device_id,
                            (Vec::new(), Some(FleetError::internal("apply semaphore closed"))),
                        )
                    }
                };
                let result = apply_device(
                    &adapter, &registry, &store, plan_id, batch_idx, device_id, changes,
                    correlation,
                )
                .await;
                (device_id, result)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((device_id, result)) => {
                    results.insert(device_id, result);
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "apply task failed to join");
                }
            }
        }
        results
    }

    async fn verify_health(
        &self,
        plan_id: PlanId,
        batch_idx: usize,
        devices: &[DeviceId],
    ) -> Result<(), FleetError> {
        for device_id in devices {
            self.check_device_health(plan_id, batch_idx, *device_id).await?;
        }
        Ok(())
    }

    /// Bounded, timeout-limited health poll for one device.
    async fn check_device_health(
        &self,
        plan_id: PlanId,
        batch_idx: usize,
        device_id: DeviceId,
    ) -> Result<(), FleetError> {
        let mut attempt = 1u32;
        loop {
            let outcome =
                tokio::time::timeout(self.config.health_timeout, self.health.check(device_id))
                    .await;
            let failure = match outcome {
                Ok(Ok(HealthVerdict::Pass)) => {
                    let _ = self.store.append_record(
                        plan_id,
                        ExecutionRecord::new(
                            batch_idx,
                            device_id,
                            ExecutionAction::HealthCheck,
                            "pass",
                            true,
                        ),
                    );
                    return Ok(());
                }
                Ok(Ok(HealthVerdict::Fail)) => {
                    FleetError::rejected("health check failed").with_device(device_id)
                }
                Ok(Err(err)) => err.with_device(device_id),
                Err(_) => FleetError::timeout("health check timed out").with_device(device_id),
            };
            if attempt >= self.config.health_retries {
                let _ = self.store.append_record(
                    plan_id,
                    ExecutionRecord::new(
                        batch_idx,
                        device_id,
                        ExecutionAction::HealthCheck,
                        failure.message.clone(),
                        false,
                    ),
                );
                return Err(failure);
            }
            attempt += 1;
            tokio::time::sleep(self.config.health_retry_delay).await;
        }
    }

    /// Reverts applied changes in reverse application order, best-effort,
    /// then health-verifies every reverted device. Returns the devices whose
    /// reversion could not be completed or verified.
    async fn rollback(
        &self,
        plan: &Plan,
        applied: &[Change],
        correlation: CorrelationId,
    ) -> Vec<DeviceId> {
        let rollback_batch = plan.batches(self.config.batch_size).len();
        let mut unrecovered: Vec<DeviceId> = Vec::new();
        let mut reverted: Vec<DeviceId> = Vec::new();

        for change in applied.iter().rev() {
            let request = ChangeRequest {
                kind: change.kind,
                path: change.path.clone(),
                value: change.before.clone(),
            };
            let result = match self.registry.lookup_device(change.device_id).await {
                Ok(device) => self.adapter.execute(&device, &request, correlation).await.map(|_| ()),
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => {
                    let _ = self.store.append_record(
                        plan.id,
                        ExecutionRecord::new(
                            rollback_batch,
                            change.device_id,
                            ExecutionAction::Revert,
                            change.path.clone(),
                            true,
                        ),
                    );
                    if !reverted.contains(&change.device_id) {
                        reverted.push(change.device_id);
                    }
                }
                Err(err) => {
                    tracing::error!(
                        device = %change.device_id,
                        path = %change.path,
                        error = %err,
                        "revert failed"
                    );
                    let _ = self.store.append_record(
                        plan.id,
                        ExecutionRecord::new(
                            rollback_batch,
                            change.device_id,
                            ExecutionAction::Revert,
                            change.path.clone(),
                            false,
                        ),
                    );
                    if !unrecovered.contains(&change.device_id) {
                        unrecovered.push(change.device_id);
                    }
                }
            }
        }

        for device_id in reverted {
            if unrecovered.contains(&device_id) {
                continue;
            }
            if self
                .check_device_health(plan.id, rollback_batch, device_id)
                .await
                .is_err()
            {
                unrecovered.push(device_id);
            }
        }

        for device_id in &unrecovered {
            let _ = self.audit.append(
                AuditEvent::new(correlation, "orchestrator", "plan.remediation-required", "error")
                    .with_plan(plan.id)
                    .with_device(*device_id)
                    .with_payload(json!({
                        "detail": "rollback could not be completed or verified",
                    })),
            );
        }
        unrecovered
    }
}

#[allow(clippy::too_many_arguments)]
async fn apply_device(
    adapter: &DeviceAdapter,
    registry: &Arc<dyn DeviceRegistry>,
    store: &PlanStore,
    plan_id: PlanId,
    batch_idx: usize,
    device_id: DeviceId,
    changes: Vec<Change>,
    correlation: CorrelationId,
) -> (Vec<Change>, Option<FleetError>) {
    let device = match registry.lookup_device(device_id).await {
        Ok(device) => device,
        Err(err) => return (Vec::new(), Some(err.with_device(device_id))),
    };
    let mut done = Vec::new();
    for change in changes {
        let request = ChangeRequest {
            kind: change.kind,
            path: change.path.clone(),
            value: change.after.clone(),
        };
        match adapter.execute(&device, &request, correlation).await {
            Ok(_) => {
                let _ = store.append_record(
                    plan_id,
                    ExecutionRecord::new(
                        batch_idx,
                        device_id,
                        ExecutionAction::Apply,
                        change.path.clone(),
                        true,
                    ),
                );
                done.push(change);
            }
            Err(err) => {
                let _ = store.append_record(
                    plan_id,
                    ExecutionRecord::new(
                        batch_idx,
                        device_id,
                        ExecutionAction::Apply,
                        change.path.clone(),
                        false,
                    ),
                );
                return (done, Some(err));
            }
        }
    }
    (done, None)
}
