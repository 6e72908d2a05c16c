//! Full plan lifecycle against the simulated fleet.

mod common;

use common::{desired_mtu, fast_config, lab_device, service_with};
use fleetplan_core::types::{CapabilitySet, EnvironmentTag, OperationKind};
use fleetplan_core::ErrorCode;
use fleetplan_orchestrator::prelude::*;
use fleetplan_orchestrator::test_harness::SimFleet;

#[tokio::test]
async fn plan_runs_to_completed_and_applies_config() {
    let fleet = SimFleet::new();
    let devices = vec![
        lab_device(&fleet, "edge-1", "1500"),
        lab_device(&fleet, "edge-2", "1500"),
        lab_device(&fleet, "edge-3", "1500"),
    ];
    let (service, audit) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Draft);
    assert_eq!(plan.changes.len(), 3);
    assert!(plan.changes.iter().all(|c| c.before.as_deref() == Some("1500")));

    let outcome = service.validate(plan.id).await.unwrap();
    assert!(outcome.valid, "unexpected violations: {:?}", outcome.violations);

    let token = service.issue_approval(plan.id, "alice").await.unwrap();
    let finished = service
        .apply(plan.id, Some(&token.encode()), "alice")
        .await
        .unwrap();
    assert_eq!(finished.status, PlanStatus::Completed);

    for device in &devices {
        assert_eq!(fleet.config_of(*device)["interface/ge-0/0/1/mtu"], "9000");
    }

    // Apply and health-check records for every batch.
    let applies = finished
        .execution_log
        .iter()
        .filter(|r| r.action == ExecutionAction::Apply && r.success)
        .count();
    assert_eq!(applies, 3);
    assert!(finished
        .execution_log
        .iter()
        .any(|r| r.action == ExecutionAction::HealthCheck && r.success));

    // Exactly one audit event per transition, chain intact.
    audit.verify_integrity().unwrap();
    let trail = service.audit_trail(plan.id);
    for action in ["plan.validated", "plan.approved", "plan.executing", "plan.completed"] {
        assert_eq!(
            trail.iter().filter(|e| e.action == action).count(),
            1,
            "expected exactly one {action} event"
        );
    }
}

#[tokio::test]
async fn empty_and_oversized_target_sets_are_rejected() {
    let fleet = SimFleet::new();
    let (service, _) = service_with(&fleet, fast_config());

    let err = service
        .create_plan(&[], &desired_mtu(&[], "9000"), "alice")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);

    let mut config = fast_config();
    config.builder.max_devices = 2;
    let (service, _) = service_with(&fleet, config);
    let devices = vec![
        lab_device(&fleet, "a", "1500"),
        lab_device(&fleet, "b", "1500"),
        lab_device(&fleet, "c", "1500"),
    ];
    let err = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
    assert!(err.message.contains("ceiling"));
}

#[tokio::test]
async fn terminal_plan_rejects_reapply_without_side_effects() {
    let fleet = SimFleet::new();
    let devices = vec![lab_device(&fleet, "edge-1", "1500")];
    let (service, _) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    service.validate(plan.id).await.unwrap();
    let token = service.issue_approval(plan.id, "alice").await.unwrap();
    let encoded = token.encode();
    service.apply(plan.id, Some(&encoded), "alice").await.unwrap();

    let writes_before = fleet.write_attempts().len();

    // Replaying the consumed token is rejected before any claim.
    let err = service.apply(plan.id, Some(&encoded), "alice").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert!(err.message.contains("already consumed"));

    // A fresh token cannot even be issued for a finished plan.
    let err = service.issue_approval(plan.id, "alice").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlanNotApproved);

    assert_eq!(fleet.write_attempts().len(), writes_before);
    assert_eq!(service.get_plan(plan.id).unwrap().status, PlanStatus::Completed);
}

#[tokio::test]
async fn unsupported_operation_transparently_uses_fallback() {
    let fleet = SimFleet::new();
    let devices = vec![lab_device(&fleet, "edge-1", "1500")];
    fleet.mark_unsupported(devices[0], OperationKind::Interface);
    let (service, _) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    service.validate(plan.id).await.unwrap();
    let token = service.issue_approval(plan.id, "alice").await.unwrap();
    let finished = service
        .apply(plan.id, Some(&token.encode()), "alice")
        .await
        .unwrap();

    // Structurally identical outcome: same terminal status, same config.
    assert_eq!(finished.status, PlanStatus::Completed);
    assert_eq!(fleet.config_of(devices[0])["interface/ge-0/0/1/mtu"], "9000");
}

#[tokio::test]
async fn list_plans_filters_by_status_and_creator() {
    let fleet = SimFleet::new();
    let devices = vec![lab_device(&fleet, "edge-1", "1500")];
    let (service, _) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    service
        .create_plan(&devices, &desired_mtu(&devices, "9100"), "bob")
        .await
        .unwrap();
    service.validate(plan.id).await.unwrap();

    let validated = service.list_plans(&PlanFilter {
        status: Some(PlanStatus::Validated),
        ..PlanFilter::default()
    });
    assert_eq!(validated.len(), 1);
    assert_eq!(validated[0].id, plan.id);

    let bobs = service.list_plans(&PlanFilter {
        creator: Some("bob".to_string()),
        ..PlanFilter::default()
    });
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].status, PlanStatus::Draft);
}

#[tokio::test]
async fn cancel_is_rejected_once_terminal() {
    let fleet = SimFleet::new();
    let devices = vec![fleet.add_device(
        "edge-1",
        EnvironmentTag::Lab,
        CapabilitySet::all(),
        &[("interface/ge-0/0/1/mtu", "1500")],
    )];
    let (service, _) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    let cancelled = service.cancel(plan.id, "alice").await.unwrap();
    assert_eq!(cancelled.status, PlanStatus::Failed);

    let err = service.cancel(plan.id, "alice").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert!(err.message.contains("finished"));
}
