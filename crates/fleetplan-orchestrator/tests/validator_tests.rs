//! Validation collects the complete violation picture in one pass.

mod common;

use common::{desired_mtu, fast_config, service_with};
use fleetplan_core::types::{Capability, CapabilitySet, EnvironmentTag};
use fleetplan_orchestrator::prelude::*;
use fleetplan_orchestrator::test_harness::SimFleet;

#[tokio::test]
async fn all_violations_are_collected_not_just_the_first() {
    let fleet = SimFleet::new();
    let lab = fleet.add_device(
        "lab-1",
        EnvironmentTag::Lab,
        CapabilitySet::of(&[Capability::Interfaces]),
        &[],
    );
    let production = fleet.add_device(
        "prod-1",
        EnvironmentTag::Production,
        CapabilitySet::of(&[Capability::Interfaces]),
        &[],
    );

    // Mixed environments, a capability the lab device lacks, a protected
    // management path, and a duplicated change, all in one plan.
    let changes = vec![
        Change::new(lab, "vlan/200/name", None, Some("storage".into())),
        Change::new(lab, "interface/mgmt0/mtu", None, Some("9000".into())),
        Change::new(production, "interface/ge-0/0/1/mtu", None, Some("9000".into())),
        Change::new(production, "interface/ge-0/0/1/mtu", None, Some("9000".into())),
    ];
    let plan = Plan::new("alice", vec![lab, production], changes, "bad plan", RiskRating::High);

    let validator = PlanValidator::new(fleet.clone(), ValidatorConfig::default());
    let violations = validator.validate(&plan).await.unwrap();

    let rules: Vec<ViolationRule> = violations.iter().map(|v| v.rule).collect();
    assert!(rules.contains(&ViolationRule::MixedEnvironments));
    assert!(rules.contains(&ViolationRule::CapabilityDenied));
    assert!(rules.contains(&ViolationRule::ProtectedPath));
    assert!(rules.contains(&ViolationRule::DuplicateChange));
    assert_eq!(violations.len(), 4);
}

#[tokio::test]
async fn cross_environment_can_be_explicitly_permitted() {
    let fleet = SimFleet::new();
    let lab = fleet.add_device("lab-1", EnvironmentTag::Lab, CapabilitySet::all(), &[]);
    let staging = fleet.add_device("stg-1", EnvironmentTag::Staging, CapabilitySet::all(), &[]);
    let plan = Plan::new(
        "alice",
        vec![lab, staging],
        vec![
            Change::new(lab, "vlan/200/name", None, Some("storage".into())),
            Change::new(staging, "vlan/200/name", None, Some("storage".into())),
        ],
        "cross-env",
        RiskRating::Moderate,
    );

    let strict = PlanValidator::new(fleet.clone(), ValidatorConfig::default());
    assert!(!strict.validate(&plan).await.unwrap().is_empty());

    let permissive = PlanValidator::new(
        fleet.clone(),
        ValidatorConfig {
            allow_cross_environment: true,
        },
    );
    assert!(permissive.validate(&plan).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_devices_are_reported_per_device() {
    let fleet = SimFleet::new();
    let known = fleet.add_device("lab-1", EnvironmentTag::Lab, CapabilitySet::all(), &[]);
    let ghost = fleetplan_core::types::DeviceId::new();
    let plan = Plan::new(
        "alice",
        vec![known, ghost],
        vec![Change::new(known, "vlan/200/name", None, Some("storage".into()))],
        "ghost",
        RiskRating::Low,
    );

    let validator = PlanValidator::new(fleet.clone(), ValidatorConfig::default());
    let violations = validator.validate(&plan).await.unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule, ViolationRule::UnknownDevice);
    assert_eq!(violations[0].device_id, Some(ghost));
}

#[tokio::test]
async fn invalid_plan_stays_draft_through_the_service() {
    let fleet = SimFleet::new();
    let device = fleet.add_device(
        "lab-1",
        EnvironmentTag::Lab,
        // No capabilities at all: the single change must be denied.
        CapabilitySet::new(),
        &[("interface/ge-0/0/1/mtu", "1500")],
    );
    let devices = vec![device];
    let (service, _) = service_with(&fleet, fast_config());

    let plan = service
        .create_plan(&devices, &desired_mtu(&devices, "9000"), "alice")
        .await
        .unwrap();
    let outcome = service.validate(plan.id).await.unwrap();
    assert!(!outcome.valid);
    assert_eq!(outcome.violations[0].rule, ViolationRule::CapabilityDenied);
    assert_eq!(service.get_plan(plan.id).unwrap().status, PlanStatus::Draft);

    // An unvalidated plan cannot be approved.
    let err = service.issue_approval(plan.id, "alice").await.unwrap_err();
    assert_eq!(err.code, fleetplan_core::ErrorCode::PlanNotApproved);
}
