//! fleetplan-orchestrator
//!
//! The plan/apply core, two-phase by construction:
//! 1. **Planning phase**: compute a draft plan, validate it, approve it.
//! 2. **Execution phase**: claim the plan via compare-and-swap and run it
//!    in bounded batches with post-batch health checks and automatic
//!    rollback.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use fleetplan_orchestrator::prelude::*;
//!
//! let service = FleetService::new(adapter, registry, health, audit, secret, config);
//!
//! // Planning phase
//! let plan = service.create_plan(&targets, &desired, "operator").await?;
//! let outcome = service.validate(plan.id).await?;
//! let token = service.issue_approval(plan.id, "operator").await?;
//!
//! // Execution phase
//! let finished = service.apply(plan.id, Some(&token.encode()), "operator").await?;
//! ```

pub mod builder;
pub mod gate;
pub mod orchestrator;
pub mod plan;
pub mod service;
pub mod store;
pub mod validator;

// Test harness
pub mod test_harness;

pub use plan::{Change, Plan, PlanStatus};
pub use service::{FleetService, ServiceConfig};

pub mod prelude {
    pub use crate::builder::{BuilderConfig, DesiredState, PlanBuilder};
    pub use crate::gate::{ApprovalGate, GateConfig};
    pub use crate::orchestrator::{ApplyOrchestrator, OrchestratorConfig};
    pub use crate::plan::{
        allowed_transitions, validate_transition, Change, ExecutionAction, ExecutionRecord, Plan,
        PlanStatus, RiskRating,
    };
    pub use crate::service::{FleetService, ServiceConfig, ValidationOutcome};
    pub use crate::store::{PlanFilter, PlanStore};
    pub use crate::validator::{PlanValidator, ValidatorConfig, Violation, ViolationRule};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
