//! Stack deployment.
//!
//! [`Orchestrator`] resolves service order, builds templates for services that
//! need them and drives each container through create and start. Teardown runs
//! the same order in reverse.

pub mod plan;
pub mod stack;

pub use plan::{DeployPlan, PlannedService};
pub use stack::{
    service_container_id, DeployFailure, DeploymentResult, Orchestrator, OrchestratorConfig,
    ResourceResult, ServiceResult, ServiceState, TeardownReport, SERVICE_ID_BASE,
};
