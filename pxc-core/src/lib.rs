//! pxc core library
//!
//! Declarative builds and multi-service stacks for Proxmox LXC containers,
//! driven through the `pct` command-line tool.

pub mod builder;
pub mod config;
pub mod error;
pub mod exec;
pub mod loader;
pub mod manifest;
pub mod observability;
pub mod orchestrator;
pub mod pct;
pub mod resolver;

// Re-export commonly used items
pub use builder::{BuildPlan, BuildResult, BuilderConfig, TemplateBuilder};
pub use config::Config;
pub use error::{PxcError, Result};
pub use exec::{CommandExecutor, CommandOutput, ProcessExecutor};
pub use manifest::{BuildManifest, ServiceSpec, StackManifest, Step};
pub use observability::init as init_observability;
pub use orchestrator::{
    DeployFailure, DeployPlan, DeploymentResult, Orchestrator, OrchestratorConfig, ServiceResult,
    TeardownReport,
};
pub use pct::Pct;
