//! Template building.
//!
//! [`TemplateBuilder`] turns a [`crate::manifest::BuildManifest`] into a
//! reusable container template. [`BuildPlan`] describes the same work without
//! doing it.

pub mod pipeline;
pub mod plan;

pub use pipeline::{
    ephemeral_id, expand_build_args, BuildPhase, BuildResult, BuilderConfig, TemplateBuilder,
};
pub use plan::BuildPlan;
