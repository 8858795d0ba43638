//! Error types for pxc.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pxc operations.
pub type Result<T> = std::result::Result<T, PxcError>;

/// Main error type for pxc.
#[derive(Error, Debug)]
pub enum PxcError {
    // Manifest errors
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("Manifest parse error in {path:?}: {reason}")]
    ManifestParse { path: Option<PathBuf>, reason: String },

    #[error("Manifest not found: {path:?}{hint}")]
    ManifestNotFound { path: PathBuf, hint: String },

    #[error("File read error: {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Circular dependency detected at service '{service}': {}", .cycle.join(" -> "))]
    CircularDependency { service: String, cycle: Vec<String> },

    #[error(
        "Missing dependency: service '{service}' depends on '{dependency}' which does not exist"
    )]
    MissingDependency { service: String, dependency: String },

    // Build errors
    #[error("Container {container_id} not ready after {attempts} attempts")]
    NotReady { container_id: u32, attempts: u32 },

    #[error("{label} (step {position}) failed: {reason}")]
    StepFailed { position: usize, label: String, reason: String },

    #[error("Container operation '{operation}' failed on {container_id}: {reason}")]
    ContainerOp { operation: String, container_id: u32, reason: String },

    #[error("Export of container {container_id} failed: {reason}")]
    Export { container_id: u32, reason: String },

    #[error("Build aborted in container {container_id}: {cause}{}", cleanup_suffix(.cleanup))]
    BuildAborted {
        container_id: u32,
        #[source]
        cause: Box<PxcError>,
        cleanup: Option<String>,
    },

    // Deployment errors
    #[error("Service '{service}' failed to deploy: {source}")]
    ServiceDeploy {
        service: String,
        #[source]
        source: Box<PxcError>,
    },

    // Command execution errors
    #[error("Command `{command}` exited with status {status}: {stderr}")]
    CommandFailed { command: String, status: i32, stderr: String },

    #[error("Failed to spawn `{command}`: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("IO error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn cleanup_suffix(cleanup: &Option<String>) -> String {
    match cleanup {
        Some(reason) => format!(" (cleanup also failed: {})", reason),
        None => String::new(),
    }
}

impl PxcError {
    /// Shorthand for a [`PxcError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    /// True for errors raised before any container command was issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::ManifestParse { .. }
                | Self::ManifestNotFound { .. }
                | Self::CircularDependency { .. }
                | Self::MissingDependency { .. }
        )
    }

    /// The original failure, looking through build and deploy wrappers.
    pub fn root_cause(&self) -> &PxcError {
        match self {
            Self::BuildAborted { cause, .. } => cause.root_cause(),
            Self::ServiceDeploy { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
