//! Template build pipeline.
//!
//! Drives one ephemeral container through
//! create, start, readiness wait, setup steps, configuration, cleanup steps,
//! stop and conversion to a template. Unless the conversion succeeds, the
//! container is destroyed before returning.

use crate::config::Config;
use crate::error::{PxcError, Result};
use crate::manifest::{BuildManifest, CopySpec, Step};
use crate::observability::metrics;
use crate::pct::{ContainerOptions, Pct};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, instrument, warn};

/// Build-time settings, independent of any manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub storage: Option<String>,
    pub memory_mb: u32,
    pub cores: u32,
    pub hostname_prefix: String,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            storage: Some("local-lvm".to_string()),
            memory_mb: 512,
            cores: 1,
            hostname_prefix: "pxc-build-".to_string(),
            ready_attempts: 60,
            ready_interval: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for BuilderConfig {
    fn from(config: &Config) -> Self {
        Self {
            storage: Some(config.storage.clone()).filter(|s| !s.is_empty()),
            memory_mb: config.build_memory_mb,
            cores: config.build_cores,
            hostname_prefix: config.build_hostname_prefix.clone(),
            ready_attempts: config.ready_attempts,
            ready_interval: config.ready_interval(),
        }
    }
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Allocate,
    Create,
    Start,
    AwaitReady,
    RunSetupSteps,
    ApplyConfig,
    RunCleanupSteps,
    Stop,
    Export,
    Finalize,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildPhase::Allocate => "allocate",
            BuildPhase::Create => "create",
            BuildPhase::Start => "start",
            BuildPhase::AwaitReady => "await_ready",
            BuildPhase::RunSetupSteps => "setup",
            BuildPhase::ApplyConfig => "apply_config",
            BuildPhase::RunCleanupSteps => "cleanup",
            BuildPhase::Stop => "stop",
            BuildPhase::Export => "export",
            BuildPhase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Output of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    /// What `pct create`/`pct clone` should be given to use the template.
    pub template_reference: String,
    pub template_name: String,
    pub container_id: u32,
    pub duration: Duration,
    /// `Step N` for every setup step, `Cleanup N` for cleanup steps that succeeded.
    pub executed_steps: Vec<String>,
    pub warnings: Vec<String>,
}

/// Mutable state for one pipeline run.
struct BuildRun<'a> {
    id: u32,
    build_args: &'a BTreeMap<String, String>,
    workdir: Option<String>,
    executed_steps: Vec<String>,
    warnings: Vec<String>,
}

impl BuildRun<'_> {
    fn warn(&mut self, message: String) {
        warn!(container_id = self.id, "{}", message);
        self.warnings.push(message);
    }
}

/// Builds templates from build manifests.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    pct: Pct,
    config: BuilderConfig,
    fixed_id: Option<u32>,
}

impl TemplateBuilder {
    pub fn new(pct: Pct, config: BuilderConfig) -> Self {
        Self { pct, config, fixed_id: None }
    }

    /// Use `id` for the ephemeral container instead of a time-derived one.
    pub fn with_container_id(mut self, id: u32) -> Self {
        self.fixed_id = Some(id);
        self
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build `manifest` into a template named `template_name`.
    ///
    /// The manifest is validated before any container command is issued.
    #[instrument(skip(self, manifest, build_args), fields(template = %template_name))]
    pub async fn build(
        &self,
        manifest: &BuildManifest,
        template_name: &str,
        build_args: &BTreeMap<String, String>,
    ) -> Result<BuildResult> {
        manifest.validate()?;

        let started = Instant::now();
        let id = self.allocate();
        info!(
            container_id = id,
            phase = %BuildPhase::Allocate,
            base = %manifest.base_image,
            "Building template"
        );

        // Nothing exists to clean up until create succeeds.
        self.pct
            .create(id, &manifest.base_image, &self.create_options(id))
            .await
            .map_err(|e| {
                metrics::record_build_failure(&BuildPhase::Create.to_string());
                PxcError::BuildAborted {
                    container_id: id,
                    cause: Box::new(container_op("create", id, e)),
                    cleanup: None,
                }
            })?;

        let mut run = BuildRun {
            id,
            build_args,
            workdir: None,
            executed_steps: Vec::new(),
            warnings: Vec::new(),
        };

        match self.run_phases(manifest, template_name, &mut run).await {
            Ok(template_reference) => {
                let duration = started.elapsed();
                metrics::record_build(duration.as_secs_f64(), true);
                info!(
                    container_id = id,
                    template = %template_reference,
                    duration_ms = duration.as_millis() as u64,
                    "Template built"
                );
                Ok(BuildResult {
                    template_reference,
                    template_name: template_name.to_string(),
                    container_id: id,
                    duration,
                    executed_steps: run.executed_steps,
                    warnings: run.warnings,
                })
            }
            Err((phase, cause)) => {
                metrics::record_build(started.elapsed().as_secs_f64(), false);
                metrics::record_build_failure(&phase.to_string());
                error!(container_id = id, %phase, error = %cause, "Build failed");
                let cleanup = self
                    .finalize(id)
                    .await
                    .err()
                    .map(|e| format!("{}: {}", BuildPhase::Finalize, e));
                Err(PxcError::BuildAborted { container_id: id, cause: Box::new(cause), cleanup })
            }
        }
    }

    /// Everything between create and a successful export. On error, returns
    /// the phase that failed along with the cause.
    async fn run_phases(
        &self,
        manifest: &BuildManifest,
        template_name: &str,
        run: &mut BuildRun<'_>,
    ) -> std::result::Result<String, (BuildPhase, PxcError)> {
        let id = run.id;

        self.pct
            .start(id)
            .await
            .map_err(|e| (BuildPhase::Start, container_op("start", id, e)))?;

        self.await_ready(id).await.map_err(|e| (BuildPhase::AwaitReady, e))?;

        for (i, step) in manifest.setup_steps.iter().enumerate() {
            let label = format!("Step {}", i + 1);
            if let Err(reason) = self.execute_step(run, step, &label).await {
                let failure = PxcError::StepFailed { position: i + 1, label, reason };
                return Err((BuildPhase::RunSetupSteps, failure));
            }
            run.executed_steps.push(label);
        }

        self.apply_config(manifest, id)
            .await
            .map_err(|e| (BuildPhase::ApplyConfig, container_op("set", id, e)))?;

        for (i, step) in manifest.cleanup_steps.iter().enumerate() {
            let label = format!("Cleanup {}", i + 1);
            match self.execute_step(run, step, &label).await {
                Ok(()) => run.executed_steps.push(label),
                Err(reason) => run.warn(format!("{} failed (continuing): {}", label, reason)),
            }
        }

        self.pct.stop(id).await.map_err(|e| {
            (
                BuildPhase::Stop,
                PxcError::Export { container_id: id, reason: format!("stop failed: {}", e) },
            )
        })?;

        info!(container_id = id, template = %template_name, "Converting container to template");
        self.pct.template(id).await.map_err(|e| {
            (BuildPhase::Export, PxcError::Export { container_id: id, reason: e.to_string() })
        })?;

        if self.pct.is_dry_run() {
            Ok(template_name.to_string())
        } else {
            Ok(id.to_string())
        }
    }

    fn allocate(&self) -> u32 {
        self.fixed_id.unwrap_or_else(ephemeral_id)
    }

    fn create_options(&self, id: u32) -> ContainerOptions {
        ContainerOptions {
            hostname: Some(format!("{}{}", self.config.hostname_prefix, id)),
            memory_mb: self.config.memory_mb,
            cores: self.config.cores,
            unprivileged: true,
            storage: self.config.storage.clone(),
            ..Default::default()
        }
    }

    async fn await_ready(&self, id: u32) -> Result<()> {
        if self.pct.is_dry_run() {
            return Ok(());
        }

        debug!(container_id = id, attempts = self.config.ready_attempts, "Waiting for container");
        for attempt in 1..=self.config.ready_attempts {
            match self.pct.probe(id).await {
                Ok(()) => {
                    debug!(container_id = id, attempt, "Container ready");
                    return Ok(());
                }
                Err(e) => debug!(container_id = id, attempt, error = %e, "Not ready yet"),
            }
            if attempt < self.config.ready_attempts {
                tokio::time::sleep(self.config.ready_interval).await;
            }
        }
        Err(PxcError::NotReady { container_id: id, attempts: self.config.ready_attempts })
    }

    async fn apply_config(&self, manifest: &BuildManifest, id: u32) -> Result<()> {
        let options = ContainerOptions {
            cores: manifest.resources.cores,
            memory_mb: manifest.resources.memory_mb,
            swap_mb: manifest.resources.swap_mb,
            features: manifest.features.enabled().into_iter().map(String::from).collect(),
            ..Default::default()
        };
        if options.is_empty() {
            debug!(container_id = id, "No configuration to apply");
            return Ok(());
        }
        info!(container_id = id, "Applying container configuration");
        self.pct.set(id, &options).await
    }

    /// Run one step. Errors come back as a reason string for the caller to label.
    async fn execute_step(
        &self,
        run: &mut BuildRun<'_>,
        step: &Step,
        label: &str,
    ) -> std::result::Result<(), String> {
        info!(container_id = run.id, "{}: {}", label, step.describe());
        metrics::record_step(step.kind());

        match step {
            Step::Run { command } => {
                let expanded = expand_build_args(command, run.build_args);
                let script = match &run.workdir {
                    Some(dir) => format!("cd {} && {}", crate::exec::shell_quote(dir), expanded),
                    None => expanded,
                };
                self.pct.exec_shell(run.id, &script).await.map(drop).map_err(|e| e.to_string())
            }
            Step::Copy(copy) => self.copy(run, copy, label).await,
            Step::Env { vars } => {
                for (key, value) in vars {
                    self.pct
                        .append_environment(run.id, key, value)
                        .await
                        .map_err(|e| format!("failed to set environment variable {}: {}", key, e))?;
                }
                Ok(())
            }
            Step::WorkDir { path } => {
                self.pct
                    .exec(run.id, &["mkdir", "-p", path])
                    .await
                    .map_err(|e| format!("failed to create working directory {}: {}", path, e))?;
                run.workdir = Some(path.clone());
                Ok(())
            }
        }
    }

    async fn copy(
        &self,
        run: &mut BuildRun<'_>,
        copy: &CopySpec,
        label: &str,
    ) -> std::result::Result<(), String> {
        if tokio::fs::metadata(&copy.source).await.is_err() {
            return Err(format!("source file/directory does not exist: {}", copy.source));
        }

        if let Some(dir) = dest_parent(&copy.dest) {
            self.pct
                .exec(run.id, &["mkdir", "-p", &dir])
                .await
                .map_err(|e| format!("failed to create destination directory: {}", e))?;
        }

        self.pct
            .push(run.id, &copy.source, &copy.dest)
            .await
            .map_err(|e| format!("failed to copy files: {}", e))?;

        if let Some(owner) = &copy.owner {
            if let Err(e) = self.pct.exec(run.id, &["chown", "-R", owner, &copy.dest]).await {
                run.warn(format!("{}: failed to set ownership on {}: {}", label, copy.dest, e));
            }
        }
        if let Some(mode) = &copy.mode {
            if let Err(e) = self.pct.exec(run.id, &["chmod", "-R", mode, &copy.dest]).await {
                run.warn(format!("{}: failed to set permissions on {}: {}", label, copy.dest, e));
            }
        }
        Ok(())
    }

    /// Best-effort stop, then destroy. Only the destroy outcome is reported.
    async fn finalize(&self, id: u32) -> Result<()> {
        info!(container_id = id, "Cleaning up build container");
        if let Err(e) = self.pct.stop(id).await {
            debug!(container_id = id, error = %e, "Stop before destroy failed");
        }
        self.pct.destroy(id).await.map_err(|e| {
            metrics::record_build_failure(&BuildPhase::Finalize.to_string());
            error!(
                container_id = id,
                phase = %BuildPhase::Finalize,
                error = %e,
                "Failed to destroy build container"
            );
            e
        })
    }
}

fn container_op(operation: &str, id: u32, e: PxcError) -> PxcError {
    PxcError::ContainerOp {
        operation: operation.to_string(),
        container_id: id,
        reason: e.to_string(),
    }
}

/// Time-derived ephemeral container id in `10000..110000`.
///
/// Two builds started within the same second, or 100000 seconds apart, get
/// the same id. Callers that need uniqueness should use
/// [`TemplateBuilder::with_container_id`].
pub fn ephemeral_id() -> u32 {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    (secs % 100_000) as u32 + 10_000
}

/// Directory that must exist before pushing to `dest`, if any.
fn dest_parent(dest: &str) -> Option<String> {
    let parent = Path::new(dest).parent()?.to_str()?;
    match parent {
        "" | "/" | "." => None,
        dir => Some(dir.to_string()),
    }
}

/// Substitute `${KEY}` and `$KEY` references to known build args.
///
/// A bare `$NAME` takes the longest identifier after the `$`, so `$VERSION`
/// does not match inside `$VERSION_MAJOR`. Unknown references are left as-is
/// for the container shell.
pub fn expand_build_args(command: &str, args: &BTreeMap<String, String>) -> String {
    if args.is_empty() {
        return command.to_string();
    }

    let mut out = String::with_capacity(command.len());
    let mut rest = command;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                if let Some(value) = args.get(&braced[..end]) {
                    out.push_str(value);
                    rest = &braced[end + 1..];
                    continue;
                }
            }
        } else {
            let len = after
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            if let Some(value) = args.get(&after[..len]) {
                out.push_str(value);
                rest = &after[len..];
                continue;
            }
        }

        out.push('$');
        rest = after;
    }
    out.push_str(rest);
    out
}
