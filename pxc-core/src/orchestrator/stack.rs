//! Stack orchestration: dependency-ordered bring-up and reverse-order teardown.

use crate::builder::TemplateBuilder;
use crate::config::Config;
use crate::error::{PxcError, Result};
use crate::loader;
use crate::manifest::{ServiceSpec, StackManifest};
use crate::observability::metrics;
use crate::pct::{ContainerOptions, Pct, DEFAULT_NET0};
use crate::resolver;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// First id handed out to service containers.
pub const SERVICE_ID_BASE: u32 = 200;

/// Orchestrator settings for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub project_name: String,
    /// Storage used when the stack has no `settings.proxmox.storage`.
    pub storage: Option<String>,
    /// Build args layered over each service's own `build.args`.
    pub build_args: BTreeMap<String, String>,
    pub net0: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project_name: "pxc-project".to_string(),
            storage: Some("local-lvm".to_string()),
            build_args: BTreeMap::new(),
            net0: DEFAULT_NET0.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new(project_name: impl Into<String>, config: &Config) -> Self {
        Self {
            project_name: project_name.into(),
            storage: Some(config.storage.clone()).filter(|s| !s.is_empty()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Failed,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Running => f.write_str("running"),
            ServiceState::Failed => f.write_str("failed"),
        }
    }
}

/// Outcome of deploying one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResult {
    pub name: String,
    pub container_id: Option<u32>,
    pub template: Option<String>,
    pub status: ServiceState,
    pub build_duration: Option<Duration>,
    pub start_duration: Option<Duration>,
    pub error: Option<String>,
}

impl ServiceResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            container_id: None,
            template: None,
            status: ServiceState::Failed,
            build_duration: None,
            start_duration: None,
            error: None,
        }
    }
}

/// Outcome of provisioning a network or volume. Never populated yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResult {
    pub name: String,
    pub status: String,
    pub error: Option<String>,
}

/// Outcome of [`Orchestrator::up`], complete or partial.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeploymentResult {
    pub project: String,
    /// One entry per attempted service, in deployment order.
    pub services: Vec<ServiceResult>,
    pub networks: Vec<ResourceResult>,
    pub volumes: Vec<ResourceResult>,
    pub duration: Duration,
    pub warnings: Vec<String>,
}

impl DeploymentResult {
    pub fn failed_service(&self) -> Option<&ServiceResult> {
        self.services.iter().find(|s| s.status == ServiceState::Failed)
    }
}

/// `up` failure: the error plus everything deployed before it.
#[derive(Debug, thiserror::Error)]
#[error("Deployment of project '{}' failed", .result.project)]
pub struct DeployFailure {
    pub result: DeploymentResult,
    #[source]
    pub error: PxcError,
}

/// Outcome of [`Orchestrator::down`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TeardownReport {
    /// Services in the order they were processed.
    pub services: Vec<String>,
    pub warnings: Vec<String>,
}

/// Deploys and tears down stacks.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pct: Pct,
    builder: TemplateBuilder,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(pct: Pct, builder: TemplateBuilder, config: OrchestratorConfig) -> Self {
        Self { pct, builder, config }
    }

    pub fn project_name(&self) -> &str {
        &self.config.project_name
    }

    /// Container id for a service of this project.
    pub fn container_id(&self, service: &str) -> u32 {
        service_container_id(&self.config.project_name, service)
    }

    /// Validate, then build and start every service in dependency order.
    ///
    /// Stops at the first service that fails. Services started before it keep
    /// running and are reported in the partial result.
    #[instrument(skip(self, stack), fields(project = %self.config.project_name))]
    pub async fn up(
        &self,
        stack: &StackManifest,
    ) -> std::result::Result<DeploymentResult, DeployFailure> {
        let started = Instant::now();
        let mut result = DeploymentResult {
            project: self.config.project_name.clone(),
            ..Default::default()
        };

        let order = match stack.validate().and_then(|_| resolver::order(&stack.services)) {
            Ok(order) => order,
            Err(error) => return Err(DeployFailure { result, error }),
        };

        info!("Deploying stack {}", stack.display_name(&self.config.project_name));
        info!(order = %order.join(" -> "), "Service startup order");

        let warnings = self.run_hooks("pre_start", &stack.hooks.pre_start).await;
        result.warnings.extend(warnings);

        for name in &order {
            let Some(service) = stack.services.get(name) else { continue };
            match self.deploy_service(name, service, stack, &mut result.warnings).await {
                Ok(service_result) => result.services.push(service_result),
                Err((service_result, cause)) => {
                    error!(service = %name, error = %cause, "Service deployment failed");
                    metrics::record_service_failure(name);
                    result.services.push(service_result);
                    result.duration = started.elapsed();
                    return Err(DeployFailure {
                        result,
                        error: PxcError::ServiceDeploy {
                            service: name.clone(),
                            source: Box::new(cause),
                        },
                    });
                }
            }
        }

        let warnings = self.run_hooks("post_start", &stack.hooks.post_start).await;
        result.warnings.extend(warnings);

        result.duration = started.elapsed();
        metrics::record_deploy(result.duration.as_secs_f64());
        info!(
            services = result.services.len(),
            duration_ms = result.duration.as_millis() as u64,
            "Stack deployed"
        );
        Ok(result)
    }

    async fn deploy_service(
        &self,
        name: &str,
        service: &ServiceSpec,
        stack: &StackManifest,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<ServiceResult, (ServiceResult, PxcError)> {
        info!(service = %name, "Deploying service");
        let mut outcome = ServiceResult::new(name);

        let template = match self.ensure_template(name, service, &mut outcome).await {
            Ok(template) => template,
            Err(e) => return Err(fail(outcome, e)),
        };
        outcome.template = Some(template.clone());

        let id = self.container_id(name);
        outcome.container_id = Some(id);
        let hostname = service.hostname_for(&self.config.project_name, name);
        let resources =
            service.resources.or(&stack.settings.default_resources.unwrap_or_default());
        let storage = stack
            .settings
            .storage()
            .map(str::to_string)
            .or_else(|| self.config.storage.clone());

        let options = ContainerOptions {
            memory_mb: resources.memory_mb,
            cores: resources.cores,
            swap_mb: resources.swap_mb,
            net0: Some(self.config.net0.clone()),
            ..Default::default()
        };

        let created = if is_template_id(&template) {
            debug!(service = %name, container_id = id, template = %template, "Cloning template");
            match self.pct.clone_template(&template, id, &hostname).await {
                Ok(()) => self.pct.set(id, &options).await,
                Err(e) => Err(e),
            }
        } else {
            let options = ContainerOptions { hostname: Some(hostname), storage, ..options };
            self.pct.create(id, &template, &options).await
        };
        if let Err(e) = created {
            return Err(fail(outcome, container_op("create", id, e)));
        }

        let start = Instant::now();
        if let Err(e) = self.pct.start(id).await {
            return Err(fail(outcome, container_op("start", id, e)));
        }
        outcome.start_duration = Some(start.elapsed());

        for (key, value) in &service.environment {
            if let Err(e) = self.pct.append_environment(id, key, value).await {
                let message = format!("service '{}': failed to set {}: {}", name, key, e);
                warn!(service = %name, container_id = id, "{}", message);
                warnings.push(message);
            }
        }

        outcome.status = ServiceState::Running;
        metrics::record_service_started();
        info!(service = %name, container_id = id, "Service running");
        Ok(outcome)
    }

    /// Template for a service: the configured one, or a freshly built one.
    async fn ensure_template(
        &self,
        name: &str,
        service: &ServiceSpec,
        outcome: &mut ServiceResult,
    ) -> Result<String> {
        let Some(build) = &service.build else {
            return service
                .template
                .clone()
                .ok_or_else(|| PxcError::validation(format!("service '{}' has no template", name)));
        };

        let manifest_path = Path::new(build.context()).join(build.file());
        let manifest = loader::load_build_manifest(&manifest_path)?;

        let mut args = build.args();
        args.extend(self.config.build_args.iter().map(|(k, v)| (k.clone(), v.clone())));

        let template_name = format!("{}-{}:latest", self.config.project_name, name);
        info!(service = %name, template = %template_name, "Building template");
        let built = self.builder.build(&manifest, &template_name, &args).await?;
        outcome.build_duration = Some(built.duration);
        Ok(built.template_reference)
    }

    /// Stop and destroy every service container in reverse dependency order.
    ///
    /// Individual failures are logged and collected as warnings; only
    /// validation problems are returned as errors.
    #[instrument(skip(self, stack), fields(project = %self.config.project_name))]
    pub async fn down(&self, stack: &StackManifest, remove_volumes: bool) -> Result<TeardownReport> {
        stack.validate()?;
        let order = resolver::shutdown_order(&stack.services)?;

        info!("Stopping stack {}", stack.display_name(&self.config.project_name));
        info!(order = %order.join(" -> "), "Service shutdown order");

        let mut report = TeardownReport::default();
        report.warnings.extend(self.run_hooks("pre_stop", &stack.hooks.pre_stop).await);

        for name in &order {
            let id = self.container_id(name);
            info!(service = %name, container_id = id, "Removing service");

            if let Err(e) = self.pct.stop(id).await {
                report.warnings.push(teardown_warning(name, "stop", &e));
            }
            if let Err(e) = self.pct.destroy(id).await {
                report.warnings.push(teardown_warning(name, "destroy", &e));
            }
            report.services.push(name.clone());
        }

        if remove_volumes {
            info!(
                volumes = stack.volumes.len(),
                "Volume removal requested; named volumes are managed by the storage backend"
            );
        }

        report.warnings.extend(self.run_hooks("post_stop", &stack.hooks.post_stop).await);
        info!(warnings = report.warnings.len(), "Stack stopped");
        Ok(report)
    }

    /// Run lifecycle hooks on the host with `sh -c`. Failures become warnings.
    async fn run_hooks(&self, phase: &str, hooks: &[String]) -> Vec<String> {
        let mut warnings = Vec::new();
        if hooks.is_empty() {
            return warnings;
        }
        info!(phase, count = hooks.len(), "Running hooks");

        for hook in hooks {
            if self.pct.is_dry_run() {
                info!("[dry-run] {} hook: {}", phase, hook);
                continue;
            }
            let args = vec!["-c".to_string(), hook.clone()];
            let failure = match self.pct.executor().run("sh", &args, false).await {
                Ok(output) if output.success() => None,
                Ok(output) => Some(format!("exit status {}: {}", output.status, output.stderr.trim())),
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = failure {
                let message = format!("{} hook `{}` failed: {}", phase, hook, reason);
                warn!("{}", message);
                warnings.push(message);
            }
        }
        warnings
    }
}

fn fail(mut outcome: ServiceResult, error: PxcError) -> (ServiceResult, PxcError) {
    outcome.status = ServiceState::Failed;
    outcome.error = Some(error.to_string());
    (outcome, error)
}

fn container_op(operation: &str, id: u32, e: PxcError) -> PxcError {
    PxcError::ContainerOp {
        operation: operation.to_string(),
        container_id: id,
        reason: e.to_string(),
    }
}

fn teardown_warning(service: &str, operation: &str, e: &PxcError) -> String {
    metrics::record_teardown_warning();
    let message = format!("service '{}': {} failed: {}", service, operation, e);
    warn!(service = %service, operation, error = %e, "Teardown step failed");
    message
}

/// A template reference made only of digits is an existing template container id.
fn is_template_id(template: &str) -> bool {
    !template.is_empty() && template.chars().all(|c| c.is_ascii_digit())
}

/// Deterministic container id for `service` in `project`: `200 + h`, where
/// `h` is a base-31 rolling hash of `project + service` modulo 1000.
///
/// Different names can collide.
pub fn service_container_id(project: &str, service: &str) -> u32 {
    let hash = project
        .chars()
        .chain(service.chars())
        .fold(0u64, |h, c| (h * 31 + c as u64) % 1000);
    SERVICE_ID_BASE + hash as u32
}
