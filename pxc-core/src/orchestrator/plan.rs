//! Deployment plans for `--dry-run`.

use super::stack::service_container_id;
use crate::error::Result;
use crate::manifest::StackManifest;
use crate::resolver;
use std::fmt;

/// What `up` would do for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedService {
    pub name: String,
    pub container_id: u32,
    pub hostname: String,
    /// `build <context>/<file>` or `template <name>`.
    pub source: String,
    pub depends_on: Vec<String>,
}

/// Ordered description of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub project: String,
    pub services: Vec<PlannedService>,
}

impl DeployPlan {
    /// Validate `stack` and lay out its services in startup order.
    pub fn new(stack: &StackManifest, project: &str) -> Result<Self> {
        stack.validate()?;
        let order = resolver::order(&stack.services)?;

        let services = order
            .into_iter()
            .filter_map(|name| {
                let spec = stack.services.get(&name)?;
                let source = match (&spec.build, &spec.template) {
                    (Some(build), _) => {
                        format!("build {}/{}", build.context().trim_end_matches('/'), build.file())
                    }
                    (None, Some(template)) => format!("template {}", template),
                    (None, None) => String::new(),
                };
                Some(PlannedService {
                    container_id: service_container_id(project, &name),
                    hostname: spec.hostname_for(project, &name),
                    source,
                    depends_on: spec.depends_on.clone(),
                    name,
                })
            })
            .collect();

        Ok(Self { project: project.to_string(), services })
    }

    /// Teardown order for the same stack.
    pub fn shutdown_order(&self) -> Vec<&str> {
        self.services.iter().rev().map(|s| s.name.as_str()).collect()
    }
}

impl fmt::Display for DeployPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment plan for {}:", self.project)?;
        for (i, service) in self.services.iter().enumerate() {
            write!(
                f,
                "  {:>2}. {} (container {}, hostname {}) from {}",
                i + 1,
                service.name,
                service.container_id,
                service.hostname,
                service.source
            )?;
            if !service.depends_on.is_empty() {
                write!(f, " after {}", service.depends_on.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
