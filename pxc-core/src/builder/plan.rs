//! Human-readable build plans for `--dry-run`.

use crate::manifest::{BuildManifest, Step};
use std::fmt;

/// Ordered description of what a build will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub template_name: String,
    pub entries: Vec<String>,
}

impl BuildPlan {
    pub fn new(manifest: &BuildManifest, template_name: &str) -> Self {
        let mut entries = vec![
            format!("Create build container from {}", manifest.base_image),
            "Start container and wait until it accepts commands".to_string(),
        ];
        entries.extend(step_entries("Step", &manifest.setup_steps));

        let mut config = Vec::new();
        let resources = &manifest.resources;
        if resources.cores > 0 {
            config.push(format!("cores={}", resources.cores));
        }
        if resources.memory_mb > 0 {
            config.push(format!("memory={}MB", resources.memory_mb));
        }
        if resources.swap_mb > 0 {
            config.push(format!("swap={}MB", resources.swap_mb));
        }
        let features = manifest.features.enabled();
        if !features.is_empty() {
            config.push(format!("features={}", features.join(",")));
        }
        if !config.is_empty() {
            entries.push(format!("Apply configuration: {}", config.join(" ")));
        }

        entries.extend(step_entries("Cleanup", &manifest.cleanup_steps));
        entries.push(format!("Stop container and convert it to template {}", template_name));

        Self { template_name: template_name.to_string(), entries }
    }
}

fn step_entries<'a>(prefix: &'a str, steps: &'a [Step]) -> impl Iterator<Item = String> + 'a {
    steps.iter().enumerate().map(move |(i, step)| format!("{} {}: {}", prefix, i + 1, step.describe()))
}

impl fmt::Display for BuildPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Build plan for {}:", self.template_name)?;
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "  {:>2}. {}", i + 1, entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Features, Resources};

    #[test]
    fn test_plan_lists_every_phase() {
        let manifest = BuildManifest {
            base_image: "debian-12".into(),
            setup_steps: vec![Step::run("apt-get update"), Step::workdir("/srv")],
            cleanup_steps: vec![Step::run("apt-get clean")],
            resources: Resources { cores: 2, memory_mb: 1024, swap_mb: 0 },
            features: Features { nesting: true, ..Default::default() },
            ..Default::default()
        };
        let plan = BuildPlan::new(&manifest, "web:latest");
        assert_eq!(
            plan.entries,
            vec![
                "Create build container from debian-12",
                "Start container and wait until it accepts commands",
                "Step 1: RUN apt-get update",
                "Step 2: WORKDIR /srv",
                "Apply configuration: cores=2 memory=1024MB features=nesting=1",
                "Cleanup 1: RUN apt-get clean",
                "Stop container and convert it to template web:latest",
            ]
        );
        assert!(plan.to_string().starts_with("Build plan for web:latest:\n   1. Create"));
    }

    #[test]
    fn test_plan_skips_empty_config() {
        let manifest = BuildManifest {
            base_image: "alpine".into(),
            setup_steps: vec![Step::run("true")],
            ..Default::default()
        };
        let plan = BuildPlan::new(&manifest, "t");
        assert!(!plan.entries.iter().any(|e| e.starts_with("Apply configuration")));
        assert_eq!(plan.entries.len(), 4);
    }
}
