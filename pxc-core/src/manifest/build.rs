//! Build manifest (`LXCfile.yml`) types.

use crate::error::{PxcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One buildable template definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Base template the ephemeral build container is created from.
    #[serde(rename = "from", default)]
    pub base_image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default)]
    pub features: Features,

    #[serde(default)]
    pub resources: Resources,

    /// Steps executed in order; any failure aborts the build.
    #[serde(rename = "setup", default)]
    pub setup_steps: Vec<Step>,

    /// Best-effort steps executed after configuration is applied.
    #[serde(rename = "cleanup", default, skip_serializing_if = "Vec::is_empty")]
    pub cleanup_steps: Vec<Step>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
}

/// LXC feature flags applied to the finished template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub unprivileged: bool,
    pub nesting: bool,
    pub keyctl: bool,
    pub fuse: bool,
}

impl Features {
    /// Enabled `pct set -features` entries, e.g. `nesting=1`.
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut enabled = Vec::new();
        if self.nesting {
            enabled.push("nesting=1");
        }
        if self.keyctl {
            enabled.push("keyctl=1");
        }
        if self.fuse {
            enabled.push("fuse=1");
        }
        enabled
    }
}

/// Container resources. Zero means "not set".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    pub cores: u32,
    #[serde(rename = "memory")]
    pub memory_mb: u32,
    #[serde(rename = "swap")]
    pub swap_mb: u32,
}

impl Resources {
    pub fn is_empty(&self) -> bool {
        self.cores == 0 && self.memory_mb == 0 && self.swap_mb == 0
    }

    /// Field-wise merge: keep each non-zero value, fill the rest from `fallback`.
    pub fn or(&self, fallback: &Resources) -> Resources {
        let pick = |own: u32, other: u32| if own != 0 { own } else { other };
        Resources {
            cores: pick(self.cores, fallback.cores),
            memory_mb: pick(self.memory_mb, fallback.memory_mb),
            swap_mb: pick(self.swap_mb, fallback.swap_mb),
        }
    }
}

/// A single build action.
///
/// In YAML a step is a mapping with exactly one of `run`, `copy`, `env` or
/// `workdir`; anything else is rejected while parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    Run { command: String },
    Copy(CopySpec),
    Env { vars: BTreeMap<String, String> },
    WorkDir { path: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub dest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    copy: Option<CopySpec>,
    #[serde(
        default,
        deserialize_with = "optional_scalar_map",
        skip_serializing_if = "Option::is_none"
    )]
    env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workdir: Option<String>,
}

fn optional_scalar_map<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    super::scalar_map(deserializer).map(Some)
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> std::result::Result<Self, Self::Error> {
        let mut actions = Vec::new();
        if let Some(command) = raw.run {
            actions.push(Step::Run { command });
        }
        if let Some(copy) = raw.copy {
            actions.push(Step::Copy(copy));
        }
        if let Some(vars) = raw.env {
            actions.push(Step::Env { vars });
        }
        if let Some(path) = raw.workdir {
            actions.push(Step::WorkDir { path });
        }

        match actions.len() {
            0 => Err("step must have one action (run, copy, env, or workdir)".to_string()),
            1 => Ok(actions.remove(0)),
            _ => Err(format!(
                "step must have exactly one action, found: {}",
                actions.iter().map(Step::kind).collect::<Vec<_>>().join(", ")
            )),
        }
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        match step {
            Step::Run { command } => RawStep { run: Some(command), ..Default::default() },
            Step::Copy(copy) => RawStep { copy: Some(copy), ..Default::default() },
            Step::Env { vars } => RawStep { env: Some(vars), ..Default::default() },
            Step::WorkDir { path } => RawStep { workdir: Some(path), ..Default::default() },
        }
    }
}

impl Step {
    pub fn run(command: impl Into<String>) -> Self {
        Step::Run { command: command.into() }
    }

    pub fn workdir(path: impl Into<String>) -> Self {
        Step::WorkDir { path: path.into() }
    }

    /// The YAML key of this step's action.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Run { .. } => "run",
            Step::Copy(_) => "copy",
            Step::Env { .. } => "env",
            Step::WorkDir { .. } => "workdir",
        }
    }

    /// Check the action payload. Returns a reason on failure.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Step::Run { command } if command.trim().is_empty() => {
                Err("run command is empty".to_string())
            }
            Step::Copy(copy) if copy.source.is_empty() => Err("copy source is required".to_string()),
            Step::Copy(copy) if copy.dest.is_empty() => Err("copy dest is required".to_string()),
            Step::Env { vars } if vars.is_empty() => Err("env has no variables".to_string()),
            Step::Env { vars } => match vars.keys().find(|k| !is_env_name(k)) {
                Some(key) => Err(format!("invalid environment variable name '{}'", key)),
                None => Ok(()),
            },
            Step::WorkDir { path } if path.trim().is_empty() => {
                Err("workdir path is empty".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Short human-readable description, used in plans and logs.
    pub fn describe(&self) -> String {
        match self {
            Step::Run { command } => format!("RUN {}", command),
            Step::Copy(copy) => format!("COPY {} -> {}", copy.source, copy.dest),
            Step::Env { vars } => format!(
                "ENV {}",
                vars.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(" ")
            ),
            Step::WorkDir { path } => format!("WORKDIR {}", path),
        }
    }
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl BuildManifest {
    /// Structural validation. Never touches the filesystem or the container tool.
    pub fn validate(&self) -> Result<()> {
        if self.base_image.trim().is_empty() {
            return Err(PxcError::validation("'from' field is required"));
        }
        if self.setup_steps.is_empty() {
            return Err(PxcError::validation(
                "'setup' field is required and must contain at least one step",
            ));
        }
        for (i, step) in self.setup_steps.iter().enumerate() {
            step.validate()
                .map_err(|reason| PxcError::validation(format!("setup step {}: {}", i + 1, reason)))?;
        }
        for (i, step) in self.cleanup_steps.iter().enumerate() {
            step.validate().map_err(|reason| {
                PxcError::validation(format!("cleanup step {}: {}", i + 1, reason))
            })?;
        }
        Ok(())
    }

    /// Template name from metadata: `name[:version]`, or `custom-template`.
    pub fn template_name(&self) -> String {
        match &self.metadata {
            Some(meta) if !meta.name.is_empty() => {
                if meta.version.is_empty() {
                    meta.name.clone()
                } else {
                    format!("{}:{}", meta.name, meta.version)
                }
            }
            _ => "custom-template".to_string(),
        }
    }
}
