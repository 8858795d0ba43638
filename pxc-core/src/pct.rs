//! Typed client for the Proxmox `pct` container tool.
//!
//! Renders the `pct` argument grammar and runs it through a
//! [`CommandExecutor`]. In dry-run mode commands are logged and treated as
//! successful without being executed.

use crate::error::{PxcError, Result};
use crate::exec::{render_command, shell_quote, CommandExecutor, CommandOutput};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::{debug, info};

/// The container tool binary.
pub const PCT: &str = "pct";

/// Default `net0` for service containers.
pub const DEFAULT_NET0: &str = "name=eth0,bridge=vmbr0,ip=dhcp,type=veth";

/// Options shared by `pct create` and `pct set`. `None` and zero are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    pub hostname: Option<String>,
    pub memory_mb: u32,
    pub cores: u32,
    pub swap_mb: u32,
    pub unprivileged: bool,
    pub storage: Option<String>,
    /// `-features` entries such as `nesting=1`.
    pub features: Vec<String>,
    pub net0: Option<String>,
}

impl ContainerOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Render as `pct` flags using the given prefix (`--` for create, `-` for set).
    fn to_args(&self, prefix: &str) -> Vec<String> {
        let mut args = Vec::new();
        let mut push = |flag: &str, value: String| {
            args.push(format!("{}{}", prefix, flag));
            args.push(value);
        };
        if let Some(hostname) = &self.hostname {
            push("hostname", hostname.clone());
        }
        if self.cores > 0 {
            push("cores", self.cores.to_string());
        }
        if self.memory_mb > 0 {
            push("memory", self.memory_mb.to_string());
        }
        if self.swap_mb > 0 {
            push("swap", self.swap_mb.to_string());
        }
        if self.unprivileged {
            push("unprivileged", "1".to_string());
        }
        if !self.features.is_empty() {
            push("features", self.features.join(","));
        }
        if let Some(storage) = self.storage.as_ref().filter(|s| !s.is_empty()) {
            push("storage", storage.clone());
        }
        if let Some(net0) = &self.net0 {
            push("net0", net0.clone());
        }
        args
    }
}

/// One row of `pct list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub vmid: u32,
    pub status: String,
    pub lock: Option<String>,
    pub name: String,
}

/// `pct` client.
#[derive(Clone)]
pub struct Pct {
    executor: Arc<dyn CommandExecutor>,
    dry_run: bool,
    verbose: bool,
}

impl std::fmt::Debug for Pct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pct").field("dry_run", &self.dry_run).field("verbose", &self.verbose).finish()
    }
}

impl Pct {
    pub fn new(executor: Arc<dyn CommandExecutor>, dry_run: bool, verbose: bool) -> Self {
        Self { executor, dry_run, verbose }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The executor, for host-side commands such as hooks.
    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    async fn invoke(&self, args: Vec<String>) -> Result<CommandOutput> {
        self.invoke_with(args, self.verbose).await
    }

    async fn invoke_with(&self, args: Vec<String>, stream: bool) -> Result<CommandOutput> {
        let command = render_command(PCT, &args);
        if self.dry_run {
            info!("[dry-run] {}", command);
            return Ok(CommandOutput::ok());
        }

        debug!(%command, "Running");
        let output = self.executor.run(PCT, &args, stream).await?;
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        metrics::record_pct_command(subcommand, output.success());

        if !output.success() {
            let stderr = match output.stderr.trim() {
                "" => output.stdout.trim().to_string(),
                s => s.to_string(),
            };
            return Err(PxcError::CommandFailed { command, status: output.status, stderr });
        }
        Ok(output)
    }

    /// `pct create <id> <template> [options]`
    pub async fn create(&self, id: u32, template: &str, options: &ContainerOptions) -> Result<()> {
        let mut args = vec!["create".to_string(), id.to_string(), template.to_string()];
        args.extend(options.to_args("--"));
        self.invoke(args).await.map(drop)
    }

    /// `pct clone <template_id> <id> --hostname <hostname>`
    pub async fn clone_template(&self, template_id: &str, id: u32, hostname: &str) -> Result<()> {
        let args = vec![
            "clone".to_string(),
            template_id.to_string(),
            id.to_string(),
            "--hostname".to_string(),
            hostname.to_string(),
        ];
        self.invoke(args).await.map(drop)
    }

    /// `pct set <id> [options]`
    pub async fn set(&self, id: u32, options: &ContainerOptions) -> Result<()> {
        let mut args = vec!["set".to_string(), id.to_string()];
        args.extend(options.to_args("-"));
        self.invoke(args).await.map(drop)
    }

    pub async fn start(&self, id: u32) -> Result<()> {
        self.invoke(vec!["start".to_string(), id.to_string()]).await.map(drop)
    }

    pub async fn stop(&self, id: u32) -> Result<()> {
        self.invoke(vec!["stop".to_string(), id.to_string()]).await.map(drop)
    }

    pub async fn destroy(&self, id: u32) -> Result<()> {
        self.invoke(vec!["destroy".to_string(), id.to_string()]).await.map(drop)
    }

    /// Convert a stopped container into a template in place.
    pub async fn template(&self, id: u32) -> Result<()> {
        self.invoke(vec!["template".to_string(), id.to_string()]).await.map(drop)
    }

    /// `pct push <id> <source> <dest>`
    pub async fn push(&self, id: u32, source: &str, dest: &str) -> Result<()> {
        let args =
            vec!["push".to_string(), id.to_string(), source.to_string(), dest.to_string()];
        self.invoke(args).await.map(drop)
    }

    /// `pct exec <id> -- <command...>`
    pub async fn exec(&self, id: u32, command: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["exec".to_string(), id.to_string(), "--".to_string()];
        args.extend(command.iter().map(|c| c.to_string()));
        self.invoke(args).await
    }

    /// `pct exec <id> -- sh -c <script>`
    pub async fn exec_shell(&self, id: u32, script: &str) -> Result<CommandOutput> {
        self.exec(id, &["sh", "-c", script]).await
    }

    /// Append `KEY=VALUE` to the container's `/etc/environment`.
    pub async fn append_environment(&self, id: u32, key: &str, value: &str) -> Result<CommandOutput> {
        self.exec_shell(id, &environment_script(key, value)).await
    }

    /// Readiness probe: `pct exec <id> -- echo ready`, always captured.
    pub async fn probe(&self, id: u32) -> Result<()> {
        let args = ["exec", &id.to_string(), "--", "echo", "ready"].map(String::from).to_vec();
        self.invoke_with(args, false).await.map(drop)
    }

    /// `pct list`, parsed. Empty in dry-run.
    pub async fn list(&self) -> Result<Vec<ContainerInfo>> {
        let output = self.invoke_with(vec!["list".to_string()], false).await?;
        Ok(parse_list(&output.stdout))
    }
}

/// Parse `pct list` output (`VMID Status [Lock] Name`).
pub fn parse_list(output: &str) -> Vec<ContainerInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            let vmid = fields[0].parse().ok()?;
            let (lock, name) = if fields.len() >= 4 {
                (Some(fields[2].to_string()), fields[3..].join(" "))
            } else {
                (None, fields[2].to_string())
            };
            Some(ContainerInfo { vmid, status: fields[1].to_string(), lock, name })
        })
        .collect()
}

/// Shell line appending one variable to `/etc/environment`. The whole
/// `KEY=VALUE` pair is one quoted word, whatever the value contains.
pub fn environment_script(key: &str, value: &str) -> String {
    format!("echo {} >> /etc/environment", shell_quote(&format!("{}={}", key, value)))
}
