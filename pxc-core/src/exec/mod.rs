//! External command execution.
//!
//! Every container operation goes through [`CommandExecutor`], so tests can
//! swap in a recording fake and nothing touches a real host.

use crate::error::{PxcError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs one external command to completion.
///
/// A non-zero exit is reported through [`CommandOutput::status`], not as an
/// error. `Err` means the command could not be run at all.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args`. When `stream` is set, output goes straight to
    /// the terminal and the returned stdout/stderr are empty.
    async fn run(&self, program: &str, args: &[String], stream: bool) -> Result<CommandOutput>;
}

/// [`CommandExecutor`] backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    #[instrument(skip(self, args), fields(command = %render_command(program, args)))]
    async fn run(&self, program: &str, args: &[String], stream: bool) -> Result<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());

        let spawn_err = |e: std::io::Error| PxcError::CommandSpawn {
            command: render_command(program, args),
            source: e,
        };

        let output = if stream {
            let status = cmd
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(spawn_err)?;
            CommandOutput { status: status.code().unwrap_or(-1), ..Default::default() }
        } else {
            let output = cmd.output().await.map_err(spawn_err)?;
            CommandOutput {
                status: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }
        };

        debug!(status = output.status, "Command finished");
        Ok(output)
    }
}

/// Render a command line for logs and error messages, quoting where needed.
pub fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().map(|a| shell_quote(a)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote `value` for `sh` unless it is made only of safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
