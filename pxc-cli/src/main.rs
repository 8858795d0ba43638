use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use pxc_core::{Config, DeployFailure, PxcError};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "pxc")]
#[command(about = "Build and run multi-container stacks on Proxmox LXC", long_about = None)]
struct Cli {
    /// Config file (defaults to ./.pxc.yaml, then ~/.pxc.yaml)
    #[arg(long, global = true, env = "PXC_CONFIG")]
    config: Option<PathBuf>,

    /// Stream command output and enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print what would run without touching any container
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a container template from an LXCfile
    Build {
        /// Path to the build manifest
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Template name (e.g., "web:1.0"), defaults to the manifest metadata
        #[arg(short, long)]
        tag: Option<String>,

        /// Build arguments (KEY=VALUE)
        #[arg(long = "build-arg", value_parser = commands::parse_key_val)]
        build_args: Vec<(String, String)>,
    },

    /// Build and start every service of a stack
    Up {
        /// Path to the stack file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Project name (defaults to the stack file's directory name)
        #[arg(short, long)]
        project_name: Option<String>,

        /// Build arguments applied to every service build (KEY=VALUE)
        #[arg(long = "build-arg", value_parser = commands::parse_key_val)]
        build_args: Vec<(String, String)>,
    },

    /// Stop and destroy every service of a stack
    Down {
        /// Path to the stack file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Project name (defaults to the stack file's directory name)
        #[arg(short, long)]
        project_name: Option<String>,

        /// Also remove named volumes
        #[arg(long)]
        volumes: bool,
    },

    /// List containers
    Ps {
        /// Show all containers, not only those of the current stack
        #[arg(short, long)]
        all: bool,

        /// Only print container ids
        #[arg(short, long)]
        quiet: bool,

        /// Project name (defaults to the stack file's directory name)
        #[arg(short, long)]
        project_name: Option<String>,

        /// Filter containers (status=running, name=web)
        #[arg(long = "filter", value_parser = commands::ps::parse_filter)]
        filters: Vec<commands::ps::Filter>,

        /// Format each line with a template, e.g. "{{.VMID}}\t{{.Name}}\t{{.Status}}"
        #[arg(long)]
        format: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(exit_code(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        println!("pxc {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())?;
    if let Err(e) = pxc_core::init_observability(&config.log_level, cli.verbose) {
        eprintln!("{} failed to initialize logging: {}", "warning:".yellow(), e);
    }

    let ctx = commands::Context { config, verbose: cli.verbose, dry_run: cli.dry_run };

    match cli.command {
        Commands::Build { file, tag, build_args } => {
            commands::build::build(&ctx, file, tag, build_args).await?;
        }

        Commands::Up { file, project_name, build_args } => {
            commands::stack::up(&ctx, file, project_name, build_args).await?;
        }

        Commands::Down { file, project_name, volumes } => {
            commands::stack::down(&ctx, file, project_name, volumes).await?;
        }

        Commands::Ps { all, quiet, project_name, filters, format } => {
            let options = commands::ps::PsOptions { all, quiet, project_name, filters, format };
            commands::ps::ps(&ctx, options).await?;
        }

        Commands::Version => {}
    }

    Ok(())
}

/// Exit status for a failed command: 2 validation, 3 build, 4 deploy, 1 other.
fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if let Some(failure) = cause.downcast_ref::<DeployFailure>() {
            return if failure.error.is_validation() { 2 } else { 4 };
        }
        if let Some(e) = cause.downcast_ref::<PxcError>() {
            return match e {
                e if e.is_validation() => 2,
                PxcError::ServiceDeploy { .. } => 4,
                PxcError::BuildAborted { .. }
                | PxcError::StepFailed { .. }
                | PxcError::NotReady { .. }
                | PxcError::Export { .. } => 3,
                _ => 1,
            };
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxc_core::DeploymentResult;

    #[test]
    fn test_exit_code_validation() {
        let err = anyhow::Error::from(PxcError::validation("bad"));
        assert_eq!(exit_code(&err), 2);

        let err = anyhow::Error::from(PxcError::MissingDependency {
            service: "web".into(),
            dependency: "db".into(),
        })
        .context("Failed to load stack");
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_exit_code_build() {
        let err = anyhow::Error::from(PxcError::BuildAborted {
            container_id: 10001,
            cause: Box::new(PxcError::NotReady { container_id: 10001, attempts: 60 }),
            cleanup: None,
        });
        assert_eq!(exit_code(&err), 3);
    }

    #[test]
    fn test_exit_code_deploy() {
        let failure = DeployFailure {
            result: DeploymentResult::default(),
            error: PxcError::ServiceDeploy {
                service: "web".into(),
                source: Box::new(PxcError::validation("no manifest")),
            },
        };
        assert_eq!(exit_code(&anyhow::Error::from(failure)), 4);

        let failure = DeployFailure {
            result: DeploymentResult::default(),
            error: PxcError::CircularDependency {
                service: "a".into(),
                cycle: vec!["a".into(), "a".into()],
            },
        };
        assert_eq!(exit_code(&anyhow::Error::from(failure)), 2);
    }

    #[test]
    fn test_exit_code_other() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(exit_code(&err), 1);
        let err = anyhow::Error::from(PxcError::InvalidConfig { reason: "x".into() });
        assert_eq!(exit_code(&err), 1);
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "pxc",
            "up",
            "-f",
            "stack.yml",
            "--dry-run",
            "--build-arg",
            "VERSION=1.2",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.dry_run);
        match cli.command {
            Commands::Up { file, project_name, build_args } => {
                assert_eq!(file, Some(PathBuf::from("stack.yml")));
                assert_eq!(project_name, None);
                assert_eq!(build_args, vec![("VERSION".to_string(), "1.2".to_string())]);
            }
            _ => panic!("expected up"),
        }
    }

    #[test]
    fn test_cli_parses_ps_filters() {
        let cli = Cli::try_parse_from([
            "pxc",
            "ps",
            "--filter",
            "status=running",
            "--filter",
            "name=shop",
            "--format",
            "{{.VMID}}",
        ])
        .unwrap();
        match cli.command {
            Commands::Ps { filters, format, .. } => {
                assert_eq!(filters.len(), 2);
                assert_eq!(format.as_deref(), Some("{{.VMID}}"));
            }
            _ => panic!("expected ps"),
        }
        assert!(Cli::try_parse_from(["pxc", "ps", "--filter", "tag=web"]).is_err());
    }

    #[test]
    fn test_cli_rejects_malformed_build_arg() {
        assert!(Cli::try_parse_from(["pxc", "build", "--build-arg", "NOEQUALS"]).is_err());
    }
}
