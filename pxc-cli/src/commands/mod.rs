//! CLI command implementations

pub mod build;
pub mod ps;
pub mod stack;

use anyhow::{Context as _, Result};
use pxc_core::{loader, Config, Pct, ProcessExecutor, StackManifest};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings shared by every command.
pub struct Context {
    pub config: Config,
    pub verbose: bool,
    pub dry_run: bool,
}

impl Context {
    /// `pct` client running real processes, honouring `--dry-run` and `--verbose`.
    pub fn pct(&self) -> Pct {
        Pct::new(Arc::new(ProcessExecutor), self.dry_run, self.verbose)
    }
}

/// Parse a `KEY=VALUE` argument.
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid KEY=VALUE format: {}", s)),
    }
}

/// A loaded stack with its file and project name.
#[derive(Debug)]
pub struct StackFile {
    pub path: PathBuf,
    pub project: String,
    pub manifest: StackManifest,
}

/// Locate and load the stack file, defaulting to conventional names in the
/// working directory.
pub fn load_stack(file: Option<PathBuf>, project_name: Option<String>) -> Result<StackFile> {
    let path = file.unwrap_or_else(|| loader::default_stack_file(Path::new(".")));
    let manifest = loader::load_stack_manifest(&path)
        .with_context(|| format!("Failed to load stack file {}", path.display()))?;
    let project = project_name.unwrap_or_else(|| loader::project_name(&path));
    Ok(StackFile { path, project, manifest })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(parse_key_val("A=1").unwrap(), ("A".to_string(), "1".to_string()));
        assert_eq!(parse_key_val("URL=a=b").unwrap(), ("URL".to_string(), "a=b".to_string()));
        assert_eq!(parse_key_val("EMPTY=").unwrap(), ("EMPTY".to_string(), String::new()));
        assert!(parse_key_val("NOPE").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_load_stack_uses_directory_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let project_dir = dir.path().join("Web Shop");
        std::fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join("lxc-stack.yml");
        std::fs::write(&path, "version: '1'\nservices:\n  web:\n    template: debian\n").unwrap();

        let stack = load_stack(Some(path.clone()), None).unwrap();
        assert_eq!(stack.project, "web-shop");
        assert_eq!(stack.path, path);

        let stack = load_stack(Some(path), Some("custom".into())).unwrap();
        assert_eq!(stack.project, "custom");
    }

    #[test]
    fn test_load_stack_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_stack(Some(dir.path().join("lxc-stack.yml")), None).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load stack file"));
    }
}
