//! Manifest loading from disk.
//!
//! Reads YAML manifests, resolves paths relative to the manifest's own
//! directory and validates the result.

use crate::error::{PxcError, Result};
use crate::manifest::{BuildManifest, StackManifest, Step, VolumeMount};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Build manifest names tried by [`default_build_file`], in order.
pub const BUILD_FILE_CANDIDATES: &[&str] =
    &["LXCfile.yml", "LXCfile.yaml", "lxcfile.yml", "lxcfile.yaml"];

/// Stack manifest names tried by [`default_stack_file`], in order.
pub const STACK_FILE_CANDIDATES: &[&str] = &[
    "lxc-stack.yml",
    "lxc-stack.yaml",
    "stack.yml",
    "stack.yaml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// Parse a build manifest from YAML without touching the filesystem.
pub fn parse_build_manifest(content: &str) -> Result<BuildManifest> {
    let manifest: BuildManifest = serde_yaml::from_str(content)
        .map_err(|e| PxcError::ManifestParse { path: None, reason: e.to_string() })?;
    manifest.validate()?;
    Ok(manifest)
}

/// Parse a stack manifest from YAML without touching the filesystem.
pub fn parse_stack_manifest(content: &str) -> Result<StackManifest> {
    let stack: StackManifest = serde_yaml::from_str(content)
        .map_err(|e| PxcError::ManifestParse { path: None, reason: e.to_string() })?;
    stack.validate()?;
    Ok(stack)
}

/// Load an `LXCfile`. Relative copy sources are resolved against its directory.
#[instrument]
pub fn load_build_manifest(path: &Path) -> Result<BuildManifest> {
    ensure_exists(path)?;
    info!("Loading build manifest from {:?}", path);

    let content = read(path)?;
    let mut manifest: BuildManifest = serde_yaml::from_str(&content).map_err(|e| {
        PxcError::ManifestParse { path: Some(path.to_path_buf()), reason: e.to_string() }
    })?;

    let base = base_dir(path);
    for step in manifest.setup_steps.iter_mut().chain(manifest.cleanup_steps.iter_mut()) {
        if let Step::Copy(copy) = step {
            if !copy.source.is_empty() && Path::new(&copy.source).is_relative() {
                copy.source = base.join(&copy.source).to_string_lossy().to_string();
            }
        }
    }

    manifest.validate()?;
    Ok(manifest)
}

/// Load a stack manifest. Relative build contexts and host volume paths are
/// resolved against its directory.
#[instrument]
pub fn load_stack_manifest(path: &Path) -> Result<StackManifest> {
    ensure_exists(path)?;
    info!("Loading stack manifest from {:?}", path);

    let content = read(path)?;
    let mut stack: StackManifest = serde_yaml::from_str(&content).map_err(|e| {
        PxcError::ManifestParse { path: Some(path.to_path_buf()), reason: e.to_string() }
    })?;

    let base = base_dir(path);
    for (name, service) in stack.services.iter_mut() {
        if let Some(build) = service.build.as_mut() {
            let context = build.context();
            if !context.is_empty() && Path::new(context).is_relative() {
                let resolved = base.join(context).to_string_lossy().to_string();
                debug!(service = %name, context = %resolved, "Resolved build context");
                build.set_context(resolved);
            }
        }

        for volume in service.volumes.iter_mut() {
            if let Some(mount) = VolumeMount::parse(volume) {
                if mount.source.starts_with('.') {
                    let source = base.join(&mount.source).to_string_lossy().to_string();
                    let suffix = &volume[mount.source.len()..];
                    *volume = format!("{}{}", source, suffix);
                }
            }
        }
    }

    stack.validate()?;
    Ok(stack)
}

/// Fail with a helpful message when a manifest is missing, listing nearby
/// files that look like manifests.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }

    let dir = base_dir(path);
    let mut suggestions: Vec<String> = std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|entry| entry.file_name().to_string_lossy().to_string())
                .filter(|name| {
                    name.to_lowercase().contains("lxc")
                        || name.ends_with(".yml")
                        || name.ends_with(".yaml")
                })
                .collect()
        })
        .unwrap_or_default();
    suggestions.sort();

    let hint = if suggestions.is_empty() {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        format!("\n\nTo get started, create {}", name)
    } else {
        let listed: Vec<String> = suggestions
            .iter()
            .map(|s| format!("  {}", dir.join(s).display()))
            .collect();
        format!("\n\nDid you mean one of these files?\n{}", listed.join("\n"))
    };

    Err(PxcError::ManifestNotFound { path: path.to_path_buf(), hint })
}

/// First existing build manifest in `dir`, else `dir/LXCfile.yml`.
pub fn default_build_file(dir: &Path) -> PathBuf {
    first_existing(dir, BUILD_FILE_CANDIDATES)
}

/// First existing stack manifest in `dir`, else `dir/lxc-stack.yml`.
pub fn default_stack_file(dir: &Path) -> PathBuf {
    first_existing(dir, STACK_FILE_CANDIDATES)
}

fn first_existing(dir: &Path, candidates: &[&str]) -> PathBuf {
    candidates
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .unwrap_or_else(|| dir.join(candidates[0]))
}

/// Project name for a stack file: its directory name, lowercased, with
/// anything outside `[a-z0-9-]` replaced by `-`.
pub fn project_name(stack_path: &Path) -> String {
    let dir = stack_path
        .canonicalize()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default();

    let raw = dir.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let name = name.trim_matches('-').to_string();
    if name.is_empty() {
        "pxc".to_string()
    } else {
        name
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| PxcError::FileReadError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

fn base_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
