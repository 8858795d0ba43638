//! Configuration management.
//!
//! Settings come from a YAML file (`.pxc.yaml` in the working directory or the
//! home directory) with `PXC_*` environment variables layered on top.

use crate::error::{PxcError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory and in `$HOME`.
pub const CONFIG_FILE_NAME: &str = ".pxc.yaml";

/// User configuration for pxc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: String,
    pub build_memory_mb: u32,
    pub build_cores: u32,
    pub build_hostname_prefix: String,
    pub ready_attempts: u32,
    pub ready_interval_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: "local-lvm".to_string(),
            build_memory_mb: 512,
            build_cores: 1,
            build_hostname_prefix: "pxc-build-".to_string(),
            ready_attempts: 60,
            ready_interval_secs: 1,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Candidate config file locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the first existing file from
    /// [`Config::search_paths`] is used, falling back to defaults. Environment
    /// overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::search_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PxcError::InvalidConfig {
            reason: format!("Failed to read config {}: {}", path.display(), e),
        })?;
        Self::from_yaml(&content).map_err(|e| PxcError::InvalidConfig {
            reason: format!("Failed to parse config {}: {}", path.display(), e),
        })
    }

    fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply `PXC_*` overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(storage) = lookup("PXC_STORAGE") {
            self.storage = storage;
        }
        if let Some(level) = lookup("PXC_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ready_attempts == 0 {
            return Err(PxcError::InvalidConfig {
                reason: "ready_attempts must be at least 1".to_string(),
            });
        }
        if self.build_memory_mb == 0 || self.build_cores == 0 {
            return Err(PxcError::InvalidConfig {
                reason: "build_memory_mb and build_cores must be positive".to_string(),
            });
        }
        Ok(())
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_secs(self.ready_interval_secs)
    }

    /// Save configuration to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| PxcError::IoError { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_yaml::to_string(self).map_err(|e| PxcError::InvalidConfig {
            reason: format!("Failed to serialize config: {}", e),
        })?;
        std::fs::write(path, content)
            .map_err(|e| PxcError::IoError { path: path.to_path_buf(), source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage, "local-lvm");
        assert_eq!(config.build_memory_mb, 512);
        assert_eq!(config.build_cores, 1);
        assert_eq!(config.ready_attempts, 60);
        assert_eq!(config.ready_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("storage: zfs-pool\nready_attempts: 5\n").unwrap();
        assert_eq!(config.storage, "zfs-pool");
        assert_eq!(config.ready_attempts, 5);
        assert_eq!(config.build_memory_mb, 512);
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> =
            [("PXC_STORAGE", "ceph"), ("PXC_LOG_LEVEL", "debug")].into_iter().collect();
        let mut config = Config::from_yaml("storage: zfs-pool\nlog_level: warn\n").unwrap();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.storage, "ceph");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let config = Config::from_yaml("node: pve2\ntemplate_storage: local\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = Config { build_cores: 4, ..Config::default() };
        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = Config { ready_attempts: 0, ..Config::default() };
        assert!(matches!(config.validate(), Err(PxcError::InvalidConfig { .. })));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/.pxc.yaml")));
        assert!(result.is_err());
    }
}
