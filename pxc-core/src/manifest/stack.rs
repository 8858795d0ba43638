//! Stack manifest (`lxc-stack.yml`) types and validation.

use super::build::{Metadata, Resources};
use crate::error::{PxcError, Result};
use crate::resolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Build manifest file name used when a build source does not name one.
pub const DEFAULT_BUILD_FILE: &str = "LXCfile.yml";

/// Network name that is always valid without a definition.
pub const DEFAULT_NETWORK: &str = "default";

/// A multi-service application definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackManifest {
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeSpec>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub hooks: Hooks,
}

/// One service within a stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub resources: Resources,

    #[serde(default, deserialize_with = "super::scalar_map")]
    pub environment: BTreeMap<String, String>,

    /// Port mappings, recorded but not provisioned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    /// `name:/path[:ro]` or `/host/path:/path` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "restart", default)]
    pub restart_policy: RestartPolicy,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,

    #[serde(default = "default_scale")]
    pub scale: i64,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_scale() -> i64 {
    1
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            build: None,
            template: None,
            hostname: None,
            resources: Resources::default(),
            environment: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            depends_on: Vec::new(),
            restart_policy: RestartPolicy::default(),
            networks: Vec::new(),
            scale: default_scale(),
            labels: BTreeMap::new(),
        }
    }
}

/// Where a service's template comes from when it is built locally.
///
/// Either a bare context directory or a detailed mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildSource {
    Context(String),
    Detailed(BuildSpec),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    #[serde(default)]
    pub context: String,

    /// Build manifest path relative to the context.
    #[serde(default, alias = "dockerfile", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, deserialize_with = "super::scalar_map")]
    pub args: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl BuildSource {
    pub fn context(&self) -> &str {
        match self {
            BuildSource::Context(context) => context,
            BuildSource::Detailed(spec) => &spec.context,
        }
    }

    pub fn set_context(&mut self, context: String) {
        match self {
            BuildSource::Context(c) => *c = context,
            BuildSource::Detailed(spec) => spec.context = context,
        }
    }

    /// Manifest file name, defaulting to [`DEFAULT_BUILD_FILE`].
    pub fn file(&self) -> &str {
        match self {
            BuildSource::Detailed(BuildSpec { file: Some(file), .. }) if !file.is_empty() => file,
            _ => DEFAULT_BUILD_FILE,
        }
    }

    pub fn args(&self) -> BTreeMap<String, String> {
        match self {
            BuildSource::Context(_) => BTreeMap::new(),
            BuildSource::Detailed(spec) => spec.args.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    #[default]
    #[serde(rename = "no", alias = "none")]
    No,
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "on-failure")]
    OnFailure,
    #[serde(rename = "unless-stopped")]
    UnlessStopped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Stack-wide defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxmox: Option<ProxmoxSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxmoxSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
}

impl Settings {
    /// Storage override from `settings.proxmox.storage`, if non-empty.
    pub fn storage(&self) -> Option<&str> {
        self.proxmox.as_ref().and_then(|p| p.storage.as_deref()).filter(|s| !s.is_empty())
    }
}

/// Lifecycle hooks: host shell commands run around `up` and `down`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hooks {
    pub pre_start: Vec<String>,
    pub post_start: Vec<String>,
    pub pre_stop: Vec<String>,
    pub post_stop: Vec<String>,
}

/// A parsed entry of `ServiceSpec::volumes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Parse `source:target[:ro|rw]`.
    ///
    /// A leading `X:` is a Windows drive only when the path after it starts
    /// with a separator and an absolute target follows, so `d:/data:ro` is the
    /// named volume `d`.
    pub fn parse(spec: &str) -> Option<VolumeMount> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (source, rest) = if is_drive_prefix(&parts) {
            (format!("{}:{}", parts[0], parts[1]), &parts[2..])
        } else if parts.len() >= 2 {
            (parts[0].to_string(), &parts[1..])
        } else {
            return None;
        };
        let target = rest.first().filter(|t| !t.is_empty())?.to_string();
        let read_only = rest.get(1).map(|m| *m == "ro").unwrap_or(false);
        Some(VolumeMount { source, target, read_only })
    }

    /// Host path sources bind-mount directly and need no volume definition.
    pub fn is_host_path(&self) -> bool {
        let mut chars = self.source.chars();
        let drive = matches!(
            (chars.next(), chars.next(), chars.next()),
            (Some(letter), Some(':'), Some('/' | '\\')) if letter.is_ascii_alphabetic()
        );
        drive || self.source.starts_with('/') || self.source.starts_with('.')
    }
}

fn is_drive_prefix(parts: &[&str]) -> bool {
    parts.len() >= 3
        && parts[0].len() == 1
        && parts[0].chars().all(|c| c.is_ascii_alphabetic())
        && parts[1].starts_with(['/', '\\'])
        && parts[2].starts_with('/')
}

impl ServiceSpec {
    /// Container hostname: explicit value or `<project>-<service>`.
    pub fn hostname_for(&self, project: &str, service: &str) -> String {
        match &self.hostname {
            Some(hostname) if !hostname.is_empty() => hostname.clone(),
            _ => format!("{}-{}", project, service),
        }
    }

    fn template_name(&self) -> Option<&str> {
        self.template.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn validate(&self, name: &str) -> Result<()> {
        let fail = |reason: String| PxcError::validation(format!("service '{}': {}", name, reason));

        match (&self.build, self.template_name()) {
            (None, None) => return Err(fail("must specify either 'build' or 'template'".into())),
            (Some(_), Some(_)) => {
                return Err(fail("cannot specify both 'build' and 'template'".into()))
            }
            (Some(build), None) if build.context().trim().is_empty() => {
                return Err(fail("build context is required".into()))
            }
            _ => {}
        }

        if self.scale < 0 {
            return Err(fail("scale cannot be negative".into()));
        }
        Ok(())
    }
}

impl StackManifest {
    /// Structural validation plus dependency checks.
    ///
    /// Undefined `depends_on` references fail with
    /// [`PxcError::MissingDependency`] before cycles are searched for.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PxcError::validation("'version' field is required"));
        }
        if self.services.is_empty() {
            return Err(PxcError::validation(
                "'services' field is required and must contain at least one service",
            ));
        }

        for (name, service) in &self.services {
            if name.trim().is_empty() {
                return Err(PxcError::validation("service names cannot be empty"));
            }
            service.validate(name)?;
        }

        for (name, service) in &self.services {
            for network in &service.networks {
                if network != DEFAULT_NETWORK && !self.networks.contains_key(network) {
                    return Err(PxcError::validation(format!(
                        "service '{}' references undefined network '{}'",
                        name, network
                    )));
                }
            }
            for volume in &service.volumes {
                let mount = VolumeMount::parse(volume).ok_or_else(|| {
                    PxcError::validation(format!(
                        "service '{}' has malformed volume '{}'",
                        name, volume
                    ))
                })?;
                if !mount.is_host_path() && !self.volumes.contains_key(&mount.source) {
                    return Err(PxcError::validation(format!(
                        "service '{}' references undefined volume '{}'",
                        name, mount.source
                    )));
                }
            }
        }

        resolver::order(&self.services).map(|_| ())
    }

    /// Display name: `metadata.name` when set, else the given fallback.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.metadata.as_ref().map(|m| m.name.as_str()).filter(|n| !n.is_empty()).unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> StackManifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    const WEB_DB: &str = r#"
version: "1.0"
services:
  db:
    template: debian-12
    volumes: ["data:/var/lib/postgresql"]
  web:
    build:
      context: ./web
      dockerfile: Custom.yml
      args:
        VERSION: 2
    depends_on: [db]
    networks: [frontend, default]
    restart: unless-stopped
    environment:
      PORT: 80
networks:
  frontend: {}
volumes:
  data: {}
hooks:
  post_start: ["echo up"]
"#;

    #[test]
    fn test_parse_and_validate() {
        let stack = parse(WEB_DB);
        assert!(stack.validate().is_ok());

        let web = &stack.services["web"];
        let build = web.build.as_ref().unwrap();
        assert_eq!(build.context(), "./web");
        assert_eq!(build.file(), "Custom.yml");
        assert_eq!(build.args()["VERSION"], "2");
        assert_eq!(web.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(web.scale, 1);
        assert_eq!(web.environment["PORT"], "80");
        assert_eq!(stack.hooks.post_start, vec!["echo up"]);
    }

    #[test]
    fn test_bare_build_context() {
        let stack = parse("version: '1'\nservices:\n  app:\n    build: ./app\n");
        let build = stack.services["app"].build.as_ref().unwrap();
        assert_eq!(build.context(), "./app");
        assert_eq!(build.file(), DEFAULT_BUILD_FILE);
        assert!(stack.validate().is_ok());
    }

    #[test]
    fn test_build_and_template_exclusive() {
        let stack = parse("version: '1'\nservices:\n  app:\n    build: .\n    template: debian\n");
        let err = stack.validate().unwrap_err();
        assert!(err.to_string().contains("cannot specify both"));
    }

    #[test]
    fn test_build_or_template_required() {
        let stack = parse("version: '1'\nservices:\n  app:\n    hostname: x\n");
        let err = stack.validate().unwrap_err();
        assert!(err.to_string().contains("either 'build' or 'template'"));
    }

    #[test]
    fn test_missing_version() {
        let stack = parse("services:\n  app:\n    template: debian\n");
        assert!(matches!(stack.validate(), Err(PxcError::Validation { .. })));
    }

    #[test]
    fn test_no_services() {
        let stack = parse("version: '1'\n");
        assert!(stack.validate().is_err());
    }

    #[test]
    fn test_negative_scale() {
        let stack = parse("version: '1'\nservices:\n  app:\n    template: debian\n    scale: -1\n");
        assert!(stack.validate().unwrap_err().to_string().contains("scale"));
    }

    #[test]
    fn test_invalid_restart_policy_fails_parse() {
        let result: std::result::Result<StackManifest, _> = serde_yaml::from_str(
            "version: '1'\nservices:\n  app:\n    template: debian\n    restart: sometimes\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_restart_none_alias() {
        let stack =
            parse("version: '1'\nservices:\n  app:\n    template: debian\n    restart: none\n");
        assert_eq!(stack.services["app"].restart_policy, RestartPolicy::No);
    }

    #[test]
    fn test_undefined_network() {
        let stack =
            parse("version: '1'\nservices:\n  app:\n    template: debian\n    networks: [backend]\n");
        let err = stack.validate().unwrap_err();
        assert!(err.to_string().contains("undefined network 'backend'"));
    }

    #[test]
    fn test_undefined_volume() {
        let stack =
            parse("version: '1'\nservices:\n  app:\n    template: debian\n    volumes: ['cache:/c']\n");
        let err = stack.validate().unwrap_err();
        assert!(err.to_string().contains("undefined volume 'cache'"));
    }

    #[test]
    fn test_single_letter_named_volume_must_be_defined() {
        let stack =
            parse("version: '1'\nservices:\n  app:\n    template: debian\n    volumes: ['d:/data:ro']\n");
        let err = stack.validate().unwrap_err();
        assert!(err.to_string().contains("undefined volume 'd'"));

        let stack = parse(
            "version: '1'\nservices:\n  app:\n    template: debian\n    volumes: ['d:/data:ro']\nvolumes:\n  d: {}\n",
        );
        assert!(stack.validate().is_ok());
    }

    #[test]
    fn test_host_path_volume_is_valid() {
        let stack = parse(
            "version: '1'\nservices:\n  app:\n    template: debian\n    volumes: ['/srv/data:/data:ro']\n",
        );
        assert!(stack.validate().is_ok());
    }

    #[test]
    fn test_undefined_dependency_is_distinct_error() {
        let stack =
            parse("version: '1'\nservices:\n  app:\n    template: debian\n    depends_on: [ghost]\n");
        assert!(matches!(
            stack.validate(),
            Err(PxcError::MissingDependency { ref service, ref dependency })
                if service == "app" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_detected_during_validation() {
        let stack = parse(
            "version: '1'\nservices:\n  a:\n    template: t\n    depends_on: [b]\n  b:\n    template: t\n    depends_on: [a]\n",
        );
        assert!(matches!(stack.validate(), Err(PxcError::CircularDependency { .. })));
    }

    #[test]
    fn test_validate_is_idempotent() {
        let stack = parse(WEB_DB);
        let first = stack.validate().is_ok();
        let second = stack.validate().is_ok();
        assert_eq!(first, second);
    }

    #[test]
    fn test_volume_mount_parse() {
        let mount = VolumeMount::parse("data:/var/lib/db:ro").unwrap();
        assert_eq!(mount.source, "data");
        assert_eq!(mount.target, "/var/lib/db");
        assert!(mount.read_only);
        assert!(!mount.is_host_path());

        let windows = VolumeMount::parse("C:\\data:/data").unwrap();
        assert_eq!(windows.source, "C:\\data");
        assert!(windows.is_host_path());

        let windows_ro = VolumeMount::parse("D:/srv/app:/app:ro").unwrap();
        assert_eq!(windows_ro.source, "D:/srv/app");
        assert_eq!(windows_ro.target, "/app");
        assert!(windows_ro.read_only);
        assert!(windows_ro.is_host_path());

        let named = VolumeMount::parse("d:/data:ro").unwrap();
        assert_eq!(named.source, "d");
        assert_eq!(named.target, "/data");
        assert!(named.read_only);
        assert!(!named.is_host_path());

        assert!(VolumeMount::parse("just-a-name").is_none());
    }

    #[test]
    fn test_hostname_default() {
        let service = ServiceSpec::default();
        assert_eq!(service.hostname_for("shop", "web"), "shop-web");
        let named = ServiceSpec { hostname: Some("frontend".into()), ..Default::default() };
        assert_eq!(named.hostname_for("shop", "web"), "frontend");
    }

    #[test]
    fn test_settings_storage() {
        let stack = parse(
            "version: '1'\nservices:\n  a:\n    template: t\nsettings:\n  proxmox:\n    storage: zfs\n  default_resources:\n    memory: 256\n",
        );
        assert_eq!(stack.settings.storage(), Some("zfs"));
        assert_eq!(stack.settings.default_resources.unwrap().memory_mb, 256);
    }

    #[test]
    fn test_settings_ignore_unused_proxmox_keys() {
        let stack = parse(
            "version: '1'\nservices:\n  a:\n    template: t\nsettings:\n  proxmox:\n    node: pve2\n    template_storage: local\n",
        );
        assert_eq!(stack.settings.proxmox, Some(ProxmoxSettings { storage: None }));
        assert_eq!(stack.settings.storage(), None);
    }
}
