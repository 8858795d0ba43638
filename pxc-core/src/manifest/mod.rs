//! Manifest model: build manifests (`LXCfile.yml`) and stack manifests
//! (`lxc-stack.yml`), with structural validation.

pub mod build;
pub mod stack;

pub use build::{BuildManifest, CopySpec, Features, Metadata, Resources, Step};
pub use stack::{
    BuildSource, BuildSpec, Hooks, NetworkSpec, ProxmoxSettings, RestartPolicy, ServiceSpec,
    Settings, StackManifest, VolumeMount, VolumeSpec, DEFAULT_BUILD_FILE, DEFAULT_NETWORK,
};

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Deserialize a `name -> scalar` mapping into strings.
///
/// YAML authors write `PORT: 8080` or `DEBUG: true`; those land here as
/// `"8080"` and `"true"`. Nested sequences or mappings are rejected.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => {
                    return Err(serde::de::Error::custom(format!(
                        "value for '{}' must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            Ok((key, value))
        })
        .collect()
}
