//! Ambient configuration handed to every child process.
//!
//! A [`ConfigSnapshot`] is an explicit, flattened key/value view of the
//! process configuration. The command executor exports every key as an
//! environment variable on the child, so the snapshot is passed around
//! instead of living in a global.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PodtablesError, Result};

/// Flattened configuration keys (nested maps joined with `.`) and their values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, Value>,
}

impl ConfigSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot from a JSON or YAML file, chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if its
    /// top level is not a map.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PodtablesError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&raw).map_err(|e| PodtablesError::Config {
                    message: format!("{}: {e}", path.display()),
                })?
            }
            _ => serde_json::from_str(&raw)?,
        };
        let snapshot = Self::from_value(value)?;
        tracing::debug!(path = %path.display(), keys = snapshot.values.len(), "loaded configuration");
        Ok(snapshot)
    }

    /// Builds a snapshot from any serializable configuration struct.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the value is not a map.
    pub fn from_serializable<T: Serialize>(config: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(config)?)
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(PodtablesError::Config {
                message: "configuration root must be a map".into(),
            });
        };
        let mut snapshot = Self::new();
        for (key, value) in map {
            snapshot.insert_flattened(key, value);
        }
        Ok(snapshot)
    }

    fn insert_flattened(&mut self, key: String, value: Value) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (child, value) in map {
                    self.insert_flattened(format!("{key}.{child}"), value);
                }
            }
            other => {
                let _ = self.values.insert(key, other);
            }
        }
    }

    /// Sets a single key, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let _ = self.values.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns every key in sorted order.
    pub fn all_keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Returns `true` when the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Renders the snapshot as child environment variables.
    ///
    /// Keys are upper-cased with every non-alphanumeric character replaced
    /// by `_`. Null and empty values are skipped.
    #[must_use]
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .filter_map(|(key, value)| stringify(value).map(|v| (env_key(key), v)))
            .collect()
    }
}

/// Converts a configuration key to its environment variable name.
#[must_use]
pub fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn stringify(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::Null => return None,
        Value::Object(map) if map.is_empty() => return None,
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(stringify)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    };
    if rendered.is_empty() { None } else { Some(rendered) }
}

/// Runner settings read from the ambient configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerSettings {
    /// Whether commands target a pod network namespace from the host.
    #[serde(default)]
    pub cni_mode: bool,
    /// Pod network namespace handle, required in CNI mode.
    #[serde(default)]
    pub network_namespace: Option<PathBuf>,
    /// Fixed iptables version, skipping detection when set.
    #[serde(default)]
    pub iptables_version: Option<String>,
}

impl RunnerSettings {
    /// Key holding [`RunnerSettings::cni_mode`].
    pub const CNI_MODE_KEY: &'static str = "cni-mode";
    /// Key holding [`RunnerSettings::network_namespace`].
    pub const NETWORK_NAMESPACE_KEY: &'static str = "network-namespace";
    /// Key holding [`RunnerSettings::iptables_version`].
    pub const IPTABLES_VERSION_KEY: &'static str = "iptables-version";

    /// Extracts runner settings from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if a key has the wrong type, or if CNI mode is
    /// enabled without a network namespace.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Result<Self> {
        let mut map = serde_json::Map::new();
        for key in [
            Self::CNI_MODE_KEY,
            Self::NETWORK_NAMESPACE_KEY,
            Self::IPTABLES_VERSION_KEY,
        ] {
            if let Some(value) = snapshot.get(key) {
                let _ = map.insert(key.to_owned(), value.clone());
            }
        }
        let settings: Self = serde_json::from_value(Value::Object(map))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if CNI mode is enabled without a network namespace.
    pub fn validate(&self) -> Result<()> {
        if self.cni_mode && self.network_namespace.is_none() {
            return Err(PodtablesError::Config {
                message: format!(
                    "{} requires {}",
                    Self::CNI_MODE_KEY,
                    Self::NETWORK_NAMESPACE_KEY
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    #[test]
    fn env_key_normalizes_separators() {
        assert_eq!(env_key("log-level"), "LOG_LEVEL");
        assert_eq!(env_key("cni.netns-path"), "CNI_NETNS_PATH");
    }

    #[test]
    fn env_vars_skip_null_and_empty_values() {
        let mut snapshot = ConfigSnapshot::new();
        snapshot.set("empty", "");
        snapshot.set("nothing", Value::Null);
        snapshot.set("dry-run", true);
        snapshot.set("retries", 3);
        let env = snapshot.to_env_vars();
        assert_eq!(
            env,
            vec![
                ("DRY_RUN".to_owned(), "true".to_owned()),
                ("RETRIES".to_owned(), "3".to_owned()),
            ]
        );
    }

    #[test]
    fn nested_maps_are_flattened() {
        let snapshot = ConfigSnapshot::from_serializable(&json!({
            "redirect": { "inbound-ports": [15001, 15006], "mode": "tproxy" },
            "empty-map": {}
        }))
        .unwrap();
        let keys: Vec<_> = snapshot.all_keys().collect();
        assert_eq!(keys, ["empty-map", "redirect.inbound-ports", "redirect.mode"]);
        let env = snapshot.to_env_vars();
        assert!(env.contains(&("REDIRECT_INBOUND_PORTS".to_owned(), "15001,15006".to_owned())));
        assert!(env.contains(&("REDIRECT_MODE".to_owned(), "tproxy".to_owned())));
    }

    #[test]
    fn non_map_root_is_rejected() {
        let err = ConfigSnapshot::from_serializable(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, PodtablesError::Config { .. }));
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "cni-mode: true\nnetwork-namespace: /var/run/netns/pod").unwrap();
        let snapshot = ConfigSnapshot::from_file(file.path()).unwrap();
        let settings = RunnerSettings::from_snapshot(&snapshot).unwrap();
        assert!(settings.cni_mode);
        assert_eq!(
            settings.network_namespace.as_deref(),
            Some(Path::new("/var/run/netns/pod"))
        );
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"iptables-version": "1.8.7"}}"#).unwrap();
        let snapshot = ConfigSnapshot::from_file(file.path()).unwrap();
        let settings = RunnerSettings::from_snapshot(&snapshot).unwrap();
        assert!(!settings.cni_mode);
        assert_eq!(settings.iptables_version.as_deref(), Some("1.8.7"));
    }

    #[test]
    fn cni_mode_requires_network_namespace() {
        let mut snapshot = ConfigSnapshot::new();
        snapshot.set(RunnerSettings::CNI_MODE_KEY, true);
        assert!(RunnerSettings::from_snapshot(&snapshot).is_err());
    }
}
