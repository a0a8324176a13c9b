/// Configuration management for gkestack stacks
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

pub mod settings;
mod template;

pub use settings::StackSettings;
pub use template::render_example;

/// Namespace used for prefixed keys (`gkestack:node_count`)
pub const CONFIG_NAMESPACE: &str = "gkestack";

/// Environment variable prefix for secret fallbacks
const SECRET_ENV_PREFIX: &str = "GKESTACK_";

/// On-disk stack file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackFile {
    /// Flat key/value settings
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

/// A secret string that never prints its value.
///
/// Serialized as `{"$secret": "<config key>"}` so the engine can bind the
/// value from its own configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret {
    key: String,
    value: String,
}

impl Secret {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Config key the value was read from
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expose(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({}: [redacted])", self.key())
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[secret]")
    }
}

impl Serialize for Secret {
    // Only the key is written; the value never leaves the process.
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("$secret", self.key())?;
        map.end()
    }
}

/// Read-only view over a stack's configuration values
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: BTreeMap<String, serde_yaml::Value>,
}

impl ConfigStore {
    /// Load a stack file from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stack file {}", path.display()))?;
        let file: StackFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse stack file {}", path.display()))?;
        Ok(Self::from_values(file.config))
    }

    pub fn from_values(values: BTreeMap<String, serde_yaml::Value>) -> Self {
        Self { values }
    }

    /// Build a store from `(key, value)` pairs
    #[cfg(test)]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_yaml::Value>,
    {
        Self::from_values(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn raw(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.values
            .get(key)
            .or_else(|| self.values.get(&format!("{}:{}", CONFIG_NAMESPACE, key)))
            .filter(|v| !v.is_null())
    }

    /// Get a string setting. Scalars are coerced to their string form.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.raw(key)? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get an integer setting
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        match value {
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| StackError::invalid_config(key, format!("{} is not an integer", n))),
            serde_yaml::Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| StackError::invalid_config(key, format!("'{}' is not an integer", s))),
            _ => Err(StackError::invalid_config(key, "expected an integer")),
        }
    }

    /// Get a boolean setting
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        match value {
            serde_yaml::Value::Bool(b) => Ok(Some(*b)),
            serde_yaml::Value::String(s) => match s.trim() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                other => Err(StackError::invalid_config(
                    key,
                    format!("'{}' is not a boolean", other),
                )),
            },
            _ => Err(StackError::invalid_config(key, "expected a boolean")),
        }
    }

    /// Get a secret from config, falling back to `GKESTACK_<KEY>` in the environment
    pub fn get_secret(&self, key: &str) -> Option<Secret> {
        self.get(key)
            .or_else(|| std::env::var(secret_env_var(key)).ok())
            .filter(|s| !s.is_empty())
            .map(|value| Secret::new(key, value))
    }

    /// Get a string setting that must be present
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StackError::MissingConfiguration(key.to_string()))
    }

    /// Get a list of strings
    pub fn get_list(&self, key: &str) -> Result<Option<Vec<String>>> {
        let Some(value) = self.raw(key) else {
            return Ok(None);
        };
        match value {
            serde_yaml::Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| StackError::invalid_config(key, "expected a list of strings"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            serde_yaml::Value::String(s) => Ok(Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            _ => Err(StackError::invalid_config(key, "expected a list of strings")),
        }
    }
}

fn secret_env_var(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{}{}", SECRET_ENV_PREFIX, normalized)
}
