/// Engine-reported resource state
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Outcome of one resource in a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Created,
    Failed,
}

/// State of one resource after a provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub status: ResourceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
}

impl ResourceState {
    /// Output field rendered as a string; `null` counts as absent
    pub fn output(&self, field: &str) -> Option<String> {
        match self.outputs.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Whole-stack state as written by the provisioning engine (JSON or YAML)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl EngineState {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine state {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse engine state {}", path.display()))
    }

    /// Parse JSON or YAML state
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // YAML is a superset of JSON, so one parser covers both.
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_state() {
        let state = EngineState::parse(
            r#"{"resources": {"instance": {"status": "created", "outputs": {"nat_ip": "34.1.2.3", "port": 22}}}}"#,
        )
        .unwrap();
        let instance = &state.resources["instance"];
        assert_eq!(instance.status, ResourceStatus::Created);
        assert_eq!(instance.output("nat_ip").as_deref(), Some("34.1.2.3"));
        assert_eq!(instance.output("port").as_deref(), Some("22"));
        assert_eq!(instance.output("missing"), None);
    }

    #[test]
    fn test_null_output_is_absent() {
        let state = EngineState::parse(
            "resources:\n  canary-service:\n    status: created\n    outputs:\n      ip: null\n",
        )
        .unwrap();
        assert_eq!(state.resources["canary-service"].output("ip"), None);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(EngineState::parse("resources:\n  a:\n    status: pending\n").is_err());
    }
}
