/// Resolved stack settings with call-site defaults applied
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::{ConfigStore, Secret};
use crate::error::{Result, StackError};
use crate::gcp::cidr::validate_cidr;

pub const DEFAULT_NODE_COUNT: i64 = 2;
pub const DEFAULT_NODE_MACHINE_TYPE: &str = "e2-medium";
pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_REGION: &str = "us-east4";
pub const DEFAULT_ZONE: &str = "us-east4-c";
pub const DEFAULT_BOOT_IMAGE: &str = "ubuntu-os-cloud/ubuntu-minimal-2204-lts";
pub const DEFAULT_CHART_NAME: &str = "ingress-nginx";
pub const DEFAULT_CHART_VERSION: &str = "4.10.0";
pub const DEFAULT_HELM_REPO_URL: &str = "https://kubernetes.github.io/ingress-nginx";
pub const DEFAULT_CANARY_IMAGE: &str = "nginx:1.25";
pub const DEFAULT_ALLOWLIST_KEY: &str = "ny_office";
/// GKE rejects basic-auth passwords shorter than this
pub const MIN_ADMIN_PASSWORD_LEN: usize = 16;
pub const DEFAULT_SSH_SOURCE_RANGES: [&str; 2] = ["71.247.198.14/32", "35.235.240.0/20"];

/// Everything the stack builder needs, read once from a [`ConfigStore`]
#[derive(Debug, Clone, Serialize)]
pub struct StackSettings {
    pub environment: String,
    pub project: String,
    pub region: String,
    pub zone: String,

    pub network_name: String,
    pub ssh_source_ranges: Vec<String>,
    pub ssh_user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,

    pub instance_name: String,
    pub instance_machine_type: String,
    pub boot_image: String,

    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_cluster_name: Option<String>,
    pub node_count: i64,
    pub node_machine_type: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_admin_password: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_version: Option<String>,
    /// Master authorized networks, display name to CIDR
    pub authorized_networks: BTreeMap<String, String>,

    pub namespace_name: String,
    pub chart_name: String,
    pub chart_version: String,
    pub helm_repo_url: String,
    pub canary_image: String,
    pub canary_replicas: i64,

    pub enable_instance: bool,
    pub enable_cluster: bool,
    pub enable_helm_release: bool,
    pub enable_canary: bool,

    /// Ask the engine to refuse deleting the network and instance
    pub protect_resources: bool,
}

impl StackSettings {
    /// Resolve settings, applying defaults and local validation
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        let environment = store.require("myEnvironment")?;
        let project = store.require("project")?;
        let region = store.get("region").unwrap_or_else(|| DEFAULT_REGION.to_string());
        let zone = store.get("zone").unwrap_or_else(|| DEFAULT_ZONE.to_string());

        if !zone.starts_with(&format!("{}-", region)) {
            return Err(StackError::invalid_config(
                "zone",
                format!("zone {} is not in region {}", zone, region),
            ));
        }

        let ssh_source_ranges = store
            .get_list("ssh_source_ranges")?
            .unwrap_or_else(|| DEFAULT_SSH_SOURCE_RANGES.iter().map(|s| s.to_string()).collect());

        // The allowlist entry's key name differs between stacks, so the key
        // itself is configurable.
        let allowlist_key = store
            .get("allowlist_key")
            .unwrap_or_else(|| DEFAULT_ALLOWLIST_KEY.to_string());
        let mut authorized_networks = BTreeMap::new();
        if let Some(cidr) = store.get(&allowlist_key) {
            validate_cidr(&cidr)?;
            authorized_networks.insert(allowlist_key.clone(), cidr);
        }

        let helm_repo_url = store
            .get("k8s_helm_repo_url")
            .unwrap_or_else(|| DEFAULT_HELM_REPO_URL.to_string());
        url::Url::parse(&helm_repo_url).map_err(|e| {
            StackError::invalid_config("k8s_helm_repo_url", format!("{}: {}", helm_repo_url, e))
        })?;

        let cluster_admin_password = store.get_secret("clusterAdminPwd");
        if let Some(password) = &cluster_admin_password {
            if password.expose().chars().count() < MIN_ADMIN_PASSWORD_LEN {
                return Err(StackError::invalid_config(
                    "clusterAdminPwd",
                    format!("must be at least {} characters", MIN_ADMIN_PASSWORD_LEN),
                ));
            }
        }

        let settings = Self {
            network_name: store
                .get("network_name")
                .unwrap_or_else(|| "protected-network".to_string()),
            ssh_source_ranges,
            ssh_user: store.get("ssh_user").unwrap_or_else(|| "john".to_string()),
            ssh_public_key: store.get("ssh_public_key"),

            instance_name: store
                .get("instance_name")
                .unwrap_or_else(|| "instance".to_string()),
            instance_machine_type: store
                .get("instance_machine_type")
                .unwrap_or_else(|| DEFAULT_NODE_MACHINE_TYPE.to_string()),
            boot_image: store
                .get("boot_image")
                .unwrap_or_else(|| DEFAULT_BOOT_IMAGE.to_string()),

            cluster_name: store
                .get("cluster_name")
                .unwrap_or_else(|| format!("{}-cluster", environment)),
            existing_cluster_name: store.get("existing_cluster_name"),
            node_count: store.get_int("node_count")?.unwrap_or(DEFAULT_NODE_COUNT),
            node_machine_type: store
                .get("node_machine_type")
                .unwrap_or_else(|| DEFAULT_NODE_MACHINE_TYPE.to_string()),
            username: store
                .get("username")
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            cluster_admin_password,
            master_version: store.get("master_version"),
            authorized_networks,

            namespace_name: store
                .get("namespace_name")
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            chart_name: store
                .get("chart_name")
                .unwrap_or_else(|| DEFAULT_CHART_NAME.to_string()),
            chart_version: store
                .get("chart_version")
                .unwrap_or_else(|| DEFAULT_CHART_VERSION.to_string()),
            helm_repo_url,
            canary_image: store
                .get("canary_image")
                .unwrap_or_else(|| DEFAULT_CANARY_IMAGE.to_string()),
            canary_replicas: store.get_int("canary_replicas")?.unwrap_or(1),

            enable_instance: store.get_bool("enable_instance")?.unwrap_or(true),
            enable_cluster: store.get_bool("enable_cluster")?.unwrap_or(true),
            enable_helm_release: store.get_bool("enable_helm_release")?.unwrap_or(true),
            enable_canary: store.get_bool("enable_canary")?.unwrap_or(true),
            protect_resources: store.get_bool("protect_resources")?.unwrap_or(false),

            environment,
            project,
            region,
            zone,
        };

        debug!(
            "Resolved settings for environment {} (project {}, {} nodes of {})",
            settings.environment, settings.project, settings.node_count, settings.node_machine_type
        );

        Ok(settings)
    }

    /// Cluster location used for GKE resources
    pub fn location(&self) -> &str {
        &self.zone
    }
}
