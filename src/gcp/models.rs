/// GCP resource argument models
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Secret;
use crate::error::{Result, StackError};
use crate::graph::Resource;
use crate::output::Output;

use super::cidr::validate_all;

/// VPC network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSpec {
    pub name: String,
    pub auto_create_subnetworks: bool,
    pub project: String,
    pub deletion_protection: bool,
}

impl Resource for NetworkSpec {
    const KIND: &'static str = "gcp:compute:Network";
    const OUTPUTS: &'static [&'static str] = &["id", "name", "self_link"];
}

/// One allow rule of a firewall
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowRule {
    pub protocol: String,
    pub ports: Vec<String>,
}

impl AllowRule {
    pub fn tcp(port: &str) -> Self {
        Self {
            protocol: "tcp".to_string(),
            ports: vec![port.to_string()],
        }
    }
}

/// Ingress firewall attached to a network
#[derive(Debug, Clone, Serialize)]
pub struct FirewallSpec {
    pub network: Output<String>,
    pub allows: Vec<AllowRule>,
    pub source_ranges: Vec<String>,
}

impl FirewallSpec {
    /// Build a firewall, validating its rules and source ranges
    pub fn new(
        network: Output<String>,
        allows: Vec<AllowRule>,
        source_ranges: Vec<String>,
    ) -> Result<Self> {
        if allows.is_empty() {
            return Err(StackError::invalid_config(
                "firewall.allows",
                "at least one allow rule is required",
            ));
        }
        if source_ranges.is_empty() {
            return Err(StackError::invalid_config(
                "firewall.source_ranges",
                "at least one source range is required",
            ));
        }
        validate_all(&source_ranges)?;

        Ok(Self {
            network,
            allows,
            source_ranges,
        })
    }
}

impl Resource for FirewallSpec {
    const KIND: &'static str = "gcp:compute:Firewall";
    const OUTPUTS: &'static [&'static str] = &["id"];
}

/// Compute instance boot disk
#[derive(Debug, Clone, Serialize)]
pub struct BootDisk {
    pub image: String,
}

/// Compute instance scheduling options
#[derive(Debug, Clone, Serialize)]
pub struct Scheduling {
    pub preemptible: bool,
    pub automatic_restart: bool,
}

/// External NAT access for a network interface
#[derive(Debug, Clone, Default, Serialize)]
pub struct AccessConfig {}

/// Network interface of a compute instance
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    pub network: Output<String>,
    pub access_configs: Vec<AccessConfig>,
}

/// Service account attached to a compute instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceServiceAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Output<String>>,
    pub scopes: Vec<String>,
}

/// Compute instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSpec {
    pub machine_type: String,
    pub zone: String,
    pub boot_disk: BootDisk,
    pub scheduling: Scheduling,
    pub network_interfaces: Vec<NetworkInterface>,
    pub service_account: InstanceServiceAccount,
}

impl Resource for InstanceSpec {
    const KIND: &'static str = "gcp:compute:Instance";
    const OUTPUTS: &'static [&'static str] = &["id", "nat_ip"];
}

/// Project-wide metadata entries
#[derive(Debug, Clone, Serialize)]
pub struct ProjectMetadataSpec {
    pub project: String,
    pub metadata: BTreeMap<String, String>,
}

impl Resource for ProjectMetadataSpec {
    const KIND: &'static str = "gcp:compute:ProjectMetadata";
    const OUTPUTS: &'static [&'static str] = &["id"];
}

/// IAM service account
#[derive(Debug, Clone, Serialize)]
pub struct ServiceAccountSpec {
    pub account_id: String,
    pub display_name: String,
    pub project: String,
}

impl Resource for ServiceAccountSpec {
    const KIND: &'static str = "gcp:serviceaccount:Account";
    const OUTPUTS: &'static [&'static str] = &["email", "id"];
}

/// Basic-auth credentials for the cluster master
#[derive(Debug, Clone, Serialize)]
pub struct MasterAuthSpec {
    pub username: String,
    pub password: Secret,
}

/// One master authorized network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CidrBlock {
    pub display_name: String,
    pub cidr_block: String,
}

/// GKE cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSpec {
    pub name: String,
    pub location: String,
    pub project: String,
    pub initial_node_count: i64,
    pub remove_default_node_pool: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_master_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_auth: Option<MasterAuthSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub master_authorized_networks: Vec<CidrBlock>,
    pub deletion_protection: bool,
}

impl ClusterSpec {
    /// Authorized networks from a name to CIDR mapping
    pub fn authorized_networks(networks: &BTreeMap<String, String>) -> Result<Vec<CidrBlock>> {
        validate_all(&networks.values().collect::<Vec<_>>())?;
        Ok(networks
            .iter()
            .map(|(name, cidr)| CidrBlock {
                display_name: name.clone(),
                cidr_block: cidr.clone(),
            })
            .collect())
    }
}

impl Resource for ClusterSpec {
    const KIND: &'static str = "gcp:container:Cluster";
    const OUTPUTS: &'static [&'static str] =
        &["name", "endpoint", "master_auth.cluster_ca_certificate"];
}

/// Node configuration of a node pool
#[derive(Debug, Clone, Serialize)]
pub struct NodeConfig {
    pub machine_type: String,
    pub preemptible: bool,
    pub service_account: Output<String>,
    pub oauth_scopes: Vec<String>,
}

/// GKE node pool
#[derive(Debug, Clone, Serialize)]
pub struct NodePoolSpec {
    pub cluster: Output<String>,
    pub location: String,
    pub node_count: i64,
    pub node_config: NodeConfig,
}

impl Resource for NodePoolSpec {
    const KIND: &'static str = "gcp:container:NodePool";
    const OUTPUTS: &'static [&'static str] = &["id", "name"];
}

/// Cluster as returned by the GKE API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingCluster {
    pub name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub master_auth: MasterAuth,
}

/// Master auth block of an existing cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterAuth {
    #[serde(default)]
    pub cluster_ca_certificate: String,
}

/// Error response from Google APIs
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

/// Google API error details
#[derive(Debug, Deserialize)]
pub struct ApiError {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub status: String,
}
