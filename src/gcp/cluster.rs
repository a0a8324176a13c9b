/// GKE cluster, node pool and node service account declarations
use tracing::info;

use super::client::{ClusterLookup, Lookup};
use super::instance::CLOUD_PLATFORM_SCOPE;
use super::models::{
    ClusterSpec, MasterAuthSpec, NodeConfig, NodePoolSpec, ServiceAccountSpec,
};
use crate::config::StackSettings;
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceOptions};
use crate::output::Output;

/// A cluster's identity, whether declared here or reused
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    pub name: Output<String>,
    pub endpoint: Output<String>,
    pub ca_certificate: Output<String>,
    /// Declared resource, `None` when an existing cluster was reused
    pub resource: Option<ResourceHandle>,
}

impl ClusterHandle {
    pub fn is_reused(&self) -> bool {
        self.resource.is_none()
    }
}

/// Build the cluster spec for a stack
pub fn cluster_spec(settings: &StackSettings, name: &str) -> Result<ClusterSpec> {
    Ok(ClusterSpec {
        name: name.to_string(),
        location: settings.location().to_string(),
        project: settings.project.clone(),
        // The default pool is removed right after creation, so keep it tiny.
        initial_node_count: 1,
        remove_default_node_pool: true,
        min_master_version: settings.master_version.clone(),
        master_auth: settings
            .cluster_admin_password
            .clone()
            .map(|password| MasterAuthSpec {
                username: settings.username.clone(),
                password,
            }),
        master_authorized_networks: ClusterSpec::authorized_networks(&settings.authorized_networks)?,
        deletion_protection: false,
    })
}

/// Reuse the named cluster if it exists, otherwise declare it.
///
/// A lookup error is returned as is; it is never taken to mean the cluster
/// is absent.
pub async fn ensure_cluster<L: ClusterLookup + ?Sized>(
    graph: &mut ResourceGraph,
    lookup: &L,
    spec: ClusterSpec,
) -> Result<ClusterHandle> {
    match lookup
        .find_cluster(&spec.project, &spec.location, &spec.name)
        .await?
    {
        Lookup::Found(existing) => {
            info!(
                "Reusing existing cluster {} at {}",
                existing.name, existing.endpoint
            );
            Ok(ClusterHandle {
                name: Output::known(existing.name),
                endpoint: Output::known(existing.endpoint),
                ca_certificate: Output::known(existing.master_auth.cluster_ca_certificate),
                resource: None,
            })
        }
        Lookup::NotFound => {
            info!("Declaring new cluster {} in {}", spec.name, spec.location);
            let resource = graph.declare(&spec.name, &spec, ResourceOptions::new())?;
            Ok(ClusterHandle {
                name: resource.output("name")?,
                endpoint: resource.output("endpoint")?,
                ca_certificate: resource.output("master_auth.cluster_ca_certificate")?,
                resource: Some(resource),
            })
        }
    }
}

/// Node pool resources
#[derive(Debug, Clone)]
pub struct NodePoolResources {
    pub service_account: ResourceHandle,
    pub node_pool: ResourceHandle,
}

/// Declare a dedicated node service account and a preemptible node pool
pub fn declare_node_pool(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    cluster: &ClusterHandle,
    cluster_name: &str,
) -> Result<NodePoolResources> {
    info!(
        "Declaring node pool for {}: {} x {}",
        cluster_name, settings.node_count, settings.node_machine_type
    );

    let account_name = format!("{}-nodes", cluster_name);
    let service_account = graph.declare(
        &account_name,
        &ServiceAccountSpec {
            account_id: service_account_id(&account_name),
            display_name: format!("Node service account for {}", cluster_name),
            project: settings.project.clone(),
        },
        ResourceOptions::new(),
    )?;

    let spec = NodePoolSpec {
        cluster: cluster.name.clone(),
        location: settings.location().to_string(),
        node_count: settings.node_count,
        node_config: NodeConfig {
            machine_type: settings.node_machine_type.clone(),
            preemptible: true,
            service_account: service_account.output("email")?,
            oauth_scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
        },
    };
    let node_pool = graph.declare(
        &format!("{}-pool", cluster_name),
        &spec,
        ResourceOptions::new(),
    )?;

    Ok(NodePoolResources {
        service_account,
        node_pool,
    })
}

/// IAM account ids are 6-30 characters of `[a-z0-9-]`, starting with a letter
fn service_account_id(name: &str) -> String {
    let mut id: String = name
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        id.insert_str(0, "sa-");
    }
    id.truncate(30);
    let trimmed = id.trim_end_matches('-').to_string();
    if trimmed.len() < 6 {
        format!("{:0<6}", trimmed)
    } else {
        trimmed
    }
}
