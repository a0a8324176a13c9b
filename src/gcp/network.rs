/// Network, firewall and project metadata declarations
use std::collections::BTreeMap;

use tracing::info;

use super::models::{AllowRule, FirewallSpec, NetworkSpec, ProjectMetadataSpec};
use crate::config::StackSettings;
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceOptions};

/// Handles for the declared network resources
#[derive(Debug, Clone)]
pub struct NetworkResources {
    pub network: ResourceHandle,
    pub firewall: ResourceHandle,
    pub ssh_metadata: Option<ResourceHandle>,
}

/// Declare the VPC network, its SSH firewall and project SSH metadata
pub fn declare_network(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
) -> Result<NetworkResources> {
    info!(
        "Declaring network {} with SSH allowed from {:?}",
        settings.network_name, settings.ssh_source_ranges
    );

    let network = graph.declare(
        &settings.network_name,
        &NetworkSpec {
            name: settings.network_name.clone(),
            auto_create_subnetworks: true,
            project: settings.project.clone(),
            deletion_protection: false,
        },
        ResourceOptions::new().protect(settings.protect_resources),
    )?;

    let firewall_spec = FirewallSpec::new(
        network.output("id")?,
        vec![AllowRule::tcp("22")],
        settings.ssh_source_ranges.clone(),
    )?;
    let firewall = graph.declare("firewall", &firewall_spec, ResourceOptions::new())?;

    // Project-level keys propagate to every instance in the project.
    let ssh_metadata = match &settings.ssh_public_key {
        Some(key) => {
            let mut metadata = BTreeMap::new();
            metadata.insert(
                "ssh-keys".to_string(),
                format!("{}:{}", settings.ssh_user, key.trim()),
            );
            Some(graph.declare(
                "ssh-keys",
                &ProjectMetadataSpec {
                    project: settings.project.clone(),
                    metadata,
                },
                ResourceOptions::new(),
            )?)
        }
        None => None,
    };

    Ok(NetworkResources {
        network,
        firewall,
        ssh_metadata,
    })
}
