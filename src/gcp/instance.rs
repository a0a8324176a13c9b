/// Compute instance declaration
use tracing::info;

use super::models::{
    AccessConfig, BootDisk, InstanceServiceAccount, InstanceSpec, NetworkInterface, Scheduling,
};
use crate::config::StackSettings;
use crate::error::Result;
use crate::graph::{ResourceGraph, ResourceHandle, ResourceOptions};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Declare a preemptible instance with one externally reachable interface.
///
/// The zone was already checked against the region when settings were read.
pub fn declare_instance(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    network: &ResourceHandle,
) -> Result<ResourceHandle> {
    info!(
        "Declaring instance {} ({} in {})",
        settings.instance_name, settings.instance_machine_type, settings.zone
    );

    let spec = InstanceSpec {
        machine_type: settings.instance_machine_type.clone(),
        zone: settings.zone.clone(),
        boot_disk: BootDisk {
            image: settings.boot_image.clone(),
        },
        scheduling: Scheduling {
            preemptible: true,
            automatic_restart: false,
        },
        network_interfaces: vec![NetworkInterface {
            network: network.output("id")?,
            access_configs: vec![AccessConfig::default()],
        }],
        service_account: InstanceServiceAccount {
            email: None,
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
        },
    };

    graph.declare(
        &settings.instance_name,
        &spec,
        ResourceOptions::new().protect(settings.protect_resources),
    )
}
