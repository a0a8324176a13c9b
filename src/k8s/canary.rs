/// Canary workload: a minimal deployment behind a load balancer
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use super::ObjectMeta;
use crate::config::StackSettings;
use crate::error::{Result, StackError};
use crate::graph::{Resource, ResourceGraph, ResourceHandle, ResourceOptions};
use crate::output::Output;

pub const CANARY_NAME: &str = "canary";
pub const CANARY_PORT: u16 = 80;

/// Field holding the load balancer address once the service is ready
pub const INGRESS_IP_FIELD: &str = "status.load_balancer.ingress[0].ip";

#[derive(Debug, Clone, Serialize)]
pub struct ContainerPort {
    pub container_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub ports: Vec<ContainerPort>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodSpec {
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PodTemplate {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentBody {
    pub replicas: i64,
    pub selector: LabelSelector,
    pub template: PodTemplate,
}

/// Deployment
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSpec {
    pub metadata: ObjectMeta,
    pub spec: DeploymentBody,
}

impl Resource for DeploymentSpec {
    const KIND: &'static str = "kubernetes:apps/v1:Deployment";
    const OUTPUTS: &'static [&'static str] = &["metadata.name"];
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicePort {
    pub port: u16,
    pub target_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceBody {
    #[serde(rename = "type")]
    pub service_type: String,
    pub ports: Vec<ServicePort>,
    pub selector: BTreeMap<String, String>,
}

/// Service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSpec {
    pub metadata: ObjectMeta,
    pub spec: ServiceBody,
}

impl Resource for ServiceSpec {
    const KIND: &'static str = "kubernetes:core/v1:Service";
    const OUTPUTS: &'static [&'static str] = &["metadata.name", INGRESS_IP_FIELD];
}

/// Declared canary resources
#[derive(Debug, Clone)]
pub struct CanaryResources {
    pub deployment: ResourceHandle,
    pub service: ResourceHandle,
}

impl CanaryResources {
    /// External address of the canary service
    pub fn ingress_ip(&self) -> Result<Output<String>> {
        self.service.output(INGRESS_IP_FIELD)
    }
}

/// Declare the canary deployment and its load balancer service
pub fn declare_canary(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    provider: &ResourceHandle,
    namespace: &Output<String>,
) -> Result<CanaryResources> {
    if settings.canary_replicas < 1 {
        return Err(StackError::invalid_config(
            "canary_replicas",
            "the canary needs at least one replica",
        ));
    }

    info!(
        "Declaring canary workload ({} x {})",
        settings.canary_replicas, settings.canary_image
    );

    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), CANARY_NAME.to_string());

    let deployment_spec = DeploymentSpec {
        metadata: ObjectMeta::named(CANARY_NAME)
            .in_namespace(namespace)
            .with_labels(&labels),
        spec: DeploymentBody {
            replicas: settings.canary_replicas,
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            template: PodTemplate {
                metadata: ObjectMeta::named(CANARY_NAME).with_labels(&labels),
                spec: PodSpec {
                    containers: vec![Container {
                        name: CANARY_NAME.to_string(),
                        image: settings.canary_image.clone(),
                        ports: vec![ContainerPort {
                            container_port: CANARY_PORT,
                        }],
                    }],
                },
            },
        },
    };
    let deployment = graph.declare(
        &format!("{}-deployment", CANARY_NAME),
        &deployment_spec,
        ResourceOptions::new().provider(provider),
    )?;

    let service_spec = ServiceSpec {
        metadata: ObjectMeta::named(CANARY_NAME)
            .in_namespace(namespace)
            .with_labels(&labels),
        spec: ServiceBody {
            service_type: "LoadBalancer".to_string(),
            ports: vec![ServicePort {
                port: CANARY_PORT,
                target_port: CANARY_PORT,
            }],
            selector: labels,
        },
    };
    let service = graph.declare(
        &format!("{}-service", CANARY_NAME),
        &service_spec,
        ResourceOptions::new().provider(provider).depends_on(&deployment),
    )?;

    Ok(CanaryResources {
        deployment,
        service,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::k8s::KubernetesProviderSpec;

    fn setup() -> (ResourceGraph, ResourceHandle, StackSettings) {
        let settings = StackSettings::from_store(&ConfigStore::from_pairs([
            ("myEnvironment", "dev"),
            ("project", "p"),
        ]))
        .unwrap();
        let mut graph = ResourceGraph::new();
        let provider = graph
            .declare(
                "k8s-provider",
                &KubernetesProviderSpec {
                    kubeconfig: Output::known("doc".to_string()),
                },
                ResourceOptions::new(),
            )
            .unwrap();
        (graph, provider, settings)
    }

    #[test]
    fn test_selector_matches_pod_labels() {
        let (mut graph, provider, settings) = setup();
        declare_canary(&mut graph, &settings, &provider, &Output::known("default".to_string()))
            .unwrap();

        let deployment = &graph.get("canary-deployment").unwrap().args;
        let service = &graph.get("canary-service").unwrap().args;
        assert_eq!(
            deployment["spec"]["selector"]["match_labels"],
            deployment["spec"]["template"]["metadata"]["labels"]
        );
        assert_eq!(
            service["spec"]["selector"],
            deployment["spec"]["template"]["metadata"]["labels"]
        );
        assert_eq!(service["spec"]["type"], "LoadBalancer");
        assert_eq!(deployment["spec"]["template"]["spec"]["containers"][0]["image"], "nginx:1.25");
    }

    #[test]
    fn test_service_waits_for_deployment() {
        let (mut graph, provider, settings) = setup();
        let canary = declare_canary(
            &mut graph,
            &settings,
            &provider,
            &Output::known("default".to_string()),
        )
        .unwrap();

        assert_eq!(
            graph.get("canary-service").unwrap().depends_on,
            vec!["canary-deployment", "k8s-provider"]
        );
        assert!(canary.ingress_ip().is_ok());
    }

    #[test]
    fn test_zero_replicas_rejected() {
        let (mut graph, provider, mut settings) = setup();
        settings.canary_replicas = 0;
        let err = declare_canary(&mut graph, &settings, &provider, &Output::known("default".to_string()))
            .unwrap_err();
        assert!(matches!(err, StackError::InvalidConfiguration { .. }));
    }
}
