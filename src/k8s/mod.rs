/// Kubernetes-side declarations submitted through a cluster-scoped provider
pub mod canary;
pub mod helm;
pub mod kubectl;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::gcp::ClusterHandle;
use crate::graph::{Resource, ResourceGraph, ResourceHandle, ResourceOptions};
use crate::output::Output;

/// Provider bound to one cluster through its kubeconfig
#[derive(Debug, Clone, Serialize)]
pub struct KubernetesProviderSpec {
    pub kubeconfig: Output<String>,
}

impl Resource for KubernetesProviderSpec {
    const KIND: &'static str = "pulumi:providers:kubernetes";
    const OUTPUTS: &'static [&'static str] = &["id"];
}

/// Object metadata shared by the Kubernetes specs
#[derive(Debug, Clone, Serialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<Output<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn in_namespace(mut self, namespace: &Output<String>) -> Self {
        self.namespace = Some(namespace.clone());
        self
    }

    pub fn with_labels(mut self, labels: &BTreeMap<String, String>) -> Self {
        self.labels = labels.clone();
        self
    }
}

/// Namespace
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceSpec {
    pub metadata: ObjectMeta,
}

impl Resource for NamespaceSpec {
    const KIND: &'static str = "kubernetes:core/v1:Namespace";
    const OUTPUTS: &'static [&'static str] = &["metadata.name"];
}

/// Declare the provider that targets `cluster`.
///
/// Node pools are explicit dependencies so workloads are not scheduled
/// before the cluster has nodes.
pub fn declare_provider(
    graph: &mut ResourceGraph,
    cluster: &ClusterHandle,
    kubeconfig: &Output<String>,
    node_pool: Option<&ResourceHandle>,
) -> Result<ResourceHandle> {
    let mut options = ResourceOptions::new();
    if let Some(resource) = &cluster.resource {
        options = options.depends_on(resource);
    }
    if let Some(pool) = node_pool {
        options = options.depends_on(pool);
    }

    graph.declare(
        "k8s-provider",
        &KubernetesProviderSpec {
            kubeconfig: kubeconfig.clone(),
        },
        options,
    )
}

/// Declare a namespace, or reference the built-in `default` one.
///
/// Returns the namespace name as a deferred value and the declaration, if any.
pub fn declare_namespace(
    graph: &mut ResourceGraph,
    provider: &ResourceHandle,
    name: &str,
) -> Result<(Output<String>, Option<ResourceHandle>)> {
    if name == "default" {
        return Ok((Output::known(name.to_string()), None));
    }

    info!("Declaring namespace {}", name);
    let namespace = graph.declare(
        &format!("ns-{}", name),
        &NamespaceSpec {
            metadata: ObjectMeta::named(name),
        },
        ResourceOptions::new().provider(provider),
    )?;
    Ok((namespace.output("metadata.name")?, Some(namespace)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> ClusterHandle {
        ClusterHandle {
            name: Output::known("c".to_string()),
            endpoint: Output::known("1.2.3.4".to_string()),
            ca_certificate: Output::known("Q0EK".to_string()),
            resource: None,
        }
    }

    #[test]
    fn test_default_namespace_is_not_declared() {
        let mut graph = ResourceGraph::new();
        let provider =
            declare_provider(&mut graph, &cluster(), &Output::known("doc".to_string()), None)
                .unwrap();
        let (ns, decl) = declare_namespace(&mut graph, &provider, "default").unwrap();

        assert!(decl.is_none());
        assert!(ns.is_known());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_namespace_uses_provider() {
        let mut graph = ResourceGraph::new();
        let provider =
            declare_provider(&mut graph, &cluster(), &Output::known("doc".to_string()), None)
                .unwrap();
        let (ns, decl) = declare_namespace(&mut graph, &provider, "ingress").unwrap();

        assert!(decl.is_some());
        assert!(!ns.is_known());
        let decl = graph.get("ns-ingress").unwrap();
        assert_eq!(decl.provider.as_deref(), Some("k8s-provider"));
        assert_eq!(decl.depends_on, vec!["k8s-provider"]);
        assert_eq!(decl.args["metadata"]["name"], "ingress");
    }
}
