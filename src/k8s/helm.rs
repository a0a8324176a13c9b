/// Helm release of the cluster's ingress controller
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::StackSettings;
use crate::error::Result;
use crate::graph::{Resource, ResourceGraph, ResourceHandle, ResourceOptions};
use crate::output::Output;

/// Chart repository options
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryOpts {
    pub repo: String,
}

/// Helm release
#[derive(Debug, Clone, Serialize)]
pub struct HelmReleaseSpec {
    pub name: String,
    pub chart: String,
    pub version: String,
    pub repository_opts: RepositoryOpts,
    pub namespace: Output<String>,
    pub create_namespace: bool,
    pub values: serde_json::Value,
}

impl Resource for HelmReleaseSpec {
    const KIND: &'static str = "kubernetes:helm.sh/v3:Release";
    const OUTPUTS: &'static [&'static str] = &["status"];
}

/// Chart values for the controller
pub fn controller_values(settings: &StackSettings) -> serde_json::Value {
    // Two replicas only when there is more than one node to spread them over
    let replicas = if settings.node_count > 1 { 2 } else { 1 };

    json!({
        "controller": {
            "replicaCount": replicas,
            "service": {
                "type": "LoadBalancer",
                "externalTrafficPolicy": "Local",
            },
            "metrics": { "enabled": true },
            "podLabels": { "environment": settings.environment },
        },
        "defaultBackend": { "enabled": false },
    })
}

/// Declare the controller release in `namespace`
pub fn declare_release(
    graph: &mut ResourceGraph,
    settings: &StackSettings,
    provider: &ResourceHandle,
    namespace: &Output<String>,
) -> Result<ResourceHandle> {
    info!(
        "Declaring Helm release {} {} from {}",
        settings.chart_name, settings.chart_version, settings.helm_repo_url
    );

    let spec = HelmReleaseSpec {
        name: settings.chart_name.clone(),
        chart: settings.chart_name.clone(),
        version: settings.chart_version.clone(),
        repository_opts: RepositoryOpts {
            repo: settings.helm_repo_url.clone(),
        },
        namespace: namespace.clone(),
        create_namespace: false,
        values: controller_values(settings),
    };

    graph.declare(
        &format!("{}-release", settings.chart_name),
        &spec,
        ResourceOptions::new().provider(provider),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::k8s::KubernetesProviderSpec;

    fn settings(node_count: i64) -> StackSettings {
        StackSettings::from_store(&ConfigStore::from_pairs([
            ("myEnvironment", serde_yaml::Value::from("dev")),
            ("project", serde_yaml::Value::from("p")),
            ("node_count", serde_yaml::Value::from(node_count)),
        ]))
        .unwrap()
    }

    #[test]
    fn test_replica_count_follows_node_count() {
        assert_eq!(controller_values(&settings(1))["controller"]["replicaCount"], 1);
        assert_eq!(controller_values(&settings(3))["controller"]["replicaCount"], 2);
    }

    #[test]
    fn test_release_declaration() {
        let s = settings(2);
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

        declare_release(&mut graph, &s, &provider, &Output::known("default".to_string()))
            .unwrap();

        let decl = graph.get("ingress-nginx-release").unwrap();
        assert_eq!(decl.provider.as_deref(), Some("k8s-provider"));
        assert_eq!(decl.args["chart"], "ingress-nginx");
        assert_eq!(decl.args["version"], "4.10.0");
        assert_eq!(
            decl.args["repository_opts"]["repo"],
            "https://kubernetes.github.io/ingress-nginx"
        );
        assert_eq!(decl.args["namespace"], "default");
    }
}
