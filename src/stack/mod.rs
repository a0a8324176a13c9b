/// Stack assembly: one parameterized declaration of the whole GCP stack
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::StackSettings;
use crate::error::Result;
use crate::gcp::cluster::{cluster_spec, declare_node_pool};
use crate::gcp::instance::declare_instance;
use crate::gcp::network::declare_network;
use crate::gcp::{ensure_cluster, ClusterLookup};
use crate::graph::{Declaration, EngineState, ResourceGraph};
use crate::k8s::canary::declare_canary;
use crate::k8s::helm::declare_release;
use crate::k8s::{declare_namespace, declare_provider};
use crate::kubeconfig::synthesize_deferred;
use crate::output::{Output, OutputSet};

/// A fully declared stack and its exports
#[derive(Debug)]
pub struct Stack {
    pub settings: StackSettings,
    pub graph: ResourceGraph,
    pub outputs: OutputSet,
}

/// Resources that can be created together, after every earlier wave
#[derive(Debug, Clone, Serialize)]
pub struct Wave {
    pub wave: usize,
    pub resources: Vec<Declaration>,
}

/// Plan document handed to the provisioning engine
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub generated_at: DateTime<Utc>,
    pub environment: String,
    pub project: String,
    pub resource_count: usize,
    pub waves: Vec<Wave>,
    pub outputs: OutputSet,
}

/// Declare every enabled part of the stack.
///
/// The cluster is looked up first and reused when it already exists; in that
/// case no cluster or node pool is declared.
pub async fn build(settings: StackSettings, lookup: &dyn ClusterLookup) -> Result<Stack> {
    info!(
        "Building stack for environment {} in project {}",
        settings.environment, settings.project
    );

    let mut graph = ResourceGraph::new();
    let mut exports = OutputSet::builder();

    exports.export("environment", Output::known(settings.environment.clone()))?;

    let network = declare_network(&mut graph, &settings)?;
    debug!(
        "Network {} guarded by {}",
        network.network.name(),
        network.firewall.name()
    );
    if let Some(metadata) = &network.ssh_metadata {
        debug!("SSH keys for {} set through {}", settings.ssh_user, metadata.name());
    }
    exports.export("protected_network", network.network.output("name")?)?;
    exports.export("network_id", network.network.output("id")?)?;

    if settings.enable_instance {
        let instance = declare_instance(&mut graph, &settings, &network.network)?;
        exports.export("instance_external_ip", instance.output("nat_ip")?)?;
    }

    if settings.enable_cluster {
        let target = settings
            .existing_cluster_name
            .clone()
            .unwrap_or_else(|| settings.cluster_name.clone());
        let cluster = ensure_cluster(&mut graph, lookup, cluster_spec(&settings, &target)?).await?;

        let node_pool = if cluster.is_reused() {
            exports.export("existing_cluster_name", cluster.name.clone())?;
            None
        } else {
            let pool = declare_node_pool(&mut graph, &settings, &cluster, &target)?;
            debug!(
                "Node pool {} runs as {}",
                pool.node_pool.name(),
                pool.service_account.name()
            );
            Some(pool)
        };

        exports.export("cluster_name", cluster.name.clone())?;
        exports.export("endpoint", cluster.endpoint.clone())?;
        exports.export("cluster_endpoint", cluster.endpoint.clone())?;
        exports.export("ca_certificate", cluster.ca_certificate.clone())?;
        exports.export("cluster_ca_certificate", cluster.ca_certificate.clone())?;

        let kubeconfig = synthesize_deferred(
            &cluster.name,
            &cluster.endpoint,
            &cluster.ca_certificate,
            &settings.project,
            settings.location(),
        );
        exports.export("kubeconfig", kubeconfig.clone())?;

        let provider = declare_provider(
            &mut graph,
            &cluster,
            &kubeconfig,
            node_pool.as_ref().map(|p| &p.node_pool),
        )?;
        let (namespace, _) = declare_namespace(&mut graph, &provider, &settings.namespace_name)?;
        exports.export("namespace", namespace.clone())?;

        if settings.enable_helm_release {
            declare_release(&mut graph, &settings, &provider, &namespace)?;
        }

        if settings.enable_canary {
            let canary = declare_canary(&mut graph, &settings, &provider, &namespace)?;
            debug!(
                "Canary {} exposed by {}",
                canary.deployment.name(),
                canary.service.name()
            );
            exports.export("ingress_ip", canary.ingress_ip()?)?;
        }
    } else if settings.enable_helm_release || settings.enable_canary {
        warn!("Cluster disabled: skipping the Helm release and canary workload");
    }

    let outputs = exports.build();
    info!(
        "Declared {} resources and {} outputs",
        graph.len(),
        outputs.len()
    );

    Ok(Stack {
        settings,
        graph,
        outputs,
    })
}

impl Stack {
    /// Dependency-ordered plan of the declared resources
    pub fn plan(&self) -> Plan {
        let waves = self
            .graph
            .waves()
            .into_iter()
            .enumerate()
            .map(|(wave, decls)| Wave {
                wave,
                resources: decls.into_iter().cloned().collect(),
            })
            .collect();

        Plan {
            generated_at: Utc::now(),
            environment: self.settings.environment.clone(),
            project: self.settings.project.clone(),
            resource_count: self.graph.len(),
            waves,
            outputs: self.outputs.clone(),
        }
    }

    /// Resolve every export against the engine's reported state
    pub async fn resolve(&mut self, state: &EngineState) -> Result<BTreeMap<String, String>> {
        self.graph.resolve(state);
        self.outputs.resolve_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::error::StackError;
    use crate::gcp::models::{ExistingCluster, MasterAuth};
    use crate::gcp::{Lookup, OfflineLookup};
    use crate::kubeconfig::Kubeconfig;
    use async_trait::async_trait;

    struct ExistingLookup;

    #[async_trait]
    impl ClusterLookup for ExistingLookup {
        async fn find_cluster(
            &self,
            _project: &str,
            location: &str,
            name: &str,
        ) -> Result<Lookup<ExistingCluster>> {
            Ok(Lookup::Found(ExistingCluster {
                name: name.to_string(),
                endpoint: "35.0.0.9".to_string(),
                location: location.to_string(),
                status: "RUNNING".to_string(),
                master_auth: MasterAuth {
                    cluster_ca_certificate: "RVhJU1RJTkcK".to_string(),
                },
            }))
        }
    }

    fn settings(extra: &[(&str, serde_yaml::Value)]) -> StackSettings {
        let mut pairs: Vec<(String, serde_yaml::Value)> = vec![
            ("myEnvironment".to_string(), "dev".into()),
            ("project".to_string(), "premium-botany-414502".into()),
        ];
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        StackSettings::from_store(&ConfigStore::from_pairs(pairs)).unwrap()
    }

    const STATE: &str = r#"
resources:
  protected-network:
    status: created
    outputs:
      id: projects/premium-botany-414502/global/networks/protected-network
      name: protected-network
  instance:
    status: created
    outputs:
      nat_ip: 34.86.10.20
  dev-cluster:
    status: created
    outputs:
      name: dev-cluster
      endpoint: 34.86.1.2
      master_auth.cluster_ca_certificate: Q0EtREFUQQo=
  canary-service:
    status: created
    outputs:
      status.load_balancer.ingress[0].ip: 34.86.99.1
"#;

    #[tokio::test]
    async fn test_dev_stack_end_to_end() {
        let s = settings(&[("node_count", 3.into())]);
        let mut stack = build(s, &OfflineLookup).await.unwrap();

        assert_eq!(stack.graph.count_kind("gcp:container:Cluster"), 1);
        let pool = stack.graph.get("dev-cluster-pool").unwrap();
        assert_eq!(pool.args["node_count"], 3);
        assert_eq!(pool.args["node_config"]["machine_type"], "e2-medium");
        assert!(stack.outputs.get("existing_cluster_name").is_none());

        let state = EngineState::parse(STATE).unwrap();
        let values = stack.resolve(&state).await.unwrap();

        assert_eq!(values["environment"], "dev");
        assert_eq!(values["instance_external_ip"], "34.86.10.20");
        assert_eq!(values["protected_network"], "protected-network");
        assert_eq!(values["endpoint"], "34.86.1.2");
        assert_eq!(values["endpoint"], values["cluster_endpoint"]);
        assert_eq!(values["ca_certificate"], values["cluster_ca_certificate"]);
        assert_eq!(values["namespace"], "default");
        assert_eq!(values["ingress_ip"], "34.86.99.1");

        let kubeconfig = Kubeconfig::parse(&values["kubeconfig"]).unwrap();
        assert_eq!(
            kubeconfig.current_context,
            "premium-botany-414502_us-east4-c_dev-cluster"
        );
        assert_eq!(kubeconfig.clusters[0].cluster.server, "https://34.86.1.2");
        assert_eq!(
            kubeconfig.clusters[0].cluster.certificate_authority_data,
            "Q0EtREFUQQo="
        );
    }

    #[tokio::test]
    async fn test_existing_cluster_is_reused() {
        let s = settings(&[("existing_cluster_name", "shared-cluster".into())]);
        let mut stack = build(s, &ExistingLookup).await.unwrap();

        assert_eq!(stack.graph.count_kind("gcp:container:Cluster"), 0);
        assert_eq!(stack.graph.count_kind("gcp:container:NodePool"), 0);
        assert!(stack.graph.get("k8s-provider").unwrap().depends_on.is_empty());

        let values = stack.resolve(&EngineState::parse(STATE).unwrap()).await.unwrap();
        assert_eq!(values["existing_cluster_name"], "shared-cluster");
        assert_eq!(values["cluster_endpoint"], "35.0.0.9");
        assert!(values["kubeconfig"].contains("premium-botany-414502_us-east4-c_shared-cluster"));
    }

    #[tokio::test]
    async fn test_toggles_remove_resources_and_exports() {
        let s = settings(&[
            ("enable_instance", false.into()),
            ("enable_canary", false.into()),
        ]);
        let stack = build(s, &OfflineLookup).await.unwrap();

        assert!(stack.graph.get("instance").is_none());
        assert!(stack.graph.get("canary-service").is_none());
        assert!(stack.graph.get("ingress-nginx-release").is_some());
        assert!(stack.outputs.get("instance_external_ip").is_none());
        assert!(stack.outputs.get("ingress_ip").is_none());
    }

    #[tokio::test]
    async fn test_cluster_disabled_skips_kubernetes_side() {
        let s = settings(&[("enable_cluster", false.into())]);
        let stack = build(s, &OfflineLookup).await.unwrap();

        assert_eq!(stack.graph.count_kind("gcp:container:Cluster"), 0);
        assert!(stack.graph.get("k8s-provider").is_none());
        assert!(stack.outputs.get("kubeconfig").is_none());
    }

    #[tokio::test]
    async fn test_failed_cluster_surfaces_in_outputs() {
        let s = settings(&[]);
        let mut stack = build(s, &OfflineLookup).await.unwrap();
        let state = EngineState::parse(
            "resources:\n  dev-cluster:\n    status: failed\n    message: quota exceeded\n",
        )
        .unwrap();

        let err = stack.resolve(&state).await.unwrap_err();
        assert_eq!(err, StackError::remote("dev-cluster", "quota exceeded"));
    }

    #[tokio::test]
    async fn test_plan_references_admin_password_by_key() {
        let s = settings(&[("clusterAdminPwd", "a-real-password-123456".into())]);
        let stack = build(s, &OfflineLookup).await.unwrap();

        let cluster = stack.graph.get("dev-cluster").unwrap();
        assert_eq!(
            cluster.args["master_auth"]["password"],
            serde_json::json!({"$secret": "clusterAdminPwd"})
        );

        let rendered = serde_yaml::to_string(&stack.plan()).unwrap();
        assert!(rendered.contains("clusterAdminPwd"));
        assert!(!rendered.contains("a-real-password-123456"));
    }

    #[tokio::test]
    async fn test_plan_waves_respect_dependencies() {
        let stack = build(settings(&[]), &OfflineLookup).await.unwrap();
        let plan = stack.plan();

        assert_eq!(plan.resource_count, stack.graph.len());
        let position: BTreeMap<&str, usize> = plan
            .waves
            .iter()
            .flat_map(|w| w.resources.iter().map(move |d| (d.name.as_str(), w.wave)))
            .collect();

        for wave in &plan.waves {
            for decl in &wave.resources {
                for dep in &decl.depends_on {
                    assert!(position[dep.as_str()] < wave.wave, "{} before {}", dep, decl.name);
                }
            }
        }
        assert_eq!(position["protected-network"], 0);
    }
}
