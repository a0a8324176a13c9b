/// Kubeconfig synthesis for GKE clusters
///
/// The document authenticates through the `gke-gcloud-auth-plugin` exec
/// plugin, so it carries no credentials of its own.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::output::Output;

pub const EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";
pub const EXEC_COMMAND: &str = "gke-gcloud-auth-plugin";
pub const INSTALL_HINT: &str = "Install gke-gcloud-auth-plugin for use with kubectl by following https://cloud.google.com/blog/products/containers-kubernetes/kubectl-auth-changes-in-gke";

/// Kubeconfig document. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
    pub kind: String,
    pub preferences: BTreeMap<String, String>,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCluster {
    pub cluster: ClusterEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContext {
    pub context: ContextEntry,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub exec: ExecConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    pub api_version: String,
    pub command: String,
    pub install_hint: String,
    pub provide_cluster_info: bool,
}

impl Kubeconfig {
    pub fn parse(document: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(document)?)
    }
}

/// Cluster, context and user name: `{project}_{location}_{cluster}`
pub fn context_name(project: &str, location: &str, cluster_name: &str) -> String {
    format!("{}_{}_{}", project, location, cluster_name)
}

fn require<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| StackError::unresolved(format!("kubeconfig requires the cluster {}", what)))
}

/// Build the kubeconfig document for one cluster.
///
/// Pure and deterministic. Values are emitted through the YAML serializer, so
/// names and endpoints containing YAML syntax are quoted as needed.
pub fn synthesize(
    name: Option<&str>,
    endpoint: Option<&str>,
    ca_cert_base64: Option<&str>,
    project: &str,
    location: &str,
) -> Result<String> {
    let name = require(name, "name")?;
    let endpoint = require(endpoint, "endpoint")?;
    let ca = require(ca_cert_base64, "CA certificate")?;

    let context = context_name(project, location, name);
    let server = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };

    let document = Kubeconfig {
        api_version: "v1".to_string(),
        clusters: vec![NamedCluster {
            cluster: ClusterEntry {
                certificate_authority_data: ca.to_string(),
                server,
            },
            name: context.clone(),
        }],
        contexts: vec![NamedContext {
            context: ContextEntry {
                cluster: context.clone(),
                user: context.clone(),
            },
            name: context.clone(),
        }],
        current_context: context.clone(),
        kind: "Config".to_string(),
        preferences: BTreeMap::new(),
        users: vec![NamedUser {
            name: context,
            user: UserEntry {
                exec: ExecConfig {
                    api_version: EXEC_API_VERSION.to_string(),
                    command: EXEC_COMMAND.to_string(),
                    install_hint: INSTALL_HINT.to_string(),
                    provide_cluster_info: true,
                },
            },
        }],
    };

    serde_yaml::to_string(&document)
        .map_err(|e| StackError::invalid_config("kubeconfig", e.to_string()))
}

/// Synthesize once the cluster's name, endpoint and CA bundle are known
pub fn synthesize_deferred(
    name: &Output<String>,
    endpoint: &Output<String>,
    ca_cert_base64: &Output<String>,
    project: &str,
    location: &str,
) -> Output<String> {
    let project = project.to_string();
    let location = location.to_string();
    Output::all(vec![name.clone(), endpoint.clone(), ca_cert_base64.clone()]).and_then(
        move |parts| match parts.as_slice() {
            [name, endpoint, ca] => {
                synthesize(Some(name), Some(endpoint), Some(ca), &project, &location)
            }
            _ => Err(StackError::unresolved("kubeconfig requires three cluster values")),
        },
    )
}
