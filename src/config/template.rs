/// Example stack file rendering
use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde_json::json;

const EXAMPLE_TEMPLATE: &str = r#"# gkestack configuration for the "{{environment}}" stack
config:
  # Required
  {{ns}}:myEnvironment: {{environment}}
  {{ns}}:project: {{project}}

  # Location (zone must be inside region)
  {{ns}}:region: {{region}}
  {{ns}}:zone: {{zone}}

  # GKE node pool (defaults: 2 x e2-medium)
  {{ns}}:node_count: {{node_count}}
  {{ns}}:node_machine_type: {{node_machine_type}}
  # {{ns}}:master_version: "1.29"
  # {{ns}}:existing_cluster_name: my-existing-cluster

  # Master authorized network; the key named by allowlist_key holds the CIDR
  {{ns}}:allowlist_key: {{allowlist_key}}
  # {{ns}}:{{allowlist_key}}: 71.247.198.14/32

  # Helm-deployed controller
  {{ns}}:namespace_name: {{namespace}}
  {{ns}}:chart_name: {{chart_name}}
  {{ns}}:chart_version: {{chart_version}}
  {{ns}}:k8s_helm_repo_url: {{helm_repo_url}}

  # Parts of the stack to declare
  {{ns}}:enable_instance: true
  {{ns}}:enable_cluster: true
  {{ns}}:enable_helm_release: true
  {{ns}}:enable_canary: true
  {{ns}}:protect_resources: false

  # Secrets may also be set as GKESTACK_CLUSTERADMINPWD (16 characters or more)
  # {{ns}}:clusterAdminPwd: change-me-to-something-long
"#;

/// Render a commented example stack file
pub fn render_example(environment: &str, project: &str) -> Result<String> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .register_template_string("stack", EXAMPLE_TEMPLATE)
        .context("Failed to register example template")?;

    let data = json!({
        "ns": super::CONFIG_NAMESPACE,
        "environment": environment,
        "project": project,
        "region": super::settings::DEFAULT_REGION,
        "zone": super::settings::DEFAULT_ZONE,
        "node_count": super::settings::DEFAULT_NODE_COUNT,
        "node_machine_type": super::settings::DEFAULT_NODE_MACHINE_TYPE,
        "allowlist_key": super::settings::DEFAULT_ALLOWLIST_KEY,
        "namespace": super::settings::DEFAULT_NAMESPACE,
        "chart_name": super::settings::DEFAULT_CHART_NAME,
        "chart_version": super::settings::DEFAULT_CHART_VERSION,
        "helm_repo_url": super::settings::DEFAULT_HELM_REPO_URL,
    });

    handlebars
        .render("stack", &data)
        .context("Failed to render example stack file")
}
