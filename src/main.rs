/// gkestack - GKE stacks with a canary workload
///
/// Declares a GCP network, instance and GKE cluster together with the
/// Kubernetes workloads that run on it, and exports the resulting outputs
/// once a provisioning engine has created them.
mod config;
mod error;
mod gcp;
mod graph;
mod k8s;
mod kubeconfig;
mod output;
mod stack;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigStore, StackSettings};
use crate::gcp::{ClusterLookup, GcpClient, OfflineLookup};
use crate::graph::EngineState;
use crate::k8s::canary::CANARY_NAME;
use crate::k8s::kubectl::{wait_for_ingress_ip, Kubectl};

#[derive(Parser)]
#[command(name = "gkestack")]
#[command(about = "Declare GKE stacks and export their outputs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Stack file path
    #[arg(short, long, default_value = "stack.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an example stack file
    Init {
        /// Environment name
        #[arg(long, default_value = "dev")]
        environment: String,

        /// GCP project id
        #[arg(long, default_value = "my-project")]
        project: String,
    },

    /// Print the dependency-ordered resource plan
    Plan {
        /// Write the plan to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve exported outputs against the engine's state file
    Outputs {
        /// Engine state file (JSON or YAML)
        #[arg(long)]
        state: PathBuf,
    },

    /// Synthesize a kubeconfig for an existing cluster
    Kubeconfig {
        #[arg(long)]
        name: String,

        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        project: String,

        #[arg(long)]
        location: String,

        /// Base64-encoded CA bundle
        #[arg(long, conflicts_with = "ca_file", required_unless_present = "ca_file")]
        ca_data: Option<String>,

        /// PEM CA bundle file
        #[arg(long)]
        ca_file: Option<PathBuf>,
    },

    /// Wait for the canary service to receive an external IP
    Verify {
        /// Kubeconfig file for the cluster
        #[arg(long)]
        kubeconfig: PathBuf,

        /// Namespace of the canary service [default: the stack's namespace_name]
        #[arg(long)]
        namespace: Option<String>,

        /// Timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gkestack={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Init {
            environment,
            project,
        } => init_stack(&cli, environment, project).await,
        Commands::Plan { out } => plan_stack(&cli, out.as_ref()).await,
        Commands::Outputs { state } => show_outputs(&cli, state).await,
        Commands::Kubeconfig {
            name,
            endpoint,
            project,
            location,
            ca_data,
            ca_file,
        } => {
            write_kubeconfig(
                name,
                endpoint,
                project,
                location,
                ca_data.as_deref(),
                ca_file.as_ref(),
            )
            .await
        }
        Commands::Verify {
            kubeconfig,
            namespace,
            timeout,
        } => verify_canary(&cli, kubeconfig, namespace.as_deref(), *timeout).await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load and validate the stack file
fn load_settings(cli: &Cli) -> Result<StackSettings> {
    let store = ConfigStore::from_file(&cli.config).context("Failed to load stack file")?;
    Ok(StackSettings::from_store(&store)?)
}

/// Cluster lookup backed by the GKE API, or offline without a token
fn cluster_lookup() -> Result<Box<dyn ClusterLookup>> {
    match GcpClient::from_env()? {
        Some(client) => Ok(Box::new(client)),
        None => {
            warn!("No GCP access token set; existing clusters will not be detected");
            Ok(Box::new(OfflineLookup))
        }
    }
}

async fn build_stack(cli: &Cli) -> Result<stack::Stack> {
    let settings = load_settings(cli)?;
    let lookup = cluster_lookup()?;
    Ok(stack::build(settings, lookup.as_ref()).await?)
}

/// Write an example stack file
async fn init_stack(cli: &Cli, environment: &str, project: &str) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!("Stack file already exists: {}", cli.config.display());
    }

    let content = config::render_example(environment, project)?;
    tokio::fs::write(&cli.config, content)
        .await
        .context("Failed to write stack file")?;

    info!("Example stack file created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the stack file to match your project");
    info!("  2. Optionally export an access token to detect existing clusters:");
    info!("     export GKESTACK_ACCESS_TOKEN=$(gcloud auth print-access-token)");
    info!("  3. Print the plan:");
    info!("     gkestack plan");

    Ok(())
}

/// Print or write the resource plan
async fn plan_stack(cli: &Cli, out: Option<&PathBuf>) -> Result<()> {
    let stack = build_stack(cli).await?;
    let plan = stack.plan();
    let yaml = serde_yaml::to_string(&plan).context("Failed to serialize plan")?;

    match out {
        Some(path) => {
            tokio::fs::write(path, yaml)
                .await
                .with_context(|| format!("Failed to write plan to {}", path.display()))?;
            info!(
                "Plan with {} resources in {} waves written to {}",
                plan.resource_count,
                plan.waves.len(),
                path.display()
            );
        }
        None => print!("{}", yaml),
    }

    Ok(())
}

/// Resolve and print the exported outputs
async fn show_outputs(cli: &Cli, state_path: &PathBuf) -> Result<()> {
    let mut stack = build_stack(cli).await?;
    let state = EngineState::from_file(state_path)?;
    debug!(
        "Resolving outputs: {}",
        stack.outputs.names().collect::<Vec<_>>().join(", ")
    );

    let values = stack
        .resolve(&state)
        .await
        .context("Failed to resolve stack outputs")?;

    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

/// Print a kubeconfig for the given cluster
async fn write_kubeconfig(
    name: &str,
    endpoint: &str,
    project: &str,
    location: &str,
    ca_data: Option<&str>,
    ca_file: Option<&PathBuf>,
) -> Result<()> {
    let ca = match (ca_data, ca_file) {
        (Some(data), _) => data.to_string(),
        (None, Some(path)) => {
            let pem = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read CA file {}", path.display()))?;
            STANDARD.encode(pem)
        }
        (None, None) => anyhow::bail!("Either --ca-data or --ca-file is required"),
    };

    let document = kubeconfig::synthesize(
        Some(name),
        Some(endpoint),
        Some(&ca),
        project,
        location,
    )?;
    print!("{}", document);
    Ok(())
}

/// Namespace to look for the canary in; the stack file is only read when present
fn canary_namespace(explicit: Option<&str>, settings: Option<&StackSettings>) -> String {
    match (explicit, settings) {
        (Some(namespace), _) => namespace.to_string(),
        (None, Some(settings)) => settings.namespace_name.clone(),
        (None, None) => config::settings::DEFAULT_NAMESPACE.to_string(),
    }
}

/// Smoke-test the canary service
async fn verify_canary(
    cli: &Cli,
    kubeconfig: &PathBuf,
    namespace: Option<&str>,
    timeout: u64,
) -> Result<()> {
    if !kubeconfig.exists() {
        anyhow::bail!("Kubeconfig not found: {}", kubeconfig.display());
    }

    let settings = if namespace.is_none() && cli.config.exists() {
        Some(load_settings(cli)?)
    } else {
        None
    };
    let namespace = canary_namespace(namespace, settings.as_ref());

    let document = tokio::fs::read_to_string(kubeconfig)
        .await
        .with_context(|| format!("Failed to read kubeconfig {}", kubeconfig.display()))?;
    let parsed = crate::kubeconfig::Kubeconfig::parse(&document)
        .with_context(|| format!("Invalid kubeconfig {}", kubeconfig.display()))?;
    info!("Verifying canary in context {}", parsed.current_context);

    let kubectl = Kubectl::new(kubeconfig);
    let ip = wait_for_ingress_ip(
        &kubectl,
        &namespace,
        CANARY_NAME,
        Duration::from_secs(timeout),
    )
    .await?;

    info!("Canary is reachable at http://{}", ip);
    println!("{}", ip);
    Ok(())
}
