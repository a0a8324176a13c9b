/// Post-deployment checks driven through kubectl
use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

const KUBECTL_INSTALL_URL: &str = "https://kubernetes.io/docs/tasks/tools/";

/// kubectl bound to one kubeconfig file
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
    kubeconfig: PathBuf,
}

impl Kubectl {
    pub fn new<P: AsRef<Path>>(kubeconfig: P) -> Self {
        Self {
            program: PathBuf::from("kubectl"),
            kubeconfig: kubeconfig.as_ref().to_path_buf(),
        }
    }

    /// Run a different binary in place of `kubectl`
    pub fn with_program<P: AsRef<Path>>(mut self, program: P) -> Self {
        self.program = program.as_ref().to_path_buf();
        self
    }

    /// Run with `args` and return stdout, or stderr as the error
    pub async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let output = Command::new(&self.program)
            .args(args)
            .env("KUBECONFIG", &self.kubeconfig)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.program.display()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            anyhow::bail!("{}", String::from_utf8_lossy(&output.stderr).trim())
        }
    }

    /// Fail early with an install hint when the binary is missing
    pub async fn ensure_installed(&self) -> Result<()> {
        match self.run(["version", "--client"]).await {
            Ok(_) => Ok(()),
            Err(_) => anyhow::bail!(
                "{} is not installed or not in PATH. Please install from {}",
                self.program.display(),
                KUBECTL_INSTALL_URL
            ),
        }
    }

    /// External IP of a load balancer service, `None` while pending
    pub async fn service_ingress_ip(&self, namespace: &str, service: &str) -> Result<Option<String>> {
        let stdout = self
            .run([
                "get",
                "service",
                service,
                "--namespace",
                namespace,
                "-o",
                "jsonpath={.status.loadBalancer.ingress[0].ip}",
            ])
            .await?;
        let ip = stdout.trim().trim_matches('\'');
        Ok((!ip.is_empty()).then(|| ip.to_string()))
    }
}

/// Repeats a check until it yields a value or the deadline passes
#[derive(Debug, Clone)]
pub struct Poller {
    pub timeout: Duration,
    pub interval: Duration,
    pub description: String,
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration, description: impl Into<String>) -> Self {
        Self {
            timeout,
            interval,
            description: description.into(),
        }
    }

    /// `Ok(None)` keeps polling; an error stops immediately
    pub async fn until_some<F, Fut, T>(&self, check: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        info!("{}...", self.description);
        let start = Instant::now();

        loop {
            if let Some(value) = check().await? {
                info!("✓ {}", self.description);
                return Ok(value);
            }

            if start.elapsed() >= self.timeout {
                anyhow::bail!(
                    "Timeout after {} seconds: {}",
                    self.timeout.as_secs(),
                    self.description
                );
            }

            debug!("{}: not ready, retrying in {:?}", self.description, self.interval);
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Wait until `service` has been assigned an external address
pub async fn wait_for_ingress_ip(
    kubectl: &Kubectl,
    namespace: &str,
    service: &str,
    timeout: Duration,
) -> Result<String> {
    kubectl.ensure_installed().await?;

    Poller::new(
        timeout,
        Duration::from_secs(5),
        format!("Waiting for an ingress IP on {}/{}", namespace, service),
    )
    .until_some(|| kubectl.service_ingress_ip(namespace, service))
    .await
}
