/// Google Cloud API client used for read-before-write cluster lookups
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::models::{ErrorResponse, ExistingCluster};
use crate::error::{Result, StackError};

const CONTAINER_API_BASE: &str = "https://container.googleapis.com/v1";

/// Environment variables checked for an OAuth access token, in order
pub const ACCESS_TOKEN_VARS: [&str; 2] = ["GKESTACK_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// Result of looking up a resource that may not exist
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

/// Finds an existing GKE cluster by name
#[async_trait]
pub trait ClusterLookup: Send + Sync {
    /// `Ok(Lookup::NotFound)` only when the API says the cluster does not
    /// exist. Any other failure is an error.
    async fn find_cluster(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Lookup<ExistingCluster>>;
}

/// Lookup used when no credentials are available; never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineLookup;

#[async_trait]
impl ClusterLookup for OfflineLookup {
    async fn find_cluster(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Lookup<ExistingCluster>> {
        warn!(
            "Offline mode: not checking for existing cluster {} in {}/{}",
            name, project, location
        );
        Ok(Lookup::NotFound)
    }
}

/// Main Google Cloud API client
#[derive(Clone)]
pub struct GcpClient {
    client: Client,
}

impl GcpClient {
    /// Create a client authenticated with an OAuth access token
    pub fn new(access_token: String) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", access_token))
                .context("Invalid access token format")?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Create a client from the first access token found in the environment
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        ACCESS_TOKEN_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|t| !t.is_empty()))
            .map(Self::new)
            .transpose()
    }

    /// GET an API path. `Ok(None)` means the API answered 404.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str, resource: &str) -> Result<Option<T>> {
        let url = format!("{}/{}", CONTAINER_API_BASE, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StackError::remote(resource, format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| StackError::remote(resource, format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(StackError::remote(resource, describe_error(status, &body)));
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| StackError::remote(resource, format!("failed to parse API response: {}", e)))
    }
}

/// Render a Google API error body, falling back to the raw text
fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if !err.error.status.is_empty() => format!(
            "API error {} ({}): {}",
            err.error.code, err.error.status, err.error.message
        ),
        Ok(err) => format!("API error {}: {}", err.error.code, err.error.message),
        Err(_) => format!("API request failed with status {}: {}", status, body),
    }
}

#[async_trait]
impl ClusterLookup for GcpClient {
    async fn find_cluster(
        &self,
        project: &str,
        location: &str,
        name: &str,
    ) -> Result<Lookup<ExistingCluster>> {
        let path = format!(
            "projects/{}/locations/{}/clusters/{}",
            project, location, name
        );
        let resource = format!("cluster {}", name);

        match self.get_optional::<ExistingCluster>(&path, &resource).await? {
            Some(cluster) => {
                info!(
                    "Found existing cluster: {} in {} (status: {}, endpoint: {})",
                    cluster.name, cluster.location, cluster.status, cluster.endpoint
                );
                Ok(Lookup::Found(cluster))
            }
            None => {
                info!("Cluster {} not found in {}/{}", name, project, location);
                Ok(Lookup::NotFound)
            }
        }
    }
}
