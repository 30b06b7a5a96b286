//! Consumption Payload Sources
//!
//! Where the raw provider payload comes from is irrelevant to parsing,
//! import, and repair; [`ConsumptionSource`] keeps it that way. The portal
//! client fetches the payload from a configured HTTPS endpoint (the login
//! dance, if any, is expected to be handled in front of that endpoint);
//! [`FileSource`] replays a payload saved to disk, which is also what the
//! tests use.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait ConsumptionSource: Send + Sync {
    /// Fetch the raw portal payload for the configured metering point.
    async fn fetch_payload(&self) -> Result<serde_json::Value>;

    /// Human-readable origin, for logs and reports.
    fn describe(&self) -> String;
}

/// Replays a payload previously saved to disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConsumptionSource for FileSource {
    async fn fetch_payload(&self) -> Result<serde_json::Value> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read payload file: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Payload file is not valid JSON: {}", self.path.display()))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Fetches the payload from the provider endpoint.
#[cfg(feature = "portal")]
pub struct PortalClient {
    endpoint: String,
    pod: String,
    user_number: Option<String>,
    client: reqwest::Client,
}

#[cfg(feature = "portal")]
impl PortalClient {
    pub fn from_config(source: &crate::config::SourceConfig) -> Result<Self> {
        if source.endpoint.is_empty() {
            bail!("No portal endpoint configured (set source.endpoint or GRID_USAGE_ENDPOINT)");
        }
        if source.pod.is_empty() {
            bail!("No metering point configured (set source.pod or GRID_USAGE_POD)");
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(source.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: source.endpoint.clone(),
            pod: source.pod.clone(),
            user_number: source.user_number.clone(),
            client,
        })
    }
}

#[cfg(feature = "portal")]
#[async_trait]
impl ConsumptionSource for PortalClient {
    async fn fetch_payload(&self) -> Result<serde_json::Value> {
        let mut query: Vec<(&str, &str)> = vec![("pod", self.pod.as_str())];
        if let Some(user_number) = &self.user_number {
            query.push(("userNumber", user_number.as_str()));
        }

        debug!(endpoint = %self.endpoint, pod = %self.pod, "Fetching consumption payload");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", self.endpoint))?
            .error_for_status()
            .with_context(|| format!("Portal rejected the request to {}", self.endpoint))?;

        response
            .json()
            .await
            .context("Portal response is not valid JSON")
    }

    fn describe(&self) -> String {
        format!("portal {} (pod {})", self.endpoint, self.pod)
    }
}
