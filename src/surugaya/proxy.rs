//! HTTP client for the FlareSolverr rendering proxy.
//!
//! Suruga-ya sits behind Cloudflare, so pages are never fetched directly. The proxy
//! drives a real browser through the challenge and hands back the rendered HTML.

use crate::config::ProxySettings;
use crate::error::ProxyError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra time the HTTP call gets on top of the proxy's own render budget.
const TRANSPORT_GRACE: Duration = Duration::from_secs(30);

/// Trait for page fetching - enables mocking for tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches a page and returns its rendered HTML.
    async fn fetch(&self, url: &str) -> Result<String, ProxyError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyCommand<'a> {
    cmd: &'static str,
    url: &'a str,
    max_timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ProxyReply {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    solution: Option<ProxySolution>,
}

#[derive(Debug, Deserialize)]
struct ProxySolution {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    response: Option<String>,
}

/// FlareSolverr client. Performs no retries; retry policy belongs to the caller.
pub struct FlareSolverrClient {
    client: Client,
    endpoint: String,
    max_timeout_ms: u64,
}

impl FlareSolverrClient {
    /// Creates a new client from proxy settings.
    pub fn new(settings: &ProxySettings) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms) + TRANSPORT_GRACE)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            max_timeout_ms: settings.timeout_ms,
        })
    }

    /// Returns the configured proxy endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PageFetcher for FlareSolverrClient {
    async fn fetch(&self, url: &str) -> Result<String, ProxyError> {
        info!("Fetching via FlareSolverr: {}", url);

        let command = ProxyCommand { cmd: "request.get", url, max_timeout: self.max_timeout_ms };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&command)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))?;

        let status = response.status();
        debug!("Proxy response status: {}", status);

        if !status.is_success() {
            return Err(ProxyError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(|e| ProxyError::Transport(e.to_string()))?;
        let reply: ProxyReply =
            serde_json::from_str(&body).map_err(|e| ProxyError::Malformed(e.to_string()))?;

        if reply.status != "ok" {
            let message = reply.message.unwrap_or_else(|| reply.status.clone());
            warn!("FlareSolverr reported failure for {}: {}", url, message);
            return Err(ProxyError::Rejected(message));
        }

        let solution =
            reply.solution.ok_or_else(|| ProxyError::Malformed("missing solution".to_string()))?;

        if let Some(upstream) = solution.status {
            debug!("Upstream status via proxy: {}", upstream);
        }

        solution
            .response
            .ok_or_else(|| ProxyError::Malformed("missing solution.response".to_string()))
    }
}
