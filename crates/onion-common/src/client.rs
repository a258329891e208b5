//! HTTP clients for the directory and for hop-to-hop posts.

use std::time::Duration;

use onion_core::NodeId;
use reqwest::{Response, StatusCode};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{ErrorResponse, MessageRequest, NodeEntry, NodeRegistryResponse};

/// Timeout for directory calls.
pub const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Turn a non-success response into [`Error::Rejected`].
async fn rejection(resp: Response) -> Error {
    let status = resp.status().as_u16();
    let message = match resp.text().await {
        Ok(body) => serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body),
        Err(e) => e.to_string(),
    };
    Error::Rejected { status, message }
}

/// Client for the directory service.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Publish a relay's public key.
    ///
    /// A `409` becomes [`Error::Duplicate`].
    pub async fn register(&self, entry: &NodeEntry) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/registerNode", self.base_url))
            .timeout(DIRECTORY_TIMEOUT)
            .json(entry)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(Error::Duplicate(format!(
                "node {} already registered",
                entry.node_id
            ))),
            _ => Err(rejection(resp).await),
        }
    }

    /// Snapshot of every registered relay.
    pub async fn list_nodes(&self) -> Result<Vec<NodeEntry>> {
        let resp = self
            .http
            .get(format!("{}/getNodeRegistry", self.base_url))
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }

        let registry: NodeRegistryResponse = resp.json().await?;
        debug!("directory returned {} nodes", registry.nodes.len());
        Ok(registry.nodes)
    }

    pub async fn lookup(&self, node_id: NodeId) -> Result<NodeEntry> {
        let resp = self
            .http
            .get(format!("{}/nodes/{}", self.base_url, node_id))
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await?;

        match resp.status() {
            s if s.is_success() => Ok(resp.json().await?),
            StatusCode::NOT_FOUND => Err(Error::not_found(format!("node {}", node_id))),
            _ => Err(rejection(resp).await),
        }
    }

    /// `GET /status`.
    pub async fn status(&self) -> Result<()> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .timeout(DIRECTORY_TIMEOUT)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(rejection(resp).await)
        }
    }
}

/// Posts `{message}` bodies to the next hop with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HopClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl HopClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `POST {base_url}/message`.
    ///
    /// Timeouts map to [`Error::Timeout`], refused connections to
    /// [`Error::Unreachable`], non-success answers to [`Error::Rejected`].
    pub async fn post_message(&self, base_url: &str, message: String) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/message", base_url))
            .timeout(self.timeout)
            .json(&MessageRequest { message })
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(rejection(resp).await)
        }
    }
}
