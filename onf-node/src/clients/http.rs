//! REST client for the OnFinality API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use super::{
    ClientError, CreateNodePayload, CreatedNode, ExpandStoragePayload, NodeClient, NodeDetail,
    NodeStatus, Result, UpdateNodePayload,
};

/// Default public API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.onfinality.io/api";

/// Connection settings for [`HttpNodeClient`].
#[derive(Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Client for the node endpoints of the OnFinality API.
#[derive(Clone)]
pub struct HttpNodeClient {
    http: Client,
    base: String,
    access_key: String,
    secret_key: String,
}

impl HttpNodeClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = config.endpoint.trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::InvalidEndpoint(config.endpoint));
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("onf-node/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            access_key: config.access_key,
            secret_key: config.secret_key,
        })
    }

    fn nodes_url(&self, workspace_id: u64) -> String {
        format!("{}/workspaces/{}/nodes", self.base, workspace_id)
    }

    fn node_url(&self, workspace_id: u64, node_id: u64) -> String {
        format!("{}/{}", self.nodes_url(workspace_id), node_id)
    }

    /// Authenticate, send and map non-success statuses to [`ClientError::Api`].
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .basic_auth(&self.access_key, Some(&self.secret_key))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                debug!(status = status.as_u16(), error = %e, "Failed to read error body");
                String::new()
            }
        };
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn create_node(
        &self,
        workspace_id: u64,
        payload: &CreateNodePayload,
    ) -> Result<CreatedNode> {
        debug!(workspace_id, name = %payload.node_name, "POST create node");
        let response = self
            .send(self.http.post(self.nodes_url(workspace_id)).json(payload))
            .await?;
        Ok(response.json().await?)
    }

    async fn get_node_detail(&self, workspace_id: u64, node_id: u64) -> Result<NodeDetail> {
        debug!(workspace_id, node_id, "GET node detail");
        let response = self
            .send(self.http.get(self.node_url(workspace_id, node_id)))
            .await?;
        Ok(response.json().await?)
    }

    async fn get_node_status(&self, workspace_id: u64, node_id: u64) -> Result<NodeStatus> {
        let url = format!("{}/status", self.node_url(workspace_id, node_id));
        let response = self.send(self.http.get(url)).await?;
        Ok(response.json().await?)
    }

    async fn update_node(
        &self,
        workspace_id: u64,
        node_id: u64,
        payload: &UpdateNodePayload,
    ) -> Result<()> {
        debug!(workspace_id, node_id, ?payload, "PUT update node");
        self.send(
            self.http
                .put(self.node_url(workspace_id, node_id))
                .json(payload),
        )
        .await?;
        Ok(())
    }

    async fn expand_node_storage(
        &self,
        workspace_id: u64,
        node_id: u64,
        storage: &str,
    ) -> Result<()> {
        debug!(workspace_id, node_id, storage, "PUT expand storage");
        let url = format!("{}/expand-storage", self.node_url(workspace_id, node_id));
        let body = ExpandStoragePayload {
            storage: storage.to_string(),
        };
        self.send(self.http.put(url).json(&body)).await?;
        Ok(())
    }

    async fn stop_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        debug!(workspace_id, node_id, "PUT stop node");
        let url = format!("{}/stop", self.node_url(workspace_id, node_id));
        self.send(self.http.put(url)).await?;
        Ok(())
    }

    async fn resume_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        debug!(workspace_id, node_id, "PUT resume node");
        let url = format!("{}/resume", self.node_url(workspace_id, node_id));
        self.send(self.http.put(url)).await?;
        Ok(())
    }

    async fn terminate_node(&self, workspace_id: u64, node_id: u64) -> Result<()> {
        debug!(workspace_id, node_id, "DELETE node");
        self.send(self.http.delete(self.node_url(workspace_id, node_id)))
            .await?;
        Ok(())
    }
}
