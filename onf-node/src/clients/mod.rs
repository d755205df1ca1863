//! Clients for the OnFinality control plane.
//!
//! The reconciler only talks to the control plane through [`NodeClient`]:
//! - `http`: the REST implementation used by the binary
//! - tests inject in-memory fakes

pub mod http;

pub use http::{ClientConfig, HttpNodeClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::{NodeConfig, NodeSpec, STATUS_TERMINATED};

/// Errors from control plane calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or decoding failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The configured endpoint cannot be used as a base URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Node size class as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpecPayload {
    pub key: String,
    pub multiplier: u32,
}

impl From<&NodeSpec> for NodeSpecPayload {
    fn from(spec: &NodeSpec) -> Self {
        Self {
            key: spec.key.clone(),
            multiplier: spec.multiplier,
        }
    }
}

/// Request body for creating a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodePayload {
    pub network_spec_key: String,
    pub node_spec: NodeSpecPayload,
    pub node_type: String,
    pub node_name: String,
    pub cluster_hash: String,
    pub storage: String,
    pub image_version: String,
    pub init_from_backup: bool,
    pub use_api_key: bool,
    pub public_port: bool,
}

impl From<&NodeConfig> for CreateNodePayload {
    fn from(config: &NodeConfig) -> Self {
        Self {
            network_spec_key: config.network_spec_key.clone(),
            node_spec: (&config.node_spec).into(),
            node_type: config.node_type.clone(),
            node_name: config.node_name.clone(),
            cluster_hash: config.cluster_hash.clone(),
            storage: config.storage.clone(),
            image_version: config.image_version.clone(),
            init_from_backup: true,
            use_api_key: true,
            public_port: true,
        }
    }
}

/// Sparse update body: only the fields that change are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_spec: Option<NodeSpecPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_version: Option<String>,
}

impl UpdateNodePayload {
    pub fn is_empty(&self) -> bool {
        self.node_name.is_none()
            && self.node_spec.is_none()
            && self.node_type.is_none()
            && self.image_version.is_none()
    }
}

/// Request body for growing a node's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandStoragePayload {
    pub storage: String,
}

/// Response to a create call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreatedNode {
    pub id: u64,
    pub image: String,
}

/// Node detail as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub id: u64,
    pub workspace_id: u64,
    pub name: String,
    pub network_spec_key: String,
    pub node_spec: String,
    pub node_spec_multiplier: u32,
    pub node_type: String,
    pub cluster_hash: String,
    pub storage: String,
    pub image: String,
    pub status: String,
}

impl NodeDetail {
    pub fn is_terminated(&self) -> bool {
        self.status == STATUS_TERMINATED
    }
}

/// Status-only response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeStatus {
    pub status: String,
}

/// Control plane operations on nodes.
///
/// Mutating calls other than create return as soon as the control plane has
/// accepted them; their effect is observed through `get_node_status`.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Create a node in a workspace.
    async fn create_node(&self, workspace_id: u64, payload: &CreateNodePayload)
        -> Result<CreatedNode>;

    /// Get the full detail of a node, including terminated ones.
    async fn get_node_detail(&self, workspace_id: u64, node_id: u64) -> Result<NodeDetail>;

    /// Get the current status of a node.
    async fn get_node_status(&self, workspace_id: u64, node_id: u64) -> Result<NodeStatus>;

    /// Apply a partial update.
    async fn update_node(
        &self,
        workspace_id: u64,
        node_id: u64,
        payload: &UpdateNodePayload,
    ) -> Result<()>;

    /// Grow the node's storage to `storage`.
    async fn expand_node_storage(&self, workspace_id: u64, node_id: u64, storage: &str)
        -> Result<()>;

    /// Stop a running node.
    async fn stop_node(&self, workspace_id: u64, node_id: u64) -> Result<()>;

    /// Resume a stopped node.
    async fn resume_node(&self, workspace_id: u64, node_id: u64) -> Result<()>;

    /// Terminate a node.
    async fn terminate_node(&self, workspace_id: u64, node_id: u64) -> Result<()>;
}
