//! Node state model.
//!
//! `NodeConfig` is what an operator declares. `NodeState` adds the
//! server-assigned identifier and image reference.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::NodeDetail;

/// Remote status reported for a node that no longer exists.
pub const STATUS_TERMINATED: &str = "terminated";
/// Remote status reported for a stopped node.
pub const STATUS_STOPPED: &str = "stopped";

/// Size class of a node: a spec key and how many units of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub key: String,
    pub multiplier: u32,
}

/// Operator-declared node configuration.
///
/// `workspace_id`, `network_spec_key` and `cluster_hash` can only be set at
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub workspace_id: u64,
    pub network_spec_key: String,
    pub node_spec: NodeSpec,
    pub node_type: String,
    pub node_name: String,
    pub cluster_hash: String,
    pub storage: String,
    pub image_version: String,
    #[serde(default)]
    pub stopped: bool,
}

/// Full state of a node as tracked locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: u64,
    pub image: String,
    #[serde(flatten)]
    pub config: NodeConfig,
}

impl NodeState {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.config.workspace_id, self.id)
    }

    /// Build a state from a detail response, taking every field from the remote side.
    pub fn from_detail(detail: &NodeDetail) -> Self {
        Self {
            id: detail.id,
            image: detail.image.clone(),
            config: NodeConfig {
                workspace_id: detail.workspace_id,
                network_spec_key: detail.network_spec_key.clone(),
                node_spec: NodeSpec {
                    key: detail.node_spec.clone(),
                    multiplier: detail.node_spec_multiplier,
                },
                node_type: detail.node_type.clone(),
                node_name: detail.name.clone(),
                cluster_hash: detail.cluster_hash.clone(),
                storage: detail.storage.clone(),
                image_version: image_version(&detail.image).to_string(),
                stopped: detail.status == STATUS_STOPPED,
            },
        }
    }

    /// Overlay the mutable fields reported by the control plane onto this state.
    ///
    /// Immutable fields keep their recorded values.
    pub fn refreshed(&self, detail: &NodeDetail) -> Self {
        let mut next = self.clone();
        next.image = detail.image.clone();
        next.config.node_spec = NodeSpec {
            key: detail.node_spec.clone(),
            multiplier: detail.node_spec_multiplier,
        };
        next.config.node_type = detail.node_type.clone();
        next.config.node_name = detail.name.clone();
        next.config.storage = detail.storage.clone();
        next.config.image_version = image_version(&detail.image).to_string();
        next.config.stopped = detail.status == STATUS_STOPPED;
        next
    }
}

/// Split an image reference into repository and tag.
///
/// A colon that is followed by a path separator belongs to a registry port,
/// not a tag.
pub fn split_image(image: &str) -> (&str, Option<&str>) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, Some(tag)),
        _ => (image, None),
    }
}

/// The tag of an image reference, or the whole reference if it has none.
pub fn image_version(image: &str) -> &str {
    match split_image(image) {
        (_, Some(tag)) => tag,
        (repo, None) => repo,
    }
}

/// The image a node will run after switching `current` to `version`.
pub fn planned_image(current: &str, version: &str) -> String {
    let (repo, _) = split_image(current);
    format!("{repo}:{version}")
}

/// Errors from parsing a `<workspace_id>:<node_id>` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeKeyError {
    #[error("node key {0:?} must have the form <workspace_id>:<node_id>")]
    MissingSeparator(String),

    #[error("invalid workspace id {value:?}: {source}")]
    InvalidWorkspaceId {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid node id {value:?}: {source}")]
    InvalidNodeId {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

/// External identity of a node: the workspace it lives in and its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub workspace_id: u64,
    pub node_id: u64,
}

impl NodeKey {
    pub fn new(workspace_id: u64, node_id: u64) -> Self {
        Self {
            workspace_id,
            node_id,
        }
    }
}

impl FromStr for NodeKey {
    type Err = NodeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (workspace, node) = s
            .split_once(':')
            .ok_or_else(|| NodeKeyError::MissingSeparator(s.to_string()))?;

        let workspace_id =
            workspace
                .trim()
                .parse()
                .map_err(|source| NodeKeyError::InvalidWorkspaceId {
                    value: workspace.to_string(),
                    source,
                })?;
        let node_id = node
            .trim()
            .parse()
            .map_err(|source| NodeKeyError::InvalidNodeId {
                value: node.to_string(),
                source,
            })?;

        Ok(Self::new(workspace_id, node_id))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workspace_id, self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_detail(status: &str) -> NodeDetail {
        NodeDetail {
            id: 42,
            workspace_id: 6635707676612587520,
            name: "ian test".to_string(),
            network_spec_key: "polkadot".to_string(),
            node_spec: "unit".to_string(),
            node_spec_multiplier: 4,
            node_type: "full".to_string(),
            cluster_hash: "jm".to_string(),
            storage: "150Gi".to_string(),
            image: "onfinality/polkadot:v0.9.27".to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_parse_node_key() {
        let key: NodeKey = "6635707676612587520:42".parse().unwrap();
        assert_eq!(key.workspace_id, 6635707676612587520);
        assert_eq!(key.node_id, 42);
        assert_eq!(key.to_string(), "6635707676612587520:42");
    }

    #[test]
    fn test_parse_node_key_rejects_bad_workspace() {
        let err = "abc:42".parse::<NodeKey>().unwrap_err();
        assert!(matches!(err, NodeKeyError::InvalidWorkspaceId { ref value, .. } if value == "abc"));
    }

    #[test]
    fn test_parse_node_key_rejects_bad_node() {
        let err = "1:x".parse::<NodeKey>().unwrap_err();
        assert!(matches!(err, NodeKeyError::InvalidNodeId { ref value, .. } if value == "x"));

        let err = "1:2:3".parse::<NodeKey>().unwrap_err();
        assert!(matches!(err, NodeKeyError::InvalidNodeId { .. }));
    }

    #[test]
    fn test_parse_node_key_requires_separator() {
        assert_eq!(
            "42".parse::<NodeKey>(),
            Err(NodeKeyError::MissingSeparator("42".to_string()))
        );
    }

    #[test]
    fn test_image_helpers() {
        assert_eq!(image_version("onfinality/polkadot:v0.9.27"), "v0.9.27");
        assert_eq!(
            planned_image("onfinality/polkadot:v0.9.27", "v0.9.28"),
            "onfinality/polkadot:v0.9.28"
        );
        assert_eq!(
            split_image("registry:5000/polkadot"),
            ("registry:5000/polkadot", None)
        );
        assert_eq!(
            planned_image("registry:5000/polkadot:v1", "v2"),
            "registry:5000/polkadot:v2"
        );
    }

    #[test]
    fn test_from_detail() {
        let state = NodeState::from_detail(&make_detail("running"));
        assert_eq!(state.id, 42);
        assert_eq!(state.config.image_version, "v0.9.27");
        assert_eq!(state.config.node_spec.multiplier, 4);
        assert!(!state.config.stopped);

        let stopped = NodeState::from_detail(&make_detail("stopped"));
        assert!(stopped.config.stopped);
    }

    #[test]
    fn test_refreshed_keeps_immutable_fields() {
        let state = NodeState::from_detail(&make_detail("running"));
        let mut detail = make_detail("stopped");
        detail.name = "renamed".to_string();
        detail.cluster_hash = "other".to_string();

        let next = state.refreshed(&detail);
        assert_eq!(next.config.node_name, "renamed");
        assert_eq!(next.config.cluster_hash, "jm");
        assert!(next.config.stopped);
    }
}
