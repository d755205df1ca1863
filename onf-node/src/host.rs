//! Node host - runs the node lifecycle against a local state file.
//!
//! The state file records at most one node. Every command that touches the
//! control plane refreshes the record first, so a node terminated out of band
//! is dropped instead of being operated on.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clients::NodeClient;
use crate::reconciler::NodeReconciler;
use crate::state::{NodeConfig, NodeKey, NodeState};

const STATE_FORMAT_VERSION: u32 = 1;

/// A tracked node and when it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub state: NodeState,
    pub updated_at: DateTime<Utc>,
}

/// On-disk layout of the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    #[serde(default)]
    pub node: Option<NodeRecord>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            node: None,
        }
    }
}

/// Load a node configuration from a JSON file.
pub async fn load_config(path: &Path) -> Result<NodeConfig> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read node config {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("Invalid node config {}", path.display()))
}

/// Runs lifecycle commands for one node.
pub struct NodeHost<C: ?Sized> {
    reconciler: NodeReconciler<C>,
    state_path: PathBuf,
}

impl<C: NodeClient + ?Sized> NodeHost<C> {
    pub fn new(reconciler: NodeReconciler<C>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            reconciler,
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Read the state file. A missing file is an empty state.
    pub async fn load(&self) -> Result<StateFile> {
        let raw = match tokio::fs::read(&self.state_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read state file {}", self.state_path.display())
                })
            }
        };

        let file: StateFile = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid state file {}", self.state_path.display()))?;
        if file.version != STATE_FORMAT_VERSION {
            bail!(
                "Unsupported state file version {} in {}",
                file.version,
                self.state_path.display()
            );
        }
        Ok(file)
    }

    async fn save(&self, node: Option<NodeState>) -> Result<()> {
        let file = StateFile {
            version: STATE_FORMAT_VERSION,
            node: node.map(|state| NodeRecord {
                state,
                updated_at: Utc::now(),
            }),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        // Replace atomically
        let tmp = self.state_path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.state_path)
            .await
            .with_context(|| format!("Failed to replace {}", self.state_path.display()))?;
        Ok(())
    }

    /// The tracked node, if any, without contacting the control plane.
    pub async fn current(&self) -> Result<Option<NodeState>> {
        Ok(self.load().await?.node.map(|record| record.state))
    }

    /// Re-read the tracked node and save the result.
    pub async fn refresh(&self) -> Result<Option<NodeState>> {
        let Some(current) = self.current().await? else {
            return Ok(None);
        };

        let refreshed = self
            .reconciler
            .read(&current)
            .await
            .with_context(|| format!("Failed to refresh node {}", current.key()))?;
        if refreshed.is_none() {
            warn!(node = %current.key(), "Dropping terminated node from state");
        }
        self.save(refreshed.clone()).await?;
        Ok(refreshed)
    }

    /// Create or update the node so it matches `desired`.
    pub async fn apply(&self, desired: &NodeConfig) -> Result<NodeState> {
        let state = match self.refresh().await? {
            None => {
                let created = self
                    .reconciler
                    .create(desired)
                    .await
                    .context("Failed to create node")?;
                // Track the node before any follow-up step
                self.save(Some(created.clone())).await?;

                if desired.stopped {
                    self.reconcile(&created, desired).await?
                } else {
                    created
                }
            }
            Some(observed) => self.reconcile(&observed, desired).await?,
        };

        self.save(Some(state.clone())).await?;
        info!(node = %state.key(), "Node applied");
        Ok(state)
    }

    async fn reconcile(&self, observed: &NodeState, desired: &NodeConfig) -> Result<NodeState> {
        let key = observed.key();
        self.reconciler
            .reconcile(key, observed, desired)
            .await
            .with_context(|| format!("Failed to reconcile node {key}"))
    }

    /// Start tracking an existing node.
    pub async fn import(&self, key: NodeKey) -> Result<NodeState> {
        if let Some(existing) = self.current().await? {
            bail!(
                "State file {} already tracks node {}",
                self.state_path.display(),
                existing.key()
            );
        }

        let Some(state) = self
            .reconciler
            .import(key)
            .await
            .with_context(|| format!("Failed to import node {key}"))?
        else {
            bail!("Node {key} has been terminated");
        };

        self.save(Some(state.clone())).await?;
        info!(node = %key, "Node imported");
        Ok(state)
    }

    /// Terminate the tracked node and forget it.
    pub async fn destroy(&self) -> Result<Option<NodeKey>> {
        let Some(current) = self.current().await? else {
            info!("No node tracked, nothing to destroy");
            return Ok(None);
        };

        let key = current.key();
        self.reconciler
            .delete(&current)
            .await
            .with_context(|| format!("Failed to terminate node {key}"))?;
        self.save(None).await?;
        info!(node = %key, "Node destroyed");
        Ok(Some(key))
    }
}
