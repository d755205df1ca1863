//! Node reconciler - drives a node toward its desired configuration.
//!
//! Changes are applied one at a time. After each mutating call the reconciler
//! waits for the node to settle before issuing the next one, because the
//! control plane does not guarantee that concurrent mutations compose.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::clients::{ClientError, CreateNodePayload, NodeClient, UpdateNodePayload};
use crate::diff::{diff, ChangeOperation, DiffError};
use crate::state::{planned_image, NodeConfig, NodeKey, NodeState};
use crate::waiter::{PollOutcome, TerminalSet, WaitError, WaitOutcome, Waiter};

/// Errors from reconciling a node.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The desired state cannot be reached; nothing was sent.
    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("failed to {operation} node: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    #[error("waiting for {operation} to settle: {source}")]
    Wait {
        operation: &'static str,
        #[source]
        source: WaitError,
    },

    #[error("{operation} ended with node status {status:?}")]
    OperationFailed {
        operation: &'static str,
        status: String,
    },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// One remote call plus the wait that follows it.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Update(UpdateNodePayload),
    ExpandStorage(String),
    Stop,
    Resume,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Update(_) => "update",
            Step::ExpandStorage(_) => "expand storage",
            Step::Stop => "stop",
            Step::Resume => "resume",
        }
    }

    fn terminal(&self) -> TerminalSet {
        match self {
            Step::Stop => TerminalSet::STOPPED,
            Step::Update(_) | Step::ExpandStorage(_) | Step::Resume => TerminalSet::RUNNING,
        }
    }
}

/// Fold the mutate operations into one sparse update that runs first.
fn plan_steps(ops: Vec<ChangeOperation>) -> Vec<Step> {
    let mut update = UpdateNodePayload::default();
    let mut rest = Vec::new();

    for op in ops {
        match op {
            ChangeOperation::Rename { node_name } => update.node_name = Some(node_name),
            ChangeOperation::Respec { node_spec } => update.node_spec = Some((&node_spec).into()),
            ChangeOperation::Retype { node_type } => update.node_type = Some(node_type),
            ChangeOperation::Reimage { image_version } => {
                update.image_version = Some(image_version)
            }
            ChangeOperation::ExpandStorage { storage } => rest.push(Step::ExpandStorage(storage)),
            ChangeOperation::Stop => rest.push(Step::Stop),
            ChangeOperation::Resume => rest.push(Step::Resume),
        }
    }

    let mut steps = Vec::with_capacity(rest.len() + 1);
    if !update.is_empty() {
        steps.push(Step::Update(update));
    }
    steps.extend(rest);
    steps
}

/// Reconciles OnFinality nodes through a [`NodeClient`].
pub struct NodeReconciler<C: ?Sized> {
    client: Arc<C>,
    waiter: Waiter,
}

impl<C: NodeClient + ?Sized> NodeReconciler<C> {
    pub fn new(client: Arc<C>, waiter: Waiter) -> Self {
        Self { client, waiter }
    }

    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    /// Create a node. The returned id and image are authoritative.
    pub async fn create(&self, desired: &NodeConfig) -> Result<NodeState> {
        info!(
            workspace_id = desired.workspace_id,
            name = %desired.node_name,
            "Creating node"
        );

        let payload = CreateNodePayload::from(desired);
        let created = self
            .client
            .create_node(desired.workspace_id, &payload)
            .await
            .map_err(|source| ReconcileError::Remote {
                operation: "create",
                source,
            })?;

        info!(
            workspace_id = desired.workspace_id,
            node_id = created.id,
            image = %created.image,
            "Node created"
        );

        let mut config = desired.clone();
        config.stopped = false;
        Ok(NodeState {
            id: created.id,
            image: created.image,
            config,
        })
    }

    /// Re-read a node. `None` means it has been terminated and the local
    /// record should be dropped.
    pub async fn read(&self, current: &NodeState) -> Result<Option<NodeState>> {
        let key = current.key();
        let detail = self
            .client
            .get_node_detail(key.workspace_id, key.node_id)
            .await
            .map_err(|source| ReconcileError::Remote {
                operation: "read",
                source,
            })?;

        if detail.is_terminated() {
            info!(node = %key, "Node has been terminated");
            return Ok(None);
        }
        Ok(Some(current.refreshed(&detail)))
    }

    /// Adopt an existing node. `None` if it has been terminated.
    pub async fn import(&self, key: NodeKey) -> Result<Option<NodeState>> {
        let detail = self
            .client
            .get_node_detail(key.workspace_id, key.node_id)
            .await
            .map_err(|source| ReconcileError::Remote {
                operation: "import",
                source,
            })?;

        if detail.is_terminated() {
            warn!(node = %key, "Cannot import terminated node");
            return Ok(None);
        }
        info!(node = %key, name = %detail.name, "Imported node");
        Ok(Some(NodeState::from_detail(&detail)))
    }

    /// Drive `observed` toward `desired`.
    ///
    /// Validation failures are returned before any remote call. Steps already
    /// applied when a later step fails are not rolled back. The returned state
    /// is `desired` with the observed id and the planned image; it is not
    /// re-read from the control plane.
    pub async fn reconcile(
        &self,
        key: NodeKey,
        observed: &NodeState,
        desired: &NodeConfig,
    ) -> Result<NodeState> {
        let ops = diff(&observed.config, desired)?;

        if ops.is_empty() {
            info!(node = %key, "Node is up to date");
        } else {
            let names: Vec<_> = ops.iter().map(ChangeOperation::name).collect();
            info!(node = %key, changes = ?names, "Reconciling node");
        }

        for step in plan_steps(ops) {
            self.apply(key, step).await?;
        }

        Ok(NodeState {
            id: observed.id,
            image: planned_image(&observed.image, &desired.image_version),
            config: desired.clone(),
        })
    }

    /// Terminate a node. Does not wait for the termination to finish.
    pub async fn delete(&self, state: &NodeState) -> Result<()> {
        let key = state.key();
        info!(node = %key, "Terminating node");
        self.client
            .terminate_node(key.workspace_id, key.node_id)
            .await
            .map_err(|source| {
                error!(node = %key, error = %source, "Failed to terminate node");
                ReconcileError::Remote {
                    operation: "terminate",
                    source,
                }
            })
    }

    async fn apply(&self, key: NodeKey, step: Step) -> Result<WaitOutcome> {
        let operation = step.name();
        let (workspace_id, node_id) = (key.workspace_id, key.node_id);
        info!(node = %key, operation, "Applying change");

        let sent = match &step {
            Step::Update(payload) => self.client.update_node(workspace_id, node_id, payload).await,
            Step::ExpandStorage(storage) => {
                self.client
                    .expand_node_storage(workspace_id, node_id, storage)
                    .await
            }
            Step::Stop => self.client.stop_node(workspace_id, node_id).await,
            Step::Resume => self.client.resume_node(workspace_id, node_id).await,
        };
        sent.map_err(|source| {
            error!(node = %key, operation, error = %source, "Remote call failed");
            ReconcileError::Remote { operation, source }
        })?;

        let client = &*self.client;
        let terminal = step.terminal();
        let outcome = self
            .waiter
            .wait_until(
                move || async move {
                    client
                        .get_node_status(workspace_id, node_id)
                        .await
                        .map(|s| s.status)
                },
                |status| terminal.classify(status),
            )
            .await
            .map_err(|source| {
                error!(node = %key, operation, error = %source, "Wait failed");
                ReconcileError::Wait { operation, source }
            })?;

        if outcome.outcome == PollOutcome::Failed {
            error!(node = %key, operation, status = %outcome.status, "Operation failed");
            return Err(ReconcileError::OperationFailed {
                operation,
                status: outcome.status,
            });
        }

        info!(
            node = %key,
            operation,
            status = %outcome.status,
            polls = outcome.polls,
            "Change settled"
        );
        Ok(outcome)
    }
}
