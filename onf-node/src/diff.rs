//! State differ: turns (observed, desired) into an ordered list of changes.

use std::fmt;

use thiserror::Error;

use crate::quantity::{Quantity, QuantityError};
use crate::state::{NodeConfig, NodeSpec};

/// Fields that can only be set when a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmutableField {
    WorkspaceId,
    NetworkSpecKey,
    ClusterHash,
}

impl ImmutableField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImmutableField::WorkspaceId => "workspace_id",
            ImmutableField::NetworkSpecKey => "network_spec_key",
            ImmutableField::ClusterHash => "cluster_hash",
        }
    }
}

impl fmt::Display for ImmutableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a desired state cannot be reached by updating the observed one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    #[error("{field} cannot be changed after creation (current {observed:?}, requested {desired:?})")]
    ImmutableFieldViolation {
        field: ImmutableField,
        observed: String,
        desired: String,
    },

    #[error("storage cannot shrink from {observed} to {desired}")]
    UnsupportedShrink { observed: String, desired: String },

    #[error("invalid storage size: {0}")]
    InvalidQuantity(#[from] QuantityError),
}

/// One change needed to move a node toward its desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOperation {
    Rename { node_name: String },
    Respec { node_spec: NodeSpec },
    Retype { node_type: String },
    Reimage { image_version: String },
    ExpandStorage { storage: String },
    Stop,
    Resume,
}

impl ChangeOperation {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeOperation::Rename { .. } => "rename",
            ChangeOperation::Respec { .. } => "respec",
            ChangeOperation::Retype { .. } => "retype",
            ChangeOperation::Reimage { .. } => "reimage",
            ChangeOperation::ExpandStorage { .. } => "expand storage",
            ChangeOperation::Stop => "stop",
            ChangeOperation::Resume => "resume",
        }
    }
}

/// Compare `observed` against `desired`.
///
/// Immutable fields are checked first, then storage. On success the result
/// is ordered: rename, respec, retype and reimage (applied together as one
/// update), then storage expansion, then stop or resume.
pub fn diff(
    observed: &NodeConfig,
    desired: &NodeConfig,
) -> Result<Vec<ChangeOperation>, DiffError> {
    check_immutable(
        ImmutableField::WorkspaceId,
        &observed.workspace_id,
        &desired.workspace_id,
    )?;
    check_immutable(
        ImmutableField::NetworkSpecKey,
        &observed.network_spec_key,
        &desired.network_spec_key,
    )?;
    check_immutable(
        ImmutableField::ClusterHash,
        &observed.cluster_hash,
        &desired.cluster_hash,
    )?;

    let expand = storage_change(&observed.storage, &desired.storage)?;

    let mut ops = Vec::new();

    if observed.node_name != desired.node_name {
        ops.push(ChangeOperation::Rename {
            node_name: desired.node_name.clone(),
        });
    }
    if observed.node_spec != desired.node_spec {
        ops.push(ChangeOperation::Respec {
            node_spec: desired.node_spec.clone(),
        });
    }
    if observed.node_type != desired.node_type {
        ops.push(ChangeOperation::Retype {
            node_type: desired.node_type.clone(),
        });
    }
    if observed.image_version != desired.image_version {
        ops.push(ChangeOperation::Reimage {
            image_version: desired.image_version.clone(),
        });
    }
    if let Some(storage) = expand {
        ops.push(ChangeOperation::ExpandStorage { storage });
    }
    if observed.stopped != desired.stopped {
        ops.push(if desired.stopped {
            ChangeOperation::Stop
        } else {
            ChangeOperation::Resume
        });
    }

    Ok(ops)
}

fn check_immutable<T>(field: ImmutableField, observed: &T, desired: &T) -> Result<(), DiffError>
where
    T: PartialEq + ToString + ?Sized,
{
    if observed == desired {
        return Ok(());
    }
    Err(DiffError::ImmutableFieldViolation {
        field,
        observed: observed.to_string(),
        desired: desired.to_string(),
    })
}

/// `Some(desired)` when storage must grow, `None` when it is unchanged.
fn storage_change(observed: &str, desired: &str) -> Result<Option<String>, DiffError> {
    if observed == desired {
        return Ok(None);
    }

    let current = Quantity::parse(observed)?;
    let wanted = Quantity::parse(desired)?;

    if wanted < current {
        return Err(DiffError::UnsupportedShrink {
            observed: observed.to_string(),
            desired: desired.to_string(),
        });
    }
    if wanted > current {
        return Ok(Some(desired.to_string()));
    }
    Ok(None)
}
