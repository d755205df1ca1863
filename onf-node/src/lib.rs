//! onf-node: reconciles OnFinality nodes toward a declared configuration.
//!
//! - [`diff`] decides what changed and rejects impossible changes
//! - [`waiter`] polls node status until an operation settles
//! - [`reconciler`] applies changes one by one through a [`clients::NodeClient`]
//! - [`host`] runs the node lifecycle against a local state file

pub mod clients;
pub mod diff;
pub mod host;
pub mod quantity;
pub mod reconciler;
pub mod state;
pub mod waiter;

pub use clients::{ClientConfig, ClientError, HttpNodeClient, NodeClient};
pub use diff::{diff, ChangeOperation, DiffError, ImmutableField};
pub use host::NodeHost;
pub use quantity::Quantity;
pub use reconciler::{NodeReconciler, ReconcileError};
pub use state::{NodeConfig, NodeKey, NodeSpec, NodeState};
pub use waiter::{PollOutcome, TerminalSet, WaitError, WaitOutcome, Waiter};
