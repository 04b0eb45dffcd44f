//! Error taxonomy for orchestrator operations.

use thiserror::Error;

use crate::inventory::InventoryError;

/// Errors surfaced by orchestrator operations.
///
/// Per-node connectivity failures inside fan-out operations never reach the
/// caller as errors; they are logged at the node boundary and the node
/// contributes nothing to the merged result. The variants here are the
/// failures a caller must handle.
#[derive(Debug, Error)]
pub enum CaptainError {
    /// The node id is not part of the resolved fleet.
    #[error("no such node: {node}")]
    NodeNotFound { node: String },

    /// No instance matches the given id anywhere in the fleet.
    #[error("no such instance: {instance}")]
    InstanceNotFound { instance: String },

    /// Admission rejected: the target node cannot fit the requested slots.
    #[error("node {node} is out of capacity: {requested} slots requested, {used} of {total} used")]
    CapacityExceeded {
        node: String,
        requested: u32,
        used: u32,
        total: u32,
    },

    /// A connectivity failure scoped to one node.
    #[error("node {node} is unreachable: {reason}")]
    NodeUnreachable { node: String, reason: String },

    /// The cloud inventory API failed; not retried internally.
    #[error("inventory lookup failed: {0}")]
    Upstream(#[from] InventoryError),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CaptainError {
    pub(crate) fn unreachable(node: &str, err: impl std::fmt::Display) -> Self {
        CaptainError::NodeUnreachable {
            node: node.to_string(),
            reason: err.to_string(),
        }
    }
}
