// error.rs — error types for the topology graph subsystem.

use cie_core::{CieError, NodeId};
use thiserror::Error;

/// Errors raised while mutating or querying the topology graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A mutation would leave an edge pointing at a node that does not
    /// exist (spec §3.1 invariant 1).
    #[error("dangling edge endpoint: {0}")]
    DanglingEdge(NodeId),

    /// A mutation would introduce a second node with an id already in use
    /// by a different kind (spec §3.1 invariant 2).
    #[error("node id {0} is already in use by a different node kind")]
    DuplicateNodeId(NodeId),

    /// A VLAN id collided with an existing VLAN in the same environment
    /// (spec §3.1 invariant 3).
    #[error("vlan id {vlan_id} is already in use within environment {environment:?}")]
    DuplicateVlanId {
        vlan_id: u16,
        environment: cie_core::Environment,
    },

    /// A Rule or Interface was not uniquely owned by exactly one device
    /// (spec §3.1 invariants 4 and 5).
    #[error("{kind} {id} must belong to exactly one device, found {owner_count}")]
    AmbiguousOwnership {
        kind: &'static str,
        id: NodeId,
        owner_count: usize,
    },

    /// The requested node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
}

impl From<GraphError> for CieError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NodeNotFound(id) => CieError::NotFound {
                kind: "node",
                id: id.to_string(),
            },
            other => CieError::GraphInvariantViolation(other.to_string()),
        }
    }
}
