//! Topology graph store for the Change Intelligence Engine: nodes, edges,
//! their invariants, and the traversal primitives `cie-impact` builds its
//! per-action strategies on top of.

pub mod edge;
pub mod error;
pub mod mutation;
pub mod node;
pub mod store;

pub use edge::{Edge, EdgeKind};
pub use error::GraphError;
pub use mutation::GraphMutation;
pub use node::{DeviceKind, Node, NodeKind};
pub use store::{
    bfs_bounded, bfs_bounded_reverse, BfsRecord, BfsResult, GraphData, GraphSnapshot, GraphStore,
};
