// edge.rs — directed topology edges (spec §3.1).

use cie_core::NodeId;
use serde::{Deserialize, Serialize};

/// The kind of a directed edge between two nodes, bit-exact per spec §3.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    ConnectsTo,
    HasInterface,
    HasVlan,
    HasRule,
    Protects,
    DependsOn,
    RoutesTo,
    LocatedIn,
    PartOf,
    AssignedTo,
    MemberOf,
}

impl EdgeKind {
    /// Tie-break order for multiple paths to the same node during impact
    /// traversal, per spec §4.I: `DEPENDS_ON > PROTECTS > CONNECTS_TO >
    /// HAS_* > others` (lower number wins).
    pub fn tie_break_rank(self) -> u8 {
        match self {
            EdgeKind::DependsOn => 0,
            EdgeKind::Protects => 1,
            EdgeKind::ConnectsTo => 2,
            EdgeKind::HasInterface | EdgeKind::HasVlan | EdgeKind::HasRule => 3,
            _ => 4,
        }
    }
}

/// A directed edge: `source -> target`, identified by `(kind, source,
/// target)` per spec §6's persisted state layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl Edge {
    pub fn new(kind: EdgeKind, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            kind,
            source: source.into(),
            target: target.into(),
            properties: serde_json::Value::Null,
        }
    }

    /// The `(kind, source, target)` identity spec §6 uses for edges.
    pub fn identity(&self) -> (EdgeKind, NodeId, NodeId) {
        (self.kind, self.source.clone(), self.target.clone())
    }
}
