// mutation.rs — the tagged mutation record connectors yield (spec §6,
// §9's "duck-typed connector payloads -> tagged sum types" design note).

use cie_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::edge::EdgeKind;
use crate::node::NodeKind;

/// A single graph mutation, as produced by a connector's `sync()` call or
/// an administrative seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphMutation {
    UpsertNode {
        id: NodeId,
        kind: NodeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        environment: Option<cie_core::Environment>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        criticality: Option<cie_core::Criticality>,
    },
    UpsertEdge {
        kind: EdgeKind,
        source: NodeId,
        target: NodeId,
        #[serde(default)]
        properties: serde_json::Value,
    },
    Tombstone {
        id: NodeId,
    },
}
