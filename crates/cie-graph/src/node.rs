// node.rs — topology node kinds and properties (spec §3.1).

use cie_core::{Criticality, Environment, NodeId};
use serde::{Deserialize, Serialize};

/// The kind of physical or logical device a `Device` node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Firewall,
    Router,
    Switch,
    Server,
    LoadBalancer,
    CloudGateway,
    WirelessAp,
    WirelessController,
    Rack,
    PatchPanel,
}

/// Kind-specific node data, a closed tagged union per spec §9's "no
/// duck-typed payloads" design note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Device {
        device_kind: DeviceKind,
        vendor: String,
        model: String,
    },
    Interface,
    Port,
    Vlan {
        vlan_id: u16,
        name: String,
    },
    Ip {
        address: String,
    },
    Rule {
        src: String,
        dst: String,
        service: String,
        action: String,
        is_any_any: bool,
    },
    Application,
    Service,
    Datacenter,
    Cable,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Device { .. } => "device",
            NodeKind::Interface => "interface",
            NodeKind::Port => "port",
            NodeKind::Vlan { .. } => "vlan",
            NodeKind::Ip { .. } => "ip",
            NodeKind::Rule { .. } => "rule",
            NodeKind::Application => "application",
            NodeKind::Service => "service",
            NodeKind::Datacenter => "datacenter",
            NodeKind::Cable => "cable",
        }
    }

    pub fn is_any_any_rule(&self) -> bool {
        matches!(self, NodeKind::Rule { is_any_any: true, .. })
    }
}

/// A single topology node: a globally unique id, kind-specific data, and
/// the shared property axes (environment, criticality) every kind can
/// carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<Criticality>,
    /// Derived per spec §3.1 invariant 6; only meaningful for `Device`
    /// nodes, recomputed by `GraphStore::recompute_core_devices`.
    #[serde(default)]
    pub is_core: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            environment: None,
            criticality: None,
            is_core: false,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = Some(criticality);
        self
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, NodeKind::Device { .. })
    }
}
