// snapshot.rs — the ImpactSnapshot contract (spec §4.I).

use cie_core::{Criticality, NodeId};
use cie_graph::EdgeKind;
use serde::{Deserialize, Serialize};

/// Which per-action traversal produced this snapshot (spec §4.I's
/// strategy table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    RuleScope,
    RuleScopeReverse,
    VlanFanout,
    InterfaceFanout,
    DeviceBlast,
    CloudSgScope,
}

/// An ordered path from a direct target to a high- or critical-severity
/// Application/Service, carried for presentation and scoring (spec §4.I,
/// the "Critical path" glossary entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub criticality: Criticality,
    pub hops: u32,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeKind>,
    /// Best-effort narrative decoration filled in by an external narrative
    /// generator; never a source of truth for scoring (spec §9).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// The frozen result of one impact analysis run, memoized on the change
/// record (spec §3.2 `impact_snapshot`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactSnapshot {
    pub directly_impacted: Vec<NodeId>,
    pub indirectly_impacted: Vec<NodeId>,
    pub affected_applications: Vec<NodeId>,
    pub affected_services: Vec<NodeId>,
    pub affected_vlans: Vec<NodeId>,
    pub critical_paths: Vec<CriticalPath>,
    pub total_dependency_count: usize,
    pub max_criticality: Option<Criticality>,
    pub traversal_strategy: TraversalStrategy,
    /// Applications/services with at least one independent path to a
    /// direct target-free source, per spec §4.I's redundancy check.
    pub redundant_applications: Vec<NodeId>,
    /// Non-fatal: target ids that did not resolve to an existing node,
    /// excluded from the rest of the analysis (spec §4.I "Failure").
    #[serde(default)]
    pub unknown_targets: Vec<NodeId>,
}

impl ImpactSnapshot {
    /// Whether every affected critical application/service has a
    /// redundant path — the `-10` risk discount condition in spec §4.K.
    pub fn all_critical_services_redundant(&self) -> bool {
        let critical_affected: Vec<&NodeId> = self
            .affected_applications
            .iter()
            .chain(self.affected_services.iter())
            .filter(|_| self.max_criticality == Some(Criticality::Critical))
            .collect();
        if critical_affected.is_empty() {
            return false;
        }
        critical_affected
            .iter()
            .all(|id| self.redundant_applications.contains(id))
    }
}
