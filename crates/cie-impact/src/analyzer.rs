// analyzer.rs — ImpactAnalyzer: dispatches to a traversal strategy and
// assembles the ImpactSnapshot (spec §4.I).

use std::collections::HashSet;

use cie_core::{ChangeAction, CieError, Criticality, ImpactConfig, NodeId};
use cie_graph::{EdgeKind, GraphSnapshot, NodeKind};
use tracing::{info, warn};

use crate::snapshot::{CriticalPath, ImpactSnapshot, TraversalStrategy};
use crate::strategy::{
    cloud_sg_scope, device_blast, has_redundant_path, interface_fanout, rule_scope,
    rule_scope_reverse, strategy_for, vlan_fanout, StrategyOutput,
};

/// Runs impact analysis for a single change against one graph generation.
///
/// Holds no state of its own: every call is a pure function of
/// `(snapshot, action, targets, config)`, which is what lets the
/// workflow controller cache a snapshot per change without worrying about
/// the analyzer's own lifetime (spec §4.I "Caching").
pub struct ImpactAnalyzer<'a> {
    config: &'a ImpactConfig,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(config: &'a ImpactConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        graph: &GraphSnapshot,
        action: ChangeAction,
        targets: &[NodeId],
    ) -> Result<ImpactSnapshot, CieError> {
        if targets.is_empty() {
            return Err(CieError::EmptyTargetImpact);
        }

        let data = graph.data();
        let known: Vec<NodeId> = targets
            .iter()
            .filter(|id| data.contains_node(id))
            .cloned()
            .collect();
        let unknown: Vec<NodeId> = targets
            .iter()
            .filter(|id| !data.contains_node(id))
            .cloned()
            .collect();
        if known.is_empty() {
            return Err(CieError::EmptyTargetImpact);
        }
        if !unknown.is_empty() {
            warn!(?unknown, "impact targets excluded: unknown node ids");
        }

        let strategy = strategy_for(action);
        let depth_bound = match strategy {
            TraversalStrategy::DeviceBlast => self.config.max_depth_device_blast,
            _ => self.config.max_depth_default,
        };

        let StrategyOutput { direct, bfs } = match strategy {
            TraversalStrategy::RuleScope => rule_scope(graph, &known, depth_bound),
            TraversalStrategy::RuleScopeReverse => rule_scope_reverse(graph, &known, depth_bound),
            TraversalStrategy::VlanFanout => vlan_fanout(graph, &known, depth_bound),
            TraversalStrategy::InterfaceFanout => interface_fanout(graph, &known, depth_bound),
            TraversalStrategy::DeviceBlast => device_blast(graph, &known, depth_bound),
            TraversalStrategy::CloudSgScope => cloud_sg_scope(graph, &known, depth_bound),
        };

        let direct_set: HashSet<NodeId> = direct.iter().cloned().collect();
        let mut indirectly_impacted = Vec::new();
        let mut affected_applications = Vec::new();
        let mut affected_services = Vec::new();
        let mut affected_vlans = Vec::new();
        let mut redundant_applications = Vec::new();
        let mut max_criticality: Option<Criticality> = None;
        let mut critical_paths = Vec::new();

        for id in bfs.visited.keys() {
            if direct_set.contains(id) {
                continue;
            }
            let Some(node) = data.node(id) else { continue };
            match &node.kind {
                NodeKind::Application => {
                    affected_applications.push(id.clone());
                    if has_redundant_path(graph, id, &direct_set) {
                        redundant_applications.push(id.clone());
                    }
                }
                NodeKind::Service => {
                    affected_services.push(id.clone());
                    if has_redundant_path(graph, id, &direct_set) {
                        redundant_applications.push(id.clone());
                    }
                }
                NodeKind::Vlan { .. } => affected_vlans.push(id.clone()),
                _ => {}
            }
            indirectly_impacted.push(id.clone());

            if let Some(criticality) = node.criticality {
                if criticality >= Criticality::High {
                    max_criticality = Some(max_criticality.map_or(criticality, |c| c.max(criticality)));
                    let path = bfs.path_to(id);
                    critical_paths.push(CriticalPath {
                        criticality,
                        hops: path.len().saturating_sub(1) as u32,
                        nodes: path.iter().map(|(n, _)| n.clone()).collect(),
                        edges: path.iter().filter_map(|(_, e)| *e).collect(),
                        reasoning: None,
                    });
                }
            }
        }

        // Sort critical paths by hops then the tie-break rank of their
        // final edge, matching the traversal's own ordering (spec §4.I).
        critical_paths.sort_by_key(|p| {
            let last_rank = p.edges.last().map(|e| e.tie_break_rank()).unwrap_or(u8::MAX);
            (p.hops, last_rank)
        });

        let total_dependency_count = bfs
            .visited
            .iter()
            .filter(|(_, record)| record.via_edge == Some(EdgeKind::DependsOn))
            .count();

        let traversal_strategy = strategy;
        info!(
            ?action,
            direct = direct_set.len(),
            indirect = indirectly_impacted.len(),
            ?traversal_strategy,
            "impact analysis complete"
        );

        Ok(ImpactSnapshot {
            directly_impacted: direct,
            indirectly_impacted,
            affected_applications,
            affected_services,
            affected_vlans,
            critical_paths,
            total_dependency_count,
            max_criticality,
            traversal_strategy,
            redundant_applications,
            unknown_targets: unknown,
        })
    }
}
