// strategy.rs — per-action traversal strategies (spec §4.I's table).
//
// Each strategy walks the graph from the change's direct targets and
// returns the set of nodes the walk reached, keyed through a `BfsResult`
// so the analyzer can still reconstruct critical paths. The shape mirrors
// `cie-graph`'s own `bfs_bounded`/`bfs_bounded_reverse` split: forward
// traversals follow `DEPENDS_ON`/`CONNECTS_TO` outward from what changed,
// reverse traversals answer "what depends on this" by walking incoming
// edges.

use std::collections::HashSet;

use cie_core::NodeId;
use cie_graph::{bfs_bounded, bfs_bounded_reverse, BfsResult, EdgeKind, GraphSnapshot};

use crate::snapshot::TraversalStrategy;

/// What a single strategy run found: the nodes counted as *direct*
/// targets (empty for purely-additive strategies like `add_rule`) plus
/// the full BFS visit record used for everything else.
pub struct StrategyOutput {
    pub direct: Vec<NodeId>,
    pub bfs: BfsResult,
}

/// Maps a change action to the strategy spec §4.I's table assigns it.
pub fn strategy_for(action: cie_core::ChangeAction) -> TraversalStrategy {
    use cie_core::ChangeAction::*;
    match action {
        AddRule => TraversalStrategy::RuleScope,
        RemoveRule | ModifyRule | DisableRule => TraversalStrategy::RuleScopeReverse,
        DeleteVlan | ModifyVlan | ChangeVlan => TraversalStrategy::VlanFanout,
        DisablePort | EnablePort | ShutdownInterface => TraversalStrategy::InterfaceFanout,
        Decommission | RebootDevice | FirmwareUpgrade => TraversalStrategy::DeviceBlast,
        ModifySg | DeleteSg => TraversalStrategy::CloudSgScope,
        // ConfigChange has no entry in the table; treat it like the
        // broadest device-local strategy rather than silently no-op.
        ConfigChange => TraversalStrategy::DeviceBlast,
    }
}

/// `add_rule`: additive. From the target Device, follow `HAS_RULE` then
/// `PROTECTS` (bounded depth 2) to find newly-reachable applications.
/// Direct set is empty per spec — this strategy only ever produces
/// indirect impact.
pub fn rule_scope(snapshot: &GraphSnapshot, targets: &[NodeId], depth_bound: u32) -> StrategyOutput {
    let bfs = bfs_bounded(snapshot, targets, depth_bound, |k| {
        matches!(k, EdgeKind::HasRule | EdgeKind::Protects)
    });
    StrategyOutput {
        direct: Vec::new(),
        bfs,
    }
}

/// `remove_rule`/`disable_rule`/`modify_rule`: from the Rule (or the
/// Device hosting it), list every `PROTECTS` endpoint and its transitive
/// `DEPENDS_ON` closure.
pub fn rule_scope_reverse(
    snapshot: &GraphSnapshot,
    targets: &[NodeId],
    depth_bound: u32,
) -> StrategyOutput {
    let protected = bfs_bounded(snapshot, targets, 1, |k| {
        matches!(k, EdgeKind::HasRule | EdgeKind::Protects)
    });
    let endpoints: Vec<NodeId> = protected
        .visited
        .keys()
        .filter(|id| !targets.contains(id))
        .cloned()
        .collect();
    let bfs = bfs_bounded(snapshot, &endpoints, depth_bound, |k| {
        matches!(k, EdgeKind::DependsOn)
    });
    StrategyOutput {
        direct: targets.to_vec(),
        bfs: merge_bfs(protected, bfs),
    }
}

/// `delete_vlan`/`modify_vlan`/`change_vlan`: VLAN → `MEMBER_OF` Interfaces
/// → parent Devices → applications depending on those devices.
///
/// `MEMBER_OF` and `HAS_INTERFACE` both point away from the VLAN/device
/// they describe (interface→vlan, device→interface per spec §3.1), so
/// walking from the VLAN outward to its members and then to their owning
/// devices means following each edge kind against its stored direction —
/// `bfs_bounded_reverse`, not `bfs_bounded`, at both hops.
pub fn vlan_fanout(snapshot: &GraphSnapshot, targets: &[NodeId], depth_bound: u32) -> StrategyOutput {
    let members = bfs_bounded_reverse(snapshot, targets, 1, |k| matches!(k, EdgeKind::MemberOf));
    let interface_ids: Vec<NodeId> = members
        .visited
        .keys()
        .filter(|id| !targets.contains(id))
        .cloned()
        .collect();
    let owning_devices = bfs_bounded_reverse(snapshot, &interface_ids, 1, |k| {
        matches!(k, EdgeKind::HasInterface)
    });
    let device_ids: Vec<NodeId> = owning_devices
        .visited
        .keys()
        .filter(|id| !interface_ids.contains(id) && !targets.contains(id))
        .cloned()
        .collect();
    let dependents = bfs_bounded_reverse(snapshot, &device_ids, depth_bound, |k| {
        matches!(k, EdgeKind::DependsOn)
    });
    StrategyOutput {
        direct: targets.to_vec(),
        bfs: merge_bfs(merge_bfs(members, owning_devices), dependents),
    }
}

/// `disable_port`/`enable_port`/`shutdown_interface`: Interface/Port →
/// parent Device → downstream `CONNECTS_TO` neighbors → dependent
/// services.
pub fn interface_fanout(
    snapshot: &GraphSnapshot,
    targets: &[NodeId],
    depth_bound: u32,
) -> StrategyOutput {
    let devices = bfs_bounded_reverse(snapshot, targets, 1, |k| {
        matches!(k, EdgeKind::HasInterface)
    });
    let device_ids: Vec<NodeId> = devices
        .visited
        .keys()
        .filter(|id| !targets.contains(id))
        .cloned()
        .collect();
    let neighbors = bfs_bounded(snapshot, &device_ids, depth_bound, |k| {
        matches!(k, EdgeKind::ConnectsTo)
    });
    let dependents = bfs_bounded_reverse(
        snapshot,
        &neighbors.visited.keys().cloned().collect::<Vec<_>>(),
        depth_bound,
        |k| matches!(k, EdgeKind::DependsOn),
    );
    StrategyOutput {
        direct: targets.to_vec(),
        bfs: merge_bfs(merge_bfs(devices, neighbors), dependents),
    }
}

/// `decommission`/`reboot_device`/`firmware_upgrade`: Device's
/// `HAS_INTERFACE`/`HAS_RULE`/`HAS_VLAN` children, `CONNECTS_TO`-reachable
/// devices up to `depth_bound`, and every application whose dependency
/// path traverses the device.
pub fn device_blast(snapshot: &GraphSnapshot, targets: &[NodeId], depth_bound: u32) -> StrategyOutput {
    let owned = bfs_bounded(snapshot, targets, 1, |k| {
        matches!(k, EdgeKind::HasInterface | EdgeKind::HasRule | EdgeKind::HasVlan)
    });
    let reachable_devices = bfs_bounded(snapshot, targets, depth_bound, |k| {
        matches!(k, EdgeKind::ConnectsTo)
    });
    let dependents = bfs_bounded_reverse(snapshot, targets, depth_bound, |k| {
        matches!(k, EdgeKind::DependsOn)
    });
    StrategyOutput {
        direct: targets.to_vec(),
        bfs: merge_bfs(merge_bfs(owned, reachable_devices), dependents),
    }
}

/// `modify_sg`/`delete_sg`: cloud security group → protected workloads →
/// dependent services.
pub fn cloud_sg_scope(
    snapshot: &GraphSnapshot,
    targets: &[NodeId],
    depth_bound: u32,
) -> StrategyOutput {
    let protected = bfs_bounded(snapshot, targets, 1, |k| matches!(k, EdgeKind::Protects));
    let workloads: Vec<NodeId> = protected
        .visited
        .keys()
        .filter(|id| !targets.contains(id))
        .cloned()
        .collect();
    let dependents = bfs_bounded_reverse(snapshot, &workloads, depth_bound, |k| {
        matches!(k, EdgeKind::DependsOn)
    });
    StrategyOutput {
        direct: targets.to_vec(),
        bfs: merge_bfs(protected, dependents),
    }
}

/// Whether `app` has a `DEPENDS_ON` path to some device that never
/// passes through `excluded` — the "independent path" redundancy check
/// spec §4.I asks for before classifying an app as directly affected.
pub fn has_redundant_path(
    snapshot: &GraphSnapshot,
    app: &NodeId,
    excluded: &HashSet<NodeId>,
) -> bool {
    let data = snapshot.data();
    let mut visited = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(app.clone());
    visited.insert(app.clone());

    while let Some(current) = queue.pop_front() {
        for edge in data.out_edges(&current, Some(EdgeKind::DependsOn)) {
            if excluded.contains(&edge.target) {
                continue;
            }
            if let Some(node) = data.node(&edge.target) {
                if node.is_device() {
                    return true;
                }
            }
            if visited.insert(edge.target.clone()) {
                queue.push_back(edge.target.clone());
            }
        }
    }
    false
}

/// Merge two BFS results reached by chained traversals into one combined
/// visit record, keeping the earlier result's breadcrumbs where both
/// reached the same node (the first pass is closer to the original
/// root).
fn merge_bfs(mut first: BfsResult, second: BfsResult) -> BfsResult {
    for (id, record) in second.visited {
        first.visited.entry(id).or_insert(record);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::Criticality;
    use cie_graph::{GraphMutation, GraphStore, Node, NodeKind};

    fn seed(mutations: Vec<GraphMutation>) -> GraphStore {
        let store = GraphStore::new(2);
        store.seed(&mutations).expect("seed should succeed");
        store
    }

    fn upsert(node: Node) -> GraphMutation {
        GraphMutation::UpsertNode {
            id: node.id.clone(),
            kind: node.kind,
            environment: node.environment,
            criticality: node.criticality,
        }
    }

    fn edge(kind: EdgeKind, from: &str, to: &str) -> GraphMutation {
        GraphMutation::UpsertEdge {
            kind,
            source: NodeId::from(from),
            target: NodeId::from(to),
            properties: serde_json::Value::Null,
        }
    }

    #[test]
    fn rule_scope_is_additive_with_empty_direct_set() {
        let store = seed(vec![
            upsert(Node::new("dev-1", NodeKind::Device {
                device_kind: cie_graph::DeviceKind::Firewall,
                vendor: "acme".into(),
                model: "x".into(),
            })),
            upsert(Node::new("rule-1", NodeKind::Rule {
                src: "any".into(),
                dst: "any".into(),
                service: "tcp/443".into(),
                action: "allow".into(),
                is_any_any: false,
            })),
            upsert(Node::new("app-1", NodeKind::Application)),
            edge(EdgeKind::HasRule, "dev-1", "rule-1"),
            edge(EdgeKind::Protects, "rule-1", "app-1"),
        ]);
        let snapshot = store.snapshot();
        let targets = vec![NodeId::from("dev-1")];
        let out = rule_scope(&snapshot, &targets, 2);
        assert!(out.direct.is_empty());
        assert!(out.bfs.visited.contains_key(&NodeId::from("app-1")));
    }

    #[test]
    fn device_blast_reaches_dependents_and_owned_children() {
        let store = seed(vec![
            upsert(Node::new("dev-1", NodeKind::Device {
                device_kind: cie_graph::DeviceKind::Switch,
                vendor: "acme".into(),
                model: "x".into(),
            })),
            upsert(Node::new("if-1", NodeKind::Interface)),
            upsert(
                Node::new("app-1", NodeKind::Application).with_criticality(Criticality::Critical),
            ),
            edge(EdgeKind::HasInterface, "dev-1", "if-1"),
            edge(EdgeKind::DependsOn, "app-1", "dev-1"),
        ]);
        let snapshot = store.snapshot();
        let targets = vec![NodeId::from("dev-1")];
        let out = device_blast(&snapshot, &targets, 3);
        assert!(out.bfs.visited.contains_key(&NodeId::from("if-1")));
        assert!(out.bfs.visited.contains_key(&NodeId::from("app-1")));
    }

    #[test]
    fn redundant_path_ignores_excluded_device() {
        let store = seed(vec![
            upsert(Node::new("dev-1", NodeKind::Device {
                device_kind: cie_graph::DeviceKind::Switch,
                vendor: "acme".into(),
                model: "x".into(),
            })),
            upsert(Node::new("dev-2", NodeKind::Device {
                device_kind: cie_graph::DeviceKind::Switch,
                vendor: "acme".into(),
                model: "x".into(),
            })),
            upsert(Node::new("app-1", NodeKind::Application)),
            edge(EdgeKind::DependsOn, "app-1", "dev-1"),
            edge(EdgeKind::DependsOn, "app-1", "dev-2"),
        ]);
        let snapshot = store.snapshot();
        let mut excluded = HashSet::new();
        excluded.insert(NodeId::from("dev-1"));
        assert!(has_redundant_path(&snapshot, &NodeId::from("app-1"), &excluded));

        excluded.insert(NodeId::from("dev-2"));
        assert!(!has_redundant_path(&snapshot, &NodeId::from("app-1"), &excluded));
    }
}
