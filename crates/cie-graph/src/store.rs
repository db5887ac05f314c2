// store.rs — GraphStore: the topology graph's owning store, plus the
// traversal primitives `cie-impact` builds its per-action strategies on.
//
// The committed graph lives behind an `Arc<GraphData>` under an `RwLock`
// (spec §5.1/§5.2): `snapshot()` clones the `Arc` cheaply and hands back a
// `GraphSnapshot` an in-flight impact analysis can keep reading from even
// as a later sync commits a brand new `Arc<GraphData>`. This is the
// MVCC-equivalent "readers never block writers" contract, built the way
// `ta-changeset`'s `DependencyGraph` builds its adjacency maps but with a
// swappable, immutable-once-published generation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use cie_core::{Criticality, Environment, NodeId};
use tracing::debug;

use crate::edge::{Edge, EdgeKind};
use crate::error::GraphError;
use crate::mutation::GraphMutation;
use crate::node::{Node, NodeKind};

/// One generation of the committed topology: nodes plus forward/reverse
/// adjacency, keyed by node id (spec §9: "explicit identifiers, no direct
/// references").
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    nodes: HashMap<NodeId, Node>,
    out_edges: HashMap<NodeId, Vec<Edge>>,
    in_edges: HashMap<NodeId, Vec<Edge>>,
    edge_identities: HashSet<(EdgeKind, NodeId, NodeId)>,
}

impl GraphData {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_identities.len()
    }

    /// Outgoing edges from `id`, optionally filtered to a single kind.
    pub fn out_edges(&self, id: &NodeId, kind: Option<EdgeKind>) -> Vec<&Edge> {
        self.out_edges
            .get(id)
            .into_iter()
            .flatten()
            .filter(|e| kind.map(|k| e.kind == k).unwrap_or(true))
            .collect()
    }

    /// Incoming edges to `id`, optionally filtered to a single kind.
    pub fn in_edges(&self, id: &NodeId, kind: Option<EdgeKind>) -> Vec<&Edge> {
        self.in_edges
            .get(id)
            .into_iter()
            .flatten()
            .filter(|e| kind.map(|k| e.kind == k).unwrap_or(true))
            .collect()
    }

    fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if let NodeKind::Vlan { vlan_id, .. } = &node.kind {
            if let Some(conflict) = self.find_vlan_conflict(*vlan_id, node.environment, &node.id) {
                return Err(GraphError::DuplicateVlanId {
                    vlan_id: *vlan_id,
                    environment: conflict,
                });
            }
        }
        self.out_edges.entry(node.id.clone()).or_default();
        self.in_edges.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    fn find_vlan_conflict(
        &self,
        vlan_id: u16,
        environment: Option<Environment>,
        excluding: &NodeId,
    ) -> Option<Environment> {
        self.nodes.values().find_map(|n| match &n.kind {
            NodeKind::Vlan { vlan_id: existing, .. }
                if *existing == vlan_id && &n.id != excluding && n.environment == environment =>
            {
                environment
            }
            _ => None,
        })
    }

    fn insert_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if !self.contains_node(&edge.source) {
            return Err(GraphError::DanglingEdge(edge.source.clone()));
        }
        if !self.contains_node(&edge.target) {
            return Err(GraphError::DanglingEdge(edge.target.clone()));
        }
        let identity = edge.identity();
        if self.edge_identities.contains(&identity) {
            // Idempotent upsert: replace the existing edge's properties.
            if let Some(existing) = self
                .out_edges
                .get_mut(&edge.source)
                .and_then(|edges| edges.iter_mut().find(|e| e.identity() == identity))
            {
                existing.properties = edge.properties.clone();
            }
            if let Some(existing) = self
                .in_edges
                .get_mut(&edge.target)
                .and_then(|edges| edges.iter_mut().find(|e| e.identity() == identity))
            {
                existing.properties = edge.properties;
            }
            return Ok(());
        }
        self.edge_identities.insert(identity);
        self.out_edges.entry(edge.source.clone()).or_default().push(edge.clone());
        self.in_edges.entry(edge.target.clone()).or_default().push(edge);
        Ok(())
    }

    fn remove_node(&mut self, id: &NodeId) {
        self.nodes.remove(id);
        if let Some(edges) = self.out_edges.remove(id) {
            for edge in &edges {
                self.edge_identities.remove(&edge.identity());
                if let Some(targets) = self.in_edges.get_mut(&edge.target) {
                    targets.retain(|e| &e.source != id);
                }
            }
        }
        if let Some(edges) = self.in_edges.remove(id) {
            for edge in &edges {
                self.edge_identities.remove(&edge.identity());
                if let Some(sources) = self.out_edges.get_mut(&edge.source) {
                    sources.retain(|e| &e.target != id);
                }
            }
        }
    }

    fn owners_of(&self, edge_kind: EdgeKind, id: &NodeId) -> usize {
        self.in_edges(id, Some(edge_kind)).len()
    }

    /// Recompute `is_core` on every Device: core iff it lies on at least
    /// `k` distinct shortest paths between critical Applications and the
    /// devices their dependency chain terminates at (spec §3.1 invariant
    /// 6, the "Core device" glossary entry).
    fn recompute_core_devices(&mut self, k: u32) {
        let mut path_counts: HashMap<NodeId, u32> = HashMap::new();
        let critical_apps: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| {
                matches!(n.kind, NodeKind::Application)
                    && n.criticality == Some(Criticality::Critical)
            })
            .map(|n| n.id.clone())
            .collect();

        for app_id in &critical_apps {
            for device_id in self.shortest_path_devices(app_id) {
                *path_counts.entry(device_id).or_insert(0) += 1;
            }
        }

        for (id, node) in self.nodes.iter_mut() {
            if node.is_device() {
                node.is_core = path_counts.get(id).copied().unwrap_or(0) >= k;
            }
        }
    }

    /// Devices on the shortest `DEPENDS_ON` chain from `app_id` down to the
    /// devices ultimately serving it.
    fn shortest_path_devices(&self, app_id: &NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(app_id.clone());
        visited.insert(app_id.clone());
        let mut devices = Vec::new();

        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.node(&current) {
                if node.is_device() && &current != app_id {
                    devices.push(current.clone());
                    continue; // devices terminate the dependency chain
                }
            }
            for edge in self.out_edges(&current, Some(EdgeKind::DependsOn)) {
                if visited.insert(edge.target.clone()) {
                    queue.push_back(edge.target.clone());
                }
            }
        }
        devices
    }
}

/// A cheap-to-clone handle on one committed generation of the graph,
/// insulating an in-flight impact analysis from concurrent syncs (spec
/// §5.2, §4.I's "graph sync never invalidates in-flight change
/// snapshots").
#[derive(Debug, Clone)]
pub struct GraphSnapshot(pub(crate) Arc<GraphData>);

impl GraphSnapshot {
    pub fn data(&self) -> &GraphData {
        &self.0
    }
}

/// Record of a single BFS visit, used to reconstruct a critical path by
/// walking `parent` back to a root.
#[derive(Debug, Clone)]
pub struct BfsRecord {
    pub depth: u32,
    pub parent: Option<NodeId>,
    pub via_edge: Option<EdgeKind>,
}

/// The result of a bounded BFS: every node reached, with enough
/// breadcrumbs to reconstruct the path that reached it.
#[derive(Debug, Clone, Default)]
pub struct BfsResult {
    pub visited: HashMap<NodeId, BfsRecord>,
}

impl BfsResult {
    /// Reconstruct the path from the BFS root to `target`, ordered
    /// root-first, as `(node, via_edge)` pairs (the edge field on the
    /// root is `None`).
    pub fn path_to(&self, target: &NodeId) -> Vec<(NodeId, Option<EdgeKind>)> {
        let mut path = Vec::new();
        let mut current = target.clone();
        loop {
            let record = match self.visited.get(&current) {
                Some(r) => r,
                None => break,
            };
            path.push((current.clone(), record.via_edge));
            match &record.parent {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }
        path.reverse();
        path
    }
}

/// Breadth-first search over `snapshot`, starting from `roots`, bounded
/// to `depth_bound` hops, expanding only edges `kind_filter` accepts
/// (`None` accepts every kind). Ties on equal-length paths to the same
/// node are broken by `EdgeKind::tie_break_rank` per spec §4.I.
pub fn bfs_bounded(
    snapshot: &GraphSnapshot,
    roots: &[NodeId],
    depth_bound: u32,
    kind_filter: impl Fn(EdgeKind) -> bool,
) -> BfsResult {
    bfs_generic(snapshot, roots, depth_bound, kind_filter, |data, id| {
        data.out_edges(id, None)
            .into_iter()
            .map(|e| (e.target.clone(), e.kind))
            .collect()
    })
}

/// Breadth-first search against the reverse adjacency (incoming edges):
/// useful for "who depends on this" traversals such as `vlan_fanout` and
/// `interface_fanout`, where the roots are the things changed and the
/// question is which applications/services ultimately rely on them.
pub fn bfs_bounded_reverse(
    snapshot: &GraphSnapshot,
    roots: &[NodeId],
    depth_bound: u32,
    kind_filter: impl Fn(EdgeKind) -> bool,
) -> BfsResult {
    bfs_generic(snapshot, roots, depth_bound, kind_filter, |data, id| {
        data.in_edges(id, None)
            .into_iter()
            .map(|e| (e.source.clone(), e.kind))
            .collect()
    })
}

fn bfs_generic(
    snapshot: &GraphSnapshot,
    roots: &[NodeId],
    depth_bound: u32,
    kind_filter: impl Fn(EdgeKind) -> bool,
    neighbors_of: impl Fn(&GraphData, &NodeId) -> Vec<(NodeId, EdgeKind)>,
) -> BfsResult {
    let data = snapshot.data();
    let mut result = BfsResult::default();
    let mut queue = VecDeque::new();

    for root in roots {
        result.visited.insert(
            root.clone(),
            BfsRecord {
                depth: 0,
                parent: None,
                via_edge: None,
            },
        );
        queue.push_back(root.clone());
    }

    while let Some(current) = queue.pop_front() {
        let current_depth = result.visited[&current].depth;
        if current_depth >= depth_bound {
            continue;
        }
        for (neighbor, edge_kind) in neighbors_of(data, &current) {
            if !kind_filter(edge_kind) {
                continue;
            }
            let candidate_depth = current_depth + 1;
            let better = match result.visited.get(&neighbor) {
                None => true,
                Some(existing) if existing.depth > candidate_depth => true,
                Some(existing) if existing.depth == candidate_depth => {
                    let existing_rank = existing.via_edge.map(EdgeKind::tie_break_rank);
                    match existing_rank {
                        Some(r) => edge_kind.tie_break_rank() < r,
                        None => true,
                    }
                }
                _ => false,
            };
            if better {
                result.visited.insert(
                    neighbor.clone(),
                    BfsRecord {
                        depth: candidate_depth,
                        parent: Some(current.clone()),
                        via_edge: Some(edge_kind),
                    },
                );
                queue.push_back(neighbor);
            }
        }
    }

    debug!(
        roots = roots.len(),
        visited = result.visited.len(),
        depth_bound,
        "bounded traversal complete"
    );
    result
}

/// The topology graph's owning store. Mutated only by the sync
/// coordinator or an administrative seed (spec §3.1 invariant 7).
pub struct GraphStore {
    committed: RwLock<Arc<GraphData>>,
    core_device_k: u32,
}

impl GraphStore {
    pub fn new(core_device_k: u32) -> Self {
        Self {
            committed: RwLock::new(Arc::new(GraphData::default())),
            core_device_k,
        }
    }

    /// A cheap-to-clone read handle on the current committed generation.
    pub fn snapshot(&self) -> GraphSnapshot {
        let guard = self.committed.read().expect("graph store lock poisoned");
        GraphSnapshot(Arc::clone(&guard))
    }

    /// Apply a batch of mutations transactionally: build the next
    /// generation from a clone of the current one, validate every
    /// invariant, and only then publish it. On failure the committed
    /// graph is left untouched (spec §7 `GraphInvariantViolation`).
    pub fn apply(&self, mutations: &[GraphMutation]) -> Result<(), GraphError> {
        let mut next = (**self.committed.read().expect("graph store lock poisoned")).clone();

        for mutation in mutations {
            match mutation.clone() {
                GraphMutation::UpsertNode {
                    id,
                    kind,
                    environment,
                    criticality,
                } => {
                    let mut node = Node::new(id, kind);
                    node.environment = environment;
                    node.criticality = criticality;
                    next.insert_node(node)?;
                }
                GraphMutation::UpsertEdge {
                    kind,
                    source,
                    target,
                    properties,
                } => {
                    next.insert_edge(Edge {
                        kind,
                        source,
                        target,
                        properties,
                    })?;
                }
                GraphMutation::Tombstone { id } => {
                    next.remove_node(&id);
                }
            }
        }

        self.validate_ownership_invariants(&next)?;
        next.recompute_core_devices(self.core_device_k);

        let mut guard = self.committed.write().expect("graph store lock poisoned");
        *guard = Arc::new(next);
        Ok(())
    }

    /// Administrative seed path, identical to `apply` — kept as a
    /// separate name per spec §6.2 ("a `GraphStore::seed(mutations)`
    /// administrative path exists for tests and local bring-up").
    pub fn seed(&self, mutations: &[GraphMutation]) -> Result<(), GraphError> {
        self.apply(mutations)
    }

    fn validate_ownership_invariants(&self, data: &GraphData) -> Result<(), GraphError> {
        for node in data.nodes.values() {
            match &node.kind {
                NodeKind::Rule { .. } => {
                    let owners = data.owners_of(EdgeKind::HasRule, &node.id);
                    if owners != 1 {
                        return Err(GraphError::AmbiguousOwnership {
                            kind: "rule",
                            id: node.id.clone(),
                            owner_count: owners,
                        });
                    }
                }
                NodeKind::Interface => {
                    let owners = data.owners_of(EdgeKind::HasInterface, &node.id);
                    if owners != 1 {
                        return Err(GraphError::AmbiguousOwnership {
                            kind: "interface",
                            id: node.id.clone(),
                            owner_count: owners,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cie_core::Environment;

    fn device(id: &str) -> GraphMutation {
        GraphMutation::UpsertNode {
            id: id.into(),
            kind: NodeKind::Device {
                device_kind: crate::node::DeviceKind::Firewall,
                vendor: "Acme".to_string(),
                model: "X1".to_string(),
            },
            environment: Some(Environment::Prod),
            criticality: Some(Criticality::High),
        }
    }

    fn app(id: &str, criticality: Criticality) -> GraphMutation {
        GraphMutation::UpsertNode {
            id: id.into(),
            kind: NodeKind::Application,
            environment: Some(Environment::Prod),
            criticality: Some(criticality),
        }
    }

    fn edge(kind: EdgeKind, src: &str, dst: &str) -> GraphMutation {
        GraphMutation::UpsertEdge {
            kind,
            source: src.into(),
            target: dst.into(),
            properties: serde_json::Value::Null,
        }
    }

    #[test]
    fn apply_rejects_dangling_edge_and_leaves_graph_untouched() {
        let store = GraphStore::new(2);
        store.apply(&[device("FW-1")]).unwrap();

        let result = store.apply(&[edge(EdgeKind::ConnectsTo, "FW-1", "FW-MISSING")]);
        assert!(result.is_err());
        assert_eq!(store.snapshot().data().node_count(), 1);
        assert_eq!(store.snapshot().data().edge_count(), 0);
    }

    #[test]
    fn apply_rejects_duplicate_vlan_in_same_environment() {
        let store = GraphStore::new(2);
        let vlan_a = GraphMutation::UpsertNode {
            id: "VLAN-A".into(),
            kind: NodeKind::Vlan { vlan_id: 20, name: "eng".to_string() },
            environment: Some(Environment::Prod),
            criticality: None,
        };
        let vlan_b = GraphMutation::UpsertNode {
            id: "VLAN-B".into(),
            kind: NodeKind::Vlan { vlan_id: 20, name: "eng-dup".to_string() },
            environment: Some(Environment::Prod),
            criticality: None,
        };
        store.apply(&[vlan_a]).unwrap();
        assert!(store.apply(&[vlan_b]).is_err());
    }

    #[test]
    fn sync_with_no_mutations_is_a_no_op() {
        let store = GraphStore::new(2);
        store.apply(&[device("FW-1")]).unwrap();
        let before = store.snapshot().data().node_count();
        store.apply(&[]).unwrap();
        assert_eq!(store.snapshot().data().node_count(), before);
    }

    #[test]
    fn snapshot_is_insulated_from_later_mutations() {
        let store = GraphStore::new(2);
        store.apply(&[device("FW-1")]).unwrap();
        let snapshot = store.snapshot();

        store.apply(&[device("FW-2")]).unwrap();

        assert_eq!(snapshot.data().node_count(), 1);
        assert_eq!(store.snapshot().data().node_count(), 2);
    }

    #[test]
    fn bfs_honors_depth_bound() {
        let store = GraphStore::new(2);
        store
            .apply(&[
                device("A"),
                device("B"),
                device("C"),
                device("D"),
                edge(EdgeKind::ConnectsTo, "A", "B"),
                edge(EdgeKind::ConnectsTo, "B", "C"),
                edge(EdgeKind::ConnectsTo, "C", "D"),
            ])
            .unwrap();

        let snapshot = store.snapshot();
        let result = bfs_bounded(&snapshot, &["A".into()], 2, |_| true);

        assert!(result.visited.contains_key(&NodeId::from("C")));
        assert!(!result.visited.contains_key(&NodeId::from("D")));
    }

    #[test]
    fn core_device_recomputed_after_k_shortest_paths() {
        let store = GraphStore::new(1);
        store
            .apply(&[
                device("CORE"),
                app("APP-1", Criticality::Critical),
                edge(EdgeKind::DependsOn, "APP-1", "CORE"),
            ])
            .unwrap();

        let snapshot = store.snapshot();
        let core = snapshot.data().node(&"CORE".into()).unwrap();
        assert!(core.is_core);
    }

    #[test]
    fn rule_must_belong_to_exactly_one_device() {
        let store = GraphStore::new(2);
        let rule = GraphMutation::UpsertNode {
            id: "RULE-1".into(),
            kind: NodeKind::Rule {
                src: "any".into(),
                dst: "any".into(),
                service: "https".into(),
                action: "allow".into(),
                is_any_any: true,
            },
            environment: Some(Environment::Prod),
            criticality: None,
        };
        // A rule with no owning device violates invariant 4.
        assert!(store.apply(&[rule]).is_err());
    }
}
