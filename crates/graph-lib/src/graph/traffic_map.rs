//! Traffic map: the shared node/edge structure mutated by appenders
//!
//! Nodes are stored in a concurrent map keyed by node ID. Each node owns its
//! outgoing edges, so an edge's metadata is only ever touched while the
//! source node's entry is locked.

use super::identity::{GraphType, NodeIdentity, NodeKind};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Free-form node/edge metadata (rates, protocol, derived values)
pub type Metadata = BTreeMap<String, Value>;

/// A directed edge owned by its source node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub dest: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Edge {
    pub fn new(source: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            metadata: Metadata::new(),
        }
    }

    /// Read a numeric metadata value
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(Value::as_f64)
    }
}

/// A graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workload: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    /// Build a node from telemetry attributes, resolving its ID
    pub fn from_identity(identity: &NodeIdentity<'_>, graph_type: GraphType) -> Self {
        let (id, kind) = identity.resolve(graph_type);
        let namespace = if super::identity::is_ok(identity.workload_namespace) {
            identity.workload_namespace
        } else {
            identity.service_namespace
        };

        Self {
            id,
            kind,
            namespace: namespace.to_string(),
            workload: identity.workload.to_string(),
            app: identity.app.to_string(),
            version: identity.version.to_string(),
            service: identity.service.to_string(),
            edges: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Find the outgoing edge to `dest`
    pub fn edge(&self, dest: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.dest == dest)
    }
}

/// One mesh snapshot for a fixed time window, keyed by node ID
#[derive(Debug, Default)]
pub struct TrafficMap {
    nodes: DashMap<String, Node>,
}

impl TrafficMap {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::new(),
        }
    }

    /// Build a traffic map from a list of nodes (later duplicates replace earlier ones)
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let map = Self::new();
        for node in nodes {
            map.insert_node(node);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert a node, replacing any node with the same ID
    pub fn insert_node(&self, mut node: Node) -> Option<Node> {
        // edges are owned by their source
        for edge in node.edges.iter_mut() {
            if edge.source != node.id {
                edge.source = node.id.clone();
            }
        }
        self.nodes.insert(node.id.clone(), node)
    }

    /// Add the node described by `identity` unless it already exists; returns its ID
    pub fn add_node(&self, identity: &NodeIdentity<'_>, graph_type: GraphType) -> String {
        let node = Node::from_identity(identity, graph_type);
        let id = node.id.clone();
        self.nodes.entry(id.clone()).or_insert(node);
        id
    }

    /// Cloned view of a node
    pub fn node(&self, id: &str) -> Option<Node> {
        self.nodes.get(id).map(|r| r.clone())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Add an edge between two existing nodes.
    ///
    /// Returns false if either node is missing. Adding an existing pair is a no-op.
    pub fn add_edge(&self, source: &str, dest: &str) -> bool {
        if !self.contains_node(dest) {
            return false;
        }
        match self.nodes.get_mut(source) {
            Some(mut node) => {
                if node.edge(dest).is_none() {
                    node.edges.push(Edge::new(source, dest));
                }
                true
            }
            None => false,
        }
    }

    pub fn has_edge(&self, source: &str, dest: &str) -> bool {
        self.nodes
            .get(source)
            .map(|node| node.edge(dest).is_some())
            .unwrap_or(false)
    }

    /// Total number of edges in the map
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|r| r.edges.len()).sum()
    }

    /// Read a metadata value from the edge `source -> dest`
    pub fn edge_metadata(&self, source: &str, dest: &str, key: &str) -> Option<Value> {
        self.nodes
            .get(source)
            .and_then(|node| node.edge(dest).and_then(|e| e.metadata.get(key).cloned()))
    }

    /// Visit every edge mutably.
    ///
    /// Only one node entry is locked at a time, and each edge is handed to the
    /// closure under that lock, so metadata writes never interleave with a
    /// concurrent writer on the same node. The closure must not access `self`.
    pub fn for_each_edge_mut<F>(&self, mut f: F)
    where
        F: FnMut(&mut Edge),
    {
        for mut node in self.nodes.iter_mut() {
            for edge in node.edges.iter_mut() {
                f(edge);
            }
        }
    }

    /// Nodes sorted by ID
    pub fn snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|r| r.value().clone()).collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Drop edges whose destination is not in the map
    pub fn prune_dangling_edges(&self) -> usize {
        let ids: std::collections::HashSet<String> =
            self.nodes.iter().map(|r| r.key().clone()).collect();
        let mut removed = 0;
        for mut node in self.nodes.iter_mut() {
            let before = node.edges.len();
            node.edges.retain(|e| ids.contains(&e.dest));
            removed += before - node.edges.len();
        }
        if removed > 0 {
            debug!(removed, "Pruned edges to missing nodes");
        }
        removed
    }
}

impl Serialize for TrafficMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TrafficMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nodes = Vec::<Node>::deserialize(deserializer)?;
        Ok(TrafficMap::from_nodes(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bookinfo() -> (TrafficMap, String, String) {
        let map = TrafficMap::new();
        let product = map.add_node(
            &NodeIdentity::workload(
                "bookinfo",
                "productpage",
                "productpage-v1",
                "productpage",
                "v1",
            ),
            GraphType::Workload,
        );
        let reviews = map.add_node(
            &NodeIdentity::workload("bookinfo", "reviews", "reviews-v1", "reviews", "v1"),
            GraphType::Workload,
        );
        (map, product, reviews)
    }

    #[test]
    fn test_add_node_deduplicates_by_id() {
        let (map, product, _) = bookinfo();
        let again = map.add_node(
            &NodeIdentity::workload("bookinfo", "", "productpage-v1", "productpage", "v1"),
            GraphType::Workload,
        );
        assert_eq!(product, again);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_add_edge_requires_both_nodes() {
        let (map, product, reviews) = bookinfo();
        assert!(map.add_edge(&product, &reviews));
        assert!(map.add_edge(&product, &reviews));
        assert_eq!(map.edge_count(), 1);

        assert!(!map.contains_node("wl_bookinfo_missing"));
        assert!(!map.add_edge(&product, "wl_bookinfo_missing"));
        assert!(!map.add_edge("wl_bookinfo_missing", &reviews));
        assert!(!map.has_edge(&reviews, &product));
        assert!(!map.contains_node("wl_bookinfo_missing"));
    }

    #[test]
    fn test_for_each_edge_mut_writes_metadata() {
        let (map, product, reviews) = bookinfo();
        map.add_edge(&product, &reviews);

        map.for_each_edge_mut(|edge| {
            edge.metadata.insert("protocol".to_string(), json!("http"));
        });

        assert_eq!(
            map.edge_metadata(&product, &reviews, "protocol"),
            Some(json!("http"))
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (map, product, reviews) = bookinfo();
        map.add_edge(&product, &reviews);

        let json = serde_json::to_string(&map).unwrap();
        let restored: TrafficMap = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.snapshot(), map.snapshot());
        assert!(restored.has_edge(&product, &reviews));
    }

    #[test]
    fn test_prune_dangling_edges() {
        let (map, product, reviews) = bookinfo();
        let mut node = map.node(&product).unwrap();
        node.edges.push(Edge::new(&product, "wl_bookinfo_gone"));
        node.edges.push(Edge::new(&product, &reviews));
        map.insert_node(node);

        assert_eq!(map.prune_dangling_edges(), 1);
        assert_eq!(map.edge_count(), 1);
    }
}
