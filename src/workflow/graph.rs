//! Graph Model
//!
//! Normalizes node and edge lists into adjacency maps and finds the
//! trigger nodes a run starts from.

use std::collections::{HashMap, HashSet};

use log::debug;

use super::model::{Edge, Node, NodeKind};

/// Successor and predecessor lists keyed by raw node id.
///
/// Edges whose endpoints do not name an existing node are dropped.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    by_source: HashMap<String, Vec<String>>,
    by_target: HashMap<String, Vec<String>>,
}

impl Adjacency {
    /// Nodes directly reachable from `id`, in edge order.
    pub fn successors(&self, id: &str) -> &[String] {
        self.by_source.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with an edge into `id`, in edge order.
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.by_target.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if any edge points at `id`.
    pub fn has_incoming(&self, id: &str) -> bool {
        !self.predecessors(id).is_empty()
    }

    /// Number of edges kept.
    pub fn edge_count(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }
}

/// Builds the successor/predecessor maps for a graph.
pub fn build_adjacency(nodes: &[Node], edges: &[Edge]) -> Adjacency {
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut adjacency = Adjacency::default();

    for edge in edges {
        if !known.contains(edge.source.as_str()) || !known.contains(edge.target.as_str()) {
            debug!(
                "Ignoring edge '{}' ({} -> {}): unknown endpoint",
                edge.id, edge.source, edge.target
            );
            continue;
        }

        adjacency
            .by_source
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
        adjacency
            .by_target
            .entry(edge.target.clone())
            .or_default()
            .push(edge.source.clone());
    }

    adjacency
}

/// Returns the ids of trigger nodes without incoming edges, in node order.
pub fn find_root_triggers(nodes: &[Node], edges: &[Edge]) -> Vec<String> {
    let adjacency = build_adjacency(nodes, edges);
    root_triggers(nodes, &adjacency)
}

/// Same as [`find_root_triggers`] for an already built adjacency.
pub fn root_triggers(nodes: &[Node], adjacency: &Adjacency) -> Vec<String> {
    nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Trigger && !adjacency.has_incoming(&n.id))
        .map(|n| n.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes() -> Vec<Node> {
        vec![
            Node::trigger("t"),
            Node::action("a", "HTTP Request"),
            Node::action("b", "HTTP Request"),
        ]
    }

    #[test]
    fn test_build_adjacency() {
        let edges = vec![Edge::new("t", "a"), Edge::new("t", "b"), Edge::new("a", "b")];
        let adjacency = build_adjacency(&nodes(), &edges);

        assert_eq!(adjacency.successors("t"), ["a", "b"]);
        assert_eq!(adjacency.predecessors("b"), ["t", "a"]);
        assert!(adjacency.successors("b").is_empty());
        assert_eq!(adjacency.edge_count(), 3);
    }

    #[test]
    fn test_dangling_edges_are_dropped() {
        let edges = vec![Edge::new("t", "missing"), Edge::new("ghost", "a")];
        let adjacency = build_adjacency(&nodes(), &edges);

        assert_eq!(adjacency.edge_count(), 0);
        assert!(!adjacency.has_incoming("a"));
    }

    #[test]
    fn test_find_root_triggers() {
        let mut all = nodes();
        all.push(Node::trigger("t2"));
        all.push(Node::trigger("fed"));
        let edges = vec![Edge::new("t", "a"), Edge::new("a", "fed")];

        assert_eq!(find_root_triggers(&all, &edges), vec!["t", "t2"]);
    }

    #[test]
    fn test_no_triggers() {
        let all = vec![Node::action("a", "Loop")];
        assert!(find_root_triggers(&all, &[]).is_empty());
        assert!(find_root_triggers(&[], &[]).is_empty());
    }

    #[test]
    fn test_cyclic_triggers_are_not_roots() {
        let all = vec![Node::trigger("x"), Node::trigger("y")];
        let edges = vec![Edge::new("x", "y"), Edge::new("y", "x")];
        assert!(find_root_triggers(&all, &edges).is_empty());
    }
}
