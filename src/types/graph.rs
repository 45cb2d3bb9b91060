//! The final belief graph: canonical records plus derived metrics, with
//! parent → child edges forming a forest.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::belief::BeliefRecord;

/// Derived scalar metrics for one belief.
///
/// A metric whose inputs are missing is `None`; absence is explicit, never
/// coerced to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeliefMetrics {
    /// conviction × stability.
    pub belief_strength: Option<f64>,

    /// (11 − importance) × conviction.
    pub foundational_weight: Option<f64>,

    /// conviction × stability × (11 − importance).
    pub rigidity_score: Option<f64>,

    /// conviction − stability.
    pub certainty_gap: Option<f64>,

    /// direct-child count × conviction.
    pub influence_score: Option<f64>,

    /// Number of direct children in the graph.
    pub child_count: usize,
}

/// One node of the belief graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefNode {
    pub record: BeliefRecord,
    pub metrics: BeliefMetrics,
}

/// Aggregate statistics over a belief graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub roots: usize,
    pub leaves: usize,
    pub max_depth: usize,
}

/// Directed belief graph: nodes keyed by belief id in discovery order,
/// one edge per resolved parent link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeliefGraph {
    nodes: IndexMap<String, BeliefNode>,

    /// (parent_belief_id, belief_id) pairs.
    edges: Vec<(String, String)>,
}

impl BeliefGraph {
    /// Assemble a graph from linked records and their metrics. Records
    /// arrive in id order, which the node map preserves.
    pub fn new(nodes: Vec<BeliefNode>) -> Self {
        let mut map = IndexMap::with_capacity(nodes.len());
        let mut edges = Vec::new();

        for node in nodes {
            if let Some(parent) = &node.record.parent_belief_id {
                edges.push((parent.clone(), node.record.belief_id.clone()));
            }
            map.insert(node.record.belief_id.clone(), node);
        }

        Self { nodes: map, edges }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, belief_id: &str) -> Option<&BeliefNode> {
        self.nodes.get(belief_id)
    }

    /// Nodes in discovery (id) order.
    pub fn nodes(&self) -> impl Iterator<Item = &BeliefNode> {
        self.nodes.values()
    }

    /// Parent → child edges in node order.
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Direct children of a belief.
    pub fn children(&self, belief_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(parent, _)| parent == belief_id)
            .map(|(_, child)| child.as_str())
            .collect()
    }

    /// Beliefs with no parent.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.record.parent_belief_id.is_none())
            .map(|n| n.record.belief_id.as_str())
            .collect()
    }

    /// Beliefs with no children.
    pub fn leaves(&self) -> Vec<&str> {
        let parents: HashSet<&str> = self.edges.iter().map(|(p, _)| p.as_str()).collect();
        self.nodes
            .keys()
            .filter(|id| !parents.contains(id.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// All transitive ancestors, nearest first.
    pub fn ancestors(&self, belief_id: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.nodes.get(belief_id);

        while let Some(node) = current {
            match &node.record.parent_belief_id {
                Some(parent) if seen.insert(parent.as_str()) => {
                    out.push(parent.as_str());
                    current = self.nodes.get(parent);
                }
                _ => break,
            }
        }
        out
    }

    /// All transitive descendants in breadth-first order.
    pub fn descendants(&self, belief_id: &str) -> Vec<&str> {
        let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
        for (parent, child) in &self.edges {
            children_of
                .entry(parent.as_str())
                .or_default()
                .push(child.as_str());
        }

        let mut out = Vec::new();
        let mut queue = vec![belief_id];
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop() {
            for &child in children_of.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                if seen.insert(child) {
                    out.push(child);
                    queue.push(child);
                }
            }
        }
        out
    }

    /// True when no belief is reachable from itself via parent links.
    pub fn is_acyclic(&self) -> bool {
        self.nodes
            .keys()
            .all(|id| !self.ancestors(id).contains(&id.as_str()))
    }

    /// Depth of a node (0 for roots).
    fn depth(&self, belief_id: &str) -> usize {
        self.ancestors(belief_id).len()
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            roots: self.roots().len(),
            leaves: self.leaves().len(),
            max_depth: self.nodes.keys().map(|id| self.depth(id)).max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(id: &str, parent: Option<&str>) -> BeliefRecord {
        BeliefRecord {
            belief_id: id.to_string(),
            speaker_id: "A".to_string(),
            episode_id: None,
            discovery_level: 1,
            chunk_id: "L1_C0001".to_string(),
            chunk_size: 1,
            timestamp: "00:00:00".to_string(),
            statement_text: id.to_string(),
            atomic_belief: id.to_string(),
            certainty: None,
            filter_confidence: 0.9,
            conviction_score: Some(0.8),
            stability_score: Some(0.5),
            importance: Some(3),
            tier: None,
            category: None,
            parent_hint: None,
            parent_belief_id: parent.map(String::from),
            duplicate_group_id: None,
            reinforcement_count: 1,
            reinforcement_levels: BTreeSet::from([1]),
        }
    }

    fn node(id: &str, parent: Option<&str>) -> BeliefNode {
        BeliefNode {
            record: record(id, parent),
            metrics: BeliefMetrics::default(),
        }
    }

    fn chain_graph() -> BeliefGraph {
        // b1 -> b2 -> b3, b4 isolated
        BeliefGraph::new(vec![
            node("b1", None),
            node("b2", Some("b1")),
            node("b3", Some("b2")),
            node("b4", None),
        ])
    }

    #[test]
    fn test_roots_and_leaves() {
        let graph = chain_graph();
        assert_eq!(graph.roots(), vec!["b1", "b4"]);
        assert_eq!(graph.leaves(), vec!["b3", "b4"]);
        assert_eq!(graph.children("b1"), vec!["b2"]);
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let graph = chain_graph();
        assert_eq!(graph.ancestors("b3"), vec!["b2", "b1"]);
        let mut descendants = graph.descendants("b1");
        descendants.sort();
        assert_eq!(descendants, vec!["b2", "b3"]);
        assert!(graph.descendants("b4").is_empty());
    }

    #[test]
    fn test_stats() {
        let stats = chain_graph().stats();
        assert_eq!(stats.nodes, 4);
        assert_eq!(stats.edges, 2);
        assert_eq!(stats.roots, 2);
        assert_eq!(stats.leaves, 2);
        assert_eq!(stats.max_depth, 2);
    }

    #[test]
    fn test_acyclic_check() {
        assert!(chain_graph().is_acyclic());

        // Manufacture a cyclic graph directly; the linker never produces one.
        let cyclic = BeliefGraph::new(vec![node("b1", Some("b2")), node("b2", Some("b1"))]);
        assert!(!cyclic.is_acyclic());
    }
}
