//! Derived belief metrics and final graph assembly.
//!
//! Pure functions over the linked record set. A metric whose inputs are
//! missing comes out `None`; downstream consumers decide what absence
//! means, this stage never substitutes a zero.

use std::collections::HashMap;

use tracing::info;

use crate::types::belief::BeliefRecord;
use crate::types::graph::{BeliefGraph, BeliefMetrics, BeliefNode};

/// Compute the scalar metrics for one record given its direct-child count.
pub fn compute_metrics(record: &BeliefRecord, child_count: usize) -> BeliefMetrics {
    let conviction = record.conviction_score;
    let stability = record.stability_score;
    let importance = record.importance.map(|i| 11.0 - f64::from(i));

    BeliefMetrics {
        belief_strength: conviction.zip(stability).map(|(c, s)| c * s),
        foundational_weight: importance.zip(conviction).map(|(i, c)| i * c),
        rigidity_score: conviction
            .zip(stability)
            .zip(importance)
            .map(|((c, s), i)| c * s * i),
        certainty_gap: conviction.zip(stability).map(|(c, s)| c - s),
        influence_score: conviction.map(|c| child_count as f64 * c),
        child_count,
    }
}

/// Assemble the final graph: one node per record with its metrics, one
/// edge per resolved parent link.
pub fn build_graph(records: Vec<BeliefRecord>) -> BeliefGraph {
    let mut child_counts: HashMap<&str, usize> = HashMap::new();
    for record in &records {
        if let Some(parent) = &record.parent_belief_id {
            *child_counts.entry(parent.as_str()).or_insert(0) += 1;
        }
    }
    let child_counts: HashMap<String, usize> = child_counts
        .into_iter()
        .map(|(id, n)| (id.to_string(), n))
        .collect();

    let nodes: Vec<BeliefNode> = records
        .into_iter()
        .map(|record| {
            let child_count = child_counts.get(&record.belief_id).copied().unwrap_or(0);
            let metrics = compute_metrics(&record, child_count);
            BeliefNode { record, metrics }
        })
        .collect();

    let graph = BeliefGraph::new(nodes);
    let stats = graph.stats();
    info!(
        nodes = stats.nodes,
        edges = stats.edges,
        roots = stats.roots,
        max_depth = stats.max_depth,
        "assembled belief graph"
    );
    graph
}
