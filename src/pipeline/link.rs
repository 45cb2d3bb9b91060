//! Parent-hint resolution into a belief forest.
//!
//! Stage 2 of classification emits free-text hints about which deeper
//! belief a statement rests on. The linker resolves each hint to the most
//! similar other canonical record in the same speaker/episode scope, then
//! breaks any reference cycles so the result is a forest.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{info, warn};

use crate::pipeline::similarity::cosine_similarity;
use crate::types::belief::BeliefRecord;

/// Summary of one linking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Records that carried a parent hint.
    pub candidates: usize,

    /// Hints resolved to a parent.
    pub linked: usize,

    /// Hints with no candidate above the threshold.
    pub unresolved: usize,

    /// Edges dropped to break reference cycles.
    pub cycles_broken: usize,
}

/// Resolves parent hints against canonical belief records.
pub struct BeliefLinker {
    threshold: f64,
}

impl BeliefLinker {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Resolve parent hints in place, setting `parent_belief_id` on each
    /// record whose hint matched.
    ///
    /// A hint is scored against every other record in the same
    /// (speaker, episode) scope as the larger of its similarity to the
    /// candidate's atomic belief and to its source statement. The best
    /// candidate wins if it reaches the threshold; score ties go to the
    /// lower belief id. The resulting parent edges always form a forest.
    pub fn link(&self, records: &mut [BeliefRecord]) -> LinkReport {
        let mut scopes: HashMap<(&str, Option<&str>), Vec<usize>> = HashMap::new();
        for (idx, record) in records.iter().enumerate() {
            scopes
                .entry((record.speaker_id.as_str(), record.episode_id.as_deref()))
                .or_default()
                .push(idx);
        }

        let mut candidates = 0usize;
        let mut edges: BTreeMap<String, (String, f64)> = BTreeMap::new();

        for members in scopes.values() {
            for &child in members {
                let hint = match records[child].parent_hint.as_deref() {
                    Some(hint) => hint,
                    None => continue,
                };
                candidates += 1;

                let mut best: Option<(f64, usize)> = None;
                for &parent in members {
                    if parent == child {
                        continue;
                    }
                    let candidate = &records[parent];
                    let score = cosine_similarity(hint, &candidate.atomic_belief)
                        .max(cosine_similarity(hint, &candidate.statement_text));
                    if score < self.threshold {
                        continue;
                    }
                    let better = match best {
                        None => true,
                        Some((best_score, best_idx)) => {
                            score > best_score
                                || (score == best_score
                                    && candidate.belief_id < records[best_idx].belief_id)
                        }
                    };
                    if better {
                        best = Some((score, parent));
                    }
                }

                if let Some((score, parent)) = best {
                    edges.insert(
                        records[child].belief_id.clone(),
                        (records[parent].belief_id.clone(), score),
                    );
                }
            }
        }

        let linked = edges.len();
        let cycles_broken = break_cycles(&mut edges);

        let by_id: HashMap<&str, usize> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.belief_id.as_str(), idx))
            .collect();
        let surviving: Vec<(usize, String)> = edges
            .iter()
            .filter_map(|(child, (parent, _))| {
                by_id.get(child.as_str()).map(|&idx| (idx, parent.clone()))
            })
            .collect();
        for (idx, parent) in surviving {
            records[idx].parent_belief_id = Some(parent);
        }

        let report = LinkReport {
            candidates,
            linked: linked - cycles_broken,
            unresolved: candidates - linked,
            cycles_broken,
        };
        info!(
            candidates = report.candidates,
            linked = report.linked,
            unresolved = report.unresolved,
            cycles_broken = report.cycles_broken,
            "resolved parent hints"
        );
        report
    }
}

/// Break cycles in a child-to-parent edge map, returning how many edges
/// were dropped.
///
/// Each child has at most one parent, so every cycle is a simple loop
/// reachable by following parent pointers. Within a cycle the
/// lowest-similarity edge is dropped; on a similarity tie, the edge whose
/// child id sorts last.
fn break_cycles(edges: &mut BTreeMap<String, (String, f64)>) -> usize {
    let mut broken = 0usize;
    let mut done: HashSet<String> = HashSet::new();
    let starts: Vec<String> = edges.keys().cloned().collect();

    for start in starts {
        if done.contains(&start) {
            continue;
        }

        let mut path: Vec<String> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();
        let mut current = start;

        loop {
            if done.contains(&current) {
                break;
            }
            if on_path.contains(&current) {
                let pos = match path.iter().position(|n| n == &current) {
                    Some(pos) => pos,
                    None => break,
                };
                let victim = drop_candidate(&path[pos..], edges);
                if let Some((parent, similarity)) = edges.remove(&victim) {
                    warn!(
                        child = %victim,
                        parent = %parent,
                        similarity,
                        "dropped parent edge to break a cycle"
                    );
                }
                broken += 1;
                break;
            }
            match edges.get(&current) {
                Some((parent, _)) => {
                    on_path.insert(current.clone());
                    path.push(current.clone());
                    current = parent.clone();
                }
                None => break,
            }
        }

        // Every node on the path now reaches a terminal node.
        done.extend(path);
    }
    broken
}

/// The edge to drop within a cycle: minimum similarity, ties broken by the
/// child id that sorts last.
fn drop_candidate(cycle: &[String], edges: &BTreeMap<String, (String, f64)>) -> String {
    let mut victim = cycle[0].clone();
    for child in &cycle[1..] {
        let (challenger, incumbent) = match (edges.get(child), edges.get(&victim)) {
            (Some(c), Some(i)) => (c.1, i.1),
            _ => continue,
        };
        if challenger < incumbent || (challenger == incumbent && *child > victim) {
            victim = child.clone();
        }
    }
    victim
}
