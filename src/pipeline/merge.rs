//! Cross-level belief deduplication.
//!
//! Records whose atomic statements are near-duplicates (within the same
//! speaker and episode) are clustered by single-link transitive closure
//! over the "similar enough" relation and collapsed to one canonical
//! record carrying the cluster's reinforcement statistics.

use std::collections::BTreeSet;
use std::collections::HashMap;

use tracing::info;

use crate::pipeline::similarity::cosine_similarity;
use crate::types::belief::BeliefRecord;

/// Summary of one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records going in.
    pub input: usize,

    /// Canonical records coming out.
    pub output: usize,

    /// Duplicate clusters found (size ≥ 2).
    pub clusters: usize,

    /// Records absorbed into a canonical record.
    pub absorbed: usize,
}

/// Deduplicates beliefs discovered at multiple levels.
///
/// The similarity threshold is a monotonic knob: lower merges more
/// aggressively (fewer, larger clusters). The default of 0.85 comes from
/// [`crate::types::config::ExtractorConfig`].
pub struct BeliefMerger {
    threshold: f64,
}

impl BeliefMerger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Collapse near-duplicate records into canonical ones.
    ///
    /// Canonical pick within a cluster: highest conviction, then coarsest
    /// (largest) discovery level, then lowest belief id. The canonical
    /// record absorbs the cluster's size as `reinforcement_count`, the
    /// union of discovery levels, and a shared `duplicate_group_id`;
    /// absorbed records are dropped. Output preserves input order.
    pub fn merge(&self, records: Vec<BeliefRecord>) -> (Vec<BeliefRecord>, MergeReport) {
        let input = records.len();
        if input < 2 {
            let report = MergeReport {
                input,
                output: input,
                ..Default::default()
            };
            return (records, report);
        }

        let clusters = clusters_by_similarity(&records, self.threshold, cosine_similarity);

        let mut keep: Vec<Option<BeliefRecord>> = records.into_iter().map(Some).collect();
        let mut cluster_count = 0usize;
        let mut absorbed = 0usize;

        for indices in clusters {
            if indices.len() < 2 {
                continue;
            }
            cluster_count += 1;
            let group_id = format!("dup_{cluster_count:04}");

            let canonical = canonical_index(&keep, &indices);
            let mut levels = BTreeSet::new();
            for &idx in &indices {
                if let Some(record) = keep[idx].as_ref() {
                    levels.extend(record.reinforcement_levels.iter().copied());
                }
            }

            for &idx in &indices {
                if idx == canonical {
                    continue;
                }
                keep[idx] = None;
                absorbed += 1;
            }

            if let Some(record) = keep[canonical].as_mut() {
                record.duplicate_group_id = Some(group_id);
                record.reinforcement_count = indices.len();
                record.reinforcement_levels = levels;
            }
        }

        let merged: Vec<BeliefRecord> = keep.into_iter().flatten().collect();
        let report = MergeReport {
            input,
            output: merged.len(),
            clusters: cluster_count,
            absorbed,
        };
        info!(
            input = report.input,
            output = report.output,
            clusters = report.clusters,
            "deduplicated beliefs"
        );
        (merged, report)
    }
}

/// Single-link clustering by pairwise similarity within (speaker, episode)
/// scopes, using union-find with path compression and union by size:
/// O(p α(n)) over the p in-scope pairs.
///
/// Clusters are returned in order of their first member, members sorted.
fn clusters_by_similarity(
    records: &[BeliefRecord],
    threshold: f64,
    similarity: impl Fn(&str, &str) -> f64,
) -> Vec<Vec<usize>> {
    let mut scopes: HashMap<(&str, Option<&str>), Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        scopes
            .entry((record.speaker_id.as_str(), record.episode_id.as_deref()))
            .or_default()
            .push(idx);
    }

    let mut dsu = UnionFind::new(records.len());
    for members in scopes.values() {
        for (pos, &a) in members.iter().enumerate() {
            for &b in &members[pos + 1..] {
                if similarity(&records[a].atomic_belief, &records[b].atomic_belief) >= threshold {
                    dsu.union(a, b);
                }
            }
        }
    }

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut cluster_of_root: HashMap<usize, usize> = HashMap::new();
    for idx in 0..records.len() {
        let root = dsu.find(idx);
        let slot = *cluster_of_root.entry(root).or_insert_with(|| {
            clusters.push(Vec::new());
            clusters.len() - 1
        });
        clusters[slot].push(idx);
    }
    clusters
}

/// Index of the canonical record within a cluster.
fn canonical_index(records: &[Option<BeliefRecord>], indices: &[usize]) -> usize {
    let mut best = indices[0];
    for &idx in &indices[1..] {
        let (challenger, incumbent) = match (records[idx].as_ref(), records[best].as_ref()) {
            (Some(c), Some(i)) => (c, i),
            _ => continue,
        };

        let challenger_key = (
            challenger.conviction_score.unwrap_or(f64::NEG_INFINITY),
            challenger.discovery_level,
        );
        let incumbent_key = (
            incumbent.conviction_score.unwrap_or(f64::NEG_INFINITY),
            incumbent.discovery_level,
        );

        if challenger_key > incumbent_key
            || (challenger_key == incumbent_key && challenger.belief_id < incumbent.belief_id)
        {
            best = idx;
        }
    }
    best
}

struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
    }
}
