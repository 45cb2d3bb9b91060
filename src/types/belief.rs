//! Belief records: the unit that survives into merging, linking, and
//! analysis.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::chunk::Level;
use crate::types::observation::{Certainty, RawObservation};

/// One belief observation, flattened from a [`RawObservation`].
///
/// One record is created per atomic statement of a belief observation. The
/// merger fills in `duplicate_group_id` and the reinforcement fields and the
/// linker fills in `parent_belief_id`; nothing mutates a record after the
/// metrics stage begins. Fields that may legitimately be absent are
/// `Option`, never sentinel strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefRecord {
    /// Unique id in the `b_{n:04}` scheme, assigned in discovery order.
    pub belief_id: String,

    pub speaker_id: String,

    pub episode_id: Option<String>,

    /// Level the record was discovered at.
    pub discovery_level: Level,

    /// Id of the chunk the record came from.
    pub chunk_id: String,

    /// Units covered by that chunk.
    pub chunk_size: usize,

    /// Timestamp of the chunk's first unit.
    pub timestamp: String,

    /// Full chunk text the classifier saw.
    pub statement_text: String,

    /// The atomic belief statement this record represents.
    pub atomic_belief: String,

    /// How firmly the atomic statement was asserted.
    pub certainty: Option<Certainty>,

    /// Stage-1 filter confidence.
    pub filter_confidence: f64,

    pub conviction_score: Option<f64>,

    pub stability_score: Option<f64>,

    /// Importance tier position, 1 (core axiom) to 10 (casual take).
    pub importance: Option<u8>,

    pub tier: Option<String>,

    pub category: Option<String>,

    /// Free text naming the higher-level belief this one depends on.
    pub parent_hint: Option<String>,

    /// Resolved parent, filled in by the linker.
    pub parent_belief_id: Option<String>,

    /// Duplicate cluster id (`dup_{n:04}`), filled in by the merger for
    /// records that merged with at least one other.
    pub duplicate_group_id: Option<String>,

    /// Number of independent discoveries merged into this record.
    pub reinforcement_count: usize,

    /// Levels this belief was discovered at.
    pub reinforcement_levels: BTreeSet<Level>,
}

impl BeliefRecord {
    /// Flatten a belief observation into records, one per atomic statement.
    ///
    /// An observation judged a belief whose detail carries no atomic
    /// statements yields a single record using the chunk statement text.
    /// Non-belief observations yield nothing. Ids are assigned from
    /// `next_id`, which is advanced per record.
    pub fn flatten(
        observation: &RawObservation,
        episode_id: Option<&str>,
        next_id: &mut usize,
    ) -> Vec<BeliefRecord> {
        let detail = match (&observation.detail, observation.is_belief) {
            (Some(detail), true) => detail,
            _ => return Vec::new(),
        };

        let atoms: Vec<(String, Option<Certainty>)> = if detail.statements.is_empty() {
            vec![(observation.statement_text.clone(), None)]
        } else {
            detail
                .statements
                .iter()
                .map(|s| (s.text.clone(), Some(s.certainty)))
                .collect()
        };

        atoms
            .into_iter()
            .map(|(atomic_belief, certainty)| {
                let id = format!("b_{:04}", *next_id);
                *next_id += 1;

                BeliefRecord {
                    belief_id: id,
                    speaker_id: observation.speaker_id.clone(),
                    episode_id: episode_id.map(|e| e.to_string()),
                    discovery_level: observation.chunk_ref.level,
                    chunk_id: observation.chunk_id.clone(),
                    chunk_size: observation.chunk_size,
                    timestamp: observation.timestamp.clone(),
                    statement_text: observation.statement_text.clone(),
                    atomic_belief,
                    certainty,
                    filter_confidence: observation.filter_confidence,
                    conviction_score: detail.conviction_score,
                    stability_score: detail.stability_score,
                    importance: detail.importance,
                    tier: detail.tier.clone(),
                    category: detail.category.clone(),
                    parent_hint: detail
                        .parent_hint
                        .as_deref()
                        .map(str::trim)
                        .filter(|h| !h.is_empty())
                        .map(String::from),
                    parent_belief_id: None,
                    duplicate_group_id: None,
                    reinforcement_count: 1,
                    reinforcement_levels: BTreeSet::from([observation.chunk_ref.level]),
                }
            })
            .collect()
    }
}
