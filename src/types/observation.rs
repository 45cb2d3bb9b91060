//! Raw observations: the typed output of running the two-stage classifier
//! on one chunk.

use serde::{Deserialize, Serialize};

use crate::types::chunk::{Chunk, ChunkRef};
use crate::types::usage::Usage;

/// How firmly an atomic statement was asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    /// Stated as fact, no hedging.
    Binary,

    /// Qualified ("I think", "probably", ...).
    Hedged,
}

/// A clean, standalone declarative statement extracted from a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicStatement {
    pub text: String,
    pub certainty: Certainty,
}

impl AtomicStatement {
    pub fn new(text: impl Into<String>, certainty: Certainty) -> Self {
        Self {
            text: text.into(),
            certainty,
        }
    }
}

/// Stage-1 verdict: is this chunk a belief statement at all?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOneVerdict {
    pub is_belief: bool,

    /// Filter confidence in [0, 1].
    pub confidence: f64,

    pub usage: Usage,
}

/// Stage-2 detail for chunks that passed the belief filter.
///
/// Score fields the classifier failed to produce are `None` and propagate
/// as missing through the derived metrics; they are never coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefDetail {
    /// Atomic statements extracted from the chunk, in order.
    #[serde(default)]
    pub statements: Vec<AtomicStatement>,

    /// Conviction score in [0, 1].
    pub conviction_score: Option<f64>,

    /// Stability score in [0, 1].
    pub stability_score: Option<f64>,

    /// Importance tier position, 1 (core axiom) to 10 (casual take).
    pub importance: Option<u8>,

    /// Human-readable tier name.
    pub tier: Option<String>,

    /// Topical category.
    pub category: Option<String>,

    /// Free text naming the higher-level belief this one depends on.
    pub parent_hint: Option<String>,

    /// Whether the belief defines an outgroup.
    pub defines_outgroup: Option<bool>,

    pub usage: Usage,
}

/// The immutable result of classifying one chunk. Produced exactly once per
/// chunk per level by the extraction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub chunk_ref: ChunkRef,

    /// Id of the classified chunk (`L{level}_C{index:04}`).
    pub chunk_id: String,

    /// Number of transcript units the chunk covered.
    pub chunk_size: usize,

    /// Primary speaker of the chunk.
    pub speaker_id: String,

    /// Timestamp of the chunk's first unit.
    pub timestamp: String,

    /// Full chunk text the classifier saw.
    pub statement_text: String,

    pub is_belief: bool,

    /// Stage-1 filter confidence.
    pub filter_confidence: f64,

    /// Stage-2 detail; `None` for non-beliefs.
    pub detail: Option<BeliefDetail>,

    /// Combined usage of both stages for this chunk.
    pub usage: Usage,
}

impl RawObservation {
    /// Observation for a chunk the filter rejected.
    pub fn non_belief(chunk: &Chunk, verdict: StageOneVerdict) -> Self {
        Self {
            chunk_ref: chunk.chunk_ref(),
            chunk_id: chunk.id(),
            chunk_size: chunk.size(),
            speaker_id: chunk.primary_speaker.clone(),
            timestamp: chunk.start_time.clone(),
            statement_text: chunk.text.clone(),
            is_belief: false,
            filter_confidence: verdict.confidence,
            detail: None,
            usage: verdict.usage,
        }
    }

    /// Observation for a chunk that passed the filter and was classified.
    pub fn belief(chunk: &Chunk, verdict: StageOneVerdict, detail: BeliefDetail) -> Self {
        let usage = verdict.usage.add(detail.usage);
        Self {
            chunk_ref: chunk.chunk_ref(),
            chunk_id: chunk.id(),
            chunk_size: chunk.size(),
            speaker_id: chunk.primary_speaker.clone(),
            timestamp: chunk.start_time.clone(),
            statement_text: chunk.text.clone(),
            is_belief: true,
            filter_confidence: verdict.confidence,
            detail: Some(detail),
            usage,
        }
    }
}
