//! Chunks: contiguous spans of transcript units classified as one unit of work.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::transcript::TranscriptUnit;

/// A chunk-size granularity. A level of `n` groups `n` consecutive
/// transcript units into one chunk.
pub type Level = usize;

/// Stable reference to a chunk, used to key aggregated results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkRef {
    pub level: Level,
    pub chunk_index: usize,
}

impl ChunkRef {
    /// Chunk id in the `L{level}_C{index:04}` scheme.
    pub fn id(&self) -> String {
        format!("L{}_C{:04}", self.level, self.chunk_index + 1)
    }
}

/// A contiguous, non-overlapping span of transcript units at one level.
///
/// Derived deterministically from (level, ordered units) and never mutated,
/// so chunks discovered at different levels can be correlated by their
/// covered text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Granularity this chunk was produced at.
    pub level: Level,

    /// Position of this chunk within its level (0-based).
    pub chunk_index: usize,

    /// Half-open range of unit indices covered by this chunk.
    pub unit_range: Range<usize>,

    /// Unit texts joined by newlines, in transcript order.
    pub text: String,

    /// Speaker with the most units in this chunk (first seen wins ties).
    pub primary_speaker: String,

    /// Start timestamp of the first unit.
    pub start_time: String,

    /// End timestamp of the last unit.
    pub end_time: String,
}

impl Chunk {
    /// Build a chunk from a non-empty slice of consecutive units.
    pub(crate) fn from_units(level: Level, chunk_index: usize, units: &[TranscriptUnit]) -> Self {
        debug_assert!(!units.is_empty());

        let text = units
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            level,
            chunk_index,
            unit_range: units[0].index..units[units.len() - 1].index + 1,
            text,
            primary_speaker: primary_speaker(units),
            start_time: units[0].start_time.clone(),
            end_time: units[units.len() - 1].end_time.clone(),
        }
    }

    /// Stable reference for aggregation keys.
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef {
            level: self.level,
            chunk_index: self.chunk_index,
        }
    }

    /// Chunk id in the `L{level}_C{index:04}` scheme.
    pub fn id(&self) -> String {
        self.chunk_ref().id()
    }

    /// Number of units covered.
    pub fn size(&self) -> usize {
        self.unit_range.len()
    }
}

/// Speaker with the most utterances in the slice. Ties go to the speaker
/// that appears first, keeping the result deterministic.
fn primary_speaker(units: &[TranscriptUnit]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for unit in units {
        *counts.entry(unit.speaker_id.as_str()).or_insert(0) += 1;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    units
        .iter()
        .find(|u| counts[u.speaker_id.as_str()] == max)
        .map(|u| u.speaker_id.clone())
        .unwrap_or_default()
}
