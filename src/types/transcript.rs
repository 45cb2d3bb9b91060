//! Transcript units produced by the diarized transcript parser.

use serde::{Deserialize, Serialize};

/// A single speaker utterance from a diarized transcript.
///
/// Immutable once parsed; every downstream stage reads these by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptUnit {
    /// Ordinal position within the transcript (0-based).
    pub index: usize,

    /// Speaker label, e.g. `SPEAKER_A`.
    pub speaker_id: String,

    /// Start timestamp as it appears in the transcript (`HH:MM:SS`).
    pub start_time: String,

    /// End timestamp as it appears in the transcript.
    pub end_time: String,

    /// Utterance text, whitespace-trimmed.
    pub text: String,
}

impl TranscriptUnit {
    /// Create a new unit with trimmed text.
    pub fn new(
        index: usize,
        speaker_id: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            index,
            speaker_id: speaker_id.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            text: text.into().trim().to_string(),
        }
    }

    /// Number of whitespace-separated words in the utterance.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}
