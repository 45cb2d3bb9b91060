//! Deterministic multi-level chunking.
//!
//! Chunk boundaries depend only on (units, level), which is what lets the
//! merger correlate discoveries made at different levels by their covered
//! text.

use crate::types::chunk::{Chunk, Level};
use crate::types::transcript::TranscriptUnit;

/// Partition `units` into contiguous chunks of `level` units each.
///
/// Produces `ceil(N / level)` chunks; the i-th spans unit indices
/// `[i*level, min((i+1)*level, N))`. The final chunk may be short. A level
/// of at least `N` yields one chunk covering the whole transcript; empty
/// input yields no chunks.
///
/// Callers are expected to have validated `level > 0` via config
/// validation; a zero level here is a programming error.
pub fn chunks_for(units: &[TranscriptUnit], level: Level) -> Vec<Chunk> {
    assert!(level > 0, "chunk level must be positive");

    units
        .chunks(level)
        .enumerate()
        .map(|(chunk_index, slice)| Chunk::from_units(level, chunk_index, slice))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn units(n: usize) -> Vec<TranscriptUnit> {
        (0..n)
            .map(|i| {
                TranscriptUnit::new(
                    i,
                    if i % 2 == 0 { "SPEAKER_A" } else { "SPEAKER_B" },
                    format!("00:00:{i:02}"),
                    format!("00:00:{:02}", i + 1),
                    format!("utterance {i}"),
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_division() {
        let chunks = chunks_for(&units(8), 4);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].unit_range, 0..4);
        assert_eq!(chunks[1].unit_range, 4..8);
    }

    #[test]
    fn test_trailing_partial_chunk() {
        let chunks = chunks_for(&units(10), 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].unit_range, 8..10);
        assert_eq!(chunks[2].size(), 2);
    }

    #[test]
    fn test_level_at_least_transcript_size() {
        let chunks = chunks_for(&units(5), 512);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].unit_range, 0..5);
    }

    #[test]
    fn test_empty_transcript() {
        assert!(chunks_for(&[], 4).is_empty());
    }

    #[test]
    fn test_determinism() {
        let input = units(23);
        assert_eq!(chunks_for(&input, 7), chunks_for(&input, 7));
    }

    proptest! {
        /// Chunks partition [0, N) exactly: no gaps, no overlaps, full cover.
        #[test]
        fn prop_chunks_partition_units(n in 0usize..300, level in 1usize..64) {
            let input = units(n);
            let chunks = chunks_for(&input, level);

            prop_assert_eq!(chunks.len(), n.div_ceil(level));

            let mut covered = 0usize;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.chunk_index, i);
                prop_assert_eq!(chunk.unit_range.start, covered);
                prop_assert!(chunk.size() >= 1);
                prop_assert!(chunk.size() <= level);
                covered = chunk.unit_range.end;
            }
            prop_assert_eq!(covered, n);
        }
    }
}
