//! Diarized transcript parsing.
//!
//! Expects one utterance per line in the form
//! `SPEAKER_ID | HH:MM:SS | HH:MM:SS | text`. Lines that do not parse are
//! skipped and counted rather than failing the whole file; transcripts in
//! the wild are messy.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::types::transcript::TranscriptUnit;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Z][A-Z0-9_]*)\s*\|\s*([0-9:]+)\s*\|\s*([0-9:]+)\s*\|\s*(.+)$")
            .unwrap_or_else(|e| unreachable!("invalid transcript line pattern: {e}"))
    })
}

/// Parse a transcript into ordered units.
///
/// Blank and unparseable lines are skipped. Returns [`ParseError::Empty`]
/// when no line yields an utterance.
pub fn parse(input: &str) -> Result<Vec<TranscriptUnit>, ParseError> {
    let mut units = Vec::new();
    let mut skipped = 0usize;

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line, units.len()) {
            Some(unit) => units.push(unit),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, parsed = units.len(), "skipped unparseable transcript lines");
    }
    if units.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(units)
}

/// Parse a transcript file from disk.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<TranscriptUnit>, ParseError> {
    let path = path.as_ref();
    let input = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&input)
}

fn parse_line(line: &str, index: usize) -> Option<TranscriptUnit> {
    if let Some(captures) = line_pattern().captures(line) {
        return Some(TranscriptUnit::new(
            index,
            &captures[1],
            &captures[2],
            &captures[3],
            &captures[4],
        ));
    }

    // Fallback for lines the strict pattern rejects, e.g. lowercase speaker
    // labels. The text may itself contain pipes.
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() >= 4 {
        let text = parts[3..].join("|");
        let text = text.trim();
        if !text.is_empty() {
            return Some(TranscriptUnit::new(
                index,
                parts[0].trim(),
                parts[1].trim(),
                parts[2].trim(),
                text,
            ));
        }
    }
    None
}

/// Unique speaker ids in first-appearance order.
pub fn speakers(units: &[TranscriptUnit]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for unit in units {
        if !out.iter().any(|s| s == &unit.speaker_id) {
            out.push(unit.speaker_id.clone());
        }
    }
    out
}

/// Keep only the given speakers' utterances, reindexed to stay contiguous.
pub fn filter_speakers(units: &[TranscriptUnit], keep: &[&str]) -> Vec<TranscriptUnit> {
    units
        .iter()
        .filter(|u| keep.contains(&u.speaker_id.as_str()))
        .enumerate()
        .map(|(index, u)| {
            TranscriptUnit::new(index, &u.speaker_id, &u.start_time, &u.end_time, &u.text)
        })
        .collect()
}

/// Keep leading units up to a total word budget, for cheap partial runs.
pub fn truncate(units: &[TranscriptUnit], max_words: usize) -> Vec<TranscriptUnit> {
    let mut budget = max_words;
    units
        .iter()
        .take_while(|u| {
            let words = u.word_count();
            if words > budget {
                return false;
            }
            budget -= words;
            true
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
SPEAKER_00 | 00:00:01 | 00:00:09 | I think the market always recovers.
SPEAKER_01 | 00:00:10 | 00:00:15 | Does it though?

SPEAKER_00 | 00:00:16 | 00:00:30 | Yes | over any long window | it does.
this line is noise
";

    #[test]
    fn test_parses_well_formed_lines() {
        let units = parse(SAMPLE).unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].speaker_id, "SPEAKER_00");
        assert_eq!(units[0].start_time, "00:00:01");
        assert_eq!(units[1].text, "Does it though?");
        assert_eq!(units[2].index, 2);
    }

    #[test]
    fn test_text_may_contain_pipes() {
        let units = parse(SAMPLE).unwrap();
        assert_eq!(units[2].text, "Yes | over any long window | it does.");
    }

    #[test]
    fn test_fallback_accepts_loose_speaker_labels() {
        let units = parse("alice | 0:01 | 0:05 | hello there").unwrap();
        assert_eq!(units[0].speaker_id, "alice");
        assert_eq!(units[0].text, "hello there");
    }

    #[test]
    fn test_unparseable_input_is_empty_error() {
        assert!(matches!(parse("no pipes here\n\n"), Err(ParseError::Empty)));
        assert!(matches!(parse(""), Err(ParseError::Empty)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = parse_file("/nonexistent/transcript.txt").unwrap_err();
        match err {
            ParseError::Io { path, .. } => assert!(path.contains("transcript.txt")),
            other => panic!("expected Io error, got {other}"),
        }
    }

    #[test]
    fn test_speakers_in_first_appearance_order() {
        let units = parse(SAMPLE).unwrap();
        assert_eq!(speakers(&units), vec!["SPEAKER_00", "SPEAKER_01"]);
    }

    #[test]
    fn test_filter_speakers_reindexes() {
        let units = parse(SAMPLE).unwrap();
        let only_zero = filter_speakers(&units, &["SPEAKER_00"]);

        assert_eq!(only_zero.len(), 2);
        assert_eq!(only_zero[0].index, 0);
        assert_eq!(only_zero[1].index, 1);
        assert!(only_zero.iter().all(|u| u.speaker_id == "SPEAKER_00"));
    }

    #[test]
    fn test_truncate_respects_word_budget() {
        let units = parse(SAMPLE).unwrap();
        // First unit has 6 words; a budget of 8 cannot fit the second.
        let truncated = truncate(&units, 8);
        assert_eq!(truncated.len(), 1);

        assert!(truncate(&units, 2).is_empty());
        assert_eq!(truncate(&units, 1000).len(), 3);
    }
}
