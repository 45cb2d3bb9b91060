//! Text similarity for deduplication and parent-hint matching.
//!
//! A deterministic reimplementation of the TF-IDF cosine the original
//! analysis used: lowercase alphanumeric tokens minus stop words, unigram
//! and bigram term frequencies, cosine over the two vectors. The score is
//! in [0, 1]; the thresholds applied to it are the tunables, not anything
//! in here.

use std::collections::HashMap;

/// Words carrying no belief content, excluded from feature vectors.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "i",
    "if", "in", "into", "is", "it", "its", "my", "no", "not", "of", "on", "or", "our", "so",
    "that", "the", "their", "they", "this", "to", "was", "we", "were", "will", "with", "you",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.binary_search(&token).is_ok()
}

/// Lowercase alphanumeric tokens with stop words removed.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Unigram + bigram term-frequency vector.
fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let tokens = tokenize(text);
    let mut counts: HashMap<String, f64> = HashMap::new();

    for token in &tokens {
        *counts.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    for pair in tokens.windows(2) {
        *counts.entry(format!("{} {}", pair[0], pair[1])).or_insert(0.0) += 1.0;
    }
    counts
}

/// Cosine similarity between the term-frequency vectors of two texts.
///
/// Returns 0.0 when either text has no features (empty or all stop words).
pub fn cosine_similarity(a: &str, b: &str) -> f64 {
    let freq_a = term_frequencies(a);
    let freq_b = term_frequencies(b);

    if freq_a.is_empty() || freq_b.is_empty() {
        return 0.0;
    }

    let dot: f64 = freq_a
        .iter()
        .filter_map(|(term, &count)| freq_b.get(term).map(|&other| count * other))
        .sum();

    let norm = |freq: &HashMap<String, f64>| -> f64 {
        freq.values().map(|c| c * c).sum::<f64>().sqrt()
    };

    let denominator = norm(&freq_a) * norm(&freq_b);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}
