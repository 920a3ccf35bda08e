//! Style divergence: a cheap proxy for "did the voice of the text change"

use std::collections::HashSet;

use super::lexical::normalize;

/// Surface statistics of one text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleProfile {
    /// Mean words per sentence, `0.0` when there are no sentences
    pub mean_sentence_len: f64,
    /// Unique-word ratio, `0.0` when there are no words
    pub lexical_diversity: f64,
    pub word_count: usize,
}

impl StyleProfile {
    pub fn of(text: &str) -> Self {
        let sentence_lens: Vec<usize> = text
            .split(['.', '!', '?'])
            .map(|s| normalize(s).split_whitespace().count())
            .filter(|&n| n > 0)
            .collect();

        let mean_sentence_len = if sentence_lens.is_empty() {
            0.0
        } else {
            sentence_lens.iter().sum::<usize>() as f64 / sentence_lens.len() as f64
        };

        let normalized = normalize(text);
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let unique: HashSet<&str> = words.iter().copied().collect();
        let lexical_diversity = if words.is_empty() {
            0.0
        } else {
            unique.len() as f64 / words.len() as f64
        };

        Self {
            mean_sentence_len,
            lexical_diversity,
            word_count: words.len(),
        }
    }
}

/// Average of the relative change in mean sentence length and the absolute
/// change in lexical diversity. A sub-term with no sentences/words on either
/// side contributes `0.0`.
pub fn style_delta(prev: &str, curr: &str) -> f64 {
    let a = StyleProfile::of(prev);
    let b = StyleProfile::of(curr);

    let sentence_term = if a.mean_sentence_len > 0.0 && b.mean_sentence_len > 0.0 {
        (b.mean_sentence_len - a.mean_sentence_len).abs() / a.mean_sentence_len
    } else {
        0.0
    };

    let diversity_term = if a.word_count > 0 && b.word_count > 0 {
        (b.lexical_diversity - a.lexical_diversity).abs()
    } else {
        0.0
    };

    (sentence_term + diversity_term) / 2.0
}
