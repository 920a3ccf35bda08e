//! Lexical similarity: normalized edit distance between two snapshots

/// Lowercase, drop punctuation, collapse runs of whitespace.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character-level Levenshtein distance
pub fn edit_distance(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / max_len` over the normalized texts.
///
/// Two texts that are both empty after normalization score `0.0`, not `1.0`:
/// an empty rewrite must never look converged.
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();

    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 0.0;
    }

    1.0 - edit_distance(&a, &b) as f64 / max_len as f64
}

/// Relative change in character length from `prev` to `curr`
pub fn length_delta(prev: &str, curr: &str) -> f64 {
    let p = prev.chars().count();
    let c = curr.chars().count();
    match (p, c) {
        (0, 0) => 0.0,
        (0, _) => 1.0,
        _ => p.abs_diff(c) as f64 / p as f64,
    }
}
