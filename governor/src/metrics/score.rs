//! Quality-score comparator and quality gate

use crate::arbiter::config::QualityGates;
use crate::snapshot::QualityScores;

/// Euclidean distance between two score vectors, divided by √5 so the
/// result stays comparable regardless of dimensionality.
pub fn score_delta(a: &QualityScores, b: &QualityScores) -> f64 {
    let sum_sq: f64 = a
        .axes()
        .iter()
        .zip(b.axes())
        .map(|(x, y)| (x - y).powi(2))
        .sum();
    sum_sq.sqrt() / 5f64.sqrt()
}

/// Floor applied to F, N and M after the bias penalty: `min_fnm - b_penalty * B`
pub fn gate_threshold(scores: &QualityScores, gates: &QualityGates) -> f64 {
    gates.min_fnm - gates.b_penalty * scores.b
}

/// Pass iff F, N and M all reach the bias-adjusted floor. E is not gated.
pub fn quality_gate_passed(scores: &QualityScores, gates: &QualityGates) -> bool {
    let threshold = gate_threshold(scores, gates);
    scores.f >= threshold && scores.n >= threshold && scores.m >= threshold
}
