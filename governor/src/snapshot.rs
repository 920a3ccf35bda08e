//! Iteration snapshots: one observation of the expand/compress rewrite loop

use serde::{Deserialize, Serialize};

/// Which rewrite phase produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Adds detail to the text
    Expand,
    /// Condenses the text
    Compress,
}

impl Operator {
    /// The phase that conventionally follows this one
    pub fn alternate(&self) -> Self {
        match self {
            Self::Expand => Self::Compress,
            Self::Compress => Self::Expand,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expand => write!(f, "expand"),
            Self::Compress => write!(f, "compress"),
        }
    }
}

/// Quality vector produced by the external judge for one snapshot.
///
/// `b` is the bias/risk axis; the other four are quality axes. Only F, N and
/// M participate in the quality gate, E is informational.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub e: f64,
    pub f: f64,
    pub m: f64,
    pub n: f64,
    pub b: f64,
}

impl QualityScores {
    pub fn new(e: f64, f: f64, m: f64, n: f64, b: f64) -> Self {
        Self { e, f, m, n, b }
    }

    /// All five axes in fixed `[E, F, M, N, B]` order
    pub fn axes(&self) -> [f64; 5] {
        [self.e, self.f, self.m, self.n, self.b]
    }

    /// Candidate score used for best-candidate tracking: mean of F, N, M
    pub fn candidate_score(&self) -> f64 {
        (self.f + self.n + self.m) / 3.0
    }

    /// Name of the first axis holding NaN or infinity, if any
    pub fn first_non_finite(&self) -> Option<&'static str> {
        const NAMES: [&str; 5] = ["E", "F", "M", "N", "B"];
        self.axes()
            .iter()
            .zip(NAMES)
            .find(|(v, _)| !v.is_finite())
            .map(|(_, name)| name)
    }
}

/// Per-iteration metrics against the predecessor snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    /// Meaning similarity (oracle, or lexical proxy when degraded)
    pub semantic: f64,
    /// Normalized edit-distance similarity
    pub lexical: f64,
    /// Relative change in character length
    pub length_delta: f64,
    /// Sentence-length / lexical-diversity divergence
    pub style_delta: f64,
    /// Normalized Euclidean distance between score vectors
    pub score_delta: f64,
}

/// One observation of the iterative rewrite process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    /// Which iteration this was (1-indexed)
    pub iteration: u32,
    /// Full text produced at this step
    pub text: String,
    pub operator: Operator,
    pub scores: QualityScores,
    /// Only set once the snapshot has been compared with a predecessor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IterationMetrics>,
    /// Token cost of producing this snapshot
    #[serde(default)]
    pub tokens_used: u64,
}

impl IterationSnapshot {
    pub fn new(
        iteration: u32,
        text: impl Into<String>,
        operator: Operator,
        scores: QualityScores,
        tokens_used: u64,
    ) -> Self {
        Self {
            iteration,
            text: text.into(),
            operator,
            scores,
            metrics: None,
            tokens_used,
        }
    }
}
