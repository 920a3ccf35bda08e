//! Oscillation detection: catch A-B-A-B rewrites that never settle
//!
//! Only period-2 cycles are recognised. Longer cycles go undetected and are
//! left to the budget ceiling.

use serde::{Deserialize, Serialize};

use crate::metrics::lexical_similarity;
use crate::snapshot::IterationSnapshot;

/// Skip-one pairs (0-2, 1-3) must be more similar than this
pub const RECURRENCE_BOUND: f64 = 0.9;

/// Adjacent pairs (0-1, 1-2, 2-3) must be less similar than this
pub const DISTINCTNESS_BOUND: f64 = 0.8;

/// Number of trailing snapshots inspected
pub const WINDOW: usize = 4;

/// Pairwise similarities over the last four snapshots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillationReading {
    /// 0-1, 1-2, 2-3
    pub adjacent: [f64; 3],
    /// 0-2, 1-3
    pub skip_one: [f64; 2],
    pub detected: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct OscillationDetector;

impl OscillationDetector {
    /// Inspect the tail of `history`. `None` when fewer than four snapshots exist.
    pub fn inspect(history: &[IterationSnapshot]) -> Option<OscillationReading> {
        if history.len() < WINDOW {
            return None;
        }
        let w = &history[history.len() - WINDOW..];
        let sim = |i: usize, j: usize| lexical_similarity(&w[i].text, &w[j].text);

        let adjacent = [sim(0, 1), sim(1, 2), sim(2, 3)];
        let skip_one = [sim(0, 2), sim(1, 3)];

        let detected = skip_one.iter().all(|&s| s > RECURRENCE_BOUND)
            && adjacent.iter().all(|&s| s < DISTINCTNESS_BOUND);

        Some(OscillationReading {
            adjacent,
            skip_one,
            detected,
        })
    }

    /// Whether the last four snapshots form an A-B-A-B pattern
    pub fn detect(history: &[IterationSnapshot]) -> bool {
        Self::inspect(history).is_some_and(|r| r.detected)
    }
}
