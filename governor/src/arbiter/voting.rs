//! Convergence voting: one vote per metric that clears its threshold

use serde::{Deserialize, Serialize};

use crate::arbiter::config::{ConvergencePolicy, Thresholds};
use crate::snapshot::IterationMetrics;

/// Which metrics voted for convergence this iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBreakdown {
    pub semantic: bool,
    pub lexical: bool,
    pub length: bool,
    pub style: bool,
    pub efmn: bool,
}

impl VoteBreakdown {
    pub fn count(&self) -> u32 {
        [self.semantic, self.lexical, self.length, self.style, self.efmn]
            .iter()
            .filter(|v| **v)
            .count() as u32
    }
}

/// Result of one voting round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    pub breakdown: VoteBreakdown,
    pub votes: u32,
    pub converged: bool,
}

/// Similarities must reach their bound; deltas must stay at or under theirs.
pub fn cast_votes(
    metrics: &IterationMetrics,
    thresholds: &Thresholds,
    policy: &ConvergencePolicy,
) -> VoteOutcome {
    let breakdown = VoteBreakdown {
        semantic: metrics.semantic >= thresholds.semantic,
        lexical: metrics.lexical >= thresholds.lexical,
        length: metrics.length_delta <= thresholds.length,
        style: metrics.style_delta <= thresholds.style,
        efmn: metrics.score_delta <= thresholds.efmn,
    };
    let votes = breakdown.count();
    VoteOutcome {
        breakdown,
        votes,
        converged: votes >= policy.votes_required,
    }
}
