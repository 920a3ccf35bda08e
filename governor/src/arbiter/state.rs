//! Arbiter State: the per-run accumulator threaded through every decision

use serde::{Deserialize, Serialize};

use crate::snapshot::{IterationSnapshot, Operator};

/// Penalty charged to an operator each time it produces a gate-failing snapshot
pub const GATE_FAILURE_PENALTY: f64 = 0.05;

/// Highest-scoring gate-passing snapshot seen so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestCandidate {
    pub text: String,
    /// Mean of F, N, M
    pub score: f64,
    /// `0` while the candidate is still the seed text
    pub iteration: u32,
}

impl BestCandidate {
    /// Placeholder holding the original input before any snapshot passes the gate
    pub fn seed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: 0.0,
            iteration: 0,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.iteration == 0
    }
}

/// Soft penalties per operator. Tracked for observability, not read by any
/// decision rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorPenalties {
    pub expand: f64,
    pub compress: f64,
}

impl OperatorPenalties {
    pub fn charge(&mut self, operator: Operator, amount: f64) {
        match operator {
            Operator::Expand => self.expand += amount,
            Operator::Compress => self.compress += amount,
        }
    }

    pub fn get(&self, operator: Operator) -> f64 {
        match operator {
            Operator::Expand => self.expand,
            Operator::Compress => self.compress,
        }
    }
}

/// Full Arbiter state for one optimization run.
///
/// Owned by the run's control loop. Concurrent runs each hold their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterState {
    /// Last iteration number seen
    pub iteration: u32,
    /// Every snapshot seen so far, in order
    pub history: Vec<IterationSnapshot>,
    pub best_candidate: BestCandidate,
    /// Consecutive iterations whose vote count met `votes_required`
    pub convergence_streak: u32,
    /// Number of oscillation detections across the run
    pub oscillation_count: u32,
    pub penalties: OperatorPenalties,
}

impl ArbiterState {
    /// Create the state for a run rewriting `seed_text`
    pub fn new(seed_text: impl Into<String>) -> Self {
        Self {
            iteration: 0,
            history: Vec::new(),
            best_candidate: BestCandidate::seed(seed_text),
            convergence_streak: 0,
            oscillation_count: 0,
            penalties: OperatorPenalties::default(),
        }
    }

    /// Append a snapshot and advance the iteration counter
    pub(crate) fn record_snapshot(&mut self, snapshot: IterationSnapshot) {
        self.iteration = snapshot.iteration;
        self.history.push(snapshot);
    }

    /// Tokens spent across the whole history
    pub fn total_tokens(&self) -> u64 {
        self.history.iter().map(|s| s.tokens_used).sum()
    }

    /// Replace the best candidate iff it is still the seed or `score` is
    /// strictly higher.
    ///
    /// Callers must only offer gate-passing snapshots.
    pub(crate) fn offer_candidate(&mut self, snapshot: &IterationSnapshot, score: f64) -> bool {
        if self.best_candidate.is_seed() || score > self.best_candidate.score {
            self.best_candidate = BestCandidate {
                text: snapshot.text.clone(),
                score,
                iteration: snapshot.iteration,
            };
            true
        } else {
            false
        }
    }

    pub(crate) fn update_streak(&mut self, converged: bool) {
        if converged {
            self.convergence_streak += 1;
        } else {
            self.convergence_streak = 0;
        }
    }

    /// The most recent `n` snapshots, oldest first; fewer if history is short
    pub fn recent(&self, n: usize) -> &[IterationSnapshot] {
        &self.history[self.history.len().saturating_sub(n)..]
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        format!(
            "iter={} tokens={} streak={} oscillations={} best_score={:.3} best_iter={}",
            self.iteration,
            self.total_tokens(),
            self.convergence_streak,
            self.oscillation_count,
            self.best_candidate.score,
            self.best_candidate.iteration,
        )
    }
}
