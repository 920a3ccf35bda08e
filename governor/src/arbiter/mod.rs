//! Arbiter: Convergence Governor for Expand/Compress Rewrite Loops
//!
//! Decides after every iteration whether the loop should keep going, accept
//! the current text, roll back, or stop with the best text seen so far.
//! Apart from the semantic oracle call, every decision is deterministic.
//!
//! # Decision Ladder
//!
//! ```text
//! snapshot N arrives
//!     │
//!     ├─ tokens ≥ max_tokens or N ≥ max_iterations → STOP_BEST (best candidate)
//!     ├─ no predecessor                             → CONTINUE (seed best candidate)
//!     │
//!     ▼
//! metrics vs N-1: semantic · lexical · length · style · score
//!     │  one vote per metric inside its threshold
//!     │  votes ≥ votes_required → streak += 1, else streak = 0
//!     │
//!     ├─ F/N/M below bias-adjusted floor            → ROLLBACK (penalise operator)
//!     ├─ streak ≥ patience                          → STOP_ACCEPT (current text)
//!     ├─ A-B-A-B pattern, seen ≥ 2 times            → STOP_BEST
//!     └─ otherwise                                  → CONTINUE
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod oscillation;
pub mod state;
pub mod voting;

pub use config::{
    ArbiterConfig, ArbiterPreset, Budget, ConfigError, ConfigOverrides, ConvergencePolicy,
    QualityGates, Thresholds,
};
pub use engine::{
    Arbiter, ArbiterAction, ArbiterDecision, BudgetExhaustion, DecisionMetrics, DecisionTelemetry,
};
pub use error::{ArbiterError, ArbiterResult};
pub use oscillation::{OscillationDetector, OscillationReading};
pub use state::{ArbiterState, BestCandidate, OperatorPenalties, GATE_FAILURE_PENALTY};
pub use voting::{cast_votes, VoteBreakdown, VoteOutcome};
