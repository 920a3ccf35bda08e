//! Arbiter error types
//!
//! Only contract violations by the caller are errors. Budget exhaustion,
//! gate failures and oracle outages are ordinary decisions.

use thiserror::Error;

use crate::arbiter::config::ConfigError;

/// Result type alias for Arbiter operations
pub type ArbiterResult<T> = Result<T, ArbiterError>;

#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("Malformed snapshot at iteration {iteration}: {reason}")]
    MalformedSnapshot { iteration: u32, reason: String },

    #[error("Snapshot out of sequence: expected iteration {expected}, got {got}")]
    IterationOutOfSequence { expected: u32, got: u32 },

    #[error("Predecessor iteration {prev} is not before current iteration {curr}")]
    InvalidPredecessor { prev: u32, curr: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ArbiterError {
    pub(crate) fn malformed(iteration: u32, reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            iteration,
            reason: reason.into(),
        }
    }
}
