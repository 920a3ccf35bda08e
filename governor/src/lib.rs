//! Arbiter Governor Library
//!
//! Stopping policy for iterative text-rewriting loops that alternate an
//! "expand" and a "compress" phase. After each iteration the [`Arbiter`]
//! compares the new snapshot with its predecessor and returns one of
//! `CONTINUE`, `STOP_ACCEPT`, `STOP_BEST` or `ROLLBACK`.
//!
//! # Components
//!
//! - [`metrics`]: lexical similarity, style divergence, score delta, quality gate
//! - [`arbiter::oscillation`]: A-B-A-B detection over the last four snapshots
//! - [`arbiter::voting`]: five-metric convergence vote
//! - [`arbiter::engine`]: the decision function and its telemetry
//! - [`oracle`]: the semantic-similarity seam with lexical fallback
//!
//! # Usage
//!
//! ```rust,ignore
//! use arbiter_governor::{Arbiter, ArbiterConfig, ArbiterPreset, ArbiterState};
//!
//! let arbiter = Arbiter::new(ArbiterConfig::preset(ArbiterPreset::Tech), oracle)?;
//! let mut state = ArbiterState::new(original_prompt);
//!
//! while let Some(snapshot) = engine.next().await? {
//!     let decision = arbiter.step(snapshot, &mut state).await?;
//!     if decision.action.is_terminal() {
//!         return Ok(decision.text);
//!     }
//! }
//! ```

pub mod arbiter;
pub mod metrics;
pub mod oracle;
pub mod resilience;
pub mod snapshot;

pub use arbiter::{
    Arbiter, ArbiterAction, ArbiterConfig, ArbiterDecision, ArbiterError, ArbiterPreset,
    ArbiterResult, ArbiterState, BestCandidate, BudgetExhaustion, ConfigError, ConfigOverrides,
    DecisionMetrics, DecisionTelemetry, OperatorPenalties,
};
pub use oracle::{OracleError, SemanticOracle, DEFAULT_ORACLE_TIMEOUT, LEXICAL_PROXY};
pub use resilience::{DegradationLevel, DegradedResponse, OracleHealth};
pub use snapshot::{IterationMetrics, IterationSnapshot, Operator, QualityScores};
