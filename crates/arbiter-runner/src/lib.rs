//! Arbiter runner: drives optimization runs against the convergence governor.
//!
//! - [`engine`]: snapshot producers, including JSONL transcript replay
//! - [`oracle`]: HTTP semantic oracle and the always-unavailable stand-in
//! - [`config`]: CLI / environment / TOML resolution
//! - [`runner`]: the run loop and its outcome
//! - [`telemetry`]: JSONL decision log

pub mod config;
pub mod engine;
pub mod oracle;
pub mod runner;
pub mod telemetry;

pub use config::{CliOverrides, EnvOverrides, OracleSettings, RunnerConfig};
pub use engine::{IterationEngine, TranscriptEngine};
pub use oracle::{HttpSemanticOracle, UnavailableOracle};
pub use runner::{run_optimization, RunOutcome, RunVerdict};
pub use telemetry::{append_decision_log, DecisionLogEntry};
