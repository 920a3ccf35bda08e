//! Resilience: degraded-mode bookkeeping for the semantic oracle
//!
//! The oracle is the only I/O the Arbiter performs. When it fails, the value
//! is substituted and the substitution is carried as data, never swallowed.
//!
//! ```text
//! similarity(a, b)
//!   ├─ oracle answers in range      → DegradedResponse { level: Full, served_by: <oracle> }
//!   └─ error / timeout / bad value  → DegradedResponse { level: Partial, served_by: "lexical_proxy", warnings }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Consecutive failures after which the oracle is reported unavailable.
const UNAVAILABLE_AFTER: u32 = 3;

/// Consecutive successes needed to report the oracle healthy again.
const RECOVER_AFTER: u32 = 3;

/// How much of the oracle's capability is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Primary source answered.
    Full,
    /// A lower-fidelity substitute answered.
    Partial,
    /// Primary source has failed repeatedly.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// A value wrapped with degradation metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedResponse<T> {
    pub payload: T,
    pub level: DegradationLevel,
    /// Which source produced the payload.
    pub served_by: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> DegradedResponse<T> {
    /// Response from the primary source.
    pub fn full(payload: T, served_by: &str) -> Self {
        Self {
            payload,
            level: DegradationLevel::Full,
            served_by: served_by.to_string(),
            warnings: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Response from a substitute, with the reason it was needed.
    pub fn partial(payload: T, served_by: &str, warning: impl Into<String>) -> Self {
        Self {
            payload,
            level: DegradationLevel::Partial,
            served_by: served_by.to_string(),
            warnings: vec![warning.into()],
            timestamp: Utc::now(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.level != DegradationLevel::Full
    }
}

/// Reliability of the oracle across a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleHealth {
    pub oracle_name: String,
    pub level: DegradationLevel,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub last_error: Option<String>,
    /// When the level last changed.
    pub last_change: DateTime<Utc>,
}

impl OracleHealth {
    pub fn new(oracle_name: &str) -> Self {
        Self {
            oracle_name: oracle_name.to_string(),
            level: DegradationLevel::Full,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_calls: 0,
            total_failures: 0,
            last_error: None,
            last_change: Utc::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        if self.level != DegradationLevel::Full && self.consecutive_successes >= RECOVER_AFTER {
            self.level = DegradationLevel::Full;
            self.last_change = Utc::now();
            self.last_error = None;
        }
    }

    pub fn record_failure(&mut self, error: &str) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_error = Some(error.to_string());

        let new_level = if self.consecutive_failures >= UNAVAILABLE_AFTER {
            DegradationLevel::Unavailable
        } else {
            DegradationLevel::Partial
        };

        if new_level != self.level {
            self.level = new_level;
            self.last_change = Utc::now();
        }
    }

    /// Failure rate as a fraction (0.0–1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}
