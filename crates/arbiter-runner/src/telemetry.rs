//! Decision log: one JSON line per Arbiter decision.

use std::path::Path;

use arbiter_governor::{ArbiterAction, ArbiterDecision, DecisionTelemetry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

/// A single line of the decision log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    pub action: ArbiterAction,
    pub reason: String,
    pub converged: bool,
    pub telemetry: DecisionTelemetry,
}

impl DecisionLogEntry {
    pub fn new(run_id: Uuid, decision: &ArbiterDecision) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            iteration: decision.telemetry.iteration,
            action: decision.action,
            reason: decision.reason.clone(),
            converged: decision.converged,
            telemetry: decision.telemetry.clone(),
        }
    }
}

/// Append one decision to the JSONL log at `path`.
///
/// Write failures are logged and swallowed; the run carries on without them.
pub fn append_decision_log(path: &Path, run_id: Uuid, decision: &ArbiterDecision) {
    let entry = DecisionLogEntry::new(run_id, decision);
    match serde_json::to_string(&entry) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append decision log: {e}");
                    } else {
                        debug!(
                            path = %path.display(),
                            iteration = entry.iteration,
                            "Appended decision"
                        );
                    }
                }
                Err(e) => warn!("Failed to open decision log {}: {e}", path.display()),
            }
        }
        Err(e) => warn!("Failed to serialize decision: {e}"),
    }
}
