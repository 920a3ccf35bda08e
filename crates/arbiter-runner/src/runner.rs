//! The optimization run loop.
//!
//! One run owns exactly one [`ArbiterState`]. Each turn the engine rewrites
//! the text the previous decision handed back, with the operator alternating
//! expand, compress, expand, ... The loop ends on a terminal action or when
//! the engine has nothing left to offer.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use arbiter_governor::{
    Arbiter, ArbiterAction, ArbiterDecision, ArbiterState, IterationSnapshot, Operator,
    OracleHealth,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::IterationEngine;
use crate::telemetry::append_decision_log;

/// How a run ended, from the user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// The Arbiter accepted the final snapshot.
    Converged,
    /// Stopped on budget or oscillation; the best passing candidate is kept.
    StoppedWithBest,
    /// Nothing ever cleared the quality gate; the original input is returned.
    NoPassingCandidate,
    /// The engine ran dry before any terminal decision.
    EngineExhausted,
}

impl fmt::Display for RunVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged, final version accepted"),
            Self::StoppedWithBest => write!(f, "stopped early, best version kept"),
            Self::NoPassingCandidate => write!(
                f,
                "no candidate ever passed the quality gate, original input returned"
            ),
            Self::EngineExhausted => write!(f, "engine ran out of iterations, best version kept"),
        }
    }
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub final_text: String,
    pub verdict: RunVerdict,
    /// Action of the last decision, if any decision was made
    pub final_action: Option<ArbiterAction>,
    pub iterations: u32,
    pub total_tokens: u64,
    pub best_score: f64,
    pub best_iteration: u32,
    pub oracle_health: OracleHealth,
    pub decisions: Vec<ArbiterDecision>,
}

impl RunOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} after {} iteration(s), {} tokens, best score {:.3} (iteration {}), oracle failures {}/{} ({:.0}%)",
            self.run_id,
            self.verdict,
            self.iterations,
            self.total_tokens,
            self.best_score,
            self.best_iteration,
            self.oracle_health.total_failures,
            self.oracle_health.total_calls,
            self.oracle_health.failure_rate() * 100.0,
        )
    }
}

/// Drive one optimization run to completion.
///
/// When `decision_log` is set every decision is appended to it as JSONL.
pub async fn run_optimization(
    engine: &mut dyn IterationEngine,
    arbiter: &Arbiter,
    seed_text: &str,
    decision_log: Option<&Path>,
) -> Result<RunOutcome> {
    let run_id = Uuid::new_v4();
    let mut state = ArbiterState::new(seed_text);
    let mut decisions: Vec<ArbiterDecision> = Vec::new();
    let mut input = seed_text.to_string();
    let mut operator = Operator::Expand;
    let mut prev: Option<IterationSnapshot> = None;

    info!(
        %run_id,
        max_iterations = arbiter.config().budget.max_iterations,
        max_tokens = arbiter.config().budget.max_tokens,
        oracle_timeout_secs = arbiter.oracle_timeout().as_secs(),
        "Starting optimization run"
    );

    loop {
        let iteration = state.iteration + 1;
        let Some(snapshot) = engine
            .next_snapshot(iteration, operator, &input)
            .await
            .with_context(|| format!("Engine failed to produce iteration {}", iteration))?
        else {
            warn!(%run_id, iteration, "Engine exhausted before a terminal decision");
            break;
        };

        let decision = arbiter
            .decide(prev.as_ref(), snapshot, &mut state)
            .await
            .with_context(|| format!("Arbiter rejected iteration {}", iteration))?;

        if let Some(path) = decision_log {
            append_decision_log(path, run_id, &decision);
        }

        prev = next_predecessor(&state, decision.action);
        input = decision.text.clone();
        operator = operator.alternate();

        let terminal = decision.action.is_terminal();
        decisions.push(decision);
        if terminal {
            break;
        }
    }

    let outcome = conclude(run_id, seed_text, &state, arbiter, decisions);
    info!(
        %run_id,
        verdict = %outcome.verdict,
        iterations = outcome.iterations,
        total_tokens = outcome.total_tokens,
        best_score = outcome.best_score,
        "Run finished"
    );
    Ok(outcome)
}

/// After a rollback the engine rewrites the best candidate, so that snapshot
/// becomes the next predecessor. A seed best has no snapshot; fall back to
/// the latest one.
fn next_predecessor(state: &ArbiterState, action: ArbiterAction) -> Option<IterationSnapshot> {
    let best = &state.best_candidate;
    if action == ArbiterAction::Rollback && !best.is_seed() {
        let idx = (best.iteration as usize).saturating_sub(1);
        if let Some(snapshot) = state.history.get(idx) {
            return Some(snapshot.clone());
        }
    }
    state.history.last().cloned()
}

fn conclude(
    run_id: Uuid,
    seed_text: &str,
    state: &ArbiterState,
    arbiter: &Arbiter,
    decisions: Vec<ArbiterDecision>,
) -> RunOutcome {
    let best = &state.best_candidate;
    let last = decisions.last();
    let final_action = last.map(|d| d.action);

    let (verdict, final_text) = match last {
        Some(d) if d.action == ArbiterAction::StopAccept => (RunVerdict::Converged, d.text.clone()),
        Some(_) if best.is_seed() => (RunVerdict::NoPassingCandidate, seed_text.to_string()),
        Some(d) if d.action == ArbiterAction::StopBest => {
            (RunVerdict::StoppedWithBest, d.text.clone())
        }
        _ => (RunVerdict::EngineExhausted, best.text.clone()),
    };

    RunOutcome {
        run_id,
        final_text,
        verdict,
        final_action,
        iterations: state.iteration,
        total_tokens: state.total_tokens(),
        best_score: best.score,
        best_iteration: best.iteration,
        oracle_health: arbiter.oracle_health(),
        decisions,
    }
}
