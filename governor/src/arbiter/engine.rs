//! Arbiter Engine: the per-iteration stopping decision
//!
//! Consumes one snapshot per call, threads it through an [`ArbiterState`]
//! owned by the caller, and returns an [`ArbiterDecision`]. The only I/O is
//! the semantic oracle; everything else is deterministic.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arbiter::config::ArbiterConfig;
use crate::arbiter::error::{ArbiterError, ArbiterResult};
use crate::arbiter::oscillation::{OscillationDetector, OscillationReading, WINDOW};
use crate::arbiter::state::{ArbiterState, OperatorPenalties, GATE_FAILURE_PENALTY};
use crate::arbiter::voting::{cast_votes, VoteBreakdown};
use crate::metrics::{
    gate_threshold, length_delta, lexical_similarity, quality_gate_passed, score_delta,
    style_delta,
};
use crate::oracle::{semantic_similarity, SemanticOracle, DEFAULT_ORACLE_TIMEOUT};
use crate::resilience::{DegradationLevel, OracleHealth};
use crate::snapshot::{IterationMetrics, IterationSnapshot};

/// Oscillation detections required before the run is stopped on oscillation
const OSCILLATION_STOP_COUNT: u32 = 2;

/// Control action returned to the iteration loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArbiterAction {
    /// Keep iterating from the returned text
    Continue,
    /// Converged; the returned text is final
    StopAccept,
    /// Stop and keep the best candidate seen so far
    StopBest,
    /// Discard the current snapshot and resume from the best candidate
    Rollback,
}

impl ArbiterAction {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StopAccept | Self::StopBest)
    }
}

impl std::fmt::Display for ArbiterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::StopAccept => write!(f, "STOP_ACCEPT"),
            Self::StopBest => write!(f, "STOP_BEST"),
            Self::Rollback => write!(f, "ROLLBACK"),
        }
    }
}

/// Headline signals behind a decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub votes: u32,
    pub convergence_streak: u32,
    pub quality_gate: bool,
    pub oscillation_detected: bool,
}

/// Which budget ceiling stopped the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "ceiling")]
pub enum BudgetExhaustion {
    Tokens { used: u64, max: u64 },
    Iterations { reached: u32, max: u32 },
}

impl std::fmt::Display for BudgetExhaustion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tokens { used, max } => write!(f, "token budget exhausted ({}/{})", used, max),
            Self::Iterations { reached, max } => {
                write!(f, "iteration limit reached ({}/{})", reached, max)
            }
        }
    }
}

/// Everything a reviewer needs to audit why the loop did what it did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTelemetry {
    pub iteration: u32,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_exhausted: Option<BudgetExhaustion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<IterationMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_breakdown: Option<VoteBreakdown>,
    pub votes: u32,
    pub votes_required: u32,
    pub convergence_streak: u32,
    pub patience: u32,
    pub quality_gate: bool,
    pub gate_threshold: f64,
    pub candidate_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oscillation: Option<OscillationReading>,
    pub oscillation_detected: bool,
    pub oscillation_count: u32,
    pub best_score: f64,
    pub best_iteration: u32,
    /// No snapshot has passed the quality gate yet
    pub best_is_seed: bool,
    pub best_updated: bool,
    /// Who produced the semantic metric: the oracle's name or the lexical proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_level: Option<DegradationLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oracle_warnings: Vec<String>,
    pub penalties: OperatorPenalties,
}

impl DecisionTelemetry {
    fn baseline(state: &ArbiterState, config: &ArbiterConfig, snapshot: &IterationSnapshot) -> Self {
        Self {
            iteration: state.iteration,
            total_tokens: state.total_tokens(),
            budget_exhausted: None,
            metrics: None,
            vote_breakdown: None,
            votes: 0,
            votes_required: config.convergence.votes_required,
            convergence_streak: state.convergence_streak,
            patience: config.convergence.patience,
            quality_gate: false,
            gate_threshold: gate_threshold(&snapshot.scores, &config.quality_gates),
            candidate_score: snapshot.scores.candidate_score(),
            oscillation: None,
            oscillation_detected: false,
            oscillation_count: state.oscillation_count,
            best_score: state.best_candidate.score,
            best_iteration: state.best_candidate.iteration,
            best_is_seed: state.best_candidate.is_seed(),
            best_updated: false,
            semantic_source: None,
            semantic_level: None,
            oracle_warnings: Vec::new(),
            penalties: state.penalties,
        }
    }

    /// Refresh the fields that track the accumulator
    fn sync(&mut self, state: &ArbiterState) {
        self.convergence_streak = state.convergence_streak;
        self.oscillation_count = state.oscillation_count;
        self.best_score = state.best_candidate.score;
        self.best_iteration = state.best_candidate.iteration;
        self.best_is_seed = state.best_candidate.is_seed();
        self.penalties = state.penalties;
    }
}

/// Decision produced by the Arbiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    pub action: ArbiterAction,
    pub reason: String,
    /// Text the loop should carry forward (or return, for terminal actions)
    pub text: String,
    pub converged: bool,
    pub metrics: DecisionMetrics,
    pub telemetry: DecisionTelemetry,
}

impl ArbiterDecision {
    /// Telemetry as a flat JSON object
    pub fn telemetry_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(&self.telemetry) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// The Arbiter: convergence governor for one or more runs.
///
/// Holds no per-run state; each run threads its own [`ArbiterState`].
pub struct Arbiter {
    config: ArbiterConfig,
    oracle: Arc<dyn SemanticOracle>,
    oracle_timeout: Duration,
    health: Mutex<OracleHealth>,
}

impl Arbiter {
    /// Create an Arbiter, rejecting invalid configuration
    pub fn new(config: ArbiterConfig, oracle: Arc<dyn SemanticOracle>) -> ArbiterResult<Self> {
        config.validate()?;
        let health = Mutex::new(OracleHealth::new(oracle.name()));
        Ok(Self {
            config,
            oracle,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
            health,
        })
    }

    /// Override the per-call oracle timeout
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn oracle_timeout(&self) -> Duration {
        self.oracle_timeout
    }

    /// Snapshot of oracle reliability so far
    pub fn oracle_health(&self) -> OracleHealth {
        self.health_guard().clone()
    }

    fn health_guard(&self) -> MutexGuard<'_, OracleHealth> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide using the last history entry as predecessor
    pub async fn step(
        &self,
        curr: IterationSnapshot,
        state: &mut ArbiterState,
    ) -> ArbiterResult<ArbiterDecision> {
        let prev = state.history.last().cloned();
        self.decide(prev.as_ref(), curr, state).await
    }

    /// Process one snapshot and produce a decision
    ///
    /// In order:
    /// 1. Append the snapshot to history
    /// 2. Budget ceilings (override everything)
    /// 3. First iteration: seed the best candidate, continue
    /// 4. Metrics against `prev`, attached to the stored snapshot
    /// 5. Vote and update the convergence streak
    /// 6. Quality gate and oscillation check
    /// 7. Best-candidate update
    /// 8. Gate failure > convergence > oscillation > continue
    pub async fn decide(
        &self,
        prev: Option<&IterationSnapshot>,
        curr: IterationSnapshot,
        state: &mut ArbiterState,
    ) -> ArbiterResult<ArbiterDecision> {
        Self::validate(prev, &curr, state)?;

        let cfg = &self.config;
        let mut telemetry = DecisionTelemetry::baseline(state, cfg, &curr);
        state.record_snapshot(curr.clone());
        telemetry.iteration = state.iteration;
        telemetry.total_tokens = state.total_tokens();

        if let Some(exhausted) = self.budget_exhausted(state) {
            warn!(summary = %state.summary(), "{}", exhausted);
            telemetry.budget_exhausted = Some(exhausted);
            telemetry.sync(state);
            return Ok(self.finish(
                ArbiterAction::StopBest,
                format!("{}; returning best candidate", exhausted),
                state.best_candidate.text.clone(),
                false,
                telemetry,
            ));
        }

        let Some(prev) = prev else {
            let gate = quality_gate_passed(&curr.scores, &cfg.quality_gates);
            telemetry.quality_gate = gate;
            if gate {
                telemetry.best_updated =
                    state.offer_candidate(&curr, curr.scores.candidate_score());
            }
            telemetry.sync(state);
            return Ok(self.finish(
                ArbiterAction::Continue,
                "first iteration; nothing to compare against".to_string(),
                curr.text,
                false,
                telemetry,
            ));
        };

        let (semantic, oracle_outcome) =
            semantic_similarity(self.oracle.as_ref(), &prev.text, &curr.text, self.oracle_timeout)
                .await;
        {
            let mut health = self.health_guard();
            match &oracle_outcome {
                Ok(()) => health.record_success(),
                Err(e) => health.record_failure(&e.to_string()),
            }
        }

        let metrics = IterationMetrics {
            semantic: semantic.payload,
            lexical: lexical_similarity(&prev.text, &curr.text),
            length_delta: length_delta(&prev.text, &curr.text),
            style_delta: style_delta(&prev.text, &curr.text),
            score_delta: score_delta(&prev.scores, &curr.scores),
        };
        if let Some(stored) = state.history.last_mut() {
            stored.metrics = Some(metrics);
        }
        debug!(
            iteration = curr.iteration,
            semantic = metrics.semantic,
            lexical = metrics.lexical,
            length_delta = metrics.length_delta,
            style_delta = metrics.style_delta,
            score_delta = metrics.score_delta,
            degraded = semantic.is_degraded(),
            "Computed iteration metrics"
        );
        telemetry.metrics = Some(metrics);
        telemetry.semantic_source = Some(semantic.served_by.clone());
        telemetry.semantic_level = Some(semantic.level);
        telemetry.oracle_warnings = semantic.warnings;

        let vote = cast_votes(&metrics, &cfg.thresholds, &cfg.convergence);
        state.update_streak(vote.converged);
        telemetry.vote_breakdown = Some(vote.breakdown);
        telemetry.votes = vote.votes;

        let gate = quality_gate_passed(&curr.scores, &cfg.quality_gates);
        telemetry.quality_gate = gate;

        let oscillation = OscillationDetector::inspect(state.recent(WINDOW));
        let oscillating = oscillation.is_some_and(|r| r.detected);
        if oscillating {
            state.oscillation_count += 1;
        }
        telemetry.oscillation = oscillation;
        telemetry.oscillation_detected = oscillating;

        if gate {
            telemetry.best_updated = state.offer_candidate(&curr, curr.scores.candidate_score());
        }

        let (action, reason, text, converged) = if !gate {
            state.penalties.charge(curr.operator, GATE_FAILURE_PENALTY);
            (
                ArbiterAction::Rollback,
                format!(
                    "quality gate failed (F={:.3} N={:.3} M={:.3}, floor {:.3}); {} penalised (total {:.2}), back to best candidate from iteration {}",
                    curr.scores.f,
                    curr.scores.n,
                    curr.scores.m,
                    telemetry.gate_threshold,
                    curr.operator,
                    state.penalties.get(curr.operator),
                    state.best_candidate.iteration,
                ),
                state.best_candidate.text.clone(),
                false,
            )
        } else if state.convergence_streak >= cfg.convergence.patience {
            (
                ArbiterAction::StopAccept,
                format!(
                    "converged: {} consecutive iterations with >= {} votes",
                    state.convergence_streak, cfg.convergence.votes_required
                ),
                curr.text,
                true,
            )
        } else if oscillating && state.oscillation_count >= OSCILLATION_STOP_COUNT {
            (
                ArbiterAction::StopBest,
                format!(
                    "oscillation detected {} times; returning best candidate",
                    state.oscillation_count
                ),
                state.best_candidate.text.clone(),
                false,
            )
        } else {
            (
                ArbiterAction::Continue,
                format!(
                    "{}/{} votes, streak {}/{}",
                    vote.votes,
                    cfg.convergence.votes_required,
                    state.convergence_streak,
                    cfg.convergence.patience
                ),
                curr.text,
                false,
            )
        };

        telemetry.sync(state);
        Ok(self.finish(action, reason, text, converged, telemetry))
    }

    fn finish(
        &self,
        action: ArbiterAction,
        reason: String,
        text: String,
        converged: bool,
        telemetry: DecisionTelemetry,
    ) -> ArbiterDecision {
        info!(
            iteration = telemetry.iteration,
            action = %action,
            votes = telemetry.votes,
            streak = telemetry.convergence_streak,
            quality_gate = telemetry.quality_gate,
            oscillation = telemetry.oscillation_detected,
            best_score = telemetry.best_score,
            "{}",
            reason
        );
        ArbiterDecision {
            action,
            reason,
            text,
            converged,
            metrics: DecisionMetrics {
                votes: telemetry.votes,
                convergence_streak: telemetry.convergence_streak,
                quality_gate: telemetry.quality_gate,
                oscillation_detected: telemetry.oscillation_detected,
            },
            telemetry,
        }
    }

    fn budget_exhausted(&self, state: &ArbiterState) -> Option<BudgetExhaustion> {
        let budget = &self.config.budget;
        let used = state.total_tokens();
        if used >= budget.max_tokens {
            return Some(BudgetExhaustion::Tokens {
                used,
                max: budget.max_tokens,
            });
        }
        if state.iteration >= budget.max_iterations {
            return Some(BudgetExhaustion::Iterations {
                reached: state.iteration,
                max: budget.max_iterations,
            });
        }
        None
    }

    /// Fail fast on contract violations by the iteration engine
    fn validate(
        prev: Option<&IterationSnapshot>,
        curr: &IterationSnapshot,
        state: &ArbiterState,
    ) -> ArbiterResult<()> {
        if curr.iteration == 0 {
            return Err(ArbiterError::malformed(0, "iterations are numbered from 1"));
        }
        if let Some(axis) = curr.scores.first_non_finite() {
            return Err(ArbiterError::malformed(
                curr.iteration,
                format!("score axis {} is not a finite number", axis),
            ));
        }
        if curr.text.trim().is_empty() {
            return Err(ArbiterError::malformed(curr.iteration, "snapshot text is empty"));
        }

        let expected = state.history.len() as u32 + 1;
        if curr.iteration != expected {
            return Err(ArbiterError::IterationOutOfSequence {
                expected,
                got: curr.iteration,
            });
        }

        if let Some(prev) = prev {
            if prev.iteration >= curr.iteration {
                return Err(ArbiterError::InvalidPredecessor {
                    prev: prev.iteration,
                    curr: curr.iteration,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::snapshot::{Operator, QualityScores};
    use async_trait::async_trait;

    struct Fixed(f64);

    #[async_trait]
    impl SemanticOracle for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn similarity(&self, _: &str, _: &str) -> Result<f64, OracleError> {
            Ok(self.0)
        }
    }

    fn arbiter(config: ArbiterConfig) -> Arbiter {
        Arbiter::new(config, Arc::new(Fixed(0.99))).unwrap()
    }

    fn passing() -> QualityScores {
        QualityScores::new(0.9, 0.9, 0.9, 0.9, 0.0)
    }

    fn snap(iteration: u32, text: &str, scores: QualityScores) -> IterationSnapshot {
        let operator = if iteration % 2 == 1 { Operator::Expand } else { Operator::Compress };
        IterationSnapshot::new(iteration, text, operator, scores, 100)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ArbiterConfig::TECH;
        config.convergence.patience = 0;
        assert!(matches!(
            Arbiter::new(config, Arc::new(Fixed(1.0))),
            Err(ArbiterError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_first_iteration_continues_and_seeds_best() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");

        let d = arbiter
            .decide(None, snap(1, "first draft", passing()), &mut state)
            .await
            .unwrap();

        assert_eq!(d.action, ArbiterAction::Continue);
        assert_eq!(d.text, "first draft");
        assert!(d.metrics.quality_gate);
        assert!(d.telemetry.best_updated);
        assert!(!d.telemetry.best_is_seed);
        assert_eq!(state.best_candidate.iteration, 1);
        assert!(state.history[0].metrics.is_none());
    }

    #[tokio::test]
    async fn test_first_iteration_failing_gate_keeps_seed() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");
        let weak = QualityScores::new(0.9, 0.2, 0.2, 0.2, 0.0);

        let d = arbiter.step(snap(1, "weak draft", weak), &mut state).await.unwrap();

        assert_eq!(d.action, ArbiterAction::Continue);
        assert!(!d.metrics.quality_gate);
        assert!(state.best_candidate.is_seed());
        assert_eq!(state.best_candidate.text, "seed");
    }

    #[tokio::test]
    async fn test_metrics_attached_to_history() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");
        arbiter.step(snap(1, "one two three", passing()), &mut state).await.unwrap();
        let d = arbiter.step(snap(2, "one two four", passing()), &mut state).await.unwrap();

        let stored = state.history[1].metrics.unwrap();
        assert_eq!(Some(stored), d.telemetry.metrics);
        assert_eq!(stored.semantic, 0.99);
        assert_eq!(d.telemetry.semantic_source.as_deref(), Some("fixed"));
        assert_eq!(d.telemetry.semantic_level, Some(DegradationLevel::Full));
    }

    #[tokio::test]
    async fn test_rollback_charges_operator() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");
        arbiter.step(snap(1, "good draft", passing()), &mut state).await.unwrap();

        let bad = QualityScores::new(0.9, 0.9, 0.1, 0.9, 0.0);
        let d = arbiter.step(snap(2, "bad draft", bad), &mut state).await.unwrap();

        assert_eq!(d.action, ArbiterAction::Rollback);
        assert_eq!(d.text, "good draft");
        assert!(!d.converged);
        assert!((state.penalties.compress - GATE_FAILURE_PENALTY).abs() < 1e-12);
        assert_eq!(state.penalties.expand, 0.0);
        assert_eq!(d.telemetry.penalties, state.penalties);
    }

    #[tokio::test]
    async fn test_budget_tokens_stop_best() {
        let mut config = ArbiterConfig::TECH;
        config.budget.max_tokens = 150;
        let arbiter = arbiter(config);
        let mut state = ArbiterState::new("seed");

        arbiter.step(snap(1, "draft", passing()), &mut state).await.unwrap();
        let d = arbiter.step(snap(2, "draft two", passing()), &mut state).await.unwrap();

        assert_eq!(d.action, ArbiterAction::StopBest);
        assert_eq!(d.text, "draft");
        assert_eq!(
            d.telemetry.budget_exhausted,
            Some(BudgetExhaustion::Tokens { used: 200, max: 150 })
        );
        assert_eq!(state.history.len(), 2);
        assert!(state.history[1].metrics.is_none());
    }

    #[tokio::test]
    async fn test_budget_on_seed_returns_original_text() {
        let mut config = ArbiterConfig::TECH;
        config.budget.max_iterations = 1;
        let arbiter = arbiter(config);
        let mut state = ArbiterState::new("the original prompt");

        let d = arbiter.step(snap(1, "draft", passing()), &mut state).await.unwrap();
        assert_eq!(d.action, ArbiterAction::StopBest);
        assert_eq!(d.text, "the original prompt");
        assert!(d.telemetry.best_is_seed);
    }

    #[tokio::test]
    async fn test_malformed_inputs_rejected() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");

        let nan = QualityScores::new(0.9, f64::NAN, 0.9, 0.9, 0.0);
        let err = arbiter.step(snap(1, "text", nan), &mut state).await.unwrap_err();
        assert!(matches!(err, ArbiterError::MalformedSnapshot { iteration: 1, .. }));

        let err = arbiter.step(snap(1, "   ", passing()), &mut state).await.unwrap_err();
        assert!(matches!(err, ArbiterError::MalformedSnapshot { .. }));

        let err = arbiter.step(snap(0, "text", passing()), &mut state).await.unwrap_err();
        assert!(matches!(err, ArbiterError::MalformedSnapshot { iteration: 0, .. }));

        let err = arbiter.step(snap(3, "text", passing()), &mut state).await.unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::IterationOutOfSequence { expected: 1, got: 3 }
        ));

        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_predecessor_must_precede() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");
        arbiter.step(snap(1, "a", passing()), &mut state).await.unwrap();

        let future = snap(5, "later", passing());
        let err = arbiter
            .decide(Some(&future), snap(2, "b", passing()), &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidPredecessor { prev: 5, curr: 2 }));
    }

    #[tokio::test]
    async fn test_telemetry_map_has_audit_fields() {
        let arbiter = arbiter(ArbiterConfig::TECH);
        let mut state = ArbiterState::new("seed");
        arbiter.step(snap(1, "a b c", passing()), &mut state).await.unwrap();
        let d = arbiter.step(snap(2, "a b d", passing()), &mut state).await.unwrap();

        let map = d.telemetry_map();
        for key in ["metrics", "votes", "quality_gate", "oscillation_detected", "convergence_streak"] {
            assert!(map.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_action_display_and_terminal() {
        assert_eq!(ArbiterAction::StopAccept.to_string(), "STOP_ACCEPT");
        assert!(ArbiterAction::StopBest.is_terminal());
        assert!(!ArbiterAction::Rollback.is_terminal());
        assert_eq!(
            serde_json::to_string(&ArbiterAction::StopBest).unwrap(),
            "\"STOP_BEST\""
        );
    }
}
