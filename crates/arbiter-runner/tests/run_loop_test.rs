//! End-to-end tests for the run loop with scripted engines and oracles.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use arbiter_governor::{
    Arbiter, ArbiterAction, ArbiterConfig, IterationSnapshot, Operator, OracleError,
    QualityScores, SemanticOracle,
};
use arbiter_runner::{
    run_optimization, DecisionLogEntry, IterationEngine, RunVerdict, TranscriptEngine,
    UnavailableOracle,
};
use async_trait::async_trait;

struct FixedOracle(f64);

#[async_trait]
impl SemanticOracle for FixedOracle {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn similarity(&self, _: &str, _: &str) -> Result<f64, OracleError> {
        Ok(self.0)
    }
}

/// Engine that hands out prepared snapshots and remembers what it was asked.
struct ScriptedEngine {
    script: VecDeque<IterationSnapshot>,
    requests: Vec<(u32, Operator, String)>,
}

impl ScriptedEngine {
    fn new(script: Vec<IterationSnapshot>) -> Self {
        Self {
            script: script.into(),
            requests: Vec::new(),
        }
    }

    fn inputs(&self) -> Vec<&str> {
        self.requests.iter().map(|(_, _, t)| t.as_str()).collect()
    }

    fn operators(&self) -> Vec<Operator> {
        self.requests.iter().map(|(_, op, _)| *op).collect()
    }
}

#[async_trait]
impl IterationEngine for ScriptedEngine {
    async fn next_snapshot(
        &mut self,
        iteration: u32,
        operator: Operator,
        input_text: &str,
    ) -> Result<Option<IterationSnapshot>> {
        self.requests
            .push((iteration, operator, input_text.to_string()));
        Ok(self.script.pop_front())
    }
}

struct BrokenEngine;

#[async_trait]
impl IterationEngine for BrokenEngine {
    async fn next_snapshot(
        &mut self,
        _: u32,
        _: Operator,
        _: &str,
    ) -> Result<Option<IterationSnapshot>> {
        anyhow::bail!("model endpoint returned 500")
    }
}

fn scores(fnm: f64) -> QualityScores {
    QualityScores::new(0.9, fnm, fnm, fnm, 0.0)
}

fn snap(iteration: u32, text: &str, scores: QualityScores) -> IterationSnapshot {
    let operator = if iteration % 2 == 1 {
        Operator::Expand
    } else {
        Operator::Compress
    };
    IterationSnapshot::new(iteration, text, operator, scores, 500)
}

fn arbiter_with(config: ArbiterConfig, similarity: f64) -> Arbiter {
    Arbiter::new(config, Arc::new(FixedOracle(similarity))).unwrap()
}

const SEED: &str = "Write a prompt that summarises incident reports.";
const ALPHA: &str = "Alpha text version one";
const BETA: &str = "Beta text version two";

#[tokio::test]
async fn converging_run_is_accepted() {
    let mut config = ArbiterConfig::TECH;
    config.convergence.patience = 1;
    let arbiter = arbiter_with(config, 0.5);

    let text = "Summarise the incident report for executives.";
    let mut engine = ScriptedEngine::new(vec![
        snap(1, text, scores(0.9)),
        snap(2, &format!("{text} "), scores(0.9)),
        snap(3, "never requested", scores(0.9)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.verdict, RunVerdict::Converged);
    assert_eq!(outcome.final_action, Some(ArbiterAction::StopAccept));
    assert_eq!(outcome.final_text, format!("{text} "));
    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.total_tokens, 1_000);
    assert_eq!(outcome.decisions.len(), 2);
    assert_eq!(engine.operators(), vec![Operator::Expand, Operator::Compress]);
    assert_eq!(engine.inputs(), vec![SEED, text]);
    assert_eq!(engine.script.len(), 1);
}

#[tokio::test]
async fn rollback_rewrites_from_best_candidate() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 1.0);

    let failing = QualityScores::new(0.9, 0.9, 0.9, 0.2, 0.0);
    let mut engine = ScriptedEngine::new(vec![
        snap(1, "Stable text.", scores(0.9)),
        snap(2, "Stable text.", failing),
        snap(3, "Stable text.", scores(0.9)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.decisions[1].action, ArbiterAction::Rollback);
    assert_eq!(engine.inputs(), vec![SEED, "Stable text.", "Stable text."]);

    // The third snapshot was compared with the best candidate (iteration 1),
    // not with the gate failure that preceded it.
    let third = &outcome.decisions[2];
    let metrics = third.telemetry.metrics.unwrap();
    assert_eq!(metrics.score_delta, 0.0);

    assert_eq!(third.action, ArbiterAction::StopAccept);
    assert_eq!(outcome.verdict, RunVerdict::Converged);
    assert_eq!(outcome.best_iteration, 1);
}

#[tokio::test]
async fn oscillating_run_stops_with_best() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let mut engine = ScriptedEngine::new(vec![
        snap(1, ALPHA, scores(0.80)),
        snap(2, BETA, scores(0.90)),
        snap(3, ALPHA, scores(0.80)),
        snap(4, BETA, scores(0.90)),
        snap(5, ALPHA, scores(0.80)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.verdict, RunVerdict::StoppedWithBest);
    assert_eq!(outcome.verdict.to_string(), "stopped early, best version kept");
    assert_eq!(outcome.final_action, Some(ArbiterAction::StopBest));
    assert_eq!(outcome.final_text, BETA);
    assert_eq!(outcome.best_iteration, 2);
    assert_eq!(outcome.iterations, 5);
}

#[tokio::test]
async fn no_passing_candidate_returns_seed() {
    let mut config = ArbiterConfig::TECH;
    config.budget.max_iterations = 3;
    let arbiter = arbiter_with(config, 0.5);

    let mut engine = ScriptedEngine::new(vec![
        snap(1, "Weak first attempt", scores(0.2)),
        snap(2, "Weak second attempt, longer", scores(0.3)),
        snap(3, "Weak third attempt", scores(0.2)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.decisions[1].action, ArbiterAction::Rollback);
    assert_eq!(outcome.final_action, Some(ArbiterAction::StopBest));
    assert_eq!(outcome.verdict, RunVerdict::NoPassingCandidate);
    assert_eq!(outcome.final_text, SEED);
    assert_eq!(outcome.best_iteration, 0);
    // After the rollback the engine is asked to rewrite the seed again.
    assert_eq!(engine.inputs()[2], SEED);
    assert!(outcome.decisions.iter().all(|d| d.telemetry.best_is_seed));
}

#[tokio::test]
async fn zero_score_passing_candidate_is_not_reported_as_seed() {
    let mut config = ArbiterConfig::TECH;
    config.quality_gates.min_fnm = 0.0;
    config.budget.max_iterations = 2;
    let arbiter = arbiter_with(config, 0.5);

    let mut engine = ScriptedEngine::new(vec![
        snap(1, "Floor-level draft.", scores(0.0)),
        snap(2, "Another floor-level draft.", scores(0.0)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.verdict, RunVerdict::StoppedWithBest);
    assert_eq!(outcome.final_text, "Floor-level draft.");
    assert_eq!(outcome.best_iteration, 1);
}

#[tokio::test]
async fn exhausted_engine_keeps_best_version() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let mut engine = ScriptedEngine::new(vec![
        snap(1, ALPHA, scores(0.80)),
        snap(2, BETA, scores(0.90)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.verdict, RunVerdict::EngineExhausted);
    assert_eq!(outcome.final_action, Some(ArbiterAction::Continue));
    assert_eq!(outcome.final_text, BETA);
    assert_eq!(outcome.iterations, 2);
    assert_eq!(engine.requests.len(), 3);
}

#[tokio::test]
async fn empty_engine_returns_seed() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let mut engine = ScriptedEngine::new(Vec::new());

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.verdict, RunVerdict::EngineExhausted);
    assert_eq!(outcome.final_action, None);
    assert_eq!(outcome.final_text, SEED);
    assert_eq!(outcome.iterations, 0);
    assert!(outcome.decisions.is_empty());
}

#[tokio::test]
async fn engine_failure_aborts_the_run() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let err = run_optimization(&mut BrokenEngine, &arbiter, SEED, None)
        .await
        .unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("iteration 1"), "{chain}");
    assert!(chain.contains("500"), "{chain}");
}

#[tokio::test]
async fn out_of_sequence_snapshot_is_rejected() {
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let mut engine = ScriptedEngine::new(vec![snap(3, ALPHA, scores(0.9))]);
    let err = run_optimization(&mut engine, &arbiter, SEED, None)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("Arbiter rejected iteration 1"));
}

#[tokio::test]
async fn unconfigured_oracle_is_tracked_in_outcome() {
    let arbiter = Arbiter::new(ArbiterConfig::TECH, Arc::new(UnavailableOracle)).unwrap();
    let mut engine = ScriptedEngine::new(vec![
        snap(1, ALPHA, scores(0.80)),
        snap(2, BETA, scores(0.90)),
        snap(3, ALPHA, scores(0.85)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();

    assert_eq!(outcome.oracle_health.total_calls, 2);
    assert_eq!(outcome.oracle_health.total_failures, 2);
    assert!(outcome.decisions[1..]
        .iter()
        .all(|d| !d.telemetry.oracle_warnings.is_empty()));
}

#[tokio::test]
async fn decision_log_records_every_decision() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("decisions.jsonl");
    let arbiter = arbiter_with(ArbiterConfig::TECH, 0.5);
    let mut engine = ScriptedEngine::new(vec![
        snap(1, ALPHA, scores(0.80)),
        snap(2, BETA, scores(0.90)),
        snap(3, ALPHA, scores(0.80)),
    ]);

    let outcome = run_optimization(&mut engine, &arbiter, SEED, Some(&log))
        .await
        .unwrap();

    let entries: Vec<DecisionLogEntry> = std::fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(entries.len(), outcome.decisions.len());
    assert!(entries.iter().all(|e| e.run_id == outcome.run_id));
    let iterations: Vec<u32> = entries.iter().map(|e| e.iteration).collect();
    assert_eq!(iterations, vec![1, 2, 3]);
}

#[tokio::test]
async fn transcript_replay_drives_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    let text = "Summarise the incident report for executives.";
    let lines: Vec<String> = [
        snap(1, text, scores(0.9)),
        snap(2, &format!("{text} "), scores(0.9)),
    ]
    .iter()
    .map(|s| serde_json::to_string(s).unwrap())
    .collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let mut config = ArbiterConfig::TECH;
    config.convergence.patience = 1;
    let arbiter = arbiter_with(config, 0.5);
    let mut engine = TranscriptEngine::from_file(&path).unwrap();

    let outcome = run_optimization(&mut engine, &arbiter, SEED, None).await.unwrap();
    assert_eq!(outcome.verdict, RunVerdict::Converged);
    assert_eq!(engine.remaining(), 0);
}
