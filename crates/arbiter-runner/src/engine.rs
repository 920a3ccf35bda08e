//! Iteration engines: producers of expand/compress snapshots.
//!
//! The Arbiter never generates text itself. An engine receives the text it
//! should rewrite next and the operator to apply, and returns the resulting
//! snapshot (or `None` once it has nothing more to offer).

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use arbiter_governor::{IterationSnapshot, Operator};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Abstraction over snapshot producers.
///
/// `TranscriptEngine` replays a recorded run. Tests can provide a mock
/// implementation.
#[async_trait]
pub trait IterationEngine: Send {
    /// Produce snapshot `iteration` by applying `operator` to `input_text`.
    async fn next_snapshot(
        &mut self,
        iteration: u32,
        operator: Operator,
        input_text: &str,
    ) -> Result<Option<IterationSnapshot>>;
}

/// Replays snapshots recorded one JSON object per line.
///
/// Replay ignores the requested input text: the transcript already holds
/// what the live engine produced.
#[derive(Debug, Clone)]
pub struct TranscriptEngine {
    snapshots: VecDeque<IterationSnapshot>,
}

impl TranscriptEngine {
    pub fn new(snapshots: impl IntoIterator<Item = IterationSnapshot>) -> Self {
        Self {
            snapshots: snapshots.into_iter().collect(),
        }
    }

    /// Parse a JSONL transcript. Blank lines are skipped.
    pub fn from_jsonl(content: &str) -> Result<Self> {
        let snapshots = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str::<IterationSnapshot>(line)
                    .with_context(|| format!("Invalid snapshot on transcript line {}", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(snapshots))
    }

    /// Load a JSONL transcript from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript {}", path.display()))?;
        let engine = Self::from_jsonl(&content)?;
        info!(
            path = %path.display(),
            snapshots = engine.remaining(),
            "Loaded transcript"
        );
        Ok(engine)
    }

    pub fn remaining(&self) -> usize {
        self.snapshots.len()
    }
}

#[async_trait]
impl IterationEngine for TranscriptEngine {
    async fn next_snapshot(
        &mut self,
        iteration: u32,
        operator: Operator,
        _input_text: &str,
    ) -> Result<Option<IterationSnapshot>> {
        let Some(snapshot) = self.snapshots.pop_front() else {
            debug!(iteration, "Transcript exhausted");
            return Ok(None);
        };
        if snapshot.operator != operator {
            warn!(
                iteration,
                expected = %operator,
                recorded = %snapshot.operator,
                "Transcript operator differs from the alternating schedule"
            );
        }
        Ok(Some(snapshot))
    }
}
