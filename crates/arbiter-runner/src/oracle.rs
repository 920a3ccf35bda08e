//! Semantic-oracle adapters.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use arbiter_governor::{OracleError, SemanticOracle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    text_a: &'a str,
    text_b: &'a str,
}

#[derive(Debug, Deserialize)]
struct SimilarityResponse {
    similarity: f64,
}

/// Oracle backed by an HTTP similarity endpoint.
///
/// POSTs `{"text_a", "text_b"}` and expects `{"similarity": <0..1>}`.
pub struct HttpSemanticOracle {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpSemanticOracle {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for semantic oracle")?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl SemanticOracle for HttpSemanticOracle {
    fn name(&self) -> &str {
        &self.endpoint
    }

    async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f64, OracleError> {
        let start = Instant::now();

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SimilarityRequest { text_a, text_b });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let body: SimilarityResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Transport(format!("invalid response body: {}", e)))?;

        debug!(
            endpoint = %self.endpoint,
            similarity = body.similarity,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Semantic oracle answered"
        );
        Ok(body.similarity)
    }
}

/// Stand-in when no oracle endpoint is configured; every call fails so the
/// Arbiter always uses its lexical proxy.
#[derive(Debug, Clone, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl SemanticOracle for UnavailableOracle {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn similarity(&self, _: &str, _: &str) -> Result<f64, OracleError> {
        Err(OracleError::Unavailable(
            "no semantic oracle endpoint configured".to_string(),
        ))
    }
}
