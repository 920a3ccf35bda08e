//! Runner configuration resolved from CLI flags, environment and TOML.
//!
//! Precedence, highest first: CLI flag, environment variable, TOML override
//! file, preset.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use arbiter_governor::{ArbiterConfig, ArbiterPreset, ConfigOverrides, DEFAULT_ORACLE_TIMEOUT};
use tracing::debug;

/// Values read from `ARBITER_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub oracle_url: Option<String>,
    pub oracle_api_key: Option<String>,
    pub oracle_timeout_secs: Option<u64>,
    pub max_tokens: Option<u64>,
    pub max_iterations: Option<u32>,
}

impl EnvOverrides {
    /// Read from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary lookup. Unparseable or zero numbers are
    /// ignored; blank strings count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            oracle_url: text("ARBITER_ORACLE_URL"),
            oracle_api_key: text("ARBITER_ORACLE_API_KEY"),
            oracle_timeout_secs: text("ARBITER_ORACLE_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0),
            max_tokens: text("ARBITER_MAX_TOKENS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0),
            max_iterations: text("ARBITER_MAX_ITERATIONS")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub preset: Option<ArbiterPreset>,
    pub config_path: Option<PathBuf>,
    pub oracle_url: Option<String>,
    pub oracle_timeout_secs: Option<u64>,
    pub max_tokens: Option<u64>,
    pub max_iterations: Option<u32>,
}

/// Where the semantic oracle lives, if anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

/// Fully resolved runner configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub arbiter: ArbiterConfig,
    pub oracle: OracleSettings,
}

impl RunnerConfig {
    pub fn resolve(cli: &CliOverrides, env: &EnvOverrides) -> Result<Self> {
        let overrides = match &cli.config_path {
            Some(path) => ConfigOverrides::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ConfigOverrides::default(),
        };
        let mut arbiter = overrides.resolve(cli.preset)?;

        if let Some(max_tokens) = cli.max_tokens.or(env.max_tokens) {
            arbiter.budget.max_tokens = max_tokens;
        }
        if let Some(max_iterations) = cli.max_iterations.or(env.max_iterations) {
            arbiter.budget.max_iterations = max_iterations;
        }
        arbiter
            .validate()
            .context("Invalid budget from command line or environment")?;

        let oracle = OracleSettings {
            url: cli.oracle_url.clone().or_else(|| env.oracle_url.clone()),
            api_key: env.oracle_api_key.clone(),
            timeout: cli
                .oracle_timeout_secs
                .or(env.oracle_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_ORACLE_TIMEOUT),
        };

        debug!(
            max_tokens = arbiter.budget.max_tokens,
            max_iterations = arbiter.budget.max_iterations,
            oracle = oracle.url.as_deref().unwrap_or("none"),
            timeout_secs = oracle.timeout.as_secs(),
            "Resolved runner configuration"
        );
        Ok(Self { arbiter, oracle })
    }
}
