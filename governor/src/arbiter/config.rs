//! Arbiter configuration: named presets plus an explicit override path
//!
//! Two presets ship with the governor:
//!
//! | preset     | semantic | lexical | length | style | efmn | gate |
//! |------------|----------|---------|--------|-------|------|------|
//! | `tech`     | ≥0.985   | ≥0.98   | ≤0.03  | ≤0.05 | ≤0.05| 0.70 |
//! | `creative` | ≥0.97    | ≥0.95   | ≤0.05  | ≤0.10 | ≤0.08| 0.65 |
//!
//! Both require 3 votes, a patience of 2, and share a 100k-token /
//! 10-iteration budget. A TOML document can pick a preset and override any
//! subset of fields:
//!
//! ```toml
//! preset = "creative"
//!
//! [convergence]
//! patience = 3
//!
//! [budget]
//! max_iterations = 14
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token ceiling shared by both presets.
const DEFAULT_MAX_TOKENS: u64 = 100_000;

/// Default iteration ceiling shared by both presets.
const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Number of metrics the voter can cast a vote for.
pub const METRIC_COUNT: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown preset '{0}' (expected 'tech' or 'creative')")]
    UnknownPreset(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Per-metric cutoffs used by the convergence voter.
///
/// `semantic` and `lexical` are lower bounds; the three deltas are upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub semantic: f64,
    pub lexical: f64,
    pub length: f64,
    pub style: f64,
    pub efmn: f64,
}

/// Floor for the F/N/M score axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGates {
    /// Minimum F, N and M before the bias adjustment
    pub min_fnm: f64,
    /// How much each unit of B lowers the floor
    pub b_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergencePolicy {
    /// Minimum votes for an iteration to count as converged
    pub votes_required: u32,
    /// Consecutive converged iterations required to stop
    pub patience: u32,
}

/// Hard ceilings for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_tokens: u64,
    pub max_iterations: u32,
}

/// Named configuration presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterPreset {
    /// Tight thresholds for technical prompts
    #[default]
    Tech,
    /// Looser thresholds that leave room for exploration
    Creative,
}

impl std::fmt::Display for ArbiterPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tech => write!(f, "tech"),
            Self::Creative => write!(f, "creative"),
        }
    }
}

impl FromStr for ArbiterPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tech" => Ok(Self::Tech),
            "creative" => Ok(Self::Creative),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Immutable per-run configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    pub thresholds: Thresholds,
    pub quality_gates: QualityGates,
    pub convergence: ConvergencePolicy,
    pub budget: Budget,
}

impl ArbiterConfig {
    /// Tight preset for technical prompts
    pub const TECH: Self = Self {
        thresholds: Thresholds {
            semantic: 0.985,
            lexical: 0.98,
            length: 0.03,
            style: 0.05,
            efmn: 0.05,
        },
        quality_gates: QualityGates {
            min_fnm: 0.70,
            b_penalty: 0.10,
        },
        convergence: ConvergencePolicy {
            votes_required: 3,
            patience: 2,
        },
        budget: Budget {
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        },
    };

    /// Looser preset for creative prompts
    pub const CREATIVE: Self = Self {
        thresholds: Thresholds {
            semantic: 0.97,
            lexical: 0.95,
            length: 0.05,
            style: 0.10,
            efmn: 0.08,
        },
        quality_gates: QualityGates {
            min_fnm: 0.65,
            b_penalty: 0.10,
        },
        convergence: ConvergencePolicy {
            votes_required: 3,
            patience: 2,
        },
        budget: Budget {
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        },
    };

    pub fn preset(preset: ArbiterPreset) -> Self {
        match preset {
            ArbiterPreset::Tech => Self::TECH,
            ArbiterPreset::Creative => Self::CREATIVE,
        }
    }

    /// Apply a partial override on top of this config
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(t) = &overrides.thresholds {
            self.thresholds.semantic = t.semantic.unwrap_or(self.thresholds.semantic);
            self.thresholds.lexical = t.lexical.unwrap_or(self.thresholds.lexical);
            self.thresholds.length = t.length.unwrap_or(self.thresholds.length);
            self.thresholds.style = t.style.unwrap_or(self.thresholds.style);
            self.thresholds.efmn = t.efmn.unwrap_or(self.thresholds.efmn);
        }
        if let Some(g) = &overrides.quality_gates {
            self.quality_gates.min_fnm = g.min_fnm.unwrap_or(self.quality_gates.min_fnm);
            self.quality_gates.b_penalty = g.b_penalty.unwrap_or(self.quality_gates.b_penalty);
        }
        if let Some(c) = &overrides.convergence {
            self.convergence.votes_required =
                c.votes_required.unwrap_or(self.convergence.votes_required);
            self.convergence.patience = c.patience.unwrap_or(self.convergence.patience);
        }
        if let Some(b) = &overrides.budget {
            self.budget.max_tokens = b.max_tokens.unwrap_or(self.budget.max_tokens);
            self.budget.max_iterations = b.max_iterations.unwrap_or(self.budget.max_iterations);
        }
        self
    }

    /// Parse a TOML override document and resolve it against its preset
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        ConfigOverrides::from_toml_str(content)?.resolve(None)
    }

    /// Load a TOML override document from disk
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        ConfigOverrides::from_file(path)?.resolve(None)
    }

    /// Reject configurations the Arbiter cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let named = [
            ("thresholds.semantic", t.semantic),
            ("thresholds.lexical", t.lexical),
            ("thresholds.length", t.length),
            ("thresholds.style", t.style),
            ("thresholds.efmn", t.efmn),
            ("quality_gates.min_fnm", self.quality_gates.min_fnm),
            ("quality_gates.b_penalty", self.quality_gates.b_penalty),
        ];
        if let Some((name, value)) = named.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid(format!(
                "{} must be a finite non-negative number, got {}",
                name, value
            )));
        }

        let votes = self.convergence.votes_required;
        if votes == 0 || votes > METRIC_COUNT {
            return Err(ConfigError::Invalid(format!(
                "convergence.votes_required must be in 1..={}, got {}",
                METRIC_COUNT, votes
            )));
        }
        if self.convergence.patience == 0 {
            return Err(ConfigError::Invalid(
                "convergence.patience must be at least 1".to_string(),
            ));
        }
        if self.budget.max_iterations == 0 || self.budget.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "budget ceilings must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self::TECH
    }
}

/// Partial configuration as written in a TOML override file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub preset: Option<ArbiterPreset>,
    #[serde(default)]
    pub thresholds: Option<ThresholdOverrides>,
    #[serde(default)]
    pub quality_gates: Option<QualityGateOverrides>,
    #[serde(default)]
    pub convergence: Option<ConvergenceOverrides>,
    #[serde(default)]
    pub budget: Option<BudgetOverrides>,
}

impl ConfigOverrides {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply these overrides to a preset and validate the result.
    ///
    /// `preset` wins over the preset named in the document.
    pub fn resolve(&self, preset: Option<ArbiterPreset>) -> Result<ArbiterConfig, ConfigError> {
        let base = preset.or(self.preset).unwrap_or_default();
        let config = ArbiterConfig::preset(base).with_overrides(self);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdOverrides {
    pub semantic: Option<f64>,
    pub lexical: Option<f64>,
    pub length: Option<f64>,
    pub style: Option<f64>,
    pub efmn: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityGateOverrides {
    pub min_fnm: Option<f64>,
    pub b_penalty: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvergenceOverrides {
    pub votes_required: Option<u32>,
    pub patience: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BudgetOverrides {
    pub max_tokens: Option<u64>,
    pub max_iterations: Option<u32>,
}
