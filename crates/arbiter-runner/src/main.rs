//! `arbiter-runner` CLI: replay a transcript through the Arbiter and report the outcome.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arbiter_governor::{Arbiter, ArbiterPreset, SemanticOracle};
use arbiter_runner::{
    run_optimization, CliOverrides, EnvOverrides, HttpSemanticOracle, RunnerConfig,
    TranscriptEngine, UnavailableOracle,
};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "arbiter-runner",
    about = "Replay an expand/compress transcript through the Arbiter convergence governor"
)]
struct Args {
    /// JSONL transcript, one iteration snapshot per line
    #[arg(long)]
    transcript: PathBuf,

    /// Original input text
    #[arg(long, conflicts_with = "seed_file")]
    seed: Option<String>,

    /// Read the original input text from a file
    #[arg(long)]
    seed_file: Option<PathBuf>,

    /// Configuration preset (tech or creative)
    #[arg(long)]
    preset: Option<ArbiterPreset>,

    /// TOML override file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Semantic oracle endpoint [env: ARBITER_ORACLE_URL]
    #[arg(long)]
    oracle_url: Option<String>,

    /// Per-call oracle timeout in seconds [env: ARBITER_ORACLE_TIMEOUT_SECS]
    #[arg(long)]
    oracle_timeout_secs: Option<u64>,

    /// Token ceiling for the run [env: ARBITER_MAX_TOKENS]
    #[arg(long)]
    max_tokens: Option<u64>,

    /// Iteration ceiling for the run [env: ARBITER_MAX_ITERATIONS]
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Append every decision to this JSONL file
    #[arg(long)]
    decision_log: Option<PathBuf>,

    /// Print the run outcome as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            preset: self.preset,
            config_path: self.config.clone(),
            oracle_url: self.oracle_url.clone(),
            oracle_timeout_secs: self.oracle_timeout_secs,
            max_tokens: self.max_tokens,
            max_iterations: self.max_iterations,
        }
    }

    fn seed_text(&self) -> Result<String> {
        if let Some(seed) = &self.seed {
            return Ok(seed.clone());
        }
        if let Some(path) = &self.seed_file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read seed file {}", path.display()));
        }
        anyhow::bail!("Either --seed or --seed-file is required")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbiter_runner=info,arbiter_governor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let seed = args.seed_text()?;
    let config = RunnerConfig::resolve(&args.overrides(), &EnvOverrides::from_env())?;

    let oracle: Arc<dyn SemanticOracle> = match &config.oracle.url {
        Some(url) => Arc::new(HttpSemanticOracle::new(
            url.clone(),
            config.oracle.api_key.clone(),
            config.oracle.timeout,
        )?),
        None => {
            info!("No semantic oracle configured; using the lexical proxy throughout");
            Arc::new(UnavailableOracle)
        }
    };

    let arbiter = Arbiter::new(config.arbiter, oracle)?.with_oracle_timeout(config.oracle.timeout);
    let mut engine = TranscriptEngine::from_file(&args.transcript)?;

    let outcome =
        run_optimization(&mut engine, &arbiter, &seed, args.decision_log.as_deref()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.summary());
        println!();
        println!("{}", outcome.final_text);
    }

    Ok(())
}
