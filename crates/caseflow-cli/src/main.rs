//! `caseflow` - batch entry point for the enrichment pipeline
//!
//! `caseflow run` discovers cases for a date window, claims the backlog,
//! and drives every claimed item through the enrichment phases. Item
//! failures are recorded in the store and reported in the summary; the
//! process exits nonzero only when the pipeline itself cannot run.
//!
//! Collaborators default to the deterministic offline hub; real service
//! clients plug in through `caseflow_steps::Collaborators`.

use anyhow::{Context, Result};
use caseflow_pipeline::{Orchestrator, Phase, RunOptions, StepPercent};
use caseflow_steps::{OfflineHub, StepRegistry};
use caseflow_store::Store;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod report;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "caseflow", version, about = "Case enrichment pipeline")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "caseflow.toml", global = true)]
    config: PathBuf,

    /// Database file; overrides the config value
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover, claim, and enrich the backlog
    Run(RunArgs),
    /// Print backlog counts and per-step completion
    Status,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Discovery window start (YYYY-MM-DD); omit both dates to work the
    /// existing backlog only
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Discovery window end (YYYY-MM-DD), inclusive
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// First phase to execute (1-3), for partial re-runs
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=3))]
    start_phase: u32,

    /// Cap on items claimed this run
    #[arg(long)]
    limit: Option<usize>,

    /// Bound on concurrently processed items; overrides the config value
    #[arg(long)]
    max_items: Option<usize>,

    /// Retry cap for failed items; overrides the config value
    #[arg(long)]
    max_retries: Option<u32>,

    /// Reclaim failed items even past the retry cap
    #[arg(long)]
    retry_failed: bool,

    /// Discover and report only; claim nothing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let store = Store::open(&config.db_path)
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;

    let result = match cli.command {
        Commands::Run(args) => run(&store, &config, args).await,
        Commands::Status => status(&store),
    };
    store.shutdown().await?;
    result
}

async fn run(store: &Store, config: &Config, args: RunArgs) -> Result<()> {
    let options = RunOptions {
        window: args.from.zip(args.to),
        start_phase: Phase::from_number(args.start_phase)
            .context("start phase must be 1, 2, or 3")?,
        item_limit: args.limit,
        max_retries: args.max_retries.unwrap_or(config.max_retries),
        retry_failed: args.retry_failed,
        dry_run: args.dry_run,
    };

    let gates = gate_limits(config, args.max_items);
    let hub = OfflineHub::shared();
    let collaborators = hub.collaborators();
    let steps = StepRegistry::standard(&collaborators).into_steps();
    let orchestrator = Orchestrator::new(
        store,
        steps,
        collaborators.discovery,
        collaborators.fallback,
        &gates,
        options,
    );

    let summary = orchestrator.run().await.context("pipeline run failed")?;
    print!("{}", report::render_run(&summary));
    Ok(())
}

/// Gate sizes for this run: config values with the CLI override applied
fn gate_limits(config: &Config, max_items: Option<usize>) -> caseflow_pipeline::GateLimits {
    let mut gates = config.gates.clone();
    if let Some(max_items) = max_items {
        gates.max_items = max_items;
    }
    gates
}

fn status(store: &Store) -> Result<()> {
    let reader = store.reader();
    let counts = reader.status_counts()?;
    let total = counts.total();
    let steps: Vec<StepPercent> = reader
        .step_completion()?
        .into_iter()
        .map(|tally| StepPercent {
            step_number: tally.step_number,
            step_name: tally.step_name,
            completed: tally.completed,
            total,
        })
        .collect();
    let failures = reader.recent_failures(10)?;
    print!("{}", report::render_status(&counts, &steps, &failures));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Commands::Run(args) => args,
            Commands::Status => panic!("expected a run command"),
        }
    }

    #[test]
    fn run_flags_parse() {
        let args = run_args(&[
            "caseflow",
            "run",
            "--from",
            "2026-06-01",
            "--to",
            "2026-06-30",
            "--max-items",
            "4",
            "--retry-failed",
        ]);
        assert_eq!(args.max_items, Some(4));
        assert!(args.retry_failed);
        assert_eq!(args.start_phase, 1);
        assert_eq!(
            args.from,
            NaiveDate::from_ymd_opt(2026, 6, 1)
        );
    }

    #[test]
    fn window_flags_come_in_pairs() {
        assert!(Cli::try_parse_from(["caseflow", "run", "--from", "2026-06-01"]).is_err());
    }

    #[test]
    fn max_items_overrides_config_gate() {
        let config = Config::default();
        assert_eq!(gate_limits(&config, None).max_items, config.gates.max_items);
        assert_eq!(gate_limits(&config, Some(2)).max_items, 2);
    }
}
