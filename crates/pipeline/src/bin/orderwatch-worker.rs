//! orderwatch-worker: runs the order monitoring pipeline.
//!
//! Commands:
//! - `run`: cron-scheduled runs until Ctrl-C (default)
//! - `once`: a single run with retry; exits non-zero on failure
//! - `step`: one named step, JSON input from a file or stdin, JSON output on stdout

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{info, warn};

use orderwatch_core::config::{self, Config};
use orderwatch_pipeline::scheduler::Scheduler;
use orderwatch_pipeline::{
    MemoryOrderStore, OrderStore, PgOrderStore, Pipeline, Step, StepRunner,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Order monitoring worker. Fetches recently changed orders and persists them with their flags.
#[derive(Parser, Debug)]
#[command(name = "orderwatch-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} before {KEY}.
    #[arg(long, env = "ORDERWATCH_PROFILE", default_value = "", global = true)]
    profile: String,

    /// Keep facts and aggregates in memory instead of PostgreSQL.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on its cron schedule until interrupted.
    Run,
    /// Run the pipeline once, retrying according to the schedule config.
    Once,
    /// Run a single named step (fetch_recent, validate_rows, ...).
    Step {
        name: String,

        /// File holding the upstream step's JSON output; stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `step` output on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::for_profile(&cli.profile);
    config.log_summary();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let scheduler = build_scheduler(&config, cli.dry_run).await?;

            let shutdown = Arc::new(Notify::new());
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received, stopping after the current run");
                    // notify_one keeps the permit if the scheduler is mid-run.
                    signal.notify_one();
                }
            });

            scheduler.run(shutdown).await;
            info!("orderwatch-worker exited cleanly");
        }
        Command::Once => {
            let scheduler = build_scheduler(&config, cli.dry_run).await?;
            let report = scheduler.run_now().await.context("pipeline run failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Step { name, input } => {
            let step: Step = name.parse()?;
            let store = if step.needs_store() {
                Some(open_store(&config, cli.dry_run).await?)
            } else {
                None
            };
            let input = read_input(step, input.as_deref())?;
            let output = StepRunner::new(config, store)
                .run(step, input)
                .await
                .with_context(|| format!("step {step} failed"))?;
            println!("{}", serde_json::to_string(&output)?);
        }
    }

    Ok(())
}

async fn build_scheduler(config: &Config, dry_run: bool) -> anyhow::Result<Scheduler> {
    let store = open_store(config, dry_run).await?;
    let pipeline = Arc::new(Pipeline::from_config(config, store)?);
    Ok(Scheduler::new(pipeline, &config.schedule)?)
}

async fn open_store(config: &Config, dry_run: bool) -> anyhow::Result<Arc<dyn OrderStore>> {
    if dry_run {
        info!("dry run: using in-memory store");
        return Ok(Arc::new(MemoryOrderStore::new()));
    }
    if !config.postgres.is_configured() {
        warn!("PG_URL / PG_USERNAME not set, trying default local credentials");
    }
    let store = PgOrderStore::connect(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    Ok(Arc::new(store))
}

/// Steps without data input get `null`. Otherwise the input is parsed as JSON;
/// text that is not JSON is handed over as a string and decoded by the step.
fn read_input(step: Step, path: Option<&Path>) -> anyhow::Result<Value> {
    if matches!(step, Step::FetchRecent | Step::UpsertAgg) {
        return Ok(Value::Null);
    }

    let text = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}
