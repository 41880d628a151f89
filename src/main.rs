use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use calibra_progress::ProgressEvent;
use clap::{Parser, Subcommand};
use run_engine::{AutomationEngine, BatchRunner, RunOptions};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use calibra_cli::config::AppConfig;
use calibra_cli::input::{load_batch_input, load_run_input};
use calibra_cli::portal::{script_for, ScriptQueueFactory};

#[derive(Parser)]
#[command(name = "calibra", version, about = "Calibration form automation")]
struct Cli {
    /// Configuration file (YAML); defaults to ./calibra.yaml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one work order end to end.
    Run {
        /// JSON file with the work order and dispenser records.
        input: PathBuf,
        /// Show the portal window instead of running headless.
        #[arg(long)]
        headed: bool,
    },
    /// Run a batch of work items sequentially, resuming from the checkpoint.
    Batch {
        /// JSON file with an ordered list of work items.
        input: PathBuf,
        /// Checkpoint file path; overrides the configured one.
        #[arg(long)]
        checkpoint: Option<PathBuf>,
    },
    /// Validate the configuration and print the effective values.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { input, headed } => run_single(config, &input, headed).await,
        Commands::Batch { input, checkpoint } => run_batch(config, &input, checkpoint).await,
        Commands::CheckConfig => check_config(config),
    }
}

async fn run_single(config: AppConfig, input: &std::path::Path, headed: bool) -> Result<()> {
    let input = load_run_input(input)?;
    let factory = ScriptQueueFactory::single(script_for(&input.dispensers, &config.equipment));
    let engine = AutomationEngine::new(config.engine_config(), factory);
    let printer = spawn_progress_printer(engine.subscribe());

    let run_id = engine.start(
        input.work_order,
        input.dispensers,
        RunOptions {
            headless: Some(!headed),
            ..RunOptions::default()
        },
    );
    let result = engine.wait(&run_id).await?;
    drop(engine);
    let _ = printer.await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!("run {} ended {}", result.run_id, result.status.name());
    }
    Ok(())
}

async fn run_batch(
    config: AppConfig,
    input: &std::path::Path,
    checkpoint: Option<PathBuf>,
) -> Result<()> {
    let items = load_batch_input(input)?;
    if items.is_empty() {
        bail!("batch input is empty");
    }
    let checkpoint =
        checkpoint.unwrap_or_else(|| PathBuf::from(&config.batch.checkpoint_path));
    let factory = ScriptQueueFactory::for_batch(&items, &config.equipment);
    let engine = Arc::new(AutomationEngine::new(config.engine_config(), factory));
    let printer = spawn_progress_printer(engine.subscribe());

    let runner = BatchRunner::new(engine.clone(), checkpoint);
    let outcome = runner.run(&items).await?;
    drop(runner);
    drop(engine);
    let _ = printer.await;

    info!(
        batch = %outcome.batch_id,
        completed = outcome.completed.len(),
        finished = outcome.finished,
        "batch done"
    );
    if let Some(failed) = &outcome.failed {
        println!("{}", serde_json::to_string_pretty(failed)?);
        bail!(
            "batch stopped at item {} of {}; rerun to resume from the checkpoint",
            outcome.next_index + 1,
            items.len()
        );
    }
    Ok(())
}

fn check_config(config: AppConfig) -> Result<()> {
    let findings = config.findings();
    for finding in &findings {
        warn!("{finding}");
    }

    let mut effective = config.clone();
    if !effective.portal.password.is_empty() {
        effective.portal.password = "********".to_string();
    }
    println!("{}", serde_yaml::to_string(&effective)?);

    if findings.is_empty() {
        info!("configuration ok");
    } else {
        info!(findings = findings.len(), "configuration loaded with findings");
    }
    Ok(())
}

fn spawn_progress_printer(
    mut events: broadcast::Receiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    info!(
                        seq = event.seq,
                        kind = ?event.kind,
                        percent = format_args!("{:.1}", event.percent),
                        eta_ms = event.eta_ms,
                        dispenser = event.dispenser.as_deref().unwrap_or("-"),
                        "{}",
                        event.message
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "progress stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
