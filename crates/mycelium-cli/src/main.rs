mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use mycelium_core::{ConfigManager, EdgeFailure, SyncCycleResult, SyncEvent, SyncNotifier};
use mycelium_graph::{ArtifactGraph, NetworkStatus, VersionMismatch};
use mycelium_sync::{build_queue, FsContentStore, SyncScheduler};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "mycelium")]
#[command(about = "Mycelium - keeps connected project documents in sync", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding default.toml / {env}.toml / local.toml
    #[arg(long, global = true, env = "MYCELIUM_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment
    #[arg(long, global = true)]
    env: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Network summary, sync queue and version drift
    Status {
        /// Project manifest
        #[arg(short, long, default_value = "mycelium.toml")]
        manifest: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Run a single sync cycle
    Sync {
        /// Project manifest
        #[arg(short, long, default_value = "mycelium.toml")]
        manifest: PathBuf,

        /// Print the cycle result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep syncing on the adaptive schedule until interrupted
    Run {
        /// Project manifest
        #[arg(short, long, default_value = "mycelium.toml")]
        manifest: PathBuf,
    },
}

#[derive(Serialize)]
struct QueueRow {
    id: String,
    kind: String,
    score: f64,
    health: f64,
}

#[derive(Serialize)]
struct StatusReport {
    network: NetworkStatus,
    queue: Vec<QueueRow>,
    drift: Vec<VersionMismatch>,
}

/// Prints edge failures and cycle summaries as they happen.
struct ConsoleNotifier;

impl SyncNotifier for ConsoleNotifier {
    fn on_edge_failure(&self, failure: &EdgeFailure) {
        eprintln!(
            "{} {} -> {} ({}): {}",
            "failed".yellow().bold(),
            failure.source,
            failure.target,
            failure.stage,
            failure.reason
        );
    }

    fn on_cycle_complete(&self, result: &SyncCycleResult) {
        println!(
            "{} {} synced, {} merged, {} failed, next in {}s",
            "cycle".green().bold(),
            result.synced_node_ids.len(),
            result.edges_merged,
            result.failures.len(),
            result.next_interval.as_secs()
        );
    }
}

fn init_tracing(level: &str, verbose: bool) {
    let default = if verbose { "debug" } else { level };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigManager::load(cli.config_dir.clone(), cli.env.clone())
        .context("Failed to load configuration")?;
    init_tracing(&config.settings().logging.level, cli.verbose);
    info!(env = config.env(), dir = %config.config_dir().display(), "configuration loaded");

    if let Err(e) = execute_command(&cli, &config).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn execute_command(cli: &Cli, config: &ConfigManager) -> Result<()> {
    match &cli.command {
        Commands::Status { manifest, json } => execute_status(manifest, *json),
        Commands::Sync { manifest, json } => execute_sync(manifest, config, *json).await,
        Commands::Run { manifest } => execute_run(manifest, config).await,
    }
}

fn load_project(path: &Path) -> Result<(ArtifactGraph, PathBuf)> {
    let (manifest, root) = Manifest::load(path)?;
    let graph = manifest.build_graph()?;
    info!(
        artifacts = graph.len(),
        connections = graph.edge_count(),
        root = %root.display(),
        "project loaded"
    );
    Ok((graph, root))
}

fn scheduler_for(path: &Path, config: &ConfigManager) -> Result<SyncScheduler> {
    let (graph, root) = load_project(path)?;
    let store = Arc::new(FsContentStore::with_root(root));
    Ok(SyncScheduler::new(graph, store, config.settings().sync.clone()))
}

fn execute_status(path: &Path, json: bool) -> Result<()> {
    let (graph, _) = load_project(path)?;
    let now = chrono::Utc::now();

    let queue = build_queue(&graph, now)
        .into_iter()
        .filter_map(|entry| {
            graph.node(&entry.node_id).map(|node| QueueRow {
                id: entry.node_id.clone(),
                kind: node.kind.to_string(),
                score: entry.score,
                health: node.health,
            })
        })
        .collect::<Vec<_>>();
    let mut drift = Vec::new();
    for node in graph.nodes() {
        let report = graph.check_versions(&node.id)?;
        drift.extend(report.issues.into_iter().filter(|i| i.source < i.target));
    }
    let report = StatusReport {
        network: graph.status(),
        queue,
        drift,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let network = &report.network;
    println!("{}", "Network".bold());
    println!("  artifacts:      {}", network.node_count);
    println!("  connections:    {}", network.edge_count);
    println!("  isolated:       {}", network.isolated);
    println!("  average degree: {:.2}", network.average_degree);
    println!("  mean health:    {}", health_label(network.mean_health));
    match network.last_sync {
        Some(at) => println!("  last sync:      {}", at.to_rfc3339()),
        None => println!("  last sync:      {}", "never".dimmed()),
    }
    for (kind, count) in &network.kinds {
        println!("  {:<15} {}", format!("{}:", kind), count);
    }

    println!("\n{}", "Sync queue".bold());
    if report.queue.is_empty() {
        println!("  {}", "no connected artifacts".dimmed());
    }
    for row in &report.queue {
        println!("  {:<24} {:<15} {:.3}", row.id, row.kind, row.score);
    }

    println!("\n{}", "Version drift".bold());
    if report.drift.is_empty() {
        println!("  {}", "all connected versions agree".green());
    }
    for issue in &report.drift {
        println!(
            "  {} {} ({}) <-> {} ({})",
            "drift".yellow().bold(),
            issue.source,
            issue.source_version,
            issue.target,
            issue.target_version
        );
    }
    Ok(())
}

fn health_label(health: f64) -> String {
    let text = format!("{:.2}", health);
    if health < 0.5 {
        text.red().to_string()
    } else if health < 0.8 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

async fn execute_sync(path: &Path, config: &ConfigManager, json: bool) -> Result<()> {
    let scheduler = scheduler_for(path, config)?;
    let Some(result) = scheduler.tick().await.into_result() else {
        anyhow::bail!("a sync cycle is already running");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    ConsoleNotifier.on_cycle_complete(&result);
    for id in &result.synced_node_ids {
        println!("  {} {}", "synced".green(), id);
    }
    for failure in &result.failures {
        ConsoleNotifier.on_edge_failure(failure);
    }
    Ok(())
}

async fn execute_run(path: &Path, config: &ConfigManager) -> Result<()> {
    let scheduler =
        Arc::new(scheduler_for(path, config)?.with_notifier(Arc::new(ConsoleNotifier)));

    let mut events = scheduler.subscribe();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::IntervalChanged { interval }) => {
                    info!(secs = interval.as_secs(), "next sync scheduled");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    scheduler.tick().await;
    let handle = scheduler.clone().start();
    println!(
        "{} next cycle in {}s, press Ctrl-C to stop",
        "running".green().bold(),
        scheduler.next_interval().as_secs()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down");
    handle.shutdown().await;
    watcher.abort();
    Ok(())
}
