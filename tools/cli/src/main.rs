//! Tasksync CLI
//!
//! Command-line client for the offline-first task sync engine.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tasksync_common::{Attachment, Record, RecordDraft};
use tasksync_storage::{create_default_registry, HttpRemote, LocalStore};
use tasksync_sync::{probe_tcp, ConnectivityMonitor, DrainOutcome, SyncEngine, SyncStatus};

use crate::config::AppConfig;

type Engine = SyncEngine<dyn LocalStore, HttpRemote>;

#[derive(Parser)]
#[command(name = "tasksync")]
#[command(about = "Offline-first task list synced with a task server", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Task server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Directory for local data
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Local store backend (file, sqlite, memory)
    #[arg(long, global = true)]
    store: Option<String>,

    /// Do not contact the server
    #[arg(long, global = true)]
    offline: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tasks
    List,

    /// Add a task
    Add {
        /// Task name
        #[arg(short, long)]
        name: String,

        /// Mark the task as completed
        #[arg(long)]
        completed: bool,

        /// File to attach
        #[arg(short, long)]
        attachment: Option<PathBuf>,
    },

    /// Update an existing task
    Update {
        /// Task ID
        #[arg(long)]
        id: String,

        /// New name
        #[arg(short, long)]
        name: Option<String>,

        /// New completion state
        #[arg(long)]
        completed: Option<bool>,

        /// File to attach
        #[arg(short, long, conflicts_with = "clear_attachment")]
        attachment: Option<PathBuf>,

        /// Remove the attachment
        #[arg(long)]
        clear_attachment: bool,
    },

    /// Submit queued writes to the server
    Sync,

    /// Show queued writes
    Pending,

    /// Show connectivity and sync status
    Status,

    /// Keep syncing in the foreground until interrupted
    Watch,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_overrides(cli.server, cli.data_dir, cli.store);

    match cli.command {
        Commands::List => cmd_list(&config, cli.offline).await,
        Commands::Add {
            name,
            completed,
            attachment,
        } => cmd_add(&config, cli.offline, name, completed, attachment).await,
        Commands::Update {
            id,
            name,
            completed,
            attachment,
            clear_attachment,
        } => {
            cmd_update(
                &config,
                cli.offline,
                UpdateArgs {
                    id,
                    name,
                    completed,
                    attachment,
                    clear_attachment,
                },
            )
            .await
        }
        Commands::Sync => cmd_sync(&config, cli.offline).await,
        Commands::Pending => cmd_pending(&config).await,
        Commands::Status => cmd_status(&config, cli.offline).await,
        Commands::Watch => cmd_watch(&config, cli.offline).await,
        Commands::Config => cmd_config(&config),
    }
}

/// An engine wired to the configured store, server and connectivity.
struct Session {
    engine: Arc<Engine>,
    monitor: ConnectivityMonitor,
}

async fn open_session(config: &AppConfig, offline: bool) -> Result<Session> {
    let store = create_default_registry()
        .resolve(&config.store, config.store_options())
        .with_context(|| format!("Failed to open {} store", config.store))?;

    let remote = HttpRemote::new(&config.server_url)
        .context("Failed to create server client")?;

    let online = if offline {
        false
    } else {
        probe_tcp(&config.probe_addr()?, config.probe_timeout()).await
    };
    if !online && !offline {
        warn!("Server {} unreachable, working offline", config.server_url);
    }

    let monitor = ConnectivityMonitor::new(online);
    let engine = SyncEngine::from_arc(
        store,
        Arc::new(remote),
        monitor.subscribe(),
        config.sync.clone(),
    )?;
    engine.refresh_local().await?;

    Ok(Session {
        engine: Arc::new(engine),
        monitor,
    })
}

async fn cmd_list(config: &AppConfig, offline: bool) -> Result<()> {
    let session = open_session(config, offline).await?;
    let records = session.engine.list().await?;

    if records.is_empty() {
        println!("No tasks.");
    }
    for record in &records {
        println!("{}", format_record(record));
    }

    report_status(&session.engine.status().await);
    Ok(())
}

async fn cmd_add(
    config: &AppConfig,
    offline: bool,
    name: String,
    completed: bool,
    attachment: Option<PathBuf>,
) -> Result<()> {
    let session = open_session(config, offline).await?;

    let mut draft = RecordDraft::new(name).completed(completed);
    if let Some(path) = attachment {
        draft = draft.attachment(read_attachment(&path)?);
    }

    let record = session.engine.create(draft).await?;
    println!("Added {}", format_record(&record));
    report_queued(&session.engine, &record).await?;
    Ok(())
}

struct UpdateArgs {
    id: String,
    name: Option<String>,
    completed: Option<bool>,
    attachment: Option<PathBuf>,
    clear_attachment: bool,
}

async fn cmd_update(config: &AppConfig, offline: bool, args: UpdateArgs) -> Result<()> {
    let session = open_session(config, offline).await?;

    let current = session
        .engine
        .records()
        .await
        .into_iter()
        .find(|r| r.id == args.id)
        .with_context(|| format!("No task with ID {}", args.id))?;

    let mut next = current.clone();
    if let Some(name) = args.name {
        next = next.with_name(name);
    }
    if let Some(completed) = args.completed {
        next = next.with_completed(completed);
    }
    if let Some(path) = args.attachment {
        next = next.with_attachment(Some(read_attachment(&path)?));
    } else if args.clear_attachment {
        next = next.with_attachment(None);
    }

    if next == current {
        bail!("Nothing to update");
    }

    let record = session.engine.update(next).await?;
    println!("Updated {}", format_record(&record));
    report_queued(&session.engine, &record).await?;
    Ok(())
}

async fn cmd_sync(config: &AppConfig, offline: bool) -> Result<()> {
    let session = open_session(config, offline).await?;

    match session.engine.drain_pending().await? {
        DrainOutcome::Offline => println!("Offline, nothing submitted."),
        DrainOutcome::InFlight => println!("A sync is already running."),
        DrainOutcome::Empty => println!("Nothing to sync."),
        DrainOutcome::Completed(result) => {
            println!(
                "Synced {} operations, {} failed ({:?}).",
                result.synced, result.failed, result.duration
            );
        }
    }

    report_status(&session.engine.status().await);
    Ok(())
}

async fn cmd_pending(config: &AppConfig) -> Result<()> {
    let session = open_session(config, true).await?;
    let pending = session.engine.pending().await?;

    if pending.is_empty() {
        println!("No queued writes.");
        return Ok(());
    }

    println!("{} queued writes:", pending.len());
    for op in &pending {
        println!(
            "  {} {} {} (queued {})",
            op.kind,
            op.record_id(),
            op.snapshot.name,
            op.queued_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

async fn cmd_status(config: &AppConfig, offline: bool) -> Result<()> {
    let session = open_session(config, offline).await?;
    let state = session.engine.snapshot().await;
    let pending = session.engine.pending().await?;

    println!("Server:  {}", config.server_url);
    println!(
        "Network: {}",
        if session.monitor.is_online() {
            "online"
        } else {
            "offline"
        }
    );
    println!("Store:   {} ({})", config.store, config.data_dir.display());
    println!("Tasks:   {}", state.records.len());
    println!("Queued:  {}", pending.len());
    println!("Sync:    {}", state.sync_status);
    Ok(())
}

async fn cmd_watch(config: &AppConfig, offline: bool) -> Result<()> {
    let session = open_session(config, offline).await?;
    let engine = session.engine.clone();

    let probe = if offline {
        None
    } else {
        Some(session.monitor.spawn_probe(
            config.probe_addr()?,
            config.probe_timeout(),
            config.probe_interval(),
        ))
    };

    let (scheduler, task) = engine.spawn_scheduler();
    let mut status_rx = engine.subscribe_status();
    let mut records_rx = engine.subscribe_records();
    let mut online_rx = engine.subscribe_online();

    if engine.is_online() {
        report_outcome(scheduler.request_sync().await?);
    }

    info!("Watching {} (Ctrl-C to stop)", config.server_url);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                println!("sync: {}", status);
            }
            changed = records_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = records_rx.borrow_and_update().len();
                println!("tasks: {}", count);
            }
            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                println!("network: {}", if online { "online" } else { "offline" });
            }
        }
    }

    scheduler.shutdown().await;
    task.await.context("Scheduler task failed")?;
    if let Some(probe) = probe {
        probe.abort();
    }

    println!("Stopped.");
    Ok(())
}

fn cmd_config(config: &AppConfig) -> Result<()> {
    println!("{}", config.to_json()?);
    Ok(())
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read attachment {}", path.display()))?;
    Ok(Attachment::from_bytes(&data))
}

fn format_record(record: &Record) -> String {
    let mark = if record.completed { "x" } else { " " };
    let mut line = format!(
        "[{}] {} ({}, {})",
        mark, record.name, record.id, record.timestamp
    );
    if let Some(attachment) = &record.attachment {
        line.push_str(&format!(" +{} bytes", attachment.decoded_len()));
    }
    line
}

async fn report_queued(engine: &Engine, record: &Record) -> Result<()> {
    let queued = engine
        .pending()
        .await?
        .iter()
        .any(|op| op.record_id() == record.id);
    if queued {
        println!("Queued for sync.");
    }
    report_status(&engine.status().await);
    Ok(())
}

fn report_status(status: &SyncStatus) {
    if let SyncStatus::Error(reason) = status {
        warn!("Last sync failed: {}", reason);
    }
}

fn report_outcome(outcome: DrainOutcome) {
    if let Some(result) = outcome.result() {
        println!("sync: {} synced, {} failed", result.synced, result.failed);
    }
}
