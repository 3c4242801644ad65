//! TraceSync CLI - record points and keep them in sync with a remote.
//!
//! Points are kept in a local SQLite database and reconciled with a
//! document database server, either once (`sync`) or periodically (`run`).

mod config;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tracesync_common::{Point, PointRecord};
use tracesync_remote::{HttpRemote, Password};
use tracesync_storage::{LocalStore, SqliteStore};
use tracesync_sync::{SyncEngine, SyncMode, SyncReport, SyncState};

use crate::config::ClientConfig;

type Engine = SyncEngine<SqliteStore, HttpRemote>;

#[derive(Parser)]
#[command(name = "tracesync")]
#[command(about = "TraceSync - Offline-first position trace synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a point locally; it is pushed on the next sync.
    Record {
        /// Latitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,

        /// Acquisition time in milliseconds since the epoch (default: now).
        #[arg(short, long)]
        timestamp: Option<i64>,
    },

    /// List stored points.
    List {
        /// Only points not yet pushed.
        #[arg(long, conflicts_with = "confirmed")]
        pending: bool,

        /// Only points known to the remote.
        #[arg(long)]
        confirmed: bool,
    },

    /// Run one sync cycle.
    Sync,

    /// Sync periodically until interrupted.
    Run {
        /// Seconds between cycles (default: from config).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show point counts and the last sync outcome.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ClientConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Record {
            lat,
            lng,
            timestamp,
        } => cmd_record(&config, lat, lng, timestamp),

        Commands::List { pending, confirmed } => cmd_list(&config, pending, confirmed),

        Commands::Sync => cmd_sync(config).await,

        Commands::Run { interval } => cmd_run(config, interval).await,

        Commands::Status => cmd_status(&config),
    }
}

/// Open the point database, creating its directory if needed.
fn open_store(config: &ClientConfig) -> Result<SqliteStore> {
    let path = config.store_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    SqliteStore::open(&path).with_context(|| format!("Failed to open store {}", path.display()))
}

/// Build an engine over the local database and the configured remote.
fn open_engine(mut config: ClientConfig) -> Result<Engine> {
    if !config.remote.username.is_empty() && config.remote.password.is_empty() {
        let password = rpassword::prompt_password(format!(
            "Password for {}: ",
            config.remote.username
        ))
        .context("Failed to read password")?;
        config.remote.password = Password::new(password);
    }

    let store = Arc::new(open_store(&config)?);
    let remote = Arc::new(HttpRemote::new(config.remote.clone()).context("Invalid remote")?);
    let engine = SyncEngine::new(store, remote, config.sync.clone());

    match load_state(&config)? {
        Some(state) => Ok(engine.with_state(state)),
        None => Ok(engine),
    }
}

fn load_state(config: &ClientConfig) -> Result<Option<SyncState>> {
    let path = config.state_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match SyncState::from_json(&json) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            warn!("Ignoring unreadable sync state {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

async fn save_state(engine: &Engine, path: &Path) -> Result<()> {
    let json = engine.state().read().await.to_json()?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn format_time(timestamp: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => "-".to_string(),
    }
}

fn print_report(report: &SyncReport) {
    println!("Sync completed in {:?}", report.duration);
    println!("  Pushed: {}", report.pushed);
    if report.push_failed > 0 {
        println!("  Push failures: {}", report.push_failed);
    }
    println!("  Added: {}", report.added);
    println!("  Removed: {}", report.removed);
    if let Some(level) = report.level {
        let method = if report.full_content {
            "full content"
        } else {
            "digest"
        };
        println!("  Reconciled at level {} ({})", level, method);
    }
}

/// Record a pending point.
fn cmd_record(config: &ClientConfig, lat: f64, lng: f64, timestamp: Option<i64>) -> Result<()> {
    let timestamp = timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
    let store = Arc::new(open_store(config)?);
    let remote = Arc::new(HttpRemote::new(config.remote.clone()).context("Invalid remote")?);
    let engine = SyncEngine::new(store, remote, config.sync.clone());

    let record = engine
        .record_point(Point::new(timestamp, lat, lng))
        .context("Failed to record point")?;

    println!("Recorded point {} at {}", record.point, format_time(timestamp));
    Ok(())
}

/// List stored points.
fn cmd_list(config: &ClientConfig, pending: bool, confirmed: bool) -> Result<()> {
    let store = open_store(config)?;
    let records: Vec<PointRecord> = if pending {
        store.list_pending()?
    } else if confirmed {
        store.list_confirmed()?
    } else {
        store.list_all()?
    };

    if records.is_empty() {
        println!("(no points)");
        return Ok(());
    }

    for record in records {
        let status = if record.pending { "pending" } else { "" };
        println!(
            "{:>15}  {}  {:>11.6} {:>11.6}  {}",
            record.point.timestamp,
            format_time(record.point.timestamp),
            record.point.lat,
            record.point.lng,
            status
        );
    }

    Ok(())
}

/// Run one sync cycle.
async fn cmd_sync(config: ClientConfig) -> Result<()> {
    let state_path = config.state_path()?;
    let engine = open_engine(config)?;

    let result = engine.sync().await;
    save_state(&engine, &state_path).await?;

    let report = result.context("Sync failed")?;
    print_report(&report);
    Ok(())
}

/// Sync periodically until Ctrl-C.
async fn cmd_run(mut config: ClientConfig, interval: Option<u64>) -> Result<()> {
    if let Some(secs) = interval {
        config.sync.sync_mode = SyncMode::Periodic {
            interval: Duration::from_secs(secs.max(1)),
        };
    }

    let state_path = config.state_path()?;
    let mut engine = open_engine(config)?;
    let handle = engine.init_scheduler();
    let engine = Arc::new(engine);
    let task = engine.spawn_scheduler(handle);

    info!("Syncing in {:?} mode, press Ctrl-C to stop", engine.config().sync_mode);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if let Some(scheduler) = engine.scheduler() {
        scheduler.shutdown().await;
    }
    task.await.context("Scheduler task panicked")?;
    save_state(&engine, &state_path).await?;

    println!("Stopped");
    Ok(())
}

/// Show point counts and the last sync outcome.
fn cmd_status(config: &ClientConfig) -> Result<()> {
    let store = open_store(config)?;
    let pending = store.list_pending()?.len();
    let confirmed = store.list_confirmed()?.len();

    println!("Store: {}", config.store_path()?.display());
    println!("  Pending: {}", pending);
    println!("  Confirmed: {}", confirmed);

    match load_state(config)? {
        Some(state) => {
            println!("  Cycles: {} completed, {} failed", state.cycles_completed, state.cycles_failed);
            if let Some(time) = state.last_success {
                println!("  Last success: {}", time.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(time) = state.last_failure {
                println!("  Last failure: {}", time.format("%Y-%m-%d %H:%M:%S"));
            }
            if let Some(error) = &state.last_error {
                println!("  Last error: {}", error);
            }
        }
        None => println!("  Never synced"),
    }

    Ok(())
}
