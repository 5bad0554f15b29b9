//! # Kicks Till
//!
//! Headless till process. Keeps the Local Store in step with the shop's
//! shared remote store and exposes admin commands on the command line.
//!
//! ## Module Organization
//! ```text
//! kicks_till/
//! ├── lib.rs          ◄─── You are here (startup, daemon loop)
//! ├── cli.rs          ◄─── Argument parsing and usage text
//! ├── commands.rs     ◄─── One-shot commands on top of kicks-pos
//! └── error.rs        ◄─── TillError and exit codes
//! ```
//!
//! ## Daemon Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          kicks-till run                                 │
//! │                                                                         │
//! │   SyncAgent ─── startup cycle (full pull), then every interval_secs     │
//! │       │                                                                 │
//! │       ├── realtime channel applies remote changes as they arrive        │
//! │       │                                                                 │
//! │   SIGHUP ─────► trigger(Manual)          (unix only)                    │
//! │   ctrl-c ─────► handle.shutdown() ──► agent stops, pool closes          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod commands;
pub mod error;

use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use kicks_db::{Database, DbConfig};
use kicks_sync::{SyncAgent, SyncAgentHandle, SyncTrigger};

use cli::{Cli, Command, USAGE};
use commands::App;
pub use error::{TillError, TillResult};

/// Parses `args` (without the program name) and runs the command.
///
/// ## Startup Sequence
/// ```text
/// 1. Initialize logging (RUST_LOG, default info,kicks=debug,sqlx=warn)
/// 2. Determine database path (--db, KICKS_DB_PATH, app data directory)
/// 3. Connect to database & run migrations
/// 4. Resolve sync config (sync.toml, settings table, KICKS_* env vars)
/// 5. Run the daemon or the one-shot command
/// ```
pub async fn run(args: Vec<String>) -> TillResult<()> {
    let cli = Cli::parse(args)?;
    if cli.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    init_tracing();

    let db_path = database_path(cli.db_path)?;
    info!(?db_path, "Database path determined");
    let db = Database::new(DbConfig::new(db_path)).await?;

    let app = App::open(db.clone(), cli.config_path).await?;

    let result = match cli.command {
        Command::Run => run_daemon(&app).await,
        command => {
            let output = app.execute(command).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    };

    db.close().await;
    result
}

async fn run_daemon(app: &App) -> TillResult<()> {
    info!(device = %app.config().device_id(), "Starting Kicks till");

    let handle = SyncAgent::new(app.engine().clone(), app.config().clone())
        .start()
        .await?;

    wait_for_shutdown(&handle).await;

    match handle.status().await {
        Ok(status) => info!(
            pending = status.pending,
            skipped_cycles = status.skipped_cycles,
            "Stopping till"
        ),
        Err(e) => warn!(error = %e, "Could not read sync status on shutdown"),
    }
    handle.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(handle: &SyncAgentHandle) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(error = %e, "SIGHUP handler not installed");
            None
        }
    };

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "ctrl-c handler failed");
                }
                return;
            }
            Some(()) = async {
                match hangup.as_mut() {
                    Some(stream) => stream.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                info!("SIGHUP received, syncing now");
                if let Err(e) = handle.trigger(SyncTrigger::Manual).await {
                    warn!(error = %e, "Manual sync not requested");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &SyncAgentHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "ctrl-c handler failed");
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=kicks_sync=trace` - Trace the sync engine only
/// - Default: INFO, DEBUG for the kicks crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kicks=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines the database file path.
///
/// ## Lookup Order
/// 1. `--db PATH`
/// 2. `KICKS_DB_PATH` environment variable
/// 3. Platform data dir:
///    - **macOS**: `~/Library/Application Support/com.kicks.pos/kicks.db`
///    - **Windows**: `%APPDATA%\kicks\pos\data\kicks.db`
///    - **Linux**: `~/.local/share/pos/kicks.db`
fn database_path(explicit: Option<PathBuf>) -> TillResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(path) = std::env::var("KICKS_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ProjectDirs::from("com", "kicks", "pos").ok_or(TillError::NoDataDir)?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("kicks.db"))
}
