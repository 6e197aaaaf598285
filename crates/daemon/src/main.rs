// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tendd - The tend sync daemon.
//!
//! Keeps the configured collections of one user in sync with the remote
//! store. The SQLite cache, the offline queue, the lock file and the log
//! live in the state directory (default `~/.local/share/tend/`).
//!
//! Usage:
//!   tendd [--config <path>] [--state-dir <path>]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tend_core::{Clock, SystemClock};
use tend_sync::config::{db_path, queue_path};
use tend_sync::{
    Config, ConnectivityMonitor, HttpRemoteStore, LocalStore, NetworkProbe, OfflineQueue, RealtimeChannel,
    SessionProvider, StaticSession, SyncOrchestrator, SyncParts, WebSocketChannel,
};
use tokio::sync::broadcast::error::RecvError;

mod env;

/// PID filename within the state directory.
const PID_NAME: &str = "tendd.pid";
/// Lock filename for single instance guarantee.
const LOCK_NAME: &str = "tendd.lock";
/// Log filename within the state directory.
const LOG_NAME: &str = "tendd.log";

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match resolve_config_path(&args) {
        Some(path) => path,
        None => {
            eprintln!("tendd: no config file; pass --config <path> or set TEND_CONFIG");
            std::process::exit(2);
        }
    };
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tendd: {e}");
            std::process::exit(2);
        }
    };

    let state_override = parse_flag(&args, "--state-dir").or_else(env::state_dir);
    let state_dir = match config.state_dir(state_override.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("tendd: {e}");
            std::process::exit(2);
        }
    };
    if let Err(e) = fs::create_dir_all(&state_dir) {
        eprintln!("tendd: failed to create {}: {e}", state_dir.display());
        std::process::exit(1);
    }

    setup_logging(&state_dir.join(LOG_NAME));
    tracing::info!(
        state_dir = %state_dir.display(),
        config = %config_path.display(),
        "tendd starting"
    );

    // Acquire file lock for single instance
    let lock_file = match acquire_lock(&state_dir.join(LOCK_NAME)) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("failed to acquire lock: {}", e);
            std::process::exit(1);
        }
    };

    let pid_path = state_dir.join(PID_NAME);
    if let Err(e) = fs::write(&pid_path, std::process::id().to_string()) {
        tracing::error!("failed to write PID file: {}", e);
        std::process::exit(1);
    }

    let result = run(&config, &state_dir).await;

    let _ = fs::remove_file(&pid_path);
    drop(lock_file);
    match result {
        Ok(()) => tracing::info!("tendd stopped"),
        Err(e) => {
            tracing::error!(error = %e, "tendd failed");
            std::process::exit(1);
        }
    }
}

async fn run(config: &Config, state_dir: &Path) -> tend_sync::Result<()> {
    let remote = Arc::new(HttpRemoteStore::new(
        config.remote.url.clone(),
        config.remote.api_key.clone(),
        config.timeout(),
    )?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let realtime = config
        .realtime
        .as_ref()
        .map(|r| Arc::new(WebSocketChannel::new(r.url.clone())) as Arc<dyn RealtimeChannel>);

    let parts = SyncParts {
        remote: Arc::clone(&remote),
        monitor: Arc::new(ConnectivityMonitor::new(remote as Arc<dyn NetworkProbe>)),
        local: LocalStore::open(&db_path(state_dir))?,
        queue: OfflineQueue::with_clock(&queue_path(state_dir), Arc::clone(&clock))?,
        session: Arc::new(StaticSession::new(config.user_id.clone())) as Arc<dyn SessionProvider>,
        schemas: config.schemas(),
        realtime,
        clock,
    };
    let sync = SyncOrchestrator::new(parts, config.settings());

    let mut events = sync.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    collection = %event.collection,
                    status = %event.state.connection_status,
                    pending = event.state.pending_count,
                    last_synced_at = ?event.state.last_synced_at,
                    "sync state changed"
                ),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "state reporter lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    sync.start_session(None).await?;

    // Signal readiness to parent process
    println!("READY");
    let _ = std::io::stdout().flush();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    sync.end_session().await;
    reporter.abort();
    Ok(())
}

/// Value following `flag` in `args`, if present.
fn parse_flag(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// `--config`, then `TEND_CONFIG`, then `<config dir>/tend/config.toml`.
fn resolve_config_path(args: &[String]) -> Option<PathBuf> {
    parse_flag(args, "--config")
        .or_else(env::config_path)
        .or_else(|| dirs::config_dir().map(|d| d.join("tend").join("config.toml")))
}

fn setup_logging(log_path: &Path) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env(env::names::RUST_LOG).unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to open log file, fall back to stderr
    if let Ok(file) = fs::OpenOptions::new().create(true).append(true).open(log_path) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn acquire_lock(lock_path: &Path) -> std::io::Result<fs::File> {
    use fs2::FileExt;

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| std::io::Error::other("another tendd instance is already running"))?;
    Ok(file)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
