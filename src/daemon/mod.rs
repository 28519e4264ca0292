pub mod events;
pub mod executor;
pub mod manager;
pub mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use crate::daemon::events::JobEvent;
use crate::daemon::manager::JobManager;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::models::DaemonConfig;
use crate::server::{self, AppState};
use crate::storage::jobs::JsonJobStore;
use crate::storage::JobStore;

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

fn read_config(path: &Path) -> Result<DaemonConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: DaemonConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Locate the config file, first match wins:
///   1. `--config` CLI flag (must exist)
///   2. `$FETCHD_CONFIG_DIR/config.json`
///   3. platform config dir (`dirs::config_dir()/fetchd/config.json`)
///   4. `{data_dir}/config.json`
///
/// `None` means defaults apply.
pub fn config_source(config_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    let candidates = [
        std::env::var("FETCHD_CONFIG_DIR")
            .ok()
            .map(|dir| PathBuf::from(dir).join("config.json")),
        dirs::config_dir().map(|dir| dir.join("fetchd").join("config.json")),
        Some(resolve_data_dir(None).join("config.json")),
    ];

    Ok(candidates.into_iter().flatten().find(|path| path.exists()))
}

/// Load the DaemonConfig from [`config_source`], or defaults. Also returns
/// the file it came from.
pub fn load_config(config_path: Option<&Path>) -> Result<(DaemonConfig, Option<PathBuf>)> {
    match config_source(config_path)? {
        Some(path) => Ok((read_config(&path)?, Some(path))),
        None => Ok((DaemonConfig::default(), None)),
    }
}

/// Resolve the data directory: explicit override, then `$FETCHD_DATA_DIR`,
/// then the platform data dir (`~/.local/share/fetchd` on Linux).
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(d) = std::env::var("FETCHD_DATA_DIR") {
        return PathBuf::from(d);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fetchd")
}

/// Create the data directory and the storage root if absent.
pub async fn create_data_dirs(data_dir: &Path, storage_root: &Path) -> Result<()> {
    tokio::fs::create_dir_all(data_dir)
        .await
        .context("Failed to create data directory")?;
    tokio::fs::create_dir_all(storage_root)
        .await
        .context("Failed to create storage root")?;
    tracing::info!(
        "Data directory: {}, storage root: {}",
        data_dir.display(),
        storage_root.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Filter used when `RUST_LOG` is unset.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Log to stderr and to `{data_dir}/fetchd.log`. The file is truncated on
/// startup; if it cannot be opened, logging falls back to stderr only.
///
/// The returned guard flushes the file writer and must live as long as the
/// daemon.
fn init_tracing(
    data_dir: &Path,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_log_filter(verbose).into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = data_dir.join("fetchd.log");
    match std::fs::File::create(&log_path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            if result.is_ok() {
                tracing::info!("Logging to stderr and {}", log_path.display());
            }
            Some(guard)
        }
        Err(e) => {
            let result = tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .try_init();
            if result.is_ok() {
                tracing::warn!(
                    "Could not open log file {}: {}. Logging to stderr only.",
                    log_path.display(),
                    e
                );
            }
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Daemon bootstrap
// ---------------------------------------------------------------------------

/// Start the daemon and run until Ctrl+C, SIGTERM or `POST /api/shutdown`.
///
/// 1. Loads config and applies CLI overrides
/// 2. Creates the data directory and storage root
/// 3. Opens the job store and restores recurring timers
/// 4. Serves the HTTP API
/// 5. On shutdown, stops the server and cancels all timers
pub async fn start_daemon(
    config_path: Option<&Path>,
    data_dir_override: Option<&Path>,
    storage_root_override: Option<&Path>,
    host_override: Option<&str>,
    port_override: Option<u16>,
    verbose: bool,
) -> Result<()> {
    let (mut config, source) = load_config(config_path)?;

    if let Some(h) = host_override {
        config.host = h.to_string();
    }
    if let Some(p) = port_override {
        config.port = p;
    }
    if let Some(root) = storage_root_override {
        config.storage_root = Some(root.to_path_buf());
    }

    let data_dir = match (data_dir_override, &config.data_dir) {
        (Some(d), _) => d.to_path_buf(),
        (None, Some(d)) => d.clone(),
        (None, None) => resolve_data_dir(None),
    };
    let storage_root = config.storage_root_for(&data_dir);
    config.data_dir = Some(data_dir.clone());
    config.storage_root = Some(storage_root.clone());
    let config = Arc::new(config);

    create_data_dirs(&data_dir, &storage_root).await?;
    let _log_guard = init_tracing(&data_dir, verbose);
    match &source {
        Some(path) => tracing::info!("Loaded config from: {}", path.display()),
        None => tracing::info!("No config file found, using defaults"),
    }

    let job_store =
        Arc::new(JsonJobStore::new(data_dir.clone()).await?) as Arc<dyn JobStore>;
    let fetcher =
        Arc::new(HttpFetcher::new(storage_root.clone(), &config)?) as Arc<dyn Fetcher>;
    let (event_tx, _event_rx) = broadcast::channel::<JobEvent>(config.broadcast_capacity);

    let manager = Arc::new(JobManager::new(
        job_store,
        fetcher,
        Arc::new(scheduler::SystemClock),
        event_tx,
        storage_root,
    ));
    manager.start().await?;

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    let state = Arc::new(AppState {
        manager: Arc::clone(&manager),
        config: Arc::clone(&config),
        start_time: Instant::now(),
        shutdown_tx: Some(shutdown_tx.clone()),
    });

    let router = server::create_router(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Daemon started. Listening on http://{}", bind_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .ok();
    });

    let mut api_shutdown_rx = shutdown_tx.subscribe();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
            _ = api_shutdown_rx.changed() => {
                tracing::info!("Received API shutdown signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = api_shutdown_rx.changed() => {
                tracing::info!("Received API shutdown signal");
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
    manager.shutdown();

    tracing::info!("Daemon exited cleanly.");
    Ok(())
}
