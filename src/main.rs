//! HookHub host daemon.
//!
//! Loads the plugin directory, fires the lifecycle hooks, keeps the
//! registry in sync with the directory when hot reload is on, and unloads
//! everything on shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use hookhub_core::config::AppConfig;
use hookhub_core::error::{AppError, AppResult};
use hookhub_plugin::{DirectoryWatcher, HookContext, HookPoint, PluginCatalog, PluginHost};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Host error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> AppResult<AppConfig> {
    let config_path =
        std::env::var("HOOKHUB_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

    AppConfig::load(&config_path)
        .map_err(|e| AppError::configuration(format!("Config load error ({config_path}): {e}")))
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

fn lifecycle_context() -> HookContext {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    HookContext::new().with_string("host", &host)
}

/// Main host run function
async fn run(config: AppConfig) -> AppResult<()> {
    tracing::info!("Starting HookHub v{}", env!("CARGO_PKG_VERSION"));

    let mut catalog = PluginCatalog::new();
    plugin_request_tools::register_all(&mut catalog);
    tracing::info!(factories = ?catalog.ids(), "Plugin catalog ready");

    let host = Arc::new(PluginHost::new(&config, catalog));
    let directory = PathBuf::from(&config.plugins.directory);

    if config.plugins.auto_load {
        let report = host.load_plugins(&directory).await?;
        for failure in &report.failed {
            tracing::warn!(plugin = %failure.name, error = %failure.reason, "Plugin not loaded");
        }
        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            outcome = ?report.outcome(),
            "Plugins loaded from '{}'",
            directory.display()
        );
    } else {
        tracing::info!("Plugin auto-load disabled");
    }

    if let Ok(outcome) = host.fire(HookPoint::OnStartup, lifecycle_context()).await {
        tracing::debug!(invoked = ?outcome.invoked, "on_startup dispatched");
    }

    let watcher = if config.plugins.hot_reload {
        let watcher = DirectoryWatcher::new(
            Arc::clone(&host),
            directory.clone(),
            config.plugins.poll_interval_seconds,
        );
        Some(watcher.spawn())
    } else {
        None
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, unloading plugins...");

    if let Some((handle, cancel)) = watcher {
        let _ = cancel.send(true);
        let _ = handle.await;
    }

    if let Ok(outcome) = host.fire(HookPoint::OnShutdown, lifecycle_context()).await {
        tracing::debug!(invoked = ?outcome.invoked, "on_shutdown dispatched");
    }

    let errors = host.unload_all().await;
    if !errors.is_empty() {
        tracing::warn!(count = errors.len(), "Some plugins failed to shut down cleanly");
    }

    tracing::info!("HookHub stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
