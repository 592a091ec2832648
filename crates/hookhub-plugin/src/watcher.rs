//! Polling watcher that keeps the registry in sync with the plugin directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::manager::PluginHost;

/// Service that periodically reconciles the plugin directory.
#[derive(Debug)]
pub struct DirectoryWatcher {
    /// Host to sync.
    host: Arc<PluginHost>,
    /// Directory to poll.
    directory: PathBuf,
    /// Poll interval.
    interval: Duration,
}

impl DirectoryWatcher {
    /// Create a new directory watcher.
    pub fn new(host: Arc<PluginHost>, directory: PathBuf, interval_seconds: u64) -> Self {
        Self {
            host,
            directory,
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// Spawns the watch loop; send `true` on the returned channel to stop it.
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            self.run(rx).await;
        });
        (handle, tx)
    }

    /// Runs the watch loop until the cancel flag flips to `true`.
    pub async fn run(&self, cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Plugin directory watcher started, dir={}, interval={}s",
            self.directory.display(),
            self.interval.as_secs()
        );

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial load already ran.
        interval.tick().await;
        let mut cancel = cancel;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.host.sync_directory(&self.directory).await {
                        Ok(report) => {
                            if !report.loaded.is_empty()
                                || !report.reloaded.is_empty()
                                || !report.removed.is_empty()
                                || !report.failed.is_empty()
                            {
                                tracing::info!(
                                    loaded = ?report.loaded,
                                    reloaded = ?report.reloaded,
                                    removed = ?report.removed,
                                    failed = ?report.failed_names(),
                                    "Plugin directory changed"
                                );
                            } else {
                                tracing::trace!("Plugin directory unchanged");
                            }
                        }
                        Err(e) => tracing::error!("Plugin directory sync failed: {}", e),
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!("Plugin directory watcher shutting down");
                        break;
                    }
                }
            }
        }
    }
}
