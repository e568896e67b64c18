//! Polling config file watcher.
//!
//! Checks the config file's mtime on a fixed interval. On change it waits
//! for the file to settle (editors write in stages), calls
//! `config::reload()` and reports the outcome on an mpsc channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{defaults, ConfigChange, GateConfig};

/// Events emitted by the config watcher.
#[derive(Debug)]
pub enum ConfigEvent {
    /// New config is active
    Reloaded {
        config: Arc<GateConfig>,
        changes: Vec<ConfigChange>,
    },
    /// Reload failed; the previous config remains active
    Error(String),
}

/// Run the watcher until cancelled or the receiver is dropped.
pub async fn run_config_watcher(
    path: PathBuf,
    tx: mpsc::Sender<ConfigEvent>,
    cancel: CancellationToken,
) {
    let poll = Duration::from_millis(defaults::CONFIG_POLL_MS);
    let settle = Duration::from_millis(defaults::CONFIG_SETTLE_MS);
    tracing::info!(path = %path.display(), "[ConfigWatcher] started");

    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("[ConfigWatcher] cancelled");
                return;
            }
            _ = tokio::time::sleep(poll) => {}
        }

        let current = match get_mtime(&path) {
            Some(t) => t,
            None => {
                if last_mtime.is_some() {
                    tracing::warn!(
                        path = %path.display(),
                        "[ConfigWatcher] config file not accessible, keeping current config"
                    );
                    last_mtime = None;
                }
                continue;
            }
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(settle).await;
        if get_mtime(&path) != Some(current) {
            // still being written
            continue;
        }
        last_mtime = Some(current);

        let event = match super::reload() {
            Ok((config, changes)) => ConfigEvent::Reloaded { config, changes },
            Err(e) => {
                tracing::error!(error = %e, "[ConfigWatcher] reload failed, keeping previous config");
                ConfigEvent::Error(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("[ConfigWatcher] channel closed, stopping");
            return;
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
