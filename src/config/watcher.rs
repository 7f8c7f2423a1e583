//! Template file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::broker::BrokerHandle;
use crate::observability::metrics;
use crate::render::ConfigTemplate;

/// A watcher that monitors the template file for changes.
pub struct TemplateWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ConfigTemplate>,
}

impl TemplateWatcher {
    /// Create a new TemplateWatcher.
    ///
    /// Returns the watcher and a receiver for parsed templates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ConfigTemplate>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in notify's background thread.
    ///
    /// The parent directory is watched so editors that replace the file by
    /// rename are still seen. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let file_name = path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_template = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if !touches_template || !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    tracing::info!(path = ?path, "Template file change detected, reloading...");
                    match ConfigTemplate::load(&path) {
                        Ok(template) => {
                            let _ = tx.send(template);
                        }
                        Err(e) => {
                            metrics::record_template_swap("rejected");
                            tracing::error!("Failed to reload template: {}. Keeping current template.", e);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Template watcher started");
        Ok(watcher)
    }
}

/// Install templates from the watcher until shutdown or the broker stops.
pub async fn forward_templates(
    mut updates: mpsc::UnboundedReceiver<ConfigTemplate>,
    broker: BrokerHandle,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            update = updates.recv() => {
                let Some(template) = update else { break };
                if broker.install_template(template).await.is_err() {
                    break;
                }
                metrics::record_template_swap("accepted");
            }
        }
    }
}
