//! Validate-then-commit application of rendered documents.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{error, info, warn};

use crate::apply::process::{ManagedProcess, ProcessError};
use crate::observability::metrics;
use crate::render::RenderedDocument;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The load balancer rejected the document. Nothing was changed.
    #[error("document {hash} failed validation:\n{output}")]
    Validation { hash: String, output: String },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The new file is live but the process could not be told.
    #[error("reload failed: {0}")]
    Reload(#[source] ProcessError),

    #[error(transparent)]
    Process(ProcessError),
}

impl ApplyError {
    /// The managed lifecycle cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApplyError::Reload(_) | ApplyError::Process(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Same hash as the last applied document.
    Unchanged,
    Started,
    Reloaded,
}

/// Writes documents next to the live file, validates, then swaps them in.
pub struct Applier<P> {
    process: P,
    config_path: PathBuf,
    staging_path: PathBuf,
    last_hash: Option<String>,
    started: bool,
}

fn staging_path(config_path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(config_path.file_name().unwrap_or_default());
    name.push(".staging");
    config_path.with_file_name(name)
}

impl<P: ManagedProcess> Applier<P> {
    pub fn new(process: P, config_path: impl Into<PathBuf>) -> Self {
        let config_path = config_path.into();
        Self {
            staging_path: staging_path(&config_path),
            config_path,
            process,
            last_hash: None,
            started: false,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub async fn apply(&mut self, document: &RenderedDocument) -> Result<ApplyOutcome, ApplyError> {
        if self.last_hash.as_deref() == Some(document.hash()) {
            return Ok(ApplyOutcome::Unchanged);
        }

        fs::write(&self.staging_path, document.bytes())
            .await
            .map_err(|source| ApplyError::Io {
                path: self.staging_path.clone(),
                source,
            })?;

        if let Err(e) = self.process.validate(&self.staging_path).await {
            if let Err(remove) = fs::remove_file(&self.staging_path).await {
                warn!(error = %remove, path = %self.staging_path.display(), "Cannot remove staging file");
            }
            return Err(match e {
                ProcessError::Rejected { output } => {
                    metrics::record_apply("rejected");
                    warn!(hash = document.hash(), "Load balancer rejected configuration");
                    ApplyError::Validation {
                        hash: document.hash().to_string(),
                        output,
                    }
                }
                other => {
                    metrics::record_apply("error");
                    ApplyError::Process(other)
                }
            });
        }

        fs::rename(&self.staging_path, &self.config_path)
            .await
            .map_err(|source| ApplyError::Io {
                path: self.config_path.clone(),
                source,
            })?;

        let outcome = if self.started {
            self.process.reload().await.map_err(ApplyError::Reload)?;
            ApplyOutcome::Reloaded
        } else {
            self.process
                .start(&self.config_path)
                .await
                .map_err(ApplyError::Process)?;
            self.started = true;
            ApplyOutcome::Started
        };

        info!(hash = document.hash(), ?outcome, path = %self.config_path.display(), "Configuration applied");
        metrics::record_apply("applied");
        self.last_hash = Some(document.hash().to_string());
        Ok(outcome)
    }

    /// Stop the process if it was started.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;
        if let Err(e) = self.process.stop().await {
            error!(error = %e, "Failed to stop load balancer");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records calls; rejects files containing `invalid`.
    #[derive(Clone, Default)]
    pub(crate) struct FakeProcess {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeProcess {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ManagedProcess for FakeProcess {
        async fn start(&mut self, _config: &Path) -> Result<(), ProcessError> {
            self.calls.lock().unwrap().push("start".into());
            Ok(())
        }

        async fn validate(&self, config: &Path) -> Result<(), ProcessError> {
            self.calls.lock().unwrap().push("validate".into());
            let text = std::fs::read_to_string(config).unwrap();
            if text.contains("invalid") {
                return Err(ProcessError::Rejected {
                    output: "[ALERT] parsing error".into(),
                });
            }
            Ok(())
        }

        async fn reload(&mut self) -> Result<(), ProcessError> {
            self.calls.lock().unwrap().push("reload".into());
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ProcessError> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }
    }

    fn doc(text: &str) -> RenderedDocument {
        RenderedDocument::from_bytes(text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_start_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("haproxy.cfg");
        let process = FakeProcess::default();
        let mut applier = Applier::new(process.clone(), &live);

        assert_eq!(applier.apply(&doc("one\n")).await.unwrap(), ApplyOutcome::Started);
        assert_eq!(applier.apply(&doc("one\n")).await.unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(applier.apply(&doc("two\n")).await.unwrap(), ApplyOutcome::Reloaded);

        assert_eq!(std::fs::read_to_string(&live).unwrap(), "two\n");
        assert_eq!(process.calls(), vec!["validate", "start", "validate", "reload"]);
        assert!(!staging_path(&live).exists());
    }

    #[tokio::test]
    async fn test_rejected_document_leaves_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("haproxy.cfg");
        let process = FakeProcess::default();
        let mut applier = Applier::new(process.clone(), &live);

        applier.apply(&doc("good\n")).await.unwrap();
        let before = std::fs::read(&live).unwrap();

        let err = applier.apply(&doc("invalid\n")).await.unwrap_err();
        assert!(matches!(err, ApplyError::Validation { ref output, .. } if output.contains("ALERT")));
        assert!(!err.is_fatal());

        assert_eq!(std::fs::read(&live).unwrap(), before);
        assert!(!staging_path(&live).exists());
        assert_eq!(process.calls(), vec!["validate", "start", "validate"]);
        assert_eq!(applier.last_hash(), Some(doc("good\n").hash()));
    }

    #[tokio::test]
    async fn test_shutdown_stops_started_process_once() {
        let dir = tempfile::tempdir().unwrap();
        let process = FakeProcess::default();
        let mut applier = Applier::new(process.clone(), dir.path().join("haproxy.cfg"));

        applier.shutdown().await;
        assert!(process.calls().is_empty());

        applier.apply(&doc("a\n")).await.unwrap();
        applier.shutdown().await;
        applier.shutdown().await;
        assert_eq!(process.calls(), vec!["validate", "start", "stop"]);
    }

    #[test]
    fn test_staging_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/etc/haproxy/haproxy.cfg")),
            PathBuf::from("/etc/haproxy/.haproxy.cfg.staging")
        );
    }
}
