//! Load balancer process control.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, info, warn};

/// Errors raised while driving the load balancer binary.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },

    /// The validation mode rejected the file.
    #[error("configuration rejected:\n{output}")]
    Rejected { output: String },

    #[error("cannot signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: io::Error,
    },

    #[error("load balancer exited ({status})")]
    Exited { status: String },

    #[error("load balancer is not running")]
    NotRunning,
}

/// Lifecycle of a process that serves a configuration file.
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// Begin serving `config`. Called once, after the first valid file lands.
    async fn start(&mut self, config: &Path) -> Result<(), ProcessError>;

    /// Check a candidate file without touching the running process.
    async fn validate(&self, config: &Path) -> Result<(), ProcessError>;

    /// Make the running process pick up the live file.
    async fn reload(&mut self) -> Result<(), ProcessError>;

    async fn stop(&mut self) -> Result<(), ProcessError>;
}

enum Target {
    Idle,
    Spawned(Child),
    Attached(i32),
}

/// HAProxy in master-worker mode.
///
/// Either spawned as a child (`-W -f <config>`) or attached to a pid that
/// someone else started, such as pid 1 of a load balancer container.
pub struct HaproxyProcess {
    binary: PathBuf,
    extra_args: Vec<String>,
    stop_timeout: Duration,
    target: Target,
}

impl HaproxyProcess {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: Vec::new(),
            stop_timeout: Duration::from_secs(10),
            target: Target::Idle,
        }
    }

    /// Signal an existing master instead of spawning one.
    pub fn attached(binary: impl Into<PathBuf>, pid: i32) -> Self {
        Self {
            target: Target::Attached(pid),
            ..Self::new(binary)
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn binary_name(&self) -> String {
        self.binary.display().to_string()
    }

    fn running_pid(&mut self) -> Result<i32, ProcessError> {
        match &mut self.target {
            Target::Idle => Err(ProcessError::NotRunning),
            Target::Attached(pid) => Ok(*pid),
            Target::Spawned(child) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(ProcessError::Exited {
                        status: status.to_string(),
                    });
                }
                let pid = child.id().ok_or(ProcessError::NotRunning)?;
                i32::try_from(pid).map_err(|_| ProcessError::NotRunning)
            }
        }
    }
}

/// Deliver `signal` to `pid`.
pub(crate) fn send_signal(pid: i32, signal: libc::c_int) -> Result<(), ProcessError> {
    // SAFETY: kill(2) takes plain integers and touches no memory.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(ProcessError::Signal {
            pid,
            source: io::Error::last_os_error(),
        })
    }
}

#[async_trait]
impl ManagedProcess for HaproxyProcess {
    async fn start(&mut self, config: &Path) -> Result<(), ProcessError> {
        match self.target {
            Target::Idle => {
                let child = Command::new(&self.binary)
                    .args(&self.extra_args)
                    .arg("-W")
                    .arg("-f")
                    .arg(config)
                    .stdin(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|source| ProcessError::Spawn {
                        binary: self.binary_name(),
                        source,
                    })?;
                info!(pid = ?child.id(), config = %config.display(), "Load balancer started");
                self.target = Target::Spawned(child);
                Ok(())
            }
            // Already serving an older file.
            Target::Attached(_) | Target::Spawned(_) => self.reload().await,
        }
    }

    async fn validate(&self, config: &Path) -> Result<(), ProcessError> {
        let output = Command::new(&self.binary)
            .arg("-c")
            .arg("-f")
            .arg(config)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProcessError::Spawn {
                binary: self.binary_name(),
                source,
            })?;

        if output.status.success() {
            debug!(config = %config.display(), "Configuration valid");
            return Ok(());
        }

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(ProcessError::Rejected { output: text })
    }

    async fn reload(&mut self) -> Result<(), ProcessError> {
        let pid = self.running_pid()?;
        send_signal(pid, libc::SIGUSR2)?;
        info!(pid, "Load balancer reload signalled");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProcessError> {
        match std::mem::replace(&mut self.target, Target::Idle) {
            Target::Idle => Ok(()),
            Target::Attached(pid) => {
                // Not ours to stop.
                info!(pid, "Detached from load balancer");
                Ok(())
            }
            Target::Spawned(mut child) => {
                if let Some(pid) = child.id().and_then(|p| i32::try_from(p).ok()) {
                    if let Err(e) = send_signal(pid, libc::SIGINT) {
                        warn!(error = %e, "Interrupt failed");
                    }
                }
                match time::timeout(self.stop_timeout, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!(%status, "Load balancer stopped");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(ProcessError::Spawn {
                        binary: self.binary_name(),
                        source: e,
                    }),
                    Err(_) => {
                        warn!(
                            timeout_secs = self.stop_timeout.as_secs(),
                            "Load balancer ignored interrupt, killing"
                        );
                        child.kill().await.map_err(|source| ProcessError::Spawn {
                            binary: self.binary_name(),
                            source,
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_maps_exit_status() {
        let file = tempfile::NamedTempFile::new().unwrap();

        HaproxyProcess::new("true").validate(file.path()).await.unwrap();

        let err = HaproxyProcess::new("false").validate(file.path()).await.unwrap_err();
        assert!(matches!(err, ProcessError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = HaproxyProcess::new("/nonexistent/haproxy")
            .validate(file.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_reload_before_start_fails() {
        let mut process = HaproxyProcess::new("true");
        assert!(matches!(process.reload().await, Err(ProcessError::NotRunning)));
    }

    #[tokio::test]
    async fn test_stop_interrupts_child() {
        let mut process = HaproxyProcess::new("sleep").with_stop_timeout(Duration::from_secs(5));
        process.target = Target::Spawned(
            Command::new("sleep")
                .arg("30")
                .kill_on_drop(true)
                .spawn()
                .unwrap(),
        );

        process.stop().await.unwrap();
        assert!(matches!(process.target, Target::Idle));
    }

    #[tokio::test]
    async fn test_reload_of_missing_pid_is_signal_error() {
        let mut process = HaproxyProcess::attached("haproxy", i32::MAX);
        assert!(matches!(
            process.reload().await,
            Err(ProcessError::Signal { pid: i32::MAX, .. })
        ));
    }

    #[tokio::test]
    async fn test_attached_stop_leaves_process_alone() {
        let mut process = HaproxyProcess::attached("haproxy", i32::MAX);
        process.stop().await.unwrap();
        assert!(matches!(process.target, Target::Idle));
    }
}
