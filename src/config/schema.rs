//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the controller.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::broker::BrokerSettings;
use crate::labels::DEFAULT_NAMESPACE;
use crate::observability::LogFormat;
use crate::provider::ServiceDescriptor;

/// Root configuration for the ingress controller.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP listener for the long-poll API.
    pub listener: ListenerConfig,

    /// Reconciliation cadence and bounds.
    pub reconcile: ReconcileConfig,

    /// Template source.
    pub template: TemplateConfig,

    /// Where controller labels come from.
    pub controller: ControllerConfig,

    /// Services served in mock mode.
    pub mock: MockConfig,

    /// Docker Engine access.
    pub docker: DockerConfig,

    /// Managed HAProxy process.
    pub haproxy: HaproxyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6789").
    pub bind_address: String,

    /// Upper bound for any request, long-polls included.
    pub request_timeout_secs: u64,

    /// Largest accepted template upload.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6789".to_string(),
            request_timeout_secs: 60,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Seconds between periodic passes.
    pub interval_secs: u64,

    /// Upper bound for one provider query.
    pub provider_timeout_secs: u64,

    /// How long `GET /` waits for a change before answering 304.
    pub long_poll_secs: u64,

    /// Label namespace (`ingress` → `ingress.class`, `ingress.port`, ...).
    pub namespace: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            provider_timeout_secs: 10,
            long_poll_secs: 30,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ReconcileConfig {
    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs)
    }

    pub fn broker_settings(&self) -> BrokerSettings {
        BrokerSettings {
            interval: Duration::from_secs(self.interval_secs),
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            ..Default::default()
        }
    }
}

/// Template configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template file.
    pub path: PathBuf,

    /// Re-read the file when it changes on disk.
    pub watch: bool,

    /// Write templates received over HTTP back to `path`.
    pub persist_updates: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates/haproxy.cfg.template"),
            watch: true,
            persist_updates: true,
        }
    }
}

/// Controller label source.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    /// Use built-in labels and `[mock].services` instead of Docker.
    pub mock: bool,

    /// Container to inspect for controller labels. Falls back to `$HOSTNAME`.
    pub hostname: Option<String>,

    /// Extra labels layered over the discovered (or built-in) ones.
    pub labels: HashMap<String, String>,
}

/// Mock mode services.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MockConfig {
    pub services: Vec<ServiceDescriptor>,
}

/// Docker Engine access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub enabled: bool,

    /// Engine API Unix socket.
    pub socket: PathBuf,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket: PathBuf::from("/var/run/docker.sock"),
        }
    }
}

/// Managed HAProxy process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Spawn and reload HAProxy from this process.
    pub manage: bool,

    pub binary: PathBuf,

    /// Live configuration file.
    pub config_path: PathBuf,

    /// Arguments placed before `-W -f <config>`.
    pub extra_args: Vec<String>,

    /// Grace period between SIGINT and kill.
    pub stop_timeout_secs: u64,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            manage: false,
            binary: PathBuf::from("haproxy"),
            config_path: PathBuf::from("/usr/local/etc/haproxy/haproxy.cfg"),
            extra_args: Vec::new(),
            stop_timeout_secs: 10,
        }
    }
}

impl HaproxyConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
