//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Docker Engine API (unix socket)
//!     → docker.rs (containers, swarm services)
//!     → normalized ServiceDescriptor list
//!     → merged across providers by the broker pass
//!
//! Mock mode / tests:
//!     → static_list.rs (swappable in-memory list)
//! ```
//!
//! # Design Decisions
//! - Descriptors are produced fresh on every call and never mutated
//! - Replica count and endpoint mode come from the orchestrator, never labels
//! - Filters use the Docker filter shape: `{"label": ["key=value", "key"]}`

pub mod docker;
pub mod static_list;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use docker::{ContainerProvider, DockerClient, SwarmProvider};
pub use static_list::StaticProvider;

/// Label filters passed to providers.
pub type ServiceFilter = BTreeMap<String, Vec<String>>;

/// How the load balancer should resolve a service's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointMode {
    /// Single virtual IP in front of all replicas.
    #[default]
    Vip,
    /// DNS round robin over the replica addresses.
    Dnsrr,
}

impl EndpointMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointMode::Vip => "vip",
            EndpointMode::Dnsrr => "dnsrr",
        }
    }
}

impl std::fmt::Display for EndpointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One orchestrated service as seen by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,

    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default = "default_replicas")]
    pub replicas: u64,

    #[serde(default)]
    pub endpoint_mode: EndpointMode,
}

fn default_replicas() -> u64 {
    1
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: HashMap::new(),
            replicas: 1,
            endpoint_mode: EndpointMode::Vip,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_replicas(mut self, replicas: u64) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_endpoint_mode(mut self, mode: EndpointMode) -> Self {
        self.endpoint_mode = mode;
        self
    }
}

/// Errors raised while enumerating services.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport to the orchestrator failed.
    #[error("{provider}: request failed: {message}")]
    Transport { provider: &'static str, message: String },

    /// The orchestrator answered with a non-success status.
    #[error("{provider}: {path} returned status {status}")]
    Status {
        provider: &'static str,
        path: String,
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("{provider}: invalid response payload: {message}")]
    Payload { provider: &'static str, message: String },

    /// The provider did not answer within the pass budget.
    #[error("{provider}: no answer after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },
}

/// Source of service descriptors.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Enumerate services matching the filter.
    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceDescriptor>, ProviderError>;
}

/// Build the provider filter for a controller's ingress class.
///
/// An empty class means the controller manages every labelled service.
pub fn class_filter(namespace: &str, class: &str) -> ServiceFilter {
    let mut filter = ServiceFilter::new();
    if !class.is_empty() {
        filter.insert(
            "label".to_string(),
            vec![format!("{}.class={}", namespace, class)],
        );
    }
    filter
}

/// Check a label map against the `label` entries of a filter.
///
/// Entries are either `key=value` (exact match) or `key` (presence).
pub fn labels_match(filter: &ServiceFilter, labels: &HashMap<String, String>) -> bool {
    let Some(wanted) = filter.get("label") else {
        return true;
    };
    wanted.iter().all(|entry| match entry.split_once('=') {
        Some((key, value)) => labels.get(key).map(|v| v == value).unwrap_or(false),
        None => labels.contains_key(entry.as_str()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_filter() {
        assert!(class_filter("ingress", "").is_empty());

        let filter = class_filter("ingress", "haproxy");
        assert_eq!(filter["label"], vec!["ingress.class=haproxy".to_string()]);
    }

    #[test]
    fn test_labels_match() {
        let labels: HashMap<String, String> = [
            ("ingress.class".to_string(), "haproxy".to_string()),
            ("ingress.port".to_string(), "80".to_string()),
        ]
        .into_iter()
        .collect();

        assert!(labels_match(&ServiceFilter::new(), &labels));
        assert!(labels_match(&class_filter("ingress", "haproxy"), &labels));
        assert!(!labels_match(&class_filter("ingress", "nginx"), &labels));

        let mut presence = ServiceFilter::new();
        presence.insert("label".into(), vec!["ingress.port".into()]);
        assert!(labels_match(&presence, &labels));

        presence.insert("label".into(), vec!["ingress.backend".into()]);
        assert!(!labels_match(&presence, &labels));
    }

    #[test]
    fn test_endpoint_mode_serde() {
        let json = serde_json::to_string(&EndpointMode::Dnsrr).unwrap();
        assert_eq!(json, "\"dnsrr\"");
        let mode: EndpointMode = serde_json::from_str("\"vip\"").unwrap();
        assert_eq!(mode, EndpointMode::Vip);
    }
}
