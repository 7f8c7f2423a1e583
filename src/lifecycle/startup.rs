//! Startup orchestration.
//!
//! # Responsibilities
//! - Resolve the controller's own labels (inspect, or built-in mock set)
//! - Register providers for the environment (containers, swarm, static)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Swarm services are only queried on an active swarm node
//! - Mock mode never touches Docker

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::provider::{
    ContainerProvider, DockerClient, Provider, ProviderError, StaticProvider, SwarmProvider,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("controller container unknown: set [controller].hostname or HOSTNAME")]
    NoHostname,

    #[error("docker access is disabled and mock mode is off")]
    DockerDisabled,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Labels used when the controller runs without Docker.
pub fn mock_controller_labels(namespace: &str) -> HashMap<String, String> {
    [
        ("class", "haproxy"),
        ("global", "spread-checks 15\n"),
        (
            "defaults",
            "timeout connect 5s\ntimeout check 5s\ntimeout client 2m\ntimeout server 2m\n\
             retries 1\nretry-on all-retryable-errors\noption redispatch 1\n\
             default-server check inter 30s\n",
        ),
        ("frontend.default", "bind *:3000\n"),
    ]
    .into_iter()
    .map(|(key, value)| (format!("{}.{}", namespace, key), value.to_string()))
    .collect()
}

/// Docker client for this configuration, unless mock mode or disabled.
pub fn docker_client(config: &Config) -> Option<DockerClient> {
    (!config.controller.mock && config.docker.enabled).then(|| DockerClient::new(&config.docker.socket))
}

/// The controller's labels with `[controller].labels` layered on top.
pub async fn controller_labels(
    config: &Config,
    docker: Option<&DockerClient>,
) -> Result<HashMap<String, String>, StartupError> {
    let mut labels = if config.controller.mock {
        mock_controller_labels(&config.reconcile.namespace)
    } else {
        let docker = docker.ok_or(StartupError::DockerDisabled)?;
        let hostname = config
            .controller
            .hostname
            .clone()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .filter(|h| !h.is_empty())
            .ok_or(StartupError::NoHostname)?;
        info!(container = %hostname, "Reading controller labels");
        docker.container_labels(&hostname).await?
    };

    labels.extend(config.controller.labels.clone());
    Ok(labels)
}

/// Providers polled by every pass.
pub async fn build_providers(
    config: &Config,
    docker: Option<&DockerClient>,
) -> Result<Vec<Arc<dyn Provider>>, StartupError> {
    if config.controller.mock {
        info!(services = config.mock.services.len(), "Mock mode: serving static services");
        let provider: Arc<dyn Provider> = Arc::new(StaticProvider::new(config.mock.services.clone()));
        return Ok(vec![provider]);
    }

    let docker = docker.ok_or(StartupError::DockerDisabled)?;
    let mut providers: Vec<Arc<dyn Provider>> = vec![Arc::new(ContainerProvider::new(
        docker.clone(),
        config.reconcile.namespace.clone(),
    ))];

    if docker.swarm_active().await? {
        info!("Swarm mode active, registering swarm provider");
        providers.push(Arc::new(SwarmProvider::new(docker.clone())));
    }
    Ok(providers)
}
