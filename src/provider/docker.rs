//! Docker Engine API providers.
//!
//! # Responsibilities
//! - Talk HTTP/1.1 to the engine over its unix socket
//! - Enumerate plain (compose) containers and group them into services
//! - Enumerate swarm services when the node is part of an active swarm
//! - Read the controller's own labels from its container

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::net::UnixStream;

use crate::provider::{EndpointMode, Provider, ProviderError, ServiceDescriptor, ServiceFilter};

/// Upper bound for a single engine response body.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// Roles that mark the ingress infrastructure itself.
pub const INFRA_ROLES: [&str; 3] = ["controller", "manager", "loadbalancer"];

/// Minimal Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket: PathBuf,
}

impl DockerClient {
    pub fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    /// Issue a GET and decode the JSON answer.
    async fn get_json<T: DeserializeOwned>(
        &self,
        provider: &'static str,
        path: &str,
    ) -> Result<T, ProviderError> {
        let transport = |e: &dyn std::fmt::Display| ProviderError::Transport {
            provider,
            message: e.to_string(),
        };

        let stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|e| transport(&e))?;
        let (mut sender, conn) = http1::handshake::<_, Body>(TokioIo::new(stream))
            .await
            .map_err(|e| transport(&e))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "Docker connection closed with error");
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(header::HOST, "docker")
            .body(Body::empty())
            .map_err(|e| transport(&e))?;

        let response = sender.send_request(request).await.map_err(|e| transport(&e))?;
        let status = response.status();
        let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES)
            .await
            .map_err(|e| transport(&e))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider,
                path: path.split('?').next().unwrap_or(path).to_string(),
                status: status.as_u16(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| ProviderError::Payload {
            provider,
            message: e.to_string(),
        })
    }

    /// Whether the engine is an active swarm node.
    pub async fn swarm_active(&self) -> Result<bool, ProviderError> {
        let info: EngineInfo = self.get_json("docker", "/info").await?;
        Ok(info.swarm.local_node_state == "active")
    }

    /// Labels of a container, looked up by id or name.
    pub async fn container_labels(
        &self,
        id: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let path = format!("/containers/{}/json", encode(id));
        let inspect: ContainerInspect = self.get_json("docker", &path).await?;
        Ok(inspect.config.labels.unwrap_or_default())
    }
}

fn encode(raw: &str) -> String {
    url::form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}

fn with_filters(path: &str, filter: &ServiceFilter) -> String {
    if filter.is_empty() {
        return path.to_string();
    }
    // BTreeMap<String, Vec<String>> always serializes
    let json = serde_json::to_string(filter).unwrap_or_default();
    format!("{}?filters={}", path, encode(&json))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineInfo {
    #[serde(default)]
    swarm: SwarmInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SwarmInfo {
    #[serde(default)]
    local_node_state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerInspect {
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// Entry of `GET /containers/json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

/// Entry of `GET /services`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmService {
    #[serde(default)]
    pub spec: SwarmServiceSpec,
    #[serde(default)]
    pub endpoint: SwarmEndpoint,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmServiceSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default)]
    pub mode: SwarmServiceMode,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmServiceMode {
    #[serde(default)]
    pub replicated: Option<SwarmReplicated>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmReplicated {
    #[serde(default)]
    pub replicas: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmEndpoint {
    #[serde(default)]
    pub spec: SwarmEndpointSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmEndpointSpec {
    #[serde(default)]
    pub mode: Option<String>,
}

/// Fold plain containers into services.
///
/// Swarm task containers and ingress infrastructure are skipped. Containers
/// resolving to the same name count as replicas of one service.
pub fn group_containers(namespace: &str, containers: Vec<ContainerSummary>) -> Vec<ServiceDescriptor> {
    let role_key = format!("{}.role", namespace);
    let alias_key = format!("{}.network-alias", namespace);
    let mut services: BTreeMap<String, ServiceDescriptor> = BTreeMap::new();

    for container in containers {
        let labels = container.labels.unwrap_or_default();
        if labels.get(SWARM_SERVICE_LABEL).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        if let Some(role) = labels.get(&role_key) {
            if INFRA_ROLES.contains(&role.as_str()) {
                tracing::debug!(container = %container.id, role = %role, "Skipping ingress container");
                continue;
            }
        }

        let name = labels
            .get(&alias_key)
            .filter(|v| !v.is_empty())
            .or_else(|| labels.get(COMPOSE_SERVICE_LABEL).filter(|v| !v.is_empty()))
            .cloned()
            .or_else(|| container.names.first().cloned())
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();
        if name.is_empty() {
            tracing::debug!(container = %container.id, "Skipping container without a name");
            continue;
        }

        match services.get_mut(&name) {
            Some(existing) => existing.replicas += 1,
            None => {
                services.insert(
                    name.clone(),
                    ServiceDescriptor {
                        name,
                        labels,
                        replicas: 1,
                        endpoint_mode: EndpointMode::Dnsrr,
                    },
                );
            }
        }
    }

    services.into_values().collect()
}

/// Normalize one swarm service.
pub fn swarm_descriptor(service: SwarmService) -> ServiceDescriptor {
    let endpoint_mode = match service.endpoint.spec.mode.as_deref() {
        Some("dnsrr") => EndpointMode::Dnsrr,
        _ => EndpointMode::Vip,
    };
    ServiceDescriptor {
        name: service.spec.name,
        labels: service.spec.labels.unwrap_or_default(),
        replicas: service.spec.mode.replicated.map(|r| r.replicas).unwrap_or(0),
        endpoint_mode,
    }
}

/// Plain containers, grouped by compose service or alias.
#[derive(Debug, Clone)]
pub struct ContainerProvider {
    client: DockerClient,
    namespace: String,
}

impl ContainerProvider {
    pub fn new(client: DockerClient, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl Provider for ContainerProvider {
    fn name(&self) -> &'static str {
        "containers"
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceDescriptor>, ProviderError> {
        let path = with_filters("/containers/json", filter);
        let containers: Vec<ContainerSummary> = self.client.get_json(self.name(), &path).await?;
        Ok(group_containers(&self.namespace, containers))
    }
}

/// Swarm services.
#[derive(Debug, Clone)]
pub struct SwarmProvider {
    client: DockerClient,
}

impl SwarmProvider {
    pub fn new(client: DockerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for SwarmProvider {
    fn name(&self) -> &'static str {
        "swarm"
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceDescriptor>, ProviderError> {
        let path = with_filters("/services", filter);
        let services: Vec<SwarmService> = self.client.get_json(self.name(), &path).await?;
        Ok(services.into_iter().map(swarm_descriptor).collect())
    }
}
