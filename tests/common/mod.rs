//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use label_ingress::broker::{Broker, BrokerHandle, BrokerSettings};
use label_ingress::config::schema::ListenerConfig;
use label_ingress::http::{AppState, HttpServer};
use label_ingress::lifecycle::Shutdown;
use label_ingress::provider::{Provider, ServiceDescriptor, StaticProvider};
use label_ingress::render::ConfigTemplate;
use label_ingress::synth::Synthesizer;
use tokio::net::TcpListener;

pub const TEMPLATE: &str = "\
global
{{ global }}
{%- for name, text in frontends|items %}
frontend {{ name }}
{{ text }}
{%- endfor %}
{%- for name, be in backends|items %}
backend {{ name }}
  server-template {{ name }}- {{ be.replicas }} {{ name }}:{{ be.port }}
{%- endfor %}
";

pub fn controller_labels() -> HashMap<String, String> {
    [
        ("ingress.class", "haproxy"),
        ("ingress.global", "  spread-checks 15\n"),
        ("ingress.frontend.default", "  bind *:3000\n"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn service(name: &str, replicas: u64) -> ServiceDescriptor {
    ServiceDescriptor::new(name)
        .with_label("ingress.class", "haproxy")
        .with_label("ingress.port", "8080")
        .with_label("ingress.frontend.default", "  default_backend {{ Name }}")
        .with_replicas(replicas)
}

/// A controller serving HTTP on an ephemeral port.
#[allow(dead_code)]
pub struct TestController {
    pub addr: SocketAddr,
    pub url: String,
    pub broker: BrokerHandle,
    pub provider: StaticProvider,
    pub shutdown: Shutdown,
}

/// Start broker and HTTP server with a static provider.
pub async fn start_controller(
    services: Vec<ServiceDescriptor>,
    long_poll: Duration,
    persist_path: Option<PathBuf>,
) -> TestController {
    let provider = StaticProvider::new(services);
    let template = ConfigTemplate::parse("haproxy.cfg.template", TEMPLATE).unwrap();
    let (broker, handle) = Broker::new(
        Synthesizer::from_labels("ingress", &controller_labels()),
        vec![Arc::new(provider.clone()) as Arc<dyn Provider>],
        template,
        BrokerSettings {
            interval: Duration::from_secs(3600),
            provider_timeout: Duration::from_secs(2),
            queue_depth: 16,
        },
    )
    .unwrap();

    let shutdown = Shutdown::new();
    tokio::spawn(broker.run(shutdown.subscribe()));

    let state = AppState {
        broker: handle.clone(),
        long_poll,
        template_name: Arc::from("haproxy.cfg.template"),
        persist_path: persist_path.map(Arc::new),
    };
    let listener_config = ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        request_timeout_secs: 10,
        max_body_bytes: 64 * 1024,
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(state, &listener_config);
    let signalled = shutdown.signalled();
    tokio::spawn(async move {
        let _ = server.run(listener, signalled).await;
    });

    // Wait for the first pass.
    handle.status().await.unwrap();

    TestController {
        addr,
        url: format!("http://{}/", addr),
        broker: handle,
        provider,
        shutdown,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
