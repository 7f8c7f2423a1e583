//! label-ingress controller.
//!
//! # Architecture Overview
//!
//! ```text
//!   Docker Engine ──┐
//!   (containers,    │   ┌──────────────────────── BROKER LOOP ─────────────────────┐
//!    swarm)         ├──▶│ pass task: providers → Synthesizer → ConfigModel          │
//!   static list ────┘   │ render(template) → hash → changed? → deliver to waiters   │
//!                       └───────▲───────────────────────┬───────────────────────────┘
//!                               │ commands              │ one-shot documents
//!        ┌──────────────────────┴──────┐       ┌────────▼─────────┐
//!        │ http: GET / long-poll       │       │ apply driver     │
//!        │       PUT|PATCH / template  │       │ validate → swap  │
//!        │       GET /status           │       │ start | SIGUSR2  │
//!        └─────────────────────────────┘       └──────────────────┘
//! ```
//!
//! Startup order: config → logging → metrics → template → controller labels
//! → providers → broker → template watcher → applier → signals → HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use label_ingress::apply::{drive, Applier, HaproxyProcess};
use label_ingress::broker::Broker;
use label_ingress::config::validation::validate_config;
use label_ingress::config::{forward_templates, load_config, Config, ConfigError, TemplateWatcher};
use label_ingress::http::{AppState, HttpServer};
use label_ingress::lifecycle::startup::{build_providers, controller_labels, docker_client};
use label_ingress::lifecycle::{handle_signals, Shutdown};
use label_ingress::observability::{init_logging, init_metrics};
use label_ingress::render::ConfigTemplate;
use label_ingress::synth::Synthesizer;

#[derive(Parser)]
#[command(name = "label-ingress", version)]
#[command(about = "Renders HAProxy configuration from container labels", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template file
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Seconds between reconciliation passes
    #[arg(short, long)]
    interval: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,

    /// Use built-in controller labels and static services instead of Docker
    #[arg(long)]
    mock: bool,

    /// Port for the HTTP API
    #[arg(short, long)]
    port: Option<u16>,

    /// Spawn and reload HAProxy from this process
    #[arg(long)]
    manage: bool,
}

impl Cli {
    /// Flags win over the file.
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.template {
            config.template.path = path.clone();
        }
        if let Some(secs) = self.interval {
            config.reconcile.interval_secs = secs;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.mock {
            config.controller.mock = true;
        }
        if self.manage {
            config.haproxy.manage = true;
        }
        if let Some(port) = self.port {
            config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
                Ok(mut addr) => {
                    addr.set_port(port);
                    addr.to_string()
                }
                Err(_) => format!("0.0.0.0:{}", port),
            };
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "label-ingress starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let template = ConfigTemplate::load(&config.template.path)?;
    tracing::info!(template = template.name(), path = %config.template.path.display(), "Template loaded");

    let docker = docker_client(&config);
    let labels = controller_labels(&config, docker.as_ref()).await?;
    let synthesizer = Synthesizer::from_labels(config.reconcile.namespace.clone(), &labels);
    let providers = build_providers(&config, docker.as_ref()).await?;

    let shutdown = Shutdown::new();
    let (broker, handle) = Broker::new(
        synthesizer,
        providers,
        template.clone(),
        config.reconcile.broker_settings(),
    )?;
    let broker_task = tokio::spawn(broker.run(shutdown.subscribe()));

    // Dropping the watcher stops it.
    let _watcher = if config.template.watch {
        let (watcher, updates) = TemplateWatcher::new(&config.template.path);
        let watcher = watcher.run()?;
        tokio::spawn(forward_templates(updates, handle.clone(), shutdown.subscribe()));
        Some(watcher)
    } else {
        None
    };

    let driver_task = if config.haproxy.manage {
        let process = HaproxyProcess::new(&config.haproxy.binary)
            .with_extra_args(config.haproxy.extra_args.clone())
            .with_stop_timeout(config.haproxy.stop_timeout());
        let applier = Applier::new(process, &config.haproxy.config_path);
        let stop_all = shutdown.clone();
        let stopped = shutdown.subscribe();
        let handle = handle.clone();
        Some(tokio::spawn(async move {
            let result = drive(applier, handle, stopped).await;
            if result.is_err() {
                stop_all.trigger();
            }
            result
        }))
    } else {
        None
    };

    let signals = tokio::spawn(handle_signals(shutdown.clone(), handle.clone()));

    let state = AppState {
        broker: handle,
        long_poll: config.reconcile.long_poll(),
        template_name: Arc::from(template.name()),
        persist_path: config
            .template
            .persist_updates
            .then(|| Arc::new(config.template.path.clone())),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let served = HttpServer::new(state, &config.listener)
        .run(listener, shutdown.signalled())
        .await;

    // Ordered shutdown: HTTP drained, then broker, then the load balancer.
    shutdown.trigger();
    let _ = broker_task.await;
    let driver_result = match driver_task {
        Some(task) => task.await?,
        None => Ok(()),
    };
    match signals.await? {
        Ok(()) => {}
        Err(e) => tracing::warn!(error = %e, "Signal handling failed"),
    }

    served?;
    driver_result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
