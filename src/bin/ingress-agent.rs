//! Pull agent for HAProxy hosts that cannot see the container engine.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};

use label_ingress::agent::{self, AgentSettings};
use label_ingress::apply::{Applier, HaproxyProcess};
use label_ingress::lifecycle::Shutdown;
use label_ingress::observability::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "ingress-agent", version)]
#[command(about = "Applies configuration served by a label-ingress controller", long_about = None)]
struct Cli {
    /// Controller base URL
    #[arg(short, long, default_value = "http://localhost:6789")]
    manager: String,

    /// Live HAProxy configuration file
    #[arg(short = 'f', long, default_value = "/usr/local/etc/haproxy/haproxy.cfg")]
    config_path: PathBuf,

    /// Reload this running master instead of spawning HAProxy
    #[arg(long)]
    pid: Option<i32>,

    #[arg(long, default_value = "haproxy")]
    binary: PathBuf,

    /// Seconds to wait after a failed poll
    #[arg(long, default_value_t = 5)]
    retry_secs: u64,

    /// Upper bound for one long-poll request
    #[arg(long, default_value_t = 60)]
    request_timeout_secs: u64,

    #[arg(long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Pretty };
    init_logging(&cli.log_level, format);

    let process = match cli.pid {
        Some(pid) => HaproxyProcess::attached(&cli.binary, pid),
        None => HaproxyProcess::new(&cli.binary),
    };
    let applier = Applier::new(process, &cli.config_path);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.request_timeout_secs))
        .build()?;

    let shutdown = Shutdown::new();
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = terminate.recv() => tracing::info!("SIGTERM received, shutting down"),
            _ = interrupt.recv() => tracing::info!("SIGINT received, shutting down"),
        }
        trigger.trigger();
    });

    let settings = AgentSettings {
        manager: cli.manager,
        retry: Duration::from_secs(cli.retry_secs),
    };
    agent::run(client, settings, applier, shutdown.subscribe()).await?;
    Ok(())
}
