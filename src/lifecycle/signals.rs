//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP triggers an immediate reconciliation pass, not shutdown

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::broker::BrokerHandle;
use crate::lifecycle::Shutdown;

/// Route process signals until shutdown.
pub async fn handle_signals(shutdown: Shutdown, broker: BrokerHandle) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut stopping = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stopping.recv() => return Ok(()),
            _ = terminate.recv() => {
                info!("SIGTERM received, shutting down");
                break;
            }
            _ = interrupt.recv() => {
                info!("SIGINT received, shutting down");
                break;
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, reconciling now");
                let broker = broker.clone();
                tokio::spawn(async move {
                    match broker.reconcile_now().await {
                        Ok(summary) => info!(hash = %summary.hash, changed = summary.changed, "Forced pass finished"),
                        Err(e) => warn!(error = %e, "Forced pass failed"),
                    }
                });
            }
        }
    }

    shutdown.trigger();
    Ok(())
}
