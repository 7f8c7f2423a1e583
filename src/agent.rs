//! Pull agent: long-polls a controller and applies what it serves.
//!
//! # Data Flow
//! ```text
//! GET <manager>/  (Config-Hash: last received)
//!     → 304: poll again
//!     → 200: RenderedDocument → Applier (validate → swap → start|reload)
//!     → error: wait retry interval, poll again
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::apply::{Applier, ApplyError, ManagedProcess};
use crate::http::CONFIG_HASH;
use crate::render::RenderedDocument;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("controller answered {0}")]
    Status(StatusCode),
}

/// Agent tuning.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Controller base URL.
    pub manager: String,
    /// Pause after a failed poll.
    pub retry: Duration,
}

/// Fetch the controller's document if it differs from `known_hash`.
///
/// `Ok(None)` is the controller's "not modified" answer.
pub async fn fetch_document(
    client: &reqwest::Client,
    manager: &str,
    known_hash: &str,
) -> Result<Option<RenderedDocument>, FetchError> {
    let response = client
        .get(manager)
        .header(CONFIG_HASH, known_hash)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    let announced = response
        .headers()
        .get(CONFIG_HASH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let document = RenderedDocument::from_bytes(response.bytes().await?.to_vec());
    if let Some(announced) = announced.filter(|h| h != document.hash()) {
        warn!(announced = %announced, computed = document.hash(), "Controller hash differs from content");
    }
    Ok(Some(document))
}

/// Poll and apply until shutdown. Returns the first fatal apply error.
pub async fn run<P: ManagedProcess>(
    client: reqwest::Client,
    settings: AgentSettings,
    mut applier: Applier<P>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ApplyError> {
    info!(manager = %settings.manager, path = %applier.config_path().display(), "Agent started");

    let mut seen = String::new();
    let result = loop {
        let fetched = tokio::select! {
            _ = shutdown.recv() => break Ok(()),
            fetched = fetch_document(&client, &settings.manager, &seen) => fetched,
        };

        match fetched {
            Ok(Some(document)) => {
                seen = document.hash().to_string();
                match applier.apply(&document).await {
                    Ok(outcome) => debug!(?outcome, hash = %seen, "Document handled"),
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Agent cannot continue");
                        break Err(e);
                    }
                    Err(e) => warn!(error = %e, "Keeping previous configuration"),
                }
            }
            Ok(None) => debug!("No change"),
            Err(e) => {
                warn!(error = %e, retry_secs = settings.retry.as_secs(), "Poll failed");
                tokio::select! {
                    _ = shutdown.recv() => break Ok(()),
                    _ = tokio::time::sleep(settings.retry) => {}
                }
            }
        }
    };

    applier.shutdown().await;
    info!("Agent stopped");
    result
}
