//! Client side of the broker: message passing into the loop.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::broker::subscription::Subscription;
use crate::provider::ProviderError;
use crate::render::{ConfigTemplate, RenderError, RenderedDocument, TemplateError};

/// Why a reconciliation pass did not produce a document.
#[derive(Debug, Clone, Error)]
pub enum PassError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors returned to broker clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The loop has shut down.
    #[error("reconciliation broker is not running")]
    Closed,

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Pass(#[from] PassError),
}

/// Result of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Hash of the current document after the pass.
    pub hash: String,
    pub changed: bool,
    /// Subscriptions that received the new document.
    pub delivered: usize,
}

/// Snapshot of the loop's state.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub hash: String,
    pub pending_subscriptions: usize,
    pub template: String,
}

pub(crate) type PassAck = oneshot::Sender<Result<PassSummary, PassError>>;

/// Messages accepted by the loop.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe(Subscription),
    SwapTemplate(ConfigTemplate),
    Reconcile(PassAck),
    Status(oneshot::Sender<BrokerStatus>),
}

/// Cloneable handle to a running broker.
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<Command>,
}

impl BrokerHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: Command) -> Result<(), BrokerError> {
        self.tx.send(command).await.map_err(|_| BrokerError::Closed)
    }

    /// Register a one-shot waiter.
    ///
    /// The receiver yields the current document right away when
    /// `known_hash` is stale, otherwise the next changed document. It is
    /// closed without a value when the subscription is cancelled.
    pub async fn subscribe(
        &self,
        known_hash: &str,
        deadline: Option<Instant>,
    ) -> Result<oneshot::Receiver<Arc<RenderedDocument>>, BrokerError> {
        let (subscription, rx) = Subscription::new(known_hash, deadline);
        self.send(Command::Subscribe(subscription)).await?;
        Ok(rx)
    }

    /// Wait for a document newer than `known_hash`.
    ///
    /// `Ok(None)` means the deadline passed (or the loop went away while
    /// waiting) without a new document.
    pub async fn next_document(
        &self,
        known_hash: &str,
        deadline: Option<Instant>,
    ) -> Result<Option<Arc<RenderedDocument>>, BrokerError> {
        let rx = self.subscribe(known_hash, deadline).await?;
        let received = match deadline {
            Some(at) => time::timeout_at(at, rx).await.ok().and_then(Result::ok),
            None => rx.await.ok(),
        };
        Ok(received)
    }

    /// Install an already parsed template for future passes.
    pub async fn install_template(&self, template: ConfigTemplate) -> Result<(), BrokerError> {
        self.send(Command::SwapTemplate(template)).await
    }

    /// Parse template text and install it.
    ///
    /// Parse errors are returned here and never reach the loop.
    pub async fn swap_template(&self, name: &str, source: &str) -> Result<(), BrokerError> {
        let template = ConfigTemplate::parse(name, source)?;
        self.install_template(template).await
    }

    /// Run a pass now and wait for its result.
    pub async fn reconcile_now(&self) -> Result<PassSummary, BrokerError> {
        let (ack, rx) = oneshot::channel();
        self.send(Command::Reconcile(ack)).await?;
        let result = rx.await.map_err(|_| BrokerError::Closed)?;
        Ok(result?)
    }

    pub async fn status(&self) -> Result<BrokerStatus, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status(reply)).await?;
        rx.await.map_err(|_| BrokerError::Closed)
    }
}
