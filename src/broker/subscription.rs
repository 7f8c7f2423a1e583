//! One-shot subscriptions.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::render::RenderedDocument;

/// A consumer waiting for a document whose hash differs from `known_hash`.
///
/// Owned by the broker loop once submitted. Delivery consumes it, so a
/// subscription can be delivered to at most once.
#[derive(Debug)]
pub struct Subscription {
    known_hash: String,
    deadline: Option<Instant>,
    delivery: oneshot::Sender<Arc<RenderedDocument>>,
}

impl Subscription {
    pub fn new(
        known_hash: impl Into<String>,
        deadline: Option<Instant>,
    ) -> (Self, oneshot::Receiver<Arc<RenderedDocument>>) {
        let (delivery, rx) = oneshot::channel();
        (
            Self {
                known_hash: known_hash.into(),
                deadline,
                delivery,
            },
            rx,
        )
    }

    pub fn known_hash(&self) -> &str {
        &self.known_hash
    }

    /// The consumer went away or its deadline passed.
    pub fn is_cancelled(&self) -> bool {
        self.delivery.is_closed() || self.deadline.is_some_and(|at| Instant::now() >= at)
    }

    /// Hand over the document and close the channel.
    ///
    /// Returns whether a value was actually sent. A cancelled subscription is
    /// closed without a value.
    pub fn deliver(self, document: &Arc<RenderedDocument>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.delivery.send(Arc::clone(document)).is_ok()
    }
}
