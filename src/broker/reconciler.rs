//! The reconciliation loop.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::broker::handle::{BrokerHandle, BrokerStatus, Command, PassAck, PassError, PassSummary};
use crate::broker::subscription::Subscription;
use crate::observability::metrics;
use crate::provider::{class_filter, Provider, ProviderError, ServiceDescriptor, ServiceFilter};
use crate::render::{render, ConfigTemplate, RenderError, RenderedDocument};
use crate::synth::{ConfigModel, Synthesizer};

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Time between periodic passes.
    pub interval: Duration,
    /// Upper bound for one provider query.
    pub provider_timeout: Duration,
    /// Capacity of the command channel.
    pub queue_depth: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            provider_timeout: Duration::from_secs(10),
            queue_depth: 64,
        }
    }
}

/// Everything a pass task needs, detached from the loop.
#[derive(Clone)]
struct PassInputs {
    synthesizer: Arc<Synthesizer>,
    providers: Arc<[Arc<dyn Provider>]>,
    filter: Arc<ServiceFilter>,
    timeout: Duration,
}

struct PassOutcome {
    started: Instant,
    result: Result<ConfigModel, ProviderError>,
}

/// Owner of the current document, the active template and the pending
/// subscriptions. Nothing else touches that state.
pub struct Broker {
    inputs: PassInputs,
    interval: Duration,
    template: ConfigTemplate,
    /// None until a pass has published.
    current: Option<Arc<RenderedDocument>>,
    pending: Vec<Subscription>,
    commands: mpsc::Receiver<Command>,
    outcomes_tx: mpsc::Sender<PassOutcome>,
    outcomes_rx: mpsc::Receiver<PassOutcome>,
    in_flight: bool,
    /// Acks waiting on the pass that is currently running.
    attached: Vec<PassAck>,
    /// Acks that arrived during a running pass and need a fresh one.
    queued: Vec<PassAck>,
}

impl Broker {
    /// Build the loop and its handle.
    ///
    /// The template must render the controller settings with no services.
    /// That render is only a check; nothing is published before the first
    /// successful pass.
    pub fn new(
        synthesizer: Synthesizer,
        providers: Vec<Arc<dyn Provider>>,
        template: ConfigTemplate,
        settings: BrokerSettings,
    ) -> Result<(Self, BrokerHandle), RenderError> {
        render(&template, &synthesizer.synthesize(&[]))?;
        let filter = class_filter(synthesizer.namespace(), synthesizer.ingress_class());

        let (tx, commands) = mpsc::channel(settings.queue_depth.max(1));
        let (outcomes_tx, outcomes_rx) = mpsc::channel(1);

        let broker = Self {
            inputs: PassInputs {
                synthesizer: Arc::new(synthesizer),
                providers: providers.into(),
                filter: Arc::new(filter),
                timeout: settings.provider_timeout,
            },
            interval: settings.interval,
            template,
            current: None,
            pending: Vec::new(),
            commands,
            outcomes_tx,
            outcomes_rx,
            in_flight: false,
            attached: Vec::new(),
            queued: Vec::new(),
        };
        Ok((broker, BrokerHandle::new(tx)))
    }

    /// Run until shutdown is signalled or every handle is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            providers = self.inputs.providers.len(),
            "Reconciliation broker started"
        );

        // First pass runs before any command is admitted.
        self.in_flight = true;
        let outcome = run_pass(self.inputs.clone()).await;
        self.finish_pass(outcome);

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Reconciliation broker shutting down");
                    break;
                }
                Some(outcome) = self.outcomes_rx.recv() => self.finish_pass(outcome),
                _ = ticker.tick() => self.start_pass(),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => {
                        info!("All broker handles dropped");
                        break;
                    }
                },
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Subscribe(subscription) => self.admit(subscription),
            Command::SwapTemplate(template) => {
                info!(template = template.name(), "Template replaced, applies from next pass");
                self.template = template;
            }
            Command::Reconcile(ack) => {
                self.queued.push(ack);
                self.start_pass();
            }
            Command::Status(reply) => {
                self.pending.retain(|s| !s.is_cancelled());
                let _ = reply.send(BrokerStatus {
                    hash: self.current_hash().to_string(),
                    pending_subscriptions: self.pending.len(),
                    template: self.template.name().to_string(),
                });
            }
        }
    }

    fn current_hash(&self) -> &str {
        self.current.as_ref().map_or("", |doc| doc.hash())
    }

    fn admit(&mut self, subscription: Subscription) {
        if subscription.is_cancelled() {
            return;
        }
        if let Some(current) = self.current.as_ref().filter(|doc| doc.hash() != subscription.known_hash()) {
            debug!(known = subscription.known_hash(), "Subscriber is stale, answering now");
            subscription.deliver(current);
            return;
        }
        self.pending.push(subscription);
        metrics::record_pending(self.pending.len());
    }

    fn start_pass(&mut self) {
        if self.in_flight {
            debug!("Pass already running");
            return;
        }
        self.in_flight = true;
        self.attached = mem::take(&mut self.queued);

        let inputs = self.inputs.clone();
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let outcome = run_pass(inputs).await;
            let _ = outcomes.send(outcome).await;
        });
    }

    fn finish_pass(&mut self, outcome: PassOutcome) {
        self.in_flight = false;

        let result = match outcome.result {
            Ok(model) => self.publish(&model),
            Err(e) => {
                warn!(error = %e, "Provider query failed, keeping current configuration");
                Err(PassError::Provider(e))
            }
        };

        metrics::record_pass(
            if result.is_ok() { "ok" } else { "error" },
            outcome.started.elapsed(),
        );
        for ack in mem::take(&mut self.attached) {
            let _ = ack.send(result.clone());
        }

        if !self.queued.is_empty() {
            self.start_pass();
        }
    }

    /// Render the model and, if the bytes changed, swap the current document
    /// and drain pending subscriptions.
    fn publish(&mut self, model: &ConfigModel) -> Result<PassSummary, PassError> {
        let document = render(&self.template, model).map_err(|e| {
            error!(error = %e, "Render failed, keeping current configuration");
            PassError::Render(e)
        })?;

        self.pending.retain(|s| !s.is_cancelled());

        if document.hash() == self.current_hash() {
            debug!(hash = document.hash(), "Configuration unchanged");
            metrics::record_pending(self.pending.len());
            return Ok(PassSummary {
                hash: document.hash().to_string(),
                changed: false,
                delivered: 0,
            });
        }

        info!(
            previous = self.current_hash(),
            hash = document.hash(),
            backends = model.backends.len(),
            "Configuration changed"
        );
        let current = Arc::new(document);
        self.current = Some(current.clone());

        let delivered = self
            .pending
            .drain(..)
            .map(|s| s.deliver(&current))
            .filter(|sent| *sent)
            .count();
        metrics::record_broadcast(delivered);
        metrics::record_pending(0);

        Ok(PassSummary {
            hash: current.hash().to_string(),
            changed: true,
            delivered,
        })
    }
}

/// Query every provider, then synthesize. Runs off the loop.
async fn run_pass(inputs: PassInputs) -> PassOutcome {
    let started = Instant::now();
    let result = collect(&inputs)
        .await
        .map(|services| inputs.synthesizer.synthesize(&services));
    PassOutcome { started, result }
}

async fn collect(inputs: &PassInputs) -> Result<Vec<ServiceDescriptor>, ProviderError> {
    let mut services = Vec::new();
    for provider in inputs.providers.iter() {
        let found = match time::timeout(inputs.timeout, provider.list_services(&inputs.filter)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProviderError::Timeout {
                    provider: provider.name(),
                    secs: inputs.timeout.as_secs(),
                })
            }
        };
        debug!(provider = provider.name(), services = found.len(), "Provider listed services");
        services.extend(found);
    }
    Ok(services)
}
