//! Feeds broker documents into an applier, one at a time.

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::apply::applier::{Applier, ApplyError};
use crate::apply::process::ManagedProcess;
use crate::broker::BrokerHandle;

/// Apply every new document until shutdown or the broker goes away.
///
/// Rejected documents are skipped and the next change is awaited. A fatal
/// error stops the process and is returned.
pub async fn drive<P: ManagedProcess>(
    mut applier: Applier<P>,
    broker: BrokerHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ApplyError> {
    info!(path = %applier.config_path().display(), "Applier started");

    // Hash of the last document received, applied or not.
    let mut seen = String::new();
    let result = loop {
        let delivery = match broker.subscribe(&seen, None).await {
            Ok(rx) => rx,
            Err(_) => break Ok(()),
        };

        let document = tokio::select! {
            _ = shutdown.recv() => break Ok(()),
            delivered = delivery => match delivered {
                Ok(document) => document,
                Err(_) => break Ok(()),
            },
        };
        seen = document.hash().to_string();

        match applier.apply(&document).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Applier cannot continue");
                break Err(e);
            }
            Err(e) => warn!(error = %e, "Keeping previous configuration"),
        }
    };

    applier.shutdown().await;
    info!("Applier stopped");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::applier::tests::FakeProcess;
    use crate::broker::{Broker, BrokerSettings};
    use crate::provider::{Provider, ServiceDescriptor, StaticProvider};
    use crate::render::ConfigTemplate;
    use crate::synth::Synthesizer;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drive_applies_changes_and_stops() {
        let labels: HashMap<String, String> =
            [("ingress.class".to_string(), "haproxy".to_string())].into_iter().collect();
        let provider = StaticProvider::new(vec![]);
        let template = ConfigTemplate::parse("t", "{% for n, b in backends|items %}{{ n }} {% endfor %}\n").unwrap();
        let (broker, handle) = Broker::new(
            Synthesizer::from_labels("ingress", &labels),
            vec![Arc::new(provider.clone()) as Arc<dyn Provider>],
            template,
            BrokerSettings {
                interval: Duration::from_secs(3600),
                ..Default::default()
            },
        )
        .unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(broker.run(shutdown_tx.subscribe()));

        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("haproxy.cfg");
        let process = FakeProcess::default();
        let driver = tokio::spawn(drive(
            Applier::new(process.clone(), &live),
            handle.clone(),
            shutdown_tx.subscribe(),
        ));

        provider.replace(vec![ServiceDescriptor::new("web")
            .with_label("ingress.class", "haproxy")
            .with_label("ingress.port", "80")]);
        handle.reconcile_now().await.unwrap();

        for _ in 0..100 {
            if std::fs::read_to_string(&live).map(|s| s == "web \n").unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(std::fs::read_to_string(&live).unwrap(), "web \n");

        shutdown_tx.send(()).unwrap();
        driver.await.unwrap().unwrap();
        assert_eq!(process.calls().last().map(String::as_str), Some("stop"));
    }
}
