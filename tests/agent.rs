//! Pull agent and applier tests against a live controller.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use label_ingress::agent::{self, fetch_document, AgentSettings};
use label_ingress::apply::{Applier, ApplyError, ApplyOutcome, HaproxyProcess, ManagedProcess, ProcessError};
use label_ingress::lifecycle::Shutdown;
use label_ingress::render::RenderedDocument;

mod common;

use common::{client, service, start_controller};

/// Accepts everything and records lifecycle calls.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManagedProcess for Recorder {
    async fn start(&mut self, _config: &Path) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push("start");
        Ok(())
    }

    async fn validate(&self, _config: &Path) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push("reload");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProcessError> {
        self.calls.lock().unwrap().push("stop");
        Ok(())
    }
}

async fn wait_for_file(path: &Path, expected: impl Fn(&str) -> bool) -> String {
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if expected(&text) {
                return text;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} never reached the expected content", path.display());
}

#[tokio::test]
async fn test_fetch_document_handles_not_modified() {
    let controller = start_controller(vec![service("app", 1)], Duration::from_millis(200), None).await;

    let first = fetch_document(&client(), &controller.url, "").await.unwrap().unwrap();
    assert_eq!(first.hash(), controller.broker.status().await.unwrap().hash);

    let second = fetch_document(&client(), &controller.url, first.hash()).await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_agent_applies_and_reloads() {
    let controller = start_controller(vec![service("app", 1)], Duration::from_millis(500), None).await;
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("haproxy.cfg");

    let recorder = Recorder::default();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(agent::run(
        client(),
        AgentSettings {
            manager: controller.url.clone(),
            retry: Duration::from_millis(100),
        },
        Applier::new(recorder.clone(), &live),
        shutdown.subscribe(),
    ));

    wait_for_file(&live, |t| t.contains("server-template app- 1")).await;

    controller.provider.replace(vec![service("app", 2)]);
    controller.broker.reconcile_now().await.unwrap();
    wait_for_file(&live, |t| t.contains("server-template app- 2")).await;

    shutdown.trigger();
    task.await.unwrap().unwrap();
    assert_eq!(recorder.calls(), vec!["start", "reload", "stop"]);
}

#[tokio::test]
async fn test_agent_retries_unreachable_controller() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Recorder::default();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(agent::run(
        client(),
        AgentSettings {
            manager: "http://127.0.0.1:1/".into(),
            retry: Duration::from_millis(50),
        },
        Applier::new(recorder.clone(), dir.path().join("haproxy.cfg")),
        shutdown.subscribe(),
    ));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.trigger();
    task.await.unwrap().unwrap();
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_haproxy_validation_failure_keeps_live_file() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("haproxy.cfg");
    std::fs::write(&live, "previous\n").unwrap();

    let mut applier = Applier::new(HaproxyProcess::new("false"), &live);
    let err = applier
        .apply(&RenderedDocument::from_bytes(b"broken\n".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, ApplyError::Validation { .. }));
    assert_eq!(std::fs::read_to_string(&live).unwrap(), "previous\n");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert!(applier.last_hash().is_none());
}

#[tokio::test]
async fn test_reload_of_exited_process_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let live = dir.path().join("haproxy.cfg");

    // `true` validates everything and exits right after being started.
    let mut applier = Applier::new(HaproxyProcess::new("true"), &live);
    let outcome = applier
        .apply(&RenderedDocument::from_bytes(b"one\n".to_vec()))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Started);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let err = applier
        .apply(&RenderedDocument::from_bytes(b"two\n".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::Reload(ProcessError::Exited { .. })));
    assert!(err.is_fatal());
}
