//! Request handlers for the long-poll API.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, HeaderName, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio::time::Instant;

use crate::broker::{BrokerHandle, BrokerStatus};
use crate::observability::metrics;
use crate::render::{ConfigTemplate, RenderedDocument};

/// Hash of the document a client already holds, and of the one returned.
pub const CONFIG_HASH: HeaderName = HeaderName::from_static("config-hash");

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub broker: BrokerHandle,
    /// How long `GET /` waits for a change.
    pub long_poll: Duration,
    /// Name given to templates received over HTTP.
    pub template_name: Arc<str>,
    /// Where accepted templates are written back, if anywhere.
    pub persist_path: Option<Arc<PathBuf>>,
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

fn document_response(document: &RenderedDocument, json: bool) -> Response {
    let (content_type, body) = match document.json() {
        Some(view) if json => ("application/json", view.to_vec()),
        _ => ("text/plain; charset=utf-8", document.bytes().to_vec()),
    };
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONFIG_HASH, document.hash().to_string()),
        ],
        body,
    )
        .into_response()
}

/// `GET /`: wait for a document newer than the caller's `Config-Hash`.
pub async fn get_config(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let known = headers
        .get(&CONFIG_HASH)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let deadline = Instant::now() + state.long_poll;

    match state.broker.next_document(&known, Some(deadline)).await {
        Ok(Some(document)) => {
            tracing::debug!(known = %known, hash = document.hash(), "Serving configuration");
            document_response(&document, wants_json(&headers))
        }
        Ok(None) => (StatusCode::NOT_MODIFIED, [(CONFIG_HASH, known)]).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// `PUT /` and `PATCH /`: replace the template.
pub async fn put_template(State(state): State<AppState>, body: String) -> Response {
    let template = match ConfigTemplate::parse(state.template_name.as_ref(), body) {
        Ok(template) => template,
        Err(e) => {
            metrics::record_template_swap("rejected");
            tracing::warn!(error = %e, "Rejected template upload");
            return (StatusCode::BAD_REQUEST, format!("{}\n", e)).into_response();
        }
    };

    if let Some(path) = &state.persist_path {
        if let Err(e) = tokio::fs::write(path.as_ref(), template.source()).await {
            tracing::error!(error = %e, path = %path.display(), "Failed to persist template");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("cannot persist template: {}\n", e),
            )
                .into_response();
        }
    }

    match state.broker.install_template(template).await {
        Ok(()) => {
            metrics::record_template_swap("accepted");
            tracing::info!("Template replaced over HTTP");
            (StatusCode::ACCEPTED, "template accepted\n").into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

#[derive(Serialize)]
struct StatusBody {
    version: &'static str,
    #[serde(flatten)]
    broker: BrokerStatus,
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Response {
    match state.broker.status().await {
        Ok(broker) => Json(StatusBody {
            version: env!("CARGO_PKG_VERSION"),
            broker,
        })
        .into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}
