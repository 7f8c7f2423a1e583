//! Rendered configuration documents.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::provider::EndpointMode;
use crate::render::template::{ConfigTemplate, RenderError};
use crate::synth::ConfigModel;

/// Hex length of a content hash (128 bits).
pub const HASH_HEX_LEN: usize = 32;

/// Fingerprint of a document: the first 128 bits of its SHA-256.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..HASH_HEX_LEN / 2])
}

/// An immutable, hashed configuration document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    bytes: Vec<u8>,
    hash: String,
    json: Option<Vec<u8>>,
}

impl RenderedDocument {
    /// Wrap bytes produced elsewhere (e.g. fetched from a controller).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let hash = content_hash(&bytes);
        Self {
            bytes,
            hash,
            json: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// JSON view of the model the document was rendered from.
    pub fn json(&self) -> Option<&[u8]> {
        self.json.as_deref()
    }
}

/// Render a model and fingerprint the output.
pub fn render(template: &ConfigTemplate, model: &ConfigModel) -> Result<RenderedDocument, RenderError> {
    let text = template.render(TemplateContext::from(model))?;
    let json = serde_json::to_vec(&JsonView::from(model)).map_err(|e| RenderError {
        name: template.name().to_string(),
        message: format!("cannot serialize model: {}", e),
    })?;

    let bytes = text.into_bytes();
    Ok(RenderedDocument {
        hash: content_hash(&bytes),
        bytes,
        json: Some(json),
    })
}

// Maps are BTreeMaps so templates iterate in key order.
#[derive(Serialize)]
struct TemplateContext<'a> {
    ingress_class: &'a str,
    global: &'a str,
    defaults: &'a str,
    frontends: BTreeMap<&'a str, &'a str>,
    backends: BTreeMap<&'a str, BackendContext<'a>>,
}

#[derive(Serialize)]
struct BackendContext<'a> {
    name: &'a str,
    port: &'a str,
    replicas: u64,
    endpoint_mode: EndpointMode,
    backend: &'a str,
}

impl<'a> From<&'a ConfigModel> for TemplateContext<'a> {
    fn from(model: &'a ConfigModel) -> Self {
        Self {
            ingress_class: &model.ingress_class,
            global: &model.global,
            defaults: &model.defaults,
            frontends: model
                .frontends
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            backends: model
                .backends
                .iter()
                .map(|(name, b)| {
                    (
                        name.as_str(),
                        BackendContext {
                            name,
                            port: &b.port,
                            replicas: b.replicas,
                            endpoint_mode: b.endpoint_mode,
                            backend: &b.backend,
                        },
                    )
                })
                .collect(),
        }
    }
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

#[derive(Serialize)]
struct JsonView<'a> {
    #[serde(skip_serializing_if = "is_blank")]
    global: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    defaults: &'a str,
    #[serde(rename = "frontend", skip_serializing_if = "BTreeMap::is_empty")]
    frontends: BTreeMap<&'a str, &'a str>,
    #[serde(rename = "backend", skip_serializing_if = "BTreeMap::is_empty")]
    backends: BTreeMap<&'a str, JsonBackend<'a>>,
}

#[derive(Serialize)]
struct JsonBackend<'a> {
    endpoint_mode: EndpointMode,
    #[serde(skip_serializing_if = "is_blank")]
    port: &'a str,
    #[serde(skip_serializing_if = "is_zero")]
    replicas: u64,
    #[serde(skip_serializing_if = "is_blank")]
    backend: &'a str,
}

impl<'a> From<&'a ConfigModel> for JsonView<'a> {
    fn from(model: &'a ConfigModel) -> Self {
        Self {
            global: &model.global,
            defaults: &model.defaults,
            frontends: model
                .frontends
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            backends: model
                .backends
                .iter()
                .map(|(name, b)| {
                    (
                        name.as_str(),
                        JsonBackend {
                            endpoint_mode: b.endpoint_mode,
                            port: &b.port,
                            replicas: b.replicas,
                            backend: &b.backend,
                        },
                    )
                })
                .collect(),
        }
    }
}
