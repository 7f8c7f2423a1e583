//! The configuration model rebuilt on every pass.

use std::collections::{BTreeMap, HashMap};

use crate::provider::EndpointMode;

/// Everything the config template can see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigModel {
    pub ingress_class: String,
    pub global: String,
    pub defaults: String,
    pub frontends: HashMap<String, String>,
    pub backends: HashMap<String, BackendConfig>,
}

/// One backend derived from one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub port: String,
    pub replicas: u64,
    pub endpoint_mode: EndpointMode,
    /// Free text for the backend section.
    pub backend: String,
    /// Raw snippets per frontend; merged into the model's frontends and
    /// never serialized.
    pub frontend_snippets: BTreeMap<String, String>,
}
