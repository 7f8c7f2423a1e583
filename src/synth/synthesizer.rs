//! Merge controller settings and services into a `ConfigModel`.

use std::collections::{HashMap, HashSet};

use crate::labels::{decode_namespace, BackendLabels, ControllerLabels};
use crate::provider::docker::INFRA_ROLES;
use crate::provider::ServiceDescriptor;
use crate::render::template::expand_snippet;
use crate::synth::model::{BackendConfig, ConfigModel};

/// Builds a fresh model per pass from fixed controller settings.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    namespace: String,
    controller: ControllerLabels,
}

impl Synthesizer {
    /// Decode the controller's labels once.
    ///
    /// A controller whose labels do not decode falls back to empty settings.
    pub fn from_labels(namespace: impl Into<String>, labels: &HashMap<String, String>) -> Self {
        let namespace = namespace.into();
        let controller = match decode_namespace(labels, &namespace) {
            None => {
                tracing::warn!(namespace = %namespace, "Controller has no ingress labels");
                ControllerLabels::default()
            }
            Some(section) => ControllerLabels::decode(&namespace, &section).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Ignoring controller labels");
                ControllerLabels::default()
            }),
        };

        tracing::info!(
            class = %controller.class,
            frontends = ?controller.frontends.keys().collect::<Vec<_>>(),
            "Controller settings decoded"
        );

        Self {
            namespace,
            controller,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ingress_class(&self) -> &str {
        &self.controller.class
    }

    pub fn controller(&self) -> &ControllerLabels {
        &self.controller
    }

    /// Build the model for one pass.
    pub fn synthesize(&self, services: &[ServiceDescriptor]) -> ConfigModel {
        let mut model = ConfigModel {
            ingress_class: self.controller.class.clone(),
            global: self.controller.global.clone(),
            defaults: self.controller.defaults.clone(),
            frontends: self
                .controller
                .frontends
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            backends: HashMap::new(),
        };

        let mut ordered: Vec<&ServiceDescriptor> = services.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let mut seen = HashSet::new();
        for service in ordered {
            if !seen.insert(service.name.as_str()) {
                tracing::warn!(service = %service.name, "Duplicate service name, keeping the first");
                continue;
            }
            if let Some(backend) = self.backend_for(service) {
                self.merge_snippets(&mut model, &service.name, &backend);
                tracing::debug!(
                    backend = %service.name,
                    port = %backend.port,
                    replicas = backend.replicas,
                    "Using backend"
                );
                model.backends.insert(service.name.clone(), backend);
            }
        }

        model
    }

    fn backend_for(&self, service: &ServiceDescriptor) -> Option<BackendConfig> {
        let role_key = format!("{}.role", self.namespace);
        if let Some(role) = service.labels.get(&role_key) {
            if INFRA_ROLES.contains(&role.as_str()) {
                tracing::debug!(service = %service.name, role = %role, "Skipping ingress service");
                return None;
            }
        }

        let section = decode_namespace(&service.labels, &self.namespace)?;
        let labels = match BackendLabels::decode(&self.namespace, &section) {
            Ok(labels) => labels,
            Err(e) => {
                tracing::warn!(service = %service.name, error = %e, "Skipping service");
                return None;
            }
        };

        Some(BackendConfig {
            port: labels.port,
            replicas: service.replicas,
            endpoint_mode: service.endpoint_mode,
            backend: labels.backend,
            frontend_snippets: labels.frontends,
        })
    }

    fn merge_snippets(&self, model: &mut ConfigModel, backend_name: &str, backend: &BackendConfig) {
        for (frontend, snippet) in &backend.frontend_snippets {
            let Some(text) = model.frontends.get_mut(frontend) else {
                tracing::warn!(
                    backend = %backend_name,
                    frontend = %frontend,
                    "Skipping snippet, frontend not declared by the controller"
                );
                continue;
            };
            match expand_snippet(snippet, backend_name) {
                Ok(expanded) => text.push_str(&expanded),
                Err(e) => {
                    tracing::warn!(
                        backend = %backend_name,
                        frontend = %frontend,
                        error = %e,
                        "Skipping snippet"
                    );
                }
            }
        }
    }
}
