//! In-memory provider for mock mode and tests.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::provider::{labels_match, Provider, ProviderError, ServiceDescriptor, ServiceFilter};

/// A provider serving a fixed list that can be swapped atomically.
///
/// Clones share the same list, so a test can keep a handle and replace the
/// services between passes.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    services: Arc<ArcSwap<Vec<ServiceDescriptor>>>,
}

impl StaticProvider {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            services: Arc::new(ArcSwap::from_pointee(services)),
        }
    }

    /// Replace the served list.
    pub fn replace(&self, services: Vec<ServiceDescriptor>) {
        self.services.store(Arc::new(services));
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn list_services(
        &self,
        filter: &ServiceFilter,
    ) -> Result<Vec<ServiceDescriptor>, ProviderError> {
        let services = self.services.load();
        Ok(services
            .iter()
            .filter(|s| labels_match(filter, &s.labels))
            .cloned()
            .collect())
    }
}
