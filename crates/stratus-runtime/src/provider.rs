//! Provider capability contract.
//!
//! Every cloud provider participates in reconciliation through
//! [`ProviderCapability`]. The engine never inspects provider identity itself:
//! it asks the [`ProviderRegistry`] for the implementation keyed by the
//! provider name carried in the resolved credentials.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use stratus_core::{CloudCredentials, Resource, ResourceFilter, ResourceType};

use crate::error::ProviderError;

#[async_trait]
pub trait ProviderCapability: Send + Sync {
    /// Registry key, lowercase (e.g. "gcp").
    fn name(&self) -> &str;

    /// Resource kinds this provider can list. The sync engine fans out one
    /// listing task per entry.
    fn supported_types(&self) -> Vec<ResourceType>;

    /// List live resources matching `filter`.
    ///
    /// Kinds the provider does not support yield no entries and no error.
    /// Returned resources carry a normalized `resource_type` and a stable `uid`.
    async fn list_resources(
        &self,
        credentials: &CloudCredentials,
        filter: &ResourceFilter,
    ) -> Result<Vec<Resource>, ProviderError>;

    /// Start a stopped resource.
    async fn start_resource(
        &self,
        credentials: &CloudCredentials,
        resource: &Resource,
    ) -> Result<(), ProviderError>;

    /// Stop a running resource.
    async fn stop_resource(
        &self,
        credentials: &CloudCredentials,
        resource: &Resource,
    ) -> Result<(), ProviderError>;
}

/// Provider implementations keyed by provider name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ProviderCapability>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous entry.
    pub fn with_provider(mut self, provider: Arc<dyn ProviderCapability>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn ProviderCapability>) {
        let key = provider.name().to_ascii_lowercase();
        if self.providers.insert(key.clone(), provider).is_some() {
            tracing::warn!(provider = %key, "Replaced previously registered provider");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderCapability>> {
        self.providers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
