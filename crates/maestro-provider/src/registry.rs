use crate::provider::ModelProvider;
use maestro_core::{MaestroError, MaestroResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only lookup from provider name to adapter.
///
/// Providers register under their [`ModelProvider::name`]; the engine
/// resolves the provider named by a task's mode config at agent-execution
/// time.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous
    /// adapter with that name.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    /// Builder-style [`ProviderRegistry::register`].
    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Resolve a provider by name.
    pub fn get(&self, name: &str) -> MaestroResult<Arc<dyn ModelProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| MaestroError::Provider(format!("unknown provider: {name}")))
    }

    /// Names of all registered providers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
