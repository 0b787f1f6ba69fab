use std::collections::HashMap;
use std::sync::Arc;

use super::claude::ClaudeProvider;
use super::local::LocalProvider;
use super::traits::AiProvider;
use super::types::ProviderError;
use crate::models::ProviderId;

/// Registry of provider adapters. The gateway resolves its configured
/// provider from here once at startup.
#[derive(Default)]
pub struct ProviderRouter {
    providers: HashMap<ProviderId, Arc<dyn AiProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Router holding the Claude and OpenAI-compatible adapters.
    pub fn with_builtin() -> Self {
        let mut router = Self::new();
        router.register(Arc::new(ClaudeProvider::new()));
        router.register(Arc::new(LocalProvider::new()));
        router
    }

    /// Later registrations for the same id replace earlier ones.
    pub fn register(&mut self, provider: Arc<dyn AiProvider>) {
        let id = provider.provider_id();
        if self.providers.insert(id, provider).is_some() {
            tracing::debug!(provider = id.as_str(), "replaced provider adapter");
        }
    }

    pub fn registered(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.providers.keys().copied().collect();
        ids.sort_by_key(|id| id.as_str());
        ids
    }

    pub fn resolve(&self, id: ProviderId) -> Result<Arc<dyn AiProvider>, ProviderError> {
        self.providers
            .get(&id)
            .cloned()
            .ok_or(ProviderError::UnknownProvider(id))
    }
}
