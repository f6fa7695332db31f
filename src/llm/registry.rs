use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{LlmConfig, ProviderEntry};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::provider::ModelClient;
use crate::llm::providers::anthropic::AnthropicProvider;

/// Registry of model clients, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ModelClient>>,
    active: String,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn ModelClient>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> DeskPilotResult<Arc<dyn ModelClient>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            DeskPilotError::Config(format!(
                "Active provider '{}' not found in registry",
                self.active
            ))
        })
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Builds one client per configured provider.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut registry = Self::new(config.active_provider.clone());
        for (id, entry) in &config.providers {
            let api_key = resolve_api_key(id, entry, |name| std::env::var(name).ok());
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }
            registry.register(Arc::new(AnthropicProvider::new(id.clone(), entry, api_key)));
        }
        tracing::info!(
            active = %registry.active,
            providers = ?registry.list_names(),
            "provider registry built"
        );
        registry
    }
}

/// `DESKPILOT_<ID>_API_KEY`, then `ANTHROPIC_API_KEY`, then the key stored in config.toml.
pub fn resolve_api_key(
    id: &str,
    entry: &ProviderEntry,
    env: impl Fn(&str) -> Option<String>,
) -> String {
    env(&format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
        .or_else(|| env("ANTHROPIC_API_KEY"))
        .or_else(|| entry.api_key.clone())
        .unwrap_or_default()
}
