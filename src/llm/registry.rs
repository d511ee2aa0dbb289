use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, ModelEntry};
use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::llm::capabilities::ModelKind;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Resolved target of one model identifier.
#[derive(Clone)]
pub struct ModelRoute {
    pub kind: ModelKind,
    pub provider: Arc<dyn LlmProvider>,
    pub call: CallConfig,
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    models: HashMap<String, ModelEntry>,
    temperature: f64,
}

impl ProviderRegistry {
    pub fn new(temperature: f64) -> Self {
        Self {
            providers: HashMap::new(),
            models: HashMap::new(),
            temperature,
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn map_model(&mut self, model_id: impl Into<String>, entry: ModelEntry) {
        self.models.insert(model_id.into(), entry);
    }

    /// Provider and call parameters for a supported model identifier.
    pub fn resolve(&self, model_id: &str) -> DeskPilotResult<ModelRoute> {
        let kind = ModelKind::from_id(model_id)?;
        let entry = self.models.get(model_id).ok_or_else(|| {
            DeskPilotError::Config(format!("model '{model_id}' has no [models] entry"))
        })?;
        let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
            DeskPilotError::Config(format!(
                "model '{}' references unknown provider '{}'",
                model_id, entry.provider
            ))
        })?;
        tracing::debug!(
            model_id,
            provider = %entry.provider,
            model = %entry.model,
            "resolved model route"
        );
        Ok(ModelRoute {
            kind,
            provider,
            call: CallConfig {
                model: entry.model.clone(),
                temperature: self.temperature,
            },
        })
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `DESKPILOT_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::new(config.agent.temperature);
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("DESKPILOT_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            if api_key.is_empty() {
                tracing::debug!(provider = %id, "no API key configured");
            }
            registry.register(Arc::new(OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
            )));
        }
        for (model_id, entry) in &config.models {
            registry.map_model(model_id.clone(), entry.clone());
        }
        registry
    }
}
