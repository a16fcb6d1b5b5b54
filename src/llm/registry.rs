use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, RoleEntry};
use crate::errors::{BotError, BotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// What a model call is used for. Each role may be bound to its own provider and model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Vision,
    Analysis,
    Comment,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Vision, Role::Analysis, Role::Comment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Vision => "vision",
            Role::Analysis => "analysis",
            Role::Comment => "comment",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
///
/// A provider without an API key is never registered, so every role that would
/// resolve to it reports the generative backend as unavailable.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig {
                active_provider: String::new(),
                providers: HashMap::new(),
                roles: Default::default(),
            },
        }
    }

    /// A registry with nothing registered; every role resolves to "unavailable".
    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> BotResult<Arc<dyn LlmProvider>> {
        self.providers.get(&self.active).cloned().ok_or_else(|| {
            BotError::Config(format!("Active provider '{}' not available", self.active))
        })
    }

    pub fn list_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn is_available(&self, role: Role) -> bool {
        self.call_config_for_role(role).is_ok()
    }

    fn role_entry(&self, role: Role) -> Option<&RoleEntry> {
        match role {
            Role::Vision => self.llm_config.roles.vision.as_ref(),
            Role::Analysis => self.llm_config.roles.analysis.as_ref(),
            Role::Comment => self.llm_config.roles.comment.as_ref(),
        }
    }

    /// Return the provider and call configuration for a role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, non-streaming
    pub fn call_config_for_role(&self, role: Role) -> BotResult<(Arc<dyn LlmProvider>, CallConfig)> {
        if let Some(entry) = self.role_entry(role) {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                BotError::Config(format!(
                    "Role '{}' references unavailable provider '{}'",
                    role, entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.7)
            });
            tracing::debug!(
                role = %role,
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                    max_tokens: entry.max_tokens,
                },
            ));
        }

        // Fallback: active provider, provider-level defaults
        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.7));
        tracing::debug!(
            role = %role,
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
                max_tokens: None,
            },
        ))
    }

    /// Build a registry from the loaded config.
    /// API keys are read from environment variables named `HINGEBOT_<ID>_API_KEY`
    /// (plus `OPENAI_API_KEY` for the `openai` id), then from config.toml.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::from_config_with(config, |key| std::env::var(key).ok())
    }

    fn from_config_with(config: &LlmConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.active_provider.clone(),
            llm_config: config.clone(),
        };
        for (id, entry) in &config.providers {
            let mut api_key = lookup(&format!("HINGEBOT_{}_API_KEY", id.to_uppercase()));
            if api_key.is_none() && id == "openai" {
                api_key = lookup("OPENAI_API_KEY");
            }
            let api_key = api_key
                .or_else(|| entry.api_key.clone())
                .filter(|k| !k.trim().is_empty());

            let Some(api_key) = api_key else {
                tracing::warn!(provider = %id, "no API key configured; provider disabled, fallbacks will be used");
                continue;
            };
            let provider = OpenAiCompatibleProvider::new(
                id.clone(),
                entry.api_base.clone(),
                api_key,
                Duration::from_secs(entry.timeout_secs),
            );
            registry.register(Arc::new(provider));
        }
        tracing::info!(providers = ?registry.list_names(), active = %registry.active, "LLM registry built");
        registry
    }
}
