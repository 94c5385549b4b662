//! Provider registry: builds adapters from config and resolves the
//! provider used for executor and planner calls.

use std::collections::HashMap;
use std::sync::Arc;

use tg_domain::config::LlmConfig;
use tg_domain::error::{Error, Result};

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    default_id: Option<String>,
    planner_model: Option<String>,
}

impl ProviderRegistry {
    /// Instantiate every configured provider. Providers whose API key is
    /// missing are skipped with a warning rather than failing startup.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut default_id = None;

        for pc in &cfg.providers {
            let built: Result<Arc<dyn LlmProvider>> = match pc.kind.as_str() {
                "openai_compat" => {
                    OpenAiCompatProvider::from_config(pc).map(|p| Arc::new(p) as _)
                }
                "anthropic" => AnthropicProvider::from_config(pc).map(|p| Arc::new(p) as _),
                other => Err(Error::Config(format!(
                    "unknown provider kind '{other}' for '{}'",
                    pc.id
                ))),
            };
            match built {
                Ok(provider) => {
                    if default_id.is_none() {
                        default_id = Some(pc.id.clone());
                    }
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    tracing::warn!(provider = %pc.id, error = %e, "skipping provider");
                }
            }
        }

        Ok(Self {
            providers,
            default_id,
            planner_model: cfg.planner_model.clone(),
        })
    }

    /// Wrap a single pre-built provider. Used by embedders and tests that
    /// bring their own adapter.
    pub fn with_provider(provider: Arc<dyn LlmProvider>) -> Self {
        let id = provider.provider_id().to_owned();
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert(id.clone(), provider);
        Self {
            providers,
            default_id: Some(id),
            planner_model: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// The provider used for executor turns.
    pub fn default_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let id = self
            .default_id
            .as_ref()
            .ok_or_else(|| Error::Config("no LLM providers configured".into()))?;
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("default provider '{id}' missing")))
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(id).cloned()
    }

    /// Model override for the focus planner, when configured.
    pub fn planner_model(&self) -> Option<&str> {
        self.planner_model.as_deref()
    }
}
