use crate::error::{ApiError, ApiResult};
use aidev_ai::{LLMProvider, LlmError, ModelInfo, OpenRouterConfig, OpenRouterProvider};
use aidev_cache::{Clock, SystemClock, TtlCache};
use aidev_core::{AidevConfig, ConfigManager};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub type ModelsCache = TtlCache<Vec<ModelInfo>, Arc<dyn Clock>>;

/// Which credential a request ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    Client,
    Server,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AidevConfig>,
    /// Provider built from the server credential, if one is configured
    pub provider: Option<Arc<dyn LLMProvider>>,
    /// Model used when a request does not name one
    pub active_model: Arc<RwLock<String>>,
    pub models_cache: Arc<ModelsCache>,
}

impl AppState {
    pub fn new(config: Arc<ConfigManager>) -> aidev_core::Result<Self> {
        let config = config.config().clone();
        let provider: Option<Arc<dyn LLMProvider>> =
            match OpenRouterProvider::new(OpenRouterConfig::from_llm_config(&config.llm)) {
                Ok(provider) => Some(Arc::new(provider)),
                Err(LlmError::MissingCredential) => {
                    warn!("No server API key configured; requests must supply api_key");
                    None
                }
                Err(e) => {
                    return Err(aidev_core::AidevError::InvalidOperation(format!(
                        "failed to build LLM provider: {e}"
                    )))
                }
            };

        Ok(Self::with_parts(config, provider, Arc::new(SystemClock)))
    }

    /// Assemble state from explicit parts (used by tests to inject a provider
    /// and a manual clock).
    pub fn with_parts(
        config: AidevConfig,
        provider: Option<Arc<dyn LLMProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache.models_ttl_secs);
        let models_cache = ModelsCache::with_clock(ttl, clock)
            .with_validity(|models: &Vec<ModelInfo>| !models.is_empty());
        let active_model = config.llm.default_model.clone();

        Self {
            config: Arc::new(config),
            provider,
            active_model: Arc::new(RwLock::new(active_model)),
            models_cache: Arc::new(models_cache),
        }
    }

    pub fn active_model(&self) -> String {
        self.active_model.read().clone()
    }

    pub fn set_active_model(&self, model_id: &str) {
        *self.active_model.write() = model_id.to_string();
        info!(model = model_id, "Active model changed");
    }

    /// The provider for one request. A non-empty client key wins and gets a
    /// throwaway provider; otherwise the server provider is used.
    pub fn provider_for(&self, client_key: Option<&str>) -> ApiResult<(Arc<dyn LLMProvider>, KeySource)> {
        if let Some(key) = client_key.map(str::trim).filter(|k| !k.is_empty()) {
            let config = OpenRouterConfig::from_llm_config(&self.config.llm).with_api_key(key);
            let provider = OpenRouterProvider::new(config)?;
            return Ok((Arc::new(provider), KeySource::Client));
        }

        self.provider
            .clone()
            .map(|p| (p, KeySource::Server))
            .ok_or(ApiError::Llm(LlmError::MissingCredential))
    }

    /// Models visible with the server key, served from cache while fresh.
    pub async fn cached_models(&self, refresh: bool) -> ApiResult<Arc<Vec<ModelInfo>>> {
        let provider = self
            .provider
            .clone()
            .ok_or(ApiError::Llm(LlmError::MissingCredential))?;

        if refresh {
            self.models_cache.invalidate();
        }

        let models = self
            .models_cache
            .get_or_try_refresh(|| async move { provider.list_models().await })
            .await?;
        Ok(models)
    }

    /// Populate the models cache without blocking the caller.
    pub fn spawn_models_warmup(&self) -> Option<tokio::task::JoinHandle<()>> {
        self.provider.as_ref()?;
        let state = self.clone();
        Some(tokio::spawn(async move {
            match state.cached_models(false).await {
                Ok(models) => info!(count = models.len(), "Models cache warmed"),
                Err(e) => warn!(error = %e, "Models cache warmup failed"),
            }
        }))
    }
}
