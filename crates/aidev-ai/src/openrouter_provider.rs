use crate::error::LlmError;
use crate::llm_provider::*;
use crate::models::{ModelInfo, ModelsResponse};
use aidev_core::LlmConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Configuration for the OpenRouter provider (any OpenAI-style chat API works)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Base URL for the API (e.g., "https://openrouter.ai/api/v1")
    pub base_url: String,
    /// Bearer credential
    #[serde(default, skip_serializing)]
    pub api_key: String,
    /// Default model (provider/model-name)
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: f32,
    /// Ceiling for a completion exchange, in seconds
    pub timeout_secs: u64,
    /// Ceiling for the models listing, in seconds
    pub models_timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self::from_llm_config(&LlmConfig::default())
    }
}

impl OpenRouterConfig {
    /// Build from the service configuration. The key may be empty here;
    /// [`OpenRouterProvider::new`] rejects it.
    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key().unwrap_or_default().to_string(),
            model: config.default_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            models_timeout_secs: config.models_timeout_secs,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// OpenRouter chat-completion provider.
///
/// Every failure is returned to the caller as is; there is no retry loop.
pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterProvider {
    /// Create a new provider. Fails with [`LlmError::MissingCredential`] when
    /// the key is empty.
    pub fn new(config: OpenRouterConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::MissingCredential);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    /// Probe the models endpoint with the configured key and report how many
    /// models it can see.
    pub async fn check_connectivity(&self) -> Result<usize, LlmError> {
        let models = self.list_models().await?;
        info!(count = models.len(), "OpenRouter connectivity check succeeded");
        Ok(models.len())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    /// Send a request and decode the JSON body, keeping the three failure
    /// kinds apart: transport, non-2xx status, undecodable body.
    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, LlmError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.to_string(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn try_chat_completions_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatCompletionsResponse, LlmError> {
        let request = ChatCompletionsRequest {
            model: config
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.config.model.clone()),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: Some(m.content.clone()),
                })
                .collect(),
            max_tokens: Some(config.max_tokens.unwrap_or(self.config.max_tokens)),
            temperature: Some(config.temperature.unwrap_or(self.config.temperature)),
        };

        debug!(model = %request.model, messages = request.messages.len(), "sending chat completion");

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(&request);

        self.send_json(builder).await
    }
}

#[async_trait]
impl LLMProvider for OpenRouterProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let response = self.try_chat_completions_request(messages, config).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            total_tokens: response.usage.as_ref().and_then(|u| u.total_tokens),
            prompt_tokens: response.usage.as_ref().and_then(|u| u.prompt_tokens),
            completion_tokens: response.usage.as_ref().and_then(|u| u.completion_tokens),
            finish_reason: choice.finish_reason,
            model: response.model.unwrap_or_else(|| {
                config
                    .model
                    .clone()
                    .unwrap_or_else(|| self.config.model.clone())
            }),
        })
    }

    async fn list_models(&self) -> LLMResult<Vec<ModelInfo>> {
        let builder = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .timeout(Duration::from_secs(self.config.models_timeout_secs));

        let response: ModelsResponse = self.send_json(builder).await?;
        debug!(count = response.data.len(), "fetched models list");
        Ok(response.data)
    }

    fn provider_name(&self) -> &str {
        "openrouter"
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// API request/response types for the Chat Completions API

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deadline::{bounded, Stage};
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> OpenRouterProvider {
        let config = OpenRouterConfig {
            base_url,
            ..OpenRouterConfig::default()
        }
        .with_api_key("sk-or-test");
        OpenRouterProvider::new(config).unwrap()
    }

    #[test]
    fn test_missing_credential_is_rejected() {
        let result = OpenRouterProvider::new(OpenRouterConfig::default().with_api_key("  "));
        assert!(matches!(result, Err(LlmError::MissingCredential)));
    }

    #[test]
    fn test_config_from_llm_config() {
        let llm = LlmConfig {
            base_url: "https://openrouter.ai/api/v1/".to_string(),
            api_key: Some("k".to_string()),
            ..LlmConfig::default()
        };
        let config = OpenRouterConfig::from_llm_config(&llm);
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.api_key, "k");
        assert_eq!(config.max_tokens, 1000);
    }

    #[tokio::test]
    async fn test_chat_completion_sends_bearer_and_model() {
        let router = Router::new().route(
            "/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "id": "gen-1",
                    "model": body["model"],
                    "choices": [{
                        "message": {"role": "assistant", "content": format!("{}|{}", auth, body["messages"][0]["role"])},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
                }))
            }),
        );
        let base = spawn_stub(router).await;
        let provider = provider(base);

        let response = provider
            .generate_chat(
                &[Message::system("sys"), Message::user("hi")],
                &GenerationConfig::for_model("anthropic/claude-3-haiku"),
            )
            .await
            .unwrap();

        assert_eq!(response.content, "Bearer sk-or-test|\"system\"");
        assert_eq!(response.model, "anthropic/claude-3-haiku");
        assert_eq!(response.total_tokens, Some(7));
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_non_success_status_keeps_status_and_body() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "{\"error\":\"bad key\"}") }),
        );
        let provider = provider(spawn_stub(router).await);

        let err = provider.generate("hello").await.unwrap_err();
        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status, "401 Unauthorized");
                assert_eq!(body, "{\"error\":\"bad key\"}");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let router = Router::new().route("/chat/completions", post(|| async { "not json" }));
        let provider = provider(spawn_stub(router).await);

        let err = provider.generate("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_partial_usage_is_accepted() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": "ok"}}],
                    "usage": {"total_tokens": 5, "prompt_tokens": null}
                }))
            }),
        );
        let provider = provider(spawn_stub(router).await);

        let response = provider.generate("hello").await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.total_tokens, Some(5));
        assert_eq!(response.prompt_tokens, None);
        assert_eq!(response.completion_tokens, None);
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_response() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { Json(json!({"id": "x", "choices": []})) }),
        );
        let provider = provider(spawn_stub(router).await);

        let err = provider.generate("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = provider(format!("http://{}", addr));
        let err = provider.generate("hello").await.unwrap_err();
        assert!(matches!(err, LlmError::Transport(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_list_models() {
        let router = Router::new().route(
            "/models",
            get(|| async {
                Json(json!({"data": [
                    {"id": "openai/gpt-4o", "name": "GPT-4o"},
                    {"id": "meta-llama/llama-3-8b-instruct"}
                ]}))
            }),
        );
        let provider = provider(spawn_stub(router).await);

        let models = provider.list_models().await.unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["openai/gpt-4o", "meta-llama/llama-3-8b-instruct"]);
        assert_eq!(provider.check_connectivity().await.unwrap(), 2);
        assert!(provider.is_available().await);
    }

    #[tokio::test]
    async fn test_bounded_wait_abandons_slow_request() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"choices": []}))
            }),
        );
        let provider = provider(spawn_stub(router).await);

        let started = std::time::Instant::now();
        let result: Result<LLMResponse, LlmError> = bounded(
            Stage::Execute,
            Duration::from_millis(100),
            provider.generate("slow"),
        )
        .await;

        assert!(matches!(result, Err(LlmError::Timeout { stage: Stage::Execute, .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
