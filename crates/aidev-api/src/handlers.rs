use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, KeySource};
use aidev_ai::{
    bounded, GenerationConfig, IntentProcessor, ModelInfo, PromptComposer, SectionMap, Stage,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub intent: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentResponse {
    pub intent: String,
    #[serde(rename = "generatedCode")]
    pub generated_code: String,
    pub ast: Value,
    pub semantics: Value,
}

impl IntentResponse {
    /// Shape a section map for the client. JSON sections are embedded as
    /// parsed values, anything else as the raw string.
    pub fn from_sections(intent: &str, sections: &SectionMap) -> Self {
        let embed = |key: &str, default: Value| match sections.get(key) {
            Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())),
            None => default,
        };

        Self {
            intent: intent.to_string(),
            generated_code: sections
                .get("code")
                .cloned()
                .unwrap_or_else(|| "// No code was generated".to_string()),
            ast: embed("ast", json!({"type": "Program", "body": []})),
            semantics: embed("semantics", json!({"entities": [], "relations": []})),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelsQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelsRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[instrument(skip_all, fields(model = tracing::field::Empty))]
pub async fn process_intent(
    State(state): State<AppState>,
    payload: Result<Json<IntentRequest>, JsonRejection>,
) -> ApiResult<Json<IntentResponse>> {
    let Json(req) = payload?;
    if req.intent.trim().is_empty() {
        return Err(ApiError::BadRequest("Intent is required".to_string()));
    }

    let (provider, key_source) = state.provider_for(req.api_key.as_deref())?;
    let model = req
        .model_id
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.active_model());
    tracing::Span::current().record("model", model.as_str());
    info!(intent = %req.intent, ?key_source, "Processing intent");

    let processor = IntentProcessor::new(PromptComposer::new(&state.config.codegen.language))
        .with_provider(provider)
        .with_generation_config(GenerationConfig::for_model(model));

    let server = &state.config.server;
    let parsed = bounded(
        Stage::Parse,
        Duration::from_secs(server.parse_timeout_secs),
        processor.parse(&req.intent),
    )
    .await?;
    info!(kind = ?parsed.kind, target = ?parsed.target, "Intent parsed");

    let outcome = bounded(
        Stage::Execute,
        Duration::from_secs(server.execute_timeout_secs),
        processor.execute(&parsed),
    )
    .await?;

    Ok(Json(IntentResponse::from_sections(
        &req.intent,
        &outcome.to_section_map(),
    )))
}

pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> ApiResult<Json<ModelsResponse>> {
    let models = state.cached_models(query.refresh).await?;
    Ok(Json(ModelsResponse {
        data: models.to_vec(),
    }))
}

/// Fetch the list with a client-supplied key; never touches the cache.
pub async fn list_models_with_key(
    State(state): State<AppState>,
    payload: Result<Json<ModelsRequest>, JsonRejection>,
) -> ApiResult<Json<ModelsResponse>> {
    let Json(req) = payload?;
    let (provider, key_source) = state.provider_for(req.api_key.as_deref())?;

    let models = match key_source {
        KeySource::Client => provider.list_models().await?,
        KeySource::Server => state.cached_models(false).await?.to_vec(),
    };
    Ok(Json(ModelsResponse { data: models }))
}

pub async fn select_model(
    State(state): State<AppState>,
    payload: Result<Json<SelectModelRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(req) = payload?;
    let model_id = req.model_id.trim();
    if model_id.is_empty() {
        return Err(ApiError::BadRequest("Model ID is required".to_string()));
    }

    if req.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        info!(model = model_id, "Model selected with client-provided key");
        return Ok(Json(json!({
            "success": true,
            "model_id": model_id,
            "key_source": KeySource::Client,
            "message": "Using client-provided API key",
        }))
        .into_response());
    }

    if state.provider.is_none() {
        let body = json!({
            "success": false,
            "error": "LLM client not initialized. Please check your API key.",
            "message": "Model selection will only work locally.",
        });
        return Ok((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response());
    }

    state.set_active_model(model_id);
    Ok(Json(json!({
        "success": true,
        "model_id": model_id,
        "key_source": KeySource::Server,
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_embeds_json_sections() {
        let mut sections = SectionMap::new();
        sections.insert("code".into(), "func Login() {}".into());
        sections.insert("ast".into(), "{\"type\":\"FuncDecl\"}".into());
        sections.insert("semantics".into(), "not json".into());

        let response = IntentResponse::from_sections("create a login function", &sections);
        assert_eq!(response.generated_code, "func Login() {}");
        assert_eq!(response.ast["type"], "FuncDecl");
        assert_eq!(response.semantics, Value::String("not json".into()));
    }

    #[test]
    fn test_response_defaults_for_absent_sections() {
        let response = IntentResponse::from_sections("x", &SectionMap::new());
        assert_eq!(response.generated_code, "// No code was generated");
        assert_eq!(response.ast, json!({"type": "Program", "body": []}));
        assert_eq!(response.semantics, json!({"entities": [], "relations": []}));

        let body = serde_json::to_value(&response).unwrap();
        assert!(body.get("generatedCode").is_some());
    }
}
