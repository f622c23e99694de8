use crate::error::{IntentError, LlmError};
use crate::llm_provider::{GenerationConfig, LLMProvider};
use crate::normalize::SectionMap;
use crate::prompt::PromptComposer;
use crate::sections::{extract_sections, Sections};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentKind {
    Create,
    Modify,
    Delete,
    Query,
}

impl IntentKind {
    pub const ALL: [IntentKind; 4] = [
        IntentKind::Create,
        IntentKind::Modify,
        IntentKind::Delete,
        IntentKind::Query,
    ];

    /// Lowercase verb used in user-facing messages.
    pub fn verb(self) -> &'static str {
        match self {
            IntentKind::Create => "create",
            IntentKind::Modify => "modify",
            IntentKind::Delete => "delete",
            IntentKind::Query => "query",
        }
    }

    fn label(self) -> &'static str {
        match self {
            IntentKind::Create => "Create",
            IntentKind::Modify => "Modify",
            IntentKind::Delete => "Delete",
            IntentKind::Query => "Query",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentTarget {
    Function,
    Class,
    Module,
}

impl IntentTarget {
    pub const ALL: [IntentTarget; 3] = [IntentTarget::Function, IntentTarget::Class, IntentTarget::Module];

    fn label(self) -> &'static str {
        match self {
            IntentTarget::Function => "Function",
            IntentTarget::Class => "Class",
            IntentTarget::Module => "Module",
        }
    }
}

impl fmt::Display for IntentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A development intent. Only `raw` is authoritative; the rest is a guess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub raw: String,
    pub kind: Option<IntentKind>,
    pub target: Option<IntentTarget>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Intent {
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
}

/// Result of executing an intent; the variant is fixed where it is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentOutcome {
    SectionedText(Sections),
    StructuredEntities {
        entities: Vec<Entity>,
        relations: Vec<Relation>,
    },
}

impl IntentOutcome {
    pub fn empty_entities() -> Self {
        IntentOutcome::StructuredEntities {
            entities: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// Flat view for display. Entity results land under `semantics` as JSON.
    pub fn to_section_map(&self) -> SectionMap {
        match self {
            IntentOutcome::SectionedText(sections) => sections.to_map(),
            IntentOutcome::StructuredEntities {
                entities,
                relations,
            } => {
                let semantics = serde_json::json!({
                    "entities": entities,
                    "relations": relations,
                });
                let mut map = SectionMap::new();
                map.insert("semantics".to_string(), semantics.to_string());
                map
            }
        }
    }
}

/// Classify an intent by case-sensitive keyword search.
pub fn parse_keywords(raw: &str) -> Intent {
    let mut intent = Intent::new(raw);
    let has = |words: &[&str]| words.iter().any(|w| raw.contains(w));

    if has(&["create", "make"]) {
        intent.kind = Some(IntentKind::Create);
        if raw.contains("function") {
            intent.target = Some(IntentTarget::Function);
        } else if raw.contains("class") {
            intent.target = Some(IntentTarget::Class);
        }
    } else if has(&["modify", "change"]) {
        intent.kind = Some(IntentKind::Modify);
    } else if has(&["delete", "remove"]) {
        intent.kind = Some(IntentKind::Delete);
    } else if has(&["query", "find"]) {
        intent.kind = Some(IntentKind::Query);
    }

    intent
}

/// Whether `reply` contains `"field": "value"` with or without the space.
fn reply_has(reply: &str, field: &str, value: &str) -> bool {
    reply.contains(&format!("\"{field}\": \"{value}\""))
        || reply.contains(&format!("\"{field}\":\"{value}\""))
}

fn intent_from_reply(raw: &str, reply: &str) -> Intent {
    let mut intent = Intent::new(raw);
    intent.kind = IntentKind::ALL
        .into_iter()
        .find(|k| reply_has(reply, "type", k.label()));
    intent.target = IntentTarget::ALL
        .into_iter()
        .find(|t| reply_has(reply, "target", t.label()));

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(reply.trim()) {
        if let Some(Value::Array(items)) = object.get("constraints") {
            intent.constraints = items
                .iter()
                .filter_map(|c| c.as_str().map(str::to_string))
                .collect();
        }
        if let Some(Value::Object(parameters)) = object.get("parameters") {
            intent.parameters = parameters.clone();
        }
    }

    intent
}

/// Turns intents into results, using a completion provider when one is set.
pub struct IntentProcessor {
    provider: Option<Arc<dyn LLMProvider>>,
    composer: PromptComposer,
    generation: GenerationConfig,
}

impl IntentProcessor {
    pub fn new(composer: PromptComposer) -> Self {
        Self {
            provider: None,
            composer,
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Per-call overrides (typically a model chosen for one request).
    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Classify `raw`. A provider failure degrades to keyword parsing, except
    /// an empty reply, which is reported.
    pub async fn parse(&self, raw: &str) -> Result<Intent, IntentError> {
        let Some(provider) = &self.provider else {
            return Ok(parse_keywords(raw));
        };

        let messages = self.composer.intent_parsing_messages(raw);
        match provider.generate_chat(&messages, &self.generation).await {
            Ok(response) => {
                debug!(reply = %response.content, "intent parsing reply");
                Ok(intent_from_reply(raw, &response.content))
            }
            Err(LlmError::EmptyResponse) => Err(LlmError::EmptyResponse.into()),
            Err(e) => {
                warn!(error = %e, "LLM intent parsing failed, falling back to keywords");
                Ok(parse_keywords(raw))
            }
        }
    }

    pub async fn execute(&self, intent: &Intent) -> Result<IntentOutcome, IntentError> {
        match intent.kind {
            Some(IntentKind::Create) => self.create(intent).await,
            Some(kind @ (IntentKind::Modify | IntentKind::Delete)) => {
                Err(IntentError::NoEntities(kind))
            }
            Some(IntentKind::Query) => Ok(IntentOutcome::empty_entities()),
            None => Err(IntentError::UnknownIntentType),
        }
    }

    async fn create(&self, intent: &Intent) -> Result<IntentOutcome, IntentError> {
        let Some(provider) = &self.provider else {
            return Ok(IntentOutcome::empty_entities());
        };

        let messages = self.composer.code_generation_messages(&intent.raw);
        let response = provider.generate_chat(&messages, &self.generation).await?;
        info!(
            model = %response.model,
            length = response.content.len(),
            "code generation response received"
        );

        Ok(IntentOutcome::SectionedText(extract_sections(
            &response.content,
        )))
    }
}
