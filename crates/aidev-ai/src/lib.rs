pub mod deadline;
pub mod error;
pub mod intent;
pub mod llm_provider;
pub mod models;
pub mod normalize;
pub mod openrouter_provider;
pub mod prompt;
pub mod sections;

pub use deadline::{bounded, Stage};
pub use error::{IntentError, LlmError};
pub use intent::{Entity, Intent, IntentKind, IntentOutcome, IntentProcessor, IntentTarget, Relation};
pub use llm_provider::*;
pub use models::ModelInfo;
pub use normalize::{normalize, normalize_value, render_fallback, DisplaySections, SectionMap};
pub use openrouter_provider::{OpenRouterConfig, OpenRouterProvider};
pub use prompt::PromptComposer;
pub use sections::{extract_sections, Sections};
