use crate::deadline::Stage;
use crate::intent::IntentKind;
use std::time::Duration;
use thiserror::Error;

/// Failures talking to the completion endpoint.
///
/// Section-extraction degradation is deliberately absent: a reply without
/// markers still yields a usable result.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API key is required: set OPENROUTER_API_KEY or supply api_key with the request")]
    MissingCredential,

    #[error("error sending request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Status { status: String, body: String },

    #[error("error unmarshaling response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("no response from LLM API")]
    EmptyResponse,

    #[error("{stage} timed out after {} seconds", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },
}

impl LlmError {
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, LlmError::MissingCredential)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout { .. })
    }
}

#[derive(Error, Debug)]
pub enum IntentError {
    #[error("unknown intent type")]
    UnknownIntentType,

    #[error("no entities found to {}", .0.verb())]
    NoEntities(IntentKind),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl IntentError {
    /// The underlying transport error, if this failure came from the endpoint.
    pub fn as_llm(&self) -> Option<&LlmError> {
        match self {
            IntentError::Llm(e) => Some(e),
            _ => None,
        }
    }
}
