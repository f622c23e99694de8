use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Pipeline stage a wait is bounded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Execute,
}

impl Stage {
    pub fn default_budget(self) -> Duration {
        match self {
            Stage::Parse => Duration::from_secs(30),
            Stage::Execute => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parse => write!(f, "Intent parsing"),
            Stage::Execute => write!(f, "Intent execution"),
        }
    }
}

/// Run `fut` for at most `after`.
///
/// On expiry the future is dropped, which aborts any request it had in
/// flight, and the caller gets [`LlmError::Timeout`].
pub async fn bounded<F, T, E>(stage: Stage, after: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<LlmError>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%stage, after_secs = after.as_secs_f64(), "bounded wait expired");
            Err(LlmError::Timeout { stage, after }.into())
        }
    }
}
