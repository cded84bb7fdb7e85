use orderwatch_core::CoreError;
use thiserror::Error;

/// Errors surfaced by pipeline stages.
///
/// Only transport failures from the fetch stage and persistence failures from
/// the writers are allowed to fail a run; everything else is absorbed locally.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] CoreError),

    #[error("unknown pipeline step '{0}'")]
    UnknownStep(String),
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl PipelineError {
    /// Whether a whole-run retry can be expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::UpstreamStatus { .. } | Self::Persistence(_)
        )
    }
}
