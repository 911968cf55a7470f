use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RewriteError {
    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Request timeout after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("model returned an empty rewrite")]
    EmptyResponse,

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl RewriteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RewriteError::Timeout { .. })
    }

    /// Whether a later attempt could succeed without any state change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RewriteError::Timeout { .. } | RewriteError::Unavailable(_)
        )
    }
}
