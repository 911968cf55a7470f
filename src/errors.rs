//! Error handling for the content pipeline
//!
//! Component crates each own a narrow error enum; the orchestrator folds them
//! into [`OrchestratorError`] so per-post failures and page-level failures
//! can be told apart at the top.

use page_dom::DomError;
use post_ui::UiError;
use rewrite_service::RewriteError;
use site_adapters::AdapterError;
use text_replacer::ExtractError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Ui(#[from] UiError),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl OrchestratorError {
    /// Failures that only abort the rewrite of a single post.
    pub fn is_per_post(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Extract(_) | OrchestratorError::Rewrite(_) | OrchestratorError::Ui(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OrchestratorError::Rewrite(err) if err.is_timeout())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
