use page_dom::DomError;
use recast_core_types::PostId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UiError {
    #[error("no widget registered for post {0}")]
    UnknownWidget(PostId),

    #[error("widget action failed: {0}")]
    Action(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}
