//! Plumbing shared by buttons and indicators.

use std::time::Duration;

use page_dom::{Document, DomError, NodeId};
use tokio_util::sync::CancellationToken;

/// How long transient states stay on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UiTimings {
    pub success_display: Duration,
    pub error_display: Duration,
}

impl Default for UiTimings {
    fn default() -> Self {
        Self {
            success_display: Duration::from_millis(2000),
            error_display: Duration::from_millis(2000),
        }
    }
}

/// Runs `action` after `delay` unless the returned token is cancelled first.
pub(crate) fn schedule<F>(delay: Duration, action: F) -> CancellationToken
where
    F: FnOnce() + Send + 'static,
{
    let token = CancellationToken::new();
    let cancelled = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep(delay) => action(),
        }
    });
    token
}

/// Creates a detached host element carrying `class`.
pub(crate) fn create_host(doc: &Document, class: &str, style: &str) -> Result<NodeId, DomError> {
    let host = doc.create_element("div");
    doc.set_attribute(host, "class", class)?;
    doc.set_attribute(host, "style", style)?;
    Ok(host)
}

/// Detaches a host if it is still in the page. Hosts the page already
/// dropped are ignored.
pub(crate) fn detach_host(doc: &Document, host: NodeId) -> Result<(), DomError> {
    if doc.parent(host).is_some() {
        doc.remove(host)?;
    }
    Ok(())
}
