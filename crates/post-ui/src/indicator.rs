use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use page_dom::{Document, NodeId};
use parking_lot::Mutex;
use recast_core_types::PostId;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::UiError;
use crate::widget::{create_host, detach_host, schedule, UiTimings};

pub const INDICATOR_HOST_CLASS: &str = "rewriter-indicator-host";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Loading,
    Success,
    Error,
}

impl IndicatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndicatorKind::Loading => "loading",
            IndicatorKind::Success => "success",
            IndicatorKind::Error => "error",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IndicatorKind::Loading => "Rewriting...",
            IndicatorKind::Success => "Rewritten!",
            IndicatorKind::Error => "Rewrite failed",
        }
    }
}

struct IndicatorEntry {
    widget: u64,
    host: NodeId,
    kind: IndicatorKind,
    timer: Option<CancellationToken>,
}

impl IndicatorEntry {
    fn render(&self, doc: &Document) -> Result<(), UiError> {
        doc.set_attribute(self.host, "data-state", self.kind.as_str())?;
        doc.set_text_content(self.host, self.kind.label())?;
        Ok(())
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

struct Inner {
    doc: Document,
    timings: UiTimings,
    entries: Mutex<HashMap<PostId, IndicatorEntry>>,
    next_widget: AtomicU64,
}

/// Auto-mode status indicators, at most one per post. Indicators have no
/// click affordance.
#[derive(Clone)]
pub struct IndicatorRegistry {
    inner: Arc<Inner>,
}

impl IndicatorRegistry {
    pub fn new(doc: Document, timings: UiTimings) -> Self {
        Self {
            inner: Arc::new(Inner {
                doc,
                timings,
                entries: Mutex::new(HashMap::new()),
                next_widget: AtomicU64::new(1),
            }),
        }
    }

    pub fn show_loading(&self, post_id: &PostId, container: NodeId) -> Result<(), UiError> {
        self.inject(post_id, container, IndicatorKind::Loading)
    }

    /// Error indicators stay until removed; auto mode does not retry.
    pub fn show_error(&self, post_id: &PostId, container: NodeId) -> Result<(), UiError> {
        self.inject(post_id, container, IndicatorKind::Error)
    }

    /// Switches the post's indicator to `success`. After the success display
    /// delay the indicator is removed and `then` runs, unless the indicator
    /// was removed or replaced in the meantime. Returns `false` when the post
    /// has no indicator.
    pub fn show_success<F>(&self, post_id: &PostId, then: F) -> Result<bool, UiError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(post_id) else {
            return Ok(false);
        };
        entry.cancel_timer();
        entry.kind = IndicatorKind::Success;
        entry.render(&self.inner.doc)?;

        let registry = self.clone();
        let widget = entry.widget;
        let post_id = post_id.clone();
        entry.timer = Some(schedule(self.inner.timings.success_display, move || {
            if registry.finish_success(&post_id, widget) {
                then();
            }
        }));
        Ok(true)
    }

    fn finish_success(&self, post_id: &PostId, widget: u64) -> bool {
        let entry = {
            let mut entries = self.inner.entries.lock();
            match entries.get(post_id) {
                Some(entry) if entry.widget == widget && entry.kind == IndicatorKind::Success => {
                    entries.remove(post_id)
                }
                _ => None,
            }
        };
        let Some(entry) = entry else {
            return false;
        };
        if let Err(err) = detach_host(&self.inner.doc, entry.host) {
            warn!(post_id = %post_id, error = %err, "failed to remove success indicator");
        }
        true
    }

    fn inject(&self, post_id: &PostId, container: NodeId, kind: IndicatorKind) -> Result<(), UiError> {
        let doc = &self.inner.doc;
        let mut entries = self.inner.entries.lock();
        if let Some(mut previous) = entries.remove(post_id) {
            previous.cancel_timer();
            detach_host(doc, previous.host)?;
        }
        let host = create_host(doc, INDICATOR_HOST_CLASS, "display: flex;")?;
        let entry = IndicatorEntry {
            widget: self.inner.next_widget.fetch_add(1, Ordering::Relaxed),
            host,
            kind,
            timer: None,
        };
        entry.render(doc)?;
        doc.append_child(container, host)?;
        entries.insert(post_id.clone(), entry);
        debug!(post_id = %post_id, kind = kind.as_str(), "indicator injected");
        Ok(())
    }

    pub fn remove(&self, post_id: &PostId) -> Result<bool, UiError> {
        let Some(mut entry) = self.inner.entries.lock().remove(post_id) else {
            return Ok(false);
        };
        entry.cancel_timer();
        detach_host(&self.inner.doc, entry.host)?;
        Ok(true)
    }

    pub fn kind(&self, post_id: &PostId) -> Option<IndicatorKind> {
        self.inner.entries.lock().get(post_id).map(|entry| entry.kind)
    }

    pub fn has_indicator(&self, post_id: &PostId) -> bool {
        self.inner.entries.lock().contains_key(post_id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cleanup(&self) -> Result<usize, UiError> {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        let count = drained.len();
        for (_, mut entry) in drained {
            entry.cancel_timer();
            detach_host(&self.inner.doc, entry.host)?;
        }
        debug!(count, "indicators cleaned up");
        Ok(count)
    }
}
