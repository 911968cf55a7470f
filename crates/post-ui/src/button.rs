use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use page_dom::{Document, DomError, NodeId};
use parking_lot::Mutex;
use recast_core_types::{PostId, RewriteMode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::UiError;
use crate::widget::{create_host, detach_host, schedule, UiTimings};

pub const BUTTON_HOST_CLASS: &str = "rewriter-button-host";

pub type ActionError = Box<dyn std::error::Error + Send + Sync>;

/// Performs the rewrite for one post; the button shows `loading` until it settles.
pub type RewriteAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), ActionError>> + Send + Sync>;

/// Swaps rewritten text back to the original.
pub type ToggleAction = Arc<dyn Fn() -> Result<(), ActionError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    Idle,
    Loading,
    Success,
    Error,
}

impl ButtonState {
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonState::Idle => "idle",
            ButtonState::Loading => "loading",
            ButtonState::Success => "success",
            ButtonState::Error => "error",
        }
    }

    pub fn title(self, show_toggle: bool) -> &'static str {
        match self {
            ButtonState::Idle if show_toggle => "Show Original",
            ButtonState::Idle => "Rewrite",
            ButtonState::Loading => "Rewriting...",
            ButtonState::Success => "Rewritten!",
            ButtonState::Error => "Error",
        }
    }
}

/// Inputs a button is rendered from.
#[derive(Clone)]
pub struct ButtonProps {
    pub on_rewrite: RewriteAction,
    pub on_toggle: Option<ToggleAction>,
    pub show_toggle: bool,
    pub mode: RewriteMode,
    pub platform: Option<String>,
}

impl ButtonProps {
    pub fn new(on_rewrite: RewriteAction, mode: RewriteMode) -> Self {
        Self {
            on_rewrite,
            on_toggle: None,
            show_toggle: false,
            mode,
            platform: None,
        }
    }

    /// Turns the idle button into a "show original" toggle.
    pub fn with_toggle(mut self, on_toggle: ToggleAction) -> Self {
        self.on_toggle = Some(on_toggle);
        self.show_toggle = true;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }
}

/// Read-only view of a button, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonView {
    pub state: ButtonState,
    pub show_toggle: bool,
    pub mode: RewriteMode,
    pub disabled: bool,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Click landed while a rewrite was in flight.
    Ignored,
    Toggled,
    Rewritten,
    Failed(String),
    /// The button was removed or replaced before the rewrite settled.
    Detached,
}

struct ButtonEntry {
    widget: u64,
    host: NodeId,
    button: NodeId,
    state: ButtonState,
    props: ButtonProps,
    transition: u64,
    timer: Option<CancellationToken>,
}

impl ButtonEntry {
    fn view(&self) -> ButtonView {
        let label = match self.state {
            ButtonState::Idle if !self.props.show_toggle => self.props.mode.label(),
            state => state.title(self.props.show_toggle),
        };
        ButtonView {
            state: self.state,
            show_toggle: self.props.show_toggle,
            mode: self.props.mode,
            disabled: self.state == ButtonState::Loading,
            label: label.to_string(),
        }
    }

    /// Moves to `state`, dropping any pending reset. Returns the new transition.
    fn transition_to(&mut self, state: ButtonState) -> u64 {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.state = state;
        self.transition += 1;
        self.transition
    }

    fn render(&self, doc: &Document) -> Result<(), DomError> {
        let view = self.view();
        let button = self.button;
        doc.set_attribute(
            button,
            "class",
            &format!("rewriter-button rewriter-button--{}", view.state.as_str()),
        )?;
        doc.set_attribute(button, "data-state", view.state.as_str())?;
        doc.set_attribute(button, "data-mode", view.mode.as_str())?;
        doc.set_attribute(button, "title", view.state.title(view.show_toggle))?;
        if let Some(platform) = &self.props.platform {
            doc.set_attribute(button, "data-platform", platform)?;
        }
        if view.disabled {
            doc.set_attribute(button, "disabled", "")?;
        } else {
            doc.remove_attribute(button, "disabled")?;
        }
        if view.show_toggle {
            doc.set_attribute(button, "data-toggle", "true")?;
        } else {
            doc.remove_attribute(button, "data-toggle")?;
        }
        doc.set_text_content(button, &view.label)
    }
}

struct Inner {
    doc: Document,
    timings: UiTimings,
    entries: Mutex<HashMap<PostId, ButtonEntry>>,
    next_widget: AtomicU64,
}

/// Manual-mode rewrite buttons, at most one per post.
#[derive(Clone)]
pub struct ButtonRegistry {
    inner: Arc<Inner>,
}

impl ButtonRegistry {
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

    /// Appends a button to `container`. Returns `false` when the post
    /// already has one.
    pub fn inject_button(
        &self,
        post_id: &PostId,
        container: NodeId,
        props: ButtonProps,
    ) -> Result<bool, UiError> {
        let doc = &self.inner.doc;
        let mut entries = self.inner.entries.lock();
        if entries.contains_key(post_id) {
            return Ok(false);
        }
        let host = create_host(doc, BUTTON_HOST_CLASS, "display: inline-block;")?;
        let button = doc.create_element("button");
        doc.set_attribute(button, "type", "button")?;
        doc.append_child(host, button)?;

        let entry = ButtonEntry {
            widget: self.inner.next_widget.fetch_add(1, Ordering::Relaxed),
            host,
            button,
            state: ButtonState::Idle,
            props,
            transition: 0,
            timer: None,
        };
        entry.render(doc)?;
        doc.append_child(container, host)?;
        entries.insert(post_id.clone(), entry);
        debug!(post_id = %post_id, "button injected");
        Ok(true)
    }

    /// Re-renders with new props, keeping the current visual state.
    pub fn update_button(&self, post_id: &PostId, props: ButtonProps) -> Result<bool, UiError> {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(post_id) else {
            return Ok(false);
        };
        entry.props = props;
        entry.render(&self.inner.doc)?;
        Ok(true)
    }

    /// Relabels idle rewrite buttons for a new rewrite mode. Buttons that are
    /// busy or showing the toggle keep their props.
    pub fn update_mode(&self, mode: RewriteMode) -> Result<usize, UiError> {
        let mut entries = self.inner.entries.lock();
        let mut updated = 0;
        for entry in entries.values_mut() {
            if entry.state != ButtonState::Idle || entry.props.show_toggle || entry.props.mode == mode {
                continue;
            }
            entry.props.mode = mode;
            entry.render(&self.inner.doc)?;
            updated += 1;
        }
        Ok(updated)
    }

    pub fn remove_button(&self, post_id: &PostId) -> Result<bool, UiError> {
        let Some(mut entry) = self.inner.entries.lock().remove(post_id) else {
            return Ok(false);
        };
        if let Some(timer) = entry.timer.take() {
            timer.cancel();
        }
        detach_host(&self.inner.doc, entry.host)?;
        debug!(post_id = %post_id, "button removed");
        Ok(true)
    }

    pub fn has_button(&self, post_id: &PostId) -> bool {
        self.inner.entries.lock().contains_key(post_id)
    }

    pub fn view(&self, post_id: &PostId) -> Option<ButtonView> {
        self.inner.entries.lock().get(post_id).map(ButtonEntry::view)
    }

    pub fn host(&self, post_id: &PostId) -> Option<NodeId> {
        self.inner.entries.lock().get(post_id).map(|entry| entry.host)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every button; returns how many were removed.
    pub fn cleanup(&self) -> Result<usize, UiError> {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        let count = drained.len();
        for (_, mut entry) in drained {
            if let Some(timer) = entry.timer.take() {
                timer.cancel();
            }
            detach_host(&self.inner.doc, entry.host)?;
        }
        debug!(count, "buttons cleaned up");
        Ok(count)
    }

    /// Handles a click on the post's button.
    ///
    /// Toggle buttons run their toggle action directly. Otherwise the button
    /// goes `loading`, runs the rewrite, shows `success` or `error`, and
    /// returns to `idle` after the display delay.
    pub async fn click(&self, post_id: &PostId) -> Result<ClickOutcome, UiError> {
        enum Pending {
            Toggle(ToggleAction),
            Rewrite(RewriteAction, u64, u64),
        }

        let pending = {
            let mut entries = self.inner.entries.lock();
            let entry = entries
                .get_mut(post_id)
                .ok_or_else(|| UiError::UnknownWidget(post_id.clone()))?;
            if entry.state == ButtonState::Loading {
                debug!(post_id = %post_id, "click ignored while loading");
                return Ok(ClickOutcome::Ignored);
            }
            match (&entry.props.on_toggle, entry.props.show_toggle) {
                (Some(toggle), true) => Pending::Toggle(Arc::clone(toggle)),
                _ => {
                    let action = Arc::clone(&entry.props.on_rewrite);
                    let transition = entry.transition_to(ButtonState::Loading);
                    entry.render(&self.inner.doc)?;
                    Pending::Rewrite(action, entry.widget, transition)
                }
            }
        };

        match pending {
            Pending::Toggle(toggle) => {
                toggle().map_err(|err| UiError::Action(err.to_string()))?;
                Ok(ClickOutcome::Toggled)
            }
            Pending::Rewrite(action, widget, transition) => {
                let (state, outcome) = match action().await {
                    Ok(()) => (ButtonState::Success, ClickOutcome::Rewritten),
                    Err(err) => {
                        warn!(post_id = %post_id, error = %err, "rewrite failed");
                        (ButtonState::Error, ClickOutcome::Failed(err.to_string()))
                    }
                };
                if self.settle(post_id, widget, transition, state)? {
                    Ok(outcome)
                } else {
                    Ok(ClickOutcome::Detached)
                }
            }
        }
    }

    /// Shows the result of a rewrite and schedules the reset to idle.
    fn settle(
        &self,
        post_id: &PostId,
        widget: u64,
        transition: u64,
        state: ButtonState,
    ) -> Result<bool, UiError> {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(post_id) else {
            return Ok(false);
        };
        if entry.widget != widget || entry.transition != transition {
            return Ok(false);
        }
        let shown = entry.transition_to(state);
        entry.render(&self.inner.doc)?;

        let delay = match state {
            ButtonState::Error => self.inner.timings.error_display,
            _ => self.inner.timings.success_display,
        };
        let registry = self.clone();
        let post_id = post_id.clone();
        entry.timer = Some(schedule(delay, move || {
            registry.reset_to_idle(&post_id, widget, shown)
        }));
        Ok(true)
    }

    fn reset_to_idle(&self, post_id: &PostId, widget: u64, transition: u64) {
        let mut entries = self.inner.entries.lock();
        let Some(entry) = entries.get_mut(post_id) else {
            return;
        };
        if entry.widget != widget || entry.transition != transition {
            return;
        }
        entry.timer = None;
        entry.transition_to(ButtonState::Idle);
        if let Err(err) = entry.render(&self.inner.doc) {
            warn!(post_id = %post_id, error = %err, "failed to reset button");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use page_dom::Location;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::sleep;

    fn page() -> (Document, NodeId) {
        let doc = Document::parse(
            r#"<div class="post"><div class="rewrite-button-container"></div></div>"#,
            Location::from_url("http://localhost/"),
        );
        let container = doc.select_first(".rewrite-button-container").unwrap().unwrap();
        (doc, container)
    }

    fn slow_rewrite(ms: u64, ok: bool) -> RewriteAction {
        Arc::new(move || {
            async move {
                sleep(Duration::from_millis(ms)).await;
                if ok {
                    Ok(())
                } else {
                    Err::<(), ActionError>("model not loaded".into())
                }
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn inject_is_idempotent_per_post() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc.clone(), UiTimings::default());
        let id = PostId::from("p1");
        let props = ButtonProps::new(slow_rewrite(1, true), RewriteMode::Tldr);
        assert!(registry.inject_button(&id, container, props.clone()).unwrap());
        assert!(!registry.inject_button(&id, container, props).unwrap());
        assert_eq!(doc.children(container).len(), 1);

        let view = registry.view(&id).unwrap();
        assert_eq!(view.state, ButtonState::Idle);
        assert_eq!(view.label, "TL;DR");
        let button = doc.select_first("button").unwrap().unwrap();
        assert_eq!(doc.attribute(button, "title").as_deref(), Some("Rewrite"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_cycle_resets_after_delay() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc.clone(), UiTimings::default());
        let id = PostId::from("p1");
        registry
            .inject_button(&id, container, ButtonProps::new(slow_rewrite(50, true), RewriteMode::Tldr))
            .unwrap();

        assert_eq!(registry.click(&id).await.unwrap(), ClickOutcome::Rewritten);
        assert_eq!(registry.view(&id).unwrap().state, ButtonState::Success);
        sleep(Duration::from_millis(1999)).await;
        assert_eq!(registry.view(&id).unwrap().state, ButtonState::Success);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(registry.view(&id).unwrap().state, ButtonState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn second_click_while_loading_is_ignored() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc.clone(), UiTimings::default());
        let id = PostId::from("p1");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let action: RewriteAction = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                sleep(Duration::from_millis(100)).await;
                Ok::<(), ActionError>(())
            }
            .boxed()
        });
        registry
            .inject_button(&id, container, ButtonProps::new(action, RewriteMode::Tldr))
            .unwrap();

        let first = tokio::spawn({
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.click(&id).await }
        });
        sleep(Duration::from_millis(10)).await;
        let view = registry.view(&id).unwrap();
        assert_eq!(view.state, ButtonState::Loading);
        assert!(view.disabled);
        let button = doc.select_first("button").unwrap().unwrap();
        assert!(doc.has_attribute(button, "disabled"));

        assert_eq!(registry.click(&id).await.unwrap(), ClickOutcome::Ignored);
        assert_eq!(first.await.unwrap().unwrap(), ClickOutcome::Rewritten);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_shows_error_then_idle() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc, UiTimings::default());
        let id = PostId::from("p1");
        registry
            .inject_button(&id, container, ButtonProps::new(slow_rewrite(5, false), RewriteMode::Tldr))
            .unwrap();

        let outcome = registry.click(&id).await.unwrap();
        assert_eq!(outcome, ClickOutcome::Failed("model not loaded".into()));
        assert_eq!(registry.view(&id).unwrap().label, "Error");
        sleep(Duration::from_millis(2001)).await;
        let view = registry.view(&id).unwrap();
        assert_eq!(view.state, ButtonState::Idle);
        assert!(!view.show_toggle);
    }

    #[tokio::test(start_paused = true)]
    async fn toggle_runs_toggle_action_without_loading() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc, UiTimings::default());
        let id = PostId::from("p1");
        let toggled = Arc::new(AtomicUsize::new(0));
        let counter = toggled.clone();
        let toggle: ToggleAction = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ActionError>(())
        });
        let props = ButtonProps::new(slow_rewrite(5, true), RewriteMode::Brainrot).with_toggle(toggle);
        registry.inject_button(&id, container, props).unwrap();
        assert_eq!(registry.view(&id).unwrap().label, "Show Original");

        assert_eq!(registry.click(&id).await.unwrap(), ClickOutcome::Toggled);
        assert_eq!(toggled.load(Ordering::SeqCst), 1);
        assert_eq!(registry.view(&id).unwrap().state, ButtonState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_button_suppresses_pending_reset() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc.clone(), UiTimings::default());
        let id = PostId::from("p1");
        let props = ButtonProps::new(slow_rewrite(5, true), RewriteMode::Tldr);
        registry.inject_button(&id, container, props.clone()).unwrap();
        registry.click(&id).await.unwrap();

        assert!(registry.remove_button(&id).unwrap());
        assert!(doc.children(container).is_empty());
        registry.inject_button(&id, container, props).unwrap();
        sleep(Duration::from_millis(2500)).await;
        assert_eq!(registry.view(&id).unwrap().state, ButtonState::Idle);
        assert!(!registry.remove_button(&PostId::from("other")).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_rewrite_detaches_outcome() {
        let (doc, container) = page();
        let registry = ButtonRegistry::new(doc, UiTimings::default());
        let id = PostId::from("p1");
        registry
            .inject_button(&id, container, ButtonProps::new(slow_rewrite(100, true), RewriteMode::Tldr))
            .unwrap();
        let click = tokio::spawn({
            let registry = registry.clone();
            let id = id.clone();
            async move { registry.click(&id).await }
        });
        sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.cleanup().unwrap(), 1);
        assert_eq!(click.await.unwrap().unwrap(), ClickOutcome::Detached);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mode_update_skips_busy_and_toggle_buttons() {
        let doc = Document::parse(
            r#"<div id=a></div><div id=b></div><div id=c></div>"#,
            Location::from_url("http://localhost/"),
        );
        let registry = ButtonRegistry::new(doc.clone(), UiTimings::default());
        let slot = |sel: &str| doc.select_first(sel).unwrap().unwrap();
        let toggle: ToggleAction = Arc::new(|| Ok::<(), ActionError>(()));

        registry
            .inject_button(&"a".into(), slot("#a"), ButtonProps::new(slow_rewrite(1, true), RewriteMode::Tldr))
            .unwrap();
        registry
            .inject_button(
                &"b".into(),
                slot("#b"),
                ButtonProps::new(slow_rewrite(1, true), RewriteMode::Tldr).with_toggle(toggle),
            )
            .unwrap();
        registry
            .inject_button(&"c".into(), slot("#c"), ButtonProps::new(slow_rewrite(500, true), RewriteMode::Tldr))
            .unwrap();
        let busy = tokio::spawn({
            let registry = registry.clone();
            async move { registry.click(&"c".into()).await }
        });
        sleep(Duration::from_millis(10)).await;

        assert_eq!(registry.update_mode(RewriteMode::Debuzzword).unwrap(), 1);
        assert_eq!(registry.view(&"a".into()).unwrap().label, "De-buzzword");
        assert_eq!(registry.view(&"b".into()).unwrap().mode, RewriteMode::Tldr);
        assert_eq!(registry.view(&"c".into()).unwrap().mode, RewriteMode::Tldr);
        busy.await.unwrap().unwrap();
    }
}
