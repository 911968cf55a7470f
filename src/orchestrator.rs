//! Content orchestrator
//!
//! Owns one pipeline per page: scanner, text replacer, button and indicator
//! registries and the auto-mode queue. The extension state decides what a
//! discovered post gets:
//!
//! - inactive (disabled or model not loaded): nothing; observation stops but
//!   injected UI stays where it is
//! - manual: a rewrite button per post
//! - auto: a loading indicator per post while the queue rewrites it, then a
//!   toggle button
//!
//! A behavior flip resets the old mode's UI, bumps the ownership epoch and
//! re-offers every post. Rewrites that finish under an older epoch leave the
//! UI alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use page_dom::{Document, NodeId};
use parking_lot::Mutex;
use post_scanner::{DiscoveredPost, NewPostCallback, PostScanner};
use post_ui::{
    ActionError, ButtonProps, ButtonRegistry, ButtonState, ClickOutcome, IndicatorKind,
    IndicatorRegistry, RewriteAction, ToggleAction, UiError,
};
use recast_core_types::{Activity, BehaviorMode, ExtensionState, PostId, RewriteMode};
use recast_state_center::{StateChange, StateProvider};
use rewrite_queue::{PostProcessor, QueuedPost, RewriteQueue};
use rewrite_service::RewriteService;
use serde::Serialize;
use site_adapters::{select_adapter, AdapterError, SiteAdapter, SiteKind};
use text_replacer::TextReplacer;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RecastConfig;
use crate::errors::{OrchestratorError, OrchestratorResult};

/// Widget currently attached to a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WidgetStatus {
    Button {
        state: ButtonState,
        show_toggle: bool,
        label: String,
    },
    Indicator {
        state: IndicatorKind,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostStatus {
    pub id: PostId,
    pub rewritten: bool,
    pub queued: bool,
    pub widget: Option<WidgetStatus>,
}

pub struct ContentOrchestrator {
    pipeline: Option<Arc<Pipeline>>,
}

impl ContentOrchestrator {
    /// Selects the site adapter for `page`, applies the provider's current
    /// state and starts listening for changes.
    ///
    /// A page no adapter claims yields an inert orchestrator. Any other
    /// selection failure is returned.
    pub async fn init(
        page: Document,
        config: &RecastConfig,
        provider: Arc<dyn StateProvider>,
        service: Arc<dyn RewriteService>,
    ) -> OrchestratorResult<Self> {
        let adapter = match select_adapter(&page, &config.stubbed_sites) {
            Ok(adapter) => adapter,
            Err(AdapterError::Unavailable(url)) => {
                info!(url = %url, "no site adapter for page, staying inert");
                return Ok(Self::inert());
            }
            Err(err) => return Err(err.into()),
        };

        let pipeline = Pipeline::new(adapter, config, service);
        // Subscribe before reading so no change slips between the two.
        let changes = provider.subscribe();
        let state = provider.get_state().await;
        pipeline.apply_state(state)?;
        pipeline.spawn_listener(provider, changes);
        info!(site = pipeline.adapter.site_name(), "content orchestrator started");
        Ok(Self {
            pipeline: Some(pipeline),
        })
    }

    pub fn inert() -> Self {
        Self { pipeline: None }
    }

    pub fn is_inert(&self) -> bool {
        self.pipeline.is_none()
    }

    pub fn site(&self) -> Option<SiteKind> {
        self.pipeline.as_ref().map(|p| p.adapter.site())
    }

    pub fn document(&self) -> Option<&Document> {
        self.pipeline.as_ref().map(|p| p.adapter.document())
    }

    pub fn activity(&self) -> Activity {
        self.pipeline
            .as_ref()
            .map(|p| p.state.lock().activity())
            .unwrap_or(Activity::Inactive)
    }

    /// Incremented on every behavior reset.
    pub fn epoch(&self) -> u64 {
        self.pipeline.as_ref().map(|p| p.epoch()).unwrap_or(0)
    }

    /// Applies a state directly, as the listener does for published changes.
    pub fn apply_state(&self, state: ExtensionState) -> OrchestratorResult<()> {
        match &self.pipeline {
            Some(pipeline) => pipeline.apply_state(state),
            None => Ok(()),
        }
    }

    /// Clicks the rewrite button of a post.
    pub async fn click(&self, post_id: &PostId) -> OrchestratorResult<ClickOutcome> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| UiError::UnknownWidget(post_id.clone()))?;
        Ok(pipeline.buttons.click(post_id).await?)
    }

    /// Resolves once the auto-mode queue has nothing pending or in flight.
    pub async fn wait_idle(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.queue.wait_idle().await;
        }
    }

    pub fn queue_len(&self) -> usize {
        self.pipeline.as_ref().map(|p| p.queue.queue_len()).unwrap_or(0)
    }

    pub fn is_processing(&self) -> bool {
        self.pipeline
            .as_ref()
            .is_some_and(|p| p.queue.is_processing())
    }

    /// Status of every valid post on the page, in document order.
    pub fn snapshot(&self) -> OrchestratorResult<Vec<PostStatus>> {
        match &self.pipeline {
            Some(pipeline) => pipeline.snapshot(),
            None => Ok(Vec::new()),
        }
    }

    /// Stops observing and listening. Injected UI stays in place.
    pub fn shutdown(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.stop();
            info!("content orchestrator stopped");
        }
    }
}

struct Pipeline {
    adapter: Arc<dyn SiteAdapter>,
    scanner: PostScanner,
    replacer: TextReplacer,
    buttons: ButtonRegistry,
    indicators: IndicatorRegistry,
    queue: RewriteQueue<AutoProcessor>,
    service: Arc<dyn RewriteService>,
    state: Mutex<ExtensionState>,
    /// Behavior the injected UI was built for; survives inactive periods.
    ui_behavior: Mutex<Option<BehaviorMode>>,
    transition: Mutex<()>,
    epoch: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    fn new(
        adapter: Arc<dyn SiteAdapter>,
        config: &RecastConfig,
        service: Arc<dyn RewriteService>,
    ) -> Arc<Self> {
        let doc = adapter.document().clone();
        let timings = config.ui_timings();
        Arc::new_cyclic(|weak: &Weak<Pipeline>| {
            let on_new_post: NewPostCallback = {
                let weak = weak.clone();
                Arc::new(move |post: DiscoveredPost| {
                    if let Some(pipeline) = weak.upgrade() {
                        pipeline.handle_new_post(post);
                    }
                })
            };
            Pipeline {
                scanner: PostScanner::new(Arc::clone(&adapter), on_new_post),
                replacer: TextReplacer::new(Arc::clone(&adapter)),
                buttons: ButtonRegistry::new(doc.clone(), timings),
                indicators: IndicatorRegistry::new(doc, timings),
                queue: RewriteQueue::new(Arc::new(AutoProcessor {
                    pipeline: weak.clone(),
                })),
                adapter,
                service,
                state: Mutex::new(ExtensionState::default()),
                ui_behavior: Mutex::new(None),
                transition: Mutex::new(()),
                epoch: AtomicU64::new(0),
                listener: Mutex::new(None),
            }
        })
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn owns(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    fn rewrite_mode(&self) -> RewriteMode {
        self.state.lock().rewrite_mode
    }

    fn apply_state(self: &Arc<Self>, next: ExtensionState) -> OrchestratorResult<()> {
        let _transition = self.transition.lock();
        let previous = std::mem::replace(&mut *self.state.lock(), next.clone());
        let was = previous.activity();

        match next.activity().behavior() {
            None => {
                if was.is_active() {
                    self.scanner.disconnect();
                    info!(
                        enabled = next.enabled,
                        model_loaded = next.model_loaded,
                        "content pipeline paused"
                    );
                }
            }
            Some(behavior) => {
                let built_for = self.ui_behavior.lock().replace(behavior);
                let flipped = built_for.is_some_and(|old| old != behavior);
                if flipped {
                    self.reset_ui(behavior)?;
                }
                if flipped || !was.is_active() {
                    // Observer first so posts inserted during the scan are not missed.
                    self.scanner.setup_observer()?;
                    let offered = self.scanner.scan_for_posts()?;
                    info!(
                        behavior = %behavior,
                        offered,
                        tracked = self.scanner.seen_count(),
                        "content pipeline active"
                    );
                }
            }
        }

        if previous.rewrite_mode != next.rewrite_mode {
            let updated = self.buttons.update_mode(next.rewrite_mode)?;
            debug!(mode = %next.rewrite_mode, updated, "rewrite mode updated");
        }
        Ok(())
    }

    fn reset_ui(&self, behavior: BehaviorMode) -> OrchestratorResult<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.queue.clear();
        let buttons = self.buttons.cleanup()?;
        let indicators = self.indicators.cleanup()?;
        self.scanner.reset();
        info!(behavior = %behavior, epoch, buttons, indicators, "behavior changed, UI reset");
        Ok(())
    }

    fn spawn_listener(
        self: &Arc<Self>,
        provider: Arc<dyn StateProvider>,
        mut changes: broadcast::Receiver<StateChange>,
    ) {
        let pipeline = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let next = match changes.recv().await {
                    Ok(change) => {
                        debug!(
                            seq = change.seq,
                            activity_changed = change.activity_changed(),
                            behavior_changed = change.behavior_changed(),
                            "state change received"
                        );
                        change.current
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "state listener lagged, resyncing");
                        provider.get_state().await
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(pipeline) = pipeline.upgrade() else {
                    break;
                };
                if let Err(err) = pipeline.apply_state(next) {
                    error!(error = %err, "failed to apply state change");
                }
            }
            debug!("state listener stopped");
        });
        *self.listener.lock() = Some(handle);
    }

    fn stop(&self) {
        self.scanner.disconnect();
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }

    fn handle_new_post(self: &Arc<Self>, post: DiscoveredPost) {
        let activity = {
            let state = self.state.lock();
            let activity = state.activity();
            if !activity.is_active() {
                // Forgotten under the state lock so the reactivation scan offers it again.
                self.scanner.forget(&post.id);
            }
            activity
        };
        let result = match activity {
            Activity::Inactive => {
                debug!(post_id = %post.id, "post discovered while inactive, deferred");
                Ok(())
            }
            Activity::Manual => self.attach_button(&post.id, post.element),
            Activity::Auto => self.offer_auto(&post.id, post.element),
        };
        match result {
            Ok(()) => {}
            Err(err) if err.is_per_post() => {
                warn!(post_id = %post.id, error = %err, "failed to attach post UI");
            }
            Err(err) => error!(post_id = %post.id, error = %err, "failed to handle new post"),
        }
    }

    /// Attaches a button; posts already showing rewritten text get the toggle.
    fn attach_button(self: &Arc<Self>, id: &PostId, element: NodeId) -> OrchestratorResult<()> {
        if self.buttons.has_button(id) {
            return Ok(());
        }
        let Some(container) = self.adapter.button_container(element)? else {
            debug!(post_id = %id, "post has no button container");
            return Ok(());
        };
        let props = if self.replacer.is_rewritten(element) {
            self.toggle_props(id, element)
        } else {
            self.rewrite_props(id, element)
        };
        if self.buttons.inject_button(id, container, props)? {
            debug!(post_id = %id, "rewrite button attached");
        }
        Ok(())
    }

    fn offer_auto(self: &Arc<Self>, id: &PostId, element: NodeId) -> OrchestratorResult<()> {
        if self.replacer.is_rewritten(element) {
            return self.attach_button(id, element);
        }
        if let Some(container) = self.adapter.button_container(element)? {
            self.indicators.show_loading(id, container)?;
        }
        self.queue.enqueue(id.clone(), element);
        Ok(())
    }

    fn rewrite_props(self: &Arc<Self>, id: &PostId, element: NodeId) -> ButtonProps {
        let pipeline = Arc::downgrade(self);
        let post_id = id.clone();
        let epoch = self.epoch();
        let on_rewrite: RewriteAction = Arc::new(move || {
            let pipeline = pipeline.clone();
            let post_id = post_id.clone();
            async move {
                let Some(pipeline) = pipeline.upgrade() else {
                    return Ok(());
                };
                pipeline
                    .manual_rewrite(&post_id, element, epoch)
                    .await
                    .map_err(ActionError::from)
            }
            .boxed()
        });
        ButtonProps::new(on_rewrite, self.rewrite_mode()).with_platform(self.adapter.site_name())
    }

    fn toggle_props(self: &Arc<Self>, id: &PostId, element: NodeId) -> ButtonProps {
        let pipeline = Arc::downgrade(self);
        let post_id = id.clone();
        let on_toggle: ToggleAction = Arc::new(move || {
            let Some(pipeline) = pipeline.upgrade() else {
                return Ok(());
            };
            pipeline
                .show_original(&post_id, element)
                .map_err(ActionError::from)
        });
        self.rewrite_props(id, element).with_toggle(on_toggle)
    }

    async fn manual_rewrite(
        self: &Arc<Self>,
        id: &PostId,
        element: NodeId,
        epoch: u64,
    ) -> OrchestratorResult<()> {
        let rewritten = self.fetch_rewrite(id, element).await?;
        if !self.owns(epoch) {
            debug!(post_id = %id, epoch, "stale manual rewrite dropped");
            return Ok(());
        }
        self.replacer.replace_text(element, &rewritten)?;
        self.buttons.update_button(id, self.toggle_props(id, element))?;
        info!(post_id = %id, "post rewritten");
        Ok(())
    }

    fn show_original(self: &Arc<Self>, id: &PostId, element: NodeId) -> OrchestratorResult<()> {
        self.replacer.restore_original(element)?;
        self.buttons.update_button(id, self.rewrite_props(id, element))?;
        debug!(post_id = %id, "original text shown");
        Ok(())
    }

    async fn fetch_rewrite(&self, id: &PostId, element: NodeId) -> OrchestratorResult<String> {
        let text = self.replacer.extract_text(element)?;
        let platform = Some(self.adapter.site_name());
        Ok(self.service.rewrite(&text, id, platform).await?)
    }

    async fn auto_rewrite(self: &Arc<Self>, post: QueuedPost) -> OrchestratorResult<()> {
        let QueuedPost { id, element } = post;
        let epoch = self.epoch();
        let fetched = self.fetch_rewrite(&id, element).await;
        if !self.owns(epoch) {
            debug!(post_id = %id, epoch, "stale auto rewrite dropped");
            return fetched.map(drop);
        }

        let outcome = fetched.and_then(|rewritten| {
            self.replacer
                .replace_text(element, &rewritten)
                .map_err(OrchestratorError::from)
        });
        if let Err(err) = outcome {
            if let Err(ui_err) = self.show_failure(&id, element) {
                warn!(post_id = %id, error = %ui_err, "failed to show error indicator");
            }
            return Err(err);
        }

        let pipeline = Arc::downgrade(self);
        let post_id = id.clone();
        let shown = self.indicators.show_success(&id, move || {
            if let Some(pipeline) = pipeline.upgrade() {
                pipeline.finish_auto(&post_id, element, epoch);
            }
        })?;
        if !shown {
            self.finish_auto(&id, element, epoch);
        }
        info!(post_id = %id, "post rewritten");
        Ok(())
    }

    /// Replaces the success indicator with the toggle button.
    fn finish_auto(self: &Arc<Self>, id: &PostId, element: NodeId, epoch: u64) {
        if !self.owns(epoch) {
            return;
        }
        if let Err(err) = self.attach_button(id, element) {
            warn!(post_id = %id, error = %err, "failed to attach toggle button");
        }
    }

    fn show_failure(&self, id: &PostId, element: NodeId) -> OrchestratorResult<()> {
        self.indicators.remove(id)?;
        if let Some(container) = self.adapter.button_container(element)? {
            self.indicators.show_error(id, container)?;
        }
        Ok(())
    }

    fn snapshot(&self) -> OrchestratorResult<Vec<PostStatus>> {
        let mut posts = Vec::new();
        for element in self.adapter.post_elements()? {
            if !self.adapter.is_valid_post(element)? {
                continue;
            }
            let id = self.adapter.post_id(element)?;
            let widget = match self.buttons.view(&id) {
                Some(view) => Some(WidgetStatus::Button {
                    state: view.state,
                    show_toggle: view.show_toggle,
                    label: view.label,
                }),
                None => self
                    .indicators
                    .kind(&id)
                    .map(|state| WidgetStatus::Indicator { state }),
            };
            posts.push(PostStatus {
                rewritten: self.replacer.is_rewritten(element),
                queued: self.queue.is_queued(&id),
                widget,
                id,
            });
        }
        Ok(posts)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AutoProcessor {
    pipeline: Weak<Pipeline>,
}

#[async_trait]
impl PostProcessor for AutoProcessor {
    type Error = OrchestratorError;

    async fn process(&self, post: QueuedPost) -> OrchestratorResult<()> {
        match self.pipeline.upgrade() {
            Some(pipeline) => pipeline.auto_rewrite(post).await,
            None => Ok(()),
        }
    }
}
