use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use recast::core_types::{Activity, BehaviorMode, ExtensionState, PostId, RewriteMode};
use recast::page_dom::{Document, Location, NodeId};
use recast::post_ui::{ButtonState, ClickOutcome, IndicatorKind};
use recast::rewrite_service::{
    EchoCompletion, PromptBackend, RewriteBackend, RewriteClient, RewriteError, RewriteRequest,
    RewriteService,
};
use recast::site_adapters::SiteKind;
use recast::state_center::InMemoryStateCenter;
use recast::{ContentOrchestrator, PostStatus, RecastConfig, WidgetStatus};
use tokio::time::sleep;

const TEST_PAGE: &str = r#"
    <div class="post" data-post-id="p1"><p class="post-content">First post</p></div>
    <div class="post" data-post-id="p2"><p class="post-content">Second post</p></div>
    <div class="post" data-post-id="p3"><p>No content region</p></div>
"#;

/// Rewrites to `"rewritten: {text}"` unless the post is scripted to fail.
#[derive(Default)]
struct ScriptedService {
    failing: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedService {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RewriteService for ScriptedService {
    async fn rewrite(
        &self,
        text: &str,
        post_id: &PostId,
        _platform: Option<&str>,
    ) -> Result<String, RewriteError> {
        self.calls.lock().push(post_id.to_string());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if self.failing.contains(post_id.as_str()) {
            return Err(RewriteError::Completion("model refused".into()));
        }
        Ok(format!("rewritten: {text}"))
    }
}

struct HangingBackend;

#[async_trait]
impl RewriteBackend for HangingBackend {
    async fn complete_rewrite(&self, _request: &RewriteRequest) -> Result<String, RewriteError> {
        futures::future::pending().await
    }
}

fn active(behavior: BehaviorMode) -> ExtensionState {
    ExtensionState {
        enabled: true,
        rewrite_mode: RewriteMode::Tldr,
        behavior_mode: behavior,
        model_loaded: true,
        is_initializing: false,
    }
}

fn test_page() -> Document {
    Document::parse(TEST_PAGE, Location::from_url("http://localhost/test.html"))
}

async fn start(
    page: Document,
    state: &Arc<InMemoryStateCenter>,
    service: Arc<dyn RewriteService>,
) -> ContentOrchestrator {
    ContentOrchestrator::init(page, &RecastConfig::default(), state.clone(), service)
        .await
        .unwrap()
}

/// Lets spawned listener, queue and observer tasks run.
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

fn status<'a>(posts: &'a [PostStatus], id: &str) -> &'a PostStatus {
    posts
        .iter()
        .find(|post| post.id.as_str() == id)
        .unwrap_or_else(|| panic!("post {id} missing from snapshot"))
}

fn button_label(post: &PostStatus) -> Option<&str> {
    match &post.widget {
        Some(WidgetStatus::Button { label, .. }) => Some(label),
        _ => None,
    }
}

fn text_of(page: &Document, id: &str) -> String {
    let post = page
        .select_first(&format!("[data-post-id=\"{id}\"]"))
        .unwrap()
        .unwrap();
    let text = page.query_selector(post, ".post-content").unwrap().unwrap();
    page.text_content(text).unwrap()
}

fn add_post(page: &Document, id: &str, text: &str) -> NodeId {
    let post = page.create_element("div");
    page.set_attribute(post, "class", "post").unwrap();
    page.set_attribute(post, "data-post-id", id).unwrap();
    let body = page.create_element("p");
    page.set_attribute(body, "class", "post-content").unwrap();
    page.set_text_content(body, text).unwrap();
    page.append_child(post, body).unwrap();
    page.append_child(page.body(), post).unwrap();
    post
}

#[tokio::test(start_paused = true)]
async fn manual_mode_attaches_buttons_to_valid_posts_only() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let orchestrator = start(page.clone(), &state, Arc::new(ScriptedService::default())).await;

    assert_eq!(orchestrator.site(), Some(SiteKind::TestPage));
    assert_eq!(orchestrator.activity(), Activity::Manual);

    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(posts.len(), 2);
    for post in &posts {
        assert_eq!(button_label(post), Some("TL;DR"));
        assert!(!post.rewritten);
    }
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn manual_click_rewrites_then_toggles_back() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let orchestrator = start(page.clone(), &state, Arc::new(ScriptedService::default())).await;
    let id = PostId::from("p1");

    assert_eq!(orchestrator.click(&id).await.unwrap(), ClickOutcome::Rewritten);
    assert_eq!(text_of(&page, "p1"), "rewritten: First post");
    assert_eq!(text_of(&page, "p2"), "Second post");

    sleep(Duration::from_millis(2100)).await;
    let posts = orchestrator.snapshot().unwrap();
    let p1 = status(&posts, "p1");
    assert!(p1.rewritten);
    assert_eq!(
        p1.widget,
        Some(WidgetStatus::Button {
            state: ButtonState::Idle,
            show_toggle: true,
            label: "Show Original".into(),
        })
    );

    assert_eq!(orchestrator.click(&id).await.unwrap(), ClickOutcome::Toggled);
    assert_eq!(text_of(&page, "p1"), "First post");
    let posts = orchestrator.snapshot().unwrap();
    assert!(!status(&posts, "p1").rewritten);
    assert_eq!(button_label(status(&posts, "p1")), Some("TL;DR"));
}

#[tokio::test(start_paused = true)]
async fn rewrite_timeout_shows_error_then_resets() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let service = RewriteClient::new(state.clone(), Arc::new(HangingBackend))
        .with_timeout(Duration::from_millis(120_000));
    let orchestrator = start(page.clone(), &state, Arc::new(service)).await;
    let id = PostId::from("p2");

    let outcome = orchestrator.click(&id).await.unwrap();
    assert_eq!(
        outcome,
        ClickOutcome::Failed("Request timeout after 120000 ms".into())
    );
    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(button_label(status(&posts, "p2")), Some("Error"));
    assert_eq!(text_of(&page, "p2"), "Second post");

    sleep(Duration::from_millis(2100)).await;
    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(button_label(status(&posts, "p2")), Some("TL;DR"));
}

#[tokio::test(start_paused = true)]
async fn auto_queue_isolates_failures() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Auto), 16);
    let service = Arc::new(ScriptedService::failing(&["p1"]));
    let orchestrator = start(page.clone(), &state, service.clone()).await;

    orchestrator.wait_idle().await;
    assert_eq!(service.calls(), vec!["p1", "p2"]);
    assert_eq!(orchestrator.queue_len(), 0);
    assert!(!orchestrator.is_processing());

    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(
        status(&posts, "p1").widget,
        Some(WidgetStatus::Indicator {
            state: IndicatorKind::Error
        })
    );
    assert_eq!(
        status(&posts, "p2").widget,
        Some(WidgetStatus::Indicator {
            state: IndicatorKind::Success
        })
    );
    assert_eq!(text_of(&page, "p2"), "rewritten: Second post");

    sleep(Duration::from_millis(2100)).await;
    let posts = orchestrator.snapshot().unwrap();
    let p2 = status(&posts, "p2");
    assert!(p2.rewritten);
    assert_eq!(button_label(p2), Some("Show Original"));
    assert!(!status(&posts, "p1").rewritten);
    assert_eq!(
        status(&posts, "p1").widget,
        Some(WidgetStatus::Indicator {
            state: IndicatorKind::Error
        })
    );
    assert_eq!(page.select_all(".rewriter-indicator-host").unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn behavior_flip_resets_ui_and_reoffers_every_post() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let orchestrator = start(page.clone(), &state, Arc::new(ScriptedService::default())).await;
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 2);

    state.set_behavior_mode(BehaviorMode::Auto);
    settle().await;
    orchestrator.wait_idle().await;

    assert_eq!(orchestrator.epoch(), 1);
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 0);
    let posts = orchestrator.snapshot().unwrap();
    for id in ["p1", "p2"] {
        let post = status(&posts, id);
        assert!(post.rewritten);
        assert_eq!(
            post.widget,
            Some(WidgetStatus::Indicator {
                state: IndicatorKind::Success
            })
        );
    }

    state.set_behavior_mode(BehaviorMode::Manual);
    settle().await;

    assert_eq!(orchestrator.epoch(), 2);
    assert_eq!(page.select_all(".rewriter-indicator-host").unwrap().len(), 0);
    let posts = orchestrator.snapshot().unwrap();
    for id in ["p1", "p2"] {
        assert_eq!(button_label(status(&posts, id)), Some("Show Original"));
    }

    // The cancelled success timers must not bring toggle buttons back twice.
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_auto_rewrite_leaves_new_mode_alone() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Auto), 16);
    let service = Arc::new(ScriptedService::slow(Duration::from_secs(1)));
    let orchestrator = start(page.clone(), &state, service.clone()).await;
    settle().await;
    assert_eq!(service.calls(), vec!["p1"]);
    assert_eq!(orchestrator.queue_len(), 1);

    state.set_behavior_mode(BehaviorMode::Manual);
    settle().await;
    assert_eq!(orchestrator.queue_len(), 0);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(service.calls(), vec!["p1"]);
    assert_eq!(text_of(&page, "p1"), "First post");
    let posts = orchestrator.snapshot().unwrap();
    for id in ["p1", "p2"] {
        let post = status(&posts, id);
        assert!(!post.rewritten);
        assert_eq!(button_label(post), Some("TL;DR"));
    }
}

#[tokio::test(start_paused = true)]
async fn rewrite_mode_change_relabels_idle_buttons() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let orchestrator = start(page.clone(), &state, Arc::new(ScriptedService::default())).await;

    state.set_rewrite_mode(RewriteMode::Debuzzword);
    settle().await;

    let posts = orchestrator.snapshot().unwrap();
    for id in ["p1", "p2"] {
        assert_eq!(button_label(status(&posts, id)), Some("De-buzzword"));
    }
    assert_eq!(orchestrator.epoch(), 0);
}

#[tokio::test(start_paused = true)]
async fn observer_follows_activity() {
    let page = test_page();
    let state = InMemoryStateCenter::new(active(BehaviorMode::Manual), 16);
    let orchestrator = start(page.clone(), &state, Arc::new(ScriptedService::default())).await;

    add_post(&page, "p4", "Fourth post");
    settle().await;
    assert_eq!(
        button_label(status(&orchestrator.snapshot().unwrap(), "p4")),
        Some("TL;DR")
    );

    state.set_enabled(false);
    settle().await;
    assert_eq!(orchestrator.activity(), Activity::Inactive);
    add_post(&page, "p5", "Fifth post");
    settle().await;
    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(status(&posts, "p5").widget, None);
    // Disabling leaves existing UI in place.
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 3);

    state.set_enabled(true);
    settle().await;
    let posts = orchestrator.snapshot().unwrap();
    assert_eq!(button_label(status(&posts, "p5")), Some("TL;DR"));
    assert_eq!(page.select_all(".rewriter-button-host").unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn reddit_posts_round_trip_through_the_offline_backend() {
    let page = Document::parse(
        r#"<shreddit-post post-id="t3_abc">
             <shreddit-post-text-body>
               <div id="t3_abc-post-rtjson-content"><p>Body text</p></div>
             </shreddit-post-text-body>
           </shreddit-post>"#,
        Location::from_url("https://www.reddit.com/r/rust/"),
    );
    let state = InMemoryStateCenter::new(active(BehaviorMode::Auto), 16);
    let backend = PromptBackend::new(EchoCompletion::new("[r] "));
    let service = RewriteClient::new(state.clone(), Arc::new(backend));
    let orchestrator = start(page.clone(), &state, Arc::new(service)).await;

    orchestrator.wait_idle().await;
    assert_eq!(orchestrator.site(), Some(SiteKind::Reddit));
    let content = page
        .select_first("[id$=\"-post-rtjson-content\"]")
        .unwrap()
        .unwrap();
    assert_eq!(page.text_content(content).unwrap().trim(), "[r] Body text");
    let posts = orchestrator.snapshot().unwrap();
    assert!(status(&posts, "t3_abc").rewritten);
}
