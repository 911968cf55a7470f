use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use futures::future::join_all;
use recast::core_types::{BehaviorMode, PostId, RewriteMode};
use recast::page_dom::{Document, Location};
use recast::rewrite_service::{EchoCompletion, PromptBackend, RewriteClient};
use recast::state_center::InMemoryStateCenter;
use recast::{ContentOrchestrator, PostStatus, RecastConfig, WidgetStatus};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use super::output::{print_structured, OutputFormat};

/// Extra wait past the longest display timer before the page is read back.
const SETTLE_MARGIN: Duration = Duration::from_millis(50);

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// HTML page to load
    pub page: PathBuf,

    /// Page URL used for site selection (defaults to http://localhost/<file name>)
    #[arg(long)]
    pub url: Option<String>,

    /// Behavior mode: manual or auto
    #[arg(long)]
    pub behavior: Option<BehaviorMode>,

    /// Rewrite mode: tldr, debuzzword or brainrot
    #[arg(long)]
    pub mode: Option<RewriteMode>,

    /// Text the offline backend puts in front of every rewrite
    #[arg(long, default_value = "[rewritten] ")]
    pub prefix: String,

    /// Write the resulting page to FILE instead of printing it
    #[arg(long, value_name = "FILE")]
    pub write: Option<PathBuf>,

    /// In manual mode, inject buttons without clicking them
    #[arg(long)]
    pub no_click: bool,

    /// Dump the final extension state and its change history as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub state_snapshot: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport {
    url: String,
    site: Option<&'static str>,
    behavior: BehaviorMode,
    mode: RewriteMode,
    posts: Vec<PostStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
}

pub async fn cmd_run(args: RunArgs, config: &RecastConfig, output: OutputFormat) -> Result<()> {
    let html = fs::read_to_string(&args.page)
        .await
        .with_context(|| format!("Failed to read page {}", args.page.display()))?;
    let url = args.url.clone().unwrap_or_else(|| {
        let name = args
            .page
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("http://localhost/{name}")
    });
    let page = Document::parse(&html, Location::from_url(&url));

    let mut initial = config.initial_state.clone();
    initial.enabled = true;
    initial.model_loaded = true;
    initial.is_initializing = false;
    if let Some(behavior) = args.behavior {
        initial.behavior_mode = behavior;
    }
    if let Some(mode) = args.mode {
        initial.rewrite_mode = mode;
    }
    let (behavior, mode) = (initial.behavior_mode, initial.rewrite_mode);

    let state = InMemoryStateCenter::new(initial, config.state_channel_capacity);
    let backend = PromptBackend::new(EchoCompletion::new(args.prefix.clone()));
    let service =
        RewriteClient::new(state.clone(), Arc::new(backend)).with_timeout(config.rewrite_timeout());
    let orchestrator = ContentOrchestrator::init(page, config, state.clone(), Arc::new(service))
        .await
        .context("Failed to start the content pipeline")?;

    if orchestrator.is_inert() {
        info!(url = %url, "page not claimed by any site adapter");
    } else {
        match behavior {
            BehaviorMode::Manual if !args.no_click => click_all(&orchestrator).await?,
            BehaviorMode::Manual => {}
            BehaviorMode::Auto => orchestrator.wait_idle().await,
        }
        // Let success and error states reset before reading the page back.
        let timings = config.ui_timings();
        tokio::time::sleep(timings.success_display.max(timings.error_display) + SETTLE_MARGIN)
            .await;
    }

    let posts = orchestrator.snapshot()?;
    let page_html = orchestrator.document().map(Document::to_html);
    orchestrator.shutdown();

    if let (Some(path), Some(markup)) = (&args.write, &page_html) {
        fs::write(path, markup)
            .await
            .with_context(|| format!("Failed to write page {}", path.display()))?;
        info!("Wrote rewritten page to {}", path.display());
    }

    if let Some(path) = &args.state_snapshot {
        state
            .write_snapshot(path)
            .with_context(|| format!("Failed to write state snapshot {}", path.display()))?;
        info!("Wrote state snapshot to {}", path.display());
    }

    let report = RunReport {
        site: orchestrator.site().map(|site| site.name()),
        url,
        behavior,
        mode,
        posts,
        html: if args.write.is_some() { None } else { page_html },
    };
    if !print_structured(&report, &output)? {
        print_human(&report);
    }
    Ok(())
}

async fn click_all(orchestrator: &ContentOrchestrator) -> Result<()> {
    let ids: Vec<PostId> = orchestrator
        .snapshot()?
        .into_iter()
        .filter(|post| matches!(post.widget, Some(WidgetStatus::Button { .. })))
        .map(|post| post.id)
        .collect();
    let outcomes = join_all(ids.iter().map(|id| orchestrator.click(id))).await;
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Ok(outcome) => debug!(post_id = %id, ?outcome, "button clicked"),
            Err(err) => warn!(post_id = %id, error = %err, "click failed"),
        }
    }
    Ok(())
}

fn print_human(report: &RunReport) {
    let Some(site) = report.site else {
        println!("No site adapter matches {}; nothing to do.", report.url);
        return;
    };
    println!("Site: {}  ({} mode, {})", site, report.behavior, report.mode.label());
    println!("Posts: {}", report.posts.len());
    for post in &report.posts {
        let widget = match &post.widget {
            Some(WidgetStatus::Button { label, .. }) => format!("button \"{label}\""),
            Some(WidgetStatus::Indicator { state }) => format!("indicator {}", state.as_str()),
            None => "-".to_string(),
        };
        let status = if post.rewritten { "rewritten" } else { "original" };
        println!("  {:<32} {:<10} {}", post.id.as_str(), status, widget);
    }
    if let Some(html) = &report.html {
        println!();
        println!("{html}");
    }
}
