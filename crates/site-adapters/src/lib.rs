//! Site adapters - per-site post discovery
//!
//! Each adapter knows how one site lays out its posts:
//! - locating candidate post elements and validating them
//! - locating the editable text region inside a post
//! - creating (once) the container UI is injected into
//! - deriving a stable post id
//!
//! Adapters form a closed set ([`SiteKind`]); [`select_adapter`] tries them in
//! fixed priority order and the first match wins.

pub mod common;
pub mod errors;
pub mod linkedin;
pub mod reddit;
pub mod stub;
pub mod testpage;

use std::sync::Arc;

use page_dom::{Document, NodeId};
use recast_core_types::PostId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use common::{CONTAINER_CLASS, POST_ID_ATTR};
pub use errors::AdapterError;
pub use linkedin::LinkedInAdapter;
pub use reddit::RedditAdapter;
pub use stub::StubAdapter;
pub use testpage::TestPageAdapter;

/// Representation a site's text region is round-tripped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    /// Markup of the text region, children only
    Html,
    /// Concatenated text of the region
    Text,
}

/// Known sites, in selection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    TestPage,
    Reddit,
    LinkedIn,
}

impl SiteKind {
    pub const ALL: [SiteKind; 3] = [SiteKind::TestPage, SiteKind::Reddit, SiteKind::LinkedIn];

    pub fn name(&self) -> &'static str {
        match self {
            SiteKind::TestPage => "testpage",
            SiteKind::Reddit => "reddit",
            SiteKind::LinkedIn => "linkedin",
        }
    }

    /// Instantiates the adapter for this site, or a stub when the site is
    /// held back for the current rollout.
    pub fn build(self, doc: Document, stubbed: bool) -> Arc<dyn SiteAdapter> {
        if stubbed {
            return Arc::new(StubAdapter::new(self, doc));
        }
        match self {
            SiteKind::TestPage => Arc::new(TestPageAdapter::new(doc)),
            SiteKind::Reddit => Arc::new(RedditAdapter::new(doc)),
            SiteKind::LinkedIn => Arc::new(LinkedInAdapter::new(doc)),
        }
    }
}

/// Capability set every site adapter provides.
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> SiteKind;

    fn document(&self) -> &Document;

    /// Cheap page-shape test; never fails for pages the adapter does not own.
    fn matches(&self) -> Result<bool, AdapterError>;

    /// All current candidate posts, in document order.
    fn post_elements(&self) -> Result<Vec<NodeId>, AdapterError>;

    /// Stricter than "found by selector": the text region must be present.
    fn is_valid_post(&self, element: NodeId) -> Result<bool, AdapterError>;

    fn text_element(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError>;

    /// Returns the post's UI container, creating it on first use.
    fn button_container(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError>;

    /// Stable for the lifetime of the element.
    fn post_id(&self, post: NodeId) -> Result<PostId, AdapterError>;

    fn content_format(&self) -> ContentFormat {
        ContentFormat::Html
    }

    fn site_name(&self) -> &'static str {
        self.site().name()
    }
}

/// First-match adapter selection over [`SiteKind::ALL`].
///
/// Adapters whose `matches` is not implemented are skipped.
pub fn select_adapter(
    doc: &Document,
    stubbed: &[SiteKind],
) -> Result<Arc<dyn SiteAdapter>, AdapterError> {
    for kind in SiteKind::ALL {
        let adapter = kind.build(doc.clone(), stubbed.contains(&kind));
        match adapter.matches() {
            Ok(true) => {
                info!(site = kind.name(), url = %doc.location().url, "site adapter selected");
                return Ok(adapter);
            }
            Ok(false) => {}
            Err(err) if err.is_not_implemented() => {
                debug!(site = kind.name(), error = %err, "adapter not ready, trying next");
            }
            Err(err) => return Err(err),
        }
    }
    Err(AdapterError::Unavailable(doc.location().url.clone()))
}
