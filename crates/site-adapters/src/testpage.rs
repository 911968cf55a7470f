use page_dom::{Document, NodeId};
use recast_core_types::PostId;

use crate::common::{cached_post_id, ensure_style, existing_container, CONTAINER_CLASS};
use crate::{AdapterError, ContentFormat, SiteAdapter, SiteKind};

const POST_SELECTOR: &str = ".post";
const TEXT_SELECTOR: &str = ".post-content";
const CONTAINER_STYLE: &str = "position: absolute; bottom: 12px; left: 12px; z-index: 100;";

/// Local test page: `.post` cards with a `.post-content` paragraph.
pub struct TestPageAdapter {
    doc: Document,
}

impl TestPageAdapter {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }
}

impl SiteAdapter for TestPageAdapter {
    fn site(&self) -> SiteKind {
        SiteKind::TestPage
    }

    fn document(&self) -> &Document {
        &self.doc
    }

    fn matches(&self) -> Result<bool, AdapterError> {
        Ok(self.doc.select_first(POST_SELECTOR)?.is_some())
    }

    fn post_elements(&self) -> Result<Vec<NodeId>, AdapterError> {
        Ok(self.doc.select_all(POST_SELECTOR)?)
    }

    fn is_valid_post(&self, element: NodeId) -> Result<bool, AdapterError> {
        Ok(self.doc.has_class(element, "post")
            && self.doc.query_selector(element, TEXT_SELECTOR)?.is_some())
    }

    fn text_element(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        Ok(self.doc.query_selector(post, TEXT_SELECTOR)?)
    }

    fn button_container(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        if let Some(container) = existing_container(&self.doc, post)? {
            return Ok(Some(container));
        }
        // Button sits in the lower-left corner of the card.
        ensure_style(&self.doc, post, "position", "relative")?;
        ensure_style(&self.doc, post, "padding-bottom", "56px")?;

        let container = self.doc.create_element("div");
        self.doc.set_attribute(container, "class", CONTAINER_CLASS)?;
        self.doc.set_attribute(container, "style", CONTAINER_STYLE)?;
        self.doc.append_child(post, container)?;
        Ok(Some(container))
    }

    fn post_id(&self, post: NodeId) -> Result<PostId, AdapterError> {
        cached_post_id(&self.doc, post, "post", self.doc.attribute(post, "data-post-id"))
    }

    fn content_format(&self) -> ContentFormat {
        ContentFormat::Text
    }
}
