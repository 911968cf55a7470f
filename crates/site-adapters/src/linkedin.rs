use page_dom::{Document, NodeId};
use recast_core_types::PostId;
use tracing::debug;

use crate::common::{cached_post_id, container_before, existing_container};
use crate::{AdapterError, SiteAdapter, SiteKind};

const POST_CLASS: &str = "feed-shared-update-v2";
// Comments use span[dir="ltr"] too; only the post body containers qualify.
const TEXT_SELECTOR: &str =
    ".break-words span[dir=\"ltr\"], .tvm-parent-container span[dir=\"ltr\"]";
const TEXT_CONTAINER_SELECTOR: &str = ".break-words, .tvm-parent-container";

/// LinkedIn feed updates.
pub struct LinkedInAdapter {
    doc: Document,
}

impl LinkedInAdapter {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }
}

impl SiteAdapter for LinkedInAdapter {
    fn site(&self) -> SiteKind {
        SiteKind::LinkedIn
    }

    fn document(&self) -> &Document {
        &self.doc
    }

    fn matches(&self) -> Result<bool, AdapterError> {
        Ok(self.doc.location().hostname.contains("linkedin.com"))
    }

    fn post_elements(&self) -> Result<Vec<NodeId>, AdapterError> {
        Ok(self.doc.select_all(&format!(".{POST_CLASS}"))?)
    }

    fn is_valid_post(&self, element: NodeId) -> Result<bool, AdapterError> {
        if !self.doc.has_class(element, POST_CLASS) {
            return Ok(false);
        }
        let valid = self.doc.query_selector(element, TEXT_SELECTOR)?.is_some();
        if !valid {
            debug!(element = %element, "linkedin update without post text");
        }
        Ok(valid)
    }

    fn text_element(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        Ok(self.doc.query_selector(post, TEXT_SELECTOR)?)
    }

    fn button_container(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        if let Some(container) = existing_container(&self.doc, post)? {
            return Ok(Some(container));
        }
        match self.doc.query_selector(post, TEXT_CONTAINER_SELECTOR)? {
            Some(text_container) => container_before(&self.doc, text_container),
            None => Ok(None),
        }
    }

    fn post_id(&self, post: NodeId) -> Result<PostId, AdapterError> {
        cached_post_id(&self.doc, post, "linkedin", self.doc.attribute(post, "data-id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_dom::Location;

    const FEED: &str = r#"
        <div class="feed-shared-update-v2" data-id="urn:li:activity:1">
          <div class="update-components-text break-words"><span dir="ltr"><span>Thrilled to announce</span></span></div>
          <div class="comments"><span dir="ltr">Congrats!</span></div>
        </div>
        <div class="feed-shared-update-v2">
          <div class="comments"><span dir="ltr">comment only</span></div>
        </div>
    "#;

    fn adapter() -> LinkedInAdapter {
        LinkedInAdapter::new(Document::parse(
            FEED,
            Location::from_url("https://www.linkedin.com/feed/"),
        ))
    }

    #[test]
    fn comment_spans_do_not_make_a_post_valid() {
        let adapter = adapter();
        let posts = adapter.post_elements().unwrap();
        assert_eq!(posts.len(), 2);
        assert!(adapter.is_valid_post(posts[0]).unwrap());
        assert!(!adapter.is_valid_post(posts[1]).unwrap());
    }

    #[test]
    fn text_element_is_the_post_body_span() {
        let adapter = adapter();
        let post = adapter.post_elements().unwrap()[0];
        let text = adapter.text_element(post).unwrap().unwrap();
        assert_eq!(
            adapter.document().text_content(text).unwrap(),
            "Thrilled to announce"
        );
    }

    #[test]
    fn ids_use_data_id_or_generate() {
        let adapter = adapter();
        let posts = adapter.post_elements().unwrap();
        assert_eq!(adapter.post_id(posts[0]).unwrap().as_str(), "urn:li:activity:1");
        let generated = adapter.post_id(posts[1]).unwrap();
        assert!(generated.as_str().starts_with("linkedin-"));
        assert_eq!(adapter.post_id(posts[1]).unwrap(), generated);
    }

    #[test]
    fn container_precedes_text_container() {
        let adapter = adapter();
        let doc = adapter.document().clone();
        let post = adapter.post_elements().unwrap()[0];
        let container = adapter.button_container(post).unwrap().unwrap();
        assert_eq!(doc.children(post)[0], container);
        assert_eq!(adapter.button_container(post).unwrap(), Some(container));
        let second = adapter.post_elements().unwrap()[1];
        assert_eq!(adapter.button_container(second).unwrap(), None);
    }
}
