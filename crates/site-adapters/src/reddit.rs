use page_dom::{Document, NodeId};
use recast_core_types::PostId;
use tracing::trace;

use crate::common::{cached_post_id, container_before, existing_container};
use crate::{AdapterError, SiteAdapter, SiteKind};

const POST_SELECTOR: &str = "shreddit-post";
const TEXT_BODY_SELECTOR: &str = "shreddit-post-text-body";
const CONTENT_SELECTOR: &str = "[id$=\"-post-rtjson-content\"]";

/// New Reddit (`shreddit-post` custom elements).
pub struct RedditAdapter {
    doc: Document,
}

impl RedditAdapter {
    pub fn new(doc: Document) -> Self {
        Self { doc }
    }

    fn content_div(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        let Some(text_body) = self.doc.query_selector(post, TEXT_BODY_SELECTOR)? else {
            return Ok(None);
        };
        Ok(self.doc.query_selector(text_body, CONTENT_SELECTOR)?)
    }
}

impl SiteAdapter for RedditAdapter {
    fn site(&self) -> SiteKind {
        SiteKind::Reddit
    }

    fn document(&self) -> &Document {
        &self.doc
    }

    fn matches(&self) -> Result<bool, AdapterError> {
        let location = self.doc.location();
        // Chat pages share the host but carry no posts.
        Ok(location.hostname.contains("reddit.com") && !location.url.contains("reddit.com/chat/"))
    }

    fn post_elements(&self) -> Result<Vec<NodeId>, AdapterError> {
        let posts = self.doc.select_all(POST_SELECTOR)?;
        trace!(count = posts.len(), "shreddit-post elements found");
        Ok(posts)
    }

    fn is_valid_post(&self, element: NodeId) -> Result<bool, AdapterError> {
        Ok(self.doc.tag_name(element).as_deref() == Some(POST_SELECTOR)
            && self.doc.query_selector(element, TEXT_BODY_SELECTOR)?.is_some())
    }

    fn text_element(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        self.content_div(post)
    }

    fn button_container(&self, post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        if let Some(container) = existing_container(&self.doc, post)? {
            return Ok(Some(container));
        }
        match self.content_div(post)? {
            Some(content) => container_before(&self.doc, content),
            None => Ok(None),
        }
    }

    fn post_id(&self, post: NodeId) -> Result<PostId, AdapterError> {
        let site_id = self
            .doc
            .attribute(post, "post-id")
            .or_else(|| self.doc.attribute(post, "id"));
        cached_post_id(&self.doc, post, "reddit", site_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_dom::Location;

    const FEED: &str = r#"
        <shreddit-post post-id="t3_abc">
          <shreddit-post-text-body>
            <div id="t3_abc-post-rtjson-content"><p>Body text</p></div>
          </shreddit-post-text-body>
        </shreddit-post>
        <shreddit-post id="t3_link"><a href="https://x.test">link post</a></shreddit-post>
    "#;

    fn adapter(url: &str) -> RedditAdapter {
        RedditAdapter::new(Document::parse(FEED, Location::from_url(url)))
    }

    #[test]
    fn matches_reddit_but_not_chat() {
        assert!(adapter("https://www.reddit.com/r/rust/").matches().unwrap());
        assert!(!adapter("https://www.reddit.com/chat/room/1").matches().unwrap());
        assert!(!adapter("https://old.example.com/").matches().unwrap());
    }

    #[test]
    fn link_posts_are_not_valid() {
        let adapter = adapter("https://www.reddit.com/");
        let posts = adapter.post_elements().unwrap();
        assert!(adapter.is_valid_post(posts[0]).unwrap());
        assert!(!adapter.is_valid_post(posts[1]).unwrap());
        assert!(adapter.text_element(posts[1]).unwrap().is_none());
    }

    #[test]
    fn ids_come_from_post_id_then_id() {
        let adapter = adapter("https://www.reddit.com/");
        let posts = adapter.post_elements().unwrap();
        assert_eq!(adapter.post_id(posts[0]).unwrap().as_str(), "t3_abc");
        assert_eq!(adapter.post_id(posts[1]).unwrap().as_str(), "t3_link");
    }

    #[test]
    fn container_sits_before_content_inside_text_body() {
        let adapter = adapter("https://www.reddit.com/");
        let doc = adapter.document().clone();
        let post = adapter.post_elements().unwrap()[0];
        let container = adapter.button_container(post).unwrap().unwrap();
        let content = adapter.text_element(post).unwrap().unwrap();
        let body = doc.parent(content).unwrap();
        assert_eq!(doc.parent(container), Some(body));
        assert_eq!(doc.children(body), vec![container, content]);
        assert_eq!(adapter.button_container(post).unwrap(), Some(container));
    }
}
