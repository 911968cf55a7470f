//! Text extraction and replacement for a post's text region.
//!
//! The first replacement snapshots the region's markup and `style` attribute
//! onto the region itself; later replacements never touch the snapshot, so
//! restoring always returns to the pre-rewrite content. The post carries a
//! `data-rewritten` marker while rewritten text is shown.

use std::sync::Arc;

use page_dom::{DomError, NodeId};
use site_adapters::{AdapterError, ContentFormat, SiteAdapter};
use thiserror::Error;
use tracing::{debug, trace};

pub const ORIGINAL_HTML_ATTR: &str = "data-original-html";
pub const ORIGINAL_STYLES_ATTR: &str = "data-original-styles";
pub const REWRITTEN_ATTR: &str = "data-rewritten";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no text element found in post {0}")]
    MissingTextElement(NodeId),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Dom(#[from] DomError),
}

pub struct TextReplacer {
    adapter: Arc<dyn SiteAdapter>,
}

impl TextReplacer {
    pub fn new(adapter: Arc<dyn SiteAdapter>) -> Self {
        Self { adapter }
    }

    fn text_element(&self, post: NodeId) -> Result<NodeId, ExtractError> {
        self.adapter
            .text_element(post)?
            .ok_or(ExtractError::MissingTextElement(post))
    }

    /// Current content of the text region, in the site's round-trip format.
    pub fn extract_text(&self, post: NodeId) -> Result<String, ExtractError> {
        let element = self.text_element(post)?;
        let doc = self.adapter.document();
        let text = match self.adapter.content_format() {
            ContentFormat::Html => doc.inner_html(element)?.trim().to_string(),
            ContentFormat::Text => doc.text_content(element)?.trim().to_string(),
        };
        trace!(post = %post, len = text.len(), "text extracted");
        Ok(text)
    }

    pub fn replace_text(&self, post: NodeId, new_content: &str) -> Result<(), ExtractError> {
        let element = self.text_element(post)?;
        let doc = self.adapter.document();

        if !doc.has_attribute(element, ORIGINAL_HTML_ATTR) {
            let original = doc.inner_html(element)?;
            let styles = doc.attribute(element, "style").unwrap_or_default();
            doc.set_attribute(element, ORIGINAL_HTML_ATTR, &original)?;
            doc.set_attribute(element, ORIGINAL_STYLES_ATTR, &styles)?;
            trace!(post = %post, "original content snapshotted");
        }

        match self.adapter.content_format() {
            ContentFormat::Html => doc.set_inner_html(element, new_content)?,
            ContentFormat::Text => doc.set_text_content(element, new_content)?,
        }
        doc.set_attribute(post, REWRITTEN_ATTR, "true")?;
        debug!(post = %post, "post text replaced");
        Ok(())
    }

    /// Puts the snapshot back. Does nothing for posts never rewritten.
    pub fn restore_original(&self, post: NodeId) -> Result<(), ExtractError> {
        let Some(element) = self.adapter.text_element(post)? else {
            return Ok(());
        };
        let doc = self.adapter.document();
        let Some(original) = doc.attribute(element, ORIGINAL_HTML_ATTR) else {
            return Ok(());
        };

        doc.set_inner_html(element, &original)?;
        match doc.attribute(element, ORIGINAL_STYLES_ATTR) {
            Some(styles) if !styles.is_empty() => doc.set_attribute(element, "style", &styles)?,
            _ => {
                doc.remove_attribute(element, "style")?;
            }
        }
        doc.remove_attribute(post, REWRITTEN_ATTR)?;
        debug!(post = %post, "original text restored");
        Ok(())
    }

    pub fn is_rewritten(&self, post: NodeId) -> bool {
        self.adapter.document().attribute(post, REWRITTEN_ATTR).as_deref() == Some("true")
    }

    /// Snapshot taken by the first replacement, if any.
    pub fn original_content(&self, post: NodeId) -> Result<Option<String>, ExtractError> {
        let Some(element) = self.adapter.text_element(post)? else {
            return Ok(None);
        };
        Ok(self.adapter.document().attribute(element, ORIGINAL_HTML_ATTR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_dom::{Document, Location};
    use site_adapters::{RedditAdapter, TestPageAdapter};

    fn reddit() -> (TextReplacer, Document, NodeId) {
        let doc = Document::parse(
            r#"<shreddit-post post-id="t3_x"><shreddit-post-text-body>
                 <div id="t3_x-post-rtjson-content" style="color: red"><p>Synergy <b>matters</b></p></div>
               </shreddit-post-text-body></shreddit-post>"#,
            Location::from_url("https://www.reddit.com/r/rust/"),
        );
        let post = doc.select_first("shreddit-post").unwrap().unwrap();
        let replacer = TextReplacer::new(Arc::new(RedditAdapter::new(doc.clone())));
        (replacer, doc, post)
    }

    #[test]
    fn html_sites_extract_trimmed_markup() {
        let (replacer, _, post) = reddit();
        assert_eq!(
            replacer.extract_text(post).unwrap(),
            "<p>Synergy <b>matters</b></p>"
        );
    }

    #[test]
    fn restore_returns_first_original_after_repeated_rewrites() {
        let (replacer, _, post) = reddit();
        let before = replacer.extract_text(post).unwrap();
        replacer.replace_text(post, "<p>X</p>").unwrap();
        replacer.replace_text(post, "<p>Y</p>").unwrap();
        assert_eq!(replacer.extract_text(post).unwrap(), "<p>Y</p>");

        replacer.restore_original(post).unwrap();
        assert_eq!(replacer.extract_text(post).unwrap(), before);
    }

    #[test]
    fn rewritten_marker_follows_replace_and_restore() {
        let (replacer, doc, post) = reddit();
        assert!(!replacer.is_rewritten(post));
        replacer.replace_text(post, "<p>short</p>").unwrap();
        assert!(replacer.is_rewritten(post));
        assert_eq!(doc.attribute(post, REWRITTEN_ATTR).as_deref(), Some("true"));
        replacer.restore_original(post).unwrap();
        assert!(!replacer.is_rewritten(post));
    }

    #[test]
    fn restore_brings_back_styles() {
        let (replacer, doc, post) = reddit();
        let text = doc.select_first("[id$=\"-post-rtjson-content\"]").unwrap().unwrap();
        replacer.replace_text(post, "<p>short</p>").unwrap();
        doc.set_attribute(text, "style", "color: blue").unwrap();
        replacer.restore_original(post).unwrap();
        assert_eq!(doc.attribute(text, "style").as_deref(), Some("color: red"));
    }

    #[test]
    fn restore_without_snapshot_is_a_no_op() {
        let (replacer, doc, post) = reddit();
        let before = doc.to_html();
        replacer.restore_original(post).unwrap();
        assert_eq!(doc.to_html(), before);
        assert_eq!(replacer.original_content(post).unwrap(), None);
    }

    #[test]
    fn text_sites_round_trip_plain_text() {
        let doc = Document::parse(
            r#"<div class="post"><p class="post-content">  Leveraging &amp; synergising  </p></div>"#,
            Location::from_url("http://localhost/test-page.html"),
        );
        let post = doc.select_first(".post").unwrap().unwrap();
        let replacer = TextReplacer::new(Arc::new(TestPageAdapter::new(doc.clone())));
        assert_eq!(replacer.extract_text(post).unwrap(), "Leveraging & synergising");

        replacer.replace_text(post, "<b>not markup</b>").unwrap();
        let text = doc.select_first(".post-content").unwrap().unwrap();
        assert_eq!(doc.text_content(text).unwrap(), "<b>not markup</b>");
        replacer.restore_original(post).unwrap();
        assert_eq!(replacer.extract_text(post).unwrap(), "Leveraging & synergising");
    }

    #[test]
    fn missing_text_region_is_reported() {
        let doc = Document::parse(
            r#"<div class="post"><p>no region</p></div>"#,
            Location::from_url("http://localhost/test-page.html"),
        );
        let post = doc.select_first(".post").unwrap().unwrap();
        let replacer = TextReplacer::new(Arc::new(TestPageAdapter::new(doc)));
        assert!(matches!(
            replacer.extract_text(post),
            Err(ExtractError::MissingTextElement(node)) if node == post
        ));
        assert!(matches!(
            replacer.replace_text(post, "x"),
            Err(ExtractError::MissingTextElement(_))
        ));
    }
}
