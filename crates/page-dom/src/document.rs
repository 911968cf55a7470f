use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use url::Url;

use crate::errors::DomError;
use crate::html;
use crate::mutation::MutationObserver;
use crate::node::{ElementData, NodeData, NodeId, ObserverSlot, Tree};
use crate::selector::SelectorList;

/// Where the page was loaded from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub url: String,
    pub hostname: String,
}

impl Location {
    /// Builds a location from a page URL. Inputs without a scheme are read as
    /// `http` URLs; anything unparseable gets an empty hostname.
    pub fn from_url(url: &str) -> Self {
        let parsed = if url.contains("://") {
            Url::parse(url)
        } else {
            Url::parse(&format!("http://{url}"))
        };
        let hostname = match parsed {
            Ok(parsed) => parsed.host_str().unwrap_or_default().to_ascii_lowercase(),
            Err(err) => {
                debug!(%url, error = %err, "page url is not parseable");
                String::new()
            }
        };
        Self {
            url: url.to_string(),
            hostname,
        }
    }
}

/// Shared handle to a host page. Clones refer to the same page.
#[derive(Clone)]
pub struct Document {
    tree: Arc<RwLock<Tree>>,
    location: Arc<Location>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.location.url)
            .finish_non_exhaustive()
    }
}

impl Document {
    pub fn new(location: Location) -> Self {
        Self {
            tree: Arc::new(RwLock::new(Tree::new())),
            location: Arc::new(location),
        }
    }

    /// Loads markup into a fresh page. When the markup carries a `<body>`,
    /// its children become the page body; otherwise everything does.
    pub fn parse(markup: &str, location: Location) -> Self {
        let doc = Self::new(location);
        let fragments = html::parse_fragment(markup);
        let fragments = find_body(&fragments).unwrap_or(fragments);
        {
            let mut tree = doc.tree.write();
            let body = tree.body;
            html::build(&mut tree, body, fragments);
        }
        doc
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn root(&self) -> NodeId {
        self.tree.read().root
    }

    pub fn body(&self) -> NodeId {
        self.tree.read().body
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.tree
            .write()
            .alloc(NodeData::Element(ElementData::new(tag)))
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.tree.write().alloc(NodeData::Text(text.to_string()))
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        tree.attach(parent, child, None)?;
        tree.notify(parent, vec![child]);
        Ok(())
    }

    pub fn insert_before(
        &self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        let index = tree
            .node(parent)?
            .children
            .iter()
            .position(|existing| *existing == reference)
            .ok_or_else(|| {
                DomError::Hierarchy(format!("{reference} is not a child of {parent}"))
            })?;
        tree.attach(parent, child, Some(index))?;
        tree.notify(parent, vec![child]);
        Ok(())
    }

    /// Detaches a node from the page. The node stays addressable.
    pub fn remove(&self, node: NodeId) -> Result<(), DomError> {
        self.tree.write().detach(node)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.read().parent(node)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .read()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tree.read().contains(ancestor, node)
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let tree = self.tree.read();
        tree.contains(tree.root, node)
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.tree.read().is_element(node)
    }

    pub fn tag_name(&self, node: NodeId) -> Option<String> {
        self.tree.read().element(node).ok().map(|el| el.tag.clone())
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.tree
            .read()
            .element(node)
            .ok()
            .and_then(|el| el.attr(name).map(str::to_string))
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        self.tree
            .write()
            .element_mut(node)?
            .set_attr(&name.to_ascii_lowercase(), value);
        Ok(())
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        Ok(self.tree.write().element_mut(node)?.remove_attr(name))
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.tree
            .read()
            .element(node)
            .map(|el| el.has_class(class))
            .unwrap_or(false)
    }

    pub fn add_class(&self, node: NodeId, class: &str) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        let el = tree.element_mut(node)?;
        if el.has_class(class) {
            return Ok(());
        }
        let value = match el.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        el.set_attr("class", &value);
        Ok(())
    }

    pub fn matches(&self, node: NodeId, selector: &str) -> Result<bool, DomError> {
        let selector = SelectorList::parse(selector)?;
        Ok(self.tree.read().matches(node, &selector))
    }

    /// Nearest inclusive ancestor of `node` matching `selector`.
    pub fn closest(&self, node: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let selector = SelectorList::parse(selector)?;
        let tree = self.tree.read();
        tree.node(node)?;
        let mut current = Some(node);
        while let Some(id) = current {
            if tree.is_element(id) && tree.matches(id, &selector) {
                return Ok(Some(id));
            }
            current = tree.parent(id);
        }
        Ok(None)
    }

    /// First descendant of `scope` matching `selector`, in document order.
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        let selector = SelectorList::parse(selector)?;
        let tree = self.tree.read();
        tree.node(scope)?;
        Ok(tree
            .descendants(scope)
            .into_iter()
            .find(|id| tree.matches(*id, &selector)))
    }

    /// All descendants of `scope` matching `selector`, in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let selector = SelectorList::parse(selector)?;
        let tree = self.tree.read();
        tree.node(scope)?;
        Ok(tree
            .descendants(scope)
            .into_iter()
            .filter(|id| tree.matches(*id, &selector))
            .collect())
    }

    /// Page-wide `querySelectorAll`.
    pub fn select_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        self.query_selector_all(self.root(), selector)
    }

    pub fn select_first(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        self.query_selector(self.root(), selector)
    }

    pub fn text_content(&self, node: NodeId) -> Result<String, DomError> {
        let tree = self.tree.read();
        let mut out = String::new();
        if let NodeData::Text(text) = &tree.node(node)?.data {
            return Ok(text.clone());
        }
        for id in tree.descendants(node) {
            if let Ok(n) = tree.node(id) {
                if let NodeData::Text(text) = &n.data {
                    out.push_str(text);
                }
            }
        }
        Ok(out)
    }

    /// Replaces the children of `node` with a single text node.
    pub fn set_text_content(&self, node: NodeId, text: &str) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        tree.element(node)?;
        clear_children(&mut tree, node)?;
        if text.is_empty() {
            return Ok(());
        }
        let child = tree.alloc(NodeData::Text(text.to_string()));
        tree.attach(node, child, None)?;
        tree.notify(node, vec![child]);
        Ok(())
    }

    pub fn inner_html(&self, node: NodeId) -> Result<String, DomError> {
        let tree = self.tree.read();
        tree.element(node)?;
        let mut out = String::new();
        html::serialize_children(&tree, node, &mut out);
        Ok(out)
    }

    /// Replaces the children of `node` with parsed markup.
    pub fn set_inner_html(&self, node: NodeId, markup: &str) -> Result<(), DomError> {
        let mut tree = self.tree.write();
        tree.element(node)?;
        clear_children(&mut tree, node)?;
        let added = html::build(&mut tree, node, html::parse_fragment(markup));
        trace!(node = %node, added = added.len(), "inner html replaced");
        tree.notify(node, added);
        Ok(())
    }

    pub fn outer_html(&self, node: NodeId) -> Result<String, DomError> {
        let tree = self.tree.read();
        tree.node(node)?;
        let mut out = String::new();
        html::serialize(&tree, node, &mut out);
        Ok(out)
    }

    /// Serialises the whole page.
    pub fn to_html(&self) -> String {
        let tree = self.tree.read();
        let mut out = String::new();
        html::serialize(&tree, tree.root, &mut out);
        out
    }

    /// Starts observing nodes inserted anywhere inside `root`.
    pub fn observe(&self, root: NodeId) -> Result<MutationObserver, DomError> {
        let mut tree = self.tree.write();
        tree.node(root)?;
        let id = tree.next_observer_id();
        let (sender, receiver) = mpsc::unbounded_channel();
        tree.observers.push(ObserverSlot { id, root, sender });
        Ok(MutationObserver::new(id, receiver, Arc::downgrade(&self.tree)))
    }

    pub fn observer_count(&self) -> usize {
        self.tree.read().observers.len()
    }
}

fn clear_children(tree: &mut Tree, node: NodeId) -> Result<(), DomError> {
    let children = std::mem::take(&mut tree.node_mut(node)?.children);
    for child in children {
        if let Ok(n) = tree.node_mut(child) {
            n.parent = None;
        }
        tree.drop_subtree(child);
    }
    Ok(())
}

fn find_body(fragments: &[html::Fragment]) -> Option<Vec<html::Fragment>> {
    for fragment in fragments {
        if let html::Fragment::Element { tag, children, .. } = fragment {
            if tag == "body" {
                return Some(children.clone());
            }
            if let Some(found) = find_body(children) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(markup: &str) -> Document {
        Document::parse(markup, Location::from_url("http://localhost:8080/test-page.html"))
    }

    #[test]
    fn location_extracts_hostname() {
        let loc = Location::from_url("https://user@www.Reddit.com:443/r/rust?x=1");
        assert_eq!(loc.hostname, "www.reddit.com");
        assert_eq!(Location::from_url("localhost:3000").hostname, "localhost");
    }

    #[test]
    fn location_handles_ipv6_and_encoded_hosts() {
        assert_eq!(
            Location::from_url("http://[::1]:8080/test-page.html").hostname,
            "[::1]"
        );
        assert_eq!(
            Location::from_url("https://www.reddit%2Ecom/r/rust/").hostname,
            "www.reddit.com"
        );
        assert_eq!(Location::from_url("file:///tmp/page.html").hostname, "");
        assert_eq!(Location::from_url("http://exa mple.com/").hostname, "");
    }

    #[test]
    fn parse_uses_body_children() {
        let doc = page("<!DOCTYPE html><html><head><title>t</title></head><body><div class=\"post\">a</div></body></html>");
        let posts = doc.select_all(".post").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(doc.parent(posts[0]), Some(doc.body()));
        assert!(doc.select_first("title").unwrap().is_none());
    }

    #[test]
    fn closest_includes_the_node_itself() {
        let doc = page("<div class=post id=outer><p class=post-content><b>x</b></p></div>");
        let bold = doc.select_first("b").unwrap().unwrap();
        let outer = doc.select_first("#outer").unwrap().unwrap();
        assert_eq!(doc.closest(bold, ".post").unwrap(), Some(outer));
        assert_eq!(doc.closest(outer, ".post").unwrap(), Some(outer));
        assert_eq!(doc.closest(bold, "section").unwrap(), None);
    }

    #[test]
    fn queries_follow_document_order() {
        let doc = page(
            "<div class=post id=a><div class=post id=b></div></div><div class=post id=c></div>",
        );
        let ids: Vec<_> = doc
            .select_all(".post")
            .unwrap()
            .into_iter()
            .map(|id| doc.attribute(id, "id").unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn inner_html_round_trips_through_parse() {
        let doc = page("<p class=\"post-content\">Fish &amp; chips <b>now</b><br></p>");
        let p = doc.select_first(".post-content").unwrap().unwrap();
        let before = doc.inner_html(p).unwrap();
        assert_eq!(before, "Fish &amp; chips <b>now</b><br>");
        doc.set_inner_html(p, "<i>x</i>").unwrap();
        assert_eq!(doc.text_content(p).unwrap(), "x");
        doc.set_inner_html(p, &before).unwrap();
        assert_eq!(doc.inner_html(p).unwrap(), before);
    }

    #[test]
    fn insert_before_rejects_foreign_reference() {
        let doc = page("<div id=a></div><div id=b><span id=c></span></div>");
        let a = doc.select_first("#a").unwrap().unwrap();
        let c = doc.select_first("#c").unwrap().unwrap();
        let fresh = doc.create_element("div");
        assert!(matches!(
            doc.insert_before(a, fresh, c),
            Err(DomError::Hierarchy(_))
        ));
        let b = doc.select_first("#b").unwrap().unwrap();
        doc.insert_before(b, fresh, c).unwrap();
        assert_eq!(doc.children(b), vec![fresh, c]);
    }

    #[test]
    fn cannot_append_ancestor_into_descendant() {
        let doc = page("<div id=a><div id=b></div></div>");
        let a = doc.select_first("#a").unwrap().unwrap();
        let b = doc.select_first("#b").unwrap().unwrap();
        assert!(doc.append_child(b, a).is_err());
    }

    #[tokio::test]
    async fn observers_see_insertions_inside_their_root_only() {
        let doc = page("<main id=feed></main><aside id=side></aside>");
        let feed = doc.select_first("#feed").unwrap().unwrap();
        let side = doc.select_first("#side").unwrap().unwrap();
        let mut observer = doc.observe(feed).unwrap();

        let inside = doc.create_element("div");
        doc.append_child(feed, inside).unwrap();
        let outside = doc.create_element("div");
        doc.append_child(side, outside).unwrap();

        let batch = observer.next_batch().await.unwrap();
        assert_eq!(batch[0].added, vec![inside]);
        assert!(observer.try_next_batch().is_none());

        assert_eq!(doc.observer_count(), 1);
        observer.disconnect();
        assert_eq!(doc.observer_count(), 0);
    }

    #[test]
    fn removed_nodes_are_detached_but_addressable() {
        let doc = page("<div id=a class=x></div>");
        let a = doc.select_first("#a").unwrap().unwrap();
        doc.remove(a).unwrap();
        assert!(!doc.is_connected(a));
        assert!(doc.has_class(a, "x"));
        assert!(doc.select_first("#a").unwrap().is_none());
    }
}
