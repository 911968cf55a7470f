//! Behaviour shared by every concrete adapter.

use page_dom::{Document, NodeId};
use recast_core_types::PostId;

use crate::errors::AdapterError;

/// Attribute caching the id chosen for a post.
pub const POST_ID_ATTR: &str = "data-rewriter-id";

/// Class marking the injected UI container inside a post.
pub const CONTAINER_CLASS: &str = "rewrite-button-container";

const CONTAINER_STYLE: &str = "display: block; padding: 8px 0 8px 0; margin-bottom: 8px;";

/// Returns the cached id, or derives one (falling back to a generated token)
/// and caches it on the element.
pub(crate) fn cached_post_id(
    doc: &Document,
    post: NodeId,
    prefix: &str,
    site_id: Option<String>,
) -> Result<PostId, AdapterError> {
    if let Some(existing) = doc.attribute(post, POST_ID_ATTR) {
        return Ok(PostId(existing));
    }
    let id = site_id
        .filter(|value| !value.trim().is_empty())
        .map(PostId)
        .unwrap_or_else(|| PostId::generated(prefix));
    doc.set_attribute(post, POST_ID_ATTR, id.as_str())?;
    Ok(id)
}

pub(crate) fn existing_container(
    doc: &Document,
    post: NodeId,
) -> Result<Option<NodeId>, AdapterError> {
    Ok(doc.query_selector(post, &format!(".{CONTAINER_CLASS}"))?)
}

/// Creates a block container and inserts it right before `anchor`.
pub(crate) fn container_before(doc: &Document, anchor: NodeId) -> Result<Option<NodeId>, AdapterError> {
    let Some(parent) = doc.parent(anchor) else {
        return Ok(None);
    };
    let container = doc.create_element("div");
    doc.set_attribute(container, "class", CONTAINER_CLASS)?;
    doc.set_attribute(container, "style", CONTAINER_STYLE)?;
    doc.insert_before(parent, container, anchor)?;
    Ok(Some(container))
}

/// Appends a `property: value` declaration unless the property is already set.
pub(crate) fn ensure_style(
    doc: &Document,
    node: NodeId,
    property: &str,
    value: &str,
) -> Result<(), AdapterError> {
    let current = doc.attribute(node, "style").unwrap_or_default();
    let already = current
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .any(|(prop, _)| prop.trim().eq_ignore_ascii_case(property));
    if already {
        return Ok(());
    }
    let trimmed = current.trim().trim_end_matches(';');
    let next = if trimmed.is_empty() {
        format!("{property}: {value};")
    } else {
        format!("{trimmed}; {property}: {value};")
    };
    doc.set_attribute(node, "style", &next)?;
    Ok(())
}
