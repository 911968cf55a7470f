use page_dom::{Document, NodeId};
use recast_core_types::PostId;

use crate::{AdapterError, SiteAdapter, SiteKind};

/// Placeholder for a site held back from the current rollout.
///
/// Every capability fails with [`AdapterError::NotImplemented`] so a stubbed
/// site can never be selected and then break downstream.
pub struct StubAdapter {
    kind: SiteKind,
    doc: Document,
}

impl StubAdapter {
    pub fn new(kind: SiteKind, doc: Document) -> Self {
        Self { kind, doc }
    }

    fn unimplemented<T>(&self, capability: &'static str) -> Result<T, AdapterError> {
        Err(AdapterError::NotImplemented {
            site: self.kind.name(),
            capability,
        })
    }
}

impl SiteAdapter for StubAdapter {
    fn site(&self) -> SiteKind {
        self.kind
    }

    fn document(&self) -> &Document {
        &self.doc
    }

    fn matches(&self) -> Result<bool, AdapterError> {
        self.unimplemented("matches")
    }

    fn post_elements(&self) -> Result<Vec<NodeId>, AdapterError> {
        self.unimplemented("post_elements")
    }

    fn is_valid_post(&self, _element: NodeId) -> Result<bool, AdapterError> {
        self.unimplemented("is_valid_post")
    }

    fn text_element(&self, _post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        self.unimplemented("text_element")
    }

    fn button_container(&self, _post: NodeId) -> Result<Option<NodeId>, AdapterError> {
        self.unimplemented("button_container")
    }

    fn post_id(&self, _post: NodeId) -> Result<PostId, AdapterError> {
        self.unimplemented("post_id")
    }
}
