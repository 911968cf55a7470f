use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;

use crate::errors::DomError;
use crate::mutation::MutationRecord;
use crate::selector::{Complex, SelectorList};

/// Handle to a node of a [`crate::Document`]. Ids are never reused.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ElementData {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let idx = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(idx).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|value| value.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

pub(crate) struct ObserverSlot {
    pub id: u64,
    pub root: NodeId,
    pub sender: mpsc::UnboundedSender<Vec<MutationRecord>>,
}

/// Node arena behind a document handle.
pub(crate) struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    next_observer: u64,
    pub root: NodeId,
    pub body: NodeId,
    pub observers: Vec<ObserverSlot>,
}

impl Tree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            next_id: 1,
            next_observer: 1,
            root: NodeId(0),
            body: NodeId(0),
            observers: Vec::new(),
        };
        let root = tree.alloc(NodeData::Element(ElementData::new("html")));
        let body = tree.alloc(NodeData::Element(ElementData::new("body")));
        tree.root = root;
        tree.body = body;
        if let Some(node) = tree.nodes.get_mut(&root) {
            node.children.push(body);
        }
        if let Some(node) = tree.nodes.get_mut(&body) {
            node.parent = Some(root);
        }
        tree
    }

    pub fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn next_observer_id(&mut self) -> u64 {
        let id = self.next_observer;
        self.next_observer += 1;
        id
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, DomError> {
        self.nodes.get(&id).ok_or(DomError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, DomError> {
        self.nodes.get_mut(&id).ok_or(DomError::UnknownNode(id))
    }

    pub fn element(&self, id: NodeId) -> Result<&ElementData, DomError> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Ok(el),
            NodeData::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => Ok(el),
            NodeData::Text(_) => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(&id).map(|node| &node.data),
            Some(NodeData::Element(_))
        )
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Inclusive ancestry test, as `Node.contains` behaves in a browser.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&id) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn detach(&mut self, id: NodeId) -> Result<(), DomError> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != id);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Inserts `child` under `parent` at `index` (append when `None`).
    pub fn attach(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: Option<usize>,
    ) -> Result<(), DomError> {
        self.element(parent)?;
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::Hierarchy(format!(
                "{child} is an inclusive ancestor of {parent}"
            )));
        }
        self.detach(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let at = index.unwrap_or(children.len()).min(children.len());
        children.insert(at, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Frees a detached subtree.
    pub fn drop_subtree(&mut self, id: NodeId) {
        let mut ids = self.descendants(id);
        ids.push(id);
        for id in ids {
            self.nodes.remove(&id);
        }
    }

    pub fn matches(&self, id: NodeId, selector: &SelectorList) -> bool {
        selector
            .complexes()
            .iter()
            .any(|complex| self.matches_complex(id, complex))
    }

    fn matches_complex(&self, id: NodeId, complex: &Complex) -> bool {
        let Some((last, rest)) = complex.compounds().split_last() else {
            return false;
        };
        match self.element(id) {
            Ok(el) if last.matches(el) => {}
            _ => return false,
        }
        let mut current = self.parent(id);
        for compound in rest.iter().rev() {
            loop {
                let Some(ancestor) = current else {
                    return false;
                };
                current = self.parent(ancestor);
                if let Ok(el) = self.element(ancestor) {
                    if compound.matches(el) {
                        break;
                    }
                }
            }
        }
        true
    }

    /// Fans a record out to every observer whose root contains `target`.
    pub fn notify(&mut self, target: NodeId, added: Vec<NodeId>) {
        if added.is_empty() || self.observers.is_empty() {
            return;
        }
        let eligible: Vec<bool> = self
            .observers
            .iter()
            .map(|slot| self.contains(slot.root, target))
            .collect();
        let record = MutationRecord { target, added };
        let mut idx = 0;
        self.observers.retain(|slot| {
            let keep = if eligible[idx] {
                slot.sender.send(vec![record.clone()]).is_ok()
            } else {
                !slot.sender.is_closed()
            };
            idx += 1;
            keep
        });
    }
}
