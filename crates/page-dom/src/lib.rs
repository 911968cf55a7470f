//! In-memory model of the host page the content pipeline runs against.
//!
//! A [`Document`] is an arena of element and text nodes addressed by
//! [`NodeId`], with the query surface site adapters need (a CSS selector
//! subset), HTML fragment parsing/serialisation for rich text regions, and
//! subtree [`MutationObserver`]s that report inserted nodes.

mod document;
mod errors;
mod html;
mod mutation;
mod node;
mod selector;

pub use document::{Document, Location};
pub use errors::DomError;
pub use mutation::{MutationObserver, MutationRecord};
pub use node::NodeId;
pub use selector::SelectorList;
