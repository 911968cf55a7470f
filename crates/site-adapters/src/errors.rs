//! Error types for site adapters

use page_dom::DomError;
use thiserror::Error;

/// Adapter error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// No adapter claims the current page
    #[error("no site adapter matches {0}")]
    Unavailable(String),

    /// Capability is stubbed for the current rollout phase
    #[error("{site} adapter does not implement {capability} yet")]
    NotImplemented {
        site: &'static str,
        capability: &'static str,
    },

    /// Page operation failed
    #[error(transparent)]
    Dom(#[from] DomError),
}

impl AdapterError {
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, AdapterError::NotImplemented { .. })
    }
}
