//! Recast library
//!
//! Content-side rewrite pipeline: the orchestrator plus configuration, with
//! the component crates re-exported for integration testing.

pub mod config;
pub mod errors;
pub mod orchestrator;

pub use config::{load_config, LoadedConfig, RecastConfig};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{ContentOrchestrator, PostStatus, WidgetStatus};

pub use page_dom;
pub use post_scanner;
pub use post_ui;
pub use recast_core_types as core_types;
pub use recast_state_center as state_center;
pub use rewrite_queue;
pub use rewrite_service;
pub use site_adapters;
pub use text_replacer;
