//! Rewrite service
//!
//! Contract between the content pipeline and the model layer:
//! - [`RewriteService`]: what the pipeline calls (`text`, post id, platform in;
//!   rewritten text out)
//! - [`RewriteClient`]: the content-side implementation, with mode lookup and
//!   a bounded wait
//! - [`RewriteBackend`]: one model round trip for a [`RewriteRequest`]
//! - [`PromptBackend`]: renders the prompt, calls a [`TextCompletion`] engine
//!   and cleans the answer

pub mod backend;
pub mod client;
pub mod errors;
pub mod prompts;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use recast_core_types::{PostId, RewriteMode};
use serde::{Deserialize, Serialize};

pub use backend::{clean_response, CompletionParams, EchoCompletion, PromptBackend, TextCompletion};
pub use client::RewriteClient;
pub use errors::RewriteError;
pub use prompts::build_prompt;

/// Reference wait before a pending rewrite is rejected.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Request envelope for one rewrite round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRequest {
    pub request_id: String,
    pub post_id: PostId,
    pub text: String,
    pub mode: RewriteMode,
    pub platform: Option<String>,
    pub deadline_ms: u64,
}

impl RewriteRequest {
    /// Request ids are `"{post_id}-{unix millis}"`.
    pub fn new(
        post_id: PostId,
        text: impl Into<String>,
        mode: RewriteMode,
        platform: Option<String>,
        deadline_ms: u64,
    ) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis())
            .unwrap_or(0);
        Self {
            request_id: format!("{post_id}-{millis}"),
            post_id,
            text: text.into(),
            mode,
            platform,
            deadline_ms,
        }
    }
}

#[async_trait]
pub trait RewriteService: Send + Sync {
    async fn rewrite(
        &self,
        text: &str,
        post_id: &PostId,
        platform: Option<&str>,
    ) -> Result<String, RewriteError>;
}

#[async_trait]
pub trait RewriteBackend: Send + Sync {
    async fn complete_rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError>;
}
