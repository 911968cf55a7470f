use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use recast_core_types::PostId;
use recast_state_center::StateProvider;
use tracing::{debug, trace, warn};

use crate::errors::RewriteError;
use crate::{RewriteBackend, RewriteRequest, RewriteService, DEFAULT_TIMEOUT_MS};

/// Content-side rewrite client.
///
/// Resolves the current rewrite mode from the state provider, refuses while
/// the model is not loaded, and bounds every round trip with a timeout.
/// Concurrent calls are not serialized.
pub struct RewriteClient {
    state: Arc<dyn StateProvider>,
    backend: Arc<dyn RewriteBackend>,
    timeout: Duration,
    // Keyed by a per-client sequence: request ids can repeat within a millisecond.
    pending: DashMap<u64, PendingRequest>,
    next_seq: AtomicU64,
}

#[derive(Debug)]
struct PendingRequest {
    request_id: String,
    post_id: PostId,
}

impl RewriteClient {
    pub fn new(state: Arc<dyn StateProvider>, backend: Arc<dyn RewriteBackend>) -> Self {
        Self {
            state,
            backend,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            pending: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Requests currently awaiting the backend.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

/// Drops the pending entry however the request ends, including when the
/// caller stops polling.
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, PendingRequest>,
    seq: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some((_, request)) = self.pending.remove(&self.seq) {
            trace!(
                request_id = %request.request_id,
                post_id = %request.post_id,
                "pending request released"
            );
        }
    }
}

#[async_trait]
impl RewriteService for RewriteClient {
    async fn rewrite(
        &self,
        text: &str,
        post_id: &PostId,
        platform: Option<&str>,
    ) -> Result<String, RewriteError> {
        let state = self.state.get_state().await;
        if !state.model_loaded {
            return Err(RewriteError::ModelNotLoaded);
        }

        let after_ms = self.timeout.as_millis() as u64;
        let request = RewriteRequest::new(
            post_id.clone(),
            text,
            state.rewrite_mode,
            platform.map(str::to_string),
            after_ms,
        );
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(
            seq,
            PendingRequest {
                request_id: request.request_id.clone(),
                post_id: post_id.clone(),
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            seq,
        };
        debug!(
            request_id = %request.request_id,
            mode = %request.mode,
            platform = request.platform.as_deref().unwrap_or("-"),
            "rewrite requested"
        );

        match tokio::time::timeout(self.timeout, self.backend.complete_rewrite(&request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(request_id = %request.request_id, after_ms, "rewrite request timed out");
                Err(RewriteError::Timeout { after_ms })
            }
        }
    }
}
