//! Post discovery.
//!
//! [`PostScanner`] walks the page through the active [`SiteAdapter`] and hands
//! every valid post to the `on_new_post` callback at most once per seen-set
//! epoch. [`PostScanner::setup_observer`] keeps discovering posts as the page
//! inserts them (infinite scroll); [`PostScanner::reset`] starts a new epoch.
//!
//! Adapter failures are not caught here: they propagate out of
//! `scan_for_posts`, and the observer task reports them at `error` level.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use page_dom::{MutationObserver, MutationRecord, NodeId};
use parking_lot::Mutex;
use recast_core_types::PostId;
use site_adapters::{AdapterError, SiteAdapter};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// A post handed to the scanner's callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredPost {
    pub id: PostId,
    pub element: NodeId,
}

pub type NewPostCallback = Arc<dyn Fn(DiscoveredPost) + Send + Sync>;

struct ObserverTask {
    generation: u64,
    handle: JoinHandle<()>,
}

struct ScannerInner {
    adapter: Arc<dyn SiteAdapter>,
    on_new_post: NewPostCallback,
    seen: Mutex<HashSet<PostId>>,
    observer: Mutex<Option<ObserverTask>>,
    generation: AtomicU64,
}

/// Cheap to clone; clones share the seen set and the observer.
#[derive(Clone)]
pub struct PostScanner {
    inner: Arc<ScannerInner>,
}

impl PostScanner {
    pub fn new(adapter: Arc<dyn SiteAdapter>, on_new_post: NewPostCallback) -> Self {
        Self {
            inner: Arc::new(ScannerInner {
                adapter,
                on_new_post,
                seen: Mutex::new(HashSet::new()),
                observer: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn adapter(&self) -> &Arc<dyn SiteAdapter> {
        &self.inner.adapter
    }

    /// Offers every valid, unseen post on the page, in document order.
    /// Returns how many posts were delivered.
    pub fn scan_for_posts(&self) -> Result<usize, AdapterError> {
        let adapter = &self.inner.adapter;
        let mut delivered = 0;
        for element in adapter.post_elements()? {
            if self.inner.offer(element)? {
                delivered += 1;
            }
        }
        debug!(site = adapter.site_name(), delivered, "scan finished");
        Ok(delivered)
    }

    /// Applies one batch of mutation records; returns how many posts were delivered.
    pub fn process_mutations(&self, batch: &[MutationRecord]) -> Result<usize, AdapterError> {
        self.inner.process_mutations(batch)
    }

    /// Starts watching the page body, replacing any observer already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn setup_observer(&self) -> Result<(), AdapterError> {
        self.disconnect();
        let doc = self.inner.adapter.document();
        let observer = doc.observe(doc.body())?;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(observe_loop(
            Arc::downgrade(&self.inner),
            observer,
            generation,
        ));
        *self.inner.observer.lock() = Some(ObserverTask { generation, handle });
        debug!(generation, "mutation observer started");
        Ok(())
    }

    /// Stops observing. Safe to call when no observer is running.
    pub fn disconnect(&self) {
        // Batches already in flight are dropped by the generation check.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.inner.observer.lock().take() {
            task.handle.abort();
            debug!(generation = task.generation, "mutation observer stopped");
        }
    }

    pub fn is_observing(&self) -> bool {
        self.inner.observer.lock().is_some()
    }

    /// Forgets every delivered post so the next scan offers them again.
    pub fn reset(&self) {
        let cleared = {
            let mut seen = self.inner.seen.lock();
            let count = seen.len();
            seen.clear();
            count
        };
        debug!(cleared, "scanner seen set reset");
    }

    /// Drops one post from the seen set so the next scan offers it again.
    pub fn forget(&self, id: &PostId) -> bool {
        let forgotten = self.inner.seen.lock().remove(id);
        if forgotten {
            trace!(post_id = %id, "post forgotten");
        }
        forgotten
    }

    pub fn seen_count(&self) -> usize {
        self.inner.seen.lock().len()
    }
}

impl ScannerInner {
    /// Seen-id gate shared by scans and mutation batches.
    fn offer(&self, element: NodeId) -> Result<bool, AdapterError> {
        if !self.adapter.is_valid_post(element)? {
            trace!(element = %element, "candidate rejected");
            return Ok(false);
        }
        let id = self.adapter.post_id(element)?;
        if !self.seen.lock().insert(id.clone()) {
            return Ok(false);
        }
        debug!(post_id = %id, element = %element, "new post discovered");
        (self.on_new_post)(DiscoveredPost { id, element });
        Ok(true)
    }

    fn process_mutations(&self, batch: &[MutationRecord]) -> Result<usize, AdapterError> {
        let doc = self.adapter.document();
        let mut delivered = 0;
        for record in batch {
            for &added in &record.added {
                // Replaced or removed again before this batch was handled.
                if !doc.is_element(added) || !doc.is_connected(added) {
                    continue;
                }
                if self.offer(added)? {
                    delivered += 1;
                }
                // Wrappers may carry several posts at once.
                for post in self.adapter.post_elements()? {
                    if post != added && doc.contains(added, post) && self.offer(post)? {
                        delivered += 1;
                    }
                }
            }
        }
        Ok(delivered)
    }
}

async fn observe_loop(inner: Weak<ScannerInner>, mut observer: MutationObserver, generation: u64) {
    while let Some(batch) = observer.next_batch().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if inner.generation.load(Ordering::SeqCst) != generation {
            break;
        }
        match inner.process_mutations(&batch) {
            Ok(0) => {}
            Ok(delivered) => debug!(delivered, "posts discovered from mutations"),
            Err(err) => error!(error = %err, "adapter failed while processing mutations"),
        }
    }
    trace!(observer = observer.id(), "observer loop exited");
}
