//! Rewrite sequencer for auto mode.
//!
//! Posts are processed strictly in enqueue order, one at a time: the next
//! item starts only after the current one's processor future has settled.
//! A failing or panicking item is logged and the queue moves on.
//!
//! [`RewriteQueue::clear`] drops pending items and frees the single-flight
//! slot without waiting for the item in flight. That item's completion
//! belongs to an older epoch and leaves the queue's state alone.

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use page_dom::NodeId;
use parking_lot::Mutex;
use recast_core_types::PostId;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedPost {
    pub id: PostId,
    pub element: NodeId,
}

/// Work performed for each dequeued post.
#[async_trait]
pub trait PostProcessor: Send + Sync + 'static {
    type Error: fmt::Display + Send;

    async fn process(&self, post: QueuedPost) -> Result<(), Self::Error>;
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueuedPost>,
    processing: bool,
    epoch: u64,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        !self.processing && self.items.is_empty()
    }
}

struct Shared<P> {
    state: Mutex<QueueState>,
    processor: Arc<P>,
    idle: Notify,
}

pub struct RewriteQueue<P: PostProcessor> {
    shared: Arc<Shared<P>>,
}

impl<P: PostProcessor> Clone for RewriteQueue<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: PostProcessor> RewriteQueue<P> {
    pub fn new(processor: Arc<P>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                processor,
                idle: Notify::new(),
            }),
        }
    }

    /// Appends a post unless it is already waiting; returns whether it was added.
    /// Draining starts immediately when nothing is in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, id: PostId, element: NodeId) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.items.iter().any(|item| item.id == id) {
                debug!(post_id = %id, "post already queued");
                return false;
            }
            state.items.push_back(QueuedPost { id: id.clone(), element });
            debug!(post_id = %id, queued = state.items.len(), "post queued");
        }
        Shared::drain(&self.shared);
        true
    }

    /// Empties the queue and frees the in-flight slot. The running item, if
    /// any, is not cancelled.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            let dropped = state.items.len();
            state.items.clear();
            state.processing = false;
            state.epoch += 1;
            dropped
        };
        debug!(dropped, "rewrite queue cleared");
        self.shared.idle.notify_waiters();
    }

    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().processing
    }

    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_queued(&self, id: &PostId) -> bool {
        self.shared.state.lock().items.iter().any(|item| &item.id == id)
    }

    /// Resolves once nothing is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.state.lock().is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl<P: PostProcessor> Shared<P> {
    fn drain(shared: &Arc<Self>) {
        let (post, epoch) = {
            let mut state = shared.state.lock();
            if state.processing {
                return;
            }
            let Some(post) = state.items.pop_front() else {
                return;
            };
            state.processing = true;
            (post, state.epoch)
        };

        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            let id = post.id.clone();
            if shared.state.lock().epoch != epoch {
                debug!(post_id = %id, "queue cleared before post started");
                return;
            }
            debug!(post_id = %id, "processing queued post");
            let outcome = AssertUnwindSafe(shared.processor.process(post))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => debug!(post_id = %id, "queued post processed"),
                Ok(Err(err)) => warn!(post_id = %id, error = %err, "queued post failed"),
                Err(_) => error!(post_id = %id, "queued post processor panicked"),
            }

            let idle = {
                let mut state = shared.state.lock();
                if state.epoch != epoch {
                    debug!(post_id = %id, "queue cleared while post was in flight");
                    return;
                }
                state.processing = false;
                state.items.is_empty()
            };
            if idle {
                shared.idle.notify_waiters();
            } else {
                Shared::drain(&shared);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        fail: Vec<&'static str>,
        panic_on: Vec<&'static str>,
        delay_ms: u64,
    }

    #[async_trait]
    impl PostProcessor for Recorder {
        type Error = String;

        async fn process(&self, post: QueuedPost) -> Result<(), String> {
            let id = post.id.as_str().to_string();
            self.events.lock().push(format!("start {id}"));
            sleep(Duration::from_millis(self.delay_ms)).await;
            if self.panic_on.contains(&id.as_str()) {
                panic!("processor blew up on {id}");
            }
            self.events.lock().push(format!("end {id}"));
            if self.fail.contains(&id.as_str()) {
                return Err(format!("{id} failed"));
            }
            Ok(())
        }
    }

    fn queue(recorder: Recorder) -> (RewriteQueue<Recorder>, Arc<Recorder>) {
        let recorder = Arc::new(recorder);
        (RewriteQueue::new(recorder.clone()), recorder)
    }

    fn push(queue: &RewriteQueue<Recorder>, id: &str, node: u64) -> bool {
        queue.enqueue(PostId::from(id), NodeId(node))
    }

    #[tokio::test(start_paused = true)]
    async fn processes_fifo_one_at_a_time() {
        let (queue, recorder) = queue(Recorder {
            delay_ms: 50,
            ..Default::default()
        });
        push(&queue, "a", 1);
        push(&queue, "b", 2);
        push(&queue, "c", 3);
        queue.wait_idle().await;

        assert_eq!(
            *recorder.events.lock(),
            ["start a", "end a", "start b", "end b", "start c", "end c"]
        );
        assert!(!queue.is_processing());
        assert_eq!(queue.queue_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_enqueue_is_ignored() {
        let (queue, recorder) = queue(Recorder {
            delay_ms: 10,
            ..Default::default()
        });
        assert!(push(&queue, "a", 1));
        assert!(push(&queue, "b", 2));
        assert!(!push(&queue, "b", 2));
        assert!(queue.is_queued(&PostId::from("b")));
        queue.wait_idle().await;
        let starts = recorder
            .events
            .lock()
            .iter()
            .filter(|event| event.as_str() == "start b")
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_and_panics_do_not_stall_the_queue() {
        let (queue, recorder) = queue(Recorder {
            delay_ms: 5,
            fail: vec!["a"],
            panic_on: vec!["b"],
            ..Default::default()
        });
        push(&queue, "a", 1);
        push(&queue, "b", 2);
        push(&queue, "c", 3);
        queue.wait_idle().await;

        let events = recorder.events.lock().clone();
        assert_eq!(events, ["start a", "end a", "start b", "start c", "end c"]);
        assert!(!queue.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_frees_the_slot_without_cancelling() {
        let (queue, recorder) = queue(Recorder {
            delay_ms: 100,
            ..Default::default()
        });
        push(&queue, "a", 1);
        push(&queue, "b", 2);
        sleep(Duration::from_millis(10)).await;
        assert!(queue.is_processing());
        assert_eq!(queue.queue_len(), 1);

        queue.clear();
        assert!(!queue.is_processing());
        assert_eq!(queue.queue_len(), 0);

        // A fresh item starts right away, alongside the stale one.
        push(&queue, "c", 3);
        sleep(Duration::from_millis(10)).await;
        assert!(queue.is_processing());

        // The stale completion must not release the slot held by "c".
        sleep(Duration::from_millis(85)).await;
        assert!(recorder.events.lock().contains(&"end a".to_string()));
        assert!(queue.is_processing());

        queue.wait_idle().await;
        let events = recorder.events.lock().clone();
        assert!(!events.contains(&"start b".to_string()));
        assert!(events.contains(&"end c".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_before_start_drops_the_dequeued_item() {
        let (queue, recorder) = queue(Recorder::default());
        push(&queue, "a", 1);
        queue.clear();
        sleep(Duration::from_millis(10)).await;
        queue.wait_idle().await;
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_empty() {
        let (queue, _) = queue(Recorder::default());
        queue.wait_idle().await;
        assert!(!queue.is_processing());
    }
}
