use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use recast_core_types::{BehaviorMode, ExtensionState, RewriteMode};
use serde::Serialize;
use serde_json::to_writer_pretty;
use tokio::sync::broadcast;
use tracing::debug;

/// One published transition of the extension state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub seq: u64,
    pub previous: ExtensionState,
    pub current: ExtensionState,
    pub recorded_at_ms: u64,
}

impl StateChange {
    pub fn behavior_changed(&self) -> bool {
        self.previous.behavior_mode != self.current.behavior_mode
    }

    pub fn rewrite_mode_changed(&self) -> bool {
        self.previous.rewrite_mode != self.current.rewrite_mode
    }

    pub fn activity_changed(&self) -> bool {
        self.previous.activity() != self.current.activity()
    }
}

/// Read side of the extension state, as seen by the content pipeline.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn get_state(&self) -> ExtensionState;

    /// Receiver of every change published after this call.
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StateCenterStats {
    pub published: u64,
    pub ignored_writes: u64,
    pub behavior_flips: u64,
    pub mode_changes: u64,
}

#[derive(Debug)]
struct BoundedRing<T> {
    capacity: usize,
    data: VecDeque<T>,
}

impl<T> BoundedRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: VecDeque::new(),
        }
    }
}

impl<T: Clone> BoundedRing<T> {
    fn push(&mut self, item: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    fn snapshot(&self) -> Vec<T> {
        self.data.iter().cloned().collect()
    }
}

#[derive(Serialize)]
struct StateCenterSnapshot {
    state: ExtensionState,
    stats: StateCenterStats,
    changes: Vec<StateChange>,
}

struct Inner {
    state: ExtensionState,
    seq: u64,
    history: BoundedRing<StateChange>,
    stats: StateCenterStats,
}

/// In-memory owner of the extension state.
///
/// Writers go through the setters; every write that actually changes the
/// state publishes exactly one [`StateChange`]. Writes that leave the state
/// as it was publish nothing.
pub struct InMemoryStateCenter {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<StateChange>,
}

impl InMemoryStateCenter {
    pub fn new(initial: ExtensionState, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                state: initial,
                seq: 0,
                history: BoundedRing::new(capacity),
                stats: StateCenterStats::default(),
            }),
            sender,
        })
    }

    pub fn current(&self) -> ExtensionState {
        self.inner.lock().state.clone()
    }

    /// Applies `edit` and publishes the change, if any.
    pub fn update(&self, edit: impl FnOnce(&mut ExtensionState)) -> Option<StateChange> {
        let change = {
            let mut inner = self.inner.lock();
            let previous = inner.state.clone();
            edit(&mut inner.state);
            if inner.state == previous {
                inner.stats.ignored_writes += 1;
                return None;
            }
            inner.seq += 1;
            let change = StateChange {
                seq: inner.seq,
                previous,
                current: inner.state.clone(),
                recorded_at_ms: now_ms(),
            };
            inner.stats.published += 1;
            if change.behavior_changed() {
                inner.stats.behavior_flips += 1;
            }
            if change.rewrite_mode_changed() {
                inner.stats.mode_changes += 1;
            }
            inner.history.push(change.clone());
            change
        };
        debug!(
            seq = change.seq,
            enabled = change.current.enabled,
            behavior = %change.current.behavior_mode,
            mode = %change.current.rewrite_mode,
            model_loaded = change.current.model_loaded,
            "state changed"
        );
        // No receivers is fine: nobody is listening yet.
        let _ = self.sender.send(change.clone());
        Some(change)
    }

    pub fn set_enabled(&self, enabled: bool) -> Option<StateChange> {
        self.update(|state| state.enabled = enabled)
    }

    pub fn set_rewrite_mode(&self, mode: RewriteMode) -> Option<StateChange> {
        self.update(|state| state.rewrite_mode = mode)
    }

    pub fn set_behavior_mode(&self, behavior: BehaviorMode) -> Option<StateChange> {
        self.update(|state| state.behavior_mode = behavior)
    }

    pub fn set_model_loaded(&self, loaded: bool) -> Option<StateChange> {
        self.update(|state| {
            state.model_loaded = loaded;
            if loaded {
                state.is_initializing = false;
            }
        })
    }

    pub fn set_initializing(&self, initializing: bool) -> Option<StateChange> {
        self.update(|state| state.is_initializing = initializing)
    }

    pub fn replace(&self, next: ExtensionState) -> Option<StateChange> {
        self.update(|state| *state = next)
    }

    pub fn recent_changes(&self) -> Vec<StateChange> {
        self.inner.lock().history.snapshot()
    }

    pub fn stats(&self) -> StateCenterStats {
        self.inner.lock().stats.clone()
    }

    pub fn write_snapshot<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let snapshot = {
            let inner = self.inner.lock();
            StateCenterSnapshot {
                state: inner.state.clone(),
                stats: inner.stats.clone(),
                changes: inner.history.snapshot(),
            }
        };
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, &snapshot)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl StateProvider for InMemoryStateCenter {
    async fn get_state(&self) -> ExtensionState {
        self.current()
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}
