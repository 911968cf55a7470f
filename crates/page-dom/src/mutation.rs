use std::sync::Weak;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::node::{NodeId, Tree};

/// Nodes inserted under `target` by a single tree operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added: Vec<NodeId>,
}

/// Subscription to child-list mutations inside one subtree.
///
/// Delivery stops when the observer is disconnected or dropped.
pub struct MutationObserver {
    id: u64,
    receiver: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
    tree: Weak<RwLock<Tree>>,
}

impl MutationObserver {
    pub(crate) fn new(
        id: u64,
        receiver: mpsc::UnboundedReceiver<Vec<MutationRecord>>,
        tree: Weak<RwLock<Tree>>,
    ) -> Self {
        Self { id, receiver, tree }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next batch; `None` once the document is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        self.receiver.recv().await
    }

    /// Returns a batch that is already queued, if any.
    pub fn try_next_batch(&mut self) -> Option<Vec<MutationRecord>> {
        self.receiver.try_recv().ok()
    }

    pub fn disconnect(self) {}
}

impl Drop for MutationObserver {
    fn drop(&mut self) {
        if let Some(tree) = self.tree.upgrade() {
            tree.write().observers.retain(|slot| slot.id != self.id);
        }
    }
}
