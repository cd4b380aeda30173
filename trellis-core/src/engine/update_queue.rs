//! Update Queue
//!
//! The queue of component scopes waiting to re-render. Marking a scope
//! dirty any number of times within a frame costs one entry; the frame
//! flush takes a snapshot and re-renders each scope exactly once.
//!
//! Entries keep insertion order so re-renders within a frame happen in
//! the order they were requested.

use indexmap::IndexSet;
use tracing::trace;

use crate::tree::NodeId;

/// Deduplicating queue of dirty component scopes.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    pending: IndexSet<NodeId>,
}

impl UpdateQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a scope dirty. Returns whether it was newly marked.
    pub fn add(&mut self, scope: NodeId) -> bool {
        let inserted = self.pending.insert(scope);
        if inserted {
            trace!(%scope, "scope marked dirty");
        }
        inserted
    }

    /// Clear a scope's dirty mark, if any.
    ///
    /// Called after the scope re-rendered, and when it leaves the tree.
    pub fn done(&mut self, scope: NodeId) {
        self.pending.shift_remove(&scope);
    }

    /// The scopes currently marked, in marking order.
    ///
    /// The flush iterates this snapshot while calling
    /// [`done`](Self::done) per scope, so marks added during the flush
    /// (including a scope re-marking itself mid-render) land in the next
    /// frame instead of extending the current one.
    pub fn snapshot(&self) -> Vec<NodeId> {
        self.pending.iter().copied().collect()
    }

    /// Whether a scope is currently marked.
    pub fn contains(&self, scope: NodeId) -> bool {
        self.pending.contains(&scope)
    }

    /// Number of marked scopes.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no scope is marked.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
