//! Recording Platform
//!
//! A [`Platform`] that appends every mutation to a shared log. Clones
//! share the same log, so a test can keep one clone and hand the other to
//! the engine, then assert on exactly what the engine did.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Mutation, Platform};

/// Platform that records every mutation it is asked to apply.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = Recorder::new();
/// let engine = Engine::builder().platform(recorder.clone()).build();
/// // ... drive the engine ...
/// assert!(recorder.mutations().iter().any(|m| matches!(m, Mutation::SetRoot { .. })));
/// ```
#[derive(Debug, Default, Clone)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Mutation>>>,
}

impl Recorder {
    /// Create a recorder with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the mutations recorded so far.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.lock().clone()
    }

    /// Number of mutations recorded so far.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Forget everything recorded so far.
    ///
    /// Typical pattern: mount, clear, diff, then assert on the diff's
    /// mutations alone.
    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl Platform for Recorder {
    fn apply(&mut self, mutation: Mutation) {
        self.log.lock().push(mutation);
    }
}
