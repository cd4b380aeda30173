//! Storage Collaborators
//!
//! Persistent and session storage are host capabilities: a browser host
//! backs them with `localStorage`/`sessionStorage`, a native host with a
//! file or a keychain. The engine only needs the small capability
//! interface defined here, and falls back to [`MemoryStorage`] when the
//! host provides nothing.
//!
//! Values are JSON. The typed get/set layer lives on
//! [`Context`](crate::engine::Context); storage itself moves
//! [`Value`]s around without interpreting them.

use dashmap::DashMap;
use serde_json::Value;

use crate::error::StorageError;

/// A keyed JSON store.
///
/// Implementations are shared (`Arc<dyn Storage>`) and may be hit from
/// spawned work, so they must synchronize internally.
pub trait Storage: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a value.
    ///
    /// Real backends can refuse writes (quota); callers that treat
    /// storage as best-effort log and continue.
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is a no-op.
    fn remove(&self, key: &str);

    /// Delete every value.
    fn clear(&self);

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory [`Storage`], the fallback when the host provides none.
///
/// Contents do not survive the process; "persistent" state stored here
/// lasts exactly as long as the runtime does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Value>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
