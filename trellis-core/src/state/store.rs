//! State Store Implementation
//!
//! Values live in per-scope buckets so releasing a component is a single
//! bucket drop. Persisted entries are mirrored under a `state:`-prefixed
//! key in the persistent storage collaborator; the mirror deliberately
//! outlives the scope, and a later read of the same key from any scope
//! hydrates from it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{trace, warn};

use crate::storage::Storage;
use crate::tree::NodeId;

/// Prefix for mirrored entries, keeping them apart from direct storage use.
const MIRROR_PREFIX: &str = "state:";

fn mirror_key(key: &str) -> String {
    format!("{MIRROR_PREFIX}{key}")
}

/// When a state entry stops being readable.
#[derive(Debug, Clone, Copy, Default)]
pub enum Expiry {
    /// The entry lives as long as its scope.
    #[default]
    Never,

    /// The entry expires this long after it is written.
    After(Duration),

    /// The entry expires at the given instant.
    At(Instant),
}

/// Write options for a state entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateOptions {
    /// Expiry policy. Defaults to [`Expiry::Never`].
    pub expiry: Expiry,

    /// Mirror the value into persistent storage so it survives a
    /// runtime restart.
    pub persist: bool,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    persist: bool,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Keyed JSON values scoped to the component that wrote them.
#[derive(Debug, Default)]
pub struct StateStore {
    scopes: HashMap<NodeId, HashMap<String, Entry>>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an entry for `(scope, key)`.
    ///
    /// A persisted entry is mirrored into `persistent` as well; mirror
    /// write failures are logged and the in-memory write still happens.
    pub fn set(
        &mut self,
        scope: NodeId,
        key: impl Into<String>,
        value: Value,
        options: StateOptions,
        persistent: &dyn Storage,
    ) {
        let key = key.into();
        let expires_at = match options.expiry {
            Expiry::Never => None,
            Expiry::After(duration) => Some(Instant::now() + duration),
            Expiry::At(at) => Some(at),
        };

        if options.persist {
            if let Err(err) = persistent.set(&mirror_key(&key), value.clone()) {
                warn!(%err, key, "state entry could not be persisted");
            }
        }

        self.scopes.entry(scope).or_default().insert(
            key,
            Entry { value, expires_at, persist: options.persist },
        );
    }

    /// Read the entry for `(scope, key)`.
    ///
    /// An expired entry reads as absent and is dropped on the spot. On a
    /// memory miss the persistent mirror is consulted; a hit hydrates the
    /// scope so later reads stay in memory.
    pub fn get(&mut self, scope: NodeId, key: &str, persistent: &dyn Storage) -> Option<Value> {
        let now = Instant::now();
        let expired = match self.scopes.get(&scope).and_then(|bucket| bucket.get(key)) {
            Some(entry) if entry.expired(now) => true,
            Some(entry) => return Some(entry.value.clone()),
            None => false,
        };
        if expired {
            self.remove(scope, key, persistent);
            return None;
        }

        let value = persistent.get(&mirror_key(key))?;
        self.scopes.entry(scope).or_default().insert(
            key.to_string(),
            Entry { value: value.clone(), expires_at: None, persist: true },
        );
        Some(value)
    }

    /// Delete the entry for `(scope, key)` and its persistent mirror.
    pub fn remove(&mut self, scope: NodeId, key: &str, persistent: &dyn Storage) {
        if let Some(bucket) = self.scopes.get_mut(&scope) {
            bucket.remove(key);
            if bucket.is_empty() {
                self.scopes.remove(&scope);
            }
        }
        persistent.remove(&mirror_key(key));
    }

    /// Drop every entry belonging to `scope`.
    ///
    /// Persistent mirrors are kept: surviving a scope is what persistence
    /// is for. Called when a component leaves the tree.
    pub fn remove_scope(&mut self, scope: NodeId) {
        self.scopes.remove(&scope);
    }

    /// Per-frame sweep: drop buckets of dead scopes and expired entries.
    ///
    /// Expired persisted entries lose their mirror too.
    pub fn cleanup(
        &mut self,
        is_live: impl Fn(NodeId) -> bool,
        now: Instant,
        persistent: &dyn Storage,
    ) {
        let before = self.len();
        self.scopes.retain(|scope, bucket| {
            if !is_live(*scope) {
                return false;
            }
            bucket.retain(|key, entry| {
                if entry.expired(now) {
                    if entry.persist {
                        persistent.remove(&mirror_key(key));
                    }
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        let dropped = before - self.len();
        if dropped > 0 {
            trace!(dropped, "swept state entries");
        }
    }

    /// Total number of in-memory entries.
    pub fn len(&self) -> usize {
        self.scopes.values().map(HashMap::len).sum()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
