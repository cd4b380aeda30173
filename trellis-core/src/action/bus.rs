//! Action Bus
//!
//! The bus is a registry from action name to scope-bound callbacks. It
//! performs no execution itself: [`ActionBus::post`] looks up the
//! matching registrations and hands each one to a routing closure, and
//! the engine decides how to run it (queued on the runtime thread for
//! serial callbacks, spawned for concurrent ones). Keeping the bus
//! execution-free makes its behavior fully checkable without a running
//! engine.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::engine::{Context, Handle};
use crate::tree::NodeId;

/// A named payload posted through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Name the payload is posted under.
    pub name: String,

    /// Arbitrary JSON payload. `Value::Null` for payload-free actions.
    pub arg: Value,
}

impl Action {
    /// Create an action.
    pub fn new(name: impl Into<String>, arg: Value) -> Self {
        Self { name: name.into(), arg }
    }
}

/// Callback running on the runtime thread.
pub type SerialHandler = Arc<dyn Fn(&mut Context<'_>, &Action) + Send + Sync>;

/// Callback running off the runtime thread.
pub type ConcurrentHandler = Arc<dyn Fn(Handle, Action) + Send + Sync>;

/// How a registration wants its action delivered.
#[derive(Clone)]
pub enum ActionCallback {
    /// Run on the runtime thread, in posting order.
    Serial(SerialHandler),

    /// Run on a worker, free to block.
    Concurrent(ConcurrentHandler),
}

impl ActionCallback {
    /// Wrap a serial callback.
    pub fn serial(f: impl Fn(&mut Context<'_>, &Action) + Send + Sync + 'static) -> Self {
        ActionCallback::Serial(Arc::new(f))
    }

    /// Wrap a concurrent callback.
    pub fn concurrent(f: impl Fn(Handle, Action) + Send + Sync + 'static) -> Self {
        ActionCallback::Concurrent(Arc::new(f))
    }
}

impl fmt::Debug for ActionCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionCallback::Serial(_) => f.write_str("Serial"),
            ActionCallback::Concurrent(_) => f.write_str("Concurrent"),
        }
    }
}

#[derive(Debug)]
struct Registration {
    scope: NodeId,
    callback: ActionCallback,
}

/// Registry from action name to scope-bound callbacks.
#[derive(Debug, Default)]
pub struct ActionBus {
    handlers: IndexMap<String, Vec<Registration>>,
}

impl ActionBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `name`, bound to `scope`.
    ///
    /// Re-registering the same `(name, scope)` pair replaces the previous
    /// callback, so components can safely register from `render`.
    pub fn handle(&mut self, name: impl Into<String>, scope: NodeId, callback: ActionCallback) {
        let registrations = self.handlers.entry(name.into()).or_default();
        match registrations.iter_mut().find(|r| r.scope == scope) {
            Some(existing) => existing.callback = callback,
            None => registrations.push(Registration { scope, callback }),
        }
    }

    /// Look up every registration matching the action's name and hand it
    /// to `route`, in registration order.
    ///
    /// Posting a name nobody registered is a silent no-op.
    pub fn post(&self, action: &Action, mut route: impl FnMut(NodeId, ActionCallback)) {
        let Some(registrations) = self.handlers.get(&action.name) else {
            trace!(action = %action.name, "no handler registered, action dropped");
            return;
        };
        for registration in registrations {
            route(registration.scope, registration.callback.clone());
        }
    }

    /// Drop every registration bound to `scope`.
    ///
    /// Called when a component leaves the tree.
    pub fn remove_scope(&mut self, scope: NodeId) {
        self.handlers.retain(|_, registrations| {
            registrations.retain(|r| r.scope != scope);
            !registrations.is_empty()
        });
    }

    /// Drop every registration whose scope is no longer live.
    ///
    /// The per-frame backstop behind [`remove_scope`](Self::remove_scope).
    pub fn cleanup(&mut self, is_live: impl Fn(NodeId) -> bool) {
        let before = self.registration_count();
        self.handlers.retain(|_, registrations| {
            registrations.retain(|r| is_live(r.scope));
            !registrations.is_empty()
        });
        let dropped = before - self.registration_count();
        if dropped > 0 {
            trace!(dropped, "released action handlers for dead scopes");
        }
    }

    /// Number of callbacks registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.handlers.get(name).map_or(0, Vec::len)
    }

    /// Total number of registrations across all names.
    pub fn registration_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// Whether the bus has no registrations.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope(raw: u64) -> NodeId {
        NodeId::from_raw(raw)
    }

    fn noop_serial() -> ActionCallback {
        ActionCallback::serial(|_ctx, _action| {})
    }

    #[test]
    fn posting_an_unregistered_name_routes_nothing() {
        let bus = ActionBus::new();
        let mut routed = 0;
        bus.post(&Action::new("unknown", Value::Null), |_, _| routed += 1);
        assert_eq!(routed, 0);
    }

    #[test]
    fn post_fans_out_to_every_registration_in_order() {
        let mut bus = ActionBus::new();
        bus.handle("refresh", scope(1), noop_serial());
        bus.handle("refresh", scope(2), noop_serial());
        bus.handle("refresh", scope(3), ActionCallback::concurrent(|_handle, _action| {}));
        bus.handle("other", scope(4), noop_serial());

        let mut routed = Vec::new();
        bus.post(&Action::new("refresh", json!(42)), |scope, _cb| routed.push(scope));

        assert_eq!(routed, vec![scope(1), scope(2), scope(3)]);
    }

    #[test]
    fn reregistering_the_same_scope_replaces_the_callback() {
        let mut bus = ActionBus::new();
        bus.handle("save", scope(1), noop_serial());
        bus.handle("save", scope(1), ActionCallback::concurrent(|_handle, _action| {}));

        assert_eq!(bus.handler_count("save"), 1);

        let mut flavors = Vec::new();
        bus.post(&Action::new("save", Value::Null), |_, cb| {
            flavors.push(format!("{cb:?}"));
        });
        assert_eq!(flavors, vec!["Concurrent".to_string()]);
    }

    #[test]
    fn remove_scope_releases_only_that_scope() {
        let mut bus = ActionBus::new();
        bus.handle("refresh", scope(1), noop_serial());
        bus.handle("refresh", scope(2), noop_serial());
        bus.handle("save", scope(1), noop_serial());

        bus.remove_scope(scope(1));

        assert_eq!(bus.handler_count("refresh"), 1);
        assert_eq!(bus.handler_count("save"), 0);
        assert_eq!(bus.registration_count(), 1);
    }

    #[test]
    fn cleanup_drops_dead_scopes_and_empty_names() {
        let mut bus = ActionBus::new();
        bus.handle("a", scope(1), noop_serial());
        bus.handle("a", scope(2), noop_serial());
        bus.handle("b", scope(2), noop_serial());

        bus.cleanup(|s| s == scope(1));

        assert_eq!(bus.registration_count(), 1);
        assert_eq!(bus.handler_count("a"), 1);
        assert!(bus.handler_count("b") == 0);
    }
}
