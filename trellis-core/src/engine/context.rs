//! Context and Handle
//!
//! Two views of the runtime, one per side of the thread boundary:
//!
//! - [`Context`] is handed to component code running on the runtime
//!   thread. It is scoped to one component and gives synchronous access
//!   to the update queue, the action bus, and the state store.
//! - [`Handle`] is the cloneable, `Send` surface for everything else:
//!   the host, spawned futures, and concurrent action handlers. All of
//!   its operations are queued messages; none touch the runtime
//!   directly.
//!
//! Work queued through either surface is a [`Job`]: a boxed closure the
//! engine loop runs with exclusive access to the runtime state. That
//! single funnel is what keeps component code free of locks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::action::{Action, ActionBus, ActionCallback};
use crate::engine::scheduler::Runtime;
use crate::engine::update_queue::UpdateQueue;
use crate::state::{StateOptions, StateStore};
use crate::storage::Storage;
use crate::tree::{Event, NodeId, RuntimeEvent};

/// A unit of work executed by the engine loop with exclusive access to
/// the runtime state.
pub(crate) type Job = Box<dyn FnOnce(&mut Runtime) + Send>;

/// Count of outstanding spawned units (futures and concurrent handlers).
#[derive(Debug, Clone, Default)]
pub(crate) struct AsyncCounter(Arc<AtomicUsize>);

impl AsyncCounter {
    /// Increment the count; the returned guard decrements on drop, panic
    /// included.
    pub(crate) fn enter(&self) -> AsyncGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        AsyncGuard(self.clone())
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub(crate) struct AsyncGuard(AsyncCounter);

impl Drop for AsyncGuard {
    fn drop(&mut self) {
        (self.0).0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Render a panic payload for logs.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Cloneable, thread-safe surface onto a running engine.
///
/// Everything a handle does is asynchronous: operations are queued and
/// run on the runtime thread in queue order. Queues are bounded; when one
/// is full the operation is dropped with a warning rather than blocking
/// the caller.
///
/// # Example
///
/// ```rust,ignore
/// let handle = engine.handle();
/// tokio::spawn(async move {
///     let report = fetch_report().await;
///     handle.post("report-ready", serde_json::to_value(report).unwrap());
/// });
/// ```
#[derive(Debug, Clone)]
pub struct Handle {
    dispatches: mpsc::Sender<Job>,
    defers: mpsc::Sender<Job>,
    cancel: CancellationToken,
    asyncs: AsyncCounter,
}

impl Handle {
    pub(crate) fn new(
        dispatches: mpsc::Sender<Job>,
        defers: mpsc::Sender<Job>,
        cancel: CancellationToken,
        asyncs: AsyncCounter,
    ) -> Self {
        Self { dispatches, defers, cancel, asyncs }
    }

    /// Queue a callback to run on the runtime thread.
    ///
    /// The callback receives a [`Context`] scoped to the root component.
    pub fn dispatch(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        self.dispatch_job(Box::new(move |rt| {
            let scope = rt.root_scope();
            rt.scoped(scope, f);
        }));
    }

    /// Queue a callback to run at the end of the current (or next) frame,
    /// after the render pass has settled.
    pub fn defer(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        self.defer_job(Box::new(move |rt| {
            let scope = rt.root_scope();
            rt.scoped(scope, f);
        }));
    }

    /// Spawn a future, counted in [`async_pending`](Self::async_pending).
    ///
    /// Must be called within a tokio runtime. The future reports back by
    /// cloning this handle.
    pub fn spawn(&self, fut: impl std::future::Future<Output = ()> + Send + 'static) {
        let guard = self.asyncs.enter();
        tokio::spawn(async move {
            fut.await;
            drop(guard);
        });
    }

    /// Post an action through the bus.
    pub fn post(&self, name: impl Into<String>, arg: Value) {
        let name = name.into();
        self.dispatch(move |ctx| ctx.post(name, arg));
    }

    /// Deliver a host event to the listener of `node`, if it still has
    /// one by the time the event is processed.
    pub fn emit(&self, node: NodeId, event: impl Into<String>, payload: Value) {
        let event = Event::new(event, payload);
        self.dispatch_job(Box::new(move |rt| rt.deliver_event(node, event)));
    }

    /// Broadcast a runtime event depth-first through the mounted tree.
    pub fn notify(&self, event: RuntimeEvent) {
        self.dispatch_job(Box::new(move |rt| rt.notify(&event)));
    }

    /// Navigate to a destination, recording it in session history.
    pub fn navigate(&self, destination: impl Into<String>) {
        let destination = destination.into();
        self.dispatch_job(Box::new(move |rt| {
            if let Err(err) = rt.navigate(&destination, true) {
                rt.record_fatal(err);
            }
        }));
    }

    /// Ask the engine loop to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the engine loop has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of spawned units (futures, concurrent action handlers)
    /// that have not finished yet.
    pub fn async_pending(&self) -> usize {
        self.asyncs.count()
    }

    pub(crate) fn dispatch_job(&self, job: Job) {
        match self.dispatches.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("dispatch queue full, callback dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("engine gone, dispatch dropped");
            }
        }
    }

    pub(crate) fn defer_job(&self, job: Job) {
        match self.defers.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("defer queue full, callback dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("engine gone, deferred callback dropped");
            }
        }
    }

    /// Route one action delivery according to its registration flavor.
    pub(crate) fn route_action(&self, scope: NodeId, callback: ActionCallback, action: Action) {
        match callback {
            ActionCallback::Serial(f) => {
                self.dispatch_job(Box::new(move |rt| rt.invoke_serial(scope, &f, &action)));
            }
            ActionCallback::Concurrent(f) => {
                let handle = self.clone();
                let guard = self.asyncs.enter();
                let name = action.name.clone();
                tokio::task::spawn_blocking(move || {
                    let _guard = guard;
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(handle, action))) {
                        error!(
                            action = %name,
                            panic = %panic_message(panic.as_ref()),
                            "concurrent action handler panicked"
                        );
                    }
                });
            }
        }
    }
}

/// The mutable services shared by every component: the update queue, the
/// action bus, the state store, the storage collaborators, and the handle
/// for queueing work back in.
pub(crate) struct Services {
    pub(crate) updates: UpdateQueue,
    pub(crate) actions: ActionBus,
    pub(crate) states: StateStore,
    pub(crate) persistent: Arc<dyn Storage>,
    pub(crate) session: Arc<dyn Storage>,
    pub(crate) handle: Handle,
}

impl Services {
    pub(crate) fn new(
        persistent: Arc<dyn Storage>,
        session: Arc<dyn Storage>,
        handle: Handle,
    ) -> Self {
        Self {
            updates: UpdateQueue::new(),
            actions: ActionBus::new(),
            states: StateStore::new(),
            persistent,
            session,
            handle,
        }
    }

    /// Release everything bound to a scope that left the tree: its dirty
    /// mark, its action registrations, and its state bucket.
    pub(crate) fn release_scope(&mut self, scope: NodeId) {
        self.updates.done(scope);
        self.actions.remove_scope(scope);
        self.states.remove_scope(scope);
    }
}

/// Per-component view of the runtime, handed to every component callback.
///
/// A context is scoped: state reads and writes, update requests, and
/// action registrations all apply to the component the context was built
/// for. Contexts are short-lived; to carry capability out of a callback,
/// clone a [`Handle`] with [`Context::handle`].
pub struct Context<'a> {
    scope: NodeId,
    services: &'a mut Services,
}

impl<'a> Context<'a> {
    pub(crate) fn new(scope: NodeId, services: &'a mut Services) -> Self {
        Self { scope, services }
    }

    /// The scope (component boundary node) this context is bound to.
    pub fn scope(&self) -> NodeId {
        self.scope
    }

    /// Schedule this component to re-render at the next frame.
    ///
    /// Cheap and idempotent within a frame.
    pub fn update(&mut self) {
        let scope = self.scope;
        self.services.updates.add(scope);
    }

    /// Queue a callback to run on the runtime thread with this
    /// component's scope.
    pub fn dispatch(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        let scope = self.scope;
        self.services.handle.dispatch_job(Box::new(move |rt| rt.scoped(scope, f)));
    }

    /// Queue a callback for the end of the current frame, after the
    /// render pass has settled.
    pub fn defer(&self, f: impl FnOnce(&mut Context<'_>) + Send + 'static) {
        let scope = self.scope;
        self.services.handle.defer_job(Box::new(move |rt| rt.scoped(scope, f)));
    }

    /// Spawn a future, counted against the engine's outstanding units.
    pub fn spawn(&self, fut: impl std::future::Future<Output = ()> + Send + 'static) {
        self.services.handle.spawn(fut);
    }

    /// Clone a [`Handle`] to carry out of this callback.
    pub fn handle(&self) -> Handle {
        self.services.handle.clone()
    }

    /// Navigate to a destination, recording it in session history.
    pub fn navigate(&self, destination: impl Into<String>) {
        self.services.handle.navigate(destination);
    }

    /// Post an action to every handler registered under `name`.
    pub fn post(&self, name: impl Into<String>, arg: Value) {
        self.post_action(Action::new(name, arg));
    }

    /// Post an already-built action.
    pub fn post_action(&self, action: Action) {
        let mut deliveries = Vec::new();
        self.services.actions.post(&action, |scope, callback| {
            deliveries.push((scope, callback));
        });
        for (scope, callback) in deliveries {
            self.services.handle.route_action(scope, callback, action.clone());
        }
    }

    /// Post a batch of actions in order.
    ///
    /// Equivalent to posting them one by one; the batch form exists so a
    /// burst reads as one statement at the call site.
    pub fn post_batch(&self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            self.post_action(action);
        }
    }

    /// Register a serial action handler bound to this component.
    ///
    /// Serial handlers run on the runtime thread in posting order.
    /// Re-registering the same name from the same component replaces the
    /// previous handler. The registration is released when the component
    /// leaves the tree.
    pub fn handle_action(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&mut Context<'_>, &Action) + Send + Sync + 'static,
    ) {
        let scope = self.scope;
        self.services.actions.handle(name, scope, ActionCallback::serial(f));
    }

    /// Register a concurrent action handler bound to this component.
    ///
    /// Concurrent handlers run on a worker thread, may block, and report
    /// back through the [`Handle`] they receive.
    pub fn handle_action_async(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Handle, Action) + Send + Sync + 'static,
    ) {
        let scope = self.scope;
        self.services.actions.handle(name, scope, ActionCallback::concurrent(f));
    }

    /// Write a state value for this component.
    pub fn set_state<T: Serialize>(&mut self, key: impl Into<String>, value: &T) {
        self.set_state_with(key, value, StateOptions::default());
    }

    /// Write a state value with explicit expiry/persistence options.
    ///
    /// Values that cannot be serialized are dropped with a warning; UI
    /// state writes are fire-and-forget.
    pub fn set_state_with<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
        options: StateOptions,
    ) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(json) => {
                let scope = self.scope;
                self.services.states.set(
                    scope,
                    key,
                    json,
                    options,
                    self.services.persistent.as_ref(),
                );
            }
            Err(err) => warn!(%err, key, "state value could not be serialized, write dropped"),
        }
    }

    /// Read a state value for this component.
    ///
    /// Returns `None` for missing, expired, or undecodable entries.
    pub fn get_state<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let scope = self.scope;
        let value = self
            .services
            .states
            .get(scope, key, self.services.persistent.as_ref())?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(%err, key, "state value could not be decoded");
                None
            }
        }
    }

    /// Delete a state value and its persistent mirror.
    pub fn del_state(&mut self, key: &str) {
        let scope = self.scope;
        self.services
            .states
            .remove(scope, key, self.services.persistent.as_ref());
    }

    /// The persistent storage collaborator.
    pub fn persistent_storage(&self) -> &dyn Storage {
        self.services.persistent.as_ref()
    }

    /// The session storage collaborator.
    pub fn session_storage(&self) -> &dyn Storage {
        self.services.session.as_ref()
    }

    /// Ask the host to move input focus to `node`, once the current
    /// frame has settled.
    pub fn focus(&self, node: NodeId) {
        self.services.handle.defer_job(Box::new(move |rt| rt.focus(node)));
    }

    /// Ask the host to scroll to the element it knows under `anchor`,
    /// once the current frame has settled.
    pub fn scroll_to(&self, anchor: impl Into<String>) {
        let anchor = anchor.into();
        self.services.handle.defer_job(Box::new(move |rt| rt.scroll_to(&anchor)));
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::storage::MemoryStorage;

    /// A `Services` bundle plus the receiving ends of its queues, for
    /// unit tests that exercise contexts without an engine loop.
    pub(crate) struct TestRig {
        pub(crate) services: Services,
        pub(crate) dispatches: mpsc::Receiver<Job>,
        pub(crate) defers: mpsc::Receiver<Job>,
    }

    pub(crate) fn test_rig() -> TestRig {
        let (dispatch_tx, dispatches) = mpsc::channel(64);
        let (defer_tx, defers) = mpsc::channel(64);
        let handle = Handle::new(
            dispatch_tx,
            defer_tx,
            CancellationToken::new(),
            AsyncCounter::default(),
        );
        let services = Services::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
            handle,
        );
        TestRig { services, dispatches, defers }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_rig;
    use super::*;

    fn scope(raw: u64) -> NodeId {
        NodeId::from_raw(raw)
    }

    #[test]
    fn update_marks_the_context_scope_dirty() {
        let mut rig = test_rig();
        let mut ctx = Context::new(scope(5), &mut rig.services);

        ctx.update();
        ctx.update();

        assert!(rig.services.updates.contains(scope(5)));
        assert_eq!(rig.services.updates.len(), 1);
    }

    #[test]
    fn typed_state_round_trips_through_json() {
        let mut rig = test_rig();
        let mut ctx = Context::new(scope(1), &mut rig.services);

        ctx.set_state("count", &41_u64);
        assert_eq!(ctx.get_state::<u64>("count"), Some(41));

        ctx.del_state("count");
        assert_eq!(ctx.get_state::<u64>("count"), None);
    }

    #[test]
    fn unserializable_state_writes_are_dropped() {
        let mut rig = test_rig();
        let mut ctx = Context::new(scope(1), &mut rig.services);

        // NaN has no JSON representation.
        ctx.set_state("bad", &f64::NAN);
        assert_eq!(ctx.get_state::<f64>("bad"), None);
    }

    #[test]
    fn posting_a_serial_action_queues_one_dispatch_per_registration() {
        let mut rig = test_rig();
        let mut ctx = Context::new(scope(1), &mut rig.services);

        ctx.handle_action("ping", |_ctx, _action| {});
        ctx.post("ping", Value::Null);

        assert!(rig.dispatches.try_recv().is_ok());
        assert!(rig.dispatches.try_recv().is_err());
    }

    #[test]
    fn posting_without_registrations_queues_nothing() {
        let rig_scope = scope(1);
        let mut rig = test_rig();
        let ctx = Context::new(rig_scope, &mut rig.services);

        ctx.post("nobody-listens", Value::Null);

        assert!(rig.dispatches.try_recv().is_err());
    }

    #[test]
    fn scroll_requests_are_deferred_not_dispatched() {
        let mut rig = test_rig();
        let ctx = Context::new(scope(1), &mut rig.services);

        ctx.scroll_to("section-2");

        assert!(rig.defers.try_recv().is_ok());
        assert!(rig.dispatches.try_recv().is_err());
    }

    #[test]
    fn release_scope_clears_every_service() {
        let mut rig = test_rig();
        let mut ctx = Context::new(scope(3), &mut rig.services);

        ctx.update();
        ctx.handle_action("ping", |_ctx, _action| {});
        ctx.set_state("k", &1_u32);

        rig.services.release_scope(scope(3));

        assert!(rig.services.updates.is_empty());
        assert_eq!(rig.services.actions.registration_count(), 0);
        assert!(rig.services.states.is_empty());
    }

    #[test]
    fn async_counter_balances_on_guard_drop() {
        let counter = AsyncCounter::default();
        let a = counter.enter();
        let b = counter.enter();
        assert_eq!(counter.count(), 2);
        drop(a);
        drop(b);
        assert_eq!(counter.count(), 0);
    }
}
