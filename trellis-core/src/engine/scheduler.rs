//! Engine Loop and Frame Scheduler
//!
//! This module implements the runtime that owns the live tree and the
//! async loop that drives it.
//!
//! # The loop
//!
//! Everything that touches the tree funnels through one consumer. Each
//! iteration does exactly one of:
//!
//! 1. Stop, when the cancellation token fires.
//! 2. Run the next dispatched callback against the runtime.
//! 3. Run a frame, when the frame timer fires.
//!
//! A frame is: flush the dirty scopes (each component re-renders and its
//! subtree is diffed), run the callbacks deferred to frame end, then
//! sweep action and state registrations whose scopes have left the tree.
//!
//! # Pacing
//!
//! Renders are frame-gated. However many times scopes are marked dirty
//! between two frames, each renders at most once when the timer fires.
//! While dispatches keep arriving the timer runs at the configured frame
//! interval; once a frame completes with nothing behind it, the timer is
//! parked on a horizon an hour out, and the next dispatch re-arms it.
//! An idle engine spends no cycles.
//!
//! # Implementation Notes
//!
//! The active ticker and the idle timeout collapse into a single
//! resettable sleep. The `parked` flag tracks which horizon the sleep
//! is on: parked means the idle horizon, and the first dispatch after a
//! quiet stretch resets it to one frame interval ahead.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::action::{Action, ActionCallback, ConcurrentHandler, SerialHandler};
use crate::engine::builder::{Builder, Config};
use crate::engine::context::{panic_message, Context, Handle, Job, Services};
use crate::engine::navigate::{Destination, Router};
use crate::error::EngineError;
use crate::platform::Mutation;
use crate::tree::{Event, NodeId, Reconciler, RuntimeEvent, View};

/// Frames per second the scheduler targets when the caller passes `0`
/// to [`Engine::run`] and the configuration does not say otherwise.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// How far out the frame timer parks when a frame ends with no work
/// behind it.
const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// The single-threaded half of the engine: the live tree plus the
/// services dispatched callbacks run against.
pub(crate) struct Runtime {
    tree: Reconciler,
    services: Services,
    router: Router,
    config: Config,
    origin_host: Option<String>,
    body: Option<NodeId>,
    last_visited: Option<Destination>,
    startup: Vec<(String, ConcurrentHandler)>,
    fatal: Option<EngineError>,
}

impl Runtime {
    pub(crate) fn new(
        tree: Reconciler,
        services: Services,
        router: Router,
        config: Config,
        startup: Vec<(String, ConcurrentHandler)>,
    ) -> Self {
        let origin_host = if config.origin.is_empty() {
            None
        } else {
            Destination::parse(&config.origin).host
        };
        Self {
            tree,
            services,
            router,
            config,
            origin_host,
            body: None,
            last_visited: None,
            startup,
            fatal: None,
        }
    }

    /// The scope dispatched callbacks run under when none is more
    /// specific: the mounted root, or a placeholder before first load.
    pub(crate) fn root_scope(&self) -> NodeId {
        self.body.unwrap_or(NodeId::from_raw(0))
    }

    /// Run a callback with a context bound to `scope`.
    pub(crate) fn scoped(&mut self, scope: NodeId, f: impl FnOnce(&mut Context<'_>)) {
        f(&mut Context::new(scope, &mut self.services));
    }

    /// Deliver a host event to the listener of `node`, under the scope
    /// that rendered the node.
    pub(crate) fn deliver_event(&mut self, node: NodeId, event: Event) {
        match self.tree.event_handler(node, &event.name) {
            Some((scope, handler)) => {
                handler(&mut Context::new(scope, &mut self.services), &event);
            }
            None => trace!(%node, event = %event.name, "no listener, event dropped"),
        }
    }

    /// Broadcast a runtime event to every mounted component.
    pub(crate) fn notify(&mut self, event: &RuntimeEvent) {
        if let Some(body) = self.body {
            self.tree.notify_component_event(&mut self.services, body, event);
        }
    }

    /// Run one serial action delivery, shielding the loop from handler
    /// panics. Deliveries to scopes that left the tree in the meantime
    /// are dropped.
    pub(crate) fn invoke_serial(&mut self, scope: NodeId, handler: &SerialHandler, action: &Action) {
        if !self.tree.contains(scope) {
            trace!(%scope, action = %action.name, "handler scope gone, delivery dropped");
            return;
        }
        let result = catch_unwind(AssertUnwindSafe(|| {
            handler(&mut Context::new(scope, &mut self.services), action);
        }));
        if let Err(panic) = result {
            error!(
                action = %action.name,
                panic = %panic_message(panic.as_ref()),
                "action handler panicked"
            );
        }
    }

    /// Navigate to a destination.
    ///
    /// External targets are handed to the host to open and nothing else
    /// happens. In-app targets resolve through the route table and load,
    /// except that a fragment-to-fragment hop within the current
    /// document skips the load. History is only written when
    /// `update_history` is set (user navigation, not the initial load).
    pub(crate) fn navigate(
        &mut self,
        raw: &str,
        update_history: bool,
    ) -> Result<(), EngineError> {
        let destination = Destination::parse(raw);

        if self.is_external(&destination) {
            debug!(url = %destination, "opening external destination");
            self.tree.emit(Mutation::OpenExternal { url: destination.raw });
            return Ok(());
        }

        let fragment_only = match &self.last_visited {
            Some(last) if destination.same_document(last) => {
                if destination.fragment == last.fragment {
                    trace!(url = %destination, "destination unchanged");
                    return Ok(());
                }
                true
            }
            _ => false,
        };

        if !fragment_only {
            let path = self.strip_base(&destination.path).to_string();
            debug!(url = %destination, route = %path, "navigating");
            let view = self.router.resolve(&path);
            self.load(view)?;
        }

        if update_history {
            self.tree.emit(Mutation::PushHistory { url: destination.raw.clone() });
        }
        self.notify(&RuntimeEvent::Navigation);

        if let Some(anchor) = destination.fragment.as_deref().filter(|f| !f.is_empty()) {
            let anchor = anchor.to_string();
            self.services
                .handle
                .defer_job(Box::new(move |rt| rt.scroll_to(&anchor)));
        }

        self.last_visited = Some(destination);
        Ok(())
    }

    fn is_external(&self, destination: &Destination) -> bool {
        for internal in &self.config.internal_urls {
            if !internal.is_empty() && destination.raw.starts_with(internal.as_str()) {
                return false;
            }
        }
        if destination.scheme.as_deref() == Some("mailto") {
            return true;
        }
        match (&destination.host, &self.origin_host) {
            (Some(host), Some(origin)) => host != origin,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn strip_base<'a>(&self, path: &'a str) -> &'a str {
        let base = self.config.base_path.trim_end_matches('/');
        if base.is_empty() {
            return path;
        }
        match path.strip_prefix(base) {
            Some(rest) if rest.is_empty() => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    /// Mount a view as the surface root, or diff it against the current
    /// root. The first load also binds the application-wide concurrent
    /// action handlers to the root scope.
    pub(crate) fn load(&mut self, view: View) -> Result<(), EngineError> {
        match self.body {
            None => {
                let id = self.tree.mount(&mut self.services, view)?;
                self.body = Some(id);
                self.tree.announce_root(id);
                self.register_startup_handlers();
            }
            Some(current) => {
                let id = self.tree.update(&mut self.services, current, view)?;
                self.body = Some(id);
            }
        }
        Ok(())
    }

    fn register_startup_handlers(&mut self) {
        if self.startup.is_empty() {
            return;
        }
        let scope = self.root_scope();
        debug!(count = self.startup.len(), "binding application action handlers");
        for (name, handler) in self.startup.drain(..) {
            self.services
                .actions
                .handle(name, scope, ActionCallback::Concurrent(handler));
        }
    }

    /// Re-render every dirty scope once, oldest mark first.
    ///
    /// Marks added while the pass runs stay queued for the next frame.
    /// Scopes that left the tree since they were marked are skipped.
    pub(crate) fn render_pass(&mut self) -> Result<(), EngineError> {
        let pending = self.services.updates.snapshot();
        if pending.is_empty() {
            return Ok(());
        }
        trace!(scopes = pending.len(), "render pass");
        for scope in pending {
            if self.tree.contains(scope) {
                self.tree.update_component_root(&mut self.services, scope)?;
            }
            self.services.updates.done(scope);
        }
        Ok(())
    }

    /// End-of-frame sweep: drop action and state registrations whose
    /// scopes are no longer mounted, and expire stale state entries.
    pub(crate) fn frame_cleanup(&mut self) {
        let Runtime { tree, services, .. } = self;
        services.actions.cleanup(|scope| tree.contains(scope));
        services.states.cleanup(
            |scope| tree.contains(scope),
            std::time::Instant::now(),
            services.persistent.as_ref(),
        );
    }

    /// Ask the host to bring the element registered under `anchor` into
    /// view.
    pub(crate) fn scroll_to(&mut self, anchor: &str) {
        self.tree.emit(Mutation::ScrollTo { anchor: anchor.to_string() });
    }

    /// Ask the host to move input focus to `node`, unless it unmounted
    /// while the request was queued.
    pub(crate) fn focus(&mut self, node: NodeId) {
        if self.tree.contains(node) {
            self.tree.emit(Mutation::Focus { node });
        }
    }

    /// Record an error the loop should stop on. The first one wins.
    pub(crate) fn record_fatal(&mut self, err: EngineError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        } else {
            warn!(error = %err, "error while already failing, dropped");
        }
    }

    pub(crate) fn take_fatal(&mut self) -> Option<EngineError> {
        self.fatal.take()
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn handle(&self) -> Handle {
        self.services.handle.clone()
    }

    pub(crate) fn body(&self) -> Option<NodeId> {
        self.body
    }

    pub(crate) fn tree(&self) -> &Reconciler {
        &self.tree
    }
}

/// The UI runtime: a retained tree, its services, and the loop that
/// drives them.
///
/// # Example
///
/// ```rust,ignore
/// let mut engine = Engine::builder()
///     .route("/", || View::component(Home))
///     .platform(bridge)
///     .build();
/// engine.navigate("/")?;
/// engine.run(0).await?;
/// ```
///
/// Everything after [`run`](Engine::run) goes through the cloneable
/// [`Handle`]: host events, actions, navigation, cancellation.
pub struct Engine {
    rt: Runtime,
    dispatch_rx: mpsc::Receiver<Job>,
    defer_rx: mpsc::Receiver<Job>,
    cancel: CancellationToken,
}

impl Engine {
    /// Start assembling an engine.
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn new(
        rt: Runtime,
        dispatch_rx: mpsc::Receiver<Job>,
        defer_rx: mpsc::Receiver<Job>,
        cancel: CancellationToken,
    ) -> Self {
        Self { rt, dispatch_rx, defer_rx, cancel }
    }

    /// A handle for posting work to the engine from anywhere.
    pub fn handle(&self) -> Handle {
        self.rt.handle()
    }

    /// Resolve and load the initial destination. Does not write
    /// history: the host is already showing this URL.
    pub fn navigate(&mut self, destination: &str) -> Result<(), EngineError> {
        self.rt.navigate(destination, false)
    }

    /// Mount a view directly as the surface root, bypassing the route
    /// table. Useful for prerendering and tests.
    pub fn load(&mut self, view: View) -> Result<(), EngineError> {
        self.rt.load(view)
    }

    /// Run the queued callbacks and one frame, synchronously.
    ///
    /// This is the loop body without the waiting, for embeddings and
    /// tests that drive the engine themselves.
    pub fn flush(&mut self) -> Result<(), EngineError> {
        while let Ok(job) = self.dispatch_rx.try_recv() {
            job(&mut self.rt);
            if let Some(err) = self.rt.take_fatal() {
                return Err(err);
            }
        }
        frame(&mut self.rt, &mut self.defer_rx)
    }

    /// The root of the mounted surface, if one is loaded.
    pub fn root(&self) -> Option<NodeId> {
        self.rt.body()
    }

    /// The live tree, for inspection.
    pub fn tree(&self) -> &Reconciler {
        self.rt.tree()
    }

    /// Serialize the mounted surface as markup.
    pub fn markup(&self) -> Option<String> {
        self.rt.tree().markup(self.rt.body()?)
    }

    /// Number of spawned units (futures, concurrent action handlers)
    /// still running.
    pub fn async_pending(&self) -> usize {
        self.rt.handle().async_pending()
    }

    /// Drive the engine until cancelled or a fatal error.
    ///
    /// `frame_rate` caps how often dirty scopes re-render; `0` means the
    /// configured rate. The first frame runs immediately, so work queued
    /// before the loop starts (deferred anchor scrolls, prerender
    /// follow-ups) is not stuck waiting for a dispatch.
    pub async fn run(self, frame_rate: u32) -> Result<(), EngineError> {
        let Engine { mut rt, mut dispatch_rx, mut defer_rx, cancel } = self;

        let rate = if frame_rate == 0 { rt.config().frame_rate } else { frame_rate };
        let interval = Duration::from_secs(1) / rate.max(1);
        debug!(frame_interval = ?interval, "engine loop started");

        let timer = time::sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut parked = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("engine loop cancelled");
                    return Ok(());
                }

                Some(job) = dispatch_rx.recv() => {
                    if parked {
                        timer.as_mut().reset(time::Instant::now() + interval);
                        parked = false;
                    }
                    job(&mut rt);
                    if let Some(err) = rt.take_fatal() {
                        error!(error = %err, "engine stopping on fatal error");
                        return Err(err);
                    }
                }

                _ = timer.as_mut() => {
                    frame(&mut rt, &mut defer_rx)?;
                    timer.as_mut().reset(time::Instant::now() + IDLE_INTERVAL);
                    parked = true;
                }
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mounted", &self.rt.body().is_some())
            .field("nodes", &self.rt.tree().len())
            .finish()
    }
}

/// One frame: flush dirty scopes, run deferred callbacks, sweep dead
/// registrations.
fn frame(rt: &mut Runtime, defers: &mut mpsc::Receiver<Job>) -> Result<(), EngineError> {
    rt.render_pass()?;
    while let Ok(job) = defers.try_recv() {
        job(rt);
        if let Some(err) = rt.take_fatal() {
            return Err(err);
        }
    }
    rt.frame_cleanup();
    Ok(())
}
