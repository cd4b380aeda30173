//! Engine Configuration and Assembly
//!
//! This module holds the tunable knobs of an engine and the builder that
//! wires an [`Engine`] together: queues, services, route table, platform
//! and storage backends.
//!
//! Most applications configure everything up front and never touch the
//! engine internals again:
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .route("/", || View::component(Home))
//!     .route_prefix("/docs", || View::component(Docs))
//!     .handle_action("sync", |handle, action| { /* off-thread work */ })
//!     .platform(DomBridge::new())
//!     .build();
//! engine.run(0).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::{Action, ConcurrentHandler};
use crate::engine::context::{AsyncCounter, Handle, Services};
use crate::engine::navigate::Router;
use crate::engine::scheduler::{Engine, Runtime, DEFAULT_FRAME_RATE};
use crate::platform::{Noop, Platform};
use crate::storage::{MemoryStorage, Storage};
use crate::tree::{Reconciler, View};

/// Engine tuning knobs.
///
/// Every field has a sensible default; deployments that load settings
/// from a file can deserialize a partial document and let the rest
/// default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frames per second the scheduler targets while work is pending.
    pub frame_rate: u32,
    /// How deep components may nest before a mount is refused.
    pub max_render_depth: usize,
    /// Capacity of the dispatch and defer queues. Posts beyond a full
    /// queue are dropped with a warning rather than blocking the caller.
    pub channel_capacity: usize,
    /// The application's own origin, as a full URL. Navigation to a
    /// different host opens externally instead of resolving a route.
    pub origin: String,
    /// Path prefix the application is served under, stripped before
    /// route resolution.
    pub base_path: String,
    /// URL prefixes to treat as in-app even when their host differs
    /// from the origin.
    pub internal_urls: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            max_render_depth: 128,
            channel_capacity: 4096,
            origin: String::new(),
            base_path: String::new(),
            internal_urls: Vec::new(),
        }
    }
}

/// Assembles an [`Engine`].
///
/// Defaults are inert: a [`Noop`] platform, in-memory storage for both
/// stores, and an empty route table that resolves everything to the
/// not-found view.
pub struct Builder {
    config: Config,
    router: Router,
    platform: Box<dyn Platform>,
    persistent: Arc<dyn Storage>,
    session: Arc<dyn Storage>,
    startup: Vec<(String, ConcurrentHandler)>,
    cancel: CancellationToken,
}

impl Builder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            router: Router::new(),
            platform: Box::new(Noop),
            persistent: Arc::new(MemoryStorage::new()),
            session: Arc::new(MemoryStorage::new()),
            startup: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Register a view factory for one exact path.
    pub fn route(
        mut self,
        path: impl Into<String>,
        factory: impl Fn() -> View + Send + 'static,
    ) -> Self {
        self.router.route(path, factory);
        self
    }

    /// Register a view factory for a path and everything below it.
    pub fn route_prefix(
        mut self,
        prefix: impl Into<String>,
        factory: impl Fn() -> View + Send + 'static,
    ) -> Self {
        self.router.route_prefix(prefix, factory);
        self
    }

    /// Replace the view shown for unresolved paths.
    pub fn not_found(mut self, factory: impl Fn() -> View + Send + 'static) -> Self {
        self.router.set_not_found(factory);
        self
    }

    /// Register an application-wide concurrent action handler.
    ///
    /// The handler runs off the engine thread with a [`Handle`] to post
    /// results back. It is bound to the root scope when the first
    /// surface loads and stays registered for the life of the surface.
    pub fn handle_action(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(Handle, Action) + Send + Sync + 'static,
    ) -> Self {
        self.startup.push((name.into(), Arc::new(handler)));
        self
    }

    /// Set the platform that receives tree mutations.
    pub fn platform(mut self, platform: impl Platform + 'static) -> Self {
        self.platform = Box::new(platform);
        self
    }

    /// Set the storage backend that survives restarts.
    pub fn persistent_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.persistent = Arc::new(storage);
        self
    }

    /// Set the storage backend scoped to this session.
    pub fn session_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.session = Arc::new(storage);
        self
    }

    /// Use an externally owned cancellation token, so the embedding can
    /// stop the engine alongside its other tasks.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Engine {
        let Builder { config, router, platform, persistent, session, startup, cancel } = self;

        let capacity = config.channel_capacity.max(1);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(capacity);
        let (defer_tx, defer_rx) = mpsc::channel(capacity);
        let handle = Handle::new(dispatch_tx, defer_tx, cancel.clone(), AsyncCounter::default());

        let services = Services::new(persistent, session, handle);
        let tree = Reconciler::new(platform, config.max_render_depth);
        let rt = Runtime::new(tree, services, router, config, startup);
        Engine::new(rt, dispatch_rx, defer_rx, cancel)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("startup_handlers", &self.startup.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_are_stable() {
        let config = Config::default();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.max_render_depth, 128);
        assert_eq!(config.channel_capacity, 4096);
        assert!(config.origin.is_empty());
    }

    #[test]
    fn partial_config_documents_fill_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"frame_rate": 60}"#).unwrap();
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.max_render_depth, 128);
    }
}
