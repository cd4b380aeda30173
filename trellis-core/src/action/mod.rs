//! Actions
//!
//! Actions are the runtime's decoupled messaging layer: a named payload
//! posted by one component (or by the host) and delivered to every
//! handler registered under that name, without the poster knowing who
//! listens.
//!
//! Registrations are scope-bound. When the registering component leaves
//! the tree its handlers are released, so a component can subscribe in
//! `on_mount` and never think about unsubscribing.
//!
//! Delivery comes in two flavors:
//!
//! - serial handlers run on the runtime thread with a [`Context`]
//!   (see [`Context::handle_action`])
//! - concurrent handlers run off-thread with a [`Handle`] for reporting
//!   back (see [`Context::handle_action_async`])
//!
//! [`Context`]: crate::engine::Context
//! [`Context::handle_action`]: crate::engine::Context::handle_action
//! [`Context::handle_action_async`]: crate::engine::Context::handle_action_async
//! [`Handle`]: crate::engine::Handle

mod bus;

pub use bus::{Action, ActionBus, ActionCallback, ConcurrentHandler, SerialHandler};
