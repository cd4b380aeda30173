//! Engine
//!
//! This module implements the runtime around the view tree: the
//! callback queues everything funnels through, the frame-gated loop
//! that drives re-renders, component contexts, navigation, and the
//! assembly of it all.
//!
//! # Concepts
//!
//! ## One consumer
//!
//! Components, host bindings, and background tasks never touch the tree
//! directly. They queue callbacks through a cloneable [`Handle`]; the
//! engine loop is the single consumer that runs them against the live
//! tree, so no lock ever guards a render.
//!
//! ## Frames
//!
//! Marking a component dirty does not render it. Dirty scopes are
//! collected and flushed together when the frame timer fires, each at
//! most once per frame, followed by the callbacks deferred to frame end
//! and a sweep of registrations whose scopes left the tree.
//!
//! ## Contexts
//!
//! Every callback runs with a [`Context`] naming the component scope it
//! acts for. State reads, action registrations, and update marks all
//! flow through it, which is what lets the runtime release everything a
//! component owned the moment it unmounts.

pub(crate) mod context;
pub(crate) mod scheduler;
pub(crate) mod update_queue;

mod builder;
mod navigate;

pub use builder::{Builder, Config};
pub use context::{Context, Handle};
pub use navigate::{Destination, Router};
pub use scheduler::{Engine, DEFAULT_FRAME_RATE};
