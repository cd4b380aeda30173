//! View Tree
//!
//! This module implements the retained tree the runtime keeps for the
//! current surface, and the reconciler that keeps it in line with what
//! components describe.
//!
//! # Concepts
//!
//! ## Views
//!
//! A [`View`] is a cheap, short-lived description of what the surface
//! should look like: a text node, an element with attributes, listeners,
//! and children, or a component to be given its own place in the tree.
//! Views are produced by [`Component::render`] and consumed whole by the
//! reconciler.
//!
//! ## Nodes
//!
//! The live tree is stored in an arena of nodes addressed by [`NodeId`].
//! Elements and text carry what the host platform shows; boundaries
//! carry a live component instance plus the bookkeeping that makes it a
//! scope (render depth, revision, the id of its rendered root).
//!
//! ## Reconciliation
//!
//! The [`Reconciler`] diffs a description against the live tree and
//! emits the minimal mutations to a [`Platform`]: attribute and listener
//! deltas, single text swaps, keyed moves instead of teardowns. Feeding
//! it the same description twice emits nothing.
//!
//! # Implementation Notes
//!
//! Component instances live inside their boundary nodes. To render one,
//! the reconciler takes the instance out of the arena, runs it against a
//! scoped [`Context`], and puts it back, so a render never aliases the
//! tree it is about to mutate.
//!
//! [`Component::render`]: crate::tree::Component::render
//! [`Platform`]: crate::platform::Platform
//! [`Context`]: crate::engine::Context

mod component;
mod node;
mod reconciler;
mod view;

pub use component::{Component, NotFound, RuntimeEvent};
pub use node::{NodeId, NodeKind};
pub use reconciler::Reconciler;
pub use view::{ComponentView, Element, Event, EventHandler, View};
