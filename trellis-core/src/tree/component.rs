//! Components
//!
//! A component is a stateful unit of UI: it renders a [`View`] describing
//! its appearance and receives lifecycle and runtime notifications. All
//! component methods run on the runtime thread; instances never need
//! internal locking.
//!
//! # Identity and State
//!
//! When a diff matches a component description against a live boundary of
//! the same type, the live instance is replaced by the described one (the
//! described instance carries the fresh inputs) while the boundary's
//! scope, subtree, and stored state survive. Anything a component wants to
//! keep across its own re-renders therefore belongs in the state store
//! (see [`Context::set_state`](crate::engine::Context::set_state)), not in
//! instance fields.

use crate::engine::Context;

use super::view::View;

/// A stateful unit of UI.
///
/// Only [`render`](Component::render) is required; the lifecycle and
/// notification methods default to no-ops.
///
/// # Example
///
/// ```rust,ignore
/// struct Counter;
///
/// impl Component for Counter {
///     fn render(&mut self, ctx: &mut Context<'_>) -> View {
///         let count: u64 = ctx.get_state("count").unwrap_or(0);
///         View::element("button")
///             .on("click", move |ctx, _event| {
///                 ctx.set_state("count", &(count + 1));
///                 ctx.update();
///             })
///             .child(View::text(format!("clicked {count} times")))
///             .build()
///     }
/// }
/// ```
pub trait Component: Send + 'static {
    /// Describe the component's current appearance.
    ///
    /// Must return exactly one root view. Called once at mount and again
    /// on every scheduled update of this component.
    fn render(&mut self, ctx: &mut Context<'_>) -> View;

    /// Called after the component's subtree is first mounted.
    fn on_mount(&mut self, _ctx: &mut Context<'_>) {}

    /// Called after the component's subtree left the tree.
    ///
    /// By this point the component's listeners, state entries, and queued
    /// updates have already been released.
    fn on_dismount(&mut self) {}

    /// Called when a runtime event reaches this component.
    ///
    /// Events are delivered depth-first through the mounted tree; see
    /// [`RuntimeEvent`] for the vocabulary.
    fn on_event(&mut self, _ctx: &mut Context<'_>, _event: &RuntimeEvent) {}
}

/// Runtime-level notifications broadcast through the mounted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuntimeEvent {
    /// The engine finished navigating to a new destination.
    Navigation,

    /// The host viewport changed size.
    ///
    /// The engine never watches the viewport itself; host bindings emit
    /// this through [`Handle::notify`](crate::engine::Handle::notify).
    Resize,
}

/// Fallback component rendered when no route matches a destination.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFound;

impl Component for NotFound {
    fn render(&mut self, _ctx: &mut Context<'_>) -> View {
        View::element("section")
            .attr("class", "trellis-not-found")
            .child(View::element("h1").child(View::text("404")))
            .child(View::element("p").child(View::text("This page does not exist.")))
            .build()
    }
}
