//! Platform Collaborator
//!
//! The engine never touches a real display. Every externally visible
//! effect of a mount or diff is expressed as a [`Mutation`] and handed to
//! the [`Platform`] collaborator, which a host implements against its
//! actual surface (a browser DOM, a terminal, a test log).
//!
//! The mutation stream is minimal by contract: an unchanged subtree
//! produces no mutations at all, text and attribute changes produce
//! exactly the touched writes, and reorders of keyed siblings produce
//! moves rather than teardowns. Tests lean on this directly with
//! [`Recorder`].

mod recorder;

pub use recorder::Recorder;

use crate::tree::NodeId;

/// A single externally visible effect of a mount or diff.
///
/// Node-bearing variants name nodes by [`NodeId`]; the host is expected
/// to keep its own id-to-surface mapping, built up from `CreateElement`
/// and `CreateText`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// A new element exists.
    CreateElement { node: NodeId, tag: String },

    /// A new text leaf exists.
    CreateText { node: NodeId, text: String },

    /// A text leaf changed content.
    SetText { node: NodeId, text: String },

    /// An attribute was added or changed.
    SetAttribute { node: NodeId, name: String, value: String },

    /// An attribute was removed.
    RemoveAttribute { node: NodeId, name: String },

    /// A listener for the named event was attached.
    AddListener { node: NodeId, event: String },

    /// A listener for the named event was detached.
    RemoveListener { node: NodeId, event: String },

    /// `child` became the `index`-th child of `parent`.
    InsertChild { parent: NodeId, child: NodeId, index: usize },

    /// An existing child of `parent` moved to `index`.
    MoveChild { parent: NodeId, child: NodeId, index: usize },

    /// `child` was detached from `parent`.
    RemoveChild { parent: NodeId, child: NodeId },

    /// The node left the tree; the host can release its resources.
    RemoveNode { node: NodeId },

    /// The node became the root of the whole surface.
    SetRoot { node: NodeId },

    /// The host should give the node input focus.
    Focus { node: NodeId },

    /// The host should scroll to the element it knows under `anchor`.
    ScrollTo { anchor: String },

    /// The destination leaves the runtime; the host opens it externally.
    OpenExternal { url: String },

    /// The host should record the destination in session history.
    PushHistory { url: String },
}

/// Host-side surface the engine renders onto.
///
/// Implementations run on the runtime thread and should be cheap: the
/// engine applies mutations synchronously in the middle of a frame.
pub trait Platform: Send {
    /// Apply one mutation to the surface.
    fn apply(&mut self, mutation: Mutation);
}

/// Platform that drops every mutation.
///
/// The default collaborator, useful for server-side or headless runs
/// where only [`markup`](crate::tree::Reconciler::markup) output matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Platform for Noop {
    fn apply(&mut self, _mutation: Mutation) {}
}
