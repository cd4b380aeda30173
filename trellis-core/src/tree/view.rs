//! View Descriptions
//!
//! A [`View`] is an immutable description of what a piece of UI should look
//! like. Components produce views; the reconciler consumes them, mutating
//! the live tree (and emitting platform mutations) until it matches the
//! description.
//!
//! Views are plain data built with chained constructors:
//!
//! ```rust,ignore
//! View::element("ul")
//!     .attr("class", "todo-list")
//!     .children(items.iter().map(|item| {
//!         View::element("li")
//!             .key(&item.id)
//!             .on("click", move |ctx, _event| ctx.update())
//!             .child(View::text(&item.label))
//!     }))
//!     .build()
//! ```
//!
//! # Identity
//!
//! During a diff, elements match when tag (and explicit key, if any)
//! match; text always matches text; component descriptions match live
//! boundaries by component type. The type is captured with
//! [`TypeId`](std::any::TypeId) when the description is built, so matching
//! needs no reflection at diff time.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::engine::Context;

use super::component::Component;

/// An event delivered to an element listener.
///
/// The payload is host-defined: a DOM host forwards whatever the browser
/// event carried, a test feeds whatever the assertion needs.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name, e.g. `click`.
    pub name: String,

    /// Host-defined payload.
    pub payload: Value,
}

impl Event {
    /// Create an event.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self { name: name.into(), payload }
    }
}

/// Callback attached to an element for a named event.
///
/// Handlers run on the runtime thread with a [`Context`] scoped to the
/// component that rendered the element.
pub type EventHandler = Arc<dyn Fn(&mut Context<'_>, &Event) + Send + Sync>;

/// A description of a piece of UI.
pub enum View {
    /// A host element with attributes, listeners, and children.
    Element(Element),

    /// A text leaf.
    Text(String),

    /// A component to be mounted as a boundary.
    Component(ComponentView),
}

impl View {
    /// Create a text description.
    pub fn text(text: impl Into<String>) -> Self {
        View::Text(text.into())
    }

    /// Start an element description.
    pub fn element(tag: impl Into<String>) -> Element {
        Element::new(tag)
    }

    /// Start a void element description (no children allowed).
    pub fn void(tag: impl Into<String>) -> Element {
        Element::void(tag)
    }

    /// Create a component description.
    pub fn component<C: Component>(component: C) -> Self {
        View::Component(ComponentView::new(component))
    }

    /// The explicit identity key, if this is a keyed element.
    pub fn key(&self) -> Option<&str> {
        match self {
            View::Element(e) => e.key.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Element(e) => e.fmt(f),
            View::Text(t) => f.debug_tuple("Text").field(t).finish(),
            View::Component(c) => c.fmt(f),
        }
    }
}

impl From<Element> for View {
    fn from(element: Element) -> Self {
        View::Element(element)
    }
}

/// An element description under construction.
///
/// Every method consumes and returns the builder so descriptions read as
/// one expression. Finish with [`Element::build`] (or rely on
/// `From<Element> for View` where the target type is known).
pub struct Element {
    pub(crate) tag: String,
    pub(crate) key: Option<String>,
    pub(crate) void: bool,
    pub(crate) attrs: IndexMap<String, String>,
    pub(crate) handlers: IndexMap<String, EventHandler>,
    pub(crate) children: Vec<View>,
}

impl Element {
    /// Start an element description with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            key: None,
            void: false,
            attrs: IndexMap::new(),
            handlers: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// Start a void element description (e.g. `img`, `input`).
    ///
    /// Mounting a void element that carries children is a structural
    /// error.
    pub fn void(tag: impl Into<String>) -> Self {
        let mut element = Self::new(tag);
        element.void = true;
        element
    }

    /// Set the explicit identity key.
    ///
    /// Keyed siblings are matched by key during a diff regardless of
    /// position, which preserves their subtrees across reorders.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set an attribute. Later writes to the same name win.
    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.insert(name.into(), value.to_string());
        self
    }

    /// Attach a listener for the named event.
    pub fn on(
        mut self,
        event: impl Into<String>,
        handler: impl Fn(&mut Context<'_>, &Event) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    /// Append one child.
    pub fn child(mut self, child: impl Into<View>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Append a sequence of children.
    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<View>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Finish the description.
    pub fn build(self) -> View {
        View::Element(self)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("void", &self.void)
            .field("attrs", &self.attrs)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

/// A component description.
///
/// Carries the boxed instance together with its type identity so the
/// diff can match it against a live boundary without downcasting.
pub struct ComponentView {
    pub(crate) component: Box<dyn Component>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
}

impl ComponentView {
    /// Describe a component instance.
    pub fn new<C: Component>(component: C) -> Self {
        Self {
            component: Box::new(component),
            type_id: TypeId::of::<C>(),
            type_name: std::any::type_name::<C>(),
        }
    }

    /// The component's type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ComponentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.type_name).finish()
    }
}
