//! Live Tree Nodes
//!
//! This module defines the arena that holds every mounted node. Nodes are
//! addressed by integer id rather than by reference, so the tree can be
//! walked and mutated without self-referential borrows, and so platform
//! collaborators can name nodes across the boundary with a plain copyable
//! value.
//!
//! # Structure
//!
//! Each node records its parent, the component scope that rendered it,
//! and a body. The body is a tagged variant:
//!
//! - `Element`: a host element with attributes, listeners, and children
//! - `Text`: a leaf text node
//! - `Boundary`: a component instance plus the root of its rendered subtree
//!
//! Boundaries are invisible to the platform (they emit no host node of
//! their own); they exist so the diff can match components by type and so
//! state, listeners, and queued updates can be released when the component
//! leaves the tree.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::component::Component;
use super::view::EventHandler;

/// Unique identifier for a node in the live tree.
///
/// Ids are allocated per [`Arena`], starting at 1, and are never reused
/// within an arena's lifetime. Two runtime instances allocate ids
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Construct an id from its raw value.
    ///
    /// Mostly useful in tests; live ids come out of the arena.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a live node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A host element.
    Element,

    /// A text leaf.
    Text,

    /// A component boundary.
    Boundary,
}

/// A host element node.
pub(crate) struct ElementNode {
    /// Element tag, e.g. `div`.
    pub(crate) tag: String,

    /// Explicit identity key, if the description carried one.
    pub(crate) key: Option<String>,

    /// Void elements cannot carry children.
    pub(crate) void: bool,

    /// Attributes in description order.
    pub(crate) attrs: IndexMap<String, String>,

    /// Event listeners in description order.
    pub(crate) handlers: IndexMap<String, EventHandler>,

    /// Child node ids in document order.
    pub(crate) children: SmallVec<[NodeId; 8]>,
}

impl fmt::Debug for ElementNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementNode")
            .field("tag", &self.tag)
            .field("key", &self.key)
            .field("void", &self.void)
            .field("attrs", &self.attrs)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

/// A text leaf node.
#[derive(Debug)]
pub(crate) struct TextNode {
    /// Current text content.
    pub(crate) text: String,
}

/// A component boundary node.
pub(crate) struct BoundaryNode {
    /// The live component instance.
    ///
    /// Taken out of the arena while the instance's own methods run, so a
    /// render can mutate the tree without aliasing the instance.
    pub(crate) component: Option<Box<dyn Component>>,

    /// Type identity of the instance, captured at description time.
    pub(crate) type_id: TypeId,

    /// Human-readable type name, for logs and errors.
    pub(crate) type_name: &'static str,

    /// Root of the rendered subtree. `None` only mid-mount.
    pub(crate) root: Option<NodeId>,

    /// Component nesting depth of this boundary, root boundary is 0.
    pub(crate) depth: usize,

    /// Number of render passes that have touched this boundary.
    pub(crate) revision: u64,
}

impl fmt::Debug for BoundaryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryNode")
            .field("type_name", &self.type_name)
            .field("root", &self.root)
            .field("depth", &self.depth)
            .field("revision", &self.revision)
            .field("taken", &self.component.is_none())
            .finish()
    }
}

/// The body of a live node.
#[derive(Debug)]
pub(crate) enum NodeBody {
    Element(ElementNode),
    Text(TextNode),
    Boundary(BoundaryNode),
}

/// A node in the live tree.
#[derive(Debug)]
pub(crate) struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    scope: NodeId,
    pub(crate) body: NodeBody,
}

impl Node {
    /// Get the node's id.
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's parent, if it is not the tree root.
    pub(crate) fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Get the component scope that rendered this node.
    ///
    /// A boundary is its own scope; nodes rendered before any boundary
    /// are their own scope as well.
    pub(crate) fn scope(&self) -> NodeId {
        self.scope
    }

    /// Get the node's kind.
    pub(crate) fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Element(_) => NodeKind::Element,
            NodeBody::Text(_) => NodeKind::Text,
            NodeBody::Boundary(_) => NodeKind::Boundary,
        }
    }
}

/// The arena holding every mounted node, indexed by id.
#[derive(Debug, Default)]
pub(crate) struct Arena {
    nodes: HashMap<NodeId, Node>,
    next: u64,
}

impl Arena {
    /// Create an empty arena. Ids start at 1.
    pub(crate) fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next: 1,
        }
    }

    /// Insert a node and return its freshly allocated id.
    ///
    /// When `scope` is `None` the node becomes its own scope, which is
    /// the rule for the tree root and for boundary nodes.
    pub(crate) fn insert(
        &mut self,
        parent: Option<NodeId>,
        scope: Option<NodeId>,
        body: NodeBody,
    ) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        let scope = scope.unwrap_or(id);
        self.nodes.insert(id, Node { id, parent, scope, body });
        id
    }

    /// Remove a node, returning it.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    /// Get a reference to a node.
    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Check whether a node is mounted.
    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Total number of live nodes.
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Get a node's kind.
    pub(crate) fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.get(id).map(Node::kind)
    }

    /// Get a node's owning scope.
    pub(crate) fn scope_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(Node::scope)
    }

    /// Get a node's parent.
    pub(crate) fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Re-parent a node.
    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(node) = self.get_mut(id) {
            node.parent = parent;
        }
    }

    /// Get an element body.
    pub(crate) fn element(&self, id: NodeId) -> Option<&ElementNode> {
        match self.get(id)?.body {
            NodeBody::Element(ref e) => Some(e),
            _ => None,
        }
    }

    /// Get a mutable element body.
    pub(crate) fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementNode> {
        match self.get_mut(id)?.body {
            NodeBody::Element(ref mut e) => Some(e),
            _ => None,
        }
    }

    /// Get a boundary body.
    pub(crate) fn boundary(&self, id: NodeId) -> Option<&BoundaryNode> {
        match self.get(id)?.body {
            NodeBody::Boundary(ref b) => Some(b),
            _ => None,
        }
    }

    /// Get a mutable boundary body.
    pub(crate) fn boundary_mut(&mut self, id: NodeId) -> Option<&mut BoundaryNode> {
        match self.get_mut(id)?.body {
            NodeBody::Boundary(ref mut b) => Some(b),
            _ => None,
        }
    }

    /// Child ids of an element, empty for every other kind.
    pub(crate) fn children_of(&self, id: NodeId) -> &[NodeId] {
        match self.get(id) {
            Some(Node { body: NodeBody::Element(e), .. }) => &e.children,
            _ => &[],
        }
    }

    /// Take a boundary's component instance out of the arena.
    pub(crate) fn take_component(&mut self, id: NodeId) -> Option<Box<dyn Component>> {
        self.boundary_mut(id)?.component.take()
    }

    /// Put a boundary's component instance back.
    pub(crate) fn put_component(&mut self, id: NodeId, component: Box<dyn Component>) {
        if let Some(b) = self.boundary_mut(id) {
            b.component = Some(component);
        }
    }
}
