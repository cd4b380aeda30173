//! Reconciliation Engine
//!
//! The reconciler owns the live tree and is the only code that mutates
//! it. It consumes [`View`] descriptions and makes the minimum set of
//! changes needed to bring the tree in line, emitting one platform
//! mutation per real change.
//!
//! # Matching
//!
//! During a diff, each described child claims a live child:
//!
//! - a keyed element claims the live element with the same key, wherever
//!   it sits, so reorders preserve subtrees
//! - an unkeyed description claims the live child at the same position,
//!   provided that child is unkeyed too
//! - a claim only sticks when the pair is compatible: same tag (and
//!   void-ness) for elements, same component type for boundaries, text
//!   for text
//!
//! Unclaimed live children are unmounted; unmatched descriptions are
//! mounted fresh. A kind or tag switch is never patched in place.
//!
//! # Scopes
//!
//! Every node records the component boundary that rendered it. When a
//! boundary leaves the tree, everything registered under its scope
//! (action handlers, state entries, queued updates) is released before
//! the component's `on_dismount` runs.

use std::collections::{HashMap, HashSet};
use std::fmt;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::engine::context::{Context, Services};
use crate::error::{MountError, UpdateError};
use crate::platform::{Mutation, Platform};

use super::component::{Component, RuntimeEvent};
use super::node::{Arena, BoundaryNode, ElementNode, NodeBody, NodeId, NodeKind, TextNode};
use super::view::{ComponentView, Element, EventHandler, View};

/// Owner of the live tree; turns view descriptions into minimal
/// mutations against it.
pub struct Reconciler {
    arena: Arena,
    platform: Box<dyn Platform>,
    max_depth: usize,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("nodes", &self.arena.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Reconciler {
    /// Create a reconciler with an empty tree.
    pub fn new(platform: Box<dyn Platform>, max_depth: usize) -> Self {
        Self {
            arena: Arena::new(),
            platform,
            max_depth,
        }
    }

    // ------------------------------------------------------------------
    // Mounting
    // ------------------------------------------------------------------

    /// Mount a view description as a root subtree.
    pub(crate) fn mount(
        &mut self,
        services: &mut Services,
        view: View,
    ) -> Result<NodeId, MountError> {
        self.mount_view(services, None, None, 0, view)
    }

    fn mount_view(
        &mut self,
        services: &mut Services,
        parent: Option<NodeId>,
        owner: Option<NodeId>,
        depth: usize,
        view: View,
    ) -> Result<NodeId, MountError> {
        match view {
            View::Text(text) => {
                let id = self.arena.insert(
                    parent,
                    owner,
                    NodeBody::Text(TextNode { text: text.clone() }),
                );
                self.platform.apply(Mutation::CreateText { node: id, text });
                Ok(id)
            }

            View::Element(element) => {
                let Element { tag, key, void, attrs, handlers, children } = element;
                if void && !children.is_empty() {
                    return Err(MountError::VoidWithChildren { tag });
                }

                let id = self.arena.insert(
                    parent,
                    owner,
                    NodeBody::Element(ElementNode {
                        tag: tag.clone(),
                        key,
                        void,
                        attrs: Default::default(),
                        handlers: Default::default(),
                        children: SmallVec::new(),
                    }),
                );
                self.platform.apply(Mutation::CreateElement { node: id, tag });
                for (name, value) in &attrs {
                    self.platform.apply(Mutation::SetAttribute {
                        node: id,
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
                for event in handlers.keys() {
                    self.platform.apply(Mutation::AddListener { node: id, event: event.clone() });
                }
                if let Some(e) = self.arena.element_mut(id) {
                    e.attrs = attrs;
                    e.handlers = handlers;
                }

                let child_owner = self.arena.scope_of(id);
                for child in children {
                    let child_id =
                        self.mount_view(services, Some(id), child_owner, depth, child)?;
                    if let Some(e) = self.arena.element_mut(id) {
                        e.children.push(child_id);
                    }
                    let index = self.arena.children_of(id).len() - 1;
                    let target = self.platform_target(child_id);
                    self.platform.apply(Mutation::InsertChild { parent: id, child: target, index });
                }
                Ok(id)
            }

            View::Component(description) => {
                if depth >= self.max_depth {
                    return Err(MountError::DepthExceeded {
                        component: description.type_name,
                        max: self.max_depth,
                    });
                }
                let ComponentView { mut component, type_id, type_name } = description;

                // The boundary goes in first so the render below sees its
                // own scope id.
                let id = self.arena.insert(
                    parent,
                    None,
                    NodeBody::Boundary(BoundaryNode {
                        component: None,
                        type_id,
                        type_name,
                        root: None,
                        depth,
                        revision: 0,
                    }),
                );
                trace!(node = %id, component = type_name, "mounting component");

                let rendered = component.render(&mut Context::new(id, services));
                let root = self.mount_view(services, Some(id), Some(id), depth + 1, rendered)?;
                if let Some(b) = self.arena.boundary_mut(id) {
                    b.root = Some(root);
                    b.component = Some(component);
                }

                self.with_component(services, id, |c, ctx| c.on_mount(ctx));
                Ok(id)
            }
        }
    }

    // ------------------------------------------------------------------
    // Updating
    // ------------------------------------------------------------------

    /// Bring the subtree at `id` in line with a new description.
    ///
    /// Returns the subtree's (possibly new) root id: an incompatible
    /// description replaces the subtree instead of patching it.
    pub(crate) fn update(
        &mut self,
        services: &mut Services,
        id: NodeId,
        view: View,
    ) -> Result<NodeId, UpdateError> {
        if !self.arena.contains(id) {
            return Err(UpdateError::MissingNode(id));
        }
        if self.compatible(id, &view) {
            self.update_in_place(services, id, view)?;
            Ok(id)
        } else {
            self.replace(services, id, view)
        }
    }

    /// Re-render the component at `scope` and diff its subtree.
    ///
    /// This is the frame flush entry point: the stored instance renders
    /// with its own scope, and the output is reconciled against the
    /// boundary's current root.
    pub(crate) fn update_component_root(
        &mut self,
        services: &mut Services,
        scope: NodeId,
    ) -> Result<(), UpdateError> {
        let Some(boundary) = self.arena.boundary(scope) else {
            return Err(UpdateError::StaleScope(scope));
        };
        let Some(old_root) = boundary.root else {
            return Err(UpdateError::StaleScope(scope));
        };
        let Some(mut component) = self.arena.take_component(scope) else {
            return Err(UpdateError::StaleScope(scope));
        };

        trace!(%scope, "rendering component");
        let rendered = component.render(&mut Context::new(scope, services));
        self.arena.put_component(scope, component);

        let new_root = if self.compatible(old_root, &rendered) {
            self.update_in_place(services, old_root, rendered)?;
            old_root
        } else {
            self.replace(services, old_root, rendered)?
        };
        if let Some(b) = self.arena.boundary_mut(scope) {
            b.root = Some(new_root);
            b.revision += 1;
        }
        Ok(())
    }

    /// Patch a node in place. Caller has checked compatibility.
    fn update_in_place(
        &mut self,
        services: &mut Services,
        id: NodeId,
        view: View,
    ) -> Result<(), UpdateError> {
        match view {
            View::Text(text) => {
                let changed = match self.arena.get_mut(id) {
                    Some(node) => match &mut node.body {
                        NodeBody::Text(t) if t.text != text => {
                            t.text = text.clone();
                            true
                        }
                        _ => false,
                    },
                    None => false,
                };
                if changed {
                    self.platform.apply(Mutation::SetText { node: id, text });
                }
                Ok(())
            }

            View::Element(element) => {
                let Element { tag, key: _, void, attrs, handlers, children } = element;
                if void && !children.is_empty() {
                    return Err(MountError::VoidWithChildren { tag }.into());
                }

                {
                    let Reconciler { arena, platform, .. } = self;
                    let Some(e) = arena.element_mut(id) else {
                        return Err(UpdateError::MissingNode(id));
                    };

                    // Attributes are diffed name by name.
                    for name in e.attrs.keys() {
                        if !attrs.contains_key(name) {
                            platform.apply(Mutation::RemoveAttribute {
                                node: id,
                                name: name.clone(),
                            });
                        }
                    }
                    for (name, value) in &attrs {
                        if e.attrs.get(name) != Some(value) {
                            platform.apply(Mutation::SetAttribute {
                                node: id,
                                name: name.clone(),
                                value: value.clone(),
                            });
                        }
                    }
                    e.attrs = attrs;

                    // Listener sets are diffed by event name; the
                    // callbacks themselves are replaced wholesale, since
                    // closures cannot be compared.
                    for event in e.handlers.keys() {
                        if !handlers.contains_key(event) {
                            platform.apply(Mutation::RemoveListener {
                                node: id,
                                event: event.clone(),
                            });
                        }
                    }
                    for event in handlers.keys() {
                        if !e.handlers.contains_key(event) {
                            platform.apply(Mutation::AddListener {
                                node: id,
                                event: event.clone(),
                            });
                        }
                    }
                    e.handlers = handlers;
                }

                if !void {
                    self.update_children(services, id, children)?;
                }
                Ok(())
            }

            View::Component(description) => {
                // Same type: the described instance replaces the live one
                // (it carries the fresh inputs); scope, subtree, and state
                // survive. Then render through the boundary as usual.
                let ComponentView { component, .. } = description;
                if let Some(b) = self.arena.boundary_mut(id) {
                    b.component = Some(component);
                }
                self.update_component_root(services, id)
            }
        }
    }

    /// Diff an element's children against new descriptions.
    fn update_children(
        &mut self,
        services: &mut Services,
        parent: NodeId,
        views: Vec<View>,
    ) -> Result<(), UpdateError> {
        let old: Vec<NodeId> = self.arena.children_of(parent).to_vec();
        let owner = self.arena.scope_of(parent);
        let depth = self.next_depth(owner);

        let mut keyed: HashMap<String, NodeId> = HashMap::new();
        for &child in &old {
            if let Some(key) = self.key_of(child) {
                keyed.insert(key.to_string(), child);
            }
        }

        let mut claimed: HashSet<NodeId> = HashSet::new();
        let mut fresh: HashSet<NodeId> = HashSet::new();
        let mut next: Vec<NodeId> = Vec::with_capacity(views.len());

        for (position, view) in views.into_iter().enumerate() {
            let candidate = match view.key() {
                Some(key) => keyed.get(key).copied(),
                None => old
                    .get(position)
                    .copied()
                    .filter(|&c| self.key_of(c).is_none()),
            };
            let candidate =
                candidate.filter(|&c| !claimed.contains(&c) && self.compatible(c, &view));

            match candidate {
                Some(child) => {
                    claimed.insert(child);
                    self.update_in_place(services, child, view)?;
                    next.push(child);
                }
                None => {
                    let mounted = self
                        .mount_view(services, Some(parent), owner, depth, view)
                        .map_err(UpdateError::Mount)?;
                    fresh.insert(mounted);
                    next.push(mounted);
                }
            }
        }

        for &child in &old {
            if !claimed.contains(&child) {
                self.unmount(services, child, true);
            }
        }

        self.place_children(parent, &old, &next, &claimed, &fresh);

        if let Some(e) = self.arena.element_mut(parent) {
            e.children = next.into_iter().collect();
        }
        Ok(())
    }

    /// Emit the inserts and moves that bring the host's child list into
    /// the described order.
    ///
    /// `current` simulates the host list (survivors, in old order, with
    /// removals already applied), so every emitted index is exactly what
    /// the host sees at that moment.
    fn place_children(
        &mut self,
        parent: NodeId,
        old: &[NodeId],
        next: &[NodeId],
        claimed: &HashSet<NodeId>,
        fresh: &HashSet<NodeId>,
    ) {
        let mut current: Vec<NodeId> =
            old.iter().copied().filter(|c| claimed.contains(c)).collect();

        for (index, &child) in next.iter().enumerate() {
            if fresh.contains(&child) {
                let target = self.platform_target(child);
                self.platform.apply(Mutation::InsertChild { parent, child: target, index });
                current.insert(index, child);
                continue;
            }
            if current.get(index) == Some(&child) {
                continue;
            }
            if let Some(position) = current.iter().position(|&c| c == child) {
                current.remove(position);
                current.insert(index, child);
                let target = self.platform_target(child);
                self.platform.apply(Mutation::MoveChild { parent, child: target, index });
            }
        }
    }

    /// Tear down the subtree at `id` and mount a new description in its
    /// slot.
    fn replace(
        &mut self,
        services: &mut Services,
        id: NodeId,
        view: View,
    ) -> Result<NodeId, UpdateError> {
        let Some(node) = self.arena.get(id) else {
            return Err(UpdateError::MissingNode(id));
        };
        let parent = node.parent();
        let owner = if node.scope() == id { None } else { Some(node.scope()) };
        let depth = self.mount_depth_for(id);
        let slot = self.attachment(id);

        debug!(node = %id, "replacing subtree");
        self.unmount(services, id, true);
        let new = self
            .mount_view(services, parent, owner, depth, view)
            .map_err(UpdateError::Mount)?;

        // Repair the parent's reference to this slot.
        if let Some(p) = parent {
            if let Some(e) = self.arena.element_mut(p) {
                if let Some(position) = e.children.iter().position(|&c| c == id) {
                    e.children[position] = new;
                }
            } else if let Some(b) = self.arena.boundary_mut(p) {
                b.root = Some(new);
            }
        }

        let target = self.platform_target(new);
        match slot {
            Some((parent_el, index)) => {
                self.platform.apply(Mutation::InsertChild { parent: parent_el, child: target, index });
            }
            None => self.platform.apply(Mutation::SetRoot { node: target }),
        }
        Ok(new)
    }

    // ------------------------------------------------------------------
    // Unmounting
    // ------------------------------------------------------------------

    /// Unmount the subtree at `id`.
    ///
    /// With `detach` the host is told to remove the subtree's node from
    /// its parent first; without, the caller owns the slot (root swaps).
    pub(crate) fn unmount(&mut self, services: &mut Services, id: NodeId, detach: bool) {
        if detach {
            if let Some((parent_el, _)) = self.attachment(id) {
                let target = self.platform_target(id);
                self.platform.apply(Mutation::RemoveChild { parent: parent_el, child: target });
            }
        }
        self.teardown(services, id);
    }

    fn teardown(&mut self, services: &mut Services, id: NodeId) {
        let Some(node) = self.arena.remove(id) else { return };
        match node.body {
            NodeBody::Text(_) => {
                self.platform.apply(Mutation::RemoveNode { node: id });
            }
            NodeBody::Element(e) => {
                for child in e.children {
                    self.teardown(services, child);
                }
                self.platform.apply(Mutation::RemoveNode { node: id });
            }
            NodeBody::Boundary(b) => {
                debug!(node = %id, component = b.type_name, "dismounting component");
                if let Some(root) = b.root {
                    self.teardown(services, root);
                }
                // Scope resources go first so on_dismount observes a
                // fully released component.
                services.release_scope(id);
                if let Some(mut component) = b.component {
                    component.on_dismount();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Walk the subtree at `root` depth-first, delivering a runtime event
    /// to every component.
    pub(crate) fn notify_component_event(
        &mut self,
        services: &mut Services,
        root: NodeId,
        event: &RuntimeEvent,
    ) {
        let mut stack: Vec<NodeId> = vec![root];
        while let Some(id) = stack.pop() {
            let descend: SmallVec<[NodeId; 8]> = match self.arena.get(id).map(|n| &n.body) {
                Some(NodeBody::Element(e)) => e.children.clone(),
                Some(NodeBody::Boundary(b)) => b.root.into_iter().collect(),
                _ => SmallVec::new(),
            };
            for &child in descend.iter().rev() {
                stack.push(child);
            }
            if self.arena.kind_of(id) == Some(NodeKind::Boundary) {
                self.with_component(services, id, |c, ctx| c.on_event(ctx, event));
            }
        }
    }

    /// Look up the listener of `node` for a named event, with the scope
    /// it should run under.
    pub(crate) fn event_handler(
        &self,
        node: NodeId,
        event: &str,
    ) -> Option<(NodeId, EventHandler)> {
        let element = self.arena.element(node)?;
        let handler = element.handlers.get(event)?.clone();
        let scope = self.arena.scope_of(node)?;
        Some((scope, handler))
    }

    /// Run a closure against a boundary's component instance.
    ///
    /// The instance is taken out of the arena for the duration, so the
    /// closure gets a [`Context`] without aliasing the tree.
    fn with_component(
        &mut self,
        services: &mut Services,
        id: NodeId,
        f: impl FnOnce(&mut dyn Component, &mut Context<'_>),
    ) {
        if let Some(mut component) = self.arena.take_component(id) {
            f(component.as_mut(), &mut Context::new(id, services));
            self.arena.put_component(id, component);
        }
    }

    // ------------------------------------------------------------------
    // Platform plumbing
    // ------------------------------------------------------------------

    /// Tell the host which node is the root of the whole surface.
    pub(crate) fn announce_root(&mut self, id: NodeId) {
        let target = self.platform_target(id);
        self.platform.apply(Mutation::SetRoot { node: target });
    }

    /// Pass a mutation straight through to the platform.
    pub(crate) fn emit(&mut self, mutation: Mutation) {
        self.platform.apply(mutation);
    }

    /// Resolve a node to the concrete node the host knows: boundaries are
    /// transparent, so this follows boundary roots down to an element or
    /// text node.
    fn platform_target(&self, id: NodeId) -> NodeId {
        let mut current = id;
        loop {
            match self.arena.get(current).map(|n| &n.body) {
                Some(NodeBody::Boundary(b)) => match b.root {
                    Some(root) => current = root,
                    None => return current,
                },
                _ => return current,
            }
        }
    }

    /// The element the host attaches `id` under, with `id`'s index in its
    /// child list. `None` for the tree root.
    fn attachment(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let mut child = id;
        let mut parent = self.arena.parent_of(child)?;
        loop {
            match self.arena.kind_of(parent)? {
                NodeKind::Element => {
                    let index = self
                        .arena
                        .children_of(parent)
                        .iter()
                        .position(|&c| c == child)?;
                    return Some((parent, index));
                }
                NodeKind::Boundary => {
                    child = parent;
                    parent = self.arena.parent_of(parent)?;
                }
                NodeKind::Text => return None,
            }
        }
    }

    /// Component nesting depth for fresh mounts under `owner`.
    fn next_depth(&self, owner: Option<NodeId>) -> usize {
        owner
            .and_then(|o| self.arena.boundary(o))
            .map_or(0, |b| b.depth + 1)
    }

    /// Component nesting depth to remount the slot currently held by `id`.
    fn mount_depth_for(&self, id: NodeId) -> usize {
        match self.arena.boundary(id) {
            Some(b) => b.depth,
            None => self.next_depth(self.arena.scope_of(id)),
        }
    }

    /// Whether a live node can be patched in place by a description.
    fn compatible(&self, id: NodeId, view: &View) -> bool {
        let Some(node) = self.arena.get(id) else { return false };
        match (&node.body, view) {
            (NodeBody::Text(_), View::Text(_)) => true,
            (NodeBody::Element(e), View::Element(v)) => {
                e.tag == v.tag && e.void == v.void && e.key == v.key
            }
            (NodeBody::Boundary(b), View::Component(c)) => b.type_id == c.type_id,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Whether a node is mounted.
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    /// Total number of live nodes, boundaries included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.len() == 0
    }

    /// A node's kind.
    pub fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.arena.kind_of(id)
    }

    /// A node's parent.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.arena.parent_of(id)
    }

    /// The component scope that rendered a node.
    pub fn scope_of(&self, id: NodeId) -> Option<NodeId> {
        self.arena.scope_of(id)
    }

    /// An element's children, empty for other kinds.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.arena.children_of(id)
    }

    /// An element's tag.
    pub fn tag_of(&self, id: NodeId) -> Option<&str> {
        self.arena.element(id).map(|e| e.tag.as_str())
    }

    /// An element's explicit key, if any.
    pub fn key_of(&self, id: NodeId) -> Option<&str> {
        self.arena.element(id)?.key.as_deref()
    }

    /// A text node's content.
    pub fn text_of(&self, id: NodeId) -> Option<&str> {
        match self.arena.get(id).map(|n| &n.body) {
            Some(NodeBody::Text(t)) => Some(t.text.as_str()),
            _ => None,
        }
    }

    /// An element's attribute value.
    pub fn attr_of(&self, id: NodeId, name: &str) -> Option<&str> {
        self.arena.element(id)?.attrs.get(name).map(String::as_str)
    }

    /// Whether an element has a listener for the named event.
    pub fn has_listener(&self, id: NodeId, event: &str) -> bool {
        self.arena
            .element(id)
            .is_some_and(|e| e.handlers.contains_key(event))
    }

    /// A boundary's render count.
    pub fn revision_of(&self, id: NodeId) -> Option<u64> {
        self.arena.boundary(id).map(|b| b.revision)
    }

    /// A boundary's component type name.
    pub fn component_name_of(&self, id: NodeId) -> Option<&'static str> {
        self.arena.boundary(id).map(|b| b.type_name)
    }

    /// The root of a boundary's rendered subtree.
    pub fn boundary_root_of(&self, id: NodeId) -> Option<NodeId> {
        self.arena.boundary(id)?.root
    }

    /// Serialize the subtree at `id` as HTML-ish markup.
    ///
    /// Boundaries are transparent; text and attribute values are
    /// escaped. Useful for prerendering and for structural assertions in
    /// tests.
    pub fn markup(&self, id: NodeId) -> Option<String> {
        if !self.arena.contains(id) {
            return None;
        }
        let mut out = String::new();
        self.write_markup(id, &mut out);
        Some(out)
    }

    fn write_markup(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.arena.get(id) else { return };
        match &node.body {
            NodeBody::Text(t) => out.push_str(&escape(&t.text)),
            NodeBody::Boundary(b) => {
                if let Some(root) = b.root {
                    self.write_markup(root, out);
                }
            }
            NodeBody::Element(e) => {
                out.push('<');
                out.push_str(&e.tag);
                for (name, value) in &e.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value));
                    out.push('"');
                }
                out.push('>');
                if !e.void {
                    for &child in &e.children {
                        self.write_markup(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&e.tag);
                    out.push('>');
                }
            }
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::test_support::{test_rig, TestRig};
    use crate::platform::Recorder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn harness() -> (Reconciler, TestRig, Recorder) {
        let recorder = Recorder::new();
        let tree = Reconciler::new(Box::new(recorder.clone()), 32);
        (tree, test_rig(), recorder)
    }

    fn list(items: &[&str]) -> View {
        View::element("ul")
            .children(items.iter().map(|item| {
                View::element("li").key(*item).child(View::text(*item))
            }))
            .build()
    }

    #[test]
    fn mounting_text_creates_one_node() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree.mount(&mut rig.services, View::text("hi")).unwrap();

        assert_eq!(tree.text_of(id), Some("hi"));
        assert_eq!(recorder.mutations(), vec![Mutation::CreateText { node: id, text: "hi".into() }]);
    }

    #[test]
    fn mounting_an_element_emits_attrs_listeners_and_children_in_order() {
        let (mut tree, mut rig, recorder) = harness();
        let view = View::element("div")
            .attr("id", "app")
            .on("click", |_ctx, _event| {})
            .child(View::text("hello"))
            .build();

        let id = tree.mount(&mut rig.services, view).unwrap();
        let child = tree.children_of(id)[0];

        assert_eq!(
            recorder.mutations(),
            vec![
                Mutation::CreateElement { node: id, tag: "div".into() },
                Mutation::SetAttribute { node: id, name: "id".into(), value: "app".into() },
                Mutation::AddListener { node: id, event: "click".into() },
                Mutation::CreateText { node: child, text: "hello".into() },
                Mutation::InsertChild { parent: id, child, index: 0 },
            ]
        );
        assert_eq!(tree.markup(id).unwrap(), "<div id=\"app\">hello</div>");
    }

    #[test]
    fn void_elements_with_children_refuse_to_mount() {
        let (mut tree, mut rig, _recorder) = harness();
        let view = View::void("img").child(View::text("nope")).build();

        let err = tree.mount(&mut rig.services, view).unwrap_err();
        assert!(matches!(err, MountError::VoidWithChildren { tag } if tag == "img"));
    }

    struct Endless;

    impl Component for Endless {
        fn render(&mut self, _ctx: &mut Context<'_>) -> View {
            View::component(Endless)
        }
    }

    #[test]
    fn unbounded_component_nesting_trips_the_depth_cap() {
        let (mut tree, mut rig, _recorder) = harness();
        let err = tree.mount(&mut rig.services, View::component(Endless)).unwrap_err();
        assert!(matches!(err, MountError::DepthExceeded { max: 32, .. }));
    }

    #[test]
    fn identical_update_emits_no_mutations() {
        let (mut tree, mut rig, recorder) = harness();
        let build = || {
            View::element("div")
                .attr("class", "panel")
                .child(View::element("span").child(View::text("stable")))
                .child(View::void("img").attr("src", "/x.png"))
                .build()
        };

        let id = tree.mount(&mut rig.services, build()).unwrap();
        let nodes_before = tree.len();
        recorder.clear();

        let same = tree.update(&mut rig.services, id, build()).unwrap();

        assert_eq!(same, id);
        assert_eq!(tree.len(), nodes_before);
        assert!(recorder.is_empty(), "unexpected mutations: {:?}", recorder.mutations());
    }

    #[test]
    fn text_change_is_a_single_set_text() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree
            .mount(&mut rig.services, View::element("p").child(View::text("one")).build())
            .unwrap();
        let text = tree.children_of(id)[0];
        recorder.clear();

        tree.update(&mut rig.services, id, View::element("p").child(View::text("two")).build())
            .unwrap();

        assert_eq!(recorder.mutations(), vec![Mutation::SetText { node: text, text: "two".into() }]);
        assert_eq!(tree.text_of(text), Some("two"));
    }

    #[test]
    fn attribute_diff_touches_only_what_changed() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree
            .mount(
                &mut rig.services,
                View::element("div").attr("a", "1").attr("b", "2").attr("c", "3").build(),
            )
            .unwrap();
        recorder.clear();

        // a unchanged, b changed, c removed, d added.
        tree.update(
            &mut rig.services,
            id,
            View::element("div").attr("a", "1").attr("b", "9").attr("d", "4").build(),
        )
        .unwrap();

        assert_eq!(
            recorder.mutations(),
            vec![
                Mutation::RemoveAttribute { node: id, name: "c".into() },
                Mutation::SetAttribute { node: id, name: "b".into(), value: "9".into() },
                Mutation::SetAttribute { node: id, name: "d".into(), value: "4".into() },
            ]
        );
        assert_eq!(tree.attr_of(id, "c"), None);
        assert_eq!(tree.attr_of(id, "b"), Some("9"));
    }

    #[test]
    fn listener_diff_adds_and_removes_by_event_name() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree
            .mount(
                &mut rig.services,
                View::element("button").on("click", |_c, _e| {}).on("focus", |_c, _e| {}).build(),
            )
            .unwrap();
        recorder.clear();

        tree.update(
            &mut rig.services,
            id,
            View::element("button").on("click", |_c, _e| {}).on("blur", |_c, _e| {}).build(),
        )
        .unwrap();

        assert_eq!(
            recorder.mutations(),
            vec![
                Mutation::RemoveListener { node: id, event: "focus".into() },
                Mutation::AddListener { node: id, event: "blur".into() },
            ]
        );
        assert!(tree.has_listener(id, "click"));
        assert!(tree.has_listener(id, "blur"));
        assert!(!tree.has_listener(id, "focus"));
    }

    #[test]
    fn keyed_reorder_moves_nodes_instead_of_recreating_them() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree.mount(&mut rig.services, list(&["a", "b", "c"])).unwrap();
        let before: Vec<NodeId> = tree.children_of(id).to_vec();
        recorder.clear();

        tree.update(&mut rig.services, id, list(&["c", "a", "b"])).unwrap();

        let after: Vec<NodeId> = tree.children_of(id).to_vec();
        assert_eq!(after, vec![before[2], before[0], before[1]]);
        // One move suffices: pulling c to the front leaves a and b in order.
        assert_eq!(
            recorder.mutations(),
            vec![Mutation::MoveChild { parent: id, child: before[2], index: 0 }]
        );
    }

    #[test]
    fn dropping_a_keyed_row_unmounts_only_that_row() {
        let (mut tree, mut rig, recorder) = harness();
        let id = tree.mount(&mut rig.services, list(&["a", "b", "c"])).unwrap();
        let before: Vec<NodeId> = tree.children_of(id).to_vec();
        let b_text = tree.children_of(before[1])[0];
        recorder.clear();

        tree.update(&mut rig.services, id, list(&["a", "c"])).unwrap();

        assert_eq!(tree.children_of(id), &[before[0], before[2]]);
        assert_eq!(
            recorder.mutations(),
            vec![
                Mutation::RemoveChild { parent: id, child: before[1] },
                Mutation::RemoveNode { node: b_text },
                Mutation::RemoveNode { node: before[1] },
            ]
        );
    }

    #[test]
    fn tag_switch_replaces_the_subtree() {
        let (mut tree, mut rig, recorder) = harness();
        let parent = tree
            .mount(&mut rig.services, View::element("div").child(View::element("span")).build())
            .unwrap();
        let old_child = tree.children_of(parent)[0];
        recorder.clear();

        tree.update(&mut rig.services, parent, View::element("div").child(View::element("em")).build())
            .unwrap();

        let new_child = tree.children_of(parent)[0];
        assert_ne!(new_child, old_child);
        assert!(!tree.contains(old_child));
        assert_eq!(tree.tag_of(new_child), Some("em"));
    }

    struct Probe {
        label: &'static str,
        mounts: Arc<AtomicUsize>,
        dismounts: Arc<AtomicUsize>,
    }

    impl Component for Probe {
        fn render(&mut self, _ctx: &mut Context<'_>) -> View {
            View::element("div").attr("class", self.label).build()
        }

        fn on_mount(&mut self, _ctx: &mut Context<'_>) {
            self.mounts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_dismount(&mut self) {
            self.dismounts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Other;

    impl Component for Other {
        fn render(&mut self, _ctx: &mut Context<'_>) -> View {
            View::text("other")
        }
    }

    #[test]
    fn component_type_switch_dismounts_the_old_instance_and_releases_its_scope() {
        let (mut tree, mut rig, _recorder) = harness();
        let mounts = Arc::new(AtomicUsize::new(0));
        let dismounts = Arc::new(AtomicUsize::new(0));

        let host = tree
            .mount(
                &mut rig.services,
                View::element("main")
                    .child(View::component(Probe {
                        label: "first",
                        mounts: mounts.clone(),
                        dismounts: dismounts.clone(),
                    }))
                    .build(),
            )
            .unwrap();
        let boundary = tree.children_of(host)[0];

        // Give the scope something to release.
        Context::new(boundary, &mut rig.services).set_state("k", &1_u32);
        rig.services.updates.add(boundary);
        assert_eq!(mounts.load(Ordering::SeqCst), 1);

        tree.update(
            &mut rig.services,
            host,
            View::element("main").child(View::component(Other)).build(),
        )
        .unwrap();

        assert_eq!(dismounts.load(Ordering::SeqCst), 1);
        assert!(!tree.contains(boundary));
        assert!(rig.services.states.is_empty());
        assert!(rig.services.updates.is_empty());
        let replacement = tree.children_of(host)[0];
        assert_eq!(tree.component_name_of(replacement), Some(std::any::type_name::<Other>()));
    }

    #[test]
    fn matching_component_update_keeps_scope_and_bumps_revision() {
        let (mut tree, mut rig, _recorder) = harness();
        let mounts = Arc::new(AtomicUsize::new(0));
        let dismounts = Arc::new(AtomicUsize::new(0));

        let host = tree
            .mount(
                &mut rig.services,
                View::element("main")
                    .child(View::component(Probe {
                        label: "first",
                        mounts: mounts.clone(),
                        dismounts: dismounts.clone(),
                    }))
                    .build(),
            )
            .unwrap();
        let boundary = tree.children_of(host)[0];
        assert_eq!(tree.revision_of(boundary), Some(0));

        tree.update(
            &mut rig.services,
            host,
            View::element("main")
                .child(View::component(Probe {
                    label: "second",
                    mounts: mounts.clone(),
                    dismounts: dismounts.clone(),
                }))
                .build(),
        )
        .unwrap();

        // Same boundary, fresh inputs, no lifecycle churn.
        assert_eq!(tree.children_of(host)[0], boundary);
        assert_eq!(tree.revision_of(boundary), Some(1));
        assert_eq!(mounts.load(Ordering::SeqCst), 1);
        assert_eq!(dismounts.load(Ordering::SeqCst), 0);
        let root = tree.boundary_root_of(boundary).unwrap();
        assert_eq!(tree.attr_of(root, "class"), Some("second"));
    }

    #[test]
    fn update_component_root_on_a_dead_scope_is_a_stale_scope_error() {
        let (mut tree, mut rig, _recorder) = harness();
        let err = tree
            .update_component_root(&mut rig.services, NodeId::from_raw(99))
            .unwrap_err();
        assert!(matches!(err, UpdateError::StaleScope(_)));
    }

    struct Recording {
        label: &'static str,
        seen: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        inner: bool,
    }

    impl Component for Recording {
        fn render(&mut self, _ctx: &mut Context<'_>) -> View {
            if self.inner {
                View::element("div")
                    .child(View::component(Recording {
                        label: "inner",
                        seen: self.seen.clone(),
                        inner: false,
                    }))
                    .build()
            } else {
                View::text("leaf")
            }
        }

        fn on_event(&mut self, _ctx: &mut Context<'_>, event: &RuntimeEvent) {
            if *event == RuntimeEvent::Navigation {
                self.seen.lock().push(self.label);
            }
        }
    }

    #[test]
    fn runtime_events_reach_components_depth_first() {
        let (mut tree, mut rig, _recorder) = harness();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let root = tree
            .mount(
                &mut rig.services,
                View::component(Recording { label: "outer", seen: seen.clone(), inner: true }),
            )
            .unwrap();

        tree.notify_component_event(&mut rig.services, root, &RuntimeEvent::Navigation);

        assert_eq!(*seen.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn markup_escapes_text_and_attribute_values() {
        let (mut tree, mut rig, _recorder) = harness();
        let id = tree
            .mount(
                &mut rig.services,
                View::element("p").attr("title", "a\"b").child(View::text("1 < 2 & 3")).build(),
            )
            .unwrap();

        assert_eq!(
            tree.markup(id).unwrap(),
            "<p title=\"a&quot;b\">1 &lt; 2 &amp; 3</p>"
        );
    }

    #[test]
    fn event_handler_lookup_resolves_the_owning_scope() {
        let (mut tree, mut rig, _recorder) = harness();

        struct Clickable;
        impl Component for Clickable {
            fn render(&mut self, _ctx: &mut Context<'_>) -> View {
                View::element("button").on("click", |_c, _e| {}).build()
            }
        }

        let boundary = tree.mount(&mut rig.services, View::component(Clickable)).unwrap();
        let button = tree.boundary_root_of(boundary).unwrap();

        let (scope, _handler) = tree.event_handler(button, "click").unwrap();
        assert_eq!(scope, boundary);
        assert!(tree.event_handler(button, "hover").is_none());
    }
}
