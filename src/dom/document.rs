//! In-memory document arena.
//!
//! Nodes live in id-indexed slots with a free pool; the handle is a cheap
//! clone over shared storage. This is the mutation surface the reconciler
//! and the hydration client target; a browser backend would implement the
//! same operations against real DOM nodes.
//!
//! Marker nodes serialize as comments. They bracket the child ranges owned
//! by structural nodes so `Show`/`For`/`Async` can splice their output
//! without touching siblings.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::render::escape::{escape_attr, escape_text};

pub type NodeId = usize;

/// Root node id. Always an element-like container.
pub const ROOT: NodeId = 0;

use crate::dom::{RAW_TEXT_ELEMENTS, VOID_ELEMENTS};

pub enum NodeKind<Ev> {
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
        listeners: Vec<(String, Rc<dyn Fn(&Ev)>)>,
    },
    Text(String),
    Marker(String),
}

struct Slot<Ev> {
    kind: NodeKind<Ev>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct DocumentInner<Ev> {
    slots: Vec<Option<Slot<Ev>>>,
    free: Vec<NodeId>,
}

pub struct Document<Ev> {
    inner: Rc<RefCell<DocumentInner<Ev>>>,
}

impl<Ev> Clone for Document<Ev> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Ev> Default for Document<Ev> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ev> Document<Ev> {
    pub fn new() -> Self {
        let root = Slot {
            kind: NodeKind::Element {
                tag: String::from("#document"),
                attrs: IndexMap::new(),
                listeners: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(DocumentInner {
                slots: vec![Some(root)],
                free: Vec::new(),
            })),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    fn alloc(&self, kind: NodeKind<Ev>) -> NodeId {
        let mut inner = self.inner.borrow_mut();
        let slot = Slot {
            kind,
            parent: None,
            children: Vec::new(),
        };
        match inner.free.pop() {
            Some(id) => {
                inner.slots[id] = Some(slot);
                id
            }
            None => {
                inner.slots.push(Some(slot));
                inner.slots.len() - 1
            }
        }
    }

    pub fn create_element(&self, tag: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element {
            tag: tag.into(),
            attrs: IndexMap::new(),
            listeners: Vec::new(),
        })
    }

    pub fn create_text(&self, content: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(content.into()))
    }

    pub fn create_marker(&self, label: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Marker(label.into()))
    }

    pub fn exists(&self, node: NodeId) -> bool {
        self.inner
            .borrow()
            .slots
            .get(node)
            .is_some_and(|s| s.is_some())
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.borrow().slots[node].as_ref().and_then(|s| s.parent)
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner.borrow().slots[node]
            .as_ref()
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` into `parent` before `reference` (append when None).
    /// Detaches the child from its current parent first, so this is also
    /// the move operation.
    pub fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let mut inner = self.inner.borrow_mut();
        let slot = inner.slots[parent].as_mut().expect("parent freed");
        let index = match reference {
            Some(r) => slot
                .children
                .iter()
                .position(|&c| c == r)
                .unwrap_or(slot.children.len()),
            None => slot.children.len(),
        };
        slot.children.insert(index, child);
        inner.slots[child].as_mut().expect("child freed").parent = Some(parent);
    }

    /// Unlink a node from its parent without freeing it.
    pub fn detach(&self, node: NodeId) {
        let mut inner = self.inner.borrow_mut();
        let parent = match inner.slots[node].as_ref().and_then(|s| s.parent) {
            Some(p) => p,
            None => return,
        };
        if let Some(parent_slot) = inner.slots[parent].as_mut() {
            parent_slot.children.retain(|&c| c != node);
        }
        inner.slots[node].as_mut().expect("node freed").parent = None;
    }

    /// Detach and free a subtree. Freed ids return to the pool.
    pub fn remove(&self, node: NodeId) {
        self.detach(node);
        let mut stack = vec![node];
        let mut inner = self.inner.borrow_mut();
        while let Some(id) = stack.pop() {
            if let Some(slot) = inner.slots[id].take() {
                stack.extend(slot.children);
                inner.free.push(id);
            }
        }
    }

    /// Subtree ids in document order, `node` included.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let inner = self.inner.borrow();
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let Some(slot) = inner.slots.get(id).and_then(|s| s.as_ref()) else {
                continue;
            };
            out.push(id);
            for &child in slot.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    // =========================================================================
    // Node content
    // =========================================================================

    pub fn tag(&self, node: NodeId) -> Option<String> {
        let inner = self.inner.borrow();
        match inner.slots[node].as_ref().map(|s| &s.kind) {
            Some(NodeKind::Element { tag, .. }) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn is_marker(&self, node: NodeId) -> bool {
        matches!(
            self.inner.borrow().slots[node].as_ref().map(|s| &s.kind),
            Some(NodeKind::Marker(_))
        )
    }

    pub fn set_text(&self, node: NodeId, content: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slots[node].as_mut() {
            if let NodeKind::Text(existing) = &mut slot.kind {
                *existing = content.into();
            }
        }
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        let inner = self.inner.borrow();
        match inner.slots[node].as_ref().map(|s| &s.kind) {
            Some(NodeKind::Text(content)) => Some(content.clone()),
            _ => None,
        }
    }

    /// Concatenated text of a subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        for id in self.descendants(node) {
            if let Some(t) = self.text(id) {
                out.push_str(&t);
            }
        }
        out
    }

    pub fn set_attribute(&self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slots[node].as_mut() {
            if let NodeKind::Element { attrs, .. } = &mut slot.kind {
                attrs.insert(name.into(), value.into());
            }
        }
    }

    pub fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slots[node].as_mut() {
            if let NodeKind::Element { attrs, .. } = &mut slot.kind {
                attrs.shift_remove(name);
            }
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let inner = self.inner.borrow();
        match inner.slots[node].as_ref().map(|s| &s.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs.get(name).cloned(),
            _ => None,
        }
    }

    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let inner = self.inner.borrow();
        match inner.slots[node].as_ref().map(|s| &s.kind) {
            Some(NodeKind::Element { attrs, .. }) => attrs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Elements carrying the attribute, in document order.
    pub fn elements_with_attribute(&self, name: &str) -> Vec<NodeId> {
        self.descendants(ROOT)
            .into_iter()
            .filter(|&id| self.attribute(id, name).is_some())
            .collect()
    }

    /// First element whose `id` attribute equals `value`.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(ROOT)
            .into_iter()
            .find(|&id| self.attribute(id, "id").as_deref() == Some(value))
    }

    // =========================================================================
    // Listeners and dispatch
    // =========================================================================

    pub fn add_listener(&self, node: NodeId, event: impl Into<String>, handler: Rc<dyn Fn(&Ev)>) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slots[node].as_mut() {
            if let NodeKind::Element { listeners, .. } = &mut slot.kind {
                listeners.push((event.into(), handler));
            }
        }
    }

    pub fn clear_listeners(&self, node: NodeId, event: &str) {
        let mut inner = self.inner.borrow_mut();
        if let Some(slot) = inner.slots[node].as_mut() {
            if let NodeKind::Element { listeners, .. } = &mut slot.kind {
                listeners.retain(|(name, _)| name != event);
            }
        }
    }

    pub fn listener_count(&self, node: NodeId, event: &str) -> usize {
        let inner = self.inner.borrow();
        match inner.slots[node].as_ref().map(|s| &s.kind) {
            Some(NodeKind::Element { listeners, .. }) => {
                listeners.iter().filter(|(name, _)| name == event).count()
            }
            _ => 0,
        }
    }

    /// Synchronously invoke the node's listeners for `event`. Listeners are
    /// collected before any is called, so a handler mutating the document
    /// cannot invalidate the iteration. Returns how many ran.
    pub fn dispatch(&self, node: NodeId, event: &str, value: &Ev) -> usize {
        let handlers: Vec<Rc<dyn Fn(&Ev)>> = {
            let inner = self.inner.borrow();
            match inner.slots[node].as_ref().map(|s| &s.kind) {
                Some(NodeKind::Element { listeners, .. }) => listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, h)| h.clone())
                    .collect(),
                _ => Vec::new(),
            }
        };
        for handler in &handlers {
            handler(value);
        }
        handlers.len()
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize a subtree. The root serializes as its children only.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if node == ROOT {
            for child in self.children(node) {
                self.write_html(child, false, &mut out);
            }
        } else {
            self.write_html(node, false, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, raw_text: bool, out: &mut String) {
        enum Shape {
            Element { tag: String, attrs: Vec<(String, String)> },
            Text(String),
            Marker(String),
        }

        let shape = {
            let inner = self.inner.borrow();
            match inner.slots[node].as_ref().map(|s| &s.kind) {
                Some(NodeKind::Element { tag, attrs, .. }) => Shape::Element {
                    tag: tag.clone(),
                    attrs: attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                },
                Some(NodeKind::Text(content)) => Shape::Text(content.clone()),
                Some(NodeKind::Marker(label)) => Shape::Marker(label.clone()),
                None => return,
            }
        };

        match shape {
            Shape::Element { tag, attrs } => {
                out.push('<');
                out.push_str(&tag);
                for (name, value) in &attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
                for child in self.children(node) {
                    self.write_html(child, raw, out);
                }
                out.push_str("</");
                out.push_str(&tag);
                out.push('>');
            }
            Shape::Text(content) => {
                if raw_text {
                    out.push_str(&content);
                } else {
                    out.push_str(&escape_text(&content));
                }
            }
            Shape::Marker(label) => {
                out.push_str("<!--");
                out.push_str(&label);
                out.push_str("-->");
            }
        }
    }
}
