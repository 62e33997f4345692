//! Reactive mounting: wiring a virtual tree into a live document.
//!
//! Mounting walks the tree once. Static parts become document nodes
//! directly; every dynamic point (a dynamic attribute, a dynamic text, a
//! structural node) gets exactly one effect that owns exactly that point.
//! There is no re-render of the whole tree, ever: a signal write reaches
//! the effects whose dependency sets contain it and nothing else.
//!
//! Structural nodes bracket their output with marker nodes so branch swaps
//! and row reorders splice without touching siblings. Branch and row
//! subtrees each live in their own detached `EffectScope`; swapping a
//! branch stops the old scope before the new one mounts. Factories run
//! under `untrack`, so building a subtree never adds dependencies to the
//! structural effect that triggered it; effects created during the build
//! still track their own reads.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dom::document::{Document, NodeId};
use crate::node::{
    AsyncNode, AsyncSnapshot, Attr, ForEntry, ForNode, ForRows, IslandNode, ShowNode, VNode,
};
use crate::pipeline::keyed::diff_keys;
use crate::primitives::effect::effect;
use crate::primitives::scope::{effect_scope, on_scope_dispose, EffectScope};
use crate::reactivity::batching::untrack;
use crate::render::escape::escape_script_json;

/// A mounted tree: the owning scope plus the top-level node ids.
///
/// The scope is a child of whatever scope was active at mount time, so a
/// mount made inside an island or a branch dies with it. At top level,
/// keep the handle alive for as long as the tree should stay reactive;
/// call [`MountHandle::unmount`] to tear everything down.
pub struct MountHandle<Ev> {
    doc: Document<Ev>,
    scope: EffectScope,
    nodes: Vec<NodeId>,
}

impl<Ev> MountHandle<Ev> {
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn scope(&self) -> &EffectScope {
        &self.scope
    }

    /// Stop every effect the mount created and remove its nodes.
    pub fn unmount(self) {
        self.scope.stop();
        for &node in &self.nodes {
            self.doc.remove(node);
        }
    }
}

/// Mount `node` as the last children of `parent`.
pub fn mount<Ev: 'static>(doc: &Document<Ev>, parent: NodeId, node: &VNode<Ev>) -> MountHandle<Ev> {
    mount_before(doc, parent, None, node)
}

/// Mount `node` into `parent` before `reference`.
pub fn mount_before<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    reference: Option<NodeId>,
    node: &VNode<Ev>,
) -> MountHandle<Ev> {
    let scope = effect_scope(false);
    let nodes = scope
        .run(|| mount_node(doc, parent, reference, node))
        .unwrap_or_default();
    MountHandle {
        doc: doc.clone(),
        scope,
        nodes,
    }
}

/// Recursive worker. Must run inside an active scope so the effects it
/// creates are owned. Returns the top-level ids it inserted.
pub(crate) fn mount_node<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    node: &VNode<Ev>,
) -> Vec<NodeId> {
    match node {
        VNode::Element(el) => {
            let id = doc.create_element(el.tag.clone());
            for attr in &el.attrs {
                match attr {
                    Attr::Static { name, value } => {
                        doc.set_attribute(id, name.clone(), value.clone())
                    }
                    Attr::Dynamic { name, value } => {
                        let (doc2, name2, value2) = (doc.clone(), name.clone(), value.clone());
                        let _e = effect(move || {
                            doc2.set_attribute(id, name2.clone(), value2());
                        });
                    }
                    Attr::Listener { event, handler } => {
                        doc.add_listener(id, event.clone(), handler.clone());
                    }
                }
            }
            for child in &el.children {
                mount_node(doc, id, None, child);
            }
            doc.insert_before(parent, id, before);
            vec![id]
        }
        VNode::Text(content) => {
            let id = doc.create_text(content.clone());
            doc.insert_before(parent, id, before);
            vec![id]
        }
        VNode::DynamicText(thunk) => {
            let id = doc.create_text(String::new());
            doc.insert_before(parent, id, before);
            let (doc2, thunk2) = (doc.clone(), thunk.clone());
            let _e = effect(move || {
                doc2.set_text(id, thunk2());
            });
            vec![id]
        }
        VNode::Fragment(children) => {
            let mut out = Vec::new();
            for child in children {
                out.extend(mount_node(doc, parent, before, child));
            }
            out
        }
        VNode::Show(show) => mount_show(doc, parent, before, show),
        VNode::For(list) => mount_for(doc, parent, before, list),
        VNode::Async(async_node) => mount_async(doc, parent, before, async_node),
        VNode::Island(island) => mount_island(doc, parent, before, island),
    }
}

/// Remove every node strictly between the two markers.
fn clear_between<Ev>(doc: &Document<Ev>, parent: NodeId, start: NodeId, end: NodeId) {
    let children = doc.children(parent);
    let mut inside = false;
    for child in children {
        if child == start {
            inside = true;
        } else if child == end {
            break;
        } else if inside {
            doc.remove(child);
        }
    }
}

fn mount_show<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    show: &ShowNode<Ev>,
) -> Vec<NodeId> {
    let start = doc.create_marker("show");
    let end = doc.create_marker("/show");
    doc.insert_before(parent, start, before);
    doc.insert_before(parent, end, before);

    let branch: Rc<RefCell<Option<EffectScope>>> = Rc::new(RefCell::new(None));
    let (branch2, doc_cleanup) = (branch.clone(), doc.clone());
    on_scope_dispose(move || {
        if let Some(scope) = branch2.borrow_mut().take() {
            scope.stop();
        }
        clear_between(&doc_cleanup, parent, start, end);
    });

    let last = Cell::new(None::<bool>);
    let (doc2, when, build, otherwise) = (
        doc.clone(),
        show.when.clone(),
        show.build.clone(),
        show.otherwise.clone(),
    );
    let _e = effect(move || {
        let cond = when();
        // The factory runs once per activation, not once per evaluation.
        if last.get() == Some(cond) {
            return;
        }
        last.set(Some(cond));

        if let Some(old) = branch.borrow_mut().take() {
            old.stop();
        }
        clear_between(&doc2, parent, start, end);

        let scope = effect_scope(true);
        let doc3 = doc2.clone();
        let (build, otherwise) = (build.clone(), otherwise.clone());
        untrack(|| {
            scope.run(move || {
                let tree = if cond {
                    Some(build())
                } else {
                    otherwise.map(|o| o())
                };
                if let Some(tree) = tree {
                    mount_node(&doc3, parent, Some(end), &tree);
                }
            });
        });
        *branch.borrow_mut() = Some(scope);
    });

    vec![start, end]
}

struct RowState {
    scope: EffectScope,
    nodes: Vec<NodeId>,
}

fn mount_for<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    list: &ForNode<Ev>,
) -> Vec<NodeId> {
    let start = doc.create_marker("for");
    let end = doc.create_marker("/for");
    doc.insert_before(parent, start, before);
    doc.insert_before(parent, end, before);

    let rows = Rc::new(RefCell::new(ForRows::new()));
    let state: Rc<RefCell<IndexMap<String, RowState>>> = Rc::new(RefCell::new(IndexMap::new()));

    let (state2, doc_cleanup) = (state.clone(), doc.clone());
    on_scope_dispose(move || {
        for (_, row) in state2.borrow_mut().drain(..) {
            row.scope.stop();
            for node in row.nodes {
                doc_cleanup.remove(node);
            }
        }
    });

    let (doc2, snapshot) = (doc.clone(), list.snapshot.clone());
    let _e = effect(move || {
        // Tracked: the snapshot reads the item getter. Existing rows get
        // their item signals written in place here, which schedules their
        // own effects; this effect depends only on the list shape.
        let entries = (snapshot)(&mut rows.borrow_mut());
        let new_order: Vec<String> = entries.iter().map(|e| e.key().to_string()).collect();

        let mut old = state.borrow_mut();
        let old_order: Vec<String> = old.keys().cloned().collect();
        let diff = diff_keys(&old_order, &new_order);

        for key in &diff.removed {
            if let Some(row) = old.shift_remove(key) {
                row.scope.stop();
                for node in row.nodes {
                    doc2.remove(node);
                }
            }
        }

        // Walk the desired order back to front. `anchor` is the first node
        // of the row that should follow the current one.
        let mut next: IndexMap<String, RowState> = IndexMap::with_capacity(entries.len());
        let mut anchor = end;
        for entry in entries.iter().rev() {
            let key = entry.key().to_string();
            let row = match entry {
                ForEntry::Existing { .. } => match old.shift_remove(&key) {
                    Some(row) => {
                        if diff.moved.contains(&key) {
                            for &node in &row.nodes {
                                doc2.insert_before(parent, node, Some(anchor));
                            }
                        }
                        row
                    }
                    None => {
                        tracing::warn!(key = %key, "keyed row has item storage but no mount state; skipping");
                        continue;
                    }
                },
                ForEntry::New { build, .. } => {
                    let scope = effect_scope(true);
                    let doc3 = doc2.clone();
                    let build = build.clone();
                    let nodes = untrack(|| {
                        scope
                            .run(move || mount_node(&doc3, parent, Some(anchor), &build()))
                            .unwrap_or_default()
                    });
                    RowState { scope, nodes }
                }
            };
            if let Some(&first) = row.nodes.first() {
                anchor = first;
            }
            next.insert(key, row);
        }
        // Built in reverse; flip to list order.
        next.reverse();
        *old = next;
    });

    vec![start, end]
}

fn mount_async<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    async_node: &AsyncNode<Ev>,
) -> Vec<NodeId> {
    let start = doc.create_marker("async");
    let end = doc.create_marker("/async");
    doc.insert_before(parent, start, before);
    doc.insert_before(parent, end, before);

    let branch: Rc<RefCell<Option<EffectScope>>> = Rc::new(RefCell::new(None));
    let (branch2, doc_cleanup) = (branch.clone(), doc.clone());
    on_scope_dispose(move || {
        if let Some(scope) = branch2.borrow_mut().take() {
            scope.stop();
        }
        clear_between(&doc_cleanup, parent, start, end);
    });

    // Branch swaps key on the state discriminant; a rejection message
    // change also counts.
    let last = Cell::new(None::<u8>);
    let last_err = RefCell::new(None::<String>);
    let (doc2, state, fallback, rejected) = (
        doc.clone(),
        async_node.state.clone(),
        async_node.fallback.clone(),
        async_node.rejected.clone(),
    );
    let _e = effect(move || {
        let snap = state();
        let disc = snap.discriminant();
        let err = match &snap {
            AsyncSnapshot::Rejected(e) => Some(e.clone()),
            _ => None,
        };
        if last.get() == Some(disc) && *last_err.borrow() == err {
            return;
        }
        last.set(Some(disc));
        *last_err.borrow_mut() = err;

        if let Some(old) = branch.borrow_mut().take() {
            old.stop();
        }
        clear_between(&doc2, parent, start, end);

        let scope = effect_scope(true);
        let doc3 = doc2.clone();
        let (fallback, rejected) = (fallback.clone(), rejected.clone());
        untrack(|| {
            scope.run(move || {
                let tree = match snap {
                    AsyncSnapshot::Pending => fallback.map(|f| f()),
                    AsyncSnapshot::Resolved(build) => Some(build()),
                    AsyncSnapshot::Rejected(e) => rejected.map(|r| r(&e)),
                };
                if let Some(tree) = tree {
                    mount_node(&doc3, parent, Some(end), &tree);
                }
            });
        });
        *branch.borrow_mut() = Some(scope);
    });

    vec![start, end]
}

/// Islands mount as their wrapper element with the protocol attributes in
/// place, children fully reactive. The sibling state block is emitted too,
/// so a serialized client document round-trips.
fn mount_island<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    island: &IslandNode<Ev>,
) -> Vec<NodeId> {
    let id = doc.create_element("div");
    doc.set_attribute(id, "data-island", island.id.clone());
    doc.set_attribute(id, "data-island-src", island.src.clone());
    doc.set_attribute(id, "data-island-on", island.trigger.as_attr_value());
    if let Some(value) = island.state.attr_value(&island.id) {
        doc.set_attribute(id, "data-island-state", value);
    }
    for child in &island.children {
        mount_node(doc, id, None, child);
    }
    doc.insert_before(parent, id, before);

    let mut out = vec![id];
    if let Some(payload) = island.state.script_payload() {
        let script = doc.create_element("script");
        doc.set_attribute(script, "type", "application/json");
        doc.set_attribute(
            script,
            "id",
            crate::node::island::IslandState::script_id(&island.id),
        );
        let body = doc.create_text(escape_script_json(payload));
        doc.append_child(script, body);
        doc.insert_before(parent, script, before);
        out.push(script);
    }
    out
}
