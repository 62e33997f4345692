//! Static patching: reconcile a document subtree against a one-shot
//! snapshot of a virtual tree.
//!
//! Used where no live effects are wanted, most notably when repairing
//! server markup before hydration takes over. Dynamic thunks and
//! structural nodes are evaluated once, under `untrack`, exactly like the
//! string renderer; the result is then diffed against the document:
//! matching tags patch attributes and recurse, matching text nodes patch
//! content, everything else is replaced wholesale. Listeners on snapshot
//! elements are attached to the nodes they land on.

use std::rc::Rc;

use crate::dom::document::{Document, NodeId};
use crate::node::{AsyncSnapshot, Attr, ForEntry, ForRows, VNode};
use crate::reactivity::batching::untrack;
use crate::render::escape::escape_script_json;

/// Reconcile the children of `parent` against a snapshot of `next`.
pub fn patch<Ev: 'static>(doc: &Document<Ev>, parent: NodeId, next: &VNode<Ev>) {
    untrack(|| {
        let mut flat = Vec::new();
        flatten(next, &mut flat);
        patch_children(doc, parent, &flat);
    });
}

/// A snapshot node: either borrowed from the input tree or produced by
/// evaluating a structural thunk.
enum Flat<'a, Ev> {
    Borrowed(&'a VNode<Ev>),
    Owned(Box<VNode<Ev>>),
}

impl<Ev> Flat<'_, Ev> {
    fn node(&self) -> &VNode<Ev> {
        match self {
            Flat::Borrowed(n) => n,
            Flat::Owned(n) => n,
        }
    }
}

fn flatten<'a, Ev>(node: &'a VNode<Ev>, out: &mut Vec<Flat<'a, Ev>>) {
    match node {
        VNode::Fragment(children) => {
            for child in children {
                flatten(child, out);
            }
        }
        VNode::Show(show) => {
            if (show.when)() {
                flatten_owned((show.build)(), out);
            } else if let Some(otherwise) = &show.otherwise {
                flatten_owned(otherwise(), out);
            }
        }
        VNode::For(list) => {
            let mut rows = ForRows::new();
            for entry in (list.snapshot)(&mut rows) {
                if let ForEntry::New { build, .. } = entry {
                    flatten_owned(build(), out);
                }
            }
        }
        VNode::Async(async_node) => match (async_node.state)() {
            AsyncSnapshot::Pending => {
                if let Some(fallback) = &async_node.fallback {
                    flatten_owned(fallback(), out);
                }
            }
            AsyncSnapshot::Resolved(build) => flatten_owned(build(), out),
            AsyncSnapshot::Rejected(err) => {
                if let Some(rejected) = &async_node.rejected {
                    flatten_owned(rejected(&err), out);
                }
            }
        },
        other => out.push(Flat::Borrowed(other)),
    }
}

fn flatten_owned<Ev>(node: VNode<Ev>, out: &mut Vec<Flat<'_, Ev>>) {
    match node {
        VNode::Fragment(children) => {
            for child in children {
                flatten_owned(child, out);
            }
        }
        VNode::Show(_) | VNode::For(_) | VNode::Async(_) => {
            // Evaluate through the borrowed path, then re-own the results.
            let mut inner = Vec::new();
            flatten(&node, &mut inner);
            for flat in inner {
                if let Flat::Owned(n) = flat {
                    out.push(Flat::Owned(n));
                }
            }
        }
        other => out.push(Flat::Owned(Box::new(other))),
    }
}

fn patch_children<Ev: 'static>(doc: &Document<Ev>, parent: NodeId, next: &[Flat<'_, Ev>]) {
    let existing = doc.children(parent);

    for (i, flat) in next.iter().enumerate() {
        match existing.get(i) {
            Some(&old) => patch_node(doc, parent, old, flat.node()),
            None => {
                instantiate(doc, parent, None, flat.node());
            }
        }
    }
    for &extra in existing.iter().skip(next.len()) {
        doc.remove(extra);
    }
}

fn patch_node<Ev: 'static>(doc: &Document<Ev>, parent: NodeId, old: NodeId, next: &VNode<Ev>) {
    match next {
        VNode::Element(el) if doc.tag(old).as_deref() == Some(el.tag.as_str()) => {
            patch_attrs(doc, old, &el.attrs);
            let mut flat = Vec::new();
            for child in &el.children {
                flatten(child, &mut flat);
            }
            patch_children(doc, old, &flat);
        }
        VNode::Text(content) if doc.text(old).is_some() => {
            if doc.text(old).as_deref() != Some(content.as_str()) {
                doc.set_text(old, content.clone());
            }
        }
        VNode::DynamicText(thunk) if doc.text(old).is_some() => {
            let content = thunk();
            if doc.text(old).as_deref() != Some(content.as_str()) {
                doc.set_text(old, content);
            }
        }
        _ => {
            instantiate(doc, parent, Some(old), next);
            doc.remove(old);
        }
    }
}

fn patch_attrs<Ev>(doc: &Document<Ev>, node: NodeId, attrs: &[Attr<Ev>]) {
    let mut desired: Vec<(String, String)> = Vec::with_capacity(attrs.len());
    for attr in attrs {
        match attr {
            Attr::Static { name, value } => desired.push((name.clone(), value.clone())),
            Attr::Dynamic { name, value } => desired.push((name.clone(), value())),
            Attr::Listener { event, handler } => {
                // Replace, never stack: patching must stay idempotent.
                doc.clear_listeners(node, event);
                doc.add_listener(node, event.clone(), handler.clone());
            }
        }
    }

    for (name, _) in doc.attributes(node) {
        if !desired.iter().any(|(n, _)| *n == name) {
            doc.remove_attribute(node, &name);
        }
    }
    for (name, value) in desired {
        if doc.attribute(node, &name).as_deref() != Some(value.as_str()) {
            doc.set_attribute(node, name, value);
        }
    }
}

/// Build a static instance of a snapshot node. Listeners attach; nothing
/// is reactive.
fn instantiate<Ev: 'static>(
    doc: &Document<Ev>,
    parent: NodeId,
    before: Option<NodeId>,
    node: &VNode<Ev>,
) {
    match node {
        VNode::Element(el) => {
            let id = doc.create_element(el.tag.clone());
            for attr in &el.attrs {
                match attr {
                    Attr::Static { name, value } => {
                        doc.set_attribute(id, name.clone(), value.clone())
                    }
                    Attr::Dynamic { name, value } => doc.set_attribute(id, name.clone(), value()),
                    Attr::Listener { event, handler } => {
                        doc.add_listener(id, event.clone(), handler.clone())
                    }
                }
            }
            let mut flat = Vec::new();
            for child in &el.children {
                flatten(child, &mut flat);
            }
            for child in &flat {
                instantiate(doc, id, None, child.node());
            }
            doc.insert_before(parent, id, before);
        }
        VNode::Text(content) => {
            let id = doc.create_text(content.clone());
            doc.insert_before(parent, id, before);
        }
        VNode::DynamicText(thunk) => {
            let id = doc.create_text(thunk());
            doc.insert_before(parent, id, before);
        }
        VNode::Island(island) => {
            let id = doc.create_element("div");
            doc.set_attribute(id, "data-island", island.id.clone());
            doc.set_attribute(id, "data-island-src", island.src.clone());
            doc.set_attribute(id, "data-island-on", island.trigger.as_attr_value());
            if let Some(value) = island.state.attr_value(&island.id) {
                doc.set_attribute(id, "data-island-state", value);
            }
            let mut flat = Vec::new();
            for child in &island.children {
                flatten(child, &mut flat);
            }
            for child in &flat {
                instantiate(doc, id, None, child.node());
            }
            doc.insert_before(parent, id, before);

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
            }
        }
        VNode::Fragment(_) | VNode::Show(_) | VNode::For(_) | VNode::Async(_) => {
            // Flattening has already resolved these; a nested occurrence
            // resolves here the same way.
            let mut flat = Vec::new();
            flatten(node, &mut flat);
            for child in &flat {
                instantiate(doc, parent, before, child.node());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::ROOT;
    use crate::node::{attr, el, fragment, show, text};
    use crate::primitives::signal::signal;
    use std::cell::Cell;

    type Doc = Document<String>;
    type N = VNode<String>;

    #[test]
    fn patch_updates_text_in_place() {
        let doc = Doc::new();
        let before: N = el("p", vec![], vec![text("old")]);
        patch(&doc, ROOT, &before);
        let p = doc.children(ROOT)[0];

        let after: N = el("p", vec![], vec![text("new")]);
        patch(&doc, ROOT, &after);

        // Same element, new text.
        assert_eq!(doc.children(ROOT), vec![p]);
        assert_eq!(doc.to_html(ROOT), "<p>new</p>");
    }

    #[test]
    fn patch_updates_attributes_in_place() {
        let doc = Doc::new();
        patch(&doc, ROOT, &el::<String>("div", vec![attr("a", "1"), attr("b", "2")], vec![]));
        let div = doc.children(ROOT)[0];

        patch(&doc, ROOT, &el::<String>("div", vec![attr("a", "9"), attr("c", "3")], vec![]));
        assert_eq!(doc.children(ROOT), vec![div]);
        assert_eq!(doc.attribute(div, "a").as_deref(), Some("9"));
        assert_eq!(doc.attribute(div, "b"), None);
        assert_eq!(doc.attribute(div, "c").as_deref(), Some("3"));
    }

    #[test]
    fn tag_change_replaces_the_node() {
        let doc = Doc::new();
        patch(&doc, ROOT, &el::<String>("span", vec![], vec![text("x")]));
        let span = doc.children(ROOT)[0];

        patch(&doc, ROOT, &el::<String>("div", vec![], vec![text("x")]));
        assert_ne!(doc.children(ROOT)[0], span);
        assert_eq!(doc.to_html(ROOT), "<div>x</div>");
    }

    #[test]
    fn extra_and_missing_children_are_handled() {
        let doc = Doc::new();
        patch(
            &doc,
            ROOT,
            &fragment::<String>(vec![text("a"), text("b"), text("c")]),
        );
        assert_eq!(doc.to_html(ROOT), "abc");

        patch(&doc, ROOT, &fragment::<String>(vec![text("a")]));
        assert_eq!(doc.to_html(ROOT), "a");

        patch(
            &doc,
            ROOT,
            &fragment::<String>(vec![text("a"), text("z")]),
        );
        assert_eq!(doc.to_html(ROOT), "az");
    }

    #[test]
    fn structural_nodes_are_snapshotted() {
        let doc = Doc::new();
        let open = signal(true);
        let o2 = open.clone();
        let tree: N = show(move || o2.get(), || text("visible"));
        patch(&doc, ROOT, &tree);
        assert_eq!(doc.to_html(ROOT), "visible");

        open.set(false);
        // Static patching is a snapshot; nothing tracked the signal.
        assert_eq!(doc.to_html(ROOT), "visible");

        patch(&doc, ROOT, &tree);
        assert_eq!(doc.to_html(ROOT), "");
    }

    #[test]
    fn repatching_does_not_stack_listeners() {
        let doc = Doc::new();
        let hits = std::rc::Rc::new(Cell::new(0));

        for _ in 0..2 {
            let h2 = hits.clone();
            let tree: N = el(
                "button",
                vec![crate::node::on("click", move |_ev: &String| {
                    h2.set(h2.get() + 1);
                })],
                vec![],
            );
            patch(&doc, ROOT, &tree);
        }

        let button = doc.children(ROOT)[0];
        assert_eq!(doc.listener_count(button, "click"), 1);
        doc.dispatch(button, "click", &String::from("ev"));
        assert_eq!(hits.get(), 1);
    }
}
