//! One-shot HTML serialization of a virtual tree.
//!
//! The string renderer takes a snapshot: every dynamic thunk is evaluated
//! exactly once, under `untrack` so no dependency edges leak into whatever
//! computation happens to be running. Structural nodes render their current
//! branch with no markers; markers are a reconciler concern.

use crate::dom::{RAW_TEXT_ELEMENTS, VOID_ELEMENTS};
use crate::node::island::IslandState;
use crate::node::{AsyncSnapshot, Attr, ForEntry, ForRows, IslandNode, VNode};
use crate::reactivity::batching::untrack;
use crate::render::escape::{escape_attr, escape_script_json, escape_text};

/// Serialize a tree to HTML. Non-reactive: reads inside the tree's thunks
/// are not tracked.
pub fn render_to_string<Ev>(node: &VNode<Ev>) -> String {
    untrack(|| {
        let mut out = String::new();
        write_node(node, &mut out);
        out
    })
}

fn write_node<Ev>(node: &VNode<Ev>, out: &mut String) {
    match node {
        VNode::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for attr in &el.attrs {
                match attr {
                    Attr::Static { name, value } => write_attr(name, value, out),
                    Attr::Dynamic { name, value } => write_attr(name, &value(), out),
                    // Listeners have no serialized form.
                    Attr::Listener { .. } => {}
                }
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
            for child in &el.children {
                if raw {
                    if let VNode::Text(t) = child {
                        out.push_str(t);
                        continue;
                    }
                }
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
        VNode::Text(content) => out.push_str(&escape_text(content)),
        VNode::DynamicText(thunk) => out.push_str(&escape_text(&thunk())),
        VNode::Fragment(children) => {
            for child in children {
                write_node(child, out);
            }
        }
        VNode::Show(show) => {
            if (show.when)() {
                write_node(&(show.build)(), out);
            } else if let Some(otherwise) = &show.otherwise {
                write_node(&otherwise(), out);
            }
        }
        VNode::For(list) => {
            // Fresh row storage: every entry is new in a one-shot render.
            let mut rows = ForRows::new();
            for entry in (list.snapshot)(&mut rows) {
                if let ForEntry::New { build, .. } = entry {
                    write_node(&build(), out);
                }
            }
        }
        VNode::Async(async_node) => match (async_node.state)() {
            AsyncSnapshot::Pending => {
                if let Some(fallback) = &async_node.fallback {
                    write_node(&fallback(), out);
                }
            }
            AsyncSnapshot::Resolved(build) => write_node(&build(), out),
            AsyncSnapshot::Rejected(err) => {
                if let Some(rejected) = &async_node.rejected {
                    write_node(&rejected(&err), out);
                }
            }
        },
        VNode::Island(island) => write_island(island, out),
    }
}

fn write_attr(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

/// Islands serialize as a wrapper `<div>` carrying the hydration protocol
/// attributes. A `Script` state payload lands in a sibling JSON block the
/// attribute points at by element id.
fn write_island<Ev>(island: &IslandNode<Ev>, out: &mut String) {
    out.push_str("<div");
    write_attr("data-island", &island.id, out);
    write_attr("data-island-src", &island.src, out);
    write_attr("data-island-on", &island.trigger.as_attr_value(), out);

    let mut script_payload = None;
    match &island.state {
        IslandState::None => {}
        IslandState::Inline(value) => {
            write_attr("data-island-state", &value.to_string(), out);
        }
        IslandState::Script(value) => {
            let script_id = format!("{}-state", island.id);
            write_attr("data-island-state", &format!("#{script_id}"), out);
            script_payload = Some((script_id, value));
        }
        IslandState::Url(url) => {
            write_attr("data-island-state", &format!("url:{url}"), out);
        }
    }
    out.push('>');

    for child in &island.children {
        write_node(child, out);
    }
    out.push_str("</div>");

    if let Some((script_id, value)) = script_payload {
        out.push_str("<script type=\"application/json\" id=\"");
        out.push_str(&escape_attr(&script_id));
        out.push_str("\">");
        out.push_str(&escape_script_json(value));
        out.push_str("</script>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::island::Trigger;
    use crate::node::{
        attr, dyn_attr, dyn_text, el, for_each, fragment, island, on, show_else, text,
    };
    use crate::primitives::signal::signal;
    use serde_json::json;

    type N = VNode<()>;

    #[test]
    fn static_tree() {
        let tree: N = el(
            "div",
            vec![attr("class", "a\"b")],
            vec![text("x & y"), el("br", vec![], vec![])],
        );
        assert_eq!(
            render_to_string(&tree),
            "<div class=\"a&quot;b\">x &amp; y<br></div>"
        );
    }

    #[test]
    fn dynamic_parts_are_snapshotted() {
        let name = signal(String::from("<world>"));
        let n2 = name.clone();
        let n3 = name.clone();
        let tree: N = el(
            "span",
            vec![dyn_attr("title", move || n2.get())],
            vec![dyn_text(move || format!("hello {}", n3.get()))],
        );
        assert_eq!(
            render_to_string(&tree),
            "<span title=\"&lt;world&gt;\">hello &lt;world&gt;</span>"
        );
    }

    #[test]
    fn listeners_do_not_serialize() {
        let tree: N = el("button", vec![on("click", |_| {})], vec![text("go")]);
        assert_eq!(render_to_string(&tree), "<button>go</button>");
    }

    #[test]
    fn show_renders_current_branch() {
        let open = signal(false);
        let o2 = open.clone();
        let tree: N = show_else(move || o2.get(), || text("on"), || text("off"));
        assert_eq!(render_to_string(&tree), "off");
        open.set(true);
        assert_eq!(render_to_string(&tree), "on");
    }

    #[test]
    fn for_renders_rows_in_order() {
        let tree: N = for_each(
            || vec![3, 1, 2],
            |n| n.to_string(),
            |sig| dyn_text(move || format!("[{}]", sig.get())),
        );
        assert_eq!(render_to_string(&tree), "[3][1][2]");
    }

    #[test]
    fn island_with_script_state() {
        let state = json!({"a": "<script>", "b": "it's \"quoted\""});
        let tree: N = island(
            "counter",
            "/islands/counter.js",
            Trigger::Visible,
            IslandState::Script(state.clone()),
            vec![fragment(vec![text("0")])],
        );
        let html = render_to_string(&tree);

        assert!(html.starts_with(
            "<div data-island=\"counter\" data-island-src=\"/islands/counter.js\" \
             data-island-on=\"visible\" data-island-state=\"#counter-state\">0</div>"
        ));
        assert!(html.contains("<script type=\"application/json\" id=\"counter-state\">"));

        // The payload cannot terminate the script block early.
        let body_start = html.find("id=\"counter-state\">").unwrap() + "id=\"counter-state\">".len();
        let body = &html[body_start..html.rfind("</script>").unwrap()];
        assert!(!body.contains("</script>"));
        let decoded: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn island_with_inline_and_url_state() {
        let inline: N = island(
            "a",
            "/a.js",
            Trigger::Immediate,
            IslandState::Inline(json!({"n": 1})),
            vec![],
        );
        assert_eq!(
            render_to_string(&inline),
            "<div data-island=\"a\" data-island-src=\"/a.js\" data-island-on=\"immediate\" \
             data-island-state=\"{&quot;n&quot;:1}\"></div>"
        );

        let url: N = island("b", "/b.js", Trigger::Idle, IslandState::Url("/api/s".into()), vec![]);
        assert_eq!(
            render_to_string(&url),
            "<div data-island=\"b\" data-island-src=\"/b.js\" data-island-on=\"idle\" \
             data-island-state=\"url:/api/s\"></div>"
        );
    }

    #[test]
    fn untracked_rendering_adds_no_dependencies() {
        use crate::primitives::effect::effect;
        use std::cell::Cell;
        use std::rc::Rc;

        let name = signal(String::from("a"));
        let runs = Rc::new(Cell::new(0));
        let (n2, r2) = (name.clone(), runs.clone());
        let _e = effect(move || {
            r2.set(r2.get() + 1);
            let n3 = n2.clone();
            let tree: N = dyn_text(move || n3.get());
            let _ = render_to_string(&tree);
        });
        assert_eq!(runs.get(), 1);

        name.set(String::from("b"));
        assert_eq!(runs.get(), 1);
    }
}
