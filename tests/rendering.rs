use skerry::{
    dyn_text, el, for_each, fragment, island, mount, show, signal, text, Document, IslandState,
    Trigger, VNode,
};
use std::cell::Cell;
use std::rc::Rc;

type Doc = Document<String>;
type N = VNode<String>;

const ROOT: skerry::NodeId = 0;

/// Nested conditional factories run exactly once per activation, and an
/// inner toggle never reaches the outer factory.
#[test]
fn nested_show_factories_run_once_per_activation() {
    let doc = Doc::new();
    let outer = signal(true);
    let inner = signal(true);
    let outer_builds = Rc::new(Cell::new(0));
    let inner_builds = Rc::new(Cell::new(0));

    let (o2, i2, ob, ib) = (
        outer.clone(),
        inner.clone(),
        outer_builds.clone(),
        inner_builds.clone(),
    );
    let tree: N = show(
        move || o2.get(),
        move || {
            ob.set(ob.get() + 1);
            let (i3, ib2) = (i2.clone(), ib.clone());
            el(
                "section",
                vec![],
                vec![show(
                    move || i3.get(),
                    move || {
                        ib2.set(ib2.get() + 1);
                        text("deep")
                    },
                )],
            )
        },
    );
    let _h = mount(&doc, ROOT, &tree);
    assert_eq!(outer_builds.get(), 1);
    assert_eq!(inner_builds.get(), 1);

    // Inner toggles touch only the inner factory.
    inner.set(false);
    inner.set(true);
    assert_eq!(outer_builds.get(), 1);
    assert_eq!(inner_builds.get(), 2);

    // Outer toggle rebuilds both, once each.
    outer.set(false);
    outer.set(true);
    assert_eq!(outer_builds.get(), 2);
    assert_eq!(inner_builds.get(), 3);
}

/// Reordering a keyed list reuses every row subtree; zero factory calls.
#[test]
fn keyed_reversal_reuses_all_rows() {
    let doc = Doc::new();
    let items = signal(vec![1, 2, 3]);
    let builds = Rc::new(Cell::new(0));

    let (it2, b2) = (items.clone(), builds.clone());
    let tree: N = for_each(
        move || it2.get(),
        |n| n.to_string(),
        move |item| {
            b2.set(b2.get() + 1);
            el("li", vec![], vec![dyn_text(move || item.get().to_string())])
        },
    );
    let _h = mount(&doc, ROOT, &tree);
    assert_eq!(builds.get(), 3);
    assert_eq!(
        doc.to_html(ROOT),
        "<!--for--><li>1</li><li>2</li><li>3</li><!--/for-->"
    );

    items.set(vec![3, 2, 1]);
    assert_eq!(builds.get(), 3);
    assert_eq!(
        doc.to_html(ROOT),
        "<!--for--><li>3</li><li>2</li><li>1</li><!--/for-->"
    );
}

#[test]
fn string_render_escapes_text_and_attributes() {
    let tree: N = el(
        "div",
        vec![skerry::attr("title", "a \"b\" & 'c' <d>")],
        vec![text("x < y & z")],
    );
    assert_eq!(
        skerry::render_to_string(&tree),
        "<div title=\"a &quot;b&quot; &amp; &#39;c&#39; &lt;d&gt;\">x &lt; y &amp; z</div>"
    );
}

/// Island state survives the serialize/parse/resolve round trip, and no
/// payload byte sequence can close the state script block.
#[test]
fn island_state_round_trips_through_markup() {
    let state = serde_json::json!({"a": "<script>", "b": "it's \"quoted\""});
    let tree: N = island(
        "widget",
        "/islands/widget.js",
        Trigger::Idle,
        IslandState::Script(state.clone()),
        vec![fragment(vec![text("static body")])],
    );

    let html = skerry::render_to_string(&tree);
    let payload_start = html.find("id=\"widget-state\">").unwrap() + "id=\"widget-state\">".len();
    let payload = &html[payload_start..html.rfind("</script>").unwrap()];
    assert!(!payload.contains("</script>"));
    assert!(!payload.contains('<'));

    let doc = Doc::new();
    skerry::dom::parse_fragment(&doc, ROOT, &html);
    let islands = skerry::hydrate::scan_islands(&doc);
    assert_eq!(islands.len(), 1);
    let record = islands[0].1.as_ref().unwrap();
    assert_eq!(record.trigger, Trigger::Idle);

    let resolved = skerry::hydrate::resolve_state(&doc, record, None).unwrap();
    assert_eq!(resolved, state);
}

/// The string renderer and a fresh reactive mount agree on static content.
#[test]
fn string_and_mounted_render_agree() {
    let count = signal(7);
    let c2 = count.clone();
    let tree: N = el(
        "main",
        vec![skerry::attr("class", "app")],
        vec![
            el("h1", vec![], vec![text("Count")]),
            el("p", vec![], vec![dyn_text(move || c2.get().to_string())]),
        ],
    );

    let rendered = skerry::render_to_string(&tree);

    let doc = Doc::new();
    let _h = mount(&doc, ROOT, &tree);
    assert_eq!(doc.to_html(ROOT), rendered);
}
