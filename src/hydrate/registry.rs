//! The hydrator: island lifecycle over one document.
//!
//! `scan` finds island boundaries and arms their triggers; when a trigger
//! fires the island's module is loaded, its state resolved, and its
//! hydrate entry run inside a dedicated scope. Hydration is idempotent per
//! island: a second trigger (or an explicit call) on an already hydrated
//! island is a no-op, unless forced, which tears the island down first and
//! hydrates again.
//!
//! Failures are contained per island. A bad record, a missing module, or a
//! panicking hydrate entry marks that island failed and is logged; every
//! other island proceeds.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::dom::document::{Document, NodeId};
use crate::error::{Error, Result};
use crate::hydrate::loader::ModuleLoader;
use crate::hydrate::protocol::{parse_island, resolve_state, IslandRecord, StateFetcher};
use crate::hydrate::triggers::TriggerHost;
use crate::node::island::Trigger;
use crate::primitives::effect::panic_message;
use crate::primitives::scope::{effect_scope, EffectScope};

#[derive(Debug, Clone, PartialEq)]
pub enum IslandStatus {
    /// Boundary parsed, trigger armed, not yet hydrated.
    Scanned,
    Hydrated,
    Failed(String),
}

struct IslandEntry {
    node: NodeId,
    record: IslandRecord,
    status: IslandStatus,
    scope: Option<EffectScope>,
}

struct HydratorInner<Ev> {
    doc: Document<Ev>,
    loader: Rc<dyn ModuleLoader<Ev>>,
    host: Rc<dyn TriggerHost>,
    fetcher: Option<Rc<dyn StateFetcher>>,
    islands: RefCell<IndexMap<String, IslandEntry>>,
}

pub struct Hydrator<Ev> {
    inner: Rc<HydratorInner<Ev>>,
}

impl<Ev> Clone for Hydrator<Ev> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Ev: 'static> Hydrator<Ev> {
    pub fn new(
        doc: Document<Ev>,
        loader: Rc<dyn ModuleLoader<Ev>>,
        host: Rc<dyn TriggerHost>,
    ) -> Self {
        Self {
            inner: Rc::new(HydratorInner {
                doc,
                loader,
                host,
                fetcher: None,
                islands: RefCell::new(IndexMap::new()),
            }),
        }
    }

    pub fn with_fetcher(
        doc: Document<Ev>,
        loader: Rc<dyn ModuleLoader<Ev>>,
        host: Rc<dyn TriggerHost>,
        fetcher: Rc<dyn StateFetcher>,
    ) -> Self {
        Self {
            inner: Rc::new(HydratorInner {
                doc,
                loader,
                host,
                fetcher: Some(fetcher),
                islands: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Scan the document for island boundaries and arm their triggers.
    /// Returns how many islands were registered. Boundaries that fail to
    /// parse are logged and skipped; duplicate ids keep the first.
    pub fn scan(&self) -> usize {
        let mut registered = 0;
        for node in self.inner.doc.elements_with_attribute("data-island") {
            let record = match parse_island(&self.inner.doc, node) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(error = %e, "skipping malformed island boundary");
                    continue;
                }
            };

            let entry = IslandEntry {
                node,
                record: record.clone(),
                status: IslandStatus::Scanned,
                scope: None,
            };
            let stale_scope = {
                let mut islands = self.inner.islands.borrow_mut();
                match islands.get_mut(&record.id) {
                    Some(existing) if self.inner.doc.exists(existing.node) => {
                        tracing::warn!(island = %record.id, "duplicate island id; keeping the first");
                        continue;
                    }
                    Some(existing) => {
                        // The registered boundary is gone: navigation swapped
                        // the markup. Re-register against the new node.
                        let scope = existing.scope.take();
                        islands.insert(record.id.clone(), entry);
                        scope
                    }
                    None => {
                        islands.insert(record.id.clone(), entry);
                        None
                    }
                }
            };
            if let Some(scope) = stale_scope {
                scope.stop();
            }
            registered += 1;

            self.arm_trigger(&record);
        }
        registered
    }

    fn arm_trigger(&self, record: &IslandRecord) {
        let weak = Rc::downgrade(&self.inner);
        let id = record.id.clone();
        let callback = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Err(e) = hydrate_entry(&inner, &id, false) {
                    tracing::error!(island = %id, error = %e, "hydration failed");
                }
            }
        });

        match &record.trigger {
            Trigger::Immediate => self.inner.host.on_ready(callback),
            Trigger::Idle => self.inner.host.on_idle(callback),
            Trigger::Visible => self.inner.host.on_visible(&record.id, callback),
            Trigger::Media(query) => self.inner.host.on_media(query, callback),
            Trigger::None => {}
        }
    }

    /// Hydrate one island now, regardless of its trigger. A no-op if it is
    /// already hydrated.
    pub fn hydrate(&self, id: &str) -> Result<()> {
        hydrate_entry(&self.inner, id, false)
    }

    /// Tear the island down if hydrated, then hydrate it again. This is
    /// the one sanctioned way to run a hydrate entry twice.
    pub fn hydrate_forced(&self, id: &str) -> Result<()> {
        hydrate_entry(&self.inner, id, true)
    }

    /// Hydrate every registered island. Failures are logged per island;
    /// returns how many are hydrated afterwards.
    pub fn hydrate_all(&self) -> usize {
        let ids: Vec<String> = self.inner.islands.borrow().keys().cloned().collect();
        for id in &ids {
            if let Err(e) = hydrate_entry(&self.inner, id, false) {
                tracing::error!(island = %id, error = %e, "hydration failed");
            }
        }
        self.inner
            .islands
            .borrow()
            .values()
            .filter(|e| e.status == IslandStatus::Hydrated)
            .count()
    }

    /// Force-hydrate every registered island, tearing down any that are
    /// already live. Used after markup under the islands was replaced.
    /// Returns how many are hydrated afterwards.
    pub fn rehydrate_all(&self) -> usize {
        let ids: Vec<String> = self.inner.islands.borrow().keys().cloned().collect();
        for id in &ids {
            if let Err(e) = hydrate_entry(&self.inner, id, true) {
                tracing::error!(island = %id, error = %e, "hydration failed");
            }
        }
        self.inner
            .islands
            .borrow()
            .values()
            .filter(|e| e.status == IslandStatus::Hydrated)
            .count()
    }

    /// Stop an island's scope and return it to the scanned state. The
    /// server markup stays in the document.
    pub fn unload(&self, id: &str) {
        unload_entry(&self.inner, id);
    }

    /// Unload every hydrated island.
    pub fn clear_loaded(&self) {
        let ids: Vec<String> = self.inner.islands.borrow().keys().cloned().collect();
        for id in &ids {
            unload_entry(&self.inner, id);
        }
    }

    pub fn status(&self, id: &str) -> Option<IslandStatus> {
        self.inner
            .islands
            .borrow()
            .get(id)
            .map(|e| e.status.clone())
    }

    /// Registered island ids in document order.
    pub fn islands(&self) -> Vec<String> {
        self.inner.islands.borrow().keys().cloned().collect()
    }
}

fn unload_entry<Ev>(inner: &Rc<HydratorInner<Ev>>, id: &str) {
    let scope = {
        let mut islands = inner.islands.borrow_mut();
        match islands.get_mut(id) {
            Some(entry) => {
                entry.status = IslandStatus::Scanned;
                entry.scope.take()
            }
            None => None,
        }
    };
    // Stopped outside the borrow: cleanups may touch other islands.
    if let Some(scope) = scope {
        scope.stop();
    }
}

fn hydrate_entry<Ev: 'static>(
    inner: &Rc<HydratorInner<Ev>>,
    id: &str,
    forced: bool,
) -> Result<()> {
    let (node, record, hydrated) = {
        let islands = inner.islands.borrow();
        let entry = islands.get(id).ok_or_else(|| Error::HydrationParse {
            id: id.to_string(),
            reason: String::from("island is not registered; was scan run?"),
        })?;
        (
            entry.node,
            entry.record.clone(),
            entry.status == IslandStatus::Hydrated,
        )
    };

    if hydrated {
        if !forced {
            tracing::debug!(island = %id, "already hydrated; skipping");
            return Ok(());
        }
        unload_entry(inner, id);
    }

    let result = run_hydrate(inner, node, &record);

    let mut islands = inner.islands.borrow_mut();
    if let Some(entry) = islands.get_mut(id) {
        match &result {
            Ok(scope) => {
                entry.status = IslandStatus::Hydrated;
                entry.scope = Some(scope.clone());
                tracing::debug!(island = %id, src = %record.src, "hydrated");
            }
            Err(e) => {
                entry.status = IslandStatus::Failed(e.to_string());
            }
        }
    }
    result.map(|_| ())
}

fn run_hydrate<Ev: 'static>(
    inner: &Rc<HydratorInner<Ev>>,
    node: NodeId,
    record: &IslandRecord,
) -> Result<EffectScope> {
    let module = inner
        .loader
        .load(&record.src)
        .map_err(|reason| Error::ModuleLoad {
            id: record.id.clone(),
            src: record.src.clone(),
            reason,
        })?;
    let hydrate = module.hydrate.ok_or_else(|| Error::MissingHydrateExport {
        id: record.id.clone(),
        src: record.src.clone(),
    })?;

    let state = resolve_state(&inner.doc, record, inner.fetcher.as_deref())?;

    let scope = effect_scope(true);
    let doc = inner.doc.clone();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        scope.run(|| hydrate(&doc, node, &state));
    }));

    match outcome {
        Ok(_) => Ok(scope),
        Err(payload) => {
            scope.stop();
            Err(Error::HydrateFailed {
                id: record.id.clone(),
                reason: panic_message(&payload),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::document::ROOT;
    use crate::dom::parse::parse_fragment;
    use crate::hydrate::loader::{Module, ModuleRegistry};
    use crate::hydrate::triggers::{ImmediateHost, ManualHost};
    use crate::node::island::IslandState;
    use crate::node::{dyn_text, el, island, on, text, VNode};
    use crate::pipeline::mount::mount_before;
    use crate::primitives::signal::signal;
    use crate::render::render_to_string;
    use serde_json::json;
    use std::cell::Cell;

    type Doc = Document<String>;

    fn island_doc(trigger: Trigger, state: IslandState) -> Doc {
        let tree: VNode<String> = island(
            "counter",
            "/islands/counter.js",
            trigger,
            state,
            vec![text("0")],
        );
        let html = render_to_string(&tree);
        let doc = Doc::new();
        parse_fragment(&doc, ROOT, &html);
        doc
    }

    fn counter_module(hydrations: Rc<Cell<u32>>) -> Module<String> {
        Module::new(move |doc, node, state| {
            hydrations.set(hydrations.get() + 1);
            let start = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            let count = signal(start);

            // Replace the static text with a live counter.
            for child in doc.children(node) {
                doc.remove(child);
            }
            let c2 = count.clone();
            let c3 = count.clone();
            let tree: VNode<String> = el(
                "button",
                vec![on("click", move |_ev: &String| { c2.set(c2.get() + 1); })],
                vec![dyn_text(move || c3.get().to_string())],
            );
            // The island scope owns the mount; the handle can go.
            let _ = mount_before(doc, node, None, &tree);
        })
    }

    #[test]
    fn immediate_scan_hydrates_and_is_idempotent() {
        let doc = island_doc(Trigger::Immediate, IslandState::Inline(json!({"n": 5})));
        let hydrations = Rc::new(Cell::new(0));

        let registry = ModuleRegistry::new();
        registry.register("/islands/counter.js", counter_module(hydrations.clone()));

        let hydrator = Hydrator::new(doc.clone(), Rc::new(registry), Rc::new(ImmediateHost));
        assert_eq!(hydrator.scan(), 1);
        assert_eq!(hydrator.status("counter"), Some(IslandStatus::Hydrated));
        assert_eq!(hydrations.get(), 1);

        // Exactly one listener after hydration.
        let button = doc.elements_with_attribute("data-island")[0];
        let button = doc
            .descendants(button)
            .into_iter()
            .find(|&n| doc.tag(n).as_deref() == Some("button"))
            .unwrap();
        assert_eq!(doc.listener_count(button, "click"), 1);

        doc.dispatch(button, "click", &String::from("ev"));
        assert_eq!(doc.text_content(button), "6");

        // Hydrating again does nothing.
        hydrator.hydrate("counter").unwrap();
        assert_eq!(hydrations.get(), 1);
        assert_eq!(doc.listener_count(button, "click"), 1);

        // Forcing is the sanctioned exception: the island re-renders.
        hydrator.hydrate_forced("counter").unwrap();
        assert_eq!(hydrations.get(), 2);
    }

    #[test]
    fn visible_trigger_defers_until_fired() {
        let doc = island_doc(Trigger::Visible, IslandState::None);
        let hydrations = Rc::new(Cell::new(0));

        let registry = ModuleRegistry::new();
        registry.register("/islands/counter.js", counter_module(hydrations.clone()));

        let host = Rc::new(ManualHost::new());
        let hydrator = Hydrator::new(doc, Rc::new(registry), host.clone());
        hydrator.scan();
        assert_eq!(hydrator.status("counter"), Some(IslandStatus::Scanned));
        assert_eq!(hydrations.get(), 0);

        host.fire_visible("counter");
        assert_eq!(hydrator.status("counter"), Some(IslandStatus::Hydrated));
        assert_eq!(hydrations.get(), 1);
    }

    #[test]
    fn missing_module_fails_only_that_island() {
        let doc = Doc::new();
        parse_fragment(
            &doc,
            ROOT,
            "<div data-island=\"a\" data-island-src=\"/gone.js\"></div>\
             <div data-island=\"b\" data-island-src=\"/ok.js\"></div>",
        );
        let registry = ModuleRegistry::new();
        registry.register("/ok.js", Module::new(|_, _, _| {}));

        let hydrator = Hydrator::new(doc, Rc::new(registry), Rc::new(ImmediateHost));
        assert_eq!(hydrator.scan(), 2);

        assert!(matches!(
            hydrator.status("a"),
            Some(IslandStatus::Failed(_))
        ));
        assert_eq!(hydrator.status("b"), Some(IslandStatus::Hydrated));
    }

    #[test]
    fn module_without_hydrate_entry_fails() {
        let doc = Doc::new();
        parse_fragment(
            &doc,
            ROOT,
            "<div data-island=\"x\" data-island-src=\"/x.js\"></div>",
        );
        let registry = ModuleRegistry::new();
        registry.register("/x.js", Module::<String>::empty());

        let hydrator = Hydrator::new(doc, Rc::new(registry), Rc::new(ImmediateHost));
        hydrator.scan();

        match hydrator.status("x") {
            Some(IslandStatus::Failed(reason)) => assert!(reason.contains("no hydrate entry")),
            other => panic!("expected failed status, got {other:?}"),
        }
    }

    #[test]
    fn panicking_hydrate_entry_is_contained() {
        let doc = Doc::new();
        parse_fragment(
            &doc,
            ROOT,
            "<div data-island=\"bad\" data-island-src=\"/bad.js\"></div>\
             <div data-island=\"good\" data-island-src=\"/good.js\"></div>",
        );
        let registry = ModuleRegistry::new();
        registry.register(
            "/bad.js",
            Module::<String>::new(|_, _, _| panic!("hydrate exploded")),
        );
        registry.register("/good.js", Module::new(|_, _, _| {}));

        let hydrator = Hydrator::new(doc, Rc::new(registry), Rc::new(ImmediateHost));
        hydrator.scan();

        match hydrator.status("bad") {
            Some(IslandStatus::Failed(reason)) => assert!(reason.contains("hydrate exploded")),
            other => panic!("expected failed status, got {other:?}"),
        }
        assert_eq!(hydrator.status("good"), Some(IslandStatus::Hydrated));
    }

    #[test]
    fn unload_stops_island_effects() {
        let doc = island_doc(Trigger::Immediate, IslandState::None);
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));

        let registry = ModuleRegistry::new();
        let (c2, r2) = (count.clone(), runs.clone());
        registry.register(
            "/islands/counter.js",
            Module::<String>::new(move |_, _, _| {
                let (c3, r3) = (c2.clone(), r2.clone());
                let _e = crate::primitives::effect::effect(move || {
                    let _ = c3.get();
                    r3.set(r3.get() + 1);
                });
            }),
        );

        let hydrator = Hydrator::new(doc, Rc::new(registry), Rc::new(ImmediateHost));
        hydrator.scan();
        assert_eq!(runs.get(), 1);

        count.set(1);
        assert_eq!(runs.get(), 2);

        hydrator.unload("counter");
        assert_eq!(hydrator.status("counter"), Some(IslandStatus::Scanned));
        count.set(2);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn rescan_rebinds_replaced_markup() {
        let doc = island_doc(Trigger::None, IslandState::None);
        let hydrations = Rc::new(Cell::new(0));
        let registry = ModuleRegistry::new();
        registry.register("/islands/counter.js", counter_module(hydrations.clone()));

        let hydrator = Hydrator::new(doc.clone(), Rc::new(registry), Rc::new(ImmediateHost));
        assert_eq!(hydrator.scan(), 1);
        hydrator.hydrate("counter").unwrap();
        assert_eq!(hydrations.get(), 1);

        // Navigation: the old boundary goes away, fresh markup comes in.
        let old = doc.elements_with_attribute("data-island")[0];
        doc.remove(old);
        let tree: VNode<String> = island(
            "counter",
            "/islands/counter.js",
            Trigger::None,
            IslandState::None,
            vec![text("0")],
        );
        parse_fragment(&doc, ROOT, &render_to_string(&tree));

        // Re-scan binds the id to the new boundary instead of treating it
        // as a duplicate.
        assert_eq!(hydrator.scan(), 1);
        assert_eq!(hydrator.status("counter"), Some(IslandStatus::Scanned));

        assert_eq!(hydrator.rehydrate_all(), 1);
        assert_eq!(hydrations.get(), 2);
    }

    #[test]
    fn hydrate_all_and_clear_loaded() {
        let doc = Doc::new();
        parse_fragment(
            &doc,
            ROOT,
            "<div data-island=\"a\" data-island-src=\"/m.js\" data-island-on=\"none\"></div>\
             <div data-island=\"b\" data-island-src=\"/m.js\" data-island-on=\"none\"></div>",
        );
        let registry = ModuleRegistry::new();
        registry.register("/m.js", Module::<String>::new(|_, _, _| {}));

        let hydrator = Hydrator::new(doc, Rc::new(registry), Rc::new(ImmediateHost));
        assert_eq!(hydrator.scan(), 2);
        assert_eq!(hydrator.status("a"), Some(IslandStatus::Scanned));

        assert_eq!(hydrator.hydrate_all(), 2);
        assert_eq!(hydrator.status("b"), Some(IslandStatus::Hydrated));

        hydrator.clear_loaded();
        assert_eq!(hydrator.status("a"), Some(IslandStatus::Scanned));
        assert_eq!(hydrator.status("b"), Some(IslandStatus::Scanned));
    }
}
