//! Virtual node model.
//!
//! `VNode<Ev>` is a closed sum over everything a tree can contain, generic
//! over the event value type `Ev`. Structural nodes (`Show`, `For`, `Async`)
//! carry thunks, not values: the renderer evaluates them once per snapshot,
//! the reconciler wires one computation per dynamic point.
//!
//! `For` and `Async` erase their item types at construction so the enum
//! itself stays monomorphic: the typed closures are captured inside
//! `Rc<dyn Fn>` fields and only ever see their own `T` again through
//! downcasts on per-row signal storage.

pub mod island;

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::primitives::signal::{signal, Signal};

pub use island::{IslandState, Trigger};

/// A virtual tree node, parameterized by the event value type.
pub enum VNode<Ev> {
    Element(ElementNode<Ev>),
    Text(String),
    DynamicText(Rc<dyn Fn() -> String>),
    Fragment(Vec<VNode<Ev>>),
    Show(ShowNode<Ev>),
    For(ForNode<Ev>),
    Island(IslandNode<Ev>),
    Async(AsyncNode<Ev>),
}

pub struct ElementNode<Ev> {
    pub tag: String,
    pub attrs: Vec<Attr<Ev>>,
    pub children: Vec<VNode<Ev>>,
}

/// One attribute or listener on an element.
pub enum Attr<Ev> {
    Static {
        name: String,
        value: String,
    },
    /// Re-evaluated reactively by the reconciler; snapshotted by the string
    /// renderer.
    Dynamic {
        name: String,
        value: Rc<dyn Fn() -> String>,
    },
    Listener {
        event: String,
        handler: Rc<dyn Fn(&Ev)>,
    },
}

pub struct ShowNode<Ev> {
    pub when: Rc<dyn Fn() -> bool>,
    pub build: Rc<dyn Fn() -> VNode<Ev>>,
    pub otherwise: Option<Rc<dyn Fn() -> VNode<Ev>>>,
}

// =============================================================================
// For: keyed lists
// =============================================================================

/// Per-key item signal storage for one mounted `For`.
///
/// Values are `Signal<T>` boxed as `Any`; only the snapshot closure that
/// created them knows `T` and downcasts on the way back out.
#[derive(Default)]
pub struct ForRows {
    items: HashMap<String, Box<dyn Any>>,
}

impl ForRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn insert(&mut self, key: String, sig: Box<dyn Any>) {
        self.items.insert(key, sig);
    }

    pub fn get(&self, key: &str) -> Option<&dyn Any> {
        self.items.get(key).map(|b| b.as_ref())
    }

    /// Drop storage for keys no longer present.
    pub fn retain_keys(&mut self, live: &[String]) {
        self.items.retain(|k, _| live.iter().any(|l| l == k));
    }
}

/// One row of a `For` snapshot, in list order.
pub enum ForEntry<Ev> {
    /// Key already mounted; its item signal has been updated in place.
    Existing { key: String },
    /// New key; the factory builds its subtree once.
    New {
        key: String,
        build: Rc<dyn Fn() -> VNode<Ev>>,
    },
}

impl<Ev> ForEntry<Ev> {
    pub fn key(&self) -> &str {
        match self {
            ForEntry::Existing { key } => key,
            ForEntry::New { key, .. } => key,
        }
    }
}

pub struct ForNode<Ev> {
    /// Evaluates the item getter (tracked), updates/creates per-key item
    /// signals in the given rows, and returns the desired row order.
    /// Duplicate keys are logged and dropped after their first occurrence.
    pub snapshot: Rc<dyn Fn(&mut ForRows) -> Vec<ForEntry<Ev>>>,
}

// =============================================================================
// Async
// =============================================================================

/// Polled state of an asynchronous source. Executors resolve it by writing
/// the signal; the core never owns a future.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncState<T> {
    Pending,
    Resolved(T),
    Rejected(String),
}

/// Type-erased view of an `AsyncState` at one instant.
pub enum AsyncSnapshot<Ev> {
    Pending,
    Resolved(Rc<dyn Fn() -> VNode<Ev>>),
    Rejected(String),
}

impl<Ev> AsyncSnapshot<Ev> {
    pub fn discriminant(&self) -> u8 {
        match self {
            AsyncSnapshot::Pending => 0,
            AsyncSnapshot::Resolved(_) => 1,
            AsyncSnapshot::Rejected(_) => 2,
        }
    }
}

pub struct AsyncNode<Ev> {
    /// Reads the async source (tracked) and maps it to a snapshot.
    pub state: Rc<dyn Fn() -> AsyncSnapshot<Ev>>,
    /// Shown while pending. Empty output when absent.
    pub fallback: Option<Rc<dyn Fn() -> VNode<Ev>>>,
    /// Shown on rejection, given the error text.
    pub rejected: Option<Rc<dyn Fn(&str) -> VNode<Ev>>>,
}

// =============================================================================
// Island
// =============================================================================

pub struct IslandNode<Ev> {
    pub id: String,
    pub src: String,
    pub trigger: Trigger,
    pub state: IslandState,
    pub children: Vec<VNode<Ev>>,
}

// =============================================================================
// Builders
// =============================================================================

pub fn el<Ev>(
    tag: impl Into<String>,
    attrs: Vec<Attr<Ev>>,
    children: Vec<VNode<Ev>>,
) -> VNode<Ev> {
    VNode::Element(ElementNode {
        tag: tag.into(),
        attrs,
        children,
    })
}

pub fn attr<Ev>(name: impl Into<String>, value: impl Into<String>) -> Attr<Ev> {
    Attr::Static {
        name: name.into(),
        value: value.into(),
    }
}

pub fn dyn_attr<Ev>(name: impl Into<String>, value: impl Fn() -> String + 'static) -> Attr<Ev> {
    Attr::Dynamic {
        name: name.into(),
        value: Rc::new(value),
    }
}

pub fn on<Ev>(event: impl Into<String>, handler: impl Fn(&Ev) + 'static) -> Attr<Ev> {
    Attr::Listener {
        event: event.into(),
        handler: Rc::new(handler),
    }
}

pub fn text<Ev>(content: impl Into<String>) -> VNode<Ev> {
    VNode::Text(content.into())
}

pub fn dyn_text<Ev>(thunk: impl Fn() -> String + 'static) -> VNode<Ev> {
    VNode::DynamicText(Rc::new(thunk))
}

pub fn fragment<Ev>(children: Vec<VNode<Ev>>) -> VNode<Ev> {
    VNode::Fragment(children)
}

/// Conditional subtree. `build` runs once per activation, not once per
/// condition evaluation.
pub fn show<Ev>(
    when: impl Fn() -> bool + 'static,
    build: impl Fn() -> VNode<Ev> + 'static,
) -> VNode<Ev> {
    VNode::Show(ShowNode {
        when: Rc::new(when),
        build: Rc::new(build),
        otherwise: None,
    })
}

/// Conditional subtree with an else branch.
pub fn show_else<Ev>(
    when: impl Fn() -> bool + 'static,
    build: impl Fn() -> VNode<Ev> + 'static,
    otherwise: impl Fn() -> VNode<Ev> + 'static,
) -> VNode<Ev> {
    VNode::Show(ShowNode {
        when: Rc::new(when),
        build: Rc::new(build),
        otherwise: Some(Rc::new(otherwise)),
    })
}

/// Keyed list. Each item's subtree is built once per key; value changes
/// under a stable key flow through the per-item signal instead of a
/// rebuild. Duplicate keys keep the first occurrence.
pub fn for_each<Ev, T, I, K, B>(items: I, key_fn: K, build: B) -> VNode<Ev>
where
    T: Clone + PartialEq + 'static,
    I: Fn() -> Vec<T> + 'static,
    K: Fn(&T) -> String + 'static,
    B: Fn(Signal<T>) -> VNode<Ev> + 'static,
{
    let build = Rc::new(build);

    let snapshot = move |rows: &mut ForRows| {
        let list = items();
        let mut entries: Vec<ForEntry<Ev>> = Vec::with_capacity(list.len());
        let mut seen: Vec<String> = Vec::with_capacity(list.len());

        for item in list {
            let key = key_fn(&item);
            if seen.iter().any(|k| k == &key) {
                tracing::warn!(key = %key, "duplicate key in keyed list; dropping row");
                continue;
            }
            seen.push(key.clone());

            if rows.contains(&key) {
                if let Some(sig) = rows.get(&key).and_then(|b| b.downcast_ref::<Signal<T>>()) {
                    sig.set(item);
                }
                entries.push(ForEntry::Existing { key });
            } else {
                let sig = signal(item);
                rows.insert(key.clone(), Box::new(sig.clone()));
                let build = build.clone();
                entries.push(ForEntry::New {
                    key,
                    build: Rc::new(move || build(sig.clone())),
                });
            }
        }

        rows.retain_keys(&seen);
        entries
    };

    VNode::For(ForNode {
        snapshot: Rc::new(snapshot),
    })
}

/// Async boundary: fallback while the polled source is pending, the built
/// subtree once resolved, the rejected branch (or nothing) on failure.
pub fn suspense<Ev, T, S, B>(
    source: S,
    build: B,
    fallback: Option<Rc<dyn Fn() -> VNode<Ev>>>,
    rejected: Option<Rc<dyn Fn(&str) -> VNode<Ev>>>,
) -> VNode<Ev>
where
    T: Clone + 'static,
    S: Fn() -> AsyncState<T> + 'static,
    B: Fn(T) -> VNode<Ev> + 'static,
{
    let build = Rc::new(build);
    let state = move || match source() {
        AsyncState::Pending => AsyncSnapshot::Pending,
        AsyncState::Resolved(value) => {
            let build = build.clone();
            AsyncSnapshot::Resolved(Rc::new(move || build(value.clone())))
        }
        AsyncState::Rejected(err) => AsyncSnapshot::Rejected(err),
    };

    VNode::Async(AsyncNode {
        state: Rc::new(state),
        fallback,
        rejected,
    })
}

/// Hydration boundary wrapper.
pub fn island<Ev>(
    id: impl Into<String>,
    src: impl Into<String>,
    trigger: Trigger,
    state: IslandState,
    children: Vec<VNode<Ev>>,
) -> VNode<Ev> {
    VNode::Island(IslandNode {
        id: id.into(),
        src: src.into(),
        trigger,
        state,
        children,
    })
}
