//! Trigger hosts: the environment half of lazy hydration.
//!
//! The hydrator never decides *when* idle time happens or visibility
//! changes; it hands the host a callback per island and the host fires it
//! when the trigger condition is met. `ImmediateHost` fires everything
//! synchronously; `ManualHost` holds callbacks until told, which is what
//! tests and headless environments use.

use std::cell::RefCell;

pub type TriggerCallback = Box<dyn FnOnce()>;

pub trait TriggerHost {
    /// Immediate trigger: hydrate as soon as scanning sees the island.
    fn on_ready(&self, callback: TriggerCallback);
    /// Idle trigger.
    fn on_idle(&self, callback: TriggerCallback);
    /// Visibility trigger, keyed by island id.
    fn on_visible(&self, island_id: &str, callback: TriggerCallback);
    /// Media query trigger.
    fn on_media(&self, query: &str, callback: TriggerCallback);
}

/// Fires every trigger the moment it is registered.
pub struct ImmediateHost;

impl TriggerHost for ImmediateHost {
    fn on_ready(&self, callback: TriggerCallback) {
        callback();
    }

    fn on_idle(&self, callback: TriggerCallback) {
        callback();
    }

    fn on_visible(&self, _island_id: &str, callback: TriggerCallback) {
        callback();
    }

    fn on_media(&self, _query: &str, callback: TriggerCallback) {
        callback();
    }
}

enum Pending {
    Idle(TriggerCallback),
    Visible(String, TriggerCallback),
    Media(String, TriggerCallback),
}

/// Holds idle, visibility, and media callbacks until explicitly fired.
/// Ready callbacks still run immediately.
#[derive(Default)]
pub struct ManualHost {
    pending: RefCell<Vec<Pending>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Fire all idle callbacks.
    pub fn fire_idle(&self) {
        self.fire(|p| matches!(p, Pending::Idle(_)));
    }

    /// Fire visibility callbacks for one island.
    pub fn fire_visible(&self, island_id: &str) {
        self.fire(|p| matches!(p, Pending::Visible(id, _) if id == island_id));
    }

    /// Fire media callbacks for one query.
    pub fn fire_media(&self, query: &str) {
        self.fire(|p| matches!(p, Pending::Media(q, _) if q == query));
    }

    fn fire(&self, matches: impl Fn(&Pending) -> bool) {
        // Drain matching entries first; a callback may register new ones.
        let mut kept = Vec::new();
        let mut fired = Vec::new();
        for entry in self.pending.borrow_mut().drain(..) {
            if matches(&entry) {
                fired.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.pending.borrow_mut().extend(kept);

        for entry in fired {
            let callback = match entry {
                Pending::Idle(cb) | Pending::Visible(_, cb) | Pending::Media(_, cb) => cb,
            };
            callback();
        }
    }
}

impl TriggerHost for ManualHost {
    fn on_ready(&self, callback: TriggerCallback) {
        callback();
    }

    fn on_idle(&self, callback: TriggerCallback) {
        self.pending.borrow_mut().push(Pending::Idle(callback));
    }

    fn on_visible(&self, island_id: &str, callback: TriggerCallback) {
        self.pending
            .borrow_mut()
            .push(Pending::Visible(island_id.to_string(), callback));
    }

    fn on_media(&self, query: &str, callback: TriggerCallback) {
        self.pending
            .borrow_mut()
            .push(Pending::Media(query.to_string(), callback));
    }
}
