//! Effect scopes: grouped disposal for computations.
//!
//! Every structural node activation (a Show branch, a keyed row, an Async
//! state) owns one scope. Effects created while a scope is active are
//! collected by it; stopping the scope disposes them all, runs registered
//! cleanups, and stops child scopes.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::types::AnyReaction;
use crate::primitives::effect::{destroy_effect, EffectInner};
use crate::reactivity::scheduling::{flush_sync, schedule};

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<Rc<EffectScopeInner>>> = const { RefCell::new(None) };
}

fn get_active_scope() -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.borrow().clone())
}

fn set_active_scope(scope: Option<Rc<EffectScopeInner>>) -> Option<Rc<EffectScopeInner>> {
    ACTIVE_SCOPE.with(|s| s.replace(scope))
}

pub type ScopeCleanupFn = Box<dyn FnOnce()>;

pub struct EffectScopeInner {
    active: Cell<bool>,
    paused: Cell<bool>,
    effects: RefCell<Vec<Rc<EffectInner>>>,
    cleanups: RefCell<Vec<ScopeCleanupFn>>,
    parent: RefCell<Option<Weak<EffectScopeInner>>>,
    scopes: RefCell<Vec<Rc<EffectScopeInner>>>,
    self_weak: RefCell<Weak<EffectScopeInner>>,
}

impl EffectScopeInner {
    fn new(detached: bool) -> Rc<Self> {
        let parent = if detached { None } else { get_active_scope() };

        let scope = Rc::new(Self {
            active: Cell::new(true),
            paused: Cell::new(false),
            effects: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            parent: RefCell::new(parent.as_ref().map(Rc::downgrade)),
            scopes: RefCell::new(Vec::new()),
            self_weak: RefCell::new(Weak::new()),
        });
        *scope.self_weak.borrow_mut() = Rc::downgrade(&scope);

        if let Some(ref parent_scope) = parent {
            parent_scope.scopes.borrow_mut().push(scope.clone());
        }

        scope
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub fn run<R, F: FnOnce() -> R>(&self, f: F) -> Option<R> {
        if !self.active.get() {
            return None;
        }
        let self_rc = self.self_weak.borrow().upgrade()?;

        let prev = set_active_scope(Some(self_rc));
        let result = f();
        set_active_scope(prev);
        Some(result)
    }

    pub fn stop(&self) {
        if !self.active.get() {
            return;
        }

        // Settle pending work so nothing re-fires mid-teardown.
        flush_sync();

        let effects: Vec<_> = self.effects.borrow_mut().drain(..).collect();
        for effect in effects {
            destroy_effect(effect);
        }

        // Reverse order, matching registration nesting.
        let cleanups: Vec<_> = self.cleanups.borrow_mut().drain(..).collect();
        for cleanup in cleanups.into_iter().rev() {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));
        }

        let children: Vec<_> = self.scopes.borrow_mut().drain(..).collect();
        for child in children {
            child.stop();
        }

        if let Some(parent) = self.parent.borrow().as_ref().and_then(|w| w.upgrade()) {
            if let Some(self_rc) = self.self_weak.borrow().upgrade() {
                parent.scopes.borrow_mut().retain(|s| !Rc::ptr_eq(s, &self_rc));
            }
        }

        self.active.set(false);
    }

    pub fn pause(&self) {
        if !self.active.get() || self.paused.get() {
            return;
        }
        self.paused.set(true);

        for effect in self.effects.borrow().iter() {
            effect.set_flags(effect.flags() | INERT);
        }
        for child in self.scopes.borrow().iter() {
            child.pause();
        }
    }

    pub fn resume(&self) {
        if !self.active.get() || !self.paused.get() {
            return;
        }
        self.paused.set(false);

        for effect in self.effects.borrow().iter() {
            let flags = effect.flags();
            effect.set_flags(flags & !INERT);
            if (flags & (DIRTY | MAYBE_DIRTY)) != 0 {
                schedule(effect.clone() as Rc<dyn AnyReaction>);
            }
        }
        for child in self.scopes.borrow().iter() {
            child.resume();
        }
    }

    pub fn add_effect(&self, effect: Rc<EffectInner>) {
        self.effects.borrow_mut().push(effect);
    }

    pub fn add_cleanup(&self, cleanup: ScopeCleanupFn) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl Drop for EffectScopeInner {
    fn drop(&mut self) {
        if self.active.get() {
            self.stop();
        }
    }
}

/// Scope handle. Clones share the scope.
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<EffectScopeInner>,
}

impl EffectScope {
    /// Create a scope. A non-detached scope is stopped automatically when
    /// the scope active at its creation stops.
    pub fn new(detached: bool) -> Self {
        Self {
            inner: EffectScopeInner::new(detached),
        }
    }

    pub fn active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn paused(&self) -> bool {
        self.inner.is_paused()
    }

    /// Run `f` with this scope collecting created effects. Returns None if
    /// the scope has been stopped.
    pub fn run<R, F: FnOnce() -> R>(&self, f: F) -> Option<R> {
        self.inner.run(f)
    }

    /// Dispose every collected effect, run cleanups, stop child scopes.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn pause(&self) {
        self.inner.pause();
    }

    pub fn resume(&self) {
        self.inner.resume();
    }
}

/// Create a scope; sugar for [`EffectScope::new`].
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// Register a cleanup with the active scope. No-op (with a warning) outside
/// a scope.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    match get_active_scope() {
        Some(scope) => scope.add_cleanup(Box::new(f)),
        None => {
            tracing::warn!("on_scope_dispose called outside a scope; cleanup will never run");
        }
    }
}

/// Collect a freshly created effect into the active scope, if any.
pub(crate) fn register_effect_with_scope(effect: &Rc<EffectInner>) {
    if let Some(scope) = get_active_scope() {
        scope.add_effect(effect.clone());
    }
}
