//! Effects: side-effecting computations.
//!
//! An effect re-runs whenever a dependency changes. Its dependency set is
//! whatever it read during its most recent run, nothing more. Disposal is
//! scope-based: effects do not own each other, the `EffectScope` active at
//! creation time owns them.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::primitives::scope::register_effect_with_scope;
use crate::reactivity::scheduling::flush;
use crate::reactivity::tracking::{install_dependencies, remove_reactions};

/// Cleanup returned by an effect body; runs before the next run and on
/// disposal.
pub type CleanupFn = Box<dyn FnOnce()>;

/// Effect body.
pub type EffectFn = Box<dyn FnMut() -> Option<CleanupFn>>;

pub struct EffectInner {
    flags: Cell<u32>,
    last_run_version: Cell<u32>,
    func: RefCell<Option<EffectFn>>,
    deps: RefCell<Vec<Rc<dyn AnySource>>>,
    teardown: RefCell<Option<CleanupFn>>,
    self_weak: RefCell<Weak<EffectInner>>,
}

impl EffectInner {
    pub fn new(effect_type: u32, func: Option<EffectFn>) -> Rc<Self> {
        let effect = Rc::new(Self {
            flags: Cell::new(effect_type | DIRTY),
            last_run_version: Cell::new(0),
            func: RefCell::new(func),
            deps: RefCell::new(Vec::new()),
            teardown: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });
        *effect.self_weak.borrow_mut() = Rc::downgrade(&effect);
        effect
    }

    pub fn as_weak_reaction(&self) -> Weak<dyn AnyReaction> {
        match self.self_weak.borrow().upgrade() {
            Some(rc) => Rc::downgrade(&(rc as Rc<dyn AnyReaction>)),
            None => Weak::<EffectInner>::new() as Weak<dyn AnyReaction>,
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Some(cleanup) = self.teardown.borrow_mut().take() {
            cleanup();
        }
    }
}

impl AnyReaction for EffectInner {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    fn add_dep(&self, source: Rc<dyn AnySource>) {
        self.deps.borrow_mut().push(source);
    }

    fn clear_deps(&self) {
        self.deps.borrow_mut().clear();
    }

    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySource>) -> bool) {
        for dep in self.deps.borrow().iter() {
            if !f(dep) {
                break;
            }
        }
    }

    fn update(&self) -> bool {
        if (self.flags.get() & (DESTROYED | ERRORED)) != 0 {
            return false;
        }
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            update_effect(&rc);
        }
        false
    }

    fn last_run_version(&self) -> u32 {
        self.last_run_version.get()
    }

    fn set_last_run_version(&self, version: u32) {
        self.last_run_version.set(version);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_memo_source(&self) -> Option<Rc<dyn AnySource>> {
        None
    }
}

/// Handle to a running effect.
///
/// Dropping the last handle disposes the effect unless a scope owns it.
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    pub(crate) fn from_inner(inner: Rc<EffectInner>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Rc<EffectInner> {
        &self.inner
    }

    pub fn is_destroyed(&self) -> bool {
        (self.inner.flags.get() & DESTROYED) != 0
    }

    /// True if the scheduler stopped this effect (loop cap or panic).
    pub fn is_errored(&self) -> bool {
        (self.inner.flags.get() & ERRORED) != 0
    }

    pub fn dispose(&self) {
        destroy_effect(self.inner.clone());
    }
}

impl Drop for Effect {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) == 1 {
            self.dispose();
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Run the effect's teardown, if any.
pub(crate) fn execute_teardown(effect: &EffectInner) {
    if let Some(cleanup) = effect.teardown.borrow_mut().take() {
        cleanup();
    }
}

/// Dispose an effect: detach it from every dependency, run its teardown,
/// drop its body.
pub fn destroy_effect(effect: Rc<EffectInner>) {
    if (effect.flags.get() & DESTROYED) != 0 {
        return;
    }

    remove_reactions(effect.clone() as Rc<dyn AnyReaction>);
    effect.set_flags((effect.flags() & STATUS_MASK) | CLEAN | DESTROYED);
    execute_teardown(&effect);
    *effect.func.borrow_mut() = None;
    effect.deps.borrow_mut().clear();
}

/// Run an effect and re-track its dependencies.
///
/// The untracking flag is cleared for the duration of the run so an effect
/// mounted inside an `untrack` block still tracks its own reads.
pub fn update_effect(effect: &Rc<EffectInner>) {
    if (effect.flags.get() & (DESTROYED | ERRORED)) != 0 {
        return;
    }

    effect.set_flags((effect.flags() & STATUS_MASK) | CLEAN);
    execute_teardown(effect);

    let (prev_reaction, prev_untracking, prev_deps) = with_context(|ctx| {
        let prev_r = ctx.set_active_reaction(Some(effect.as_weak_reaction()));
        let prev_u = ctx.set_untracking(false);
        let prev_d = ctx.swap_new_deps(Vec::new());
        ctx.increment_read_version();
        effect.set_flags(effect.flags() | REACTION_IS_UPDATING);
        (prev_r, prev_u, prev_d)
    });

    // Contain panics at the computation boundary: the graph stays
    // consistent and only this effect is stopped.
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut func_borrow = effect.func.borrow_mut();
        match func_borrow.as_mut() {
            Some(func) => func(),
            None => None,
        }
    }));

    let reaction: Rc<dyn AnyReaction> = effect.clone();
    with_context(|ctx| {
        effect.set_flags(effect.flags() & !REACTION_IS_UPDATING);
        ctx.set_active_reaction(prev_reaction);
        ctx.set_untracking(prev_untracking);
    });

    match outcome {
        Ok(teardown) => {
            install_dependencies(reaction, prev_deps);
            with_context(|ctx| effect.last_run_version.set(ctx.get_write_version()));
            *effect.teardown.borrow_mut() = teardown;
        }
        Err(payload) => {
            // Partial dep collection is discarded; the effect is detached
            // and stopped.
            let _ = with_context(|ctx| ctx.swap_new_deps(prev_deps));
            remove_reactions(reaction);

            let msg = panic_message(&payload);
            tracing::error!(panic = %msg, "effect panicked; stopping it");
            effect.set_flags((effect.flags() & STATUS_MASK) | CLEAN | ERRORED);
            *effect.func.borrow_mut() = None;
            *effect.teardown.borrow_mut() = None;
        }
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}

/// Create an effect. Runs once immediately, then on dependency changes.
pub fn effect<F>(mut f: F) -> Effect
where
    F: FnMut() + 'static,
{
    effect_with_cleanup(move || {
        f();
        None
    })
}

/// Create an effect whose body can return a cleanup, run before the next
/// run and on disposal.
pub fn effect_with_cleanup<F>(f: F) -> Effect
where
    F: FnMut() -> Option<CleanupFn> + 'static,
{
    create_effect(EFFECT, Box::new(f))
}

pub(crate) fn create_effect(effect_type: u32, func: EffectFn) -> Effect {
    let inner = EffectInner::new(effect_type, Some(func));
    register_effect_with_scope(&inner);

    update_effect(&inner);

    // The initial run may have written signals; those flushes were deferred
    // while this effect was the active reaction.
    let should_flush = with_context(|ctx| {
        ctx.has_pending_reactions()
            && !ctx.is_batching()
            && !ctx.is_flushing()
            && !ctx.has_active_reaction()
    });
    if should_flush {
        flush();
    }

    Effect::from_inner(inner)
}

/// True while inside a tracking computation.
pub fn effect_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction())
}
