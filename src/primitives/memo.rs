//! Memos: cached derived values.
//!
//! A memo is both a source (it can be read and subscribed to) and a reaction
//! (it has dependencies and recomputes). It is lazy: marking it dirty does
//! not run anything, the next read does. Its write version bumps only when
//! the recomputed value differs under the equality function, which is what
//! lets MAYBE_DIRTY subscribers skip their own re-run when an intermediate
//! memo landed on an equal value.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{default_equals, AnyReaction, AnySource, EqualsFn};
use crate::reactivity::tracking::{install_dependencies, needs_update, track_read};

pub struct MemoInner<T> {
    flags: Cell<u32>,
    func: RefCell<Option<Box<dyn Fn() -> T>>>,
    value: RefCell<Option<T>>,
    equals: EqualsFn<T>,
    write_version: Cell<u32>,
    read_version: Cell<u32>,
    last_run_version: Cell<u32>,
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,
    deps: RefCell<Vec<Rc<dyn AnySource>>>,
    self_weak: RefCell<Weak<MemoInner<T>>>,
}

impl<T> MemoInner<T> {
    pub fn new<F>(func: F) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
        T: PartialEq,
    {
        Self::new_with_equals(func, default_equals)
    }

    pub fn new_with_equals<F>(func: F, equals: EqualsFn<T>) -> Rc<Self>
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new(Self {
            // Starts dirty so the first read computes.
            flags: Cell::new(MEMO | SOURCE | DIRTY),
            func: RefCell::new(Some(Box::new(func))),
            value: RefCell::new(None),
            equals,
            write_version: Cell::new(0),
            read_version: Cell::new(0),
            last_run_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            deps: RefCell::new(Vec::new()),
            self_weak: RefCell::new(Weak::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        inner
    }

    fn cached(&self) -> T
    where
        T: Clone,
    {
        self.value
            .borrow()
            .as_ref()
            .expect("memo read before first compute")
            .clone()
    }

    /// Tracked recompute. Saves and restores the ambient collection state so
    /// a memo refreshed in the middle of an effect's run does not corrupt the
    /// effect's own dependency list.
    fn recompute(self: &Rc<Self>) -> bool
    where
        T: Clone + 'static,
    {
        if (self.flags.get() & DESTROYED) != 0 {
            return false;
        }

        let as_reaction: Rc<dyn AnyReaction> = self.clone();

        let (prev_reaction, prev_untracking, prev_deps) = with_context(|ctx| {
            let prev_r = ctx.set_active_reaction(Some(Rc::downgrade(&as_reaction)));
            let prev_u = ctx.set_untracking(false);
            let prev_d = ctx.swap_new_deps(Vec::new());
            ctx.increment_read_version();
            self.flags.set(self.flags.get() | REACTION_IS_UPDATING);
            (prev_r, prev_u, prev_d)
        });

        let new_value = {
            let func = self.func.borrow();
            (func.as_ref().expect("memo fn disposed"))()
        };

        let changed = {
            let current = self.value.borrow();
            match current.as_ref() {
                Some(v) => !(self.equals)(v, &new_value),
                None => true,
            }
        };
        if changed {
            *self.value.borrow_mut() = Some(new_value);
        }

        with_context(|ctx| {
            self.flags.set(self.flags.get() & !REACTION_IS_UPDATING);
            ctx.set_active_reaction(prev_reaction);
            ctx.set_untracking(prev_untracking);
        });

        install_dependencies(as_reaction, prev_deps);

        with_context(|ctx| {
            if changed {
                self.write_version.set(ctx.increment_write_version());
            }
            self.last_run_version.set(ctx.get_write_version());
        });

        self.flags.set((self.flags.get() & STATUS_MASK) | CLEAN);
        changed
    }
}

impl<T: Clone + 'static> AnySource for MemoInner<T> {
    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn set_flags(&self, flags: u32) {
        self.flags.set(flags);
    }

    fn write_version(&self) -> u32 {
        self.write_version.get()
    }

    fn set_write_version(&self, version: u32) {
        self.write_version.set(version);
    }

    fn read_version(&self) -> u32 {
        self.read_version.get()
    }

    fn set_read_version(&self, version: u32) {
        self.read_version.set(version);
    }

    fn reaction_count(&self) -> usize {
        self.reactions
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.reactions.borrow_mut().push(reaction);
    }

    fn cleanup_dead_reactions(&self) {
        self.reactions.borrow_mut().retain(|w| w.strong_count() > 0);
    }

    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool) {
        let live: Vec<Rc<dyn AnyReaction>> = self
            .reactions
            .borrow()
            .iter()
            .filter_map(|w| w.upgrade())
            .collect();
        for rc in live {
            if !f(rc) {
                break;
            }
        }
    }

    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>) {
        let reaction_ptr = Rc::as_ptr(reaction) as *const ();
        self.reactions.borrow_mut().retain(|weak| {
            if let Some(rc) = weak.upgrade() {
                Rc::as_ptr(&rc) as *const () != reaction_ptr
            } else {
                false
            }
        });
    }

    fn clear_reactions(&self) {
        self.reactions.borrow_mut().clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_memo_reaction(&self) -> Option<Rc<dyn AnyReaction>> {
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnyReaction>)
    }
}

impl<T: Clone + 'static> AnyReaction for MemoInner<T> {
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
        match self.self_weak.borrow().upgrade() {
            Some(rc) => rc.recompute(),
            None => false,
        }
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
        self.self_weak
            .borrow()
            .upgrade()
            .map(|rc| rc as Rc<dyn AnySource>)
    }
}

/// Cached derived value. See the module docs for the recompute contract.
#[derive(Clone)]
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T: Clone + 'static> Memo<T> {
    pub(crate) fn from_inner(inner: Rc<MemoInner<T>>) -> Self {
        Self { inner }
    }

    /// Current value, recomputing first if a dependency changed. Registers
    /// this memo as a dependency of the active computation.
    pub fn get(&self) -> T {
        let as_reaction: Rc<dyn AnyReaction> = self.inner.clone();
        if needs_update(&as_reaction) {
            as_reaction.update();
        }

        track_read(self.inner.clone() as Rc<dyn AnySource>);
        self.inner.cached()
    }

    pub fn as_any_source(&self) -> Rc<dyn AnySource> {
        self.inner.clone()
    }
}

/// Create a memo.
pub fn memo<T, F>(func: F) -> Memo<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Memo::from_inner(MemoInner::new(func))
}

/// Create a memo with a custom equality function.
pub fn memo_with_equals<T, F>(func: F, equals: EqualsFn<T>) -> Memo<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Memo::from_inner(MemoInner::new_with_equals(func, equals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::effect::effect;
    use crate::primitives::signal::signal;
    use std::cell::Cell;

    #[test]
    fn lazy_compute_and_cache() {
        let computes = Rc::new(Cell::new(0));
        let s = signal(1);

        let (s2, c2) = (s.clone(), computes.clone());
        let m = memo(move || {
            c2.set(c2.get() + 1);
            s2.get() * 2
        });

        // Nothing computed until first read.
        assert_eq!(computes.get(), 0);
        assert_eq!(m.get(), 2);
        assert_eq!(computes.get(), 1);

        // Cached on repeat reads.
        assert_eq!(m.get(), 2);
        assert_eq!(computes.get(), 1);

        s.set(5);
        assert_eq!(m.get(), 10);
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn unchanged_memo_value_stops_propagation() {
        let s = signal(1);
        let (s2,) = (s.clone(),);
        let parity = memo(move || s2.get() % 2);

        let runs = Rc::new(Cell::new(0));
        let (p2, r2) = (parity.clone(), runs.clone());
        let _e = effect(move || {
            let _ = p2.get();
            r2.set(r2.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        // 1 -> 3: parity unchanged, effect must not re-run.
        s.set(3);
        assert_eq!(runs.get(), 1);

        // 3 -> 4: parity changed.
        s.set(4);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn memo_chain() {
        let s = signal(1);
        let s2 = s.clone();
        let doubled = memo(move || s2.get() * 2);
        let d2 = doubled.clone();
        let quadrupled = memo(move || d2.get() * 2);

        assert_eq!(quadrupled.get(), 4);
        s.set(3);
        assert_eq!(quadrupled.get(), 12);
    }

    #[test]
    fn diamond_recomputes_once_per_read() {
        let computes = Rc::new(Cell::new(0));
        let s = signal(1);

        let sa = s.clone();
        let a = memo(move || sa.get() + 1);
        let sb = s.clone();
        let b = memo(move || sb.get() + 2);

        let (a2, b2, c2) = (a.clone(), b.clone(), computes.clone());
        let top = memo(move || {
            c2.set(c2.get() + 1);
            a2.get() + b2.get()
        });

        assert_eq!(top.get(), 5);
        assert_eq!(computes.get(), 1);

        s.set(2);
        assert_eq!(top.get(), 7);
        assert_eq!(computes.get(), 2);
    }

    #[test]
    #[should_panic(expected = "memos must be pure")]
    fn write_inside_memo_panics() {
        let a = signal(0);
        let b = signal(0);
        let (a2, b2) = (a.clone(), b.clone());
        let m = memo(move || {
            b2.set(a2.get() + 1);
            0
        });
        m.get();
    }

    #[test]
    fn dynamic_dependencies_retrack() {
        let flag = signal(true);
        let a = signal(1);
        let b = signal(10);
        let computes = Rc::new(Cell::new(0));

        let (f2, a2, b2, c2) = (flag.clone(), a.clone(), b.clone(), computes.clone());
        let m = memo(move || {
            c2.set(c2.get() + 1);
            if f2.get() { a2.get() } else { b2.get() }
        });

        assert_eq!(m.get(), 1);
        assert_eq!(computes.get(), 1);

        // b is not a dep while flag is true.
        b.set(20);
        assert_eq!(m.get(), 1);
        assert_eq!(computes.get(), 1);

        flag.set(false);
        assert_eq!(m.get(), 20);
        assert_eq!(computes.get(), 2);

        // a is no longer a dep.
        a.set(99);
        assert_eq!(m.get(), 20);
        assert_eq!(computes.get(), 2);
    }
}
