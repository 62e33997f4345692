//! Type-erased traits and cell storage for the reactive graph.
//!
//! Graph operations (mark dirty, walk subscribers, compare versions) never
//! need the value type, so signals and memos of different `T` share one graph
//! through `Rc<dyn AnySource>` / `Weak<dyn AnyReaction>`. The cell → reaction
//! edge is a non-owning weak back-reference pruned on disposal; the reaction
//! → cell edge is owning, which keeps the cycle between a memo and the cells
//! it reads from leaking.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::constants::*;

/// Type-erased reactive cell: something that can be read and subscribed to.
///
/// Implemented by `CellInner<T>` (signals) and `MemoInner<T>`.
pub trait AnySource: Any {
    fn flags(&self) -> u32;
    fn set_flags(&self, flags: u32);

    /// Bumped when the value changes; memos compare this against their own
    /// version to resolve MAYBE_DIRTY without recomputing.
    fn write_version(&self) -> u32;
    fn set_write_version(&self, version: u32);

    /// Read-cycle stamp for dependency deduplication within one run.
    fn read_version(&self) -> u32;
    fn set_read_version(&self, version: u32);

    fn reaction_count(&self) -> usize;
    fn add_reaction(&self, reaction: Weak<dyn AnyReaction>);
    fn cleanup_dead_reactions(&self);
    fn for_each_reaction(&self, f: &mut dyn FnMut(Rc<dyn AnyReaction>) -> bool);
    fn remove_reaction(&self, reaction: &Rc<dyn AnyReaction>);
    fn clear_reactions(&self);

    fn is_memo(&self) -> bool {
        self.flags() & MEMO != 0
    }

    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    fn is_maybe_dirty(&self) -> bool {
        self.flags() & MAYBE_DIRTY != 0
    }

    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    fn mark_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
    }

    fn mark_maybe_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | MAYBE_DIRTY);
    }

    fn mark_clean(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
    }

    fn as_any(&self) -> &dyn Any;

    /// The reaction side of a memo, for resolving MAYBE_DIRTY chains.
    /// None for plain cells.
    fn as_memo_reaction(&self) -> Option<Rc<dyn AnyReaction>> {
        None
    }
}

/// Type-erased computation: something that can be marked dirty and re-run.
///
/// Implemented by `EffectInner` and `MemoInner<T>`.
pub trait AnyReaction: Any {
    fn flags(&self) -> u32;
    fn set_flags(&self, flags: u32);

    fn dep_count(&self) -> usize;
    fn add_dep(&self, source: Rc<dyn AnySource>);
    fn clear_deps(&self);
    fn for_each_dep(&self, f: &mut dyn FnMut(&Rc<dyn AnySource>) -> bool);

    /// Re-run the computation. Returns true if a memo's value changed.
    fn update(&self) -> bool;

    /// Global write version observed when this reaction last finished a run.
    /// A dep with a higher write version has changed since then.
    fn last_run_version(&self) -> u32;
    fn set_last_run_version(&self, version: u32);

    fn is_memo(&self) -> bool {
        self.flags() & MEMO != 0
    }

    fn is_effect(&self) -> bool {
        self.flags() & EFFECT != 0
    }

    fn is_dirty(&self) -> bool {
        self.flags() & DIRTY != 0
    }

    fn is_maybe_dirty(&self) -> bool {
        self.flags() & MAYBE_DIRTY != 0
    }

    fn is_clean(&self) -> bool {
        self.flags() & CLEAN != 0
    }

    fn is_destroyed(&self) -> bool {
        self.flags() & DESTROYED != 0
    }

    fn is_errored(&self) -> bool {
        self.flags() & ERRORED != 0
    }

    fn mark_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
    }

    fn mark_maybe_dirty(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | MAYBE_DIRTY);
    }

    fn mark_clean(&self) {
        self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
    }

    fn as_any(&self) -> &dyn Any;

    /// The source side of a memo, for cascade propagation in mark_reactions.
    /// None for effects.
    fn as_memo_source(&self) -> Option<Rc<dyn AnySource>>;
}

// =============================================================================
// Cell storage (the data behind Signal<T>)
// =============================================================================

/// Equality function used to short-circuit writes.
pub type EqualsFn<T> = fn(&T, &T) -> bool;

/// Default equality via PartialEq.
pub fn default_equals<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

/// Storage for one reactive memory location.
///
/// Separate from `Signal<T>` so `Rc<CellInner<T>>` can live in the graph as
/// `Rc<dyn AnySource>`.
pub struct CellInner<T> {
    flags: Cell<u32>,
    value: RefCell<T>,
    write_version: Cell<u32>,
    read_version: Cell<u32>,
    reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,
    equals: EqualsFn<T>,
}

impl<T> CellInner<T> {
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::new_with_equals(value, default_equals)
    }

    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self {
            flags: Cell::new(SOURCE | CLEAN),
            value: RefCell::new(value),
            write_version: Cell::new(0),
            read_version: Cell::new(0),
            reactions: RefCell::new(Vec::new()),
            equals,
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Replace the value. Returns true if it changed under the equality fn.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let current = self.value.borrow();
            !(self.equals)(&current, &value)
        };
        if changed {
            *self.value.borrow_mut() = value;
        }
        changed
    }

    /// Mutate in place. Returns true if anyone is subscribed (in-place
    /// mutation cannot be equality-checked).
    pub fn mutate(&self, f: impl FnOnce(&mut T)) -> bool {
        {
            let mut current = self.value.borrow_mut();
            f(&mut current);
        }
        self.reactions
            .borrow()
            .iter()
            .any(|w| w.strong_count() > 0)
    }
}

impl<T: 'static> AnySource for CellInner<T> {
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
        // Collect first: the callback may re-borrow this cell's reaction list.
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
}
