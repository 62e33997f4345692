//! Thread-local reactive context.
//!
//! All graph bookkeeping lives here: the currently running reaction, global
//! read/write version counters, the dependency list being collected for the
//! current run, and the pending-flush queue. The graph is process-wide
//! mutable state with page/process lifetime; nothing here needs explicit
//! teardown.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::types::{AnyReaction, AnySource};

pub struct ReactiveContext {
    /// Currently executing reaction (effect or memo).
    pub active_reaction: RefCell<Option<Weak<dyn AnyReaction>>>,

    /// Whether reads are currently untracked.
    pub untracking: Cell<bool>,

    /// Incremented on every value change anywhere in the graph.
    pub write_version: Cell<u32>,

    /// Incremented at the start of every reaction run; used to deduplicate
    /// dependency registration within a single run.
    pub read_version: Cell<u32>,

    /// Dependencies collected during the current reaction run.
    pub new_deps: RefCell<Vec<Rc<dyn AnySource>>>,

    /// Nested `batch()` depth.
    pub batch_depth: Cell<u32>,

    /// Dirty effects awaiting the next flush, in the order they were marked.
    pub pending_reactions: RefCell<Vec<Weak<dyn AnyReaction>>>,

    /// Whether a flush is in progress. Writes during a flush enqueue onto the
    /// current flush instead of starting a nested one.
    pub flushing: Cell<bool>,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self {
            active_reaction: RefCell::new(None),
            untracking: Cell::new(false),
            write_version: Cell::new(1),
            read_version: Cell::new(0),
            new_deps: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            pending_reactions: RefCell::new(Vec::new()),
            flushing: Cell::new(false),
        }
    }

    // =========================================================================
    // Reaction tracking
    // =========================================================================

    pub fn set_active_reaction(
        &self,
        reaction: Option<Weak<dyn AnyReaction>>,
    ) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.replace(reaction)
    }

    pub fn get_active_reaction(&self) -> Option<Weak<dyn AnyReaction>> {
        self.active_reaction.borrow().clone()
    }

    pub fn has_active_reaction(&self) -> bool {
        self.active_reaction.borrow().is_some()
    }

    pub fn set_untracking(&self, value: bool) -> bool {
        self.untracking.replace(value)
    }

    pub fn is_untracking(&self) -> bool {
        self.untracking.get()
    }

    // =========================================================================
    // Version counters
    // =========================================================================

    pub fn increment_write_version(&self) -> u32 {
        let v = self.write_version.get() + 1;
        self.write_version.set(v);
        v
    }

    pub fn get_write_version(&self) -> u32 {
        self.write_version.get()
    }

    pub fn increment_read_version(&self) -> u32 {
        let v = self.read_version.get() + 1;
        self.read_version.set(v);
        v
    }

    pub fn get_read_version(&self) -> u32 {
        self.read_version.get()
    }

    // =========================================================================
    // Dependency collection
    // =========================================================================

    pub fn swap_new_deps(&self, deps: Vec<Rc<dyn AnySource>>) -> Vec<Rc<dyn AnySource>> {
        self.new_deps.replace(deps)
    }

    pub fn add_new_dep(&self, source: Rc<dyn AnySource>) {
        self.new_deps.borrow_mut().push(source);
    }

    pub fn new_dep_count(&self) -> usize {
        self.new_deps.borrow().len()
    }

    // =========================================================================
    // Batching and flushing
    // =========================================================================

    pub fn enter_batch(&self) -> u32 {
        let depth = self.batch_depth.get() + 1;
        self.batch_depth.set(depth);
        depth
    }

    pub fn exit_batch(&self) -> u32 {
        let depth = self.batch_depth.get().saturating_sub(1);
        self.batch_depth.set(depth);
        depth
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub fn add_pending_reaction(&self, reaction: Weak<dyn AnyReaction>) {
        self.pending_reactions.borrow_mut().push(reaction);
    }

    pub fn take_pending_reactions(&self) -> Vec<Weak<dyn AnyReaction>> {
        self.pending_reactions.replace(Vec::new())
    }

    pub fn has_pending_reactions(&self) -> bool {
        !self.pending_reactions.borrow().is_empty()
    }

    pub fn set_flushing(&self, value: bool) -> bool {
        self.flushing.replace(value)
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }
}

impl Default for ReactiveContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Thread-local access
// =============================================================================

thread_local! {
    static CONTEXT: ReactiveContext = ReactiveContext::new();
}

/// Access the thread-local reactive context.
pub fn with_context<R>(f: impl FnOnce(&ReactiveContext) -> R) -> R {
    CONTEXT.with(f)
}

/// True when inside a reaction and not untracking.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.has_active_reaction() && !ctx.is_untracking())
}

/// Current global write version.
pub fn write_version() -> u32 {
    with_context(|ctx| ctx.get_write_version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_defaults() {
        with_context(|ctx| {
            assert!(!ctx.has_active_reaction());
            assert!(!ctx.is_untracking());
            assert!(!ctx.is_batching());
            assert!(!ctx.is_flushing());
            assert!(ctx.get_write_version() >= 1);
        });
    }

    #[test]
    fn version_counters_monotonic() {
        with_context(|ctx| {
            let w = ctx.get_write_version();
            assert_eq!(ctx.increment_write_version(), w + 1);
            let r = ctx.get_read_version();
            assert_eq!(ctx.increment_read_version(), r + 1);
        });
    }

    #[test]
    fn batch_depth_nesting() {
        with_context(|ctx| {
            assert_eq!(ctx.enter_batch(), 1);
            assert_eq!(ctx.enter_batch(), 2);
            assert!(ctx.is_batching());
            assert_eq!(ctx.exit_batch(), 1);
            assert_eq!(ctx.exit_batch(), 0);
            assert!(!ctx.is_batching());
        });
    }

    #[test]
    fn untracking_flag_roundtrip() {
        with_context(|ctx| {
            assert!(!ctx.set_untracking(true));
            assert!(ctx.is_untracking());
            assert!(ctx.set_untracking(false));
        });
    }
}
