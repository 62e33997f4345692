//! Effect scheduling and the flush queue.
//!
//! Writes never run effects on the call stack of the write. They enqueue the
//! dirty effect; the queue is drained by an explicit loop once the outermost
//! write, batch or run completes. Draining can enqueue more work (effects
//! write signals), so the loop repeats until the queue is empty, with a
//! per-computation re-run cap so a self-dirtying effect is stopped instead of
//! wedging the flush.

use std::collections::HashMap;
use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::AnyReaction;
use crate::error::Error;
use crate::reactivity::tracking::{needs_update, remove_reactions};

/// Re-runs of a single computation allowed within one flush before it is
/// declared a loop and stopped.
pub(crate) const MAX_RERUNS_PER_FLUSH: u32 = 50;

/// Queue a dirty effect and flush unless something upstream will.
///
/// The flush is deferred when inside a batch (the batch exit flushes), while
/// a flush is already draining (the running loop will pick it up), or while a
/// reaction is executing (the scheduler flushes when it completes).
pub fn schedule(effect: Rc<dyn AnyReaction>) {
    let should_flush = with_context(|ctx| {
        ctx.add_pending_reaction(Rc::downgrade(&effect));
        !ctx.is_batching() && !ctx.is_flushing() && !ctx.has_active_reaction()
    });

    if should_flush {
        flush();
    }
}

/// Drain the pending-effect queue until it is empty.
///
/// Each pass takes a snapshot of the queue; an effect appearing several times
/// in one snapshot runs at most once (coalescing). An effect re-dirtied by a
/// later pass runs again, counted against [`MAX_RERUNS_PER_FLUSH`]; past the
/// cap it is stopped, detached from its dependencies and marked errored,
/// leaving the rest of the graph intact.
pub fn flush() {
    let was_flushing = with_context(|ctx| ctx.set_flushing(true));
    if was_flushing {
        return;
    }

    // Keyed by reaction identity; counts re-runs across passes of this flush.
    let mut run_counts: HashMap<*const (), u32> = HashMap::new();

    loop {
        let pending = with_context(|ctx| ctx.take_pending_reactions());
        if pending.is_empty() {
            break;
        }

        let mut ran_this_pass: Vec<*const ()> = Vec::new();

        for weak in pending {
            let Some(reaction) = weak.upgrade() else {
                continue;
            };

            let flags = reaction.flags();
            if (flags & (INERT | DESTROYED | ERRORED)) != 0 {
                continue;
            }
            if (flags & EFFECT) == 0 {
                // Memos refresh lazily on their next read.
                continue;
            }

            let key = Rc::as_ptr(&reaction) as *const ();
            if ran_this_pass.contains(&key) {
                continue;
            }

            if !needs_update(&reaction) {
                continue;
            }

            let count = run_counts.entry(key).or_insert(0);
            *count += 1;
            if *count > MAX_RERUNS_PER_FLUSH {
                stop_looping_reaction(reaction);
                continue;
            }

            ran_this_pass.push(key);
            reaction.update();
        }
    }

    with_context(|ctx| ctx.set_flushing(false));
}

/// Synchronously run everything pending. Public as `tick`-style helper.
pub fn flush_sync() {
    flush();
}

fn stop_looping_reaction(reaction: Rc<dyn AnyReaction>) {
    let err = Error::ReactiveLoop {
        reruns: MAX_RERUNS_PER_FLUSH,
    };
    tracing::error!(error = %err, "stopping reactive computation");

    remove_reactions(reaction.clone());
    reaction.set_flags((reaction.flags() & STATUS_MASK) | CLEAN | ERRORED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::cell::{Cell, RefCell};
    use crate::core::types::AnySource;

    struct CountingEffect {
        flags: Cell<u32>,
        last_run: Cell<u32>,
        runs: Cell<u32>,
        deps: RefCell<Vec<Rc<dyn AnySource>>>,
        redirty: Cell<bool>,
        self_weak: RefCell<std::rc::Weak<CountingEffect>>,
    }

    impl CountingEffect {
        fn new(redirty: bool) -> Rc<Self> {
            let rc = Rc::new(Self {
                flags: Cell::new(EFFECT | DIRTY),
                last_run: Cell::new(0),
                runs: Cell::new(0),
                deps: RefCell::new(Vec::new()),
                redirty: Cell::new(redirty),
                self_weak: RefCell::new(std::rc::Weak::new()),
            });
            *rc.self_weak.borrow_mut() = Rc::downgrade(&rc);
            rc
        }
    }

    impl AnyReaction for CountingEffect {
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
            self.set_flags((self.flags() & STATUS_MASK) | CLEAN);
            self.runs.set(self.runs.get() + 1);
            if self.redirty.get() {
                // Simulate an effect that re-dirties itself on every run.
                self.set_flags((self.flags() & STATUS_MASK) | DIRTY);
                if let Some(rc) = self.self_weak.borrow().upgrade() {
                    with_context(|ctx| {
                        ctx.add_pending_reaction(Rc::downgrade(
                            &(rc as Rc<dyn AnyReaction>),
                        ));
                    });
                }
            }
            false
        }

        fn last_run_version(&self) -> u32 {
            self.last_run.get()
        }

        fn set_last_run_version(&self, version: u32) {
            self.last_run.set(version);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_memo_source(&self) -> Option<Rc<dyn AnySource>> {
            None
        }
    }

    #[test]
    fn flush_runs_pending_dirty_effect() {
        let effect = CountingEffect::new(false);
        schedule(effect.clone() as Rc<dyn AnyReaction>);
        assert_eq!(effect.runs.get(), 1);
    }

    #[test]
    fn duplicate_enqueue_coalesces_to_one_run() {
        let effect = CountingEffect::new(false);
        with_context(|ctx| {
            let reaction: Rc<dyn AnyReaction> = effect.clone();
            ctx.add_pending_reaction(Rc::downgrade(&reaction));
            ctx.add_pending_reaction(Rc::downgrade(&reaction));
            ctx.add_pending_reaction(Rc::downgrade(&reaction));
        });
        flush();
        assert_eq!(effect.runs.get(), 1);
    }

    #[test]
    fn clean_effect_is_skipped() {
        let effect = CountingEffect::new(false);
        effect.set_flags((effect.flags() & STATUS_MASK) | CLEAN);
        schedule(effect.clone() as Rc<dyn AnyReaction>);
        assert_eq!(effect.runs.get(), 0);
    }

    #[test]
    fn self_dirtying_effect_is_stopped_at_cap() {
        let effect = CountingEffect::new(false);
        effect.redirty.set(true);
        schedule(effect.clone() as Rc<dyn AnyReaction>);

        assert_eq!(effect.runs.get(), MAX_RERUNS_PER_FLUSH);
        assert!((effect.flags() & ERRORED) != 0);

        // Stopped effect never runs again.
        effect.redirty.set(false);
        effect.set_flags((effect.flags() & STATUS_MASK) | DIRTY);
        schedule(effect.clone() as Rc<dyn AnyReaction>);
        assert_eq!(effect.runs.get(), MAX_RERUNS_PER_FLUSH);
    }

    #[test]
    fn destroyed_effect_is_skipped() {
        let effect = CountingEffect::new(false);
        effect.set_flags(effect.flags() | DESTROYED);
        schedule(effect.clone() as Rc<dyn AnyReaction>);
        assert_eq!(effect.runs.get(), 0);
    }
}
