//! Dependency tracking and dirty propagation.
//!
//! Reads register dependencies on the active reaction; writes walk the
//! subscriber graph marking reactions dirty and scheduling effects. RefCell
//! borrows are never held across graph mutation: reactions are collected into
//! a Vec first, then mutated (the collect-then-mutate discipline every
//! function here follows).

use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::{AnyReaction, AnySource};
use crate::reactivity::scheduling::schedule;

/// Register a read of `source` against the active reaction, if any.
///
/// Called by `Signal::get`/`Memo::get` after reading the value. Reads outside
/// a reaction, or under `untrack`, register nothing.
pub fn track_read(source: Rc<dyn AnySource>) {
    with_context(|ctx| {
        if !ctx.has_active_reaction() || ctx.is_untracking() {
            return;
        }

        let reaction = match ctx.get_active_reaction().and_then(|w| w.upgrade()) {
            Some(r) => r,
            None => return,
        };

        if (reaction.flags() & REACTION_IS_UPDATING) != 0 {
            // Version-based dedup: each source is collected at most once per
            // run, however many times it is read.
            let read_version = ctx.get_read_version();
            if source.read_version() < read_version {
                source.set_read_version(read_version);
                ctx.add_new_dep(source.clone());
            }
        } else {
            // Read after setup (e.g. inside a teardown). Wire directly.
            reaction.add_dep(source.clone());
            source.add_reaction(Rc::downgrade(&reaction));
        }
    });
}

/// Propagate a value change from `source` through the graph.
///
/// Direct subscribers go DIRTY; memo subscribers cascade MAYBE_DIRTY to
/// their own subscribers; dirty effects are scheduled.
///
/// # Panics
///
/// Writing from inside a memo computation is a programming error (memos must
/// be pure) and panics.
pub fn notify_write(source: Rc<dyn AnySource>) {
    with_context(|ctx| {
        if let Some(reaction) = ctx.get_active_reaction().and_then(|w| w.upgrade()) {
            if (reaction.flags() & MEMO) != 0 && (reaction.flags() & REACTION_IS_UPDATING) != 0 {
                panic!("cannot write to a signal inside a memo; memos must be pure");
            }
        }
    });

    mark_reactions(source, DIRTY);
}

/// Mark every reaction of `source` with `status`, cascading through memos.
///
/// Iterative with an explicit stack so deep memo chains cannot overflow.
pub fn mark_reactions(source: Rc<dyn AnySource>, status: u32) {
    let mut effects_to_schedule: Vec<Rc<dyn AnyReaction>> = Vec::new();
    let mut stack: Vec<(Rc<dyn AnySource>, u32)> = vec![(source, status)];

    while let Some((current, current_status)) = stack.pop() {
        current.cleanup_dead_reactions();

        let reactions: Vec<Rc<dyn AnyReaction>> = {
            let mut collected = Vec::new();
            current.for_each_reaction(&mut |reaction| {
                collected.push(reaction);
                true
            });
            collected
        };

        for reaction in reactions {
            let flags = reaction.flags();
            if (flags & (DESTROYED | ERRORED)) != 0 {
                continue;
            }

            // Never downgrade DIRTY to MAYBE_DIRTY.
            let not_dirty = (flags & DIRTY) == 0;
            if not_dirty {
                set_reaction_status(&*reaction, current_status);
            }

            if (flags & MEMO) != 0 {
                if let Some(memo_source) = reaction.as_memo_source() {
                    stack.push((memo_source, MAYBE_DIRTY));
                }
            } else if not_dirty && (flags & EFFECT) != 0 {
                effects_to_schedule.push(reaction);
            }
        }
    }

    for effect in effects_to_schedule {
        schedule(effect);
    }
}

/// Set the CLEAN/DIRTY/MAYBE_DIRTY status on a reaction.
pub fn set_reaction_status(target: &dyn AnyReaction, status: u32) {
    target.set_flags((target.flags() & STATUS_MASK) | status);
}

/// Set the CLEAN/DIRTY/MAYBE_DIRTY status on a source.
pub fn set_source_status(target: &dyn AnySource, status: u32) {
    target.set_flags((target.flags() & STATUS_MASK) | status);
}

/// Decide whether a reaction must re-run.
///
/// DIRTY always re-runs. MAYBE_DIRTY resolves by freshening memo deps and
/// comparing each dep's write version against the reaction's last run: if no
/// dep actually changed value, the reaction is marked clean and skipped. This
/// is what stops propagation through memos whose recomputed value is equal to
/// the old one.
pub fn needs_update(reaction: &Rc<dyn AnyReaction>) -> bool {
    let flags = reaction.flags();

    if (flags & DIRTY) != 0 {
        return true;
    }
    if (flags & MAYBE_DIRTY) == 0 {
        return false;
    }

    let deps: Vec<Rc<dyn AnySource>> = {
        let mut collected = Vec::new();
        reaction.for_each_dep(&mut |dep| {
            collected.push(dep.clone());
            true
        });
        collected
    };

    let last_run = reaction.last_run_version();
    for dep in deps {
        if dep.is_memo() && !dep.is_clean() {
            // Recompute the memo (depth bounded by the memo chain). Its
            // write version bumps only if the value actually changed.
            if let Some(memo_reaction) = dep.as_memo_reaction() {
                if needs_update(&memo_reaction) {
                    memo_reaction.update();
                } else {
                    set_source_status(&*dep, CLEAN);
                }
            }
        }
        if dep.write_version() > last_run {
            reaction.mark_dirty();
            return true;
        }
    }

    reaction.mark_clean();
    false
}

/// Detach `reaction` from every dependency it subscribed to.
///
/// Used on disposal and before installing the dependency set of a new run.
pub fn remove_reactions(reaction: Rc<dyn AnyReaction>) {
    let stale: Vec<Rc<dyn AnySource>> = {
        let mut collected = Vec::new();
        reaction.for_each_dep(&mut |dep| {
            collected.push(dep.clone());
            true
        });
        collected
    };

    for dep in stale {
        dep.remove_reaction(&reaction);
    }

    reaction.clear_deps();
}

/// Wire up the dependencies collected during a reaction's run.
///
/// Takes the deps collected in the ambient context, restores `prev_deps` as
/// the ambient collection (an outer run may be mid-flight), detaches the
/// reaction's previous dependency list, and subscribes the new one. Both
/// `update_effect` and memo recompute end their runs here.
pub fn install_dependencies(reaction: Rc<dyn AnyReaction>, prev_deps: Vec<Rc<dyn AnySource>>) {
    let new_deps = with_context(|ctx| ctx.swap_new_deps(prev_deps));

    remove_reactions(reaction.clone());

    for dep in &new_deps {
        reaction.add_dep(dep.clone());
        dep.add_reaction(Rc::downgrade(&reaction));
    }
}
