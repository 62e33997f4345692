//! Batching and untracked reads.

use crate::core::context::with_context;
use crate::reactivity::scheduling::flush_sync;

/// Group writes so dependent effects run once, after the block.
///
/// Nested batches collapse into the outermost one; the flush happens when
/// the outermost batch exits, even if the block panics.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    with_context(|ctx| ctx.enter_batch());

    struct BatchGuard;

    impl Drop for BatchGuard {
        fn drop(&mut self) {
            let depth = with_context(|ctx| ctx.exit_batch());
            if depth == 0 {
                flush_sync();
            }
        }
    }

    let _guard = BatchGuard;
    f()
}

/// True while inside a `batch` block.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

/// Read signals without subscribing the active computation to them.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let prev = with_context(|ctx| ctx.set_untracking(true));

    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let _guard = UntrackGuard { prev };
    f()
}

/// True while inside an `untrack` block.
pub fn is_untracking() -> bool {
    with_context(|ctx| ctx.is_untracking())
}

/// Run all pending effects now.
pub fn tick() {
    flush_sync();
}
