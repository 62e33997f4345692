//! Public reactive primitives.

pub mod effect;
pub mod memo;
pub mod scope;
pub mod signal;

pub use effect::{effect, effect_tracking, effect_with_cleanup, CleanupFn, Effect};
pub use memo::{memo, memo_with_equals, Memo};
pub use scope::{effect_scope, on_scope_dispose, EffectScope};
pub use signal::{signal, signal_with_equals, Signal};
