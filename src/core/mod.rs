//! Reactive graph internals.
//!
//! Nothing here is part of the public API; the `primitives` module wraps
//! these building blocks in `Signal`, `Memo`, `Effect` and `EffectScope`.

pub mod constants;
pub mod context;
pub mod types;

pub use constants::*;
pub use context::{is_tracking, with_context, write_version, ReactiveContext};
pub use types::{default_equals, AnyReaction, AnySource, CellInner, EqualsFn};
