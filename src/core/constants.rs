//! Flag constants for reactive graph nodes.
//!
//! Every signal, memo and effect carries a `u32` bitmask combining a type
//! flag with a status flag. Status transitions always go through
//! `STATUS_MASK` so type bits survive.

// =============================================================================
// NODE TYPE FLAGS
// =============================================================================

/// Plain reactive cell (a signal's storage).
pub const SOURCE: u32 = 1 << 0;

/// Cached derived value. A memo is both a source and a reaction.
pub const MEMO: u32 = 1 << 1;

/// Side-effecting computation.
pub const EFFECT: u32 = 1 << 2;

/// Effect created as a mount/scope root.
pub const ROOT_EFFECT: u32 = 1 << 3;

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Up to date.
pub const CLEAN: u32 = 1 << 10;

/// Definitely needs recomputation.
pub const DIRTY: u32 = 1 << 11;

/// A transitive dependency changed; check write versions before recomputing.
pub const MAYBE_DIRTY: u32 = 1 << 12;

/// Reaction is currently executing its function.
pub const REACTION_IS_UPDATING: u32 = 1 << 13;

/// Reaction has been disposed and must never run again.
pub const DESTROYED: u32 = 1 << 14;

/// Reaction is paused (scope paused); writes accumulate but nothing runs.
pub const INERT: u32 = 1 << 15;

/// Reaction was stopped by the runtime: it exceeded the re-run cap within a
/// single flush, or its body panicked. Kept distinct from DESTROYED so tests
/// and callers can tell "disposed" from "failed".
pub const ERRORED: u32 = 1 << 16;

/// Mask clearing the CLEAN/DIRTY/MAYBE_DIRTY bits.
pub const STATUS_MASK: u32 = !(CLEAN | DIRTY | MAYBE_DIRTY);
