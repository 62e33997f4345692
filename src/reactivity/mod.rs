//! Tracking, scheduling and batching: the write-to-effect pipeline.

pub mod batching;
pub mod equality;
pub mod scheduling;
pub mod tracking;

pub use batching::{batch, is_batching, is_untracking, tick, untrack};
pub use scheduling::{flush, flush_sync, schedule};
pub use tracking::{
    install_dependencies, mark_reactions, needs_update, notify_write, remove_reactions,
    set_reaction_status, set_source_status, track_read,
};
