//! Reconciliation pipeline: reactive mounting, keyed list diffing, and
//! static patching.

pub mod keyed;
pub mod mount;
pub mod patch;

pub use keyed::{diff_keys, KeyedDiff};
pub use mount::{mount, mount_before, MountHandle};
pub use patch::patch;
