//! Island hydration: scanning server markup for island boundaries,
//! loading their modules, resolving their state, and running their
//! hydrate entries when triggers fire.

pub mod loader;
pub mod protocol;
pub mod registry;
pub mod triggers;

pub use loader::{HydrateFn, Module, ModuleLoader, ModuleRegistry};
pub use protocol::{parse_island, resolve_state, scan_islands, IslandRecord, StateFetcher, StateRef};
pub use registry::{Hydrator, IslandStatus};
pub use triggers::{ImmediateHost, ManualHost, TriggerHost};
