//! # skerry
//!
//! Fine-grained reactive UI rendering with island hydration.
//!
//! skerry renders a virtual node tree two ways from one description: to an
//! HTML string on the server, and into a live document on the client,
//! where every dynamic point is driven by its own reactive computation.
//! Interactivity ships as islands: bounded regions of server markup that
//! carry enough metadata to load their module, recover their state, and
//! wire themselves up when a trigger fires.
//!
//! ## Architecture
//!
//! The reactive core is a dependency-tracking signal graph:
//! ```text
//! Signal / Memo (sources) → Effect (reactions) → document mutations
//! ```
//! Reads inside a running computation are recorded as dependencies; writes
//! mark the affected subgraph and schedule effects, which a batching
//! scheduler flushes with per-computation run caps. Nothing diffs a whole
//! tree: mounting wires one effect per dynamic attribute, dynamic text, or
//! structural node (`Show`, `For`, `Async`), and updates flow only to the
//! computations that read the written signal.
//!
//! ## Modules
//!
//! - [`core`] - Graph plumbing: flags, thread-local context, erased traits
//! - [`reactivity`] - Tracking, scheduling, batching, equality
//! - [`primitives`] - `Signal`, `Memo`, `Effect`, `EffectScope`
//! - [`node`] - The virtual tree and its builders
//! - [`dom`] - In-memory document arena, parsing, serialization
//! - [`render`] - Escaping contracts and the string renderer
//! - [`pipeline`] - Reactive mounting, keyed diffing, static patching
//! - [`hydrate`] - Island protocol, module loading, triggers, hydrator

pub mod core;
pub mod dom;
pub mod error;
pub mod hydrate;
pub mod node;
pub mod pipeline;
pub mod primitives;
pub mod reactivity;
pub mod render;

pub use dom::{Document, Event, NodeId};
pub use error::{Error, Result};
pub use hydrate::{
    Hydrator, ImmediateHost, IslandStatus, ManualHost, Module, ModuleLoader, ModuleRegistry,
    StateFetcher, TriggerHost,
};
pub use node::island::{IslandState, Trigger};
pub use node::{
    attr, dyn_attr, dyn_text, el, for_each, fragment, island, on, show, show_else, suspense, text,
    AsyncState, Attr, VNode,
};
pub use pipeline::{mount, mount_before, patch, MountHandle};
pub use primitives::{
    effect, effect_scope, effect_with_cleanup, memo, memo_with_equals, on_scope_dispose, signal,
    signal_with_equals, Effect, EffectScope, Memo, Signal,
};
pub use reactivity::{batch, tick, untrack};
pub use render::render_to_string;
