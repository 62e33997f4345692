//! Error taxonomy.

use thiserror::Error;

/// Runtime failures surfaced by the reactive scheduler and the hydration
/// client. Reactive and island failures are contained at their own boundary;
/// none of these abort the surrounding flush or scan.
#[derive(Debug, Error)]
pub enum Error {
    /// A computation kept re-dirtying itself and exceeded the re-run cap
    /// within a single flush. The computation is stopped and marked errored;
    /// the rest of the graph keeps working.
    #[error("reactive computation exceeded {reruns} re-runs in one flush; stopping it")]
    ReactiveLoop { reruns: u32 },

    /// An island's markup violated the hydration attribute contract.
    #[error("island `{id}`: invalid hydration markup: {reason}")]
    HydrationParse { id: String, reason: String },

    /// The module loader failed to produce the island's module.
    #[error("island `{id}`: failed to load module `{src}`: {reason}")]
    ModuleLoad {
        id: String,
        src: String,
        reason: String,
    },

    /// The loaded module has no hydrate entry point.
    #[error("island `{id}`: module `{src}` has no hydrate entry")]
    MissingHydrateExport { id: String, src: String },

    /// The hydrate entry panicked. The island is marked failed; other
    /// islands are unaffected.
    #[error("island `{id}`: hydrate entry panicked: {reason}")]
    HydrateFailed { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
