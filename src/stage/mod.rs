//! Stage invocation layer.
//!
//! A stage is one named unit of work in the fixed per-case sequence. The
//! closed `StageKind` enum replaces the original's string-keyed dispatch so
//! the compiler checks exhaustiveness, and `StageOutcome` models the
//! ok / no-op / failed trichotomy as data instead of exceptions.

pub mod client;
pub mod events;
pub mod kind;

pub use client::{MockStageClient, StageClient, StageError, StageInvoker};
pub use events::{StageEvent, StageOutcome, StageSummary};
pub use kind::StageKind;
