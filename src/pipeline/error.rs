//! Typed pipeline errors.
//!
//! A stage failure aborts only the current case; the batch controller
//! catches `PipelineFailure` at the case boundary and continues.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::stage::StageError;

/// What went wrong inside a step.
#[derive(Error, Debug)]
pub enum FailureCause {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A per-case pipeline failure, carrying the step name and case identifier.
#[derive(Error, Debug)]
#[error("Case {case_id} failed at step '{step}': {source}")]
pub struct PipelineFailure {
    pub case_id: String,
    pub step: String,
    /// True when the first commit already published entities, leaving the
    /// case partially published with stale pre-synthesis data. Requires
    /// manual intervention; surfaced in the batch summary.
    pub partial_commit: bool,
    #[source]
    pub source: FailureCause,
}
