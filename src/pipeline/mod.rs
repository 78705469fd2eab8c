//! Pipeline orchestration: the fixed per-case stage sequence, the batch
//! controller that runs it over every case, and the cleanup manager that
//! returns the shared accumulation store to a known-empty baseline.
//!
//! Everything here is sequential by construction. The accumulation store
//! is append-only but not transactionally isolated, so commits are never
//! parallelized across cases; strict ordering is the correctness model.

pub mod batch;
pub mod case_runner;
pub mod cleanup;
pub mod error;

pub use batch::{BatchController, BatchError, BatchSummary};
pub use case_runner::{CasePipeline, CaseRunReport, SingleStep};
pub use cleanup::{CleanupError, CleanupManager, CleanupReport};
pub use error::{FailureCause, PipelineFailure};
