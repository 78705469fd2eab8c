//! Post-condition audit: ten independent checks over a case's persisted
//! extracted state, aggregated into a severity-classified report.
//!
//! Checks are pure with respect to the store (no mutation) and all ten
//! always run — an early critical failure never short-circuits the rest,
//! so one audit reports the full picture.

pub mod checks;
pub mod engine;
pub mod types;

pub use engine::{AuditEngine, CaseSnapshot};
pub use types::{
    derive_overall_status, CheckResult, CheckStatus, OverallStatus, Severity, VerificationReport,
};
