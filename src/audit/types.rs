//! Result types for the post-condition audit.
//!
//! A `VerificationReport` is data, never an error: a failing audit is a
//! normal, expected outcome and is persisted like any other.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// How much a failing check matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "warning" => Some(Self::Warning),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    Info,
    NotApplicable,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Info => "info",
            Self::NotApplicable => "not_applicable",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "info" => Some(Self::Info),
            "not_applicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }
}

/// Overall status of one audit run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    IssuesFound,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::IssuesFound => "ISSUES_FOUND",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(Self::Pass),
            "FAIL" => Some(Self::Fail),
            "ISSUES_FOUND" => Some(Self::IssuesFound),
            _ => None,
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one of the ten checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Stable identifier, "V0".."V9".
    pub check_id: &'static str,
    pub name: &'static str,
    pub severity: Severity,
    pub status: CheckStatus,
    /// Check-specific evidence (violating labels, counts, ranges).
    pub details: serde_json::Value,
}

impl CheckResult {
    pub fn is_failure(&self) -> bool {
        self.status == CheckStatus::Fail
    }
}

/// One full audit run over a case: ten ordered check results plus the
/// derived overall status. Immutable once stored.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub id: String,
    pub case_id: String,
    pub run_at: NaiveDateTime,
    pub status: OverallStatus,
    pub checks: Vec<CheckResult>,
}

impl VerificationReport {
    pub fn checks_passed(&self) -> u32 {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Pass | CheckStatus::NotApplicable))
            .count() as u32
    }

    pub fn checks_failed(&self) -> u32 {
        self.checks
            .iter()
            .filter(|c| c.is_failure() && c.severity == Severity::Critical)
            .count() as u32
    }

    pub fn checks_warned(&self) -> u32 {
        self.checks
            .iter()
            .filter(|c| c.is_failure() && c.severity != Severity::Critical)
            .count() as u32
    }
}

/// Derive the overall status from individual check results.
///
/// Any CRITICAL failure dominates; otherwise any WARNING failure downgrades
/// to ISSUES_FOUND; INFO-level findings never affect the overall status.
pub fn derive_overall_status(checks: &[CheckResult]) -> OverallStatus {
    let any_critical = checks
        .iter()
        .any(|c| c.is_failure() && c.severity == Severity::Critical);
    if any_critical {
        return OverallStatus::Fail;
    }
    let any_warning = checks
        .iter()
        .any(|c| c.is_failure() && c.severity == Severity::Warning);
    if any_warning {
        OverallStatus::IssuesFound
    } else {
        OverallStatus::Pass
    }
}
