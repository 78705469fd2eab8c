//! Per-case pipeline: the fixed, strictly ordered stage sequence.
//!
//! Two commits are required because the synthesis stage's outputs do not
//! exist at the time of the first commit. The audit always runs last and
//! its report is persisted whether it passes or not.

use std::time::Instant;

use rusqlite::Connection;

use super::error::{FailureCause, PipelineFailure};
use crate::audit::{AuditEngine, VerificationReport};
use crate::db;
use crate::models::{Case, InjectionMode, ReconcileMode, Section};
use crate::stage::{StageInvoker, StageKind, StageOutcome};

/// Step label of the post-synthesis commit; kept distinct from the first
/// commit so run records identify which one failed.
const SECOND_COMMIT: &str = "commit2";

/// A single named step for the CLI's one-step mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleStep {
    Concepts,
    Normative,
    Relations,
    Reconcile,
    Commit,
    Uncommit,
    Synthesis,
    Audit,
}

/// Result of a successful full run over one case.
#[derive(Debug)]
pub struct CaseRunReport {
    pub case_id: String,
    pub run_id: String,
    pub duration_ms: u64,
    /// Wall-clock per step, in execution order.
    pub step_timings: Vec<(String, u64)>,
    pub audit: VerificationReport,
}

/// Drives the fixed stage sequence for one case.
pub struct CasePipeline<'a> {
    client: &'a dyn StageInvoker,
    injection: InjectionMode,
}

impl<'a> CasePipeline<'a> {
    pub fn new(client: &'a dyn StageInvoker, injection: InjectionMode) -> Self {
        Self { client, injection }
    }

    /// Run the full sequence: uncommit, clear, two extraction passes over
    /// both sections, relations, reconcile, commit, synthesis, commit
    /// again, audit.
    pub fn run_case(
        &self,
        conn: &mut Connection,
        case: &Case,
        batch_id: Option<&str>,
    ) -> Result<CaseRunReport, PipelineFailure> {
        let run_id = db::record_run_start(conn, &case.id, batch_id).map_err(|e| PipelineFailure {
            case_id: case.id.clone(),
            step: "bookkeeping".to_string(),
            partial_commit: false,
            source: e.into(),
        })?;

        let start = Instant::now();
        let mut timings: Vec<(String, u64)> = Vec::new();
        let mut committed = false;

        let result = self.execute_sequence(conn, case, &mut timings, &mut committed);
        let duration_ms = start.elapsed().as_millis() as u64;
        let timings_json = timings_to_json(&timings);

        match result {
            Ok(audit) => {
                finish_run(conn, &run_id, "succeeded", None, duration_ms, &timings_json);
                Ok(CaseRunReport {
                    case_id: case.id.clone(),
                    run_id,
                    duration_ms,
                    step_timings: timings,
                    audit,
                })
            }
            Err((step, cause)) => {
                // A failure after the first commit leaves the case partially
                // published with stale pre-synthesis data only.
                let partial_commit = committed && (step == "synthesis" || step == SECOND_COMMIT);
                let status = if partial_commit { "partial_commit" } else { "failed" };
                finish_run(conn, &run_id, status, Some(&step), duration_ms, &timings_json);
                Err(PipelineFailure {
                    case_id: case.id.clone(),
                    step,
                    partial_commit,
                    source: cause,
                })
            }
        }
    }

    fn execute_sequence(
        &self,
        conn: &mut Connection,
        case: &Case,
        timings: &mut Vec<(String, u64)>,
        committed: &mut bool,
    ) -> Result<VerificationReport, (String, FailureCause)> {
        // 1. Uncommit: tolerates "nothing committed" as success.
        self.stage_step(case, StageKind::Uncommit, "uncommit", timings)?;

        // 2. Clear prior extracted state and prompts. Fatal on failure:
        //    extraction over stale state would corrupt session grouping.
        let clear_start = Instant::now();
        let clear_result = db::clear_case_state(conn, &case.id);
        timings.push(("clear".to_string(), clear_start.elapsed().as_millis() as u64));
        clear_result.map_err(|e| ("clear".to_string(), FailureCause::from(e)))?;

        // 3–4. Both extraction passes over both sections.
        for section in Section::all() {
            let stage = StageKind::ConceptsPass { section: *section };
            self.stage_step(case, stage, &stage.to_string(), timings)?;
        }
        for section in Section::all() {
            let stage = StageKind::NormativePass { section: *section };
            self.stage_step(case, stage, &stage.to_string(), timings)?;
        }

        // 5. Relation discovery.
        self.stage_step(case, StageKind::RelationsPass, "relations", timings)?;

        // 6. Reconciliation, exact-match only: never invokes a model.
        self.stage_step(
            case,
            StageKind::Reconcile { mode: ReconcileMode::ExactMatch },
            "reconcile",
            timings,
        )?;

        // 7. First commit.
        self.stage_step(case, StageKind::Commit, "commit", timings)?;
        *committed = true;

        // 8. Synthesis over the earlier passes' outputs.
        self.stage_step(case, StageKind::Synthesis, "synthesis", timings)?;

        // 9. Second commit for the synthesis outputs.
        self.stage_step(case, StageKind::Commit, SECOND_COMMIT, timings)?;

        // 10. Audit; the report is persisted regardless of its outcome.
        let qc_start = Instant::now();
        let audit = AuditEngine::run(conn, &case.id);
        timings.push(("qc".to_string(), qc_start.elapsed().as_millis() as u64));
        audit.map_err(|e| ("qc".to_string(), FailureCause::from(e)))
    }

    fn stage_step(
        &self,
        case: &Case,
        stage: StageKind,
        label: &str,
        timings: &mut Vec<(String, u64)>,
    ) -> Result<StageOutcome, (String, FailureCause)> {
        let step_start = Instant::now();
        let result = self.client.execute(&case.id, stage, self.injection);
        timings.push((label.to_string(), step_start.elapsed().as_millis() as u64));

        match result {
            Ok(outcome) => {
                if outcome.is_noop() {
                    tracing::info!(case_id = %case.id, step = label, "Step was a no-op");
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(case_id = %case.id, step = label, error = %e, "Step failed");
                Err((label.to_string(), e.into()))
            }
        }
    }

    /// Run exactly one named step, optionally limited to one section.
    ///
    /// Returns the audit report when the step is `Audit`, `None` otherwise.
    pub fn run_single_step(
        &self,
        conn: &mut Connection,
        case: &Case,
        step: SingleStep,
        section: Option<Section>,
    ) -> Result<Option<VerificationReport>, PipelineFailure> {
        let mut timings = Vec::new();
        let fail = |(step, cause): (String, FailureCause)| PipelineFailure {
            case_id: case.id.clone(),
            step,
            partial_commit: false,
            source: cause,
        };

        let sections: Vec<Section> = match section {
            Some(s) => vec![s],
            None => Section::all().to_vec(),
        };

        match step {
            SingleStep::Concepts => {
                for section in sections {
                    let stage = StageKind::ConceptsPass { section };
                    self.stage_step(case, stage, &stage.to_string(), &mut timings)
                        .map_err(fail)?;
                }
            }
            SingleStep::Normative => {
                for section in sections {
                    let stage = StageKind::NormativePass { section };
                    self.stage_step(case, stage, &stage.to_string(), &mut timings)
                        .map_err(fail)?;
                }
            }
            SingleStep::Relations => {
                self.stage_step(case, StageKind::RelationsPass, "relations", &mut timings)
                    .map_err(fail)?;
            }
            SingleStep::Reconcile => {
                let stage = StageKind::Reconcile { mode: ReconcileMode::ExactMatch };
                self.stage_step(case, stage, "reconcile", &mut timings)
                    .map_err(fail)?;
            }
            SingleStep::Commit => {
                self.stage_step(case, StageKind::Commit, "commit", &mut timings)
                    .map_err(fail)?;
            }
            SingleStep::Uncommit => {
                self.stage_step(case, StageKind::Uncommit, "uncommit", &mut timings)
                    .map_err(fail)?;
            }
            SingleStep::Synthesis => {
                self.stage_step(case, StageKind::Synthesis, "synthesis", &mut timings)
                    .map_err(fail)?;
            }
            SingleStep::Audit => {
                let report = AuditEngine::run(conn, &case.id).map_err(|e| PipelineFailure {
                    case_id: case.id.clone(),
                    step: "qc".to_string(),
                    partial_commit: false,
                    source: e.into(),
                })?;
                return Ok(Some(report));
            }
        }

        Ok(None)
    }
}

fn timings_to_json(timings: &[(String, u64)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = timings
        .iter()
        .map(|(step, ms)| (step.clone(), serde_json::Value::from(*ms)))
        .collect();
    serde_json::Value::Object(map)
}

/// Bookkeeping writes at the end of a run must not mask the run's own
/// outcome; a failure here is logged and swallowed.
fn finish_run(
    conn: &Connection,
    run_id: &str,
    status: &str,
    failed_step: Option<&str>,
    duration_ms: u64,
    timings: &serde_json::Value,
) {
    if let Err(e) = db::record_run_finish(conn, run_id, status, failed_step, duration_ms, timings) {
        tracing::warn!(run_id, error = %e, "Failed to finish run record");
    }
}
