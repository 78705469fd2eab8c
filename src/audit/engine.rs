//! Audit engine: loads a case's persisted state once, runs all ten checks,
//! and persists the report regardless of outcome.

use std::collections::HashMap;

use rusqlite::Connection;
use uuid::Uuid;

use super::checks::run_all_checks;
use super::types::{derive_overall_status, VerificationReport};
use crate::db::{self, DatabaseError};
use crate::models::{Case, EntityKind, ExtractedEntity};

/// Everything the checks need, loaded in one pass. Checks never touch the
/// store directly, which keeps them pure and the audit read-only.
pub struct CaseSnapshot {
    pub case: Case,
    pub entities: Vec<ExtractedEntity>,
    pub counts: HashMap<EntityKind, u32>,
    pub model_ids: Vec<String>,
    pub unpublished: u32,
}

impl CaseSnapshot {
    pub fn load(conn: &Connection, case_id: &str) -> Result<Self, DatabaseError> {
        let case = db::get_case(conn, case_id)?;
        let entities = db::entities_for_case(conn, case_id)?;
        let model_ids = db::distinct_model_ids(conn, case_id)?;
        let unpublished = db::unpublished_count(conn, case_id)?;
        Ok(Self::from_parts(case, entities, model_ids, unpublished))
    }

    pub fn from_parts(
        case: Case,
        entities: Vec<ExtractedEntity>,
        model_ids: Vec<String>,
        unpublished: u32,
    ) -> Self {
        let mut counts = HashMap::new();
        for entity in &entities {
            *counts.entry(entity.kind).or_insert(0) += 1;
        }
        Self { case, entities, counts, model_ids, unpublished }
    }

    pub fn count(&self, kind: EntityKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn entities_of(&self, kind: EntityKind) -> impl Iterator<Item = &ExtractedEntity> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }
}

pub struct AuditEngine;

impl AuditEngine {
    /// Run the full ten-check audit over a case and persist the report.
    ///
    /// A failing audit is a normal outcome: this returns `Err` only for
    /// store-level problems, never for check failures.
    pub fn run(conn: &mut Connection, case_id: &str) -> Result<VerificationReport, DatabaseError> {
        let snapshot = CaseSnapshot::load(conn, case_id)?;
        let checks = run_all_checks(&snapshot);
        let status = derive_overall_status(&checks);

        let report = VerificationReport {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            run_at: chrono::Utc::now().naive_utc(),
            status,
            checks,
        };

        db::store_verification_report(conn, &report)?;

        tracing::info!(
            case_id,
            status = %report.status,
            passed = report.checks_passed(),
            failed = report.checks_failed(),
            warned = report.checks_warned(),
            "Audit complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{CheckStatus, OverallStatus};
    use crate::db::fixtures;
    use crate::db::open_memory_database;

    #[test]
    fn audit_runs_all_checks_despite_critical_failure() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case_with_text(&conn, "c1", 2024, 1, "", "");

        let report = AuditEngine::run(&mut conn, "c1").unwrap();

        // V0 fails (empty sections) but all ten checks still report.
        assert_eq!(report.checks.len(), 10);
        assert_eq!(report.status, OverallStatus::Fail);
        assert_eq!(report.checks[0].check_id, "V0");
        assert_eq!(report.checks[0].status, CheckStatus::Fail);
    }

    #[test]
    fn complete_published_case_passes() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        fixtures::insert_complete_case_state(&conn, "c1", "gpt-4");
        fixtures::publish_all(&conn, "c1");

        let report = AuditEngine::run(&mut conn, "c1").unwrap();
        assert_eq!(report.status, OverallStatus::Pass);
    }

    #[test]
    fn unpublished_entities_downgrade_to_issues_found() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        fixtures::insert_complete_case_state(&conn, "c1", "gpt-4");
        // No publish: V9 warns, nothing critical fails.

        let report = AuditEngine::run(&mut conn, "c1").unwrap();
        assert_eq!(report.status, OverallStatus::IssuesFound);
        let v9 = report.checks.iter().find(|c| c.check_id == "V9").unwrap();
        assert_eq!(v9.status, CheckStatus::Fail);
    }

    #[test]
    fn missing_relation_kind_fails_v6() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        let session = fixtures::insert_complete_case_state(&conn, "c1", "gpt-4");
        let _ = session;
        conn.execute(
            "DELETE FROM extracted_entities WHERE case_id = 'c1' AND kind = 'relationship'",
            [],
        )
        .unwrap();
        fixtures::publish_all(&conn, "c1");

        let report = AuditEngine::run(&mut conn, "c1").unwrap();
        assert_eq!(report.status, OverallStatus::Fail);
        let v6 = report.checks.iter().find(|c| c.check_id == "V6").unwrap();
        assert_eq!(v6.status, CheckStatus::Fail);
        assert_eq!(v6.details["missing_kinds"][0], "relationship");
    }

    #[test]
    fn reports_are_persisted_and_accumulate() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);

        AuditEngine::run(&mut conn, "c1").unwrap();
        AuditEngine::run(&mut conn, "c1").unwrap();

        assert_eq!(db::verification_report_count(&conn, "c1").unwrap(), 2);
    }

    #[test]
    fn stored_checks_preserve_order() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);

        let report = AuditEngine::run(&mut conn, "c1").unwrap();
        let stored = db::check_results_for_report(&conn, &report.id).unwrap();
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[0].0, "V0");
        assert_eq!(stored[9].0, "V9");
    }

    #[test]
    fn audit_does_not_mutate_extracted_state() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        fixtures::insert_complete_case_state(&conn, "c1", "gpt-4");
        let before = db::total_entity_count(&conn, "c1").unwrap();

        AuditEngine::run(&mut conn, "c1").unwrap();

        assert_eq!(db::total_entity_count(&conn, "c1").unwrap(), before);
        assert_eq!(db::unpublished_count(&conn, "c1").unwrap(), before);
    }
}
