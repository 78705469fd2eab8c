//! Batch controller: runs the per-case pipeline over the whole corpus in
//! a deterministic order with per-case failure isolation.
//!
//! Ordering is year descending, then case number ascending, which makes
//! resumption by case id meaningful across invocations.

use std::time::Instant;

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use super::case_runner::CasePipeline;
use super::cleanup::{CleanupError, CleanupManager};
use crate::audit::OverallStatus;
use crate::db::{self, DatabaseError};
use crate::ontology::AccumulationStore;

#[derive(Error, Debug)]
pub enum BatchError {
    /// The resumption id matched no known case. Raised before any case
    /// runs, so a typo never triggers a partial batch.
    #[error("Cannot resume: no case with id '{case_id}'")]
    UnknownStartCase { case_id: String },

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Aggregate outcome of one batch invocation.
///
/// Case failures are data here, not errors: the controller always runs to
/// the end of the corpus and reports what happened.
#[derive(Debug)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub succeeded: u32,
    pub failed: u32,
    /// Wall-clock per processed case, in processing order.
    pub case_timings: Vec<(String, u64)>,
    /// Failed cases as (case id, failed step).
    pub failed_cases: Vec<(String, String)>,
    /// Cases left partially published; these need manual repair before
    /// their data can be trusted.
    pub partial_commit_cases: Vec<String>,
    /// Cases whose audit came back anything other than PASS.
    pub non_pass_cases: Vec<(String, OverallStatus)>,
    /// Cases whose run grew the shared definition file by zero classes.
    /// Usually means the commit stage silently dropped everything.
    pub accumulation_warnings: Vec<String>,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.non_pass_cases.is_empty() && self.accumulation_warnings.is_empty()
    }
}

pub struct BatchController<'a> {
    pipeline: &'a CasePipeline<'a>,
    store: &'a AccumulationStore,
}

impl<'a> BatchController<'a> {
    pub fn new(pipeline: &'a CasePipeline<'a>, store: &'a AccumulationStore) -> Self {
        Self { pipeline, store }
    }

    /// Run the pipeline over every case in order.
    ///
    /// With `cleanup` set, the environment is wiped first; resumption via
    /// `start_from` skips every case before the named one. The two are
    /// not combined by callers in practice, since cleanup destroys the
    /// state resumption relies on.
    pub fn run_batch(
        &self,
        conn: &mut Connection,
        cleanup: Option<&CleanupManager<'_>>,
        start_from: Option<&str>,
    ) -> Result<BatchSummary, BatchError> {
        let mut listings = db::list_cases_ordered(conn)?;

        if let Some(start_id) = start_from {
            let position = listings.iter().position(|l| l.id == start_id).ok_or_else(|| {
                BatchError::UnknownStartCase { case_id: start_id.to_string() }
            })?;
            listings.drain(..position);
        }

        if let Some(manager) = cleanup {
            manager.run(conn)?;
        }

        let batch_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut summary = BatchSummary {
            batch_id: batch_id.clone(),
            total: listings.len(),
            succeeded: 0,
            failed: 0,
            case_timings: Vec::new(),
            failed_cases: Vec::new(),
            partial_commit_cases: Vec::new(),
            non_pass_cases: Vec::new(),
            accumulation_warnings: Vec::new(),
            duration_ms: 0,
        };

        tracing::info!(batch_id = %batch_id, total = summary.total, "Batch started");

        for (index, listing) in listings.iter().enumerate() {
            let case = db::get_case(conn, &listing.id)?;
            let before = self.definition_count();

            tracing::info!(
                batch_id = %batch_id,
                case_id = %case.id,
                position = index + 1,
                total = summary.total,
                "Processing case"
            );

            let case_start = Instant::now();
            let result = self.pipeline.run_case(conn, &case, Some(batch_id.as_str()));
            summary
                .case_timings
                .push((case.id.clone(), case_start.elapsed().as_millis() as u64));

            match result {
                Ok(report) => {
                    summary.succeeded += 1;
                    if report.audit.status != OverallStatus::Pass {
                        summary.non_pass_cases.push((case.id.clone(), report.audit.status));
                    }
                    if let (Some(before), Some(after)) = (before, self.definition_count()) {
                        if after <= before {
                            tracing::warn!(
                                case_id = %case.id,
                                "Case added no definitions to the accumulation store"
                            );
                            summary.accumulation_warnings.push(case.id.clone());
                        }
                    }
                }
                Err(failure) => {
                    // Isolation boundary: log, record, move on.
                    tracing::error!(batch_id = %batch_id, error = %failure, "Case failed");
                    summary.failed += 1;
                    summary.failed_cases.push((failure.case_id.clone(), failure.step.clone()));
                    if failure.partial_commit {
                        summary.partial_commit_cases.push(failure.case_id);
                    }
                }
            }
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            batch_id = %batch_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_ms = summary.duration_ms,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Best-effort read; counting problems must not fail the batch.
    fn definition_count(&self) -> Option<u32> {
        match self.store.definition_count() {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot count accumulated definitions");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::db::fixtures;
    use crate::db::open_memory_database;
    use crate::models::InjectionMode;
    use crate::ontology::{MockRegistry, RegistryCache, SystemClock};
    use crate::stage::{
        MockStageClient, StageError, StageInvoker, StageKind, StageOutcome, StageSummary,
    };

    /// Stage double whose commits actually grow the definition file, for
    /// exercising the accumulation growth check.
    struct GrowingClient {
        definition_file: PathBuf,
    }

    impl StageInvoker for GrowingClient {
        fn execute(
            &self,
            case_id: &str,
            stage: StageKind,
            _injection: InjectionMode,
        ) -> Result<StageOutcome, StageError> {
            if matches!(stage, StageKind::Commit) {
                // Definitions are keyed by name: the second commit of a case
                // publishes only new classes, and here there are none.
                let line = format!("eth:Class_{case_id} a owl:Class .\n");
                let mut text = std::fs::read_to_string(&self.definition_file).unwrap_or_default();
                if !text.contains(&line) {
                    text.push_str(&line);
                    std::fs::write(&self.definition_file, text).unwrap();
                }
            }
            Ok(StageOutcome::Completed(StageSummary::default()))
        }
    }

    fn three_cases(conn: &Connection) {
        // Listing order is c2 (2024/1), c3 (2024/2), c1 (2023/5).
        fixtures::insert_case(conn, "c1", 2023, 5);
        fixtures::insert_case(conn, "c2", 2024, 1);
        fixtures::insert_case(conn, "c3", 2024, 2);
    }

    fn store() -> (tempfile::TempDir, AccumulationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccumulationStore::new(dir.path());
        store.write_skeleton().unwrap();
        (dir, store)
    }

    #[test]
    fn batch_runs_cases_in_corpus_order() {
        let mut conn = open_memory_database().unwrap();
        three_cases(&conn);
        let (_dir, store) = store();
        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);

        let timed_order: Vec<&str> = summary
            .case_timings
            .iter()
            .map(|(case_id, _)| case_id.as_str())
            .collect();
        assert_eq!(timed_order, vec!["c2", "c3", "c1"]);

        let case_order: Vec<String> = mock
            .calls()
            .into_iter()
            .map(|(case_id, _)| case_id)
            .collect();
        let first = case_order.iter().position(|c| c == "c2").unwrap();
        let second = case_order.iter().position(|c| c == "c3").unwrap();
        let third = case_order.iter().position(|c| c == "c1").unwrap();
        assert!(first < second && second < third);
    }

    #[test]
    fn failure_is_isolated_to_one_case() {
        let mut conn = open_memory_database().unwrap();
        three_cases(&conn);
        let (_dir, store) = store();
        // First case (c2): uncommit succeeds, concepts:facts fails.
        let mock = MockStageClient::new()
            .push_completed()
            .push(Err(StageError::Connection("http://localhost:8501".into())));
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.failed_cases,
            vec![("c2".to_string(), "concepts:facts".to_string())]
        );
        assert!(summary.partial_commit_cases.is_empty());
        assert!(!summary.is_clean());
    }

    #[test]
    fn partial_commit_cases_are_surfaced() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        let (_dir, store) = store();
        let mut mock = MockStageClient::new();
        for _ in 0..8 {
            mock = mock.push_completed();
        }
        let mock = mock.push(Err(StageError::Timeout("synthesis".into())));
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();
        assert_eq!(summary.partial_commit_cases, vec!["c1".to_string()]);
    }

    #[test]
    fn start_from_skips_preceding_cases() {
        let mut conn = open_memory_database().unwrap();
        three_cases(&conn);
        let (_dir, store) = store();
        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, Some("c3")).unwrap();

        assert_eq!(summary.total, 2);
        assert!(mock.calls().iter().all(|(case_id, _)| case_id != "c2"));
    }

    #[test]
    fn split_batch_with_resumption_matches_uninterrupted_batch() {
        // One uninterrupted run over the corpus.
        let mut full_conn = open_memory_database().unwrap();
        three_cases(&full_conn);
        let (_full_dir, full_store) = store();
        let full_mock = MockStageClient::new();
        let full_pipeline = CasePipeline::new(&full_mock, InjectionMode::Full);
        BatchController::new(&full_pipeline, &full_store)
            .run_batch(&mut full_conn, None, None)
            .unwrap();

        // The same corpus in two pieces: the first case alone, then a
        // resumed batch from the second case onward.
        let mut split_conn = open_memory_database().unwrap();
        three_cases(&split_conn);
        let (_split_dir, split_store) = store();
        let split_mock = MockStageClient::new();
        let split_pipeline = CasePipeline::new(&split_mock, InjectionMode::Full);
        let first = db::get_case(&split_conn, "c2").unwrap();
        split_pipeline.run_case(&mut split_conn, &first, None).unwrap();
        BatchController::new(&split_pipeline, &split_store)
            .run_batch(&mut split_conn, None, Some("c3"))
            .unwrap();

        for case_id in ["c2", "c3", "c1"] {
            assert_eq!(
                db::latest_verification_status(&split_conn, case_id).unwrap(),
                db::latest_verification_status(&full_conn, case_id).unwrap(),
            );
            // Each case was audited exactly once in both schedules.
            assert_eq!(db::verification_report_count(&split_conn, case_id).unwrap(), 1);
            assert_eq!(db::verification_report_count(&full_conn, case_id).unwrap(), 1);
        }
    }

    #[test]
    fn unknown_start_case_fails_before_any_run() {
        let mut conn = open_memory_database().unwrap();
        three_cases(&conn);
        let (_dir, store) = store();
        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let err = controller
            .run_batch(&mut conn, None, Some("nope"))
            .unwrap_err();
        assert!(matches!(err, BatchError::UnknownStartCase { .. }));
        assert!(mock.calls().is_empty());
        assert_eq!(db::run_record_count(&conn).unwrap(), 0);
    }

    #[test]
    fn zero_growth_commits_raise_accumulation_warnings() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        let (_dir, store) = store();
        // The plain mock never touches the definition file.
        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();
        assert_eq!(summary.accumulation_warnings, vec!["c1".to_string()]);
    }

    #[test]
    fn growing_commits_raise_no_warnings() {
        let mut conn = open_memory_database().unwrap();
        three_cases(&conn);
        let (_dir, store) = store();
        let client = GrowingClient { definition_file: store.definition_file() };
        let pipeline = CasePipeline::new(&client, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();
        assert!(summary.accumulation_warnings.is_empty());
        assert_eq!(store.definition_count().unwrap(), 3);
    }

    #[test]
    fn audit_outcomes_are_collected() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        let (_dir, store) = store();
        // No entities get extracted, so the audit must fail.
        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller.run_batch(&mut conn, None, None).unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            summary.non_pass_cases,
            vec![("c1".to_string(), OverallStatus::Fail)]
        );
    }

    #[test]
    fn cleanup_runs_before_first_case() {
        let mut conn = open_memory_database().unwrap();
        fixtures::insert_case(&conn, "c1", 2024, 1);
        let session = fixtures::insert_session(&conn, "c1", "concepts");
        fixtures::insert_entity(
            &conn,
            "c1",
            &session,
            crate::models::EntityKind::Role,
            "Engineer",
            "m",
        );
        fixtures::publish_all(&conn, "c1");
        db::record_run_start(&conn, "c1", None).unwrap();

        let (_dir, store) = store();
        let registry = MockRegistry::new(vec!["case-c1".into()]);
        let cache = RegistryCache::new(Duration::from_secs(300), Box::new(SystemClock));
        let manager = CleanupManager::new(&store, &registry, &cache);

        let mock = MockStageClient::new();
        let pipeline = CasePipeline::new(&mock, InjectionMode::Full);
        let controller = BatchController::new(&pipeline, &store);

        let summary = controller
            .run_batch(&mut conn, Some(&manager), None)
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(registry.namespaces.borrow().is_empty());
        // Old bookkeeping was wiped; only this batch's run remains.
        assert_eq!(db::run_record_count(&conn).unwrap(), 1);
    }
}
