//! Command-line surface of the orchestrator.
//!
//! One binary, mode selected by flags: a positional case id runs one case
//! (optionally a single step of it), `--batch` runs the corpus, and
//! `--list` / `--status` / `--clean` are inspection and maintenance modes.

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::audit::OverallStatus;
use crate::config::PipelineConfig;
use crate::db::{self, DatabaseError};
use crate::models::{InjectionMode, Section};
use crate::ontology::{AccumulationStore, RegistryCache, RegistryClient, SystemClock};
use crate::pipeline::{
    BatchController, BatchError, CasePipeline, CleanupError, CleanupManager, PipelineFailure,
    SingleStep,
};
use crate::stage::StageClient;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SectionArg {
    Facts,
    Discussion,
}

impl From<SectionArg> for Section {
    fn from(arg: SectionArg) -> Self {
        match arg {
            SectionArg::Facts => Section::Facts,
            SectionArg::Discussion => Section::Discussion,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum InjectionModeArg {
    Full,
    /// Accepts the wire spelling too.
    #[value(alias = "label_only")]
    LabelOnly,
}

impl From<InjectionModeArg> for InjectionMode {
    fn from(arg: InjectionModeArg) -> Self {
        match arg {
            InjectionModeArg::Full => InjectionMode::Full,
            InjectionModeArg::LabelOnly => InjectionMode::LabelOnly,
        }
    }
}

/// The numbered steps mirror the pipeline's pass order; the named ones
/// are the steps people actually rerun by hand.
fn parse_step(s: &str) -> Result<SingleStep, String> {
    match s {
        "1" => Ok(SingleStep::Concepts),
        "2" => Ok(SingleStep::Normative),
        "3" => Ok(SingleStep::Relations),
        "reconcile" => Ok(SingleStep::Reconcile),
        "commit" => Ok(SingleStep::Commit),
        "uncommit" => Ok(SingleStep::Uncommit),
        "4" => Ok(SingleStep::Synthesis),
        "qc" => Ok(SingleStep::Audit),
        other => Err(format!(
            "unknown step '{other}' (expected 1, 2, 3, reconcile, commit, uncommit, 4 or qc)"
        )),
    }
}

#[derive(Parser, Debug)]
#[command(name = "ethicore", version, about = "Ethics-case extraction pipeline orchestrator")]
pub struct Cli {
    /// Case to run the full pipeline on (or a single step, with --step).
    pub case_id: Option<String>,

    /// Run only one step: 1, 2, 3, reconcile, commit, uncommit, 4 or qc.
    #[arg(long, value_parser = parse_step, value_name = "STEP")]
    pub step: Option<SingleStep>,

    /// Limit an extraction step to one section.
    #[arg(long, value_enum)]
    pub section: Option<SectionArg>,

    /// List all cases in batch order with their processing state.
    #[arg(long)]
    pub list: bool,

    /// Show extraction counts and the latest audit status for a case.
    #[arg(long, value_name = "CASE_ID")]
    pub status: Option<String>,

    /// Process every case in order.
    #[arg(long)]
    pub batch: bool,

    /// Skip the environment cleanup that normally precedes a batch.
    #[arg(long, requires = "batch")]
    pub skip_clean: bool,

    /// Resume a batch at the named case, skipping everything before it.
    /// Implies --skip-clean.
    #[arg(long, value_name = "CASE_ID", requires = "batch")]
    pub start_from: Option<String>,

    /// Wipe the accumulation store, registry namespaces, publish flags
    /// and run bookkeeping, then exit.
    #[arg(long)]
    pub clean: bool,

    /// Override the ontology context supplied to extraction stages.
    #[arg(long, value_enum, value_name = "MODE")]
    pub injection_mode: Option<InjectionModeArg>,
}

/// Dispatch one invocation. Returns the process exit code.
pub fn run(cli: Cli, mut config: PipelineConfig) -> Result<i32, CliError> {
    if let Some(mode) = cli.injection_mode {
        config.injection_mode = mode.into();
    }

    let mut conn = db::open_database(&config.db_path)?;

    if cli.list {
        return list_cases(&conn);
    }
    if let Some(case_id) = &cli.status {
        return show_status(&conn, case_id);
    }

    let store = AccumulationStore::new(&config.ontology_dir);
    let registry = RegistryClient::new(&config.registry_base_url, config.request_timeout);
    let cache = RegistryCache::new(config.registry_cache_ttl, Box::new(SystemClock));
    let cleanup = CleanupManager::new(&store, &registry, &cache);

    if cli.clean {
        let report = cleanup.run(&conn)?;
        println!(
            "Cleaned: {} case files, {} namespaces, {} entities unpublished, {} run records",
            report.case_files_removed,
            report.namespaces_deleted,
            report.entities_unpublished,
            report.run_records_cleared,
        );
        return Ok(0);
    }

    let client = StageClient::new(&config.extraction_base_url, config.request_timeout);
    let pipeline = CasePipeline::new(&client, config.injection_mode);

    if cli.batch {
        let skip_clean = cli.skip_clean || cli.start_from.is_some();
        let cleanup = if skip_clean { None } else { Some(&cleanup) };
        let controller = BatchController::new(&pipeline, &store);
        let summary = controller.run_batch(&mut conn, cleanup, cli.start_from.as_deref())?;
        return Ok(print_batch_summary(&summary));
    }

    let case_id = cli.case_id.ok_or_else(|| {
        CliError::Usage("nothing to do: pass a case id, or --batch, --list, --status, --clean".into())
    })?;
    let case = db::get_case(&conn, &case_id)?;

    if let Some(step) = cli.step {
        match pipeline.run_single_step(&mut conn, &case, step, cli.section.map(Into::into))? {
            Some(report) => {
                print_audit(&report.case_id, report.status, report.checks_failed(), report.checks_warned());
                return Ok(audit_exit_code(report.status));
            }
            None => {
                println!("Step complete for case {case_id}");
                return Ok(0);
            }
        }
    }

    let report = pipeline.run_case(&mut conn, &case, None)?;
    println!("Case {} processed in {} ms", case_id, report.duration_ms);
    print_audit(
        &case_id,
        report.audit.status,
        report.audit.checks_failed(),
        report.audit.checks_warned(),
    );
    Ok(audit_exit_code(report.audit.status))
}

fn print_batch_summary(summary: &crate::pipeline::BatchSummary) -> i32 {
    println!(
        "Batch {}: {}/{} succeeded in {} ms",
        summary.batch_id, summary.succeeded, summary.total, summary.duration_ms,
    );
    for (case_id, elapsed_ms) in &summary.case_timings {
        println!("  {case_id}: {elapsed_ms} ms");
    }
    for (case_id, step) in &summary.failed_cases {
        println!("  failed:         {case_id} (at {step})");
    }
    for case_id in &summary.partial_commit_cases {
        println!("  partial commit: {case_id} (needs manual repair)");
    }
    for (case_id, status) in &summary.non_pass_cases {
        println!("  audit {status}: {case_id}");
    }
    for case_id in &summary.accumulation_warnings {
        println!("  no growth:      {case_id} (commit added no definitions)");
    }

    let any_audit_fail = summary
        .non_pass_cases
        .iter()
        .any(|(_, status)| *status == OverallStatus::Fail);
    if summary.failed > 0 || any_audit_fail {
        1
    } else {
        0
    }
}

fn audit_exit_code(status: OverallStatus) -> i32 {
    match status {
        OverallStatus::Pass | OverallStatus::IssuesFound => 0,
        OverallStatus::Fail => 1,
    }
}

fn print_audit(case_id: &str, status: OverallStatus, failed: u32, warned: u32) {
    println!("Audit for {case_id}: {status} ({failed} failed, {warned} warned)");
}

/// One formatted line per case, in batch order, with section availability
/// and processed state spelled out on every row.
fn case_rows(conn: &rusqlite::Connection) -> Result<Vec<String>, CliError> {
    let mut rows = Vec::new();
    for listing in db::list_cases_ordered(conn)? {
        let entities = db::total_entity_count(conn, &listing.id)?;
        let state = if entities > 0 { "processed" } else { "unprocessed" };
        let sections = match (listing.has_facts, listing.has_discussion) {
            (true, true) => "facts+discussion",
            (true, false) => "facts only",
            (false, true) => "discussion only",
            (false, false) => "no text",
        };
        let status = db::latest_verification_status(conn, &listing.id)?
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| "-".to_string());
        rows.push(format!(
            "{:<12} {:>4}-{:<3} {:<17} {:<11} {:>4} entities  {:<12} {}",
            listing.id,
            listing.year,
            listing.case_number,
            sections,
            state,
            entities,
            status,
            listing.title,
        ));
    }
    Ok(rows)
}

fn list_cases(conn: &rusqlite::Connection) -> Result<i32, CliError> {
    let rows = case_rows(conn)?;
    for row in &rows {
        println!("{row}");
    }
    let unprocessed = db::unprocessed_cases(conn)?;
    println!("{} cases, {} unprocessed", rows.len(), unprocessed.len());
    Ok(0)
}

fn show_status(conn: &rusqlite::Connection, case_id: &str) -> Result<i32, CliError> {
    let case = db::get_case(conn, case_id)?;
    let counts = db::counts_by_kind(conn, case_id)?;
    let sessions = db::sessions_for_case(conn, case_id)?;
    let total = db::total_entity_count(conn, case_id)?;
    let unpublished = db::unpublished_count(conn, case_id)?;
    let reports = db::verification_report_count(conn, case_id)?;
    let latest = db::latest_verification_status(conn, case_id)?;

    println!("{} ({}-{}) {}", case.id, case.year, case.case_number, case.title);
    println!("  namespace: {}", case.namespace());
    println!("  sessions: {}", sessions.len());
    println!("  entities: {total} ({unpublished} unpublished)");
    let mut kinds: Vec<_> = counts.iter().collect();
    kinds.sort_by_key(|(kind, _)| kind.as_str());
    for (kind, count) in kinds {
        println!("    {:<16} {}", kind.as_str(), count);
    }
    match latest {
        Some(status) => println!("  audit: {status} ({reports} reports)"),
        None => println!("  audit: never run"),
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_full_case_run() {
        let cli = Cli::parse_from(["ethicore", "case-24-3"]);
        assert_eq!(cli.case_id.as_deref(), Some("case-24-3"));
        assert!(cli.step.is_none());
        assert!(!cli.batch);
    }

    #[test]
    fn parses_numbered_and_named_steps() {
        let cli = Cli::parse_from(["ethicore", "c1", "--step", "1"]);
        assert_eq!(cli.step, Some(SingleStep::Concepts));
        let cli = Cli::parse_from(["ethicore", "c1", "--step", "qc"]);
        assert_eq!(cli.step, Some(SingleStep::Audit));
        let cli = Cli::parse_from(["ethicore", "c1", "--step", "uncommit"]);
        assert_eq!(cli.step, Some(SingleStep::Uncommit));
    }

    #[test]
    fn rejects_unknown_step() {
        assert!(Cli::try_parse_from(["ethicore", "c1", "--step", "5"]).is_err());
    }

    #[test]
    fn step_with_section() {
        let cli = Cli::parse_from(["ethicore", "c1", "--step", "2", "--section", "discussion"]);
        assert!(matches!(cli.section, Some(SectionArg::Discussion)));
    }

    #[test]
    fn batch_flags_require_batch() {
        assert!(Cli::try_parse_from(["ethicore", "--skip-clean"]).is_err());
        assert!(Cli::try_parse_from(["ethicore", "--start-from", "c1"]).is_err());
        assert!(Cli::try_parse_from(["ethicore", "--batch", "--start-from", "c1"]).is_ok());
    }

    #[test]
    fn injection_mode_values() {
        let cli = Cli::parse_from(["ethicore", "--batch", "--injection-mode", "label-only"]);
        assert!(matches!(cli.injection_mode, Some(InjectionModeArg::LabelOnly)));
    }

    #[test]
    fn list_rows_mark_sections_and_processed_state() {
        let conn = crate::db::open_memory_database().unwrap();
        crate::db::fixtures::insert_case(&conn, "c1", 2024, 1);
        crate::db::fixtures::insert_case_with_text(&conn, "c2", 2024, 2, "Facts here.", "");
        let session = crate::db::fixtures::insert_session(&conn, "c1", "concepts");
        crate::db::fixtures::insert_entity(
            &conn,
            "c1",
            &session,
            crate::models::EntityKind::Role,
            "Engineer",
            "m",
        );

        let rows = case_rows(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("facts+discussion"));
        assert!(rows[0].contains(" processed"));
        assert!(!rows[0].contains("unprocessed"));
        assert!(rows[1].contains("facts only"));
        assert!(rows[1].contains("unprocessed"));
    }

    #[test]
    fn audit_exit_codes() {
        assert_eq!(audit_exit_code(OverallStatus::Pass), 0);
        assert_eq!(audit_exit_code(OverallStatus::IssuesFound), 0);
        assert_eq!(audit_exit_code(OverallStatus::Fail), 1);
    }
}
