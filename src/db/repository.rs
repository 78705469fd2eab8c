//! Repository functions over the relational store.
//!
//! All access goes through these free functions on `&Connection`, grouped by
//! concern: cases (read-only), extracted state, run bookkeeping, and the
//! audit trail. Maintenance operations that the original performed by
//! shelling out to a client tool are explicit transactional functions here
//! (`reset_published_flags`, `clear_run_bookkeeping`).

use std::collections::HashMap;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::audit::types::{CheckResult, CheckStatus, OverallStatus, Severity, VerificationReport};
use crate::models::{Case, EntityKind, ExtractedEntity, ExtractionSession};

const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn now_string() -> String {
    chrono::Utc::now().format(TIMESTAMP_FMT).to_string()
}

// ═══════════════════════════════════════════
// Cases (read-only)
// ═══════════════════════════════════════════

/// Listing row: ordering keys plus text-availability flags.
#[derive(Debug, Clone)]
pub struct CaseListing {
    pub id: String,
    pub title: String,
    pub year: i32,
    pub case_number: i32,
    pub has_facts: bool,
    pub has_discussion: bool,
}

/// All cases in deterministic batch order: year descending, then case
/// number ascending.
pub fn list_cases_ordered(conn: &Connection) -> Result<Vec<CaseListing>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, year, case_number,
                length(facts_text) > 0, length(discussion_text) > 0
         FROM cases
         ORDER BY year DESC, case_number ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(CaseListing {
            id: row.get(0)?,
            title: row.get(1)?,
            year: row.get(2)?,
            case_number: row.get(3)?,
            has_facts: row.get(4)?,
            has_discussion: row.get(5)?,
        })
    })?;

    let mut cases = Vec::new();
    for row in rows {
        cases.push(row?);
    }
    Ok(cases)
}

pub fn get_case(conn: &Connection, case_id: &str) -> Result<Case, DatabaseError> {
    conn.query_row(
        "SELECT id, title, year, case_number, facts_text, discussion_text
         FROM cases WHERE id = ?1",
        params![case_id],
        |row| {
            Ok(Case {
                id: row.get(0)?,
                title: row.get(1)?,
                year: row.get(2)?,
                case_number: row.get(3)?,
                facts_text: row.get(4)?,
                discussion_text: row.get(5)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity_type: "case".to_string(),
            id: case_id.to_string(),
        },
        other => DatabaseError::Sqlite(other),
    })
}

/// Cases with no extracted entities yet.
pub fn unprocessed_cases(conn: &Connection) -> Result<Vec<CaseListing>, DatabaseError> {
    let all = list_cases_ordered(conn)?;
    let mut out = Vec::new();
    for listing in all {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM extracted_entities WHERE case_id = ?1",
            params![listing.id],
            |row| row.get(0),
        )?;
        if count == 0 {
            out.push(listing);
        }
    }
    Ok(out)
}

// ═══════════════════════════════════════════
// Extracted state
// ═══════════════════════════════════════════

pub fn entities_for_case(
    conn: &Connection,
    case_id: &str,
) -> Result<Vec<ExtractedEntity>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, session_id, kind, label, definition, payload, published, model_id
         FROM extracted_entities WHERE case_id = ?1 ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![case_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, bool>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut entities = Vec::new();
    for row in rows {
        let (id, case_id, session_id, kind, label, definition, payload, published, model_id) = row?;
        let kind = EntityKind::from_str(&kind).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "kind".to_string(),
            value: kind.clone(),
        })?;
        let payload = serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null);
        entities.push(ExtractedEntity {
            id,
            case_id,
            session_id,
            kind,
            label,
            definition,
            payload,
            published,
            model_id,
        });
    }
    Ok(entities)
}

pub fn sessions_for_case(
    conn: &Connection,
    case_id: &str,
) -> Result<Vec<ExtractionSession>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, case_id, stage, created_at
         FROM extraction_sessions WHERE case_id = ?1 ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(params![case_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut sessions = Vec::new();
    for row in rows {
        let (id, case_id, stage, created_at) = row?;
        sessions.push(ExtractionSession {
            id,
            case_id,
            stage,
            created_at: NaiveDateTime::parse_from_str(&created_at, TIMESTAMP_FMT)
                .unwrap_or_default(),
        });
    }
    Ok(sessions)
}

/// Per-kind entity counts for a case. Kinds with zero entities are absent.
pub fn counts_by_kind(
    conn: &Connection,
    case_id: &str,
) -> Result<HashMap<EntityKind, u32>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT kind, COUNT(*) FROM extracted_entities WHERE case_id = ?1 GROUP BY kind",
    )?;

    let rows = stmt.query_map(params![case_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = HashMap::new();
    for row in rows {
        let (kind, count) = row?;
        if let Some(kind) = EntityKind::from_str(&kind) {
            counts.insert(kind, count as u32);
        }
    }
    Ok(counts)
}

pub fn total_entity_count(conn: &Connection, case_id: &str) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM extracted_entities WHERE case_id = ?1",
        params![case_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn unpublished_count(conn: &Connection, case_id: &str) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM extracted_entities WHERE case_id = ?1 AND published = 0",
        params![case_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

/// Delete all extracted state for a case: entities, sessions, and prompts.
/// Transactional — a failure leaves prior state intact.
pub fn clear_case_state(conn: &mut Connection, case_id: &str) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM extracted_entities WHERE case_id = ?1", params![case_id])?;
    tx.execute("DELETE FROM extraction_sessions WHERE case_id = ?1", params![case_id])?;
    tx.execute("DELETE FROM prompts WHERE case_id = ?1", params![case_id])?;
    tx.commit()?;
    Ok(())
}

/// Reset every entity's published flag across all cases. Used only by the
/// cleanup manager, after registry entries have been removed.
pub fn reset_published_flags(conn: &Connection) -> Result<u32, DatabaseError> {
    let changed = conn.execute("UPDATE extracted_entities SET published = 0 WHERE published = 1", [])?;
    Ok(changed as u32)
}

/// Distinct model identifiers across the case's prompts and entities.
pub fn distinct_model_ids(conn: &Connection, case_id: &str) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT model_id FROM extracted_entities WHERE case_id = ?1
         UNION
         SELECT DISTINCT model_id FROM prompts WHERE case_id = ?1
         ORDER BY model_id",
    )?;

    let rows = stmt.query_map(params![case_id], |row| row.get::<_, String>(0))?;
    let mut models = Vec::new();
    for row in rows {
        models.push(row?);
    }
    Ok(models)
}

// ═══════════════════════════════════════════
// Run bookkeeping
// ═══════════════════════════════════════════

/// Start a pipeline run record; returns its id.
pub fn record_run_start(
    conn: &Connection,
    case_id: &str,
    batch_id: Option<&str>,
) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO pipeline_runs (id, case_id, batch_id, started_at, status)
         VALUES (?1, ?2, ?3, ?4, 'running')",
        params![id, case_id, batch_id, now_string()],
    )?;
    Ok(id)
}

/// Finish a run record with its terminal status, optional failed stage,
/// and per-step wall-clock timings.
pub fn record_run_finish(
    conn: &Connection,
    run_id: &str,
    status: &str,
    failed_stage: Option<&str>,
    duration_ms: u64,
    step_timings: &serde_json::Value,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE pipeline_runs
         SET finished_at = ?2, status = ?3, failed_stage = ?4, duration_ms = ?5, step_timings = ?6
         WHERE id = ?1",
        params![
            run_id,
            now_string(),
            status,
            failed_stage,
            duration_ms as i64,
            step_timings.to_string(),
        ],
    )?;
    Ok(())
}

/// Empty the run bookkeeping table. Cleanup-manager only.
pub fn clear_run_bookkeeping(conn: &Connection) -> Result<u32, DatabaseError> {
    let deleted = conn.execute("DELETE FROM pipeline_runs", [])?;
    Ok(deleted as u32)
}

pub fn run_record_count(conn: &Connection) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM pipeline_runs", [], |row| row.get(0))?;
    Ok(count as u32)
}

// ═══════════════════════════════════════════
// Audit trail
// ═══════════════════════════════════════════

/// Persist a verification report and its ordered check results.
/// Append-only: historical reports for the same case are never overwritten.
pub fn store_verification_report(
    conn: &mut Connection,
    report: &VerificationReport,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO verification_results
         (id, case_id, run_at, status, checks_passed, checks_failed, checks_warned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.id,
            report.case_id,
            report.run_at.format(TIMESTAMP_FMT).to_string(),
            report.status.as_str(),
            report.checks_passed(),
            report.checks_failed(),
            report.checks_warned(),
        ],
    )?;

    for (position, check) in report.checks.iter().enumerate() {
        tx.execute(
            "INSERT INTO check_results
             (result_id, position, check_id, name, severity, status, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.id,
                position as i64,
                check.check_id,
                check.name,
                check.severity.as_str(),
                check.status.as_str(),
                check.details.to_string(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Most recent overall audit status for a case, if any audit has run.
pub fn latest_verification_status(
    conn: &Connection,
    case_id: &str,
) -> Result<Option<OverallStatus>, DatabaseError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM verification_results
             WHERE case_id = ?1 ORDER BY run_at DESC, rowid DESC LIMIT 1",
            params![case_id],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match status {
        Some(s) => {
            let parsed = OverallStatus::from_str(&s).ok_or(DatabaseError::InvalidEnum {
                field: "status".to_string(),
                value: s,
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

pub fn verification_report_count(conn: &Connection, case_id: &str) -> Result<u32, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM verification_results WHERE case_id = ?1",
        params![case_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

/// Stored check rows for a report, in audit order. Used by the status CLI
/// and by tests asserting persistence fidelity.
pub fn check_results_for_report(
    conn: &Connection,
    result_id: &str,
) -> Result<Vec<(String, Severity, CheckStatus)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT check_id, severity, status FROM check_results
         WHERE result_id = ?1 ORDER BY position ASC",
    )?;

    let rows = stmt.query_map(params![result_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (check_id, severity, status) = row?;
        let severity = Severity::from_str(&severity).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "severity".to_string(),
            value: severity.clone(),
        })?;
        let status = CheckStatus::from_str(&status).ok_or_else(|| DatabaseError::InvalidEnum {
            field: "status".to_string(),
            value: status.clone(),
        })?;
        out.push((check_id, severity, status));
    }
    Ok(out)
}
