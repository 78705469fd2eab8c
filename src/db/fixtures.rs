//! Shared test fixtures for the relational store. Test builds only.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::models::EntityKind;

pub fn insert_case(conn: &Connection, id: &str, year: i32, case_number: i32) {
    insert_case_with_text(conn, id, year, case_number, "The engineer observed a defect.", "The board discussed the obligation to report.");
}

pub fn insert_case_with_text(
    conn: &Connection,
    id: &str,
    year: i32,
    case_number: i32,
    facts: &str,
    discussion: &str,
) {
    conn.execute(
        "INSERT INTO cases (id, title, year, case_number, facts_text, discussion_text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, format!("Case {id}"), year, case_number, facts, discussion],
    )
    .unwrap();
}

pub fn insert_session(conn: &Connection, case_id: &str, stage: &str) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO extraction_sessions (id, case_id, stage, created_at)
         VALUES (?1, ?2, ?3, datetime('now'))",
        params![id, case_id, stage],
    )
    .unwrap();
    id
}

pub fn insert_entity(
    conn: &Connection,
    case_id: &str,
    session_id: &str,
    kind: EntityKind,
    label: &str,
    model_id: &str,
) -> String {
    insert_entity_with_payload(conn, case_id, session_id, kind, label, model_id, serde_json::json!({}))
}

pub fn insert_entity_with_payload(
    conn: &Connection,
    case_id: &str,
    session_id: &str,
    kind: EntityKind,
    label: &str,
    model_id: &str,
    payload: serde_json::Value,
) -> String {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO extracted_entities
         (id, case_id, session_id, kind, label, definition, payload, published, model_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, '', ?6, 0, ?7, datetime('now'))",
        params![id, case_id, session_id, kind.as_str(), label, payload.to_string(), model_id],
    )
    .unwrap();
    id
}

pub fn insert_prompt(conn: &Connection, case_id: &str, stage: &str, model_id: &str) {
    conn.execute(
        "INSERT INTO prompts (id, case_id, stage, model_id, created_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![Uuid::new_v4().to_string(), case_id, stage, model_id],
    )
    .unwrap();
}

/// Publish every entity for a case, as the remote commit stage would.
pub fn publish_all(conn: &Connection, case_id: &str) {
    conn.execute(
        "UPDATE extracted_entities SET published = 1 WHERE case_id = ?1",
        params![case_id],
    )
    .unwrap();
}

/// Populate one entity of every kind for a case within a single session,
/// giving V6 a fully complete case to pass.
pub fn insert_complete_case_state(conn: &Connection, case_id: &str, model_id: &str) -> String {
    let session = insert_session(conn, case_id, "full");
    for kind in EntityKind::all() {
        let payload = match kind {
            EntityKind::Argument => serde_json::json!({
                "claim": "Engineer A must report the defect to the client.",
                "grounds": "The defect poses a risk to public safety.",
                "warrant": "Engineers hold paramount the safety of the public.",
            }),
            EntityKind::DecisionOption => serde_json::json!({
                "decision_point": "disclosure",
                "text": "Report the defect to the client immediately.",
            }),
            EntityKind::DecisionPoint => serde_json::json!({ "key": "disclosure" }),
            _ => serde_json::json!({}),
        };
        insert_entity_with_payload(
            conn,
            case_id,
            &session,
            *kind,
            &format!("{} fixture", kind.as_str()),
            model_id,
            payload,
        );
    }
    session
}
