//! Wire events and outcomes for stage invocations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::EntityKind;

/// One NDJSON event from a streaming stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageEvent {
    /// Incremental human-readable progress.
    Progress { message: String },
    /// One entity was produced.
    Item { kind: EntityKind },
    /// The stage hit an error. Marks the whole stage failed even if a
    /// later event claims completion.
    Error { message: String },
    /// Terminal completion marker with the session id and per-kind counts.
    Complete {
        session_id: String,
        #[serde(default)]
        counts: HashMap<EntityKind, u32>,
    },
}

/// Outcome of a stage that did not fail.
///
/// `NoOp` covers idempotent "nothing to do" conditions (e.g. uncommit on a
/// case with nothing committed), which are explicitly not errors.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed(StageSummary),
    NoOp,
}

impl StageOutcome {
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

/// Summary derived from a completed stage.
#[derive(Debug, Clone, Default)]
pub struct StageSummary {
    /// Extraction session created by a streaming stage.
    pub session_id: Option<String>,
    /// Per-kind item counts for extraction stages.
    pub counts: HashMap<EntityKind, u32>,
    /// Rows affected by a blocking stage (published / merged / unpublished).
    pub affected: u32,
}

impl StageSummary {
    pub fn items_total(&self) -> u32 {
        self.counts.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_decode_from_ndjson_lines() {
        let progress: StageEvent =
            serde_json::from_str(r#"{"type":"progress","message":"extracting roles"}"#).unwrap();
        assert!(matches!(progress, StageEvent::Progress { .. }));

        let item: StageEvent = serde_json::from_str(r#"{"type":"item","kind":"role"}"#).unwrap();
        assert!(matches!(item, StageEvent::Item { kind: EntityKind::Role }));

        let complete: StageEvent = serde_json::from_str(
            r#"{"type":"complete","session_id":"s-1","counts":{"role":3,"principle":2}}"#,
        )
        .unwrap();
        match complete {
            StageEvent::Complete { session_id, counts } => {
                assert_eq!(session_id, "s-1");
                assert_eq!(counts.get(&EntityKind::Role), Some(&3));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn complete_without_counts_defaults_empty() {
        let event: StageEvent =
            serde_json::from_str(r#"{"type":"complete","session_id":"s-2"}"#).unwrap();
        match event {
            StageEvent::Complete { counts, .. } => assert!(counts.is_empty()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn summary_totals_items() {
        let mut summary = StageSummary::default();
        summary.counts.insert(EntityKind::Role, 3);
        summary.counts.insert(EntityKind::State, 4);
        assert_eq!(summary.items_total(), 7);
    }
}
