//! The ten post-condition checks, V0 through V9.
//!
//! Each check is a pure function over a loaded `CaseSnapshot` returning a
//! `CheckResult`. Severity is fixed per check except V1, which escalates
//! from informational to critical when labels recur across sessions.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use super::engine::CaseSnapshot;
use super::types::{CheckResult, CheckStatus, Severity};
use crate::config::ALGORITHMIC_MODEL;
use crate::models::{EntityKind, Section};

/// How many argument records V5 samples per audit.
const ARGUMENT_SAMPLE_SIZE: usize = 5;

/// Empirically derived per-kind count ranges for V7. Only non-zero counts
/// are range-checked; V6 owns the missing-kind case.
fn expected_range(kind: EntityKind) -> (u32, u32) {
    match kind {
        EntityKind::Role => (2, 12),
        EntityKind::State => (2, 15),
        EntityKind::Resource => (1, 10),
        EntityKind::Principle => (1, 8),
        EntityKind::Obligation => (1, 12),
        EntityKind::Constraint => (1, 8),
        EntityKind::Capability => (1, 8),
        EntityKind::Tension => (1, 6),
        EntityKind::Action => (2, 20),
        EntityKind::Event => (1, 15),
        EntityKind::Relationship => (2, 25),
        EntityKind::DecisionPoint => (1, 4),
        EntityKind::DecisionOption => (2, 10),
        EntityKind::Argument => (2, 16),
        EntityKind::Claim => (2, 16),
        EntityKind::Synthesis => (1, 1),
    }
}

fn payload_str<'a>(payload: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(|v| v.as_str())
}

/// V0 — both required text sections exist and are non-empty.
pub fn check_section_integrity(snapshot: &CaseSnapshot) -> CheckResult {
    let mut missing = Vec::new();
    for section in Section::all() {
        if snapshot.case.section_text(*section).trim().is_empty() {
            missing.push(section.as_str());
        }
    }

    CheckResult {
        check_id: "V0",
        name: "section_integrity",
        severity: Severity::Critical,
        status: if missing.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({ "missing_sections": missing }),
    }
}

/// V1 — extraction kinds whose entities span more than one session.
///
/// A label recurring across sessions means the same concept was extracted
/// twice (critical); disjoint labels across sessions mean supplemental
/// extraction, which is tolerated and reported informationally.
pub fn check_duplicate_sessions(snapshot: &CaseSnapshot) -> CheckResult {
    let mut sessions_by_kind: HashMap<EntityKind, HashSet<&str>> = HashMap::new();
    let mut labels_by_kind: HashMap<EntityKind, HashMap<&str, HashSet<&str>>> = HashMap::new();

    for entity in &snapshot.entities {
        sessions_by_kind
            .entry(entity.kind)
            .or_default()
            .insert(entity.session_id.as_str());
        labels_by_kind
            .entry(entity.kind)
            .or_default()
            .entry(entity.label.as_str())
            .or_default()
            .insert(entity.session_id.as_str());
    }

    let mut spanning_kinds = Vec::new();
    let mut recurring_labels = Vec::new();

    for (kind, sessions) in &sessions_by_kind {
        if sessions.len() <= 1 {
            continue;
        }
        spanning_kinds.push(kind.as_str());
        if let Some(labels) = labels_by_kind.get(kind) {
            for (label, label_sessions) in labels {
                if label_sessions.len() > 1 {
                    recurring_labels.push(format!("{kind}: {label}"));
                }
            }
        }
    }

    spanning_kinds.sort_unstable();
    recurring_labels.sort();

    let (severity, status) = if !recurring_labels.is_empty() {
        (Severity::Critical, CheckStatus::Fail)
    } else if !spanning_kinds.is_empty() {
        (Severity::Info, CheckStatus::Info)
    } else {
        (Severity::Info, CheckStatus::Pass)
    };

    CheckResult {
        check_id: "V1",
        name: "duplicate_sessions",
        severity,
        status,
        details: serde_json::json!({
            "spanning_kinds": spanning_kinds,
            "recurring_labels": recurring_labels,
        }),
    }
}

/// V2 — argument and claim counts must match when both are non-zero.
pub fn check_count_parity(snapshot: &CaseSnapshot) -> CheckResult {
    let arguments = snapshot.count(EntityKind::Argument);
    let claims = snapshot.count(EntityKind::Claim);

    let status = if arguments == 0 || claims == 0 {
        CheckStatus::NotApplicable
    } else if arguments == claims {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };

    CheckResult {
        check_id: "V2",
        name: "count_parity",
        severity: Severity::Critical,
        status,
        details: serde_json::json!({
            "argument_count": arguments,
            "claim_count": claims,
        }),
    }
}

/// V3 — argument claim text must not match known ungrammatical templates:
/// subject-less modal openings, leaked `{placeholder}` braces, or a leading
/// subordinate "that".
pub fn check_malformed_claims(snapshot: &CaseSnapshot) -> CheckResult {
    let arguments: Vec<_> = snapshot.entities_of(EntityKind::Argument).collect();
    if arguments.is_empty() {
        return CheckResult {
            check_id: "V3",
            name: "malformed_claims",
            severity: Severity::Critical,
            status: CheckStatus::NotApplicable,
            details: serde_json::json!({}),
        };
    }

    let subjectless = Regex::new(r"(?i)^\s*(should|must|shall|ought)\b").unwrap();
    let subordinate = Regex::new(r"(?i)^\s*that\s").unwrap();

    let mut violations = Vec::new();
    for argument in &arguments {
        let claim = payload_str(&argument.payload, "claim").unwrap_or_default();
        let malformed = subjectless.is_match(claim)
            || subordinate.is_match(claim)
            || claim.contains('{')
            || claim.contains('}');
        if malformed {
            violations.push(serde_json::json!({
                "label": argument.label,
                "claim": claim,
            }));
        }
    }

    CheckResult {
        check_id: "V3",
        name: "malformed_claims",
        severity: Severity::Critical,
        status: if violations.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({ "violations": violations }),
    }
}

/// V4 — every decision point carries at least one option, and option text
/// avoids disallowed surface forms (leading article, "No … required").
pub fn check_decision_option_form(snapshot: &CaseSnapshot) -> CheckResult {
    let negated_requirement = Regex::new(r"(?i)^no\b.*\brequired\b").unwrap();

    let mut option_parents: HashSet<&str> = HashSet::new();
    let mut bad_options = Vec::new();

    for option in snapshot.entities_of(EntityKind::DecisionOption) {
        if let Some(parent) = payload_str(&option.payload, "decision_point") {
            option_parents.insert(parent);
        }

        let text = payload_str(&option.payload, "text").unwrap_or(&option.label);
        let article = text.starts_with("The ") || text.starts_with("A ") || text.starts_with("An ");
        if article || negated_requirement.is_match(text) {
            bad_options.push(text.to_string());
        }
    }

    let mut orphan_points = Vec::new();
    for point in snapshot.entities_of(EntityKind::DecisionPoint) {
        let key = payload_str(&point.payload, "key").unwrap_or(&point.label);
        if !option_parents.contains(key) {
            orphan_points.push(point.label.clone());
        }
    }

    let ok = bad_options.is_empty() && orphan_points.is_empty();

    CheckResult {
        check_id: "V4",
        name: "decision_option_form",
        severity: Severity::Critical,
        status: if ok { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({
            "points_without_options": orphan_points,
            "disallowed_options": bad_options,
        }),
    }
}

/// V5 — sampled argument records must carry claim, grounds, and warrant.
pub fn check_argument_structure(snapshot: &CaseSnapshot) -> CheckResult {
    let sample: Vec<_> = snapshot
        .entities_of(EntityKind::Argument)
        .take(ARGUMENT_SAMPLE_SIZE)
        .collect();

    if sample.is_empty() {
        return CheckResult {
            check_id: "V5",
            name: "argument_structure",
            severity: Severity::Critical,
            status: CheckStatus::NotApplicable,
            details: serde_json::json!({}),
        };
    }

    let mut incomplete = Vec::new();
    for argument in &sample {
        let mut missing = Vec::new();
        for field in ["claim", "grounds", "warrant"] {
            let present = payload_str(&argument.payload, field)
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false);
            if !present {
                missing.push(field);
            }
        }
        if !missing.is_empty() {
            incomplete.push(serde_json::json!({
                "label": argument.label,
                "missing_fields": missing,
            }));
        }
    }

    CheckResult {
        check_id: "V5",
        name: "argument_structure",
        severity: Severity::Critical,
        status: if incomplete.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({
            "sampled": sample.len(),
            "incomplete": incomplete,
        }),
    }
}

/// V6 — all sixteen required kinds must have at least one entity.
pub fn check_completeness(snapshot: &CaseSnapshot) -> CheckResult {
    let missing: Vec<&str> = EntityKind::all()
        .iter()
        .filter(|kind| snapshot.count(**kind) == 0)
        .map(|kind| kind.as_str())
        .collect();

    let counts: HashMap<&str, u32> = snapshot
        .counts
        .iter()
        .map(|(kind, count)| (kind.as_str(), *count))
        .collect();

    CheckResult {
        check_id: "V6",
        name: "completeness",
        severity: Severity::Critical,
        status: if missing.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({
            "missing_kinds": missing,
            "counts": counts,
        }),
    }
}

/// V7 — non-zero per-kind counts must fall within the empirical ranges.
/// Out-of-range counts are reported but never block the case.
pub fn check_count_sanity(snapshot: &CaseSnapshot) -> CheckResult {
    let mut out_of_range = Vec::new();
    for (kind, count) in &snapshot.counts {
        if *count == 0 {
            continue;
        }
        let (low, high) = expected_range(*kind);
        if *count < low || *count > high {
            out_of_range.push(serde_json::json!({
                "kind": kind.as_str(),
                "count": count,
                "expected": format!("{low}..={high}"),
            }));
        }
    }

    CheckResult {
        check_id: "V7",
        name: "count_sanity",
        severity: Severity::Info,
        status: if out_of_range.is_empty() { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({ "out_of_range": out_of_range }),
    }
}

/// V8 — at most one distinct extraction model across prompts and entities,
/// excluding the synthetic algorithmic marker.
pub fn check_model_consistency(snapshot: &CaseSnapshot) -> CheckResult {
    let models: Vec<&str> = snapshot
        .model_ids
        .iter()
        .map(|m| m.as_str())
        .filter(|m| *m != ALGORITHMIC_MODEL)
        .collect();

    CheckResult {
        check_id: "V8",
        name: "model_consistency",
        severity: Severity::Warning,
        status: if models.len() <= 1 { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({ "models": models }),
    }
}

/// V9 — every extracted entity for the case must be published.
pub fn check_publish_status(snapshot: &CaseSnapshot) -> CheckResult {
    let total: u32 = snapshot.counts.values().sum();

    CheckResult {
        check_id: "V9",
        name: "publish_status",
        severity: Severity::Warning,
        status: if snapshot.unpublished == 0 { CheckStatus::Pass } else { CheckStatus::Fail },
        details: serde_json::json!({
            "unpublished": snapshot.unpublished,
            "total": total,
        }),
    }
}

/// Run all ten checks in order. Never short-circuits.
pub fn run_all_checks(snapshot: &CaseSnapshot) -> Vec<CheckResult> {
    vec![
        check_section_integrity(snapshot),
        check_duplicate_sessions(snapshot),
        check_count_parity(snapshot),
        check_malformed_claims(snapshot),
        check_decision_option_form(snapshot),
        check_argument_structure(snapshot),
        check_completeness(snapshot),
        check_count_sanity(snapshot),
        check_model_consistency(snapshot),
        check_publish_status(snapshot),
    ]
}
