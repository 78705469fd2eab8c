//! Core data model for the extraction pipeline.
//!
//! These types model the full lifecycle:
//! Case → Stage invocation → ExtractionSession → ExtractedEntity →
//! Commit/Publish → Audit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════
// Entity Kinds
// ═══════════════════════════════════════════

/// The sixteen extraction kinds a fully processed case must carry.
///
/// Grouped by the stage that produces them:
/// - concepts pass (per section): Role, State, Resource, Principle
/// - normative pass (per section): Obligation, Constraint, Capability, Tension
/// - relations pass: Action, Event, Relationship
/// - synthesis pass: DecisionPoint, DecisionOption, Argument, Claim, Synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Role,
    State,
    Resource,
    Principle,
    Obligation,
    Constraint,
    Capability,
    Tension,
    Action,
    Event,
    Relationship,
    DecisionPoint,
    DecisionOption,
    Argument,
    Claim,
    Synthesis,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::State => "state",
            Self::Resource => "resource",
            Self::Principle => "principle",
            Self::Obligation => "obligation",
            Self::Constraint => "constraint",
            Self::Capability => "capability",
            Self::Tension => "tension",
            Self::Action => "action",
            Self::Event => "event",
            Self::Relationship => "relationship",
            Self::DecisionPoint => "decision_point",
            Self::DecisionOption => "decision_option",
            Self::Argument => "argument",
            Self::Claim => "claim",
            Self::Synthesis => "synthesis",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.as_str() == s)
    }

    /// All sixteen kinds, in canonical (stage) order.
    pub fn all() -> &'static [EntityKind] {
        &[
            Self::Role,
            Self::State,
            Self::Resource,
            Self::Principle,
            Self::Obligation,
            Self::Constraint,
            Self::Capability,
            Self::Tension,
            Self::Action,
            Self::Event,
            Self::Relationship,
            Self::DecisionPoint,
            Self::DecisionOption,
            Self::Argument,
            Self::Claim,
            Self::Synthesis,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Case
// ═══════════════════════════════════════════

/// A professional-ethics case. Immutable once ingested; the orchestrator
/// never writes to the cases table.
#[derive(Debug, Clone)]
pub struct Case {
    pub id: String,
    pub title: String,
    /// Primary ordering key (descending in batch order).
    pub year: i32,
    /// Secondary ordering key (ascending in batch order).
    pub case_number: i32,
    pub facts_text: String,
    pub discussion_text: String,
}

impl Case {
    /// Stable registry namespace for this case's accumulation entries.
    pub fn namespace(&self) -> String {
        format!("case-{}", self.id)
    }

    pub fn section_text(&self, section: Section) -> &str {
        match section {
            Section::Facts => &self.facts_text,
            Section::Discussion => &self.discussion_text,
        }
    }
}

/// The two text sections every case carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Facts,
    Discussion,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facts => "facts",
            Self::Discussion => "discussion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "facts" => Some(Self::Facts),
            "discussion" => Some(Self::Discussion),
            _ => None,
        }
    }

    pub fn all() -> &'static [Section] {
        &[Self::Facts, Self::Discussion]
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ═══════════════════════════════════════════
// Sessions and entities
// ═══════════════════════════════════════════

/// Groups all entities produced by one stage invocation for one case.
#[derive(Debug, Clone)]
pub struct ExtractionSession {
    pub id: String,
    pub case_id: String,
    pub stage: String,
    pub created_at: NaiveDateTime,
}

/// One extracted entity. Content-immutable after creation: corrections
/// require deleting and re-extracting; only `published` ever flips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub id: String,
    pub case_id: String,
    pub session_id: String,
    pub kind: EntityKind,
    pub label: String,
    pub definition: String,
    /// Kind-specific structured payload (e.g. claim/grounds/warrant for
    /// arguments, parent decision point for options).
    pub payload: serde_json::Value,
    pub published: bool,
    /// Identifier of the model that produced this entity.
    pub model_id: String,
}

// ═══════════════════════════════════════════
// Stage parameters
// ═══════════════════════════════════════════

/// How much ontology context is injected into extraction prompts.
/// Passed through to the extraction service, never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionMode {
    Full,
    LabelOnly,
}

impl InjectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::LabelOnly => "label_only",
        }
    }
}

/// Reconciliation mode. The default performs only exact-match merging and
/// never invokes a language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    ExactMatch,
    Review,
}

impl ReconcileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactMatch => "exact_match",
            Self::Review => "review",
        }
    }
}
