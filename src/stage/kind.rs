//! The closed set of pipeline stages.

use crate::models::{ReconcileMode, Section};

/// One named unit of work against the remote extraction service.
///
/// Streaming stages emit incremental progress events over a long-lived
/// connection; blocking stages return a single decoded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Extraction stage A: contextual concepts over one text section.
    ConceptsPass { section: Section },
    /// Extraction stage B: normative concepts over one text section.
    NormativePass { section: Section },
    /// Relation discovery across the whole case (no section parameter).
    RelationsPass,
    /// Merge newly extracted entities with existing ones.
    Reconcile { mode: ReconcileMode },
    /// Publish all unpublished entities to the shared accumulation store.
    Commit,
    /// Unpublish previously committed entities. "Nothing committed" is a no-op.
    Uncommit,
    /// Case synthesis over the outputs of the earlier passes.
    Synthesis,
}

impl StageKind {
    /// Stable stage name used in routes, run records, and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConceptsPass { .. } => "concepts",
            Self::NormativePass { .. } => "normative",
            Self::RelationsPass => "relations",
            Self::Reconcile { .. } => "reconcile",
            Self::Commit => "commit",
            Self::Uncommit => "uncommit",
            Self::Synthesis => "synthesis",
        }
    }

    /// Whether this stage streams progress events (extraction passes) or
    /// returns a single blocking result (maintenance stages).
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::ConceptsPass { .. }
                | Self::NormativePass { .. }
                | Self::RelationsPass
                | Self::Synthesis
        )
    }

    pub fn section(&self) -> Option<Section> {
        match self {
            Self::ConceptsPass { section } | Self::NormativePass { section } => Some(*section),
            _ => None,
        }
    }

    pub fn reconcile_mode(&self) -> Option<ReconcileMode> {
        match self {
            Self::Reconcile { mode } => Some(*mode),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.section() {
            Some(section) => write!(f, "{}:{}", self.name(), section),
            None => write!(f, "{}", self.name()),
        }
    }
}
