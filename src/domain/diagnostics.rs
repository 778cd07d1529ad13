//! Non-fatal construction anomalies, reported as values.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::domain::entities::Entity;
use crate::domain::resolver::UnresolvedReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// `parent_id` not found in the collection; entity demoted to root
    DanglingReference,
    /// Entity names itself as parent; demoted to root
    SelfReference,
    /// Entity sits on a reference loop; the loop is broken by making it a root
    CycleDetected,
    /// Second or later occurrence of an id; kept as a separate root
    DuplicateId,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::DanglingReference => "dangling-reference",
            DiagnosticKind::SelfReference => "self-reference",
            DiagnosticKind::CycleDetected => "cycle-detected",
            DiagnosticKind::DuplicateId => "duplicate-id",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub entity_id: String,
    pub kind: DiagnosticKind,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(entity_id: impl Into<String>, kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            detail: detail.into(),
        }
    }

    /// Diagnostic for an entity whose parent reference did not resolve;
    /// `None` for the plain "no parent" case.
    pub fn for_unresolved(entity: &Entity, reason: UnresolvedReason) -> Option<Self> {
        let kind = match reason {
            UnresolvedReason::NoParent => return None,
            UnresolvedReason::SelfReference => DiagnosticKind::SelfReference,
            UnresolvedReason::DanglingReference => DiagnosticKind::DanglingReference,
        };
        Some(Self::new(
            &entity.id,
            kind,
            format!(
                "parent {:?} {}; placed as root",
                entity.parent_id.as_deref().unwrap_or_default(),
                reason
            ),
        ))
    }

    /// Record to the diagnostics sequence and the log.
    pub(crate) fn emit(self, sink: &mut Vec<Diagnostic>) {
        warn!(entity = %self.entity_id, kind = %self.kind, "{}", self.detail);
        sink.push(self);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.entity_id, self.kind, self.detail)
    }
}
