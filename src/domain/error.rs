//! Domain-level errors (no external dependencies)

use std::fmt;

use thiserror::Error;

/// Why a user-initiated reparent was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    SelfReference,
    /// The new parent descends from the moved entity; `path` runs from the
    /// new parent up to the moved entity.
    WouldCreateCycle { path: Vec<String> },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SelfReference => write!(f, "entity cannot report to itself"),
            RejectReason::WouldCreateCycle { path } => {
                write!(f, "would create a cycle via {}", path.join(" -> "))
            }
        }
    }
}

/// Domain errors represent rejected edits and invalid handles.
/// Construction anomalies are never errors, see `Diagnostic`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("reparent of {entity_id} under {new_parent_id} rejected: {reason}")]
    RejectedReparent {
        entity_id: String,
        new_parent_id: String,
        reason: RejectReason,
    },

    #[error("node handle no longer refers to a node in this forest")]
    StaleNode,

    #[error("invalid entity {id:?}: {message}")]
    InvalidEntity { id: String, message: String },
}
