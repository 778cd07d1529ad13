//! Domain layer: entities and hierarchy logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod builder;
pub mod cycle;
pub mod diagnostics;
pub mod entities;
pub mod error;
mod links;
pub mod mutation;
pub mod rank;
pub mod resolver;
pub mod view;

pub use arena::{Forest, MaterializationState, NodeId, TreeNode};
pub use builder::{BuildMode, BuildOutput, TreeBuilder, DEFAULT_EXPAND_DEPTH};
pub use cycle::CycleGuard;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use entities::*;
pub use error::{DomainError, RejectReason};
pub use mutation::{MutationOutcome, OrphanPolicy};
pub use rank::{default_rank_groups, RankClassifier, RankGroup};
pub use resolver::{resolve_parent, ParentRef, UnresolvedReason};
pub use view::{NodeView, OutlineEntry, TreeNodeConvert};
