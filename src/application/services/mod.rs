//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (FileSystem) but are themselves
//! concrete structs, not traits.

mod hierarchy;
mod source;

pub use hierarchy::{EditResult, HierarchyService};
pub use source::{EntitySource, SourceFormat};
