//! orgtree: organization hierarchies from flat reporting lines.
//!
//! Layers, inner to outer:
//! - [`domain`]: resolver, cycle guard, rank classifier, tree builder and
//!   mutation applier; pure and synchronous
//! - [`application`]: entity source and hierarchy service
//! - [`infrastructure`]: filesystem boundary and service container
//! - [`cli`]: argument parsing, dispatch, terminal output

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
