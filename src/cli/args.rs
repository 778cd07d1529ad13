//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};

use crate::domain::OrphanPolicy;

/// Organization hierarchy from flat reporting lines: cycle-safe, rank-ordered trees
#[derive(Parser, Debug)]
#[command(name = "orgtree")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output on stderr, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the hierarchy as a tree
    Tree {
        /// Entity document (JSON or TOML), default: `source` from config
        #[arg(value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,

        /// Materialize roots only, children on demand
        #[arg(long)]
        lazy: bool,

        /// Expand these entities (and their ancestors)
        #[arg(short, long, value_name = "ID")]
        expand: Vec<String>,
    },

    /// Print the hierarchy as JSON
    Show {
        #[arg(value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,

        #[arg(long)]
        lazy: bool,

        #[arg(short, long, value_name = "ID")]
        expand: Vec<String>,
    },

    /// Report data anomalies; exits non-zero when there are any
    Check {
        #[arg(value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,
    },

    /// Reassign an entity's parent and show the result (nothing is written)
    Move {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Entity to move
        id: String,

        /// New parent, omit to make it a root
        #[arg(long, value_name = "PARENT")]
        to: Option<String>,
    },

    /// Remove an entity and show the result (nothing is written)
    Remove {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        id: String,

        /// What happens to its reports, default from config
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },

    /// Classify job titles
    Rank {
        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show,

    /// Print a config template
    Template,

    /// Show config paths
    Path,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Reports become roots
    Promote,
    /// Reports move up to the removed entity's parent
    Reattach,
}

impl From<PolicyArg> for OrphanPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Promote => OrphanPolicy::PromoteToRoot,
            PolicyArg::Reattach => OrphanPolicy::ReattachToGrandparent,
        }
    }
}
