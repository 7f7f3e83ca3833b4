//! Command-line interface definitions.
//!
//! Any subcommand not listed here is handed to the `zs<name>` executable.

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Zas incremental static site builder
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Site root directory
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Log every rendered and reaped file
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Regenerate every file and reset the deploy directory
    #[arg(short, long, global = true)]
    pub full: bool,

    /// subcommands (default: generate)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Create `.zas/` with a default configuration
    Init,

    /// Render stale sources into the deploy directory
    Generate,

    /// Run the external `zs<name>` command
    #[command(external_subcommand)]
    External(Vec<OsString>),
}
