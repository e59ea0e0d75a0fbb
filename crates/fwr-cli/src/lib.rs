//! Firmware Release CLI Library
//!
//! Operator commands for the firmware release pipeline:
//!
//! - **Local checks**: verify an archive against its manifest (`fwr verify`)
//! - **Replays**: run the upload processor or the deletion reconciler for a
//!   single object (`fwr process-upload`, `fwr reconcile-delete`)

pub mod commands;

use clap::{Parser, Subcommand};

/// fwr - firmware release pipeline tools
#[derive(Parser, Debug)]
#[command(name = "fwr")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a release archive locally without touching any store
    Verify {
        /// Path to the release zip
        archive: std::path::PathBuf,
    },

    /// Run the upload processor for one object under incoming/
    ProcessUpload {
        /// Defaults to S3_BUCKET
        #[arg(short, long)]
        bucket: Option<String>,

        /// Object key, e.g. incoming/release.zip
        #[arg(short, long)]
        key: String,
    },

    /// Mark the records of a deleted processed/ or errors/ object
    ReconcileDelete {
        /// Defaults to S3_BUCKET
        #[arg(short, long)]
        bucket: Option<String>,

        #[arg(short, long)]
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
