use clap::{Parser, Subcommand};
use font_triage_core::Verdict;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "font-triage")]
#[command(about = "Triage incoming fonts against a reference library", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build the reference index from the configured reference root
    BuildIndex {
        /// Rebuild from the root recorded by the last build instead
        #[arg(long)]
        rebuild: bool,
    },
    /// Show metadata of the committed reference index
    IndexInfo,
    /// Scan candidate roots, classify and print family groups
    Triage {
        /// Only count and list members with these verdicts (repeatable)
        #[arg(long, value_name = "VERDICT")]
        verdict: Vec<Verdict>,
        /// List every member with its match level and deltas
        #[arg(long)]
        details: bool,
    },
    /// Queue a rename of a candidate file within its directory
    QueueRename { path: PathBuf, name: String },
    /// Queue a candidate file for removal into the staging directory
    QueueRemove { path: PathBuf },
    /// Cancel every pending intent for a candidate file
    Cancel { path: PathBuf },
    /// List pending intents
    Pending,
    /// Apply all pending intents
    Apply {
        /// Ask before writing into each directory
        #[arg(long)]
        confirm: bool,
    },
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
