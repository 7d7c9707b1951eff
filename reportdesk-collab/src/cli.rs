use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI for the report builder's collaborative undo engine.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reportdesk-collab",
    about = "Batched collaborative undo/redo engine for the reportdesk report builder"
)]
pub struct Cli {
    /// Optional engine config file (YAML)
    #[arg(long, env = "REPORTDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Milliseconds of inactivity before a batch of edits closes
    #[arg(long, env = "REPORTDESK_BATCH_DELAY_MS")]
    pub batch_delay_ms: Option<u64>,

    /// Seconds without a heartbeat before a collaborator is dropped
    #[arg(long, env = "REPORTDESK_PRESENCE_TIMEOUT_SECS")]
    pub presence_timeout_secs: Option<u64>,

    /// Maximum number of undoable batches (0 = unbounded)
    #[arg(long, env = "REPORTDESK_MAX_UNDO_DEPTH")]
    pub max_undo_depth: Option<usize>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a scripted editing session and print the result as JSON
    Replay {
        /// Path to the JSON session script
        script: PathBuf,

        /// Print the batch history as JSON lines instead of the full report
        #[arg(long)]
        history_only: bool,
    },

    /// Print the effective engine configuration as YAML
    Config,
}
