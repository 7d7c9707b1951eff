//! Library entrypoint for reportdesk-collab: the batched, collaborative
//! undo/redo engine behind the report builder.
//!
//! Local keystrokes become [`reportdesk_types::Operation`]s
//! ([`text::derive`]), are grouped into time-windowed batches
//! ([`batcher`]), and land on a session-wide undo stack ([`undo`]) and an
//! append-only history ([`history`]). Remote edits arriving over the
//! broadcast [`channel`] rebase everything still stored for their field
//! ([`transform`]) before they are displayed. [`presence`] mirrors who else
//! is in the report. [`engine::CollabEngine`] ties these together and
//! [`driver`] hosts it on a tokio task.

pub mod batcher;
pub mod channel;
pub mod cli;
pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fields;
pub mod history;
pub mod presence;
pub mod replay;
pub mod text;
pub mod transform;
pub mod undo;

pub use engine::{CollabEngine, EngineEvent, RemoteEdit};
pub use error::{CollabError, Result};
pub use fields::FieldStore;
pub use reportdesk_types::{BatchId, CursorPosition, Operation, Origin, PeerId};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries the JSON report
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Run the CLI using args parsed by the caller.
pub fn run_with_cli(cli: cli::Cli) -> anyhow::Result<()> {
    init_tracing(cli.verbose)?;

    let config = EngineConfig::from_cli(&cli)?;
    match &cli.command {
        cli::Command::Replay {
            script,
            history_only,
        } => {
            let parsed = replay::Script::from_file(script)?;
            info!(script = %script.display(), steps = parsed.steps.len(), "replaying session");
            let report = replay::run_script(&parsed, &config)?;

            if *history_only {
                for record in &report.history {
                    println!("{}", serde_json::to_string(record)?);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        cli::Command::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }
    Ok(())
}
