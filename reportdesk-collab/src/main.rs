//! reportdesk-collab: replay and inspect collaborative editing sessions.

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = reportdesk_collab::cli::Cli::parse();
    reportdesk_collab::run_with_cli(cli)
}
