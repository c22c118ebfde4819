//! # dsjanitor CLI
//!
//! Binary entry point for the `dsjanitor` command-line tool.
//!
//! It parses arguments with `clap`, wires Ctrl-C to a shared cancellation
//! token, and runs the selected command. The pipeline itself lives in the
//! library crate; the binary is a thin wrapper around it.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use dsjanitor::cancel::CancellationToken;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupt received, stopping after the current step");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    cli.execute(&cancel)
}
