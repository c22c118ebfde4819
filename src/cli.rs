//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};

use dsjanitor::cancel::CancellationToken;

use crate::commands;

/// dsjanitor - Inventory and decommission unused datasets
#[derive(Parser, Debug)]
#[command(name = "dsjanitor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Refresh listings, select datasets, write reports and remove them
    Run(commands::run::RunArgs),

    /// Refresh cached directory listings only
    Refresh(commands::refresh::RefreshArgs),

    /// Run removal scripts on the remote host
    Exec(commands::exec::ExecArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self, cancel: &CancellationToken) -> Result<()> {
        init_logging(&self.log_level);

        match self.command {
            Commands::Run(args) => commands::run::execute(args, &self.color, cancel),
            Commands::Refresh(args) => commands::refresh::execute(args, &self.color, cancel),
            Commands::Exec(args) => commands::exec::execute(args, &self.color, cancel),
        }
    }
}

/// Route `log` records to stderr. `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A logger may already be installed, e.g. by a test harness
    let _ = env_logger::Builder::from_env(env)
        .format_target(false)
        .try_init();
}
