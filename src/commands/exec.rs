//! # Exec Command Implementation
//!
//! The `exec` subcommand runs removal scripts written by an earlier
//! `run --write-script` on the remote host. Scripts are read back in batches
//! of `#--` blocks; each batch finishes, including its retry pass, before the
//! next one is read.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;

use dsjanitor::cancel::CancellationToken;
use dsjanitor::config::Settings;
use dsjanitor::execution::{ExecutionEngine, ScriptFileCommands};
use dsjanitor::output::{emoji, OutputConfig};

/// Run removal scripts on the remote host
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Script files to run, in order
    #[arg(required = true, value_name = "SCRIPT")]
    pub scripts: Vec<PathBuf>,

    /// Path to the configuration file (default: ./dsjanitor.yaml when present)
    #[arg(short, long, value_name = "PATH", env = "DSJANITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remote host
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Remote SSH port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Remote login
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Worker threads
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Commands per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `exec` command.
pub fn execute(args: ExecArgs, color_flag: &str, cancel: &CancellationToken) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    if let Some(missing) = args.scripts.iter().find(|script| !script.is_file()) {
        bail!("Script file not found: {}", missing.display());
    }

    let settings = Settings::locate(args.config.as_deref(), &cwd)?;
    let mut remote = settings.remote;
    if args.host.is_some() {
        remote.host = args.host;
    }
    if let Some(port) = args.port {
        remote.port = port;
    }
    if args.user.is_some() {
        remote.user = args.user;
    }
    let threads = args.threads.unwrap_or(settings.threads).max(1);
    let batch_size = args.batch_size.unwrap_or(settings.batch_size).max(1);

    let session = super::ssh_session(&remote)?;
    let mut engine = ExecutionEngine::new(&session, threads);
    if !args.quiet {
        println!(
            "{} Running {} script(s) in {} thread(s)",
            emoji(&out, "🚀", "[EXEC]"),
            args.scripts.len(),
            threads
        );
        engine = engine.with_progress();
    }

    let mut source = ScriptFileCommands::new(args.scripts).with_batch_size(batch_size);
    let report = engine.run(&mut source, cancel)?;

    if !args.quiet {
        println!("   Commands completed: {}", report.completed);
        println!("   Commands retried:   {}", report.retried);
        println!("   Commands failed:    {}", report.dropped.len());
        for command in &report.dropped {
            println!("     failed: {}", command);
        }
        for command in &report.not_executed {
            println!("     not executed: {}", command);
        }
        if report.interrupted {
            println!("{} Execution interrupted", emoji(&out, "⚠️", "[WARN]"));
        }
    }

    match report.aborted {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
