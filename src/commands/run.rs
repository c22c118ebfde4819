//! # Run Command Implementation
//!
//! The `run` subcommand executes the whole pipeline: refresh listings, build
//! the catalog, select and group datasets, write reports and the removal
//! script, and optionally remove the selection.
//!
//! Without `--execute` or `--execute-file` nothing is removed, so a plain
//! `dsjanitor run --write-csv` is a safe inventory.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use dsjanitor::cancel::CancellationToken;
use dsjanitor::config::{Mode, Overrides, RunPlan, Selection, Settings};
use dsjanitor::output::{emoji, summary_lines, OutputConfig};
use dsjanitor::pipeline::{execute_run, Outcome, RunContext};
use dsjanitor::refresh::{ListingFetcher, LocalListingFetcher, RemoteListingFetcher};
use dsjanitor::session::RemoteSession;

/// Inventory datasets and remove the unused ones
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file (default: ./dsjanitor.yaml when present)
    #[arg(short, long, value_name = "PATH", env = "DSJANITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// List and remove on the local filesystem instead of a remote host
    #[arg(long)]
    pub local: bool,

    /// Descriptor directories (comma separated)
    #[arg(long, value_name = "DIRS", value_delimiter = ',')]
    pub descriptors: Option<Vec<String>>,

    /// Data directories (comma separated)
    #[arg(long, value_name = "DIRS", value_delimiter = ',')]
    pub data: Option<Vec<String>>,

    /// Directory holding cached listings
    #[arg(long, value_name = "DIR", env = "DSJANITOR_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Directory for CSV reports and scripts
    #[arg(long, value_name = "DIR")]
    pub result_dir: Option<PathBuf>,

    /// Remote host
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Remote SSH port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Remote login
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Refetch every listing regardless of its age
    #[arg(long)]
    pub refresh_now: bool,

    /// Keep datasets whose full name matches RE; without a value the
    /// configured `regex` is used
    #[arg(long, value_name = "RE", num_args = 0..=1, require_equals = true)]
    pub regexp: Option<Option<String>>,

    /// Keep datasets last used more than N days ago
    #[arg(long, value_name = "N")]
    pub validity_period: Option<i64>,

    /// Keep only datasets without a descriptor
    #[arg(long, conflicts_with = "full")]
    pub orphans: bool,

    /// Keep only datasets with a descriptor
    #[arg(long)]
    pub full: bool,

    /// Do not apply the configured exception patterns
    #[arg(long)]
    pub ignore_exceptions: bool,

    /// Keep only datasets named in the configured filter list
    #[arg(long)]
    pub use_filter: bool,

    /// Write datasets.csv and groups.csv into the result directory
    #[arg(long)]
    pub write_csv: bool,

    /// Write the removal script into the result directory
    #[arg(long)]
    pub write_script: bool,

    /// Remove the selected datasets
    #[arg(long)]
    pub execute: bool,

    /// Write the removal script and run it remotely in batches
    #[arg(long, conflicts_with = "local")]
    pub execute_file: bool,

    /// Worker threads for remote execution
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Commands per batch with --execute-file
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Save the login used for the remote session to the credential file
    #[arg(long)]
    pub save_user: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        let selection = if self.orphans {
            Selection::Orphans
        } else if self.full {
            Selection::Full
        } else {
            Selection::All
        };
        Overrides {
            local: self.local,
            descriptor_dirs: self.descriptors.clone(),
            data_dirs: self.data.clone(),
            cache_dir: self.cache_dir.clone(),
            result_dir: self.result_dir.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            refresh_now: self.refresh_now,
            regexp: self.regexp.clone(),
            validity_period_days: self.validity_period,
            selection,
            ignore_exceptions: self.ignore_exceptions,
            use_filter: self.use_filter,
            write_csv: self.write_csv,
            write_script: self.write_script,
            execute: self.execute,
            execute_file: self.execute_file,
            threads: self.threads,
            batch_size: self.batch_size,
            save_user: self.save_user,
        }
    }
}

/// Execute the `run` command.
pub fn execute(args: RunArgs, color_flag: &str, cancel: &CancellationToken) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let settings = Settings::locate(args.config.as_deref(), &cwd)?;
    let plan = RunPlan::resolve(settings, args.overrides())?;

    if !args.quiet {
        let target = match plan.flow.mode {
            Mode::Local => "local filesystem".to_string(),
            Mode::Remote => plan.remote.host.clone().unwrap_or_default(),
        };
        println!(
            "{} Scanning {} source director(ies) on {}",
            emoji(&out, "🔍", "[SCAN]"),
            plan.descriptor_dirs.len() + plan.data_dirs.len(),
            target
        );
        if !plan.flow.execute {
            println!(
                "{} DRY RUN - nothing will be removed",
                emoji(&out, "🔎", "[DRY]")
            );
        }
    }

    let session = match plan.flow.mode {
        Mode::Remote => Some(super::ssh_session(&plan.remote)?),
        Mode::Local => None,
    };

    if let (Some(session), true) = (&session, plan.save_user) {
        session.open()?;
        let file = session
            .credential()?
            .save(&plan.remote.credential_file)
            .context("Failed to save credential")?;
        if !args.quiet {
            println!(
                "{} Credential saved to {}",
                emoji(&out, "🔑", "[KEY]"),
                file.display()
            );
        }
    }

    let remote_fetcher = session
        .as_ref()
        .map(|s| RemoteListingFetcher::new(s, plan.remote.listing_command.clone()));
    let fetcher: &dyn ListingFetcher = match &remote_fetcher {
        Some(fetcher) => fetcher,
        None => &LocalListingFetcher,
    };

    let context = RunContext {
        fetcher,
        session: session.as_ref().map(|s| s as &dyn RemoteSession),
        cancel,
        progress: !args.quiet,
    };
    let summary = execute_run(&plan, &context);

    if !args.quiet {
        println!();
        for line in summary_lines(&out, &summary) {
            println!("{}", line);
        }
    }

    match summary.outcome {
        Outcome::Failed(e) => Err(e.into()),
        Outcome::Finished | Outcome::Interrupted => Ok(()),
    }
}
