//! # Refresh Command Implementation
//!
//! The `refresh` subcommand only brings the listing cache up to date: stale
//! listings are refetched (locally or through the remote session) and the
//! cache file of every source directory is printed.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use dsjanitor::cancel::CancellationToken;
use dsjanitor::config::{Mode, Overrides, RunPlan, Settings};
use dsjanitor::defaults;
use dsjanitor::output::{emoji, OutputConfig};
use dsjanitor::refresh::{ListingFetcher, LocalListingFetcher, RefreshPolicy, RemoteListingFetcher};

/// Refresh cached directory listings
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Path to the configuration file (default: ./dsjanitor.yaml when present)
    #[arg(short, long, value_name = "PATH", env = "DSJANITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// List the local filesystem instead of a remote host
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
    pub now: bool,

    /// Concurrent listing fetches
    #[arg(long, value_name = "N", default_value_t = defaults::REFRESH_WORKERS)]
    pub workers: usize,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the `refresh` command.
pub fn execute(args: RefreshArgs, color_flag: &str, cancel: &CancellationToken) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let cwd = std::env::current_dir().context("Failed to get current directory")?;

    let settings = Settings::locate(args.config.as_deref(), &cwd)?;
    let plan = RunPlan::resolve(
        settings,
        Overrides {
            local: args.local,
            descriptor_dirs: args.descriptors,
            data_dirs: args.data,
            cache_dir: args.cache_dir,
            host: args.host,
            port: args.port,
            user: args.user,
            refresh_now: args.now,
            ..Overrides::default()
        },
    )?;

    let session = match plan.flow.mode {
        Mode::Remote => Some(super::ssh_session(&plan.remote)?),
        Mode::Local => None,
    };
    let remote_fetcher = session
        .as_ref()
        .map(|s| RemoteListingFetcher::new(s, plan.remote.listing_command.clone()));
    let fetcher: &dyn ListingFetcher = match &remote_fetcher {
        Some(fetcher) => fetcher,
        None => &LocalListingFetcher,
    };

    let policy = RefreshPolicy::new(&plan.cache_dir, plan.refresh_threshold_secs)
        .with_workers(args.workers);
    let refreshed = policy.refresh(&plan.all_dirs(), fetcher, cancel);

    let files = match refreshed {
        Ok(files) => files,
        Err(e) if e.is_interrupted() => {
            if !args.quiet {
                println!("{} Refresh interrupted", emoji(&out, "⚠️", "[WARN]"));
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !args.quiet {
        for file in &files {
            let marker = if file.is_file() {
                emoji(&out, "📄", "[OK]")
            } else {
                emoji(&out, "❌", "[MISSING]")
            };
            println!("{} {}", marker, file.display());
        }
    }
    Ok(())
}
