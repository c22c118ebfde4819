//! # CLI Command Implementations
//!
//! Each subcommand of the `dsjanitor` command-line tool lives in its own
//! file, with:
//! - an `Args` struct that defines the command-specific arguments and
//!   options, derived using `clap`;
//! - an `execute` function that takes the parsed `Args` and calls into the
//!   `dsjanitor` library.
//!
//! Helpers shared by several commands are defined here.

pub mod exec;
pub mod refresh;
pub mod run;

use anyhow::{Context, Result};
use log::info;

use dsjanitor::config::RemoteSettings;
use dsjanitor::credential::Credential;
use dsjanitor::session::{SshSession, SshTarget};

/// Build an SSH session for `remote`.
///
/// The stored credential is used when present and its login matches
/// `remote.user` (or no user is configured). Otherwise the configured user
/// is used with key authentication.
pub fn ssh_session(remote: &RemoteSettings) -> Result<SshSession> {
    let host = remote
        .host
        .clone()
        .filter(|h| !h.trim().is_empty())
        .context("No remote host configured")?;

    let stored = Credential::load(&remote.credential_file).with_context(|| {
        format!(
            "Failed to load credential {}",
            remote.credential_file.display()
        )
    })?;

    let credential = match (stored, remote.user.as_deref()) {
        (Some(stored), None) => stored,
        (Some(stored), Some(user)) if stored.login == user => stored,
        (_, Some(user)) => Credential::new(user, ""),
        (None, None) => Credential::default(),
    };

    let target = SshTarget {
        host,
        port: remote.port,
        interactive: console::user_attended(),
    };
    info!("Remote host {}:{}", target.host, target.port);
    Ok(SshSession::new(target, credential))
}
