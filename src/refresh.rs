//! # Refresh Policy
//!
//! Decides which cached directory listings are stale and refetches them
//! before the catalog reads them.
//!
//! Every source directory has one cache file (see
//! [`path::cache_file_for`]). A cache file is stale when it is missing, or
//! when `now >= modified + threshold`. A threshold of zero marks every
//! directory stale.
//!
//! Stale directories are fetched concurrently on a bounded rayon pool. Each
//! fetch writes its own file, first to a `.part` sibling that is renamed into
//! place on success, so a failed fetch leaves the previous listing untouched.
//! A failed fetch is logged and does not stop the others.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use log::{error, info};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::defaults;
use crate::error::{Error, Result};
use crate::path;
use crate::session::RemoteSession;

/// Produces the listing of one source directory.
pub trait ListingFetcher: Sync {
    /// Called once before any concurrent fetch.
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Write the listing of `dir` into `destination`.
    fn fetch(&self, dir: &str, destination: &mut dyn Write) -> Result<()>;
}

/// Lists a directory of the local filesystem in `ls -lis` shape.
///
/// Lines look like
/// `00000 00 ---------- 1 dsadm dstage <size> <Mon d HH:MM> <dir><file>`, so
/// the default entry pattern reads them unchanged. As with `ls`, files
/// modified more than six months ago (or in the future) show the year
/// instead of the time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalListingFetcher;

impl ListingFetcher for LocalListingFetcher {
    fn fetch(&self, dir: &str, destination: &mut dyn Write) -> Result<()> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();
        let now = Local::now();
        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| Error::Io(e.into()))?;
            let modified: DateTime<Local> = metadata.modified()?.into();
            writeln!(
                destination,
                "00000 00 ---------- 1 dsadm dstage {} {} {}{}",
                metadata.len(),
                listing_timestamp(modified, now),
                dir,
                entry.file_name().to_string_lossy()
            )?;
        }
        Ok(())
    }
}

const RECENT_DAYS: i64 = 182;

fn listing_timestamp(modified: DateTime<Local>, now: DateTime<Local>) -> String {
    let recent = modified <= now && now - modified < chrono::Duration::days(RECENT_DAYS);
    if recent {
        modified.format("%b %e %H:%M").to_string()
    } else {
        modified.format("%b %e  %Y").to_string()
    }
}

/// Runs a listing command through the remote session.
pub struct RemoteListingFetcher<'a> {
    session: &'a dyn RemoteSession,
    template: String,
}

impl<'a> RemoteListingFetcher<'a> {
    /// `template` must contain `{dir}`, e.g. `ls -lis {dir}*`.
    pub fn new(session: &'a dyn RemoteSession, template: impl Into<String>) -> Self {
        Self {
            session,
            template: template.into(),
        }
    }

    pub fn command_for(&self, dir: &str) -> String {
        self.template.replace("{dir}", dir)
    }
}

impl ListingFetcher for RemoteListingFetcher<'_> {
    fn prepare(&self) -> Result<()> {
        if !self.session.is_open() {
            self.session.open()?;
        }
        Ok(())
    }

    fn fetch(&self, dir: &str, destination: &mut dyn Write) -> Result<()> {
        self.session.execute_to(&self.command_for(dir), destination)
    }
}

/// Staleness rule plus the worker pool that refetches stale listings.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    cache_dir: PathBuf,
    threshold: Duration,
    workers: usize,
}

impl RefreshPolicy {
    pub fn new(cache_dir: impl Into<PathBuf>, threshold_secs: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            threshold: Duration::from_secs(threshold_secs),
            workers: defaults::REFRESH_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_file(&self, dir: &str) -> PathBuf {
        path::cache_file_for(&self.cache_dir, dir)
    }

    /// Whether `file` must be refetched at `now`. The boundary is inclusive.
    pub fn is_stale(&self, file: &Path, now: SystemTime) -> bool {
        if self.threshold.is_zero() {
            return true;
        }
        match fs::metadata(file).and_then(|m| m.modified()) {
            Ok(modified) => now >= modified + self.threshold,
            Err(_) => true,
        }
    }

    /// Directories whose cache file is stale at `now`.
    pub fn stale_dirs<'d>(&self, dirs: &'d [String], now: SystemTime) -> Vec<&'d str> {
        dirs.iter()
            .map(String::as_str)
            .filter(|dir| self.is_stale(&self.cache_file(dir), now))
            .collect()
    }

    /// Refetch stale listings and return the cache file of every directory.
    ///
    /// Returned files may be missing when their first fetch failed; the
    /// catalog skips those.
    pub fn refresh(
        &self,
        dirs: &[String],
        fetcher: &dyn ListingFetcher,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        let stale = self.stale_dirs(dirs, SystemTime::now());
        info!(
            "{} of {} listing(s) need a refresh",
            stale.len(),
            dirs.len()
        );

        if !stale.is_empty() {
            fetcher.prepare()?;

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .build()
                .map_err(|e| Error::ThreadPool {
                    message: e.to_string(),
                })?;

            pool.install(|| {
                stale.par_iter().for_each(|dir| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let file = self.cache_file(dir);
                    match fetch_into(fetcher, dir, &file) {
                        Ok(()) => info!("Listing for {} saved to {}", dir, file.display()),
                        Err(e) => error!("Failed to refresh listing for {}: {}", dir, e),
                    }
                });
            });
            cancel.check()?;
        }

        Ok(dirs.iter().map(|dir| self.cache_file(dir)).collect())
    }
}

fn fetch_into(fetcher: &dyn ListingFetcher, dir: &str, file: &Path) -> Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut partial = file.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    match write_listing(fetcher, dir, &partial) {
        Ok(()) => {
            fs::rename(&partial, file)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e)
        }
    }
}

fn write_listing(fetcher: &dyn ListingFetcher, dir: &str, file: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(file)?);
    fetcher.fetch(dir, &mut writer)?;
    writer.flush()?;
    Ok(())
}
