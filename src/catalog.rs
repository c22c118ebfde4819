//! # Catalog
//!
//! Accumulates parsed listing lines from many files into one deduplicated map
//! of datasets keyed by name. Inserting a name that is already present merges
//! the new record into the existing entry instead of replacing it.
//!
//! Ingestion takes `&mut self`, so callers serialise it (listing files are
//! read one at a time). Once ingestion is done the catalog is only read and
//! can be shared across threads by reference.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::{iter, str};

use log::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::parser::EntryParser;
use crate::units;

/// Counters for one ingestion call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read.
    pub lines: usize,
    /// Lines that produced a well-formed dataset record.
    pub accepted: usize,
    /// Records that were merged into an existing dataset.
    pub merged: usize,
}

impl IngestStats {
    fn absorb(&mut self, other: IngestStats) {
        self.lines += other.lines;
        self.accepted += other.accepted;
        self.merged += other.merged;
    }
}

/// Name → dataset map built from listing files.
#[derive(Debug)]
pub struct Catalog {
    parser: EntryParser,
    datasets: BTreeMap<String, Dataset>,
}

impl Catalog {
    pub fn new(parser: EntryParser) -> Self {
        Self {
            parser,
            datasets: BTreeMap::new(),
        }
    }

    /// Parse and merge every line.
    ///
    /// Malformed lines are dropped. The cancellation token is checked before
    /// each line; on cancellation the call returns `Error::Interrupted` and
    /// everything ingested so far stays in the catalog.
    pub fn ingest<I, S>(
        &mut self,
        lines: I,
        is_descriptor: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stats = IngestStats::default();
        for line in lines {
            cancel.check()?;
            stats.lines += 1;

            let record = self.parser.parse(line.as_ref(), is_descriptor)?;
            if !record.is_well_formed() {
                debug!("Skipping listing line: {}", line.as_ref());
                continue;
            }
            stats.accepted += 1;

            match self.datasets.get_mut(record.name()) {
                Some(existing) => {
                    existing.merge(&record);
                    stats.merged += 1;
                }
                None => {
                    self.datasets.insert(record.name().to_string(), record);
                }
            }
        }
        Ok(stats)
    }

    /// Ingest listing cache files one after another.
    ///
    /// A missing file (for instance after a failed fetch) is logged and
    /// skipped.
    pub fn ingest_files<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        is_descriptor: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestStats> {
        let mut total = IngestStats::default();
        for file in files {
            let file = file.as_ref();
            if !file.is_file() {
                warn!("Listing file not found, skipping: {}", file.display());
                continue;
            }
            info!("Collecting datasets from file {}", file.display());
            let mut reader = BufReader::new(File::open(file)?);
            let mut buf = Vec::new();
            let mut read_error = None;
            let lines = iter::from_fn(|| loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => return None,
                    Ok(_) => match str::from_utf8(&buf) {
                        Ok(line) => return Some(line.trim_end_matches(['\n', '\r']).to_string()),
                        // Not a name the parser could match; malformed like any other.
                        Err(_) => debug!("Skipping non UTF-8 listing line in {}", file.display()),
                    },
                    Err(e) => {
                        read_error = Some(e);
                        return None;
                    }
                }
            });
            let stats = self.ingest(lines, is_descriptor, cancel)?;
            if let Some(e) = read_error {
                return Err(e.into());
            }
            total.absorb(stats);
        }
        info!(
            "Common datasets count: {} | {}",
            self.len(),
            units::format_gb(self.total_size())
        );
        Ok(total)
    }

    /// Snapshot of every dataset. Callers must not rely on the order.
    pub fn all_datasets(&self) -> Vec<&Dataset> {
        self.datasets.values().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Dataset> {
        self.datasets.get(name)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Sum of every dataset's size in bytes.
    pub fn total_size(&self) -> u64 {
        self.datasets.values().map(Dataset::size).sum()
    }
}
