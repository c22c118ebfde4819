//! # Execution Engine
//!
//! Runs removal commands against a [`RemoteSession`] on a bounded worker
//! pool, then retries failures once, sequentially.
//!
//! ## Run states
//!
//! ```text
//! Idle → OpeningSession → Executing → RetryingFailed → Closed
//!                             │
//!                             └──────────────────────→ Closed
//! ```
//!
//! The short path is taken on a non-recoverable error or an interruption:
//! no retry pass runs, and every command that never ran is reported.
//!
//! ## Error handling
//!
//! A command failing with a session-level error ([`Error::is_session_error`])
//! is recorded for the retry pass. Any other error stops the pool: commands
//! that have not started yet are skipped and no retry pass runs.
//!
//! ## Command sources
//!
//! Commands come from a [`CommandSource`] in batches. [`InlineCommands`]
//! hands over an in-memory list at once; [`ScriptFileCommands`] streams
//! bash scripts written by the script builder, one `#--` block per command.
//! Each batch, including its retry pass, finishes before the next one is
//! read.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::defaults::{self, BLOCK_MARKER};
use crate::error::{Error, Result};
use crate::session::RemoteSession;

/// Supplies commands in bounded batches. An empty batch means exhausted.
pub trait CommandSource {
    fn next_batch(&mut self) -> Result<Vec<String>>;
}

/// An in-memory command list, delivered as one batch.
#[derive(Debug, Clone, Default)]
pub struct InlineCommands {
    commands: Vec<String>,
}

impl InlineCommands {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

impl CommandSource for InlineCommands {
    fn next_batch(&mut self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut self.commands))
    }
}

/// Commands read back from script files.
///
/// Lines between two `#--` markers form one command, joined with spaces.
/// Other lines starting with `#` are comments. Lines after the last marker
/// (the `echo` trailer of a generated script) are not commands and are
/// dropped. Missing files are skipped with a warning.
#[derive(Debug)]
pub struct ScriptFileCommands {
    files: VecDeque<PathBuf>,
    reader: Option<BufReader<File>>,
    batch_size: usize,
}

impl ScriptFileCommands {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files: files.into(),
            reader: None,
            batch_size: defaults::BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn open_next(&mut self) -> Result<bool> {
        while let Some(file) = self.files.pop_front() {
            match File::open(&file) {
                Ok(handle) => {
                    info!("Reading commands from {}", file.display());
                    self.reader = Some(BufReader::new(handle));
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("No file: {}", file.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }
}

impl CommandSource for ScriptFileCommands {
    fn next_batch(&mut self) -> Result<Vec<String>> {
        let mut batch = Vec::new();
        loop {
            if self.reader.is_none() && !self.open_next()? {
                return Ok(batch);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(batch);
            };

            let mut block: Vec<String> = Vec::new();
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line)? == 0 {
                    if !block.is_empty() {
                        debug!("Ignoring unterminated block: {}", block.join(" "));
                    }
                    self.reader = None;
                    break;
                }
                let trimmed = line.trim();
                if trimmed == BLOCK_MARKER {
                    flush_block(&mut block, &mut batch);
                    if batch.len() >= self.batch_size {
                        return Ok(batch);
                    }
                } else if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    block.push(trimmed.to_string());
                }
            }

            if !batch.is_empty() {
                return Ok(batch);
            }
        }
    }
}

fn flush_block(block: &mut Vec<String>, batch: &mut Vec<String>) {
    if !block.is_empty() {
        batch.push(block.join(" "));
        block.clear();
    }
}

/// Lifecycle of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    OpeningSession,
    Executing,
    RetryingFailed,
    Closed,
}

/// Outcome of [`ExecutionEngine::run`].
#[derive(Debug)]
pub struct ExecutionReport {
    /// Commands that succeeded, on the first pass or on retry.
    pub completed: usize,
    /// Commands recorded as failed during a concurrent pass.
    pub failed: Vec<String>,
    /// Retry attempts made.
    pub retried: usize,
    /// Commands that failed again on retry.
    pub dropped: Vec<String>,
    /// Commands skipped because the run was stopped.
    pub not_executed: Vec<String>,
    pub interrupted: bool,
    /// The non-recoverable error that stopped the run, if any.
    pub aborted: Option<Error>,
    /// States passed through, in order.
    pub states: Vec<RunState>,
}

impl ExecutionReport {
    fn new() -> Self {
        Self {
            completed: 0,
            failed: Vec::new(),
            retried: 0,
            dropped: Vec::new(),
            not_executed: Vec::new(),
            interrupted: false,
            aborted: None,
            states: vec![RunState::Idle],
        }
    }

    fn enter(&mut self, state: RunState) {
        if self.states.last() != Some(&state) {
            self.states.push(state);
        }
    }

    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    /// Whether the retry pass ran at least once.
    pub fn retry_pass_ran(&self) -> bool {
        self.states.contains(&RunState::RetryingFailed)
    }
}

/// Result of one concurrent pass.
#[derive(Debug, Default)]
struct PassOutcome {
    completed: usize,
    failed: Vec<String>,
    skipped: Vec<String>,
    aborted: Option<Error>,
}

/// Executes command batches against a shared session.
pub struct ExecutionEngine<'s> {
    session: &'s dyn RemoteSession,
    threads: usize,
    progress: Option<ProgressBar>,
}

impl<'s> ExecutionEngine<'s> {
    pub fn new(session: &'s dyn RemoteSession, threads: usize) -> Self {
        Self {
            session,
            threads: threads.max(1),
            progress: None,
        }
    }

    /// Show a progress bar on stderr while commands run.
    pub fn with_progress(mut self) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.progress = Some(bar);
        self
    }

    /// Open the session if needed, run every batch and close the session.
    ///
    /// Only a failure to open the session or to read the source is returned
    /// as `Err`; command failures and interruptions are in the report.
    pub fn run(
        &self,
        source: &mut dyn CommandSource,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::new();
        info!("Run executor in {} thread(s)", self.threads);

        report.enter(RunState::OpeningSession);
        if !self.session.is_open() {
            self.session.open()?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("executor-{}", i + 1))
            .build()
            .map_err(|e| Error::ThreadPool {
                message: e.to_string(),
            })?;

        let result = self.run_batches(&pool, source, cancel, &mut report);

        report.enter(RunState::Closed);
        if let Err(e) = self.session.close() {
            warn!("Error closing session: {}", e);
        }
        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        result?;

        if report.interrupted {
            info!("Script execution interrupted manually");
        }
        info!(
            "Script execution finished. Commands completed: {}",
            report.completed
        );
        Ok(report)
    }

    fn run_batches(
        &self,
        pool: &rayon::ThreadPool,
        source: &mut dyn CommandSource,
        cancel: &CancellationToken,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                report.interrupted = true;
                return drain(source, report);
            }
            let batch = source.next_batch()?;
            if batch.is_empty() {
                return Ok(());
            }

            report.enter(RunState::Executing);
            if let Some(bar) = &self.progress {
                bar.inc_length(batch.len() as u64);
            }
            let outcome = self.execute_pass(pool, &batch, cancel);
            report.completed += outcome.completed;
            report.failed.extend(outcome.failed.iter().cloned());

            if outcome.aborted.is_some() || cancel.is_cancelled() {
                report.interrupted = cancel.is_cancelled();
                report.aborted = outcome.aborted;
                report.not_executed.extend(outcome.skipped);
                report.not_executed.extend(outcome.failed);
                return drain(source, report);
            }

            self.retry_failed(outcome.failed, report);
        }
    }

    /// Run a batch concurrently. Workers only touch the atomics and the
    /// mutex-guarded lists.
    fn execute_pass(
        &self,
        pool: &rayon::ThreadPool,
        batch: &[String],
        cancel: &CancellationToken,
    ) -> PassOutcome {
        let completed = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);
        let failed = Mutex::new(Vec::new());
        let skipped = Mutex::new(Vec::new());
        let aborted: Mutex<Option<Error>> = Mutex::new(None);

        pool.scope_fifo(|scope| {
            for command in batch {
                let (completed, stop, failed, skipped, aborted) =
                    (&completed, &stop, &failed, &skipped, &aborted);
                scope.spawn_fifo(move |_| {
                    if stop.load(Ordering::SeqCst) || cancel.is_cancelled() {
                        push(skipped, command.clone());
                        return;
                    }
                    match self.session.execute(command) {
                        Ok(_) => {
                            completed.fetch_add(1, Ordering::SeqCst);
                            if let Some(bar) = &self.progress {
                                bar.inc(1);
                            }
                        }
                        Err(e) if e.is_session_error() => {
                            warn!("Command failed: {} | {}", command, e);
                            push(failed, command.clone());
                        }
                        // Only session errors are retried; anything else stops
                        // the pass. Open for review whether these should retry too.
                        Err(e) => {
                            error!("Error executing command: {} | {}", command, e);
                            stop.store(true, Ordering::SeqCst);
                            let mut slot = aborted.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                        }
                    }
                });
            }
        });

        PassOutcome {
            completed: completed.into_inner(),
            failed: failed.into_inner().unwrap_or_else(PoisonError::into_inner),
            skipped: skipped.into_inner().unwrap_or_else(PoisonError::into_inner),
            aborted: aborted.into_inner().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// One sequential attempt per failed command.
    fn retry_failed(&self, failed: Vec<String>, report: &mut ExecutionReport) {
        if failed.is_empty() {
            return;
        }
        report.enter(RunState::RetryingFailed);
        info!("Try to execute {} failed command(s)", failed.len());
        for command in failed {
            report.retried += 1;
            match self.session.execute(&command) {
                Ok(_) => {
                    report.completed += 1;
                    if let Some(bar) = &self.progress {
                        bar.inc(1);
                    }
                }
                Err(e) => {
                    error!("Error executing command: {} | {}", command, e);
                    report.dropped.push(command);
                }
            }
        }
    }
}

/// List the commands a stopped run never read.
fn drain(source: &mut dyn CommandSource, report: &mut ExecutionReport) -> Result<()> {
    loop {
        let batch = source.next_batch()?;
        if batch.is_empty() {
            return Ok(());
        }
        report.not_executed.extend(batch);
    }
}

fn push(list: &Mutex<Vec<String>>, command: String) {
    list.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(command);
}

/// Outcome of [`remove_local`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemovalReport {
    pub removed: usize,
    pub missing: usize,
    pub failed: Vec<PathBuf>,
}

/// Delete every path of every dataset from the local filesystem in parallel.
///
/// Paths that are already gone are counted as missing; other failures are
/// logged and listed.
pub fn remove_local(datasets: &[&Dataset], cancel: &CancellationToken) -> Result<RemovalReport> {
    let paths: Vec<PathBuf> = datasets
        .iter()
        .flat_map(|d| d.targets())
        .map(PathBuf::from)
        .collect();
    info!("Removing {} local file(s)", paths.len());

    let removed = AtomicUsize::new(0);
    let missing = AtomicUsize::new(0);
    let failed = Mutex::new(Vec::new());

    paths.par_iter().for_each(|path| {
        if cancel.is_cancelled() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                removed.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                missing.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                error!("Cannot remove {}: {}", path.display(), e);
                failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(path.clone());
            }
        }
    });
    cancel.check()?;

    Ok(RemovalReport {
        removed: removed.into_inner(),
        missing: missing.into_inner(),
        failed: failed.into_inner().unwrap_or_else(PoisonError::into_inner),
    })
}
