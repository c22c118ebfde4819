//! Orchestrator for a complete `run`
//!
//! Coordinates the stages of one run against a resolved [`RunPlan`]:
//! 1. Refresh stale listing cache files
//! 2. Build the catalog (descriptor listings first, then data listings)
//! 3. Select datasets through the filter pipeline
//! 4. Collapse the selection into groups
//! 5. Write CSV reports and the removal script when requested
//! 6. Execute removals, locally or through the remote session
//!
//! The run never ends without a [`RunSummary`]. A stage that fails or is
//! interrupted stops the stages after it, and the summary records what was
//! done up to that point.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::cancel::CancellationToken;
use crate::catalog::Catalog;
use crate::config::{Mode, RunPlan, Selection};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::execution::{
    remove_local, CommandSource, ExecutionEngine, InlineCommands, ScriptFileCommands,
};
use crate::filter::FilterPipeline;
use crate::group::collect_groups;
use crate::parser::EntryParser;
use crate::path;
use crate::refresh::{ListingFetcher, RefreshPolicy};
use crate::report;
use crate::script::Script;
use crate::session::RemoteSession;

/// How a run ended.
#[derive(Debug, Default)]
pub enum Outcome {
    #[default]
    Finished,
    Interrupted,
    Failed(Error),
}

/// Counts and files produced by one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub collected: usize,
    pub collected_bytes: u64,
    pub selected: usize,
    pub selected_bytes: u64,
    pub groups: usize,
    pub reports: Vec<PathBuf>,
    pub script: Option<PathBuf>,
    /// Whether removal was attempted at all.
    pub executed: bool,
    pub completed: usize,
    /// Commands (or local paths) that still failed after the retry pass.
    pub failed: Vec<String>,
    pub not_executed: Vec<String>,
    pub outcome: Outcome,
}

impl RunSummary {
    pub fn is_interrupted(&self) -> bool {
        matches!(self.outcome, Outcome::Interrupted)
    }

    /// Log the summary counts at info level.
    pub fn log(&self) {
        info!(
            "Datasets collected: {} | {}",
            self.collected,
            crate::units::format_gb(self.collected_bytes)
        );
        info!(
            "Datasets selected: {} | {}",
            self.selected,
            crate::units::format_gb(self.selected_bytes)
        );
        info!("Groups: {}", self.groups);
        if self.executed {
            info!(
                "Commands completed: {}, failed: {}, not executed: {}",
                self.completed,
                self.failed.len(),
                self.not_executed.len()
            );
        }
        for command in &self.failed {
            warn!("Failed: {}", command);
        }
        for command in &self.not_executed {
            warn!("Not executed: {}", command);
        }
    }
}

/// Collaborators a run talks to.
pub struct RunContext<'a> {
    pub fetcher: &'a dyn ListingFetcher,
    /// Required when the plan executes in remote mode.
    pub session: Option<&'a dyn RemoteSession>,
    pub cancel: &'a CancellationToken,
    pub progress: bool,
}

/// Execute every stage of `plan` and summarise the run.
pub fn execute_run(plan: &RunPlan, context: &RunContext<'_>) -> RunSummary {
    let mut summary = RunSummary::default();
    let now = Local::now().naive_local();
    if let Err(e) = run_stages(plan, context, now, &mut summary) {
        summary.outcome = if e.is_interrupted() {
            Outcome::Interrupted
        } else {
            Outcome::Failed(e)
        };
    }
    summary.log();
    summary
}

fn run_stages(
    plan: &RunPlan,
    context: &RunContext<'_>,
    now: NaiveDateTime,
    summary: &mut RunSummary,
) -> Result<()> {
    let cancel = context.cancel;

    // Stage 1: Refresh
    let policy = RefreshPolicy::new(&plan.cache_dir, plan.refresh_threshold_secs);
    policy.refresh(&plan.all_dirs(), context.fetcher, cancel)?;
    let descriptor_files: Vec<PathBuf> = plan
        .descriptor_dirs
        .iter()
        .map(|dir| policy.cache_file(dir))
        .collect();
    let data_files: Vec<PathBuf> = plan
        .data_dirs
        .iter()
        .map(|dir| policy.cache_file(dir))
        .collect();

    // Stage 2: Catalog
    let mut catalog = Catalog::new(EntryParser::new(&plan.parser)?);
    catalog.ingest_files(&descriptor_files, true, cancel)?;
    catalog.ingest_files(&data_files, false, cancel)?;
    summary.collected = catalog.len();
    summary.collected_bytes = catalog.total_size();

    // Stage 3: Filter
    let mut selected = select(plan, catalog.all_datasets(), now);
    selected.sort();
    summary.selected = selected.len();
    summary.selected_bytes = selected.iter().map(|d| d.size()).sum();

    // Stage 4: Groups
    let groups = collect_groups(&selected, cancel)?;
    summary.groups = groups.len();

    // Stage 5: Outputs
    if plan.write_csv {
        let datasets_csv = plan.result_dir.join(report::DATASETS_FILE_NAME);
        if let Some(file) = report::write_datasets_csv(&datasets_csv, &selected)? {
            summary.reports.push(file);
        }
        let groups_csv = plan.result_dir.join(report::GROUPS_FILE_NAME);
        if let Some(file) = report::write_groups_csv(&groups_csv, &groups)? {
            summary.reports.push(file);
        }
    }

    let script = Script::new(&selected, &plan.script.prefix, &plan.script.postfix);
    if plan.write_script && !script.is_empty() {
        let sources = if descriptor_files.is_empty() {
            &data_files
        } else {
            &descriptor_files
        };
        let file = plan
            .scripts_dir()
            .join(format!("rm_{}.sh", path::script_name(sources)));
        summary.script = Some(script.write_bash(&file)?);
    }

    // Stage 6: Execute
    if plan.flow.execute {
        execute(plan, context, &selected, &script, summary)?;
    }
    Ok(())
}

fn select<'a>(plan: &RunPlan, datasets: Vec<&'a Dataset>, now: NaiveDateTime) -> Vec<&'a Dataset> {
    let mut pipeline = FilterPipeline::new(datasets, now);
    if let Some(days) = plan.validity_period_days {
        pipeline = pipeline.expired(days);
    }
    pipeline
        .not_in(&plan.exceptions)
        .matched(plan.regex.as_ref())
        .only_in(&plan.filter_list)
        .orphans(plan.selection == Selection::Orphans)
        .full(plan.selection == Selection::Full)
        .collect()
}

fn execute(
    plan: &RunPlan,
    context: &RunContext<'_>,
    selected: &[&Dataset],
    script: &Script,
    summary: &mut RunSummary,
) -> Result<()> {
    if script.is_empty() {
        info!("Nothing to execute");
        return Ok(());
    }
    summary.executed = true;

    match plan.flow.mode {
        Mode::Local => {
            let removal = remove_local(selected, context.cancel)?;
            summary.completed = removal.removed;
            summary.failed = removal
                .failed
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            info!(
                "Removed {} file(s), {} already missing",
                removal.removed, removal.missing
            );
            Ok(())
        }
        Mode::Remote => {
            let session = context.session.ok_or_else(|| Error::Config {
                message: "remote execution requested without a session".to_string(),
                hint: None,
            })?;
            let mut source: Box<dyn CommandSource> = match (&summary.script, plan.flow.from_file) {
                (Some(file), true) => Box::new(
                    ScriptFileCommands::new(vec![file.clone()]).with_batch_size(plan.batch_size),
                ),
                _ => Box::new(InlineCommands::new(script.inline_commands())),
            };

            let mut engine = ExecutionEngine::new(session, plan.threads);
            if context.progress {
                engine = engine.with_progress();
            }
            let report = engine.run(source.as_mut(), context.cancel)?;
            summary.completed = report.completed;
            summary.failed = report.dropped;
            summary.not_executed = report.not_executed;
            if let Some(e) = report.aborted {
                return Err(e);
            }
            if report.interrupted {
                return Err(Error::Interrupted);
            }
            Ok(())
        }
    }
}
