//! Terminal output for the `dsjanitor` binary.
//!
//! Markers are emoji on a color-capable terminal and bracketed ASCII tags
//! (`[OK]`, `[FILE]`, ...) otherwise. `--color=auto` consults `NO_COLOR`
//! and `TERM=dumb` first, then defers to `console`, which honours
//! `CLICOLOR`, `CLICOLOR_FORCE` and whether stdout is a terminal.

use std::env;

use crate::pipeline::{Outcome, RunSummary};
use crate::units;

/// How markers are rendered for one command invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve the `--color` flag (`always`, `never` or `auto`).
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = if color_flag.eq_ignore_ascii_case("always") {
            true
        } else if color_flag.eq_ignore_ascii_case("never") {
            false
        } else {
            terminal_wants_color()
        };
        Self { use_color }
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

fn terminal_wants_color() -> bool {
    let dumb = env::var("TERM").map(|t| t == "dumb").unwrap_or(false);
    env::var_os("NO_COLOR").is_none() && !dumb && console::colors_enabled()
}

/// `symbol` on a color terminal, `tag` otherwise.
pub fn emoji<'a>(config: &OutputConfig, symbol: &'a str, tag: &'a str) -> &'a str {
    match config.use_color {
        true => symbol,
        false => tag,
    }
}

/// Human-readable lines describing a finished run.
pub fn summary_lines(config: &OutputConfig, summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();

    let header = match &summary.outcome {
        Outcome::Finished => format!("{} Run finished", emoji(config, "✅", "[OK]")),
        Outcome::Interrupted => format!("{} Run interrupted", emoji(config, "⚠️", "[WARN]")),
        Outcome::Failed(e) => format!("{} Run failed: {}", emoji(config, "❌", "[ERR]"), e),
    };
    lines.push(header);

    lines.push(format!(
        "   Datasets collected: {} ({})",
        summary.collected,
        units::format_gb(summary.collected_bytes)
    ));
    lines.push(format!(
        "   Datasets selected:  {} ({})",
        summary.selected,
        units::format_gb(summary.selected_bytes)
    ));
    lines.push(format!("   Groups:             {}", summary.groups));

    for file in &summary.reports {
        lines.push(format!(
            "{} Report: {}",
            emoji(config, "📄", "[FILE]"),
            file.display()
        ));
    }
    if let Some(script) = &summary.script {
        lines.push(format!(
            "{} Script: {}",
            emoji(config, "📜", "[FILE]"),
            script.display()
        ));
    }

    if summary.executed {
        lines.push(format!("   Commands completed: {}", summary.completed));
        lines.push(format!("   Commands failed:    {}", summary.failed.len()));
        lines.push(format!(
            "   Not executed:       {}",
            summary.not_executed.len()
        ));
        for command in &summary.failed {
            lines.push(format!("     failed: {}", command));
        }
        for command in &summary.not_executed {
            lines.push(format!("     not executed: {}", command));
        }
    }
    lines
}
