//! # Configuration
//!
//! Two layers:
//!
//! - **[`Settings`]**: the `dsjanitor.yaml` file, deserialized with `serde`.
//!   Every field has a default, so an empty file (or no file at all) is a
//!   valid configuration.
//! - **[`RunPlan`]**: the resolved, validated, immutable value a run works
//!   from. It is built from `Settings` plus command-line [`Overrides`], with
//!   regexes compiled and directories normalised.
//!
//! The run flow is a plain record, [`FlowConfig`], fixed when the plan is
//! built.
//!
//! ## Example
//!
//! ```yaml
//! remote:
//!   host: etl01.example.com
//!   user: dsadm
//! descriptor_dirs: [/etl/desc]
//! data_dirs: [/etl/data1, /etl/data2]
//! validity_period_days: 30
//! exceptions: ["^TMP_", "^SYS_"]
//! script:
//!   prefix: rm -f
//! ```

use std::path::{Path, PathBuf};

use log::debug;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::parser::ParserConfig;
use crate::path;

/// Remote host settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub credential_file: PathBuf,
    /// Listing command; `{dir}` is replaced by the source directory.
    pub listing_command: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 22,
            user: None,
            credential_file: defaults::default_credential_file(),
            listing_command: defaults::listing_command(),
        }
    }
}

/// Text wrapped around every generated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub prefix: String,
    pub postfix: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            prefix: "rm -f".to_string(),
            postfix: String::new(),
        }
    }
}

/// Contents of `dsjanitor.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub remote: RemoteSettings,
    pub descriptor_dirs: Vec<String>,
    pub data_dirs: Vec<String>,
    pub cache_dir: PathBuf,
    pub result_dir: PathBuf,
    pub validity_period_days: Option<i64>,
    pub refresh_after_hours: u64,
    pub threads: usize,
    pub batch_size: usize,
    pub script: ScriptSettings,
    /// Name patterns that are never selected.
    pub exceptions: Vec<String>,
    /// Exact names used by `--use-filter`.
    pub filter_list: Vec<String>,
    /// Full-name pattern used by a bare `--regexp`.
    pub regex: Option<String>,
    pub parser: ParserConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote: RemoteSettings::default(),
            descriptor_dirs: Vec::new(),
            data_dirs: Vec::new(),
            cache_dir: defaults::default_cache_dir(),
            result_dir: defaults::default_result_dir(),
            validity_period_days: None,
            refresh_after_hours: 24,
            threads: 1,
            batch_size: defaults::BATCH_SIZE,
            script: ScriptSettings::default(),
            exceptions: Vec::new(),
            filter_list: Vec::new(),
            regex: None,
            parser: ParserConfig::default(),
        }
    }
}

impl Settings {
    /// Parse settings from YAML text. Blank text yields the defaults.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(file).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", file.display(), e),
            hint: None,
        })?;
        Self::parse(&content)
    }

    /// Load settings: `explicit` when given, else `dsjanitor.yaml` in `cwd`
    /// when present, else the defaults.
    pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(file) = explicit {
            debug!("Loading configuration from {}", file.display());
            return Self::from_file(file);
        }
        let local = cwd.join(defaults::CONFIG_FILE_NAME);
        if local.is_file() {
            debug!("Loading configuration from {}", local.display());
            return Self::from_file(&local);
        }
        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }
}

/// Where listings come from and where removals happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Local,
    Remote,
}

/// The run flow, fixed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowConfig {
    pub mode: Mode,
    /// Actually remove the selected datasets.
    pub execute: bool,
    /// Execute by reading the written script back in batches instead of
    /// submitting inline commands.
    pub from_file: bool,
}

/// Which datasets survive the descriptor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Orphans,
    Full,
}

/// Command-line values that take precedence over [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub local: bool,
    pub descriptor_dirs: Option<Vec<String>>,
    pub data_dirs: Option<Vec<String>>,
    pub cache_dir: Option<PathBuf>,
    pub result_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub refresh_now: bool,
    /// `Some(None)` selects the configured regex, `Some(Some(re))` a given one.
    pub regexp: Option<Option<String>>,
    pub validity_period_days: Option<i64>,
    pub selection: Selection,
    pub ignore_exceptions: bool,
    pub use_filter: bool,
    pub write_csv: bool,
    pub write_script: bool,
    pub execute: bool,
    pub execute_file: bool,
    pub threads: Option<usize>,
    pub batch_size: Option<usize>,
    pub save_user: bool,
}

/// Resolved, validated configuration of one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub flow: FlowConfig,
    pub remote: RemoteSettings,
    pub descriptor_dirs: Vec<String>,
    pub data_dirs: Vec<String>,
    pub cache_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Listing cache threshold; `0` refreshes every directory.
    pub refresh_threshold_secs: u64,
    pub validity_period_days: Option<i64>,
    pub selection: Selection,
    pub exceptions: Vec<Regex>,
    pub filter_list: Vec<String>,
    pub regex: Option<Regex>,
    pub write_csv: bool,
    pub write_script: bool,
    pub threads: usize,
    pub batch_size: usize,
    pub script: ScriptSettings,
    pub parser: ParserConfig,
    pub save_user: bool,
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Config {
            message: format!("invalid regular expression '{}': {}", pattern, e),
            hint: None,
        })
}

fn at_least_one(field: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(Error::Config {
            message: format!("{} must be at least 1", field),
            hint: None,
        });
    }
    Ok(value)
}

impl RunPlan {
    pub fn resolve(settings: Settings, overrides: Overrides) -> Result<Self> {
        let mode = if overrides.local {
            Mode::Local
        } else {
            Mode::Remote
        };

        let descriptor_dirs =
            path::normalize_dirs(overrides.descriptor_dirs.unwrap_or(settings.descriptor_dirs));
        let data_dirs = path::normalize_dirs(overrides.data_dirs.unwrap_or(settings.data_dirs));
        if descriptor_dirs.is_empty() && data_dirs.is_empty() {
            return Err(Error::Config {
                message: "no source directories configured".to_string(),
                hint: Some(
                    "Set descriptor_dirs/data_dirs in dsjanitor.yaml or pass --descriptors/--data"
                        .to_string(),
                ),
            });
        }

        let mut remote = settings.remote;
        if overrides.host.is_some() {
            remote.host = overrides.host;
        }
        if let Some(port) = overrides.port {
            remote.port = port;
        }
        if overrides.user.is_some() {
            remote.user = overrides.user;
        }
        if mode == Mode::Remote && remote.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(Error::Config {
                message: "remote mode needs a host".to_string(),
                hint: Some("Set remote.host, pass --host, or use --local".to_string()),
            });
        }

        if overrides.execute_file && mode == Mode::Local {
            return Err(Error::Config {
                message: "--execute-file runs a script remotely and cannot be combined with --local"
                    .to_string(),
                hint: None,
            });
        }

        let regex = match overrides.regexp {
            None => None,
            Some(Some(pattern)) => Some(compile(&pattern)?),
            Some(None) => match settings.regex.as_deref() {
                Some(pattern) => Some(compile(pattern)?),
                None => {
                    return Err(Error::Config {
                        message: "--regexp given without a value and no regex is configured"
                            .to_string(),
                        hint: Some("Pass --regexp=PATTERN or set regex in dsjanitor.yaml".to_string()),
                    })
                }
            },
        };

        let exceptions = if overrides.ignore_exceptions {
            Vec::new()
        } else {
            settings
                .exceptions
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>>>()?
        };

        let filter_list = if overrides.use_filter {
            settings
                .filter_list
                .into_iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let refresh_threshold_secs = if overrides.refresh_now {
            0
        } else {
            settings.refresh_after_hours.saturating_mul(3600)
        };

        let execute = overrides.execute || overrides.execute_file;
        Ok(Self {
            flow: FlowConfig {
                mode,
                execute,
                from_file: overrides.execute_file,
            },
            remote,
            descriptor_dirs,
            data_dirs,
            cache_dir: overrides.cache_dir.unwrap_or(settings.cache_dir),
            result_dir: overrides.result_dir.unwrap_or(settings.result_dir),
            refresh_threshold_secs,
            validity_period_days: overrides
                .validity_period_days
                .or(settings.validity_period_days),
            selection: overrides.selection,
            exceptions,
            filter_list,
            regex,
            write_csv: overrides.write_csv,
            write_script: overrides.write_script || overrides.execute_file,
            threads: at_least_one("threads", overrides.threads.unwrap_or(settings.threads))?,
            batch_size: at_least_one(
                "batch_size",
                overrides.batch_size.unwrap_or(settings.batch_size),
            )?,
            script: settings.script,
            parser: settings.parser,
            save_user: overrides.save_user,
        })
    }

    /// Every source directory, descriptors first.
    pub fn all_dirs(&self) -> Vec<String> {
        self.descriptor_dirs
            .iter()
            .chain(&self.data_dirs)
            .cloned()
            .collect()
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.result_dir.join("scripts")
    }
}
