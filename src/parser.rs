//! # Entry Parser
//!
//! Turns one line of raw listing text into a [`Dataset`] fragment.
//!
//! The pattern and the capture-group layout are injected through
//! [`ParserConfig`]; nothing here is read from global state. Lines that the
//! pattern does not match, or whose name is blank, come back as a dataset
//! flagged not well-formed. That is a normal outcome and the caller simply
//! drops the record.
//!
//! ## Timestamps
//!
//! Directory listings print recent files as `Mon d HH:MM` (no year) and older
//! ones as `Mon d YYYY`. The parser tries, in order:
//!
//! 1. `Mon d HH:MM` in the current year,
//! 2. the same in earlier years, when (1) lands in the future or does not
//!    exist (`Feb 29` outside a leap year),
//! 3. `Mon d YYYY` at midnight.
//!
//! If none of them parse, the pattern does not fit the listing, and the line
//! fails with [`Error::TimestampParse`].

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::defaults;
use crate::error::{Error, Result};

/// Capture-group indices of the listing pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupIndices {
    pub size: usize,
    pub last_used: usize,
    pub directory: usize,
    pub name: usize,
    pub extension: usize,
    pub invocation: usize,
}

impl Default for GroupIndices {
    fn default() -> Self {
        Self {
            size: 1,
            last_used: 2,
            directory: 3,
            name: 4,
            extension: 5,
            invocation: 6,
        }
    }
}

/// Listing pattern text plus its group layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "defaults::listing_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub groups: GroupIndices,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            pattern: defaults::listing_pattern(),
            groups: GroupIndices::default(),
        }
    }
}

/// Compiled listing-line parser.
#[derive(Debug, Clone)]
pub struct EntryParser {
    regex: Regex,
    groups: GroupIndices,
}

impl EntryParser {
    /// Compile the configured pattern and check that every group index exists.
    pub fn new(config: &ParserConfig) -> Result<Self> {
        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map_err(|e| Error::Pattern {
                pattern: config.pattern.clone(),
                message: e.to_string(),
            })?;

        let available = regex.captures_len() - 1;
        let g = &config.groups;
        for (field, index) in [
            ("size", g.size),
            ("last_used", g.last_used),
            ("directory", g.directory),
            ("name", g.name),
            ("extension", g.extension),
            ("invocation", g.invocation),
        ] {
            if index == 0 || index > available {
                return Err(Error::Config {
                    message: format!(
                        "parser group '{}' = {} but the pattern has {} group(s)",
                        field, index, available
                    ),
                    hint: Some("Group indices start at 1".to_string()),
                });
            }
        }

        Ok(Self {
            regex,
            groups: config.groups.clone(),
        })
    }

    /// Parse a line against the local clock.
    pub fn parse(&self, line: &str, is_descriptor: bool) -> Result<Dataset> {
        self.parse_at(line, is_descriptor, Local::now().naive_local())
    }

    /// Parse a line, resolving year-less timestamps relative to `now`.
    pub fn parse_at(&self, line: &str, is_descriptor: bool, now: NaiveDateTime) -> Result<Dataset> {
        let Some(caps) = self.regex.captures(line) else {
            return Ok(Dataset::malformed());
        };

        let name = group(&caps, self.groups.name).map(str::trim).unwrap_or("");
        if name.is_empty() {
            return Ok(Dataset::malformed());
        }

        let size = match group(&caps, self.groups.size) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(size) => size,
                Err(_) => return Ok(Dataset::malformed()),
            },
            None => 0,
        };

        let extension = group(&caps, self.groups.extension).unwrap_or("");
        let invocation = group(&caps, self.groups.invocation)
            .map(str::trim)
            .unwrap_or("");
        let directory = group(&caps, self.groups.directory).unwrap_or("");

        let mut dataset = Dataset::new(name, extension);
        if let Some(raw) = group(&caps, self.groups.last_used) {
            dataset = dataset.with_last_used(parse_last_used(raw, now, line)?);
        }

        dataset = if is_descriptor {
            dataset.with_descriptor(directory, size)
        } else {
            dataset.with_location(directory, invocation, size)
        };

        Ok(dataset)
    }
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> Option<&'t str> {
    caps.get(index).map(|m| m.as_str())
}

const LEAP_LOOKBACK: i32 = 8;

/// Resolve a listing timestamp (`Mon d HH:MM` or `Mon d YYYY`).
pub fn parse_last_used(raw: &str, now: NaiveDateTime, line: &str) -> Result<NaiveDateTime> {
    let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let with_year =
        |year: i32| NaiveDateTime::parse_from_str(&format!("{} {}", year, value), "%Y %b %d %H:%M");

    // Latest year that is not in the future. `Feb 29` only exists in leap
    // years, so look back far enough to reach one.
    let recent = (0..=LEAP_LOOKBACK)
        .filter_map(|back| with_year(now.year() - back).ok())
        .find(|parsed| *parsed <= now);
    if let Some(parsed) = recent {
        return Ok(parsed);
    }

    NaiveDate::parse_from_str(&value, "%b %d %Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| Error::TimestampParse {
            value,
            line: line.to_string(),
        })
}
