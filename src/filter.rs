//! # Filter Pipeline
//!
//! A builder over borrowed datasets. Every stage is a pure predicate that
//! narrows the working set and hands the pipeline back, so stages compose in
//! any order:
//!
//! ```rust,ignore
//! let selected = FilterPipeline::new(catalog.all_datasets(), now)
//!     .expired(30)
//!     .not_in(&exceptions)
//!     .orphans(true)
//!     .collect();
//! ```
//!
//! Stages with an empty argument (`None` regex, empty list, `false` flag)
//! are no-ops. Datasets that are not well-formed never pass.

use chrono::NaiveDateTime;
use log::info;
use regex::Regex;

use crate::dataset::Dataset;
use crate::units;

#[derive(Debug)]
pub struct FilterPipeline<'a> {
    datasets: Vec<&'a Dataset>,
    now: NaiveDateTime,
}

impl<'a> FilterPipeline<'a> {
    /// Start from `datasets`; `now` is the reference time for [`Self::expired`].
    pub fn new(datasets: Vec<&'a Dataset>, now: NaiveDateTime) -> Self {
        let datasets = datasets
            .into_iter()
            .filter(|d| d.is_well_formed())
            .collect();
        Self { datasets, now }
    }

    fn retain(mut self, predicate: impl Fn(&Dataset) -> bool) -> Self {
        self.datasets.retain(|d| predicate(*d));
        self
    }

    /// Keep datasets last used more than `days` days ago.
    pub fn expired(self, days: i64) -> Self {
        info!("Getting datasets older than {} day(s)", days);
        let now = self.now;
        self.retain(|d| d.is_expired(days, now))
    }

    /// Drop datasets whose name matches any exception pattern.
    pub fn not_in(self, exceptions: &[Regex]) -> Self {
        if exceptions.is_empty() {
            return self;
        }
        info!("Checking {} exception pattern(s)", exceptions.len());
        self.retain(|d| !d.in_exceptions(exceptions))
    }

    /// Keep datasets whose full name matches `regex`.
    pub fn matched(self, regex: Option<&Regex>) -> Self {
        match regex {
            Some(regex) => {
                info!("Getting datasets matching regular expression: {}", regex);
                self.retain(|d| d.matches(regex))
            }
            None => self,
        }
    }

    /// Keep datasets whose name is exactly one of `names`.
    pub fn only_in(self, names: &[String]) -> Self {
        if names.is_empty() {
            return self;
        }
        info!("Filtering datasets by a list of {} name(s)", names.len());
        self.retain(|d| d.in_list(names))
    }

    /// Keep datasets without a descriptor.
    pub fn orphans(self, enabled: bool) -> Self {
        if !enabled {
            return self;
        }
        info!("Getting orphans...");
        self.retain(Dataset::is_orphan)
    }

    /// Keep datasets with a descriptor.
    pub fn full(self, enabled: bool) -> Self {
        if !enabled {
            return self;
        }
        info!("Getting full datasets...");
        self.retain(|d| !d.is_orphan())
    }

    pub fn collect(self) -> Vec<&'a Dataset> {
        let size: u64 = self.datasets.iter().map(|d| d.size()).sum();
        info!(
            "Filtered datasets count: {} | {}",
            self.datasets.len(),
            units::format_gb(size)
        );
        self.datasets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample() -> Vec<Dataset> {
        vec![
            Dataset::new("old_orphan", ".ds")
                .with_location("/d/", ".p", 1)
                .with_last_used(day(1)),
            Dataset::new("old_full", ".ds")
                .with_descriptor("/desc/", 1)
                .with_last_used(day(1)),
            Dataset::new("new_orphan", ".ds")
                .with_location("/d/", ".p", 1)
                .with_last_used(day(30)),
            Dataset::new("TMP_scratch", ".ds").with_last_used(day(1)),
            Dataset::malformed(),
        ]
    }

    fn names(selected: &[&Dataset]) -> Vec<String> {
        selected.iter().map(|d| d.name().to_string()).collect()
    }

    #[test]
    fn test_malformed_never_passes() {
        let datasets = sample();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31)).collect();
        assert_eq!(selected.len(), 4);
    }

    #[test]
    fn test_expired_and_orphans() {
        let datasets = sample();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .expired(10)
            .orphans(true)
            .collect();
        assert_eq!(names(&selected), vec!["old_orphan", "TMP_scratch"]);
    }

    #[test]
    fn test_full_and_disabled_stages() {
        let datasets = sample();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .full(true)
            .orphans(false)
            .not_in(&[])
            .only_in(&[])
            .matched(None)
            .collect();
        assert_eq!(names(&selected), vec!["old_full"]);
    }

    #[test]
    fn test_exceptions_match_name() {
        let datasets = sample();
        let exceptions = [Regex::new("(?i)^tmp_").unwrap()];
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .not_in(&exceptions)
            .collect();
        assert!(!names(&selected).contains(&"TMP_scratch".to_string()));
    }

    #[test]
    fn test_matched_uses_full_name() {
        let datasets = sample();
        let regex = Regex::new(r"_full\.ds$").unwrap();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .matched(Some(&regex))
            .collect();
        assert_eq!(names(&selected), vec!["old_full"]);
    }

    #[test]
    fn test_only_in_exact() {
        let datasets = sample();
        let list = vec!["new_orphan".to_string(), "old".to_string()];
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .only_in(&list)
            .collect();
        assert_eq!(names(&selected), vec!["new_orphan"]);
    }

    #[test]
    fn test_expired_with_huge_period_keeps_nothing() {
        let datasets = sample();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .expired(9_999_999_999_999)
            .collect();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_empty_result_is_fine() {
        let datasets = sample();
        let selected = FilterPipeline::new(datasets.iter().collect(), day(31))
            .orphans(true)
            .full(true)
            .collect();
        assert!(selected.is_empty());
    }
}
