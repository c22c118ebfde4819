//! # Grouping Engine
//!
//! Collapses datasets whose names differ only by a task id and/or a load date
//! into one [`Group`]. The full name is split by a template pattern into
//!
//! ```text
//! <prefix> TASK_ID <n> <body> _<yyyy-mm-dd> <_REJ> <extension>
//! ```
//!
//! and the variable parts are replaced with `#TASK_ID#` and `_#LOADING_DT#`.
//! The resulting template name is the group's identity, e.g.
//! `feed_2024-01-05.ds` becomes `feed_#LOADING_DT#.ds`.
//!
//! Groups borrow their members from the catalog. Datasets that the template
//! pattern does not match are skipped; they stay in the filtered list.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use log::info;
use regex::{Regex, RegexBuilder};

use crate::cancel::CancellationToken;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::units;

pub const TASK_ID_PLACEHOLDER: &str = "#TASK_ID#";
pub const LOADING_DATE_PLACEHOLDER: &str = "_#LOADING_DT#";

const TEMPLATE_PATTERN: &str =
    r"(?:(.+?)(?:TASK_?ID_?(\d+)))?(.+?)_?(\d{4}-\d{2}-\d{2})?(_?REJ)?([.|_]ds)\b";

/// Datasets sharing one name template.
#[derive(Debug, Clone)]
pub struct Group<'a> {
    template_name: String,
    task_ids: BTreeSet<u64>,
    load_dates: BTreeSet<NaiveDate>,
    members: Vec<&'a Dataset>,
}

impl<'a> Group<'a> {
    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn task_ids(&self) -> &BTreeSet<u64> {
        &self.task_ids
    }

    pub fn load_dates(&self) -> &BTreeSet<NaiveDate> {
        &self.load_dates
    }

    pub fn members(&self) -> &[&'a Dataset] {
        &self.members
    }

    /// Sum of member sizes, computed on every call.
    pub fn size(&self) -> u64 {
        self.members.iter().map(|d| d.size()).sum()
    }

    /// Absorb a group with the same template name. Returns `false` otherwise.
    pub fn merge(&mut self, other: Group<'a>) -> bool {
        if self.template_name != other.template_name {
            return false;
        }
        self.task_ids.extend(other.task_ids);
        self.load_dates.extend(other.load_dates);
        self.members.extend(other.members);
        true
    }

    /// Descriptor folders of all members, then their data folders, each
    /// sorted and deduplicated.
    pub fn folders(&self) -> Vec<&'a str> {
        let mut descriptors = BTreeSet::new();
        let mut data = BTreeSet::new();
        for member in self.members.iter().copied() {
            if let Some(location) = member.descriptor_location().filter(|l| !l.is_empty()) {
                descriptors.insert(location);
            }
            data.extend(member.data_locations());
        }
        descriptors.into_iter().chain(data).collect()
    }
}

impl PartialEq for Group<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.template_name == other.template_name
    }
}

impl Eq for Group<'_> {}

impl PartialOrd for Group<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Size ascending, then template name.
impl Ord for Group<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size()
            .cmp(&other.size())
            .then_with(|| self.template_name.cmp(&other.template_name))
    }
}

/// Builds single-member groups from datasets.
#[derive(Debug, Clone)]
pub struct GroupTemplate {
    regex: Regex,
}

impl GroupTemplate {
    pub fn new() -> Result<Self> {
        let regex = RegexBuilder::new(TEMPLATE_PATTERN)
            .case_insensitive(true)
            .build()?;
        Ok(Self { regex })
    }

    /// The single-member group of `dataset`, or `None` when the template
    /// pattern does not match its full name.
    pub fn group_of<'a>(&self, dataset: &'a Dataset) -> Option<Group<'a>> {
        let full_name = dataset.full_name();
        let caps = self.regex.captures(&full_name)?;

        let mut template_name = String::new();
        let mut task_ids = BTreeSet::new();
        let mut load_dates = BTreeSet::new();

        if let Some(prefix) = caps.get(1) {
            template_name.push_str(prefix.as_str());
        }
        if let Some(task_id) = caps.get(2) {
            template_name.push_str(TASK_ID_PLACEHOLDER);
            if let Ok(id) = task_id.as_str().parse() {
                task_ids.insert(id);
            }
        }
        if let Some(body) = caps.get(3) {
            template_name.push_str(body.as_str());
        }
        if let Some(date) = caps.get(4) {
            template_name.push_str(LOADING_DATE_PLACEHOLDER);
            if let Ok(date) = NaiveDate::parse_from_str(date.as_str(), "%Y-%m-%d") {
                load_dates.insert(date);
            }
        }
        for index in [5, 6] {
            if let Some(part) = caps.get(index) {
                template_name.push_str(part.as_str());
            }
        }

        Some(Group {
            template_name,
            task_ids,
            load_dates,
            members: vec![dataset],
        })
    }
}

/// Group `datasets` by template name.
///
/// Input order does not matter: datasets are visited by name and the result
/// is sorted by size, then template name. The cancellation token is checked
/// before each dataset.
pub fn collect_groups<'a>(
    datasets: &[&'a Dataset],
    cancel: &CancellationToken,
) -> Result<Vec<Group<'a>>> {
    let template = GroupTemplate::new()?;
    let mut sorted = datasets.to_vec();
    sorted.sort();

    let mut groups: BTreeMap<String, Group<'a>> = BTreeMap::new();
    for dataset in sorted {
        cancel.check()?;
        let Some(group) = template.group_of(dataset) else {
            continue;
        };
        match groups.get_mut(group.template_name()) {
            Some(existing) => {
                existing.merge(group);
            }
            None => {
                groups.insert(group.template_name.clone(), group);
            }
        }
    }

    let mut groups: Vec<Group<'a>> = groups.into_values().collect();
    groups.sort();
    let size: u64 = groups.iter().map(Group::size).sum();
    info!(
        "Groups count: {} | {}",
        groups.len(),
        units::format_gb(size)
    );
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(name: &str, ext: &str, size: u64) -> Dataset {
        Dataset::new(name, ext).with_location("/data/", ".p0", size)
    }

    #[test]
    fn test_loading_date_template() {
        let dataset = Dataset::new("feed", "_2024-01-05.ds").with_location("", "", 1_048_576);
        let group = GroupTemplate::new().unwrap().group_of(&dataset).unwrap();
        assert_eq!(group.template_name(), "feed_#LOADING_DT#.ds");
        assert_eq!(
            group.load_dates().iter().collect::<Vec<_>>(),
            vec![&NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()]
        );
        assert_eq!(group.size(), 1_048_576);
    }

    #[test]
    fn test_task_id_template() {
        let dataset = ds("LOAD_TASK_ID_123_orders_2024-02-01", ".ds", 1);
        let group = GroupTemplate::new().unwrap().group_of(&dataset).unwrap();
        assert_eq!(
            group.template_name(),
            "LOAD_#TASK_ID#_orders_#LOADING_DT#.ds"
        );
        assert!(group.task_ids().contains(&123));
    }

    #[test]
    fn test_plain_name_keeps_itself() {
        let dataset = ds("customers", ".ds", 1);
        let group = GroupTemplate::new().unwrap().group_of(&dataset).unwrap();
        assert_eq!(group.template_name(), "customers.ds");
        assert!(group.task_ids().is_empty());
        assert!(group.load_dates().is_empty());
    }

    #[test]
    fn test_reject_suffix_is_literal() {
        let dataset = ds("feed_2024-01-05_REJ", ".ds", 1);
        let group = GroupTemplate::new().unwrap().group_of(&dataset).unwrap();
        assert_eq!(group.template_name(), "feed_#LOADING_DT#_REJ.ds");
    }

    #[test]
    fn test_unmatched_is_skipped() {
        let dataset = ds("notes", ".txt", 1);
        assert!(GroupTemplate::new().unwrap().group_of(&dataset).is_none());
    }

    #[test]
    fn test_collect_merges_same_template() {
        let a = ds("feed_2024-01-05", ".ds", 10);
        let b = ds("feed_2024-01-06", ".ds", 20);
        let c = ds("big", ".ds", 5);
        let d = ds("other", ".txt", 1000);
        let groups = collect_groups(&[&a, &c, &b, &d], &CancellationToken::new()).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].template_name(), "big.ds");
        assert_eq!(groups[1].template_name(), "feed_#LOADING_DT#.ds");
        assert_eq!(groups[1].size(), 30);
        assert_eq!(groups[1].load_dates().len(), 2);
        assert_eq!(groups[1].members().len(), 2);
    }

    #[test]
    fn test_order_ties_break_by_name() {
        let a = ds("zeta", ".ds", 10);
        let b = ds("alpha", ".ds", 10);
        let groups = collect_groups(&[&a, &b], &CancellationToken::new()).unwrap();
        assert_eq!(groups[0].template_name(), "alpha.ds");
    }

    #[test]
    fn test_folders_descriptors_first() {
        let a = Dataset::new("feed_2024-01-05", ".ds")
            .with_descriptor("/desc/", 1)
            .with_location("/data/b/", ".p", 1);
        let b = Dataset::new("feed_2024-01-06", ".ds").with_location("/data/a/", ".p", 1);
        let groups = collect_groups(&[&a, &b], &CancellationToken::new()).unwrap();
        assert_eq!(groups[0].folders(), vec!["/desc/", "/data/a/", "/data/b/"]);
    }

    #[test]
    fn test_merge_rejects_other_template() {
        let template = GroupTemplate::new().unwrap();
        let a = ds("alpha", ".ds", 1);
        let b = ds("beta", ".ds", 1);
        let mut group = template.group_of(&a).unwrap();
        assert!(!group.merge(template.group_of(&b).unwrap()));
        assert_eq!(group.members().len(), 1);
    }

    #[test]
    fn test_cancelled_grouping() {
        let a = ds("alpha", ".ds", 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(collect_groups(&[&a], &cancel).unwrap_err().is_interrupted());
    }
}
