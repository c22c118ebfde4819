//! # Dataset Model
//!
//! A [`Dataset`] is a named, file-based resource that may be materialised in
//! several source directories. Two datasets are the same entity exactly when
//! their names are equal, so equality, ordering and hashing all use the name
//! alone.
//!
//! A dataset is created from one listing line by the entry parser and then
//! grown in place by [`Dataset::merge`] as further lines for the same name
//! are ingested:
//!
//! - location → invocation maps are unioned,
//! - the newest last-used timestamp wins,
//! - the first known descriptor location wins,
//! - sizes add up across distinct entries.
//!
//! Sizes are tracked per entry (descriptor, and each location/invocation pair)
//! and summed on demand. Unioning the same entry twice therefore never counts
//! its bytes twice, which keeps re-ingestion of a listing idempotent.
//!
//! A dataset that is not well-formed never merges and never passes a filter.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{Duration, NaiveDateTime};
use regex::Regex;

/// The descriptor (header) file of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Directory holding the descriptor, with a trailing `/`.
    pub location: String,
    /// Size of the descriptor file in bytes.
    pub size: u64,
}

/// A named, possibly multi-location, file-based resource.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    extension: String,
    descriptor: Option<Descriptor>,
    /// location → invocation suffix → size in bytes
    locations: BTreeMap<String, BTreeMap<String, u64>>,
    last_used: Option<NaiveDateTime>,
    well_formed: bool,
}

impl Dataset {
    /// Create a well-formed dataset with no locations yet.
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            descriptor: None,
            locations: BTreeMap::new(),
            last_used: None,
            well_formed: true,
        }
    }

    /// A placeholder for a listing line that did not describe a dataset.
    pub fn malformed() -> Self {
        Self {
            well_formed: false,
            ..Self::new("", "")
        }
    }

    /// Attach the descriptor location, keeping an existing one.
    pub fn with_descriptor(mut self, location: impl Into<String>, size: u64) -> Self {
        if self.descriptor.is_none() {
            self.descriptor = Some(Descriptor {
                location: location.into(),
                size,
            });
        }
        self
    }

    /// Record one materialisation of the dataset in `location`.
    pub fn with_location(
        mut self,
        location: impl Into<String>,
        invocation: impl Into<String>,
        size: u64,
    ) -> Self {
        self.add_invocation(location.into(), invocation.into(), size);
        self
    }

    pub fn with_last_used(mut self, last_used: NaiveDateTime) -> Self {
        self.last_used = Some(last_used);
        self
    }

    fn add_invocation(&mut self, location: String, invocation: String, size: u64) {
        let entry = self
            .locations
            .entry(location)
            .or_default()
            .entry(invocation)
            .or_insert(size);
        *entry = (*entry).max(size);
    }

    /// Merge another record of the same dataset into this one.
    ///
    /// Returns `false` without touching `self` when either side is not
    /// well-formed or the names differ.
    pub fn merge(&mut self, other: &Dataset) -> bool {
        if !self.well_formed || !other.well_formed || self.name != other.name {
            return false;
        }

        for (location, invocations) in &other.locations {
            for (invocation, size) in invocations {
                self.add_invocation(location.clone(), invocation.clone(), *size);
            }
        }

        self.last_used = match (self.last_used, other.last_used) {
            (Some(mine), Some(theirs)) => Some(mine.max(theirs)),
            (mine, theirs) => mine.or(theirs),
        };

        if self.descriptor.is_none() {
            self.descriptor = other.descriptor.clone();
        }

        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Name followed by extension, e.g. `feed.ds`.
    pub fn full_name(&self) -> String {
        format!("{}{}", self.name, self.extension)
    }

    pub fn descriptor(&self) -> Option<&Descriptor> {
        self.descriptor.as_ref()
    }

    pub fn descriptor_location(&self) -> Option<&str> {
        self.descriptor.as_ref().map(|d| d.location.as_str())
    }

    pub fn location_invocations(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.locations
    }

    /// Data locations in lexicographic order.
    pub fn data_locations(&self) -> Vec<&str> {
        self.locations.keys().map(String::as_str).collect()
    }

    /// Descriptor location (if any) followed by the data locations.
    pub fn all_locations(&self) -> Vec<&str> {
        let mut locations = Vec::with_capacity(self.locations.len() + 1);
        if let Some(descriptor) = self.descriptor_location().filter(|l| !l.is_empty()) {
            locations.push(descriptor);
        }
        locations.extend(self.data_locations());
        locations
    }

    pub fn last_used(&self) -> Option<NaiveDateTime> {
        self.last_used
    }

    /// Total size in bytes across the descriptor and every materialisation.
    pub fn size(&self) -> u64 {
        let data: u64 = self.locations.values().flat_map(|inv| inv.values()).sum();
        data + self.descriptor.as_ref().map_or(0, |d| d.size)
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    /// A dataset without a descriptor file.
    pub fn is_orphan(&self) -> bool {
        self.descriptor.is_none()
    }

    /// Whether the dataset was last used more than `days` days before `now`.
    ///
    /// A dataset with no known last-used time is treated as expired. A
    /// period too long to represent never expires anything that has one.
    pub fn is_expired(&self, days: i64, now: NaiveDateTime) -> bool {
        match (self.last_used, Duration::try_days(days)) {
            (Some(last_used), Some(period)) => now - last_used > period,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Whether the full name (name + extension) matches `regex`.
    pub fn matches(&self, regex: &Regex) -> bool {
        regex.is_match(&self.full_name())
    }

    /// Whether the name matches any of the exception patterns.
    pub fn in_exceptions(&self, exceptions: &[Regex]) -> bool {
        exceptions.iter().any(|re| re.is_match(&self.name))
    }

    /// Whether the name equals one of the entries exactly.
    pub fn in_list(&self, names: &[String]) -> bool {
        names.iter().any(|n| n == &self.name)
    }

    /// Every on-disk path belonging to the dataset.
    ///
    /// The descriptor comes first; each non-empty data location contributes
    /// one path per non-blank invocation suffix.
    pub fn targets(&self) -> Vec<String> {
        let mut targets = Vec::new();
        if let Some(location) = self.descriptor_location().filter(|l| !l.is_empty()) {
            targets.push(format!("{}{}{}", location, self.name, self.extension));
        }
        for (location, invocations) in &self.locations {
            if location.is_empty() {
                continue;
            }
            for invocation in invocations.keys() {
                if invocation.trim().is_empty() {
                    continue;
                }
                targets.push(format!(
                    "{}{}{}{}",
                    location, self.name, self.extension, invocation
                ));
            }
        }
        targets
    }
}

impl PartialEq for Dataset {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Dataset {}

impl Hash for Dataset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Dataset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dataset {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}
