//! CSV reports for selected datasets and groups.
//!
//! Both reports use `;` as delimiter and quote every field. Files are written
//! through [`path::write_new_file`], so an existing report is never replaced.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{QuoteStyle, WriterBuilder};
use log::info;

use crate::dataset::Dataset;
use crate::error::Result;
use crate::group::Group;
use crate::path;
use crate::units;

pub const DATASETS_FILE_NAME: &str = "datasets.csv";
pub const GROUPS_FILE_NAME: &str = "groups.csv";

const DATASET_HEADER: [&str; 4] = ["Folders", "Name", "Size, mb", "Last use date"];
const GROUP_HEADER: [&str; 5] = [
    "Folders",
    "Group name",
    "Dates in DS name",
    "Task ID",
    "Group size, mb",
];
const LAST_USED_FORMAT: &str = "%d-%m-%Y %H:%M";

/// `[a, b, c]`
fn bracketed<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: ToString,
{
    let joined = items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{}]", joined)
}

fn render<const N: usize>(header: [&str; N], rows: Vec<[String; N]>) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| crate::error::Error::Io(e.into_error()))
}

pub fn dataset_row(dataset: &Dataset) -> [String; 4] {
    [
        bracketed(dataset.all_locations()),
        dataset.full_name(),
        units::format_mb(dataset.size()),
        dataset
            .last_used()
            .map(|t| t.format(LAST_USED_FORMAT).to_string())
            .unwrap_or_default(),
    ]
}

pub fn group_row(group: &Group<'_>) -> [String; 5] {
    let dates = group
        .load_dates()
        .iter()
        .map(|d: &NaiveDate| d.format("%Y-%m-%d"));
    [
        bracketed(group.folders()),
        group.template_name().to_string(),
        bracketed(dates),
        bracketed(group.task_ids()),
        units::format_mb(group.size()),
    ]
}

/// Write the dataset report into `file`.
///
/// Returns `None` without touching the disk when `datasets` is empty.
pub fn write_datasets_csv(file: &Path, datasets: &[&Dataset]) -> Result<Option<PathBuf>> {
    if datasets.is_empty() {
        info!("No datasets to report");
        return Ok(None);
    }
    let rows = datasets.iter().map(|d| dataset_row(d)).collect();
    let content = render(DATASET_HEADER, rows)?;
    path::write_new_file(file, &content).map(Some)
}

/// Write the group report into `file`. Empty input writes nothing.
pub fn write_groups_csv(file: &Path, groups: &[Group<'_>]) -> Result<Option<PathBuf>> {
    if groups.is_empty() {
        info!("No groups to report");
        return Ok(None);
    }
    let rows = groups.iter().map(group_row).collect();
    let content = render(GROUP_HEADER, rows)?;
    path::write_new_file(file, &content).map(Some)
}
