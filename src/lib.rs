//! # dsjanitor
//!
//! Inventories on-disk datasets spread over many source directories, selects
//! the ones that are no longer used, and removes them, either on the local
//! filesystem or through batched commands on a remote host. The library backs
//! the `dsjanitor` command-line tool.
//!
//! ## Quick Example
//!
//! ```
//! use dsjanitor::dataset::Dataset;
//! use dsjanitor::script::Script;
//!
//! let dataset = Dataset::new("alpha", ".ds")
//!     .with_descriptor("/etl/desc/", 512)
//!     .with_location("/etl/data/", ".p0", 1024);
//! assert_eq!(dataset.size(), 1536);
//!
//! let script = Script::new(&[dataset], "rm -f", "");
//! assert_eq!(
//!     script.inline_commands(),
//!     vec!["rm -f '/etl/desc/alpha.ds'; rm -f '/etl/data/alpha.ds.p0';"]
//! );
//! ```
//!
//! ## Core Concepts
//!
//! - **Datasets (`dataset`, `parser`, `catalog`)**: listing lines are parsed
//!   into dataset fragments and merged by name into a catalog.
//! - **Refresh (`refresh`)**: cached directory listings are refetched when
//!   they are older than a threshold, locally or through a remote session.
//! - **Selection (`filter`, `group`)**: composable filters pick datasets;
//!   selected datasets are collapsed into name-template groups.
//! - **Outputs (`script`, `report`)**: removal commands, bash scripts and CSV
//!   reports.
//! - **Execution (`execution`, `session`, `credential`)**: commands run
//!   concurrently over one shared remote session, with a single sequential
//!   retry of session-level failures.
//!
//! ## Execution Flow
//!
//! [`pipeline::execute_run`] drives a whole run from a resolved
//! [`config::RunPlan`]:
//!
//! 1.  **Refresh** stale listing cache files.
//! 2.  **Catalog** descriptor listings, then data listings.
//! 3.  **Filter** the catalog down to the selection.
//! 4.  **Group** the selection by name template.
//! 5.  **Write** CSV reports and the removal script.
//! 6.  **Execute** the removal.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod credential;
pub mod dataset;
pub mod defaults;
pub mod error;
pub mod execution;
pub mod filter;
pub mod group;
pub mod output;
pub mod parser;
pub mod path;
pub mod pipeline;
pub mod refresh;
pub mod report;
pub mod script;
pub mod session;
pub mod units;

#[cfg(test)]
mod merge_proptest;
#[cfg(test)]
mod path_proptest;
