//! Library-level integration tests: a full remote run against an in-memory
//! session.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use dsjanitor::cancel::CancellationToken;
use dsjanitor::config::{Overrides, RunPlan, Selection, Settings};
use dsjanitor::error::{Error, Result};
use dsjanitor::pipeline::{execute_run, Outcome, RunContext};
use dsjanitor::refresh::RemoteListingFetcher;
use dsjanitor::session::RemoteSession;
use tempfile::TempDir;

const DESC_LISTING: &str = "\
00010 00 ---------- 1 dsadm dstage 2048 Jan 5 2023 /etl/desc/alpha.ds
00011 00 ---------- 1 dsadm dstage 2048 Jan 5 2023 /etl/desc/LOAD_TASK_ID_7_feed_2023-01-05.ds
";

const DATA_LISTING: &str = "\
total 12
00020 00 ---------- 1 dsadm dstage 1048576 Jan 5 2023 /etl/data/alpha.ds.p0
00021 00 ---------- 1 dsadm dstage 1048576 Jan 5 2023 /etl/data/alpha.ds.p1
00022 00 ---------- 1 dsadm dstage 1048576 Jan 5 2023 /etl/data/LOAD_TASK_ID_7_feed_2023-01-05.ds.p0
00023 00 ---------- 1 dsadm dstage 1048576 Jan 5 2023 /etl/data/LOAD_TASK_ID_9_feed_2023-01-06.ds.p0
00024 00 ---------- 1 dsadm dstage 1048576 Jan 5 2023 /etl/data/orphan.ds.p0
";

/// Serves listings by command and fails chosen commands once with a
/// session-level error.
struct FakeHost {
    open: AtomicBool,
    listings: HashMap<String, &'static str>,
    flaky: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
}

impl FakeHost {
    fn new(flaky: &[&str]) -> Self {
        let mut listings = HashMap::new();
        listings.insert("ls -lis /etl/desc/*".to_string(), DESC_LISTING);
        listings.insert("ls -lis /etl/data/*".to_string(), DATA_LISTING);
        Self {
            open: AtomicBool::new(false),
            listings,
            flaky: Mutex::new(flaky.iter().map(|s| s.to_string()).collect()),
            executed: Mutex::new(Vec::new()),
        }
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl RemoteSession for FakeHost {
    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn execute(&self, command: &str) -> Result<Vec<u8>> {
        self.executed.lock().unwrap().push(command.to_string());
        let mut flaky = self.flaky.lock().unwrap();
        if let Some(index) = flaky.iter().position(|c| command.contains(c.as_str())) {
            flaky.remove(index);
            return Err(Error::SessionClosed {
                message: "channel closed".to_string(),
            });
        }
        Ok(Vec::new())
    }

    fn execute_to(&self, command: &str, sink: &mut dyn Write) -> Result<()> {
        match self.listings.get(command) {
            Some(listing) => {
                sink.write_all(listing.as_bytes())?;
                Ok(())
            }
            None => Err(Error::CommandFailed {
                command: command.to_string(),
                message: "no such directory".to_string(),
            }),
        }
    }
}

fn plan(temp: &TempDir, overrides: Overrides) -> RunPlan {
    RunPlan::resolve(
        Settings::default(),
        Overrides {
            host: Some("etl01".to_string()),
            descriptor_dirs: Some(vec!["/etl/desc".to_string()]),
            data_dirs: Some(vec!["/etl/data".to_string()]),
            cache_dir: Some(temp.path().join("cache")),
            result_dir: Some(temp.path().join("result")),
            ..overrides
        },
    )
    .unwrap()
}

fn run(plan: &RunPlan, host: &FakeHost) -> dsjanitor::pipeline::RunSummary {
    let fetcher = RemoteListingFetcher::new(host, "ls -lis {dir}*");
    let cancel = CancellationToken::new();
    let context = RunContext {
        fetcher: &fetcher,
        session: Some(host),
        cancel: &cancel,
        progress: false,
    };
    execute_run(plan, &context)
}

#[test]
fn test_remote_inventory_groups_task_ids_and_dates() {
    let temp = TempDir::new().unwrap();
    let host = FakeHost::new(&[]);
    let summary = run(
        &plan(
            &temp,
            Overrides {
                write_csv: true,
                ..Overrides::default()
            },
        ),
        &host,
    );

    assert!(matches!(summary.outcome, Outcome::Finished));
    assert_eq!(summary.collected, 4);
    assert_eq!(summary.selected, 4);
    assert_eq!(summary.groups, 3);
    assert!(host.executed().is_empty());

    let groups = std::fs::read_to_string(temp.path().join("result/groups.csv")).unwrap();
    assert!(groups.contains(
        "\"[/etl/desc/, /etl/data/]\";\"LOAD_#TASK_ID#_feed_#LOADING_DT#.ds\";\"[2023-01-05, 2023-01-06]\";\"[7, 9]\""
    ));
}

#[test]
fn test_remote_execution_retries_session_failures_once() {
    let temp = TempDir::new().unwrap();
    let host = FakeHost::new(&["orphan.ds.p0"]);
    let summary = run(
        &plan(
            &temp,
            Overrides {
                selection: Selection::Orphans,
                execute: true,
                ..Overrides::default()
            },
        ),
        &host,
    );

    assert!(matches!(summary.outcome, Outcome::Finished));
    assert_eq!(summary.selected, 2);
    assert_eq!(summary.completed, 2);
    assert!(summary.failed.is_empty());

    let executed = host.executed();
    let orphan_calls = executed
        .iter()
        .filter(|c| c.as_str() == "rm -f '/etl/data/orphan.ds.p0';")
        .count();
    assert_eq!(orphan_calls, 2);
    assert_eq!(executed.len(), 3);
}

#[test]
fn test_failed_retry_is_reported() {
    let temp = TempDir::new().unwrap();
    let host = FakeHost::new(&["orphan.ds.p0", "orphan.ds.p0"]);
    let summary = run(
        &plan(
            &temp,
            Overrides {
                selection: Selection::Orphans,
                execute: true,
                ..Overrides::default()
            },
        ),
        &host,
    );

    assert!(matches!(summary.outcome, Outcome::Finished));
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.failed, vec!["rm -f '/etl/data/orphan.ds.p0';"]);
    assert_eq!(host.executed().len(), 3);
}
