//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_datasets().with_local_config();
//!     fixture.command().args(["run", "--local"]).assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::TestFixture;
}

/// A temporary directory laid out like a small ETL landing zone:
///
/// ```text
/// desc/alpha.ds
/// data/alpha.ds.p0
/// data/orphan_2024-01-05.ds.p0
/// data/orphan_2024-01-06.ds.p0
/// data/notes.txt
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add the sample dataset files.
    pub fn with_datasets(self) -> Self {
        self.with_file("desc/alpha.ds", "header")
            .with_file("data/alpha.ds.p0", "0123456789")
            .with_file("data/orphan_2024-01-05.ds.p0", "01234")
            .with_file("data/orphan_2024-01-06.ds.p0", "01234")
            .with_file("data/notes.txt", "not a dataset")
    }

    /// Add a `dsjanitor.yaml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("dsjanitor.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a `dsjanitor.yaml` pointing at the fixture directories, with
    /// `extra` appended verbatim.
    pub fn with_local_config_and(self, extra: &str) -> Self {
        let config = format!(
            "descriptor_dirs: ['{}']\ndata_dirs: ['{}']\ncache_dir: '{}'\nresult_dir: '{}'\n{}",
            self.dir("desc").display(),
            self.dir("data").display(),
            self.dir("cache").display(),
            self.dir("result").display(),
            extra
        );
        self.with_config(&config)
    }

    pub fn with_local_config(self) -> Self {
        self.with_local_config_and("")
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of a fixture sub-directory.
    pub fn dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// The `dsjanitor` binary, run inside the fixture with a clean environment.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("dsjanitor");
        cmd.current_dir(self.path())
            .env_remove("DSJANITOR_CONFIG")
            .env_remove("DSJANITOR_CACHE")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
