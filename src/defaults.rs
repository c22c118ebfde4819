//! Default values for dsjanitor configuration.
//!
//! This module provides centralized default values used across commands,
//! ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "dsjanitor.yaml";

/// Batch size for commands read back from a script file.
pub const BATCH_SIZE: usize = 1000;

/// Number of concurrent listing fetches during a refresh.
pub const REFRESH_WORKERS: usize = 4;

/// Attempts at opening a remote session before giving up.
pub const SESSION_OPEN_ATTEMPTS: u32 = 3;

/// Marker line separating entity blocks in a generated script.
pub const BLOCK_MARKER: &str = "#--";

/// Default listing pattern, matching `ls -lis <dir>*` output with full paths.
///
/// Groups: 1 size, 2 last-used, 3 directory, 4 name, 5 extension,
/// 6 invocation suffix.
pub fn listing_pattern() -> String {
    concat!(
        r"^\s*\d+\s+\d+\s+\S+\s+\d+\s+\S+\s+\S+\s+(\d+)\s+",
        r"(\w{3}\s+\d{1,2}\s+(?:\d{1,2}:\d{2}|\d{4}))\s+",
        r"(/(?:[^/\s]+/)*)?([^/\s]+?)(\.ds)((?:\.\S*)?)\s*$"
    )
    .to_string()
}

/// Default remote listing command; `{dir}` is replaced by the source directory.
pub fn listing_command() -> String {
    "ls -lis {dir}*".to_string()
}

/// Returns the default listing cache directory.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/dsjanitor` (XDG Base Directory)
/// - macOS: `~/Library/Caches/dsjanitor`
/// - Windows: `{FOLDERID_LocalAppData}\dsjanitor`
///
/// Falls back to `.dsjanitor-cache` in the current directory if the
/// platform cache directory cannot be determined.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".dsjanitor-cache"))
        .join("dsjanitor")
}

/// Returns the default directory for CSV reports and scripts.
pub fn default_result_dir() -> PathBuf {
    PathBuf::from("result")
}

/// Returns the default credential file location.
pub fn default_credential_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".dsjanitor")
        .join("source.crd")
}
