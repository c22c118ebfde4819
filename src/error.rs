//! # Error Handling
//!
//! This module defines the centralized error type for the `dsjanitor`
//! library. It uses `thiserror` to build a single `Error` enum covering every
//! anticipated failure mode of the dataset lifecycle pipeline, with a
//! `Result<T>` alias used throughout the crate.
//!
//! ## Error classes
//!
//! The variants fall into a few classes that callers treat differently:
//!
//! - **Configuration / pattern mismatch** (`Config`, `Pattern`,
//!   `TimestampParse`): fatal for the operation that raised them.
//! - **Session-level transport errors** (`SessionClosed`): recoverable inside
//!   the execution engine, where the command is recorded and retried once.
//!   Use [`Error::is_session_error`] to classify.
//! - **Cancellation** (`Interrupted`): not a failure. It surfaces up to the
//!   top-level run, which reports "interrupted" instead of logging an error.
//!   Use [`Error::is_interrupted`] to classify.
//! - **Wrapped library errors** (`Io`, `Yaml`, `Json`, `Regex`, `Csv`).
//!
//! Malformed listing lines are deliberately *not* represented here: the entry
//! parser flags them as not well-formed and the catalog drops them.

use thiserror::Error;

/// Main error type for dsjanitor operations
#[derive(Error, Debug)]
pub enum Error {
    /// The resolved configuration is invalid.
    ///
    /// Optionally carries a hint about how to fix it.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A configured regular expression could not be used.
    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// A last-used timestamp matched none of the known listing formats.
    ///
    /// This indicates the listing pattern does not fit the listing output, so
    /// it aborts the ingestion that hit it.
    #[error("Unparseable timestamp '{value}' in listing line: {line}")]
    TimestampParse { value: String, line: String },

    /// The remote session is closed or could not be used for a command.
    #[error("Remote session closed: {message}")]
    SessionClosed { message: String },

    /// Authentication against the remote host failed on every attempt.
    #[error("Authentication failed for {host} after {attempts} attempt(s)")]
    Authentication { host: String, attempts: u32 },

    /// A command failed for a reason other than the session closing.
    #[error("Command failed: {command} - {message}")]
    CommandFailed { command: String, message: String },

    /// A stored credential could not be read, written or decrypted.
    #[error("Credential error: {message}")]
    Credential { message: String },

    /// The run was cancelled by the user.
    #[error("Interrupted")]
    Interrupted,

    /// A worker pool could not be built.
    #[error("Thread pool error: {message}")]
    ThreadPool { message: String },

    /// A mutex guarding shared state was poisoned by a panicking worker.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A CSV writing error, wrapped from `csv::Error`.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Whether this error is a session-level transport failure.
    ///
    /// The execution engine records commands that fail this way and retries
    /// them once; every other command error stops the run.
    pub fn is_session_error(&self) -> bool {
        matches!(self, Error::SessionClosed { .. })
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
