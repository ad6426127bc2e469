//! Error types for repoloclib
//!
//! These are the batch-level failures that stop a run before it starts.
//! Per-repository and per-file failures are plain values collected into the
//! error summary instead (see [`crate::output::ErrorSummary`]).

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a fetch, count or clean run
#[derive(Error, Debug)]
pub enum RepolocError {
    /// The repository list could not be read
    #[error("failed to read input list '{path}': {source}")]
    InputList {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The destination root cannot be created or written to
    #[error("destination '{path}' is not writable: {source}")]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The report (or its error summary) cannot be written
    #[error("cannot write report '{path}': {source}")]
    Report {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid glob pattern
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },

    /// Path does not exist
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// An option value is out of range or inconsistent
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read or parsed
    #[error("failed to load config file '{path}': {message}")]
    ConfigFile { path: PathBuf, message: String },

    /// `clean` was pointed at a directory it must never delete
    #[error("refusing to remove '{0}'")]
    UnsafeClean(PathBuf),

    /// The worker pool could not be started
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The batch was interrupted before it could complete
    #[error("interrupted")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding of the manifest or error summary failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
