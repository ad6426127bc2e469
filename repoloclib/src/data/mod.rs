//! Data layer: classification, counting and aggregation.
//!
//! - [`language`]: extension → language table
//! - [`counter`]: line counting for one file
//! - [`stats`]: per-(repository, language) sums

pub mod counter;
pub mod language;
pub mod stats;

use std::path::PathBuf;

pub use counter::{count_lines, count_reader, CountFailure, CountFailureKind, LineCount};
pub use language::{LanguageTable, LanguageTag};
pub use stats::{aggregate, AggregateRow, Aggregator};

/// A regular file found under a repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Language derived from the extension
    pub language: LanguageTag,
}
