//! # repoloclib
//!
//! Collect a corpus of git repositories and count their lines per repository
//! and per language.
//!
//! ## Overview
//!
//! The library is a strict pipeline with no feedback loop:
//!
//! 1. **Source**: parse repository identifiers, acquire them in parallel
//!    ([`Fetcher`]) and walk the acquired trees lazily ([`walk`]).
//! 2. **Data**: classify each file by extension ([`LanguageTable`]), count
//!    its lines ([`count_lines`]) and sum the counts per repository and
//!    language ([`Aggregator`]).
//! 3. **Output**: write the sorted rows as CSV ([`ReportWriter`]) next to a
//!    JSON summary of everything that failed along the way ([`ErrorSummary`]).
//!
//! Failures of single repositories, paths or files never abort a batch. They
//! are collected and reported. Only configuration problems (unreadable input
//! list, unwritable destination or report) are returned as [`RepolocError`].
//!
//! ## Example
//!
//! ```rust
//! use repoloclib::{count_corpus, CountOptions};
//! use std::fs;
//! use std::sync::atomic::AtomicBool;
//! use tempfile::tempdir;
//!
//! let corpus = tempdir().unwrap();
//! let repo = corpus.path().join("acme/widgets");
//! fs::create_dir_all(repo.join("src")).unwrap();
//! fs::write(repo.join("src/lib.rs"), "pub fn a() {}\npub fn b() {}\n").unwrap();
//! fs::write(repo.join("README.md"), "# widgets").unwrap();
//!
//! let result = count_corpus(corpus.path(), &CountOptions::new(), &AtomicBool::new(false)).unwrap();
//! let rows: Vec<_> = result
//!     .rows
//!     .iter()
//!     .map(|row| (row.repository.to_string(), row.language.to_string(), row.lines))
//!     .collect();
//! assert_eq!(
//!     rows,
//!     vec![
//!         ("acme/widgets".to_string(), "Markdown".to_string(), 1),
//!         ("acme/widgets".to_string(), "Rust".to_string(), 2),
//!     ]
//! );
//! ```

pub mod config;
pub mod corpus;
pub mod counter;
pub mod data;
pub mod error;
pub mod output;
pub mod source;

pub use config::RepolocConfig;
pub use corpus::{clean, fetch_corpus, CleanOutcome, FetchResult};
pub use counter::{count_corpus, CountOptions, CountResult};
pub use data::{
    aggregate, count_lines, AggregateRow, Aggregator, CountFailure, CountFailureKind, FileRecord,
    LanguageTable, LanguageTag, LineCount,
};
pub use error::RepolocError;
pub use output::{ErrorSummary, RepositoryFailure, ReportDestination, ReportWriter};
pub use source::{
    discover_repositories, parse_identifier_list, read_identifier_list, walk, Acquire,
    AcquireFailure, Acquisition, FailureKind, FetchManifest, FetchOptions, Fetcher, FilterConfig,
    GitAcquirer, IdentifierList, InvalidIdentifier, LocalRepository, Outcome, RepositoryHandle,
    RepositoryIdentifier, TraversalFailure, TraversalFailureKind,
};

/// Result type for repoloclib operations
pub type Result<T> = std::result::Result<T, RepolocError>;
