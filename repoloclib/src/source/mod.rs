//! Source stage: where the files to count come from.
//!
//! - **Identifiers**: parse the repository list
//! - **Fetching**: acquire repositories in parallel, best effort
//! - **Walking**: lazily enumerate the files of acquired repositories
//!
//! ## Example
//!
//! ```rust,ignore
//! use repoloclib::source::{read_identifier_list, Fetcher, FetchOptions, GitAcquirer};
//! use std::sync::atomic::AtomicBool;
//!
//! let list = read_identifier_list("repos.txt")?;
//! let fetcher = Fetcher::new(GitAcquirer::new(), FetchOptions::new().concurrency(8));
//! let handles = fetcher.acquire(&list.identifiers, "repos".as_ref(), &AtomicBool::new(false))?;
//! ```

pub mod fetch;
pub mod filter;
pub mod git;
pub mod identifier;
pub mod walk;

pub use fetch::{
    Acquire, AcquireFailure, Acquisition, FailureKind, FetchManifest, FetchOptions, Fetcher,
    Outcome, RepositoryHandle, DEFAULT_TIMEOUT, MANIFEST_FILE,
};
pub use filter::{is_vcs_metadata, FilterConfig, VCS_METADATA};
pub use git::{GitAcquirer, DEFAULT_URL_TEMPLATE};
pub use identifier::{
    parse_identifier_list, read_identifier_list, IdentifierList, InvalidIdentifier,
    RepositoryIdentifier,
};
pub use walk::{
    discover_repositories, walk, LocalRepository, TraversalFailure, TraversalFailureKind, Walk,
};
