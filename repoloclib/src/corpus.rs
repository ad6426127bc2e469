//! Corpus lifecycle: fetching it from an input list and cleaning it up.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use crate::error::RepolocError;
use crate::output::ReportDestination;
use crate::source::{
    read_identifier_list, Acquire, FailureKind, FetchManifest, FetchOptions, Fetcher,
    InvalidIdentifier, RepositoryHandle, RepositoryIdentifier,
};
use crate::Result;

/// Result of a fetch run.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// One handle per valid identifier, sorted by identifier
    pub handles: Vec<RepositoryHandle>,
    /// Input lines that were not valid identifiers, with their line number
    pub rejected: Vec<(usize, InvalidIdentifier)>,
}

impl FetchResult {
    pub fn acquired(&self) -> usize {
        self.handles.iter().filter(|h| h.is_acquired()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RepositoryHandle> {
        self.handles.iter().filter(|h| !h.is_acquired())
    }
}

/// Read the identifier list at `input` and acquire every entry under
/// `destination`.
///
/// The handles are also stored as the fetch manifest, which later `count`
/// runs use to tell failed acquisitions apart from complete ones.
///
/// Leftovers of an acquisition that failed in an earlier run are never
/// removed or overwritten. Their earlier failure is carried into the new
/// manifest, so the partial content stays out of the report until the
/// corpus is cleaned.
pub fn fetch_corpus<A: Acquire + 'static>(
    input: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &FetchOptions,
    acquirer: A,
    should_interrupt: &AtomicBool,
) -> Result<FetchResult> {
    let destination = destination.as_ref();
    let list = read_identifier_list(input)?;
    let (carried, pending) = split_leftovers(destination, &list.identifiers);

    let fetcher = Fetcher::new(acquirer, options.clone());
    let mut handles = fetcher.acquire(&pending, destination, should_interrupt)?;
    handles.extend(carried);

    let manifest = FetchManifest::new(handles);
    manifest.store(destination)?;

    let result = FetchResult {
        handles: manifest.repositories,
        rejected: list.rejected,
    };
    info!(
        acquired = result.acquired(),
        failed = result.failed().count(),
        rejected = result.rejected.len(),
        "fetch finished"
    );
    Ok(result)
}

/// Separate identifiers whose earlier failed acquisition left content in
/// the target (their previous handles) from those to hand to the fetcher.
///
/// Targets that failed because something else occupied them go to the
/// fetcher, which reports them again.
fn split_leftovers(
    destination: &Path,
    identifiers: &[RepositoryIdentifier],
) -> (Vec<RepositoryHandle>, Vec<RepositoryIdentifier>) {
    let previous = FetchManifest::load(destination);
    let mut carried = Vec::new();
    let mut pending = Vec::new();

    for identifier in identifiers {
        let leftover = previous.as_ref().and_then(|manifest| {
            manifest.failed().find(|h| {
                &h.identifier == identifier
                    && h.failure()
                        .is_some_and(|f| f.kind != FailureKind::AlreadyExists)
            })
        });
        match leftover {
            Some(handle) if is_populated(&destination.join(identifier.relative_path())) => {
                warn!(
                    repository = %identifier,
                    "partial content from a failed acquisition left in place, clean to retry"
                );
                carried.push(handle.clone());
            }
            _ => pending.push(identifier.clone()),
        }
    }
    (carried, pending)
}

fn is_populated(target: &Path) -> bool {
    fs::read_dir(target).is_ok_and(|mut entries| entries.next().is_some())
}

/// What `clean` removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanOutcome {
    pub removed: Vec<PathBuf>,
}

impl CleanOutcome {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Remove the destination tree, the report and its error summary.
///
/// Missing paths are not an error, so cleaning twice is the same as cleaning
/// once. A destination that resolves to the filesystem root, the working
/// directory or one of its ancestors is refused.
pub fn clean(destination: impl AsRef<Path>, report: &ReportDestination) -> Result<CleanOutcome> {
    let destination = destination.as_ref();
    guard_destination(destination)?;

    let mut outcome = CleanOutcome::default();

    if remove_path(destination).map_err(|source| RepolocError::Destination {
        path: destination.to_path_buf(),
        source,
    })? {
        outcome.removed.push(destination.to_path_buf());
    }

    if let ReportDestination::File(path) = report {
        let summary = report.summary_path();
        for path in std::iter::once(path.clone()).chain(summary) {
            if path.is_dir() {
                warn!(path = %path.display(), "report path is a directory, leaving it");
                continue;
            }
            if remove_path(&path).map_err(|source| RepolocError::Report {
                path: path.clone(),
                source,
            })? {
                outcome.removed.push(path);
            }
        }
    }

    for path in &outcome.removed {
        info!(path = %path.display(), "removed");
    }
    Ok(outcome)
}

fn guard_destination(destination: &Path) -> Result<()> {
    let resolved = match fs::canonicalize(destination) {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(RepolocError::Destination {
                path: destination.to_path_buf(),
                source,
            })
        }
    };
    let cwd = env::current_dir()?;
    let cwd = fs::canonicalize(&cwd).unwrap_or(cwd);

    if resolved.parent().is_none() || cwd.starts_with(&resolved) {
        return Err(RepolocError::UnsafeClean(destination.to_path_buf()));
    }
    Ok(())
}

/// Remove a file, link or directory tree. Returns whether anything was there.
fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(true)
}
