//! Lazy traversal of acquired repositories.
//!
//! [`walk`] yields one [`FileRecord`] per regular file under a root, depth
//! first with directory entries in file-name order, so the same tree always
//! produces the same sequence. Paths that cannot be inspected come out as
//! [`TraversalFailure`] items in the same stream and the walk carries on with
//! their siblings.
//!
//! Symbolic links are never followed. A link into the root is skipped since
//! its target is visited at its real location, a link leaving the root is
//! excluded, and a dangling link is reported as a failure.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use walkdir::{DirEntry, WalkDir};

use super::filter::{is_vcs_metadata, FilterConfig};
use super::identifier::RepositoryIdentifier;
use crate::data::{FileRecord, LanguageTable};
use crate::error::RepolocError;
use crate::Result;

/// Why a path could not be traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraversalFailureKind {
    PermissionDenied,
    BrokenSymlink,
    Metadata,
}

/// A path the walker could not inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalFailure {
    pub path: PathBuf,
    pub kind: TraversalFailureKind,
    pub message: String,
}

impl TraversalFailure {
    fn from_io(path: PathBuf, err: &io::Error) -> Self {
        let kind = if err.kind() == io::ErrorKind::PermissionDenied {
            TraversalFailureKind::PermissionDenied
        } else {
            TraversalFailureKind::Metadata
        };
        Self {
            path,
            kind,
            message: err.to_string(),
        }
    }

    fn from_walkdir(root: &Path, err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        match err.io_error() {
            Some(io_err) => Self::from_io(path, io_err),
            // Loop detection only fires when following links, which we never do.
            None => Self {
                path,
                kind: TraversalFailureKind::Metadata,
                message: err.to_string(),
            },
        }
    }
}

/// Lazy sequence of files under one root.
pub struct Walk<'a> {
    root: PathBuf,
    entries: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send + 'a>,
    languages: &'a LanguageTable,
}

/// Walk `root`, yielding files that survive `filter`, classified by `languages`.
///
/// The root is canonicalized first, so every record carries an absolute path.
pub fn walk<'a>(
    root: impl AsRef<Path>,
    filter: &'a FilterConfig,
    languages: &'a LanguageTable,
) -> Walk<'a> {
    let root = root.as_ref();
    let root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

    let prune_root = root.clone();
    let entries = WalkDir::new(&root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |e| {
            // Always include the root directory
            if e.depth() == 0 {
                return true;
            }
            if is_vcs_metadata(e.file_name()) {
                return false;
            }
            match e.path().strip_prefix(&prune_root) {
                Ok(relative) => !filter.is_excluded(relative),
                Err(_) => true,
            }
        });

    Walk {
        root,
        entries: Box::new(entries),
        languages,
    }
}

impl Walk<'_> {
    fn visit(&self, entry: DirEntry) -> Option<std::result::Result<FileRecord, TraversalFailure>> {
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            return self.visit_symlink(entry.path());
        }
        if !file_type.is_file() {
            // Directories are descended into by walkdir; sockets, FIFOs and
            // devices are not source files.
            return None;
        }

        match entry.metadata() {
            Ok(metadata) => {
                let path = entry.into_path();
                let language = self.languages.classify(&path);
                Some(Ok(FileRecord {
                    path,
                    size: metadata.len(),
                    language,
                }))
            }
            Err(err) => Some(Err(TraversalFailure::from_walkdir(&self.root, err))),
        }
    }

    fn visit_symlink(
        &self,
        path: &Path,
    ) -> Option<std::result::Result<FileRecord, TraversalFailure>> {
        match fs::canonicalize(path) {
            Ok(target) if target.starts_with(&self.root) => {
                trace!(path = %path.display(), "skipping symlink into the walked tree");
                None
            }
            Ok(target) => {
                trace!(
                    path = %path.display(),
                    target = %target.display(),
                    "excluding symlink leaving the walked tree"
                );
                None
            }
            Err(err) => Some(Err(TraversalFailure {
                path: path.to_path_buf(),
                kind: TraversalFailureKind::BrokenSymlink,
                message: err.to_string(),
            })),
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = std::result::Result<FileRecord, TraversalFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(TraversalFailure::from_walkdir(&self.root, err))),
            };
            if let Some(item) = self.visit(entry) {
                return Some(item);
            }
        }
    }
}

/// A repository found under a destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepository {
    pub identifier: RepositoryIdentifier,
    pub root: PathBuf,
}

/// List the `owner/name` repositories under `destination`, sorted.
///
/// Loose files (such as the fetch manifest) and directories whose names do
/// not form a valid identifier are skipped. Unreadable owner directories are
/// returned as failures next to the repositories that could be listed.
pub fn discover_repositories(
    destination: impl AsRef<Path>,
) -> Result<(Vec<LocalRepository>, Vec<TraversalFailure>)> {
    let destination = destination.as_ref();
    if !destination.is_dir() {
        return Err(RepolocError::PathNotFound(destination.to_path_buf()));
    }

    let mut repositories = Vec::new();
    let mut failures = Vec::new();

    let walker = WalkDir::new(destination)
        .follow_links(false)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_vcs_metadata(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                failures.push(TraversalFailure::from_walkdir(destination, err));
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(destination) else {
            continue;
        };
        let candidate = relative.to_string_lossy().replace('\\', "/");
        match RepositoryIdentifier::parse(&candidate) {
            Ok(identifier) => repositories.push(LocalRepository {
                identifier,
                root: entry.into_path(),
            }),
            Err(err) => warn!("{err}, skipping directory"),
        }
    }

    Ok((repositories, failures))
}
