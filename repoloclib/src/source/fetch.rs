//! Parallel, best-effort acquisition of repositories.
//!
//! The [`Fetcher`] runs every identifier through an [`Acquire`] backend on a
//! bounded worker pool. Each identifier ends up with exactly one
//! [`RepositoryHandle`]: a failure is recorded in that handle and never stops
//! the rest of the batch. There is one attempt per identifier, no retries.
//!
//! A target directory that already has content is not touched and counts as
//! acquired, which makes repeated fetches idempotent.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::identifier::RepositoryIdentifier;
use crate::config::default_concurrency;
use crate::error::RepolocError;
use crate::Result;

/// Default deadline for one acquisition.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// File, directly under the destination root, holding the last fetch's handles.
pub const MANIFEST_FILE: &str = ".repoloc-fetch.json";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Category of an acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Network,
    Auth,
    NotFound,
    Timeout,
    Cancelled,
    AlreadyExists,
    Io,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::NotFound => "not-found",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::AlreadyExists => "already-exists",
            Self::Io => "io",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one repository could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct AcquireFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AcquireFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn io(err: &io::Error) -> Self {
        Self::new(FailureKind::Io, err.to_string())
    }
}

/// Backend that materializes one repository into a directory.
///
/// Implementations must give up promptly once `should_interrupt` is set; the
/// fetcher raises it on timeout and on batch cancellation.
pub trait Acquire: Send + Sync {
    fn acquire(
        &self,
        identifier: &RepositoryIdentifier,
        target: &Path,
        should_interrupt: &AtomicBool,
    ) -> std::result::Result<(), AcquireFailure>;
}

/// How an acquired repository got onto disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acquisition {
    /// Fetched during this run
    Cloned,
    /// Target already had content and was left alone
    Existing,
}

/// Result of acquiring one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Acquired { via: Acquisition },
    Failed(AcquireFailure),
}

/// Acquisition result for one identifier. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    pub identifier: RepositoryIdentifier,
    /// Local root, present only when acquired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    pub outcome: Outcome,
}

impl RepositoryHandle {
    fn acquired(identifier: &RepositoryIdentifier, root: PathBuf, via: Acquisition) -> Self {
        Self {
            identifier: identifier.clone(),
            root: Some(root),
            outcome: Outcome::Acquired { via },
        }
    }

    fn failed(identifier: &RepositoryIdentifier, failure: AcquireFailure) -> Self {
        Self {
            identifier: identifier.clone(),
            root: None,
            outcome: Outcome::Failed(failure),
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self.outcome, Outcome::Acquired { .. })
    }

    pub fn failure(&self) -> Option<&AcquireFailure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            Outcome::Acquired { .. } => None,
        }
    }
}

/// Options for a fetch batch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum number of acquisitions in flight
    pub concurrency: usize,
    /// Deadline for each acquisition
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of parallel acquisitions.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the per-repository deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Bounded pool of acquisitions over one [`Acquire`] backend.
pub struct Fetcher<A> {
    acquirer: Arc<A>,
    options: FetchOptions,
}

impl<A: Acquire + 'static> Fetcher<A> {
    pub fn new(acquirer: A, options: FetchOptions) -> Self {
        Self {
            acquirer: Arc::new(acquirer),
            options,
        }
    }

    /// Acquire every identifier under `destination/<owner>/<name>`.
    ///
    /// Returns one handle per identifier, in no particular order. Only an
    /// invalid configuration or an unwritable destination is an error. Once
    /// `should_interrupt` is set, identifiers not yet started are marked
    /// cancelled and in-flight ones are asked to stop.
    pub fn acquire(
        &self,
        identifiers: &[RepositoryIdentifier],
        destination: &Path,
        should_interrupt: &AtomicBool,
    ) -> Result<Vec<RepositoryHandle>> {
        if self.options.concurrency == 0 {
            return Err(RepolocError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        prepare_destination(destination)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.concurrency)
            .thread_name(|i| format!("repoloc-fetch-{i}"))
            .build()?;

        info!(
            repositories = identifiers.len(),
            concurrency = self.options.concurrency,
            destination = %destination.display(),
            "fetching repositories"
        );

        let handles: Vec<RepositoryHandle> = pool.install(|| {
            identifiers
                .par_iter()
                .map(|id| self.acquire_one(id, destination, should_interrupt))
                .collect()
        });

        Ok(handles)
    }

    fn acquire_one(
        &self,
        identifier: &RepositoryIdentifier,
        destination: &Path,
        should_interrupt: &AtomicBool,
    ) -> RepositoryHandle {
        if should_interrupt.load(Ordering::Relaxed) {
            return RepositoryHandle::failed(
                identifier,
                AcquireFailure::new(FailureKind::Cancelled, "batch interrupted before start"),
            );
        }

        let target = destination.join(identifier.relative_path());
        match target_state(&target) {
            Ok(TargetState::Populated) => {
                info!(repository = %identifier, "already present, skipping");
                return RepositoryHandle::acquired(identifier, target, Acquisition::Existing);
            }
            Ok(TargetState::Vacant) => {}
            Err(failure) => return RepositoryHandle::failed(identifier, failure),
        }
        if let Some(parent) = target.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                return RepositoryHandle::failed(identifier, AcquireFailure::io(&err));
            }
        }

        debug!(repository = %identifier, target = %target.display(), "acquiring");
        let started = Instant::now();
        match self.run_with_deadline(identifier, &target, should_interrupt) {
            Ok(()) => {
                info!(repository = %identifier, elapsed = ?started.elapsed(), "acquired");
                RepositoryHandle::acquired(identifier, target, Acquisition::Cloned)
            }
            Err(failure) => {
                warn!(repository = %identifier, "acquisition failed: {failure}");
                RepositoryHandle::failed(identifier, failure)
            }
        }
    }

    /// Run the backend on its own thread and wait for it, at most until the
    /// deadline. A timed-out backend is told to stop and left to wind down
    /// on its own.
    ///
    /// The detached worker keeps writing into `target` until the backend
    /// observes its interrupt flag, so the target may still change for a
    /// short while after this returns a timeout or cancellation.
    fn run_with_deadline(
        &self,
        identifier: &RepositoryIdentifier,
        target: &Path,
        should_interrupt: &AtomicBool,
    ) -> std::result::Result<(), AcquireFailure> {
        let interrupt = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        {
            let acquirer = Arc::clone(&self.acquirer);
            let interrupt = Arc::clone(&interrupt);
            let identifier = identifier.clone();
            let target = target.to_path_buf();
            thread::Builder::new()
                .name(format!("repoloc-acquire-{}", identifier))
                .spawn(move || {
                    let result = acquirer.acquire(&identifier, &target, &interrupt);
                    // The receiver is gone when the deadline already passed.
                    let _ = tx.send(result);
                })
                .map_err(|e| AcquireFailure::io(&e))?;
        }

        let deadline = Instant::now() + self.options.timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                interrupt.store(true, Ordering::Relaxed);
                return Err(AcquireFailure::new(
                    FailureKind::Timeout,
                    format!("no result after {:?}", self.options.timeout),
                ));
            }

            match rx.recv_timeout(POLL_INTERVAL.min(deadline - now)) {
                Ok(result) => return result,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if should_interrupt.load(Ordering::Relaxed) {
                        interrupt.store(true, Ordering::Relaxed);
                    }
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(AcquireFailure::new(
                        FailureKind::Other,
                        "acquisition worker exited without a result",
                    ));
                }
            }
        }
    }
}

enum TargetState {
    Vacant,
    Populated,
}

fn target_state(target: &Path) -> std::result::Result<TargetState, AcquireFailure> {
    let metadata = match fs::symlink_metadata(target) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(TargetState::Vacant),
        Err(err) => return Err(AcquireFailure::io(&err)),
    };
    if !metadata.is_dir() {
        return Err(AcquireFailure::new(
            FailureKind::AlreadyExists,
            format!("{} exists and is not a directory", target.display()),
        ));
    }

    let mut entries = fs::read_dir(target).map_err(|e| AcquireFailure::io(&e))?;
    if entries.next().is_some() {
        Ok(TargetState::Populated)
    } else {
        Ok(TargetState::Vacant)
    }
}

fn prepare_destination(destination: &Path) -> Result<()> {
    let destination_error = |source| RepolocError::Destination {
        path: destination.to_path_buf(),
        source,
    };
    fs::create_dir_all(destination).map_err(destination_error)?;
    tempfile::tempfile_in(destination).map_err(destination_error)?;
    Ok(())
}

/// Handles of the last fetch, stored next to the repositories.
///
/// `count` reads it to report acquisition failures and to leave out
/// repositories whose last acquisition failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchManifest {
    pub repositories: Vec<RepositoryHandle>,
}

impl FetchManifest {
    /// Build a manifest, sorted by identifier.
    pub fn new(mut handles: Vec<RepositoryHandle>) -> Self {
        handles.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Self {
            repositories: handles,
        }
    }

    pub fn path(destination: &Path) -> PathBuf {
        destination.join(MANIFEST_FILE)
    }

    /// Write the manifest, replacing any previous one.
    pub fn store(&self, destination: &Path) -> Result<()> {
        let path = Self::path(destination);
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&path, json).map_err(|e| RepolocError::Destination { path, source: e })
    }

    /// Read the manifest under `destination`, if there is a usable one.
    pub fn load(destination: &Path) -> Option<Self> {
        let path = Self::path(destination);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(path = %path.display(), "cannot read fetch manifest: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                warn!(path = %path.display(), "ignoring malformed fetch manifest: {err}");
                None
            }
        }
    }

    /// Handles whose acquisition failed.
    pub fn failed(&self) -> impl Iterator<Item = &RepositoryHandle> {
        self.repositories.iter().filter(|h| !h.is_acquired())
    }

    pub fn is_failed(&self, identifier: &RepositoryIdentifier) -> bool {
        self.failed().any(|h| &h.identifier == identifier)
    }
}
