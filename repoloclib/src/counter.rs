//! High-level counting API.
//!
//! [`count_corpus`] is the entry point for the `count` stage: it discovers
//! the repositories under a destination root, walks and counts them in
//! parallel and folds every result into one [`Aggregator`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::default_concurrency;
use crate::data::{
    count_lines, AggregateRow, Aggregator, CountFailure, LanguageTable, LanguageTag, LineCount,
};
use crate::error::RepolocError;
use crate::output::{ErrorSummary, RepositoryFailure};
use crate::source::{
    discover_repositories, walk, FetchManifest, FilterConfig, LocalRepository,
    RepositoryIdentifier, TraversalFailure,
};
use crate::Result;

/// Options for a count run.
#[derive(Debug, Clone)]
pub struct CountOptions {
    /// Paths pruned from every repository walk
    pub filter: FilterConfig,
    /// Extension to language mapping
    pub languages: LanguageTable,
    /// Number of counting threads
    pub concurrency: usize,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            filter: FilterConfig::new(),
            languages: LanguageTable::builtin(),
            concurrency: default_concurrency(),
        }
    }
}

impl CountOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exclusion filter.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    /// Set the language table.
    pub fn languages(mut self, languages: LanguageTable) -> Self {
        self.languages = languages;
        self
    }

    /// Set the number of counting threads.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Result of counting a corpus.
#[derive(Debug, Clone, Default)]
pub struct CountResult {
    /// Report rows, sorted by repository then language
    pub rows: Vec<AggregateRow>,
    /// Number of repositories walked
    pub repositories: usize,
    /// Number of files counted
    pub files: u64,
    /// Everything that could not be acquired, traversed or counted
    pub summary: ErrorSummary,
}

impl CountResult {
    /// Total lines over all rows.
    pub fn total_lines(&self) -> u64 {
        self.rows.iter().map(|row| row.lines).sum()
    }
}

/// What a counting worker hands to the aggregating thread.
enum Event {
    Counted {
        repository: RepositoryIdentifier,
        language: LanguageTag,
        lines: LineCount,
    },
    Traversal(RepositoryIdentifier, TraversalFailure),
    Counting(RepositoryIdentifier, CountFailure),
}

/// Count every repository under `destination`.
///
/// Repositories whose last fetch failed, according to the fetch manifest,
/// are left out and their acquisition failures are carried into the
/// summary. Unreadable paths and uncountable files are recorded and skipped.
///
/// Returns [`RepolocError::Interrupted`] if `should_interrupt` was raised
/// before the run finished; partial totals are discarded.
pub fn count_corpus(
    destination: impl AsRef<Path>,
    options: &CountOptions,
    should_interrupt: &AtomicBool,
) -> Result<CountResult> {
    let destination = destination.as_ref();
    if options.concurrency == 0 {
        return Err(RepolocError::Config(
            "concurrency must be at least 1".to_string(),
        ));
    }

    let (discovered, listing_failures) = discover_repositories(destination)?;
    let mut summary = ErrorSummary::default();
    summary.traversal.extend(
        listing_failures
            .into_iter()
            .map(RepositoryFailure::unattributed),
    );

    let repositories: Vec<LocalRepository> = match FetchManifest::load(destination) {
        Some(manifest) => {
            for handle in manifest.failed() {
                if let Some(failure) = handle.failure() {
                    summary
                        .acquisition
                        .push(RepositoryFailure::new(&handle.identifier, failure.clone()));
                }
            }
            discovered
                .into_iter()
                .filter(|repository| {
                    let failed = manifest.is_failed(&repository.identifier);
                    if failed {
                        warn!(repository = %repository.identifier, "last fetch failed, skipping");
                    }
                    !failed
                })
                .collect()
        }
        None => discovered,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency)
        .thread_name(|i| format!("repoloc-count-{i}"))
        .build()?;

    info!(
        repositories = repositories.len(),
        concurrency = options.concurrency,
        destination = %destination.display(),
        "counting repositories"
    );

    let (tx, rx) = mpsc::channel();
    let (aggregator, mut summary) = thread::scope(|scope| {
        let collector = scope.spawn(move || collect(rx, summary));
        pool.install(|| {
            repositories.par_iter().for_each_with(tx, |tx, repository| {
                count_repository(repository, options, should_interrupt, tx)
            });
        });
        collector
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    });

    if should_interrupt.load(Ordering::Relaxed) {
        return Err(RepolocError::Interrupted);
    }

    summary.sort();
    let files = aggregator.file_count();
    let rows = aggregator.into_rows();
    info!(
        rows = rows.len(),
        files,
        failures = summary.len(),
        "counting finished"
    );

    Ok(CountResult {
        rows,
        repositories: repositories.len(),
        files,
        summary,
    })
}

fn count_repository(
    repository: &LocalRepository,
    options: &CountOptions,
    should_interrupt: &AtomicBool,
    tx: &mut Sender<Event>,
) {
    if should_interrupt.load(Ordering::Relaxed) {
        return;
    }
    info!(repository = %repository.identifier, "walking");

    walk(&repository.root, &options.filter, &options.languages)
        .take_while(|_| !should_interrupt.load(Ordering::Relaxed))
        .par_bridge()
        .for_each_with(tx.clone(), |tx, item| {
            let identifier = repository.identifier.clone();
            let event = match item {
                Ok(file) => match count_lines(&file) {
                    Ok(lines) => {
                        debug!(path = %file.path.display(), lines, "processed");
                        Event::Counted {
                            repository: identifier,
                            language: file.language,
                            lines,
                        }
                    }
                    Err(failure) => {
                        warn!(
                            path = %failure.path.display(),
                            kind = ?failure.kind,
                            "skipping file: {}",
                            failure.message
                        );
                        Event::Counting(identifier, failure)
                    }
                },
                Err(failure) => {
                    warn!(
                        path = %failure.path.display(),
                        kind = ?failure.kind,
                        "cannot traverse: {}",
                        failure.message
                    );
                    Event::Traversal(identifier, failure)
                }
            };
            // The collector outlives every sender.
            let _ = tx.send(event);
        });
}

/// Single owner of the running totals.
fn collect(events: Receiver<Event>, mut summary: ErrorSummary) -> (Aggregator, ErrorSummary) {
    let mut aggregator = Aggregator::new();
    for event in events {
        match event {
            Event::Counted {
                repository,
                language,
                lines,
            } => aggregator.record(&repository, &language, lines),
            Event::Traversal(repository, failure) => summary
                .traversal
                .push(RepositoryFailure::new(&repository, failure)),
            Event::Counting(repository, failure) => summary
                .counting
                .push(RepositoryFailure::new(&repository, failure)),
        }
    }
    (aggregator, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountFailureKind;
    use crate::source::{
        AcquireFailure, FailureKind, Outcome, RepositoryHandle, TraversalFailureKind,
    };
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, relative: &str, contents: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn create_corpus(root: &Path) {
        write(root, "acme/one/src/main.rs", b"fn main() {\n    run();\n}\n");
        write(root, "acme/one/src/lib.rs", b"pub fn run() {}");
        write(root, "acme/one/README.md", b"# one\n\nHello\n");
        write(root, "acme/one/Makefile", b"all:\n\tcargo build\n");
        write(root, "acme/one/.git/HEAD", b"ref: refs/heads/main\n");
        write(root, "acme/one/.git/hooks/pre-commit.py", b"import sys\nsys.exit(0)\n");
        write(root, "zeta/two/app.py", b"print('a')\nprint('b')\n");
        write(root, "zeta/two/logo.png", b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR");
    }

    fn rows(result: &CountResult) -> Vec<(String, String, u64)> {
        result
            .rows
            .iter()
            .map(|row| {
                (
                    row.repository.to_string(),
                    row.language.to_string(),
                    row.lines,
                )
            })
            .collect()
    }

    fn row(repository: &str, language: &str, lines: u64) -> (String, String, u64) {
        (repository.to_string(), language.to_string(), lines)
    }

    fn count(root: &Path) -> CountResult {
        count_corpus(root, &CountOptions::new().concurrency(2), &AtomicBool::new(false)).unwrap()
    }

    #[test]
    fn test_count_corpus() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());

        let result = count(temp.path());

        assert_eq!(
            rows(&result),
            vec![
                row("acme/one", "Markdown", 3),
                row("acme/one", "Rust", 4),
                row("acme/one", "Unclassified", 2),
                row("zeta/two", "Python", 2),
            ]
        );
        assert_eq!(result.repositories, 2);
        assert_eq!(result.files, 5);
        assert_eq!(result.total_lines(), 11);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().unwrap();
        write(temp.path(), "acme/one/a.rs", b"fn a() {}\n");
        write(temp.path(), "acme/one/locked/b.rs", b"fn b() {}\n");
        let locked = temp.path().join("acme/one/locked");

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users read through the mode bits.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = count(temp.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(rows(&result), vec![row("acme/one", "Rust", 1)]);
        assert_eq!(result.summary.traversal.len(), 1);
        let failure = &result.summary.traversal[0];
        assert_eq!(
            failure.repository.as_ref().map(|r| r.as_str()),
            Some("acme/one")
        );
        assert_eq!(failure.failure.kind, TraversalFailureKind::PermissionDenied);
        assert!(failure.failure.path.ends_with("locked"));
    }

    #[test]
    fn test_binary_file_is_reported_not_counted() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());

        let result = count(temp.path());

        assert_eq!(result.summary.counting.len(), 1);
        let failure = &result.summary.counting[0];
        assert_eq!(failure.repository.as_ref().unwrap().as_str(), "zeta/two");
        assert_eq!(failure.failure.kind, CountFailureKind::Binary);
        assert!(failure.failure.path.ends_with("logo.png"));
        assert!(!result
            .rows
            .iter()
            .any(|row| row.language == LanguageTag::Unclassified
                && row.repository.as_str() == "zeta/two"));
    }

    #[test]
    fn test_vcs_metadata_is_never_counted() {
        let temp = tempdir().unwrap();
        write(temp.path(), "acme/one/.git/config", b"[core]\n");
        write(temp.path(), "acme/one/.git/objects/x.rs", b"fn x() {}\n");

        let result = count(temp.path());

        assert!(result.rows.is_empty());
        assert_eq!(result.files, 0);
    }

    #[test]
    fn test_identical_runs_produce_identical_rows() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());
        for i in 0..20 {
            write(
                temp.path(),
                &format!("acme/one/gen/file{i}.rs"),
                "x\n".repeat(i + 1).as_bytes(),
            );
        }

        let first = count(temp.path());
        let second = count_corpus(
            temp.path(),
            &CountOptions::new().concurrency(1),
            &AtomicBool::new(false),
        )
        .unwrap();

        assert_eq!(first.rows, second.rows);
        assert_eq!(first.summary, second.summary);
    }

    #[test]
    fn test_empty_repository_has_no_rows() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("acme/empty")).unwrap();

        let result = count(temp.path());

        assert_eq!(result.repositories, 1);
        assert!(result.rows.is_empty());
        assert!(result.summary.is_empty());
    }

    #[test]
    fn test_rows_sum_to_counted_files() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());

        let result = count(temp.path());

        let languages = LanguageTable::builtin();
        let filter = FilterConfig::new();
        let expected: u64 = ["acme/one", "zeta/two"]
            .iter()
            .flat_map(|repo| walk(temp.path().join(repo), &filter, &languages))
            .filter_map(|item| item.ok())
            .filter_map(|file| count_lines(&file).ok())
            .sum();
        assert_eq!(result.total_lines(), expected);
    }

    #[test]
    fn test_exclusions_apply() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());

        let options = CountOptions::new()
            .concurrency(2)
            .filter(FilterConfig::new().exclude("*.md").unwrap());
        let result = count_corpus(temp.path(), &options, &AtomicBool::new(false)).unwrap();

        assert!(!result
            .rows
            .iter()
            .any(|row| row.language == LanguageTag::named("Markdown")));
    }

    #[test]
    fn test_failed_fetch_is_reported_and_skipped() {
        let temp = tempdir().unwrap();
        write(temp.path(), "acme/one/a.rs", b"fn a() {}\n");
        write(temp.path(), "acme/two/partial.rs", b"fn partial() {}\n");
        write(temp.path(), "acme/three/c.rs", b"fn c() {}\n");

        let handle = |id: &str, outcome: Outcome| RepositoryHandle {
            identifier: id.parse().unwrap(),
            root: None,
            outcome,
        };
        FetchManifest::new(vec![
            handle(
                "acme/one",
                Outcome::Acquired {
                    via: crate::source::Acquisition::Cloned,
                },
            ),
            handle(
                "acme/two",
                Outcome::Failed(AcquireFailure::new(FailureKind::Timeout, "no result")),
            ),
        ])
        .store(temp.path())
        .unwrap();

        let result = count(temp.path());

        assert_eq!(
            rows(&result),
            vec![row("acme/one", "Rust", 1), row("acme/three", "Rust", 1)]
        );
        assert_eq!(result.summary.acquisition.len(), 1);
        assert_eq!(
            result.summary.acquisition[0].repository.as_ref().unwrap().as_str(),
            "acme/two"
        );
        assert_eq!(result.summary.acquisition[0].failure.kind, FailureKind::Timeout);
    }

    #[test]
    fn test_interrupted_run_returns_error() {
        let temp = tempdir().unwrap();
        create_corpus(temp.path());

        let result = count_corpus(temp.path(), &CountOptions::new(), &AtomicBool::new(true));

        assert!(matches!(result, Err(RepolocError::Interrupted)));
    }

    #[test]
    fn test_missing_destination() {
        let result = count_corpus(
            "/nonexistent/repoloc/corpus",
            &CountOptions::new(),
            &AtomicBool::new(false),
        );

        assert!(matches!(result, Err(RepolocError::PathNotFound(_))));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let temp = tempdir().unwrap();

        let result = count_corpus(
            temp.path(),
            &CountOptions::new().concurrency(0),
            &AtomicBool::new(false),
        );

        assert!(matches!(result, Err(RepolocError::Config(_))));
    }
}
