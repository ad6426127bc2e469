//! Structured summary of everything that failed during a run.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::CountFailure;
use crate::error::RepolocError;
use crate::source::{AcquireFailure, RepositoryIdentifier, TraversalFailure};
use crate::Result;

/// A failure attributed to a repository.
///
/// `repository` is absent for failures found while listing the destination
/// root itself, before any repository is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFailure<F> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryIdentifier>,
    #[serde(flatten)]
    pub failure: F,
}

impl<F> RepositoryFailure<F> {
    pub fn new(repository: &RepositoryIdentifier, failure: F) -> Self {
        Self {
            repository: Some(repository.clone()),
            failure,
        }
    }

    pub fn unattributed(failure: F) -> Self {
        Self {
            repository: None,
            failure,
        }
    }
}

/// Per-item failures of a run, grouped by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub acquisition: Vec<RepositoryFailure<AcquireFailure>>,
    pub traversal: Vec<RepositoryFailure<TraversalFailure>>,
    pub counting: Vec<RepositoryFailure<CountFailure>>,
}

impl ErrorSummary {
    pub fn is_empty(&self) -> bool {
        self.acquisition.is_empty() && self.traversal.is_empty() && self.counting.is_empty()
    }

    pub fn len(&self) -> usize {
        self.acquisition.len() + self.traversal.len() + self.counting.len()
    }

    /// Order every list by repository, then path, so identical runs produce
    /// identical summaries.
    pub fn sort(&mut self) {
        self.acquisition
            .sort_by(|a, b| a.repository.cmp(&b.repository));
        self.traversal.sort_by(|a, b| {
            (&a.repository, &a.failure.path).cmp(&(&b.repository, &b.failure.path))
        });
        self.counting.sort_by(|a, b| {
            (&a.repository, &a.failure.path).cmp(&(&b.repository, &b.failure.path))
        });
    }

    /// Write the summary as pretty-printed JSON, replacing any previous one.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json).map_err(|e| RepolocError::Report {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CountFailureKind;
    use crate::source::{FailureKind, TraversalFailureKind};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn id(s: &str) -> RepositoryIdentifier {
        s.parse().unwrap()
    }

    fn count_failure(path: &str) -> CountFailure {
        CountFailure {
            path: PathBuf::from(path),
            kind: CountFailureKind::Binary,
            message: "binary content (NUL byte)".to_string(),
        }
    }

    #[test]
    fn test_sort_orders_by_repository_then_path() {
        let mut summary = ErrorSummary {
            counting: vec![
                RepositoryFailure::new(&id("b/b"), count_failure("/b/a.png")),
                RepositoryFailure::new(&id("a/a"), count_failure("/a/z.png")),
                RepositoryFailure::new(&id("a/a"), count_failure("/a/b.png")),
            ],
            ..Default::default()
        };
        summary.sort();

        let paths: Vec<&str> = summary
            .counting
            .iter()
            .map(|f| f.failure.path.to_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["/a/b.png", "/a/z.png", "/b/a.png"]);
    }

    #[test]
    fn test_json_shape() {
        let summary = ErrorSummary {
            acquisition: vec![RepositoryFailure::new(
                &id("acme/two"),
                AcquireFailure::new(FailureKind::NotFound, "repository not found"),
            )],
            traversal: vec![RepositoryFailure::unattributed(TraversalFailure {
                path: PathBuf::from("/corpus/locked"),
                kind: TraversalFailureKind::PermissionDenied,
                message: "Permission denied".to_string(),
            })],
            counting: vec![RepositoryFailure::new(&id("acme/one"), count_failure("/x.bin"))],
        };

        let value = serde_json::to_value(&summary).unwrap();

        assert_eq!(value["acquisition"][0]["repository"], "acme/two");
        assert_eq!(value["acquisition"][0]["kind"], "not-found");
        assert!(value["traversal"][0].get("repository").is_none());
        assert_eq!(value["traversal"][0]["kind"], "permission-denied");
        assert_eq!(value["counting"][0]["kind"], "binary");
        assert_eq!(value["counting"][0]["path"], "/x.bin");
        assert_eq!(summary.len(), 3);
    }

    #[test]
    fn test_write_json() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("report.csv.errors.json");

        ErrorSummary::default().write_json(&path).unwrap();

        let written: ErrorSummary =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written.is_empty());
    }
}
