//! Repository identifiers and the input list they are read from.
//!
//! An identifier names a remote repository in `owner/name` form. The input
//! list holds one identifier per line; blank lines and `#` comments are
//! ignored, and malformed lines are skipped with a warning rather than
//! failing the batch.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::RepolocError;
use crate::Result;

/// A line of the input list that is not a valid identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid repository identifier '{input}': {reason}")]
pub struct InvalidIdentifier {
    pub input: String,
    pub reason: &'static str,
}

/// Name of a remote repository, `owner/name`.
///
/// Identifiers order lexicographically by their string form, which is the
/// order used in reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryIdentifier(String);

impl RepositoryIdentifier {
    /// Parse and validate an identifier.
    pub fn parse(input: &str) -> std::result::Result<Self, InvalidIdentifier> {
        let invalid = |reason| InvalidIdentifier {
            input: input.to_string(),
            reason,
        };

        let (owner, name) = input
            .split_once('/')
            .ok_or_else(|| invalid("expected owner/name"))?;
        if name.contains('/') {
            return Err(invalid("expected exactly one '/'"));
        }
        for segment in [owner, name] {
            if segment.is_empty() {
                return Err(invalid("empty owner or name"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("'.' and '..' are not repository names"));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
            }
        }

        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner part (before the slash).
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or("")
    }

    /// Repository name (after the slash).
    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or("")
    }

    /// Location of this repository relative to a destination root.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.owner()).join(self.name())
    }
}

impl fmt::Display for RepositoryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryIdentifier {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RepositoryIdentifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RepositoryIdentifier> for String {
    fn from(id: RepositoryIdentifier) -> Self {
        id.0
    }
}

/// Parsed input list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierList {
    /// Valid identifiers in input order, duplicates removed
    pub identifiers: Vec<RepositoryIdentifier>,
    /// Rejected lines with their 1-based line number
    pub rejected: Vec<(usize, InvalidIdentifier)>,
}

/// Parse the contents of an input list.
///
/// Duplicate identifiers are dropped after their first occurrence: two
/// workers must never clone into the same directory.
pub fn parse_identifier_list(contents: &str) -> IdentifierList {
    let mut list = IdentifierList::default();
    let mut seen = BTreeSet::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match RepositoryIdentifier::parse(line) {
            Ok(id) => {
                if seen.insert(id.clone()) {
                    list.identifiers.push(id);
                } else {
                    warn!(line = index + 1, identifier = %id, "duplicate identifier skipped");
                }
            }
            Err(err) => {
                warn!(line = index + 1, "{err}, skipped");
                list.rejected.push((index + 1, err));
            }
        }
    }

    list
}

/// Read and parse the input list at `path`.
///
/// An unreadable list is a configuration error: the batch cannot start.
pub fn read_identifier_list(path: impl AsRef<Path>) -> Result<IdentifierList> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| RepolocError::InputList {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(parse_identifier_list(&contents))
}
