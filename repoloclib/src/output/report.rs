//! CSV report emission.
//!
//! The report is rewritten from scratch on every run. File reports go through
//! a temporary file in the target directory that is renamed into place only
//! once every row has been written.

use std::borrow::Cow;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::data::AggregateRow;
use crate::error::RepolocError;
use crate::Result;

/// First line of every report.
pub const REPORT_HEADER: &str = "repository,language,lines";

/// Where the report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stdout,
    File(PathBuf),
}

impl ReportDestination {
    /// `-` means standard output, anything else is a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path == Path::new("-") {
            Self::Stdout
        } else {
            Self::File(path.to_path_buf())
        }
    }

    /// Path of the JSON error summary written next to a file report.
    pub fn summary_path(&self) -> Option<PathBuf> {
        match self {
            Self::Stdout => None,
            Self::File(path) => {
                let mut name = path.as_os_str().to_owned();
                name.push(".errors.json");
                Some(PathBuf::from(name))
            }
        }
    }
}

/// Write rows as CSV, header first.
pub fn write_report<W: Write>(rows: &[AggregateRow], mut writer: W) -> io::Result<()> {
    writeln!(writer, "{REPORT_HEADER}")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{}",
            csv_field(row.repository.as_str()),
            csv_field(row.language.as_str()),
            row.lines
        )?;
    }
    writer.flush()
}

/// Quote a field when it holds a separator, a quote or a line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Report sink that is opened before counting starts.
///
/// Creating it checks that the destination is writable, so an unwritable
/// report path fails the run up front rather than after all the work.
pub struct ReportWriter {
    destination: ReportDestination,
    staged: Option<NamedTempFile>,
}

impl ReportWriter {
    pub fn create(destination: ReportDestination) -> Result<Self> {
        let staged = match &destination {
            ReportDestination::Stdout => None,
            ReportDestination::File(path) => Some(stage(path)?),
        };
        Ok(Self {
            destination,
            staged,
        })
    }

    pub fn destination(&self) -> &ReportDestination {
        &self.destination
    }

    /// Write `rows` and move the report into place.
    pub fn commit(self, rows: &[AggregateRow]) -> Result<()> {
        match (self.destination, self.staged) {
            (ReportDestination::File(path), Some(staged)) => {
                let report_error = |source| RepolocError::Report {
                    path: path.clone(),
                    source,
                };
                write_report(rows, BufWriter::new(staged.as_file())).map_err(report_error)?;
                staged.persist(&path).map_err(|e| report_error(e.error))?;
                Ok(())
            }
            _ => {
                let stdout = io::stdout();
                write_report(rows, stdout.lock())?;
                Ok(())
            }
        }
    }
}

fn stage(path: &Path) -> Result<NamedTempFile> {
    let report_error = |source| RepolocError::Report {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(report_error)?;
    if path.is_dir() {
        return Err(report_error(io::Error::other("path is a directory")));
    }
    NamedTempFile::new_in(parent).map_err(report_error)
}
