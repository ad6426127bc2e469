//! Line counting for a single file.
//!
//! A line is a run of bytes ended by `\n`, plus the trailing run before end of
//! file when it is not empty. `"a\nb"` and `"a\nb\n"` are both two lines; an
//! empty file has none.
//!
//! Content is decoded as UTF-8 while it is counted. A NUL byte in the first
//! chunk marks the file as binary and invalid UTF-8 anywhere marks it
//! undecodable; either way the file fails instead of contributing a count.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use utf8_chars::BufReadCharsExt;

use super::FileRecord;

/// Number of leading bytes inspected for a NUL byte.
pub const BINARY_SNIFF_LEN: usize = 8 * 1024;

/// Line count of one file.
pub type LineCount = u64;

/// Why a file was left out of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountFailureKind {
    Binary,
    Undecodable,
    Io,
}

/// A file that could not be counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountFailure {
    pub path: PathBuf,
    pub kind: CountFailureKind,
    pub message: String,
}

impl CountFailure {
    fn new(path: &Path, kind: CountFailureKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind,
            message: message.into(),
        }
    }
}

/// Count the lines of the file behind `file`.
pub fn count_lines(file: &FileRecord) -> Result<LineCount, CountFailure> {
    let handle = File::open(&file.path)
        .map_err(|e| CountFailure::new(&file.path, CountFailureKind::Io, e.to_string()))?;
    count_reader(handle).map_err(|(kind, message)| CountFailure::new(&file.path, kind, message))
}

/// Count lines from any reader.
///
/// This is useful for testing without actual files.
pub fn count_reader<R: Read>(reader: R) -> Result<LineCount, (CountFailureKind, String)> {
    let mut reader = BufReader::with_capacity(BINARY_SNIFF_LEN, reader);

    let head = reader
        .fill_buf()
        .map_err(|e| (CountFailureKind::Io, e.to_string()))?;
    if head.contains(&0) {
        return Err((
            CountFailureKind::Binary,
            "binary content (NUL byte)".to_string(),
        ));
    }

    let mut lines: LineCount = 0;
    let mut partial = false;
    for ch in reader.chars() {
        match ch {
            Ok('\n') => {
                lines += 1;
                partial = false;
            }
            Ok(_) => partial = true,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                ) =>
            {
                return Err((
                    CountFailureKind::Undecodable,
                    format!("not valid UTF-8: {e}"),
                ));
            }
            Err(e) => return Err((CountFailureKind::Io, e.to_string())),
        }
    }
    if partial {
        lines += 1;
    }

    Ok(lines)
}
