//! Per-repository, per-language line totals.
//!
//! Totals live in an ordered map keyed by (repository, language), so rows
//! come out sorted by repository and then language no matter in which order
//! files were counted.

use std::collections::BTreeMap;

use super::counter::LineCount;
use super::language::LanguageTag;
use super::FileRecord;
use crate::source::RepositoryIdentifier;

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AggregateRow {
    pub repository: RepositoryIdentifier,
    pub language: LanguageTag,
    pub lines: u64,
}

/// Running sums keyed by (repository, language).
///
/// The aggregator has a single owner; concurrent counters send it their
/// results instead of sharing it.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    totals: BTreeMap<(RepositoryIdentifier, LanguageTag), u64>,
    files: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the line count of one file.
    pub fn record(
        &mut self,
        repository: &RepositoryIdentifier,
        language: &LanguageTag,
        lines: LineCount,
    ) {
        self.files += 1;
        let key = (repository.clone(), language.clone());
        *self.totals.entry(key).or_insert(0) += lines;
    }

    /// Number of files recorded so far.
    pub fn file_count(&self) -> u64 {
        self.files
    }

    /// Number of distinct (repository, language) keys.
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Rows sorted by repository, then language.
    pub fn into_rows(self) -> Vec<AggregateRow> {
        self.totals
            .into_iter()
            .map(|((repository, language), lines)| AggregateRow {
                repository,
                language,
                lines,
            })
            .collect()
    }
}

/// Sum counted files into sorted rows.
pub fn aggregate<I>(records: I) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = (RepositoryIdentifier, FileRecord, LineCount)>,
{
    let mut aggregator = Aggregator::new();
    for (repository, file, lines) in records {
        aggregator.record(&repository, &file.language, lines);
    }
    aggregator.into_rows()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn id(s: &str) -> RepositoryIdentifier {
        s.parse().unwrap()
    }

    fn file(path: &str, language: LanguageTag) -> FileRecord {
        FileRecord {
            path: PathBuf::from(path),
            size: 0,
            language,
        }
    }

    #[test]
    fn test_sums_per_repository_and_language() {
        let rust = LanguageTag::named("Rust");
        let md = LanguageTag::named("Markdown");

        let rows = aggregate(vec![
            (id("acme/one"), file("/a/lib.rs", rust.clone()), 10),
            (id("acme/one"), file("/a/main.rs", rust.clone()), 5),
            (id("acme/one"), file("/a/README.md", md.clone()), 3),
            (id("acme/two"), file("/b/lib.rs", rust.clone()), 7),
        ]);

        assert_eq!(
            rows,
            vec![
                AggregateRow {
                    repository: id("acme/one"),
                    language: md,
                    lines: 3
                },
                AggregateRow {
                    repository: id("acme/one"),
                    language: rust.clone(),
                    lines: 15
                },
                AggregateRow {
                    repository: id("acme/two"),
                    language: rust,
                    lines: 7
                },
            ]
        );
    }

    #[test]
    fn test_order_independent_of_input_order() {
        let records = vec![
            (id("zeta/app"), file("/z/a.py", LanguageTag::named("Python")), 4),
            (id("acme/one"), file("/a/x", LanguageTag::Unclassified), 1),
            (id("acme/one"), file("/a/b.c", LanguageTag::named("C")), 2),
            (id("zeta/app"), file("/z/b.py", LanguageTag::named("Python")), 6),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        assert_eq!(aggregate(records), aggregate(reversed));
    }

    #[test]
    fn test_zero_line_files_still_produce_a_row() {
        let rows = aggregate(vec![(
            id("acme/one"),
            file("/a/empty.rs", LanguageTag::named("Rust")),
            0,
        )]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lines, 0);
    }

    #[test]
    fn test_empty_input() {
        let aggregator = Aggregator::new();

        assert!(aggregator.is_empty());
        assert!(aggregator.into_rows().is_empty());
    }

    #[test]
    fn test_record_counts_files() {
        let mut aggregator = Aggregator::new();
        let rust = LanguageTag::named("Rust");
        aggregator.record(&id("acme/one"), &rust, 3);
        aggregator.record(&id("acme/one"), &rust, 4);

        assert_eq!(aggregator.file_count(), 2);
        assert_eq!(aggregator.len(), 1);
        assert_eq!(aggregator.into_rows()[0].lines, 7);
    }
}
