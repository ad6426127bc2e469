//! Output layer: the CSV report and the error summary.
//!
//! Both are pure functions of the aggregated data. Rows arrive already sorted
//! from the aggregator; nothing here reorders or filters them.

pub mod report;
pub mod summary;

pub use report::{write_report, ReportDestination, ReportWriter, REPORT_HEADER};
pub use summary::{ErrorSummary, RepositoryFailure};
