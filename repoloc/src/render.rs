//! Styled run summaries for the terminal.
//!
//! Everything here goes to stderr; stdout is reserved for the CSV report when
//! it is written there.

use console::{style, StyledObject};
use repoloclib::{CleanOutcome, CountResult, FetchResult, ReportDestination};

fn heading(text: &str) -> StyledObject<&str> {
    style(text).bold().for_stderr()
}

fn failure_kind(text: String) -> StyledObject<String> {
    style(text).red().for_stderr()
}

/// Summary of a `fetch` run.
pub fn fetch_summary(result: &FetchResult) {
    let failed: Vec<_> = result.failed().collect();
    eprintln!(
        "{} {} acquired, {} failed, {} rejected",
        heading("Fetch:"),
        style(result.acquired()).green().for_stderr(),
        failed.len(),
        result.rejected.len()
    );
    for handle in failed {
        if let Some(failure) = handle.failure() {
            eprintln!(
                "  {:<40} {} {}",
                handle.identifier.as_str(),
                failure_kind(format!("[{}]", failure.kind)),
                failure.message
            );
        }
    }
    for (line, invalid) in &result.rejected {
        eprintln!("  line {line:<35} {} {invalid}", failure_kind("[invalid]".to_string()));
    }
}

/// Summary of a `count` run.
pub fn count_summary(result: &CountResult, report: &ReportDestination) {
    let summary = &result.summary;
    eprintln!(
        "{} {} lines in {} files across {} repositories ({} rows)",
        heading("Count:"),
        style(result.total_lines()).green().for_stderr(),
        result.files,
        result.repositories,
        result.rows.len()
    );
    if !summary.is_empty() {
        eprintln!(
            "  {} acquisition, {} traversal, {} counting failures",
            summary.acquisition.len(),
            summary.traversal.len(),
            summary.counting.len()
        );
    }
    match report {
        ReportDestination::File(path) => {
            eprintln!("  report: {}", path.display());
            if let Some(summary_path) = report.summary_path() {
                eprintln!("  errors: {}", summary_path.display());
            }
        }
        ReportDestination::Stdout => {}
    }
}

/// Summary of a `clean` run.
pub fn clean_summary(outcome: &CleanOutcome) {
    if outcome.is_empty() {
        eprintln!("{} nothing to remove", heading("Clean:"));
        return;
    }
    eprintln!("{} removed {} paths", heading("Clean:"), outcome.removed.len());
    for path in &outcome.removed {
        eprintln!("  {}", path.display());
    }
}

/// Print a fatal error.
pub fn error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", style("Error:").red().bold().for_stderr());
}
