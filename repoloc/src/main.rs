//! # repoloc
//!
//! Collect a corpus of git repositories and report lines per repository and
//! language as CSV.
//!
//! ## Usage
//!
//! ```bash
//! # Clone every owner/name listed in repos.txt under ./repos
//! repoloc fetch --input repos.txt
//!
//! # Count the corpus into report.csv (and report.csv.errors.json)
//! repoloc count
//!
//! # Write the CSV to stdout instead, skipping vendored code
//! repoloc count --report - --exclude "**/vendor"
//!
//! # Remove the corpus, the report and the error summary
//! repoloc clean
//! ```
//!
//! Settings can also come from `repoloc.toml` in the working directory and
//! from `REPOLOC_*` environment variables. Flags win over both.
//!
//! Exit status is 0 whenever the batch ran to completion, even if single
//! repositories or files failed; 1 for configuration errors; 130 when the
//! run was interrupted.

mod render;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use repoloclib::{clean, count_corpus, fetch_corpus, RepolocError, ReportWriter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use settings::Settings;

/// Exit status for a run stopped by SIGINT or SIGTERM.
const EXIT_INTERRUPTED: u8 = 130;

/// Build the clap Command structure
fn build_command() -> Command {
    Command::new("repoloc")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Arthur Debert")
        .about("Fetch a corpus of repositories and count lines per repository and language")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (defaults to ./repoloc.toml when present)"),
        )
        .arg(
            Arg::new("destination")
                .short('d')
                .long("destination")
                .global(true)
                .env("REPOLOC_DESTINATION")
                .value_parser(value_parser!(PathBuf))
                .help("Root directory of the corpus [default: repos]"),
        )
        .arg(
            Arg::new("report")
                .short('r')
                .long("report")
                .global(true)
                .env("REPOLOC_REPORT")
                .value_parser(value_parser!(PathBuf))
                .help("CSV report path, '-' for stdout [default: report.csv]"),
        )
        .arg(
            Arg::new("concurrency")
                .short('j')
                .long("concurrency")
                .global(true)
                .env("REPOLOC_CONCURRENCY")
                .value_parser(value_parser!(u64).range(1..))
                .help("Number of parallel workers [default: number of CPUs]"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("More logging (-v debug, -vv trace); RUST_LOG overrides"),
        )
        .subcommand(
            Command::new("clean").about("Remove the corpus, the report and the error summary"),
        )
        .subcommand(
            Command::new("fetch")
                .about("Acquire every repository in the input list")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .env("REPOLOC_INPUT")
                        .value_parser(value_parser!(PathBuf))
                        .help("Repository list, one owner/name per line [default: repos.txt]"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .env("REPOLOC_TIMEOUT")
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Seconds allowed per repository [default: 600]"),
                )
                .arg(
                    Arg::new("url-template")
                        .long("url-template")
                        .help("Clone URL with an {id} placeholder for owner/name"),
                )
                .arg(
                    Arg::new("full-clone")
                        .long("full-clone")
                        .action(ArgAction::SetTrue)
                        .help("Fetch full history instead of a depth-1 clone"),
                ),
        )
        .subcommand(
            Command::new("count")
                .about("Count lines of the corpus and write the CSV report")
                .arg(
                    Arg::new("exclude")
                        .short('e')
                        .long("exclude")
                        .action(ArgAction::Append)
                        .help("Exclude paths matching glob pattern (relative to each repository)"),
                ),
        )
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Route SIGINT and SIGTERM to gix's interrupt flag.
///
/// A second signal terminates the process immediately.
fn install_interrupt_handler() -> anyhow::Result<impl Sized> {
    // SAFETY: runs once per process, before any other thread is spawned.
    unsafe { gix::interrupt::init_handler(1, || {}) }.context("cannot install signal handler")
}

/// Handler for clean command
fn clean_handler(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let settings = Settings::resolve(matches)?;
    let outcome = clean(&settings.destination, &settings.report)?;
    render::clean_summary(&outcome);
    Ok(ExitCode::SUCCESS)
}

/// Handler for fetch command
fn fetch_handler(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let settings = Settings::resolve(matches)?;
    let acquirer = settings.acquirer()?;
    let _signals = install_interrupt_handler()?;

    let result = fetch_corpus(
        &settings.input,
        &settings.destination,
        &settings.fetch_options(),
        acquirer,
        &gix::interrupt::IS_INTERRUPTED,
    )?;
    render::fetch_summary(&result);

    if gix::interrupt::is_triggered() {
        return Err(RepolocError::Interrupted.into());
    }
    Ok(ExitCode::SUCCESS)
}

/// Handler for count command
fn count_handler(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let settings = Settings::resolve(matches)?;
    // Opened first so an unwritable report path fails before any counting.
    let writer = ReportWriter::create(settings.report.clone())?;
    let _signals = install_interrupt_handler()?;

    let result = count_corpus(
        &settings.destination,
        &settings.count_options(),
        &gix::interrupt::IS_INTERRUPTED,
    )?;

    writer.commit(&result.rows)?;
    if let Some(path) = settings.report.summary_path() {
        result.summary.write_json(&path)?;
    }
    render::count_summary(&result, &settings.report);
    Ok(ExitCode::SUCCESS)
}

fn run(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    match matches.subcommand() {
        Some(("clean", sub)) => clean_handler(sub),
        Some(("fetch", sub)) => fetch_handler(sub),
        Some(("count", sub)) => count_handler(sub),
        _ => unreachable!("subcommand_required is set"),
    }
}

fn main() -> ExitCode {
    let matches = build_command().get_matches();
    init_logging(matches.get_count("verbose"));

    match run(&matches) {
        Ok(code) => code,
        Err(err) if matches!(err.downcast_ref::<RepolocError>(), Some(RepolocError::Interrupted)) => {
            render::error(&err);
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            render::error(&err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_valid() {
        build_command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_command()
            .try_get_matches_from(["repoloc", "count", "-d", "corpus", "-j", "3", "-e", "vendor"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();

        assert_eq!(
            sub.get_one::<PathBuf>("destination"),
            Some(&PathBuf::from("corpus"))
        );
        assert_eq!(sub.get_one::<u64>("concurrency"), Some(&3));
        assert_eq!(
            sub.get_many::<String>("exclude")
                .unwrap()
                .collect::<Vec<_>>(),
            vec!["vendor"]
        );
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = build_command().try_get_matches_from(["repoloc", "count", "-j", "0"]);

        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(build_command()
            .try_get_matches_from(["repoloc", "-v"])
            .is_err());
    }
}
