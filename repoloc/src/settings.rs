//! Resolution of effective settings.
//!
//! Each value comes from the first source that has it: command-line flag or
//! environment variable (both handled by clap), then the config file, then
//! the built-in default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::ArgMatches;
use repoloclib::config::{
    default_concurrency, DEFAULT_DESTINATION, DEFAULT_INPUT, DEFAULT_REPORT,
};
use repoloclib::source::{DEFAULT_TIMEOUT, DEFAULT_URL_TEMPLATE};
use repoloclib::{
    CountOptions, FetchOptions, FilterConfig, GitAcquirer, LanguageTable, RepolocConfig,
    ReportDestination,
};

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub destination: PathBuf,
    pub report: ReportDestination,
    pub concurrency: usize,
    pub timeout: Duration,
    pub shallow: bool,
    pub url_template: String,
    pub filter: FilterConfig,
    pub languages: LanguageTable,
}

impl Settings {
    /// Layer `matches` over the config file and the defaults.
    ///
    /// `matches` are the subcommand's matches; global flags are visible there
    /// too.
    pub fn resolve(matches: &ArgMatches) -> anyhow::Result<Self> {
        let config = load_config(value::<PathBuf>(matches, "config").as_deref())?;

        let input = value::<PathBuf>(matches, "input")
            .or_else(|| config.input.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
        let destination = value::<PathBuf>(matches, "destination")
            .or_else(|| config.destination.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DESTINATION));
        let report = value::<PathBuf>(matches, "report")
            .or_else(|| config.report.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT));
        let concurrency = value::<u64>(matches, "concurrency")
            .map(|n| n as usize)
            .or(config.concurrency)
            .unwrap_or_else(default_concurrency);
        let timeout = value::<u64>(matches, "timeout")
            .or(config.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let shallow = if flag(matches, "full-clone") {
            false
        } else {
            config.shallow.unwrap_or(true)
        };
        let url_template = value::<String>(matches, "url-template")
            .or_else(|| config.url_template.clone())
            .unwrap_or_else(|| DEFAULT_URL_TEMPLATE.to_string());

        let mut filter = config.filter()?;
        if let Ok(Some(patterns)) = matches.try_get_many::<String>("exclude") {
            for pattern in patterns {
                filter = filter.exclude(pattern)?;
            }
        }
        let languages = config.language_table()?;

        Ok(Self {
            input,
            destination,
            report: ReportDestination::from_path(report),
            concurrency,
            timeout,
            shallow,
            url_template,
            filter,
            languages,
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::new()
            .concurrency(self.concurrency)
            .timeout(self.timeout)
    }

    pub fn acquirer(&self) -> anyhow::Result<GitAcquirer> {
        Ok(GitAcquirer::new()
            .url_template(&self.url_template)?
            .shallow(self.shallow))
    }

    pub fn count_options(&self) -> CountOptions {
        CountOptions::new()
            .concurrency(self.concurrency)
            .filter(self.filter.clone())
            .languages(self.languages.clone())
    }
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<RepolocConfig> {
    match explicit {
        Some(path) => Ok(RepolocConfig::load(path)?),
        None => {
            let cwd = std::env::current_dir().context("cannot determine working directory")?;
            Ok(RepolocConfig::discover(cwd)?.unwrap_or_default())
        }
    }
}

/// Value of `id`, or `None` when the command does not define it.
fn value<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Option<T> {
    matches.try_get_one::<T>(id).ok().flatten().cloned()
}

fn flag(matches: &ArgMatches, id: &str) -> bool {
    matches.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
}
