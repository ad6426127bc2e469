//! Configuration file support.
//!
//! All settings are optional; the CLI layers them as defaults, then the
//! config file, then environment variables and flags.
//!
//! ```toml
//! input = "repos.txt"
//! destination = "repos"
//! report = "report.csv"
//! concurrency = 8
//! timeout_secs = 600
//! shallow = true
//! url_template = "https://github.com/{id}.git"
//! exclude = ["**/node_modules", "vendor"]
//!
//! [languages]
//! pyi = "Python"
//! jsonnet = "Jsonnet"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::LanguageTable;
use crate::error::RepolocError;
use crate::source::FilterConfig;
use crate::Result;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "repoloc.toml";

/// Default path of the repository list.
pub const DEFAULT_INPUT: &str = "repos.txt";

/// Default destination root.
pub const DEFAULT_DESTINATION: &str = "repos";

/// Default report path.
pub const DEFAULT_REPORT: &str = "report.csv";

/// Parallelism used when none is configured: one worker per logical CPU.
pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// Contents of a `repoloc.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepolocConfig {
    pub input: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub shallow: Option<bool>,
    pub url_template: Option<String>,
    /// Glob patterns pruned from every repository walk
    pub exclude: Vec<String>,
    /// Extra or overriding extension → language mappings
    pub languages: BTreeMap<String, String>,
}

impl RepolocConfig {
    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| RepolocError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&contents).map_err(|message| RepolocError::ConfigFile {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Load `repoloc.toml` from `dir` if it exists.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = dir.as_ref().join(CONFIG_FILE);
        if path.is_file() {
            Self::load(path).map(Some)
        } else {
            Ok(None)
        }
    }

    fn parse(contents: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;
        if config.concurrency == Some(0) {
            return Err("concurrency must be at least 1".to_string());
        }
        if config.timeout_secs == Some(0) {
            return Err("timeout_secs must be at least 1".to_string());
        }
        Ok(config)
    }

    /// Exclusion filter from the `exclude` patterns.
    pub fn filter(&self) -> Result<FilterConfig> {
        FilterConfig::new().exclude_many(&self.exclude)
    }

    /// Built-in language table with the `[languages]` overrides applied.
    pub fn language_table(&self) -> Result<LanguageTable> {
        let mut table = LanguageTable::builtin();
        for (extension, language) in &self.languages {
            table.insert(extension, language)?;
        }
        Ok(table)
    }
}
