//! Exclusion rules applied while walking a repository.
//!
//! Version-control bookkeeping is always excluded. On top of that, glob
//! patterns can prune any path, matched against the path relative to the
//! repository root (so `vendor` only prunes a top-level directory while
//! `**/vendor` prunes it at any depth).

use std::ffi::OsStr;
use std::path::Path;

use glob::Pattern;

use crate::error::RepolocError;
use crate::Result;

/// Entry names treated as version-control metadata.
pub const VCS_METADATA: &[&str] = &[".git", ".hg", ".svn", ".bzr", "_darcs", "CVS"];

/// Check whether an entry name is version-control metadata.
pub fn is_vcs_metadata(name: &OsStr) -> bool {
    VCS_METADATA.iter().any(|vcs| name == *vcs)
}

/// Configuration for path exclusion.
#[derive(Debug, Clone, Default)]
pub struct FilterConfig {
    /// Glob patterns to exclude
    pub exclude: Vec<Pattern>,
}

impl FilterConfig {
    /// Create a filter with only the baseline VCS exclusions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        let pat = Pattern::new(pattern).map_err(|e| RepolocError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.exclude.push(pat);
        Ok(self)
    }

    /// Add multiple exclude patterns.
    pub fn exclude_many<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        for pattern in patterns {
            self = self.exclude(pattern.as_ref())?;
        }
        Ok(self)
    }

    /// Check if a path (relative to the walked root) is excluded.
    ///
    /// Any component naming VCS metadata excludes the path, as does a match
    /// against any configured pattern.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if relative
            .components()
            .any(|component| is_vcs_metadata(component.as_os_str()))
        {
            return true;
        }

        let path_str = relative.to_string_lossy();
        self.exclude.iter().any(|pattern| pattern.matches(&path_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcs_metadata_always_excluded() {
        let filter = FilterConfig::new();

        assert!(filter.is_excluded(Path::new(".git")));
        assert!(filter.is_excluded(Path::new(".git/objects/ab/cdef")));
        assert!(filter.is_excluded(Path::new("vendor/lib/.hg/store")));
        assert!(filter.is_excluded(Path::new("CVS")));
        assert!(!filter.is_excluded(Path::new("src/main.rs")));
        assert!(!filter.is_excluded(Path::new(".github/workflows/ci.yml")));
        assert!(!filter.is_excluded(Path::new(".gitignore")));
    }

    #[test]
    fn test_exclude_pattern_anchored_at_root() {
        let filter = FilterConfig::new().exclude("vendor").unwrap();

        assert!(filter.is_excluded(Path::new("vendor")));
        assert!(!filter.is_excluded(Path::new("src/vendor")));
    }

    #[test]
    fn test_exclude_pattern_any_depth() {
        let filter = FilterConfig::new().exclude("**/node_modules").unwrap();

        assert!(filter.is_excluded(Path::new("node_modules")));
        assert!(filter.is_excluded(Path::new("web/app/node_modules")));
        assert!(!filter.is_excluded(Path::new("web/app/src")));
    }

    #[test]
    fn test_exclude_many() {
        let filter = FilterConfig::new()
            .exclude_many(&["*.min.js", "build"])
            .unwrap();

        assert!(filter.is_excluded(Path::new("static/app.min.js")));
        assert!(filter.is_excluded(Path::new("build")));
        assert!(!filter.is_excluded(Path::new("static/app.js")));
    }

    #[test]
    fn test_invalid_glob_pattern() {
        let result = FilterConfig::new().exclude("[invalid");

        assert!(result.is_err());
        if let Err(RepolocError::InvalidGlob { pattern, .. }) = result {
            assert_eq!(pattern, "[invalid");
        } else {
            panic!("Expected InvalidGlob error");
        }
    }
}
