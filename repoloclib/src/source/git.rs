//! Git acquisition backend built on gitoxide.

use std::error::Error as StdError;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::fetch::{Acquire, AcquireFailure, FailureKind};
use super::identifier::RepositoryIdentifier;
use crate::error::RepolocError;
use crate::Result;

/// Default remote location, `{id}` is replaced with `owner/name`.
pub const DEFAULT_URL_TEMPLATE: &str = "https://github.com/{id}.git";

/// Clones repositories with gitoxide.
///
/// The clone URL is built from a template so the same list can be fetched
/// from any forge or from a local mirror.
#[derive(Debug, Clone)]
pub struct GitAcquirer {
    url_template: String,
    shallow: bool,
}

impl Default for GitAcquirer {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            shallow: true,
        }
    }
}

impl GitAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different URL template; it must contain `{id}`.
    pub fn url_template(mut self, template: &str) -> Result<Self> {
        if !template.contains("{id}") {
            return Err(RepolocError::Config(format!(
                "url template '{template}' does not contain {{id}}"
            )));
        }
        self.url_template = template.to_string();
        Ok(self)
    }

    /// Fetch full history instead of only the tip commit.
    pub fn shallow(mut self, shallow: bool) -> Self {
        self.shallow = shallow;
        self
    }

    /// Clone URL for `identifier`.
    pub fn url_for(&self, identifier: &RepositoryIdentifier) -> String {
        self.url_template.replace("{id}", identifier.as_str())
    }
}

impl Acquire for GitAcquirer {
    fn acquire(
        &self,
        identifier: &RepositoryIdentifier,
        target: &Path,
        should_interrupt: &AtomicBool,
    ) -> std::result::Result<(), AcquireFailure> {
        let url = self.url_for(identifier);
        debug!(repository = %identifier, %url, shallow = self.shallow, "cloning");

        let mut prepare = gix::prepare_clone(url.as_str(), target)
            .map_err(|e| classify(FailureKind::Other, &e, should_interrupt))?;
        if self.shallow {
            prepare = prepare.with_shallow(gix::remote::fetch::Shallow::DepthAtRemote(
                NonZeroU32::MIN,
            ));
        }

        // gitoxide deletes the target of a failed clone when the handle is
        // dropped; interrupted clones are persisted instead so a later run
        // finds them in place.
        let (mut checkout, _) =
            match prepare.fetch_then_checkout(gix::progress::Discard, should_interrupt) {
                Ok(fetched) => fetched,
                Err(err) => {
                    let failure = classify(FailureKind::Network, &err, should_interrupt);
                    if failure.kind == FailureKind::Cancelled {
                        let _ = prepare.persist();
                    }
                    return Err(failure);
                }
            };

        match checkout.main_worktree(gix::progress::Discard, should_interrupt) {
            Ok(_) => Ok(()),
            Err(err) => {
                let failure = classify(FailureKind::Io, &err, should_interrupt);
                if failure.kind == FailureKind::Cancelled {
                    let _ = checkout.persist();
                }
                Err(failure)
            }
        }
    }
}

/// Map a gitoxide error to a failure kind by inspecting its source chain.
fn classify(
    fallback: FailureKind,
    err: &(dyn StdError + 'static),
    should_interrupt: &AtomicBool,
) -> AcquireFailure {
    let message = error_chain(err);
    if should_interrupt.load(Ordering::Relaxed) {
        return AcquireFailure::new(FailureKind::Cancelled, message);
    }

    let lower = message.to_lowercase();
    let kind = if ["401", "403", "authentication", "credentials"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        FailureKind::Auth
    } else if ["404", "not found", "does not exist", "no such file"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        FailureKind::NotFound
    } else {
        fallback
    };
    AcquireFailure::new(kind, message)
}

/// Render an error and all of its sources as `outer: inner: root`.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Layer(&'static str, Option<Box<Layer>>);

    impl fmt::Display for Layer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for Layer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.1.as_deref().map(|l| l as &(dyn StdError + 'static))
        }
    }

    fn chain(outer: &'static str, inner: &'static str) -> Layer {
        Layer(outer, Some(Box::new(Layer(inner, None))))
    }

    #[test]
    fn test_url_for() {
        let id: RepositoryIdentifier = "acme/widgets".parse().unwrap();

        assert_eq!(
            GitAcquirer::new().url_for(&id),
            "https://github.com/acme/widgets.git"
        );
        assert_eq!(
            GitAcquirer::new()
                .url_template("/srv/mirror/{id}")
                .unwrap()
                .url_for(&id),
            "/srv/mirror/acme/widgets"
        );
    }

    #[test]
    fn test_url_template_requires_placeholder() {
        let result = GitAcquirer::new().url_template("https://example.com/repo.git");

        assert!(matches!(result, Err(RepolocError::Config(_))));
    }

    #[test]
    fn test_classify_by_message() {
        let idle = AtomicBool::new(false);

        let auth = classify(FailureKind::Network, &chain("fetch failed", "HTTP 401"), &idle);
        assert_eq!(auth.kind, FailureKind::Auth);
        assert_eq!(auth.message, "fetch failed: HTTP 401");

        let missing = classify(
            FailureKind::Network,
            &chain("handshake failed", "Repository not found"),
            &idle,
        );
        assert_eq!(missing.kind, FailureKind::NotFound);

        let other = classify(
            FailureKind::Network,
            &chain("connect failed", "connection refused"),
            &idle,
        );
        assert_eq!(other.kind, FailureKind::Network);
    }

    #[test]
    fn test_classify_interrupted() {
        let interrupted = AtomicBool::new(true);

        let failure = classify(FailureKind::Network, &chain("fetch failed", "HTTP 404"), &interrupted);

        assert_eq!(failure.kind, FailureKind::Cancelled);
    }

    #[test]
    fn test_error_chain_skips_repeated_text() {
        let err = chain("io error: disk full", "disk full");

        assert_eq!(error_chain(&err), "io error: disk full");
    }
}
