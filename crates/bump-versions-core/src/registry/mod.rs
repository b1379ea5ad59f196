//! Registries: pluggable upstream version sources (SPEC_FULL.md §4.8).

mod docker;
mod github_tag;
mod helm;

pub use docker::DockerRegistry;
pub use github_tag::GitHubTagRegistry;
pub use helm::HelmRegistry;

use std::time::Duration;

use thiserror::Error;

use crate::model::{RegistryConfig, RegistryKind};

/// Errors raised while fetching versions from a registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The HTTP request itself failed (DNS, TLS, timeout, connection reset).
    #[error("request to {url} failed: {source}")]
    Request {
        /// The URL that was being requested.
        url: String,
        /// Underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server responded with a non-2xx status.
    #[error("{url} returned status {status}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code returned.
        status: reqwest::StatusCode,
    },

    /// The response body could not be parsed as expected (JSON/YAML/header).
    #[error("failed to parse response from {url}: {message}")]
    Parse {
        /// The URL whose response failed to parse.
        url: String,
        /// Description of the parse failure.
        message: String,
    },
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A pluggable source of versions for a named resource.
pub trait Registry {
    /// Polling interval before a cached entry is considered stale.
    fn interval(&self) -> Duration;

    /// Returns every known version string for `resource`.
    fn fetch_versions(&self, resource: &str) -> RegistryResult<Vec<String>>;
}

/// Builds the concrete [`Registry`] implementation for `config`.
pub fn from_config(config: &RegistryConfig) -> Box<dyn Registry> {
    match &config.kind {
        RegistryKind::Docker { url, credentials } => {
            Box::new(DockerRegistry::new(config.interval, url.clone(), credentials.clone()))
        }
        RegistryKind::Helm { url } => Box::new(HelmRegistry::new(config.interval, url.clone())),
        RegistryKind::GitHubTag { repository, token } => Box::new(GitHubTagRegistry::new(
            config.interval,
            repository.clone(),
            token.clone(),
        )),
    }
}

/// Extracts the `rel="next"` target from an RFC 8288 `Link` header value, if
/// present. Shared by [`DockerRegistry`] and [`GitHubTagRegistry`], both of
/// which paginate the same way.
pub(crate) fn next_link(header_value: &str) -> Option<String> {
    header_value.split(',').find_map(|part| {
        let mut url = None;
        let mut is_next = false;
        for segment in part.split(';').map(str::trim) {
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                url = Some(inner.to_string());
            } else if segment == r#"rel="next""# {
                is_next = true;
            }
        }
        if is_next { url } else { None }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_link_extracts_next_rel() {
        let header = r#"<https://example.com/v2/foo/tags/list?n=100&last=bar>; rel="next""#;
        assert_eq!(
            next_link(header),
            Some("https://example.com/v2/foo/tags/list?n=100&last=bar".to_string())
        );
    }

    #[test]
    fn next_link_ignores_other_rels() {
        let header = r#"<https://example.com/first>; rel="first", <https://example.com/prev>; rel="prev""#;
        assert_eq!(next_link(header), None);
    }

    #[test]
    fn next_link_handles_multiple_entries() {
        let header = r#"<https://example.com/prev>; rel="prev", <https://example.com/next>; rel="next""#;
        assert_eq!(next_link(header), Some("https://example.com/next".to_string()));
    }
}
