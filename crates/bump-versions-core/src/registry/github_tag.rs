//! GitHub repository tags client (SPEC_FULL.md §4.8).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use serde::Deserialize;

use super::{next_link, Registry, RegistryError, RegistryResult};

/// Lists a GitHub repository's tags via the REST API
/// (`GET /repos/{owner}/{repo}/tags`), ignoring the annotation's `resource`
/// field — the repository is fixed by configuration.
pub struct GitHubTagRegistry {
    interval: Duration,
    repository: String,
    token: Option<String>,
    client: Client,
    api_base: String,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl GitHubTagRegistry {
    /// Builds a client for `repository` (`owner/repo`).
    pub fn new(interval: Duration, repository: String, token: Option<String>) -> Self {
        Self {
            interval,
            repository,
            token,
            client: Client::new(),
            api_base: "https://api.github.com".to_string(),
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: String) -> Self {
        self.api_base = api_base;
        self
    }
}

impl Registry for GitHubTagRegistry {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn fetch_versions(&self, _resource: &str) -> RegistryResult<Vec<String>> {
        let mut url = format!("{}/repos/{}/tags?per_page=100", self.api_base, self.repository);
        let mut tags = Vec::new();

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json")
                .header(USER_AGENT, "bump-versions");
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = request
                .send()
                .map_err(|source| RegistryError::Request { url: url.clone(), source })?;

            if !response.status().is_success() {
                return Err(RegistryError::Status {
                    url: url.clone(),
                    status: response.status(),
                });
            }

            let next = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);

            let body: Vec<Tag> = response.json().map_err(|source| RegistryError::Request {
                url: url.clone(),
                source,
            })?;
            tags.extend(body.into_iter().map(|t| t.name));

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        Ok(tags)
    }
}
