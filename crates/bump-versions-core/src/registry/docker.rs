//! Docker/OCI v2 registry client (SPEC_FULL.md §4.8).

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, LINK, WWW_AUTHENTICATE};
use serde::Deserialize;

use crate::model::Credentials;

use super::{next_link, Registry, RegistryError, RegistryResult};

/// Talks to a Docker v2 (or OCI distribution-spec) registry over HTTPS.
pub struct DockerRegistry {
    interval: Duration,
    base_url: String,
    credentials: Option<Credentials>,
    client: Client,
}

impl DockerRegistry {
    /// Builds a client for the registry at `base_url` (e.g.
    /// `https://registry-1.docker.io`).
    pub fn new(interval: Duration, base_url: String, credentials: Option<Credentials>) -> Self {
        Self {
            interval,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client: Client::new(),
        }
    }

    fn tags_url(&self, resource: &str) -> String {
        format!("{}/v2/{}/tags/list", self.base_url, resource)
    }

    /// Performs the `WWW-Authenticate: Bearer` challenge/token exchange
    /// described by the Docker v2 auth spec, returning a bearer token.
    fn authenticate(&self, resource: &str, challenge: &str) -> RegistryResult<String> {
        let params = parse_bearer_challenge(challenge);
        let realm = params
            .get("realm")
            .ok_or_else(|| RegistryError::Parse {
                url: self.tags_url(resource),
                message: "WWW-Authenticate challenge missing realm".to_string(),
            })?
            .clone();

        let mut request = self.client.get(&realm);
        if let Some(service) = params.get("service") {
            request = request.query(&[("service", service)]);
        }
        if let Some(scope) = params.get("scope") {
            request = request.query(&[("scope", scope)]);
        }
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }

        let response = request
            .send()
            .map_err(|source| RegistryError::Request { url: realm.clone(), source })?;
        if !response.status().is_success() {
            return Err(RegistryError::Status {
                url: realm,
                status: response.status(),
            });
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            token: Option<String>,
            #[serde(default)]
            access_token: Option<String>,
        }

        let body: TokenResponse = response.json().map_err(|source| RegistryError::Request {
            url: realm.clone(),
            source,
        })?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| RegistryError::Parse {
                url: realm,
                message: "token response missing token/access_token".to_string(),
            })
    }
}

impl Registry for DockerRegistry {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn fetch_versions(&self, resource: &str) -> RegistryResult<Vec<String>> {
        #[derive(Deserialize)]
        struct TagsList {
            tags: Vec<String>,
        }

        let mut url = self.tags_url(resource);
        let mut tags = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = request
                .send()
                .map_err(|source| RegistryError::Request { url: url.clone(), source })?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED && token.is_none() {
                let challenge = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RegistryError::Status {
                        url: url.clone(),
                        status: reqwest::StatusCode::UNAUTHORIZED,
                    })?
                    .to_string();
                token = Some(self.authenticate(resource, &challenge)?);
                continue;
            }

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

            let body: TagsList = response.json().map_err(|source| RegistryError::Request {
                url: url.clone(),
                source,
            })?;
            tags.extend(body.tags);

            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }

        Ok(tags)
    }
}

fn parse_bearer_challenge(header: &str) -> std::collections::BTreeMap<String, String> {
    let mut params = std::collections::BTreeMap::new();
    let Some(rest) = header.strip_prefix("Bearer ") else {
        return params;
    };
    for part in rest.split(',') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            params.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_challenge() {
        let header = r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#;
        let params = parse_bearer_challenge(header);
        assert_eq!(params["realm"], "https://auth.docker.io/token");
        assert_eq!(params["service"], "registry.docker.io");
        assert_eq!(params["scope"], "repository:library/nginx:pull");
    }

    #[test]
    fn tags_url_joins_base_and_resource() {
        let registry = DockerRegistry::new(
            Duration::from_secs(60),
            "https://registry-1.docker.io/".to_string(),
            None,
        );
        assert_eq!(
            registry.tags_url("library/nginx"),
            "https://registry-1.docker.io/v2/library/nginx/tags/list"
        );
    }
}
