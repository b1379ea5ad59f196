//! Helm chart repository index client (SPEC_FULL.md §4.8).

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{Registry, RegistryError, RegistryResult};

/// Reads a Helm repository's `index.yaml` and returns the versions of a
/// named chart.
pub struct HelmRegistry {
    interval: Duration,
    index_url: String,
    client: Client,
}

impl HelmRegistry {
    /// Builds a client for the repository index at `index_url`.
    pub fn new(interval: Duration, index_url: String) -> Self {
        Self {
            interval,
            index_url,
            client: Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct IndexYaml {
    entries: BTreeMap<String, Vec<ChartEntry>>,
}

#[derive(Deserialize)]
struct ChartEntry {
    version: String,
}

impl Registry for HelmRegistry {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn fetch_versions(&self, resource: &str) -> RegistryResult<Vec<String>> {
        let response = self
            .client
            .get(&self.index_url)
            .send()
            .map_err(|source| RegistryError::Request {
                url: self.index_url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RegistryError::Status {
                url: self.index_url.clone(),
                status: response.status(),
            });
        }

        let body = response.text().map_err(|source| RegistryError::Request {
            url: self.index_url.clone(),
            source,
        })?;

        let index: IndexYaml =
            serde_saphyr::from_str(&body).map_err(|e| RegistryError::Parse {
                url: self.index_url.clone(),
                message: e.to_string(),
            })?;

        Ok(index
            .entries
            .get(resource)
            .map(|entries| entries.iter().map(|e| e.version.clone()).collect())
            .unwrap_or_default())
    }
}
