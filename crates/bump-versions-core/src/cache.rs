//! The on-disk version cache: the only persistent state this tool keeps
//! between invocations.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, warn};

/// Errors from loading or saving the cache file.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Failed to read or write the cache file.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The file that could not be read/written.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the cache back to YAML.
    #[error("failed to serialize cache: {0}")]
    Serialize(String),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// A single registry/resource's most recently fetched version list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheResource {
    /// Name of the registry that produced this entry.
    pub registry: String,
    /// Resource identifier passed to the registry.
    pub resource: String,
    /// Every version string the registry returned on the last fetch.
    pub versions: Vec<String>,
    /// When the fetch happened.
    pub timestamp: String,
}

/// A companion entry recording that an action's identifier has already been
/// applied, for backends with no natural idempotence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheAction {
    /// Opaque identifier of the applied action.
    pub identifier: String,
    /// When it was applied.
    pub timestamp: String,
}

/// The full on-disk cache document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    /// Cached registry version lists.
    #[serde(default)]
    pub resources: Vec<CacheResource>,
    /// Cached action application markers.
    #[serde(default)]
    pub actions: Vec<CacheAction>,
}

impl Cache {
    /// Finds a cached resource by `(registry, resource)`.
    pub fn find_resource(&self, registry: &str, resource: &str) -> Option<&CacheResource> {
        self.resources
            .iter()
            .find(|r| r.registry == registry && r.resource == resource)
    }

    /// Replaces an existing entry in place, or appends if absent, preserving
    /// the relative order of every other entry.
    pub fn upsert_resource(&mut self, new: CacheResource) {
        if let Some(existing) = self
            .resources
            .iter_mut()
            .find(|r| r.registry == new.registry && r.resource == new.resource)
        {
            *existing = new;
        } else {
            self.resources.push(new);
        }
    }

    /// Records that `identifier` has been applied at `timestamp`.
    pub fn mark_action_applied(&mut self, identifier: String, timestamp: String) {
        if let Some(existing) = self
            .actions
            .iter_mut()
            .find(|a| a.identifier == identifier)
        {
            existing.timestamp = timestamp;
        } else {
            self.actions.push(CacheAction {
                identifier,
                timestamp,
            });
        }
    }

    /// Returns true if `identifier` has been recorded as applied.
    pub fn action_applied(&self, identifier: &str) -> bool {
        self.actions.iter().any(|a| a.identifier == identifier)
    }
}

/// Loads the cache from `path`. A missing file is treated as an empty
/// cache; a malformed file is logged as a warning and also treated as
/// empty, per the "missing = empty, malformed = warning" contract.
#[instrument(skip_all, fields(path = %path))]
pub fn load(path: &Utf8Path) -> CacheResult<Cache> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Cache::default()),
        Err(e) => {
            return Err(CacheError::Io {
                path: path.to_string(),
                source: e,
            });
        }
    };

    match serde_saphyr::from_str::<Cache>(&contents) {
        Ok(cache) => Ok(cache),
        Err(e) => {
            warn!(path = %path, error = %e, "cache file is malformed, treating as empty");
            Ok(Cache::default())
        }
    }
}

/// Persists `cache` to `path`, overwriting any existing file.
#[instrument(skip_all, fields(path = %path))]
pub fn save(path: &Utf8Path, cache: &Cache) -> CacheResult<()> {
    let serialized =
        serde_saphyr::to_string(cache).map_err(|e| CacheError::Serialize(e.to_string()))?;
    std::fs::write(path, serialized).map_err(|e| CacheError::Io {
        path: path.to_string(),
        source: e,
    })
}
