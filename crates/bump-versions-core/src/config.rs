//! Configuration loading: `.git-ops-update.yaml` at the scan root.
//!
//! Unlike the teacher's release tool, this config is per-repository and has
//! no user-level layer: an explicit `--config <path>` always wins, otherwise
//! the project-local file next to the scan root is used. `figment` still
//! performs the merge and format parsing (kept for stack consistency with
//! the teacher even though there is normally one layer to merge), and
//! environment variables are expanded throughout the document before
//! parsing, per SPEC_FULL.md §6.

use std::collections::BTreeMap;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Yaml};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ExtractConfig, PolicyConfig, RegistryConfig, RegistryKind};

/// Default name of the configuration file at the scan root.
pub const CONFIG_FILE_NAME: &str = ".git-ops-update.yaml";

/// Default name of the cache file at the scan root.
pub const CACHE_FILE_NAME: &str = ".git-ops-update.cache.yaml";

/// A compiled name validator for registries and policies (`^[a-z0-9-]+$`).
fn name_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[a-z0-9-]+$").expect("static pattern"))
}

/// The fully parsed configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// File inclusion/exclusion rules.
    pub files: FilesConfig,
    /// Registries keyed by name (the map key becomes [`RegistryConfig::name`]).
    registries: BTreeMap<String, RegistryEntry>,
    /// Policies keyed by name (the map key becomes [`PolicyConfig::name`]).
    policies: BTreeMap<String, PolicyEntry>,
    /// Pull-request body augmenters — out of scope; carried opaquely so a
    /// config round-trip does not lose them.
    pub augmenters: Vec<serde_json::Value>,
    /// Git/forge action backend configuration — out of scope; carried
    /// opaquely.
    pub git: Option<GitConfig>,
}

/// File inclusion/exclusion rules (SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// Anchored regex strings; a path is eligible iff at least one matches.
    pub includes: Vec<String>,
    /// Anchored regex strings; any match excludes the path, overriding
    /// `includes`.
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RegistryEntry {
    #[serde(with = "humantime_serde")]
    interval: Duration,
    #[serde(flatten)]
    kind: RegistryKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct PolicyEntry {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    extracts: Vec<ExtractConfig>,
}

/// Git/forge action backend configuration (out of scope per §1; carried
/// through opaquely so `actions` that need it can read it, but this crate's
/// core never interprets `sign_key`/`git_hub`/`git_lab` itself).
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct GitConfig {
    /// Commit author identity used by the `push`/`request` actions.
    pub author: Option<GitAuthor>,
    /// GPG/SSH signing key id for signed commits.
    pub sign_key: Option<String>,
    /// GitHub forge configuration (opaque — consumed by a `ForgeClient`).
    pub git_hub: Option<serde_json::Value>,
    /// GitLab forge configuration (opaque — consumed by a `ForgeClient`).
    pub git_lab: Option<serde_json::Value>,
}

/// A commit author identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GitAuthor {
    /// Author name for commits this tool creates.
    pub name: String,
    /// Author email for commits this tool creates.
    pub email: String,
}

impl Config {
    /// Returns the named registry, with its name filled in from the
    /// configuration key, or `None` if undefined.
    pub fn registry(&self, name: &str) -> Option<RegistryConfig> {
        self.registries.get(name).map(|entry| RegistryConfig {
            name: name.to_string(),
            interval: entry.interval,
            kind: entry.kind.clone(),
        })
    }

    /// Returns the named policy, with its name filled in from the
    /// configuration key, or `None` if undefined.
    pub fn policy(&self, name: &str) -> Option<PolicyConfig> {
        self.policies.get(name).map(|entry| PolicyConfig {
            name: name.to_string(),
            pattern: entry.pattern.clone(),
            extracts: entry.extracts.clone(),
        })
    }

    /// Every registry name declared in this configuration.
    pub fn registry_names(&self) -> impl Iterator<Item = &str> {
        self.registries.keys().map(String::as_str)
    }

    /// Every policy name declared in this configuration.
    pub fn policy_names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    /// Validates that every registry/policy name matches `^[a-z0-9-]+$` and
    /// that every `includes`/`excludes` regex compiles, per the Invariants
    /// in SPEC_FULL.md §3. Configuration errors abort the invocation, so
    /// this is called once right after loading.
    pub fn validate(&self) -> ConfigResult<()> {
        for name in self.registries.keys().chain(self.policies.keys()) {
            if !name_pattern().is_match(name) {
                return Err(ConfigError::InvalidName(name.clone()));
            }
        }
        for pattern in self.files.includes.iter().chain(self.files.excludes.iter()) {
            Regex::new(pattern).map_err(|e| ConfigError::BadFilePattern(pattern.clone(), e))?;
        }
        Ok(())
    }
}

/// Loads configuration for a scan rooted at `dir`.
///
/// An explicit `config_path` always wins; otherwise
/// `dir/.git-ops-update.yaml` is used if present. A missing file yields the
/// default (empty) configuration — there is nothing to scan for, which is
/// not itself an error.
pub fn load(dir: &Utf8Path, config_path: Option<&Utf8Path>) -> ConfigResult<Config> {
    let path = config_path.map_or_else(|| dir.join(CONFIG_FILE_NAME), Utf8Path::to_path_buf);

    if !path.is_file() {
        if config_path.is_some() {
            return Err(ConfigError::NotFound);
        }
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    let raw = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::Deserialize(Box::new(figment::Error::from(e.to_string())))
    })?;
    let expanded = expand_env(&raw);

    let figment = Figment::new().merge(Yaml::string(&expanded));
    let config: Config = figment
        .extract()
        .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
    config.validate()?;
    Ok(config)
}

/// Returns the path the configuration file would be loaded from, without
/// loading it.
pub fn config_path(dir: &Utf8Path, config_path: Option<&Utf8Path>) -> Utf8PathBuf {
    config_path.map_or_else(|| dir.join(CONFIG_FILE_NAME), Utf8Path::to_path_buf)
}

/// Returns the path the version cache would be loaded from/saved to.
pub fn cache_path(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join(CACHE_FILE_NAME)
}

/// Expands `$VAR` and `${VAR}` references against the process environment.
/// Unset variables are left untouched rather than erroring — a config
/// author who relies on an optional variable should see the literal text,
/// not a hard failure before policies even load.
fn expand_env(raw: &str) -> String {
    shellexpand::env_with_context_no_errors(raw, |name| std::env::var(name).ok()).into_owned()
}
