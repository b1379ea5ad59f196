//! Core data model shared across the scanner: registries, policies,
//! strategies, annotations, changes and change sets.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A named upstream source of versions, as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Name used by annotations to reference this registry (`^[a-z0-9-]+$`).
    pub name: String,
    /// Polling interval before a cached entry is considered stale.
    #[serde(with = "humantime_serde")]
    pub interval: std::time::Duration,
    /// Kind-specific configuration.
    #[serde(flatten)]
    pub kind: RegistryKind,
}

/// The concrete backend a [`RegistryConfig`] resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RegistryKind {
    /// A Docker/OCI v2 registry.
    Docker {
        /// Base URL, e.g. `https://registry-1.docker.io`.
        url: String,
        /// Optional basic-auth credentials for the token exchange.
        #[serde(default)]
        credentials: Option<Credentials>,
    },
    /// A Helm chart repository index.
    Helm {
        /// URL of the repository's `index.yaml`.
        url: String,
    },
    /// A GitHub repository's tags.
    GitHubTag {
        /// `owner/repo`.
        repository: String,
        /// Optional personal access token for higher rate limits.
        #[serde(default)]
        token: Option<String>,
    },
}

/// Username/password pair used by registries that need basic auth for the
/// initial token exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Registry username.
    pub username: String,
    /// Registry password or token.
    pub password: String,
}

/// A named version-interpretation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Name used by annotations to reference this policy.
    pub name: String,
    /// Optional anchored regex with named capture groups.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Ordered list of extraction steps.
    pub extracts: Vec<ExtractConfig>,
}

/// One step in a policy's interpretation of a version string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Optional segment name, used as a prefix for downstream filtering.
    #[serde(default)]
    pub key: Option<String>,
    /// Value template, e.g. `<version>`; `<name>` substitutes capture groups.
    pub value: String,
    /// How to interpret and compare the resulting string.
    #[serde(flatten)]
    pub strategy: Strategy,
}

/// A strategy for validating, comparing and decomposing version strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Strategy {
    /// Byte-wise string comparison.
    Lexicographic {
        /// If true, only the current value is considered compatible.
        #[serde(default)]
        pin: bool,
    },
    /// Non-negative integer comparison (empty string treated as zero).
    Numeric {
        /// If true, only the current value is considered compatible.
        #[serde(default)]
        pin: bool,
    },
    /// Semantic-versioning (2.0.0) comparison.
    Semver {
        /// Require the same major version.
        #[serde(default)]
        pin_major: bool,
        /// Require the same major and minor version.
        #[serde(default)]
        pin_minor: bool,
        /// Require the same major, minor and patch version.
        #[serde(default)]
        pin_patch: bool,
        /// Allow candidates with a pre-release component.
        #[serde(default)]
        allow_prereleases: bool,
        /// Accept `"1"`/`"1.2"` by zero-padding missing components.
        #[serde(default)]
        relaxed: bool,
    },
}

/// How a scalar's raw text is decoded into (and re-encoded from) a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueFormat {
    /// The whole value is the version.
    Plain,
    /// `image:tag` — exactly one `:` splits image from version.
    Tag,
    /// A regex with at least one named group `version`.
    Regexp(String),
}

impl Default for ValueFormat {
    fn default() -> Self {
        Self::Plain
    }
}

/// What happens to a resolved Change once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// The annotation carries no action; the change is detected but never
    /// applied.
    Disabled,
    /// Write the change to the working tree, commit and push a branch.
    Push,
    /// Like `Push`, plus opening or updating a forge pull/merge request.
    Request,
}

/// A single annotation's parsed directive, before reference resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationDirective {
    /// Registry name this annotation refers to.
    pub registry: String,
    /// Resource identifier passed to the registry (e.g. `library/nginx`).
    pub resource: String,
    /// Policy name this annotation refers to.
    pub policy: String,
    /// Value format, defaulting to `plain`.
    #[serde(default)]
    pub format: Option<String>,
    /// Action name (`""`, `push`, `request`), defaulting to disabled.
    #[serde(default)]
    pub action: Option<String>,
    /// Optional prefix trimmed before policy parsing.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional suffix trimmed before policy parsing.
    #[serde(default)]
    pub suffix: Option<String>,
    /// Segment-path to constraint filter.
    #[serde(default)]
    pub filter: BTreeMap<String, FilterValue>,
    /// Opaque tag grouping proposals for a single dispatch unit.
    #[serde(default)]
    pub group: Option<String>,
    /// Commands to run after the file is rewritten.
    #[serde(default)]
    pub exec: Vec<String>,
}

/// A filter constraint value: either a single string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Segment must equal this string.
    One(String),
    /// Segment must be one of these strings.
    Many(Vec<String>),
}

impl FilterValue {
    /// Returns true if `segment` satisfies this constraint.
    pub fn matches(&self, segment: &str) -> bool {
        match self {
            Self::One(value) => value == segment,
            Self::Many(values) => values.iter().any(|v| v == segment),
        }
    }
}

/// A fully resolved annotation: every reference bound to a concrete object.
///
/// Per the "pointer-heavy optional chains" design note, this is a single
/// struct with required fields on the success path, never a parallel tuple
/// of optionals.
#[derive(Debug, Clone)]
pub struct ResolvedAnnotation {
    /// Location of the annotated scalar.
    pub file: Utf8PathBuf,
    /// 0-based line number within the file.
    pub line: usize,
    /// The raw (pre-rewrite) text on that line.
    pub raw_line: String,
    /// Registry this annotation resolves to.
    pub registry: RegistryConfig,
    /// Resource identifier passed to the registry.
    pub resource: String,
    /// Policy this annotation resolves to.
    pub policy: PolicyConfig,
    /// Value format used to extract/replace the scalar's text.
    pub format: ValueFormat,
    /// Action chosen for this annotation.
    pub action: Action,
    /// Prefix trimmed before policy parsing.
    pub prefix: String,
    /// Suffix trimmed before policy parsing.
    pub suffix: String,
    /// Segment-path filter constraints.
    pub filter: BTreeMap<String, FilterValue>,
    /// Opaque grouping tag.
    pub group: Option<String>,
    /// Commands to run after the file is rewritten.
    pub exec: Vec<String>,
}

/// A proposed replacement at a specific `(file, line)`.
#[derive(Debug, Clone)]
pub struct Change {
    /// Registry name the new version came from.
    pub registry_name: String,
    /// Resource identifier passed to the registry.
    pub resource_name: String,
    /// Version currently present in the file.
    pub old_version: String,
    /// Version chosen to replace it.
    pub new_version: String,
    /// File the change applies to, relative to the scan root.
    pub file: Utf8PathBuf,
    /// 0-based line number within the file.
    pub line: usize,
    /// Value format used to rewrite the scalar.
    pub format: ValueFormat,
    /// The line's full text before rewriting.
    pub old_raw_line: String,
    /// The line's full text after rewriting.
    pub new_raw_line: String,
    /// Commands to run after the file is rewritten.
    pub exec: Vec<String>,
    /// Opaque grouping tag, if any.
    pub group: Option<String>,
}

impl Change {
    /// Identifier used for hashing and deduplication: `file#line#new_value`.
    pub fn identifier(&self) -> String {
        format!("{}#{}#{}", self.file, self.line, self.new_version)
    }
}

/// A group of [`Change`]s delivered together (one commit, one request).
#[derive(Debug, Clone)]
pub struct ChangeSet {
    /// Grouping tag; empty for ungrouped (single-change) sets.
    pub group: String,
    /// The changes in this set, in detection order.
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// Stable hash over `(file, line)` of every change, ignoring values.
    pub fn group_hash(&self) -> String {
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|c| crate::hash::fnv1a_hex(format!("{}\u{0}{}", c.file, c.line).as_bytes()))
            .collect();
        crate::hash::fnv1a_hex_join(parts.iter().map(String::as_str))
    }

    /// Stable hash over `(file, line, new_version)` of every change.
    pub fn content_hash(&self) -> String {
        let parts: Vec<String> = self
            .changes
            .iter()
            .map(|c| {
                crate::hash::fnv1a_hex(
                    format!("{}\u{0}{}\u{0}{}", c.file, c.line, c.new_version).as_bytes(),
                )
            })
            .collect();
        crate::hash::fnv1a_hex_join(parts.iter().map(String::as_str))
    }

    /// Branch name derived from a configured prefix, the changes' resource
    /// identities, the group hash and the content hash.
    pub fn branch_name(&self, prefix: &str) -> String {
        let middle = self
            .changes
            .iter()
            .map(|c| {
                format!(
                    "{}-{}-{}",
                    c.registry_name.replace('/', "-"),
                    c.resource_name.replace('/', "-"),
                    c.new_version
                )
            })
            .collect::<Vec<_>>()
            .join("-");

        let prefix = truncate_chars(prefix, 128);
        let middle = truncate_chars(&middle, 128);
        let group_hash = truncate_chars(&self.group_hash(), 16);
        let content_hash = truncate_chars(&self.content_hash(), 16);
        format!("{prefix}/{middle}/{group_hash}/{content_hash}")
    }

    /// Commit message / pull-request body summarizing every change.
    pub fn message(&self) -> String {
        let mut lines = vec![self.title()];
        lines.push(String::new());
        for change in &self.changes {
            lines.push(format!(
                "- {} {}: {} -> {}",
                change.registry_name, change.resource_name, change.old_version, change.new_version
            ));
        }
        lines.join("\n")
    }

    /// A single-line, GitHub-PR-title-length-capped summary.
    pub fn title(&self) -> String {
        let summary = self
            .changes
            .iter()
            .map(|c| format!("{} {} -> {}", c.resource_name, c.old_version, c.new_version))
            .collect::<Vec<_>>()
            .join(", ");
        let title = format!("chore(deps): bump {summary}");
        truncate_chars(&title, 256)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
