//! Shared error types: configuration errors (abort the invocation) and
//! annotation errors (scoped to a single `(file, line)`, never abort the
//! whole scan — see SPEC_FULL.md §7).

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Per §7, a configuration error aborts the invocation — there is no
/// annotation to scope it to yet.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error("invalid configuration: {0}")]
    Deserialize(#[from] Box<figment::Error>),

    /// Configuration file not found after searching all locations.
    #[error("no configuration file found")]
    NotFound,

    /// A registry or policy name did not match `^[a-z0-9-]+$`.
    #[error("name {0:?} is invalid: must match ^[a-z0-9-]+$")]
    InvalidName(String),

    /// An `includes`/`excludes` regex failed to compile.
    #[error("file pattern {0:?} failed to compile: {1}")]
    BadFilePattern(String, #[source] regex::Error),
}

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while resolving a single raw annotation against
/// configuration (SPEC_FULL.md §4.3). Always scoped to one `(file, line)`;
/// the orchestrator reports these and continues scanning.
#[derive(Error, Debug)]
pub enum AnnotationError {
    /// The JSON tail of the directive failed to parse.
    #[error("annotation malformed: {raw:?}: {source}")]
    Malformed {
        /// The raw annotation text.
        raw: String,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A required key was absent from the directive.
    #[error("annotation misses required field {0:?}")]
    MissingField(&'static str),

    /// The `registry` field named a registry absent from configuration.
    #[error("annotation references unknown registry {0:?}")]
    UnknownRegistry(String),

    /// The `policy` field named a policy absent from configuration.
    #[error("annotation references unknown policy {0:?}")]
    UnknownPolicy(String),

    /// The `format` field named something other than `plain`, `tag`, or
    /// `regexp:<pattern>`.
    #[error("annotation references unknown format {0:?}")]
    UnknownFormat(String),

    /// The `action` field named something other than `""`, `push`, or
    /// `request`.
    #[error("annotation references unknown action {0:?}")]
    UnknownAction(String),

    /// A value format error surfaced while resolving the annotation (e.g. a
    /// malformed `regexp:` pattern).
    #[error(transparent)]
    ValueFormat(#[from] crate::value_format::ValueFormatError),
}

/// Result alias for annotation resolution.
pub type AnnotationResult<T> = Result<T, AnnotationError>;
