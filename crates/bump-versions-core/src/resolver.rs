//! Annotation resolution: turning a [`RawAnnotation`](crate::extractor::RawAnnotation)
//! into a [`ResolvedAnnotation`] bound against configuration
//! (SPEC_FULL.md §4.3).

use std::collections::BTreeMap;

use camino::Utf8Path;
use regex::Regex;
use serde::de::Error as _;

use crate::config::Config;
use crate::error::{AnnotationError, AnnotationResult};
use crate::extractor::RawAnnotation;
use crate::model::{Action, FilterValue, ResolvedAnnotation, ValueFormat};

/// Matches the `git-ops-update <json>` directive prefix, capturing the JSON
/// tail. Annotations with unrelated comment text never reach this module —
/// the extractor only emits lines whose comment text starts with
/// `git-ops-update`.
fn directive_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^git-ops-update\s*(\{.*)$").expect("static pattern"))
}

/// Resolves a single raw annotation against `config`.
///
/// `file` is the path the annotation was found in, relative to the scan
/// root, used only to populate [`ResolvedAnnotation::file`].
pub fn resolve(
    raw: &RawAnnotation,
    raw_line: &str,
    file: &Utf8Path,
    config: &Config,
) -> AnnotationResult<ResolvedAnnotation> {
    let Some(captures) = directive_pattern().captures(&raw.text) else {
        return Err(AnnotationError::Malformed {
            raw: raw.text.clone(),
            source: serde_json::Error::custom("missing git-ops-update JSON directive"),
        });
    };
    let json_tail = &captures[1];

    let value: serde_json::Value =
        serde_json::from_str(json_tail).map_err(|source| AnnotationError::Malformed {
            raw: raw.text.clone(),
            source,
        })?;

    let registry_name = required_str(&value, "registry")?;
    let resource = required_str(&value, "resource")?;
    let policy_name = required_str(&value, "policy")?;

    let registry = config
        .registry(&registry_name)
        .ok_or_else(|| AnnotationError::UnknownRegistry(registry_name.clone()))?;
    let policy = config
        .policy(&policy_name)
        .ok_or_else(|| AnnotationError::UnknownPolicy(policy_name.clone()))?;

    let format = match optional_str(&value, "format") {
        None => ValueFormat::Plain,
        Some(raw_format) if raw_format.is_empty() => ValueFormat::Plain,
        Some(raw_format) if raw_format == "tag" => ValueFormat::Tag,
        Some(raw_format) => match raw_format.strip_prefix("regexp:") {
            Some(pattern) => ValueFormat::Regexp(pattern.to_string()),
            None => return Err(AnnotationError::UnknownFormat(raw_format)),
        },
    };

    let action = match optional_str(&value, "action").as_deref() {
        None | Some("") => Action::Disabled,
        Some("push") => Action::Push,
        Some("request") => Action::Request,
        Some(other) => return Err(AnnotationError::UnknownAction(other.to_string())),
    };

    let prefix = optional_str(&value, "prefix").unwrap_or_default();
    let suffix = optional_str(&value, "suffix").unwrap_or_default();
    let group = optional_str(&value, "group").filter(|g| !g.is_empty());

    let filter: BTreeMap<String, FilterValue> = match value.get("filter") {
        None | Some(serde_json::Value::Null) => BTreeMap::new(),
        Some(filter_value) => serde_json::from_value(filter_value.clone()).map_err(|source| {
            AnnotationError::Malformed {
                raw: raw.text.clone(),
                source,
            }
        })?,
    };

    let exec: Vec<String> = match value.get("exec") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(exec_value) => serde_json::from_value(exec_value.clone()).map_err(|source| {
            AnnotationError::Malformed {
                raw: raw.text.clone(),
                source,
            }
        })?,
    };

    Ok(ResolvedAnnotation {
        file: file.to_path_buf(),
        line: raw.line,
        raw_line: raw_line.to_string(),
        registry,
        resource,
        policy,
        format,
        action,
        prefix,
        suffix,
        filter,
        group,
        exec,
    })
}

fn required_str(value: &serde_json::Value, field: &'static str) -> AnnotationResult<String> {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or(AnnotationError::MissingField(field))
}

fn optional_str(value: &serde_json::Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Strategy;
    use std::time::Duration;

    fn config_with_registry_and_policy() -> Config {
        let yaml = r#"
registries:
  docker-hub:
    type: docker
    interval: 1h
    url: "https://registry-1.docker.io"
policies:
  semver:
    extracts:
      - value: "<version>"
        strategy: semver
"#;
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = camino::Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::write(dir.join(".git-ops-update.yaml"), yaml).unwrap();
        crate::config::load(dir, None).unwrap()
    }

    fn raw(text: &str) -> RawAnnotation {
        RawAnnotation {
            line: 3,
            text: text.to_string(),
        }
    }

    #[test]
    fn resolves_a_minimal_directive() {
        let config = config_with_registry_and_policy();
        let resolved = resolve(
            &raw(r#"git-ops-update {"registry": "docker-hub", "resource": "library/nginx", "policy": "semver"}"#),
            "image: nginx:1.25.0 # git-ops-update {...}",
            Utf8Path::new("manifests/app.yaml"),
            &config,
        )
        .unwrap();

        assert_eq!(resolved.registry.name, "docker-hub");
        assert_eq!(resolved.resource, "library/nginx");
        assert_eq!(resolved.policy.name, "semver");
        assert_eq!(resolved.format, ValueFormat::Plain);
        assert_eq!(resolved.action, Action::Disabled);
        assert_eq!(resolved.registry.interval, Duration::from_secs(3600));
        assert!(matches!(
            resolved.policy.extracts[0].strategy,
            Strategy::Semver { .. }
        ));
    }

    #[test]
    fn unknown_registry_is_an_error() {
        let config = config_with_registry_and_policy();
        let err = resolve(
            &raw(r#"git-ops-update {"registry": "nope", "resource": "x", "policy": "semver"}"#),
            "",
            Utf8Path::new("a.yaml"),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, AnnotationError::UnknownRegistry(name) if name == "nope"));
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let config = config_with_registry_and_policy();
        let err = resolve(
            &raw(r#"git-ops-update {"registry": "docker-hub", "policy": "semver"}"#),
            "",
            Utf8Path::new("a.yaml"),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, AnnotationError::MissingField("resource")));
    }

    #[test]
    fn unrecognized_format_is_an_error() {
        let config = config_with_registry_and_policy();
        let err = resolve(
            &raw(r#"git-ops-update {"registry": "docker-hub", "resource": "x", "policy": "semver", "format": "bogus"}"#),
            "",
            Utf8Path::new("a.yaml"),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, AnnotationError::UnknownFormat(f) if f == "bogus"));
    }

    #[test]
    fn push_action_and_regexp_format_and_filter_parse() {
        let config = config_with_registry_and_policy();
        let resolved = resolve(
            &raw(
                r#"git-ops-update {"registry": "docker-hub", "resource": "x", "policy": "semver", "format": "regexp:v(?P<version>.*)", "action": "push", "filter": {"arch": ["amd64", "arm64"]}}"#,
            ),
            "",
            Utf8Path::new("a.yaml"),
            &config,
        )
        .unwrap();
        assert_eq!(resolved.format, ValueFormat::Regexp("v(?P<version>.*)".into()));
        assert_eq!(resolved.action, Action::Push);
        assert!(resolved.filter["arch"].matches("arm64"));
        assert!(!resolved.filter["arch"].matches("x86"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let config = config_with_registry_and_policy();
        let err = resolve(
            &raw("git-ops-update {not json"),
            "",
            Utf8Path::new("a.yaml"),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, AnnotationError::Malformed { .. }));
    }
}
