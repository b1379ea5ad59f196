//! The policy engine: parses version strings into ordered extracts, filters
//! and sorts candidates, and picks the next version to adopt.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::Regex;
use thiserror::Error;

use crate::model::{ExtractConfig, FilterValue, PolicyConfig, Strategy};

/// Errors raised by the policy engine.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// The policy's pattern failed to compile.
    #[error("policy pattern {0:?} failed to compile: {1}")]
    BadPattern(String, #[source] regex::Error),

    /// The current version does not match the policy at all (hard error;
    /// unlike candidates, the current version is never silently skipped).
    #[error("current version {0:?} does not match the policy")]
    CurrentDoesNotMatch(String),

    /// The current version matched the pattern but one of its extracts is
    /// not valid under its strategy (hard error).
    #[error("current version {0:?} has an extract invalid under its strategy")]
    CurrentExtractInvalid(String),

    /// A filter referenced a segment path never produced by this policy.
    #[error("filter references unknown segment {0:?}")]
    UnknownFilterSegment(String),
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// A version string successfully parsed under a policy: its decomposed
/// segments and its ordered list of extracted comparison values.
#[derive(Debug, Clone)]
pub struct ParsedVersion {
    /// The original, unmodified version string.
    pub raw: String,
    /// Every named segment produced by the pattern match and by each
    /// extract's strategy-specific decomposition.
    pub segments: BTreeMap<String, String>,
    /// The ordered extracted values, one per `ExtractConfig`.
    pub extracts: Vec<String>,
}

/// Phase A: parse a single version string under `policy`.
///
/// Returns `Ok(None)` when `v` does not carry `prefix`/`suffix`, or when the
/// policy's pattern does not match — this is a *skip* signal, not an error;
/// callers parsing the "current" version must turn a `None` here into
/// [`PolicyError::CurrentDoesNotMatch`] themselves, since only they know
/// whether `v` is the current version or a candidate.
pub fn parse(
    policy: &PolicyConfig,
    v: &str,
    prefix: &str,
    suffix: &str,
) -> PolicyResult<Option<ParsedVersion>> {
    let Some(w) = v.strip_prefix(prefix).and_then(|s| s.strip_suffix(suffix)) else {
        return Ok(None);
    };

    let mut segments = BTreeMap::new();
    if let Some(pattern) = &policy.pattern {
        let regex =
            Regex::new(pattern).map_err(|e| PolicyError::BadPattern(pattern.clone(), e))?;
        let Some(captures) = regex.captures(w) else {
            return Ok(None);
        };
        for name in regex.capture_names().flatten() {
            if let Some(m) = captures.name(name) {
                segments.insert(name.to_string(), m.as_str().to_string());
            }
        }
    }

    let mut extracts = Vec::with_capacity(policy.extracts.len());
    for extract in &policy.extracts {
        let value = substitute(&extract.value, &segments);
        if let Some(key) = &extract.key {
            for (sub_name, sub_value) in strategy_segments(&extract.strategy, &value) {
                segments.insert(format!("{key}.{sub_name}"), sub_value);
            }
        }
        extracts.push(value);
    }

    Ok(Some(ParsedVersion {
        raw: v.to_string(),
        segments,
        extracts,
    }))
}

fn substitute(template: &str, segments: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];
        if let Some(end) = rest.find('>') {
            let name = &rest[..end];
            out.push_str(segments.get(name).map_or("", String::as_str));
            rest = &rest[end + 1..];
        } else {
            out.push('<');
            break;
        }
    }
    out.push_str(rest);
    out
}

/// Phase B: rank `candidates` against `current`, returning the compatible
/// survivors sorted descending.
pub fn filter_and_sort(
    policy: &PolicyConfig,
    current: &str,
    candidates: &[String],
    prefix: &str,
    suffix: &str,
    filter: &BTreeMap<String, FilterValue>,
) -> PolicyResult<Vec<ParsedVersion>> {
    let current_parsed = parse(policy, current, prefix, suffix)?
        .ok_or_else(|| PolicyError::CurrentDoesNotMatch(current.to_string()))?;

    let current_extracts_valid = policy
        .extracts
        .iter()
        .zip(current_parsed.extracts.iter())
        .all(|(extract, value)| strategy_is_valid(&extract.strategy, value));
    if !current_extracts_valid {
        return Err(PolicyError::CurrentExtractInvalid(current.to_string()));
    }

    let mut survivors = Vec::new();
    for candidate in candidates {
        let Some(parsed) = parse(policy, candidate, prefix, suffix)? else {
            continue;
        };

        if !matches_filter(&parsed, filter)? {
            continue;
        }

        if !is_compatible(policy, &current_parsed, &parsed) {
            continue;
        }

        survivors.push(parsed);
    }

    survivors.sort_by(|a, b| compare_parsed(policy, b, a));
    Ok(survivors)
}

fn matches_filter(
    parsed: &ParsedVersion,
    filter: &BTreeMap<String, FilterValue>,
) -> PolicyResult<bool> {
    for (key, constraint) in filter {
        let Some(segment) = parsed.segments.get(key) else {
            return Err(PolicyError::UnknownFilterSegment(key.clone()));
        };
        if !constraint.matches(segment) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_compatible(policy: &PolicyConfig, current: &ParsedVersion, candidate: &ParsedVersion) -> bool {
    policy
        .extracts
        .iter()
        .zip(current.extracts.iter())
        .zip(candidate.extracts.iter())
        .all(|((extract, current_value), candidate_value)| {
            strategy_is_valid(&extract.strategy, current_value)
                && strategy_is_valid(&extract.strategy, candidate_value)
                && strategy_is_compatible(&extract.strategy, current_value, candidate_value)
        })
}

fn compare_parsed(policy: &PolicyConfig, a: &ParsedVersion, b: &ParsedVersion) -> Ordering {
    for ((extract, av), bv) in policy.extracts.iter().zip(a.extracts.iter()).zip(b.extracts.iter()) {
        let ordering = strategy_compare(&extract.strategy, av, bv);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.raw.cmp(&b.raw)
}

/// Finds the version that should replace `current` among `candidates`.
///
/// `current` is always inserted into the candidate pool so the function has
/// a fixed point to fall back to; the result is either an element of
/// `candidates` or `current` itself.
pub fn find_next(
    policy: &PolicyConfig,
    current: &str,
    candidates: &[String],
    prefix: &str,
    suffix: &str,
    filter: &BTreeMap<String, FilterValue>,
) -> PolicyResult<String> {
    let mut pool = candidates.to_vec();
    if !pool.iter().any(|c| c == current) {
        pool.push(current.to_string());
    }

    let survivors = filter_and_sort(policy, current, &pool, prefix, suffix, filter)?;
    let Some(head) = survivors.first() else {
        return Ok(current.to_string());
    };

    if head.raw == current {
        return Ok(current.to_string());
    }

    let current_parsed = parse(policy, current, prefix, suffix)?
        .ok_or_else(|| PolicyError::CurrentDoesNotMatch(current.to_string()))?;
    if compare_parsed(policy, head, &current_parsed) == Ordering::Greater {
        Ok(head.raw.clone())
    } else {
        Ok(current.to_string())
    }
}

// ── Strategy methods ──────────────────────────────────────────────────

fn strategy_is_valid(strategy: &Strategy, value: &str) -> bool {
    match strategy {
        Strategy::Lexicographic { .. } => true,
        Strategy::Numeric { .. } => value.is_empty() || value.chars().all(|c| c.is_ascii_digit()),
        Strategy::Semver { relaxed, .. } => parse_semver(value, *relaxed).is_some(),
    }
}

fn strategy_compare(strategy: &Strategy, a: &str, b: &str) -> Ordering {
    match strategy {
        Strategy::Lexicographic { .. } => a.cmp(b),
        Strategy::Numeric { .. } => compare_numeric(a, b),
        Strategy::Semver { relaxed, .. } => {
            match (parse_semver(a, *relaxed), parse_semver(b, *relaxed)) {
                (Some(av), Some(bv)) => av.cmp(&bv),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => Ordering::Equal,
            }
        }
    }
}

fn strategy_is_compatible(strategy: &Strategy, current: &str, candidate: &str) -> bool {
    match strategy {
        Strategy::Lexicographic { pin } => !pin || current == candidate,
        Strategy::Numeric { pin } => !pin || current == candidate,
        Strategy::Semver {
            pin_major,
            pin_minor,
            pin_patch,
            allow_prereleases,
            relaxed,
        } => {
            let (Some(cur), Some(cand)) =
                (parse_semver(current, *relaxed), parse_semver(candidate, *relaxed))
            else {
                return false;
            };
            if *pin_major && cur.major != cand.major {
                return false;
            }
            if *pin_minor && (cur.major, cur.minor) != (cand.major, cand.minor) {
                return false;
            }
            if *pin_patch && (cur.major, cur.minor, cur.patch) != (cand.major, cand.minor, cand.patch) {
                return false;
            }
            if !allow_prereleases && !cand.pre.is_empty() {
                return false;
            }
            true
        }
    }
}

fn strategy_segments(strategy: &Strategy, value: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Strategy::Semver { relaxed, .. } = strategy {
        if let Some(v) = parse_semver(value, *relaxed) {
            out.insert("major".into(), v.major.to_string());
            out.insert("minor".into(), v.minor.to_string());
            out.insert("patch".into(), v.patch.to_string());
            out.insert("pre".into(), v.pre.as_str().to_string());
            out.insert("build".into(), v.build.as_str().to_string());
            for (i, part) in v.pre.as_str().split('.').enumerate() {
                if !part.is_empty() {
                    out.insert(format!("pre.{i}"), part.to_string());
                }
            }
            for (i, part) in v.build.as_str().split('.').enumerate() {
                if !part.is_empty() {
                    out.insert(format!("build.{i}"), part.to_string());
                }
            }
        }
    }
    out
}

fn numeric_value(value: &str) -> u64 {
    if value.is_empty() {
        0
    } else {
        value.parse().unwrap_or(0)
    }
}

/// Empty sorts strictly below any parsed integer, rather than being treated
/// as the number zero — an empty extract is "absent", not "zero".
fn compare_numeric(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => numeric_value(a).cmp(&numeric_value(b)),
    }
}

/// Parses `value` as semver 2.0, optionally pre-normalizing `"1"`/`"1.2"`
/// by zero-padding missing components (relaxed mode).
fn parse_semver(value: &str, relaxed: bool) -> Option<semver::Version> {
    if let Ok(v) = semver::Version::parse(value) {
        return Some(v);
    }
    if !relaxed {
        return None;
    }

    let (core, rest) = match value.split_once('-') {
        Some((core, pre)) => (core, Some(format!("-{pre}"))),
        None => (value, None),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty()) {
        return None;
    }
    let mut padded = parts.to_vec();
    while padded.len() < 3 {
        padded.push("0");
    }
    let normalized = format!("{}{}", padded.join("."), rest.unwrap_or_default());
    semver::Version::parse(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractConfig;

    fn semver_pin_major_policy() -> PolicyConfig {
        PolicyConfig {
            name: "semver".into(),
            pattern: Some(r"^v?(?P<version>.*)$".into()),
            extracts: vec![ExtractConfig {
                key: Some("version".into()),
                value: "<version>".into(),
                strategy: Strategy::Semver {
                    pin_major: true,
                    pin_minor: false,
                    pin_patch: false,
                    allow_prereleases: false,
                    relaxed: true,
                },
            }],
        }
    }

    #[test]
    fn semver_pin_major_find_next() {
        let policy = semver_pin_major_policy();
        let candidates: Vec<String> = [
            "0.10.0", "0.10.1", "0.10.2", "0.10.3", "0.10.4-pre", "0.11.0-pre",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let next = find_next(&policy, "0.10.0", &candidates, "", "", &BTreeMap::new()).unwrap();
        assert_eq!(next, "0.10.3");
    }

    #[test]
    fn semver_pin_major_allow_prereleases() {
        let mut policy = semver_pin_major_policy();
        let Strategy::Semver {
            allow_prereleases, ..
        } = &mut policy.extracts[0].strategy
        else {
            unreachable!()
        };
        *allow_prereleases = true;

        let candidates: Vec<String> = [
            "0.10.0", "0.10.1", "0.10.2", "0.10.3", "0.10.4-pre", "0.11.0-pre",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let next = find_next(&policy, "0.10.0", &candidates, "", "", &BTreeMap::new()).unwrap();
        assert_eq!(next, "0.11.0-pre");
    }

    #[test]
    fn semver_pin_major_with_filter() {
        let policy = semver_pin_major_policy();
        let candidates: Vec<String> = [
            "0.10.0", "0.10.1", "0.10.2", "0.10.3", "0.10.4-pre", "0.11.0-pre",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut filter = BTreeMap::new();
        filter.insert("version.major".to_string(), FilterValue::One("0".into()));
        filter.insert("version.minor".to_string(), FilterValue::One("10".into()));

        let next = find_next(&policy, "0.10.0", &candidates, "", "", &filter).unwrap();
        assert_eq!(next, "0.10.3");
    }

    #[test]
    fn prefix_suffix_trimming() {
        let policy = PolicyConfig {
            name: "ubuntu".into(),
            pattern: Some(r"^(?P<major>\d+)\.(?P<minor>\d+)(-.+)?$".into()),
            extracts: vec![
                ExtractConfig {
                    key: None,
                    value: "<major>".into(),
                    strategy: Strategy::Numeric { pin: false },
                },
                ExtractConfig {
                    key: None,
                    value: "<minor>".into(),
                    strategy: Strategy::Numeric { pin: false },
                },
            ],
        };

        let candidates: Vec<String> = vec![
            "17.10".into(),
            "v18.04-ubuntu".into(),
            "v20.04-ubuntu".into(),
            "v22.04-ubuntu".into(),
        ];

        let survivors =
            filter_and_sort(&policy, "v1.0-ubuntu", &candidates, "v", "-ubuntu", &BTreeMap::new())
                .unwrap();
        let raws: Vec<&str> = survivors.iter().map(|p| p.raw.as_str()).collect();
        assert_eq!(raws, vec!["v22.04-ubuntu", "v20.04-ubuntu", "v18.04-ubuntu"]);
    }

    #[test]
    fn numeric_empty_is_zero() {
        let policy = PolicyConfig {
            name: "numeric".into(),
            pattern: None,
            extracts: vec![ExtractConfig {
                key: None,
                value: "<version>".into(),
                strategy: Strategy::Numeric { pin: false },
            }],
        };
        // No pattern means `<version>` never substitutes; exercise the
        // strategy helpers directly instead.
        assert!(strategy_is_valid(&policy.extracts[0].strategy, ""));
        assert_eq!(numeric_value(""), 0);
    }

    #[test]
    fn numeric_empty_sorts_strictly_below_zero() {
        let strategy = Strategy::Numeric { pin: false };
        assert_eq!(strategy_compare(&strategy, "", "0"), Ordering::Less);
        assert_eq!(strategy_compare(&strategy, "0", ""), Ordering::Greater);
        assert_eq!(strategy_compare(&strategy, "", ""), Ordering::Equal);
        assert_eq!(strategy_compare(&strategy, "0", "0"), Ordering::Equal);
    }

    #[test]
    fn find_next_round_trips_when_only_current_present() {
        let policy = semver_pin_major_policy();
        let next = find_next(&policy, "1.2.3", &["1.2.3".to_string()], "", "", &BTreeMap::new())
            .unwrap();
        assert_eq!(next, "1.2.3");
    }

    #[test]
    fn current_version_not_matching_policy_is_a_hard_error() {
        let policy = PolicyConfig {
            name: "strict".into(),
            pattern: Some(r"^only-this-literal$".into()),
            extracts: vec![],
        };
        let err = find_next(&policy, "something-else", &[], "", "", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, PolicyError::CurrentDoesNotMatch(_)));
    }
}
