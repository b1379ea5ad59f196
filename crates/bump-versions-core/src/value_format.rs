//! Value formats: how a scalar's raw text encodes (and is re-encoded with)
//! a version.
//!
//! `Regexp` patterns may legally repeat the named group `version` (the
//! source language allows it); Rust's `regex` crate does not, so repeated
//! occurrences are renamed to synthetic names before compiling and a parallel
//! index table maps compiled group indices back to the logical name. See
//! `DESIGN.md` ("duplicate named groups").

use regex::Regex;
use thiserror::Error;

use crate::model::ValueFormat;

/// Errors raised while extracting or replacing a version inside a value.
#[derive(Error, Debug)]
pub enum ValueFormatError {
    /// A `tag` value did not contain exactly one `:`.
    #[error("value {0:?} is not a valid image:tag pair")]
    NotATag(String),

    /// A `regexp` pattern failed to compile.
    #[error("regex pattern {pattern:?} failed to compile: {source}")]
    BadPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying compile error.
        #[source]
        source: regex::Error,
    },

    /// A `regexp` pattern did not declare a `version` capture group.
    #[error("regex pattern {0:?} has no named group \"version\"")]
    NoVersionGroup(String),

    /// A `regexp` pattern did not match the value.
    #[error("value {value:?} does not match pattern {pattern:?}")]
    NoMatch {
        /// The value that failed to match.
        value: String,
        /// The pattern it was checked against.
        pattern: String,
    },
}

/// Result alias for value-format operations.
pub type ValueFormatResult<T> = Result<T, ValueFormatError>;

/// Extracts the version substring out of a raw value per `format`.
pub fn extract_version(format: &ValueFormat, raw: &str) -> ValueFormatResult<String> {
    match format {
        ValueFormat::Plain => Ok(raw.to_string()),
        ValueFormat::Tag => {
            let (_, version) = split_tag(raw)?;
            Ok(version.to_string())
        }
        ValueFormat::Regexp(pattern) => {
            let compiled = CompiledRegexp::compile(pattern)?;
            compiled.extract(raw)
        }
    }
}

/// Replaces the version substring inside a raw value per `format`.
pub fn replace_version(
    format: &ValueFormat,
    raw: &str,
    new_version: &str,
) -> ValueFormatResult<String> {
    match format {
        ValueFormat::Plain => Ok(new_version.to_string()),
        ValueFormat::Tag => {
            let (image, _) = split_tag(raw)?;
            Ok(format!("{image}:{new_version}"))
        }
        ValueFormat::Regexp(pattern) => {
            let compiled = CompiledRegexp::compile(pattern)?;
            compiled.replace(raw, new_version)
        }
    }
}

fn split_tag(raw: &str) -> ValueFormatResult<(&str, &str)> {
    let mut parts = raw.splitn(2, ':');
    let image = parts.next().filter(|s| !s.is_empty());
    let version = parts.next().filter(|s| !s.is_empty());
    match (image, version, raw.matches(':').count()) {
        (Some(image), Some(version), 1) => Ok((image, version)),
        _ => Err(ValueFormatError::NotATag(raw.to_string())),
    }
}

/// A `regexp` value format pattern compiled with duplicate-`version`-group
/// emulation.
struct CompiledRegexp {
    regex: Regex,
    /// Compiled capture-group indices that logically stand for `version`.
    version_group_indices: Vec<usize>,
    original_pattern: String,
}

impl CompiledRegexp {
    fn compile(pattern: &str) -> ValueFormatResult<Self> {
        let (rewritten, occurrences) = rename_duplicate_named_groups(pattern, "version");
        if occurrences == 0 {
            return Err(ValueFormatError::NoVersionGroup(pattern.to_string()));
        }

        let regex = Regex::new(&rewritten).map_err(|source| ValueFormatError::BadPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut version_group_indices = Vec::new();
        for (index, name) in regex.capture_names().enumerate() {
            let Some(name) = name else { continue };
            if name == "version" || name.starts_with("version__dup") {
                version_group_indices.push(index);
            }
        }
        version_group_indices.sort_unstable();

        Ok(Self {
            regex,
            version_group_indices,
            original_pattern: pattern.to_string(),
        })
    }

    fn extract(&self, raw: &str) -> ValueFormatResult<String> {
        let captures = self
            .regex
            .captures(raw)
            .ok_or_else(|| ValueFormatError::NoMatch {
                value: raw.to_string(),
                pattern: self.original_pattern.clone(),
            })?;

        for &index in &self.version_group_indices {
            if let Some(m) = captures.get(index) {
                return Ok(m.as_str().to_string());
            }
        }
        Err(ValueFormatError::NoMatch {
            value: raw.to_string(),
            pattern: self.original_pattern.clone(),
        })
    }

    fn replace(&self, raw: &str, new_version: &str) -> ValueFormatResult<String> {
        let captures = self
            .regex
            .captures(raw)
            .ok_or_else(|| ValueFormatError::NoMatch {
                value: raw.to_string(),
                pattern: self.original_pattern.clone(),
            })?;

        let mut ranges: Vec<(usize, usize)> = self
            .version_group_indices
            .iter()
            .filter_map(|&index| captures.get(index))
            .map(|m| (m.start(), m.end()))
            .collect();
        ranges.sort_unstable();

        let mut out = String::with_capacity(raw.len());
        let mut cursor = 0;
        for (start, end) in ranges {
            out.push_str(&raw[cursor..start]);
            out.push_str(new_version);
            cursor = end;
        }
        out.push_str(&raw[cursor..]);
        Ok(out)
    }
}

/// Renames every occurrence of `(?P<name>...)` beyond the first to a
/// synthetic `name__dup{n}` group name. Returns the rewritten pattern and
/// the total number of occurrences found (including the first).
fn rename_duplicate_named_groups(pattern: &str, name: &str) -> (String, usize) {
    let needle = format!("(?P<{name}>");
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    let mut count = 0;

    while let Some(pos) = rest.find(&needle) {
        out.push_str(&rest[..pos]);
        if count == 0 {
            out.push_str(&needle);
        } else {
            out.push_str(&format!("(?P<{name}__dup{}>", count - 1));
        }
        rest = &rest[pos + needle.len()..];
        count += 1;
    }
    out.push_str(rest);

    (out, count)
}
