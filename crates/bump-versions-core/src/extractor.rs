//! YAML annotation extraction and line rewriting.
//!
//! No mainstream Rust YAml crate preserves trailing line comments the way
//! the source tool's YAML library does, so this module is a hybrid: `saphyr`
//! validates each document's syntax (so a genuinely broken document is
//! reported as a parse error), while the actual annotation/line extraction
//! is a hand-rolled, quote-aware line scanner. This only supports the
//! subset of YAML line shapes a GitOps manifest actually uses — mapping
//! scalars, sequence scalars, and block scalars — not flow collections,
//! anchors, multi-line flow scalars, or a sequence item that opens a nested
//! mapping on the same line (`- key: value`, where the scalar is `value`,
//! not the whole remainder); see `DESIGN.md`.

use thiserror::Error;

/// Errors raised while extracting annotations from a file's contents.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// A YAML document failed to parse.
    #[error("document {document_index} is not valid YAML: {source}")]
    InvalidYaml {
        /// 0-based index of the offending document within the file.
        document_index: usize,
        /// Underlying parse error.
        source: String,
    },
}

/// Result alias for extractor operations.
pub type ExtractorResult<T> = Result<T, ExtractorError>;

/// A single raw, unresolved annotation found on a scalar's trailing comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAnnotation {
    /// 0-based line number within the file.
    pub line: usize,
    /// Comment text with the leading `#` stripped and one leading space
    /// trimmed.
    pub text: String,
}

/// Quoting style of a scalar, needed to read/rewrite its text faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// No surrounding quotes.
    Plain,
    /// Surrounded by `'...'`.
    Single,
    /// Surrounded by `"..."`.
    Double,
}

/// The location and quoting of a mapping/sequence scalar value on a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarSpan {
    /// Byte offset where the scalar's own text starts (inside quotes, if
    /// any).
    pub start: usize,
    /// Byte offset where the scalar's own text ends.
    pub end: usize,
    /// How the scalar is quoted.
    pub quote: Quote,
}

/// Scans `content` (a full file's text) and returns every annotation found
/// on a plain/quoted scalar's trailing line comment.
///
/// Block-scalar bodies (and the header line that opens them) never yield
/// annotations, even if their text contains `# git-ops-update {...}`.
pub fn extract(content: &str) -> ExtractorResult<Vec<RawAnnotation>> {
    validate_documents(content)?;

    let lines: Vec<&str> = content.split('\n').collect();
    let mut annotations = Vec::new();
    let mut block_scalar: Option<usize> = None; // Some(indent of the header line)

    for (index, line) in lines.iter().enumerate() {
        if let Some(header_indent) = block_scalar {
            if line.trim().is_empty() || indent_of(line) > header_indent {
                continue;
            }
            block_scalar = None;
        }

        if line.trim_start().starts_with("---") {
            continue;
        }

        let Some(comment) = find_trailing_comment(line) else {
            if opens_block_scalar(line) {
                block_scalar = Some(indent_of(line));
            }
            continue;
        };

        if opens_block_scalar(&line[..comment.comment_start]) {
            block_scalar = Some(indent_of(line));
            continue;
        }

        if let Some(stripped) = comment.text.strip_prefix('#') {
            let text = stripped.strip_prefix(' ').unwrap_or(stripped);
            annotations.push(RawAnnotation {
                line: index,
                text: text.to_string(),
            });
        }
    }

    Ok(annotations)
}

/// Finds the scalar span on `line`, if the line is a mapping or sequence
/// entry carrying a plain/single/double-quoted scalar value.
pub fn scalar_span(line: &str) -> Option<ScalarSpan> {
    let value_start = value_start_offset(line)?;
    let comment = find_trailing_comment(line);
    let value_end = comment.map_or(line.len(), |c| c.comment_start);
    let raw_value = &line[value_start..value_end];
    let trimmed_start = value_start + (raw_value.len() - raw_value.trim_start().len());
    let trimmed = raw_value.trim();
    let trimmed_end = trimmed_start + trimmed.len();

    if trimmed.is_empty() {
        return Some(ScalarSpan {
            start: trimmed_start,
            end: trimmed_start,
            quote: Quote::Plain,
        });
    }

    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        return Some(ScalarSpan {
            start: trimmed_start + 1,
            end: trimmed_end - 1,
            quote: Quote::Single,
        });
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return Some(ScalarSpan {
            start: trimmed_start + 1,
            end: trimmed_end - 1,
            quote: Quote::Double,
        });
    }

    Some(ScalarSpan {
        start: trimmed_start,
        end: trimmed_end,
        quote: Quote::Plain,
    })
}

/// Reads the scalar text a [`ScalarSpan`] points to.
pub fn read_scalar(line: &str, span: &ScalarSpan) -> String {
    line[span.start..span.end].to_string()
}

/// Rewrites `line`, replacing the scalar `span` points to with `new_value`,
/// preserving everything else (leading whitespace, key, comment, quote
/// style).
pub fn rewrite_line(line: &str, span: &ScalarSpan, new_value: &str) -> String {
    let quoted = match span.quote {
        Quote::Plain => new_value.to_string(),
        Quote::Single => format!("'{new_value}'"),
        Quote::Double => format!("\"{new_value}\""),
    };

    let (open, close) = match span.quote {
        Quote::Plain => (span.start, span.end),
        Quote::Single | Quote::Double => (span.start - 1, span.end + 1),
    };

    format!("{}{}{}", &line[..open], quoted, &line[close..])
}

fn value_start_offset(line: &str) -> Option<usize> {
    let trimmed_start = line.len() - line.trim_start().len();
    let trimmed = &line[trimmed_start..];
    if trimmed.starts_with('#') {
        return None;
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        let offset = trimmed_start + (trimmed.len() - rest.len());
        return Some(offset);
    }
    if trimmed == "-" {
        return None;
    }

    let colon = find_unquoted_colon(trimmed)?;
    let after = colon + 1;
    if after >= trimmed.len() {
        return Some(trimmed_start + after);
    }
    if !trimmed.as_bytes()[after].is_ascii_whitespace() {
        // `foo:bar` inside a value, not a key separator at top level.
        return None;
    }
    Some(trimmed_start + after)
}

fn find_unquoted_colon(s: &str) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ':' if !in_single && !in_double => return Some(i),
            _ => {}
        }
    }
    None
}

struct TrailingComment {
    comment_start: usize,
    text: String,
}

fn find_trailing_comment(line: &str) -> Option<TrailingComment> {
    let bytes = line.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    let mut prev_is_space = true;

    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double && prev_is_space => {
                return Some(TrailingComment {
                    comment_start: i,
                    text: line[i..].to_string(),
                });
            }
            _ => {}
        }
        prev_is_space = c.is_whitespace();
        i += 1;
    }
    None
}

fn opens_block_scalar(prefix_of_line: &str) -> bool {
    let Some(value_start) = value_start_offset(prefix_of_line) else {
        return false;
    };
    let value = prefix_of_line[value_start..].trim();
    matches!(
        value,
        "|" | "|-" | "|+" | ">" | ">-" | ">+"
    ) || (value.len() == 2
        && matches!(value.as_bytes()[0], b'|' | b'>')
        && value.as_bytes()[1].is_ascii_digit())
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn validate_documents(content: &str) -> ExtractorResult<()> {
    for (index, document) in split_documents(content).into_iter().enumerate() {
        if document.trim().is_empty() {
            continue;
        }
        saphyr::YamlLoader::load_from_str(&document).map_err(|e| ExtractorError::InvalidYaml {
            document_index: index,
            source: e.to_string(),
        })?;
    }
    Ok(())
}

fn split_documents(content: &str) -> Vec<String> {
    let mut documents = Vec::new();
    let mut current = Vec::new();
    for line in content.split('\n') {
        if line.trim_start().starts_with("---") && !current.is_empty() {
            documents.push(current.join("\n"));
            current = Vec::new();
        }
        current.push(line);
    }
    documents.push(current.join("\n"));
    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_annotation() {
        let content = "bar1: value # git-ops-update {}\n";
        let found = extract(content).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 0);
        assert_eq!(found[0].text, "git-ops-update {}");
    }

    #[test]
    fn skips_block_scalar_body_comments() {
        let content = "\
foo2: |
  # git-ops-update {}
  some body text
bar1: value # git-ops-update {}
";
        let found = extract(content).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 3);
    }

    #[test]
    fn ignores_comments_without_the_directive() {
        let content = "key: value # just a note\n";
        assert!(extract(content).unwrap().is_empty());
    }

    #[test]
    fn invalid_yaml_document_is_an_error() {
        let content = "key: [unterminated\n";
        assert!(extract(content).is_err());
    }

    #[test]
    fn scalar_span_reads_plain_value() {
        let line = "image: nginx:1.25.0 # git-ops-update {}";
        let span = scalar_span(line).unwrap();
        assert_eq!(read_scalar(line, &span), "nginx:1.25.0");
    }

    #[test]
    fn scalar_span_reads_quoted_value() {
        let line = r#"version: "1.2.3" # git-ops-update {}"#;
        let span = scalar_span(line).unwrap();
        assert_eq!(read_scalar(line, &span), "1.2.3");
        assert_eq!(span.quote, Quote::Double);
    }

    #[test]
    fn rewrite_line_preserves_quote_style_and_comment() {
        let line = r#"version: "1.2.3" # git-ops-update {}"#;
        let span = scalar_span(line).unwrap();
        let rewritten = rewrite_line(line, &span, "2.0.0");
        assert_eq!(rewritten, r#"version: "2.0.0" # git-ops-update {}"#);
    }

    #[test]
    fn rewrite_line_preserves_leading_whitespace() {
        let line = "  image: my-image:1.0.0 # git-ops-update {}";
        let span = scalar_span(line).unwrap();
        let rewritten = rewrite_line(line, &span, "my-image:2.0.0");
        assert_eq!(rewritten, "  image: my-image:2.0.0 # git-ops-update {}");
    }

    #[test]
    fn sequence_item_scalar_span() {
        let line = "- my-image:1.0.0 # git-ops-update {}";
        let span = scalar_span(line).unwrap();
        assert_eq!(read_scalar(line, &span), "my-image:1.0.0");
    }

    #[test]
    fn documents_are_split_on_separators() {
        let content = "a: 1\n---\nb: 2\n";
        let docs = split_documents(content);
        assert_eq!(docs.len(), 2);
    }
}
