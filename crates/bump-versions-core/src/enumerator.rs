//! Recursive file enumeration against `files.includes`/`files.excludes`
//! (SPEC_FULL.md §4.1).

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use thiserror::Error;

use crate::config::FilesConfig;

/// Errors raised while walking the scan root.
#[derive(Error, Debug)]
pub enum EnumeratorError {
    /// Failed to read a directory's entries.
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        /// Directory that could not be read.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to stat a directory entry.
    #[error("failed to stat {path}: {source}")]
    Metadata {
        /// Entry that could not be stat'd.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A directory entry's path is not valid UTF-8.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(std::path::PathBuf),

    /// An `includes`/`excludes` pattern failed to compile.
    ///
    /// `Config::validate` rejects this before a scan starts; this variant
    /// exists for callers that enumerate against a `FilesConfig` built
    /// without going through `Config::load`.
    #[error("file pattern {0:?} failed to compile: {1}")]
    BadPattern(String, #[source] regex::Error),
}

/// Result alias for enumerator operations.
pub type EnumeratorResult<T> = Result<T, EnumeratorError>;

/// Matches the default-excluded configuration and cache files, so a
/// `files.includes` of `.*` does not re-scan the tool's own state.
fn default_exclusion() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"/\.git-ops-update(\.cache)?\.yaml$").expect("static pattern")
    })
}

/// Returns every file under `dir` whose path (relative to `dir`, with a
/// leading `/`) matches `files.includes` and none of `files.excludes`, in
/// directory-walk order. Returned paths are absolute.
pub fn enumerate(dir: &Utf8Path, files: &FilesConfig) -> EnumeratorResult<Vec<Utf8PathBuf>> {
    let includes = compile_all(&files.includes)?;
    let excludes = compile_all(&files.excludes)?;

    let mut results = Vec::new();
    walk(dir, dir, &includes, &excludes, &mut results)?;
    Ok(results)
}

fn compile_all(patterns: &[String]) -> EnumeratorResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| EnumeratorError::BadPattern(pattern.clone(), source))
        })
        .collect()
}

fn walk(
    root: &Utf8Path,
    dir: &Utf8Path,
    includes: &[Regex],
    excludes: &[Regex],
    results: &mut Vec<Utf8PathBuf>,
) -> EnumeratorResult<()> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| EnumeratorError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut entries: Vec<std::fs::DirEntry> = read_dir
        .collect::<Result<_, _>>()
        .map_err(|source| EnumeratorError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(EnumeratorError::NonUtf8Path)?;
        let metadata = entry.metadata().map_err(|source| EnumeratorError::Metadata {
            path: path.clone(),
            source,
        })?;

        if metadata.is_dir() {
            walk(root, &path, includes, excludes, results)?;
            continue;
        }

        let relative = format!("/{}", path.strip_prefix(root).unwrap_or(path.as_path()));
        if is_included(&relative, includes, excludes) {
            results.push(path);
        }
    }

    Ok(())
}

fn is_included(relative: &str, includes: &[Regex], excludes: &[Regex]) -> bool {
    if default_exclusion().is_match(relative) {
        return false;
    }
    if !includes.iter().any(|re| re.is_match(relative)) {
        return false;
    }
    !excludes.iter().any(|re| re.is_match(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn files(includes: &[&str], excludes: &[&str]) -> FilesConfig {
        FilesConfig {
            includes: includes.iter().map(|s| s.to_string()).collect(),
            excludes: excludes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn finds_included_files_recursively() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.yaml"), "").unwrap();
        fs::write(dir.join("sub/b.yaml"), "").unwrap();
        fs::write(dir.join("c.txt"), "").unwrap();

        let found = enumerate(dir, &files(&[r"\.yaml$"], &[])).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension() == Some("yaml")));
    }

    #[test]
    fn excludes_override_includes() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        fs::write(dir.join("a.yaml"), "").unwrap();
        fs::write(dir.join("a.generated.yaml"), "").unwrap();

        let found = enumerate(dir, &files(&[r"\.yaml$"], &[r"\.generated\.yaml$"])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), Some("a.yaml"));
    }

    #[test]
    fn config_and_cache_files_are_excluded_by_default() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        fs::write(dir.join(".git-ops-update.yaml"), "").unwrap();
        fs::write(dir.join(".git-ops-update.cache.yaml"), "").unwrap();
        fs::write(dir.join("a.yaml"), "").unwrap();

        let found = enumerate(dir, &files(&[r"\.yaml$"], &[])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name(), Some("a.yaml"));
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        assert!(matches!(
            enumerate(dir, &files(&["(unclosed"], &[])),
            Err(EnumeratorError::BadPattern(_, _))
        ));
    }
}
