//! Actions: what happens to a dispatched [`ChangeSet`] (SPEC_FULL.md §4.7,
//! §4.8).

mod local;
mod push;
mod request;

pub use local::LocalWriteAction;
pub use push::PushAction;
pub use request::{ForgeClient, RequestAction};

use camino::Utf8Path;
use thiserror::Error;

use crate::exec::ExecError;
use crate::git::GitError;
use crate::model::ChangeSet;

/// Errors raised while checking or applying an action.
#[derive(Error, Debug)]
pub enum ActionError {
    /// Failed to read or write a change's file.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path that could not be written.
        path: camino::Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A Change's recorded line is out of range for its current file
    /// contents — the file changed shape since extraction.
    #[error("{path}:{line} is out of range for the file's current contents")]
    LineOutOfRange {
        /// The file being rewritten.
        path: camino::Utf8PathBuf,
        /// The out-of-range line number.
        line: usize,
    },

    /// An `exec` command failed.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The remote forge returned an error (request action only).
    #[error("forge request failed: {0}")]
    Forge(String),
}

/// Result alias for action operations.
pub type ActionResult<T> = Result<T, ActionError>;

/// A pluggable way to dispatch a [`ChangeSet`] once it has been detected.
pub trait ActionExecutor {
    /// Stable identifier used to scope cache entries and group keys
    /// (`"local"`, `"push"`, `"request"`).
    fn identifier(&self) -> &'static str;

    /// Returns true if this exact ChangeSet has already been applied and
    /// dispatch should be skipped. Defaults to `false` — "no natural
    /// idempotence check" per SPEC_FULL.md §4.8.
    fn already_applied(&self, _dir: &Utf8Path, _change_set: &ChangeSet) -> ActionResult<bool> {
        Ok(false)
    }

    /// Applies every change in `change_set` and performs any backend-
    /// specific follow-up (commit, push, open a request).
    fn apply(&self, dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<()>;
}

/// Writes every change in `change_set` to its file and runs its `exec`
/// commands. Shared by every [`ActionExecutor`], since `push` and `request`
/// both start with the same local write step.
pub(crate) fn write_change_set(dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<()> {
    for change in &change_set.changes {
        let path = dir.join(&change.file);
        let content = std::fs::read_to_string(&path).map_err(|source| ActionError::Io {
            path: path.clone(),
            source,
        })?;

        let mut lines: Vec<&str> = content.split('\n').collect();
        if change.line >= lines.len() {
            return Err(ActionError::LineOutOfRange {
                path,
                line: change.line,
            });
        }
        lines[change.line] = &change.new_raw_line;
        let new_content = lines.join("\n");

        std::fs::write(&path, new_content).map_err(|source| ActionError::Io {
            path: path.clone(),
            source,
        })?;

        crate::exec::run_all(dir, &change.exec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Change, ValueFormat};
    use camino::Utf8PathBuf;

    fn change_set() -> ChangeSet {
        ChangeSet {
            group: String::new(),
            changes: vec![Change {
                registry_name: "docker-hub".into(),
                resource_name: "library/nginx".into(),
                old_version: "1.25.0".into(),
                new_version: "1.26.0".into(),
                file: Utf8PathBuf::from("app.yaml"),
                line: 0,
                format: ValueFormat::Plain,
                old_raw_line: "image: nginx:1.25.0".into(),
                new_raw_line: "image: nginx:1.26.0".into(),
                exec: Vec::new(),
                group: None,
            }],
        }
    }

    #[test]
    fn write_change_set_rewrites_the_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = camino::Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::write(dir.join("app.yaml"), "image: nginx:1.25.0\nother: 1\n").unwrap();

        let set = change_set();
        write_change_set(dir, &set).unwrap();

        let contents = std::fs::read_to_string(dir.join("app.yaml")).unwrap();
        assert_eq!(contents, "image: nginx:1.26.0\nother: 1\n");
    }

    #[test]
    fn write_change_set_reports_out_of_range_line() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = camino::Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::write(dir.join("app.yaml"), "image: nginx:1.25.0\n").unwrap();

        let mut set = change_set();
        set.changes[0].line = 50;
        let err = write_change_set(dir, &set).unwrap_err();
        assert!(matches!(err, ActionError::LineOutOfRange { .. }));
    }
}
