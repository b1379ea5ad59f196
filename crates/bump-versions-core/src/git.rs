//! Git operations for the `push`/`request` actions.
//!
//! Shells out to `git` for all operations. This ensures we inherit the
//! user's SSH keys, GPG signing, hooks, and other configuration, matching
//! the teacher's "never libgit2" approach.

use camino::Utf8Path;
use std::process::Command;

use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "status").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Check if we're inside a git repository.
#[instrument]
pub fn is_inside_repo(dir: &Utf8Path) -> GitResult<bool> {
    let result = git(dir, &["rev-parse", "--is-inside-work-tree"]);
    match result {
        Ok(output) => Ok(output.trim() == "true"),
        Err(GitError::Command { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Get the remote URL for a named remote (default: `"origin"`).
#[instrument]
pub fn remote_url(dir: &Utf8Path, remote: &str) -> GitResult<Option<String>> {
    let result = git(dir, &["remote", "get-url", remote]);
    match result {
        Ok(url) => {
            let url = url.trim().to_string();
            debug!(%remote, %url, "remote URL");
            Ok(Some(url))
        }
        Err(GitError::Command { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Parse owner and repo from a git remote URL.
///
/// Handles both HTTPS and SSH formats:
/// - `https://github.com/owner/repo.git`
/// - `git@github.com:owner/repo.git`
///
/// Returns `None` if the URL cannot be parsed.
pub fn parse_owner_repo(url: &str) -> Option<(String, String)> {
    let path = url.strip_prefix("git@").map_or_else(
        || {
            // HTTPS format: https://github.com/owner/repo.git
            url.split("//")
                .nth(1)
                .and_then(|after_scheme| after_scheme.split_once('/').map(|(_, path)| path))
        },
        |rest| {
            // SSH format: git@github.com:owner/repo.git
            rest.split_once(':').map(|(_, path)| path)
        },
    )?;

    let path = path.strip_suffix(".git").unwrap_or(path);
    let (owner, repo) = path.split_once('/')?;

    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

/// Creates and checks out a new branch from the current `HEAD`.
#[instrument]
pub fn checkout_new_branch(dir: &Utf8Path, branch: &str) -> GitResult<()> {
    git(dir, &["checkout", "-b", branch]).map(|_| ())
}

/// Stages every change in the working tree.
#[instrument]
pub fn stage_all(dir: &Utf8Path) -> GitResult<()> {
    git(dir, &["add", "-A"]).map(|_| ())
}

/// Commits staged changes with `message`, optionally as `author`
/// (`Name <email>`).
#[instrument(skip(message))]
pub fn commit(dir: &Utf8Path, message: &str, author: Option<&str>) -> GitResult<()> {
    let mut args = vec!["commit", "--message", message];
    if let Some(author) = author {
        args.push("--author");
        args.push(author);
    }
    git(dir, &args).map(|_| ())
}

/// Pushes `branch` to `remote`, creating the upstream tracking ref.
#[instrument]
pub fn push_branch(dir: &Utf8Path, remote: &str, branch: &str) -> GitResult<()> {
    git(dir, &["push", "--set-upstream", remote, branch]).map(|_| ())
}

/// Returns true if `branch` exists on `remote`.
#[instrument]
pub fn remote_branch_exists(dir: &Utf8Path, remote: &str, branch: &str) -> GitResult<bool> {
    let refspec = format!("refs/heads/{branch}");
    let output = git(dir, &["ls-remote", "--heads", remote, &refspec])?;
    Ok(!output.trim().is_empty())
}

/// Deletes `branch` from `remote`. Used to clean up a superseded
/// `request`-action branch once a newer ChangeSet replaces it.
#[instrument]
pub fn delete_remote_branch(dir: &Utf8Path, remote: &str, branch: &str) -> GitResult<()> {
    git(dir, &["push", remote, "--delete", branch]).map(|_| ())
}

/// Lists every branch name on `remote`. Used by the `request` action to
/// find branches superseded by a newer ChangeSet with the same group hash.
#[instrument]
pub fn list_remote_branches(dir: &Utf8Path, remote: &str) -> GitResult<Vec<String>> {
    let output = git(dir, &["ls-remote", "--heads", remote])?;
    Ok(output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|refname| refname.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .collect())
}

/// Run a git command in `dir` and return its stdout.
fn git(dir: &Utf8Path, args: &[&str]) -> GitResult<String> {
    let output = Command::new("git").current_dir(dir).args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepo);
        }

        Err(GitError::Command {
            command: args.first().unwrap_or(&"").to_string(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;

    fn here() -> &'static Utf8Path {
        Utf8Path::new(".")
    }

    #[test]
    fn is_inside_repo_returns_bool() {
        let result = is_inside_repo(here());
        assert!(result.is_ok());
    }

    #[test]
    fn git_error_on_bad_command() {
        let result = git(here(), &["not-a-real-subcommand"]);
        assert!(result.is_err());
    }

    #[test]
    fn remote_url_works_in_repo() {
        if is_inside_repo(here()).unwrap_or(false) {
            let result = remote_url(here(), "origin");
            assert!(result.is_ok());
        }
    }

    #[test]
    fn parse_owner_repo_https() {
        let result = parse_owner_repo("https://github.com/acme/gitops.git");
        assert_eq!(result, Some(("acme".into(), "gitops".into())));
    }

    #[test]
    fn parse_owner_repo_https_no_suffix() {
        let result = parse_owner_repo("https://github.com/acme/gitops");
        assert_eq!(result, Some(("acme".into(), "gitops".into())));
    }

    #[test]
    fn parse_owner_repo_ssh() {
        let result = parse_owner_repo("git@github.com:acme/gitops.git");
        assert_eq!(result, Some(("acme".into(), "gitops".into())));
    }

    #[test]
    fn parse_owner_repo_ssh_no_suffix() {
        let result = parse_owner_repo("git@github.com:acme/gitops");
        assert_eq!(result, Some(("acme".into(), "gitops".into())));
    }

    #[test]
    fn parse_owner_repo_invalid() {
        assert!(parse_owner_repo("not-a-url").is_none());
        assert!(parse_owner_repo("").is_none());
    }

    #[test]
    fn remote_branch_exists_false_for_bogus_branch() {
        if is_inside_repo(here()).unwrap_or(false) && remote_url(here(), "origin").ok().flatten().is_some() {
            let result = remote_branch_exists(here(), "origin", "definitely-not-a-real-branch-name");
            assert!(result.is_ok());
        }
    }
}
