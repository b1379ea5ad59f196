//! The `request` action: push a branch and open/update a forge pull
//! request (SPEC_FULL.md §4.8).
//!
//! Forge credentials and pull/merge-request creation are an explicit
//! Non-goal/external collaborator (SPEC_FULL.md §1), so this module defines
//! the `ForgeClient` trait with no default HTTP implementation. Callers
//! supply one (a GitHub/GitLab client, or a test double) at construction
//! time.

use camino::Utf8Path;

use crate::git;
use crate::model::ChangeSet;

use super::{write_change_set, ActionExecutor, ActionResult};

const DEFAULT_REMOTE: &str = "origin";
const DEFAULT_BRANCH_PREFIX: &str = "bump-versions";

/// An open pull/merge request's identity, as reported by a [`ForgeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Branch the request is open against.
    pub branch: String,
    /// Forge-assigned request number, for the "Superseded by #N" comment.
    pub number: u64,
}

/// A forge (GitHub, GitLab, ...) capable of opening and updating pull/merge
/// requests. Has no default HTTP implementation in this crate — forge
/// credentials are an explicit Non-goal.
pub trait ForgeClient {
    /// Opens a new pull/merge request for `branch`, or updates the existing
    /// one's title/body if already open.
    fn open_or_update_request(&self, change_set: &ChangeSet, branch: &str) -> ActionResult<()>;

    /// Returns every currently open request this tool created, keyed by
    /// branch name, used to find branches superseded by a newer ChangeSet.
    fn open_requests(&self) -> ActionResult<Vec<OpenRequest>>;

    /// Comments on `request` that it has been superseded by `new_branch`.
    fn comment_superseded(&self, request: &OpenRequest, new_branch: &str) -> ActionResult<()>;
}

/// Writes every change, pushes a branch, and opens or updates a forge
/// request for it. Also deletes and comments on branches superseded by this
/// ChangeSet (same group hash, different content hash).
pub struct RequestAction<F: ForgeClient> {
    forge: F,
    remote: String,
    branch_prefix: String,
    author: Option<String>,
}

impl<F: ForgeClient> RequestAction<F> {
    /// Builds a `request` action using `forge` to manage pull/merge
    /// requests, targeting `remote` (default `"origin"`) with branch names
    /// starting with `branch_prefix` (default `"bump-versions"`).
    pub fn new(
        forge: F,
        remote: Option<String>,
        branch_prefix: Option<String>,
        author: Option<String>,
    ) -> Self {
        Self {
            forge,
            remote: remote.unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            branch_prefix: branch_prefix.unwrap_or_else(|| DEFAULT_BRANCH_PREFIX.to_string()),
            author,
        }
    }

    fn delete_superseded(&self, dir: &Utf8Path, change_set: &ChangeSet, branch: &str) -> ActionResult<()> {
        let group_hash = change_set.group_hash();
        let remote_branches = git::list_remote_branches(dir, &self.remote)?;

        let superseded: Vec<&String> = remote_branches
            .iter()
            .filter(|candidate| *candidate != branch)
            .filter(|candidate| branch_group_hash(candidate) == Some(group_hash.as_str()))
            .collect();

        if superseded.is_empty() {
            return Ok(());
        }

        let open_requests = self.forge.open_requests()?;
        for old_branch in superseded {
            if let Some(request) = open_requests.iter().find(|r| &r.branch == old_branch) {
                self.forge.comment_superseded(request, branch)?;
            }
            git::delete_remote_branch(dir, &self.remote, old_branch)?;
        }
        Ok(())
    }
}

impl<F: ForgeClient> ActionExecutor for RequestAction<F> {
    fn identifier(&self) -> &'static str {
        "request"
    }

    fn already_applied(&self, dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<bool> {
        let branch = change_set.branch_name(&self.branch_prefix);
        Ok(git::remote_branch_exists(dir, &self.remote, &branch)?)
    }

    fn apply(&self, dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<()> {
        write_change_set(dir, change_set)?;

        let branch = change_set.branch_name(&self.branch_prefix);
        git::checkout_new_branch(dir, &branch)?;
        git::stage_all(dir)?;
        git::commit(dir, &change_set.message(), self.author.as_deref())?;
        git::push_branch(dir, &self.remote, &branch)?;

        self.delete_superseded(dir, change_set, &branch)?;

        self.forge.open_or_update_request(change_set, &branch)
    }
}

/// Extracts the group-hash segment from a `branch_name()`-shaped branch:
/// `prefix/middle/group_hash/content_hash`.
fn branch_group_hash(branch: &str) -> Option<&str> {
    let mut parts = branch.rsplitn(3, '/');
    let _content_hash = parts.next()?;
    parts.next()
}
