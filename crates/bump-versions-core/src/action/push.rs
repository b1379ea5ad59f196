//! The `push` action: write, commit, and push a branch (SPEC_FULL.md §4.8).

use camino::Utf8Path;

use crate::git;
use crate::model::ChangeSet;

use super::{write_change_set, ActionExecutor, ActionResult};

/// Default remote name pushed to, matching the teacher's git module's own
/// default.
const DEFAULT_REMOTE: &str = "origin";

/// Default branch name prefix when none is configured.
const DEFAULT_BRANCH_PREFIX: &str = "bump-versions";

/// Writes every change, then creates a branch named after the ChangeSet,
/// commits, and pushes it.
pub struct PushAction {
    remote: String,
    branch_prefix: String,
    author: Option<String>,
}

impl PushAction {
    /// Builds a `push` action targeting `remote` (default `"origin"`), with
    /// branch names starting with `branch_prefix` (default
    /// `"bump-versions"`) and commits authored as `author` (`Name <email>`,
    /// falling back to the repository's configured identity when `None`).
    pub fn new(remote: Option<String>, branch_prefix: Option<String>, author: Option<String>) -> Self {
        Self {
            remote: remote.unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
            branch_prefix: branch_prefix.unwrap_or_else(|| DEFAULT_BRANCH_PREFIX.to_string()),
            author,
        }
    }
}

impl ActionExecutor for PushAction {
    fn identifier(&self) -> &'static str {
        "push"
    }

    // `already_applied` is not overridden: per Open Question 3 in
    // DESIGN.md, this implementation cannot verify "this exact ChangeSet
    // was already pushed" without listing and diffing remote branch tips,
    // so it always reapplies rather than claim an idempotence it can't
    // check.

    fn apply(&self, dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<()> {
        write_change_set(dir, change_set)?;

        let branch = change_set.branch_name(&self.branch_prefix);
        git::checkout_new_branch(dir, &branch)?;
        git::stage_all(dir)?;
        git::commit(dir, &change_set.message(), self.author.as_deref())?;
        git::push_branch(dir, &self.remote, &branch)?;
        Ok(())
    }
}
