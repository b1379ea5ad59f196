//! The `local` action: rewrite files in place, no git involvement.

use camino::Utf8Path;

use crate::model::ChangeSet;

use super::{write_change_set, ActionExecutor, ActionResult};

/// Writes every change's file and runs its `exec` commands. Never commits
/// or pushes — useful for a dry-run-adjacent "just tell me what files
/// would look like" mode, or for manifests not tracked in git.
#[derive(Debug, Default)]
pub struct LocalWriteAction;

impl ActionExecutor for LocalWriteAction {
    fn identifier(&self) -> &'static str {
        "local"
    }

    // No already_applied override: a local write has no natural
    // idempotence check, so it always reapplies, matching SPEC_FULL.md
    // §4.8's note for this action.

    fn apply(&self, dir: &Utf8Path, change_set: &ChangeSet) -> ActionResult<()> {
        write_change_set(dir, change_set)
    }
}
