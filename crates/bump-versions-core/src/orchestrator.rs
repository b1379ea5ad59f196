//! The scan/dispatch pipeline: enumerate files, extract and resolve
//! annotations, consult the cache and registries, compute the next version
//! per policy, group proposed Changes into ChangeSets, and dispatch them
//! (SPEC_FULL.md §4.7).

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::action::{ActionExecutor, ActionResult};
use crate::cache::{Cache, CacheError, CacheResource};
use crate::config::Config;
use crate::enumerator::{self, EnumeratorError};
use crate::extractor;
use crate::model::{Action, Change, ChangeSet};
use crate::policy::{self, PolicyError};
use crate::registry::{self, RegistryError};
use crate::resolver;
use crate::timestamp;
use crate::value_format::{self, ValueFormatError};

/// Errors that abort the whole scan, rather than being scoped to one file
/// or ChangeSet.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Failed to walk the scan root.
    #[error(transparent)]
    Enumerator(#[from] EnumeratorError),

    /// Failed to read the cache file (a malformed cache is a warning, not
    /// this — see `cache::load`; this is reserved for I/O failures).
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result alias for orchestrator operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// One outcome of processing a single annotated value or ChangeSet.
#[derive(Debug)]
pub enum ScanEntry {
    /// A Change was applied (or would be, under `--dry-run`).
    Applied {
        /// The change that was applied.
        change: Change,
        /// False when running under `--dry-run`.
        dry_run: bool,
    },
    /// A ChangeSet was detected but not dispatched.
    Skipped {
        /// The change that was skipped.
        change: Change,
        /// Why it was skipped (e.g. `"marked as disabled"`,
        /// `"already applied"`).
        reason: String,
    },
    /// Resolving or dispatching an annotation/ChangeSet failed.
    Failed {
        /// Where the failure occurred, for display (`"file:line"` or a
        /// ChangeSet's branch name).
        scope: String,
        /// The underlying error, preserving its source chain.
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// The full result of one scan: every entry produced, in detection order.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Every outcome produced by this scan.
    pub entries: Vec<ScanEntry>,
}

impl ScanReport {
    /// True if any entry is a [`ScanEntry::Failed`] — the CLI's exit-code
    /// signal per SPEC_FULL.md §6.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| matches!(e, ScanEntry::Failed { .. }))
    }
}

/// The action executors available for dispatch, keyed by [`Action`].
pub struct ActionRegistry {
    /// Executor for `Action::Push`.
    pub push: Box<dyn ActionExecutor>,
    /// Executor for `Action::Request`, if a forge client was configured.
    pub request: Option<Box<dyn ActionExecutor>>,
}

impl ActionRegistry {
    fn executor_for(&self, action: &Action) -> Option<&dyn ActionExecutor> {
        match action {
            Action::Disabled => None,
            Action::Push => Some(self.push.as_ref()),
            Action::Request => self.request.as_deref(),
        }
    }
}

struct PendingChange {
    change: Change,
    action: Action,
}

/// Runs one full scan/dispatch pass over `dir`.
///
/// When `dry_run` is true, no file is rewritten and no commit made — changes
/// are computed and reported as if `Action::Disabled`, labeled
/// `ScanEntry::Applied { dry_run: true, .. }`. The version cache is still
/// persisted on every successful fetch regardless of `dry_run`: per
/// SPEC_FULL.md §4.4 step 3, the cache records what was actually fetched
/// from upstream, independent of whether the scan goes on to apply anything.
#[instrument(skip(config, actions), fields(dir = %dir))]
pub fn scan(
    dir: &Utf8Path,
    config: &Config,
    cache_path: &Utf8Path,
    actions: &ActionRegistry,
    dry_run: bool,
) -> ScanResult<ScanReport> {
    let mut cache = crate::cache::load(cache_path)?;
    let files = enumerator::enumerate(dir, &config.files)?;

    let mut report = ScanReport::default();
    let mut pending: Vec<PendingChange> = Vec::new();

    for path in &files {
        process_file(dir, path, cache_path, config, &mut cache, &mut report, &mut pending);
    }

    dispatch(dir, pending, actions, dry_run, &mut report);

    Ok(report)
}

fn process_file(
    dir: &Utf8Path,
    path: &Utf8PathBuf,
    cache_path: &Utf8Path,
    config: &Config,
    cache: &mut Cache,
    report: &mut ScanReport,
    pending: &mut Vec<PendingChange>,
) {
    let relative = path.strip_prefix(dir).unwrap_or(path).to_path_buf();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            report.entries.push(ScanEntry::Failed {
                scope: relative.to_string(),
                error: Box::new(e),
            });
            return;
        }
    };

    let annotations = match extractor::extract(&content) {
        Ok(annotations) => annotations,
        Err(e) => {
            report.entries.push(ScanEntry::Failed {
                scope: relative.to_string(),
                error: Box::new(e),
            });
            return;
        }
    };
    if annotations.is_empty() {
        return;
    }

    let lines: Vec<&str> = content.split('\n').collect();

    for raw in annotations {
        let scope = format!("{relative}:{}", raw.line);
        let Some(raw_line) = lines.get(raw.line) else {
            continue;
        };

        let resolved = match resolver::resolve(&raw, raw_line, &relative, config) {
            Ok(resolved) => resolved,
            Err(e) => {
                report.entries.push(ScanEntry::Failed {
                    scope,
                    error: Box::new(e),
                });
                continue;
            }
        };

        match resolve_change(dir, cache_path, &resolved, cache) {
            Ok(Some(change)) => pending.push(PendingChange {
                change,
                action: resolved.action.clone(),
            }),
            Ok(None) => {}
            Err(e) => report.entries.push(ScanEntry::Failed { scope, error: e }),
        }
    }
}

fn resolve_change(
    dir: &Utf8Path,
    cache_path: &Utf8Path,
    resolved: &crate::model::ResolvedAnnotation,
    cache: &mut Cache,
) -> Result<Option<Change>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(span) = extractor::scalar_span(&resolved.raw_line) else {
        return Ok(None);
    };
    let raw_value = extractor::read_scalar(&resolved.raw_line, &span);
    let current = value_format::extract_version(&resolved.format, &raw_value)
        .map_err(box_err::<ValueFormatError>)?;

    let candidates = fetch_candidates(dir, cache_path, resolved, cache)?;

    let next = policy::find_next(
        &resolved.policy,
        &current,
        &candidates,
        &resolved.prefix,
        &resolved.suffix,
        &resolved.filter,
    )
    .map_err(box_err::<PolicyError>)?;

    if next == current {
        return Ok(None);
    }

    let new_raw_value = value_format::replace_version(&resolved.format, &raw_value, &next)
        .map_err(box_err::<ValueFormatError>)?;
    let new_raw_line = extractor::rewrite_line(&resolved.raw_line, &span, &new_raw_value);

    Ok(Some(Change {
        registry_name: resolved.registry.name.clone(),
        resource_name: resolved.resource.clone(),
        old_version: current,
        new_version: next,
        file: resolved.file.clone(),
        line: resolved.line,
        format: resolved.format.clone(),
        old_raw_line: resolved.raw_line.clone(),
        new_raw_line,
        exec: resolved.exec.clone(),
        group: resolved.group.clone(),
    }))
}

fn fetch_candidates(
    dir: &Utf8Path,
    cache_path: &Utf8Path,
    resolved: &crate::model::ResolvedAnnotation,
    cache: &mut Cache,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let _ = dir; // registries are network clients; no scan-root dependency today.

    let registry_name = &resolved.registry.name;
    let fresh = cache
        .find_resource(registry_name, &resolved.resource)
        .is_some_and(|cached| is_fresh(cached, resolved.registry.interval));

    if fresh {
        return Ok(cache
            .find_resource(registry_name, &resolved.resource)
            .map(|c| c.versions.clone())
            .unwrap_or_default());
    }

    let client = registry::from_config(&resolved.registry);
    let versions = client
        .fetch_versions(&resolved.resource)
        .map_err(box_err::<RegistryError>)?;

    cache.upsert_resource(CacheResource {
        registry: registry_name.clone(),
        resource: resolved.resource.clone(),
        versions: versions.clone(),
        timestamp: timestamp::now_rfc3339(),
    });

    // Persisted immediately, per SPEC_FULL.md §4.4 step 3: a crash later in
    // the scan must not force every fetch made so far to repeat next run.
    if let Err(e) = crate::cache::save(cache_path, cache) {
        warn!(error = %e, "failed to persist cache; next run starts from the in-memory state");
    }

    Ok(versions)
}

fn is_fresh(cached: &CacheResource, interval: std::time::Duration) -> bool {
    let Some(cached_secs) = timestamp::parse_rfc3339(&cached.timestamp) else {
        return false;
    };
    let now_secs = timestamp::parse_rfc3339(&timestamp::now_rfc3339()).unwrap_or(cached_secs);
    now_secs.saturating_sub(cached_secs) < interval.as_secs()
}

fn box_err<E: std::error::Error + Send + Sync + 'static>(
    e: E,
) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(e)
}

/// Partitions pending changes into ChangeSets per SPEC_FULL.md §4.7, then
/// dispatches each.
fn dispatch(
    dir: &Utf8Path,
    pending: Vec<PendingChange>,
    actions: &ActionRegistry,
    dry_run: bool,
    report: &mut ScanReport,
) {
    // Insertion-ordered by first-seen group key (SPEC_FULL.md §5: "grouped
    // ChangeSets in insertion order of their group key") — a `Vec` rather
    // than a `BTreeMap`, since the number of distinct groups in one scan is
    // small and this avoids re-sorting them alphabetically.
    let mut groups: Vec<(String, Vec<PendingChange>)> = Vec::new();
    let mut singletons: Vec<PendingChange> = Vec::new();

    for item in pending {
        match &item.change.group {
            Some(group) if !group.is_empty() => {
                let key = format!("{}:{group}", action_identifier(&item.action));
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, items)) => items.push(item),
                    None => groups.push((key, vec![item])),
                }
            }
            _ => singletons.push(item),
        }
    }

    for item in singletons {
        let action = item.action;
        let set = ChangeSet {
            group: String::new(),
            changes: vec![item.change],
        };
        dispatch_one(dir, set, action, actions, dry_run, report);
    }

    for (key, items) in groups {
        let group_tag = key.split_once(':').map_or(key.as_str(), |(_, g)| g).to_string();
        let action = items.first().map_or(Action::Disabled, |i| i.action.clone());
        let set = ChangeSet {
            group: group_tag,
            changes: items.into_iter().map(|p| p.change).collect(),
        };
        dispatch_one(dir, set, action, actions, dry_run, report);
    }
}

fn action_identifier(action: &Action) -> &'static str {
    match action {
        Action::Disabled => "disabled",
        Action::Push => "push",
        Action::Request => "request",
    }
}

fn dispatch_one(
    dir: &Utf8Path,
    set: ChangeSet,
    action: Action,
    actions: &ActionRegistry,
    dry_run: bool,
    report: &mut ScanReport,
) {
    let scope = set.branch_name("scope");

    if matches!(action, Action::Disabled) {
        for change in set.changes {
            report.entries.push(ScanEntry::Skipped {
                change,
                reason: "marked as disabled".to_string(),
            });
        }
        return;
    }

    if dry_run {
        for change in set.changes {
            report.entries.push(ScanEntry::Applied { change, dry_run: true });
        }
        return;
    }

    let Some(executor) = actions.executor_for(&action) else {
        for change in set.changes {
            report.entries.push(ScanEntry::Skipped {
                change,
                reason: "no executor configured for this action".to_string(),
            });
        }
        return;
    };

    match already_applied(dir, &set, executor) {
        Ok(true) => {
            for change in set.changes {
                report.entries.push(ScanEntry::Skipped {
                    change,
                    reason: "already applied".to_string(),
                });
            }
            return;
        }
        Ok(false) => {}
        Err(e) => {
            report.entries.push(ScanEntry::Failed {
                scope,
                error: Box::new(e),
            });
            return;
        }
    }

    let changes = set.changes.clone();
    match executor.apply(dir, &set) {
        Ok(()) => {
            for change in changes {
                report.entries.push(ScanEntry::Applied { change, dry_run: false });
            }
        }
        Err(e) => {
            report.entries.push(ScanEntry::Failed {
                scope,
                error: Box::new(e),
            });
        }
    }
}

fn already_applied(
    dir: &Utf8Path,
    set: &ChangeSet,
    executor: &dyn ActionExecutor,
) -> ActionResult<bool> {
    executor.already_applied(dir, set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::LocalWriteAction;
    use crate::config::Config;
    use camino::Utf8Path;
    use tempfile::TempDir;

    fn write_config(dir: &Utf8Path) {
        std::fs::write(
            dir.join(".git-ops-update.yaml"),
            r#"
files:
  includes:
    - "/.*\\.yaml$"
  excludes: []
registries:
  docker-hub:
    type: docker
    interval: 24h
    url: "https://registry-1.docker.io"
policies:
  semver:
    extracts:
      - value: "<version>"
        strategy: semver
"#,
        )
        .unwrap();
    }

    fn registry() -> ActionRegistry {
        ActionRegistry {
            push: Box::new(LocalWriteAction),
            request: None,
        }
    }

    #[test]
    fn scan_with_no_annotations_is_empty() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        write_config(dir);
        std::fs::write(dir.join("plain.yaml"), "a: 1\n").unwrap();

        let config = Config::default();
        let actions = registry();
        let report = scan(dir, &config, &dir.join(".git-ops-update.cache.yaml"), &actions, true).unwrap();
        assert!(report.entries.is_empty());
    }

    #[test]
    fn disabled_action_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        write_config(dir);
        std::fs::write(
            dir.join("app.yaml"),
            r#"image: nginx:1.25.0 # git-ops-update {"registry": "docker-hub", "resource": "library/nginx", "policy": "semver"}
"#,
        )
        .unwrap();

        let config = crate::config::load(dir, None).unwrap();
        let actions = registry();

        // This test only exercises the file-walk/extract/resolve path up to
        // resolution; the candidate fetch would require network access, so
        // it is not exercised here. Resolving should at least not panic on
        // a present annotation even though the eventual fetch_versions call
        // fails offline, which `process_file` reports as a Failed entry.
        let report = scan(dir, &config, &dir.join(".git-ops-update.cache.yaml"), &actions, true).unwrap();
        assert!(!report.entries.is_empty());
    }

    fn pending_change(file: &str, group: &str) -> PendingChange {
        PendingChange {
            change: Change {
                registry_name: "docker-hub".into(),
                resource_name: "library/nginx".into(),
                old_version: "1.25.0".into(),
                new_version: "1.26.0".into(),
                file: camino::Utf8PathBuf::from(file),
                line: 0,
                format: crate::model::ValueFormat::Plain,
                old_raw_line: "image: nginx:1.25.0".into(),
                new_raw_line: "image: nginx:1.26.0".into(),
                exec: Vec::new(),
                group: Some(group.to_string()),
            },
            action: Action::Push,
        }
    }

    #[test]
    fn grouped_change_sets_dispatch_in_first_seen_order_not_sorted() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        std::fs::write(dir.join("zebra.yaml"), "image: nginx:1.25.0\n").unwrap();
        std::fs::write(dir.join("apple.yaml"), "image: nginx:1.25.0\n").unwrap();

        // "zebra" sorts after "apple" alphabetically but is seen first here;
        // a BTreeMap-backed grouping would dispatch "apple" before "zebra".
        let pending = vec![
            pending_change("zebra.yaml", "zebra-group"),
            pending_change("apple.yaml", "apple-group"),
        ];

        let actions = registry();
        let mut report = ScanReport::default();
        dispatch(dir, pending, &actions, false, &mut report);

        let files: Vec<&str> = report
            .entries
            .iter()
            .map(|e| match e {
                ScanEntry::Applied { change, .. } => change.file.as_str(),
                other => panic!("expected Applied, got {other:?}"),
            })
            .collect();
        assert_eq!(files, vec!["zebra.yaml", "apple.yaml"]);
    }
}
