//! Scan command — enumerate annotated manifests, resolve and dispatch updates.

use anyhow::Context;
use bump_versions_core::action::{ActionExecutor, LocalWriteAction, PushAction};
use bump_versions_core::config::Config;
use bump_versions_core::orchestrator::{self, ActionRegistry, ScanEntry, ScanReport};
use camino::Utf8Path;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Compute and report changes without writing files, committing, or pushing
    #[arg(long)]
    pub dry_run: bool,

    /// Rewrite files in place instead of committing and pushing a branch
    #[arg(long)]
    pub local: bool,

    /// Remote to push to for the `push` action (default: origin)
    #[arg(long)]
    pub remote: Option<String>,

    /// Prefix for branch names created by the `push` action
    #[arg(long)]
    pub branch_prefix: Option<String>,

    /// Commit author as `Name <email>` (default: the repository's configured identity)
    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Serialize)]
struct ScanEntryRecord {
    outcome: &'static str,
    file: Option<String>,
    line: Option<usize>,
    old_version: Option<String>,
    new_version: Option<String>,
    scope: Option<String>,
    reason: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ScanReportRecord {
    entries: Vec<ScanEntryRecord>,
    applied: usize,
    skipped: usize,
    failed: usize,
}

fn build_action_registry(args: &ScanArgs, config: &Config) -> ActionRegistry {
    let author = args
        .author
        .clone()
        .or_else(|| config.git.as_ref().and_then(|g| g.author.as_ref()).map(|a| format!("{} <{}>", a.name, a.email)));

    let push: Box<dyn ActionExecutor> = if args.local {
        Box::new(LocalWriteAction)
    } else {
        Box::new(PushAction::new(args.remote.clone(), args.branch_prefix.clone(), author))
    };

    ActionRegistry { push, request: None }
}

fn record_for(entry: &ScanEntry) -> ScanEntryRecord {
    match entry {
        ScanEntry::Applied { change, dry_run } => ScanEntryRecord {
            outcome: if *dry_run { "would-apply" } else { "applied" },
            file: Some(change.file.to_string()),
            line: Some(change.line),
            old_version: Some(change.old_version.clone()),
            new_version: Some(change.new_version.clone()),
            scope: None,
            reason: None,
            error: None,
        },
        ScanEntry::Skipped { change, reason } => ScanEntryRecord {
            outcome: "skipped",
            file: Some(change.file.to_string()),
            line: Some(change.line),
            old_version: Some(change.old_version.clone()),
            new_version: Some(change.new_version.clone()),
            scope: None,
            reason: Some(reason.clone()),
            error: None,
        },
        ScanEntry::Failed { scope, error } => ScanEntryRecord {
            outcome: "failed",
            file: None,
            line: None,
            old_version: None,
            new_version: None,
            scope: Some(scope.clone()),
            reason: None,
            error: Some(error.to_string()),
        },
    }
}

fn print_text(report: &ScanReport) {
    for entry in &report.entries {
        match entry {
            ScanEntry::Applied { change, dry_run } => {
                let verb = if *dry_run { "would bump" } else { "bumped" };
                println!(
                    "{} {} {}:{} {} -> {}",
                    "✓".green(),
                    verb,
                    change.file,
                    change.line + 1,
                    change.old_version.dimmed(),
                    change.new_version.green()
                );
            }
            ScanEntry::Skipped { change, reason } => {
                println!(
                    "{} {}:{} {} ({})",
                    "○".yellow(),
                    change.file,
                    change.line + 1,
                    change.new_version,
                    reason.dimmed()
                );
            }
            ScanEntry::Failed { scope, error } => {
                println!("{} {}: {}", "✗".red(), scope, error);
            }
        }
    }

    let applied = report
        .entries
        .iter()
        .filter(|e| matches!(e, ScanEntry::Applied { .. }))
        .count();
    let failed = report.entries.iter().filter(|e| matches!(e, ScanEntry::Failed { .. })).count();

    println!();
    println!(
        "{}",
        format!("{applied} applied, {failed} failed").bold()
    );
}

/// Scan `cwd` for annotated versions and dispatch the resulting changes.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration
/// * `cwd` - Scan root
#[instrument(name = "cmd_scan", skip_all, fields(dry_run = args.dry_run, local = args.local))]
pub fn cmd_scan(args: ScanArgs, global_json: bool, config: &Config, cwd: &Utf8Path) -> anyhow::Result<()> {
    debug!("executing scan command");

    let cache_path = bump_versions_core::config::cache_path(cwd);
    let actions = build_action_registry(&args, config);

    let spinner = (!global_json).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template"),
        );
        spinner.set_message("Scanning for annotated versions...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner
    });

    let report = orchestrator::scan(cwd, config, &cache_path, &actions, args.dry_run)
        .context("scan failed")?;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if global_json {
        let applied = report.entries.iter().filter(|e| matches!(e, ScanEntry::Applied { .. })).count();
        let skipped = report.entries.iter().filter(|e| matches!(e, ScanEntry::Skipped { .. })).count();
        let failed = report.entries.iter().filter(|e| matches!(e, ScanEntry::Failed { .. })).count();
        let record = ScanReportRecord {
            entries: report.entries.iter().map(record_for).collect(),
            applied,
            skipped,
            failed,
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if report.entries.is_empty() {
        println!("{} no annotated versions found", "○".dimmed());
    } else {
        print_text(&report);
    }

    if report.has_errors() {
        anyhow::bail!("one or more annotations failed to resolve or dispatch");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cmd_scan_with_no_manifests_succeeds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = camino::Utf8Path::from_path(tmp.path()).unwrap();
        let config = Config::default();
        let result = cmd_scan(ScanArgs::default(), false, &config, cwd);
        assert!(result.is_ok());
    }

    #[test]
    fn cmd_scan_json_with_no_manifests_succeeds() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = camino::Utf8Path::from_path(tmp.path()).unwrap();
        let config = Config::default();
        let result = cmd_scan(ScanArgs { dry_run: true, ..Default::default() }, true, &config, cwd);
        assert!(result.is_ok());
    }

    #[test]
    fn build_action_registry_defaults_to_push() {
        let config = Config::default();
        let registry = build_action_registry(&ScanArgs::default(), &config);
        assert_eq!(registry.push.identifier(), "push");
        assert!(registry.request.is_none());
    }

    #[test]
    fn build_action_registry_local_flag_uses_local_action() {
        let config = Config::default();
        let args = ScanArgs { local: true, ..Default::default() };
        let registry = build_action_registry(&args, &config);
        assert_eq!(registry.push.identifier(), "local");
    }
}
