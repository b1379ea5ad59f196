//! Doctor command — diagnose configuration and environment.

use bump_versions_core::config::{self, Config};
use bump_versions_core::git;
use camino::Utf8Path;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

/// Arguments for the `doctor` subcommand.
#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct DoctorReport {
    config: ConfigStatus,
    git: GitStatus,
    environment: EnvironmentInfo,
}

#[derive(Serialize)]
struct ConfigStatus {
    /// Path configuration would be loaded from.
    path: String,
    /// Whether that file exists.
    found: bool,
    /// Whether it loaded and validated successfully.
    valid: bool,
    /// Validation error, if any.
    error: Option<String>,
    registry_count: usize,
    policy_count: usize,
}

#[derive(Serialize)]
struct GitStatus {
    inside_repo: bool,
    remote_url: Option<String>,
}

#[derive(Serialize)]
struct EnvironmentInfo {
    cwd: String,
    env_vars: Vec<EnvVar>,
}

#[derive(Serialize)]
struct EnvVar {
    name: &'static str,
    value: Option<String>,
    description: &'static str,
}

impl DoctorReport {
    fn gather(cwd: &Utf8Path, config_path: Option<&Utf8Path>) -> Self {
        let path = config::config_path(cwd, config_path);
        let found = path.is_file();

        let (valid, error, registry_count, policy_count) = match config::load(cwd, config_path) {
            Ok(config) => (true, None, config.registry_names().count(), config.policy_names().count()),
            Err(e) => (false, Some(e.to_string()), 0, 0),
        };

        let inside_repo = git::is_inside_repo(cwd).unwrap_or(false);
        let remote_url = if inside_repo {
            git::remote_url(cwd, "origin").ok().flatten()
        } else {
            None
        };

        Self {
            config: ConfigStatus {
                path: path.to_string(),
                found,
                valid,
                error,
                registry_count,
                policy_count,
            },
            git: GitStatus { inside_repo, remote_url },
            environment: EnvironmentInfo {
                cwd: cwd.to_string(),
                env_vars: vec![
                    EnvVar {
                        name: "RUST_LOG",
                        value: std::env::var("RUST_LOG").ok(),
                        description: "Log filter directive",
                    },
                    EnvVar {
                        name: "BUMP_VERSIONS_LOG_PATH",
                        value: std::env::var("BUMP_VERSIONS_LOG_PATH").ok(),
                        description: "Explicit log file path",
                    },
                    EnvVar {
                        name: "BUMP_VERSIONS_LOG_DIR",
                        value: std::env::var("BUMP_VERSIONS_LOG_DIR").ok(),
                        description: "Log directory",
                    },
                ],
            },
        }
    }
}

/// Run diagnostics and report configuration, git, and environment status.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `cwd` - Scan root
/// * `config_path` - Explicit `--config` override, if any
#[instrument(name = "cmd_doctor", skip_all, fields(json_output = global_json))]
pub fn cmd_doctor(
    _args: DoctorArgs,
    global_json: bool,
    cwd: &Utf8Path,
    config_path: Option<&Utf8Path>,
) -> anyhow::Result<()> {
    debug!("executing doctor command");

    let spinner = (!global_json).then(|| {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("valid template"),
        );
        spinner.set_message("Gathering diagnostics...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner
    });

    let report = DoctorReport::gather(cwd, config_path);

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", "Configuration".bold().underline());
        println!("  {}: {}", "Path".dimmed(), report.config.path.cyan());
        if report.config.found {
            println!("  {} config file present", "✓".green());
        } else {
            println!("  {} no config file at this path; scanning would find nothing", "○".yellow());
            offer_config_creation(&report.config.path)?;
        }
        if report.config.valid {
            println!(
                "  {} {} registries, {} policies",
                "✓".green(),
                report.config.registry_count,
                report.config.policy_count
            );
        } else if let Some(ref err) = report.config.error {
            println!("  {} {}", "✗".red(), err);
        }
        println!();

        println!("{}", "Git".bold().underline());
        if report.git.inside_repo {
            println!("  {} inside a git repository", "✓".green());
            match report.git.remote_url {
                Some(ref url) => println!("  {}: {}", "origin".dimmed(), url.cyan()),
                None => println!("  {} no \"origin\" remote configured", "○".yellow()),
            }
        } else {
            println!(
                "  {} not inside a git repository (the push/request actions require one)",
                "○".yellow()
            );
        }
        println!();

        println!("{}", "Environment".bold().underline());
        println!("  {}: {}", "Working directory".dimmed(), report.environment.cwd.cyan());
        let set_vars: Vec<_> = report.environment.env_vars.iter().filter(|v| v.value.is_some()).collect();
        if set_vars.is_empty() {
            println!("  {} no logging overrides set", "○".dimmed());
        } else {
            for var in set_vars {
                println!("  {}: {}", var.name.dimmed(), var.value.as_deref().unwrap_or("").cyan());
            }
        }
    }

    Ok(())
}

/// Offer to scaffold a default config file when none exists at the scan root.
fn offer_config_creation(config_path: &str) -> anyhow::Result<()> {
    if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
        return Ok(());
    }

    let create = Confirm::new("Create a default .git-ops-update.yaml here?")
        .with_default(false)
        .with_help_message(&format!("Will create {config_path}"))
        .prompt();

    match create {
        Ok(true) => {
            let yaml = serde_saphyr::to_string(&Config::default())?;
            std::fs::write(config_path, yaml)?;
            println!("  {} Created {}", "✓".green(), config_path.cyan());
        }
        Ok(false) | Err(_) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cwd() -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from("/tmp")
    }

    #[test]
    fn test_cmd_doctor_text_succeeds() {
        assert!(cmd_doctor(DoctorArgs::default(), false, &test_cwd(), None).is_ok());
    }

    #[test]
    fn test_cmd_doctor_json_succeeds() {
        assert!(cmd_doctor(DoctorArgs::default(), true, &test_cwd(), None).is_ok());
    }

    #[test]
    fn test_doctor_report_gathers_on_empty_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = camino::Utf8Path::from_path(tmp.path()).unwrap();
        let report = DoctorReport::gather(cwd, None);
        assert!(!report.config.found);
        assert!(report.config.valid);
    }
}
