//! Info command implementation

use bump_versions_core::config::{self, Config};
use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    repository: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    homepage: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            repository: env!("CARGO_PKG_REPOSITORY"),
            homepage: env!("CARGO_PKG_HOMEPAGE"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    config_file: String,
    config_found: bool,
    registries: Vec<String>,
    policies: Vec<String>,
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl ConfigInfo {
    fn from_config(config: &Config, cwd: &Utf8Path, config_path: Option<&Utf8Path>) -> Self {
        let path = config::config_path(cwd, config_path);
        Self {
            config_found: path.is_file(),
            config_file: path.to_string(),
            registries: config.registry_names().map(str::to_string).collect(),
            policies: config.policy_names().map(str::to_string).collect(),
            includes: config.files.includes.clone(),
            excludes: config.files.excludes.clone(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
}

/// Print package and configuration information.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration
/// * `cwd` - Scan root
/// * `config_path` - Explicit `--config` override, if any
#[instrument(name = "cmd_info", skip_all, fields(json_output = global_json))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
    config_path: Option<&Utf8Path>,
) -> anyhow::Result<()> {
    debug!("executing info command");

    let info = PackageInfo::new();
    let config_info = ConfigInfo::from_config(config, cwd, config_path);
    let full_info = FullInfo { package: info, config: config_info };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&full_info)?);
    } else {
        println!("{} {}", full_info.package.name.bold(), full_info.package.version.green());
        if !full_info.package.description.is_empty() {
            println!("{}", full_info.package.description);
        }
        if !full_info.package.license.is_empty() {
            println!("{}: {}", "License".dimmed(), full_info.package.license);
        }
        if !full_info.package.repository.is_empty() {
            println!("{}: {}", "Repository".dimmed(), full_info.package.repository.cyan());
        }
        if !full_info.package.homepage.is_empty() {
            println!("{}: {}", "Homepage".dimmed(), full_info.package.homepage.cyan());
        }

        println!();
        println!("{}", "Configuration".bold().underline());
        if full_info.config.config_found {
            println!("{}: {}", "Config file".dimmed(), full_info.config.config_file.cyan());
        } else {
            println!("{}: {}", "Config file".dimmed(), "none found".yellow());
        }
        println!(
            "{}: {}",
            "Registries".dimmed(),
            if full_info.config.registries.is_empty() {
                "(none)".to_string()
            } else {
                full_info.config.registries.join(", ")
            }
        );
        println!(
            "{}: {}",
            "Policies".dimmed(),
            if full_info.config.policies.is_empty() {
                "(none)".to_string()
            } else {
                full_info.config.policies.join(", ")
            }
        );
    }

    Ok(())
}
