//! bump-versions CLI
#![deny(unsafe_code)]

use anyhow::Context;
use bump_versions::{commands, Cli, Commands};
use clap::Parser;
use tracing::debug;

mod observability;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.color.apply();

    if let Some(ref dir) = cli.chdir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    }

    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let cwd = camino::Utf8PathBuf::try_from(cwd).map_err(|e| {
        anyhow::anyhow!(
            "current directory is not valid UTF-8: {}",
            e.into_path_buf().display()
        )
    })?;

    let config_path = cli
        .config
        .as_ref()
        .map(|p| {
            camino::Utf8PathBuf::try_from(p.clone()).map_err(|e| {
                anyhow::anyhow!("config path is not valid UTF-8: {}", e.into_path_buf().display())
            })
        })
        .transpose()?;

    let config = bump_versions_core::config::load(&cwd, config_path.as_deref())
        .context("failed to load configuration")?;

    let obs_config = observability::ObservabilityConfig::from_env_with_overrides(None);
    let env_filter = observability::env_filter(cli.quiet, cli.verbose, "info");
    let _guard = observability::init_observability(&obs_config, env_filter)
        .context("failed to initialize logging/tracing")?;

    debug!(
        verbose = cli.verbose,
        quiet = cli.quiet,
        json = cli.json,
        color = ?cli.color,
        chdir = ?cli.chdir,
        "CLI initialized"
    );

    let result = match cli.command {
        Commands::Scan(args) => commands::scan::cmd_scan(args, cli.json, &config, &cwd),
        Commands::Doctor(args) => commands::doctor::cmd_doctor(args, cli.json, &cwd, config_path.as_deref()),
        Commands::Info(args) => commands::info::cmd_info(args, cli.json, &config, &cwd, config_path.as_deref()),
    };
    if let Err(ref err) = result {
        tracing::error!(error = %err, "fatal error");
    }
    result
}
