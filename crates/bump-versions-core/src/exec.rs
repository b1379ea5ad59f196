//! Runs an annotation's `exec` commands sequentially after its file has been
//! rewritten.
//!
//! Unlike the teacher's `hooks` module — which interpolates rich
//! `{version}`/`{tag}`/etc. placeholders and can run batches in parallel for
//! a full release workflow — an annotation's `exec` list has no variable
//! interpolation and no parallel/`sync:` batching in SPEC_FULL.md; each
//! command just runs, in order, in the scan root.

use camino::Utf8Path;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while running an annotation's `exec` commands.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Failed to spawn the shell.
    #[error("failed to run command {command:?}: {source}")]
    Spawn {
        /// The command that could not be spawned.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command exited with a non-zero status.
    #[error("command {command:?} exited with status {status}: {stderr}")]
    NonZeroExit {
        /// The command that failed.
        command: String,
        /// Its exit status, formatted.
        status: String,
        /// Captured stderr.
        stderr: String,
    },
}

/// Result alias for exec operations.
pub type ExecResult<T> = Result<T, ExecError>;

/// Runs every command in `commands`, in order, in `dir`, stopping at the
/// first failure.
#[instrument(skip(commands))]
pub fn run_all(dir: &Utf8Path, commands: &[String]) -> ExecResult<()> {
    for command in commands {
        run_one(dir, command)?;
    }
    Ok(())
}

fn run_one(dir: &Utf8Path, command: &str) -> ExecResult<()> {
    debug!(%command, "running exec command");
    let output = Command::new("sh")
        .args(["-c", command])
        .current_dir(dir)
        .output()
        .map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if output.status.success() {
        return Ok(());
    }

    Err(ExecError::NonZeroExit {
        command: command.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
