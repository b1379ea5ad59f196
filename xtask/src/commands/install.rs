use std::path::PathBuf;
use std::process::Command;

use clap::Args;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Build in release mode before installing.
    #[arg(long, default_value_t = true)]
    pub release: bool,
}

pub fn cmd_install(args: InstallArgs) -> Result<(), String> {
    let root = crate::workspace_root();

    let mut cmd = Command::new("cargo");
    cmd.current_dir(&root).args(["build", "--bin", "bump-versions"]);
    if args.release {
        cmd.arg("--release");
    }
    let status = cmd.status().map_err(|e| format!("spawn cargo build: {e}"))?;
    if !status.success() {
        return Err(format!("cargo build exited with {status}"));
    }

    let profile_dir = if args.release { "release" } else { "debug" };
    let built = root.join("target").join(profile_dir).join("bump-versions");

    let bin_dir = dirs_bin()?;
    std::fs::create_dir_all(&bin_dir).map_err(|e| format!("{}: {e}", bin_dir.display()))?;
    let dest = bin_dir.join("bump-versions");
    std::fs::copy(&built, &dest).map_err(|e| format!("copy {} -> {}: {e}", built.display(), dest.display()))?;

    println!("installed {}", dest.display());
    Ok(())
}

fn dirs_bin() -> Result<PathBuf, String> {
    let home = std::env::var_os("HOME").ok_or("HOME is not set")?;
    Ok(PathBuf::from(home).join(".bin"))
}
