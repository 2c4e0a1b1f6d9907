//! Pre-flight dependency check.
//!
//! Missing tools are fatal, except on GitHub Actions where the runner may
//! install them with `apt-get` first. A dry run only warns about them.

use super::error::Error;
use super::exec::Exec;
use anyhow::Result;
use std::process::Command;

/// Tools needed to fetch and build LLVM.
pub const TOOLCHAIN: &[&str] = &["cmake", "curl", "git", "ninja"];

/// Tools needed to fetch and build binutils.
pub const BINUTILS: &[&str] = &["bison", "curl", "make", "makeinfo", "tar"];

/// Tools needed to fetch, patch and build kernels.
pub const KERNEL: &[&str] = &["bc", "bison", "curl", "flex", "make", "patch", "tar"];

/// Whether we run on a GitHub Actions runner.
pub fn is_ci(value: Option<&str>) -> bool {
    value == Some("true")
}

/// Debian package that provides `tool`.
fn package_for(tool: &str) -> &str {
    match tool {
        "ninja" => "ninja-build",
        "makeinfo" => "texinfo",
        other => other,
    }
}

/// Report every entry of `tools` and fail on the first one that is missing.
pub fn check(exec: &mut Exec, tools: &[&str], ci: bool) -> Result<()> {
    let mut missing = report(tools);

    if !missing.is_empty() && ci {
        log::info!("Installing missing dependencies: {}", missing.join(" "));
        install(exec, &missing)?;
        missing = report(&missing);
    }

    match missing.first() {
        Some(_) if exec.dry_run() => {
            log::warn!("Dry run: continuing without {}", missing.join(" "));
            Ok(())
        }
        Some(tool) => Err(Error::MissingTool {
            tool: (*tool).to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

fn report<'a>(tools: &[&'a str]) -> Vec<&'a str> {
    let mut missing = Vec::new();
    for tool in tools {
        match which::which(tool) {
            Ok(path) => log::info!("[OK] {tool}: {}", path.display()),
            Err(_) => {
                log::warn!("[FAIL] missing `{tool}` in PATH");
                missing.push(*tool);
            }
        }
    }
    missing
}

fn install(exec: &mut Exec, tools: &[&str]) -> Result<()> {
    let mut update = Command::new("sudo");
    update.args(["apt-get", "update", "-qq"]);
    exec.run(update)?;

    let mut cmd = Command::new("sudo");
    cmd.args(["apt-get", "install", "-y", "--no-install-recommends"]);
    let mut packages: Vec<&str> = tools.iter().map(|t| package_for(t)).collect();
    packages.sort_unstable();
    packages.dedup();
    cmd.args(packages);
    exec.run(cmd)
}
