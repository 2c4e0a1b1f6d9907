//! Idempotent patch application.
//!
//! An already-applied patch is recognised by a reverse dry run that applies
//! cleanly, not by matching the patch tool's diagnostics.

use super::super::exec::Exec;
use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
}

fn patch_cmd(tree: &Path, patch: &Path, extra: &[&str]) -> Command {
    let mut cmd = Command::new("patch");
    cmd.arg(format!("--directory={}", tree.display()))
        .arg(format!("--input={}", patch.display()))
        .arg("--strip=1")
        .args(extra);
    cmd
}

/// Apply `patch` to `tree` unless it is already there.
pub fn apply(exec: &mut Exec, tree: &Path, patch: &Path) -> Result<PatchOutcome> {
    let reverse = patch_cmd(tree, patch, &["--reverse", "--dry-run", "--force", "--silent"]);
    if exec.succeeds(reverse, None) {
        log::warn!(
            "{} has already been applied in {}, consider removing it",
            patch.display(),
            tree.display()
        );
        return Ok(PatchOutcome::AlreadyApplied);
    }

    exec.run(patch_cmd(tree, patch, &["--forward", "--batch", "--silent"]))
        .with_context(|| format!("Applying {} to {}", patch.display(), tree.display()))?;
    log::info!("Applied {} to {}", patch.display(), tree.display());
    Ok(PatchOutcome::Applied)
}
