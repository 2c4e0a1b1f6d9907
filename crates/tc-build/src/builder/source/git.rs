//! Git checkouts (LLVM).

use super::super::exec::Exec;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// What [`GitSource::sync`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Cloned,
    Updated,
    /// Existing checkout left untouched.
    Kept,
}

/// A repository checked out under the work tree.
#[derive(Clone, Debug)]
pub struct GitSource {
    pub name: &'static str,
    pub url: String,
    pub repo: PathBuf,
}

impl GitSource {
    /// Clone the repository if needed, otherwise refresh it to `git_ref`
    /// unless `update` is false.
    pub fn sync(
        &self,
        exec: &mut Exec,
        git_ref: &str,
        update: bool,
        shallow: bool,
    ) -> Result<SyncOutcome> {
        if self.repo.exists() {
            if !update {
                log::info!(
                    "Using {} at {} as is (no update requested)",
                    self.name,
                    self.repo.display()
                );
                return Ok(SyncOutcome::Kept);
            }
            self.update(exec, git_ref)?;
            return Ok(SyncOutcome::Updated);
        }

        self.clone_repo(exec, git_ref, shallow)?;
        Ok(SyncOutcome::Cloned)
    }

    fn clone_repo(&self, exec: &mut Exec, git_ref: &str, shallow: bool) -> Result<()> {
        log::info!("Downloading {} from {} @ {git_ref}...", self.name, self.url);

        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if shallow {
            cmd.arg("--depth=1");
            if git_ref != "main" {
                cmd.arg("--no-single-branch");
            }
        }
        cmd.arg(&self.url).arg(&self.repo);
        exec.run(cmd)?;

        self.git(exec, &["checkout", git_ref])
    }

    fn update(&self, exec: &mut Exec, git_ref: &str) -> Result<()> {
        log::info!("Updating {} at {}...", self.name, self.repo.display());

        self.git(exec, &["fetch", "origin"])?;

        if self.is_shallow(exec)? && !self.ref_exists(exec, git_ref) {
            bail!(
                "Supplied ref ('{git_ref}') does not exist in the shallow clone at {repo}. To proceed, either:\n\
                 \t1. Manage the repo yourself and pass '--no-update'.\n\
                 \t2. Run 'git -C {repo} fetch --unshallow origin' to get a complete repository.\n\
                 \t3. Delete '{repo}' and re-run with '-s' + '-b <ref>' to get a full set of refs.",
                repo = self.repo.display()
            );
        }

        self.git(exec, &["checkout", git_ref])?;

        // Tags and hashes have no symbolic ref; only branches get pulled.
        let head = self.git_output(exec, &["symbolic-ref", "-q", "HEAD"])?;
        if let Some(branch) = head.and_then(|h| h.strip_prefix("refs/heads/").map(str::to_string)) {
            self.git(exec, &["pull", "--rebase", "origin", &branch])?;
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo);
        cmd
    }

    fn git(&self, exec: &mut Exec, args: &[&str]) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(args);
        exec.run(cmd)
    }

    /// Trimmed stdout of a read-only git command, `None` if it failed.
    fn git_output(&self, exec: &mut Exec, args: &[&str]) -> Result<Option<String>> {
        let mut cmd = self.command();
        cmd.args(args);
        let out = exec.output(cmd, None)?;
        Ok(out
            .status
            .success()
            .then(|| String::from_utf8_lossy(&out.stdout).trim().to_string()))
    }

    pub fn is_shallow(&self, exec: &mut Exec) -> Result<bool> {
        let mut cmd = self.command();
        cmd.args(["rev-parse", "--git-dir"]);
        let git_dir = exec
            .capture(cmd, None)
            .with_context(|| format!("{} is not a git repository", self.repo.display()))?;
        Ok(self.repo.join(git_dir).join("shallow").exists())
    }

    /// Works for branches, tags and raw hashes.
    pub fn ref_exists(&self, exec: &mut Exec, git_ref: &str) -> bool {
        let mut cmd = self.command();
        cmd.args(["show-branch", git_ref]);
        exec.succeeds(cmd, None)
    }

    /// Commit currently checked out, for provenance reporting.
    pub fn head(&self, exec: &mut Exec) -> Option<String> {
        self.git_output(exec, &["rev-parse", "HEAD"]).ok().flatten()
    }
}

/// The LLVM monorepo checkout.
pub fn llvm(root: &Path) -> GitSource {
    GitSource {
        name: "llvm-project",
        url: super::LLVM_REPO.to_string(),
        repo: root.join("llvm-project"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_no_update_leaves_checkout_alone() {
        let tmp = TempDir::new().unwrap();
        let src = llvm(tmp.path());
        fs::create_dir_all(src.repo.join("llvm")).unwrap();
        fs::write(src.repo.join("llvm/CMakeLists.txt"), "project(LLVM)\n").unwrap();

        let mut exec = Exec::default();
        let outcome = src.sync(&mut exec, "main", false, false).unwrap();
        assert_eq!(outcome, SyncOutcome::Kept);

        // No command at all means no network access.
        assert!(exec.history().is_empty());
        assert_eq!(
            fs::read_to_string(src.repo.join("llvm/CMakeLists.txt")).unwrap(),
            "project(LLVM)\n"
        );

        // Running it again is just as inert.
        assert_eq!(
            src.sync(&mut exec, "main", false, false).unwrap(),
            SyncOutcome::Kept
        );
        assert!(exec.history().is_empty());
    }

    #[test]
    fn test_shallow_clone_arguments() {
        let tmp = TempDir::new().unwrap();
        let src = llvm(tmp.path());
        let mut exec = Exec::new(false, true);

        let outcome = src.sync(&mut exec, "release/19.x", true, true).unwrap();
        assert_eq!(outcome, SyncOutcome::Cloned);
        assert!(exec.history()[0].starts_with(
            "git clone --depth=1 --no-single-branch https://github.com/llvm/llvm-project"
        ));
        assert!(exec.history()[1].ends_with("checkout release/19.x"));
    }

    #[test]
    fn test_full_clone_on_main() {
        let tmp = TempDir::new().unwrap();
        let src = llvm(tmp.path());
        let mut exec = Exec::new(false, true);

        src.sync(&mut exec, "main", true, false).unwrap();
        assert!(exec.history()[0].starts_with("git clone https://"));
    }
}
