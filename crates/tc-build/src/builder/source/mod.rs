//! Source management: pinned releases, fetching, cache status and cleanup.
//!
//! LLVM comes from git; binutils and Linux come from release tarballs whose
//! digests are checked before they are unpacked.

pub mod git;
pub mod patch;
pub mod tarball;

use super::exec::Exec;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tarball::{Checksum, Tarball};

pub const LLVM_REPO: &str = "https://github.com/llvm/llvm-project";

/// LLVM revision known to build the supported kernels.
pub const LLVM_GOOD_REVISION: &str = "ebad678857a94c32ce7b6931e9c642b32d278b67";

pub const BINUTILS_VERSION: &str = "2.44";
const BINUTILS_URL: &str = "https://sourceware.org/pub/binutils/releases";

pub const LINUX_VERSION: &str = "6.12";
const LINUX_URL: &str = "https://cdn.kernel.org/pub/linux/kernel";

/// Folder that holds tarballs and their extractions.
pub const SRC_DIR: &str = "src";

/// binutils release tarball.
pub fn binutils_tarball(root: &Path, version: &str) -> Tarball {
    Tarball {
        local: root.join(SRC_DIR).join(format!("binutils-{version}.tar.xz")),
        base_url: BINUTILS_URL.to_string(),
        manifest: Some("sha512.sum".to_string()),
        checksum: Checksum::Sha512,
    }
}

/// Where a binutils release is unpacked.
pub fn binutils_dir(root: &Path, version: &str) -> PathBuf {
    root.join(SRC_DIR).join(format!("binutils-{version}"))
}

/// Linux release tarball from kernel.org.
pub fn linux_tarball(root: &Path, version: &str) -> Tarball {
    let major = version.split('.').next().unwrap_or(version);
    Tarball {
        local: root.join(SRC_DIR).join(format!("linux-{version}.tar.xz")),
        base_url: format!("{LINUX_URL}/v{major}.x"),
        manifest: Some("sha256sums.asc".to_string()),
        checksum: Checksum::Sha256,
    }
}

/// Where a Linux release is unpacked.
pub fn linux_dir(root: &Path, version: &str) -> PathBuf {
    root.join(SRC_DIR).join(format!("linux-{version}"))
}

/// Mark a generated folder as ignored by git.
pub fn create_gitignore(exec: &Exec, folder: &Path) -> Result<()> {
    exec.create_dir(folder)?;
    exec.write(&folder.join(".gitignore"), "*\n")
}

/// Show the cache state of every known source.
pub fn status(root: &Path) -> Result<()> {
    println!("Cache Status:\n");

    let entries = [
        ("llvm-project", git::llvm(root).repo, LLVM_REPO.to_string()),
        (
            "binutils",
            binutils_dir(root, BINUTILS_VERSION),
            binutils_tarball(root, BINUTILS_VERSION).base_url,
        ),
        (
            "linux",
            linux_dir(root, LINUX_VERSION),
            linux_tarball(root, LINUX_VERSION).base_url,
        ),
    ];

    let mut total_size: u64 = 0;
    let mut cached = 0;
    for (name, path, url) in &entries {
        if path.exists() {
            let size = dir_size(path)?;
            total_size += size;
            cached += 1;
            println!("  {name:14} [cached] {:.1} MB", mb(size));
        } else {
            println!("  {name:14} [missing] {url}");
        }
    }

    println!();
    println!(
        "  Total: {cached}/{} cached ({:.1} MB)",
        entries.len(),
        mb(total_size)
    );
    Ok(())
}

/// Remove build folders, and fetched sources too when `sources` is set.
pub fn clean(exec: &Exec, root: &Path, build: &Path, sources: bool) -> Result<()> {
    let mut paths = vec![build.to_path_buf()];
    if sources {
        paths.extend([root.join(SRC_DIR), git::llvm(root).repo]);
    }
    for path in paths.iter().filter(|p| p.exists()) {
        exec.remove_dir(path)?;
        if !exec.dry_run() {
            println!("Cleaned: {}", path.display());
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn mb(bytes: u64) -> f64 {
    bytes as f64 / 1_000_000.0
}

/// Get directory size in bytes.
fn dir_size(path: &Path) -> Result<u64> {
    let output = Command::new("du")
        .arg("-sb")
        .arg(path)
        .output()
        .context("Failed to get directory size")?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let size_str = stdout.split_whitespace().next().unwrap_or("0");
    Ok(size_str.parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_linux_tarball_location() {
        let t = linux_tarball(Path::new("/w"), "6.12");
        assert_eq!(t.local, PathBuf::from("/w/src/linux-6.12.tar.xz"));
        assert_eq!(t.base_url, "https://cdn.kernel.org/pub/linux/kernel/v6.x");
        assert_eq!(t.checksum, Checksum::Sha256);
        assert_eq!(linux_dir(Path::new("/w"), "6.12"), PathBuf::from("/w/src/linux-6.12"));
    }

    #[test]
    fn test_binutils_tarball_location() {
        let t = binutils_tarball(Path::new("/w"), "2.44");
        assert_eq!(t.local, PathBuf::from("/w/src/binutils-2.44.tar.xz"));
        assert_eq!(t.sidecar(), PathBuf::from("/w/src/binutils-2.44.tar.xz.sha512"));
    }

    #[test]
    fn test_gitignore_ignores_everything() {
        let tmp = TempDir::new().unwrap();
        let install = tmp.path().join("install");
        create_gitignore(&Exec::default(), &install).unwrap();
        assert_eq!(fs::read_to_string(install.join(".gitignore")).unwrap(), "*\n");
    }

    #[test]
    fn test_clean_keeps_sources_by_default() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        let src = tmp.path().join(SRC_DIR);
        fs::create_dir_all(build.join("llvm/stage1")).unwrap();
        fs::create_dir_all(&src).unwrap();

        let exec = Exec::default();
        clean(&exec, tmp.path(), &build, false).unwrap();
        assert!(!build.exists());
        assert!(src.exists());

        clean(&exec, tmp.path(), &build, true).unwrap();
        assert!(!src.exists());
    }

    #[test]
    fn test_dry_run_clean_removes_nothing() {
        let tmp = TempDir::new().unwrap();
        let build = tmp.path().join("build");
        fs::create_dir_all(build.join("llvm/stage1")).unwrap();

        clean(&Exec::new(false, true), tmp.path(), &build, true).unwrap();
        assert!(build.join("llvm/stage1").exists());
    }
}
