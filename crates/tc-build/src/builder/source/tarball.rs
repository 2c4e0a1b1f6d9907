//! Release tarballs: download, digest verification, extraction.
//!
//! The expected digest of `foo.tar.xz` lives in a sidecar file next to it,
//! `foo.tar.xz.sha256` (or `.sha512`), in `sha256sum` format. A missing
//! sidecar is filled in from the upstream checksum manifest; a mismatch is
//! fatal and leaves the artifact in place for the operator to inspect.

use super::super::error::Error;
use super::super::exec::Exec;
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256, Sha512};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Hash algorithms accepted in sidecar files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checksum {
    Sha256,
    Sha512,
}

impl Checksum {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hex digest of the file at `path`.
    pub fn compute(self, path: &Path) -> Result<String> {
        match self {
            Self::Sha256 => hash_file::<Sha256>(path),
            Self::Sha512 => hash_file::<Sha512>(path),
        }
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = D::new();
    let mut buf = vec![0u8; 128 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// A compressed source release.
#[derive(Clone, Debug)]
pub struct Tarball {
    /// Where the tarball is stored locally.
    pub local: PathBuf,
    /// Directory URL the tarball and manifest are served from.
    pub base_url: String,
    /// Upstream checksum manifest, relative to `base_url`.
    pub manifest: Option<String>,
    pub checksum: Checksum,
}

impl Tarball {
    pub fn name(&self) -> String {
        self.local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn sidecar(&self) -> PathBuf {
        let mut path = self.local.clone().into_os_string();
        path.push(".");
        path.push(self.checksum.extension());
        PathBuf::from(path)
    }

    /// Download the tarball and its expected digest if they are not on disk.
    pub fn download(&self, exec: &mut Exec) -> Result<()> {
        if let Some(parent) = self.local.parent() {
            super::create_gitignore(exec, parent)?;
        }

        if !self.local.exists() {
            let url = format!("{}/{}", self.base_url, self.name());
            log::info!("Downloading {url} to {}...", self.local.display());
            let mut cmd = Command::new("curl");
            cmd.args(["-fLSs", "-o"]).arg(&self.local).arg(&url);
            exec.run(cmd)?;
        }

        if exec.dry_run() && !self.sidecar().exists() {
            log::info!("Dry run: would fetch {}", self.sidecar().display());
        } else if !self.sidecar().exists() {
            let Some(manifest) = &self.manifest else {
                bail!(
                    "No expected checksum for {}, create {} first",
                    self.local.display(),
                    self.sidecar().display()
                );
            };
            let url = format!("{}/{manifest}", self.base_url);
            let mut cmd = Command::new("curl");
            cmd.args(["-fLSs", &url]);
            let text = exec.capture(cmd, None)?;
            let digest = find_digest(&text, &self.name())
                .with_context(|| format!("Could not find checksum for {} in {url}", self.name()))?;
            exec.write(&self.sidecar(), &format!("{digest}  {}\n", self.name()))?;
        }

        Ok(())
    }

    /// Compare the tarball against its sidecar digest.
    pub fn verify(&self) -> Result<()> {
        let expected = read_sidecar(&self.sidecar())?;
        let computed = self.checksum.compute(&self.local)?;
        if !computed.eq_ignore_ascii_case(&expected) {
            return Err(Error::ChecksumMismatch {
                path: self.local.clone(),
                expected,
                computed,
            }
            .into());
        }
        log::debug!("Checksum verified: {}", &computed[..16]);
        Ok(())
    }

    /// Verify, then unpack into `dest`, dropping the top-level directory.
    pub fn extract(&self, exec: &mut Exec, dest: &Path) -> Result<()> {
        if !self.local.exists() {
            bail!(
                "Local tarball ('{}') could not be found, download it first?",
                self.local.display()
            );
        }
        self.verify()?;

        exec.create_dir(dest)?;
        log::info!("Extracting {} into {}...", self.local.display(), dest.display());
        let mut cmd = Command::new("tar");
        cmd.arg("--auto-compress")
            .arg(format!("--directory={}", dest.display()))
            .arg("--extract")
            .arg(format!("--file={}", self.local.display()))
            .arg("--strip-components=1");
        exec.run(cmd)
    }

    /// Make sure `dest` holds the unpacked release.
    pub fn prepare(&self, exec: &mut Exec, dest: &Path) -> Result<()> {
        if dest.exists() {
            log::debug!("{} already extracted", dest.display());
            return Ok(());
        }
        self.download(exec)?;
        if exec.dry_run() && !(self.local.exists() && self.sidecar().exists()) {
            return Ok(());
        }
        self.extract(exec, dest)
    }
}

/// Find the digest for `name` in a `sha256sum`-style manifest.
pub fn find_digest(manifest: &str, name: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let file = fields.next()?.trim_start_matches('*');
        (file == name && !digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| digest.to_ascii_lowercase())
    })
}

fn read_sidecar(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Reading expected checksum from {}", path.display()))?;
    text.split_whitespace()
        .next()
        .map(str::to_ascii_lowercase)
        .with_context(|| format!("{} is empty", path.display()))
}
