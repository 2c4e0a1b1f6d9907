//! Compiler and kernel version handling.
//!
//! Compiler versions are compared through a single integer,
//! `10000 * major + 100 * minor + patch`, so `15.0.3` becomes `150003`.

use super::error::Error;
use super::exec::Exec;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

/// Canonical encoding of a three component compiler version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CompilerVersion(u32);

impl CompilerVersion {
    /// For known-good constants. Input goes through [`Self::from_components`].
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self(major * 10000 + minor * 100 + patch)
    }

    pub const fn from_canonical(value: u32) -> Self {
        Self(value)
    }

    pub const fn canonical(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 / 10000
    }

    pub const fn minor(self) -> u32 {
        self.0 / 100 % 100
    }

    pub const fn patch(self) -> u32 {
        self.0 % 100
    }

    /// Build from separate components, as printed by the preprocessor
    /// (`15 0 3`) or by humans (`15.0.3`). Missing components are zero.
    pub fn from_components(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text
            .split(|c: char| c == '.' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() || parts.len() > 3 {
            bail!("'{text}' is not a version of the form major.minor.patch");
        }

        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .with_context(|| format!("'{part}' in '{text}' is not a number"))?;
        }
        let [major, minor, patch] = nums;
        if minor > 99 || patch > 99 {
            bail!("'{text}' has a component above 99 and cannot be encoded");
        }
        major
            .checked_mul(10000)
            .and_then(|m| m.checked_add(minor * 100 + patch))
            .map(Self)
            .with_context(|| format!("'{text}' is too large to encode"))
    }

    /// Ask a compiler for its version by preprocessing its version macros.
    pub fn probe(exec: &mut Exec, cc: &Path, family: CompilerFamily) -> Result<Self> {
        let mut cmd = Command::new(cc);
        cmd.args(["-E", "-P", "-x", "c", "-"]);
        let out = exec
            .capture(cmd, Some(family.version_macros()))
            .with_context(|| format!("Querying the version of {}", cc.display()))?;
        Self::from_components(&out)
            .with_context(|| format!("Parsing the version reported by {}", cc.display()))
    }
}

impl FromStr for CompilerVersion {
    type Err = Error;

    /// Accepts `15.0.3` or an already canonical `150003`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(value) = s.parse::<u32>() {
            return Ok(Self::from_canonical(value));
        }
        Self::from_components(s).map_err(|e| Error::usage(format!("{e:#}")))
    }
}

impl fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Which compiler driver we are talking to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilerFamily {
    Clang,
    Gcc,
}

impl CompilerFamily {
    pub fn of(cc: &Path) -> Self {
        let name = cc
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.contains("clang") {
            Self::Clang
        } else {
            Self::Gcc
        }
    }

    fn version_macros(self) -> &'static str {
        match self {
            Self::Clang => "__clang_major__ __clang_minor__ __clang_patchlevel__\n",
            Self::Gcc => "__GNUC__ __GNUC_MINOR__ __GNUC_PATCHLEVEL__\n",
        }
    }
}

/// Version of a Linux source tree, as reported by `make kernelversion`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LinuxVersion(pub u32, pub u32, pub u32);

impl FromStr for LinuxVersion {
    type Err = anyhow::Error;

    /// Parses `6.12`, `6.12.3` and release candidates such as `6.13.0-rc1`.
    fn from_str(s: &str) -> Result<Self> {
        let mut nums = [0u32; 3];
        let mut seen = 0;
        for (slot, part) in nums.iter_mut().zip(s.trim().splitn(3, '.')) {
            let digits = part.split('-').next().unwrap_or_default();
            *slot = digits
                .parse()
                .with_context(|| format!("'{s}' is not a kernel version"))?;
            seen += 1;
        }
        if seen < 2 {
            bail!("'{s}' is not a kernel version");
        }
        Ok(Self(nums[0], nums[1], nums[2]))
    }
}

impl fmt::Display for LinuxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}
