//! GNU binutils builds.
//!
//! One autotools build per target triple in `build/binutils/<triple>`, all
//! installed into the same prefix.

use super::error::Error;
use super::exec::{self, Exec};
use super::host::HostArch;
use super::report;
use super::source;
use super::tools::HostTools;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Flags shared by every configuration.
const COMMON_FLAGS: &[&str] = &[
    "--disable-compressed-debug-sections",
    "--disable-gdb",
    "--disable-gprofng",
    "--disable-nls",
    "--disable-werror",
    "--enable-deterministic-archives",
    "--enable-new-dtags",
    "--enable-plugins",
    "--enable-threads",
    "--quiet",
    "--with-system-zlib",
];

const DOC_DIRS: &[&str] = &["info", "html", "pdf", "man"];

/// Configure flag sets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Standard,
    NoMultilib,
}

impl Family {
    fn flags(self) -> &'static [&'static str] {
        match self {
            Self::Standard => &["--disable-sim", "--enable-lto", "--enable-relro", "--with-pic"],
            Self::NoMultilib => &["--disable-multilib", "--with-gnu-as", "--with-gnu-ld"],
        }
    }
}

#[derive(Debug)]
pub struct BinutilsTarget {
    pub triple: &'static str,
    pub family: Family,
    /// Additional BFD targets (`--enable-targets`).
    pub extra_targets: &'static [&'static str],
}

impl BinutilsTarget {
    /// Short name, the architecture part of the triple.
    pub fn arch(&self) -> &'static str {
        self.triple.split('-').next().unwrap_or(self.triple)
    }
}

const fn target(
    triple: &'static str,
    family: Family,
    extra_targets: &'static [&'static str],
) -> BinutilsTarget {
    BinutilsTarget {
        triple,
        family,
        extra_targets,
    }
}

pub static TARGETS: &[BinutilsTarget] = &[
    target("aarch64-linux-gnu", Family::NoMultilib, &[]),
    target("arm-linux-gnueabi", Family::NoMultilib, &[]),
    target("loongarch64-linux-gnu", Family::Standard, &[]),
    target(
        "mips-linux-gnu",
        Family::Standard,
        &["mips64-linux-gnuabi64", "mips64-linux-gnuabin32"],
    ),
    target(
        "mipsel-linux-gnu",
        Family::Standard,
        &["mips64el-linux-gnuabi64", "mips64el-linux-gnuabin32"],
    ),
    target("powerpc-linux-gnu", Family::Standard, &[]),
    target("powerpc64-linux-gnu", Family::Standard, &[]),
    target("powerpc64le-linux-gnu", Family::Standard, &[]),
    target("riscv64-linux-gnu", Family::Standard, &[]),
    target("s390x-linux-gnu", Family::Standard, &["s390-linux-gnu"]),
    target("x86_64-linux-gnu", Family::Standard, &["x86_64-pep"]),
];

/// Look up the table entry for a full triple.
pub fn find(triple: &str) -> Option<&'static BinutilsTarget> {
    TARGETS.iter().find(|t| t.triple == triple)
}

/// Targets built by `all`. LoongArch only exists in newer releases.
pub fn default_targets(source: &Path) -> Vec<&'static BinutilsTarget> {
    let loongarch = source.join("gas/config/tc-loongarch.c").exists();
    TARGETS
        .iter()
        .filter(|t| loongarch || t.arch() != "loongarch64")
        .collect()
}

/// Parse `all`, `host`, short names (`arm`) or full triples.
pub fn parse_targets(
    requested: &[String],
    host: &HostArch,
    source: &Path,
) -> Result<Vec<&'static BinutilsTarget>, Error> {
    let mut targets: Vec<&'static BinutilsTarget> = Vec::new();
    for item in requested {
        let found: Vec<&'static BinutilsTarget> = match item.as_str() {
            "all" => default_targets(source),
            "host" => vec![by_arch(host.as_str())?],
            other => vec![by_arch(other.split('-').next().unwrap_or(other))?],
        };
        for t in found {
            if !targets.iter().any(|known| known.triple == t.triple) {
                targets.push(t);
            }
        }
    }
    Ok(targets)
}

fn by_arch(arch: &str) -> Result<&'static BinutilsTarget, Error> {
    TARGETS.iter().find(|t| t.arch() == arch).ok_or_else(|| {
        let known: Vec<&str> = TARGETS.iter().map(BinutilsTarget::arch).collect();
        Error::usage(format!(
            "unknown binutils target '{arch}', expected one of: all, host, {}",
            known.join(", ")
        ))
    })
}

/// Everything a binutils build needs besides the target.
#[derive(Clone, Debug)]
pub struct BinutilsOptions {
    pub source: PathBuf,
    /// Parent of the per-triple build folders.
    pub build: PathBuf,
    pub install: PathBuf,
    pub march: Option<String>,
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

impl BinutilsOptions {
    pub fn new(source: PathBuf, build: PathBuf, install: PathBuf, tools: &HostTools) -> Self {
        Self {
            source,
            build,
            install,
            march: None,
            cc: tools.cc.clone(),
            cxx: tools.cxx.clone(),
        }
    }
}

/// Arguments for `configure`, in order.
pub fn configure_args(
    target: &BinutilsTarget,
    opts: &BinutilsOptions,
    host: &HostArch,
    doc_dir: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = COMMON_FLAGS.iter().map(|f| (*f).to_string()).collect();
    args.extend(target.family.flags().iter().map(|f| (*f).to_string()));
    args.push(format!("--prefix={}", opts.install.display()));

    if !host.is_native(target.triple) {
        args.push(format!("--program-prefix={}-", target.triple));
        args.push(format!("--target={}", target.triple));
    }
    if !target.extra_targets.is_empty() {
        args.push(format!("--enable-targets={}", target.extra_targets.join(",")));
    }
    // There is no switch to skip documentation, so it goes somewhere disposable.
    for doc in DOC_DIRS {
        args.push(format!("--{doc}dir={}", doc_dir.display()));
    }

    let mut cflags = vec!["-O2".to_string()];
    if let Some(march) = &opts.march {
        cflags.push(format!("-march={march}"));
        cflags.push(format!("-mtune={march}"));
    }
    let cflags = cflags.join(" ");
    args.push(format!("CC={}", opts.cc.display()));
    args.push(format!("CXX={}", opts.cxx.display()));
    args.push(format!("CFLAGS={cflags}"));
    args.push(format!("CXXFLAGS={cflags}"));
    args
}

/// Prefix of the installed programs, empty for the host.
pub fn program_prefix(triple: &str, host: &HostArch) -> String {
    if host.is_native(triple) {
        String::new()
    } else {
        format!("{triple}-")
    }
}

/// Whether binutils for `triple` are already in `install`.
pub fn installed(install: &Path, triple: &str, host: &HostArch) -> bool {
    install
        .join("bin")
        .join(format!("{}elfedit", program_prefix(triple, host)))
        .exists()
}

/// Whether binutils for `triple` are in `install` or on the search path
/// children get.
pub fn available(exec: &Exec, install: &Path, triple: &str, host: &HostArch) -> bool {
    if installed(install, triple, host) {
        return true;
    }
    let Ok(search) = exec.search_path() else {
        return false;
    };
    let Ok(cwd) = std::env::current_dir() else {
        return false;
    };
    let elfedit = format!("{}elfedit", program_prefix(triple, host));
    which::which_in(elfedit, Some(search), cwd).is_ok()
}

/// Configure, build and install binutils for one triple.
pub fn build(
    exec: &mut Exec,
    target: &BinutilsTarget,
    opts: &BinutilsOptions,
    host: &HostArch,
) -> Result<()> {
    report::header(&format!("Building {} binutils", target.triple));

    let build_dir = opts.build.join(target.triple);
    exec.remove_dir(&build_dir)?;
    exec.create_dir(&build_dir)?;
    source::create_gitignore(exec, &opts.build)?;

    let docs = tempfile::TempDir::new().context("Creating a temporary documentation folder")?;

    let mut configure = Command::new(opts.source.join("configure"));
    configure
        .args(configure_args(target, opts, host, docs.path()))
        .current_dir(&build_dir);
    exec.run(configure)?;

    let jobs = format!("-j{}", exec::cpus());
    let make = |extra: &[&str]| {
        let mut cmd = Command::new("make");
        cmd.arg("-C")
            .arg(&build_dir)
            .args(["-s", jobs.as_str(), "V=0"])
            .args(extra);
        cmd
    };
    exec.run(make(&[]))?;
    exec.run(make(&["install"]))?;
    source::create_gitignore(exec, &opts.install)?;

    log::info!("Installed {} binutils into {}", target.triple, opts.install.display());
    Ok(())
}

/// Build every target in order, stopping at the first failure.
pub fn build_all(
    exec: &mut Exec,
    targets: &[&BinutilsTarget],
    opts: &BinutilsOptions,
    host: &HostArch,
) -> Result<()> {
    for target in targets {
        build(exec, target, opts, host)?;
    }
    Ok(())
}
