//! Linux kernel builds with a clang toolchain.
//!
//! Used both to test a finished toolchain and to generate PGO profiles with
//! an instrumented one.

use super::exec::{self, Exec};
use super::host::HostArch;
use super::report;
use super::source::{self, patch};
use super::source::tarball::Tarball;
use super::targets::{self, Arch, TargetSpec};
use super::tools;
use super::version::{CompilerFamily, CompilerVersion, LinuxVersion};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

/// Kconfig symbols that turn warnings into errors under `allmodconfig`.
const WERROR_CONFIGS: &[&str] = &["DRM_WERROR", "WERROR"];

/// A kernel source tree, fetched from a tarball unless supplied.
#[derive(Clone, Debug)]
pub struct LinuxSource {
    pub location: PathBuf,
    pub tarball: Option<Tarball>,
    pub patches: Vec<PathBuf>,
}

impl LinuxSource {
    /// Fetch, unpack and patch the tree.
    pub fn prepare(&self, exec: &mut Exec) -> Result<()> {
        if let Some(tarball) = &self.tarball {
            tarball.prepare(exec, &self.location)?;
        } else if !self.location.exists() {
            bail!(
                "Linux source ('{}') does not exist",
                self.location.display()
            );
        }

        for patch in &self.patches {
            patch::apply(exec, &self.location, patch)?;
        }
        log::info!("Source successfully prepared in {}", self.location.display());
        Ok(())
    }

    /// `make kernelversion`, e.g. `6.13.0-rc1`.
    pub fn kernelversion(&self, exec: &mut Exec) -> Result<String> {
        let mut cmd = Command::new("make");
        cmd.arg("-C").arg(&self.location).args(["-s", "kernelversion"]);
        exec.capture(cmd, None)
            .with_context(|| format!("Querying the version of {}", self.location.display()))
    }

    pub fn version(&self, exec: &mut Exec) -> Result<LinuxVersion> {
        self.kernelversion(exec)?.parse()
    }
}

/// The clang toolchain kernels are built with.
#[derive(Clone, Debug)]
pub struct Toolchain {
    /// Install prefix, `bin/clang` lives below it.
    pub prefix: PathBuf,
    pub version: CompilerVersion,
    /// Whether clang has the host backend, needed for host programs.
    pub host_capable: bool,
}

impl Toolchain {
    pub fn probe(exec: &mut Exec, prefix: &Path) -> Result<Self> {
        let clang = prefix.join("bin/clang");
        if !clang.exists() {
            bail!("clang could not be found in {}", prefix.display());
        }
        let version = CompilerVersion::probe(exec, &clang, CompilerFamily::Clang)?;
        let host_capable = tools::can_compile_for_host(exec, &clang);
        Ok(Self {
            prefix: prefix.to_path_buf(),
            version,
            host_capable,
        })
    }

    fn bin(&self, tool: &str) -> PathBuf {
        self.prefix.join("bin").join(tool)
    }
}

/// Where and how to build.
#[derive(Clone, Debug)]
pub struct KernelOptions {
    pub source: PathBuf,
    /// Parent of the per-variant build folders.
    pub build: PathBuf,
}

/// What happened to one planned build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelOutcome {
    Built,
    Skipped(String),
}

/// Expand architectures and configuration targets into individual builds.
/// Each configuration target is a separate round over all architectures.
pub fn plan(
    archs: &[Arch],
    version: CompilerVersion,
    host: &HostArch,
    config_targets: &[String],
    linux: LinuxVersion,
) -> Vec<TargetSpec> {
    let mut builds = Vec::new();
    for config in config_targets {
        for &arch in archs {
            let specs = targets::resolve_config(arch, version, host, config, linux);
            if specs.is_empty() {
                log::warn!("{arch} cannot build {config} with clang, skipping...");
            }
            builds.extend(specs);
        }
    }
    builds
}

/// Triples that need binutils before any of `plan` can be built.
pub fn binutils_triples(plan: &[TargetSpec]) -> Vec<&'static str> {
    let mut triples = Vec::new();
    for spec in plan.iter().filter(|s| s.needs_binutils) {
        if !triples.contains(&spec.triple) {
            triples.push(spec.triple);
        }
    }
    triples
}

/// Inputs of the make command line besides the target row.
#[derive(Clone, Debug, Default)]
pub struct MakeContext {
    /// Absolute `CROSS_COMPILE` prefix, when binutils are used.
    pub cross_compile: Option<String>,
    /// Tools that must come from binutils (`LD`, `OBJCOPY`).
    pub gnu_tools: Vec<&'static str>,
    pub allconfig: Option<PathBuf>,
}

/// `KEY=VALUE` variables for make, sorted by key.
pub fn make_variables(
    spec: &TargetSpec,
    toolchain: &Toolchain,
    build_dir: &Path,
    ctx: &MakeContext,
) -> BTreeMap<&'static str, String> {
    let mut vars = BTreeMap::new();
    vars.insert("ARCH", spec.kernel_arch.to_string());
    // Warnings must not fail a build that only tests the compiler.
    vars.insert("KCFLAGS", "-Wno-error".to_string());
    vars.insert("LLVM", format!("{}/", toolchain.prefix.join("bin").display()));
    vars.insert("O", build_dir.display().to_string());

    if !spec.integrated_as {
        vars.insert("LLVM_IAS", "0".to_string());
    }
    if !toolchain.host_capable {
        vars.insert("HOSTCC", "gcc".to_string());
        vars.insert("HOSTCXX", "g++".to_string());
    }

    let prefix = ctx
        .cross_compile
        .clone()
        .unwrap_or_else(|| spec.tool_prefix().to_string());
    if let Some(cross) = &ctx.cross_compile {
        vars.insert("CROSS_COMPILE", cross.clone());
    }
    if spec.uses_gnu_ld(toolchain.version) {
        vars.insert("LD", format!("{prefix}ld"));
    }
    for &tool in &ctx.gnu_tools {
        vars.insert(tool, format!("{prefix}{}", tool.to_ascii_lowercase()));
    }
    if let Some(file) = &ctx.allconfig {
        vars.insert("KCONFIG_ALLCONFIG", file.display().to_string());
    }
    vars
}

/// GNU tools s390 still needs with this toolchain.
fn probe_s390_tools(exec: &mut Exec, toolchain: &Toolchain) -> Result<Vec<&'static str>> {
    let mut gnu = Vec::new();

    let mut lld = Command::new(toolchain.bin("ld.lld"));
    lld.args(["-m", "elf64_s390"]);
    let out = exec.output(lld, None)?;
    if String::from_utf8_lossy(&out.stderr).contains("unknown emulation") {
        gnu.push("LD");
    }

    let mut objcopy = Command::new(toolchain.bin("llvm-objcopy"));
    objcopy.args(["-I", "binary", "-O", "elf64-s390", "-", "/dev/null"]);
    let out = exec.output(objcopy, Some(""))?;
    if String::from_utf8_lossy(&out.stderr).contains("invalid output format") {
        gnu.push("OBJCOPY");
    }
    Ok(gnu)
}

/// Absolute prefix of the binutils for `spec`, found through the search
/// path children will see.
fn find_cross_compile(exec: &Exec, spec: &TargetSpec) -> Result<Option<String>> {
    let elfedit = format!("{}elfedit", spec.tool_prefix());
    let cwd = env::current_dir().context("Reading the current directory")?;
    let found = which::which_in(&elfedit, Some(exec.search_path()?), cwd).ok();
    Ok(found.and_then(|path| {
        path.parent()
            .map(|dir| format!("{}/{}", dir.display(), spec.tool_prefix()))
    }))
}

fn write_allconfig() -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("allconfig")
        .tempfile()
        .context("Creating KCONFIG_ALLCONFIG file")?;
    for config in WERROR_CONFIGS {
        writeln!(file, "CONFIG_{config}=n")?;
    }
    file.flush()?;
    Ok(file)
}

/// Build one kernel.
pub fn build(
    exec: &mut Exec,
    spec: &TargetSpec,
    toolchain: &Toolchain,
    opts: &KernelOptions,
    linux: LinuxVersion,
) -> Result<KernelOutcome> {
    if let Some(reason) = spec.skip_reason(toolchain.version, linux) {
        log::warn!("{reason}");
        return Ok(KernelOutcome::Skipped(reason));
    }

    let mut ctx = MakeContext::default();
    let needs_binutils = if spec.probes_s390_tools() {
        ctx.gnu_tools = probe_s390_tools(exec, toolchain)?;
        !ctx.gnu_tools.is_empty()
    } else {
        spec.needs_binutils || spec.uses_gnu_ld(toolchain.version)
    };
    if needs_binutils {
        match find_cross_compile(exec, spec)? {
            Some(prefix) => ctx.cross_compile = Some(prefix),
            // Binutils planned for this run are not installed yet.
            None if exec.dry_run() => {
                log::info!("Dry run: assuming '{}' binutils are on PATH", spec.tool_prefix());
                ctx.cross_compile = Some(spec.tool_prefix().to_string());
            }
            None => {
                let reason = format!(
                    "binutils for {} ('{}') could not be found, skipping kernel build...",
                    spec.kernel_arch,
                    spec.tool_prefix()
                );
                log::warn!("{reason}");
                return Ok(KernelOutcome::Skipped(reason));
            }
        }
    }

    let build_dir = opts.build.join(spec.name);
    exec.remove_dir(&build_dir)?;
    exec.create_dir(&build_dir)?;
    source::create_gitignore(exec, &opts.build)?;

    // Lives until make is done with it.
    let allconfig = if spec.config_targets.iter().any(|c| c == "allmodconfig") {
        Some(write_allconfig()?)
    } else {
        None
    };
    ctx.allconfig = allconfig.as_ref().map(|f| f.path().to_path_buf());

    report::header(&format!(
        "Building {} ({})",
        spec.name,
        spec.config_targets.join(" ")
    ));

    let mut cmd = Command::new("make");
    cmd.arg("-C")
        .arg(&opts.source)
        .arg(format!("-skj{}", exec::cpus()))
        .args(
            make_variables(spec, toolchain, &build_dir, &ctx)
                .iter()
                .map(|(key, value)| format!("{key}={value}")),
        )
        .args(&spec.config_targets)
        .arg("all")
        .env_remove("CFLAGS")
        .env_remove("CXXFLAGS");

    let start = Instant::now();
    exec.run(cmd)?;
    log::info!("Build duration: {}", report::duration(start.elapsed()));
    Ok(KernelOutcome::Built)
}

/// Build every planned kernel in order. Skips are reported, failures stop.
pub fn build_all(
    exec: &mut Exec,
    plan: &[TargetSpec],
    toolchain: &Toolchain,
    opts: &KernelOptions,
    linux: LinuxVersion,
) -> Result<Vec<(&'static str, KernelOutcome)>> {
    let mut outcomes = Vec::new();
    for spec in plan {
        let outcome = build(exec, spec, toolchain, opts, linux)?;
        outcomes.push((spec.name, outcome));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn toolchain(version: CompilerVersion) -> Toolchain {
        Toolchain {
            prefix: PathBuf::from("/w/install"),
            version,
            host_capable: true,
        }
    }

    fn x86_host() -> HostArch {
        HostArch::from_machine("x86_64")
    }

    #[test]
    fn test_plan_expands_variants_in_request_order() {
        let plan = plan(
            &[Arch::X86, Arch::Arm],
            CompilerVersion::new(18, 1, 8),
            &x86_host(),
            &["defconfig".to_string()],
            LinuxVersion(6, 12, 0),
        );
        let names: Vec<&str> = plan.iter().map(|s| s.name).collect();
        assert_eq!(names, ["x86_64", "arm-v5", "arm-v6", "arm-v7"]);
    }

    #[test]
    fn test_plan_with_allmodconfig() {
        let plan = plan(
            &[Arch::Mips, Arch::X86],
            CompilerVersion::new(18, 1, 8),
            &x86_host(),
            &["defconfig".to_string(), "allmodconfig".to_string()],
            LinuxVersion(6, 12, 0),
        );
        let configs: Vec<String> = plan.iter().map(|s| s.config_targets.join(" ")).collect();
        assert_eq!(configs, ["malta_defconfig", "defconfig", "allmodconfig"]);
    }

    #[test]
    fn test_binutils_triples_are_unique() {
        let plan = plan(
            &[Arch::Arm, Arch::X86, Arch::PowerPC],
            CompilerVersion::from_canonical(120_000),
            &x86_host(),
            &["defconfig".to_string()],
            LinuxVersion(6, 12, 0),
        );
        assert_eq!(
            binutils_triples(&plan),
            [
                "arm-linux-gnueabi",
                "powerpc-linux-gnu",
                "powerpc64-linux-gnu",
                "powerpc64le-linux-gnu"
            ]
        );
    }

    #[test]
    fn test_make_variables_for_arm_without_ias() {
        let version = CompilerVersion::from_canonical(120_000);
        let spec = &targets::resolve(Arch::Arm, version, &x86_host())[0];
        let ctx = MakeContext {
            cross_compile: Some("/w/install/bin/arm-linux-gnueabi-".into()),
            ..MakeContext::default()
        };
        let vars = make_variables(spec, &toolchain(version), Path::new("/w/build/linux/arm-v5"), &ctx);

        let line: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
        assert_eq!(
            line,
            [
                "ARCH=arm",
                "CROSS_COMPILE=/w/install/bin/arm-linux-gnueabi-",
                "KCFLAGS=-Wno-error",
                "LLVM=/w/install/bin/",
                "LLVM_IAS=0",
                "O=/w/build/linux/arm-v5",
            ]
        );
    }

    #[test]
    fn test_make_variables_for_x86_with_host_fallback() {
        let version = CompilerVersion::from_canonical(150_000);
        let spec = &targets::resolve(Arch::X86, version, &x86_host())[0];
        let mut tc = toolchain(version);
        tc.host_capable = false;
        let vars = make_variables(spec, &tc, Path::new("/b"), &MakeContext::default());

        assert_eq!(vars["HOSTCC"], "gcc");
        assert_eq!(vars["HOSTCXX"], "g++");
        assert!(!vars.contains_key("LLVM_IAS"));
        assert!(!vars.contains_key("CROSS_COMPILE"));
    }

    #[test]
    fn test_make_variables_gnu_tools() {
        let version = CompilerVersion::new(18, 1, 8);
        let spec = &targets::resolve(Arch::SystemZ, version, &x86_host())[0];
        let ctx = MakeContext {
            cross_compile: Some("/usr/bin/s390x-linux-gnu-".into()),
            gnu_tools: vec!["LD", "OBJCOPY"],
            allconfig: Some(PathBuf::from("/b/allconfig123")),
        };
        let vars = make_variables(spec, &toolchain(version), Path::new("/b"), &ctx);
        assert_eq!(vars["LD"], "/usr/bin/s390x-linux-gnu-ld");
        assert_eq!(vars["OBJCOPY"], "/usr/bin/s390x-linux-gnu-objcopy");
        assert_eq!(vars["KCONFIG_ALLCONFIG"], "/b/allconfig123");
    }

    #[test]
    fn test_allconfig_file_disables_werror() {
        let file = write_allconfig().unwrap();
        assert_eq!(
            fs::read_to_string(file.path()).unwrap(),
            "CONFIG_DRM_WERROR=n\nCONFIG_WERROR=n\n"
        );
    }

    #[test]
    fn test_skipped_build_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let version = CompilerVersion::new(14, 0, 6);
        let spec = &targets::resolve(Arch::X86, version, &x86_host())[0];
        let opts = KernelOptions {
            source: tmp.path().join("linux"),
            build: tmp.path().join("build"),
        };

        let mut exec = Exec::new(false, true);
        let outcome = build(&mut exec, spec, &toolchain(version), &opts, LinuxVersion(6, 15, 0)).unwrap();
        assert!(matches!(outcome, KernelOutcome::Skipped(_)));
        assert!(exec.history().is_empty());
        assert!(!opts.build.exists());
    }

    #[test]
    fn test_missing_binutils_skips_build() {
        let tmp = TempDir::new().unwrap();
        let version = CompilerVersion::from_canonical(120_000);
        // Not a real host triple, so no system binutils can match.
        let host = HostArch::from_machine("x86_64");
        let mut spec = targets::resolve(Arch::Arm, version, &host)[0].clone();
        spec.cross_compile = Some("definitely-not-a-triple-".into());
        let opts = KernelOptions {
            source: tmp.path().join("linux"),
            build: tmp.path().join("build"),
        };

        let mut exec = Exec::default();
        let outcome = build(&mut exec, &spec, &toolchain(version), &opts, LinuxVersion(6, 12, 0)).unwrap();
        assert!(matches!(outcome, KernelOutcome::Skipped(reason) if reason.contains("could not be found")));
        assert!(exec.history().is_empty());

        let mut exec = Exec::new(false, true);
        let outcome = build(&mut exec, &spec, &toolchain(version), &opts, LinuxVersion(6, 12, 0)).unwrap();
        assert_eq!(outcome, KernelOutcome::Built);
        assert!(exec.history()[0].contains(" CROSS_COMPILE=definitely-not-a-triple- "));
    }

    #[test]
    fn test_dry_run_keeps_previous_build() {
        let tmp = TempDir::new().unwrap();
        let version = CompilerVersion::from_canonical(150_000);
        let spec = &targets::resolve(Arch::X86, version, &x86_host())[0];
        let opts = KernelOptions {
            source: tmp.path().join("linux"),
            build: tmp.path().join("build"),
        };
        let vmlinux = opts.build.join("x86_64/vmlinux");
        fs::create_dir_all(vmlinux.parent().unwrap()).unwrap();
        fs::write(&vmlinux, "").unwrap();

        let mut exec = Exec::new(false, true);
        let outcome = build(&mut exec, spec, &toolchain(version), &opts, LinuxVersion(6, 12, 0)).unwrap();
        assert_eq!(outcome, KernelOutcome::Built);
        assert_eq!(exec.history().len(), 1);
        assert!(vmlinux.exists());
        assert!(!opts.build.join(".gitignore").exists());
    }

    #[test]
    fn test_dry_run_make_command() {
        let tmp = TempDir::new().unwrap();
        let version = CompilerVersion::from_canonical(150_000);
        let spec = &targets::resolve(Arch::X86, version, &x86_host())[0];
        let opts = KernelOptions {
            source: PathBuf::from("/w/src/linux-6.12"),
            build: tmp.path().join("build"),
        };

        let mut exec = Exec::new(false, true);
        let outcome = build(&mut exec, spec, &toolchain(version), &opts, LinuxVersion(6, 12, 0)).unwrap();
        assert_eq!(outcome, KernelOutcome::Built);

        let line = &exec.history()[0];
        assert!(line.starts_with("make -C /w/src/linux-6.12 -skj"));
        assert!(line.contains(" ARCH=x86_64 KCFLAGS=-Wno-error LLVM=/w/install/bin/ O="));
        assert!(line.ends_with(" defconfig all"));
    }

    #[test]
    fn test_linux_source_without_tree_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let src = LinuxSource {
            location: tmp.path().join("linux"),
            tarball: None,
            patches: Vec::new(),
        };
        let mut exec = Exec::default();
        assert!(src.prepare(&mut exec).is_err());
    }
}
