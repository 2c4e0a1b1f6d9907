//! Multi-stage LLVM builds with CMake and Ninja.
//!
//! Stage 1 is a slim bootstrap compiler built with the host tools. Later
//! stages are built with the stage 1 binaries, optionally via an
//! instrumented stage whose kernel build profiles feed the final one.

use super::error::Error;
use super::exec::Exec;
use super::host::HostArch;
use super::kernel::{self, KernelOptions, LinuxSource, Toolchain};
use super::report;
use super::source;
use super::targets::Arch;
use super::tools::{HostTools, StageTools};
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

pub const DEFAULT_PROJECTS: &[&str] = &["clang", "compiler-rt", "lld", "polly"];

pub const DEFAULT_TARGETS: &[&str] = &[
    "AArch64", "ARM", "BPF", "Hexagon", "Mips", "PowerPC", "RISCV", "SystemZ", "X86",
];

/// Tools shipped by the bootstrap compiler.
const DISTRIBUTION_COMPONENTS: &[&str] = &[
    "clang",
    "clang-resource-headers",
    "lld",
    "llvm-ar",
    "llvm-nm",
    "llvm-objcopy",
    "llvm-objdump",
    "llvm-ranlib",
    "llvm-readelf",
    "llvm-strip",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
pub enum BuildType {
    #[value(name = "Release")]
    Release,
    #[value(name = "Debug")]
    Debug,
    #[value(name = "RelWithDebInfo")]
    RelWithDebInfo,
    #[value(name = "MinSizeRel")]
    MinSizeRel,
}

impl BuildType {
    pub fn cmake(self) -> &'static str {
        match self {
            Self::Release => "Release",
            Self::Debug => "Debug",
            Self::RelWithDebInfo => "RelWithDebInfo",
            Self::MinSizeRel => "MinSizeRel",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lto {
    Thin,
    Full,
}

impl Lto {
    fn cmake(self) -> &'static str {
        match self {
            Self::Thin => "Thin",
            Self::Full => "Full",
        }
    }
}

/// Requested shape of the toolchain.
#[derive(Clone, Debug)]
pub struct LlvmOptions {
    /// The llvm-project checkout.
    pub source: PathBuf,
    /// Parent of the `stageN` folders.
    pub build: PathBuf,
    pub install: PathBuf,
    pub projects: Vec<String>,
    pub targets: Vec<String>,
    pub build_type: BuildType,
    pub assertions: bool,
    pub lto: Option<Lto>,
    pub pgo: bool,
    pub march: Option<String>,
    pub clang_vendor: Option<String>,
    pub ccache: bool,
    pub check_targets: Vec<String>,
    pub stage1_only: bool,
    pub install_stage1_only: bool,
    pub incremental: bool,
    /// Kernel tree used to generate PGO profiles.
    pub profile_kernel: Option<LinuxSource>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// Slim host-only clang + lld used to build the rest.
    Bootstrap,
    /// Emits IR profiles when run.
    Instrumented,
    Final,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    pub number: u8,
    pub kind: StageKind,
    pub install: bool,
}

impl Stage {
    pub fn dir(self, build: &Path) -> PathBuf {
        build.join(format!("stage{}", self.number))
    }
}

/// The stages to run, in order.
pub fn plan_stages(opts: &LlvmOptions) -> Vec<Stage> {
    if opts.stage1_only {
        return vec![Stage {
            number: 1,
            kind: StageKind::Final,
            install: opts.install_stage1_only,
        }];
    }

    let mut stages = vec![Stage {
        number: 1,
        kind: StageKind::Bootstrap,
        install: false,
    }];
    if opts.pgo {
        stages.push(Stage {
            number: 2,
            kind: StageKind::Instrumented,
            install: false,
        });
    }
    stages.push(Stage {
        number: if opts.pgo { 3 } else { 2 },
        kind: StageKind::Final,
        install: true,
    });
    stages
}

/// Compilers and binary tools handed to CMake.
#[derive(Clone, Debug, Default)]
pub struct CmakeTools {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ld: Option<PathBuf>,
    pub ar: Option<PathBuf>,
    pub ranlib: Option<PathBuf>,
    pub clang_tblgen: Option<PathBuf>,
    pub llvm_tblgen: Option<PathBuf>,
}

impl From<&HostTools> for CmakeTools {
    fn from(tools: &HostTools) -> Self {
        Self {
            cc: tools.cc.clone(),
            cxx: tools.cxx.clone(),
            ld: tools.ld.clone(),
            ar: tools.ar.clone(),
            ranlib: tools.ranlib.clone(),
            clang_tblgen: None,
            llvm_tblgen: None,
        }
    }
}

impl From<&StageTools> for CmakeTools {
    fn from(tools: &StageTools) -> Self {
        Self {
            cc: tools.cc.clone(),
            cxx: tools.cxx.clone(),
            ld: Some(tools.ld.clone()),
            ar: Some(tools.ar.clone()),
            ranlib: Some(tools.ranlib.clone()),
            clang_tblgen: Some(tools.clang_tblgen.clone()),
            llvm_tblgen: Some(tools.llvm_tblgen.clone()),
        }
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

/// `-D` definitions for one stage, sorted by name.
pub fn cmake_defines(
    stage: Stage,
    opts: &LlvmOptions,
    tools: &CmakeTools,
    ccache: bool,
) -> BTreeMap<&'static str, String> {
    let mut d: BTreeMap<&'static str, String> = BTreeMap::new();
    let off = || "OFF".to_string();
    let on = || "ON".to_string();

    for key in [
        "CLANG_ENABLE_ARCMT",
        "CLANG_ENABLE_STATIC_ANALYZER",
        "CLANG_PLUGIN_SUPPORT",
        "LLVM_ENABLE_BINDINGS",
        "LLVM_ENABLE_OCAMLDOC",
        "LLVM_ENABLE_TERMINFO",
        "LLVM_INCLUDE_DOCS",
        "LLVM_INCLUDE_EXAMPLES",
    ] {
        d.insert(key, off());
    }
    d.insert("LLVM_EXTERNAL_CLANG_TOOLS_EXTRA_SOURCE_DIR", String::new());

    d.insert("CMAKE_C_COMPILER", path_str(&tools.cc));
    d.insert("CMAKE_CXX_COMPILER", path_str(&tools.cxx));
    let optional = [
        ("CMAKE_AR", &tools.ar),
        ("CMAKE_RANLIB", &tools.ranlib),
        ("LLVM_USE_LINKER", &tools.ld),
        ("CLANG_TABLEGEN", &tools.clang_tblgen),
        ("LLVM_TABLEGEN", &tools.llvm_tblgen),
    ];
    for (key, value) in optional {
        if let Some(path) = value {
            d.insert(key, path_str(path));
        }
    }

    let (projects, targets) = match stage.kind {
        StageKind::Bootstrap => {
            let mut projects = vec!["clang", "lld"];
            // The instrumented stage links against the profile runtime.
            if opts.pgo {
                projects.push("compiler-rt");
            }
            (projects.join(";"), "host".to_string())
        }
        StageKind::Instrumented => ("clang;lld".to_string(), opts.targets.join(";")),
        StageKind::Final => (opts.projects.join(";"), opts.targets.join(";")),
    };
    let compiler_rt = projects.split(';').any(|p| p == "compiler-rt" || p == "all");
    d.insert("LLVM_ENABLE_PROJECTS", projects);
    d.insert("LLVM_TARGETS_TO_BUILD", targets);

    if compiler_rt {
        d.insert("COMPILER_RT_BUILD_CRT", off());
        d.insert("COMPILER_RT_BUILD_LIBFUZZER", off());
        d.insert("COMPILER_RT_BUILD_XRAY", off());
    }

    if stage.number == 1 && ccache {
        d.insert("CMAKE_C_COMPILER_LAUNCHER", "ccache".to_string());
        d.insert("CMAKE_CXX_COMPILER_LAUNCHER", "ccache".to_string());
    }

    if stage.kind == StageKind::Bootstrap {
        d.insert("CMAKE_BUILD_TYPE", BuildType::Release.cmake().to_string());
        d.insert("LLVM_BUILD_UTILS", off());
        d.insert("LLVM_DISTRIBUTION_COMPONENTS", DISTRIBUTION_COMPONENTS.join(";"));
        d.insert("LLVM_ENABLE_ASSERTIONS", off());
        d.insert("LLVM_ENABLE_BACKTRACES", off());
        d.insert("LLVM_ENABLE_WARNINGS", off());
        d.insert("LLVM_INCLUDE_TESTS", off());
        if compiler_rt {
            d.insert("COMPILER_RT_BUILD_SANITIZERS", off());
        }
    } else {
        d.insert("CMAKE_BUILD_TYPE", opts.build_type.cmake().to_string());
        if opts.build_type == BuildType::Release {
            d.insert("LLVM_ENABLE_WARNINGS", off());
        }
        if opts.assertions {
            d.insert("LLVM_ENABLE_ASSERTIONS", on());
        }
    }

    if stage.kind == StageKind::Instrumented {
        d.insert("LLVM_BUILD_INSTRUMENTED", "IR".to_string());
        d.insert("LLVM_BUILD_RUNTIME", off());
        d.insert("LLVM_LINK_LLVM_DYLIB", on());
        d.insert("LLVM_VP_COUNTERS_PER_SITE", "6".to_string());
    }

    if stage.kind == StageKind::Final {
        if opts.pgo {
            d.insert("LLVM_PROFDATA_FILE", path_str(&profdata(&opts.build)));
        }
        if let Some(lto) = opts.lto {
            d.insert("LLVM_ENABLE_LTO", lto.cmake().to_string());
        }
    }

    if stage.install {
        d.insert("CMAKE_INSTALL_PREFIX", path_str(&opts.install));
    }
    if let Some(march) = &opts.march {
        let flags = format!("-march={march} -mtune={march}");
        d.insert("CMAKE_C_FLAGS", flags.clone());
        d.insert("CMAKE_CXX_FLAGS", flags);
    }
    if let Some(vendor) = &opts.clang_vendor {
        d.insert("CLANG_VENDOR", vendor.clone());
    }
    d
}

/// Merged profile consumed by the final stage.
pub fn profdata(build: &Path) -> PathBuf {
    build.join("profdata.prof")
}

/// Backends listed in `set(LLVM_ALL_TARGETS ...)` of `llvm/CMakeLists.txt`.
pub fn all_targets(source: &Path) -> Result<Vec<String>> {
    let cmake = source.join("llvm/CMakeLists.txt");
    let text = fs::read_to_string(&cmake)
        .with_context(|| format!("Reading {}", cmake.display()))?;
    let Some(start) = text.find("set(LLVM_ALL_TARGETS") else {
        bail!("Could not find LLVM_ALL_TARGETS in {}", cmake.display());
    };
    let body = &text[start + "set(LLVM_ALL_TARGETS".len()..];
    let body = body.split(')').next().unwrap_or_default();
    Ok(body.split_whitespace().map(str::to_string).collect())
}

/// Reject targets LLVM does not know before anything is configured.
pub fn validate_targets(requested: &[String], all: &[String]) -> Result<(), Error> {
    for target in requested {
        if target == "all" || target == "host" {
            continue;
        }
        if !all.contains(target) {
            return Err(Error::usage(format!(
                "requested target ('{target}') was not found in LLVM_ALL_TARGETS ({}), check spelling?",
                all.join(", ")
            )));
        }
    }
    Ok(())
}

/// Default backends, with LoongArch when the checkout has it.
pub fn default_targets(all: &[String]) -> Vec<String> {
    let mut targets: Vec<String> = DEFAULT_TARGETS.iter().map(|t| (*t).to_string()).collect();
    if all.iter().any(|t| t == "LoongArch") {
        targets.push("LoongArch".to_string());
    }
    targets
}

/// Outcome of a toolchain build.
#[derive(Clone, Debug)]
pub struct LlvmBuild {
    /// Where the usable toolchain lives, install folder or last build folder.
    pub prefix: PathBuf,
    pub installed: bool,
}

fn configure(exec: &mut Exec, stage: Stage, opts: &LlvmOptions, tools: &CmakeTools, ccache: bool) -> Result<PathBuf> {
    let dir = stage.dir(&opts.build);
    if !opts.incremental {
        exec.remove_dir(&dir)?;
    }
    exec.create_dir(&dir)?;
    source::create_gitignore(exec, &opts.build)?;

    report::header(&format!("Configuring LLVM stage {}", stage.number));
    let mut cmd = Command::new("cmake");
    cmd.args(["-G", "Ninja", "-Wno-dev"])
        .arg("-S")
        .arg(opts.source.join("llvm"))
        .arg("-B")
        .arg(&dir)
        .args(
            cmake_defines(stage, opts, tools, ccache)
                .iter()
                .map(|(key, value)| format!("-D{key}={value}")),
        );
    exec.run(cmd)?;
    Ok(dir)
}

fn ninja(dir: &Path, targets: &[String]) -> Command {
    let mut cmd = Command::new("ninja");
    cmd.arg("-C").arg(dir).args(targets);
    cmd
}

fn build_stage(exec: &mut Exec, stage: Stage, opts: &LlvmOptions, tools: &CmakeTools, ccache: bool) -> Result<PathBuf> {
    let dir = configure(exec, stage, opts, tools, ccache)?;

    report::header(&format!("Building LLVM stage {}", stage.number));
    let start = Instant::now();
    exec.run(ninja(&dir, &[]))?;
    if stage.kind == StageKind::Final && !opts.check_targets.is_empty() {
        let checks: Vec<String> = opts.check_targets.iter().map(|t| format!("check-{t}")).collect();
        exec.run(ninja(&dir, &checks))?;
    }
    log::info!("LLVM stage {} build duration: {}", stage.number, report::duration(start.elapsed()));

    if stage.install {
        exec.run_silent(ninja(&dir, &["install".to_string()]))?;
        source::create_gitignore(exec, &opts.install)?;
    }
    Ok(dir)
}

/// Build kernels with the instrumented compiler and merge the profiles.
fn generate_profiles(
    exec: &mut Exec,
    opts: &LlvmOptions,
    instrumented: &Path,
    stage1: &StageTools,
    host: &HostArch,
) -> Result<()> {
    report::header("Building PGO profiles");
    let Some(linux) = &opts.profile_kernel else {
        bail!("PGO requested without a kernel source to profile with");
    };
    if exec.dry_run() && !instrumented.join("bin/clang").exists() {
        log::info!("Dry run: skipping kernel builds for profiling");
        return Ok(());
    }

    linux.prepare(exec)?;
    let linux_version = linux.version(exec)?;
    let toolchain = Toolchain::probe(exec, instrumented)?;
    let archs = profile_archs(&opts.targets, host);
    let plan = kernel::plan(
        &archs,
        toolchain.version,
        host,
        &["defconfig".to_string()],
        linux_version,
    );
    let kernel_opts = KernelOptions {
        source: linux.location.clone(),
        build: opts.build.join("linux"),
    };
    kernel::build_all(exec, &plan, &toolchain, &kernel_opts, linux_version)?;

    let profiles = raw_profiles(&instrumented.join("profiles"))?;
    if profiles.is_empty() {
        bail!("No profiles generated in {}", instrumented.join("profiles").display());
    }
    let mut merge = Command::new(&stage1.llvm_profdata);
    merge
        .arg("merge")
        .arg(format!("-output={}", profdata(&opts.build).display()))
        .args(&profiles);
    exec.run(merge)
}

/// Kernel architectures that match the requested LLVM backends.
fn profile_archs(targets: &[String], host: &HostArch) -> Vec<Arch> {
    let mut archs = Vec::new();
    for target in targets {
        let found = match target.as_str() {
            "all" => Arch::ALL.to_vec(),
            "host" => Arch::of_host(host).into_iter().collect(),
            other => other.parse::<Arch>().into_iter().collect(),
        };
        for arch in found {
            if !archs.contains(&arch) {
                archs.push(arch);
            }
        }
    }
    archs
}

fn raw_profiles(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut profiles: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "profraw"))
        .collect();
    profiles.sort();
    Ok(profiles)
}

/// Run every planned stage.
pub fn build(exec: &mut Exec, opts: &LlvmOptions, host_tools: &HostTools, host: &HostArch) -> Result<LlvmBuild> {
    let ccache = opts.ccache && {
        let found = which::which("ccache").is_ok();
        if !found {
            log::warn!("ccache requested but could not be found on your system, ignoring...");
        }
        found
    };

    let stages = plan_stages(opts);
    let stage1 = StageTools::new(&opts.build.join("stage1/bin"));
    let mut last = opts.build.clone();
    let mut installed = false;

    for stage in stages {
        let tools = if stage.number == 1 {
            CmakeTools::from(host_tools)
        } else {
            CmakeTools::from(&stage1)
        };
        last = build_stage(exec, stage, opts, &tools, ccache)?;
        installed |= stage.install;

        if stage.kind == StageKind::Instrumented {
            generate_profiles(exec, opts, &last, &stage1, host)?;
        }
    }

    let prefix = if installed { opts.install.clone() } else { last };
    Ok(LlvmBuild { prefix, installed })
}

/// Kernel architectures the finished toolchain can be tested on.
pub fn kernel_archs(opts: &LlvmOptions, host: &HostArch) -> Vec<Arch> {
    profile_archs(&opts.targets, host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::version::{CompilerFamily, CompilerVersion};
    use tempfile::TempDir;

    fn opts() -> LlvmOptions {
        LlvmOptions {
            source: PathBuf::from("/w/llvm-project"),
            build: PathBuf::from("/w/build/llvm"),
            install: PathBuf::from("/w/install"),
            projects: vec!["clang".into(), "lld".into()],
            targets: vec!["AArch64".into(), "X86".into()],
            build_type: BuildType::Release,
            assertions: false,
            lto: None,
            pgo: false,
            march: None,
            clang_vendor: None,
            ccache: false,
            check_targets: Vec::new(),
            stage1_only: false,
            install_stage1_only: false,
            incremental: false,
            profile_kernel: None,
        }
    }

    fn host_tools() -> CmakeTools {
        CmakeTools {
            cc: PathBuf::from("/usr/bin/clang"),
            cxx: PathBuf::from("/usr/bin/clang++"),
            ld: Some(PathBuf::from("/usr/bin/ld.lld")),
            ..CmakeTools::default()
        }
    }

    #[test]
    fn test_stage_plans() {
        let mut o = opts();
        let kinds = |o: &LlvmOptions| -> Vec<(u8, StageKind, bool)> {
            plan_stages(o).iter().map(|s| (s.number, s.kind, s.install)).collect()
        };
        assert_eq!(
            kinds(&o),
            [(1, StageKind::Bootstrap, false), (2, StageKind::Final, true)]
        );

        o.pgo = true;
        assert_eq!(
            kinds(&o),
            [
                (1, StageKind::Bootstrap, false),
                (2, StageKind::Instrumented, false),
                (3, StageKind::Final, true)
            ]
        );

        o.stage1_only = true;
        assert_eq!(kinds(&o), [(1, StageKind::Final, false)]);
        o.install_stage1_only = true;
        assert_eq!(kinds(&o), [(1, StageKind::Final, true)]);
    }

    #[test]
    fn test_bootstrap_defines() {
        let o = opts();
        let stage = plan_stages(&o)[0];
        let d = cmake_defines(stage, &o, &host_tools(), true);

        assert_eq!(d["LLVM_ENABLE_PROJECTS"], "clang;lld");
        assert_eq!(d["LLVM_TARGETS_TO_BUILD"], "host");
        assert_eq!(d["CMAKE_BUILD_TYPE"], "Release");
        assert_eq!(d["LLVM_USE_LINKER"], "/usr/bin/ld.lld");
        assert_eq!(d["CMAKE_C_COMPILER_LAUNCHER"], "ccache");
        assert_eq!(d["LLVM_INCLUDE_TESTS"], "OFF");
        assert!(!d.contains_key("CMAKE_INSTALL_PREFIX"));
        assert!(!d.contains_key("CMAKE_AR"));
    }

    #[test]
    fn test_final_stage_defines() {
        let mut o = opts();
        o.pgo = true;
        o.lto = Some(Lto::Thin);
        o.assertions = true;
        o.march = Some("native".into());
        o.clang_vendor = Some("tc".into());
        let stage = *plan_stages(&o).last().unwrap();
        let stage1 = StageTools::new(Path::new("/w/build/llvm/stage1/bin"));
        let d = cmake_defines(stage, &o, &CmakeTools::from(&stage1), true);

        assert_eq!(d["CMAKE_C_COMPILER"], "/w/build/llvm/stage1/bin/clang");
        assert_eq!(d["LLVM_TABLEGEN"], "/w/build/llvm/stage1/bin/llvm-tblgen");
        assert_eq!(d["LLVM_ENABLE_PROJECTS"], "clang;lld");
        assert_eq!(d["LLVM_TARGETS_TO_BUILD"], "AArch64;X86");
        assert_eq!(d["LLVM_PROFDATA_FILE"], "/w/build/llvm/profdata.prof");
        assert_eq!(d["LLVM_ENABLE_LTO"], "Thin");
        assert_eq!(d["LLVM_ENABLE_ASSERTIONS"], "ON");
        assert_eq!(d["CMAKE_INSTALL_PREFIX"], "/w/install");
        assert_eq!(d["CMAKE_CXX_FLAGS"], "-march=native -mtune=native");
        assert_eq!(d["CLANG_VENDOR"], "tc");
        // ccache only ever wraps the host compiler.
        assert!(!d.contains_key("CMAKE_C_COMPILER_LAUNCHER"));
    }

    #[test]
    fn test_instrumented_stage_defines() {
        let mut o = opts();
        o.pgo = true;
        let stage = plan_stages(&o)[1];
        let d = cmake_defines(stage, &o, &host_tools(), false);
        assert_eq!(d["LLVM_BUILD_INSTRUMENTED"], "IR");
        assert_eq!(d["LLVM_BUILD_RUNTIME"], "OFF");
        assert!(!d.contains_key("LLVM_PROFDATA_FILE"));

        let bootstrap = cmake_defines(plan_stages(&o)[0], &o, &host_tools(), false);
        assert_eq!(bootstrap["LLVM_ENABLE_PROJECTS"], "clang;lld;compiler-rt");
        assert_eq!(bootstrap["COMPILER_RT_BUILD_SANITIZERS"], "OFF");
    }

    #[test]
    fn test_all_targets_from_cmake() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("llvm")).unwrap();
        fs::write(
            tmp.path().join("llvm/CMakeLists.txt"),
            "project(LLVM)\nset(LLVM_ALL_TARGETS\n  AArch64\n  ARM\n  LoongArch\n  X86\n  )\n",
        )
        .unwrap();

        let all = all_targets(tmp.path()).unwrap();
        assert_eq!(all, ["AArch64", "ARM", "LoongArch", "X86"]);
        assert!(default_targets(&all).contains(&"LoongArch".to_string()));

        validate_targets(&["X86".into(), "host".into()], &all).unwrap();
        let err = validate_targets(&["X68".into()], &all).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_profile_archs_skip_backends_without_kernels() {
        let host = HostArch::from_machine("x86_64");
        let targets = vec!["BPF".to_string(), "X86".to_string(), "host".to_string()];
        assert_eq!(profile_archs(&targets, &host), [Arch::X86]);
    }

    #[test]
    fn test_dry_run_two_stage_build() {
        let tmp = TempDir::new().unwrap();
        let mut o = opts();
        o.build = tmp.path().join("build/llvm");
        o.install = tmp.path().join("install");
        o.check_targets = vec!["clang".into()];
        let tools = HostTools {
            cc: PathBuf::from("/usr/bin/clang"),
            cxx: PathBuf::from("/usr/bin/clang++"),
            family: CompilerFamily::Clang,
            version: CompilerVersion::new(18, 1, 8),
            ld: None,
            ar: None,
            ranlib: None,
        };

        fs::create_dir_all(o.build.join("stage1/bin")).unwrap();
        fs::write(o.build.join("stage1/bin/clang"), "").unwrap();

        let mut exec = Exec::new(false, true);
        let result = build(&mut exec, &o, &tools, &HostArch::from_machine("x86_64")).unwrap();
        assert!(result.installed);
        assert_eq!(result.prefix, o.install);
        assert!(o.build.join("stage1/bin/clang").exists());
        assert!(!o.build.join(".gitignore").exists());
        assert!(!o.install.exists());

        let history = exec.history();
        assert!(history[0].starts_with("cmake -G Ninja -Wno-dev -S /w/llvm-project/llvm -B "));
        assert!(history[0].contains("-DCMAKE_C_COMPILER=/usr/bin/clang "));
        assert!(history[2].contains("stage1/bin/clang "));
        assert!(history.iter().any(|l| l.ends_with(" check-clang")));
        assert!(history.last().unwrap().ends_with(" install"));
    }
}
