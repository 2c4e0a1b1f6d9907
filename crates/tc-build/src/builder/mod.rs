//! Toolchain build system.
//!
//! Structure:
//! - `deps`, `tools`, `version` - pre-flight checks and host compiler probing
//! - `source/` - LLVM checkout, binutils and Linux tarballs, patches
//! - `targets` - kernel target table and resolution
//! - `llvm`, `binutils`, `kernel` - the build invokers
//! - `report` - headers, install instructions, provenance
//! - `exec` - every child process goes through here

pub mod binutils;
pub mod deps;
pub mod error;
pub mod exec;
pub mod host;
pub mod kernel;
pub mod llvm;
pub mod logger;
pub mod report;
pub mod source;
pub mod targets;
pub mod tools;
pub mod version;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use exec::Exec;
use host::HostArch;
use kernel::{KernelOptions, KernelOutcome, LinuxSource, Toolchain};
use llvm::{BuildType, LlvmOptions, Lto};
use report::Provenance;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;
use targets::Arch;
use tools::{HostTools, ToolOverrides};
use version::{CompilerVersion, LinuxVersion};

/// Build commands for the CLI.
#[derive(Subcommand)]
pub enum BuildCommands {
    /// Build an LLVM toolchain, optionally testing it against kernels
    Toolchain(ToolchainArgs),
    /// Build GNU binutils for kernel targets
    Binutils(BinutilsArgs),
    /// Build Linux kernels with an existing toolchain
    Kernel(KernelArgs),
    /// Print the kernel builds a set of targets resolves to
    Resolve(ResolveArgs),
    /// Check that the tools needed for a build are installed
    Deps,
    /// Show cache status of fetched sources
    Sources,
    /// Remove build folders
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ToolchainArgs {
    /// LLVM branch, tag or commit to build
    #[arg(short, long, default_value = "main")]
    pub branch: String,
    /// Check out a known good LLVM revision instead of a branch
    #[arg(long, conflicts_with_all = ["branch", "shallow_clone"])]
    pub use_good_revision: bool,
    /// Where build files are stored (default: ./build)
    #[arg(short = 'B', long)]
    pub build_folder: Option<PathBuf>,
    /// Where the finished toolchain is installed (default: ./install)
    #[arg(short = 'I', long)]
    pub install_folder: Option<PathBuf>,
    /// Keep existing build folders
    #[arg(short, long)]
    pub incremental: bool,
    /// Use the LLVM checkout as is
    #[arg(short, long)]
    pub no_update: bool,
    /// Clone with --depth=1
    #[arg(short, long)]
    pub shallow_clone: bool,
    /// LLVM backends, separated by ';' (e.g. "X86;ARM")
    #[arg(short, long)]
    pub targets: Option<String>,
    /// LLVM projects, separated by ';'
    #[arg(short, long)]
    pub projects: Option<String>,
    #[arg(long, value_enum, default_value_t = BuildType::Release)]
    pub build_type: BuildType,
    /// Build with assertions enabled
    #[arg(long)]
    pub assertions: bool,
    #[arg(long, value_enum)]
    pub lto: Option<Lto>,
    /// Profile the final stage with kernel builds
    #[arg(long)]
    pub pgo: bool,
    /// Pass -march and -mtune to the host compiler
    #[arg(short, long)]
    pub march: Option<String>,
    /// CLANG_VENDOR for the final stage
    #[arg(long)]
    pub clang_vendor: Option<String>,
    /// Do not use ccache for the bootstrap stage
    #[arg(long)]
    pub no_ccache: bool,
    /// Run `ninja check-<target>` after the final stage
    #[arg(long, num_args = 1..)]
    pub check_targets: Vec<String>,
    /// Only build the bootstrap stage
    #[arg(long)]
    pub build_stage1_only: bool,
    /// Install the bootstrap stage when it is the only one
    #[arg(long)]
    pub install_stage1_only: bool,
    /// Build defconfig kernels with the finished toolchain
    #[arg(long)]
    pub test_kernels: bool,
    /// Linux release used for profiling and test kernels
    #[arg(long, default_value = source::LINUX_VERSION)]
    pub linux_version: String,
}

#[derive(Args, Debug)]
pub struct BinutilsArgs {
    /// `all`, `host`, short names (`arm`) or triples
    #[arg(short, long, num_args = 1.., default_value = "all")]
    pub targets: Vec<String>,
    #[arg(short = 'B', long)]
    pub build_folder: Option<PathBuf>,
    #[arg(short = 'I', long)]
    pub install_folder: Option<PathBuf>,
    #[arg(short, long)]
    pub march: Option<String>,
    #[arg(long, default_value = source::BINUTILS_VERSION)]
    pub binutils_version: String,
}

#[derive(Args, Debug)]
pub struct KernelArgs {
    /// Kernel architectures, separated by ';' or ','
    #[arg(short, long, default_value = "all")]
    pub targets: String,
    /// Install prefix of the clang toolchain (default: ./install)
    #[arg(long)]
    pub toolchain: Option<PathBuf>,
    /// Existing Linux tree instead of a downloaded release
    #[arg(long, conflicts_with = "linux_version")]
    pub linux_src: Option<PathBuf>,
    #[arg(long)]
    pub linux_version: Option<String>,
    /// Patch to apply to the tree, can be repeated
    #[arg(long = "patch")]
    pub patches: Vec<PathBuf>,
    /// Configuration target, can be repeated
    #[arg(long, default_value = "defconfig")]
    pub config_target: Vec<String>,
    #[arg(short = 'B', long)]
    pub build_folder: Option<PathBuf>,
    /// Where binutils are found or installed (default: ./install)
    #[arg(short = 'I', long)]
    pub install_folder: Option<PathBuf>,
    /// Never build missing binutils
    #[arg(long)]
    pub no_binutils: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[arg(short, long, default_value = "all")]
    pub targets: String,
    /// `15.0.3` or canonical `150003`
    #[arg(long)]
    pub clang_version: CompilerVersion,
    /// Machine name of the host (default: this machine)
    #[arg(long)]
    pub host_arch: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[arg(short = 'B', long)]
    pub build_folder: Option<PathBuf>,
    /// Also remove fetched sources
    #[arg(long)]
    pub sources: bool,
}

/// Folders shared by the commands.
struct Folders {
    root: PathBuf,
    build: PathBuf,
    install: PathBuf,
}

impl Folders {
    fn new(build: Option<&Path>, install: Option<&Path>) -> Result<Self> {
        let root = env::current_dir().context("Reading the current directory")?;
        Ok(Self {
            build: absolute(build.unwrap_or(&root.join("build")))?,
            install: absolute(install.unwrap_or(&root.join("install")))?,
            root,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Resolving {}", path.display()))
}

fn ci() -> bool {
    deps::is_ci(env::var("GITHUB_ACTIONS").ok().as_deref())
}

fn split_list(text: &str) -> Vec<String> {
    text.split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn compiler_name(tools: &HostTools) -> String {
    format!("{} {}", tools.cc.display(), tools.version)
}

fn linux_source(root: &Path, src: Option<&Path>, version: &str, patches: &[PathBuf]) -> Result<LinuxSource> {
    let patches = patches.iter().map(|p| absolute(p)).collect::<Result<Vec<_>>>()?;
    Ok(match src {
        Some(location) => LinuxSource {
            location: absolute(location)?,
            tarball: None,
            patches,
        },
        None => LinuxSource {
            location: source::linux_dir(root, version),
            tarball: Some(source::linux_tarball(root, version)),
            patches,
        },
    })
}

/// Version of the prepared tree. A dry run may not have one yet.
fn linux_version(exec: &mut Exec, linux: &LinuxSource, requested: Option<&str>) -> Result<LinuxVersion> {
    match requested {
        Some(version) if exec.dry_run() && !linux.location.exists() => version.parse(),
        _ => linux.version(exec),
    }
}

/// Kernel builds to run with an existing toolchain.
struct KernelRun<'a> {
    folders: &'a Folders,
    host: &'a HostArch,
    linux: &'a LinuxSource,
    /// Release the tree will be, when it is fetched by us.
    requested_version: Option<&'a str>,
    prefix: &'a Path,
    archs: &'a [Arch],
    config_targets: &'a [String],
    build_binutils: bool,
    overrides: &'a ToolOverrides,
}

/// Build the `binutils` triples that are neither installed nor on `PATH`.
fn ensure_binutils(exec: &mut Exec, run: &KernelRun, triples: &[&str]) -> Result<()> {
    let (folders, host) = (run.folders, run.host);
    let lookup: &Exec = exec;
    let missing: Vec<&binutils::BinutilsTarget> = triples
        .iter()
        .filter(|t| !binutils::available(lookup, &folders.install, t, host))
        .filter_map(|t| {
            let found = binutils::find(t);
            if found.is_none() {
                log::warn!("No binutils recipe for {t}");
            }
            found
        })
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    deps::check(exec, deps::BINUTILS, ci())?;
    let host_tools = HostTools::probe(exec, run.overrides)?;
    let dir = source::binutils_dir(&folders.root, source::BINUTILS_VERSION);
    source::binutils_tarball(&folders.root, source::BINUTILS_VERSION).prepare(exec, &dir)?;

    let opts = binutils::BinutilsOptions::new(
        dir,
        folders.build.join("binutils"),
        folders.install.clone(),
        &host_tools,
    );
    binutils::build_all(exec, &missing, &opts, host)
}

/// Prepare the Linux tree and build it for every requested architecture.
fn run_kernels(exec: &mut Exec, run: &KernelRun) -> Result<()> {
    if exec.dry_run() && !run.prefix.join("bin/clang").exists() {
        log::info!("Dry run: no toolchain in {}, skipping kernel builds", run.prefix.display());
        return Ok(());
    }

    deps::check(exec, deps::KERNEL, ci())?;
    run.linux.prepare(exec)?;
    let version = linux_version(exec, run.linux, run.requested_version)?;
    let toolchain = Toolchain::probe(exec, run.prefix)?;
    log::info!("Building Linux {version} with clang {}", toolchain.version);

    let plan = kernel::plan(run.archs, toolchain.version, run.host, run.config_targets, version);
    if run.build_binutils {
        ensure_binutils(exec, run, &kernel::binutils_triples(&plan))?;
    }
    exec.prepend_path(run.folders.install.join("bin"));

    let opts = KernelOptions {
        source: run.linux.location.clone(),
        build: run.folders.build.join("linux"),
    };
    let start = Instant::now();
    let outcomes = kernel::build_all(exec, &plan, &toolchain, &opts, version)?;

    report::header("Kernel build summary");
    for (name, outcome) in &outcomes {
        match outcome {
            KernelOutcome::Built => println!("  [built]   {name}"),
            KernelOutcome::Skipped(reason) => println!("  [skipped] {name}: {reason}"),
        }
    }
    println!("\nTotal duration: {}", report::duration(start.elapsed()));
    Ok(())
}

/// Fetch LLVM, build every stage, install and optionally test it.
pub fn toolchain(exec: &mut Exec, args: &ToolchainArgs) -> Result<()> {
    let start = Instant::now();
    let folders = Folders::new(args.build_folder.as_deref(), args.install_folder.as_deref())?;
    let host = HostArch::detect();

    deps::check(exec, deps::TOOLCHAIN, ci())?;
    let overrides = ToolOverrides::from_env();
    let host_tools = HostTools::probe(exec, &overrides)?;
    host_tools.show();

    let git_ref = if args.use_good_revision {
        source::LLVM_GOOD_REVISION
    } else {
        args.branch.as_str()
    };
    let llvm_src = source::git::llvm(&folders.root);
    llvm_src.sync(exec, git_ref, !args.no_update, args.shallow_clone)?;

    let available = if exec.dry_run() && !llvm_src.repo.exists() {
        llvm::DEFAULT_TARGETS.iter().map(|t| (*t).to_string()).collect()
    } else {
        llvm::all_targets(&llvm_src.repo)?
    };
    let targets = match &args.targets {
        Some(text) => split_list(text),
        None => llvm::default_targets(&available),
    };
    llvm::validate_targets(&targets, &available)?;
    let projects = match &args.projects {
        Some(text) => split_list(text),
        None => llvm::DEFAULT_PROJECTS.iter().map(|p| (*p).to_string()).collect(),
    };

    let profile_kernel = if args.pgo {
        Some(linux_source(&folders.root, None, &args.linux_version, &[])?)
    } else {
        None
    };
    let opts = LlvmOptions {
        source: llvm_src.repo.clone(),
        build: folders.build.join("llvm"),
        install: folders.install.clone(),
        projects,
        targets,
        build_type: args.build_type,
        assertions: args.assertions,
        lto: args.lto,
        pgo: args.pgo,
        march: args.march.clone(),
        clang_vendor: args.clang_vendor.clone(),
        ccache: !args.no_ccache,
        check_targets: args.check_targets.clone(),
        stage1_only: args.build_stage1_only,
        install_stage1_only: args.install_stage1_only,
        incremental: args.incremental,
        profile_kernel,
    };

    let built = llvm::build(exec, &opts, &host_tools, &host)?;
    log::info!("LLVM build duration: {}", report::duration(start.elapsed()));

    if args.test_kernels {
        let linux = linux_source(&folders.root, None, &args.linux_version, &[])?;
        let run = KernelRun {
            folders: &folders,
            host: &host,
            linux: &linux,
            requested_version: Some(args.linux_version.as_str()),
            prefix: &built.prefix,
            archs: &llvm::kernel_archs(&opts, &host),
            config_targets: &["defconfig".to_string()],
            build_binutils: true,
            overrides: &overrides,
        };
        run_kernels(exec, &run)?;
    }

    if built.installed {
        report::show_install_info(exec, &built.prefix, &["clang".to_string(), "ld.lld".to_string()])?;
        if !exec.dry_run() {
            let revision = llvm_src.head(exec).unwrap_or_else(|| git_ref.to_string());
            let provenance = Provenance::new(
                revision,
                host.to_string(),
                compiler_name(&host_tools),
                opts.targets.clone(),
            );
            report::write_provenance(&built.prefix, "llvm", &provenance)?;
        }
    } else {
        log::info!("Toolchain left in {}", built.prefix.display());
    }

    println!("\nScript duration: {}", report::duration(start.elapsed()));
    Ok(())
}

/// Fetch and build binutils for the requested targets.
pub fn binutils(exec: &mut Exec, args: &BinutilsArgs) -> Result<()> {
    let start = Instant::now();
    let folders = Folders::new(args.build_folder.as_deref(), args.install_folder.as_deref())?;
    let host = HostArch::detect();

    deps::check(exec, deps::BINUTILS, ci())?;
    let host_tools = HostTools::probe(exec, &ToolOverrides::from_env())?;
    host_tools.show();

    let dir = source::binutils_dir(&folders.root, &args.binutils_version);
    source::binutils_tarball(&folders.root, &args.binutils_version).prepare(exec, &dir)?;

    let targets = binutils::parse_targets(&args.targets, &host, &dir)?;
    let mut opts = binutils::BinutilsOptions::new(
        dir,
        folders.build.join("binutils"),
        folders.install.clone(),
        &host_tools,
    );
    opts.march.clone_from(&args.march);
    binutils::build_all(exec, &targets, &opts, &host)?;

    let tools: Vec<String> = targets
        .iter()
        .map(|t| format!("{}as", binutils::program_prefix(t.triple, &host)))
        .collect();
    report::show_install_info(exec, &folders.install, &tools)?;
    if !exec.dry_run() {
        let provenance = Provenance::new(
            args.binutils_version.clone(),
            host.to_string(),
            compiler_name(&host_tools),
            targets.iter().map(|t| t.triple.to_string()).collect(),
        );
        report::write_provenance(&folders.install, "binutils", &provenance)?;
    }

    println!("\nScript duration: {}", report::duration(start.elapsed()));
    Ok(())
}

/// Build kernels with an existing toolchain.
pub fn kernel(exec: &mut Exec, args: &KernelArgs) -> Result<()> {
    for config_target in &args.config_target {
        targets::validate_config_target(config_target)?;
    }
    let folders = Folders::new(args.build_folder.as_deref(), args.install_folder.as_deref())?;
    let host = HostArch::detect();
    let archs = targets::parse_list(&args.targets, &host)?;

    let requested = args.linux_version.as_deref().unwrap_or(source::LINUX_VERSION);
    let linux = linux_source(&folders.root, args.linux_src.as_deref(), requested, &args.patches)?;
    let prefix = match &args.toolchain {
        Some(prefix) => absolute(prefix)?,
        None => folders.install.clone(),
    };

    let run = KernelRun {
        folders: &folders,
        host: &host,
        linux: &linux,
        requested_version: args.linux_src.is_none().then_some(requested),
        prefix: &prefix,
        archs: &archs,
        config_targets: &args.config_target,
        build_binutils: !args.no_binutils,
        overrides: &ToolOverrides::from_env(),
    };
    run_kernels(exec, &run)
}

/// Print the builds `args.targets` resolves to.
pub fn resolve(args: &ResolveArgs) -> Result<()> {
    let host = match &args.host_arch {
        Some(machine) => HostArch::from_machine(machine),
        None => HostArch::detect(),
    };
    let archs = targets::parse_list(&args.targets, &host)?;
    let specs: Vec<targets::TargetSpec> = archs
        .iter()
        .flat_map(|&arch| targets::resolve(arch, args.clang_version, &host))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("Targets for clang {} on {host}:\n", args.clang_version);
    for arch in &archs {
        println!("  {arch}: {}", targets::triples(*arch).join(", "));
    }
    println!();
    for spec in &specs {
        println!(
            "  {:<10} ARCH={:<10} {:<8} {}",
            spec.name,
            spec.kernel_arch,
            spec.config_targets.join(" "),
            spec.triple
        );
        println!(
            "  {:<10} integrated-as={} binutils={} CROSS_COMPILE={}",
            "",
            spec.integrated_as,
            spec.needs_binutils,
            spec.cross_compile.as_deref().unwrap_or("(none)")
        );
    }
    Ok(())
}

/// Check every tool any command needs.
pub fn check_deps(exec: &mut Exec) -> Result<()> {
    report::header("Checking dependencies");
    let mut all: Vec<&str> = Vec::new();
    for tool in deps::TOOLCHAIN.iter().chain(deps::BINUTILS).chain(deps::KERNEL) {
        if !all.contains(tool) {
            all.push(*tool);
        }
    }
    deps::check(exec, &all, ci())?;
    HostTools::probe(exec, &ToolOverrides::from_env())?.show();
    Ok(())
}

pub fn sources() -> Result<()> {
    let root = env::current_dir().context("Reading the current directory")?;
    source::status(&root)
}

pub fn clean(exec: &Exec, args: &CleanArgs) -> Result<()> {
    let folders = Folders::new(args.build_folder.as_deref(), None)?;
    source::clean(exec, &folders.root, &folders.build, args.sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: BuildCommands,
    }

    fn parse(args: &[&str]) -> BuildCommands {
        TestCli::try_parse_from(std::iter::once("tc-build").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("X86;ARM"), ["X86", "ARM"]);
        assert_eq!(split_list(" AArch64 , RISCV;"), ["AArch64", "RISCV"]);
        assert!(split_list(";;").is_empty());
    }

    #[test]
    fn test_toolchain_flags() {
        let BuildCommands::Toolchain(args) = parse(&[
            "toolchain",
            "-t",
            "X86;ARM",
            "--lto",
            "thin",
            "--build-type",
            "RelWithDebInfo",
            "--check-targets",
            "clang",
            "lld",
            "-n",
        ]) else {
            panic!("expected toolchain");
        };
        assert_eq!(args.targets.as_deref(), Some("X86;ARM"));
        assert_eq!(args.lto, Some(Lto::Thin));
        assert_eq!(args.build_type, BuildType::RelWithDebInfo);
        assert_eq!(args.check_targets, ["clang", "lld"]);
        assert!(args.no_update);
        assert_eq!(args.branch, "main");
        assert_eq!(args.linux_version, source::LINUX_VERSION);
    }

    #[test]
    fn test_kernel_flags() {
        let BuildCommands::Kernel(args) = parse(&[
            "kernel",
            "-t",
            "arm,x86",
            "--patch",
            "a.patch",
            "--patch",
            "b.patch",
            "--no-binutils",
        ]) else {
            panic!("expected kernel");
        };
        assert_eq!(args.patches, [PathBuf::from("a.patch"), PathBuf::from("b.patch")]);
        assert_eq!(args.config_target, ["defconfig"]);
        assert!(args.no_binutils);
    }

    #[test]
    fn test_linux_src_conflicts_with_version() {
        let res = TestCli::try_parse_from([
            "tc-build",
            "kernel",
            "--linux-src",
            "/tmp/linux",
            "--linux-version",
            "6.12",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_resolve_requires_a_valid_version() {
        let BuildCommands::Resolve(args) = parse(&["resolve", "--clang-version", "15.0.3"]) else {
            panic!("expected resolve");
        };
        assert_eq!(args.clang_version.canonical(), 150_003);
        assert!(TestCli::try_parse_from(["tc-build", "resolve", "--clang-version", "x.y"]).is_err());
    }

    #[test]
    fn test_explicit_linux_tree_has_no_tarball() {
        let linux = linux_source(
            Path::new("/w"),
            Some(Path::new("/src/linux")),
            "6.12",
            &[PathBuf::from("/p/fix.patch")],
        )
        .unwrap();
        assert!(linux.tarball.is_none());
        assert_eq!(linux.location, PathBuf::from("/src/linux"));
        assert_eq!(linux.patches, [PathBuf::from("/p/fix.patch")]);

        let fetched = linux_source(Path::new("/w"), None, "6.12", &[]).unwrap();
        assert!(fetched.tarball.is_some());
        assert_eq!(fetched.location, source::linux_dir(Path::new("/w"), "6.12"));
    }

    #[test]
    fn test_dry_run_uses_requested_linux_version() {
        let linux = linux_source(Path::new("/nonexistent-root"), None, "6.12", &[]).unwrap();
        let mut exec = Exec::new(false, true);
        let version = linux_version(&mut exec, &linux, Some("6.12")).unwrap();
        assert_eq!(version, LinuxVersion(6, 12, 0));
        assert!(exec.history().is_empty());
    }

    #[test]
    fn test_good_revision_flag() {
        let BuildCommands::Toolchain(args) = parse(&["toolchain", "--use-good-revision"]) else {
            panic!("expected toolchain");
        };
        assert!(args.use_good_revision);
        assert_eq!(source::LLVM_GOOD_REVISION.len(), 40);
        for conflicting in [["-b", "release/18.x"], ["-s", "--incremental"]] {
            let res = TestCli::try_parse_from(
                ["tc-build", "toolchain", "--use-good-revision"]
                    .into_iter()
                    .chain(conflicting),
            );
            assert!(res.is_err());
        }
    }

    #[test]
    fn test_unknown_config_target_is_rejected_up_front() {
        let BuildCommands::Kernel(args) =
            parse(&["kernel", "--config-target", "defconfig", "--config-target", "allmodconfg"])
        else {
            panic!("expected kernel");
        };
        let mut exec = Exec::new(false, true);
        let err = kernel(&mut exec, &args).unwrap_err();
        assert_eq!(error::exit_code(&err), error::EXIT_USAGE);
        assert!(exec.history().is_empty());
    }

    /// A workspace with a fake `install/bin/clang` that reports `version`.
    #[cfg(unix)]
    fn fake_toolchain(version: &str) -> (TempDir, Folders, ToolOverrides) {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let folders = Folders {
            root: tmp.path().to_path_buf(),
            build: tmp.path().join("build"),
            install: tmp.path().join("install"),
        };
        let clang = folders.install.join("bin/clang");
        fs::create_dir_all(clang.parent().unwrap()).unwrap();
        fs::write(&clang, format!("#!/bin/sh\ncat >/dev/null\necho {version}\n")).unwrap();
        fs::set_permissions(&clang, fs::Permissions::from_mode(0o755)).unwrap();

        let overrides = ToolOverrides {
            cc: Some(clang.clone().into_os_string()),
            cxx: Some(clang.into_os_string()),
            ld: None,
        };
        (tmp, folders, overrides)
    }

    #[cfg(unix)]
    fn dry_run_kernels(version: &str, arch: Arch) -> (Vec<String>, PathBuf) {
        let (_tmp, folders, overrides) = fake_toolchain(version);
        let host = HostArch::from_machine("x86_64");
        let linux = linux_source(&folders.root, None, "6.12", &[]).unwrap();
        let run = KernelRun {
            folders: &folders,
            host: &host,
            linux: &linux,
            requested_version: Some("6.12"),
            prefix: &folders.install,
            archs: &[arch],
            config_targets: &["defconfig".to_string()],
            build_binutils: true,
            overrides: &overrides,
        };

        let mut exec = Exec::new(false, true);
        run_kernels(&mut exec, &run).unwrap();
        assert!(!folders.build.exists());
        (exec.history().to_vec(), linux.location)
    }

    #[cfg(unix)]
    #[test]
    fn test_dry_run_builds_binutils_before_old_arm_kernels() {
        if which::which("arm-linux-gnueabi-elfedit").is_ok() {
            return;
        }
        let (history, linux) = dry_run_kernels("12 0 0", Arch::Arm);

        let make_linux = format!("make -C {} ", linux.display());
        let configure = history
            .iter()
            .position(|l| l.contains("/configure ") && l.contains(" --target=arm-linux-gnueabi "))
            .unwrap();
        let first_kernel = history.iter().position(|l| l.starts_with(&make_linux)).unwrap();
        assert!(configure < first_kernel);
        assert!(history[first_kernel].contains(" LLVM_IAS=0 "));
    }

    #[cfg(unix)]
    #[test]
    fn test_dry_run_x86_needs_no_binutils() {
        let (history, linux) = dry_run_kernels("15 0 0", Arch::X86);

        let make_linux = format!("make -C {} ", linux.display());
        assert!(!history.iter().any(|l| l.contains("/configure ")));
        assert_eq!(history.iter().filter(|l| l.starts_with(&make_linux)).count(), 1);
    }
}
