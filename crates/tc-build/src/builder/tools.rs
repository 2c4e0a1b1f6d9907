//! Host compiler and linker discovery.
//!
//! Explicit `CC`/`CXX`/`LD` values win over detection. Every tool is
//! resolved to a path up front so the build systems we drive never have to
//! rely on search path order to find the same binaries we probed.

use super::error::Error;
use super::exec::Exec;
use super::version::{CompilerFamily, CompilerVersion};
use anyhow::{Context, Result};
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Newest `clang-<N>` to look for; older majors are tried down to 7.
const NEWEST_CLANG_MAJOR: u32 = 21;

/// Linkers tried for clang, fastest first.
const LINKER_PREFERENCE: &[&str] = &["lld", "gold", "bfd"];

const LINK_PROBE: &str = "int main(void) { return 0; }\n";

/// User supplied tool overrides, normally `CC`, `CXX` and `LD`.
#[derive(Clone, Debug, Default)]
pub struct ToolOverrides {
    pub cc: Option<OsString>,
    pub cxx: Option<OsString>,
    pub ld: Option<OsString>,
}

impl ToolOverrides {
    pub fn from_env() -> Self {
        let get = |key| env::var_os(key).filter(|v| !v.is_empty());
        Self {
            cc: get("CC"),
            cxx: get("CXX"),
            ld: get("LD"),
        }
    }
}

/// Tools of the host used to compile the first stage.
#[derive(Clone, Debug)]
pub struct HostTools {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub family: CompilerFamily,
    pub version: CompilerVersion,
    /// `None` leaves the choice to the build system.
    pub ld: Option<PathBuf>,
    pub ar: Option<PathBuf>,
    pub ranlib: Option<PathBuf>,
}

impl HostTools {
    pub fn probe(exec: &mut Exec, overrides: &ToolOverrides) -> Result<Self> {
        let cc = find_cc(overrides.cc.as_deref())?;
        let family = CompilerFamily::of(&cc);
        let cxx = find_cxx(&cc, family, overrides.cxx.as_deref())?;
        let ld = find_ld(exec, &cc, family, overrides.ld.as_deref());
        let version = CompilerVersion::probe(exec, &cc, family)?;

        // GNU ar and ranlib are the defaults, only swap them in next to clang
        let sibling = |name: &str| {
            let path = cc.with_file_name(name);
            (family == CompilerFamily::Clang && path.exists()).then_some(path)
        };
        let ar = sibling("llvm-ar");
        let ranlib = sibling("llvm-ranlib");

        Ok(Self {
            ar,
            ranlib,
            cc,
            cxx,
            family,
            version,
            ld,
        })
    }

    pub fn show(&self) {
        log::info!("CC: {} ({})", self.cc.display(), self.version);
        log::info!("CXX: {}", self.cxx.display());
        match &self.ld {
            Some(ld) => log::info!("LD: {}", ld.display()),
            None => log::info!("LD: (build system default)"),
        }
    }
}

/// Binaries of a finished LLVM stage, used to build the next one.
#[derive(Clone, Debug)]
pub struct StageTools {
    pub ar: PathBuf,
    pub cc: PathBuf,
    pub clang_tblgen: PathBuf,
    pub cxx: PathBuf,
    pub ld: PathBuf,
    pub llvm_profdata: PathBuf,
    pub llvm_tblgen: PathBuf,
    pub ranlib: PathBuf,
}

impl StageTools {
    pub fn new(bin: &Path) -> Self {
        Self {
            ar: bin.join("llvm-ar"),
            cc: bin.join("clang"),
            clang_tblgen: bin.join("clang-tblgen"),
            cxx: bin.join("clang++"),
            ld: bin.join("ld.lld"),
            llvm_profdata: bin.join("llvm-profdata"),
            llvm_tblgen: bin.join("llvm-tblgen"),
            ranlib: bin.join("llvm-ranlib"),
        }
    }
}

fn find_cc(requested: Option<&OsStr>) -> Result<PathBuf> {
    let cc = if let Some(cc) = requested {
        which::which(cc).with_context(|| {
            format!(
                "CC value ('{}') could not be found on your system",
                cc.to_string_lossy()
            )
        })?
    } else {
        let versioned = (7..=NEWEST_CLANG_MAJOR).rev().map(|n| format!("clang-{n}"));
        versioned
            .chain(["clang".to_string(), "gcc".to_string()])
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| Error::MissingTool {
                tool: "clang or gcc".into(),
            })?
    };

    // Distribution packages symlink clang-N into /usr/bin; the real binary
    // sits next to its clang++ and ld.lld.
    cc.canonicalize()
        .with_context(|| format!("Resolving {}", cc.display()))
}

fn find_cxx(cc: &Path, family: CompilerFamily, requested: Option<&OsStr>) -> Result<PathBuf> {
    if let Some(cxx) = requested {
        return which::which(cxx).with_context(|| {
            format!(
                "CXX value ('{}') could not be found on your system",
                cxx.to_string_lossy()
            )
        });
    }

    let name = match family {
        CompilerFamily::Clang => "clang++",
        CompilerFamily::Gcc => "g++",
    };
    which_near(name, cc).ok_or_else(|| Error::MissingTool { tool: name.into() }.into())
}

fn find_ld(
    exec: &mut Exec,
    cc: &Path,
    family: CompilerFamily,
    requested: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(ld) = requested {
        let ld = PathBuf::from(ld);
        if validate_ld(exec, cc, &ld) {
            return Some(ld);
        }
        log::warn!(
            "LD value ('{}') is not supported by CC ('{}'), ignoring it...",
            ld.display(),
            cc.display()
        );
        return None;
    }

    match family {
        CompilerFamily::Clang => LINKER_PREFERENCE
            .iter()
            .filter_map(|linker| which_near(&format!("ld.{linker}"), cc))
            .find(|ld| validate_ld(exec, cc, ld)),
        // GNU ld is the default for GCC; gold is the only upgrade worth testing.
        CompilerFamily::Gcc => {
            let gold = PathBuf::from("gold");
            validate_ld(exec, cc, &gold).then_some(gold)
        }
    }
}

/// Look for `name` in the directory of `cc` first, then on the search path.
fn which_near(name: &str, cc: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = cc.parent().map(Path::to_path_buf).into_iter().collect();
    dirs.extend(env::split_paths(&env::var_os("PATH").unwrap_or_default()));
    let search = env::join_paths(dirs).ok()?;
    let cwd = env::current_dir().ok()?;
    which::which_in(name, Some(search), cwd).ok()
}

/// Compile and link a trivial program with `-fuse-ld=<ld>`.
pub fn validate_ld(exec: &mut Exec, cc: &Path, ld: &Path) -> bool {
    let mut cmd = Command::new(cc);
    let mut fuse = OsString::from("-fuse-ld=");
    fuse.push(ld);
    cmd.arg(fuse).args(["-o", "/dev/null", "-x", "c", "-"]);
    exec.succeeds(cmd, Some(LINK_PROBE))
}

/// Whether `clang` can produce objects for the host at all. A toolchain
/// configured without the host backend cannot build host programs.
pub fn can_compile_for_host(exec: &mut Exec, clang: &Path) -> bool {
    let mut cmd = Command::new(clang);
    cmd.args(["-x", "c", "-c", "-o", "/dev/null", "/dev/null"]);
    exec.succeeds(cmd, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_tools_layout() {
        let tools = StageTools::new(Path::new("/b/stage1/bin"));
        assert_eq!(tools.cc, PathBuf::from("/b/stage1/bin/clang"));
        assert_eq!(tools.cxx, PathBuf::from("/b/stage1/bin/clang++"));
        assert_eq!(tools.ld, PathBuf::from("/b/stage1/bin/ld.lld"));
        assert_eq!(tools.llvm_profdata, PathBuf::from("/b/stage1/bin/llvm-profdata"));
    }

    #[test]
    fn test_missing_cc_override_is_reported() {
        let err = find_cc(Some(OsStr::new("no-such-compiler-anywhere"))).unwrap_err();
        assert!(format!("{err:#}").contains("no-such-compiler-anywhere"));
    }

    #[cfg(unix)]
    #[test]
    fn test_which_near_prefers_compiler_directory() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let cc = tmp.path().join("clang");
        let cxx = tmp.path().join("clang++");
        for path in [&cc, &cxx] {
            std::fs::write(path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        assert_eq!(which_near("clang++", &cc), Some(cxx));
    }

    #[cfg(unix)]
    #[test]
    fn test_bogus_linker_fails_validation() {
        let mut exec = Exec::default();
        // A compiler that does not exist can never link.
        assert!(!validate_ld(
            &mut exec,
            Path::new("/nonexistent/clang"),
            Path::new("lld")
        ));
        assert_eq!(exec.history().len(), 1);
    }
}
