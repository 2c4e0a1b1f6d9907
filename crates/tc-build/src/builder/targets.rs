//! Per-architecture build policy.
//!
//! [`ARCHES`] is the single table that knows which kernel configurations,
//! triples and assembler choices go with each LLVM backend. Resolution is a
//! pure function of (architecture, compiler version, host architecture).

use super::error::Error;
use super::host::HostArch;
use super::version::{CompilerVersion, LinuxVersion};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// LLVM backend names accepted as architecture identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    AArch64,
    Arm,
    Hexagon,
    LoongArch,
    Mips,
    PowerPC,
    Riscv,
    SystemZ,
    X86,
}

impl Arch {
    pub const ALL: [Self; 9] = [
        Self::AArch64,
        Self::Arm,
        Self::Hexagon,
        Self::LoongArch,
        Self::Mips,
        Self::PowerPC,
        Self::Riscv,
        Self::SystemZ,
        Self::X86,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::AArch64 => "AArch64",
            Self::Arm => "ARM",
            Self::Hexagon => "Hexagon",
            Self::LoongArch => "LoongArch",
            Self::Mips => "Mips",
            Self::PowerPC => "PowerPC",
            Self::Riscv => "RISCV",
            Self::SystemZ => "SystemZ",
            Self::X86 => "X86",
        }
    }

    /// Backend covering the host, if we have kernels for it.
    pub fn of_host(host: &HostArch) -> Option<Self> {
        host.llvm_target().and_then(|id| id.parse().ok())
    }

    pub fn entry(self) -> &'static ArchEntry {
        // Every variant has a row; the table test keeps it that way.
        ARCHES
            .iter()
            .find(|e| e.arch == self)
            .unwrap_or(&ARCHES[0])
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|a| a.id()).collect();
                Error::usage(format!(
                    "unknown target '{s}', expected one of: all, host, {}",
                    known.join(", ")
                ))
            })
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Arch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

/// Can the kernel be assembled with clang's integrated assembler?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ias {
    Always,
    Never,
    /// From this compiler version on (inclusive).
    Since(CompilerVersion),
}

impl Ias {
    pub fn usable(self, version: CompilerVersion) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Since(min) => version >= min,
        }
    }
}

/// When a variant needs GNU binutils next to clang.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinutilsPolicy {
    /// Only as a replacement for the integrated assembler.
    WhenNoIas,
    Always,
    /// Below this compiler version, for tools LLVM could not replace yet.
    Below(CompilerVersion),
}

/// Exceptions to the plain table row, applied when the kernel is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quirk {
    /// Skip the build below this compiler version.
    MinCompiler(CompilerVersion),
    /// Skip the build when the compiler is older than `compiler` and the
    /// kernel is at least `linux`.
    MinCompilerFromLinux {
        compiler: CompilerVersion,
        linux: LinuxVersion,
    },
    /// Link with GNU ld below this compiler version.
    GnuLdBelow(CompilerVersion),
    /// Ask ld.lld and llvm-objcopy whether they handle s390 before the build.
    ProbeS390Tools,
}

/// One kernel build for an architecture.
#[derive(Clone, Copy, Debug)]
pub struct Variant {
    pub name: &'static str,
    pub kernel_arch: &'static str,
    pub triple: &'static str,
    pub config_targets: &'static [&'static str],
    pub ias: Ias,
    pub binutils: BinutilsPolicy,
    pub quirks: &'static [Quirk],
}

/// Table row for an architecture.
#[derive(Debug)]
pub struct ArchEntry {
    pub arch: Arch,
    /// Variants built for `defconfig`.
    pub variants: &'static [Variant],
    /// Variant used for `all*config` targets, if the architecture builds them.
    pub allconfig: Option<Variant>,
    /// Oldest kernel whose `all*config` builds with clang.
    pub allconfig_since: Option<LinuxVersion>,
}

const fn v(major: u32, minor: u32, patch: u32) -> CompilerVersion {
    CompilerVersion::new(major, minor, patch)
}

const AARCH64: Variant = Variant {
    name: "arm64",
    kernel_arch: "arm64",
    triple: "aarch64-linux-gnu",
    config_targets: &["defconfig"],
    ias: Ias::Always,
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[],
};

const ARM: Variant = Variant {
    name: "arm",
    kernel_arch: "arm",
    triple: "arm-linux-gnueabi",
    config_targets: &["defconfig"],
    ias: Ias::Since(v(13, 0, 0)),
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[],
};

const HEXAGON: Variant = Variant {
    name: "hexagon",
    kernel_arch: "hexagon",
    triple: "hexagon-linux-musl",
    config_targets: &["defconfig"],
    ias: Ias::Always,
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[],
};

const LOONGARCH: Variant = Variant {
    name: "loongarch",
    kernel_arch: "loongarch",
    triple: "loongarch64-linux-gnu",
    config_targets: &["defconfig"],
    ias: Ias::Always,
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[Quirk::MinCompiler(v(18, 0, 0))],
};

const PPC64: Variant = Variant {
    name: "ppc64",
    kernel_arch: "powerpc",
    triple: "powerpc64-linux-gnu",
    config_targets: &["ppc64_guest_defconfig", "disable-werror.config"],
    ias: Ias::Since(v(14, 0, 2)),
    binutils: BinutilsPolicy::Always,
    quirks: &[],
};

const RISCV: Variant = Variant {
    name: "riscv",
    kernel_arch: "riscv",
    triple: "riscv64-linux-gnu",
    config_targets: &["defconfig"],
    ias: Ias::Since(v(13, 0, 0)),
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[],
};

const S390: Variant = Variant {
    name: "s390",
    kernel_arch: "s390",
    triple: "s390x-linux-gnu",
    config_targets: &["defconfig"],
    ias: Ias::Always,
    binutils: BinutilsPolicy::Below(v(19, 0, 0)),
    quirks: &[Quirk::MinCompiler(v(15, 0, 0)), Quirk::ProbeS390Tools],
};

const X86_64: Variant = Variant {
    name: "x86_64",
    kernel_arch: "x86_64",
    triple: "x86_64-linux-gnu",
    config_targets: &["defconfig"],
    ias: Ias::Always,
    binutils: BinutilsPolicy::WhenNoIas,
    quirks: &[Quirk::MinCompilerFromLinux {
        compiler: v(15, 0, 0),
        linux: LinuxVersion(6, 15, 0),
    }],
};

pub static ARCHES: &[ArchEntry] = &[
    ArchEntry {
        arch: Arch::AArch64,
        variants: &[AARCH64],
        allconfig: Some(AARCH64),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::Arm,
        variants: &[
            Variant {
                name: "arm-v5",
                config_targets: &["multi_v5_defconfig"],
                ..ARM
            },
            Variant {
                name: "arm-v6",
                config_targets: &["aspeed_g5_defconfig"],
                quirks: &[Quirk::MinCompilerFromLinux {
                    compiler: v(14, 0, 0),
                    linux: LinuxVersion(6, 14, 0),
                }],
                ..ARM
            },
            Variant {
                name: "arm-v7",
                config_targets: &["multi_v7_defconfig"],
                ..ARM
            },
        ],
        allconfig: Some(ARM),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::Hexagon,
        variants: &[HEXAGON],
        allconfig: Some(HEXAGON),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::LoongArch,
        variants: &[LOONGARCH],
        allconfig: Some(LOONGARCH),
        allconfig_since: Some(LinuxVersion(6, 6, 8)),
    },
    ArchEntry {
        arch: Arch::Mips,
        variants: &[Variant {
            name: "mips",
            kernel_arch: "mips",
            triple: "mips-linux-gnu",
            config_targets: &["malta_defconfig"],
            ias: Ias::Always,
            binutils: BinutilsPolicy::WhenNoIas,
            quirks: &[],
        }],
        allconfig: None,
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::PowerPC,
        variants: &[
            Variant {
                name: "ppc32",
                kernel_arch: "powerpc",
                triple: "powerpc-linux-gnu",
                config_targets: &["pmac32_defconfig", "disable-werror.config"],
                ias: Ias::Never,
                binutils: BinutilsPolicy::WhenNoIas,
                quirks: &[],
            },
            PPC64,
            Variant {
                name: "ppc64le",
                triple: "powerpc64le-linux-gnu",
                config_targets: &["powernv_defconfig", "disable-werror.config"],
                quirks: &[Quirk::GnuLdBelow(v(12, 0, 0))],
                ..PPC64
            },
        ],
        allconfig: Some(PPC64),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::Riscv,
        variants: &[RISCV],
        allconfig: Some(RISCV),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::SystemZ,
        variants: &[S390],
        allconfig: Some(S390),
        allconfig_since: None,
    },
    ArchEntry {
        arch: Arch::X86,
        variants: &[X86_64],
        allconfig: Some(X86_64),
        allconfig_since: None,
    },
];

/// A resolved kernel build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TargetSpec {
    pub arch: Arch,
    pub name: &'static str,
    pub kernel_arch: &'static str,
    pub triple: &'static str,
    pub config_targets: Vec<String>,
    pub integrated_as: bool,
    pub needs_binutils: bool,
    /// `CROSS_COMPILE` prefix, absent when the triple matches the host.
    pub cross_compile: Option<String>,
    #[serde(skip)]
    pub quirks: &'static [Quirk],
}

impl TargetSpec {
    fn from_variant(arch: Arch, variant: &Variant, version: CompilerVersion, host: &HostArch) -> Self {
        let integrated_as = variant.ias.usable(version);
        let needs_binutils = match variant.binutils {
            BinutilsPolicy::WhenNoIas => !integrated_as,
            BinutilsPolicy::Always => true,
            BinutilsPolicy::Below(max) => version < max,
        };
        Self {
            arch,
            name: variant.name,
            kernel_arch: variant.kernel_arch,
            triple: variant.triple,
            config_targets: variant
                .config_targets
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
            integrated_as,
            needs_binutils,
            cross_compile: (!host.is_native(variant.triple)).then(|| format!("{}-", variant.triple)),
            quirks: variant.quirks,
        }
    }

    /// Prefix for GNU tools of this target, empty on the host.
    pub fn tool_prefix(&self) -> &str {
        self.cross_compile.as_deref().unwrap_or("")
    }

    /// Why this build cannot work with the given compiler and kernel.
    pub fn skip_reason(&self, version: CompilerVersion, linux: LinuxVersion) -> Option<String> {
        self.quirks.iter().find_map(|quirk| match *quirk {
            Quirk::MinCompiler(min) if version < min => Some(format!(
                "{} does not build with LLVM < {min}, skipping build...",
                self.name
            )),
            Quirk::MinCompilerFromLinux { compiler, linux: since }
                if version < compiler && linux >= since =>
            {
                Some(format!(
                    "{} does not build with LLVM < {compiler} and Linux >= {since}, skipping build...",
                    self.name
                ))
            }
            _ => None,
        })
    }

    /// Whether to link with GNU ld instead of ld.lld.
    pub fn uses_gnu_ld(&self, version: CompilerVersion) -> bool {
        self.quirks
            .iter()
            .any(|quirk| matches!(*quirk, Quirk::GnuLdBelow(max) if version < max))
    }

    pub fn probes_s390_tools(&self) -> bool {
        self.quirks.contains(&Quirk::ProbeS390Tools)
    }
}

/// Kernel builds for `arch` with its default configurations.
pub fn resolve(arch: Arch, version: CompilerVersion, host: &HostArch) -> Vec<TargetSpec> {
    arch.entry()
        .variants
        .iter()
        .map(|variant| TargetSpec::from_variant(arch, variant, version, host))
        .collect()
}

/// Values accepted by `--config-target`.
pub const CONFIG_TARGETS: &[&str] = &["defconfig", "allmodconfig", "allnoconfig", "allyesconfig"];

pub fn validate_config_target(config_target: &str) -> Result<(), Error> {
    if CONFIG_TARGETS.contains(&config_target) {
        return Ok(());
    }
    Err(Error::usage(format!(
        "unknown config target '{config_target}' (expected one of: {})",
        CONFIG_TARGETS.join(", ")
    )))
}

/// Kernel builds for `arch` with `config_target`. Any `all*config` target
/// replaces the default configurations and yields nothing for architectures
/// that cannot build it.
pub fn resolve_config(
    arch: Arch,
    version: CompilerVersion,
    host: &HostArch,
    config_target: &str,
    linux: LinuxVersion,
) -> Vec<TargetSpec> {
    if config_target == "defconfig" {
        return resolve(arch, version, host);
    }

    let entry = arch.entry();
    let capable = entry.allconfig_since.is_none_or(|since| linux >= since);
    match entry.allconfig {
        Some(variant) if capable => {
            let mut spec = TargetSpec::from_variant(arch, &variant, version, host);
            spec.config_targets = vec![config_target.to_string()];
            vec![spec]
        }
        _ => Vec::new(),
    }
}

/// Distinct binutils triples of `arch`.
pub fn triples(arch: Arch) -> Vec<&'static str> {
    let mut triples: Vec<&'static str> = Vec::new();
    for variant in arch.entry().variants {
        if !triples.contains(&variant.triple) {
            triples.push(variant.triple);
        }
    }
    triples
}

/// Parse a `;` or `,` separated list of identifiers, `all` or `host`.
/// Keeps the requested order and drops duplicates.
pub fn parse_list(text: &str, host: &HostArch) -> Result<Vec<Arch>, Error> {
    let mut archs = Vec::new();
    for item in text.split([';', ',']).map(str::trim).filter(|s| !s.is_empty()) {
        let batch = match item {
            "all" => Arch::ALL.to_vec(),
            "host" => vec![Arch::of_host(host).ok_or_else(|| {
                Error::usage(format!("no kernel targets for host architecture '{host}'"))
            })?],
            other => vec![other.parse()?],
        };
        for arch in batch {
            if !archs.contains(&arch) {
                archs.push(arch);
            }
        }
    }
    if archs.is_empty() {
        return Err(Error::usage("no targets requested"));
    }
    Ok(archs)
}
