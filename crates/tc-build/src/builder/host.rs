//! Host architecture detection.

use std::fmt;

/// The machine we run on, named by the first component of its GNU triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostArch(String);

impl HostArch {
    /// Architecture of the running binary.
    pub fn detect() -> Self {
        let arch = match std::env::consts::ARCH {
            "powerpc64" if cfg!(target_endian = "little") => "powerpc64le",
            "mips" if cfg!(target_endian = "little") => "mipsel",
            other => other,
        };
        Self(arch.to_string())
    }

    /// Map a `uname -m` style machine name onto a triple architecture.
    pub fn from_machine(machine: &str) -> Self {
        let arch = match machine {
            "armv7l" | "armv6l" | "armv5tel" => "arm",
            "arm64" => "aarch64",
            "ppc" => "powerpc",
            "ppc64" => "powerpc64",
            "ppc64le" => "powerpc64le",
            "amd64" => "x86_64",
            other => other,
        };
        Self(arch.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `triple` describes this machine, in which case binutils are
    /// built without a program prefix and no `CROSS_COMPILE` is needed.
    pub fn is_native(&self, triple: &str) -> bool {
        triple.split('-').next() == Some(self.as_str())
    }

    /// LLVM backend name that covers this machine.
    pub fn llvm_target(&self) -> Option<&'static str> {
        let target = match self.as_str() {
            "aarch64" => "AArch64",
            "arm" => "ARM",
            "hexagon" => "Hexagon",
            "loongarch64" => "LoongArch",
            "mips" | "mipsel" | "mips64" | "mips64el" => "Mips",
            "powerpc" | "powerpc64" | "powerpc64le" => "PowerPC",
            "riscv32" | "riscv64" => "RISCV",
            "s390x" => "SystemZ",
            "i386" | "i686" | "x86_64" => "X86",
            _ => return None,
        };
        Some(target)
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
