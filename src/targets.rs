//! Supported Linux architectures
//!
//! Maps the architecture names used by the fuzzer (`vm_arch`) onto the
//! directory names under `arch/` in the kernel tree (`kernel_header_arch`).

/// One supported architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arch {
    /// Architecture name as used in target strings (e.g. "amd64")
    pub vm_arch: &'static str,
    /// Directory under `arch/` holding the syscall tables (e.g. "x86")
    pub kernel_header_arch: &'static str,
}

/// Default build target architecture
pub const DEFAULT_ARCH: &str = "amd64";

/// Architectures whose syscall tables are consulted
pub const LINUX_ARCHES: &[Arch] = &[
    Arch {
        vm_arch: "386",
        kernel_header_arch: "x86",
    },
    Arch {
        vm_arch: "amd64",
        kernel_header_arch: "x86",
    },
    Arch {
        vm_arch: "arm",
        kernel_header_arch: "arm",
    },
    Arch {
        vm_arch: "arm64",
        kernel_header_arch: "arm64",
    },
    Arch {
        vm_arch: "mips64le",
        kernel_header_arch: "mips",
    },
    Arch {
        vm_arch: "ppc64le",
        kernel_header_arch: "powerpc",
    },
    Arch {
        vm_arch: "riscv64",
        kernel_header_arch: "riscv",
    },
    Arch {
        vm_arch: "s390x",
        kernel_header_arch: "s390",
    },
];

/// Look up a supported architecture by its vm name
pub fn lookup(vm_arch: &str) -> Option<&'static Arch> {
    LINUX_ARCHES.iter().find(|a| a.vm_arch == vm_arch)
}
