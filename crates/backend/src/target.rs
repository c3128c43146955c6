//! Target triples the backend knows how to emit for (spec.md §4.7).
//!
//! Each target carries the register set the allocator assigns from and the
//! calling-convention details the assembly emitters need (argument
//! registers, callee-saved set, stack alignment).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Amd64SysV,
    Amd64Apple,
    Arm64,
    Arm64Apple,
    Riscv64,
}

impl Target {
    pub fn all() -> &'static [Target] {
        &[
            Target::Amd64SysV,
            Target::Amd64Apple,
            Target::Arm64,
            Target::Arm64Apple,
            Target::Riscv64,
        ]
    }

    pub fn is_apple(self) -> bool {
        matches!(self, Target::Amd64Apple | Target::Arm64Apple)
    }

    pub fn is_arm64(self) -> bool {
        matches!(self, Target::Arm64 | Target::Arm64Apple)
    }

    /// Stack alignment required at a `call` instruction, in bytes.
    pub fn stack_align(self) -> u32 {
        16
    }

    /// General-purpose integer argument registers, in ABI order.
    pub fn gpr_arg_regs(self) -> &'static [&'static str] {
        match self {
            Target::Amd64SysV | Target::Amd64Apple => {
                &["rdi", "rsi", "rdx", "rcx", "r8", "r9"]
            }
            Target::Arm64 | Target::Arm64Apple => {
                &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"]
            }
            Target::Riscv64 => &["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"],
        }
    }

    /// Floating-point argument registers, in ABI order.
    pub fn fpr_arg_regs(self) -> &'static [&'static str] {
        match self {
            Target::Amd64SysV | Target::Amd64Apple => {
                &["xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7"]
            }
            Target::Arm64 | Target::Arm64Apple => {
                &["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7"]
            }
            Target::Riscv64 => &["fa0", "fa1", "fa2", "fa3", "fa4", "fa5", "fa6", "fa7"],
        }
    }

    /// General-purpose registers available to the linear-scan allocator
    /// for temporaries, in preference order (caller-saved first).
    pub fn gpr_pool(self) -> &'static [&'static str] {
        match self {
            Target::Amd64SysV | Target::Amd64Apple => {
                &["rax", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11", "rbx", "r12", "r13", "r14"]
            }
            Target::Arm64 | Target::Arm64Apple => {
                &[
                    "x9", "x10", "x11", "x12", "x13", "x14", "x15", "x0", "x1", "x2", "x3", "x19",
                    "x20", "x21", "x22",
                ]
            }
            Target::Riscv64 => {
                &["t0", "t1", "t2", "t3", "t4", "t5", "t6", "a0", "a1", "s1", "s2", "s3"]
            }
        }
    }

    pub fn fpr_pool(self) -> &'static [&'static str] {
        match self {
            Target::Amd64SysV | Target::Amd64Apple => {
                &["xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm8", "xmm9", "xmm10", "xmm11"]
            }
            Target::Arm64 | Target::Arm64Apple => {
                &["d0", "d1", "d2", "d3", "d4", "d5", "d8", "d9", "d10", "d11"]
            }
            Target::Riscv64 => &["ft0", "ft1", "ft2", "ft3", "fa0", "fa1", "fa2", "fa3"],
        }
    }

    pub fn callee_saved_gprs(self) -> &'static [&'static str] {
        match self {
            Target::Amd64SysV | Target::Amd64Apple => &["rbx", "r12", "r13", "r14", "r15"],
            Target::Arm64 | Target::Arm64Apple => {
                &["x19", "x20", "x21", "x22", "x23", "x24", "x25", "x26", "x27", "x28"]
            }
            Target::Riscv64 => &["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11"],
        }
    }

    /// The object-file symbol prefix (Apple platforms prefix an underscore).
    pub fn symbol_prefix(self) -> &'static str {
        if self.is_apple() {
            "_"
        } else {
            ""
        }
    }

    /// The target implied by the host this compiler was built on. Used as
    /// the default when the driver isn't given an explicit `-target`.
    pub fn host_default() -> Target {
        if cfg!(all(target_arch = "aarch64", target_os = "macos")) {
            Target::Arm64Apple
        } else if cfg!(target_arch = "aarch64") {
            Target::Arm64
        } else if cfg!(all(target_arch = "x86_64", target_os = "macos")) {
            Target::Amd64Apple
        } else if cfg!(target_arch = "riscv64") {
            Target::Riscv64
        } else {
            Target::Amd64SysV
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Target::Amd64SysV => "amd64-sysv",
            Target::Amd64Apple => "amd64-apple",
            Target::Arm64 => "arm64",
            Target::Arm64Apple => "arm64-apple",
            Target::Riscv64 => "rv64",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64-sysv" | "x86_64-sysv" => Ok(Target::Amd64SysV),
            "amd64-apple" | "x86_64-apple" => Ok(Target::Amd64Apple),
            "arm64" | "aarch64" => Ok(Target::Arm64),
            "arm64-apple" | "aarch64-apple" => Ok(Target::Arm64Apple),
            "rv64" | "riscv64" => Ok(Target::Riscv64),
            other => Err(format!("unknown target '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for &t in Target::all() {
            let s = t.to_string();
            assert_eq!(Target::from_str(&s).unwrap(), t);
        }
    }

    #[test]
    fn apple_targets_use_underscore_symbol_prefix() {
        assert_eq!(Target::Amd64Apple.symbol_prefix(), "_");
        assert_eq!(Target::Amd64SysV.symbol_prefix(), "");
    }
}
