//! Compiler configuration.
//!
//! `CompilerConfig` gathers everything the driver needs to turn one
//! source file into output: optimization level, emit mode, target triple,
//! and the `-A`/`-G`/`-S` dump switches. Builder-style so a caller (the
//! CLI, or an embedder) can assemble one without naming every field.

use fbasic_backend::Target;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    O3,
}

impl OptimizationLevel {
    /// Number of fixed-point iterations the optimizer pipeline runs
    /// before giving up and emitting whatever it has (spec §4.4 caps
    /// this at 4 regardless of level).
    pub fn max_iterations(self) -> u32 {
        match self {
            OptimizationLevel::O0 => 0,
            OptimizationLevel::O1 => 1,
            OptimizationLevel::O2 => 4,
            OptimizationLevel::O3 => 4,
        }
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitMode {
    /// Native object code, linked into a standalone executable.
    Executable,
    /// The textual backend IR (spec §6), unlinked.
    Ir,
    /// Target assembly text.
    Asm,
    /// JIT-compile and run in-process, skipping the file system entirely.
    Jit,
}

impl Default for EmitMode {
    fn default() -> Self {
        EmitMode::Executable
    }
}

/// What to print to stderr alongside normal compilation, each gated by
/// its own flag so a caller can request just the piece they need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpFlags {
    pub dump_ast: bool,
    pub dump_symbols: bool,
    pub dump_cfg: bool,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub optimization: OptimizationLevel,
    pub target: Target,
    pub emit: EmitMode,
    pub dump: DumpFlags,
    pub output_path: Option<PathBuf>,
    /// Reject implicit coercions and undeclared variables (`OPTION EXPLICIT`
    /// can also turn this on per-file; the two combine with OR).
    pub strict: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            optimization: OptimizationLevel::default(),
            target: Target::host_default(),
            emit: EmitMode::default(),
            dump: DumpFlags::default(),
            output_path: None,
            strict: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization = level;
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_emit(mut self, emit: EmitMode) -> Self {
        self.emit = emit;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn dump_ast(mut self, v: bool) -> Self {
        self.dump.dump_ast = v;
        self
    }

    pub fn dump_symbols(mut self, v: bool) -> Self {
        self.dump.dump_symbols = v;
        self
    }

    pub fn dump_cfg(mut self, v: bool) -> Self {
        self.dump.dump_cfg = v;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_the_host_and_optimizes_at_o1() {
        let cfg = CompilerConfig::new();
        assert_eq!(cfg.optimization, OptimizationLevel::O1);
        assert_eq!(cfg.emit, EmitMode::Executable);
    }

    #[test]
    fn builder_chains_set_every_field() {
        let cfg = CompilerConfig::new()
            .with_optimization(OptimizationLevel::O3)
            .with_emit(EmitMode::Ir)
            .with_output_path("out.ir")
            .dump_ast(true)
            .dump_cfg(true);

        assert_eq!(cfg.optimization, OptimizationLevel::O3);
        assert_eq!(cfg.emit, EmitMode::Ir);
        assert_eq!(cfg.output_path, Some(PathBuf::from("out.ir")));
        assert!(cfg.dump.dump_ast);
        assert!(cfg.dump.dump_cfg);
        assert!(!cfg.dump.dump_symbols);
    }

    #[test]
    fn higher_optimization_levels_allow_more_fixed_point_iterations() {
        assert_eq!(OptimizationLevel::O0.max_iterations(), 0);
        assert!(OptimizationLevel::O2.max_iterations() >= OptimizationLevel::O1.max_iterations());
        assert_eq!(OptimizationLevel::O3.max_iterations(), 4);
    }
}
