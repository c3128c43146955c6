//! `fbasic-compiler`: lexer, parser, semantic analyzer, AST optimizer, CFG
//! builder, and code generator for the FasterBASIC dialect (spec §1, §2).
//!
//! This crate is a library; the `fbasicc` binary (`main.rs`) is the only
//! thing that reads a file from disk, parses CLI flags, or shells out to
//! anything. Every function here takes source text in and hands structured
//! results (or a [`DiagnosticBag`]) back, so an embedder can drive the
//! pipeline without a subprocess.

pub mod ast;
pub mod builtins;
pub mod cfg;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod pretty;
pub mod sema;
pub mod symtab;
pub mod types;

use fbasic_core::diagnostics::DiagnosticBag;
use fbasic_core::source_map::{FileId, SourceMap};

pub use config::{CompilerConfig, DumpFlags, EmitMode, OptimizationLevel};

/// What a successful compilation produced, one variant per [`EmitMode`].
/// `Executable` is deliberately absent: producing a standalone binary means
/// invoking an assembler and linker, which spec.md places out of the
/// core's scope — the CLI driver does that on top of an `Asm` result.
pub enum CompiledOutput {
    Ir(String),
    Asm(String),
    Jit(fbasic_backend::jit::JitModule),
}

/// Everything a caller gets back from [`compile`], success or failure:
/// every diagnostic collected (possibly empty even on failure, if the
/// failure was an internal codegen/backend error rather than a user one)
/// plus the source map those diagnostics are rendered against.
pub struct CompileReport {
    pub diagnostics: DiagnosticBag,
    pub source_map: SourceMap,
    pub output: Option<CompiledOutput>,
}

impl CompileReport {
    pub fn succeeded(&self) -> bool {
        self.output.is_some() && !self.diagnostics.has_errors()
    }

    pub fn exit_code(&self) -> i32 {
        if self.output.is_some() {
            self.diagnostics.exit_code()
        } else {
            1
        }
    }
}

/// Runs the full pipeline — lex, parse, analyze, optimize, build CFGs,
/// generate IR, then (per `config.emit`) hand the IR to the backend driver
/// — over one source file's text. `file_name` is only used for diagnostic
/// rendering; the compiler never reads or writes files itself.
///
/// Stops early, with whatever diagnostics were collected, the first time a
/// stage records an error-severity diagnostic (spec §7: later stages
/// assume a well-formed input from the previous one).
pub fn compile(source: &str, file_name: &str, config: &CompilerConfig) -> CompileReport {
    let mut source_map = SourceMap::new();
    let file = source_map.add(file_name);

    let (tokens, lex_diags) = tracing::debug_span!("lex").in_scope(|| lexer::tokenize(source, file));
    let mut diagnostics = lex_diags;
    if diagnostics.has_errors() {
        return CompileReport { diagnostics, source_map, output: None };
    }

    let (mut program, parse_diags) = tracing::debug_span!("parse").in_scope(|| parser::parse(&tokens, file));
    diagnostics.extend(parse_diags);
    if diagnostics.has_errors() {
        return CompileReport { diagnostics, source_map, output: None };
    }

    if config.dump.dump_ast {
        eprintln!("{}", pretty::print_program(&program));
    }

    let analysis = tracing::debug_span!("analyze").in_scope(|| sema::analyze(&mut program));
    diagnostics.extend(analysis.diagnostics);
    if diagnostics.has_errors() {
        return CompileReport { diagnostics, source_map, output: None };
    }

    if config.dump.dump_symbols {
        eprintln!("{}", pretty::print_symbols(&analysis.table));
    }

    tracing::debug_span!("optimize")
        .in_scope(|| optimizer::optimize(&mut program, config.optimization.max_iterations()));

    let cfgs = tracing::debug_span!("build_cfg").in_scope(|| codegen::build_all_cfgs(&program));
    if config.dump.dump_cfg {
        eprintln!("{}", pretty::print_cfgs_dot(&cfgs));
    }

    let module = match tracing::debug_span!("codegen")
        .in_scope(|| codegen::generate(&program, &analysis.table, &analysis.data))
    {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(%e, "internal codegen error");
            diagnostics.push(fbasic_core::diagnostics::Diagnostic::error(
                fbasic_core::span::SourceLocation::new(file, 0, 0),
                format!("internal compiler error: {}", e),
            ));
            return CompileReport { diagnostics, source_map, output: None };
        }
    };

    let ir_text = match module.to_text() {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(%e, "internal IR rendering error");
            diagnostics.push(fbasic_core::diagnostics::Diagnostic::error(
                fbasic_core::span::SourceLocation::new(file, 0, 0),
                format!("internal compiler error: {}", e),
            ));
            return CompileReport { diagnostics, source_map, output: None };
        }
    };

    let output = tracing::debug_span!("backend").in_scope(|| emit(&ir_text, config, &mut diagnostics, file));

    CompileReport { diagnostics, source_map, output }
}

fn emit(
    ir_text: &str,
    config: &CompilerConfig,
    diagnostics: &mut DiagnosticBag,
    file: FileId,
) -> Option<CompiledOutput> {
    match config.emit {
        EmitMode::Ir => Some(CompiledOutput::Ir(ir_text.to_string())),
        // The core only knows how to emit assembly text; turning that into
        // a standalone executable means invoking an assembler and linker,
        // which spec.md keeps outside this crate. `fbasicc`'s default mode
        // asks for `Asm` here and drives the system toolchain itself.
        EmitMode::Asm | EmitMode::Executable => {
            match fbasic_backend::compile_to_asm(ir_text, config.target) {
                Ok(asm) => Some(CompiledOutput::Asm(asm)),
                Err(e) => {
                    tracing::error!(%e, "backend failed to parse generated IR");
                    diagnostics.push(fbasic_core::diagnostics::Diagnostic::error(
                        fbasic_core::span::SourceLocation::new(file, 0, 0),
                        format!("internal compiler error: backend rejected generated IR: {}", e),
                    ));
                    None
                }
            }
        }
        EmitMode::Jit => {
            let module = match fbasic_backend::ir::parse(ir_text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(%e, "backend failed to parse generated IR");
                    diagnostics.push(fbasic_core::diagnostics::Diagnostic::error(
                        fbasic_core::span::SourceLocation::new(file, 0, 0),
                        format!("internal compiler error: backend rejected generated IR: {}", e),
                    ));
                    return None;
                }
            };
            // The runtime ABI's symbols (string/array/scope/messaging
            // services, spec §6) live in a host-supplied library; this
            // core has no runtime of its own to link against (spec §1
            // non-goal), so an embedder resolves them before running
            // JIT-compiled code. The driver passes an empty table here
            // and lets unresolved-symbol errors surface as diagnostics.
            match fbasic_backend::jit::jit_build(&module, &std::collections::HashMap::new()) {
                Ok(jit) => Some(CompiledOutput::Jit(jit)),
                Err(e) => {
                    tracing::error!(%e, "JIT build failed");
                    diagnostics.push(fbasic_core::diagnostics::Diagnostic::error(
                        fbasic_core::span::SourceLocation::new(file, 0, 0),
                        format!("JIT build failed: {}", e),
                    ));
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_trivial_program_compiles_to_ir_with_no_diagnostics() {
        let cfg = CompilerConfig::new().with_emit(EmitMode::Ir);
        let report = compile("PRINT \"HELLO\"\n", "hello.bas", &cfg);
        assert!(!report.diagnostics.has_errors());
        match report.output {
            Some(CompiledOutput::Ir(text)) => {
                assert!(text.contains("function"));
                assert!(text.contains("$main"));
            }
            _ => panic!("expected IR output"),
        }
    }

    #[test]
    fn option_explicit_is_parsed_without_tripping_the_pipeline() {
        let cfg = CompilerConfig::new().with_emit(EmitMode::Ir);
        let report = compile("OPTION EXPLICIT\nX = 1\n", "strict.bas", &cfg);
        assert!(!report.diagnostics.has_errors());
        assert!(report.output.is_some());
    }

    #[test]
    fn asm_emit_mode_produces_target_specific_text() {
        let cfg = CompilerConfig::new().with_emit(EmitMode::Asm);
        let report = compile("PRINT 1\n", "one.bas", &cfg);
        assert!(!report.diagnostics.has_errors());
        match report.output {
            Some(CompiledOutput::Asm(text)) => assert!(text.contains("main")),
            _ => panic!("expected assembly output"),
        }
    }

    #[test]
    fn a_lex_error_short_circuits_before_parsing() {
        let cfg = CompilerConfig::new();
        let report = compile("PRINT \"unterminated\n", "bad.bas", &cfg);
        assert!(report.diagnostics.has_errors());
        assert!(report.output.is_none());
    }
}
