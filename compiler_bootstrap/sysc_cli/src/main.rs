//! sysc command-line driver.
//!
//! Since the real lexer/parser is out of scope for this backend, the positional input path
//! is a JSON file deserializing to `sysc_ast::Module` rather than source text. `--dump-ast`
//! pretty-prints that deserialized AST to stderr before codegen runs.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use sysc_common::SyscError;
use sysc_ir::CodeGen;

/// The sysc ahead-of-time backend: lowers a typed AST to optimized AArch64-like or
/// RISC-V assembly.
#[derive(Parser)]
#[command(name = "sysc")]
#[command(about = "Ahead-of-time optimizing backend: typed AST (JSON) to assembly")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Input file: a JSON-serialized `sysc_ast::Module`.
    input: PathBuf,

    /// Output file path. Defaults to stdout when omitted.
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Emit assembly text (the only output kind this backend produces; accepted for
    /// familiarity with compilers that also emit object files).
    #[arg(short = 'S')]
    emit_asm: bool,

    /// Pretty-print the deserialized AST to stderr before codegen.
    #[arg(long)]
    dump_ast: bool,

    /// Target the AArch64-like backend (default).
    #[arg(long, conflicts_with = "rv")]
    arm: bool,

    /// Target the RISC-V backend.
    #[arg(long, conflicts_with = "arm")]
    rv: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all but error-level logging.
    #[arg(short, long, global = true)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // An `InvariantViolation`/`Unimplemented`/`OverconstrainedSpill` escaping to here
            // is fatal: the pipeline's own invariants broke. Anything else (bad path, bad
            // JSON) is the ordinary recoverable CLI-boundary failure.
            if let Some(syscerr) = err.downcast_ref::<SyscError>() {
                if syscerr.is_fatal() {
                    eprintln!("fatal: {syscerr}");
                    return ExitCode::from(101);
                }
            }
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let input_text =
        fs::read_to_string(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    let ast = sysc_ast::Module::from_json(&input_text)
        .with_context(|| format!("parsing {} as a JSON AST module", cli.input.display()))?;

    if cli.dump_ast {
        eprintln!("{ast:#?}");
    }

    log::info!("lowering {} function(s) to mid-level IR", ast.functions.len());
    let mut mid = CodeGen::lower(&ast).map_err(anyhow::Error::from)?;

    log::info!("running optimization pipeline");
    sysc_opt::default_pipeline().run(&mut mid);

    log::info!("selecting and allocating for {}", if cli.rv { "riscv" } else { "arm" });
    let asm = if cli.rv {
        sysc_machine::compile_to_rv(&mid)
    } else {
        sysc_machine::compile_to_arm(&mid)
    }
    .map_err(anyhow::Error::from)?;

    match cli.output {
        Some(path) => {
            fs::write(&path, asm).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            print!("{asm}");
        }
    }

    Ok(())
}
