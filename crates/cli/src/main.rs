//! Command-line runner for `via` source files.
//!
//! Grounded on the teacher's `seqc` CLI (`crates/compiler/src/main.rs`):
//! a `clap`-derived command parsed against `env!("CARGO_PKG_VERSION")`,
//! `tracing_subscriber::fmt` wired to `RUST_LOG`, and a plain-text
//! diagnostic renderer good enough to make spec.md §8's S1-S6 scenarios
//! observable (rendering itself is explicitly a host concern, spec.md
//! §1/§7). The teacher's `Build`/`Lint`/`Test`/`Venv`/`Completions`
//! subcommands have no counterpart in this revision's single run-a-file
//! surface.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use via_core::{Diagnostic, LineCol, Permission, Severity, SourceBuffer};
use via_compiler::config::EngineConfig;
use via_compiler::engine::{Engine, EngineError};
use via_runtime::vm::RunOutcome;

#[derive(Parser)]
#[command(name = "viac")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a via source file", long_about = None)]
struct Cli {
    /// Input .via source file
    input: PathBuf,

    /// Extra module search path, checked before the stdlib default
    /// cascade (spec.md §6). May be given more than once.
    #[arg(long = "search-path", value_name = "DIR")]
    search_paths: Vec<PathBuf>,

    /// Print the emitted bytecode program before running it
    #[arg(long)]
    dump_exe: bool,

    /// Print each module's exported-definition table before running it
    #[arg(long)]
    dump_deftable: bool,

    /// Compile and typecheck only; do not execute the program
    #[arg(long)]
    no_execution: bool,

    /// Attach the recording debug hook while running
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let text = match std::fs::read_to_string(&cli.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("error: reading '{}': {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };
    let buffer = SourceBuffer::new(cli.input.clone(), text.clone());

    let mut flags = via_core::ModuleFlags::empty();
    if cli.dump_exe {
        flags = flags | via_core::ModuleFlags::DUMP_EXE;
    }
    if cli.dump_deftable {
        flags = flags | via_core::ModuleFlags::DUMP_DEFTABLE;
    }
    if cli.no_execution {
        flags = flags | via_core::ModuleFlags::NO_EXECUTION;
    }
    if cli.debug {
        flags = flags | via_core::ModuleFlags::DEBUG;
    }

    let config = EngineConfig::new()
        .with_search_paths(cli.search_paths)
        .with_permissions(Permission::all())
        .with_flags(flags);
    let mut engine = Engine::new(config);

    let run = match engine.run_source(cli.input.clone(), text) {
        Ok(run) => run,
        Err(EngineError::Io(path, msg)) => {
            eprintln!("error: reading '{}': {msg}", path.display());
            return ExitCode::FAILURE;
        }
        Err(EngineError::Import(msg)) => {
            eprintln!("error: {msg}");
            return ExitCode::FAILURE;
        }
    };

    let had_errors = render_diagnostics(&buffer, &run.diagnostics);

    if cli.dump_exe {
        if let Some(exec) = &run.exec {
            println!("{exec:#?}");
        }
    }
    if cli.dump_deftable {
        for (_, def) in run.defs.iter() {
            println!("def {:?}: arity {}", def.symbol, def.arity());
        }
    }

    if had_errors {
        return ExitCode::FAILURE;
    }

    match run.outcome {
        Some(RunOutcome::Returned(value)) => {
            println!("{value:?}");
            ExitCode::SUCCESS
        }
        Some(RunOutcome::UnhandledError(msg)) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

/// Renders each diagnostic as `path:line:col: SEVERITY: message`, with an
/// indented follow-up line for its footnote if it has one. Returns whether
/// any diagnostic was an `ERROR` (spec.md §8 invariant 9: an error means
/// the caller must not trust `run.outcome`).
fn render_diagnostics(buffer: &SourceBuffer, diagnostics: &[Diagnostic]) -> bool {
    let mut had_errors = false;
    for diag in diagnostics {
        had_errors |= diag.severity == Severity::Error;
        let LineCol { line, column } = buffer.line_col(diag.loc.begin);
        eprintln!(
            "{}:{line}:{column}: {}: {}",
            buffer.name().display(),
            diag.severity,
            diag.message
        );
        if let Some(footnote) = &diag.footnote {
            eprintln!("  {}: {}", footnote.kind, footnote.text);
        }
    }
    had_errors
}
