//! The engine (SPEC_FULL.md §1.3/§2): glues the lexer, parser, IR builder,
//! emitter and module manager into one compile-and-run entry point.
//! Grounded on the teacher's `compile_file_with_config` pipeline
//! (`crates/compiler/src/lib.rs`: read → parse → resolve → typecheck →
//! codegen), restructured as an explicit handle per REDESIGN FLAGS §9 (no
//! process-wide statics the way the teacher's `CLANG_VERSION_CHECKED`
//! `OnceLock` is one).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use via_core::{Diagnostic, DiagContext, ExecUnit, SourceBuffer, Symbol, SymbolTable, TypeContext};
use via_runtime::debug::RecordingHook;
use via_runtime::vm::{RunOutcome, VirtualMachine};

use crate::config::EngineConfig;
use crate::def::{DefKind, DefParam, DefTable, FunctionDef};
use crate::emit::Emitter;
use crate::ir::IrBuilder;
use crate::module::{default_search_paths, scan_imports, ModuleAccessContext, ModuleManager};
use crate::parser::parse_program;

/// Host-facing, unrecoverable setup failures (SPEC_FULL.md §1.2): file not
/// found, a dynamic library failed to load, an import was denied. Anything
/// a *program author* can trigger instead goes through `DiagContext` and
/// comes back inside [`EngineRun::diagnostics`], never as an `Err` here.
#[derive(Debug)]
pub enum EngineError {
    Io(PathBuf, String),
    Import(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Io(path, msg) => write!(f, "reading '{}': {msg}", path.display()),
            EngineError::Import(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// What one `Engine::run_*` call hands back. `outcome`/`exec` are `None`
/// whenever `diagnostics` contains an `ERROR`: spec.md §7/§8 invariant 9
/// says emission and execution must not run past the first one.
pub struct EngineRun {
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: Option<RunOutcome>,
    pub exec: Option<ExecUnit>,
    pub defs: DefTable,
}

impl EngineRun {
    fn diagnostics_only(diagnostics: Vec<Diagnostic>) -> Self {
        EngineRun { diagnostics, outcome: None, exec: None, defs: DefTable::new() }
    }
}

/// One compile-and-run session: the shared symbol/type interning pools and
/// the module manager that outlive a single source file (spec.md §3
/// "owns... the shared symbol/type contexts").
pub struct Engine {
    config: EngineConfig,
    symbols: Rc<RefCell<SymbolTable>>,
    types: TypeContext,
    modules: ModuleManager,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let symbols = Rc::new(RefCell::new(SymbolTable::new()));
        let mut search_paths = config.search_paths.clone();
        search_paths.extend(default_search_paths());
        let modules = ModuleManager::new(search_paths, symbols.clone());
        Engine { config, symbols, types: TypeContext::new(), modules }
    }

    pub fn run_file(&mut self, path: &Path) -> Result<EngineRun, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::Io(path.to_path_buf(), e.to_string()))?;
        self.run_source(path.to_path_buf(), text)
    }

    /// Runs one `.via` source unit through the full pipeline (spec.md §4.1
    /// through §4.8, in order). `name` only labels diagnostics; it need not
    /// be a real path (the CLI's stdin mode uses a synthetic one).
    pub fn run_source(&mut self, name: impl Into<PathBuf>, source: impl Into<String>) -> Result<EngineRun, EngineError> {
        let buffer = SourceBuffer::new(name, source);
        let mut diags = DiagContext::new();

        let program = {
            let mut symbols = self.symbols.borrow_mut();
            parse_program(&buffer, &mut symbols, &mut diags)
        };
        if diags.has_errors() {
            return Ok(EngineRun::diagnostics_only(diags.into_diagnostics()));
        }

        let mut bindings: HashMap<Symbol, _> = HashMap::new();
        for (bind_name, qual) in scan_imports(&program) {
            let handle = self
                .modules
                .import(&qual, self.config.root_permissions, &mut self.types, &mut diags)
                .map_err(|e| EngineError::Import(e.to_string()))?;
            let sym = self.symbols.borrow_mut().intern(&bind_name);
            bindings.insert(sym, handle);
        }

        let module = {
            let mut access = ModuleAccessContext { bindings: &bindings };
            let mut symbols = self.symbols.borrow_mut();
            let builder = IrBuilder::new(&mut self.types, &mut symbols, &mut diags, &mut access);
            builder.build(&program)
        };
        if diags.has_errors() {
            return Ok(EngineRun::diagnostics_only(diags.into_diagnostics()));
        }

        let emit_output = Emitter::new(&module, &mut self.types, &mut diags).emit();
        if diags.has_errors() {
            return Ok(EngineRun::diagnostics_only(diags.into_diagnostics()));
        }

        let defs = build_def_table(&module, &emit_output.function_entries);
        let exec = emit_output.exec;

        if self.config.no_execution() {
            return Ok(EngineRun { diagnostics: diags.into_diagnostics(), outcome: None, exec: Some(exec), defs });
        }

        // A `main` function is the program's entry point (mirrors the
        // teacher's codegen, which synthesizes a runtime main that calls
        // the user's `main` word): jump straight to its body instead of
        // running the module's top-level statements. A script with no
        // `main` runs its top-level statements directly, starting at pc 0.
        let main_sym = self.symbols.borrow_mut().intern("main");
        let entry_pc = emit_output.function_entries.get(&main_sym).copied();

        let mut vm = VirtualMachine::new(Rc::new(exec.clone()));
        if let Some(pc) = entry_pc {
            vm.set_entry_pc(pc);
        }
        if self.config.debug() {
            vm.set_debug_hook(Box::new(RecordingHook::default()));
        }
        let outcome = vm.run(&mut self.modules);

        Ok(EngineRun { diagnostics: diags.into_diagnostics(), outcome: Some(outcome), exec: Some(exec), defs })
    }
}

/// Builds the def table a source module's own top-level functions occupy
/// (spec.md §3 "Definition (Def)"), for `DUMP_DEFTABLE` and for any future
/// importer of this module to resolve `thisModule::fn` against. Parameter
/// defaults aren't carried through `ir::IrFunction` (they're already spent
/// at IR-build time resolving call arity), so every `DefParam` here has
/// `default: None`; that only affects a re-import of this exact module,
/// which is out of scope for a single `run_source` call.
fn build_def_table(module: &crate::ir::IrModule, function_entries: &HashMap<Symbol, u32>) -> DefTable {
    let mut defs = DefTable::new();
    for func in &module.functions {
        let params = func
            .params
            .iter()
            .map(|(name, ty)| DefParam { name: *name, ty: *ty, default: None })
            .collect();
        defs.insert(FunctionDef {
            kind: DefKind::Source,
            symbol: func.name,
            params,
            return_ty: func.return_ty,
            entry: function_entries.get(&func.name).copied(),
        });
    }
    defs
}

#[cfg(test)]
mod tests {
    use super::*;
    use via_runtime::vm::RunOutcome;

    #[test]
    fn arithmetic_scenario_returns_14() {
        let mut engine = Engine::new(EngineConfig::new());
        let run = engine.run_source("s1.via", "fn main() -> int { return 2 + 3 * 4 }").unwrap();
        assert!(run.diagnostics.is_empty());
        assert_eq!(run.defs.len(), 1);
        match run.outcome {
            Some(RunOutcome::Returned(via_runtime::value::Value::Int(14))) => {}
            other => panic!("expected Int(14), got {other:?}"),
        }
    }

    #[test]
    fn cast_warning_scenario_still_executes() {
        let mut engine = Engine::new(EngineConfig::new());
        let run = engine.run_source("s2.via", "fn main() -> int { return 1 as int }").unwrap();
        assert!(run.diagnostics.iter().any(|d| d.message.contains("redundant cast")));
        match run.outcome {
            Some(RunOutcome::Returned(via_runtime::value::Value::Int(1))) => {}
            other => panic!("expected Int(1), got {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_in_call_reports_error_and_skips_execution() {
        let mut engine = Engine::new(EngineConfig::new());
        let run = engine
            .run_source("s4.via", "fn f(x: int) -> int { return x } fn main() -> int { return f(\"a\") }")
            .unwrap();
        assert!(run.diagnostics.iter().any(|d| d.message.contains("has type") && d.message.contains("expected")));
        assert!(run.outcome.is_none());
    }

    #[test]
    fn undefined_symbol_reports_error_and_skips_execution() {
        let mut engine = Engine::new(EngineConfig::new());
        let run = engine.run_source("s3.via", "fn main() -> int { return x }").unwrap();
        assert!(run.diagnostics.iter().any(|d| d.message.contains("undefined symbol")));
        assert!(run.outcome.is_none());
    }

    #[test]
    fn missing_file_is_an_engine_error_not_a_diagnostic() {
        let mut engine = Engine::new(EngineConfig::new());
        let err = engine.run_file(Path::new("/nonexistent/does-not-exist.via")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_, _)));
    }
}
