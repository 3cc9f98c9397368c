//! Black-box coverage of spec.md §8's end-to-end scenarios through the
//! public `Engine` surface, plus the host-configurable toggles in
//! `EngineConfig` (SPEC_FULL.md §1.3).

use via_compiler::config::EngineConfig;
use via_compiler::engine::Engine;
use via_core::ModuleFlags;
use via_runtime::value::Value;
use via_runtime::vm::RunOutcome;

#[test]
fn no_execution_flag_stops_before_the_vm_runs() {
    let config = EngineConfig::new().with_flags(ModuleFlags::NO_EXECUTION);
    let mut engine = Engine::new(config);
    let run = engine.run_source("s1.via", "fn main() -> int { return 2 + 3 * 4 }").unwrap();
    assert!(run.diagnostics.is_empty());
    assert!(run.outcome.is_none());
    assert!(run.exec.is_some());
}

#[test]
fn def_table_carries_every_top_level_function() {
    let mut engine = Engine::new(EngineConfig::new());
    let run = engine
        .run_source("s4.via", "fn f(x: int) -> int { return x } fn g() -> int { return 1 } fn main() -> int { return g() }")
        .unwrap();
    assert!(run.diagnostics.is_empty());
    assert_eq!(run.defs.len(), 3);
    match run.outcome {
        Some(RunOutcome::Returned(Value::Int(1))) => {}
        other => panic!("expected Int(1), got {other:?}"),
    }
}

#[test]
fn script_without_main_runs_its_top_level_statements() {
    let mut engine = Engine::new(EngineConfig::new());
    let run = engine.run_source("script.via", "var x = 41 + 1").unwrap();
    assert!(run.diagnostics.is_empty());
    assert!(run.outcome.is_some());
}

#[test]
fn unreadable_module_search_path_is_simply_empty_not_fatal() {
    let config = EngineConfig::new().with_search_path("/nonexistent-via-search-root");
    let mut engine = Engine::new(config);
    let run = engine.run_source("s1.via", "fn main() -> int { return 2 + 3 * 4 }").unwrap();
    assert!(run.diagnostics.is_empty());
    match run.outcome {
        Some(RunOutcome::Returned(Value::Int(14))) => {}
        other => panic!("expected Int(14), got {other:?}"),
    }
}
