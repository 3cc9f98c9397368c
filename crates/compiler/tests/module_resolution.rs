//! Black-box tests for the module manager's filesystem-facing behavior
//! (spec.md §4.5, §6): search-path resolution, permission gating, and
//! already-loaded reuse, exercised against real temp directories rather
//! than mocked paths.

use std::cell::RefCell;
use std::rc::Rc;

use serial_test::serial;
use via_compiler::module::{ImportError, ModuleManager};
use via_core::{DiagContext, Permission, QualName, SymbolTable, TypeContext};

fn manager(root: &std::path::Path) -> ModuleManager {
    let symbols = Rc::new(RefCell::new(SymbolTable::new()));
    ModuleManager::new(vec![root.to_path_buf()], symbols)
}

#[test]
#[serial]
fn resolves_a_via_file_under_the_search_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greet.via"), "fn main() -> int { return 0 }").unwrap();

    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let handle = manager
        .import(&QualName::single("greet"), Permission::IMPORT, &mut types, &mut diags)
        .unwrap();
    assert_eq!(handle.borrow().canonical_path.file_name().unwrap(), "greet.via");
}

#[test]
#[serial]
fn reimporting_the_same_module_reuses_the_loaded_handle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greet.via"), "fn main() -> int { return 0 }").unwrap();

    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let qual = QualName::single("greet");
    let first = manager.import(&qual, Permission::IMPORT, &mut types, &mut diags).unwrap();
    let second = manager.import(&qual, Permission::IMPORT, &mut types, &mut diags).unwrap();
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
#[serial]
fn missing_module_is_not_found_on_any_search_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let err = manager
        .import(&QualName::single("nope"), Permission::IMPORT, &mut types, &mut diags)
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
#[serial]
fn import_without_the_import_bit_is_denied_before_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    // Deliberately do not create any file here: a permission failure must
    // short-circuit before the search-path walk, so a missing file must
    // not change the outcome.
    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let err = manager
        .import(&QualName::single("greet"), Permission::empty(), &mut types, &mut diags)
        .unwrap_err();
    assert!(err.to_string().contains("import"));
}

#[test]
#[serial]
fn nested_qualified_path_resolves_under_its_segment_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
    std::fs::write(dir.path().join("pkg").join("util.via"), "fn main() -> int { return 0 }").unwrap();

    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let qual = QualName::new(vec!["pkg".to_string(), "util".to_string()]);
    let handle = manager.import(&qual, Permission::IMPORT, &mut types, &mut diags).unwrap();
    assert_eq!(handle.borrow().canonical_path.file_name().unwrap(), "util.via");
}

#[test]
#[serial]
fn recursive_import_cycle_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.via"), "import b\nfn main() -> int { return 0 }").unwrap();
    std::fs::write(dir.path().join("b.via"), "import a\nfn main() -> int { return 0 }").unwrap();

    let mut manager = manager(dir.path());
    let mut types = TypeContext::new();
    let mut diags = DiagContext::new();
    let err = manager
        .import(&QualName::single("a"), Permission::IMPORT, &mut types, &mut diags)
        .unwrap_err();
    assert!(matches!(err, ImportError::RecursiveImport(_)));
}
