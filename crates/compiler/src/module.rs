//! Module manager (spec.md §4.5): owns the search paths, the set of loaded
//! modules keyed by canonical path, and the "currently importing" stack
//! used for cycle detection. Also the native-module protocol glue
//! (spec.md §4.6) and the stdlib discovery rules (spec.md §6).

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use via_core::{DiagContext, Permission, QualName, QualType, SourceBuffer, Symbol, SymbolTable, TypeContext};
use via_runtime::native::{self, CallInfo, NativeDef};
use via_runtime::value::{Closure, ClosureKind, Value};
use via_runtime::vm::ImportResolver;

use crate::def::{DefKind, DefParam, DefTable, FunctionDef};
use crate::ir::ModuleAccessResolver;
use crate::parser::parse_program;

/// One loaded module: its exported definitions plus whatever permission
/// bits it was granted at import time. Source modules also carry their
/// compiled bytecode once the emitter exists; until then only the
/// def-table half of spec.md §3's `Module` is populated here.
#[derive(Default)]
pub struct Module {
    pub canonical_path: PathBuf,
    pub defs: DefTable,
    pub permissions: Permission,
    /// Functions exported by the loaded module, already wrapped as
    /// callable runtime `Value`s. Populated for native modules at load
    /// time; for source modules once the emitter produces an `ExecUnit`
    /// and the owning module's closures are bound to it.
    values: HashMap<Symbol, Value>,
    /// Keeps the dynamically-loaded library open for as long as this
    /// module (and any closures obtained from it) might still be called;
    /// `None` for source modules. See `native::NativeModule`'s own doc
    /// comment for why dropping this early is unsound.
    _native: Option<native::NativeModule>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("canonical_path", &self.canonical_path)
            .field("defs", &self.defs)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl Module {
    fn get_value(&self, key: Symbol) -> Option<&Value> {
        self.values.get(&key)
    }
}

#[derive(Debug)]
pub enum ImportError {
    RecursiveImport(String),
    NotFound(String),
    PermissionDenied,
    Load(String),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::RecursiveImport(name) => write!(f, "recursive import of '{name}'"),
            ImportError::NotFound(name) => write!(f, "module '{name}' not found on search path"),
            ImportError::PermissionDenied => {
                write!(f, "current module lacks import capabilities")
            }
            ImportError::Load(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ImportError {}

/// The platform's native shared-object extension (spec.md §6: `.so` on
/// Linux, `.dll` on Windows); `std::env::consts::DLL_EXTENSION` already
/// tracks this per-platform so there is no table to keep in sync by hand.
fn native_ext() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Candidate file for a qualified name under one search root, in the
/// order spec.md §4.5 tries them; first existing regular file wins.
fn candidates(root: &Path, qual: &QualName) -> Vec<PathBuf> {
    let mut dir = root.to_path_buf();
    for seg in qual.segments().iter().take(qual.segments().len().saturating_sub(1)) {
        dir.push(seg);
    }
    let name = qual.last();
    vec![
        dir.join(format!("{name}.via")),
        dir.join(format!("{name}.viac")),
        dir.join(format!("{name}.{}", native_ext())),
        dir.join(name).join("module.via"),
    ]
}

pub struct ModuleManager {
    search_paths: Vec<PathBuf>,
    loaded: HashMap<PathBuf, Rc<RefCell<Module>>>,
    importing: Vec<PathBuf>,
    symbols: Rc<RefCell<SymbolTable>>,
}

impl ModuleManager {
    pub fn new(search_paths: Vec<PathBuf>, symbols: Rc<RefCell<SymbolTable>>) -> Self {
        ModuleManager { search_paths, loaded: HashMap::new(), importing: Vec::new(), symbols }
    }

    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.push(path);
    }

    fn resolve_candidate(&self, qual: &QualName) -> Option<PathBuf> {
        for root in &self.search_paths {
            for candidate in candidates(root, qual) {
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// spec.md §4.5 `import(path, from)`. `from_permissions` is the
    /// importing module's own grant; the importee inherits it verbatim.
    /// `types` interns the builtin kinds a native module declares for its
    /// exports (spec.md §3 `Def*`'s parameter/return types); unused for a
    /// source module, whose def table the engine fills in once it has
    /// emitted that module's bytecode.
    pub fn import(
        &mut self,
        qual: &QualName,
        from_permissions: Permission,
        types: &mut TypeContext,
        diags: &mut DiagContext,
    ) -> Result<Rc<RefCell<Module>>, ImportError> {
        if !from_permissions.contains(Permission::IMPORT) {
            return Err(ImportError::PermissionDenied);
        }
        let joined = qual.joined();
        let path = self.resolve_candidate(qual).ok_or(ImportError::NotFound(joined.clone()))?;
        let canonical = path.canonicalize().unwrap_or(path.clone());

        if self.importing.contains(&canonical) {
            return Err(ImportError::RecursiveImport(joined));
        }
        if let Some(existing) = self.loaded.get(&canonical) {
            return Ok(existing.clone());
        }

        self.importing.push(canonical.clone());
        let result = self.load_by_extension(&canonical, qual.last(), from_permissions, types, diags);
        self.importing.pop();

        let module = result?;
        let handle = Rc::new(RefCell::new(module));
        self.loaded.insert(canonical, handle.clone());
        Ok(handle)
    }

    fn load_by_extension(
        &mut self,
        path: &Path,
        name: &str,
        permissions: Permission,
        types: &mut TypeContext,
        diags: &mut DiagContext,
    ) -> Result<Module, ImportError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext == native_ext() => self.load_native_object(path, name, permissions, types),
            Some("viac") => Err(ImportError::Load(
                "precompiled .viac modules are not supported in this revision".to_string(),
            )),
            _ => self.load_source_file(path, permissions, types, diags),
        }
    }

    /// Parses a `.via` source module and recursively resolves its own
    /// `import` statements through `import()` itself, so a cycle anywhere
    /// in the transitive import graph (spec.md §4.5 step 1, §8 S5) is
    /// caught by the same `importing` stack this module's own load is
    /// already pushed onto. Building IR/emitting bytecode for this module's
    /// *body* is still the engine's job (it drives the full parse → IR →
    /// emit pipeline so it can wire in sibling imports before IR building
    /// needs them); linking another source module's compiled bytecode into
    /// the importer's own `ExecUnit` so its functions become callable at
    /// runtime is not implemented in this revision (see DESIGN.md), so the
    /// returned `Module` still exports nothing — a static access against it
    /// always fails to resolve.
    fn load_source_file(
        &mut self,
        path: &Path,
        permissions: Permission,
        types: &mut TypeContext,
        diags: &mut DiagContext,
    ) -> Result<Module, ImportError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ImportError::Load(format!("reading '{}': {e}", path.display())))?;
        let buffer = SourceBuffer::new(path.to_path_buf(), text);
        let program = {
            let mut symbols = self.symbols.borrow_mut();
            parse_program(&buffer, &mut symbols, diags)
        };
        for (_, qual) in scan_imports(&program) {
            self.import(&qual, permissions, types, diags)?;
        }
        Ok(Module {
            canonical_path: path.to_path_buf(),
            defs: DefTable::new(),
            permissions,
            values: HashMap::new(),
            _native: None,
        })
    }

    /// Builds both halves of a loaded native module: the callable `Value`s
    /// `GETIMPORT` hands back at runtime, and the def table a static access
    /// like `io::print` needs at IR-build time to type the expression
    /// (spec.md §3 `Def*` carries a parameter list and return type for
    /// every def, native included).
    fn load_native_object(
        &mut self,
        path: &Path,
        name: &str,
        permissions: Permission,
        types: &mut TypeContext,
    ) -> Result<Module, ImportError> {
        let ctx = self as *mut ModuleManager as *mut std::ffi::c_void;
        let mut native_module = unsafe { native::load_native_object(path, name, ctx) }
            .map_err(|e| ImportError::Load(e.to_string()))?;

        let mut symbols = self.symbols.borrow_mut();
        let mut values = HashMap::new();
        let mut defs = DefTable::new();
        for def in native_module.info.defs.drain(..) {
            let sym = symbols.intern(&def.name);
            let params = def
                .params
                .iter()
                .enumerate()
                .map(|(i, kind)| DefParam {
                    name: symbols.intern(&format!("_{i}")),
                    ty: QualType::new(types.get_builtin(*kind)),
                    default: None,
                })
                .collect();
            let return_ty = QualType::new(types.get_builtin(def.return_ty));
            defs.insert(FunctionDef { kind: DefKind::Native, symbol: sym, params, return_ty, entry: None });
            values.insert(sym, wrap_native_fn(def));
        }
        drop(symbols);

        Ok(Module {
            canonical_path: path.to_path_buf(),
            defs,
            permissions,
            values,
            _native: Some(native_module),
        })
    }
}

/// Bridges a dynamically-loaded module's fallible `Fn(&mut CallInfo) ->
/// Result<Value, String>` (the real ABI boundary: a native call can
/// legitimately fail to validate its arguments) into the VM's infallible
/// `ClosureKind::Native` signature. `VirtualMachine::dispatch_call` has no
/// error channel out of a native call by design (spec.md §4.8 models
/// failure as the `ERROR` interrupt raised from *VM* instructions, not
/// from host calls); a failing native call therefore yields `Value::Nil`
/// and the message is surfaced through `tracing` instead of silently
/// vanishing. See DESIGN.md's open-question entry for this module.
fn wrap_native_fn(def: NativeDef) -> Value {
    let arity = def.arity;
    let name = def.name.clone();
    let func = def.func;
    let closure = Closure {
        kind: ClosureKind::Native(Rc::new(move |call_info: &mut CallInfo| match func(call_info) {
            Ok(value) => value,
            Err(msg) => {
                tracing::error!(module = %name, error = %msg, "native call failed");
                Value::Nil
            }
        })),
        arity,
        upvalues: Vec::new(),
    };
    Value::Closure(Rc::new(closure))
}

impl ImportResolver for ModuleManager {
    fn resolve_import(&mut self, module: Symbol, key: Symbol) -> Option<Value> {
        let module_path = {
            let symbols = self.symbols.borrow();
            symbols.resolve(module).to_string()
        };
        let canonical = self
            .loaded
            .keys()
            .find(|p| {
                p.file_stem().and_then(|s| s.to_str()) == Some(module_path.as_str())
            })
            .cloned()?;
        let handle = self.loaded.get(&canonical)?;
        handle.borrow().get_value(key).cloned()
    }
}

/// Binds the current import scope to the manager so `ir::IrBuilder` can
/// resolve `A::B` static access without needing to know how modules are
/// loaded (mirrors the `ImportResolver` split already used at the VM
/// layer). `bindings` maps the name a module was imported *as* (the last
/// segment of its qualified path, spec.md §4.2 `import a::b::c`) to the
/// loaded module. Deliberately holds no reference to the symbol table:
/// the engine needs to borrow it mutably for IR building at the same time
/// it holds this resolver, and nothing here actually needs to render a
/// symbol's name.
pub struct ModuleAccessContext<'a> {
    pub bindings: &'a HashMap<Symbol, Rc<RefCell<Module>>>,
}

impl ModuleAccessResolver for ModuleAccessContext<'_> {
    fn resolve_static_access(&mut self, module: Symbol, member: Symbol) -> Option<via_core::QualType> {
        let handle = self.bindings.get(&module)?;
        let module_ref = handle.borrow();
        let def = module_ref.defs.get(member)?;
        Some(via_core::QualType::new(def.return_ty.ty))
    }

    fn is_module(&self, name: Symbol) -> bool {
        self.bindings.contains_key(&name)
    }
}

/// spec.md §6 stdlib discovery: on POSIX, `$XDG_DATA_HOME/via`, then
/// `$HOME/.local/share/via`, then `/usr/local/share/via`, then
/// `/usr/share/via`; on Windows, `%LOCALAPPDATA%\via` then
/// `%USERPROFILE%\AppData\Local\via`. Each candidate's `lib/`
/// subdirectory is what gets prepended to the search path, and only
/// directories that actually exist are kept.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    #[cfg(not(windows))]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            roots.push(PathBuf::from(xdg).join("via"));
        }
        if let Ok(home) = std::env::var("HOME") {
            roots.push(PathBuf::from(&home).join(".local/share/via"));
        }
        roots.push(PathBuf::from("/usr/local/share/via"));
        roots.push(PathBuf::from("/usr/share/via"));
    }
    #[cfg(windows)]
    {
        if let Ok(local_app_data) = std::env::var("LOCALAPPDATA") {
            roots.push(PathBuf::from(local_app_data).join("via"));
        }
        if let Ok(profile) = std::env::var("USERPROFILE") {
            roots.push(PathBuf::from(profile).join("AppData/Local/via"));
        }
    }
    roots
        .into_iter()
        .map(|root| root.join("lib"))
        .filter(|lib| lib.is_dir())
        .collect()
}

/// Scans a parsed program's top-level `import` statements, mapping the
/// name each import binds (its qualified path's last segment) to the
/// full path, for the engine's pre-pass (see `load_source_file`'s doc
/// comment: imports are resolved before IR building so static access can
/// see sibling modules inline).
pub fn scan_imports(program: &crate::ast::Program) -> Vec<(String, QualName)> {
    program
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            crate::ast::Stmt::Import { path, .. } => Some((path.last().to_string(), path.clone())),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_try_via_then_viac_then_native_then_module_dir() {
        let root = PathBuf::from("/lib");
        let qual = QualName::new(vec!["io".to_string()]);
        let found = candidates(&root, &qual);
        assert_eq!(found[0], PathBuf::from("/lib/io.via"));
        assert_eq!(found[1], PathBuf::from("/lib/io.viac"));
        assert_eq!(found[3], PathBuf::from("/lib/io/module.via"));
    }

    #[test]
    fn nested_qual_name_builds_directory_prefix() {
        let root = PathBuf::from("/lib");
        let qual = QualName::new(vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        let found = candidates(&root, &qual);
        assert_eq!(found[0], PathBuf::from("/lib/a/b/c.via"));
    }

    #[test]
    fn import_without_permission_is_denied() {
        let symbols = Rc::new(RefCell::new(SymbolTable::new()));
        let mut manager = ModuleManager::new(vec![PathBuf::from("/nonexistent")], symbols);
        let qual = QualName::single("io");
        let mut types = TypeContext::new();
        let mut diags = DiagContext::new();
        let err = manager.import(&qual, Permission::empty(), &mut types, &mut diags).unwrap_err();
        assert!(matches!(err, ImportError::PermissionDenied));
    }

    #[test]
    fn import_missing_module_is_not_found() {
        let symbols = Rc::new(RefCell::new(SymbolTable::new()));
        let mut manager = ModuleManager::new(vec![PathBuf::from("/nonexistent")], symbols);
        let qual = QualName::single("nope");
        let mut types = TypeContext::new();
        let mut diags = DiagContext::new();
        let err = manager.import(&qual, Permission::IMPORT, &mut types, &mut diags).unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[test]
    fn default_search_paths_only_returns_existing_lib_dirs() {
        // Doesn't assert a specific value (env-dependent); just that it
        // never panics and never returns a path without a `lib` suffix.
        for path in default_search_paths() {
            assert!(path.ends_with("lib"));
        }
    }
}
