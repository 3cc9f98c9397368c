//! Per-module definition table (spec.md §3 "Definition (Def)"): the map
//! from exported symbol to the thing that symbol names, consulted both by
//! `GETIMPORT` at IR-build time (via [`crate::ir::ModuleAccessResolver`])
//! and at link time by the module manager.

use via_core::{ConstValue, QualType, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefKind {
    Source,
    Native,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefParam {
    pub name: Symbol,
    pub ty: QualType,
    pub default: Option<ConstValue>,
}

/// A function definition exported by a module. `entry` is meaningful only
/// for `DefKind::Source` (an index into the owning module's `ExecUnit`,
/// filled in by the emitter); native defs are looked up by name in the
/// loaded `NativeModuleInfo` at call time instead.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub kind: DefKind,
    pub symbol: Symbol,
    pub params: Vec<DefParam>,
    pub return_ty: QualType,
    pub entry: Option<u32>,
}

impl FunctionDef {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn required_arity(&self) -> usize {
        self.params.iter().take_while(|p| p.default.is_none()).count()
    }
}

/// One module's exported-symbol table (spec.md §3: "maps symbol ID to
/// `Def*`"). Only functions are modeled as definitions in this revision;
/// exported constants/types are resolved directly through the type/symbol
/// contexts instead of a `Def` variant, since spec.md §3 names
/// `FunctionDef` as the sole concrete `Def` variant.
#[derive(Debug, Default)]
pub struct DefTable {
    defs: std::collections::HashMap<Symbol, FunctionDef>,
}

impl DefTable {
    pub fn new() -> Self {
        DefTable::default()
    }

    /// Inserts `def`, returning the previous definition for the same
    /// symbol if one existed (the caller decides whether that's an error).
    pub fn insert(&mut self, def: FunctionDef) -> Option<FunctionDef> {
        self.defs.insert(def.symbol, def)
    }

    pub fn get(&self, symbol: Symbol) -> Option<&FunctionDef> {
        self.defs.get(&symbol)
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.defs.contains_key(&symbol)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &FunctionDef)> {
        self.defs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use via_core::{BuiltinKind, TypeContext};

    fn sample_def(ctx: &mut TypeContext, symbol: Symbol) -> FunctionDef {
        let int_ty = QualType::new(ctx.get_builtin(BuiltinKind::Int));
        FunctionDef {
            kind: DefKind::Source,
            symbol,
            params: vec![DefParam { name: Symbol::from_raw(1), ty: int_ty, default: None }],
            return_ty: int_ty,
            entry: Some(0),
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let mut ctx = TypeContext::new();
        let mut table = DefTable::new();
        let sym = Symbol::from_raw(42);
        table.insert(sample_def(&mut ctx, sym));
        assert!(table.contains(sym));
        assert_eq!(table.get(sym).unwrap().arity(), 1);
    }

    #[test]
    fn required_arity_excludes_defaulted_params() {
        let mut ctx = TypeContext::new();
        let int_ty = QualType::new(ctx.get_builtin(BuiltinKind::Int));
        let def = FunctionDef {
            kind: DefKind::Source,
            symbol: Symbol::from_raw(7),
            params: vec![
                DefParam { name: Symbol::from_raw(1), ty: int_ty, default: None },
                DefParam { name: Symbol::from_raw(2), ty: int_ty, default: Some(ConstValue::Int(0)) },
            ],
            return_ty: int_ty,
            entry: Some(0),
        };
        assert_eq!(def.arity(), 2);
        assert_eq!(def.required_arity(), 1);
    }
}
