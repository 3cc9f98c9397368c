//! The type-interning context: hash-consed, structurally-equal types
//! compared by pointer (here, index) equality (spec.md §3 Type, §4.3).
//!
//! `get_builtin(K) == get_builtin(K)`; two calls that describe the same
//! structure always return the same [`TypeId`] (spec.md §8 invariant 2),
//! so callers can use `==` on `TypeId` instead of a deep structural walk.

use crate::intern::Symbol;
use crate::macros::bitflags_like;
use std::collections::HashMap;
use std::fmt;

/// The five primitive kinds spec.md §3 names under `Builtin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum BuiltinKind {
    Nil,
    Bool,
    Int,
    Float,
    String,
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuiltinKind::Nil => "nil",
            BuiltinKind::Bool => "bool",
            BuiltinKind::Int => "int",
            BuiltinKind::Float => "float",
            BuiltinKind::String => "string",
        };
        f.write_str(s)
    }
}

/// A handle into a [`TypeContext`]. Two `TypeId`s compare equal iff the
/// types they name are structurally equal (hash-consing guarantees this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct TypeId(u32);

/// The canonical shape stored once per distinct type. Mirrors spec.md §3's
/// `Type` variants; `User`/`TemplateParam` key off [`Symbol`] rather than an
/// AST declaration pointer, since this core has no AST-node pointers to
/// hash (REDESIGN FLAGS §9: indices, not pointers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Shape {
    Builtin(BuiltinKind),
    Optional(TypeId),
    Array(TypeId),
    Map(TypeId, TypeId),
    Function(TypeId, Vec<TypeId>),
    User(Symbol),
    /// Placeholder for a template parameter (spec.md §3); not exercised by
    /// the grammar in this revision, carried for structural completeness.
    TemplateParam(Symbol),
    /// Placeholder for a template specialization (spec.md §3); likewise
    /// unexercised here.
    TemplateSpecialization(TypeId, Vec<TypeId>),
}

#[derive(Default)]
pub struct TypeContext {
    shapes: Vec<Shape>,
    index: HashMap<Shape, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        TypeContext::default()
    }

    fn intern(&mut self, shape: Shape) -> TypeId {
        if let Some(&id) = self.index.get(&shape) {
            return id;
        }
        let id = TypeId(self.shapes.len() as u32);
        self.shapes.push(shape.clone());
        self.index.insert(shape, id);
        id
    }

    pub fn get_builtin(&mut self, kind: BuiltinKind) -> TypeId {
        self.intern(Shape::Builtin(kind))
    }

    pub fn get_optional(&mut self, inner: TypeId) -> TypeId {
        self.intern(Shape::Optional(inner))
    }

    pub fn get_array(&mut self, inner: TypeId) -> TypeId {
        self.intern(Shape::Array(inner))
    }

    pub fn get_map(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.intern(Shape::Map(key, value))
    }

    pub fn get_function(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(Shape::Function(ret, params))
    }

    pub fn get_user(&mut self, decl: Symbol) -> TypeId {
        self.intern(Shape::User(decl))
    }

    pub fn get_template_param(&mut self, name: Symbol) -> TypeId {
        self.intern(Shape::TemplateParam(name))
    }

    pub fn get_specialization(&mut self, base: TypeId, args: Vec<TypeId>) -> TypeId {
        self.intern(Shape::TemplateSpecialization(base, args))
    }

    pub fn is_builtin(&self, id: TypeId, kind: BuiltinKind) -> bool {
        matches!(self.shapes[id.0 as usize], Shape::Builtin(k) if k == kind)
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.is_builtin(id, BuiltinKind::Int) || self.is_builtin(id, BuiltinKind::Float)
    }

    pub fn as_optional(&self, id: TypeId) -> Option<TypeId> {
        match self.shapes[id.0 as usize] {
            Shape::Optional(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_array(&self, id: TypeId) -> Option<TypeId> {
        match self.shapes[id.0 as usize] {
            Shape::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn as_map(&self, id: TypeId) -> Option<(TypeId, TypeId)> {
        match self.shapes[id.0 as usize] {
            Shape::Map(k, v) => Some((k, v)),
            _ => None,
        }
    }

    pub fn as_function(&self, id: TypeId) -> Option<(TypeId, &[TypeId])> {
        match &self.shapes[id.0 as usize] {
            Shape::Function(ret, params) => Some((*ret, params.as_slice())),
            _ => None,
        }
    }

    /// Renders a type for diagnostics. Not a pretty-printer (no color, no
    /// wrapping) — see spec.md §1's exclusion of pretty-printing colors.
    pub fn display(&self, id: TypeId) -> String {
        match &self.shapes[id.0 as usize] {
            Shape::Builtin(k) => k.to_string(),
            Shape::Optional(inner) => format!("{}?", self.display(*inner)),
            Shape::Array(inner) => format!("[{}]", self.display(*inner)),
            Shape::Map(k, v) => format!("[{}: {}]", self.display(*k), self.display(*v)),
            Shape::Function(ret, params) => {
                let params: Vec<String> = params.iter().map(|p| self.display(*p)).collect();
                format!("fn({}) -> {}", params.join(", "), self.display(*ret))
            }
            Shape::User(sym) => format!("<user:{sym}>"),
            Shape::TemplateParam(sym) => format!("<T:{sym}>"),
            Shape::TemplateSpecialization(base, args) => {
                let args: Vec<String> = args.iter().map(|a| self.display(*a)).collect();
                format!("{}<{}>", self.display(*base), args.join(", "))
            }
        }
    }
}

bitflags_like! {
    /// Modifiers on a [`QualType`]. `strong` requires `reference` (spec.md
    /// §3); this is enforced by [`Qualifiers::validated`], not by the bit
    /// representation itself.
    pub struct Qualifiers: u8 {
        const CONST = 0b001;
        const STRONG = 0b010;
        const REFERENCE = 0b100;
    }
}

impl Qualifiers {
    pub fn is_const(self) -> bool {
        self.contains(Qualifiers::CONST)
    }
    pub fn is_strong(self) -> bool {
        self.contains(Qualifiers::STRONG)
    }
    pub fn is_reference(self) -> bool {
        self.contains(Qualifiers::REFERENCE)
    }

    /// Returns `Err` if `strong` is set without `reference` (spec.md §3:
    /// "`strong` requires `reference`").
    pub fn validated(self) -> Result<Self, &'static str> {
        if self.is_strong() && !self.is_reference() {
            Err("qualifier 'strong' requires 'reference'")
        } else {
            Ok(self)
        }
    }
}

/// A [`TypeId`] plus its qualifier set (spec.md §3 `QualType`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualType {
    pub ty: TypeId,
    pub quals: Qualifiers,
}

impl QualType {
    pub fn new(ty: TypeId) -> Self {
        QualType { ty, quals: Qualifiers::empty() }
    }

    pub fn with_quals(ty: TypeId, quals: Qualifiers) -> Result<Self, &'static str> {
        Ok(QualType { ty, quals: quals.validated()? })
    }
}

/// Outcome of checking whether a cast from one [`QualType`] to another is
/// legal (spec.md §3 `cast_result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastResult {
    /// The cast always succeeds statically.
    Ok,
    /// The cast is only checked at runtime and may raise an error.
    Throw,
    /// The cast is never legal.
    Invalid,
}

/// Implements spec.md §3's cast-compatibility table.
pub fn cast_result(ctx: &TypeContext, from: QualType, to: QualType) -> CastResult {
    // Qualifier mismatches that drop const, flip strong, or flip reference
    // are INVALID, independent of the underlying type pair.
    if from.quals.is_const() && !to.quals.is_const() {
        return CastResult::Invalid;
    }
    if from.quals.is_strong() != to.quals.is_strong() {
        return CastResult::Invalid;
    }
    if from.quals.is_reference() != to.quals.is_reference() {
        return CastResult::Invalid;
    }

    if from.ty == to.ty {
        return CastResult::Ok;
    }
    if ctx.is_numeric(from.ty) && ctx.is_numeric(to.ty) {
        return CastResult::Ok;
    }
    if ctx.is_builtin(to.ty, BuiltinKind::String) {
        return CastResult::Ok;
    }
    if let Some(inner) = ctx.as_optional(from.ty) {
        if inner == to.ty {
            return CastResult::Throw;
        }
        if ctx.is_builtin(to.ty, BuiltinKind::Nil) {
            return CastResult::Throw;
        }
    }
    if let Some(elem) = ctx.as_array(from.ty)
        && let Some((key, value)) = ctx.as_map(to.ty)
        && value == elem
        && ctx.is_builtin(key, BuiltinKind::Int)
    {
        return CastResult::Ok;
    }
    CastResult::Invalid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_are_unique() {
        let mut ctx = TypeContext::new();
        let a = ctx.get_builtin(BuiltinKind::Int);
        let b = ctx.get_builtin(BuiltinKind::Int);
        assert_eq!(a, b);
        let c = ctx.get_builtin(BuiltinKind::Float);
        assert_ne!(a, c);
    }

    #[test]
    fn composite_types_are_pointer_equal_iff_structurally_equal() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        let arr1 = ctx.get_array(int);
        let arr2 = ctx.get_array(int);
        assert_eq!(arr1, arr2);

        let float = ctx.get_builtin(BuiltinKind::Float);
        let arr3 = ctx.get_array(float);
        assert_ne!(arr1, arr3);
    }

    #[test]
    fn strong_without_reference_is_rejected() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        assert!(QualType::with_quals(int, Qualifiers::STRONG).is_err());
        assert!(
            QualType::with_quals(int, Qualifiers::STRONG | Qualifiers::REFERENCE).is_ok()
        );
    }

    #[test]
    fn cast_numeric_to_numeric_is_ok() {
        let mut ctx = TypeContext::new();
        let int = QualType::new(ctx.get_builtin(BuiltinKind::Int));
        let float = QualType::new(ctx.get_builtin(BuiltinKind::Float));
        assert_eq!(cast_result(&ctx, int, float), CastResult::Ok);
    }

    #[test]
    fn cast_optional_to_inner_throws() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        let opt = QualType::new(ctx.get_optional(int));
        assert_eq!(cast_result(&ctx, opt, QualType::new(int)), CastResult::Throw);
    }

    #[test]
    fn cast_dropping_const_is_invalid() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        let const_int = QualType::with_quals(int, Qualifiers::CONST).unwrap();
        let plain_int = QualType::new(int);
        assert_eq!(cast_result(&ctx, const_int, plain_int), CastResult::Invalid);
    }

    #[test]
    fn cast_array_to_matching_int_map_is_ok() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        let arr = QualType::new(ctx.get_array(int));
        let map = QualType::new(ctx.get_map(int, int));
        assert_eq!(cast_result(&ctx, arr, map), CastResult::Ok);
    }

    #[test]
    fn cast_unrelated_types_is_invalid() {
        let mut ctx = TypeContext::new();
        let int = ctx.get_builtin(BuiltinKind::Int);
        let bool_ty = ctx.get_builtin(BuiltinKind::Bool);
        let arr = QualType::new(ctx.get_array(int));
        assert_eq!(cast_result(&ctx, arr, QualType::new(bool_ty)), CastResult::Invalid);
    }
}
