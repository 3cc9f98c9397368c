//! The expression/statement/type tree (spec.md §3 "AST"): one node per
//! surface-syntax construct, each carrying its own [`SourceLoc`]. Owned by
//! a per-module arena in spirit; in practice `Box` already gives us a tree
//! with module-length lifetime, so no separate arena type is needed here
//! (unlike the IR, which has back-edges and genuinely needs one).

use via_core::{ConstValue, QualName, SourceLoc, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum UnaryOp {
    Neg,
    BitNot,
    Not,
    Ref,
}

/// Binary operators, spanning the full precedence table of spec.md §4.2.
/// `Is` is identity comparison, distinct from `Eq` (spec.md §4.4: "`==`/`!=`
/// on string operands compare by content; `is` compares identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Is,
    BitAnd,
    BitXor,
    BitOr,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AccessKind {
    /// `A::B` — static access, possibly a module export (spec.md §4.4).
    Static,
    /// `a.b` — dynamic/instance member access.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

/// A syntactic type reference, as written by the programmer, before name
/// resolution turns it into a `via_core::TypeId` (spec.md §4.4 resolves
/// these during IR building, not parsing — "the parser... does no name or
/// type resolution").
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum TypeExpr {
    Named(QualName, SourceLoc),
    Optional(Box<TypeExpr>, SourceLoc),
    Array(Box<TypeExpr>, SourceLoc),
    Map(Box<TypeExpr>, Box<TypeExpr>, SourceLoc),
    Function { params: Vec<TypeExpr>, ret: Box<TypeExpr>, loc: SourceLoc },
}

impl TypeExpr {
    pub fn loc(&self) -> SourceLoc {
        match self {
            TypeExpr::Named(_, loc)
            | TypeExpr::Optional(_, loc)
            | TypeExpr::Array(_, loc)
            | TypeExpr::Map(_, _, loc)
            | TypeExpr::Function { loc, .. } => *loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Param {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub default: Option<Expr>,
    pub loc: SourceLoc,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Expr {
    Literal(ConstValue, SourceLoc),
    Symbol(Symbol, SourceLoc),
    Unary { op: UnaryOp, operand: Box<Expr>, loc: SourceLoc },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr>, loc: SourceLoc },
    /// A parenthesized expression; kept distinct from its inner node only
    /// so diagnostics can point at the grouping itself when needed.
    Group(Box<Expr>, SourceLoc),
    Call { callee: Box<Expr>, args: Vec<Expr>, loc: SourceLoc },
    Subscript { target: Box<Expr>, index: Box<Expr>, loc: SourceLoc },
    Access { target: Box<Expr>, kind: AccessKind, member: Symbol, loc: SourceLoc },
    Cast { expr: Box<Expr>, ty: TypeExpr, loc: SourceLoc },
    /// `a if c else b` (spec.md §4.2 postfix ternary).
    Ternary { cond: Box<Expr>, if_true: Box<Expr>, if_false: Box<Expr>, loc: SourceLoc },
    Array(Vec<Expr>, SourceLoc),
    Tuple(Vec<Expr>, SourceLoc),
    Lambda { params: Vec<Param>, return_ty: Option<TypeExpr>, body: Vec<Stmt>, loc: SourceLoc },
}

impl Expr {
    pub fn loc(&self) -> SourceLoc {
        match self {
            Expr::Literal(_, loc)
            | Expr::Symbol(_, loc)
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Group(_, loc)
            | Expr::Call { loc, .. }
            | Expr::Subscript { loc, .. }
            | Expr::Access { loc, .. }
            | Expr::Cast { loc, .. }
            | Expr::Ternary { loc, .. }
            | Expr::Array(_, loc)
            | Expr::Tuple(_, loc)
            | Expr::Lambda { loc, .. } => *loc,
        }
    }
}

/// One `if`/`elif` arm; `cond: None` marks the trailing `else` (spec.md
/// §4.2: "the last optionally having a null condition = `else`").
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct IfBranch {
    pub cond: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum Stmt {
    VarDecl {
        name: Symbol,
        ty: Option<TypeExpr>,
        init: Option<Expr>,
        is_const: bool,
        loc: SourceLoc,
    },
    /// `do { ... }` — a bare scope (spec.md §4.2).
    Scope(Vec<Stmt>, SourceLoc),
    If { branches: Vec<IfBranch>, loc: SourceLoc },
    /// `for var x = e1, e2, e3 { ... }` — counting loop.
    ForCounting {
        var: Symbol,
        start: Expr,
        stop: Expr,
        step: Expr,
        body: Vec<Stmt>,
        loc: SourceLoc,
    },
    /// `for x in e { ... }` — iterator loop.
    ForIn { var: Symbol, iter: Expr, body: Vec<Stmt>, loc: SourceLoc },
    While { cond: Expr, body: Vec<Stmt>, loc: SourceLoc },
    Assign { target: Expr, op: AssignOp, value: Expr, loc: SourceLoc },
    Return { value: Option<Expr>, loc: SourceLoc },
    EnumDecl { name: Symbol, variants: Vec<Symbol>, loc: SourceLoc },
    Import { path: QualName, loc: SourceLoc },
    FuncDecl {
        name: Symbol,
        params: Vec<Param>,
        return_ty: TypeExpr,
        body: Vec<Stmt>,
        loc: SourceLoc,
    },
    StructDecl { name: Symbol, fields: Vec<(Symbol, TypeExpr)>, loc: SourceLoc },
    TypeDecl { name: Symbol, ty: TypeExpr, loc: SourceLoc },
    Expr(Expr, SourceLoc),
}

impl Stmt {
    pub fn loc(&self) -> SourceLoc {
        match self {
            Stmt::VarDecl { loc, .. }
            | Stmt::Scope(_, loc)
            | Stmt::If { loc, .. }
            | Stmt::ForCounting { loc, .. }
            | Stmt::ForIn { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::EnumDecl { loc, .. }
            | Stmt::Import { loc, .. }
            | Stmt::FuncDecl { loc, .. }
            | Stmt::StructDecl { loc, .. }
            | Stmt::TypeDecl { loc, .. }
            | Stmt::Expr(_, loc) => *loc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_loc_reaches_through_variants() {
        let loc = SourceLoc::new(3, 7);
        let e = Expr::Literal(ConstValue::Int(1), loc);
        assert_eq!(e.loc(), loc);
    }

    #[test]
    fn if_branch_none_cond_means_else() {
        let branch = IfBranch { cond: None, body: vec![] };
        assert!(branch.cond.is_none());
    }
}
