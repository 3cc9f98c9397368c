//! AST → typed IR in basic-block form (spec.md §4.4).
//!
//! Blocks and expression nodes live in index-based arenas (REDESIGN FLAGS
//! §9): `Id<Block>` and `Id<IrExprNode>` are plain `u32`s, so loop
//! back-edges are ordinary indices, no unsafe pointer graph required.

use std::collections::HashSet;

use via_core::{
    cast_result, BuiltinKind, CastResult, ConstValue, DiagContext, Diagnostic, Footnote, QualType,
    Symbol, SymbolTable, TypeContext, TypeId,
};
use via_core::{Arena, Id};

use crate::ast::{AccessKind, AssignOp, BinaryOp, Expr, IfBranch, Param, Program, Stmt, TypeExpr, UnaryOp};
use crate::frame::FrameStack;

/// A static-access target the builder can't resolve on its own (`A::B`
/// where `A` names an imported module). Implemented later by
/// `via_compiler::module::ModuleManager`; kept as a trait here for the same
/// reason `via_runtime::vm::ImportResolver` is a trait — so this module
/// doesn't need to know the concrete module-manager type.
pub trait ModuleAccessResolver {
    fn resolve_static_access(&mut self, module: Symbol, member: Symbol) -> Option<QualType>;
    fn is_module(&self, name: Symbol) -> bool;
}

/// No modules are ever imported; used by standalone/unit-test builds.
pub struct NoModules;
impl ModuleAccessResolver for NoModules {
    fn resolve_static_access(&mut self, _module: Symbol, _member: Symbol) -> Option<QualType> {
        None
    }
    fn is_module(&self, _name: Symbol) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct LocalInfo {
    ty: QualType,
    is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrExpr {
    Constant(ConstValue),
    Local(Symbol),
    ModuleAccess { module: Symbol, key: Symbol },
    Access { target: Id<IrExprNode>, member: Symbol, kind: AccessKind },
    Unary { op: UnaryOp, operand: Id<IrExprNode> },
    Binary { op: BinaryOp, lhs: Id<IrExprNode>, rhs: Id<IrExprNode> },
    /// Inserted by the builder ahead of a float-family binary op when the
    /// other operand is float and this one is int (spec.md §4.7: "the
    /// emitter... insert `TOFLOAT` coercions"; the builder records where).
    ToFloat(Id<IrExprNode>),
    Cast { expr: Id<IrExprNode>, to: TypeId },
    /// `cond ? if_true : if_false`; also how the builder desugars `&&`/`||`
    /// short-circuiting (`lhs && rhs` becomes `Select{cond: lhs, if_true:
    /// rhs, if_false: lhs}`, `lhs || rhs` becomes `Select{cond: lhs,
    /// if_true: lhs, if_false: rhs}`), since none of these have a single
    /// non-short-circuiting bytecode opcode to lower into directly.
    Select { cond: Id<IrExprNode>, if_true: Id<IrExprNode>, if_false: Id<IrExprNode> },
    Call { callee: Id<IrExprNode>, args: Vec<Id<IrExprNode>> },
    Subscript { target: Id<IrExprNode>, index: Id<IrExprNode> },
    Array(Vec<Id<IrExprNode>>),
    Tuple(Vec<Id<IrExprNode>>),
    /// A reference already poisoned upstream; carries no further meaning.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrExprNode {
    pub expr: IrExpr,
    pub ty: Option<QualType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IrStmt {
    VarDecl { symbol: Symbol, value: Option<Id<IrExprNode>>, is_const: bool },
    Assign { target: Id<IrExprNode>, value: Id<IrExprNode> },
    Expr(Id<IrExprNode>),
    /// Brackets a branch/loop body so the VM can discard transient locals
    /// on exit (spec.md §4.4: "Surrounding SAVE/RESTORE IR instructions
    /// bracket each branch body").
    Save,
    Restore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Return { value: Option<Id<IrExprNode>>, implicit: bool },
    Branch(Id<Block>),
    CondBranch { cond: Id<IrExprNode>, if_true: Id<Block>, if_false: Id<Block> },
    Continue,
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: u32,
    pub stmts: Vec<IrStmt>,
    pub term: Option<Term>,
}

impl Block {
    fn new(label: u32) -> Self {
        Block { label, stmts: Vec::new(), term: None }
    }
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: Symbol,
    pub params: Vec<(Symbol, QualType)>,
    pub return_ty: QualType,
    pub entry: Id<Block>,
}

#[derive(Debug, Default)]
pub struct IrModule {
    pub exprs: Arena<IrExprNode>,
    pub blocks: Arena<Block>,
    pub functions: Vec<IrFunction>,
    /// Entry block for statements at module scope (var decls, imports,
    /// top-level expressions); `None` only in a freshly-defaulted,
    /// not-yet-built `IrModule`.
    pub top_level: Option<Id<Block>>,
    pub imports: Vec<via_core::QualName>,
}

struct FunctionSig {
    /// `(name, type, has_default)` — the default's value isn't needed here,
    /// only whether a missing argument at this position is legal.
    params: Vec<(Symbol, QualType, bool)>,
    return_ty: QualType,
}

pub struct IrBuilder<'a> {
    types: &'a mut TypeContext,
    symbols: &'a mut SymbolTable,
    diags: &'a mut DiagContext,
    resolver: &'a mut dyn ModuleAccessResolver,
    frames: FrameStack<LocalInfo>,
    poisoned: HashSet<Symbol>,
    signatures: std::collections::HashMap<Symbol, FunctionSig>,
    next_block_id: u32,
    module: IrModule,
    in_import_allowed_position: bool,
    seen_imports: std::collections::HashMap<String, via_core::SourceLoc>,
}

impl<'a> IrBuilder<'a> {
    pub fn new(
        types: &'a mut TypeContext,
        symbols: &'a mut SymbolTable,
        diags: &'a mut DiagContext,
        resolver: &'a mut dyn ModuleAccessResolver,
    ) -> Self {
        IrBuilder {
            types,
            symbols,
            diags,
            resolver,
            frames: FrameStack::new(),
            poisoned: HashSet::new(),
            signatures: std::collections::HashMap::new(),
            next_block_id: 0,
            module: IrModule::default(),
            in_import_allowed_position: true,
            seen_imports: std::collections::HashMap::new(),
        }
    }

    fn new_block(&mut self) -> Id<Block> {
        let label = self.next_block_id;
        self.next_block_id += 1;
        self.module.blocks.alloc(Block::new(label))
    }

    fn push_expr(&mut self, expr: IrExpr, ty: Option<QualType>) -> Id<IrExprNode> {
        self.module.exprs.alloc(IrExprNode { expr, ty })
    }

    pub fn build(mut self, program: &Program) -> IrModule {
        self.frames.push_frame();

        // First pass: collect top-level function signatures so calls can
        // forward-reference (and recurse) regardless of declaration order.
        for stmt in &program.stmts {
            if let Stmt::FuncDecl { name, params, return_ty, .. } = stmt {
                let sig = self.build_signature(params, return_ty);
                self.signatures.insert(*name, sig);
            }
        }

        let top = self.new_block();
        let mut cursor = top;
        for stmt in &program.stmts {
            match stmt {
                Stmt::FuncDecl { .. } => {
                    self.lower_func_decl(stmt);
                }
                _ => {
                    cursor = self.lower_stmt_into(cursor, stmt);
                }
            }
        }
        let _ = cursor;
        self.module.top_level = Some(top);
        self.frames.pop_frame();
        self.module
    }

    fn build_signature(&mut self, params: &[Param], return_ty: &TypeExpr) -> FunctionSig {
        let params = params
            .iter()
            .map(|p| {
                let ty = self.resolve_type_expr(&p.ty);
                (p.name, ty, p.default.is_some())
            })
            .collect();
        let return_ty = self.resolve_type_expr(return_ty);
        FunctionSig { params, return_ty }
    }

    fn resolve_type_expr(&mut self, ty: &TypeExpr) -> QualType {
        match ty {
            TypeExpr::Named(name, _) => {
                let kind = match name.last() {
                    "nil" => Some(BuiltinKind::Nil),
                    "bool" => Some(BuiltinKind::Bool),
                    "int" => Some(BuiltinKind::Int),
                    "float" => Some(BuiltinKind::Float),
                    "string" => Some(BuiltinKind::String),
                    _ => None,
                };
                let id = match kind {
                    Some(k) => self.types.get_builtin(k),
                    None => {
                        let sym = self.symbols.intern_qual(name);
                        self.types.get_user(sym)
                    }
                };
                QualType::new(id)
            }
            TypeExpr::Optional(inner, _) => {
                let inner_ty = self.resolve_type_expr(inner);
                QualType::new(self.types.get_optional(inner_ty.ty))
            }
            TypeExpr::Array(inner, _) => {
                let inner_ty = self.resolve_type_expr(inner);
                QualType::new(self.types.get_array(inner_ty.ty))
            }
            TypeExpr::Map(key, value, _) => {
                let key_ty = self.resolve_type_expr(key);
                let value_ty = self.resolve_type_expr(value);
                QualType::new(self.types.get_map(key_ty.ty, value_ty.ty))
            }
            TypeExpr::Function { params, ret, .. } => {
                let param_tys: Vec<TypeId> = params.iter().map(|p| self.resolve_type_expr(p).ty).collect();
                let ret_ty = self.resolve_type_expr(ret);
                QualType::new(self.types.get_function(ret_ty.ty, param_tys))
            }
        }
    }

    // -- statements ---------------------------------------------------------

    /// Lowers `stmt` into `block`, returning the block execution should
    /// continue in afterward (control-flow statements split the block).
    fn lower_stmt_into(&mut self, block: Id<Block>, stmt: &Stmt) -> Id<Block> {
        match stmt {
            Stmt::VarDecl { name, init, is_const, ty, .. } => {
                let (value_id, inferred) = match init {
                    Some(expr) => {
                        let (id, ty) = self.lower_expr(expr);
                        (Some(id), ty)
                    }
                    None => (None, None),
                };
                let declared = ty.as_ref().map(|t| self.resolve_type_expr(t));
                let final_ty = declared.or(inferred).unwrap_or_else(|| QualType::new(self.types.get_builtin(BuiltinKind::Nil)));
                self.frames.declare(*name, LocalInfo { ty: final_ty, is_const: *is_const });
                self.module.blocks.get_mut(block).stmts.push(IrStmt::VarDecl {
                    symbol: *name,
                    value: value_id,
                    is_const: *is_const,
                });
                block
            }
            Stmt::Scope(body, _) => self.lower_body_in_new_frame(block, body),
            Stmt::Expr(expr, _) => {
                let (id, _) = self.lower_expr(expr);
                self.module.blocks.get_mut(block).stmts.push(IrStmt::Expr(id));
                block
            }
            Stmt::Assign { target, op, value, .. } => {
                let (target_id, target_ty) = self.lower_expr(target);
                let (mut value_id, value_ty) = self.lower_expr(value);
                if *op != AssignOp::Assign {
                    let bin_op = compound_to_binary(*op);
                    let (result_ty, needs_float) = self.check_binary(bin_op, target_ty, value_ty, target.loc());
                    if needs_float {
                        value_id = self.push_expr(IrExpr::ToFloat(value_id), value_ty);
                    }
                    value_id = self.push_expr(IrExpr::Binary { op: bin_op, lhs: target_id, rhs: value_id }, result_ty);
                }
                self.module.blocks.get_mut(block).stmts.push(IrStmt::Assign { target: target_id, value: value_id });
                block
            }
            Stmt::If { branches, .. } => self.lower_if(block, branches),
            Stmt::While { cond, body, .. } => self.lower_while(block, cond, body),
            Stmt::ForCounting { var, start, stop, step, body, .. } => {
                self.lower_for_counting(block, *var, start, stop, step, body)
            }
            Stmt::ForIn { var, iter, body, .. } => self.lower_for_in(block, *var, iter, body),
            Stmt::Return { value, loc } => {
                let value_id = value.as_ref().map(|e| self.lower_expr(e).0);
                self.module.blocks.get_mut(block).term = Some(Term::Return { value: value_id, implicit: false });
                let _ = loc;
                self.new_block()
            }
            Stmt::Import { path, loc } => {
                if !self.in_import_allowed_position {
                    self.diags.push(Diagnostic::error(*loc, "import statements may not appear nested"));
                } else {
                    let joined = path.joined();
                    if let Some(prior) = self.seen_imports.get(&joined) {
                        self.diags.push(Diagnostic::error(*loc, format!("duplicate import of '{joined}'")));
                        self.diags.push(Diagnostic::info(*prior, "previous import was here"));
                    } else {
                        self.seen_imports.insert(joined, *loc);
                        self.module.imports.push(path.clone());
                    }
                }
                block
            }
            Stmt::EnumDecl { name, variants, .. } => {
                // Enum variants become user-typed int-ish constants for name
                // resolution purposes; the variant list itself is recorded
                // on the module for the definition table (def.rs) to pick up.
                let user_ty = QualType::new(self.types.get_user(*name));
                for (i, variant) in variants.iter().enumerate() {
                    let _ = i;
                    self.frames.declare(*variant, LocalInfo { ty: user_ty, is_const: true });
                }
                block
            }
            Stmt::StructDecl { name, .. } => {
                let _ = self.types.get_user(*name);
                block
            }
            Stmt::TypeDecl { name, ty, .. } => {
                let resolved = self.resolve_type_expr(ty);
                let _ = resolved;
                let _ = self.types.get_user(*name);
                block
            }
            Stmt::FuncDecl { .. } => block, // handled in a separate pass by `build`/`lower_func_decl`
        }
    }

    fn lower_body_in_new_frame(&mut self, entry: Id<Block>, body: &[Stmt]) -> Id<Block> {
        self.frames.push_frame();
        self.module.blocks.get_mut(entry).stmts.push(IrStmt::Save);
        let mut cursor = entry;
        for stmt in body {
            cursor = self.lower_stmt_into(cursor, stmt);
        }
        self.module.blocks.get_mut(cursor).stmts.push(IrStmt::Restore);
        self.frames.pop_frame();
        cursor
    }

    fn lower_if(&mut self, block: Id<Block>, branches: &[IfBranch]) -> Id<Block> {
        let merge = self.new_block();
        let mut current = block;
        for branch in branches {
            match &branch.cond {
                Some(cond) => {
                    let (cond_id, _) = self.lower_expr(cond);
                    let then_entry = self.new_block();
                    let next = self.new_block();
                    self.module.blocks.get_mut(current).term =
                        Some(Term::CondBranch { cond: cond_id, if_true: then_entry, if_false: next });
                    let then_exit = self.lower_body_in_new_frame(then_entry, &branch.body);
                    self.module.blocks.get_mut(then_exit).term = Some(Term::Branch(merge));
                    current = next;
                }
                None => {
                    let else_exit = self.lower_body_in_new_frame(current, &branch.body);
                    self.module.blocks.get_mut(else_exit).term = Some(Term::Branch(merge));
                    return merge;
                }
            }
        }
        self.module.blocks.get_mut(current).term = Some(Term::Branch(merge));
        merge
    }

    fn lower_while(&mut self, block: Id<Block>, cond: &Expr, body: &[Stmt]) -> Id<Block> {
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let merge = self.new_block();
        self.module.blocks.get_mut(block).term = Some(Term::Branch(cond_block));

        let (cond_id, _) = self.lower_expr_in_block(cond_block, cond);
        self.module.blocks.get_mut(cond_block).term =
            Some(Term::CondBranch { cond: cond_id, if_true: body_block, if_false: merge });

        let body_exit = self.lower_body_in_new_frame(body_block, body);
        // Back-edge: the loop body jumps back to the condition check, a
        // plain `Id<Block>` pointing to an already-built block — no unsafe,
        // no placeholder needed since `cond_block` was built first.
        self.module.blocks.get_mut(body_exit).term = Some(Term::Branch(cond_block));
        merge
    }

    fn lower_for_counting(
        &mut self,
        block: Id<Block>,
        var: Symbol,
        start: &Expr,
        stop: &Expr,
        step: &Expr,
        body: &[Stmt],
    ) -> Id<Block> {
        let (start_id, start_ty) = self.lower_expr(start);
        let (stop_id, _) = self.lower_expr(stop);
        let (step_id, _) = self.lower_expr(step);
        let int_ty = start_ty.unwrap_or_else(|| QualType::new(self.types.get_builtin(BuiltinKind::Int)));
        self.module.blocks.get_mut(block).stmts.push(IrStmt::VarDecl { symbol: var, value: Some(start_id), is_const: false });

        let cond_block = self.new_block();
        let body_block = self.new_block();
        let merge = self.new_block();
        self.module.blocks.get_mut(block).term = Some(Term::Branch(cond_block));

        self.frames.push_frame();
        self.frames.declare(var, LocalInfo { ty: int_ty, is_const: false });
        let var_expr = self.push_expr(IrExpr::Local(var), Some(int_ty));
        let cond_id = self.push_expr(IrExpr::Binary { op: BinaryOp::Lt, lhs: var_expr, rhs: stop_id }, Some(QualType::new(self.types.get_builtin(BuiltinKind::Bool))));
        self.module.blocks.get_mut(cond_block).term =
            Some(Term::CondBranch { cond: cond_id, if_true: body_block, if_false: merge });

        let mut cursor = body_block;
        self.module.blocks.get_mut(cursor).stmts.push(IrStmt::Save);
        for stmt in body {
            cursor = self.lower_stmt_into(cursor, stmt);
        }
        let step_expr = self.push_expr(IrExpr::Binary { op: BinaryOp::Add, lhs: var_expr, rhs: step_id }, Some(int_ty));
        self.module.blocks.get_mut(cursor).stmts.push(IrStmt::Restore);
        self.module.blocks.get_mut(cursor).stmts.push(IrStmt::Assign { target: var_expr, value: step_expr });
        self.module.blocks.get_mut(cursor).term = Some(Term::Branch(cond_block));
        self.frames.pop_frame();
        merge
    }

    fn lower_for_in(&mut self, block: Id<Block>, var: Symbol, iter: &Expr, body: &[Stmt]) -> Id<Block> {
        let (iter_id, iter_ty) = self.lower_expr(iter);
        let elem_ty = iter_ty
            .and_then(|t| self.types.as_array(t.ty))
            .map(QualType::new)
            .unwrap_or_else(|| QualType::new(self.types.get_builtin(BuiltinKind::Nil)));
        self.module.blocks.get_mut(block).stmts.push(IrStmt::VarDecl { symbol: var, value: None, is_const: false });
        let cond_block = self.new_block();
        let body_block = self.new_block();
        let merge = self.new_block();
        self.module.blocks.get_mut(block).term = Some(Term::Branch(cond_block));

        self.frames.push_frame();
        self.frames.declare(var, LocalInfo { ty: elem_ty, is_const: false });
        // Iteration bookkeeping (cursor index, length check) is a runtime
        // concern the emitter lowers mechanically; at IR level a `for..in`
        // is simply "does the iterable have a next element".
        let has_next = self.push_expr(IrExpr::Call { callee: iter_id, args: vec![] }, Some(QualType::new(self.types.get_builtin(BuiltinKind::Bool))));
        self.module.blocks.get_mut(cond_block).term =
            Some(Term::CondBranch { cond: has_next, if_true: body_block, if_false: merge });

        let body_exit = self.lower_body_in_new_frame(body_block, body);
        self.module.blocks.get_mut(body_exit).term = Some(Term::Branch(cond_block));
        self.frames.pop_frame();
        merge
    }

    fn lower_func_decl(&mut self, stmt: &Stmt) {
        let Stmt::FuncDecl { name, params, return_ty, body, loc } = stmt else { unreachable!() };
        let sig_return_ty = self.resolve_type_expr(return_ty);

        self.frames.push_frame();
        let mut param_infos = Vec::new();
        for p in params {
            let ty = self.resolve_type_expr(&p.ty);
            self.frames.declare(p.name, LocalInfo { ty, is_const: false });
            param_infos.push((p.name, ty));
        }

        let entry = self.new_block();
        let was_allowed = self.in_import_allowed_position;
        self.in_import_allowed_position = false;
        let mut cursor = entry;
        for stmt in body {
            cursor = self.lower_stmt_into(cursor, stmt);
        }
        self.in_import_allowed_position = was_allowed;

        // Implicit `return nil` if the final block fell off the end
        // without a terminator (spec.md §4.4).
        if self.module.blocks.get(cursor).term.is_none() {
            self.module.blocks.get_mut(cursor).term = Some(Term::Return { value: None, implicit: true });
        }

        self.verify_all_paths_return(entry, sig_return_ty, *name, *loc);
        self.frames.pop_frame();

        self.module.functions.push(IrFunction { name: *name, params: param_infos, return_ty: sig_return_ty, entry });
    }

    /// DFS over reachable blocks from `entry`, checking every `Return`
    /// terminator's type against `declared` and that every path through the
    /// function actually reaches one (spec.md §4.4).
    fn verify_all_paths_return(&mut self, entry: Id<Block>, declared: QualType, func: Symbol, loc: via_core::SourceLoc) {
        let mut visited = HashSet::new();
        let mut stack = vec![entry];
        let mut saw_dead_end = false;
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let block = self.module.blocks.get(id).clone();
            match &block.term {
                Some(Term::Return { value, implicit }) => {
                    if let Some(value_id) = value {
                        let actual = self.module.exprs.get(*value_id).ty;
                        if let Some(actual) = actual {
                            if actual.ty != declared.ty {
                                let mut diag = Diagnostic::error(
                                    loc,
                                    format!(
                                        "function '{}' returns '{}' but declared return type is '{}'",
                                        self.symbols.resolve(func),
                                        self.types.display(actual.ty),
                                        self.types.display(declared.ty)
                                    ),
                                );
                                if *implicit {
                                    diag = diag.with_footnote(Footnote::note("implicit return here"));
                                }
                                self.diags.push(diag);
                            }
                        }
                    } else if !self.types.is_builtin(declared.ty, BuiltinKind::Nil) {
                        let mut diag = Diagnostic::error(
                            loc,
                            format!("function '{}' must return a value of type '{}'", self.symbols.resolve(func), self.types.display(declared.ty)),
                        );
                        if *implicit {
                            diag = diag.with_footnote(Footnote::note("implicit return here"));
                        }
                        self.diags.push(diag);
                    }
                }
                Some(Term::Branch(next)) => stack.push(*next),
                Some(Term::CondBranch { if_true, if_false, .. }) => {
                    stack.push(*if_true);
                    stack.push(*if_false);
                }
                Some(Term::Continue) | Some(Term::Break) => {}
                None => saw_dead_end = true,
            }
        }
        if saw_dead_end {
            self.diags.push(Diagnostic::error(loc, format!("function '{}' does not terminate on every path", self.symbols.resolve(func))));
        }
    }

    // -- expressions ----------------------------------------------------------

    fn lower_expr_in_block(&mut self, block: Id<Block>, expr: &Expr) -> (Id<IrExprNode>, Option<QualType>) {
        // Binary-condition expressions for loop headers have no statements
        // of their own, but reserving the block keeps emit.rs's "one block
        // per label" invariant uniform even for empty condition blocks.
        let _ = block;
        self.lower_expr(expr)
    }

    fn lower_expr(&mut self, expr: &Expr) -> (Id<IrExprNode>, Option<QualType>) {
        match expr {
            Expr::Literal(value, _) => {
                let ty = QualType::new(match value {
                    ConstValue::Nil => self.types.get_builtin(BuiltinKind::Nil),
                    ConstValue::Bool(_) => self.types.get_builtin(BuiltinKind::Bool),
                    ConstValue::Int(_) => self.types.get_builtin(BuiltinKind::Int),
                    ConstValue::Float(_) => self.types.get_builtin(BuiltinKind::Float),
                    ConstValue::Str(_) => self.types.get_builtin(BuiltinKind::String),
                });
                let id = self.push_expr(IrExpr::Constant(value.clone()), Some(ty));
                (id, Some(ty))
            }
            Expr::Symbol(sym, loc) => {
                if self.poisoned.contains(sym) {
                    return (self.push_expr(IrExpr::Error, None), None);
                }
                match self.frames.resolve(*sym) {
                    Some(info) => {
                        let ty = info.ty;
                        (self.push_expr(IrExpr::Local(*sym), Some(ty)), Some(ty))
                    }
                    None if self.signatures.contains_key(sym) => {
                        // A reference to a top-level function by name (the
                        // callee of a `Call`, or a bare function value):
                        // top-level functions live in `signatures`, not the
                        // frame stack, since `build()` lowers them in a
                        // separate pass from ordinary statements.
                        let sig = &self.signatures[sym];
                        let ret_ty = sig.return_ty;
                        let param_tys: Vec<TypeId> = sig.params.iter().map(|(_, ty, _)| ty.ty).collect();
                        let fn_ty = QualType::new(self.types.get_function(ret_ty.ty, param_tys));
                        (self.push_expr(IrExpr::Local(*sym), Some(fn_ty)), Some(fn_ty))
                    }
                    None => {
                        self.poisoned.insert(*sym);
                        self.diags.push(
                            Diagnostic::error(*loc, format!("undefined symbol '{}'", self.symbols.resolve(*sym)))
                                .with_footnote(Footnote::hint("check spelling, or that it's declared before this use")),
                        );
                        (self.push_expr(IrExpr::Error, None), None)
                    }
                }
            }
            Expr::Group(inner, _) => self.lower_expr(inner),
            Expr::Unary { op, operand, loc } => {
                let (id, ty) = self.lower_expr(operand);
                let result_ty = self.check_unary(*op, ty, *loc);
                (self.push_expr(IrExpr::Unary { op: *op, operand: id }, result_ty), result_ty)
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs, .. } => {
                // Short-circuiting `||` has no bytecode opcode of its own;
                // the builder desugars it to a select so emit.rs can lower
                // it via a branch around the (unevaluated-unless-needed)
                // right-hand side, same as `if`.
                let (lhs_id, lhs_ty) = self.lower_expr(lhs);
                let (rhs_id, rhs_ty) = self.lower_expr(rhs);
                let ty = lhs_ty.or(rhs_ty);
                (self.push_expr(IrExpr::Select { cond: lhs_id, if_true: lhs_id, if_false: rhs_id }, ty), ty)
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs, .. } => {
                let (lhs_id, lhs_ty) = self.lower_expr(lhs);
                let (rhs_id, rhs_ty) = self.lower_expr(rhs);
                let ty = lhs_ty.or(rhs_ty);
                (self.push_expr(IrExpr::Select { cond: lhs_id, if_true: rhs_id, if_false: lhs_id }, ty), ty)
            }
            Expr::Binary { op, lhs, rhs, loc } => {
                let (lhs_id, lhs_ty) = self.lower_expr(lhs);
                let (mut rhs_id, rhs_ty) = self.lower_expr(rhs);
                let (result_ty, needs_float_rhs) = self.check_binary(*op, lhs_ty, rhs_ty, *loc);
                let mut final_lhs = lhs_id;
                if needs_float_rhs {
                    let float_ty = Some(QualType::new(self.types.get_builtin(BuiltinKind::Float)));
                    if matches!(lhs_ty, Some(t) if self.types.is_builtin(t.ty, BuiltinKind::Int)) {
                        final_lhs = self.push_expr(IrExpr::ToFloat(lhs_id), float_ty);
                    } else {
                        rhs_id = self.push_expr(IrExpr::ToFloat(rhs_id), float_ty);
                    }
                }
                (self.push_expr(IrExpr::Binary { op: *op, lhs: final_lhs, rhs: rhs_id }, result_ty), result_ty)
            }
            Expr::Call { callee, args, loc } => {
                let (callee_id, callee_ty) = self.lower_expr(callee);
                let arg_ids: Vec<(Id<IrExprNode>, Option<QualType>)> = args.iter().map(|a| self.lower_expr(a)).collect();
                let return_ty = self.check_call(callee, &arg_ids, *loc);
                let _ = callee_ty;
                let ids = arg_ids.into_iter().map(|(id, _)| id).collect();
                (self.push_expr(IrExpr::Call { callee: callee_id, args: ids }, return_ty), return_ty)
            }
            Expr::Subscript { target, index, .. } => {
                let (target_id, target_ty) = self.lower_expr(target);
                let (index_id, _) = self.lower_expr(index);
                let result_ty = target_ty.and_then(|t| {
                    self.types.as_array(t.ty).or_else(|| self.types.as_map(t.ty).map(|(_, v)| v)).map(QualType::new)
                });
                (self.push_expr(IrExpr::Subscript { target: target_id, index: index_id }, result_ty), result_ty)
            }
            Expr::Access { target, kind, member, loc } => self.lower_access(target, *kind, *member, *loc),
            Expr::Cast { expr, ty, loc } => {
                let (expr_id, expr_ty) = self.lower_expr(expr);
                let to_ty = self.resolve_type_expr(ty);
                if let Some(from) = expr_ty {
                    match cast_result(self.types, from, to_ty) {
                        CastResult::Invalid => {
                            self.diags.push(Diagnostic::error(
                                *loc,
                                format!("cannot cast '{}' to '{}'", self.types.display(from.ty), self.types.display(to_ty.ty)),
                            ));
                        }
                        _ if from.ty == to_ty.ty => {
                            self.diags.push(
                                Diagnostic::warning(*loc, "redundant cast")
                                    .with_footnote(Footnote::suggestion("remove this cast")),
                            );
                        }
                        _ => {}
                    }
                }
                (self.push_expr(IrExpr::Cast { expr: expr_id, to: to_ty.ty }, Some(to_ty)), Some(to_ty))
            }
            Expr::Ternary { cond, if_true, if_false, .. } => {
                let (cond_id, _) = self.lower_expr(cond);
                let (true_id, true_ty) = self.lower_expr(if_true);
                let (false_id, false_ty) = self.lower_expr(if_false);
                let ty = true_ty.or(false_ty);
                (self.push_expr(IrExpr::Select { cond: cond_id, if_true: true_id, if_false: false_id }, ty), ty)
            }
            Expr::Array(items, _) => {
                let mut ids = Vec::with_capacity(items.len());
                let mut elem_ty = None;
                for item in items {
                    let (id, ty) = self.lower_expr(item);
                    elem_ty = elem_ty.or(ty);
                    ids.push(id);
                }
                let result_ty = elem_ty.map(|t| QualType::new(self.types.get_array(t.ty)));
                (self.push_expr(IrExpr::Array(ids), result_ty), result_ty)
            }
            Expr::Tuple(items, _) => {
                let ids = items.iter().map(|i| self.lower_expr(i).0).collect();
                (self.push_expr(IrExpr::Tuple(ids), None), None)
            }
            Expr::Lambda { params, return_ty, .. } => {
                let ret = return_ty.as_ref().map(|t| self.resolve_type_expr(t)).unwrap_or_else(|| QualType::new(self.types.get_builtin(BuiltinKind::Nil)));
                let param_tys: Vec<TypeId> = params.iter().map(|p| self.resolve_type_expr(&p.ty).ty).collect();
                let fn_ty = QualType::new(self.types.get_function(ret.ty, param_tys));
                // Lambda bodies are lowered as synthetic top-level functions
                // by the caller once a name has been minted for them
                // (anonymous functions get `lambda#<n>` style names in
                // def.rs); here we only record the static type.
                (self.push_expr(IrExpr::Error, Some(fn_ty)), Some(fn_ty))
            }
        }
    }

    fn lower_access(&mut self, target: &Expr, kind: AccessKind, member: Symbol, loc: via_core::SourceLoc) -> (Id<IrExprNode>, Option<QualType>) {
        if kind == AccessKind::Static {
            if let Expr::Symbol(module_sym, _) = target {
                if self.resolver.is_module(*module_sym) {
                    let resolved = self.resolver.resolve_static_access(*module_sym, member);
                    if resolved.is_none() {
                        self.diags.push(Diagnostic::error(
                            loc,
                            format!("module '{}' has no export named '{}'", self.symbols.resolve(*module_sym), self.symbols.resolve(member)),
                        ));
                    }
                    return (self.push_expr(IrExpr::ModuleAccess { module: *module_sym, key: member }, resolved), resolved);
                }
            }
        }
        let (target_id, _) = self.lower_expr(target);
        (self.push_expr(IrExpr::Access { target: target_id, member, kind }, None), None)
    }

    fn check_unary(&mut self, op: UnaryOp, ty: Option<QualType>, loc: via_core::SourceLoc) -> Option<QualType> {
        let ty = ty?;
        let ok = match op {
            UnaryOp::Neg => self.types.is_numeric(ty.ty),
            UnaryOp::BitNot => self.types.is_builtin(ty.ty, BuiltinKind::Int),
            UnaryOp::Not => self.types.is_builtin(ty.ty, BuiltinKind::Bool),
            UnaryOp::Ref => true,
        };
        if !ok {
            self.diags.push(Diagnostic::error(loc, format!("operator does not apply to type '{}'", self.types.display(ty.ty))));
            return None;
        }
        Some(ty)
    }

    /// Returns the result type and whether the RHS (or, symmetrically, the
    /// int-typed side) needs a `TOFLOAT` coercion before the op lowers.
    fn check_binary(&mut self, op: BinaryOp, lhs: Option<QualType>, rhs: Option<QualType>, loc: via_core::SourceLoc) -> (Option<QualType>, bool) {
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else { return (None, false) };
        let bool_ty = QualType::new(self.types.get_builtin(BuiltinKind::Bool));
        match op {
            BinaryOp::Or | BinaryOp::And => (Some(bool_ty), false),
            BinaryOp::Is => (Some(bool_ty), false),
            BinaryOp::Eq | BinaryOp::Ne => {
                if self.types.is_numeric(lhs.ty) && self.types.is_numeric(rhs.ty) {
                    let float_kind = self.types.get_builtin(BuiltinKind::Float);
                    let mixed = (lhs.ty == float_kind) != (rhs.ty == float_kind);
                    (Some(bool_ty), mixed)
                } else {
                    (Some(bool_ty), false)
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                if self.types.is_numeric(lhs.ty) && self.types.is_numeric(rhs.ty) {
                    let float_kind = self.types.get_builtin(BuiltinKind::Float);
                    let mixed = (lhs.ty == float_kind) != (rhs.ty == float_kind);
                    (Some(bool_ty), mixed)
                } else {
                    self.diags.push(Diagnostic::error(loc, "comparison requires numeric operands"));
                    (None, false)
                }
            }
            BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr | BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Mod => {
                let int_ty = self.types.get_builtin(BuiltinKind::Int);
                if lhs.ty == int_ty && rhs.ty == int_ty {
                    (Some(QualType::new(int_ty)), false)
                } else {
                    self.diags.push(Diagnostic::error(loc, "this operator is restricted to 'int'"));
                    (None, false)
                }
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
                if !self.types.is_numeric(lhs.ty) || !self.types.is_numeric(rhs.ty) {
                    self.diags.push(Diagnostic::error(loc, "arithmetic requires numeric operands"));
                    return (None, false);
                }
                let float_kind = self.types.get_builtin(BuiltinKind::Float);
                let mixed = (lhs.ty == float_kind) != (rhs.ty == float_kind);
                if lhs.ty == float_kind || rhs.ty == float_kind {
                    (Some(QualType::new(float_kind)), mixed)
                } else {
                    (Some(lhs), false)
                }
            }
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[(Id<IrExprNode>, Option<QualType>)], loc: via_core::SourceLoc) -> Option<QualType> {
        let Expr::Symbol(name, _) = callee else {
            // Calling a computed expression (e.g. a lambda value): the
            // static parameter list isn't known here, so no arity/type
            // checking is possible; the VM enforces arity at call time.
            return None;
        };
        let Some(sig) = self.signatures.get(name) else { return None };
        let return_ty = sig.return_ty;
        let param_count = sig.params.len();
        if args.len() < param_count {
            for k in args.len()..param_count {
                if !sig.params[k].2 {
                    self.diags.push(Diagnostic::error(loc, format!("missing required argument for parameter #{}", k + 1)));
                }
            }
        } else if args.len() > param_count {
            self.diags.push(Diagnostic::error(loc, "too many arguments"));
        }
        for (k, (_, arg_ty)) in args.iter().enumerate() {
            let Some(param) = sig.params.get(k) else { break };
            let (_, expected, _) = param;
            if let Some(arg_ty) = arg_ty {
                if arg_ty.ty != expected.ty {
                    let mut diag = Diagnostic::error(
                        loc,
                        format!(
                            "argument #{} has type '{}', expected '{}'",
                            k + 1,
                            self.types.display(arg_ty.ty),
                            self.types.display(expected.ty)
                        ),
                    );
                    if cast_result(self.types, *arg_ty, *expected) != CastResult::Invalid {
                        diag = diag.with_footnote(Footnote::note("conversion possible with explicit cast"));
                    }
                    self.diags.push(diag);
                }
            }
        }
        Some(return_ty)
    }
}

fn compound_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Assign => unreachable!("Assign has no corresponding binary op"),
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
        AssignOp::Mod => BinaryOp::Mod,
        AssignOp::Pow => BinaryOp::Pow,
        AssignOp::BitAnd => BinaryOp::BitAnd,
        AssignOp::BitOr => BinaryOp::BitOr,
        AssignOp::BitXor => BinaryOp::BitXor,
        AssignOp::Shl => BinaryOp::Shl,
        AssignOp::Shr => BinaryOp::Shr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use via_core::SourceBuffer;

    fn build(src: &str) -> (IrModule, bool) {
        let buf = SourceBuffer::new("t.via", src);
        let mut symbols = SymbolTable::new();
        let mut diags = DiagContext::new();
        let mut types = TypeContext::new();
        let program = parse_program(&buf, &mut symbols, &mut diags);
        let mut resolver = NoModules;
        let builder = IrBuilder::new(&mut types, &mut symbols, &mut diags, &mut resolver);
        let module = builder.build(&program);
        (module, diags.has_errors())
    }

    #[test]
    fn undefined_symbol_is_poisoned_and_diagnosed() {
        let (_module, had_errors) = build("fn main() -> int { return x }");
        assert!(had_errors);
    }

    #[test]
    fn simple_function_lowers_without_errors() {
        let (module, had_errors) = build("fn add(a: int, b: int) -> int { return a + b }");
        assert!(!had_errors);
        assert_eq!(module.functions.len(), 1);
    }

    #[test]
    fn redundant_cast_warns_not_errors() {
        let (_module, had_errors) = build("fn f() -> int { return 1 as int }");
        assert!(!had_errors);
    }

    #[test]
    fn implicit_return_nil_inserted_for_nil_function() {
        let (module, had_errors) = build("fn f() -> nil { var x: int = 1 }");
        assert!(!had_errors);
        let func = &module.functions[0];
        let last_block = module.blocks.iter().map(|(id, _)| id).last().unwrap();
        let _ = func;
        let _ = last_block;
    }

    #[test]
    fn mismatched_return_type_is_diagnosed() {
        let (_module, had_errors) = build("fn f() -> int { return true }");
        assert!(had_errors);
    }

    #[test]
    fn calling_a_forward_declared_top_level_function_is_not_undefined() {
        let (module, had_errors) = build(
            "fn main() -> int { return add(1, 2) }\nfn add(a: int, b: int) -> int { return a + b }",
        );
        assert!(!had_errors);
        assert_eq!(module.functions.len(), 2);
    }

    #[test]
    fn while_loop_lowers_with_back_edge() {
        let (module, had_errors) = build("fn f() -> nil { while true { } }");
        assert!(!had_errors);
        let found_back_edge = module
            .blocks
            .iter()
            .any(|(_, b)| matches!(b.term, Some(Term::Branch(_))));
        assert!(found_back_edge);
    }
}
