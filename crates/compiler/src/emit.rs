//! Bytecode emitter (spec.md §4.7): walks a typed [`IrModule`]'s block
//! graph and produces a patched [`ExecUnit`] plus a symbol-to-entry map the
//! module manager folds into the module's [`crate::def::DefTable`].

use std::collections::{HashMap, HashSet, VecDeque};

use via_core::{
    BuiltinKind, ConstValue, DiagContext, Diagnostic, ExecUnit, Id, Instruction, OpCode, Symbol,
    SourceLoc, TypeContext, TypeId,
};

use crate::ast::{BinaryOp, UnaryOp};
use crate::frame::{encode_frame_slot, FrameStack};
use crate::ir::{Block, IrExpr, IrExprNode, IrModule, IrStmt, Term};

const REGISTER_COUNT: usize = 65_536;
const WORD_BITS: usize = 64;

/// A bitset allocator over the VM's 16-bit register space (spec.md §4.7:
/// "a bitset over the 16-bit register space").
struct RegisterAllocator {
    words: Vec<u64>,
}

impl RegisterAllocator {
    fn new() -> Self {
        RegisterAllocator { words: vec![0u64; REGISTER_COUNT / WORD_BITS] }
    }

    fn alloc(&mut self) -> Option<u16> {
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word != u64::MAX {
                let bit = (!*word).trailing_zeros() as usize;
                *word |= 1 << bit;
                return Some((i * WORD_BITS + bit) as u16);
            }
        }
        None
    }

    fn free(&mut self, reg: u16) {
        let reg = reg as usize;
        self.words[reg / WORD_BITS] &= !(1u64 << (reg % WORD_BITS));
    }

    fn reserve(&mut self, reg: u16) {
        let reg = reg as usize;
        self.words[reg / WORD_BITS] |= 1u64 << (reg % WORD_BITS);
    }
}

#[derive(Clone, Copy)]
enum PatchField {
    A,
    B,
}

struct Patch {
    at: usize,
    field: PatchField,
    target: Id<Block>,
}

/// What the emitter hands back to the caller (spec.md §4.7): the patched
/// program plus where each top-level function's bytecode begins, for
/// `DefTable::insert`'s `FunctionDef.entry`.
pub struct EmitOutput {
    pub exec: ExecUnit,
    pub function_entries: HashMap<Symbol, u32>,
}

pub struct Emitter<'a> {
    module: &'a IrModule,
    types: &'a mut TypeContext,
    diags: &'a mut DiagContext,
    instructions: Vec<Instruction>,
    constants: Vec<ConstValue>,
    regs: RegisterAllocator,
    frames: FrameStack<u16>,
    slot: u16,
    slot_marks: Vec<u16>,
    fn_registers: HashMap<Symbol, u16>,
    block_pc: HashMap<Id<Block>, u32>,
    patches: Vec<Patch>,
}

impl<'a> Emitter<'a> {
    pub fn new(module: &'a IrModule, types: &'a mut TypeContext, diags: &'a mut DiagContext) -> Self {
        Emitter {
            module,
            types,
            diags,
            instructions: Vec::new(),
            constants: Vec::new(),
            regs: RegisterAllocator::new(),
            frames: FrameStack::new(),
            slot: 0,
            slot_marks: Vec::new(),
            fn_registers: HashMap::new(),
            block_pc: HashMap::new(),
            patches: Vec::new(),
        }
    }

    pub fn emit(mut self) -> EmitOutput {
        for func in &self.module.functions {
            let reg = self.regs.alloc().unwrap_or_else(|| self.exhausted());
            self.fn_registers.insert(func.name, reg);
        }

        let mut function_entries = HashMap::new();
        for i in 0..self.module.functions.len() {
            let (name, entry_pc) = self.emit_function(i);
            function_entries.insert(name, entry_pc);
        }

        if let Some(top) = self.module.top_level {
            self.frames.push_frame();
            self.slot = 0;
            self.emit_block_graph(top);
            self.frames.pop_frame();
        }

        self.apply_patches();
        fold_constants(&mut self.instructions, &mut self.constants);
        strength_reduce(&mut self.instructions, &self.constants);
        self.instructions.push(Instruction::nullary(OpCode::Halt));

        let labels = self.block_pc.iter().map(|(id, pc)| (id.index(), *pc)).collect();
        let exec = ExecUnit { instructions: self.instructions, constants: self.constants, labels };
        EmitOutput { exec, function_entries }
    }

    fn exhausted(&mut self) -> u16 {
        self.diags.push(Diagnostic::error(SourceLoc::point(0), "register exhaustion: program exceeds 65536 live registers"));
        0
    }

    /// Emits one top-level function's prologue + body. The `NEWCLOSURE` for
    /// this function must sit immediately before its body (its runtime
    /// semantics are "my entry point is the very next instruction"), so
    /// bodies are laid out back to back, each one skipped over by its own
    /// closure's jump offset, with the top-level block following the last.
    fn emit_function(&mut self, index: usize) -> (Symbol, u32) {
        let func = &self.module.functions[index];
        let name = func.name;
        let reg = self.fn_registers[&name];
        let params = func.params.clone();
        let entry_block = func.entry;

        let placeholder_idx = self.instructions.len();
        self.instructions.push(Instruction::new(OpCode::NewClosure, reg, 0, 0));
        let entry_pc = placeholder_idx as u32 + 1;

        self.frames.push_frame();
        self.slot = 0;
        for (i, (symbol, _ty)) in params.iter().enumerate() {
            let offset = -(5 + i as i16);
            self.frames.declare(*symbol, encode_frame_slot(offset));
        }
        self.emit_block_graph(entry_block);
        self.frames.pop_frame();

        let len = self.instructions.len() - (placeholder_idx + 1);
        let offset = 1 + len as u32;
        let placeholder = &mut self.instructions[placeholder_idx];
        placeholder.b = (offset >> 16) as u16;
        placeholder.c = (offset & 0xFFFF) as u16;

        (name, entry_pc)
    }

    /// BFS over the block graph from `entry`, recording each block's PC
    /// and queuing `Patch`es for every terminator's jump operand(s); the
    /// patches are all applied in one pass after every entry has been
    /// walked, since a back-edge can target a block not yet visited.
    fn emit_block_graph(&mut self, entry: Id<Block>) {
        let mut queue = VecDeque::new();
        let mut queued = HashSet::new();
        queue.push_back(entry);
        queued.insert(entry);

        while let Some(block_id) = queue.pop_front() {
            self.block_pc.insert(block_id, self.instructions.len() as u32);
            let block = self.module.blocks.get(block_id).clone();
            for stmt in &block.stmts {
                self.emit_stmt(stmt);
            }
            match block.term {
                Some(Term::Return { value, .. }) => {
                    if let Some(value) = value {
                        let reg = self.emit_expr(value);
                        self.instructions.push(Instruction::new(OpCode::Ret, reg, 0, 0));
                        self.regs.free(reg);
                    } else {
                        self.instructions.push(Instruction::nullary(OpCode::RetNil));
                    }
                }
                Some(Term::Branch(target)) => {
                    let at = self.instructions.len();
                    self.instructions.push(Instruction::new(OpCode::Jmp, 0, 0, 0));
                    self.patches.push(Patch { at, field: PatchField::A, target });
                    if queued.insert(target) {
                        queue.push_back(target);
                    }
                }
                Some(Term::CondBranch { cond, if_true, if_false }) => {
                    let cond_reg = self.emit_expr(cond);
                    let at_if = self.instructions.len();
                    self.instructions.push(Instruction::new(OpCode::JmpIf, cond_reg, 0, 0));
                    self.patches.push(Patch { at: at_if, field: PatchField::B, target: if_true });
                    self.regs.free(cond_reg);
                    let at_else = self.instructions.len();
                    self.instructions.push(Instruction::new(OpCode::Jmp, 0, 0, 0));
                    self.patches.push(Patch { at: at_else, field: PatchField::A, target: if_false });
                    for target in [if_true, if_false] {
                        if queued.insert(target) {
                            queue.push_back(target);
                        }
                    }
                }
                Some(Term::Continue) | Some(Term::Break) | None => {
                    // `Continue`/`Break` are never constructed by the
                    // builder (no loop-control statement exists in the
                    // surface grammar yet) and a missing terminator means a
                    // malformed block; both reach here only through a bug
                    // upstream, so trap rather than miscompile.
                    self.instructions.push(Instruction::nullary(OpCode::Unimpl));
                }
            }
        }
    }

    fn apply_patches(&mut self) {
        let patches = std::mem::take(&mut self.patches);
        for patch in patches {
            let target_pc = self.block_pc[&patch.target] as i64;
            let diff = target_pc - patch.at as i64;
            match patch.field {
                PatchField::A => {
                    let inst = &mut self.instructions[patch.at];
                    if diff >= 0 {
                        inst.op = OpCode::Jmp;
                        inst.a = diff as u16;
                    } else {
                        inst.op = OpCode::JmpBack;
                        inst.a = (-diff) as u16;
                    }
                }
                PatchField::B => {
                    let inst = &mut self.instructions[patch.at];
                    inst.b = diff as i16 as u16;
                }
            }
        }
    }

    fn emit_stmt(&mut self, stmt: &IrStmt) {
        match stmt {
            IrStmt::VarDecl { symbol, value, .. } => {
                let reg = match value {
                    Some(id) => self.emit_expr(*id),
                    None => {
                        let r = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                        self.instructions.push(Instruction::new(OpCode::LoadNil, r, 0, 0));
                        r
                    }
                };
                self.instructions.push(Instruction::new(OpCode::Push, reg, 0, 0));
                self.regs.free(reg);
                self.frames.declare(*symbol, self.slot);
                self.slot += 1;
            }
            IrStmt::Assign { target, value } => {
                let value_reg = self.emit_expr(*value);
                match &self.module.exprs[*target].expr {
                    IrExpr::Local(symbol) => {
                        if let Some(&slot) = self.frames.resolve(*symbol) {
                            self.instructions.push(Instruction::new(OpCode::SetLocal, value_reg, slot, 0));
                        } else {
                            self.instructions.push(Instruction::nullary(OpCode::Unimpl));
                        }
                    }
                    _ => self.instructions.push(Instruction::nullary(OpCode::Unimpl)),
                }
                self.regs.free(value_reg);
            }
            IrStmt::Expr(id) => {
                let reg = self.emit_expr(*id);
                self.regs.free(reg);
            }
            IrStmt::Save => {
                self.instructions.push(Instruction::nullary(OpCode::Save));
                self.slot_marks.push(self.slot);
                self.frames.push_frame();
            }
            IrStmt::Restore => {
                self.instructions.push(Instruction::nullary(OpCode::Restore));
                self.frames.pop_frame();
                self.slot = self.slot_marks.pop().expect("Restore without matching Save");
            }
        }
    }

    /// Lowers one IR expression, returning the register holding its value.
    /// Clones the node out of the arena up front so the recursive calls
    /// below are free to mutate `self` without fighting the borrow
    /// checker over a live reference into `self.module`.
    fn emit_expr(&mut self, id: Id<IrExprNode>) -> u16 {
        let node = self.module.exprs[id].clone();
        match node.expr {
            IrExpr::Constant(value) => self.emit_constant(value),
            IrExpr::Local(symbol) => {
                if let Some(&reg) = self.fn_registers.get(&symbol) {
                    let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                    self.instructions.push(Instruction::new(OpCode::Copy, dst, reg, 0));
                    dst
                } else if let Some(&slot) = self.frames.resolve(symbol) {
                    let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                    self.instructions.push(Instruction::new(OpCode::GetLocal, dst, slot, 0));
                    dst
                } else {
                    let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                    self.instructions.push(Instruction::new(OpCode::Unimpl, dst, 0, 0));
                    dst
                }
            }
            IrExpr::ModuleAccess { module, key } => {
                let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                self.instructions.push(Instruction::new(
                    OpCode::GetImport,
                    dst,
                    module.raw() as u16,
                    key.raw() as u16,
                ));
                dst
            }
            IrExpr::Unary { op, operand } => self.emit_unary(op, operand, node.ty.map(|t| t.ty)),
            IrExpr::Binary { op, lhs, rhs } => self.emit_binary(op, lhs, rhs, node.ty.map(|t| t.ty)),
            IrExpr::Select { cond, if_true, if_false } => self.emit_select(cond, if_true, if_false),
            IrExpr::ToFloat(inner) => {
                let src = self.emit_expr(inner);
                let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                self.instructions.push(Instruction::new(OpCode::ToFloat, dst, src, 0));
                self.regs.free(src);
                dst
            }
            IrExpr::Cast { expr, to } => self.emit_cast(expr, to),
            IrExpr::Call { callee, args } => self.emit_call(callee, args),
            IrExpr::Access { .. }
            | IrExpr::Subscript { .. }
            | IrExpr::Array(_)
            | IrExpr::Tuple(_)
            | IrExpr::Error => {
                // `Value` has no array/map/struct/tuple representation
                // (spec.md §3 "VM Value"), so none of these can produce a
                // runtime value; trap instead of miscompiling.
                let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
                self.instructions.push(Instruction::new(OpCode::Unimpl, dst, 0, 0));
                dst
            }
        }
    }

    fn emit_constant(&mut self, value: ConstValue) -> u16 {
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
        match value {
            ConstValue::Nil => self.instructions.push(Instruction::new(OpCode::LoadNil, dst, 0, 0)),
            ConstValue::Bool(true) => self.instructions.push(Instruction::new(OpCode::LoadTrue, dst, 0, 0)),
            ConstValue::Bool(false) => self.instructions.push(Instruction::new(OpCode::LoadFalse, dst, 0, 0)),
            ConstValue::Int(i) if i >= i32::MIN as i64 && i <= i32::MAX as i64 => {
                self.instructions.push(Instruction::new(OpCode::LoadInt, dst, (i as i32 as u32 >> 16) as u16, (i as i32 as u32 & 0xFFFF) as u16));
            }
            other => {
                let idx = self.intern_const(other);
                self.instructions.push(Instruction::new(OpCode::LoadK, dst, 0, idx));
            }
        }
        dst
    }

    fn intern_const(&mut self, value: ConstValue) -> u16 {
        if let Some(pos) = self.constants.iter().position(|c| *c == value) {
            return pos as u16;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }

    fn emit_unary(&mut self, op: UnaryOp, operand: Id<IrExprNode>, ty: Option<TypeId>) -> u16 {
        if op == UnaryOp::Ref {
            // The `&` value-level operator is a pure pass-through here: no
            // `Value` variant observes reference identity differently from
            // the referent itself (Open Question decision #3).
            return self.emit_expr(operand);
        }
        let src = self.emit_expr(operand);
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
        let opcode = match op {
            UnaryOp::Neg => {
                if matches!(ty, Some(t) if self.types.is_builtin(t, BuiltinKind::Float)) {
                    OpCode::FNeg
                } else {
                    OpCode::INeg
                }
            }
            UnaryOp::BitNot => OpCode::INot,
            UnaryOp::Not => OpCode::Not,
            UnaryOp::Ref => unreachable!("handled above"),
        };
        self.instructions.push(Instruction::new(opcode, dst, src, 0));
        self.regs.free(src);
        dst
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: Id<IrExprNode>, rhs: Id<IrExprNode>, ty: Option<TypeId>) -> u16 {
        let operand_ty = self.module.exprs[lhs].ty.map(|t| t.ty);
        let is_float = matches!(operand_ty, Some(t) if self.types.is_builtin(t, BuiltinKind::Float));
        let result_is_bool = matches!(ty, Some(t) if self.types.is_builtin(t, BuiltinKind::Bool));

        let lhs_reg = self.emit_expr(lhs);
        let rhs_reg = self.emit_expr(rhs);
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());

        let opcode = self.pick_binary_opcode(op, is_float, result_is_bool, operand_ty);
        self.instructions.push(Instruction::new(opcode, dst, lhs_reg, rhs_reg));
        self.instructions.push(Instruction::new(OpCode::Free2, lhs_reg, rhs_reg, 0));
        self.regs.free(lhs_reg);
        self.regs.free(rhs_reg);
        dst
    }

    fn pick_binary_opcode(&mut self, op: BinaryOp, is_float: bool, result_is_bool: bool, operand_ty: Option<TypeId>) -> OpCode {
        let is_bool_operand = matches!(operand_ty, Some(t) if self.types.is_builtin(t, BuiltinKind::Bool));
        let is_string_operand = matches!(operand_ty, Some(t) if self.types.is_builtin(t, BuiltinKind::String));
        match op {
            BinaryOp::Is => OpCode::Is,
            BinaryOp::Eq if is_bool_operand => OpCode::BEq,
            BinaryOp::Ne if is_bool_operand => OpCode::BNe,
            BinaryOp::Eq if is_string_operand => OpCode::SEq,
            BinaryOp::Ne if is_string_operand => OpCode::SNe,
            BinaryOp::Eq => if is_float { OpCode::FEq } else { OpCode::IEq },
            BinaryOp::Ne => if is_float { OpCode::FNe } else { OpCode::INe },
            BinaryOp::Lt => if is_float { OpCode::FLt } else { OpCode::ILt },
            BinaryOp::Le => if is_float { OpCode::FLe } else { OpCode::ILe },
            BinaryOp::Gt => if is_float { OpCode::FGt } else { OpCode::IGt },
            BinaryOp::Ge => if is_float { OpCode::FGe } else { OpCode::IGe },
            BinaryOp::Add => if is_float { OpCode::FAdd } else { OpCode::IAdd },
            BinaryOp::Sub => if is_float { OpCode::FSub } else { OpCode::ISub },
            BinaryOp::Mul => if is_float { OpCode::FMul } else { OpCode::IMul },
            BinaryOp::Div => if is_float { OpCode::FDiv } else { OpCode::IDiv },
            BinaryOp::Mod => OpCode::IMod,
            BinaryOp::BitAnd => OpCode::IAnd,
            BinaryOp::BitOr => OpCode::IOr,
            BinaryOp::BitXor => OpCode::IXor,
            BinaryOp::Shl => OpCode::IShl,
            BinaryOp::Shr => OpCode::IShr,
            BinaryOp::Pow => {
                // No dedicated exponentiation opcode exists; `**` is out of
                // the register-machine's named operator set, so it traps
                // rather than silently compiling to the wrong operation.
                let _ = result_is_bool;
                OpCode::Unimpl
            }
            BinaryOp::Or | BinaryOp::And => unreachable!("desugared to Select by ir.rs"),
        }
    }

    /// `cond ? if_true : if_false`, also how `&&`/`||` desugar (ir.rs).
    /// Only the taken arm is ever evaluated: `if_false` is laid out after
    /// an `JMPIF` over it, `if_true` after an unconditional jump past it.
    fn emit_select(&mut self, cond: Id<IrExprNode>, if_true: Id<IrExprNode>, if_false: Id<IrExprNode>) -> u16 {
        let cond_reg = self.emit_expr(cond);
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());

        let jmp_if_idx = self.instructions.len();
        self.instructions.push(Instruction::new(OpCode::JmpIf, cond_reg, 0, 0));
        self.regs.free(cond_reg);

        let false_reg = self.emit_expr(if_false);
        self.instructions.push(Instruction::new(OpCode::Copy, dst, false_reg, 0));
        self.regs.free(false_reg);

        let jmp_end_idx = self.instructions.len();
        self.instructions.push(Instruction::new(OpCode::Jmp, 0, 0, 0));

        let true_start = self.instructions.len();
        let true_reg = self.emit_expr(if_true);
        self.instructions.push(Instruction::new(OpCode::Copy, dst, true_reg, 0));
        self.regs.free(true_reg);

        let end = self.instructions.len();

        self.instructions[jmp_if_idx].b = (true_start as i64 - jmp_if_idx as i64) as i16 as u16;
        self.instructions[jmp_end_idx].a = (end as i64 - jmp_end_idx as i64) as i16 as u16;
        dst
    }

    fn emit_cast(&mut self, expr: Id<IrExprNode>, to: TypeId) -> u16 {
        let from_ty = self.module.exprs[expr].ty.map(|t| t.ty);
        if from_ty == Some(to) {
            return self.emit_expr(expr);
        }
        let src = self.emit_expr(expr);
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
        let opcode = if self.types.is_builtin(to, BuiltinKind::Int) {
            OpCode::ToInt
        } else if self.types.is_builtin(to, BuiltinKind::Float) {
            OpCode::ToFloat
        } else if self.types.is_builtin(to, BuiltinKind::Bool) {
            OpCode::ToBool
        } else if self.types.is_builtin(to, BuiltinKind::String) {
            OpCode::ToString
        } else {
            OpCode::Unimpl
        };
        self.instructions.push(Instruction::new(opcode, dst, src, 0));
        self.regs.free(src);
        dst
    }

    fn emit_call(&mut self, callee: Id<IrExprNode>, args: Vec<Id<IrExprNode>>) -> u16 {
        let mut arg_regs = Vec::with_capacity(args.len());
        for arg in args.iter().rev() {
            let reg = self.emit_expr(*arg);
            self.instructions.push(Instruction::new(OpCode::Push, reg, 0, 0));
            self.regs.free(reg);
            arg_regs.push(reg);
        }
        let callee_reg = self.emit_expr(callee);
        self.instructions.push(Instruction::new(OpCode::Call, callee_reg, 0, 0));
        self.instructions.push(Instruction::new(OpCode::Free1, callee_reg, 0, 0));
        self.regs.free(callee_reg);
        let dst = self.regs.alloc().unwrap_or_else(|| self.exhausted());
        self.instructions.push(Instruction::new(OpCode::GetTop, dst, 0, 0));
        dst
    }
}

/// Constant-folds an immediately-consecutive `[LOADINT|LOADK, LOADINT|LOADK,
/// <int/float-binop>]` triple into a single load (SPEC_FULL.md §2, grounded
/// on `original_source/src/Compiler/optimize/constfold.cpp`). Leaves the
/// first two instructions as `NOP` rather than removing them, since removal
/// would shift every already-patched jump target's address; the fold
/// result is always pushed as a fresh `LOADK` constant rather than special-
/// cased back into `LOADINT`, so one path handles both int and float folds.
fn fold_constants(instructions: &mut [Instruction], constants: &mut Vec<ConstValue>) {
    for i in 0..instructions.len().saturating_sub(2) {
        let (load_a, load_b, op) = (instructions[i], instructions[i + 1], instructions[i + 2]);
        let Some(a_val) = loaded_const(load_a, constants) else { continue };
        let Some(b_val) = loaded_const(load_b, constants) else { continue };
        if load_a.a != op.b || load_b.a != op.c {
            continue;
        }
        let Some(folded) = fold(op.op, a_val, b_val) else { continue };
        let dst = op.a;
        let idx = constants.iter().position(|c| *c == folded).unwrap_or_else(|| {
            constants.push(folded);
            constants.len() - 1
        }) as u16;
        instructions[i] = Instruction::nullary(OpCode::Nop);
        instructions[i + 1] = Instruction::nullary(OpCode::Nop);
        instructions[i + 2] = Instruction::new(OpCode::LoadK, dst, 0, idx);
    }
}

fn loaded_const(inst: Instruction, constants: &[ConstValue]) -> Option<ConstValue> {
    match inst.op {
        OpCode::LoadInt => Some(ConstValue::Int((((inst.b as u32) << 16) | inst.c as u32) as i32 as i64)),
        OpCode::LoadK => constants.get(inst.c as usize).copied(),
        _ => None,
    }
}

fn fold(op: OpCode, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int(x), ConstValue::Int(y)) => {
            let result = match op {
                OpCode::IAdd => x.wrapping_add(y),
                OpCode::ISub => x.wrapping_sub(y),
                OpCode::IMul => x.wrapping_mul(y),
                OpCode::IDiv if y != 0 => x.wrapping_div(y),
                OpCode::IMod if y != 0 => x.wrapping_rem(y),
                _ => return None,
            };
            Some(ConstValue::Int(result))
        }
        (ConstValue::Float(x), ConstValue::Float(y)) => {
            let result = match op {
                OpCode::FAdd => x + y,
                OpCode::FSub => x - y,
                OpCode::FMul => x * y,
                OpCode::FDiv if y != 0.0 => x / y,
                _ => return None,
            };
            Some(ConstValue::Float(result))
        }
        _ => None,
    }
}

/// Rewrites `IMULK`/`IDIVK` by a power-of-two constant into `ISHLK`/
/// `ISHRK` (SPEC_FULL.md §2, grounded on `original_source/src/Compiler/
/// optimize/bshift.cpp`). Same instruction count and operand slots, so it
/// runs safely after jump patching.
fn strength_reduce(instructions: &mut [Instruction], constants: &[ConstValue]) {
    for inst in instructions.iter_mut() {
        let new_op = match inst.op {
            OpCode::IMulK => OpCode::IShlK,
            OpCode::IDivK => OpCode::IShrK,
            _ => continue,
        };
        let Some(&ConstValue::Int(n)) = constants.get(inst.c as usize) else { continue };
        if n > 0 && (n & (n - 1)) == 0 {
            inst.op = new_op;
            inst.c = n.trailing_zeros() as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, IfBranch, Param, Program, Stmt, TypeExpr};
    use crate::ir::{IrBuilder, NoModules};
    use via_core::{QualName, SymbolTable};

    fn loc() -> via_core::SourceLoc {
        via_core::SourceLoc::point(0)
    }

    fn int_ty() -> TypeExpr {
        TypeExpr::Named(QualName::single("int"), loc())
    }

    fn build(stmts: Vec<Stmt>) -> (IrModule, TypeContext, DiagContext) {
        let mut types = TypeContext::new();
        let mut symbols = SymbolTable::new();
        let mut diags = DiagContext::new();
        let mut resolver = NoModules;
        let program = Program { stmts };
        let module = {
            let builder = IrBuilder::new(&mut types, &mut symbols, &mut diags, &mut resolver);
            builder.build(&program)
        };
        (module, types, diags)
    }

    #[test]
    fn arithmetic_expression_emits_and_halts() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::Literal(ConstValue::Int(1), loc())),
            rhs: Box::new(Expr::Literal(ConstValue::Int(2), loc())),
            loc: loc(),
        };
        let (module, mut types, mut diags) = build(vec![Stmt::Expr(expr, loc())]);
        let out = Emitter::new(&module, &mut types, &mut diags).emit();
        assert_eq!(out.exec.instructions.last().unwrap().op, OpCode::Halt);
        assert!(!diags.has_errors());
    }

    #[test]
    fn if_else_and_recursive_call_compile() {
        let cond = Expr::Literal(ConstValue::Bool(true), loc());
        let recurse = Expr::Call {
            callee: Box::new(Expr::Symbol(Symbol::from_raw(500), loc())),
            args: vec![Expr::Literal(ConstValue::Int(1), loc())],
            loc: loc(),
        };
        let body_if = vec![Stmt::Return { value: Some(recurse), loc: loc() }];
        let body_else = vec![Stmt::Return { value: Some(Expr::Literal(ConstValue::Int(0), loc())), loc: loc() }];
        let if_stmt = Stmt::If {
            branches: vec![
                IfBranch { cond: Some(cond), body: body_if },
                IfBranch { cond: None, body: body_else },
            ],
            loc: loc(),
        };
        let func = Stmt::FuncDecl {
            name: Symbol::from_raw(500),
            params: vec![Param { name: Symbol::from_raw(501), ty: int_ty(), default: None, loc: loc() }],
            return_ty: int_ty(),
            body: vec![if_stmt],
            loc: loc(),
        };
        let (module, mut types, mut diags) = build(vec![func]);
        assert!(!diags.has_errors());
        let out = Emitter::new(&module, &mut types, &mut diags).emit();
        assert_eq!(out.exec.instructions.last().unwrap().op, OpCode::Halt);
        assert!(out.function_entries.contains_key(&Symbol::from_raw(500)));
        let entry = out.function_entries[&Symbol::from_raw(500)];
        assert!((entry as usize) < out.exec.instructions.len());
    }

    #[test]
    fn ternary_select_compiles_to_two_jumps() {
        let expr = Expr::Ternary {
            cond: Box::new(Expr::Literal(ConstValue::Bool(true), loc())),
            if_true: Box::new(Expr::Literal(ConstValue::Int(1), loc())),
            if_false: Box::new(Expr::Literal(ConstValue::Int(2), loc())),
            loc: loc(),
        };
        let (module, mut types, mut diags) = build(vec![Stmt::Expr(expr, loc())]);
        let out = Emitter::new(&module, &mut types, &mut diags).emit();
        assert!(out.exec.instructions.iter().any(|i| i.op == OpCode::JmpIf));
        assert!(!diags.has_errors());
    }

    #[test]
    fn for_counting_loop_compiles() {
        let loop_body = vec![Stmt::Expr(Expr::Symbol(Symbol::from_raw(10), loc()), loc())];
        let stmt = Stmt::ForCounting {
            var: Symbol::from_raw(10),
            start: Expr::Literal(ConstValue::Int(0), loc()),
            stop: Expr::Literal(ConstValue::Int(10), loc()),
            step: Expr::Literal(ConstValue::Int(1), loc()),
            body: loop_body,
            loc: loc(),
        };
        let (module, mut types, mut diags) = build(vec![stmt]);
        let out = Emitter::new(&module, &mut types, &mut diags).emit();
        assert!(out.exec.instructions.iter().any(|i| i.op == OpCode::JmpBack));
        assert!(!diags.has_errors());
    }

    #[test]
    fn cast_to_float_emits_tofloat() {
        let expr = Expr::Cast {
            expr: Box::new(Expr::Literal(ConstValue::Int(1), loc())),
            ty: TypeExpr::Named(QualName::single("float"), loc()),
            loc: loc(),
        };
        let (module, mut types, mut diags) = build(vec![Stmt::Expr(expr, loc())]);
        let out = Emitter::new(&module, &mut types, &mut diags).emit();
        assert!(out.exec.instructions.iter().any(|i| i.op == OpCode::ToFloat));
    }

    #[test]
    fn constant_fold_collapses_int_add() {
        let dst = 2u16;
        let mut instructions = vec![
            Instruction::new(OpCode::LoadInt, 0, 0, 1),
            Instruction::new(OpCode::LoadInt, 1, 0, 2),
            Instruction::new(OpCode::IAdd, dst, 0, 1),
            Instruction::nullary(OpCode::Free2),
        ];
        let mut constants = Vec::new();
        fold_constants(&mut instructions, &mut constants);
        assert_eq!(instructions[0].op, OpCode::Nop);
        assert_eq!(instructions[1].op, OpCode::Nop);
        assert_eq!(instructions[2].op, OpCode::LoadK);
        assert_eq!(constants[instructions[2].c as usize], ConstValue::Int(3));
    }

    #[test]
    fn strength_reduction_rewrites_power_of_two_mul() {
        let constants = vec![ConstValue::Int(8)];
        let mut instructions = vec![Instruction::new(OpCode::IMulK, 0, 1, 0)];
        strength_reduce(&mut instructions, &constants);
        assert_eq!(instructions[0].op, OpCode::IShlK);
        assert_eq!(instructions[0].c, 3);
    }

    #[test]
    fn strength_reduction_skips_non_power_of_two() {
        let constants = vec![ConstValue::Int(7)];
        let mut instructions = vec![Instruction::new(OpCode::IMulK, 0, 1, 0)];
        strength_reduce(&mut instructions, &constants);
        assert_eq!(instructions[0].op, OpCode::IMulK);
    }

    #[test]
    fn register_allocator_reuses_freed_slots() {
        let mut regs = RegisterAllocator::new();
        let a = regs.alloc().unwrap();
        let b = regs.alloc().unwrap();
        assert_ne!(a, b);
        regs.free(a);
        let c = regs.alloc().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn register_allocator_reports_exhaustion() {
        let mut regs = RegisterAllocator::new();
        for i in 0..REGISTER_COUNT {
            regs.reserve(i as u16);
        }
        assert_eq!(regs.alloc(), None);
    }
}
