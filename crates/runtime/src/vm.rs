//! The register virtual machine (spec.md §4.8).
//!
//! A register-plus-stack hybrid machine: registers hold the live working
//! set, the stack holds pushed arguments, call-frame bookkeeping, and
//! locals. The source addresses registers and the stack through raw
//! pointers (`*mut Value`, `*mut uintptr`); here both are plain `Vec`s
//! indexed by `u16`/`usize`, per REDESIGN FLAGS §9's "indices, not
//! pointers" guidance, and register ownership is expressed by `Value`'s
//! own drop glue instead of a manual `unref()` call.

use crate::debug::{DebugAction, DebugHook, VmSnapshot};
use crate::error::{ErrorInt, RuntimeError};
use crate::native::CallInfo;
use crate::value::{Closure, ClosureKind, Value};
use via_core::{ExecUnit, Instruction, OpCode, Symbol};
use std::rc::Rc;

pub const REGISTER_COUNT: usize = 65_536;

/// Bit in the call-flags byte every `CALL` pushes (spec.md §4.8). A frame
/// called with this bit set is a valid unwind target for the `ERROR`
/// interrupt handler (spec.md §4.8 "Interrupts": "the frame was called
/// with PROTECT"). Nothing in the expanded grammar emits it directly yet;
/// it exists for standard-library `try`-style host functions to request it
/// via [`VirtualMachine::call_protected`].
pub const CALL_FLAG_PROTECT: u8 = 0b0000_0001;

/// One stack slot: either a `Value` (arguments, locals, the pushed callee)
/// or a raw bookkeeping word (call flags, return pc, saved fp). Mirrors
/// the source's single `Stack<uintptr>` holding both kinds of word.
#[derive(Debug, Clone)]
enum StackSlot {
    Value(Value),
    Raw(usize),
}

impl StackSlot {
    fn as_value(&self) -> Option<&Value> {
        match self {
            StackSlot::Value(v) => Some(v),
            StackSlot::Raw(_) => None,
        }
    }

    fn as_raw(&self) -> Option<usize> {
        match self {
            StackSlot::Raw(n) => Some(*n),
            StackSlot::Value(_) => None,
        }
    }
}

/// The interrupt mechanism's state (spec.md §4.8). `NONE` is the
/// quiescent state the dispatch loop sees on every ordinary step.
#[derive(Debug, Clone)]
pub enum Interrupt {
    None,
    Error(ErrorInt),
}

impl Interrupt {
    pub fn is_set(&self) -> bool {
        !matches!(self, Interrupt::None)
    }
}

/// What an interrupt handler tells the dispatch loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntAction {
    Resume,
    Reinterp,
    Exit,
}

/// Resolves `GETIMPORT` against the module manager. Implemented by
/// `via_compiler::module::ModuleManager`; kept as a trait here so
/// `via-runtime` does not need to depend back on `via-compiler`.
pub trait ImportResolver {
    fn resolve_import(&mut self, module: Symbol, key: Symbol) -> Option<Value>;
}

/// A resolver that never finds anything; useful for running bytecode units
/// that are known not to import anything (tests, `S1`-style scenarios).
#[derive(Debug, Default)]
pub struct NoImports;

impl ImportResolver for NoImports {
    fn resolve_import(&mut self, _module: Symbol, _key: Symbol) -> Option<Value> {
        None
    }
}

/// Outcome of running a program to completion.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Returned(Value),
    /// The `ERROR` interrupt reached the bottom of the frame chain without
    /// finding a `PROTECT`ed frame (spec.md §4.8: "on exhaustion the error
    /// message is written to `out` and the VM exits").
    UnhandledError(String),
}

pub struct VirtualMachine {
    pc: u32,
    fp: usize,
    /// `SAVE`'s recorded stack depth; `RESTORE` pops back to it.
    sp: Option<usize>,
    stack: Vec<StackSlot>,
    registers: Vec<Value>,
    interrupt: Interrupt,
    interrupt_hook: Option<fn(&Interrupt)>,
    debug_hook: Option<Box<dyn DebugHook>>,
    exec: Rc<ExecUnit>,
}

impl VirtualMachine {
    pub fn new(exec: Rc<ExecUnit>) -> Self {
        VirtualMachine {
            pc: 0,
            fp: 0,
            sp: None,
            stack: Vec::new(),
            registers: vec![Value::Nil; REGISTER_COUNT],
            interrupt: Interrupt::None,
            interrupt_hook: None,
            debug_hook: None,
            exec,
        }
    }

    pub fn set_interrupt_hook(&mut self, hook: fn(&Interrupt)) {
        self.interrupt_hook = Some(hook);
    }

    pub fn set_debug_hook(&mut self, hook: Box<dyn DebugHook>) {
        self.debug_hook = Some(hook);
    }

    /// Overrides where `run` starts fetching instructions (spec.md §4.8's
    /// `pc` relative to the program base `bp`). Used by the host to start
    /// execution at a specific top-level function's body (e.g. `main`)
    /// instead of at the module's top-level statements; the frame pointer
    /// stays `0`, so a `RET` reached from there ends the run exactly as it
    /// would for top-level code.
    pub fn set_entry_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    pub fn register(&self, r: u16) -> &Value {
        &self.registers[r as usize]
    }

    fn set_register(&mut self, r: u16, value: Value) {
        self.registers[r as usize] = value;
    }

    fn free_register(&mut self, r: u16) {
        self.registers[r as usize] = Value::Nil;
    }

    /// Runs until the program halts, returns from its entry frame, or an
    /// unhandled error interrupt reaches the bottom of the frame chain.
    pub fn run(&mut self, resolver: &mut dyn ImportResolver) -> RunOutcome {
        tracing::debug!(instructions = self.exec.instructions.len(), "vm run start");
        loop {
            if self.interrupt.is_set() {
                if let Some(hook) = self.interrupt_hook {
                    hook(&self.interrupt);
                }
                match self.handle_interrupt() {
                    IntAction::Exit => {
                        let message = match std::mem::replace(&mut self.interrupt, Interrupt::None)
                        {
                            Interrupt::Error(e) => e.message,
                            Interrupt::None => String::new(),
                        };
                        tracing::error!(%message, pc = self.pc, "unhandled runtime error");
                        return RunOutcome::UnhandledError(message);
                    }
                    IntAction::Resume | IntAction::Reinterp => {
                        self.interrupt = Interrupt::None;
                    }
                }
            }

            if self.pc as usize >= self.exec.instructions.len() {
                return RunOutcome::Returned(Value::Nil);
            }

            let instruction = self.exec.instructions[self.pc as usize];

            if self.debug_hook.is_some() {
                let snapshot = self.snapshot(instruction);
                let action = self.debug_hook.as_mut().unwrap().on_tick(&snapshot);
                match action {
                    DebugAction::Halt => return RunOutcome::Returned(Value::Nil),
                    DebugAction::Step | DebugAction::Continue => {}
                }
            }

            if instruction.op == OpCode::Halt {
                return RunOutcome::Returned(Value::Nil);
            }

            match self.step(instruction, resolver) {
                Ok(Some(value)) => return RunOutcome::Returned(value),
                Ok(None) => {}
                Err(err) => {
                    tracing::trace!(pc = self.pc, %err, "instruction raised error");
                    self.interrupt = Interrupt::Error(ErrorInt::new(err.to_string(), self.fp, self.pc));
                }
            }
        }
    }

    fn snapshot(&self, instruction: Instruction) -> VmSnapshot {
        let live_registers = (0..8)
            .map(|r| (r, crate::debug::render_value(&self.registers[r as usize])))
            .collect();
        VmSnapshot {
            pc: self.pc,
            fp: self.fp,
            sp: self.stack.len(),
            instruction,
            live_registers,
        }
    }

    /// Walks the frame chain looking for a frame whose call flags include
    /// `PROTECT`, popping and `unref`ing (dropping) each callee along the
    /// way (spec.md §4.8 "Interrupts").
    fn handle_interrupt(&mut self) -> IntAction {
        loop {
            if self.fp == 0 || self.fp > self.stack.len() {
                return IntAction::Exit;
            }
            let old_fp = self.stack[self.fp - 1].as_raw().expect("frame slot: old fp");
            let _return_pc = self.stack[self.fp - 2].as_raw().expect("frame slot: return pc");
            let flags = self.stack[self.fp - 3].as_raw().expect("frame slot: call flags") as u8;
            let _callee = self.stack[self.fp - 4].as_value().cloned();

            self.stack.truncate(self.fp - 4);
            self.fp = old_fp;

            if flags & CALL_FLAG_PROTECT != 0 {
                return IntAction::Resume;
            }
            if self.fp == 0 {
                return IntAction::Exit;
            }
        }
    }

    fn frame_index(&self, slot: u16) -> usize {
        let signed = slot as i16 as isize;
        (self.fp as isize + signed) as usize
    }

    fn push_call_frame(&mut self, callee: Value, flags: u8, return_pc: u32) {
        self.stack.push(StackSlot::Value(callee));
        self.stack.push(StackSlot::Raw(flags as usize));
        self.stack.push(StackSlot::Raw(return_pc as usize));
        self.stack.push(StackSlot::Raw(self.fp));
        self.fp = self.stack.len();
    }

    /// Executes one instruction. Returns `Ok(Some(value))` when the entry
    /// frame returns (program finished), `Ok(None)` to keep dispatching,
    /// or `Err` to raise an `ERROR` interrupt at the next loop iteration.
    fn step(
        &mut self,
        instr: Instruction,
        resolver: &mut dyn ImportResolver,
    ) -> Result<Option<Value>, RuntimeError> {
        let mut advances_pc = true;
        let Instruction { op, a, b, c } = instr;

        match op {
            OpCode::Nop => {}
            OpCode::Halt => unreachable!("Halt is handled by the caller before step()"),
            OpCode::Unimpl => {
                return Err(RuntimeError::Native(
                    "unimplemented language feature reached at runtime".to_string(),
                ));
            }

            OpCode::LoadInt => {
                let value = ((b as i32) << 16 | c as i32) as i64;
                self.set_register(a, Value::Int(value));
            }
            OpCode::LoadK => {
                let constant = &self.exec.constants[c as usize];
                self.set_register(a, const_to_value(constant));
            }
            OpCode::LoadTrue => self.set_register(a, Value::Bool(true)),
            OpCode::LoadFalse => self.set_register(a, Value::Bool(false)),
            OpCode::LoadNil => self.set_register(a, Value::Nil),

            OpCode::GetLocal | OpCode::GetLocalRef => {
                let idx = self.frame_index(b);
                let value = self.stack[idx]
                    .as_value()
                    .cloned()
                    .ok_or(RuntimeError::UninitializedRegister(b))?;
                self.set_register(a, value);
            }
            OpCode::GetImport => {
                let module = Symbol::from_raw(b as u64);
                let key = Symbol::from_raw(c as u64);
                let value = resolver
                    .resolve_import(module, key)
                    .ok_or_else(|| RuntimeError::Native(format!("unresolved import {module}::{key}")))?;
                self.set_register(a, value);
            }
            OpCode::GetTop => {
                let value = self
                    .stack
                    .last()
                    .and_then(StackSlot::as_value)
                    .cloned()
                    .unwrap_or(Value::Nil);
                self.set_register(a, value);
            }
            OpCode::SetLocal => {
                let idx = self.frame_index(b);
                let value = self.registers[a as usize].clone();
                self.stack[idx] = StackSlot::Value(value);
            }

            OpCode::Move => {
                let value = std::mem::replace(&mut self.registers[b as usize], Value::Nil);
                self.set_register(a, value);
            }
            OpCode::Copy => {
                let value = self.registers[b as usize].clone();
                self.set_register(a, value);
            }
            OpCode::CopyRef => {
                let value = self.registers[b as usize].clone();
                self.set_register(a, value);
            }
            OpCode::Free1 => self.free_register(a),
            OpCode::Free2 => {
                self.free_register(a);
                self.free_register(b);
            }
            OpCode::Free3 => {
                self.free_register(a);
                self.free_register(b);
                self.free_register(c);
            }

            OpCode::IAdd => self.int_binop(a, b, c, |x, y| x.wrapping_add(y))?,
            OpCode::ISub => self.int_binop(a, b, c, |x, y| x.wrapping_sub(y))?,
            OpCode::IMul => self.int_binop(a, b, c, |x, y| x.wrapping_mul(y))?,
            OpCode::IDiv => self.int_binop_checked(a, b, c, |x, y| {
                if y == 0 { None } else { Some(x.wrapping_div(y)) }
            })?,
            OpCode::IMod => self.int_binop_checked(a, b, c, |x, y| {
                if y == 0 { None } else { Some(x.wrapping_rem(y)) }
            })?,
            OpCode::IAddK => self.int_binop_k(a, b, c, |x, y| x.wrapping_add(y))?,
            OpCode::ISubK => self.int_binop_k(a, b, c, |x, y| x.wrapping_sub(y))?,
            OpCode::IMulK => self.int_binop_k(a, b, c, |x, y| x.wrapping_mul(y))?,
            OpCode::IDivK => self.int_binop_k(a, b, c, |x, y| if y == 0 { 0 } else { x.wrapping_div(y) })?,
            OpCode::INeg => {
                let v = self.int_register(b)?;
                self.set_register(a, Value::Int(-v));
            }
            OpCode::IShl => self.int_binop(a, b, c, |x, y| x.wrapping_shl(y as u32))?,
            OpCode::IShr => self.int_binop(a, b, c, |x, y| x.wrapping_shr(y as u32))?,
            OpCode::IShlK => {
                let x = self.int_register(b)?;
                self.set_register(a, Value::Int(x.wrapping_shl(c as u32)));
            }
            OpCode::IShrK => {
                let x = self.int_register(b)?;
                self.set_register(a, Value::Int(x.wrapping_shr(c as u32)));
            }
            OpCode::IAnd => self.int_binop(a, b, c, |x, y| x & y)?,
            OpCode::IOr => self.int_binop(a, b, c, |x, y| x | y)?,
            OpCode::IXor => self.int_binop(a, b, c, |x, y| x ^ y)?,
            OpCode::INot => {
                let v = self.int_register(b)?;
                self.set_register(a, Value::Int(!v));
            }

            OpCode::FAdd => self.float_binop(a, b, c, |x, y| x + y)?,
            OpCode::FSub => self.float_binop(a, b, c, |x, y| x - y)?,
            OpCode::FMul => self.float_binop(a, b, c, |x, y| x * y)?,
            OpCode::FDiv => self.float_binop(a, b, c, |x, y| x / y)?,
            OpCode::FAddK => self.float_binop_k(a, b, c, |x, y| x + y)?,
            OpCode::FSubK => self.float_binop_k(a, b, c, |x, y| x - y)?,
            OpCode::FMulK => self.float_binop_k(a, b, c, |x, y| x * y)?,
            OpCode::FDivK => self.float_binop_k(a, b, c, |x, y| x / y)?,
            OpCode::FNeg => {
                let v = self.float_register(b)?;
                self.set_register(a, Value::Float(-v));
            }

            OpCode::ToFloat => {
                let v = self.int_register(b)?;
                self.set_register(a, Value::Float(v as f64));
            }
            OpCode::ToInt => {
                let v = self.float_register(b)?;
                self.set_register(a, Value::Int(v as i64));
            }
            OpCode::ToBool => {
                let v = self.registers[b as usize].is_truthy();
                self.set_register(a, Value::Bool(v));
            }
            OpCode::ToString => {
                let rendered = crate::debug::render_value(&self.registers[b as usize]);
                self.set_register(a, Value::CString(Symbol::from_raw(string_hash(&rendered))));
            }

            OpCode::IEq => self.int_cmp(a, b, c, |x, y| x == y)?,
            OpCode::INe => self.int_cmp(a, b, c, |x, y| x != y)?,
            OpCode::ILt => self.int_cmp(a, b, c, |x, y| x < y)?,
            OpCode::ILe => self.int_cmp(a, b, c, |x, y| x <= y)?,
            OpCode::IGt => self.int_cmp(a, b, c, |x, y| x > y)?,
            OpCode::IGe => self.int_cmp(a, b, c, |x, y| x >= y)?,
            OpCode::FEq => self.float_cmp(a, b, c, |x, y| x == y)?,
            OpCode::FNe => self.float_cmp(a, b, c, |x, y| x != y)?,
            OpCode::FLt => self.float_cmp(a, b, c, |x, y| x < y)?,
            OpCode::FLe => self.float_cmp(a, b, c, |x, y| x <= y)?,
            OpCode::FGt => self.float_cmp(a, b, c, |x, y| x > y)?,
            OpCode::FGe => self.float_cmp(a, b, c, |x, y| x >= y)?,
            OpCode::BEq => {
                let (x, y) = (self.bool_register(b)?, self.bool_register(c)?);
                self.set_register(a, Value::Bool(x == y));
            }
            OpCode::BNe => {
                let (x, y) = (self.bool_register(b)?, self.bool_register(c)?);
                self.set_register(a, Value::Bool(x != y));
            }
            OpCode::SEq => {
                let (x, y) = (self.registers[b as usize].clone(), self.registers[c as usize].clone());
                self.set_register(a, Value::Bool(x == y));
            }
            OpCode::SNe => {
                let (x, y) = (self.registers[b as usize].clone(), self.registers[c as usize].clone());
                self.set_register(a, Value::Bool(x != y));
            }
            OpCode::Is => {
                // Identity compare: closures compare by `Rc` pointer, every
                // other variant has no separate "identity" from its value.
                let same = match (&self.registers[b as usize], &self.registers[c as usize]) {
                    (Value::Closure(x), Value::Closure(y)) => Rc::ptr_eq(x, y),
                    (x, y) => x == y,
                };
                self.set_register(a, Value::Bool(same));
            }
            OpCode::Not => {
                let v = self.registers[b as usize].is_truthy();
                self.set_register(a, Value::Bool(!v));
            }

            OpCode::Jmp => {
                self.pc = (self.pc as i64 + a as i16 as i64) as u32;
                advances_pc = false;
            }
            OpCode::JmpBack => {
                self.pc = (self.pc as i64 - a as i64) as u32;
                advances_pc = false;
            }
            OpCode::JmpIf => {
                if self.registers[a as usize].is_truthy() {
                    self.pc = (self.pc as i64 + b as i16 as i64) as u32;
                    advances_pc = false;
                }
            }
            OpCode::JmpIfX => {
                if !self.registers[a as usize].is_truthy() {
                    self.pc = (self.pc as i64 + b as i16 as i64) as u32;
                    advances_pc = false;
                }
            }

            OpCode::Save => self.sp = Some(self.stack.len()),
            OpCode::Restore => {
                if let Some(sp) = self.sp {
                    self.stack.truncate(sp);
                }
            }
            OpCode::Push => {
                let value = self.registers[a as usize].clone();
                self.stack.push(StackSlot::Value(value));
            }

            OpCode::Call => {
                let callee = self.registers[a as usize].clone();
                let closure = callee
                    .as_closure()
                    .cloned()
                    .ok_or(RuntimeError::NotCallable)?;
                self.dispatch_call(callee, closure, 0)?;
                advances_pc = false;
            }

            OpCode::NewClosure => {
                let offset = ((b as u32) << 16) | c as u32;
                let entry_pc = self.pc + 1;
                let closure = Closure {
                    kind: ClosureKind::Bytecode { entry_pc },
                    arity: 0,
                    upvalues: Vec::new(),
                };
                self.set_register(a, Value::Closure(Rc::new(closure)));
                self.pc += offset;
                advances_pc = false;
            }

            OpCode::Ret => {
                let value = self.registers[a as usize].clone();
                if let Some(result) = self.teardown_frame(value)? {
                    return Ok(Some(result));
                }
                advances_pc = false;
            }
            OpCode::RetNil => {
                if let Some(result) = self.teardown_frame(Value::Nil)? {
                    return Ok(Some(result));
                }
                advances_pc = false;
            }
        }

        if advances_pc {
            self.pc += 1;
        }
        Ok(None)
    }

    /// Invokes `closure` bound to `callee`, with `argc` already-pushed
    /// arguments on the stack in reverse order (spec.md §4.8 "Calling
    /// convention"). For a native callee the call happens synchronously
    /// and its result is fed straight into `teardown_frame`-equivalent
    /// handling inline (no bytecode frame is pushed); for a bytecode
    /// callee a frame is pushed and `pc` jumps to its entry.
    fn dispatch_call(&mut self, callee: Value, closure: Rc<Closure>, flags: u8) -> Result<(), RuntimeError> {
        match &closure.kind {
            ClosureKind::Native(func) => {
                let argc = closure.arity as usize;
                let start = self.stack.len().saturating_sub(argc);
                let args: Vec<Value> = self.stack[start..]
                    .iter()
                    .rev()
                    .filter_map(StackSlot::as_value)
                    .cloned()
                    .collect();
                self.stack.truncate(start);
                let mut call_info = CallInfo::new(args);
                let result = func(&mut call_info);
                self.stack.push(StackSlot::Value(result));
                self.pc += 1;
                Ok(())
            }
            ClosureKind::Bytecode { entry_pc } => {
                let return_pc = self.pc + 1;
                self.push_call_frame(callee, flags, return_pc);
                self.pc = *entry_pc;
                Ok(())
            }
        }
    }

    /// Exposed for native host functions implementing protected-call
    /// semantics (standard-library `try`/`catch`-style builtins); not
    /// reached by any bytecode the emitter currently produces.
    pub fn call_protected(&mut self, callee: Value) -> Result<(), RuntimeError> {
        let closure = callee.as_closure().cloned().ok_or(RuntimeError::NotCallable)?;
        self.dispatch_call(callee, closure, CALL_FLAG_PROTECT)
    }

    /// `RET`/`RETNIL` (spec.md §4.8 "Returning"). Returns `Some(value)`
    /// when tearing down the outermost frame (the program is done),
    /// `None` when control resumes in the caller.
    fn teardown_frame(&mut self, value: Value) -> Result<Option<Value>, RuntimeError> {
        if self.fp == 0 || self.fp > self.stack.len() {
            return Ok(Some(value));
        }
        let old_fp = self.stack[self.fp - 1].as_raw().expect("frame slot: old fp");
        let return_pc = self.stack[self.fp - 2].as_raw().expect("frame slot: return pc") as u32;
        let _flags = self.stack[self.fp - 3].as_raw().expect("frame slot: call flags");
        self.stack.truncate(self.fp - 4);
        self.fp = old_fp;
        self.stack.push(StackSlot::Value(value));
        self.pc = return_pc;
        if self.fp == 0 {
            let result = self.stack.pop().and_then(|s| s.as_value().cloned()).unwrap_or(Value::Nil);
            return Ok(Some(result));
        }
        Ok(None)
    }

    fn int_register(&self, r: u16) -> Result<i64, RuntimeError> {
        self.registers[r as usize].as_int().ok_or(RuntimeError::UninitializedRegister(r))
    }

    fn float_register(&self, r: u16) -> Result<f64, RuntimeError> {
        self.registers[r as usize].as_float().ok_or(RuntimeError::UninitializedRegister(r))
    }

    fn bool_register(&self, r: u16) -> Result<bool, RuntimeError> {
        match self.registers[r as usize] {
            Value::Bool(b) => Ok(b),
            _ => Err(RuntimeError::UninitializedRegister(r)),
        }
    }

    fn int_binop(&mut self, a: u16, b: u16, c: u16, f: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let (x, y) = (self.int_register(b)?, self.int_register(c)?);
        self.set_register(a, Value::Int(f(x, y)));
        Ok(())
    }

    fn int_binop_checked(
        &mut self,
        a: u16,
        b: u16,
        c: u16,
        f: impl Fn(i64, i64) -> Option<i64>,
    ) -> Result<(), RuntimeError> {
        let (x, y) = (self.int_register(b)?, self.int_register(c)?);
        let result = f(x, y).ok_or_else(|| RuntimeError::Native("division by zero".to_string()))?;
        self.set_register(a, Value::Int(result));
        Ok(())
    }

    fn int_binop_k(&mut self, a: u16, b: u16, c: u16, f: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeError> {
        let x = self.int_register(b)?;
        let y = match &self.exec.constants[c as usize] {
            via_core::ConstValue::Int(i) => *i,
            _ => return Err(RuntimeError::Native("constant operand is not an int".to_string())),
        };
        self.set_register(a, Value::Int(f(x, y)));
        Ok(())
    }

    fn float_binop(&mut self, a: u16, b: u16, c: u16, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let (x, y) = (self.float_register(b)?, self.float_register(c)?);
        self.set_register(a, Value::Float(f(x, y)));
        Ok(())
    }

    fn float_binop_k(&mut self, a: u16, b: u16, c: u16, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let x = self.float_register(b)?;
        let y = match &self.exec.constants[c as usize] {
            via_core::ConstValue::Float(v) => *v,
            _ => return Err(RuntimeError::Native("constant operand is not a float".to_string())),
        };
        self.set_register(a, Value::Float(f(x, y)));
        Ok(())
    }

    fn int_cmp(&mut self, a: u16, b: u16, c: u16, f: impl Fn(i64, i64) -> bool) -> Result<(), RuntimeError> {
        let (x, y) = (self.int_register(b)?, self.int_register(c)?);
        self.set_register(a, Value::Bool(f(x, y)));
        Ok(())
    }

    fn float_cmp(&mut self, a: u16, b: u16, c: u16, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let (x, y) = (self.float_register(b)?, self.float_register(c)?);
        self.set_register(a, Value::Bool(f(x, y)));
        Ok(())
    }
}

fn const_to_value(c: &via_core::ConstValue) -> Value {
    match c {
        via_core::ConstValue::Nil => Value::Nil,
        via_core::ConstValue::Bool(b) => Value::Bool(*b),
        via_core::ConstValue::Int(i) => Value::Int(*i),
        via_core::ConstValue::Float(f) => Value::Float(*f),
        via_core::ConstValue::Str(s) => Value::CString(*s),
    }
}

/// Only used by `TOSTRING` to mint a placeholder symbol id for a rendered
/// value that was never interned at compile time; a real implementation
/// would route this through the shared `SymbolTable` instead, which the VM
/// does not otherwise need a handle to.
fn string_hash(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use via_core::{ConstValue, Instruction as I, OpCode as Op};

    fn unit_with(instructions: Vec<Instruction>) -> Rc<ExecUnit> {
        Rc::new(ExecUnit {
            instructions,
            constants: Vec::new(),
            labels: Default::default(),
        })
    }

    #[test]
    fn arithmetic_scenario_s1() {
        // fn main() -> int { return 2 + 3 * 4 }
        let instructions = vec![
            I::new(Op::LoadInt, 0, 0, 2),
            I::new(Op::LoadInt, 1, 0, 3),
            I::new(Op::LoadInt, 2, 0, 4),
            I::new(Op::IMul, 1, 1, 2),
            I::new(Op::IAdd, 0, 0, 1),
            I::new(Op::Ret, 0, 0, 0),
        ];
        let mut vm = VirtualMachine::new(unit_with(instructions));
        match vm.run(&mut NoImports) {
            RunOutcome::Returned(Value::Int(14)) => {}
            other => panic!("expected Int(14), got {other:?}"),
        }
    }

    #[test]
    fn load_k_reads_constant_pool() {
        let unit = ExecUnit {
            instructions: vec![I::new(Op::LoadK, 0, 0, 0), I::new(Op::Ret, 0, 0, 0)],
            constants: vec![ConstValue::Int(99)],
            labels: Default::default(),
        };
        let mut vm = VirtualMachine::new(Rc::new(unit));
        match vm.run(&mut NoImports) {
            RunOutcome::Returned(Value::Int(99)) => {}
            other => panic!("expected Int(99), got {other:?}"),
        }
    }

    #[test]
    fn division_by_zero_raises_unhandled_error() {
        let instructions = vec![
            I::new(Op::LoadInt, 0, 0, 1),
            I::new(Op::LoadInt, 1, 0, 0),
            I::new(Op::IDiv, 0, 0, 1),
            I::new(Op::Ret, 0, 0, 0),
        ];
        let mut vm = VirtualMachine::new(unit_with(instructions));
        match vm.run(&mut NoImports) {
            RunOutcome::UnhandledError(msg) => assert_eq!(msg, "division by zero"),
            other => panic!("expected UnhandledError, got {other:?}"),
        }
    }

    #[test]
    fn jmp_skips_forward() {
        let instructions = vec![
            I::new(Op::Jmp, 2, 0, 0),
            I::new(Op::LoadInt, 0, 0, 111), // skipped
            I::new(Op::LoadInt, 0, 0, 7),
            I::new(Op::Ret, 0, 0, 0),
        ];
        let mut vm = VirtualMachine::new(unit_with(instructions));
        match vm.run(&mut NoImports) {
            RunOutcome::Returned(Value::Int(7)) => {}
            other => panic!("expected Int(7), got {other:?}"),
        }
    }
}
