//! The bytecode model (spec.md §3 Instruction/ExecUnit, §4.7/§4.8): a flat
//! instruction stream, a constant pool, and the label map the emitter
//! leaves behind for the debugger.

use crate::constant::ConstValue;
use std::collections::HashMap;

/// One opcode per instruction family named in spec.md §4.7/§4.8. `K`
/// suffixes read operand `c` from the constant pool instead of a register;
/// `ISHL`/`ISHR` are emitted only by the strength-reduction peephole, never
/// directly by the walk over IR (SPEC_FULL.md §2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[allow(non_camel_case_types)]
pub enum OpCode {
    Nop,
    Halt,
    /// Reached only through a code path the type checker accepted but the
    /// emitter cannot lower (tuples, lambdas): raises an `ERROR` interrupt
    /// with a fixed message instead of miscompiling.
    Unimpl,

    LoadInt,
    LoadK,
    LoadTrue,
    LoadFalse,
    LoadNil,

    GetLocal,
    GetLocalRef,
    GetImport,
    GetTop,
    /// Writes register `a` back into frame slot `b` (signed, encoded per
    /// `via_compiler::frame::encode_frame_slot`). Added in this revision:
    /// `GETLOCAL`/`GETLOCALREF` only read an existing slot, and `PUSH` only
    /// ever creates a new one, so assignment to an already-declared local
    /// had no opcode to lower into.
    SetLocal,

    Move,
    Copy,
    CopyRef,
    Free1,
    Free2,
    Free3,

    IAdd,
    ISub,
    IMul,
    IDiv,
    IMod,
    IAddK,
    ISubK,
    IMulK,
    IDivK,
    INeg,
    IShl,
    IShr,
    /// Shift left by the literal amount in operand `c` (0-63), not a
    /// constant-pool index and not a register. Emitted only by the
    /// strength-reduction peephole rewriting `IMULK` by a power of two
    /// (SPEC_FULL.md §2), which must not grow the instruction stream, so
    /// this reuses `IMULK`'s three operand slots with a different meaning
    /// for `c` rather than adding a fourth operand.
    IShlK,
    /// Shift right by the literal amount in operand `c`; see `ISHLK`.
    IShrK,
    IAnd,
    IOr,
    IXor,
    INot,

    FAdd,
    FSub,
    FMul,
    FDiv,
    FAddK,
    FSubK,
    FMulK,
    FDivK,
    FNeg,

    ToFloat,
    ToInt,
    ToBool,
    ToString,

    IEq,
    INe,
    ILt,
    ILe,
    IGt,
    IGe,
    FEq,
    FNe,
    FLt,
    FLe,
    FGt,
    FGe,
    BEq,
    BNe,
    SEq,
    SNe,
    Is,
    Not,

    Jmp,
    JmpBack,
    JmpIf,
    JmpIfX,

    Save,
    Restore,
    Push,
    Call,
    NewClosure,
    Ret,
    RetNil,
}

/// A fixed record `(op, a, b, c)`, all 16-bit operands (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Instruction {
    pub op: OpCode,
    pub a: u16,
    pub b: u16,
    pub c: u16,
}

impl Instruction {
    pub fn new(op: OpCode, a: u16, b: u16, c: u16) -> Self {
        Instruction { op, a, b, c }
    }

    pub fn nullary(op: OpCode) -> Self {
        Instruction::new(op, 0, 0, 0)
    }
}

/// An immutable bytecode program for one module (spec.md §3 ExecUnit):
/// the patched instruction stream, its constant pool, and a label-to-PC
/// map retained for the debugger (spec.md §4.7: "used by the debugger
/// only").
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecUnit {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<ConstValue>,
    pub labels: HashMap<u32, u32>,
}

impl ExecUnit {
    pub fn new() -> Self {
        ExecUnit::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn pc_for_label(&self, label: u32) -> Option<u32> {
        self.labels.get(&label).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_nullary_zeroes_operands() {
        let i = Instruction::nullary(OpCode::Halt);
        assert_eq!(i, Instruction::new(OpCode::Halt, 0, 0, 0));
    }

    #[test]
    fn label_lookup_resolves_pc() {
        let mut unit = ExecUnit::new();
        unit.labels.insert(3, 42);
        assert_eq!(unit.pc_for_label(3), Some(42));
        assert_eq!(unit.pc_for_label(4), None);
    }
}
