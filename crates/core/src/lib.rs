//! Process-wide data model shared by every stage of the `via` pipeline:
//! source buffers, symbol/type interning, diagnostics, constant values,
//! bytecode records, the index-based arena, and permission/flag bitsets.
//!
//! Nothing here executes a program or parses source text; those live in
//! `via-compiler` and `via-runtime`, both of which depend on this crate
//! for a shared vocabulary.

mod macros;

pub mod arena;
pub mod bytecode;
pub mod constant;
pub mod diag;
pub mod flags;
pub mod intern;
pub mod source;
pub mod types;

pub use arena::{Arena, Id};
pub use bytecode::{ExecUnit, Instruction, OpCode};
pub use constant::ConstValue;
pub use diag::{DiagContext, Diagnostic, Footnote, FootnoteKind, Severity};
pub use flags::{ModuleFlags, Permission};
pub use intern::{QualName, Symbol, SymbolTable};
pub use source::{LineCol, SourceBuffer, SourceLoc};
pub use types::{BuiltinKind, CastResult, QualType, Qualifiers, TypeContext, TypeId, cast_result};
