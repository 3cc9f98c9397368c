//! The embedded register virtual machine (spec.md §4.8) and its value
//! model, native-module ABI, and debugger hooks.
//!
//! This crate knows nothing about source text, parsing, or the IR builder;
//! it consumes an already-emitted `via_core::ExecUnit` and runs it. The
//! compile-time half of the pipeline lives in `via-compiler`, which
//! depends on this crate for `Value`/`VirtualMachine` types that native
//! module `Def`s need to be callable.

pub mod debug;
pub mod error;
pub mod native;
pub mod value;
pub mod vm;

pub use debug::{DebugAction, DebugHook, RecordingHook, VmSnapshot};
pub use error::{ErrorInt, RuntimeError};
pub use native::{CallInfo, LoadError, NativeDef, NativeFn, NativeModule, NativeModuleInfo};
pub use value::{Closure, ClosureKind, Value};
pub use vm::{ImportResolver, Interrupt, NoImports, RunOutcome, VirtualMachine};
