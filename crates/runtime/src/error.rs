//! Runtime error propagation (spec.md §4.8 "Interrupts", §7 "Runtime
//! errors").
//!
//! Unlike a JIT that calls back into Rust across a raw C ABI boundary, this
//! VM calls native host functions directly as Rust closures, so there is no
//! FFI panic-safety boundary to guard with thread-local state; a failing
//! native call simply returns a [`RuntimeError`] that the VM turns into an
//! `ERROR` interrupt.

use std::fmt;

/// The payload carried by the `ERROR` interrupt (spec.md §4.8): a message
/// plus enough frame state for `unwind_stack` to report where execution
/// was when the error was raised.
#[derive(Debug, Clone)]
pub struct ErrorInt {
    pub message: String,
    pub fp: usize,
    pub pc: u32,
}

impl ErrorInt {
    pub fn new(message: impl Into<String>, fp: usize, pc: u32) -> Self {
        ErrorInt { message: message.into(), fp, pc }
    }
}

impl fmt::Display for ErrorInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pc={}, fp={})", self.message, self.pc, self.fp)
    }
}

/// Errors a native host function can return from a call; the VM converts
/// these into an `ERROR` interrupt at the call site rather than unwinding
/// a Rust panic through the dispatch loop.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// A host function rejected its arguments or failed its own work.
    Native(String),
    /// `CALL` targeted a register that does not hold a closure.
    NotCallable,
    /// Argument count did not match the callee's declared arity.
    ArityMismatch { expected: u16, got: u16 },
    /// A register or stack slot was read before anything was written to it.
    UninitializedRegister(u16),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Native(msg) => write!(f, "{msg}"),
            RuntimeError::NotCallable => write!(f, "value is not callable"),
            RuntimeError::ArityMismatch { expected, got } => {
                write!(f, "expected {expected} argument(s), got {got}")
            }
            RuntimeError::UninitializedRegister(r) => {
                write!(f, "read of uninitialized register {r}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_int_display_includes_location() {
        let e = ErrorInt::new("boom", 4, 10);
        assert_eq!(e.to_string(), "boom (pc=10, fp=4)");
    }

    #[test]
    fn arity_mismatch_display() {
        let e = RuntimeError::ArityMismatch { expected: 2, got: 1 };
        assert_eq!(e.to_string(), "expected 2 argument(s), got 1");
    }
}
