//! Compile-time frame stack (spec.md §3 "Stack frame (compile-time)"):
//! maps symbols to local descriptors while the IR builder and the emitter
//! each walk a function body. Both passes push a fresh frame per function
//! and resolve names by walking outward from the innermost frame, so the
//! structure is shared here rather than duplicated in `ir.rs` and
//! `emit.rs`.

use std::collections::HashMap;
use via_core::Symbol;

/// One lexical scope's worth of declarations. Generic over the descriptor
/// payload: the IR builder stores type/const info (see `ir::LocalInfo`),
/// the emitter stores the assigned stack slot (a plain `u16`).
#[derive(Debug, Default)]
pub struct FrameStack<T> {
    frames: Vec<HashMap<Symbol, T>>,
}

impl<T> FrameStack<T> {
    pub fn new() -> Self {
        FrameStack { frames: Vec::new() }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop().expect("pop_frame called with no open frame");
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declares `symbol` in the innermost frame, shadowing any outer
    /// declaration of the same name. Returns the prior descriptor for the
    /// same symbol *in this frame only*, so callers can diagnose
    /// redeclaration within one scope (shadowing across scopes is legal).
    pub fn declare(&mut self, symbol: Symbol, descriptor: T) -> Option<T> {
        self.frames
            .last_mut()
            .expect("declare called with no open frame")
            .insert(symbol, descriptor)
    }

    /// Resolves `symbol` by walking from the innermost frame outward.
    pub fn resolve(&self, symbol: Symbol) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(&symbol))
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Encodes a compile-time slot position into the signed frame-relative
/// form the VM's `GETLOCAL`/`GETLOCALREF` operand expects (spec.md §4.8):
/// parameters sit below `fp` (negative), locals sit at or above it
/// (non-negative). Mirrors `via_runtime::vm`'s decode of the same value.
pub fn encode_frame_slot(offset: i16) -> u16 {
    offset as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frame_shadows_outer() {
        let mut stack: FrameStack<u16> = FrameStack::new();
        let sym = Symbol::from_raw(1);
        stack.push_frame();
        stack.declare(sym, 0);
        stack.push_frame();
        stack.declare(sym, 5);
        assert_eq!(stack.resolve(sym), Some(&5));
        stack.pop_frame();
        assert_eq!(stack.resolve(sym), Some(&0));
    }

    #[test]
    fn unresolved_symbol_is_none() {
        let mut stack: FrameStack<u16> = FrameStack::new();
        stack.push_frame();
        assert_eq!(stack.resolve(Symbol::from_raw(99)), None);
    }

    #[test]
    fn encode_slot_round_trips_negative_offsets() {
        let param_slot = encode_frame_slot(-2);
        assert_eq!(param_slot as i16, -2);
    }
}
