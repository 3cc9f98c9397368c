//! The symbol-interning table: a bidirectional `string <-> u64` store
//! shared by every module in a build (spec.md §3 Symbol, §4.3).
//!
//! `intern(s) == intern(t) <=> s == t` is the whole contract: two calls with
//! equal strings always return the same [`Symbol`], so downstream passes
//! can compare symbols by value instead of re-hashing strings.

use std::collections::HashMap;
use std::fmt;

/// A unique identifier for an interned string. Stable for the life of the
/// [`SymbolTable`] that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct Symbol(u64);

impl Symbol {
    /// Reconstructs a `Symbol` from a raw id, e.g. one decoded out of an
    /// `Instruction` operand by the VM. The caller is responsible for the
    /// id having actually come from the same [`SymbolTable`].
    pub fn from_raw(id: u64) -> Self {
        Symbol(id)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An ordered sequence of name segments, e.g. `a::b::c`. Interning a
/// `QualName` interns the joined `"::"`-separated string, so
/// `QualName::from(["a", "b"]).intern(table) == QualName::from(["a", "b"]).intern(table)`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QualName {
    segments: Vec<String>,
}

impl QualName {
    pub fn new(segments: Vec<String>) -> Self {
        debug_assert!(!segments.is_empty(), "QualName must have at least one segment");
        QualName { segments }
    }

    pub fn single(name: impl Into<String>) -> Self {
        QualName { segments: vec![name.into()] }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn joined(&self) -> String {
        self.segments.join("::")
    }

    pub fn last(&self) -> &str {
        self.segments.last().expect("QualName is never empty")
    }
}

impl fmt::Display for QualName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.joined())
    }
}

/// Bidirectional intern store: `string -> Symbol` via a hash map, `Symbol ->
/// string` via an index into `strings` (the table owns every string it has
/// ever interned, matching the source's process-wide symbol table; indices
/// double as the `u64` identity since we never remove entries).
#[derive(Debug, Default)]
pub struct SymbolTable {
    strings: Vec<String>,
    lookup: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Canonicalize `s`, returning the same [`Symbol`] for equal strings.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.lookup.get(s) {
            return sym;
        }
        let id = self.strings.len() as u64;
        self.strings.push(s.to_string());
        let sym = Symbol(id);
        self.lookup.insert(s.to_string(), sym);
        sym
    }

    pub fn intern_qual(&mut self, name: &QualName) -> Symbol {
        self.intern(&name.joined())
    }

    /// Resolves a previously interned symbol back to its string. Panics if
    /// `sym` did not come from this table (a compiler bug, never triggered
    /// by user input).
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (Symbol(i as u64), s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut t = SymbolTable::new();
        let a = t.intern("foo");
        let b = t.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_strings_get_distinct_symbols() {
        let mut t = SymbolTable::new();
        let a = t.intern("foo");
        let b = t.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_roundtrips() {
        let mut t = SymbolTable::new();
        let s = t.intern("hello");
        assert_eq!(t.resolve(s), "hello");
    }

    #[test]
    fn qual_name_joins_with_double_colon() {
        let mut t = SymbolTable::new();
        let name = QualName::new(vec!["a".into(), "b".into(), "c".into()]);
        let sym = t.intern_qual(&name);
        assert_eq!(t.resolve(sym), "a::b::c");
    }
}
