//! Source buffers and locations.
//!
//! A [`SourceBuffer`] owns the raw bytes of one translation unit and
//! converts absolute byte offsets to 1-based `(line, column)` pairs on
//! demand. [`SourceLoc`] is the half-open byte range `[begin, end)` that
//! every token, AST node and diagnostic carries.

use std::fmt;
use std::path::{Path, PathBuf};

/// A half-open byte range `[begin, end)` into a single [`SourceBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct SourceLoc {
    pub begin: u32,
    pub end: u32,
}

impl SourceLoc {
    pub fn new(begin: u32, end: u32) -> Self {
        debug_assert!(begin <= end, "SourceLoc: begin ({begin}) must be <= end ({end})");
        SourceLoc { begin, end }
    }

    /// A zero-width location at `pos`, used for synthesized nodes (e.g. an
    /// implicit `return nil`).
    pub fn point(pos: u32) -> Self {
        SourceLoc { begin: pos, end: pos }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn merge(self, other: SourceLoc) -> SourceLoc {
        SourceLoc {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    pub fn len(self) -> u32 {
        self.end - self.begin
    }

    pub fn is_empty(self) -> bool {
        self.begin == self.end
    }
}

/// 1-based line and column, as produced by [`SourceBuffer::line_col`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Owns the raw bytes of one file (or in-memory string) and answers
/// offset-to-line/column queries.
///
/// Line start offsets are computed once, lazily, on first query and cached;
/// a `via` build processes each module once so this is not a hot path.
#[derive(Debug)]
pub struct SourceBuffer {
    name: PathBuf,
    text: String,
    line_starts: Vec<u32>,
}

impl SourceBuffer {
    pub fn new(name: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = compute_line_starts(&text);
        SourceBuffer {
            name: name.into(),
            text,
            line_starts,
        }
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Slice of source text covered by `loc`. Panics if `loc` falls outside
    /// the buffer or splits a UTF-8 code point (both indicate a compiler
    /// bug, never a user-facing condition).
    pub fn slice(&self, loc: SourceLoc) -> &str {
        &self.text[loc.begin as usize..loc.end as usize]
    }

    pub fn is_valid_range(&self, loc: SourceLoc) -> bool {
        loc.end as usize <= self.text.len()
    }

    /// Converts an absolute byte offset to a 1-based `(line, column)` pair.
    /// Column is counted in bytes, matching the lexer's own byte-oriented
    /// scanning; this core never reasons about Unicode grapheme width.
    pub fn line_col(&self, offset: u32) -> LineCol {
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts[idx];
        LineCol {
            line: idx as u32 + 1,
            column: offset - line_start + 1,
        }
    }
}

fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i as u32 + 1);
        }
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_first_line() {
        let buf = SourceBuffer::new("t.via", "abc\ndef\n");
        assert_eq!(buf.line_col(0), LineCol { line: 1, column: 1 });
        assert_eq!(buf.line_col(2), LineCol { line: 1, column: 3 });
    }

    #[test]
    fn line_col_second_line() {
        let buf = SourceBuffer::new("t.via", "abc\ndef\n");
        assert_eq!(buf.line_col(4), LineCol { line: 2, column: 1 });
        assert_eq!(buf.line_col(6), LineCol { line: 2, column: 3 });
    }

    #[test]
    fn merge_covers_both_spans() {
        let a = SourceLoc::new(2, 5);
        let b = SourceLoc::new(10, 12);
        assert_eq!(a.merge(b), SourceLoc::new(2, 12));
    }

    #[test]
    fn slice_roundtrips() {
        let buf = SourceBuffer::new("t.via", "fn main() {}");
        let loc = SourceLoc::new(0, 2);
        assert_eq!(buf.slice(loc), "fn");
    }
}
