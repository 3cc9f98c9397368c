//! Structured diagnostics (spec.md §7): severity, an optional footnote, and
//! the per-module sink that accumulates them in submission order.
//!
//! Rendering diagnostics to a terminal (colors, wrapping) is a host
//! concern and explicitly out of scope (spec.md §1); this module only
//! produces the structured data.

use crate::source::SourceLoc;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FootnoteKind {
    Hint,
    Note,
    Suggestion,
}

impl fmt::Display for FootnoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FootnoteKind::Hint => "HINT",
            FootnoteKind::Note => "NOTE",
            FootnoteKind::Suggestion => "SUGGESTION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Footnote {
    pub kind: FootnoteKind,
    pub text: String,
}

impl Footnote {
    pub fn new(kind: FootnoteKind, text: impl Into<String>) -> Self {
        Footnote { kind, text: text.into() }
    }

    pub fn hint(text: impl Into<String>) -> Self {
        Footnote::new(FootnoteKind::Hint, text)
    }

    pub fn note(text: impl Into<String>) -> Self {
        Footnote::new(FootnoteKind::Note, text)
    }

    pub fn suggestion(text: impl Into<String>) -> Self {
        Footnote::new(FootnoteKind::Suggestion, text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: SourceLoc,
    pub message: String,
    pub footnote: Option<Footnote>,
}

impl Diagnostic {
    pub fn new(severity: Severity, loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic { severity, loc, message: message.into(), footnote: None }
    }

    pub fn info(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Info, loc, message)
    }

    pub fn warning(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, loc, message)
    }

    pub fn error(loc: SourceLoc, message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, loc, message)
    }

    pub fn with_footnote(mut self, footnote: Footnote) -> Self {
        self.footnote = Some(footnote);
        self
    }
}

/// Accumulates diagnostics for one module in submission order (spec.md §7:
/// "emitted in submission order"). Any `ERROR` means the module's
/// subsequent pipeline stages must not run (spec.md §7, §8 invariant 9).
#[derive(Debug, Default)]
pub struct DiagContext {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagContext {
    pub fn new() -> Self {
        DiagContext::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(diag);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_count_tracks_only_errors() {
        let mut ctx = DiagContext::new();
        ctx.push(Diagnostic::warning(SourceLoc::point(0), "redundant type cast"));
        assert!(!ctx.has_errors());
        ctx.push(Diagnostic::error(SourceLoc::point(1), "use of undefined symbol 'x'"));
        assert!(ctx.has_errors());
        assert_eq!(ctx.error_count(), 1);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn diagnostics_preserve_submission_order() {
        let mut ctx = DiagContext::new();
        ctx.push(Diagnostic::info(SourceLoc::point(0), "first"));
        ctx.push(Diagnostic::error(SourceLoc::point(1), "second"));
        let msgs: Vec<_> = ctx.diagnostics().iter().map(|d| d.message.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second"]);
    }

    #[test]
    fn footnote_carries_kind_and_text() {
        let d = Diagnostic::error(SourceLoc::point(0), "use of undefined symbol 'x'")
            .with_footnote(Footnote::hint("did you mistype 'x' or forget to declare it?"));
        let fn_ = d.footnote.expect("footnote present");
        assert_eq!(fn_.kind, FootnoteKind::Hint);
        assert_eq!(fn_.text, "did you mistype 'x' or forget to declare it?");
    }
}
