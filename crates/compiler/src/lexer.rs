//! Lexical analysis (spec.md §4.1).
//!
//! Consumes a [`SourceBuffer`] and yields a flat token vector ending with an
//! explicit `Eof`. Strings remain slices into the buffer until a later pass
//! interns them (spec.md §4.1: "no symbol table interaction").

use via_core::{DiagContext, Diagnostic, Footnote, SourceBuffer, SourceLoc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    KwFn,
    KwVar,
    KwConst,
    KwIf,
    KwElif,
    KwElse,
    KwFor,
    KwIn,
    KwWhile,
    KwDo,
    KwReturn,
    KwEnum,
    KwImport,
    KwStruct,
    KwType,
    KwTrue,
    KwFalse,
    KwNil,
    KwAnd,
    KwOr,
    KwNot,
    KwIs,
    KwAs,

    IntLiteral,
    FloatLiteral,
    StringLiteral,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    ColonColon,
    Dot,
    Semi,
    Arrow,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    Eof,
}

/// Keyword table (spec.md §4.1: "keyword set is closed and table-driven").
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("fn", TokenKind::KwFn),
    ("var", TokenKind::KwVar),
    ("const", TokenKind::KwConst),
    ("if", TokenKind::KwIf),
    ("elif", TokenKind::KwElif),
    ("else", TokenKind::KwElse),
    ("for", TokenKind::KwFor),
    ("in", TokenKind::KwIn),
    ("while", TokenKind::KwWhile),
    ("do", TokenKind::KwDo),
    ("return", TokenKind::KwReturn),
    ("enum", TokenKind::KwEnum),
    ("import", TokenKind::KwImport),
    ("struct", TokenKind::KwStruct),
    ("type", TokenKind::KwType),
    ("true", TokenKind::KwTrue),
    ("false", TokenKind::KwFalse),
    ("nil", TokenKind::KwNil),
    ("and", TokenKind::KwAnd),
    ("or", TokenKind::KwOr),
    ("not", TokenKind::KwNot),
    ("is", TokenKind::KwIs),
    ("as", TokenKind::KwAs),
];

/// Multi-character punctuation, longest match first (spec.md §4.1).
const OPERATORS: &[(&str, TokenKind)] = &[
    ("**=", TokenKind::StarStarEq),
    ("::", TokenKind::ColonColon),
    ("->", TokenKind::Arrow),
    ("**", TokenKind::StarStar),
    ("==", TokenKind::Eq),
    ("!=", TokenKind::Ne),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("%=", TokenKind::PercentEq),
    ("&=", TokenKind::AmpEq),
    ("|=", TokenKind::PipeEq),
    ("^=", TokenKind::CaretEq),
    ("<<=", TokenKind::ShlEq),
    (">>=", TokenKind::ShrEq),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    (".", TokenKind::Dot),
    (";", TokenKind::Semi),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&", TokenKind::Amp),
    ("|", TokenKind::Pipe),
    ("^", TokenKind::Caret),
    ("~", TokenKind::Tilde),
    ("=", TokenKind::Assign),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
];

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLoc,
}

pub struct Lexer<'a> {
    buffer: &'a SourceBuffer,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(buffer: &'a SourceBuffer) -> Self {
        Lexer { buffer, bytes: buffer.as_bytes(), pos: 0 }
    }

    pub fn tokenize(mut self, diags: &mut DiagContext) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            if self.is_at_end() {
                tokens.push(Token { kind: TokenKind::Eof, loc: SourceLoc::point(self.pos as u32) });
                break;
            }
            match self.scan_one(diags) {
                Some(tok) => tokens.push(tok),
                None => continue,
            }
        }
        tokens
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_one(&mut self, diags: &mut DiagContext) -> Option<Token> {
        let start = self.pos;
        let c = self.peek();

        if c.is_ascii_digit() {
            return Some(self.scan_number());
        }
        if c == b'"' {
            return Some(self.scan_string(diags));
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return Some(self.scan_ident_or_keyword());
        }

        for (text, kind) in OPERATORS {
            if self.bytes[self.pos..].starts_with(text.as_bytes()) {
                self.pos += text.len();
                return Some(Token { kind: *kind, loc: SourceLoc::new(start as u32, self.pos as u32) });
            }
        }

        self.pos += 1;
        diags.push(
            Diagnostic::error(
                SourceLoc::new(start as u32, self.pos as u32),
                format!("unknown byte 0x{c:02x}"),
            )
            .with_footnote(Footnote::hint("this byte does not start any recognized token")),
        );
        // Resume at the next whitespace boundary (spec.md §4.1).
        while !self.is_at_end() && !self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
        None
    }

    fn scan_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
            self.pos += 1;
        }
        let text = self.buffer.slice(SourceLoc::new(start as u32, self.pos as u32));
        let kind = KEYWORDS
            .iter()
            .find(|(kw, _)| *kw == text)
            .map(|(_, k)| *k)
            .unwrap_or(TokenKind::Ident);
        Token { kind, loc: SourceLoc::new(start as u32, self.pos as u32) }
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.pos += 2;
            while !self.is_at_end() && self.peek().is_ascii_hexdigit() {
                self.pos += 1;
            }
            return Token { kind: TokenKind::IntLiteral, loc: SourceLoc::new(start as u32, self.pos as u32) };
        }
        if self.peek() == b'0' && (self.peek_at(1) == b'b' || self.peek_at(1) == b'B') {
            self.pos += 2;
            while !self.is_at_end() && (self.peek() == b'0' || self.peek() == b'1') {
                self.pos += 1;
            }
            return Token { kind: TokenKind::IntLiteral, loc: SourceLoc::new(start as u32, self.pos as u32) };
        }
        let mut is_float = false;
        while !self.is_at_end() && self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            is_float = true;
            self.pos += 1;
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if self.peek() == b'e' || self.peek() == b'E' {
            is_float = true;
            self.pos += 1;
            if self.peek() == b'+' || self.peek() == b'-' {
                self.pos += 1;
            }
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let kind = if is_float { TokenKind::FloatLiteral } else { TokenKind::IntLiteral };
        Token { kind, loc: SourceLoc::new(start as u32, self.pos as u32) }
    }

    fn scan_string(&mut self, diags: &mut DiagContext) -> Token {
        let start = self.pos;
        self.pos += 1; // opening quote
        loop {
            if self.is_at_end() {
                diags.push(Diagnostic::error(
                    SourceLoc::new(start as u32, self.pos as u32),
                    "unterminated string literal",
                ));
                break;
            }
            match self.peek() {
                b'"' => {
                    self.pos += 1;
                    break;
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }
        Token { kind: TokenKind::StringLiteral, loc: SourceLoc::new(start as u32, self.pos as u32) }
    }
}

/// Resolves escape sequences in a string literal's raw text (quotes still
/// attached), matching the source-level escapes spec.md §4.1 names:
/// "standard escape processing".
pub fn unescape(raw: &str) -> String {
    let inner = &raw[1..raw.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        let buf = SourceBuffer::new("t.via", src);
        let mut diags = DiagContext::new();
        Lexer::new(&buf).tokenize(&mut diags).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_function_signature() {
        let kinds = lex("fn main() -> int {");
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwFn,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Ident,
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn longest_match_prefers_shift_assign_over_shift() {
        let kinds = lex("<<=");
        assert_eq!(kinds, vec![TokenKind::ShlEq, TokenKind::Eof]);
    }

    #[test]
    fn hex_and_binary_literals() {
        let kinds = lex("0x1F 0b101");
        assert_eq!(kinds, vec![TokenKind::IntLiteral, TokenKind::IntLiteral, TokenKind::Eof]);
    }

    #[test]
    fn unterminated_string_reports_error_and_recovers() {
        let buf = SourceBuffer::new("t.via", "\"abc");
        let mut diags = DiagContext::new();
        let tokens = Lexer::new(&buf).tokenize(&mut diags);
        assert!(diags.has_errors());
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn unescape_handles_standard_escapes() {
        assert_eq!(unescape("\"a\\nb\""), "a\nb");
        assert_eq!(unescape("\"\\\"q\\\"\""), "\"q\"");
    }

    #[test]
    fn unknown_byte_reports_error_and_resumes() {
        let buf = SourceBuffer::new("t.via", "@ fn");
        let mut diags = DiagContext::new();
        let tokens = Lexer::new(&buf).tokenize(&mut diags);
        assert!(diags.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::KwFn);
    }
}
