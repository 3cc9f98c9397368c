//! Recursive-descent parser with a Pratt-style precedence climber for
//! binary expressions (spec.md §4.2).
//!
//! Single-pass: no name or type resolution happens here, only shape.
//! Parse errors are reported to the [`DiagContext`] and recovered at the
//! next statement boundary; a caught error does not abort the whole parse
//! the way an IR/emit error aborts later stages (spec.md §7).

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind, unescape};
use via_core::{ConstValue, DiagContext, Diagnostic, Footnote, QualName, SourceBuffer, SourceLoc, Symbol, SymbolTable};

/// Thrown internally to unwind to the nearest statement boundary on a
/// catastrophic parse error (spec.md §4.2: "Parser errors are thrown,
/// caught at the statement boundary").
struct ParseAbort;

type PResult<T> = Result<T, ParseAbort>;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    buffer: &'a SourceBuffer,
    symbols: &'a mut SymbolTable,
    diags: &'a mut DiagContext,
}

pub fn parse_program(buffer: &SourceBuffer, symbols: &mut SymbolTable, diags: &mut DiagContext) -> Program {
    let tokens = Lexer::new(buffer).tokenize(diags);
    let mut parser = Parser { tokens, pos: 0, buffer, symbols, diags };
    parser.parse_program()
}

impl<'a> Parser<'a> {
    fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        while !self.at(TokenKind::Eof) {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(ParseAbort) => self.recover_to_next_stmt(),
            }
        }
        Program { stmts }
    }

    fn recover_to_next_stmt(&mut self) {
        // Resume at the next statement-starting keyword or the next `;`.
        while !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Semi) {
                self.advance();
                return;
            }
            if self.starts_stmt() {
                return;
            }
            self.advance();
        }
    }

    fn starts_stmt(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::KwFn
                | TokenKind::KwVar
                | TokenKind::KwConst
                | TokenKind::KwIf
                | TokenKind::KwFor
                | TokenKind::KwWhile
                | TokenKind::KwDo
                | TokenKind::KwReturn
                | TokenKind::KwEnum
                | TokenKind::KwImport
                | TokenKind::KwStruct
                | TokenKind::KwType
        )
    }

    // -- token stream helpers ------------------------------------------------

    fn peek(&self) -> Token {
        self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos];
        if !self.at(TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn text(&self, tok: Token) -> &str {
        self.buffer.slice(tok.loc)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let tok = self.peek();
            self.diags.push(
                Diagnostic::error(tok.loc, format!("unexpected token, expected {what}"))
                    .with_footnote(Footnote::hint(format!("expected {what} here"))),
            );
            Err(ParseAbort)
        }
    }

    fn intern_ident(&mut self, tok: Token) -> Symbol {
        let text = self.buffer.slice(tok.loc).to_string();
        self.symbols.intern(&text)
    }

    // -- statements -----------------------------------------------------------

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::KwVar | TokenKind::KwConst => self.parse_var_decl(),
            TokenKind::KwDo => self.parse_scope(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwEnum => self.parse_enum_decl(),
            TokenKind::KwImport => self.parse_import(),
            TokenKind::KwStruct => self.parse_struct_decl(),
            TokenKind::KwType => self.parse_type_decl(),
            TokenKind::KwFn => self.parse_func_decl(),
            _ => self.parse_expr_or_assign_stmt(),
        }
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(ParseAbort) => self.recover_to_next_stmt(),
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let start = self.peek().loc;
        let is_const = self.at(TokenKind::KwConst);
        self.advance();
        let name_tok = self.expect(TokenKind::Ident, "a variable name")?;
        let name = self.intern_ident(name_tok);
        let ty = if self.at(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let init = if self.at(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let end = self.peek().loc;
        Ok(Stmt::VarDecl { name, ty, init, is_const, loc: start.merge(end) })
    }

    fn parse_scope(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `do`
        let body = self.parse_block()?;
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::Scope(body, start.merge(end)))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let start = self.peek().loc;
        let mut branches = Vec::new();
        loop {
            self.advance(); // `if` or `elif`
            let cond = self.parse_expr()?;
            let body = self.parse_block()?;
            branches.push(IfBranch { cond: Some(cond), body });
            if self.at(TokenKind::KwElif) {
                continue;
            }
            if self.at(TokenKind::KwElse) {
                self.advance();
                let body = self.parse_block()?;
                branches.push(IfBranch { cond: None, body });
            }
            break;
        }
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::If { branches, loc: start.merge(end) })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `for`
        if self.at(TokenKind::KwVar) {
            self.advance();
            let name_tok = self.expect(TokenKind::Ident, "a loop variable name")?;
            let var = self.intern_ident(name_tok);
            self.expect(TokenKind::Assign, "'='")?;
            let init = self.parse_expr()?;
            self.expect(TokenKind::Comma, "','")?;
            let stop = self.parse_expr()?;
            self.expect(TokenKind::Comma, "','")?;
            let step = self.parse_expr()?;
            let body = self.parse_block()?;
            let end = self.tokens[self.pos - 1].loc;
            return Ok(Stmt::ForCounting { var, start: init, stop, step, body, loc: start.merge(end) });
        }
        let name_tok = self.expect(TokenKind::Ident, "a loop variable name")?;
        let var = self.intern_ident(name_tok);
        self.expect(TokenKind::KwIn, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::ForIn { var, iter, body, loc: start.merge(end) })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `while`
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::While { cond, body, loc: start.merge(end) })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `return`
        let value = if self.at(TokenKind::RBrace) || self.at(TokenKind::Semi) || self.at(TokenKind::Eof) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let end = self.tokens[self.pos.saturating_sub(1)].loc;
        Ok(Stmt::Return { value, loc: start.merge(end) })
    }

    fn parse_enum_decl(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `enum`
        let name_tok = self.expect(TokenKind::Ident, "an enum name")?;
        let name = self.intern_ident(name_tok);
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut variants = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let tok = self.expect(TokenKind::Ident, "an enum variant name")?;
            variants.push(self.intern_ident(tok));
            if self.at(TokenKind::Comma) {
                self.advance();
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?.loc;
        Ok(Stmt::EnumDecl { name, variants, loc: start.merge(end) })
    }

    fn parse_import(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `import`
        let mut segments = vec![self.text(self.expect(TokenKind::Ident, "a module name")?).to_string()];
        while self.at(TokenKind::ColonColon) {
            self.advance();
            segments.push(self.text(self.expect(TokenKind::Ident, "a module path segment")?).to_string());
        }
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::Import { path: QualName::new(segments), loc: start.merge(end) })
    }

    fn parse_struct_decl(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `struct`
        let name_tok = self.expect(TokenKind::Ident, "a struct name")?;
        let name = self.intern_ident(name_tok);
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let field_tok = self.expect(TokenKind::Ident, "a field name")?;
            let field_name = self.intern_ident(field_tok);
            self.expect(TokenKind::Colon, "':'")?;
            let ty = self.parse_type_expr()?;
            fields.push((field_name, ty));
            if self.at(TokenKind::Comma) {
                self.advance();
            }
        }
        let end = self.expect(TokenKind::RBrace, "'}'")?.loc;
        Ok(Stmt::StructDecl { name, fields, loc: start.merge(end) })
    }

    fn parse_type_decl(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `type`
        let name_tok = self.expect(TokenKind::Ident, "a type alias name")?;
        let name = self.intern_ident(name_tok);
        self.expect(TokenKind::Assign, "'='")?;
        let ty = self.parse_type_expr()?;
        let end = ty.loc();
        Ok(Stmt::TypeDecl { name, ty, loc: start.merge(end) })
    }

    fn parse_func_decl(&mut self) -> PResult<Stmt> {
        let start = self.advance().loc; // `fn`
        let name_tok = self.expect(TokenKind::Ident, "a function name")?;
        let name = self.intern_ident(name_tok);
        let params = self.parse_params()?;
        self.expect(TokenKind::Arrow, "'->' (return type is required)")?;
        let return_ty = self.parse_type_expr()?;
        let body = self.parse_block()?;
        let end = self.tokens[self.pos - 1].loc;
        Ok(Stmt::FuncDecl { name, params, return_ty, body, loc: start.merge(end) })
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let name_tok = self.expect(TokenKind::Ident, "a parameter name")?;
            let name = self.intern_ident(name_tok);
            self.expect(TokenKind::Colon, "':'")?;
            let ty = self.parse_type_expr()?;
            let default = if self.at(TokenKind::Assign) {
                self.advance();
                Some(self.parse_expr()?)
            } else {
                None
            };
            params.push(Param { name, ty, default, loc: name_tok.loc });
            if self.at(TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_expr_or_assign_stmt(&mut self) -> PResult<Stmt> {
        let start = self.peek().loc;
        let expr = self.parse_expr()?;
        if let Some(op) = self.peek_assign_op() {
            self.advance();
            let value = self.parse_expr()?;
            let end = value.loc();
            return Ok(Stmt::Assign { target: expr, op, value, loc: start.merge(end) });
        }
        let end = expr.loc();
        Ok(Stmt::Expr(expr, start.merge(end)))
    }

    fn peek_assign_op(&self) -> Option<AssignOp> {
        Some(match self.peek_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::Add,
            TokenKind::MinusEq => AssignOp::Sub,
            TokenKind::StarEq => AssignOp::Mul,
            TokenKind::SlashEq => AssignOp::Div,
            TokenKind::PercentEq => AssignOp::Mod,
            TokenKind::StarStarEq => AssignOp::Pow,
            TokenKind::AmpEq => AssignOp::BitAnd,
            TokenKind::PipeEq => AssignOp::BitOr,
            TokenKind::CaretEq => AssignOp::BitXor,
            TokenKind::ShlEq => AssignOp::Shl,
            TokenKind::ShrEq => AssignOp::Shr,
            _ => return None,
        })
    }

    // -- types ------------------------------------------------------------

    fn parse_type_expr(&mut self) -> PResult<TypeExpr> {
        self.parse_type_atom()
    }

    fn parse_type_atom(&mut self) -> PResult<TypeExpr> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::LBracket => {
                self.advance();
                let first = self.parse_type_expr()?;
                if self.at(TokenKind::Colon) {
                    self.advance();
                    let value = self.parse_type_expr()?;
                    let end = self.expect(TokenKind::RBracket, "']'")?.loc;
                    Ok(TypeExpr::Map(Box::new(first), Box::new(value), tok.loc.merge(end)))
                } else {
                    let end = self.expect(TokenKind::RBracket, "']'")?.loc;
                    Ok(TypeExpr::Array(Box::new(first), tok.loc.merge(end)))
                }
            }
            TokenKind::KwFn => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let mut params = Vec::new();
                while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                    params.push(self.parse_type_expr()?);
                    if self.at(TokenKind::Comma) {
                        self.advance();
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                self.expect(TokenKind::Arrow, "'->'")?;
                let ret = self.parse_type_expr()?;
                let end = ret.loc();
                Ok(TypeExpr::Function { params, ret: Box::new(ret), loc: tok.loc.merge(end) })
            }
            TokenKind::Ident => {
                self.advance();
                let mut segments = vec![self.text(tok).to_string()];
                let mut end = tok.loc;
                while self.at(TokenKind::ColonColon) {
                    self.advance();
                    let seg = self.expect(TokenKind::Ident, "a type path segment")?;
                    end = seg.loc;
                    segments.push(self.text(seg).to_string());
                }
                Ok(TypeExpr::Named(QualName::new(segments), tok.loc.merge(end)))
            }
            _ => {
                self.diags.push(Diagnostic::error(tok.loc, "expected a type"));
                Err(ParseAbort)
            }
        }
    }

    // -- expressions: Pratt precedence climbing ----------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(1)
    }

    fn binary_op(&self) -> Option<(BinaryOp, u8, bool)> {
        Some(match self.peek_kind() {
            TokenKind::KwOr => (BinaryOp::Or, 1, false),
            TokenKind::KwAnd => (BinaryOp::And, 2, false),
            TokenKind::Eq => (BinaryOp::Eq, 3, false),
            TokenKind::Ne => (BinaryOp::Ne, 3, false),
            TokenKind::Lt => (BinaryOp::Lt, 3, false),
            TokenKind::Le => (BinaryOp::Le, 3, false),
            TokenKind::Gt => (BinaryOp::Gt, 3, false),
            TokenKind::Ge => (BinaryOp::Ge, 3, false),
            TokenKind::KwIs => (BinaryOp::Is, 3, false),
            TokenKind::Amp => (BinaryOp::BitAnd, 4, false),
            TokenKind::Caret => (BinaryOp::BitXor, 5, false),
            TokenKind::Pipe => (BinaryOp::BitOr, 6, false),
            TokenKind::Shl => (BinaryOp::Shl, 7, false),
            TokenKind::Shr => (BinaryOp::Shr, 7, false),
            TokenKind::Plus => (BinaryOp::Add, 8, false),
            TokenKind::Minus => (BinaryOp::Sub, 8, false),
            TokenKind::Star => (BinaryOp::Mul, 9, false),
            TokenKind::Slash => (BinaryOp::Div, 9, false),
            TokenKind::Percent => (BinaryOp::Mod, 9, false),
            TokenKind::StarStar => (BinaryOp::Pow, 10, true),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec, right_assoc)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.parse_binary(next_min)?;
            let loc = lhs.loc().merge(rhs.loc());
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), loc };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let tok = self.peek();
        let op = match tok.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::KwNot => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::Ref),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let loc = tok.loc.merge(operand.loc());
            return Ok(Expr::Unary { op, operand: Box::new(operand), loc });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        args.push(self.parse_expr()?);
                        if self.at(TokenKind::Comma) {
                            self.advance();
                        }
                    }
                    let end = self.expect(TokenKind::RParen, "')'")?.loc;
                    let loc = expr.loc().merge(end);
                    expr = Expr::Call { callee: Box::new(expr), args, loc };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    let end = self.expect(TokenKind::RBracket, "']'")?.loc;
                    let loc = expr.loc().merge(end);
                    expr = Expr::Subscript { target: Box::new(expr), index: Box::new(index), loc };
                }
                TokenKind::Dot => {
                    self.advance();
                    let member_tok = self.expect(TokenKind::Ident, "a member name")?;
                    let member = self.intern_ident(member_tok);
                    let loc = expr.loc().merge(member_tok.loc);
                    expr = Expr::Access { target: Box::new(expr), kind: AccessKind::Dynamic, member, loc };
                }
                TokenKind::ColonColon => {
                    self.advance();
                    let member_tok = self.expect(TokenKind::Ident, "a name after '::'")?;
                    let member = self.intern_ident(member_tok);
                    let loc = expr.loc().merge(member_tok.loc);
                    expr = Expr::Access { target: Box::new(expr), kind: AccessKind::Static, member, loc };
                }
                TokenKind::KwAs => {
                    self.advance();
                    let ty = self.parse_type_expr()?;
                    let loc = expr.loc().merge(ty.loc());
                    expr = Expr::Cast { expr: Box::new(expr), ty, loc };
                }
                TokenKind::KwIf => {
                    self.advance();
                    let cond = self.parse_binary(1)?;
                    self.expect(TokenKind::KwElse, "'else' to complete the ternary")?;
                    let if_false = self.parse_binary(1)?;
                    let loc = expr.loc().merge(if_false.loc());
                    expr = Expr::Ternary {
                        cond: Box::new(cond),
                        if_true: Box::new(expr),
                        if_false: Box::new(if_false),
                        loc,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let text = self.text(tok);
                let value = parse_int_literal(text);
                Ok(Expr::Literal(ConstValue::Int(value), tok.loc))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value: f64 = self.text(tok).parse().unwrap_or(0.0);
                Ok(Expr::Literal(ConstValue::Float(value), tok.loc))
            }
            TokenKind::StringLiteral => {
                self.advance();
                let text = unescape(self.text(tok));
                let sym = self.symbols.intern(&text);
                Ok(Expr::Literal(ConstValue::Str(sym), tok.loc))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Bool(true), tok.loc))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Bool(false), tok.loc))
            }
            TokenKind::KwNil => {
                self.advance();
                Ok(Expr::Literal(ConstValue::Nil, tok.loc))
            }
            TokenKind::Ident => {
                self.advance();
                let sym = self.intern_ident(tok);
                Ok(Expr::Symbol(sym, tok.loc))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                    items.push(self.parse_expr()?);
                    if self.at(TokenKind::Comma) {
                        self.advance();
                    }
                }
                let end = self.expect(TokenKind::RBracket, "']'")?.loc;
                Ok(Expr::Array(items, tok.loc.merge(end)))
            }
            TokenKind::LParen => {
                self.advance();
                let first = self.parse_expr()?;
                if self.at(TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.at(TokenKind::Comma) {
                        self.advance();
                        if self.at(TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_expr()?);
                    }
                    let end = self.expect(TokenKind::RParen, "')'")?.loc;
                    Ok(Expr::Tuple(items, tok.loc.merge(end)))
                } else {
                    let end = self.expect(TokenKind::RParen, "')'")?.loc;
                    Ok(Expr::Group(Box::new(first), tok.loc.merge(end)))
                }
            }
            TokenKind::KwFn => {
                self.advance();
                let params = self.parse_params()?;
                let return_ty = if self.at(TokenKind::Arrow) {
                    self.advance();
                    Some(self.parse_type_expr()?)
                } else {
                    None
                };
                let body = self.parse_block()?;
                let end = self.tokens[self.pos - 1].loc;
                Ok(Expr::Lambda { params, return_ty, body, loc: tok.loc.merge(end) })
            }
            _ => {
                self.diags.push(
                    Diagnostic::error(tok.loc, "unexpected token in expression")
                        .with_footnote(Footnote::hint("expected a literal, identifier, or '('")),
                );
                Err(ParseAbort)
            }
        }
    }
}

fn parse_int_literal(text: &str) -> i64 {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).unwrap_or(0);
    }
    text.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Program, bool) {
        let buf = SourceBuffer::new("t.via", src);
        let mut symbols = SymbolTable::new();
        let mut diags = DiagContext::new();
        let program = parse_program(&buf, &mut symbols, &mut diags);
        (program, diags.has_errors())
    }

    #[test]
    fn parses_arithmetic_scenario_s1() {
        let (program, had_errors) = parse("fn main() -> int { return 2 + 3 * 4 }");
        assert!(!had_errors);
        assert_eq!(program.stmts.len(), 1);
        let Stmt::FuncDecl { body, .. } = &program.stmts[0] else { panic!("expected FuncDecl") };
        let Stmt::Return { value: Some(expr), .. } = &body[0] else { panic!("expected Return") };
        // 2 + 3 * 4 should parse as 2 + (3 * 4): outer op is Add.
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected Add at the top, got {other:?}"),
        }
    }

    #[test]
    fn pow_is_right_associative() {
        let (program, had_errors) = parse("fn f() -> int { return 2 ** 3 ** 2 }");
        assert!(!had_errors);
        let Stmt::FuncDecl { body, .. } = &program.stmts[0] else { panic!() };
        let Stmt::Return { value: Some(Expr::Binary { op: BinaryOp::Pow, rhs, .. }), .. } = &body[0] else {
            panic!("expected top-level Pow")
        };
        assert!(matches!(**rhs, Expr::Binary { op: BinaryOp::Pow, .. }));
    }

    #[test]
    fn cast_and_call_are_postfix() {
        let (program, had_errors) = parse("fn f() -> int { return f(1) as int }");
        assert!(!had_errors);
        let Stmt::FuncDecl { body, .. } = &program.stmts[0] else { panic!() };
        let Stmt::Return { value: Some(Expr::Cast { expr, .. }), .. } = &body[0] else {
            panic!("expected top-level Cast")
        };
        assert!(matches!(**expr, Expr::Call { .. }));
    }

    #[test]
    fn if_chain_collects_elif_and_else() {
        let (program, had_errors) = parse(
            "fn f() -> int { if 1 { return 1 } elif 2 { return 2 } else { return 3 } }",
        );
        assert!(!had_errors);
        let Stmt::FuncDecl { body, .. } = &program.stmts[0] else { panic!() };
        let Stmt::If { branches, .. } = &body[0] else { panic!("expected If") };
        assert_eq!(branches.len(), 3);
        assert!(branches[2].cond.is_none());
    }

    #[test]
    fn undefined_symbol_source_still_parses() {
        let (program, had_errors) = parse("fn main() -> int { return x }");
        assert!(!had_errors);
        assert_eq!(program.stmts.len(), 1);
    }
}
