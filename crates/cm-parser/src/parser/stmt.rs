//! Statement parsing.
//!
//! Local declarations are C-style (`int x = 0;`, `Point p;`) or `let`-style
//! (`let x = f();`). The decl-vs-expression ambiguity at `Ident ...` is
//! resolved by a conservative token-shape scan: a path, optional generic
//! arguments, pointer/reference/array suffixes, then an identifier means a
//! declaration.

use cm_common::token::TokenKind;

use crate::ast::*;

use super::Parser;

impl Parser {
    /// `{ stmt* }`
    pub(crate) fn parse_block(&mut self) -> Vec<Stmt> {
        self.expect(TokenKind::LBrace, "`{`");
        let mut stmts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            stmts.push(self.parse_stmt());
            if self.pos == before {
                self.error("parser stuck: unexpected token in block");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "`}` to close block");
        stmts
    }

    /// A block, or a single statement treated as one.
    fn parse_block_or_stmt(&mut self) -> Vec<Stmt> {
        if self.at(TokenKind::LBrace) {
            self.parse_block()
        } else {
            vec![self.parse_stmt()]
        }
    }

    pub(crate) fn parse_stmt(&mut self) -> Stmt {
        let start = self.current_span();
        let kind = match self.current() {
            TokenKind::KwReturn => {
                self.advance();
                let value = if self.at(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                self.expect(TokenKind::Semicolon, "`;` after return");
                StmtKind::Return(value)
            }
            TokenKind::KwIf => self.parse_if_stmt(),
            TokenKind::KwWhile => {
                self.advance();
                let cond = self.parse_cond_expr();
                let body = self.parse_block_or_stmt();
                StmtKind::While { cond, body }
            }
            TokenKind::KwFor => self.parse_for_stmt(),
            TokenKind::KwMatch => {
                // `match` at statement level; lowered to an if/else chain.
                let expr = self.parse_expr();
                self.eat(TokenKind::Semicolon);
                StmtKind::Expr(expr)
            }
            TokenKind::KwDefer => {
                self.advance();
                let inner = self.parse_stmt();
                StmtKind::Defer(Box::new(inner))
            }
            TokenKind::KwMust => {
                self.advance();
                let body = self.parse_block();
                StmtKind::Must(body)
            }
            TokenKind::KwBreak => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;` after break");
                StmtKind::Break
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "`;` after continue");
                StmtKind::Continue
            }
            TokenKind::LBrace => StmtKind::Block(self.parse_block()),
            TokenKind::Ident
                if self.current_text() == "switch" && self.nth(1) == TokenKind::LParen =>
            {
                self.parse_switch_stmt()
            }
            TokenKind::KwLet | TokenKind::KwConst | TokenKind::KwStatic => self.parse_let_stmt(),
            TokenKind::Semicolon => {
                self.advance();
                StmtKind::Block(Vec::new())
            }
            _ if self.looks_like_local_decl() => self.parse_typed_decl_stmt(),
            _ => {
                let expr = self.parse_expr();
                if matches!(expr.kind, ExprKind::Error) {
                    self.sync_stmt();
                    StmtKind::Error
                } else {
                    self.expect(TokenKind::Semicolon, "`;` after expression");
                    StmtKind::Expr(expr)
                }
            }
        };

        // `switch` is folded into parse_stmt via its own branch; see below.
        Stmt {
            kind,
            span: start.merge(self.prev_span()),
        }
    }

    fn parse_if_stmt(&mut self) -> StmtKind {
        self.advance(); // if
        let cond = self.parse_cond_expr();
        let then_block = self.parse_block_or_stmt();
        let else_block = if self.eat(TokenKind::KwElse) {
            if self.at(TokenKind::KwIf) {
                let start = self.current_span();
                let nested = self.parse_if_stmt();
                vec![Stmt {
                    kind: nested,
                    span: start.merge(self.prev_span()),
                }]
            } else {
                self.parse_block_or_stmt()
            }
        } else {
            Vec::new()
        };
        StmtKind::If {
            cond,
            then_block,
            else_block,
        }
    }

    /// An `if`/`while`/`switch` head: parenthesized or bare, with struct
    /// literals suppressed in the bare form.
    fn parse_cond_expr(&mut self) -> Expr {
        if self.eat(TokenKind::LParen) {
            let cond = self.parse_expr();
            self.expect(TokenKind::RParen, "`)` after condition");
            cond
        } else {
            let saved = self.no_struct_literal;
            self.no_struct_literal = true;
            let cond = self.parse_expr();
            self.no_struct_literal = saved;
            cond
        }
    }

    fn parse_for_stmt(&mut self) -> StmtKind {
        self.advance(); // for

        let parens = self.eat(TokenKind::LParen);

        // `for x in iter` / `for (int x in iter)`: an `in` before the first
        // `;` at depth zero selects the for-in form.
        if self.for_in_ahead(parens) {
            let var_type = if self.at_type_start() && self.nth(1) != TokenKind::KwIn {
                Some(self.parse_type())
            } else {
                None
            };
            let var = self.expect_ident("loop variable");
            self.expect(TokenKind::KwIn, "`in`");
            let saved = self.no_struct_literal;
            self.no_struct_literal = !parens;
            let iterable = self.parse_expr();
            self.no_struct_literal = saved;
            if parens {
                self.expect(TokenKind::RParen, "`)` after for-in header");
            }
            let body = self.parse_block_or_stmt();
            return StmtKind::ForIn {
                var,
                var_type,
                iterable,
                body,
            };
        }

        // C-style `for (init; cond; update)`.
        if !parens {
            self.expect(TokenKind::LParen, "`(` after for");
        }
        let init = if self.at(TokenKind::Semicolon) {
            self.advance();
            None
        } else {
            // parse_stmt consumes the `;`.
            Some(Box::new(self.parse_stmt()))
        };
        let cond = if self.at(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Semicolon, "`;` after loop condition");
        let update = if self.at(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::RParen, "`)` after for header");
        let body = self.parse_block_or_stmt();
        StmtKind::For {
            init,
            cond,
            update,
            body,
        }
    }

    /// Scan ahead for `in` before `;`/`)` to pick the for-in form.
    fn for_in_ahead(&self, parens: bool) -> bool {
        let mut i = 0;
        let mut depth = 0usize;
        loop {
            match self.nth(i) {
                TokenKind::KwIn if depth == 0 => return true,
                TokenKind::Semicolon | TokenKind::LBrace | TokenKind::Eof => return false,
                TokenKind::RParen if parens && depth == 0 => return false,
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
            if i > 64 {
                return false;
            }
        }
    }

    fn parse_let_stmt(&mut self) -> StmtKind {
        let is_const = self.eat(TokenKind::KwConst);
        let is_static = self.eat(TokenKind::KwStatic);

        if self.eat(TokenKind::KwLet) {
            let name = self.expect_ident("variable name");
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type())
            } else {
                None
            };
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr())
            } else {
                None
            };
            self.expect(TokenKind::Semicolon, "`;` after let");
            return StmtKind::Let(LetStmt {
                name,
                ty,
                init,
                is_const,
                is_static,
            });
        }

        // `const int X = ...;` form.
        let ty = self.parse_type();
        let name = self.expect_ident("variable name");
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after declaration");
        StmtKind::Let(LetStmt {
            name,
            ty: Some(ty),
            init,
            is_const,
            is_static,
        })
    }

    /// `Type name [= init];` with a C-style spelled-out type.
    fn parse_typed_decl_stmt(&mut self) -> StmtKind {
        let ty = self.parse_type();
        let name = self.expect_ident("variable name");
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after declaration");
        StmtKind::Let(LetStmt {
            name,
            ty: Some(ty),
            init,
            is_const: false,
            is_static: false,
        })
    }

    /// Token-shape scan for a C-style local declaration.
    fn looks_like_local_decl(&self) -> bool {
        if self.current().is_type_keyword() {
            return true;
        }
        if self.at(TokenKind::LBracket) {
            // `[T; N] name` / `[T] name`.
            let mut i = 1;
            let mut depth = 1usize;
            while depth > 0 {
                match self.nth(i) {
                    TokenKind::LBracket => depth += 1,
                    TokenKind::RBracket => depth -= 1,
                    TokenKind::Eof => return false,
                    _ => {}
                }
                i += 1;
                if i > 32 {
                    return false;
                }
            }
            return self.nth(i) == TokenKind::Ident;
        }
        if !self.at(TokenKind::Ident) {
            return false;
        }

        // Path.
        let mut i = 1;
        while self.nth(i) == TokenKind::ColonColon && self.nth(i + 1) == TokenKind::Ident {
            i += 2;
        }

        // Generic arguments: only type-shaped tokens allowed inside.
        if self.nth(i) == TokenKind::Lt {
            let mut depth: i32 = 1;
            i += 1;
            while depth > 0 {
                match self.nth(i) {
                    TokenKind::Lt => depth += 1,
                    TokenKind::Gt => depth -= 1,
                    TokenKind::GtGt => depth -= 2,
                    TokenKind::Ident
                    | TokenKind::Comma
                    | TokenKind::Star
                    | TokenKind::Amp
                    | TokenKind::LBracket
                    | TokenKind::RBracket
                    | TokenKind::IntLiteral
                    | TokenKind::ColonColon => {}
                    k if k.is_type_keyword() => {}
                    _ => return false,
                }
                i += 1;
                if i > 48 {
                    return false;
                }
            }
        }

        // Pointer/reference suffixes.
        while matches!(self.nth(i), TokenKind::Star | TokenKind::Amp) {
            i += 1;
        }

        self.nth(i) == TokenKind::Ident
    }
}

// `switch` gets its own impl block so the case-pattern grammar reads as one
// unit.
impl Parser {
    pub(crate) fn parse_switch_stmt(&mut self) -> StmtKind {
        self.advance(); // switch
        let expr = self.parse_cond_expr();
        self.expect(TokenKind::LBrace, "`{` to open switch body");

        let mut cases = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let start = self.current_span();
            let pattern = if self.at(TokenKind::Ident) && self.current_text() == "case" {
                self.advance();
                Some(self.parse_switch_pattern())
            } else if self.at(TokenKind::Ident) && self.current_text() == "default" {
                self.advance();
                None
            } else {
                self.error("expected `case` or `default` in switch body");
                self.sync_stmt();
                continue;
            };
            self.expect(TokenKind::Colon, "`:` after case pattern");

            let mut stmts = Vec::new();
            while !self.at(TokenKind::RBrace)
                && !self.at(TokenKind::Eof)
                && !(self.at(TokenKind::Ident)
                    && matches!(self.current_text().as_str(), "case" | "default")
                    && self.nth_is_case_boundary())
            {
                let before = self.pos;
                stmts.push(self.parse_stmt());
                if self.pos == before {
                    self.error("parser stuck: unexpected token in switch case");
                    self.advance();
                }
            }

            cases.push(SwitchCase {
                pattern,
                stmts,
                span: start.merge(self.prev_span()),
            });
        }
        self.expect(TokenKind::RBrace, "`}` to close switch body");

        StmtKind::Switch { expr, cases }
    }

    /// `case X:` needs the colon after a pattern-sized lookahead; this keeps
    /// an identifier named `case` usable as an expression.
    fn nth_is_case_boundary(&self) -> bool {
        let mut i = 1;
        while i < 16 {
            match self.nth(i) {
                TokenKind::Colon => return true,
                TokenKind::Semicolon
                | TokenKind::LBrace
                | TokenKind::RBrace
                | TokenKind::Eof => return false,
                _ => i += 1,
            }
        }
        false
    }

    fn parse_switch_pattern(&mut self) -> SwitchPattern {
        let first = self.parse_switch_pattern_atom();
        if !self.at(TokenKind::Pipe) {
            return first;
        }
        let mut patterns = vec![first];
        while self.eat(TokenKind::Pipe) {
            patterns.push(self.parse_switch_pattern_atom());
        }
        SwitchPattern::Or(patterns)
    }

    fn parse_switch_pattern_atom(&mut self) -> SwitchPattern {
        let saved = self.no_struct_literal;
        self.no_struct_literal = true;
        let start = self.parse_unary_expr();
        self.no_struct_literal = saved;

        if self.at(TokenKind::DotDot) || self.at(TokenKind::DotDotEq) {
            let inclusive = self.at(TokenKind::DotDotEq);
            self.advance();
            let saved = self.no_struct_literal;
            self.no_struct_literal = true;
            let end = self.parse_unary_expr();
            self.no_struct_literal = saved;
            return SwitchPattern::Range {
                start: Box::new(start),
                end: Box::new(end),
                inclusive,
            };
        }
        SwitchPattern::Value(Box::new(start))
    }
}
