//! Expression parsing: Pratt-style precedence climbing.
//!
//! Precedence, loosest to tightest: assignment (right-assoc), ternary,
//! `||`, `&&`, `|`, `^`, `&`, equality, relational, shifts, additive,
//! multiplicative, `as` casts, unary prefix, postfix (call, index, member,
//! `++`/`--`).

use cm_common::token::TokenKind;
use cm_common::Span;

use crate::ast::*;

use super::Parser;

/// Left binding power for an infix operator, or `None` if the token is not
/// a binary operator.
fn binary_bp(kind: TokenKind) -> Option<(u8, BinaryOp)> {
    use TokenKind::*;
    Some(match kind {
        PipePipe => (1, BinaryOp::Or),
        AmpAmp => (2, BinaryOp::And),
        Pipe => (3, BinaryOp::BitOr),
        Caret => (4, BinaryOp::BitXor),
        Amp => (5, BinaryOp::BitAnd),
        EqEq => (6, BinaryOp::Eq),
        BangEq => (6, BinaryOp::Ne),
        Lt => (7, BinaryOp::Lt),
        LtEq => (7, BinaryOp::Le),
        Gt => (7, BinaryOp::Gt),
        GtEq => (7, BinaryOp::Ge),
        LtLt => (8, BinaryOp::Shl),
        GtGt => (8, BinaryOp::Shr),
        Plus => (9, BinaryOp::Add),
        Minus => (9, BinaryOp::Sub),
        Star => (10, BinaryOp::Mul),
        Slash => (10, BinaryOp::Div),
        Percent => (10, BinaryOp::Rem),
        _ => return None,
    })
}

/// The compound-assignment operator for a token, if any.
fn compound_op(kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    Some(match kind {
        PlusEq => BinaryOp::Add,
        MinusEq => BinaryOp::Sub,
        StarEq => BinaryOp::Mul,
        SlashEq => BinaryOp::Div,
        PercentEq => BinaryOp::Rem,
        AmpEq => BinaryOp::BitAnd,
        PipeEq => BinaryOp::BitOr,
        CaretEq => BinaryOp::BitXor,
        LtLtEq => BinaryOp::Shl,
        GtGtEq => BinaryOp::Shr,
        _ => return None,
    })
}

impl Parser {
    pub(crate) fn parse_expr(&mut self) -> Expr {
        self.parse_assign_expr()
    }

    /// Assignment is right-associative and loosest.
    fn parse_assign_expr(&mut self) -> Expr {
        let start = self.current_span();
        let lhs = self.parse_ternary_expr();

        if self.at(TokenKind::Eq) {
            self.advance();
            let value = self.parse_assign_expr();
            return Expr::new(
                ExprKind::Assign {
                    op: None,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                start.merge(self.prev_span()),
            );
        }
        if let Some(op) = compound_op(self.current()) {
            self.advance();
            let value = self.parse_assign_expr();
            return Expr::new(
                ExprKind::Assign {
                    op: Some(op),
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                start.merge(self.prev_span()),
            );
        }
        lhs
    }

    fn parse_ternary_expr(&mut self) -> Expr {
        let start = self.current_span();
        let cond = self.parse_binary_expr(0);
        if !self.eat(TokenKind::Question) {
            return cond;
        }
        let then_value = self.parse_assign_expr();
        self.expect(TokenKind::Colon, "`:` in ternary expression");
        let else_value = self.parse_assign_expr();
        Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            },
            start.merge(self.prev_span()),
        )
    }

    fn parse_binary_expr(&mut self, min_bp: u8) -> Expr {
        let start = self.current_span();
        let mut lhs = self.parse_cast_expr();

        while let Some((bp, op)) = binary_bp(self.current()) {
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_binary_expr(bp + 1);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                start.merge(self.prev_span()),
            );
        }
        lhs
    }

    /// `expr as Type`, left-associative, binds tighter than binary ops.
    fn parse_cast_expr(&mut self) -> Expr {
        let start = self.current_span();
        let mut value = self.parse_unary_expr();
        while self.eat(TokenKind::KwAs) {
            let ty = self.parse_type();
            value = Expr::new(
                ExprKind::Cast {
                    value: Box::new(value),
                    ty,
                },
                start.merge(self.prev_span()),
            );
        }
        value
    }

    pub(crate) fn parse_unary_expr(&mut self) -> Expr {
        let start = self.current_span();
        let op = match self.current() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();

            // `-9223372036854775808` folds to INT64_MIN directly so the
            // magnitude never overflows an i64 round-trip.
            if op == UnaryOp::Neg && self.at(TokenKind::IntLiteral) {
                let value = self.current_token().as_int();
                self.advance();
                return Expr::new(
                    ExprKind::IntLit(value.wrapping_neg()),
                    start.merge(self.prev_span()),
                );
            }

            let operand = self.parse_unary_expr();
            return Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                start.merge(self.prev_span()),
            );
        }

        if self.at(TokenKind::KwMove) {
            self.advance();
            let operand = self.parse_unary_expr();
            return Expr::new(ExprKind::Move(Box::new(operand)), start.merge(self.prev_span()));
        }

        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Expr {
        let start = self.current_span();
        let mut expr = self.parse_primary_expr();

        loop {
            match self.current() {
                TokenKind::LParen => {
                    let args = self.parse_call_args();
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            type_args: Vec::new(),
                            args,
                        },
                        start.merge(self.prev_span()),
                    );
                }
                TokenKind::Lt if self.generic_call_ahead() => {
                    let type_args = self.parse_type_args();
                    let args = self.parse_call_args();
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            type_args,
                            args,
                        },
                        start.merge(self.prev_span()),
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr();
                    self.expect(TokenKind::RBracket, "`]` after index");
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        start.merge(self.prev_span()),
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident("member name");
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            name,
                        },
                        start.merge(self.prev_span()),
                    );
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::PostInc,
                            operand: Box::new(expr),
                        },
                        start.merge(self.prev_span()),
                    );
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::Unary {
                            op: UnaryOp::PostDec,
                            operand: Box::new(expr),
                        },
                        start.merge(self.prev_span()),
                    );
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        self.expect(TokenKind::LParen, "`(`");
        let mut args = Vec::new();
        let saved = self.no_struct_literal;
        self.no_struct_literal = false;
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            args.push(self.parse_expr());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.no_struct_literal = saved;
        self.expect(TokenKind::RParen, "`)` after arguments");
        args
    }

    /// Lookahead: does `<` start a generic argument list that closes and is
    /// immediately followed by `(`? Distinguishes `id<int>(7)` from `a < b`.
    fn generic_call_ahead(&self) -> bool {
        let mut i = 1;
        let mut depth: i32 = 1;
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
        self.nth(i) == TokenKind::LParen
    }

    fn parse_primary_expr(&mut self) -> Expr {
        let start = self.current_span();
        match self.current() {
            TokenKind::IntLiteral => {
                let value = self.current_token().as_int();
                self.advance();
                Expr::new(ExprKind::IntLit(value), start)
            }
            TokenKind::FloatLiteral => {
                let value = self.current_token().as_float();
                self.advance();
                Expr::new(ExprKind::FloatLit(value), start)
            }
            TokenKind::StringLiteral => {
                let value = self.current_text();
                self.advance();
                Expr::new(ExprKind::StringLit(value), start)
            }
            TokenKind::CharLiteral => {
                let value = self.current_text().chars().next().unwrap_or('\0');
                self.advance();
                Expr::new(ExprKind::CharLit(value), start)
            }
            TokenKind::KwTrue => {
                self.advance();
                Expr::new(ExprKind::BoolLit(true), start)
            }
            TokenKind::KwFalse => {
                self.advance();
                Expr::new(ExprKind::BoolLit(false), start)
            }
            TokenKind::KwNull => {
                self.advance();
                Expr::new(ExprKind::NullLit, start)
            }
            TokenKind::KwThis => {
                self.advance();
                Expr::new(ExprKind::Ident("this".to_string()), start)
            }
            TokenKind::KwMatch => self.parse_match_expr(),
            TokenKind::KwSizeof => {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after sizeof");
                let ty = self.parse_type();
                self.expect(TokenKind::RParen, "`)` after sizeof type");
                Expr::new(ExprKind::Sizeof(ty), start.merge(self.prev_span()))
            }
            TokenKind::KwAlignof => {
                self.advance();
                self.expect(TokenKind::LParen, "`(` after alignof");
                let ty = self.parse_type();
                self.expect(TokenKind::RParen, "`)` after alignof type");
                Expr::new(ExprKind::Alignof(ty), start.merge(self.prev_span()))
            }
            TokenKind::KwNew => {
                // `new T(args)` allocates and constructs; parsed as a call
                // on the type name, the ctor rewrite happens in lowering.
                self.advance();
                let name = self.parse_path();
                let callee = Expr::new(ExprKind::Ident(name), start);
                let args = if self.at(TokenKind::LParen) {
                    self.parse_call_args()
                } else {
                    Vec::new()
                };
                Expr::new(
                    ExprKind::Call {
                        callee: Box::new(callee),
                        type_args: Vec::new(),
                        args,
                    },
                    start.merge(self.prev_span()),
                )
            }
            TokenKind::LParen => {
                self.advance();
                let saved = self.no_struct_literal;
                self.no_struct_literal = false;
                let inner = self.parse_expr();
                self.no_struct_literal = saved;
                self.expect(TokenKind::RParen, "`)`");
                inner
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at(TokenKind::RBracket) && !self.at(TokenKind::Eof) {
                    elements.push(self.parse_expr());
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "`]` after array literal");
                Expr::new(ExprKind::ArrayLiteral(elements), start.merge(self.prev_span()))
            }
            TokenKind::LBrace => {
                // Implicit struct literal `{ field: value, ... }`; the type
                // comes from the declaration context.
                self.parse_struct_literal_body(String::new(), start)
            }
            TokenKind::Ident => {
                let name = self.parse_path();
                if self.at(TokenKind::LBrace) && !self.no_struct_literal && self.struct_literal_ahead()
                {
                    return self.parse_struct_literal_body(name, start);
                }
                Expr::new(ExprKind::Ident(name), start.merge(self.prev_span()))
            }
            _ => {
                self.error("expected an expression");
                Expr::new(ExprKind::Error, start)
            }
        }
    }

    /// `{ field: value, ... }` after a (possibly empty) type name.
    fn parse_struct_literal_body(&mut self, type_name: String, start: Span) -> Expr {
        self.expect(TokenKind::LBrace, "`{`");
        let mut fields = Vec::new();
        let saved = self.no_struct_literal;
        self.no_struct_literal = false;
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let name = self.expect_ident("field name");
            self.expect(TokenKind::Colon, "`:` after field name");
            let value = self.parse_expr();
            fields.push((name, value));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.no_struct_literal = saved;
        self.expect(TokenKind::RBrace, "`}` after struct literal");
        Expr::new(
            ExprKind::StructLiteral { type_name, fields },
            start.merge(self.prev_span()),
        )
    }

    /// `Name {` starts a struct literal only when the braces open with
    /// `field:` or close immediately.
    fn struct_literal_ahead(&self) -> bool {
        self.nth(1) == TokenKind::RBrace
            || (self.nth(1) == TokenKind::Ident && self.nth(2) == TokenKind::Colon)
    }

    // ── match ──────────────────────────────────────────────────────────

    fn parse_match_expr(&mut self) -> Expr {
        let start = self.current_span();
        self.advance(); // match

        let saved = self.no_struct_literal;
        self.no_struct_literal = true;
        let scrutinee = self.parse_expr();
        self.no_struct_literal = saved;

        self.expect(TokenKind::LBrace, "`{` to open match body");
        let mut arms = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(arm) = self.parse_match_arm() {
                arms.push(arm);
            }
            if self.pos == before {
                self.error("parser stuck: unexpected token in match body");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "`}` to close match body");

        Expr::new(
            ExprKind::Match(MatchExpr {
                scrutinee: Box::new(scrutinee),
                arms,
            }),
            start.merge(self.prev_span()),
        )
    }

    fn parse_match_arm(&mut self) -> Option<MatchArm> {
        let start = self.current_span();
        let pattern = self.parse_match_pattern();

        let guard = if self.eat(TokenKind::KwIf) {
            let saved = self.no_struct_literal;
            self.no_struct_literal = true;
            let guard = self.parse_expr();
            self.no_struct_literal = saved;
            Some(guard)
        } else {
            None
        };

        self.expect(TokenKind::FatArrow, "`=>` after match pattern");

        let body = if self.at(TokenKind::LBrace) {
            ArmBody::Block(self.parse_block())
        } else if matches!(
            self.current(),
            TokenKind::KwReturn | TokenKind::KwBreak | TokenKind::KwContinue
        ) {
            // `=> return n;` style arms are a one-statement block.
            ArmBody::Block(vec![self.parse_stmt()])
        } else {
            let expr = self.parse_expr();
            ArmBody::Expr(Box::new(expr))
        };
        // Arms may be separated by `,` or `;`.
        self.eat(TokenKind::Comma);
        self.eat(TokenKind::Semicolon);

        Some(MatchArm {
            pattern,
            guard,
            body,
            span: start.merge(self.prev_span()),
        })
    }

    fn parse_match_pattern(&mut self) -> MatchPattern {
        let first = self.parse_match_pattern_atom();
        if !self.at(TokenKind::Pipe) {
            return first;
        }
        let mut patterns = vec![first];
        while self.eat(TokenKind::Pipe) {
            patterns.push(self.parse_match_pattern_atom());
        }
        MatchPattern::Or(patterns)
    }

    fn parse_match_pattern_atom(&mut self) -> MatchPattern {
        // `_` wildcard.
        if self.at(TokenKind::Ident) && self.current_text() == "_" {
            self.advance();
            return MatchPattern::Wildcard;
        }

        if self.at(TokenKind::Ident) {
            let path = self.parse_path();

            // `Variant(binding)` payload-binding pattern.
            if self.at(TokenKind::LParen) {
                self.advance();
                let binding = self.expect_ident("binding name");
                self.expect(TokenKind::RParen, "`)` after binding");
                return MatchPattern::EnumVariantBinding { path, binding };
            }

            // A qualified or capitalized path is a variant tag; a bare
            // lower-case identifier binds the scrutinee.
            let is_variant = path.contains("::")
                || path.chars().next().is_some_and(|c| c.is_ascii_uppercase());
            if is_variant {
                return MatchPattern::EnumVariant { path };
            }
            return MatchPattern::Variable(path);
        }

        // Value or range pattern.
        let saved = self.no_struct_literal;
        self.no_struct_literal = true;
        let value = self.parse_unary_expr();
        self.no_struct_literal = saved;

        if self.at(TokenKind::DotDot) || self.at(TokenKind::DotDotEq) {
            let inclusive = self.at(TokenKind::DotDotEq);
            self.advance();
            let saved = self.no_struct_literal;
            self.no_struct_literal = true;
            let end = self.parse_unary_expr();
            self.no_struct_literal = saved;
            return MatchPattern::Range {
                start: Box::new(value),
                end: Box::new(end),
                inclusive,
            };
        }

        MatchPattern::Value(Box::new(value))
    }
}
