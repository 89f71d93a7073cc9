//! Type parsing.
//!
//! Grammar (suffixes bind tightest-first):
//!
//! ```text
//! type      := "const"? base suffix*
//! base      := primitive | "[" type (";" size)? "]" | path ("<" type-args ">")?
//!            | "(" type ")"
//! suffix    := "*"            (pointer)
//!            | "&"            (reference)
//!            | "(" types ")"  (function pointer, base is the return type)
//!            | "[" size? "]"  (postfix array)
//! ```
//!
//! A trailing `>>` inside nested generic arguments is split into two `>`s
//! via the parser's pending-gt counter.

use cm_common::token::TokenKind;

use crate::ast::{ArraySize, IntWidth, Type, TypeKind};

use super::Parser;

impl Parser {
    /// Whether the current token can start a type.
    pub(crate) fn at_type_start(&self) -> bool {
        self.current().is_type_keyword()
            || matches!(
                self.current(),
                TokenKind::Ident | TokenKind::LBracket | TokenKind::LParen | TokenKind::KwConst
            )
    }

    pub(crate) fn parse_type(&mut self) -> Type {
        let start = self.current_span();
        let is_const = self.eat(TokenKind::KwConst);

        let mut ty = self.parse_base_type();
        ty.is_const = is_const;

        // Suffixes.
        loop {
            match self.current() {
                TokenKind::Star => {
                    self.advance();
                    ty = Type {
                        kind: TypeKind::Pointer(Box::new(ty)),
                        is_const: false,
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::Amp => {
                    self.advance();
                    ty = Type {
                        kind: TypeKind::Reference(Box::new(ty)),
                        is_const: false,
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let size = self.parse_array_size();
                    self.expect(TokenKind::RBracket, "`]` in array type");
                    ty = Type {
                        kind: TypeKind::Array {
                            elem: Box::new(ty),
                            size,
                        },
                        is_const: false,
                        span: start.merge(self.prev_span()),
                    };
                }
                TokenKind::LParen => {
                    // Function pointer: `Ret(Params)`.
                    self.advance();
                    let mut params = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        params.push(self.parse_type());
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "`)` in function pointer type");
                    ty = Type {
                        kind: TypeKind::FunctionPointer {
                            ret: Box::new(ty),
                            params,
                        },
                        is_const: false,
                        span: start.merge(self.prev_span()),
                    };
                }
                _ => break,
            }
        }

        ty
    }

    fn parse_base_type(&mut self) -> Type {
        let start = self.current_span();
        let kind = match self.current() {
            TokenKind::KwBool => self.prim(TypeKind::Bool),
            TokenKind::KwInt => self.prim(TypeKind::Int { width: IntWidth::W32, signed: true }),
            TokenKind::KwUint => self.prim(TypeKind::Int { width: IntWidth::W32, signed: false }),
            TokenKind::KwTiny => self.prim(TypeKind::Int { width: IntWidth::W8, signed: true }),
            TokenKind::KwUtiny => self.prim(TypeKind::Int { width: IntWidth::W8, signed: false }),
            TokenKind::KwShort => self.prim(TypeKind::Int { width: IntWidth::W16, signed: true }),
            TokenKind::KwUshort => {
                self.prim(TypeKind::Int { width: IntWidth::W16, signed: false })
            }
            TokenKind::KwLong => self.prim(TypeKind::Int { width: IntWidth::W64, signed: true }),
            TokenKind::KwUlong => self.prim(TypeKind::Int { width: IntWidth::W64, signed: false }),
            TokenKind::KwFloat => self.prim(TypeKind::Float32),
            TokenKind::KwDouble => self.prim(TypeKind::Float64),
            TokenKind::KwChar => self.prim(TypeKind::Char),
            TokenKind::KwString => self.prim(TypeKind::String),
            TokenKind::KwVoid => self.prim(TypeKind::Void),
            TokenKind::KwNull => self.prim(TypeKind::Null),
            TokenKind::LBracket => {
                // `[T; N]` fixed array or `[T]` slice.
                self.advance();
                let elem = self.parse_type();
                let size = if self.eat(TokenKind::Semicolon) {
                    self.parse_array_size()
                } else {
                    None
                };
                self.expect(TokenKind::RBracket, "`]` in array type");
                TypeKind::Array {
                    elem: Box::new(elem),
                    size,
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_type();
                self.expect(TokenKind::RParen, "`)` in type");
                return Type {
                    kind: inner.kind,
                    is_const: inner.is_const,
                    span: start.merge(self.prev_span()),
                };
            }
            TokenKind::Ident => {
                let name = self.parse_path();
                if name == "cstring" {
                    TypeKind::CString
                } else if self.at(TokenKind::Lt) {
                    let type_args = self.parse_type_args();
                    TypeKind::Named { name, type_args }
                } else {
                    TypeKind::Named {
                        name,
                        type_args: Vec::new(),
                    }
                }
            }
            _ => {
                self.error("expected a type");
                TypeKind::Error
            }
        };

        Type {
            kind,
            is_const: false,
            span: start.merge(self.prev_span()),
        }
    }

    fn prim(&mut self, kind: TypeKind) -> TypeKind {
        self.advance();
        kind
    }

    /// `<T, U, ...>` with `>>` splitting.
    pub(crate) fn parse_type_args(&mut self) -> Vec<Type> {
        let mut args = Vec::new();
        if !self.eat(TokenKind::Lt) {
            return args;
        }
        while !self.at_gt() && !self.at(TokenKind::Eof) {
            // A bare integer is a const-value argument, carried as a named
            // type so substitution can treat it uniformly.
            if self.at(TokenKind::IntLiteral) {
                let value = self.current_token().as_int();
                let span = self.current_span();
                self.advance();
                args.push(Type {
                    kind: TypeKind::Named {
                        name: value.to_string(),
                        type_args: Vec::new(),
                    },
                    is_const: false,
                    span,
                });
            } else {
                args.push(self.parse_type());
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.bump_gt();
        args
    }

    fn parse_array_size(&mut self) -> Option<ArraySize> {
        match self.current() {
            TokenKind::IntLiteral => {
                let value = self.current_token().as_int();
                self.advance();
                Some(ArraySize::Literal(value.max(0) as u64))
            }
            TokenKind::Ident => {
                let name = self.current_text();
                self.advance();
                Some(ArraySize::Generic(name))
            }
            _ => None,
        }
    }
}
