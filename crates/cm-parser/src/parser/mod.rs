//! Parser core and declaration parsing.
//!
//! The parser owns the token stream and a cursor. Lookahead helpers never
//! consume; `advance`/`expect` do. A progress guard in the top-level loop
//! turns a non-advancing parse attempt into a "parser stuck" diagnostic and
//! forces the cursor forward, so malformed input can never hang the
//! compiler.

mod expr;
mod stmt;
mod types;

use cm_common::diagnostics::Diagnostic;
use cm_common::token::{Token, TokenKind, TokenValue};
use cm_common::Span;

use crate::ast::*;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Set when a `>>` token has had its first `>` consumed by a generic
    /// argument list; the second `>` is still pending.
    pending_gt: bool,
    diagnostics: Vec<Diagnostic>,
    /// Suppresses struct-literal parsing inside `if`/`while`/`match` heads,
    /// where `ident {` starts the body block instead.
    pub(crate) no_struct_literal: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            pending_gt: false,
            diagnostics: Vec::new(),
            no_struct_literal: false,
        }
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    // ── Lookahead ──────────────────────────────────────────────────────

    pub(crate) fn current(&self) -> TokenKind {
        self.nth(0)
    }

    pub(crate) fn nth(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    pub(crate) fn current_token(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always ends in Eof"))
    }

    pub(crate) fn current_span(&self) -> Span {
        self.current_token().span
    }

    pub(crate) fn current_text(&self) -> String {
        match &self.current_token().value {
            TokenValue::Str(s) => s.clone(),
            _ => String::new(),
        }
    }

    pub(crate) fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return Span::dummy();
        }
        self.tokens
            .get(self.pos - 1)
            .map(|t| t.span)
            .unwrap_or_else(Span::dummy)
    }

    // ── Consumption ────────────────────────────────────────────────────

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current_token().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        } else {
            self.pos = self.tokens.len().saturating_sub(1);
        }
        // Walking past a `>>` clears any half-consumed state.
        self.pending_gt = false;
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            self.error(format!("expected {what}"));
            false
        }
    }

    /// Whether a closing `>` is available, counting the second half of a
    /// split `>>`.
    pub(crate) fn at_gt(&self) -> bool {
        self.pending_gt || self.at(TokenKind::Gt) || self.at(TokenKind::GtGt)
    }

    /// Consume one closing `>`. A `>>` token is split: the first call
    /// consumes its first half and leaves the second pending.
    pub(crate) fn bump_gt(&mut self) {
        if self.pending_gt {
            self.pending_gt = false;
            self.pos += 1;
            return;
        }
        if self.at(TokenKind::GtGt) {
            self.pending_gt = true;
            return;
        }
        self.expect(TokenKind::Gt, "`>`");
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        let span = self.current_span();
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    // ── Recovery ───────────────────────────────────────────────────────

    /// Skip to the next likely declaration start.
    pub(crate) fn sync_decl(&mut self) {
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semicolon) {
                return;
            }
            if self.at(TokenKind::RBrace) {
                self.advance();
                return;
            }
            if matches!(
                self.current(),
                TokenKind::KwStruct
                    | TokenKind::KwInterface
                    | TokenKind::KwImpl
                    | TokenKind::KwEnum
                    | TokenKind::KwTypedef
                    | TokenKind::KwExtern
                    | TokenKind::KwUse
                    | TokenKind::KwImport
                    | TokenKind::KwModule
                    | TokenKind::KwNamespace
                    | TokenKind::KwExport
                    | TokenKind::Hash
            ) {
                return;
            }
            self.advance();
        }
    }

    /// Skip to the next statement boundary.
    pub(crate) fn sync_stmt(&mut self) {
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semicolon) {
                return;
            }
            if self.at(TokenKind::RBrace) {
                return;
            }
            self.advance();
        }
    }

    // ── Program ────────────────────────────────────────────────────────

    pub fn parse_program(&mut self, filename: &str) -> Program {
        let declarations = self.parse_decl_list(TokenKind::Eof);
        Program {
            declarations,
            filename: filename.to_string(),
        }
    }

    /// Parse declarations until `end` (EOF or a closing brace).
    fn parse_decl_list(&mut self, end: TokenKind) -> Vec<Decl> {
        let mut decls = Vec::new();
        while !self.at(end) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(decl) = self.parse_decl() {
                decls.push(decl);
            }
            if self.pos == before {
                // Progress guard: never loop on the same token.
                self.error("parser stuck: unexpected token at declaration level");
                self.advance();
            }
        }
        decls
    }

    fn parse_decl(&mut self) -> Option<Decl> {
        let start = self.current_span();
        let attributes = self.parse_attributes();

        let visibility = if self.eat(TokenKind::KwExport) {
            Visibility::Export
        } else if self.eat(TokenKind::KwPrivate) {
            Visibility::Private
        } else {
            Visibility::Private
        };
        let exported = visibility == Visibility::Export;

        let kind = match self.current() {
            TokenKind::KwStruct => self.parse_struct_decl(),
            TokenKind::KwInterface => self.parse_interface_decl(),
            TokenKind::KwImpl => self.parse_impl_decl(),
            TokenKind::KwEnum => self.parse_enum_decl(),
            TokenKind::KwTypedef => self.parse_typedef_decl(),
            TokenKind::KwExtern => self.parse_extern_block(),
            TokenKind::KwUse => self.parse_use_decl(),
            TokenKind::KwImport => self.parse_import_decl(),
            TokenKind::KwModule => self.parse_module_decl(),
            TokenKind::KwNamespace => self.parse_namespace_decl(),
            TokenKind::KwMacro => self.parse_macro_decl(false),
            TokenKind::KwTemplate => self.parse_macro_decl(true),
            TokenKind::KwConst | TokenKind::KwStatic | TokenKind::KwLet => {
                self.parse_global_var_decl()
            }
            TokenKind::Semicolon => {
                self.advance();
                return None;
            }
            _ => self.parse_function_or_global(),
        };

        let kind = match kind {
            Some(kind) => kind,
            None => {
                self.sync_decl();
                DeclKind::Error
            }
        };

        // `main` must stay internal; exporting it would collide with the
        // entry symbol the backends synthesize.
        if exported {
            if let DeclKind::Function(func) = &kind {
                if func.name == "main" {
                    self.diagnostics.push(Diagnostic::error(
                        "`main` cannot be declared `export`",
                        start,
                    ));
                }
            }
        }

        Some(Decl {
            kind,
            attributes,
            visibility,
            span: start.merge(self.prev_span()),
        })
    }

    // ── Attributes ─────────────────────────────────────────────────────

    /// `#[name(arg, ...)]`, any number of them.
    fn parse_attributes(&mut self) -> Vec<Attribute> {
        let mut attrs = Vec::new();
        while self.at(TokenKind::Hash) && self.nth(1) == TokenKind::LBracket {
            let start = self.current_span();
            self.advance(); // #
            self.advance(); // [
            let name = self.expect_ident("attribute name");
            let mut args = Vec::new();
            if self.eat(TokenKind::LParen) {
                while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                    args.push(self.attribute_arg());
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "`)` after attribute arguments");
            }
            self.expect(TokenKind::RBracket, "`]` after attribute");
            attrs.push(Attribute {
                name,
                args,
                span: start.merge(self.prev_span()),
            });
        }
        attrs
    }

    /// One attribute argument as raw text: `js`, `!js`, `42`, `"s"`.
    fn attribute_arg(&mut self) -> String {
        let mut text = String::new();
        if self.eat(TokenKind::Bang) {
            text.push('!');
        }
        match self.current() {
            TokenKind::Ident | TokenKind::StringLiteral => {
                text.push_str(&self.current_text());
                self.advance();
            }
            TokenKind::IntLiteral => {
                text.push_str(&self.current_token().as_int().to_string());
                self.advance();
            }
            _ => {
                // Keywords can appear as atoms (`native`).
                let token = self.advance();
                if let TokenValue::Str(s) = token.value {
                    text.push_str(&s);
                } else {
                    text.push_str(kind_atom(token.kind));
                }
            }
        }
        text
    }

    // ── Shared helpers ─────────────────────────────────────────────────

    pub(crate) fn expect_ident(&mut self, what: &str) -> String {
        if self.at(TokenKind::Ident) {
            let text = self.current_text();
            self.advance();
            text
        } else {
            self.error(format!("expected {what}"));
            String::new()
        }
    }

    /// `A::B::c` joined with `::`.
    pub(crate) fn parse_path(&mut self) -> String {
        let mut path = self.expect_ident("identifier");
        while self.at(TokenKind::ColonColon) && self.nth(1) == TokenKind::Ident {
            self.advance();
            path.push_str("::");
            path.push_str(&self.expect_ident("path segment"));
        }
        path
    }

    /// `<T, U: I, V: A | B, W: A + B, N: const int>` or empty.
    pub(crate) fn parse_generic_params(&mut self) -> GenericParams {
        if !self.at(TokenKind::Lt) {
            return GenericParams::default();
        }
        self.advance(); // <

        let mut params = Vec::new();
        while !self.at_gt() && !self.at(TokenKind::Eof) {
            let start = self.current_span();
            let name = self.expect_ident("generic parameter name");
            let constraint = if self.eat(TokenKind::Colon) {
                Some(self.parse_generic_constraint())
            } else {
                None
            };
            params.push(GenericParam {
                name,
                constraint,
                span: start.merge(self.prev_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.bump_gt();
        GenericParams::new(params)
    }

    /// The constraint after `T:`.
    pub(crate) fn parse_generic_constraint(&mut self) -> GenericConstraint {
        if self.at(TokenKind::KwConst) {
            self.advance();
            let ty = self.parse_type();
            return GenericConstraint::ConstValue(ty);
        }

        let first = self.expect_ident("interface name");
        if self.at(TokenKind::Pipe) {
            let mut names = vec![first];
            while self.eat(TokenKind::Pipe) {
                names.push(self.expect_ident("interface name"));
            }
            GenericConstraint::Or(names)
        } else if self.at(TokenKind::Plus) {
            let mut names = vec![first];
            while self.eat(TokenKind::Plus) {
                names.push(self.expect_ident("interface name"));
            }
            GenericConstraint::And(names)
        } else {
            GenericConstraint::Interface(first)
        }
    }

    /// `where T: I, U: J | K` or empty.
    fn parse_where_clauses(&mut self) -> Vec<WhereClause> {
        let mut clauses = Vec::new();
        if !self.eat(TokenKind::KwWhere) {
            return clauses;
        }
        loop {
            let param = self.expect_ident("generic parameter in where-clause");
            self.expect(TokenKind::Colon, "`:` in where-clause");
            let constraint = self.parse_generic_constraint();
            clauses.push(WhereClause { param, constraint });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        clauses
    }

    /// `(Type name, ...)` parameter list, opening paren already expected.
    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        self.expect(TokenKind::LParen, "`(`");
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let start = self.current_span();
            let ty = self.parse_type();
            // Parameter names are optional in prototypes.
            let name = if self.at(TokenKind::Ident) {
                self.expect_ident("parameter name")
            } else if self.at(TokenKind::KwThis) {
                self.advance();
                "this".to_string()
            } else {
                String::new()
            };
            params.push(Param {
                name,
                ty,
                span: start.merge(self.prev_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)` after parameters");
        params
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn parse_struct_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // struct
        let name = self.expect_ident("struct name");
        let generics = self.parse_generic_params();
        let where_clauses = self.parse_where_clauses();
        self.expect(TokenKind::LBrace, "`{` to open struct body");

        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let start = self.current_span();
            let ty = self.parse_type();
            let field_name = self.expect_ident("field name");
            self.expect(TokenKind::Semicolon, "`;` after field");
            fields.push(Field {
                name: field_name,
                ty,
                span: start.merge(self.prev_span()),
            });
        }
        self.expect(TokenKind::RBrace, "`}` to close struct body");

        Some(DeclKind::Struct(StructDecl {
            name,
            generics,
            where_clauses,
            fields,
        }))
    }

    fn parse_interface_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // interface
        let name = self.expect_ident("interface name");
        let generics = self.parse_generic_params();
        self.expect(TokenKind::LBrace, "`{` to open interface body");

        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(method) = self.parse_method() {
                methods.push(method);
            }
            if self.pos == before {
                self.error("parser stuck: unexpected token in interface body");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "`}` to close interface body");

        Some(DeclKind::Interface(InterfaceDecl {
            name,
            generics,
            methods,
        }))
    }

    fn parse_impl_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // impl
        let generics = self.parse_generic_params();
        let first = self.parse_path();

        // `impl Interface for Type` vs inherent `impl Type`.
        let (interface, type_name) = if self.eat(TokenKind::KwFor) {
            let type_name = self.parse_path();
            (Some(first), type_name)
        } else {
            (None, first)
        };

        let where_clauses = self.parse_where_clauses();
        self.expect(TokenKind::LBrace, "`{` to open impl body");

        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let before = self.pos;
            if let Some(method) = self.parse_method() {
                methods.push(method);
            }
            if self.pos == before {
                self.error("parser stuck: unexpected token in impl body");
                self.advance();
            }
        }
        self.expect(TokenKind::RBrace, "`}` to close impl body");

        Some(DeclKind::Impl(ImplDecl {
            interface,
            type_name,
            generics,
            where_clauses,
            methods,
        }))
    }

    /// One method inside an interface or impl: a normal function, an
    /// `operator` declaration, a constructor `self(...)` (optionally behind
    /// `overload`), or a destructor `~self()`.
    fn parse_method(&mut self) -> Option<FunctionDecl> {
        // Destructor: `~self() { ... }`
        if self.at(TokenKind::Tilde) {
            self.advance();
            if self.current_text() != "self" {
                self.error("expected `self` after `~`");
                self.sync_stmt();
                return None;
            }
            self.advance();
            let params = self.parse_params();
            let body = self.parse_fn_body();
            return Some(FunctionDecl {
                name: "~self".to_string(),
                kind: FunctionKind::Destructor,
                generics: GenericParams::default(),
                params,
                return_type: Type::void(),
                body,
            });
        }

        // `overload self(...)` or bare `self(...)` constructor.
        let overloaded = self.at(TokenKind::KwOverload);
        if overloaded {
            self.advance();
        }
        if self.at(TokenKind::Ident) && self.current_text() == "self" && self.nth(1) == TokenKind::LParen
        {
            self.advance();
            let params = self.parse_params();
            let body = self.parse_fn_body();
            return Some(FunctionDecl {
                name: "self".to_string(),
                kind: FunctionKind::Constructor,
                generics: GenericParams::default(),
                params,
                return_type: Type::void(),
                body,
            });
        }
        if overloaded {
            self.error("expected `self(...)` after `overload`");
            self.sync_stmt();
            return None;
        }

        // `operator <symbol>(...) -> Type`
        if self.at(TokenKind::KwOperator) {
            self.advance();
            let symbol = self.parse_operator_symbol()?;
            let Some(kind) = OperatorKind::from_symbol(&symbol) else {
                self.error(format!("unknown overloadable operator `{symbol}`"));
                self.sync_stmt();
                return None;
            };
            let params = self.parse_params();
            let return_type = if self.eat(TokenKind::Arrow) {
                self.parse_type()
            } else {
                Type::void()
            };
            let body = self.parse_fn_body();
            return Some(FunctionDecl {
                name: kind.mangle().to_string(),
                kind: FunctionKind::Operator(kind),
                generics: GenericParams::default(),
                params,
                return_type,
                body,
            });
        }

        // Normal method: [<generics>] Type name(params)
        let generics = self.parse_generic_params();
        let return_type = self.parse_type();
        let name = self.expect_ident("method name");
        if name.is_empty() {
            self.sync_stmt();
            return None;
        }
        let params = self.parse_params();
        let body = self.parse_fn_body();
        Some(FunctionDecl {
            name,
            kind: FunctionKind::Normal,
            generics,
            params,
            return_type,
            body,
        })
    }

    /// The operator symbol after the `operator` keyword.
    fn parse_operator_symbol(&mut self) -> Option<String> {
        let symbol = match self.current() {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::BangEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::LBracket => {
                self.advance();
                self.expect(TokenKind::RBracket, "`]` in `operator []`");
                return Some("[]".to_string());
            }
            _ => {
                self.error("expected operator symbol");
                return None;
            }
        };
        self.advance();
        Some(symbol.to_string())
    }

    /// `{ ... }` body or `;` prototype.
    fn parse_fn_body(&mut self) -> Option<Vec<Stmt>> {
        if self.eat(TokenKind::Semicolon) {
            return None;
        }
        Some(self.parse_block())
    }

    fn parse_enum_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // enum
        let name = self.expect_ident("enum name");
        let generics = self.parse_generic_params();
        self.expect(TokenKind::LBrace, "`{` to open enum body");

        let mut members = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let start = self.current_span();
            let member_name = self.expect_ident("enum member name");
            if member_name.is_empty() {
                self.sync_stmt();
                continue;
            }

            let mut fields = Vec::new();
            if self.eat(TokenKind::LParen) {
                while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                    fields.push(self.parse_type());
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "`)` after enum payload types");
            }

            let value = if self.eat(TokenKind::Eq) {
                let negative = self.eat(TokenKind::Minus);
                if self.at(TokenKind::IntLiteral) {
                    let v = self.current_token().as_int();
                    self.advance();
                    Some(if negative { -v } else { v })
                } else {
                    self.error("expected integer enum discriminant");
                    None
                }
            } else {
                None
            };

            members.push(EnumMember {
                name: member_name,
                value,
                fields,
                span: start.merge(self.prev_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}` to close enum body");

        Some(DeclKind::Enum(EnumDecl {
            name,
            generics,
            members,
        }))
    }

    fn parse_typedef_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // typedef
        let name = self.expect_ident("typedef name");
        let generics = self.parse_generic_params();
        self.expect(TokenKind::Eq, "`=` in typedef");
        let target = self.parse_type();
        self.expect(TokenKind::Semicolon, "`;` after typedef");
        Some(DeclKind::Typedef(TypedefDecl {
            name,
            generics,
            target,
        }))
    }

    fn parse_extern_block(&mut self) -> Option<DeclKind> {
        self.advance(); // extern
        let abi = if self.at(TokenKind::StringLiteral) {
            let abi = self.current_text();
            self.advance();
            Some(abi)
        } else {
            None
        };

        // Either a block of prototypes or a single prototype.
        let mut functions = Vec::new();
        if self.eat(TokenKind::LBrace) {
            while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
                let before = self.pos;
                if let Some(func) = self.parse_prototype() {
                    functions.push(func);
                }
                if self.pos == before {
                    self.error("parser stuck: unexpected token in extern block");
                    self.advance();
                }
            }
            self.expect(TokenKind::RBrace, "`}` to close extern block");
        } else if let Some(func) = self.parse_prototype() {
            functions.push(func);
        }

        Some(DeclKind::ExternBlock(ExternBlockDecl { abi, functions }))
    }

    fn parse_prototype(&mut self) -> Option<FunctionDecl> {
        let return_type = self.parse_type();
        let name = self.expect_ident("function name");
        if name.is_empty() {
            self.sync_stmt();
            return None;
        }
        let params = self.parse_params();
        self.expect(TokenKind::Semicolon, "`;` after extern prototype");
        Some(FunctionDecl {
            name,
            kind: FunctionKind::Normal,
            generics: GenericParams::default(),
            params,
            return_type,
            body: None,
        })
    }

    fn parse_use_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // use
        let path = self.parse_path();
        let alias = if self.eat(TokenKind::KwAs) {
            Some(self.expect_ident("alias"))
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after use");
        Some(DeclKind::Use(UseDecl { path, alias }))
    }

    /// An `import` that survived preprocessing (normally they are inlined
    /// or commented out). Kept as a node so tooling sees it.
    fn parse_import_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // import
        let mut specifier = String::new();
        while !self.at(TokenKind::Semicolon) && !self.at(TokenKind::Eof) {
            let token = self.advance();
            match token.value {
                TokenValue::Str(s) => specifier.push_str(&s),
                _ => specifier.push_str(kind_atom(token.kind)),
            }
        }
        self.eat(TokenKind::Semicolon);
        Some(DeclKind::Import(ImportDecl { specifier }))
    }

    fn parse_module_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // module
        let name = self.parse_path();
        self.expect(TokenKind::Semicolon, "`;` after module declaration");
        Some(DeclKind::Module(ModuleDecl { name }))
    }

    fn parse_namespace_decl(&mut self) -> Option<DeclKind> {
        self.advance(); // namespace
        let name = self.parse_path();
        self.expect(TokenKind::LBrace, "`{` to open namespace");
        let declarations = self.parse_decl_list(TokenKind::RBrace);
        self.expect(TokenKind::RBrace, "`}` to close namespace");
        Some(DeclKind::Namespace(NamespaceDecl { name, declarations }))
    }

    /// `macro name { ... }` / `template name { ... }`: the body is skipped
    /// (expansion is not part of this pipeline) but its span is kept.
    fn parse_macro_decl(&mut self, is_template: bool) -> Option<DeclKind> {
        self.advance(); // macro | template
        let name = self.expect_ident(if is_template { "template name" } else { "macro name" });
        let body_start = self.current_span();
        if self.expect(TokenKind::LBrace, "`{` to open body") {
            let mut depth = 1;
            while depth > 0 && !self.at(TokenKind::Eof) {
                match self.current() {
                    TokenKind::LBrace => depth += 1,
                    TokenKind::RBrace => depth -= 1,
                    _ => {}
                }
                self.advance();
            }
        }
        let body_span = body_start.merge(self.prev_span());
        Some(if is_template {
            DeclKind::Template(TemplateDecl { name, body_span })
        } else {
            DeclKind::Macro(MacroDecl { name, body_span })
        })
    }

    fn parse_global_var_decl(&mut self) -> Option<DeclKind> {
        let is_const = self.eat(TokenKind::KwConst);
        let is_static = self.eat(TokenKind::KwStatic);

        if self.eat(TokenKind::KwLet) {
            let name = self.expect_ident("variable name");
            let ty = if self.eat(TokenKind::Colon) {
                self.parse_type()
            } else {
                Type::new(TypeKind::Inferred, self.current_span())
            };
            let init = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr())
            } else {
                None
            };
            self.expect(TokenKind::Semicolon, "`;` after global variable");
            return Some(DeclKind::GlobalVar(GlobalVarDecl {
                name,
                ty,
                init,
                is_const,
                is_static,
            }));
        }

        let ty = self.parse_type();
        let name = self.expect_ident("variable name");
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after global variable");
        Some(DeclKind::GlobalVar(GlobalVarDecl {
            name,
            ty,
            init,
            is_const,
            is_static,
        }))
    }

    /// Either a function definition/prototype or a typed global variable.
    fn parse_function_or_global(&mut self) -> Option<DeclKind> {
        let generics = self.parse_generic_params();
        if !self.at_type_start() {
            self.error("expected a declaration");
            return None;
        }
        let return_type = self.parse_type();
        let name = self.expect_ident("name");
        if name.is_empty() {
            return None;
        }

        if self.at(TokenKind::LParen) {
            let params = self.parse_params();
            let body = self.parse_fn_body();
            return Some(DeclKind::Function(FunctionDecl {
                name,
                kind: FunctionKind::Normal,
                generics,
                params,
                return_type,
                body,
            }));
        }

        if !generics.is_empty() {
            self.error("generic parameters are only valid on functions here");
        }
        let init = if self.eat(TokenKind::Eq) {
            Some(self.parse_expr())
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "`;` after global variable");
        Some(DeclKind::GlobalVar(GlobalVarDecl {
            name,
            ty: return_type,
            init,
            is_const: false,
            is_static: false,
        }))
    }
}

/// Fixed spellings for keyword/punctuation tokens when re-serialized.
fn kind_atom(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::ColonColon => "::",
        TokenKind::Star => "*",
        TokenKind::Dot => ".",
        TokenKind::Slash => "/",
        TokenKind::KwAs => " as ",
        TokenKind::KwFrom => " from ",
        TokenKind::LBrace => "{",
        TokenKind::RBrace => "}",
        TokenKind::Comma => ",",
        _ => "",
    }
}
