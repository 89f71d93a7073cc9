//! AST-to-HIR lowering.
//!
//! Name-preserving, type-propagating rewrites: namespaces are flattened into
//! qualified names, `for-in` and `match` desugar into loops and if/else
//! chains, compound assignments become read-modify-write, constructor sugar
//! becomes explicit `T__ctor` calls, `sizeof`/`alignof` fold to integers,
//! and `__llvm__(...)` templates become [`HirAsm`] nodes.
//!
//! The lowering keeps a lightweight type environment (params, lets, struct
//! fields, function returns) — enough to resolve method dispatch, iterator
//! protocols and enum payloads without re-running the type checker.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use cm_common::diagnostics::Diagnostic;
use cm_common::Span;
use cm_parser::ast::{self, ArraySize, BinaryOp, Type, TypeKind, UnaryOp};

use crate::layout::LayoutEngine;
use crate::*;

/// Fatal lowering failure; ordinary problems become diagnostics instead.
#[derive(Debug, Clone)]
pub struct LoweringError {
    pub message: String,
    pub span: Span,
}

impl fmt::Display for LoweringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LoweringError {}

/// One registered impl method: where the mangled function lives.
#[derive(Debug, Clone)]
struct ImplMethod {
    type_name: String,
    interface: Option<String>,
    method: String,
    mangled: String,
}

pub struct HirLowering {
    // Lookup tables, built in the collect pass.
    struct_defs: FxHashMap<String, ast::StructDecl>,
    enum_defs: FxHashMap<String, ast::EnumDecl>,
    typedefs: FxHashMap<String, Type>,
    fn_sigs: FxHashMap<String, (Vec<Type>, Type, Vec<String>)>,
    interfaces: FxHashMap<String, HirInterface>,
    impl_methods: Vec<ImplMethod>,
    types_with_default_ctor: FxHashSet<String>,
    use_aliases: FxHashMap<String, String>,
    global_types: FxHashMap<String, Type>,

    layout: LayoutEngine,
    scopes: Vec<FxHashMap<String, Type>>,
    namespace: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for HirLowering {
    fn default() -> Self {
        Self::new()
    }
}

impl HirLowering {
    pub fn new() -> Self {
        Self {
            struct_defs: FxHashMap::default(),
            enum_defs: FxHashMap::default(),
            typedefs: FxHashMap::default(),
            fn_sigs: FxHashMap::default(),
            interfaces: FxHashMap::default(),
            impl_methods: Vec::new(),
            types_with_default_ctor: FxHashSet::default(),
            use_aliases: FxHashMap::default(),
            global_types: FxHashMap::default(),
            layout: LayoutEngine::new(),
            scopes: Vec::new(),
            namespace: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Lower a filtered, type-checked program.
    pub fn lower(&mut self, program: &ast::Program) -> Result<HirProgram, LoweringError> {
        self.collect_decls(&program.declarations);

        let mut hir = HirProgram::default();
        self.lower_decls(&program.declarations, &mut hir)?;
        Ok(hir)
    }

    // ── Collect pass ───────────────────────────────────────────────────

    fn qualify(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.namespace.join("::"), name)
        }
    }

    fn collect_decls(&mut self, decls: &[ast::Decl]) {
        for decl in decls {
            match &decl.kind {
                ast::DeclKind::Struct(s) => {
                    let qname = self.qualify(&s.name);
                    self.layout
                        .add_struct(qname.clone(), s.fields.iter().map(|f| f.ty.clone()).collect());
                    self.struct_defs.insert(qname, s.clone());
                }
                ast::DeclKind::Enum(e) => {
                    let qname = self.qualify(&e.name);
                    self.layout.add_enum(
                        qname.clone(),
                        e.members.iter().map(|m| m.fields.clone()).collect(),
                    );
                    self.enum_defs.insert(qname, e.clone());
                }
                ast::DeclKind::Typedef(t) => {
                    let qname = self.qualify(&t.name);
                    self.layout.add_typedef(qname.clone(), t.target.clone());
                    self.typedefs.insert(qname, t.target.clone());
                }
                ast::DeclKind::Function(f) => {
                    let qname = self.qualify(&f.name);
                    self.register_fn(&qname, f);
                }
                ast::DeclKind::Interface(i) => {
                    let qname = self.qualify(&i.name);
                    let methods = i
                        .methods
                        .iter()
                        .map(|m| HirFunctionSig {
                            name: m.name.clone(),
                            params: m
                                .params
                                .iter()
                                .map(|p| (p.name.clone(), p.ty.clone()))
                                .collect(),
                            return_type: m.return_type.clone(),
                        })
                        .collect();
                    self.interfaces.insert(
                        qname.clone(),
                        HirInterface {
                            name: qname,
                            methods,
                        },
                    );
                }
                ast::DeclKind::Impl(imp) => {
                    self.collect_impl(imp);
                }
                ast::DeclKind::GlobalVar(g) => {
                    let qname = self.qualify(&g.name);
                    self.global_types.insert(qname, g.ty.clone());
                }
                ast::DeclKind::Use(u) => {
                    let alias = u
                        .alias
                        .clone()
                        .unwrap_or_else(|| u.path.rsplit("::").next().unwrap_or("").to_string());
                    self.use_aliases.insert(alias, u.path.clone());
                }
                ast::DeclKind::ExternBlock(block) => {
                    for f in &block.functions {
                        self.register_fn(&f.name.clone(), f);
                    }
                }
                ast::DeclKind::Namespace(ns) => {
                    self.namespace.push(ns.name.clone());
                    self.collect_decls(&ns.declarations);
                    self.namespace.pop();
                }
                _ => {}
            }
        }
    }

    fn register_fn(&mut self, qname: &str, f: &ast::FunctionDecl) {
        self.fn_sigs.insert(
            qname.to_string(),
            (
                f.params.iter().map(|p| p.ty.clone()).collect(),
                f.return_type.clone(),
                f.generics.names.clone(),
            ),
        );
    }

    fn collect_impl(&mut self, imp: &ast::ImplDecl) {
        let type_name = self.qualify(&imp.type_name);
        for method in &imp.methods {
            let mangled = mangle_method(&type_name, imp.interface.as_deref(), method);
            if method.kind == ast::FunctionKind::Constructor && method.params.is_empty() {
                self.types_with_default_ctor.insert(type_name.clone());
            }

            // Signature as seen by callers: `this` pointer first.
            let mut params: Vec<Type> = vec![Type::new(
                TypeKind::Pointer(Box::new(Type::named(type_name.clone()))),
                Span::dummy(),
            )];
            params.extend(method.params.iter().map(|p| p.ty.clone()));
            self.fn_sigs.insert(
                mangled.clone(),
                (params, method.return_type.clone(), method.generics.names.clone()),
            );

            self.impl_methods.push(ImplMethod {
                type_name: type_name.clone(),
                interface: imp.interface.clone(),
                method: method.name.clone(),
                mangled,
            });
        }
    }

    // ── Lower pass ─────────────────────────────────────────────────────

    fn lower_decls(
        &mut self,
        decls: &[ast::Decl],
        hir: &mut HirProgram,
    ) -> Result<(), LoweringError> {
        for decl in decls {
            match &decl.kind {
                ast::DeclKind::Function(f) => {
                    let qname = self.qualify(&f.name);
                    if let Some(mut func) =
                        self.lower_function(&qname, f, decl.visibility == ast::Visibility::Export, decl.span)?
                    {
                        func.no_inline = decl.attributes.iter().any(|a| a.name == "noinline");
                        func.no_optimize =
                            decl.attributes.iter().any(|a| a.name == "no_optimize");
                        hir.functions.push(func);
                    } else if f.body.is_none() {
                        hir.externs.push(HirFunctionSig {
                            name: qname,
                            params: f
                                .params
                                .iter()
                                .map(|p| (p.name.clone(), p.ty.clone()))
                                .collect(),
                            return_type: f.return_type.clone(),
                        });
                    }
                }
                ast::DeclKind::Struct(s) => {
                    hir.structs.push(HirStruct {
                        name: self.qualify(&s.name),
                        generics: s.generics.clone(),
                        fields: s
                            .fields
                            .iter()
                            .map(|f| (f.name.clone(), f.ty.clone()))
                            .collect(),
                        span: decl.span,
                    });
                }
                ast::DeclKind::Enum(e) => {
                    hir.enums.push(self.lower_enum(e));
                }
                ast::DeclKind::Interface(i) => {
                    let qname = self.qualify(&i.name);
                    if let Some(iface) = self.interfaces.get(&qname) {
                        hir.interfaces.push(iface.clone());
                    }
                }
                ast::DeclKind::Impl(imp) => {
                    self.lower_impl(imp, hir)?;
                }
                ast::DeclKind::GlobalVar(g) => {
                    let init = g.init.as_ref().map(|e| self.lower_expr(e));
                    hir.globals.push(HirGlobal {
                        name: self.qualify(&g.name),
                        ty: g.ty.clone(),
                        init,
                        is_const: g.is_const,
                    });
                }
                ast::DeclKind::ExternBlock(block) => {
                    for f in &block.functions {
                        hir.externs.push(HirFunctionSig {
                            name: f.name.clone(),
                            params: f
                                .params
                                .iter()
                                .map(|p| (p.name.clone(), p.ty.clone()))
                                .collect(),
                            return_type: f.return_type.clone(),
                        });
                    }
                }
                ast::DeclKind::Namespace(ns) => {
                    self.namespace.push(ns.name.clone());
                    let result = self.lower_decls(&ns.declarations, hir);
                    self.namespace.pop();
                    result?;
                }
                // Imports/modules were handled by the preprocessor; macros
                // and templates are not expanded by this pipeline.
                _ => {}
            }
        }
        Ok(())
    }

    fn lower_enum(&mut self, e: &ast::EnumDecl) -> HirEnum {
        let mut next_value = 0i64;
        let mut members = Vec::new();
        for member in &e.members {
            let value = member.value.unwrap_or(next_value);
            next_value = value + 1;
            members.push(HirEnumMember {
                name: member.name.clone(),
                value,
                fields: member.fields.clone(),
            });
        }
        let has_payload = members.iter().any(|m| !m.fields.is_empty());
        HirEnum {
            name: self.qualify(&e.name),
            generics: e.generics.clone(),
            members,
            has_payload,
        }
    }

    fn lower_impl(&mut self, imp: &ast::ImplDecl, hir: &mut HirProgram) -> Result<(), LoweringError> {
        let type_name = self.qualify(&imp.type_name);
        let mut method_map = Vec::new();

        for method in &imp.methods {
            let mangled = mangle_method(&type_name, imp.interface.as_deref(), method);
            method_map.push((method.name.clone(), mangled.clone()));

            let Some(body) = &method.body else {
                continue;
            };

            // `this` is passed by pointer.
            let this_ty = Type::new(
                TypeKind::Pointer(Box::new(Type::named(type_name.clone()))),
                Span::dummy(),
            );
            let mut params = vec![("this".to_string(), this_ty)];
            params.extend(method.params.iter().map(|p| (p.name.clone(), p.ty.clone())));

            self.scopes.push(FxHashMap::default());
            for (name, ty) in &params {
                self.scopes.last_mut().unwrap().insert(name.clone(), ty.clone());
            }
            let body = self.lower_stmts(body);
            self.scopes.pop();

            hir.functions.push(HirFunction {
                name: mangled,
                generics: method.generics.clone(),
                params,
                return_type: method.return_type.clone(),
                body,
                is_export: false,
                no_inline: false,
                no_optimize: false,
                span: Span::dummy(),
            });
        }

        hir.impls.push(HirImplInfo {
            interface: imp.interface.clone(),
            type_name,
            methods: method_map,
        });
        Ok(())
    }

    fn lower_function(
        &mut self,
        qname: &str,
        f: &ast::FunctionDecl,
        is_export: bool,
        span: Span,
    ) -> Result<Option<HirFunction>, LoweringError> {
        let Some(body) = &f.body else {
            return Ok(None);
        };

        self.scopes.push(FxHashMap::default());
        for p in &f.params {
            self.scopes
                .last_mut()
                .unwrap()
                .insert(p.name.clone(), p.ty.clone());
        }
        let body = self.lower_stmts(body);
        self.scopes.pop();

        Ok(Some(HirFunction {
            name: qname.to_string(),
            generics: f.generics.clone(),
            params: f
                .params
                .iter()
                .map(|p| (p.name.clone(), p.ty.clone()))
                .collect(),
            return_type: f.return_type.clone(),
            body,
            is_export,
            no_inline: false,
            no_optimize: false,
            span,
        }))
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn lower_stmts(&mut self, stmts: &[ast::Stmt]) -> Vec<HirStmt> {
        stmts.iter().filter_map(|s| self.lower_stmt(s)).collect()
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Option<HirStmt> {
        match &stmt.kind {
            ast::StmtKind::Let(l) => Some(self.lower_let(l, stmt.span)),
            ast::StmtKind::Return(value) => {
                let value = value.as_ref().map(|e| self.lower_expr(e));
                Some(HirStmt::Return(value, stmt.span))
            }
            ast::StmtKind::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.lower_expr(cond);
                self.scopes.push(FxHashMap::default());
                let then_block = self.lower_stmts(then_block);
                self.scopes.pop();
                self.scopes.push(FxHashMap::default());
                let else_block = self.lower_stmts(else_block);
                self.scopes.pop();
                Some(HirStmt::If {
                    cond,
                    then_block,
                    else_block,
                })
            }
            ast::StmtKind::While { cond, body } => {
                let cond = self.lower_expr(cond);
                self.scopes.push(FxHashMap::default());
                let body = self.lower_stmts(body);
                self.scopes.pop();
                Some(HirStmt::While { cond, body })
            }
            ast::StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                self.scopes.push(FxHashMap::default());
                let init = init.as_ref().and_then(|s| self.lower_stmt(s)).map(Box::new);
                let cond = cond.as_ref().map(|e| self.lower_expr(e));
                let update = update.as_ref().map(|e| self.lower_expr(e));
                let body = self.lower_stmts(body);
                self.scopes.pop();
                Some(HirStmt::For {
                    init,
                    cond,
                    update,
                    body,
                })
            }
            ast::StmtKind::ForIn {
                var,
                var_type,
                iterable,
                body,
            } => Some(self.lower_for_in(var, var_type.as_ref(), iterable, body)),
            ast::StmtKind::Switch { expr, cases } => {
                let expr = self.lower_expr(expr);
                let cases = cases
                    .iter()
                    .map(|case| {
                        self.scopes.push(FxHashMap::default());
                        let lowered = HirSwitchCase {
                            pattern: case.pattern.as_ref().map(|p| self.lower_switch_pattern(p)),
                            stmts: self.lower_stmts(&case.stmts),
                        };
                        self.scopes.pop();
                        lowered
                    })
                    .collect();
                Some(HirStmt::Switch { expr, cases })
            }
            ast::StmtKind::Defer(inner) => {
                let inner = self.lower_stmt(inner)?;
                Some(HirStmt::Defer(Box::new(inner)))
            }
            ast::StmtKind::Must(body) => {
                self.scopes.push(FxHashMap::default());
                let body = self.lower_stmts(body);
                self.scopes.pop();
                Some(HirStmt::MustBlock {
                    body,
                    span: stmt.span,
                })
            }
            ast::StmtKind::Block(body) => {
                self.scopes.push(FxHashMap::default());
                let body = self.lower_stmts(body);
                self.scopes.pop();
                Some(HirStmt::Block(body))
            }
            ast::StmtKind::Break => Some(HirStmt::Break),
            ast::StmtKind::Continue => Some(HirStmt::Continue),
            ast::StmtKind::Expr(expr) => self.lower_expr_stmt(expr),
            ast::StmtKind::Error => None,
        }
    }

    fn lower_switch_pattern(&mut self, pattern: &ast::SwitchPattern) -> HirSwitchPattern {
        match pattern {
            ast::SwitchPattern::Value(v) => HirSwitchPattern::Value(self.lower_expr(v)),
            ast::SwitchPattern::Range {
                start,
                end,
                inclusive,
            } => HirSwitchPattern::Range {
                start: self.lower_expr(start),
                end: self.lower_expr(end),
                inclusive: *inclusive,
            },
            ast::SwitchPattern::Or(patterns) => HirSwitchPattern::Or(
                patterns
                    .iter()
                    .map(|p| self.lower_switch_pattern(p))
                    .collect(),
            ),
        }
    }

    fn lower_let(&mut self, l: &ast::LetStmt, span: Span) -> HirStmt {
        let mut declared_ty = l.ty.clone().unwrap_or_else(|| {
            Type::new(TypeKind::Inferred, span)
        });

        // Constructor sugar: `T x = T(args);`
        let mut ctor_args: Option<Vec<ast::Expr>> = None;
        if let Some(init) = &l.init {
            if let ast::ExprKind::Call {
                callee,
                args,
                type_args,
            } = &init.kind
            {
                if type_args.is_empty() {
                    if let ast::ExprKind::Ident(callee_name) = &callee.kind {
                        let resolved = self.resolve_type_name(callee_name);
                        if !declared_ty.name().is_empty()
                            && self.resolve_type_name(declared_ty.name()) == resolved
                            && self.struct_defs.contains_key(&resolved)
                        {
                            ctor_args = Some(args.clone());
                        }
                    }
                }
            }
        }

        let init = if ctor_args.is_some() {
            None
        } else {
            l.init.as_ref().map(|e| {
                let mut lowered = self.lower_expr(e);
                // Implicit struct literals take the declared type.
                if let HirExprKind::StructLit { type_name, .. } = &mut lowered.kind {
                    if type_name.is_empty() {
                        *type_name = self.resolve_type_name(declared_ty.name());
                        lowered.ty = Type::named(type_name.clone());
                    }
                }
                lowered
            })
        };

        if matches!(declared_ty.kind, TypeKind::Inferred) {
            if let Some(init) = &init {
                declared_ty = init.ty.clone();
            }
        }

        // Implicit default constructor for `T x;`.
        let resolved_type_name = self.resolve_type_name(declared_ty.name());
        let needs_default_ctor = l.init.is_none()
            && ctor_args.is_none()
            && self.types_with_default_ctor.contains(&resolved_type_name);

        let ctor_call = if let Some(args) = ctor_args {
            let lowered_args: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
            let mut ctor_name = format!("{resolved_type_name}__ctor");
            if !lowered_args.is_empty() {
                ctor_name = format!("{ctor_name}_{}", lowered_args.len());
            }
            let receiver = HirExpr::new(
                HirExprKind::Unary {
                    op: UnaryOp::AddrOf,
                    operand: Box::new(HirExpr::var(
                        l.name.clone(),
                        declared_ty.clone(),
                        span,
                    )),
                },
                Type::new(TypeKind::Pointer(Box::new(declared_ty.clone())), span),
                span,
            );
            let mut call_args = vec![receiver];
            call_args.extend(lowered_args);
            Some(HirExpr::new(
                HirExprKind::Call {
                    func: ctor_name,
                    type_args: Vec::new(),
                    args: call_args,
                },
                Type::void(),
                span,
            ))
        } else if needs_default_ctor {
            let receiver = HirExpr::new(
                HirExprKind::Unary {
                    op: UnaryOp::AddrOf,
                    operand: Box::new(HirExpr::var(l.name.clone(), declared_ty.clone(), span)),
                },
                Type::new(TypeKind::Pointer(Box::new(declared_ty.clone())), span),
                span,
            );
            Some(HirExpr::new(
                HirExprKind::Call {
                    func: format!("{resolved_type_name}__ctor"),
                    type_args: Vec::new(),
                    args: vec![receiver],
                },
                Type::void(),
                span,
            ))
        } else {
            None
        };

        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(l.name.clone(), declared_ty.clone());
        }

        HirStmt::Let(HirLet {
            name: l.name.clone(),
            ty: declared_ty,
            init,
            ctor_call,
            is_const: l.is_const,
            span,
        })
    }

    /// `for x in iter` desugaring, per the iterable's type.
    fn lower_for_in(
        &mut self,
        var: &str,
        var_type: Option<&Type>,
        iterable: &ast::Expr,
        body: &[ast::Stmt],
    ) -> HirStmt {
        let iter_expr = self.lower_expr(iterable);
        let span = iter_expr.span;
        let iter_ty = iter_expr.ty.clone();

        // Arrays and slices: index-based loop.
        if let TypeKind::Array { elem, size } = &iter_ty.kind {
            let elem_ty = var_type.cloned().unwrap_or_else(|| (**elem).clone());
            let idx_name = format!("__for_in_idx_{var}");

            let bound = match size {
                Some(ArraySize::Literal(n)) => HirExpr::int(*n as i64, span),
                Some(ArraySize::Generic(name)) => {
                    // Resolved by monomorphization's const-argument pass.
                    HirExpr::var(name.clone(), Type::int(), span)
                }
                None => HirExpr::new(
                    HirExprKind::Call {
                        func: "__builtin_slice_len".to_string(),
                        type_args: Vec::new(),
                        args: vec![iter_expr.clone()],
                    },
                    Type::int(),
                    span,
                ),
            };

            let init = HirStmt::Let(HirLet {
                name: idx_name.clone(),
                ty: Type::int(),
                init: Some(HirExpr::int(0, span)),
                ctor_call: None,
                is_const: false,
                span,
            });
            let cond = HirExpr::new(
                HirExprKind::Binary {
                    op: BinaryOp::Lt,
                    lhs: Box::new(HirExpr::var(idx_name.clone(), Type::int(), span)),
                    rhs: Box::new(bound),
                },
                Type::bool(),
                span,
            );
            let update = HirExpr::new(
                HirExprKind::Assign {
                    target: Box::new(HirExpr::var(idx_name.clone(), Type::int(), span)),
                    value: Box::new(HirExpr::new(
                        HirExprKind::Binary {
                            op: BinaryOp::Add,
                            lhs: Box::new(HirExpr::var(idx_name.clone(), Type::int(), span)),
                            rhs: Box::new(HirExpr::int(1, span)),
                        },
                        Type::int(),
                        span,
                    )),
                },
                Type::int(),
                span,
            );

            self.scopes.push(FxHashMap::default());
            self.scopes
                .last_mut()
                .unwrap()
                .insert(var.to_string(), elem_ty.clone());
            let mut loop_body = vec![HirStmt::Let(HirLet {
                name: var.to_string(),
                ty: elem_ty.clone(),
                init: Some(HirExpr::new(
                    HirExprKind::Index {
                        object: Box::new(iter_expr),
                        index: Box::new(HirExpr::var(idx_name, Type::int(), span)),
                    },
                    elem_ty,
                    span,
                )),
                ctor_call: None,
                is_const: false,
                span,
            })];
            loop_body.extend(self.lower_stmts(body));
            self.scopes.pop();

            return HirStmt::For {
                init: Some(Box::new(init)),
                cond: Some(cond),
                update: Some(update),
                body: loop_body,
            };
        }

        // Iterator protocol: `T__iter` / `IterT__has_next` / `IterT__next`.
        let type_name = self.resolve_type_name(iter_ty.name());
        if let Some(iter_fn) = self.find_impl_method(&type_name, "iter") {
            let iter_ret = self
                .fn_sigs
                .get(&iter_fn)
                .map(|(_, ret, _)| ret.clone())
                .unwrap_or_else(Type::void);
            let iter_type_name = self.resolve_type_name(iter_ret.name());
            let has_next_fn = self
                .find_impl_method(&iter_type_name, "has_next")
                .unwrap_or_else(|| format!("{iter_type_name}__has_next"));
            let next_fn = self
                .find_impl_method(&iter_type_name, "next")
                .unwrap_or_else(|| format!("{iter_type_name}__next"));
            let elem_ty = var_type.cloned().unwrap_or_else(|| {
                self.fn_sigs
                    .get(&next_fn)
                    .map(|(_, ret, _)| ret.clone())
                    .unwrap_or_else(Type::int)
            });

            let iter_name = format!("__for_in_iter_{var}");
            let iter_ptr = |span| {
                HirExpr::new(
                    HirExprKind::Unary {
                        op: UnaryOp::AddrOf,
                        operand: Box::new(HirExpr::var(iter_name.clone(), iter_ret.clone(), span)),
                    },
                    Type::new(TypeKind::Pointer(Box::new(iter_ret.clone())), span),
                    span,
                )
            };

            // let __iter = T__iter(&collection);
            let recv = HirExpr::new(
                HirExprKind::Unary {
                    op: UnaryOp::AddrOf,
                    operand: Box::new(iter_expr.clone()),
                },
                Type::new(TypeKind::Pointer(Box::new(iter_ty.clone())), span),
                span,
            );
            let iter_let = HirStmt::Let(HirLet {
                name: iter_name.clone(),
                ty: iter_ret.clone(),
                init: Some(HirExpr::new(
                    HirExprKind::Call {
                        func: iter_fn,
                        type_args: Vec::new(),
                        args: vec![recv],
                    },
                    iter_ret.clone(),
                    span,
                )),
                ctor_call: None,
                is_const: false,
                span,
            });

            // while (has_next(&__iter)) { let x = next(&__iter); body }
            let cond = HirExpr::new(
                HirExprKind::Call {
                    func: has_next_fn,
                    type_args: Vec::new(),
                    args: vec![iter_ptr(span)],
                },
                Type::bool(),
                span,
            );

            self.scopes.push(FxHashMap::default());
            self.scopes
                .last_mut()
                .unwrap()
                .insert(var.to_string(), elem_ty.clone());
            let mut loop_body = vec![HirStmt::Let(HirLet {
                name: var.to_string(),
                ty: elem_ty.clone(),
                init: Some(HirExpr::new(
                    HirExprKind::Call {
                        func: next_fn,
                        type_args: Vec::new(),
                        args: vec![iter_ptr(span)],
                    },
                    elem_ty,
                    span,
                )),
                ctor_call: None,
                is_const: false,
                span,
            })];
            loop_body.extend(self.lower_stmts(body));
            self.scopes.pop();

            return HirStmt::Block(vec![iter_let, HirStmt::While { cond, body: loop_body }]);
        }

        // Unknown iterable: report and produce a zero-iteration loop.
        self.diagnostics.push(Diagnostic::error(
            format!("type `{}` is not iterable", describe_type(&iter_ty)),
            span,
        ));
        HirStmt::For {
            init: None,
            cond: Some(HirExpr::bool(false, span)),
            update: None,
            body: Vec::new(),
        }
    }

    /// Expression statements: `match` statements and `__llvm__` templates
    /// get special handling.
    fn lower_expr_stmt(&mut self, expr: &ast::Expr) -> Option<HirStmt> {
        if let ast::ExprKind::Match(m) = &expr.kind {
            return Some(self.lower_match_as_stmt(m, expr.span));
        }

        if let ast::ExprKind::Call { callee, args, .. } = &expr.kind {
            if let ast::ExprKind::Ident(name) = &callee.kind {
                if name == "__llvm__" {
                    return self.lower_llvm_template(args, expr.span);
                }
            }
        }

        let lowered = self.lower_expr(expr);
        Some(HirStmt::Expr(lowered))
    }

    /// `__llvm__("template")`: rewrite `${constraint:var}` interpolations to
    /// `$N` placeholders with a numbered operand list. The same
    /// `(constraint, var)` pair reuses its number.
    fn lower_llvm_template(&mut self, args: &[ast::Expr], span: Span) -> Option<HirStmt> {
        let Some(ast::Expr {
            kind: ast::ExprKind::StringLit(template),
            ..
        }) = args.first()
        else {
            self.diagnostics.push(Diagnostic::error(
                "__llvm__ requires a string literal argument",
                span,
            ));
            return None;
        };

        let mut code = String::new();
        let mut operands: Vec<AsmOperand> = Vec::new();
        let mut rest = template.as_str();

        while let Some(start) = rest.find("${") {
            code.push_str(&rest[..start]);
            let Some(end) = rest[start..].find('}') else {
                code.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let inner = &rest[start + 2..start + end];
            match inner.split_once(':') {
                Some((constraint, var_name)) => {
                    let existing = operands
                        .iter()
                        .position(|op| op.constraint == constraint && op.var_name == var_name);
                    let index = match existing {
                        Some(i) => i,
                        None => {
                            operands.push(AsmOperand {
                                constraint: constraint.to_string(),
                                var_name: var_name.to_string(),
                            });
                            operands.len() - 1
                        }
                    };
                    code.push_str(&format!("${index}"));
                }
                None => {
                    // No constraint: leave the interpolation untouched.
                    code.push_str(&format!("${{{inner}}}"));
                }
            }
            rest = &rest[start + end + 1..];
        }
        code.push_str(rest);

        Some(HirStmt::Asm(HirAsm {
            code,
            operands,
            span,
        }))
    }

    // ── match lowering ─────────────────────────────────────────────────

    /// Lower a statement-position `match` to an if/else chain with payload
    /// extraction and guard substitution.
    fn lower_match_as_stmt(&mut self, m: &ast::MatchExpr, span: Span) -> HirStmt {
        let scrutinee = self.lower_expr(&m.scrutinee);
        let enum_name = self.scrutinee_enum_name(&scrutinee, m);

        if m.arms.is_empty() {
            return HirStmt::Block(Vec::new());
        }

        // The wildcard arm becomes the trailing else.
        let mut else_stmts: Vec<HirStmt> = Vec::new();
        let mut wildcard_idx = None;
        for (i, arm) in m.arms.iter().enumerate() {
            if matches!(arm.pattern, ast::MatchPattern::Wildcard) {
                wildcard_idx = Some(i);
                else_stmts = self.lower_arm_body(&arm.body);
                break;
            }
        }

        let mut result: Option<HirStmt> = None;
        for (i, arm) in m.arms.iter().enumerate().rev() {
            if Some(i) == wildcard_idx {
                continue;
            }

            self.scopes.push(FxHashMap::default());
            let mut body_stmts = Vec::new();

            // Payload extraction for binding patterns.
            if let ast::MatchPattern::EnumVariantBinding { path, binding } = &arm.pattern {
                let variant = variant_of(path);
                let payload_ty = self.payload_type(&enum_name, &variant);
                self.scopes
                    .last_mut()
                    .unwrap()
                    .insert(binding.clone(), payload_ty.clone());
                body_stmts.push(HirStmt::Let(HirLet {
                    name: binding.clone(),
                    ty: payload_ty.clone(),
                    init: Some(HirExpr::new(
                        HirExprKind::EnumPayload {
                            scrutinee: Box::new(scrutinee.clone()),
                            enum_name: enum_name.clone(),
                            variant,
                        },
                        payload_ty,
                        span,
                    )),
                    ctor_call: None,
                    is_const: false,
                    span,
                }));
            }
            if let ast::MatchPattern::Variable(name) = &arm.pattern {
                self.scopes
                    .last_mut()
                    .unwrap()
                    .insert(name.clone(), scrutinee.ty.clone());
                body_stmts.push(HirStmt::Let(HirLet {
                    name: name.clone(),
                    ty: scrutinee.ty.clone(),
                    init: Some(scrutinee.clone()),
                    ctor_call: None,
                    is_const: false,
                    span,
                }));
            }

            body_stmts.extend(self.lower_arm_body(&arm.body));

            let mut cond = self.match_condition(&scrutinee, &enum_name, &arm.pattern);

            // Guards AND into the condition. Binding names inside the guard
            // are substituted with the payload extraction, because the
            // binding's `let` only exists inside the arm body.
            if let Some(guard) = &arm.guard {
                let mut guard_expr = self.lower_expr(guard);
                if let ast::MatchPattern::EnumVariantBinding { path, binding } = &arm.pattern {
                    let variant = variant_of(path);
                    let payload_ty = self.payload_type(&enum_name, &variant);
                    let replacement = HirExpr::new(
                        HirExprKind::EnumPayload {
                            scrutinee: Box::new(scrutinee.clone()),
                            enum_name: enum_name.clone(),
                            variant,
                        },
                        payload_ty,
                        span,
                    );
                    substitute_var(&mut guard_expr, binding, &replacement);
                }
                cond = HirExpr::new(
                    HirExprKind::Binary {
                        op: BinaryOp::And,
                        lhs: Box::new(cond),
                        rhs: Box::new(guard_expr),
                    },
                    Type::bool(),
                    span,
                );
            }

            self.scopes.pop();

            let else_block = match result.take() {
                Some(stmt) => vec![stmt],
                None => std::mem::take(&mut else_stmts),
            };
            result = Some(HirStmt::If {
                cond,
                then_block: body_stmts,
                else_block,
            });
        }

        match result {
            Some(stmt) => stmt,
            None => HirStmt::Block(else_stmts),
        }
    }

    fn lower_arm_body(&mut self, body: &ast::ArmBody) -> Vec<HirStmt> {
        match body {
            ast::ArmBody::Block(stmts) => self.lower_stmts(stmts),
            ast::ArmBody::Expr(expr) => {
                let lowered = self.lower_expr(expr);
                vec![HirStmt::Expr(lowered)]
            }
        }
    }

    /// The enum backing a match, from the scrutinee's type or from the
    /// first qualified variant pattern.
    fn scrutinee_enum_name(&mut self, scrutinee: &HirExpr, m: &ast::MatchExpr) -> String {
        let name = self.resolve_type_name(scrutinee.ty.name());
        if self.enum_defs.contains_key(&name) {
            return name;
        }
        for arm in &m.arms {
            if let ast::MatchPattern::EnumVariant { path }
            | ast::MatchPattern::EnumVariantBinding { path, .. } = &arm.pattern
            {
                if let Some((prefix, _)) = path.rsplit_once("::") {
                    let resolved = self.resolve_type_name(prefix);
                    if self.enum_defs.contains_key(&resolved) {
                        return resolved;
                    }
                }
            }
        }
        String::new()
    }

    fn payload_type(&mut self, enum_name: &str, variant: &str) -> Type {
        match self.enum_defs.get(enum_name) {
            Some(def) => def
                .members
                .iter()
                .find(|member| member.name == variant)
                .and_then(|member| member.fields.first().cloned())
                .unwrap_or_else(Type::int),
            None => {
                self.diagnostics.push(Diagnostic::error(
                    format!("missing enum definition for `{enum_name}`"),
                    Span::dummy(),
                ));
                Type::int()
            }
        }
    }

    fn match_condition(
        &mut self,
        scrutinee: &HirExpr,
        enum_name: &str,
        pattern: &ast::MatchPattern,
    ) -> HirExpr {
        let span = scrutinee.span;
        match pattern {
            ast::MatchPattern::Wildcard | ast::MatchPattern::Variable(_) => {
                HirExpr::bool(true, span)
            }
            ast::MatchPattern::Value(v) => {
                let value = self.lower_expr(v);
                HirExpr::new(
                    HirExprKind::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(scrutinee.clone()),
                        rhs: Box::new(value),
                    },
                    Type::bool(),
                    span,
                )
            }
            ast::MatchPattern::Range {
                start,
                end,
                inclusive,
            } => {
                let start = self.lower_expr(start);
                let end = self.lower_expr(end);
                let lower = HirExpr::new(
                    HirExprKind::Binary {
                        op: BinaryOp::Ge,
                        lhs: Box::new(scrutinee.clone()),
                        rhs: Box::new(start),
                    },
                    Type::bool(),
                    span,
                );
                let upper = HirExpr::new(
                    HirExprKind::Binary {
                        op: if *inclusive { BinaryOp::Le } else { BinaryOp::Lt },
                        lhs: Box::new(scrutinee.clone()),
                        rhs: Box::new(end),
                    },
                    Type::bool(),
                    span,
                );
                HirExpr::new(
                    HirExprKind::Binary {
                        op: BinaryOp::And,
                        lhs: Box::new(lower),
                        rhs: Box::new(upper),
                    },
                    Type::bool(),
                    span,
                )
            }
            ast::MatchPattern::Or(patterns) => {
                let mut iter = patterns.iter();
                let mut cond = match iter.next() {
                    Some(p) => self.match_condition(scrutinee, enum_name, p),
                    None => HirExpr::bool(false, span),
                };
                for p in iter {
                    let rhs = self.match_condition(scrutinee, enum_name, p);
                    cond = HirExpr::new(
                        HirExprKind::Binary {
                            op: BinaryOp::Or,
                            lhs: Box::new(cond),
                            rhs: Box::new(rhs),
                        },
                        Type::bool(),
                        span,
                    );
                }
                cond
            }
            ast::MatchPattern::EnumVariant { path }
            | ast::MatchPattern::EnumVariantBinding { path, .. } => {
                let variant = variant_of(path);
                if enum_name.is_empty() {
                    self.diagnostics.push(Diagnostic::error(
                        format!("cannot resolve enum for match pattern `{path}`"),
                        span,
                    ));
                    return HirExpr::bool(false, span);
                }
                HirExpr::new(
                    HirExprKind::EnumIs {
                        scrutinee: Box::new(scrutinee.clone()),
                        enum_name: enum_name.to_string(),
                        variant,
                    },
                    Type::bool(),
                    span,
                )
            }
        }
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn lower_expr(&mut self, expr: &ast::Expr) -> HirExpr {
        let span = expr.span;
        match &expr.kind {
            ast::ExprKind::IntLit(v) => HirExpr::int(*v, span),
            ast::ExprKind::FloatLit(v) => HirExpr::new(
                HirExprKind::FloatLit(*v),
                Type::new(TypeKind::Float64, span),
                span,
            ),
            ast::ExprKind::BoolLit(v) => HirExpr::bool(*v, span),
            ast::ExprKind::StringLit(s) => HirExpr::new(
                HirExprKind::StringLit(s.clone()),
                Type::new(TypeKind::String, span),
                span,
            ),
            ast::ExprKind::CharLit(c) => HirExpr::new(
                HirExprKind::CharLit(*c),
                Type::new(TypeKind::Char, span),
                span,
            ),
            ast::ExprKind::NullLit => {
                HirExpr::new(HirExprKind::NullLit, Type::new(TypeKind::Null, span), span)
            }
            ast::ExprKind::Ident(name) => self.lower_ident(name, span),
            ast::ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, span),
            ast::ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, span),
            ast::ExprKind::Assign { op, target, value } => {
                let target = self.lower_expr(target);
                let mut value = self.lower_expr(value);
                if let Some(op) = op {
                    // Compound assignment: read-modify-write.
                    value = HirExpr::new(
                        HirExprKind::Binary {
                            op: *op,
                            lhs: Box::new(target.clone()),
                            rhs: Box::new(value),
                        },
                        target.ty.clone(),
                        span,
                    );
                }
                let ty = value.ty.clone();
                HirExpr::new(
                    HirExprKind::Assign {
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                    ty,
                    span,
                )
            }
            ast::ExprKind::Call {
                callee,
                type_args,
                args,
            } => self.lower_call(callee, type_args, args, span),
            ast::ExprKind::Member { object, name } => self.lower_member(object, name, span),
            ast::ExprKind::Index { object, index } => {
                let object = self.lower_expr(object);
                let index = self.lower_expr(index);
                let ty = self.element_type(&object.ty);
                HirExpr::new(
                    HirExprKind::Index {
                        object: Box::new(object),
                        index: Box::new(index),
                    },
                    ty,
                    span,
                )
            }
            ast::ExprKind::StructLiteral { type_name, fields } => {
                let resolved = if type_name.is_empty() {
                    String::new()
                } else {
                    self.resolve_type_name(type_name)
                };
                let fields = fields
                    .iter()
                    .map(|(name, value)| (name.clone(), self.lower_expr(value)))
                    .collect();
                let ty = if resolved.is_empty() {
                    Type::new(TypeKind::Inferred, span)
                } else {
                    Type::named(resolved.clone())
                };
                HirExpr::new(
                    HirExprKind::StructLit {
                        type_name: resolved,
                        fields,
                    },
                    ty,
                    span,
                )
            }
            ast::ExprKind::ArrayLiteral(elements) => {
                let elements: Vec<HirExpr> =
                    elements.iter().map(|e| self.lower_expr(e)).collect();
                let elem_ty = elements
                    .first()
                    .map(|e| e.ty.clone())
                    .unwrap_or_else(Type::int);
                let ty = Type::new(
                    TypeKind::Array {
                        elem: Box::new(elem_ty),
                        size: Some(ArraySize::Literal(elements.len() as u64)),
                    },
                    span,
                );
                HirExpr::new(HirExprKind::ArrayLit(elements), ty, span)
            }
            ast::ExprKind::Match(_) => {
                self.diagnostics.push(Diagnostic::error(
                    "`match` is only supported in statement position",
                    span,
                ));
                HirExpr::new(HirExprKind::Error, Type::new(TypeKind::Error, span), span)
            }
            ast::ExprKind::Ternary {
                cond,
                then_value,
                else_value,
            } => {
                let cond = self.lower_expr(cond);
                let then_value = self.lower_expr(then_value);
                let else_value = self.lower_expr(else_value);
                let ty = then_value.ty.clone();
                HirExpr::new(
                    HirExprKind::Ternary {
                        cond: Box::new(cond),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    ty,
                    span,
                )
            }
            ast::ExprKind::Cast { value, ty } => {
                let value = self.lower_expr(value);
                HirExpr::new(
                    HirExprKind::Cast {
                        value: Box::new(value),
                        ty: ty.clone(),
                    },
                    ty.clone(),
                    span,
                )
            }
            ast::ExprKind::Sizeof(ty) => {
                let size = self.layout.size_of(&self.resolve_type(ty));
                HirExpr::new(
                    HirExprKind::IntLit(size as i64),
                    Type::new(
                        TypeKind::Int {
                            width: ast::IntWidth::W64,
                            signed: true,
                        },
                        span,
                    ),
                    span,
                )
            }
            ast::ExprKind::Alignof(ty) => {
                let align = self.layout.align_of(&self.resolve_type(ty));
                HirExpr::new(
                    HirExprKind::IntLit(align as i64),
                    Type::new(
                        TypeKind::Int {
                            width: ast::IntWidth::W64,
                            signed: true,
                        },
                        span,
                    ),
                    span,
                )
            }
            ast::ExprKind::Move(inner) => {
                let inner = self.lower_expr(inner);
                let ty = inner.ty.clone();
                HirExpr::new(HirExprKind::Move(Box::new(inner)), ty, span)
            }
            ast::ExprKind::Error => {
                HirExpr::new(HirExprKind::Error, Type::new(TypeKind::Error, span), span)
            }
        }
    }

    fn lower_ident(&mut self, name: &str, span: Span) -> HirExpr {
        // Enum variant path used as a value: `E::A` without payload.
        if let Some((prefix, variant)) = name.rsplit_once("::") {
            let enum_name = self.resolve_type_name(prefix);
            if self.enum_defs.contains_key(&enum_name) {
                return HirExpr::new(
                    HirExprKind::EnumVariant {
                        enum_name: enum_name.clone(),
                        variant: variant.to_string(),
                        payload: Vec::new(),
                    },
                    Type::named(enum_name),
                    span,
                );
            }
        }

        let ty = self.var_type(name);
        HirExpr::var(name.to_string(), ty, span)
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        span: Span,
    ) -> HirExpr {
        let lhs = self.lower_expr(lhs);
        let rhs = self.lower_expr(rhs);

        // Operator overloading on struct operands.
        let lhs_type_name = self.resolve_type_name(lhs.ty.name());
        if !lhs_type_name.is_empty() && self.struct_defs.contains_key(&lhs_type_name) {
            if let Some(op_kind) = overload_kind(op) {
                if let Some(func) = self.find_impl_method(&lhs_type_name, op_kind.mangle()) {
                    let ret = self
                        .fn_sigs
                        .get(&func)
                        .map(|(_, ret, _)| ret.clone())
                        .unwrap_or_else(Type::void);
                    let recv = HirExpr::new(
                        HirExprKind::Unary {
                            op: UnaryOp::AddrOf,
                            operand: Box::new(lhs),
                        },
                        Type::new(TypeKind::Pointer(Box::new(Type::named(lhs_type_name))), span),
                        span,
                    );
                    return HirExpr::new(
                        HirExprKind::Call {
                            func,
                            type_args: Vec::new(),
                            args: vec![recv, rhs],
                        },
                        ret,
                        span,
                    );
                }
            }
        }

        let ty = match op {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::And
            | BinaryOp::Or => Type::bool(),
            _ => lhs.ty.clone(),
        };
        HirExpr::new(
            HirExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
            span,
        )
    }

    fn lower_unary(&mut self, op: ast::UnaryOp, operand: &ast::Expr, span: Span) -> HirExpr {
        // Increment/decrement desugar to read-modify-write assignments.
        if matches!(
            op,
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
        ) {
            let target = self.lower_expr(operand);
            let delta = if matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
                BinaryOp::Add
            } else {
                BinaryOp::Sub
            };
            let value = HirExpr::new(
                HirExprKind::Binary {
                    op: delta,
                    lhs: Box::new(target.clone()),
                    rhs: Box::new(HirExpr::int(1, span)),
                },
                target.ty.clone(),
                span,
            );
            let ty = target.ty.clone();
            return HirExpr::new(
                HirExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                ty,
                span,
            );
        }

        let operand = self.lower_expr(operand);
        let ty = match op {
            UnaryOp::Not => Type::bool(),
            UnaryOp::AddrOf => Type::new(TypeKind::Pointer(Box::new(operand.ty.clone())), span),
            UnaryOp::Deref => match &operand.ty.kind {
                TypeKind::Pointer(inner) | TypeKind::Reference(inner) => (**inner).clone(),
                _ => operand.ty.clone(),
            },
            _ => operand.ty.clone(),
        };
        HirExpr::new(
            HirExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        )
    }

    fn lower_call(
        &mut self,
        callee: &ast::Expr,
        type_args: &[Type],
        args: &[ast::Expr],
        span: Span,
    ) -> HirExpr {
        // Method call: `obj.m(args)`.
        if let ast::ExprKind::Member { object, name } = &callee.kind {
            return self.lower_method_call(object, name, args, span);
        }

        let ast::ExprKind::Ident(raw_name) = &callee.kind else {
            // Call through an arbitrary expression: function pointer.
            let callee = self.lower_expr(callee);
            let args: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
            let ret = match &callee.ty.kind {
                TypeKind::FunctionPointer { ret, .. } => (**ret).clone(),
                _ => Type::void(),
            };
            return HirExpr::new(
                HirExprKind::IndirectCall {
                    callee: Box::new(callee),
                    args,
                },
                ret,
                span,
            );
        };

        // Enum variant construction: `E::A(payload)`.
        if let Some((prefix, variant)) = raw_name.rsplit_once("::") {
            let enum_name = self.resolve_type_name(prefix);
            if self.enum_defs.contains_key(&enum_name) {
                let payload: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
                return HirExpr::new(
                    HirExprKind::EnumVariant {
                        enum_name: enum_name.clone(),
                        variant: variant.to_string(),
                        payload,
                    },
                    Type::named(enum_name),
                    span,
                );
            }
        }

        // Function pointer in a local.
        if let Some(var_ty) = self.lookup_var(raw_name) {
            if let TypeKind::FunctionPointer { ret, .. } = &var_ty.kind {
                let ret = (**ret).clone();
                let callee = HirExpr::var(raw_name.clone(), var_ty.clone(), span);
                let args: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
                return HirExpr::new(
                    HirExprKind::IndirectCall {
                        callee: Box::new(callee),
                        args,
                    },
                    ret,
                    span,
                );
            }
        }

        let func = self.resolve_function(raw_name);
        let args: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();

        // Return type: substitute explicit type arguments into a generic
        // signature when given.
        let ret = match self.fn_sigs.get(&func) {
            Some((_, ret, generics)) => {
                if !generics.is_empty() && generics.len() == type_args.len() {
                    let map: FxHashMap<&str, &Type> = generics
                        .iter()
                        .map(String::as_str)
                        .zip(type_args.iter())
                        .collect();
                    substitute_type(ret, &map)
                } else {
                    ret.clone()
                }
            }
            None => Type::void(),
        };

        HirExpr::new(
            HirExprKind::Call {
                func,
                type_args: type_args.to_vec(),
                args,
            },
            ret,
            span,
        )
    }

    fn lower_method_call(
        &mut self,
        object: &ast::Expr,
        method: &str,
        args: &[ast::Expr],
        span: Span,
    ) -> HirExpr {
        let object = self.lower_expr(object);
        let receiver_ty = deref_type(&object.ty);
        let type_name = self.resolve_type_name(receiver_ty.name());

        // Interface-typed receiver: dynamic dispatch.
        if self.interfaces.contains_key(&type_name) {
            let ret = self
                .interfaces
                .get(&type_name)
                .and_then(|iface| iface.methods.iter().find(|m| m.name == method))
                .map(|m| m.return_type.clone())
                .unwrap_or_else(Type::void);
            let args: Vec<HirExpr> = args.iter().map(|a| self.lower_expr(a)).collect();
            return HirExpr::new(
                HirExprKind::MethodCall {
                    receiver: Box::new(object),
                    interface: type_name,
                    method: method.to_string(),
                    args,
                },
                ret,
                span,
            );
        }

        // Concrete receiver: direct call to the impl method.
        if let Some(func) = self.find_impl_method(&type_name, method) {
            let ret = self
                .fn_sigs
                .get(&func)
                .map(|(_, ret, _)| ret.clone())
                .unwrap_or_else(Type::void);
            let receiver = if matches!(object.ty.kind, TypeKind::Pointer(_) | TypeKind::Reference(_))
            {
                object
            } else {
                let ptr_ty = Type::new(TypeKind::Pointer(Box::new(object.ty.clone())), span);
                HirExpr::new(
                    HirExprKind::Unary {
                        op: UnaryOp::AddrOf,
                        operand: Box::new(object),
                    },
                    ptr_ty,
                    span,
                )
            };
            let mut call_args = vec![receiver];
            call_args.extend(args.iter().map(|a| self.lower_expr(a)));
            return HirExpr::new(
                HirExprKind::Call {
                    func,
                    type_args: Vec::new(),
                    args: call_args,
                },
                ret,
                span,
            );
        }

        self.diagnostics.push(Diagnostic::error(
            format!("no method `{method}` on type `{}`", describe_type(&receiver_ty)),
            span,
        ));
        HirExpr::new(HirExprKind::Error, Type::new(TypeKind::Error, span), span)
    }

    fn lower_member(&mut self, object: &ast::Expr, name: &str, span: Span) -> HirExpr {
        let object = self.lower_expr(object);
        let receiver_ty = deref_type(&object.ty);
        let type_name = self.resolve_type_name(receiver_ty.name());

        let field_ty = self
            .struct_defs
            .get(&type_name)
            .and_then(|s| s.fields.iter().find(|f| f.name == name))
            .map(|f| f.ty.clone())
            .unwrap_or_else(|| Type::new(TypeKind::Inferred, span));

        HirExpr::new(
            HirExprKind::Member {
                object: Box::new(object),
                field: name.to_string(),
            },
            field_ty,
            span,
        )
    }

    // ── Resolution helpers ─────────────────────────────────────────────

    fn lookup_var(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn var_type(&self, name: &str) -> Type {
        if let Some(ty) = self.lookup_var(name) {
            return ty.clone();
        }
        if let Some(ty) = self.global_types.get(name) {
            return ty.clone();
        }
        // A function referenced as a value becomes a function pointer.
        let resolved = self.resolve_function(name);
        if let Some((params, ret, _)) = self.fn_sigs.get(&resolved) {
            return Type::new(
                TypeKind::FunctionPointer {
                    ret: Box::new(ret.clone()),
                    params: params.clone(),
                },
                Span::dummy(),
            );
        }
        Type::new(TypeKind::Inferred, Span::dummy())
    }

    /// Resolve a function reference: use-aliases first, then the namespace
    /// stack from innermost out, then the bare name.
    fn resolve_function(&self, name: &str) -> String {
        let name = self.apply_use_alias(name);
        for depth in (0..=self.namespace.len()).rev() {
            let candidate = if depth == 0 {
                name.clone()
            } else {
                format!("{}::{}", self.namespace[..depth].join("::"), name)
            };
            if self.fn_sigs.contains_key(&candidate) {
                return candidate;
            }
        }
        name
    }

    /// Resolve a type reference the same way, following typedef aliases.
    fn resolve_type_name(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }
        let name = self.apply_use_alias(name);
        for depth in (0..=self.namespace.len()).rev() {
            let candidate = if depth == 0 {
                name.clone()
            } else {
                format!("{}::{}", self.namespace[..depth].join("::"), name)
            };
            if self.struct_defs.contains_key(&candidate)
                || self.enum_defs.contains_key(&candidate)
                || self.interfaces.contains_key(&candidate)
            {
                return candidate;
            }
            if let Some(target) = self.typedefs.get(&candidate) {
                let target_name = target.name();
                if !target_name.is_empty() {
                    return self.resolve_type_name(target_name);
                }
                return candidate;
            }
        }
        name
    }

    fn resolve_type(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Named { name, type_args } => {
                let resolved = self.resolve_type_name(name);
                Type {
                    kind: TypeKind::Named {
                        name: resolved,
                        type_args: type_args.clone(),
                    },
                    is_const: ty.is_const,
                    span: ty.span,
                }
            }
            _ => ty.clone(),
        }
    }

    fn apply_use_alias(&self, name: &str) -> String {
        let (first, rest) = match name.split_once("::") {
            Some((f, r)) => (f, Some(r)),
            None => (name, None),
        };
        match self.use_aliases.get(first) {
            Some(target) => match rest {
                Some(rest) => format!("{target}::{rest}"),
                None => target.clone(),
            },
            None => name.to_string(),
        }
    }

    /// The mangled function for a method on a concrete type: inherent
    /// methods first, then any interface impl.
    fn find_impl_method(&self, type_name: &str, method: &str) -> Option<String> {
        if type_name.is_empty() {
            return None;
        }
        self.impl_methods
            .iter()
            .filter(|m| m.type_name == type_name && m.method == method)
            .min_by_key(|m| m.interface.is_some())
            .map(|m| m.mangled.clone())
    }

    fn element_type(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Array { elem, .. } => (**elem).clone(),
            TypeKind::Pointer(inner) | TypeKind::Reference(inner) => (**inner).clone(),
            _ => Type::new(TypeKind::Inferred, Span::dummy()),
        }
    }
}

// ── Free helpers ───────────────────────────────────────────────────────

/// The mangled name an impl method lowers to:
/// `T__m__I` for interface impls, `T__m` inherent, `T__ctor[_N]` and
/// `T__dtor` for constructors and destructors.
pub fn mangle_method(
    type_name: &str,
    interface: Option<&str>,
    method: &ast::FunctionDecl,
) -> String {
    match method.kind {
        ast::FunctionKind::Constructor => {
            if method.params.is_empty() {
                format!("{type_name}__ctor")
            } else {
                format!("{type_name}__ctor_{}", method.params.len())
            }
        }
        ast::FunctionKind::Destructor => format!("{type_name}__dtor"),
        _ => match interface {
            Some(iface) => format!("{type_name}__{}__{iface}", method.name),
            None => format!("{type_name}__{}", method.name),
        },
    }
}

/// `E::A` -> `A`.
fn variant_of(path: &str) -> String {
    path.rsplit("::").next().unwrap_or(path).to_string()
}

fn overload_kind(op: BinaryOp) -> Option<ast::OperatorKind> {
    use ast::OperatorKind as K;
    Some(match op {
        BinaryOp::Add => K::Add,
        BinaryOp::Sub => K::Sub,
        BinaryOp::Mul => K::Mul,
        BinaryOp::Div => K::Div,
        BinaryOp::Rem => K::Rem,
        BinaryOp::Eq => K::Eq,
        BinaryOp::Ne => K::Ne,
        BinaryOp::Lt => K::Lt,
        BinaryOp::Le => K::Le,
        BinaryOp::Gt => K::Gt,
        BinaryOp::Ge => K::Ge,
        _ => return None,
    })
}

fn deref_type(ty: &Type) -> Type {
    match &ty.kind {
        TypeKind::Pointer(inner) | TypeKind::Reference(inner) => (**inner).clone(),
        _ => ty.clone(),
    }
}

fn describe_type(ty: &Type) -> String {
    match &ty.kind {
        TypeKind::Named { name, .. } => name.clone(),
        other => format!("{other:?}"),
    }
}

/// Substitute generic parameter names in a type.
pub fn substitute_type(ty: &Type, map: &FxHashMap<&str, &Type>) -> Type {
    match &ty.kind {
        TypeKind::Named { name, type_args } => {
            if type_args.is_empty() {
                if let Some(replacement) = map.get(name.as_str()) {
                    return (*replacement).clone();
                }
            }
            Type {
                kind: TypeKind::Named {
                    name: name.clone(),
                    type_args: type_args.iter().map(|t| substitute_type(t, map)).collect(),
                },
                is_const: ty.is_const,
                span: ty.span,
            }
        }
        TypeKind::Pointer(inner) => Type {
            kind: TypeKind::Pointer(Box::new(substitute_type(inner, map))),
            is_const: ty.is_const,
            span: ty.span,
        },
        TypeKind::Reference(inner) => Type {
            kind: TypeKind::Reference(Box::new(substitute_type(inner, map))),
            is_const: ty.is_const,
            span: ty.span,
        },
        TypeKind::Array { elem, size } => Type {
            kind: TypeKind::Array {
                elem: Box::new(substitute_type(elem, map)),
                size: match size {
                    Some(ArraySize::Generic(name)) => match map.get(name.as_str()) {
                        Some(t) => match t.name().parse::<u64>() {
                            Ok(n) => Some(ArraySize::Literal(n)),
                            Err(_) => Some(ArraySize::Generic(name.clone())),
                        },
                        None => Some(ArraySize::Generic(name.clone())),
                    },
                    other => other.clone(),
                },
            },
            is_const: ty.is_const,
            span: ty.span,
        },
        TypeKind::FunctionPointer { ret, params } => Type {
            kind: TypeKind::FunctionPointer {
                ret: Box::new(substitute_type(ret, map)),
                params: params.iter().map(|t| substitute_type(t, map)).collect(),
            },
            is_const: ty.is_const,
            span: ty.span,
        },
        _ => ty.clone(),
    }
}

/// Replace every `Var(name)` with a replacement expression. Used for guard
/// substitution in match lowering.
fn substitute_var(expr: &mut HirExpr, name: &str, replacement: &HirExpr) {
    if let HirExprKind::Var(var) = &expr.kind {
        if var == name {
            *expr = replacement.clone();
            return;
        }
    }
    match &mut expr.kind {
        HirExprKind::Binary { lhs, rhs, .. } => {
            substitute_var(lhs, name, replacement);
            substitute_var(rhs, name, replacement);
        }
        HirExprKind::Unary { operand, .. } | HirExprKind::Move(operand) => {
            substitute_var(operand, name, replacement);
        }
        HirExprKind::Assign { target, value } => {
            substitute_var(target, name, replacement);
            substitute_var(value, name, replacement);
        }
        HirExprKind::Call { args, .. } => {
            for arg in args {
                substitute_var(arg, name, replacement);
            }
        }
        HirExprKind::MethodCall { receiver, args, .. } => {
            substitute_var(receiver, name, replacement);
            for arg in args {
                substitute_var(arg, name, replacement);
            }
        }
        HirExprKind::IndirectCall { callee, args } => {
            substitute_var(callee, name, replacement);
            for arg in args {
                substitute_var(arg, name, replacement);
            }
        }
        HirExprKind::Member { object, .. } => substitute_var(object, name, replacement),
        HirExprKind::Index { object, index } => {
            substitute_var(object, name, replacement);
            substitute_var(index, name, replacement);
        }
        HirExprKind::StructLit { fields, .. } => {
            for (_, value) in fields {
                substitute_var(value, name, replacement);
            }
        }
        HirExprKind::ArrayLit(elements) => {
            for e in elements {
                substitute_var(e, name, replacement);
            }
        }
        HirExprKind::Ternary {
            cond,
            then_value,
            else_value,
        } => {
            substitute_var(cond, name, replacement);
            substitute_var(then_value, name, replacement);
            substitute_var(else_value, name, replacement);
        }
        HirExprKind::Cast { value, .. } => substitute_var(value, name, replacement),
        HirExprKind::EnumVariant { payload, .. } => {
            for p in payload {
                substitute_var(p, name, replacement);
            }
        }
        HirExprKind::EnumIs { scrutinee, .. } | HirExprKind::EnumPayload { scrutinee, .. } => {
            substitute_var(scrutinee, name, replacement);
        }
        _ => {}
    }
}
