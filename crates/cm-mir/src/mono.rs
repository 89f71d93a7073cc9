//! Monomorphization.
//!
//! Runs on HIR, just before MIR lowering: every call to a generic function
//! reachable from the concrete entry set produces exactly one specialized
//! copy per distinct type-argument tuple, named deterministically
//! (`id__T=Int`, `pair__T=Int_U=String`). Generic struct and enum
//! instantiations rewrite to flattened copies (`Pair_Int`). Unreachable
//! generic definitions produce no output.
//!
//! A mangled-name collision between two distinct instantiation keys is an
//! internal error: the mangling is supposed to be injective.

use rustc_hash::FxHashMap;

use cm_common::error::InternalError;
use cm_hir::{
    substitute_type, HirEnum, HirExpr, HirExprKind, HirFunction, HirLet, HirProgram, HirStmt,
    HirStruct, HirSwitchCase, HirSwitchPattern,
};
use cm_parser::ast::{ArraySize, GenericParams, Type, TypeKind};

type TypeMap = FxHashMap<String, Type>;

/// Monomorphize a lowered program. The result contains no generic
/// functions, no generic type references, and no explicit type arguments.
pub fn monomorphize(hir: &HirProgram) -> Result<HirProgram, InternalError> {
    let mut mono = Mono::new(hir);
    mono.run()?;
    Ok(mono.out)
}

/// Mangled suffix for one type argument.
fn type_suffix(ty: &Type) -> String {
    match &ty.kind {
        TypeKind::Bool => "Bool".into(),
        TypeKind::Int { width, signed } => {
            let base = match width.size() {
                1 => "Tiny",
                2 => "Short",
                4 => "Int",
                _ => "Long",
            };
            if *signed {
                base.to_string()
            } else {
                format!("U{}", base.to_lowercase())
            }
        }
        TypeKind::Float32 => "Float".into(),
        TypeKind::Float64 => "Double".into(),
        TypeKind::Char => "Char".into(),
        TypeKind::String => "String".into(),
        TypeKind::CString => "CString".into(),
        TypeKind::Void => "Void".into(),
        TypeKind::Pointer(inner) => format!("Ptr{}", type_suffix(inner)),
        TypeKind::Reference(inner) => format!("Ref{}", type_suffix(inner)),
        TypeKind::Array { elem, size } => match size {
            Some(ArraySize::Literal(n)) => format!("Arr{n}{}", type_suffix(elem)),
            _ => format!("Slice{}", type_suffix(elem)),
        },
        TypeKind::Named { name, type_args } => {
            let mut out = name.replace("::", "_");
            for arg in type_args {
                out.push('_');
                out.push_str(&type_suffix(arg));
            }
            out
        }
        _ => "Unknown".into(),
    }
}

/// The deterministic specialized name for a generic function instantiation.
fn mangle_instance(func: &str, generics: &[String], bindings: &TypeMap) -> String {
    let mut name = format!("{func}_");
    for g in generics {
        let suffix = bindings
            .get(g)
            .map(type_suffix)
            .unwrap_or_else(|| "Unknown".into());
        name.push_str(&format!("_{g}={suffix}"));
    }
    name
}

struct Mono<'a> {
    source: &'a HirProgram,
    generic_fns: FxHashMap<String, &'a HirFunction>,
    generic_structs: FxHashMap<String, &'a HirStruct>,
    generic_enums: FxHashMap<String, &'a HirEnum>,
    out: HirProgram,
    /// Specialized function name -> instantiation key, for collision checks.
    emitted: FxHashMap<String, String>,
    emitted_types: FxHashMap<String, String>,
    pending: Vec<HirFunction>,
}

impl<'a> Mono<'a> {
    fn new(source: &'a HirProgram) -> Self {
        let mut generic_fns = FxHashMap::default();
        let mut generic_structs = FxHashMap::default();
        let mut generic_enums = FxHashMap::default();
        for f in &source.functions {
            if !f.generics.is_empty() {
                generic_fns.insert(f.name.clone(), f);
            }
        }
        for s in &source.structs {
            if !s.generics.is_empty() {
                generic_structs.insert(s.name.clone(), s);
            }
        }
        for e in &source.enums {
            if !e.generics.is_empty() {
                generic_enums.insert(e.name.clone(), e);
            }
        }
        Self {
            source,
            generic_fns,
            generic_structs,
            generic_enums,
            out: HirProgram::default(),
            emitted: FxHashMap::default(),
            emitted_types: FxHashMap::default(),
            pending: Vec::new(),
        }
    }

    fn run(&mut self) -> Result<(), InternalError> {
        let source = self.source;

        // Non-generic definitions carry over; generic ones are emitted only
        // on demand.
        self.out.interfaces = source.interfaces.clone();
        self.out.impls = source.impls.clone();
        self.out.externs = source.externs.clone();

        for s in &source.structs {
            if s.generics.is_empty() {
                let mut s = s.clone();
                for (_, ty) in &mut s.fields {
                    *ty = self.normalize_type(ty)?;
                }
                self.out.structs.push(s);
            }
        }
        for e in &source.enums {
            if e.generics.is_empty() {
                let mut e = e.clone();
                for member in &mut e.members {
                    for ty in &mut member.fields {
                        *ty = self.normalize_type(ty)?;
                    }
                }
                self.out.enums.push(e);
            }
        }
        for g in &source.globals {
            let mut g = g.clone();
            g.ty = self.normalize_type(&g.ty)?;
            g.init = match g.init.take() {
                Some(init) => Some(self.rewrite_expr(init)?),
                None => None,
            };
            self.out.globals.push(g);
        }

        // Seed the work-list with every concrete function (the entry set:
        // `main`, exports, and everything else the interpreter may reach).
        for f in &source.functions {
            if f.generics.is_empty() {
                self.pending.push(f.clone());
            }
        }

        while let Some(func) = self.pending.pop() {
            let rewritten = self.rewrite_function(func)?;
            self.out.functions.push(rewritten);
        }

        Ok(())
    }

    // ── Function rewriting ─────────────────────────────────────────────

    fn rewrite_function(&mut self, mut f: HirFunction) -> Result<HirFunction, InternalError> {
        for (_, ty) in &mut f.params {
            *ty = self.normalize_type(ty)?;
        }
        f.return_type = self.normalize_type(&f.return_type)?;
        f.body = f
            .body
            .into_iter()
            .map(|s| self.rewrite_stmt(s))
            .collect::<Result<_, _>>()?;
        Ok(f)
    }

    fn rewrite_stmt(&mut self, stmt: HirStmt) -> Result<HirStmt, InternalError> {
        Ok(match stmt {
            HirStmt::Let(mut l) => {
                l.ty = self.normalize_type(&l.ty)?;
                l.init = self.rewrite_opt(l.init)?;
                l.ctor_call = self.rewrite_opt(l.ctor_call)?;
                // A literal of a generic struct takes the declaration's
                // specialized name.
                if let Some(init) = &mut l.init {
                    if let HirExprKind::StructLit { type_name, .. } = &mut init.kind {
                        if self.generic_structs.contains_key(type_name.as_str()) {
                            if let TypeKind::Named { name, .. } = &l.ty.kind {
                                *type_name = name.clone();
                                init.ty = l.ty.clone();
                            }
                        }
                    }
                }
                HirStmt::Let(l)
            }
            HirStmt::Return(value, span) => {
                HirStmt::Return(self.rewrite_opt(value)?, span)
            }
            HirStmt::If {
                cond,
                then_block,
                else_block,
            } => HirStmt::If {
                cond: self.rewrite_expr(cond)?,
                then_block: self.rewrite_stmts(then_block)?,
                else_block: self.rewrite_stmts(else_block)?,
            },
            HirStmt::While { cond, body } => HirStmt::While {
                cond: self.rewrite_expr(cond)?,
                body: self.rewrite_stmts(body)?,
            },
            HirStmt::For {
                init,
                cond,
                update,
                body,
            } => HirStmt::For {
                init: match init {
                    Some(s) => Some(Box::new(self.rewrite_stmt(*s)?)),
                    None => None,
                },
                cond: self.rewrite_opt(cond)?,
                update: self.rewrite_opt(update)?,
                body: self.rewrite_stmts(body)?,
            },
            HirStmt::Switch { expr, cases } => HirStmt::Switch {
                expr: self.rewrite_expr(expr)?,
                cases: cases
                    .into_iter()
                    .map(|c| {
                        Ok(HirSwitchCase {
                            pattern: match c.pattern {
                                Some(p) => Some(self.rewrite_pattern(p)?),
                                None => None,
                            },
                            stmts: self.rewrite_stmts(c.stmts)?,
                        })
                    })
                    .collect::<Result<_, InternalError>>()?,
            },
            HirStmt::Block(body) => HirStmt::Block(self.rewrite_stmts(body)?),
            HirStmt::Defer(inner) => HirStmt::Defer(Box::new(self.rewrite_stmt(*inner)?)),
            HirStmt::MustBlock { body, span } => HirStmt::MustBlock {
                body: self.rewrite_stmts(body)?,
                span,
            },
            HirStmt::Expr(expr) => HirStmt::Expr(self.rewrite_expr(expr)?),
            other @ (HirStmt::Break | HirStmt::Continue | HirStmt::Asm(_)) => other,
        })
    }

    fn rewrite_pattern(&mut self, p: HirSwitchPattern) -> Result<HirSwitchPattern, InternalError> {
        Ok(match p {
            HirSwitchPattern::Value(v) => HirSwitchPattern::Value(self.rewrite_expr(v)?),
            HirSwitchPattern::Range {
                start,
                end,
                inclusive,
            } => HirSwitchPattern::Range {
                start: self.rewrite_expr(start)?,
                end: self.rewrite_expr(end)?,
                inclusive,
            },
            HirSwitchPattern::Or(ps) => HirSwitchPattern::Or(
                ps.into_iter()
                    .map(|p| self.rewrite_pattern(p))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    fn rewrite_stmts(&mut self, stmts: Vec<HirStmt>) -> Result<Vec<HirStmt>, InternalError> {
        stmts.into_iter().map(|s| self.rewrite_stmt(s)).collect()
    }

    fn rewrite_opt(&mut self, expr: Option<HirExpr>) -> Result<Option<HirExpr>, InternalError> {
        Ok(match expr {
            Some(e) => Some(self.rewrite_expr(e)?),
            None => None,
        })
    }

    fn rewrite_expr(&mut self, mut expr: HirExpr) -> Result<HirExpr, InternalError> {
        expr.ty = self.normalize_type(&expr.ty)?;
        expr.kind = match expr.kind {
            HirExprKind::Call {
                func,
                type_args,
                args,
            } => {
                let args: Vec<HirExpr> = args
                    .into_iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<Result<_, _>>()?;

                if let Some(generic) = self.generic_fns.get(func.as_str()).copied() {
                    let bindings = self.bind_type_args(generic, &type_args, &args)?;
                    let specialized = self.instantiate_function(generic, &bindings)?;
                    HirExprKind::Call {
                        func: specialized,
                        type_args: Vec::new(),
                        args,
                    }
                } else {
                    HirExprKind::Call {
                        func,
                        type_args: Vec::new(),
                        args,
                    }
                }
            }
            HirExprKind::Binary { op, lhs, rhs } => HirExprKind::Binary {
                op,
                lhs: Box::new(self.rewrite_expr(*lhs)?),
                rhs: Box::new(self.rewrite_expr(*rhs)?),
            },
            HirExprKind::Unary { op, operand } => HirExprKind::Unary {
                op,
                operand: Box::new(self.rewrite_expr(*operand)?),
            },
            HirExprKind::Assign { target, value } => HirExprKind::Assign {
                target: Box::new(self.rewrite_expr(*target)?),
                value: Box::new(self.rewrite_expr(*value)?),
            },
            HirExprKind::MethodCall {
                receiver,
                interface,
                method,
                args,
            } => HirExprKind::MethodCall {
                receiver: Box::new(self.rewrite_expr(*receiver)?),
                interface,
                method,
                args: args
                    .into_iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<Result<_, _>>()?,
            },
            HirExprKind::IndirectCall { callee, args } => HirExprKind::IndirectCall {
                callee: Box::new(self.rewrite_expr(*callee)?),
                args: args
                    .into_iter()
                    .map(|a| self.rewrite_expr(a))
                    .collect::<Result<_, _>>()?,
            },
            HirExprKind::Member { object, field } => HirExprKind::Member {
                object: Box::new(self.rewrite_expr(*object)?),
                field,
            },
            HirExprKind::Index { object, index } => HirExprKind::Index {
                object: Box::new(self.rewrite_expr(*object)?),
                index: Box::new(self.rewrite_expr(*index)?),
            },
            HirExprKind::StructLit { type_name, fields } => {
                // Generic struct literals pick up the specialized name
                // through the expression's normalized type.
                let type_name = match &expr.ty.kind {
                    TypeKind::Named { name, .. } if !name.is_empty() => name.clone(),
                    _ => type_name,
                };
                HirExprKind::StructLit {
                    type_name,
                    fields: fields
                        .into_iter()
                        .map(|(n, v)| Ok((n, self.rewrite_expr(v)?)))
                        .collect::<Result<_, InternalError>>()?,
                }
            }
            HirExprKind::ArrayLit(elems) => HirExprKind::ArrayLit(
                elems
                    .into_iter()
                    .map(|e| self.rewrite_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            HirExprKind::Ternary {
                cond,
                then_value,
                else_value,
            } => HirExprKind::Ternary {
                cond: Box::new(self.rewrite_expr(*cond)?),
                then_value: Box::new(self.rewrite_expr(*then_value)?),
                else_value: Box::new(self.rewrite_expr(*else_value)?),
            },
            HirExprKind::Cast { value, ty } => HirExprKind::Cast {
                value: Box::new(self.rewrite_expr(*value)?),
                ty: self.normalize_type(&ty)?,
            },
            HirExprKind::EnumVariant {
                enum_name,
                variant,
                payload,
            } => HirExprKind::EnumVariant {
                enum_name,
                variant,
                payload: payload
                    .into_iter()
                    .map(|p| self.rewrite_expr(p))
                    .collect::<Result<_, _>>()?,
            },
            HirExprKind::EnumIs {
                scrutinee,
                enum_name,
                variant,
            } => HirExprKind::EnumIs {
                scrutinee: Box::new(self.rewrite_expr(*scrutinee)?),
                enum_name,
                variant,
            },
            HirExprKind::EnumPayload {
                scrutinee,
                enum_name,
                variant,
            } => HirExprKind::EnumPayload {
                scrutinee: Box::new(self.rewrite_expr(*scrutinee)?),
                enum_name,
                variant,
            },
            HirExprKind::Move(inner) => {
                HirExprKind::Move(Box::new(self.rewrite_expr(*inner)?))
            }
            other => other,
        };
        Ok(expr)
    }

    // ── Instantiation ──────────────────────────────────────────────────

    /// Bind a generic function's parameters from explicit type arguments or
    /// by structural inference from the argument types.
    fn bind_type_args(
        &mut self,
        generic: &HirFunction,
        type_args: &[Type],
        args: &[HirExpr],
    ) -> Result<TypeMap, InternalError> {
        let names = &generic.generics.names;
        let mut map = TypeMap::default();

        if !type_args.is_empty() {
            if type_args.len() != names.len() {
                return Err(InternalError::new(format!(
                    "wrong number of type arguments for `{}`: expected {}, found {}",
                    generic.name,
                    names.len(),
                    type_args.len()
                )));
            }
            for (name, arg) in names.iter().zip(type_args) {
                map.insert(name.clone(), self.normalize_type(arg)?);
            }
            return Ok(map);
        }

        for ((_, param_ty), arg) in generic.params.iter().zip(args) {
            infer_bindings(param_ty, &arg.ty, names, &mut map);
        }

        if map.len() != names.len() {
            let missing: Vec<&String> =
                names.iter().filter(|n| !map.contains_key(*n)).collect();
            return Err(InternalError::new(format!(
                "cannot infer type arguments {:?} for call to `{}`",
                missing, generic.name
            )));
        }
        Ok(map)
    }

    /// Produce (or reuse) the specialized copy of a generic function.
    fn instantiate_function(
        &mut self,
        generic: &HirFunction,
        bindings: &TypeMap,
    ) -> Result<String, InternalError> {
        let specialized = mangle_instance(&generic.name, &generic.generics.names, bindings);
        let key = format!("{}<{:?}>", generic.name, {
            let mut parts: Vec<String> = bindings
                .iter()
                .map(|(k, v)| format!("{k}={}", type_suffix(v)))
                .collect();
            parts.sort();
            parts
        });

        if let Some(existing) = self.emitted.get(&specialized) {
            if *existing != key {
                return Err(InternalError::new(format!(
                    "monomorphization name collision: `{specialized}`"
                )));
            }
            return Ok(specialized);
        }
        self.emitted.insert(specialized.clone(), key);

        let mut instance = generic.clone();
        instance.name = specialized.clone();
        instance.generics = GenericParams::default();
        substitute_in_function(&mut instance, bindings);
        // The freshly substituted body may itself call generics; queue it
        // for another rewrite round.
        self.pending.push(instance);

        Ok(specialized)
    }

    /// Rewrite a type, flattening generic struct/enum instantiations to
    /// specialized copies.
    fn normalize_type(&mut self, ty: &Type) -> Result<Type, InternalError> {
        Ok(match &ty.kind {
            TypeKind::Named { name, type_args } if !type_args.is_empty() => {
                let args: Vec<Type> = type_args
                    .iter()
                    .map(|t| self.normalize_type(t))
                    .collect::<Result<_, _>>()?;
                let flat = {
                    let mut out = name.replace("::", "_");
                    for a in &args {
                        out.push('_');
                        out.push_str(&type_suffix(a));
                    }
                    out
                };
                self.instantiate_type(name, &args, &flat)?;
                Type {
                    kind: TypeKind::Named {
                        name: flat,
                        type_args: Vec::new(),
                    },
                    is_const: ty.is_const,
                    span: ty.span,
                }
            }
            TypeKind::Pointer(inner) => Type {
                kind: TypeKind::Pointer(Box::new(self.normalize_type(inner)?)),
                is_const: ty.is_const,
                span: ty.span,
            },
            TypeKind::Reference(inner) => Type {
                kind: TypeKind::Reference(Box::new(self.normalize_type(inner)?)),
                is_const: ty.is_const,
                span: ty.span,
            },
            TypeKind::Array { elem, size } => Type {
                kind: TypeKind::Array {
                    elem: Box::new(self.normalize_type(elem)?),
                    size: size.clone(),
                },
                is_const: ty.is_const,
                span: ty.span,
            },
            TypeKind::FunctionPointer { ret, params } => Type {
                kind: TypeKind::FunctionPointer {
                    ret: Box::new(self.normalize_type(ret)?),
                    params: params
                        .iter()
                        .map(|p| self.normalize_type(p))
                        .collect::<Result<_, _>>()?,
                },
                is_const: ty.is_const,
                span: ty.span,
            },
            _ => ty.clone(),
        })
    }

    /// Emit the specialized copy of a generic struct or enum, once.
    fn instantiate_type(
        &mut self,
        base: &str,
        args: &[Type],
        flat: &str,
    ) -> Result<(), InternalError> {
        let key = format!("{base}<{}>", args.iter().map(type_suffix).collect::<Vec<_>>().join(","));
        if let Some(existing) = self.emitted_types.get(flat) {
            if *existing != key {
                return Err(InternalError::new(format!(
                    "monomorphization name collision: type `{flat}`"
                )));
            }
            return Ok(());
        }

        if let Some(&generic) = self.generic_structs.get(base) {
            self.emitted_types.insert(flat.to_string(), key);
            let map = zip_bindings(&generic.generics.names, args);
            let mut s = generic.clone();
            s.name = flat.to_string();
            s.generics = GenericParams::default();
            for (_, ty) in &mut s.fields {
                let substituted = apply_bindings(ty, &map);
                *ty = self.normalize_type(&substituted)?;
            }
            self.out.structs.push(s);
        } else if let Some(&generic) = self.generic_enums.get(base) {
            self.emitted_types.insert(flat.to_string(), key);
            let map = zip_bindings(&generic.generics.names, args);
            let mut e = generic.clone();
            e.name = flat.to_string();
            e.generics = GenericParams::default();
            for member in &mut e.members {
                for ty in &mut member.fields {
                    let substituted = apply_bindings(ty, &map);
                    *ty = self.normalize_type(&substituted)?;
                }
            }
            self.out.enums.push(e);
        }
        Ok(())
    }
}

// ── Substitution ───────────────────────────────────────────────────────

fn zip_bindings(names: &[String], args: &[Type]) -> TypeMap {
    names
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

fn apply_bindings(ty: &Type, map: &TypeMap) -> Type {
    let refs: FxHashMap<&str, &Type> = map.iter().map(|(k, v)| (k.as_str(), v)).collect();
    substitute_type(ty, &refs)
}

/// Structurally match a parameter type against an argument type, collecting
/// bindings for generic parameter names.
fn infer_bindings(param: &Type, arg: &Type, generics: &[String], map: &mut TypeMap) {
    match (&param.kind, &arg.kind) {
        (TypeKind::Named { name, type_args }, _)
            if type_args.is_empty() && generics.contains(name) =>
        {
            map.entry(name.clone()).or_insert_with(|| arg.clone());
        }
        (TypeKind::Pointer(p), TypeKind::Pointer(a))
        | (TypeKind::Reference(p), TypeKind::Reference(a)) => {
            infer_bindings(p, a, generics, map);
        }
        (TypeKind::Array { elem: p, .. }, TypeKind::Array { elem: a, .. }) => {
            infer_bindings(p, a, generics, map);
        }
        (
            TypeKind::Named {
                name: pn,
                type_args: pa,
            },
            TypeKind::Named {
                name: an,
                type_args: aa,
            },
        ) if pn == an && pa.len() == aa.len() => {
            for (p, a) in pa.iter().zip(aa) {
                infer_bindings(p, a, generics, map);
            }
        }
        (
            TypeKind::FunctionPointer { ret: pr, params: pp },
            TypeKind::FunctionPointer { ret: ar, params: ap },
        ) if pp.len() == ap.len() => {
            infer_bindings(pr, ar, generics, map);
            for (p, a) in pp.iter().zip(ap) {
                infer_bindings(p, a, generics, map);
            }
        }
        _ => {}
    }
}

/// Substitute generic bindings through a whole function: parameter and
/// return types, and every type and `sizeof`-style constant inside the body.
/// Const-value bindings also replace `Var(N)` references with the literal.
fn substitute_in_function(f: &mut HirFunction, map: &TypeMap) {
    for (_, ty) in &mut f.params {
        *ty = apply_bindings(ty, map);
    }
    f.return_type = apply_bindings(&f.return_type, map);
    for stmt in &mut f.body {
        substitute_in_stmt(stmt, map);
    }
}

fn substitute_in_stmt(stmt: &mut HirStmt, map: &TypeMap) {
    match stmt {
        HirStmt::Let(HirLet { ty, init, ctor_call, .. }) => {
            *ty = apply_bindings(ty, map);
            if let Some(init) = init {
                substitute_in_expr(init, map);
            }
            if let Some(ctor) = ctor_call {
                substitute_in_expr(ctor, map);
            }
        }
        HirStmt::Return(value, _) => {
            if let Some(value) = value {
                substitute_in_expr(value, map);
            }
        }
        HirStmt::If {
            cond,
            then_block,
            else_block,
        } => {
            substitute_in_expr(cond, map);
            for s in then_block.iter_mut().chain(else_block) {
                substitute_in_stmt(s, map);
            }
        }
        HirStmt::While { cond, body } => {
            substitute_in_expr(cond, map);
            for s in body {
                substitute_in_stmt(s, map);
            }
        }
        HirStmt::For {
            init,
            cond,
            update,
            body,
        } => {
            if let Some(init) = init {
                substitute_in_stmt(init, map);
            }
            if let Some(cond) = cond {
                substitute_in_expr(cond, map);
            }
            if let Some(update) = update {
                substitute_in_expr(update, map);
            }
            for s in body {
                substitute_in_stmt(s, map);
            }
        }
        HirStmt::Switch { expr, cases } => {
            substitute_in_expr(expr, map);
            for case in cases {
                if let Some(pattern) = &mut case.pattern {
                    substitute_in_pattern(pattern, map);
                }
                for s in &mut case.stmts {
                    substitute_in_stmt(s, map);
                }
            }
        }
        HirStmt::Block(body) | HirStmt::MustBlock { body, .. } => {
            for s in body {
                substitute_in_stmt(s, map);
            }
        }
        HirStmt::Defer(inner) => substitute_in_stmt(inner, map),
        HirStmt::Expr(expr) => substitute_in_expr(expr, map),
        HirStmt::Break | HirStmt::Continue | HirStmt::Asm(_) => {}
    }
}

fn substitute_in_pattern(pattern: &mut HirSwitchPattern, map: &TypeMap) {
    match pattern {
        HirSwitchPattern::Value(v) => substitute_in_expr(v, map),
        HirSwitchPattern::Range { start, end, .. } => {
            substitute_in_expr(start, map);
            substitute_in_expr(end, map);
        }
        HirSwitchPattern::Or(ps) => {
            for p in ps {
                substitute_in_pattern(p, map);
            }
        }
    }
}

fn substitute_in_expr(expr: &mut HirExpr, map: &TypeMap) {
    expr.ty = apply_bindings(&expr.ty, map);

    // A const-value generic used as an expression becomes its literal.
    if let HirExprKind::Var(name) = &expr.kind {
        if let Some(bound) = map.get(name) {
            if let Ok(value) = bound.name().parse::<i64>() {
                expr.kind = HirExprKind::IntLit(value);
                return;
            }
        }
    }

    match &mut expr.kind {
        HirExprKind::Binary { lhs, rhs, .. } => {
            substitute_in_expr(lhs, map);
            substitute_in_expr(rhs, map);
        }
        HirExprKind::Unary { operand, .. } | HirExprKind::Move(operand) => {
            substitute_in_expr(operand, map);
        }
        HirExprKind::Assign { target, value } => {
            substitute_in_expr(target, map);
            substitute_in_expr(value, map);
        }
        HirExprKind::Call {
            type_args, args, ..
        } => {
            for ty in type_args {
                *ty = apply_bindings(ty, map);
            }
            for arg in args {
                substitute_in_expr(arg, map);
            }
        }
        HirExprKind::MethodCall { receiver, args, .. } => {
            substitute_in_expr(receiver, map);
            for arg in args {
                substitute_in_expr(arg, map);
            }
        }
        HirExprKind::IndirectCall { callee, args } => {
            substitute_in_expr(callee, map);
            for arg in args {
                substitute_in_expr(arg, map);
            }
        }
        HirExprKind::Member { object, .. } => substitute_in_expr(object, map),
        HirExprKind::Index { object, index } => {
            substitute_in_expr(object, map);
            substitute_in_expr(index, map);
        }
        HirExprKind::StructLit { fields, .. } => {
            for (_, value) in fields {
                substitute_in_expr(value, map);
            }
        }
        HirExprKind::ArrayLit(elems) => {
            for e in elems {
                substitute_in_expr(e, map);
            }
        }
        HirExprKind::Ternary {
            cond,
            then_value,
            else_value,
        } => {
            substitute_in_expr(cond, map);
            substitute_in_expr(then_value, map);
            substitute_in_expr(else_value, map);
        }
        HirExprKind::Cast { value, ty } => {
            substitute_in_expr(value, map);
            *ty = apply_bindings(ty, map);
        }
        HirExprKind::EnumVariant { payload, .. } => {
            for p in payload {
                substitute_in_expr(p, map);
            }
        }
        HirExprKind::EnumIs { scrutinee, .. } | HirExprKind::EnumPayload { scrutinee, .. } => {
            substitute_in_expr(scrutinee, map);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_hir::HirLowering;
    use cm_parser::parse_source;

    fn mono(source: &str) -> HirProgram {
        let (program, diags) = parse_source(source, "test.cm");
        assert!(diags.is_empty(), "parse: {diags:?}");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        monomorphize(&hir).unwrap()
    }

    #[test]
    fn generic_identity_produces_one_instance() {
        let out = mono("<T> T id(T x) { return x; }\nint main() { return id<int>(7); }");
        let names: Vec<&str> = out.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"id__T=Int"), "{names:?}");
        assert!(names.contains(&"main"));
        // The generic template itself is not emitted.
        assert!(!names.contains(&"id"));

        // The call site was rewritten.
        let main = out.function("main").unwrap();
        let HirStmt::Return(Some(expr), _) = &main.body[0] else {
            panic!("expected return");
        };
        let HirExprKind::Call { func, type_args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(func, "id__T=Int");
        assert!(type_args.is_empty());
    }

    #[test]
    fn same_tuple_instantiates_once() {
        let out = mono(
            "<T> T id(T x) { return x; }\nint main() { int a = id<int>(1); int b = id<int>(2); return a + b; }",
        );
        let count = out
            .functions
            .iter()
            .filter(|f| f.name == "id__T=Int")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn distinct_tuples_instantiate_separately() {
        let out = mono(
            "<T> T id(T x) { return x; }\nint main() { int a = id<int>(1); long b = id<long>(2); return a; }",
        );
        let names: Vec<&str> = out.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"id__T=Int"));
        assert!(names.contains(&"id__T=Long"));
    }

    #[test]
    fn inference_from_argument_types() {
        let out = mono("<T> T first(T a, T b) { return a; }\nint main() { return first(1, 2); }");
        let main = out.function("main").unwrap();
        let HirStmt::Return(Some(expr), _) = &main.body[0] else {
            panic!()
        };
        let HirExprKind::Call { func, .. } = &expr.kind else {
            panic!()
        };
        assert_eq!(func, "first__T=Int");
    }

    #[test]
    fn generic_chain_is_followed() {
        let out = mono(
            "<T> T inner(T x) { return x; }\n<T> T outer(T x) { return inner(x); }\nint main() { return outer<int>(3); }",
        );
        let names: Vec<&str> = out.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"outer__T=Int"), "{names:?}");
        assert!(names.contains(&"inner__T=Int"), "{names:?}");
    }

    #[test]
    fn unreachable_generics_emit_nothing() {
        let out = mono("<T> T unused(T x) { return x; }\nint main() { return 0; }");
        assert_eq!(out.functions.len(), 1);
        assert_eq!(out.functions[0].name, "main");
    }

    #[test]
    fn generic_struct_instantiation_flattens() {
        let out = mono(
            "struct Pair<T> { T first; T second; }\nint main() { Pair<int> p = Pair { first: 1, second: 2 }; return p.first; }",
        );
        let names: Vec<&str> = out.structs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Pair_Int"), "{names:?}");
        // No generic struct survives.
        assert!(out.structs.iter().all(|s| s.generics.is_empty()));
    }

    #[test]
    fn body_types_are_substituted() {
        let out = mono("<T> T id(T x) { T y = x; return y; }\nint main() { return id<int>(5); }");
        let inst = out.function("id__T=Int").unwrap();
        let HirStmt::Let(l) = &inst.body[0] else {
            panic!()
        };
        assert!(
            matches!(l.ty.kind, TypeKind::Int { .. }),
            "let type should be substituted, got {:?}",
            l.ty.kind
        );
        assert!(matches!(inst.return_type.kind, TypeKind::Int { .. }));
    }
}
