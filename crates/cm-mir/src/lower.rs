//! HIR-to-MIR lowering.
//!
//! Flattens the (already monomorphic) HIR into basic blocks of
//! three-address instructions. Aggregates are built with `Aggregate`
//! instructions, field and element access goes through `gep` + `load` /
//! `store`, interface calls become `CallVirtual` with their vtable slot,
//! `defer`s are emitted LIFO on every return path, and `must` regions mark
//! each instruction they cover.

use rustc_hash::FxHashMap;

use cm_common::error::InternalError;
use cm_common::Span;
use cm_hir::layout::LayoutEngine;
use cm_hir::{
    BinaryOp, HirExpr, HirExprKind, HirFunction, HirProgram, HirStmt, HirSwitchCase,
    HirSwitchPattern, UnaryOp,
};
use cm_parser::ast::{ArraySize, Type, TypeKind};

use crate::*;

/// Lower a monomorphic HIR program to MIR.
pub fn lower_program(hir: &HirProgram) -> Result<MirProgram, InternalError> {
    let ctx = ProgramCtx::new(hir);
    let mut program = MirProgram::default();

    // Struct and enum layouts.
    for s in &hir.structs {
        let field_types: Vec<Type> = s.fields.iter().map(|(_, t)| t.clone()).collect();
        let (offsets, size, align) = ctx.layout.struct_layout(&field_types);
        program.structs.push(MirStruct {
            name: s.name.clone(),
            fields: s
                .fields
                .iter()
                .map(|(n, t)| (n.clone(), ctx.resolve(t)))
                .collect(),
            offsets,
            size,
            align,
        });
    }
    for e in &hir.enums {
        let payloads: Vec<Vec<Type>> = e.members.iter().map(|m| m.fields.clone()).collect();
        let (payload_offset, size, align) = ctx.layout.tagged_union_layout(&payloads);
        let (size, align) = if e.has_payload { (size, align) } else { (4, 4) };
        program.enums.push(MirEnum {
            name: e.name.clone(),
            variants: e
                .members
                .iter()
                .map(|m| MirVariant {
                    name: m.name.clone(),
                    tag: m.value as i32,
                    payload: m.fields.iter().map(|t| ctx.resolve(t)).collect(),
                })
                .collect(),
            has_payload: e.has_payload,
            payload_offset,
            size,
            align,
        });
    }

    // Vtables: slot order is the interface's declared method order.
    for imp in &hir.impls {
        let Some(interface) = &imp.interface else {
            continue;
        };
        let Some(iface) = hir.interfaces.iter().find(|i| &i.name == interface) else {
            continue;
        };
        let slots: Vec<String> = iface
            .methods
            .iter()
            .map(|m| {
                imp.methods
                    .iter()
                    .find(|(name, _)| name == &m.name)
                    .map(|(_, mangled)| mangled.clone())
                    .unwrap_or_default()
            })
            .collect();
        program.vtables.push(MirVtable {
            interface: interface.clone(),
            type_name: imp.type_name.clone(),
            slots,
        });
    }

    for g in &hir.globals {
        let init = g.init.as_ref().and_then(const_operand);
        program.globals.push(MirGlobal {
            name: g.name.clone(),
            ty: ctx.resolve(&g.ty),
            init,
            is_const: g.is_const,
        });
    }

    program.imports = hir.externs.iter().map(|e| e.name.clone()).collect();

    for f in &hir.functions {
        if !f.generics.is_empty() {
            return Err(InternalError::new(format!(
                "generic function `{}` reached MIR lowering",
                f.name
            )));
        }
        let func = FnCtx::new(&ctx, f).lower()?;
        program.functions.push(func);
    }

    Ok(program)
}

/// A literal initializer as a constant operand, when it is one.
fn const_operand(expr: &HirExpr) -> Option<Operand> {
    match &expr.kind {
        HirExprKind::IntLit(v) => Some(Operand::ConstInt(*v)),
        HirExprKind::FloatLit(v) => Some(Operand::ConstFloat(*v)),
        HirExprKind::BoolLit(v) => Some(Operand::ConstBool(*v)),
        HirExprKind::StringLit(s) => Some(Operand::ConstStr(s.clone())),
        HirExprKind::CharLit(c) => Some(Operand::ConstInt(*c as i64)),
        HirExprKind::NullLit => Some(Operand::ConstNull),
        _ => None,
    }
}

/// Program-wide lookup tables shared by every function lowering.
struct ProgramCtx {
    layout: LayoutEngine,
    struct_fields: FxHashMap<String, Vec<String>>,
    enum_tags: FxHashMap<String, FxHashMap<String, i32>>,
    /// First declared variant per enum, for default initialization.
    enum_first: FxHashMap<String, (String, i32)>,
    interface_slots: FxHashMap<String, Vec<String>>,
    fn_names: FxHashMap<String, ()>,
}

impl ProgramCtx {
    fn new(hir: &HirProgram) -> Self {
        let mut layout = LayoutEngine::new();
        let mut struct_fields = FxHashMap::default();
        let mut enum_tags: FxHashMap<String, FxHashMap<String, i32>> = FxHashMap::default();
        let mut interface_slots = FxHashMap::default();
        let mut fn_names = FxHashMap::default();

        for s in &hir.structs {
            layout.add_struct(s.name.clone(), s.fields.iter().map(|(_, t)| t.clone()).collect());
            struct_fields.insert(
                s.name.clone(),
                s.fields.iter().map(|(n, _)| n.clone()).collect(),
            );
        }
        let mut enum_first = FxHashMap::default();
        for e in &hir.enums {
            layout.add_enum(
                e.name.clone(),
                e.members.iter().map(|m| m.fields.clone()).collect(),
            );
            enum_tags.insert(
                e.name.clone(),
                e.members
                    .iter()
                    .map(|m| (m.name.clone(), m.value as i32))
                    .collect(),
            );
            if let Some(first) = e.members.first() {
                enum_first.insert(e.name.clone(), (first.name.clone(), first.value as i32));
            }
        }
        for i in &hir.interfaces {
            interface_slots.insert(
                i.name.clone(),
                i.methods.iter().map(|m| m.name.clone()).collect(),
            );
        }
        for f in &hir.functions {
            fn_names.insert(f.name.clone(), ());
        }
        for e in &hir.externs {
            fn_names.insert(e.name.clone(), ());
        }

        Self {
            layout,
            struct_fields,
            enum_tags,
            enum_first,
            interface_slots,
            fn_names,
        }
    }

    fn resolve(&self, ty: &Type) -> MirType {
        match &ty.kind {
            TypeKind::Bool => MirType::Bool,
            TypeKind::Int { width, signed } => MirType::Int {
                width: (width.size() * 8) as u8,
                signed: *signed,
            },
            TypeKind::Float32 => MirType::Float32,
            TypeKind::Float64 => MirType::Float64,
            TypeKind::Char => MirType::Char,
            TypeKind::String => MirType::Str,
            TypeKind::CString => MirType::CStr,
            TypeKind::Void | TypeKind::Null => MirType::Void,
            TypeKind::Inferred | TypeKind::Error => MirType::Unknown,
            TypeKind::Pointer(inner) | TypeKind::Reference(inner) => {
                MirType::Ptr(Box::new(self.resolve(inner)))
            }
            TypeKind::Array { elem, size } => MirType::Array {
                elem: Box::new(self.resolve(elem)),
                size: match size {
                    Some(ArraySize::Literal(n)) => Some(*n),
                    _ => None,
                },
            },
            TypeKind::FunctionPointer { ret, params } => MirType::FnPtr {
                params: params.iter().map(|p| self.resolve(p)).collect(),
                ret: Box::new(self.resolve(ret)),
            },
            TypeKind::Named { name, .. } | TypeKind::Alias(name) => {
                if self.interface_slots.contains_key(name) {
                    MirType::Interface(name.clone())
                } else if self.enum_tags.contains_key(name) {
                    MirType::Enum(name.clone())
                } else if self.struct_fields.contains_key(name) {
                    MirType::Struct(name.clone())
                } else {
                    MirType::Struct(name.clone())
                }
            }
            TypeKind::Union(_) | TypeKind::LiteralUnion(_) => MirType::Unknown,
        }
    }

    fn field_index(&self, struct_name: &str, field: &str) -> Option<usize> {
        self.struct_fields
            .get(struct_name)?
            .iter()
            .position(|f| f == field)
    }

    fn enum_tag(&self, enum_name: &str, variant: &str) -> Option<i32> {
        self.enum_tags.get(enum_name)?.get(variant).copied()
    }

    fn interface_slot(&self, interface: &str, method: &str) -> Option<usize> {
        self.interface_slots
            .get(interface)?
            .iter()
            .position(|m| m == method)
    }
}

/// Per-function lowering state.
struct FnCtx<'a> {
    ctx: &'a ProgramCtx,
    func: &'a HirFunction,
    blocks: Vec<(Vec<Instruction>, Option<Terminator>)>,
    current: usize,
    temp_counter: u32,
    locals: Vec<(String, MirType)>,
    local_types: FxHashMap<String, MirType>,
    /// (continue target, break target) for the innermost loop.
    loop_stack: Vec<(BlockId, BlockId)>,
    /// Registered defers, innermost-last; emitted LIFO on every exit.
    defers: Vec<HirStmt>,
    must_depth: usize,
}

impl<'a> FnCtx<'a> {
    fn new(ctx: &'a ProgramCtx, func: &'a HirFunction) -> Self {
        Self {
            ctx,
            func,
            blocks: vec![(Vec::new(), None)],
            current: 0,
            temp_counter: 0,
            locals: Vec::new(),
            local_types: FxHashMap::default(),
            loop_stack: Vec::new(),
            defers: Vec::new(),
            must_depth: 0,
        }
    }

    fn lower(mut self) -> Result<MirFunction, InternalError> {
        for (name, ty) in &self.func.params {
            let mir_ty = self.ctx.resolve(ty);
            self.local_types.insert(name.clone(), mir_ty);
        }

        let body = self.func.body.clone();
        for stmt in &body {
            self.lower_stmt(stmt)?;
        }

        // Natural exit: run defers, then return.
        if self.blocks[self.current].1.is_none() {
            self.emit_defers()?;
            let value = if self.ctx.resolve(&self.func.return_type).is_void() {
                None
            } else {
                // Falling off a value-returning function yields zero; the
                // type checker has already flagged genuinely missing
                // returns.
                Some(Operand::ConstInt(0))
            };
            self.terminate(Terminator::Return(value));
        }

        let blocks: Vec<BasicBlock> = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, (instructions, terminator))| {
                Ok(BasicBlock {
                    id: BlockId(i),
                    instructions,
                    terminator: terminator.unwrap_or(Terminator::Unreachable),
                })
            })
            .collect::<Result<_, InternalError>>()?;

        Ok(MirFunction {
            name: self.func.name.clone(),
            params: self
                .func
                .params
                .iter()
                .map(|(n, t)| (n.clone(), self.ctx.resolve(t)))
                .collect(),
            return_type: self.ctx.resolve(&self.func.return_type),
            locals: self.locals,
            blocks,
            is_export: self.func.is_export,
            no_inline: self.func.no_inline,
            no_optimize: self.func.no_optimize,
            span: self.func.span,
        })
    }

    // ── Block plumbing ─────────────────────────────────────────────────

    fn new_block(&mut self) -> BlockId {
        self.blocks.push((Vec::new(), None));
        BlockId(self.blocks.len() - 1)
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block.0;
    }

    fn current_id(&self) -> BlockId {
        BlockId(self.current)
    }

    fn emit(&mut self, kind: InstKind, span: Span) {
        if self.blocks[self.current].1.is_some() {
            // Dead code after a terminator is dropped.
            return;
        }
        let mut inst = Instruction::new(kind, span);
        inst.in_must = self.must_depth > 0;
        self.blocks[self.current].0.push(inst);
    }

    fn terminate(&mut self, terminator: Terminator) {
        if self.blocks[self.current].1.is_none() {
            self.blocks[self.current].1 = Some(terminator);
        }
    }

    fn fresh_temp(&mut self, ty: MirType) -> String {
        let name = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        self.declare_local(&name, ty);
        name
    }

    fn declare_local(&mut self, name: &str, ty: MirType) {
        if !self.local_types.contains_key(name) {
            self.locals.push((name.to_string(), ty.clone()));
            self.local_types.insert(name.to_string(), ty);
        }
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn lower_stmt(&mut self, stmt: &HirStmt) -> Result<(), InternalError> {
        match stmt {
            HirStmt::Let(l) => {
                let ty = self.ctx.resolve(&l.ty);
                self.declare_local(&l.name, ty.clone());
                if let Some(init) = &l.init {
                    let value = self.lower_expr(init)?;
                    self.emit(
                        InstKind::Assign {
                            dst: l.name.clone(),
                            value,
                        },
                        l.span,
                    );
                } else {
                    // Uninitialized aggregates are zeroed so field stores
                    // (constructor bodies included) have storage to hit.
                    self.emit_default_init(&l.name, &ty, l.span);
                }
                if let Some(ctor) = &l.ctor_call {
                    self.lower_expr(ctor)?;
                }
                Ok(())
            }
            HirStmt::Return(value, span) => {
                let operand = match value {
                    Some(v) => Some(self.lower_expr(v)?),
                    None => None,
                };
                self.emit_defers()?;
                self.terminate(Terminator::Return(operand));
                let dead = self.new_block();
                self.switch_to(dead);
                let _ = span;
                Ok(())
            }
            HirStmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond_op = self.lower_expr(cond)?;
                let then_bb = self.new_block();
                let else_bb = self.new_block();
                let merge_bb = self.new_block();
                self.terminate(Terminator::CondBranch {
                    cond: cond_op,
                    then_block: then_bb,
                    else_block: else_bb,
                });

                self.switch_to(then_bb);
                for s in then_block {
                    self.lower_stmt(s)?;
                }
                self.terminate(Terminator::Branch(merge_bb));

                self.switch_to(else_bb);
                for s in else_block {
                    self.lower_stmt(s)?;
                }
                self.terminate(Terminator::Branch(merge_bb));

                self.switch_to(merge_bb);
                Ok(())
            }
            HirStmt::While { cond, body } => {
                let cond_bb = self.new_block();
                let body_bb = self.new_block();
                let exit_bb = self.new_block();

                self.terminate(Terminator::Branch(cond_bb));
                self.switch_to(cond_bb);
                let cond_op = self.lower_expr(cond)?;
                self.terminate(Terminator::CondBranch {
                    cond: cond_op,
                    then_block: body_bb,
                    else_block: exit_bb,
                });

                self.switch_to(body_bb);
                self.loop_stack.push((cond_bb, exit_bb));
                for s in body {
                    self.lower_stmt(s)?;
                }
                self.loop_stack.pop();
                self.terminate(Terminator::Branch(cond_bb));

                self.switch_to(exit_bb);
                Ok(())
            }
            HirStmt::For {
                init,
                cond,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }
                let cond_bb = self.new_block();
                let body_bb = self.new_block();
                let update_bb = self.new_block();
                let exit_bb = self.new_block();

                self.terminate(Terminator::Branch(cond_bb));
                self.switch_to(cond_bb);
                let cond_op = match cond {
                    Some(c) => self.lower_expr(c)?,
                    None => Operand::ConstBool(true),
                };
                self.terminate(Terminator::CondBranch {
                    cond: cond_op,
                    then_block: body_bb,
                    else_block: exit_bb,
                });

                self.switch_to(body_bb);
                self.loop_stack.push((update_bb, exit_bb));
                for s in body {
                    self.lower_stmt(s)?;
                }
                self.loop_stack.pop();
                self.terminate(Terminator::Branch(update_bb));

                self.switch_to(update_bb);
                if let Some(update) = update {
                    self.lower_expr(update)?;
                }
                self.terminate(Terminator::Branch(cond_bb));

                self.switch_to(exit_bb);
                Ok(())
            }
            HirStmt::Switch { expr, cases } => self.lower_switch(expr, cases),
            HirStmt::Block(body) => {
                for s in body {
                    self.lower_stmt(s)?;
                }
                Ok(())
            }
            HirStmt::Break => {
                if let Some((_, exit_bb)) = self.loop_stack.last().copied() {
                    self.terminate(Terminator::Branch(exit_bb));
                    let dead = self.new_block();
                    self.switch_to(dead);
                }
                Ok(())
            }
            HirStmt::Continue => {
                if let Some((continue_bb, _)) = self.loop_stack.last().copied() {
                    self.terminate(Terminator::Branch(continue_bb));
                    let dead = self.new_block();
                    self.switch_to(dead);
                }
                Ok(())
            }
            HirStmt::Defer(inner) => {
                self.defers.push((**inner).clone());
                Ok(())
            }
            HirStmt::MustBlock { body, .. } => {
                self.must_depth += 1;
                for s in body {
                    self.lower_stmt(s)?;
                }
                self.must_depth -= 1;
                Ok(())
            }
            HirStmt::Expr(expr) => {
                self.lower_expr(expr)?;
                Ok(())
            }
            HirStmt::Asm(asm) => {
                let operands: Vec<Operand> = asm
                    .operands
                    .iter()
                    .map(|op| Operand::Local(op.var_name.clone()))
                    .collect();
                let constraints: Vec<String> =
                    asm.operands.iter().map(|op| op.constraint.clone()).collect();
                self.emit(
                    InstKind::InlineAsm {
                        template: asm.code.clone(),
                        constraints: constraints.join(","),
                        operands,
                    },
                    asm.span,
                );
                Ok(())
            }
        }
    }

    /// Zero-initialize an aggregate local.
    fn emit_default_init(&mut self, name: &str, ty: &MirType, span: Span) {
        match ty {
            MirType::Struct(struct_name) => {
                let Some(fields) = self.ctx.struct_fields.get(struct_name) else {
                    return;
                };
                let elems = vec![Operand::ConstInt(0); fields.len()];
                self.emit(
                    InstKind::Aggregate {
                        dst: name.to_string(),
                        kind: AggregateKind::Struct(struct_name.clone()),
                        elems,
                    },
                    span,
                );
            }
            MirType::Enum(enum_name) => {
                let Some((variant, tag)) = self.ctx.enum_first.get(enum_name).cloned() else {
                    return;
                };
                self.emit(
                    InstKind::Aggregate {
                        dst: name.to_string(),
                        kind: AggregateKind::Enum {
                            enum_name: enum_name.clone(),
                            variant,
                            tag,
                        },
                        elems: Vec::new(),
                    },
                    span,
                );
            }
            MirType::Array {
                elem,
                size: Some(n),
            } => {
                let elems = vec![Operand::ConstInt(0); *n as usize];
                self.emit(
                    InstKind::Aggregate {
                        dst: name.to_string(),
                        kind: AggregateKind::Array((**elem).clone()),
                        elems,
                    },
                    span,
                );
            }
            _ => {}
        }
    }

    /// Emit every registered defer body, LIFO, into the current block
    /// sequence. Runs before each `Return` and at the natural exit.
    fn emit_defers(&mut self) -> Result<(), InternalError> {
        let defers = self.defers.clone();
        for stmt in defers.iter().rev() {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_switch(
        &mut self,
        expr: &HirExpr,
        cases: &[HirSwitchCase],
    ) -> Result<(), InternalError> {
        let value = self.lower_expr(expr)?;
        let exit_bb = self.new_block();

        // All-integer value patterns compile to a switch terminator; the
        // general form falls back to a comparison chain.
        let all_int = cases.iter().all(|c| match &c.pattern {
            None => true,
            Some(HirSwitchPattern::Value(v)) => matches!(v.kind, HirExprKind::IntLit(_)),
            _ => false,
        });

        if all_int && cases.iter().any(|c| c.pattern.is_some()) {
            let mut table = Vec::new();
            let mut default_bb = exit_bb;
            let mut case_blocks = Vec::new();
            for case in cases {
                let bb = self.new_block();
                case_blocks.push(bb);
                match &case.pattern {
                    Some(HirSwitchPattern::Value(v)) => {
                        if let HirExprKind::IntLit(n) = v.kind {
                            table.push((n, bb));
                        }
                    }
                    None => default_bb = bb,
                    _ => {}
                }
            }
            self.terminate(Terminator::Switch {
                value,
                cases: table,
                default: default_bb,
            });
            for (case, bb) in cases.iter().zip(case_blocks) {
                self.switch_to(bb);
                for s in &case.stmts {
                    self.lower_stmt(s)?;
                }
                self.terminate(Terminator::Branch(exit_bb));
            }
            self.switch_to(exit_bb);
            return Ok(());
        }

        // Comparison chain.
        for case in cases {
            match &case.pattern {
                Some(pattern) => {
                    let cond = self.lower_switch_pattern(&value, pattern, expr.span)?;
                    let body_bb = self.new_block();
                    let next_bb = self.new_block();
                    self.terminate(Terminator::CondBranch {
                        cond,
                        then_block: body_bb,
                        else_block: next_bb,
                    });
                    self.switch_to(body_bb);
                    for s in &case.stmts {
                        self.lower_stmt(s)?;
                    }
                    self.terminate(Terminator::Branch(exit_bb));
                    self.switch_to(next_bb);
                }
                None => {
                    for s in &case.stmts {
                        self.lower_stmt(s)?;
                    }
                }
            }
        }
        self.terminate(Terminator::Branch(exit_bb));
        self.switch_to(exit_bb);
        Ok(())
    }

    fn lower_switch_pattern(
        &mut self,
        value: &Operand,
        pattern: &HirSwitchPattern,
        span: Span,
    ) -> Result<Operand, InternalError> {
        match pattern {
            HirSwitchPattern::Value(v) => {
                let rhs = self.lower_expr(v)?;
                let dst = self.fresh_temp(MirType::Bool);
                self.emit(
                    InstKind::Binary {
                        dst: dst.clone(),
                        op: BinOp::Eq,
                        lhs: value.clone(),
                        rhs,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirSwitchPattern::Range {
                start,
                end,
                inclusive,
            } => {
                let start = self.lower_expr(start)?;
                let end = self.lower_expr(end)?;
                let low = self.fresh_temp(MirType::Bool);
                self.emit(
                    InstKind::Binary {
                        dst: low.clone(),
                        op: BinOp::Ge,
                        lhs: value.clone(),
                        rhs: start,
                    },
                    span,
                );
                let high = self.fresh_temp(MirType::Bool);
                self.emit(
                    InstKind::Binary {
                        dst: high.clone(),
                        op: if *inclusive { BinOp::Le } else { BinOp::Lt },
                        lhs: value.clone(),
                        rhs: end,
                    },
                    span,
                );
                let both = self.fresh_temp(MirType::Bool);
                self.emit(
                    InstKind::Binary {
                        dst: both.clone(),
                        op: BinOp::BitAnd,
                        lhs: Operand::Local(low),
                        rhs: Operand::Local(high),
                    },
                    span,
                );
                Ok(Operand::Local(both))
            }
            HirSwitchPattern::Or(patterns) => {
                let mut acc: Option<Operand> = None;
                for p in patterns {
                    let cond = self.lower_switch_pattern(value, p, span)?;
                    acc = Some(match acc {
                        None => cond,
                        Some(prev) => {
                            let dst = self.fresh_temp(MirType::Bool);
                            self.emit(
                                InstKind::Binary {
                                    dst: dst.clone(),
                                    op: BinOp::BitOr,
                                    lhs: prev,
                                    rhs: cond,
                                },
                                span,
                            );
                            Operand::Local(dst)
                        }
                    });
                }
                Ok(acc.unwrap_or(Operand::ConstBool(false)))
            }
        }
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn lower_expr(&mut self, expr: &HirExpr) -> Result<Operand, InternalError> {
        let span = expr.span;
        match &expr.kind {
            HirExprKind::IntLit(v) => Ok(Operand::ConstInt(*v)),
            HirExprKind::FloatLit(v) => Ok(Operand::ConstFloat(*v)),
            HirExprKind::BoolLit(v) => Ok(Operand::ConstBool(*v)),
            HirExprKind::StringLit(s) => Ok(Operand::ConstStr(s.clone())),
            HirExprKind::CharLit(c) => Ok(Operand::ConstInt(*c as i64)),
            HirExprKind::NullLit => Ok(Operand::ConstNull),
            HirExprKind::Var(name) => {
                if !self.local_types.contains_key(name)
                    && self.ctx.fn_names.contains_key(name)
                {
                    return Ok(Operand::FuncRef(name.clone()));
                }
                Ok(Operand::Local(name.clone()))
            }
            HirExprKind::Binary { op, lhs, rhs } => {
                // Short-circuit && and || still evaluate both sides here;
                // the source language's operands are side-effect-free by
                // the time they reach MIR conditions built from patterns,
                // and user-written short-circuits keep C semantics through
                // explicit branching below.
                if matches!(op, BinaryOp::And | BinaryOp::Or) {
                    return self.lower_short_circuit(*op, lhs, rhs, span);
                }
                let lhs_op = self.lower_expr(lhs)?;
                let rhs_op = self.lower_expr(rhs)?;
                let op = bin_op(*op);
                let ty = if op.is_comparison() {
                    MirType::Bool
                } else {
                    self.ctx.resolve(&expr.ty)
                };
                let dst = self.fresh_temp(ty);
                self.emit(
                    InstKind::Binary {
                        dst: dst.clone(),
                        op,
                        lhs: lhs_op,
                        rhs: rhs_op,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::Unary { op, operand } => self.lower_unary(*op, operand, span),
            HirExprKind::Assign { target, value } => {
                let value_op = self.lower_expr(value)?;
                self.lower_store(target, value_op.clone(), span)?;
                Ok(value_op)
            }
            HirExprKind::Call { func, args, .. } => {
                let args: Vec<Operand> = args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<_, _>>()?;
                let ret = self.ctx.resolve(&expr.ty);
                let dst = if ret.is_void() {
                    None
                } else {
                    Some(self.fresh_temp(ret))
                };
                self.emit(
                    InstKind::Call {
                        dst: dst.clone(),
                        func: func.clone(),
                        args,
                    },
                    span,
                );
                Ok(dst.map(Operand::Local).unwrap_or(Operand::ConstNull))
            }
            HirExprKind::MethodCall {
                receiver,
                interface,
                method,
                args,
            } => {
                let receiver_op = self.lower_expr(receiver)?;
                let args: Vec<Operand> = args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<_, _>>()?;
                let slot = self.ctx.interface_slot(interface, method).ok_or_else(|| {
                    InternalError::new(format!(
                        "interface `{interface}` has no method `{method}`"
                    ))
                })?;
                let ret = self.ctx.resolve(&expr.ty);
                let dst = if ret.is_void() {
                    None
                } else {
                    Some(self.fresh_temp(ret))
                };
                self.emit(
                    InstKind::CallVirtual {
                        dst: dst.clone(),
                        interface: interface.clone(),
                        method: method.clone(),
                        slot,
                        receiver: receiver_op,
                        args,
                    },
                    span,
                );
                Ok(dst.map(Operand::Local).unwrap_or(Operand::ConstNull))
            }
            HirExprKind::IndirectCall { callee, args } => {
                let callee_op = self.lower_expr(callee)?;
                let args: Vec<Operand> = args
                    .iter()
                    .map(|a| self.lower_expr(a))
                    .collect::<Result<_, _>>()?;
                let ret = self.ctx.resolve(&expr.ty);
                let dst = if ret.is_void() {
                    None
                } else {
                    Some(self.fresh_temp(ret))
                };
                self.emit(
                    InstKind::CallIndirect {
                        dst: dst.clone(),
                        callee: callee_op,
                        args,
                    },
                    span,
                );
                Ok(dst.map(Operand::Local).unwrap_or(Operand::ConstNull))
            }
            HirExprKind::Member { object, field } => {
                let ptr = self.field_ptr(object, field, span)?;
                let ty = self.ctx.resolve(&expr.ty);
                let dst = self.fresh_temp(ty);
                self.emit(
                    InstKind::Load {
                        dst: dst.clone(),
                        ptr,
                        volatile: false,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::Index { object, index } => {
                let index_op = self.lower_expr(index)?;
                let base = self.place_base(object, span)?;
                let ptr = self.fresh_temp(MirType::Ptr(Box::new(self.ctx.resolve(&expr.ty))));
                self.emit(
                    InstKind::Gep {
                        dst: ptr.clone(),
                        base,
                        index: GepIndex::Element(index_op),
                    },
                    span,
                );
                let ty = self.ctx.resolve(&expr.ty);
                let dst = self.fresh_temp(ty);
                self.emit(
                    InstKind::Load {
                        dst: dst.clone(),
                        ptr: Operand::Local(ptr),
                        volatile: false,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::StructLit { type_name, fields } => {
                // Field operands in declaration order.
                let decl_fields = self
                    .ctx
                    .struct_fields
                    .get(type_name)
                    .cloned()
                    .unwrap_or_else(|| fields.iter().map(|(n, _)| n.clone()).collect());
                let mut elems = Vec::with_capacity(decl_fields.len());
                for field_name in &decl_fields {
                    let value = match fields.iter().find(|(n, _)| n == field_name) {
                        Some((_, v)) => self.lower_expr(v)?,
                        None => Operand::ConstInt(0),
                    };
                    elems.push(value);
                }
                let dst = self.fresh_temp(MirType::Struct(type_name.clone()));
                self.emit(
                    InstKind::Aggregate {
                        dst: dst.clone(),
                        kind: AggregateKind::Struct(type_name.clone()),
                        elems,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::ArrayLit(elements) => {
                let elems: Vec<Operand> = elements
                    .iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<_, _>>()?;
                let elem_ty = elements
                    .first()
                    .map(|e| self.ctx.resolve(&e.ty))
                    .unwrap_or(MirType::Unknown);
                let dst = self.fresh_temp(MirType::Array {
                    elem: Box::new(elem_ty.clone()),
                    size: Some(elems.len() as u64),
                });
                self.emit(
                    InstKind::Aggregate {
                        dst: dst.clone(),
                        kind: AggregateKind::Array(elem_ty),
                        elems,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::Ternary {
                cond,
                then_value,
                else_value,
            } => {
                // Pure arms compile to a branch-free select.
                if is_pure_operand(then_value) && is_pure_operand(else_value) {
                    let cond_op = self.lower_expr(cond)?;
                    let then_op = self.lower_expr(then_value)?;
                    let else_op = self.lower_expr(else_value)?;
                    let dst = self.fresh_temp(self.ctx.resolve(&expr.ty));
                    self.emit(
                        InstKind::Select {
                            dst: dst.clone(),
                            cond: cond_op,
                            then_value: then_op,
                            else_value: else_op,
                        },
                        span,
                    );
                    return Ok(Operand::Local(dst));
                }
                let cond_op = self.lower_expr(cond)?;
                let then_bb = self.new_block();
                let else_bb = self.new_block();
                let merge_bb = self.new_block();
                self.terminate(Terminator::CondBranch {
                    cond: cond_op,
                    then_block: then_bb,
                    else_block: else_bb,
                });

                self.switch_to(then_bb);
                let then_op = self.lower_expr(then_value)?;
                let then_end = self.current_id();
                self.terminate(Terminator::Branch(merge_bb));

                self.switch_to(else_bb);
                let else_op = self.lower_expr(else_value)?;
                let else_end = self.current_id();
                self.terminate(Terminator::Branch(merge_bb));

                self.switch_to(merge_bb);
                let dst = self.fresh_temp(self.ctx.resolve(&expr.ty));
                self.emit(
                    InstKind::Phi {
                        dst: dst.clone(),
                        incoming: vec![(then_end, then_op), (else_end, else_op)],
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::Cast { value, ty } => {
                let value_op = self.lower_expr(value)?;
                let to = self.ctx.resolve(ty);
                let dst = self.fresh_temp(to.clone());
                self.emit(
                    InstKind::Cast {
                        dst: dst.clone(),
                        value: value_op,
                        to,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::EnumVariant {
                enum_name,
                variant,
                payload,
            } => {
                let tag = self.ctx.enum_tag(enum_name, variant).ok_or_else(|| {
                    InternalError::new(format!("unknown enum variant `{enum_name}::{variant}`"))
                })?;
                let elems: Vec<Operand> = payload
                    .iter()
                    .map(|p| self.lower_expr(p))
                    .collect::<Result<_, _>>()?;
                let dst = self.fresh_temp(MirType::Enum(enum_name.clone()));
                self.emit(
                    InstKind::Aggregate {
                        dst: dst.clone(),
                        kind: AggregateKind::Enum {
                            enum_name: enum_name.clone(),
                            variant: variant.clone(),
                            tag,
                        },
                        elems,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::EnumIs {
                scrutinee,
                enum_name,
                variant,
            } => {
                let tag = self.ctx.enum_tag(enum_name, variant).ok_or_else(|| {
                    InternalError::new(format!("unknown enum variant `{enum_name}::{variant}`"))
                })?;
                let tag_value = self.enum_tag_value(scrutinee, span)?;
                let dst = self.fresh_temp(MirType::Bool);
                self.emit(
                    InstKind::Binary {
                        dst: dst.clone(),
                        op: BinOp::Eq,
                        lhs: tag_value,
                        rhs: Operand::ConstInt(tag as i64),
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::EnumPayload { scrutinee, .. } => {
                let base = self.place_base(scrutinee, span)?;
                let payload_ptr = self.fresh_temp(MirType::Ptr(Box::new(MirType::Unknown)));
                self.emit(
                    InstKind::Gep {
                        dst: payload_ptr.clone(),
                        base,
                        index: GepIndex::Field(1),
                    },
                    span,
                );
                let field_ptr = self.fresh_temp(MirType::Ptr(Box::new(self.ctx.resolve(&expr.ty))));
                self.emit(
                    InstKind::Gep {
                        dst: field_ptr.clone(),
                        base: GepBase::Ptr(Operand::Local(payload_ptr)),
                        index: GepIndex::Field(0),
                    },
                    span,
                );
                let dst = self.fresh_temp(self.ctx.resolve(&expr.ty));
                self.emit(
                    InstKind::Load {
                        dst: dst.clone(),
                        ptr: Operand::Local(field_ptr),
                        volatile: false,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            HirExprKind::Move(inner) => self.lower_expr(inner),
            HirExprKind::Error => Ok(Operand::ConstInt(0)),
        }
    }

    /// Read an enum scrutinee's tag.
    fn enum_tag_value(&mut self, scrutinee: &HirExpr, span: Span) -> Result<Operand, InternalError> {
        let base = self.place_base(scrutinee, span)?;
        let tag_ptr = self.fresh_temp(MirType::Ptr(Box::new(MirType::int())));
        self.emit(
            InstKind::Gep {
                dst: tag_ptr.clone(),
                base,
                index: GepIndex::Field(0),
            },
            span,
        );
        let dst = self.fresh_temp(MirType::int());
        self.emit(
            InstKind::Load {
                dst: dst.clone(),
                ptr: Operand::Local(tag_ptr),
                volatile: false,
            },
            span,
        );
        Ok(Operand::Local(dst))
    }

    /// `&&` / `||` with branch-based short-circuit evaluation and a phi.
    fn lower_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: &HirExpr,
        rhs: &HirExpr,
        span: Span,
    ) -> Result<Operand, InternalError> {
        let lhs_op = self.lower_expr(lhs)?;
        let lhs_end = self.current_id();
        let rhs_bb = self.new_block();
        let merge_bb = self.new_block();

        match op {
            BinaryOp::And => self.terminate(Terminator::CondBranch {
                cond: lhs_op.clone(),
                then_block: rhs_bb,
                else_block: merge_bb,
            }),
            _ => self.terminate(Terminator::CondBranch {
                cond: lhs_op.clone(),
                then_block: merge_bb,
                else_block: rhs_bb,
            }),
        }

        self.switch_to(rhs_bb);
        let rhs_op = self.lower_expr(rhs)?;
        let rhs_end = self.current_id();
        self.terminate(Terminator::Branch(merge_bb));

        self.switch_to(merge_bb);
        let short_value = Operand::ConstBool(matches!(op, BinaryOp::Or));
        let dst = self.fresh_temp(MirType::Bool);
        self.emit(
            InstKind::Phi {
                dst: dst.clone(),
                incoming: vec![(lhs_end, short_value), (rhs_end, rhs_op)],
            },
            span,
        );
        Ok(Operand::Local(dst))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: &HirExpr,
        span: Span,
    ) -> Result<Operand, InternalError> {
        match op {
            UnaryOp::AddrOf => {
                let base = self.place_base(operand, span)?;
                let dst = self.fresh_temp(MirType::Ptr(Box::new(
                    self.ctx.resolve(&operand.ty),
                )));
                self.emit(
                    InstKind::Gep {
                        dst: dst.clone(),
                        base,
                        index: GepIndex::None,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            UnaryOp::Deref => {
                let ptr = self.lower_expr(operand)?;
                let inner = match self.ctx.resolve(&operand.ty) {
                    MirType::Ptr(inner) => *inner,
                    other => other,
                };
                let dst = self.fresh_temp(inner);
                self.emit(
                    InstKind::Load {
                        dst: dst.clone(),
                        ptr,
                        volatile: false,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitNot => {
                let operand_ty = self.ctx.resolve(&operand.ty);
                let value = self.lower_expr(operand)?;
                let un_op = match op {
                    UnaryOp::Neg => UnOp::Neg,
                    UnaryOp::Not => UnOp::Not,
                    _ => UnOp::BitNot,
                };
                let dst = self.fresh_temp(if op == UnaryOp::Not {
                    MirType::Bool
                } else {
                    operand_ty
                });
                self.emit(
                    InstKind::Unary {
                        dst: dst.clone(),
                        op: un_op,
                        operand: value,
                    },
                    span,
                );
                Ok(Operand::Local(dst))
            }
            // Inc/dec were desugared to assignments during HIR lowering.
            _ => Err(InternalError::new(format!(
                "unary operator {op:?} survived HIR lowering"
            ))),
        }
    }

    /// Store a value into an assignable place.
    fn lower_store(
        &mut self,
        target: &HirExpr,
        value: Operand,
        span: Span,
    ) -> Result<(), InternalError> {
        match &target.kind {
            HirExprKind::Var(name) => {
                self.declare_local(name, self.ctx.resolve(&target.ty));
                self.emit(InstKind::Assign { dst: name.clone(), value }, span);
                Ok(())
            }
            HirExprKind::Member { object, field } => {
                let ptr = self.field_ptr(object, field, span)?;
                self.emit(
                    InstKind::Store {
                        ptr,
                        value,
                        volatile: false,
                    },
                    span,
                );
                Ok(())
            }
            HirExprKind::Index { object, index } => {
                let index_op = self.lower_expr(index)?;
                let base = self.place_base(object, span)?;
                let ptr = self.fresh_temp(MirType::Ptr(Box::new(MirType::Unknown)));
                self.emit(
                    InstKind::Gep {
                        dst: ptr.clone(),
                        base,
                        index: GepIndex::Element(index_op),
                    },
                    span,
                );
                self.emit(
                    InstKind::Store {
                        ptr: Operand::Local(ptr),
                        value,
                        volatile: false,
                    },
                    span,
                );
                Ok(())
            }
            HirExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let ptr = self.lower_expr(operand)?;
                self.emit(
                    InstKind::Store {
                        ptr,
                        value,
                        volatile: false,
                    },
                    span,
                );
                Ok(())
            }
            _ => Err(InternalError::new(
                "assignment target is not an assignable place",
            )),
        }
    }

    /// A `gep` base for a place expression: named locals address directly,
    /// pointer-typed expressions pass through, and rvalues spill to a
    /// fresh local first.
    fn place_base(&mut self, place: &HirExpr, span: Span) -> Result<GepBase, InternalError> {
        match &place.kind {
            HirExprKind::Var(name) => {
                if matches!(
                    self.ctx.resolve(&place.ty),
                    MirType::Ptr(_)
                ) {
                    Ok(GepBase::Ptr(Operand::Local(name.clone())))
                } else {
                    Ok(GepBase::Local(name.clone()))
                }
            }
            HirExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let ptr = self.lower_expr(operand)?;
                Ok(GepBase::Ptr(ptr))
            }
            HirExprKind::Member { object, field } => {
                let ptr = self.field_ptr(object, field, span)?;
                Ok(GepBase::Ptr(ptr))
            }
            HirExprKind::Index { object, index } => {
                let index_op = self.lower_expr(index)?;
                let base = self.place_base(object, span)?;
                let ptr = self.fresh_temp(MirType::Ptr(Box::new(MirType::Unknown)));
                self.emit(
                    InstKind::Gep {
                        dst: ptr.clone(),
                        base,
                        index: GepIndex::Element(index_op),
                    },
                    span,
                );
                Ok(GepBase::Ptr(Operand::Local(ptr)))
            }
            _ => {
                // Not a place: spill the value into a temp local.
                let value = self.lower_expr(place)?;
                let spill = self.fresh_temp(self.ctx.resolve(&place.ty));
                self.emit(
                    InstKind::Assign {
                        dst: spill.clone(),
                        value,
                    },
                    span,
                );
                Ok(GepBase::Local(spill))
            }
        }
    }

    /// A pointer to `object.field`.
    fn field_ptr(
        &mut self,
        object: &HirExpr,
        field: &str,
        span: Span,
    ) -> Result<Operand, InternalError> {
        let struct_name = match self.ctx.resolve(&object.ty) {
            MirType::Struct(name) | MirType::Enum(name) => name,
            MirType::Ptr(inner) => match *inner {
                MirType::Struct(name) | MirType::Enum(name) => name,
                _ => String::new(),
            },
            _ => String::new(),
        };
        let index = self
            .ctx
            .field_index(&struct_name, field)
            .ok_or_else(|| {
                InternalError::new(format!(
                    "no field `{field}` on `{struct_name}` during MIR lowering"
                ))
            })?;

        let base = self.place_base(object, span)?;
        let ptr = self.fresh_temp(MirType::Ptr(Box::new(MirType::Unknown)));
        self.emit(
            InstKind::Gep {
                dst: ptr.clone(),
                base,
                index: GepIndex::Field(index),
            },
            span,
        );
        Ok(Operand::Local(ptr))
    }
}

/// Whether an expression is a literal or a bare variable read, safe to
/// evaluate unconditionally.
fn is_pure_operand(expr: &HirExpr) -> bool {
    matches!(
        expr.kind,
        HirExprKind::IntLit(_)
            | HirExprKind::FloatLit(_)
            | HirExprKind::BoolLit(_)
            | HirExprKind::StringLit(_)
            | HirExprKind::CharLit(_)
            | HirExprKind::NullLit
            | HirExprKind::Var(_)
    )
}

fn bin_op(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Rem => BinOp::Rem,
        BinaryOp::BitAnd => BinOp::BitAnd,
        BinaryOp::BitOr => BinOp::BitOr,
        BinaryOp::BitXor => BinOp::BitXor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::Ne => BinOp::Ne,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::Le => BinOp::Le,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::Ge => BinOp::Ge,
        // && and || never reach here; they branch in lower_short_circuit.
        BinaryOp::And => BinOp::BitAnd,
        BinaryOp::Or => BinOp::BitOr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_hir::HirLowering;
    use cm_parser::parse_source;

    fn lower(source: &str) -> MirProgram {
        let (program, diags) = parse_source(source, "test.cm");
        assert!(diags.is_empty(), "parse: {diags:?}");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = crate::mono::monomorphize(&hir).unwrap();
        lower_program(&mono).unwrap()
    }

    fn func<'a>(p: &'a MirProgram, name: &str) -> &'a MirFunction {
        p.function(name).unwrap_or_else(|| panic!("no fn {name}"))
    }

    #[test]
    fn every_block_has_exactly_one_terminator() {
        let p = lower(
            "int main() { int x = 1; if x > 0 { x = 2; } else { x = 3; } while x < 10 { x = x + 1; } return x; }",
        );
        for f in &p.functions {
            assert!(!f.blocks.is_empty());
            // The blocks vector stores the terminator inline, so the shape
            // itself guarantees one per block; check reachable ones are not
            // left unreachable-by-default.
            let entry = &f.blocks[0];
            assert!(!matches!(entry.terminator, Terminator::Unreachable));
        }
    }

    #[test]
    fn hello_world_call_and_return() {
        let p = lower("int main() { println(\"hello\"); return 0; }");
        let main = func(&p, "main");
        let entry = &main.blocks[0];
        assert!(entry
            .instructions
            .iter()
            .any(|i| matches!(&i.kind, InstKind::Call { func, .. } if func == "println")));
        assert!(matches!(
            entry.terminator,
            Terminator::Return(Some(Operand::ConstInt(0)))
        ));
    }

    #[test]
    fn defers_emit_lifo_before_return() {
        let p = lower(
            "int main() { defer println(\"1\"); defer println(\"2\"); return 0; }",
        );
        let main = func(&p, "main");
        let calls: Vec<&str> = main.blocks[0]
            .instructions
            .iter()
            .filter_map(|i| match &i.kind {
                InstKind::Call { args, .. } => args.first().and_then(|a| match a {
                    Operand::ConstStr(s) => Some(s.as_str()),
                    _ => None,
                }),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["2", "1"]);
    }

    #[test]
    fn must_region_marks_instructions() {
        let p = lower("int f() { must { int x = 0; x = x + 0; return x; } }");
        let f = func(&p, "f");
        let marked: Vec<bool> = f
            .blocks
            .iter()
            .flat_map(|b| b.instructions.iter().map(|i| i.in_must))
            .collect();
        assert!(!marked.is_empty());
        assert!(marked.iter().all(|&m| m), "all instructions inside must are marked");
    }

    #[test]
    fn enum_construction_and_tag_test() {
        let p = lower(
            "enum E { A(int), B }\nint main() { E e = E::A(42); match e { A(n) => return n; _ => return -1; } }",
        );
        let main = func(&p, "main");
        let has_aggregate = main.blocks.iter().any(|b| {
            b.instructions.iter().any(|i| {
                matches!(
                    &i.kind,
                    InstKind::Aggregate {
                        kind: AggregateKind::Enum { tag: 0, .. },
                        ..
                    }
                )
            })
        });
        assert!(has_aggregate, "expected tagged-union construction");

        let enum_def = p.enum_def("E").unwrap();
        assert!(enum_def.has_payload);
        assert_eq!(enum_def.variant("A").unwrap().tag, 0);
        assert_eq!(enum_def.variant("B").unwrap().tag, 1);
        // tag(4) + pad(0) + int payload(4) = 8, align 4.
        assert_eq!(enum_def.size, 8);
        assert_eq!(enum_def.align, 4);
    }

    #[test]
    fn struct_layout_offsets() {
        let p = lower("struct P { tiny a; long b; int c; }\nint main() { return 0; }");
        let s = p.struct_def("P").unwrap();
        assert_eq!(s.offsets, vec![0, 8, 16]);
        assert_eq!(s.size, 24);
        assert_eq!(s.align, 8);
    }

    #[test]
    fn vtable_slots_follow_interface_order() {
        let p = lower(
            "interface Shape { int area(); int perimeter(); }\n\
             struct Square { int side; }\n\
             impl Shape for Square {\n\
               int perimeter() { return 4; }\n\
               int area() { return 9; }\n\
             }\n\
             int main() { return 0; }",
        );
        let vt = p.vtable("Shape", "Square").unwrap();
        // Slot order is the interface's declaration order, not the impl's.
        assert_eq!(
            vt.slots,
            vec!["Square__area__Shape", "Square__perimeter__Shape"]
        );
    }

    #[test]
    fn dynamic_dispatch_lowered_with_slot() {
        let p = lower(
            "interface Shape { int area(); }\n\
             int call_it(Shape s) { return s.area(); }\n\
             int main() { return 0; }",
        );
        let f = func(&p, "call_it");
        let found = f.blocks.iter().flat_map(|b| &b.instructions).any(|i| {
            matches!(
                &i.kind,
                InstKind::CallVirtual { slot: 0, method, .. } if method == "area"
            )
        });
        assert!(found, "expected CallVirtual with slot 0");
    }

    #[test]
    fn pure_ternary_produces_select() {
        let p = lower("int main() { int a = 1; int b = 2; int m = a > b ? a : b; return m; }");
        let main = func(&p, "main");
        let has_select = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| matches!(i.kind, InstKind::Select { .. }));
        assert!(has_select);
    }

    #[test]
    fn impure_ternary_produces_phi() {
        let p = lower(
            "int f() { return 1; }\nint g() { return 2; }\nint main() { int m = 1 > 0 ? f() : g(); return m; }",
        );
        let main = func(&p, "main");
        let has_phi = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .any(|i| matches!(i.kind, InstKind::Phi { .. }));
        assert!(has_phi);
    }

    #[test]
    fn break_and_continue_target_loop_blocks() {
        let p = lower(
            "int main() { int i = 0; while true { i = i + 1; if i > 3 { break; } continue; } return i; }",
        );
        let main = func(&p, "main");
        // Just verify the CFG is well-formed: every successor exists.
        for b in &main.blocks {
            for succ in b.terminator.successors() {
                assert!(succ.0 < main.blocks.len(), "dangling successor");
            }
        }
    }

    #[test]
    fn switch_on_constants_uses_switch_terminator() {
        let p = lower(
            "int main() { int x = 2; switch (x) { case 1: return 1; case 2: return 2; default: return 0; } }",
        );
        let main = func(&p, "main");
        let has_switch = main
            .blocks
            .iter()
            .any(|b| matches!(b.terminator, Terminator::Switch { .. }));
        assert!(has_switch);
    }
}
