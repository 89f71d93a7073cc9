//! Text rendering of MIR for `--mir` / `--mir-opt` dumps.

use std::fmt::Write;

use crate::*;

/// Render a whole program.
pub fn print_program(program: &MirProgram) -> String {
    let mut out = String::new();

    for s in &program.structs {
        let _ = writeln!(out, "struct {} (size {}, align {}) {{", s.name, s.size, s.align);
        for ((name, ty), offset) in s.fields.iter().zip(&s.offsets) {
            let _ = writeln!(out, "  +{offset} {name}: {}", type_str(ty));
        }
        let _ = writeln!(out, "}}");
    }

    for e in &program.enums {
        let _ = writeln!(
            out,
            "enum {} (size {}, align {}, payload at {}) {{",
            e.name, e.size, e.align, e.payload_offset
        );
        for v in &e.variants {
            let payload: Vec<String> = v.payload.iter().map(type_str).collect();
            if payload.is_empty() {
                let _ = writeln!(out, "  {} = {}", v.name, v.tag);
            } else {
                let _ = writeln!(out, "  {}({}) = {}", v.name, payload.join(", "), v.tag);
            }
        }
        let _ = writeln!(out, "}}");
    }

    for vt in &program.vtables {
        let _ = writeln!(
            out,
            "vtable {} for {}: [{}]",
            vt.interface,
            vt.type_name,
            vt.slots.join(", ")
        );
    }

    for g in &program.globals {
        match &g.init {
            Some(init) => {
                let _ = writeln!(out, "global {}: {} = {}", g.name, type_str(&g.ty), operand(init));
            }
            None => {
                let _ = writeln!(out, "global {}: {}", g.name, type_str(&g.ty));
            }
        }
    }

    for f in &program.functions {
        out.push_str(&print_function(f));
    }

    out
}

/// Render one function.
pub fn print_function(f: &MirFunction) -> String {
    let mut out = String::new();
    let params: Vec<String> = f
        .params
        .iter()
        .map(|(n, t)| format!("{n}: {}", type_str(t)))
        .collect();
    let _ = writeln!(
        out,
        "fn {}({}) -> {} {{",
        f.name,
        params.join(", "),
        type_str(&f.return_type)
    );

    for block in &f.blocks {
        let _ = writeln!(out, "bb{}:", block.id.0);
        for inst in &block.instructions {
            let must = if inst.in_must { " [must]" } else { "" };
            let _ = writeln!(out, "  {}{}", inst_str(&inst.kind), must);
        }
        let _ = writeln!(out, "  {}", term_str(&block.terminator));
    }

    let _ = writeln!(out, "}}");
    out
}

fn type_str(ty: &MirType) -> String {
    match ty {
        MirType::Void => "void".into(),
        MirType::Bool => "bool".into(),
        MirType::Int { width, signed } => {
            format!("{}{}", if *signed { "i" } else { "u" }, width)
        }
        MirType::Float32 => "f32".into(),
        MirType::Float64 => "f64".into(),
        MirType::Char => "char".into(),
        MirType::Str => "string".into(),
        MirType::CStr => "cstring".into(),
        MirType::Ptr(inner) => format!("*{}", type_str(inner)),
        MirType::Struct(name) => name.clone(),
        MirType::Enum(name) => name.clone(),
        MirType::Array { elem, size } => match size {
            Some(n) => format!("[{}; {n}]", type_str(elem)),
            None => format!("[{}]", type_str(elem)),
        },
        MirType::FnPtr { params, ret } => {
            let params: Vec<String> = params.iter().map(type_str).collect();
            format!("fn({}) -> {}", params.join(", "), type_str(ret))
        }
        MirType::Interface(name) => format!("dyn {name}"),
        MirType::Unknown => "?".into(),
    }
}

fn operand(op: &Operand) -> String {
    match op {
        Operand::ConstInt(v) => v.to_string(),
        Operand::ConstFloat(v) => format!("{v:?}"),
        Operand::ConstBool(v) => v.to_string(),
        Operand::ConstStr(s) => format!("{s:?}"),
        Operand::ConstNull => "null".into(),
        Operand::Local(name) => name.clone(),
        Operand::FuncRef(name) => format!("@{name}"),
    }
}

fn operand_list(ops: &[Operand]) -> String {
    ops.iter().map(operand).collect::<Vec<_>>().join(", ")
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Rem => "rem",
        BinOp::BitAnd => "and",
        BinOp::BitOr => "or",
        BinOp::BitXor => "xor",
        BinOp::Shl => "shl",
        BinOp::Shr => "shr",
        BinOp::Eq => "eq",
        BinOp::Ne => "ne",
        BinOp::Lt => "lt",
        BinOp::Le => "le",
        BinOp::Gt => "gt",
        BinOp::Ge => "ge",
    }
}

fn inst_str(inst: &InstKind) -> String {
    match inst {
        InstKind::Assign { dst, value } => format!("{dst} = {}", operand(value)),
        InstKind::Binary { dst, op, lhs, rhs } => {
            format!("{dst} = {} {}, {}", bin_op_str(*op), operand(lhs), operand(rhs))
        }
        InstKind::Unary { dst, op, operand: o } => {
            let name = match op {
                UnOp::Neg => "neg",
                UnOp::Not => "not",
                UnOp::BitNot => "bnot",
            };
            format!("{dst} = {name} {}", operand(o))
        }
        InstKind::Call { dst, func, args } => match dst {
            Some(dst) => format!("{dst} = call {func}({})", operand_list(args)),
            None => format!("call {func}({})", operand_list(args)),
        },
        InstKind::CallIndirect { dst, callee, args } => match dst {
            Some(dst) => format!("{dst} = call_indirect {}({})", operand(callee), operand_list(args)),
            None => format!("call_indirect {}({})", operand(callee), operand_list(args)),
        },
        InstKind::CallVirtual {
            dst,
            interface,
            method,
            slot,
            receiver,
            args,
        } => {
            let call = format!(
                "call_virtual {interface}::{method}[slot {slot}] {}({})",
                operand(receiver),
                operand_list(args)
            );
            match dst {
                Some(dst) => format!("{dst} = {call}"),
                None => call,
            }
        }
        InstKind::Load { dst, ptr, volatile } => {
            let v = if *volatile { "volatile " } else { "" };
            format!("{dst} = load {v}{}", operand(ptr))
        }
        InstKind::Store {
            ptr,
            value,
            volatile,
        } => {
            let v = if *volatile { "volatile " } else { "" };
            format!("store {v}{}, {}", operand(value), operand(ptr))
        }
        InstKind::Gep { dst, base, index } => {
            let base = match base {
                GepBase::Local(name) => format!("&{name}"),
                GepBase::Ptr(p) => operand(p),
            };
            match index {
                GepIndex::Field(i) => format!("{dst} = gep {base}, field {i}"),
                GepIndex::Element(i) => format!("{dst} = gep {base}, elem {}", operand(i)),
                GepIndex::None => format!("{dst} = gep {base}"),
            }
        }
        InstKind::Cast { dst, value, to } => {
            format!("{dst} = cast {} to {}", operand(value), type_str(to))
        }
        InstKind::Select {
            dst,
            cond,
            then_value,
            else_value,
        } => format!(
            "{dst} = select {}, {}, {}",
            operand(cond),
            operand(then_value),
            operand(else_value)
        ),
        InstKind::Phi { dst, incoming } => {
            let inc: Vec<String> = incoming
                .iter()
                .map(|(bb, op)| format!("[bb{}: {}]", bb.0, operand(op)))
                .collect();
            format!("{dst} = phi {}", inc.join(", "))
        }
        InstKind::Aggregate { dst, kind, elems } => match kind {
            AggregateKind::Struct(name) => {
                format!("{dst} = struct {name} {{ {} }}", operand_list(elems))
            }
            AggregateKind::Array(_) => format!("{dst} = array [{}]", operand_list(elems)),
            AggregateKind::Enum {
                enum_name,
                variant,
                tag,
            } => format!(
                "{dst} = enum {enum_name}::{variant} (tag {tag}) {{ {} }}",
                operand_list(elems)
            ),
        },
        InstKind::InlineAsm {
            template,
            constraints,
            operands,
        } => format!(
            "asm {template:?} [{constraints}] ({})",
            operand_list(operands)
        ),
        InstKind::DebugMarker(text) => format!("; {text}"),
    }
}

fn term_str(term: &Terminator) -> String {
    match term {
        Terminator::Branch(bb) => format!("br bb{}", bb.0),
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => format!(
            "br_if {}, bb{}, bb{}",
            operand(cond),
            then_block.0,
            else_block.0
        ),
        Terminator::Return(None) => "ret".into(),
        Terminator::Return(Some(v)) => format!("ret {}", operand(v)),
        Terminator::Switch {
            value,
            cases,
            default,
        } => {
            let arms: Vec<String> = cases
                .iter()
                .map(|(v, bb)| format!("{v}: bb{}", bb.0))
                .collect();
            format!(
                "switch {} [{}], default bb{}",
                operand(value),
                arms.join(", "),
                default.0
            )
        }
        Terminator::Unreachable => "unreachable".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_common::Span;

    fn sample_function() -> MirFunction {
        MirFunction {
            name: "max2".into(),
            params: vec![("a".into(), MirType::int()), ("b".into(), MirType::int())],
            return_type: MirType::int(),
            locals: vec![("%t0".into(), MirType::Bool)],
            blocks: vec![
                BasicBlock {
                    id: BlockId(0),
                    instructions: vec![Instruction::new(
                        InstKind::Binary {
                            dst: "%t0".into(),
                            op: BinOp::Gt,
                            lhs: Operand::Local("a".into()),
                            rhs: Operand::Local("b".into()),
                        },
                        Span::dummy(),
                    )],
                    terminator: Terminator::CondBranch {
                        cond: Operand::Local("%t0".into()),
                        then_block: BlockId(1),
                        else_block: BlockId(2),
                    },
                },
                BasicBlock {
                    id: BlockId(1),
                    instructions: vec![],
                    terminator: Terminator::Return(Some(Operand::Local("a".into()))),
                },
                BasicBlock {
                    id: BlockId(2),
                    instructions: vec![],
                    terminator: Terminator::Return(Some(Operand::Local("b".into()))),
                },
            ],
            is_export: false,
            no_inline: false,
            no_optimize: false,
            span: Span::dummy(),
        }
    }

    #[test]
    fn function_rendering() {
        insta::assert_snapshot!(print_function(&sample_function()), @r"
        fn max2(a: i32, b: i32) -> i32 {
        bb0:
          %t0 = gt a, b
          br_if %t0, bb1, bb2
        bb1:
          ret a
        bb2:
          ret b
        }
        ");
    }

    #[test]
    fn must_flag_is_visible() {
        let mut f = sample_function();
        f.blocks[0].instructions[0].in_must = true;
        let text = print_function(&f);
        assert!(text.contains("%t0 = gt a, b [must]"), "{text}");
    }

    #[test]
    fn program_rendering_includes_layouts() {
        let program = MirProgram {
            structs: vec![MirStruct {
                name: "P".into(),
                fields: vec![("x".into(), MirType::int()), ("y".into(), MirType::long())],
                offsets: vec![0, 8],
                size: 16,
                align: 8,
            }],
            enums: vec![],
            functions: vec![],
            globals: vec![],
            imports: vec![],
            vtables: vec![MirVtable {
                interface: "Shape".into(),
                type_name: "P".into(),
                slots: vec!["P__area__Shape".into()],
            }],
        };
        let text = print_program(&program);
        assert!(text.contains("struct P (size 16, align 8)"), "{text}");
        assert!(text.contains("+8 y: i64"), "{text}");
        assert!(text.contains("vtable Shape for P: [P__area__Shape]"), "{text}");
    }
}
