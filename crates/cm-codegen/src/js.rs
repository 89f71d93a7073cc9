//! JavaScript emission for `--target=js` / `--target=web`.
//!
//! Each MIR function becomes a JS function whose body is the classic
//! block-dispatch loop: a `__bb` cursor plus `switch` inside `for(;;)`,
//! which represents any CFG without restructuring. Values map directly:
//! structs and arrays are JS arrays, tagged unions are `[tag, [payload]]`
//! (so `gep field 0` is the tag and `field 1` the payload record, exactly
//! as in MIR), and pointers are `{get, set}` accessor pairs. Interface
//! dispatch looks the mangled method up on the receiver's vtable object.
//!
//! `__llvm__` inline assembly has no JS rendering and is rejected.

use std::io::{self, Write};

use cm_mir::{
    AggregateKind, BinOp, GepBase, GepIndex, InstKind, MirFunction, MirProgram, Operand,
    Terminator, UnOp,
};

use crate::{Backend, CodegenError};

pub struct JsBackend {
    emit_html: bool,
}

impl JsBackend {
    pub fn new(emit_html: bool) -> Self {
        Self { emit_html }
    }
}

impl Backend for JsBackend {
    fn name(&self) -> &'static str {
        "js"
    }

    fn emit(
        &self,
        program: &MirProgram,
        _triple: &str,
        _opt_level: u8,
        out: &mut dyn io::Write,
    ) -> Result<(), CodegenError> {
        let mut js = String::new();
        emit_prelude(&mut js);

        for vt in &program.vtables {
            let slots: Vec<String> = vt.slots.iter().map(|s| mangle(s)).collect();
            js.push_str(&format!(
                "const {} = [{}];\n",
                vtable_name(&vt.interface, &vt.type_name),
                slots.join(", ")
            ));
        }

        for g in &program.globals {
            let init = g.init.as_ref().map(const_js).unwrap_or_else(|| "0".into());
            js.push_str(&format!("let {} = {};\n", mangle(&g.name), init));
        }

        for func in &program.functions {
            emit_function(func, &mut js)?;
        }

        js.push_str("if (typeof cm_main === 'function') { process.exitCode = Number(cm_main()); }\n");

        if self.emit_html {
            let page = format!(
                "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>cm</title></head>\n<body>\n<script>\n{js}</script>\n</body>\n</html>\n"
            );
            out.write_all(page.as_bytes())
                .map_err(|e| CodegenError::Io(e.to_string()))?;
        } else {
            out.write_all(js.as_bytes())
                .map_err(|e| CodegenError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

fn emit_prelude(js: &mut String) {
    js.push_str("'use strict';\n");
    js.push_str("function cm_println(s) { console.log(s); }\n");
    js.push_str("function cm_print(s) { process.stdout.write(String(s)); }\n");
    js.push_str("function cm_slice_len(a) { return a.length; }\n");
    js.push('\n');
}

fn vtable_name(interface: &str, type_name: &str) -> String {
    format!("vt_{}_{}", mangle(interface), mangle(type_name))
}

/// Mangle a Cm symbol into a JS identifier. `main` is renamed so the entry
/// shim controls when it runs.
fn mangle(name: &str) -> String {
    let flat = name.replace("::", "_").replace(['%', '='], "_");
    if flat == "main" {
        "cm_main".to_string()
    } else if flat.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{flat}")
    } else {
        flat
    }
}

/// Local names become JS variables; `%tN` temporaries lose the sigil.
fn local(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("%t") {
        format!("t{rest}")
    } else {
        mangle(name)
    }
}

fn const_js(op: &Operand) -> String {
    match op {
        Operand::ConstInt(v) => v.to_string(),
        Operand::ConstFloat(v) => v.to_string(),
        Operand::ConstBool(v) => v.to_string(),
        Operand::ConstStr(s) => format!("{s:?}"),
        Operand::ConstNull => "null".to_string(),
        Operand::Local(name) => local(name),
        Operand::FuncRef(name) => mangle(name),
    }
}

fn builtin(func: &str) -> String {
    match func {
        "println" => "cm_println".to_string(),
        "print" => "cm_print".to_string(),
        "__builtin_slice_len" => "cm_slice_len".to_string(),
        other => mangle(other),
    }
}

fn emit_function(func: &MirFunction, js: &mut String) -> Result<(), CodegenError> {
    let params: Vec<String> = func.params.iter().map(|(n, _)| local(n)).collect();
    js.push_str(&format!(
        "function {}({}) {{\n",
        mangle(&func.name),
        params.join(", ")
    ));

    // Declare locals up front.
    if !func.locals.is_empty() {
        let names: Vec<String> = func.locals.iter().map(|(n, _)| local(n)).collect();
        js.push_str(&format!("  let {};\n", names.join(", ")));
    }
    js.push_str("  let __bb = 0, __pred = -1;\n");
    js.push_str("  for (;;) switch (__bb) {\n");

    for block in &func.blocks {
        js.push_str(&format!("  case {}: {{\n", block.id.0));
        for inst in &block.instructions {
            emit_inst(&inst.kind, js)?;
        }
        emit_terminator(&block.terminator, block.id.0, js);
        js.push_str("  }\n");
    }

    js.push_str("  default: return;\n");
    js.push_str("  }\n");
    js.push_str("}\n\n");
    Ok(())
}

fn gep_js(base: &GepBase, index: &GepIndex) -> String {
    let base_accessor = match base {
        // The address of a plain local: an accessor closing over it.
        GepBase::Local(name) => format!(
            "{{ get: () => {0}, set: (__v) => {{ {0} = __v; }} }}",
            local(name)
        ),
        GepBase::Ptr(op) => const_js(op),
    };
    match index {
        GepIndex::None => base_accessor,
        GepIndex::Field(i) => format!(
            "((__p) => ({{ get: () => __p.get()[{i}], set: (__v) => {{ __p.get()[{i}] = __v; }} }}))({base_accessor})"
        ),
        GepIndex::Element(op) => {
            let idx = const_js(op);
            format!(
                "((__p, __i) => ({{ get: () => __p.get()[__i], set: (__v) => {{ __p.get()[__i] = __v; }} }}))({base_accessor}, {idx})"
            )
        }
    }
}

fn emit_inst(inst: &InstKind, js: &mut String) -> Result<(), CodegenError> {
    match inst {
        InstKind::Assign { dst, value } => {
            js.push_str(&format!("    {} = {};\n", local(dst), const_js(value)));
        }
        InstKind::Binary { dst, op, lhs, rhs } => {
            let a = const_js(lhs);
            let b = const_js(rhs);
            let expr = match op {
                BinOp::Add => format!("({a} + {b})"),
                BinOp::Sub => format!("({a} - {b})"),
                BinOp::Mul => format!("({a} * {b})"),
                BinOp::Div => format!("Math.trunc({a} / {b})"),
                BinOp::Rem => format!("({a} % {b})"),
                BinOp::BitAnd => format!("({a} & {b})"),
                BinOp::BitOr => format!("({a} | {b})"),
                BinOp::BitXor => format!("({a} ^ {b})"),
                BinOp::Shl => format!("({a} << {b})"),
                BinOp::Shr => format!("({a} >> {b})"),
                BinOp::Eq => format!("({a} === {b})"),
                BinOp::Ne => format!("({a} !== {b})"),
                BinOp::Lt => format!("({a} < {b})"),
                BinOp::Le => format!("({a} <= {b})"),
                BinOp::Gt => format!("({a} > {b})"),
                BinOp::Ge => format!("({a} >= {b})"),
            };
            js.push_str(&format!("    {} = {};\n", local(dst), expr));
        }
        InstKind::Unary { dst, op, operand } => {
            let a = const_js(operand);
            let expr = match op {
                UnOp::Neg => format!("(-{a})"),
                UnOp::Not => format!("(!{a})"),
                UnOp::BitNot => format!("(~{a})"),
            };
            js.push_str(&format!("    {} = {};\n", local(dst), expr));
        }
        InstKind::Call { dst, func, args } => {
            let args: Vec<String> = args.iter().map(const_js).collect();
            let call = format!("{}({})", builtin(func), args.join(", "));
            match dst {
                Some(dst) => js.push_str(&format!("    {} = {call};\n", local(dst))),
                None => js.push_str(&format!("    {call};\n")),
            }
        }
        InstKind::CallIndirect { dst, callee, args } => {
            let args: Vec<String> = args.iter().map(const_js).collect();
            let call = format!("({})({})", const_js(callee), args.join(", "));
            match dst {
                Some(dst) => js.push_str(&format!("    {} = {call};\n", local(dst))),
                None => js.push_str(&format!("    {call};\n")),
            }
        }
        InstKind::CallVirtual {
            dst,
            slot,
            receiver,
            args,
            ..
        } => {
            // Fat reference: { data, vtable } with vtable as a slot array.
            let mut all_args = vec![format!("{}.data", const_js(receiver))];
            all_args.extend(args.iter().map(const_js));
            let call = format!(
                "{}.vtable[{slot}]({})",
                const_js(receiver),
                all_args.join(", ")
            );
            match dst {
                Some(dst) => js.push_str(&format!("    {} = {call};\n", local(dst))),
                None => js.push_str(&format!("    {call};\n")),
            }
        }
        InstKind::Load { dst, ptr, .. } => {
            js.push_str(&format!("    {} = {}.get();\n", local(dst), const_js(ptr)));
        }
        InstKind::Store { ptr, value, .. } => {
            js.push_str(&format!("    {}.set({});\n", const_js(ptr), const_js(value)));
        }
        InstKind::Gep { dst, base, index } => {
            js.push_str(&format!("    {} = {};\n", local(dst), gep_js(base, index)));
        }
        InstKind::Cast { dst, value, to } => {
            let v = const_js(value);
            let expr = match to {
                cm_mir::MirType::Int { .. } => format!("Math.trunc({v})"),
                cm_mir::MirType::Float32 | cm_mir::MirType::Float64 => format!("Number({v})"),
                cm_mir::MirType::Str => format!("String({v})"),
                cm_mir::MirType::Bool => format!("Boolean({v})"),
                _ => v,
            };
            js.push_str(&format!("    {} = {};\n", local(dst), expr));
        }
        InstKind::Phi { dst, incoming } => {
            let mut chain = String::from("undefined");
            for (bb, op) in incoming.iter().rev() {
                chain = format!("(__pred === {} ? {} : {chain})", bb.0, const_js(op));
            }
            js.push_str(&format!("    {} = {chain};\n", local(dst)));
        }
        InstKind::Select {
            dst,
            cond,
            then_value,
            else_value,
        } => {
            js.push_str(&format!(
                "    {} = ({} ? {} : {});\n",
                local(dst),
                const_js(cond),
                const_js(then_value),
                const_js(else_value)
            ));
        }
        InstKind::Aggregate { dst, kind, elems } => {
            let elems_js: Vec<String> = elems.iter().map(const_js).collect();
            let expr = match kind {
                AggregateKind::Enum { tag, .. } => {
                    format!("[{tag}, [{}]]", elems_js.join(", "))
                }
                _ => format!("[{}]", elems_js.join(", ")),
            };
            js.push_str(&format!("    {} = {};\n", local(dst), expr));
        }
        InstKind::InlineAsm { .. } => {
            return Err(CodegenError::Unsupported(
                "__llvm__ inline assembly on the JavaScript target".into(),
            ));
        }
        InstKind::DebugMarker(text) => {
            js.push_str(&format!("    // {text}\n"));
        }
    }
    Ok(())
}

fn emit_terminator(term: &Terminator, current: usize, js: &mut String) {
    match term {
        Terminator::Branch(bb) => {
            js.push_str(&format!("    __pred = {current}; __bb = {}; continue;\n", bb.0));
        }
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => {
            js.push_str(&format!(
                "    __pred = {current}; __bb = ({} ? {} : {}); continue;\n",
                const_js(cond),
                then_block.0,
                else_block.0
            ));
        }
        Terminator::Return(value) => match value {
            Some(v) => js.push_str(&format!("    return {};\n", const_js(v))),
            None => js.push_str("    return;\n"),
        },
        Terminator::Switch {
            value,
            cases,
            default,
        } => {
            let mut chain = default.0.to_string();
            for (v, bb) in cases.iter().rev() {
                chain = format!("({} === {v} ? {} : {chain})", const_js(value), bb.0);
            }
            js.push_str(&format!("    __pred = {current}; __bb = {chain}; continue;\n"));
        }
        Terminator::Unreachable => {
            js.push_str("    throw new Error('unreachable');\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_hir::HirLowering;
    use cm_parser::parse_source;

    fn emit(source: &str) -> String {
        let (program, diags) = parse_source(source, "test.cm");
        assert!(diags.is_empty(), "parse: {diags:?}");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut buffer = Vec::new();
        JsBackend::new(false).emit(&mir, "js", 0, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn hello_world_emits_runnable_shape() {
        let js = emit("int main() { println(\"hello\"); return 0; }");
        assert!(js.contains("function cm_println"), "{js}");
        assert!(js.contains("function cm_main()"), "{js}");
        assert!(js.contains("cm_println(\"hello\")"), "{js}");
        assert!(js.contains("process.exitCode = Number(cm_main())"), "{js}");
    }

    #[test]
    fn branches_use_block_dispatch() {
        let js = emit("int main() { int x = 1; if x > 0 { x = 2; } return x; }");
        assert!(js.contains("switch (__bb)"), "{js}");
        assert!(js.contains("__bb = ("), "{js}");
    }

    #[test]
    fn web_target_wraps_html() {
        let (program, _) = parse_source("int main() { return 0; }", "t.cm");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut buffer = Vec::new();
        JsBackend::new(true).emit(&mir, "web", 0, &mut buffer).unwrap();
        let html = String::from_utf8(buffer).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"), "{html}");
        assert!(html.contains("<script>"), "{html}");
    }

    #[test]
    fn inline_asm_is_rejected() {
        let (program, diags) =
            parse_source("int main() { __llvm__(\"nop\"); return 0; }", "t.cm");
        assert!(diags.is_empty(), "{diags:?}");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut buffer = Vec::new();
        let err = JsBackend::new(false).emit(&mir, "js", 0, &mut buffer).unwrap_err();
        assert!(matches!(err, CodegenError::Unsupported(_)), "{err}");
    }
}
