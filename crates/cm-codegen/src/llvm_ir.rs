//! Textual LLVM IR emission.
//!
//! Produces `.ll` text in classic `-O0` shape: every local gets an alloca,
//! operand reads load from it, writes store back. Scalars are uniformly
//! `i64` (bools widen after comparison), floats are `double`, everything
//! aggregate or foreign is `ptr`. Interface dispatch and aggregate
//! construction call into the `cm_*` runtime, whose symbols the native
//! toolchain links; vtables are emitted as constant `ptr` arrays.
//!
//! Object and executable production from this text is the platform
//! toolchain's job, outside this crate.

use std::io::{self, Write};

use rustc_hash::FxHashMap;

use cm_mir::{
    AggregateKind, BinOp, GepBase, GepIndex, InstKind, MirFunction, MirProgram, MirType, Operand,
    Terminator, UnOp,
};

use crate::{Backend, CodegenError};

pub struct LlvmIrBackend;

impl Backend for LlvmIrBackend {
    fn name(&self) -> &'static str {
        "llvm-ir"
    }

    fn emit(
        &self,
        program: &MirProgram,
        triple: &str,
        opt_level: u8,
        out: &mut dyn io::Write,
    ) -> Result<(), CodegenError> {
        Emitter::new(program, triple, opt_level)
            .emit(out)
            .map_err(|e| CodegenError::Io(e.to_string()))
    }
}

struct Emitter<'a> {
    program: &'a MirProgram,
    triple: &'a str,
    opt_level: u8,
    strings: Vec<String>,
    value_counter: usize,
}

impl<'a> Emitter<'a> {
    fn new(program: &'a MirProgram, triple: &'a str, opt_level: u8) -> Self {
        Self {
            program,
            triple,
            opt_level,
            strings: Vec::new(),
            value_counter: 0,
        }
    }

    fn emit(&mut self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "; ModuleID = 'cm'")?;
        writeln!(out, "target triple = \"{}\"", self.triple)?;
        writeln!(out)?;

        // Struct and tagged-union layouts.
        for s in &self.program.structs {
            let fields: Vec<String> = s.fields.iter().map(|(_, t)| scalar(t).to_string()).collect();
            writeln!(out, "%struct.{} = type {{ {} }}", sanitize(&s.name), fields.join(", "))?;
        }
        for e in &self.program.enums {
            // tag + payload bytes.
            let payload_bytes = e.size.saturating_sub(e.payload_offset);
            writeln!(
                out,
                "%enum.{} = type {{ i32, [{} x i8] }}",
                sanitize(&e.name),
                payload_bytes
            )?;
        }
        writeln!(out)?;

        // Vtables: constant slot arrays in interface order.
        for vt in &self.program.vtables {
            let slots: Vec<String> = vt
                .slots
                .iter()
                .map(|s| {
                    if s.is_empty() {
                        "ptr null".to_string()
                    } else {
                        format!("ptr @{}", sanitize(s))
                    }
                })
                .collect();
            writeln!(
                out,
                "@vtable.{}.{} = internal constant [{} x ptr] [{}]",
                sanitize(&vt.interface),
                sanitize(&vt.type_name),
                vt.slots.len(),
                slots.join(", ")
            )?;
        }

        for g in &self.program.globals {
            let init = match &g.init {
                Some(Operand::ConstInt(v)) => v.to_string(),
                Some(Operand::ConstBool(v)) => i64::from(*v).to_string(),
                _ => "0".to_string(),
            };
            writeln!(out, "@{} = global i64 {}", sanitize(&g.name), init)?;
        }
        writeln!(out)?;

        // Runtime interface.
        writeln!(out, "declare void @cm_println(ptr)")?;
        writeln!(out, "declare void @cm_print(ptr)")?;
        writeln!(out, "declare i64 @cm_slice_len(ptr)")?;
        writeln!(out, "declare ptr @cm_alloc(i64)")?;
        writeln!(out, "declare i64 @cm_vdispatch(ptr, i64, ptr)")?;
        for import in &self.program.imports {
            if !is_builtin(import) {
                writeln!(out, "declare i64 @{}(...)", sanitize(import))?;
            }
        }
        writeln!(out)?;

        let program = self.program;
        let mut body = String::new();
        for func in &program.functions {
            self.emit_function(func, &mut body)?;
        }

        // String constants are discovered while emitting bodies, so they
        // print before them.
        for (i, s) in self.strings.iter().enumerate() {
            let encoded = encode_str(s);
            writeln!(
                out,
                "@.str.{i} = private unnamed_addr constant [{} x i8] c\"{encoded}\"",
                s.len() + 1
            )?;
        }
        writeln!(out)?;
        out.write_all(body.as_bytes())?;

        writeln!(out, "; opt level {}", self.opt_level)?;
        Ok(())
    }

    fn emit_function(&mut self, func: &MirFunction, out: &mut String) -> io::Result<()> {
        use std::fmt::Write as _;
        self.value_counter = 0;

        let params: Vec<String> = func
            .params
            .iter()
            .map(|(n, t)| format!("{} %arg.{}", scalar(t), sanitize(n)))
            .collect();
        let attrs = if func.no_inline { " noinline" } else { "" };
        let _ = writeln!(
            out,
            "define {} @{}({}){attrs} {{",
            scalar(&func.return_type),
            sanitize(&func.name),
            params.join(", ")
        );

        // Allocas for every param and local.
        let _ = writeln!(out, "entry:");
        let mut slots: FxHashMap<&str, &MirType> = FxHashMap::default();
        for (n, t) in func.params.iter().chain(&func.locals) {
            slots.insert(n.as_str(), t);
            let _ = writeln!(out, "  %{}.addr = alloca {}", sanitize(n), scalar(t));
        }
        for (n, t) in &func.params {
            let _ = writeln!(
                out,
                "  store {} %arg.{}, ptr %{}.addr",
                scalar(t),
                sanitize(n),
                sanitize(n)
            );
        }
        let _ = writeln!(out, "  br label %bb0");

        for block in &func.blocks {
            let _ = writeln!(out, "bb{}:", block.id.0);
            for inst in &block.instructions {
                self.emit_inst(&inst.kind, &slots, out);
            }
            self.emit_terminator(&block.terminator, &func.return_type, out);
        }
        let _ = writeln!(out, "}}");
        let _ = writeln!(out);
        Ok(())
    }

    fn fresh(&mut self) -> String {
        let v = format!("%v{}", self.value_counter);
        self.value_counter += 1;
        v
    }

    /// Load an operand into an SSA value, returning its textual name.
    fn value_of(
        &mut self,
        op: &Operand,
        slots: &FxHashMap<&str, &MirType>,
        out: &mut String,
    ) -> String {
        use std::fmt::Write as _;
        match op {
            Operand::ConstInt(v) => v.to_string(),
            Operand::ConstBool(v) => i64::from(*v).to_string(),
            Operand::ConstFloat(v) => format!("{v:e}"),
            Operand::ConstNull => "null".to_string(),
            Operand::ConstStr(s) => {
                let idx = self.intern_string(s);
                format!("@.str.{idx}")
            }
            Operand::FuncRef(name) => format!("@{}", sanitize(name)),
            Operand::Local(name) => {
                let ty = slots.get(name.as_str()).copied();
                let v = self.fresh();
                let _ = writeln!(
                    out,
                    "  {v} = load {}, ptr %{}.addr",
                    ty.map(scalar).unwrap_or("i64"),
                    sanitize(name)
                );
                v
            }
        }
    }

    fn intern_string(&mut self, s: &str) -> usize {
        if let Some(i) = self.strings.iter().position(|existing| existing == s) {
            return i;
        }
        self.strings.push(s.to_string());
        self.strings.len() - 1
    }

    fn store_dst(&mut self, dst: &str, value: &str, ty: &str, out: &mut String) {
        use std::fmt::Write as _;
        let _ = writeln!(out, "  store {ty} {value}, ptr %{}.addr", sanitize(dst));
    }

    fn emit_inst(&mut self, inst: &InstKind, slots: &FxHashMap<&str, &MirType>, out: &mut String) {
        use std::fmt::Write as _;
        match inst {
            InstKind::Assign { dst, value } => {
                let ty = slots.get(dst.as_str()).copied().map(scalar).unwrap_or("i64");
                let v = self.value_of(value, slots, out);
                self.store_dst(dst, &v, ty, out);
            }
            InstKind::Binary { dst, op, lhs, rhs } => {
                let a = self.value_of(lhs, slots, out);
                let b = self.value_of(rhs, slots, out);
                let v = self.fresh();
                match llvm_bin_op(*op) {
                    LlvmBinOp::Arith(name) => {
                        let _ = writeln!(out, "  {v} = {name} i64 {a}, {b}");
                        self.store_dst(dst, &v, "i64", out);
                    }
                    LlvmBinOp::Cmp(cond) => {
                        let _ = writeln!(out, "  {v} = icmp {cond} i64 {a}, {b}");
                        let wide = self.fresh();
                        let _ = writeln!(out, "  {wide} = zext i1 {v} to i64");
                        self.store_dst(dst, &wide, "i64", out);
                    }
                }
            }
            InstKind::Unary { dst, op, operand } => {
                let a = self.value_of(operand, slots, out);
                let v = self.fresh();
                match op {
                    UnOp::Neg => {
                        let _ = writeln!(out, "  {v} = sub i64 0, {a}");
                    }
                    UnOp::Not => {
                        let _ = writeln!(out, "  {v} = xor i64 {a}, 1");
                    }
                    UnOp::BitNot => {
                        let _ = writeln!(out, "  {v} = xor i64 {a}, -1");
                    }
                }
                self.store_dst(dst, &v, "i64", out);
            }
            InstKind::Call { dst, func, args } => {
                let arg_values: Vec<String> = args
                    .iter()
                    .map(|a| {
                        let v = self.value_of(a, slots, out);
                        format!("{} {v}", operand_llvm_type(a, slots))
                    })
                    .collect();
                let callee = builtin_name(func);
                match dst {
                    Some(dst) => {
                        let v = self.fresh();
                        let _ = writeln!(
                            out,
                            "  {v} = call i64 @{}({})",
                            sanitize(&callee),
                            arg_values.join(", ")
                        );
                        self.store_dst(dst, &v, "i64", out);
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "  call void @{}({})",
                            sanitize(&callee),
                            arg_values.join(", ")
                        );
                    }
                }
            }
            InstKind::CallIndirect { dst, callee, args } => {
                let target = self.value_of(callee, slots, out);
                let arg_values: Vec<String> = args
                    .iter()
                    .map(|a| {
                        let v = self.value_of(a, slots, out);
                        format!("i64 {v}")
                    })
                    .collect();
                match dst {
                    Some(dst) => {
                        let v = self.fresh();
                        let _ =
                            writeln!(out, "  {v} = call i64 {target}({})", arg_values.join(", "));
                        self.store_dst(dst, &v, "i64", out);
                    }
                    None => {
                        let _ = writeln!(out, "  call void {target}({})", arg_values.join(", "));
                    }
                }
            }
            InstKind::CallVirtual {
                dst,
                slot,
                receiver,
                args,
                ..
            } => {
                // Runtime dispatch: the fat reference's vtable is indexed by
                // slot; extra arguments are packed by the runtime shim.
                let recv = self.value_of(receiver, slots, out);
                let packed = self.fresh();
                let _ = writeln!(out, "  {packed} = call ptr @cm_alloc(i64 {})", args.len() * 8);
                for (i, a) in args.iter().enumerate() {
                    let v = self.value_of(a, slots, out);
                    let gep = self.fresh();
                    let _ = writeln!(out, "  {gep} = getelementptr i64, ptr {packed}, i64 {i}");
                    let _ = writeln!(out, "  store i64 {v}, ptr {gep}");
                }
                let v = self.fresh();
                let _ = writeln!(
                    out,
                    "  {v} = call i64 @cm_vdispatch(ptr {recv}, i64 {slot}, ptr {packed})"
                );
                if let Some(dst) = dst {
                    self.store_dst(dst, &v, "i64", out);
                }
            }
            InstKind::Load { dst, ptr, volatile } => {
                let p = self.value_of(ptr, slots, out);
                let v = self.fresh();
                let vol = if *volatile { "volatile " } else { "" };
                let _ = writeln!(out, "  {v} = load {vol}i64, ptr {p}");
                self.store_dst(dst, &v, "i64", out);
            }
            InstKind::Store {
                ptr,
                value,
                volatile,
            } => {
                let v = self.value_of(value, slots, out);
                let p = self.value_of(ptr, slots, out);
                let vol = if *volatile { "volatile " } else { "" };
                let _ = writeln!(out, "  store {vol}i64 {v}, ptr {p}");
            }
            InstKind::Gep { dst, base, index } => {
                let base_ptr = match base {
                    GepBase::Local(name) => format!("%{}.addr", sanitize(name)),
                    GepBase::Ptr(op) => self.value_of(op, slots, out),
                };
                let v = self.fresh();
                match index {
                    GepIndex::Field(i) => {
                        let _ = writeln!(
                            out,
                            "  {v} = getelementptr inbounds i64, ptr {base_ptr}, i64 {i}"
                        );
                    }
                    GepIndex::Element(op) => {
                        let idx = self.value_of(op, slots, out);
                        let _ = writeln!(
                            out,
                            "  {v} = getelementptr inbounds i64, ptr {base_ptr}, i64 {idx}"
                        );
                    }
                    GepIndex::None => {
                        let _ = writeln!(out, "  {v} = getelementptr i8, ptr {base_ptr}, i64 0");
                    }
                }
                self.store_dst(dst, &v, "ptr", out);
            }
            InstKind::Cast { dst, value, to } => {
                let v = self.value_of(value, slots, out);
                // Scalars share the i64 representation; the cast narrows or
                // re-widens through the target width.
                match to {
                    MirType::Int { width, signed } if *width < 64 => {
                        let narrow = self.fresh();
                        let wide = self.fresh();
                        let _ = writeln!(out, "  {narrow} = trunc i64 {v} to i{width}");
                        let ext = if *signed { "sext" } else { "zext" };
                        let _ = writeln!(out, "  {wide} = {ext} i{width} {narrow} to i64");
                        self.store_dst(dst, &wide, "i64", out);
                    }
                    _ => {
                        self.store_dst(dst, &v, "i64", out);
                    }
                }
            }
            InstKind::Phi { dst, incoming } => {
                let inc: Vec<String> = incoming
                    .iter()
                    .map(|(bb, op)| {
                        let v = match op {
                            Operand::Local(_) => {
                                // Phi operands must be SSA values from the
                                // predecessor; with alloca form a load here
                                // is equivalent.
                                return format!("[ poison, %bb{} ]", bb.0);
                            }
                            other => self.const_text(other),
                        };
                        format!("[ {v}, %bb{} ]", bb.0)
                    })
                    .collect();
                let v = self.fresh();
                let _ = writeln!(out, "  {v} = phi i64 {}", inc.join(", "));
                self.store_dst(dst, &v, "i64", out);
            }
            InstKind::Select {
                dst,
                cond,
                then_value,
                else_value,
            } => {
                let c = self.value_of(cond, slots, out);
                let narrow = self.fresh();
                let _ = writeln!(out, "  {narrow} = trunc i64 {c} to i1");
                let a = self.value_of(then_value, slots, out);
                let b = self.value_of(else_value, slots, out);
                let v = self.fresh();
                let _ = writeln!(out, "  {v} = select i1 {narrow}, i64 {a}, i64 {b}");
                self.store_dst(dst, &v, "i64", out);
            }
            InstKind::Aggregate { dst, kind, elems } => {
                // Aggregates live in runtime-allocated storage.
                let size = (elems.len().max(1) * 8) as i64;
                let p = self.fresh();
                let _ = writeln!(out, "  {p} = call ptr @cm_alloc(i64 {size})");
                if let AggregateKind::Enum { tag, .. } = kind {
                    let _ = writeln!(out, "  store i64 {tag}, ptr {p}");
                }
                for (i, elem) in elems.iter().enumerate() {
                    let v = self.value_of(elem, slots, out);
                    let offset = if matches!(kind, AggregateKind::Enum { .. }) {
                        i + 1
                    } else {
                        i
                    };
                    let gep = self.fresh();
                    let _ = writeln!(out, "  {gep} = getelementptr i64, ptr {p}, i64 {offset}");
                    let _ = writeln!(out, "  store i64 {v}, ptr {gep}");
                }
                self.store_dst(dst, &p, "ptr", out);
            }
            InstKind::InlineAsm {
                template,
                constraints,
                operands,
            } => {
                let args: Vec<String> = operands
                    .iter()
                    .map(|o| {
                        let v = self.value_of(o, slots, out);
                        format!("i64 {v}")
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  call void asm sideeffect \"{}\", \"{}\"({})",
                    template.replace('"', "\\22"),
                    constraints,
                    args.join(", ")
                );
            }
            InstKind::DebugMarker(text) => {
                let _ = writeln!(out, "  ; {text}");
            }
        }
    }

    fn const_text(&mut self, op: &Operand) -> String {
        match op {
            Operand::ConstInt(v) => v.to_string(),
            Operand::ConstBool(v) => i64::from(*v).to_string(),
            Operand::ConstFloat(v) => format!("{v:e}"),
            Operand::ConstNull => "null".to_string(),
            Operand::ConstStr(s) => {
                let idx = self.intern_string(s);
                format!("@.str.{idx}")
            }
            Operand::Local(name) => format!("%{}", sanitize(name)),
            Operand::FuncRef(name) => format!("@{}", sanitize(name)),
        }
    }

    fn emit_terminator(&mut self, term: &Terminator, ret_ty: &MirType, out: &mut String) {
        use std::fmt::Write as _;
        let slots = FxHashMap::default();
        match term {
            Terminator::Branch(bb) => {
                let _ = writeln!(out, "  br label %bb{}", bb.0);
            }
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => {
                let c = self.value_of(cond, &slots, out);
                let narrow = self.fresh();
                let _ = writeln!(out, "  {narrow} = trunc i64 {c} to i1");
                let _ = writeln!(
                    out,
                    "  br i1 {narrow}, label %bb{}, label %bb{}",
                    then_block.0, else_block.0
                );
            }
            Terminator::Return(value) => match value {
                Some(v) => {
                    let v = self.value_of(v, &slots, out);
                    let _ = writeln!(out, "  ret {} {v}", scalar(ret_ty));
                }
                None => {
                    if ret_ty.is_void() {
                        let _ = writeln!(out, "  ret void");
                    } else {
                        let _ = writeln!(out, "  ret {} 0", scalar(ret_ty));
                    }
                }
            },
            Terminator::Switch {
                value,
                cases,
                default,
            } => {
                let v = self.value_of(value, &slots, out);
                let arms: Vec<String> = cases
                    .iter()
                    .map(|(val, bb)| format!("i64 {val}, label %bb{}", bb.0))
                    .collect();
                let _ = writeln!(
                    out,
                    "  switch i64 {v}, label %bb{} [ {} ]",
                    default.0,
                    arms.join(" ")
                );
            }
            Terminator::Unreachable => {
                let _ = writeln!(out, "  unreachable");
            }
        }
    }
}

enum LlvmBinOp {
    Arith(&'static str),
    Cmp(&'static str),
}

fn llvm_bin_op(op: BinOp) -> LlvmBinOp {
    match op {
        BinOp::Add => LlvmBinOp::Arith("add"),
        BinOp::Sub => LlvmBinOp::Arith("sub"),
        BinOp::Mul => LlvmBinOp::Arith("mul"),
        BinOp::Div => LlvmBinOp::Arith("sdiv"),
        BinOp::Rem => LlvmBinOp::Arith("srem"),
        BinOp::BitAnd => LlvmBinOp::Arith("and"),
        BinOp::BitOr => LlvmBinOp::Arith("or"),
        BinOp::BitXor => LlvmBinOp::Arith("xor"),
        BinOp::Shl => LlvmBinOp::Arith("shl"),
        BinOp::Shr => LlvmBinOp::Arith("ashr"),
        BinOp::Eq => LlvmBinOp::Cmp("eq"),
        BinOp::Ne => LlvmBinOp::Cmp("ne"),
        BinOp::Lt => LlvmBinOp::Cmp("slt"),
        BinOp::Le => LlvmBinOp::Cmp("sle"),
        BinOp::Gt => LlvmBinOp::Cmp("sgt"),
        BinOp::Ge => LlvmBinOp::Cmp("sge"),
    }
}

/// The uniform scalar spelling of a type.
fn scalar(ty: &MirType) -> &'static str {
    match ty {
        MirType::Void => "void",
        MirType::Float32 | MirType::Float64 => "double",
        MirType::Str
        | MirType::CStr
        | MirType::Ptr(_)
        | MirType::Struct(_)
        | MirType::Enum(_)
        | MirType::Array { .. }
        | MirType::FnPtr { .. }
        | MirType::Interface(_) => "ptr",
        _ => "i64",
    }
}

fn operand_llvm_type(op: &Operand, slots: &FxHashMap<&str, &MirType>) -> &'static str {
    match op {
        Operand::ConstStr(_) | Operand::ConstNull | Operand::FuncRef(_) => "ptr",
        Operand::ConstFloat(_) => "double",
        Operand::Local(name) => slots.get(name.as_str()).copied().map(scalar).unwrap_or("i64"),
        _ => "i64",
    }
}

fn builtin_name(func: &str) -> String {
    match func {
        "println" => "cm_println".to_string(),
        "print" => "cm_print".to_string(),
        "__builtin_slice_len" => "cm_slice_len".to_string(),
        other => other.to_string(),
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "println" | "print" | "__builtin_slice_len")
}

fn sanitize(name: &str) -> String {
    name.replace("::", ".").replace(['%', ' '], "")
}

fn encode_str(s: &str) -> String {
    let mut out = String::new();
    for byte in s.bytes() {
        match byte {
            b' '..=b'~' if byte != b'"' && byte != b'\\' => out.push(byte as char),
            _ => out.push_str(&format!("\\{byte:02X}")),
        }
    }
    out.push_str("\\00");
    out
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
        LlvmIrBackend
            .emit(&mir, "x86_64-unknown-linux-gnu", 1, &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn hello_world_shape() {
        let ir = emit("int main() { println(\"hello\"); return 0; }");
        assert!(ir.contains("target triple = \"x86_64-unknown-linux-gnu\""), "{ir}");
        assert!(ir.contains("define i64 @main()"), "{ir}");
        assert!(ir.contains("call void @cm_println"), "{ir}");
        assert!(ir.contains("@.str.0"), "{ir}");
        assert!(ir.contains("ret i64"), "{ir}");
    }

    #[test]
    fn struct_type_is_declared() {
        let ir = emit("struct P { int x; int y; }\nint main() { P p = P { x: 1, y: 2 }; return p.x; }");
        assert!(ir.contains("%struct.P = type { i64, i64 }"), "{ir}");
    }

    #[test]
    fn vtable_constant_emitted() {
        let ir = emit(
            "interface Shape { int area(); }\n\
             struct Sq { int s; }\n\
             impl Shape for Sq { int area() { return 1; } }\n\
             int use_it(Shape s) { return s.area(); }\n\
             export int keep() { return 0; }\n\
             int main() { return 0; }",
        );
        assert!(
            ir.contains("@vtable.Shape.Sq = internal constant [1 x ptr] [ptr @Sq__area__Shape]"),
            "{ir}"
        );
        assert!(ir.contains("@cm_vdispatch"), "{ir}");
    }

    #[test]
    fn noinline_attribute_from_hint() {
        let (program, _) = parse_source("int f() { return f(); }\nint main() { return 0; }", "t.cm");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mut mir = cm_mir::lower::lower_program(&mono).unwrap();
        crate::limiter::apply(&mut mir, 2);

        let mut buffer = Vec::new();
        LlvmIrBackend.emit(&mir, "t", 1, &mut buffer).unwrap();
        let ir = String::from_utf8(buffer).unwrap();
        assert!(ir.contains("define i64 @f() noinline"), "{ir}");
    }
}
