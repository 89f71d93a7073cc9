//! The MIR interpreter: `cm run`'s execution engine.
//!
//! A direct tree-walker over the flat CFG. Locals are `Rc<RefCell<...>>`
//! slots so `gep` can hand out real interior pointers; aggregates copy
//! deeply on assignment to keep value semantics. This is the one exit that
//! keeps interface calls dynamic: a `CallVirtual` resolves
//! `Type__method__Interface` by name at the call point, so the whole
//! program must still be present (program DCE is skipped in run mode).

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use cm_mir::{
    AggregateKind, BinOp, BlockId, GepBase, GepIndex, InstKind, MirFunction, MirProgram, MirType,
    Operand, Terminator, UnOp,
};

const MAX_CALL_DEPTH: usize = 8_192;

#[derive(Debug, Clone, PartialEq)]
pub struct InterpError {
    pub message: String,
}

impl InterpError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for InterpError {}

/// A storage slot; `gep` results point at these.
pub type Slot = Rc<RefCell<Value>>;

fn slot(value: Value) -> Slot {
    Rc::new(RefCell::new(value))
}

#[derive(Debug, Clone)]
pub enum Value {
    Unit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Struct {
        name: String,
        fields: Vec<Slot>,
    },
    Array(Vec<Slot>),
    /// Tagged union: field 0 is the tag, field 1 the payload record.
    Enum {
        name: String,
        tag: Slot,
        payload: Slot,
    },
    Ptr(Slot),
    FnRef(String),
    /// Fat interface reference: the data slot plus the concrete type name
    /// used for dynamic method resolution.
    Iface {
        data: Slot,
        type_name: String,
    },
    Null,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Null | Value::Unit => false,
            _ => true,
        }
    }

    fn as_int(&self) -> Result<i64, InterpError> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(f) => Ok(*f as i64),
            other => Err(InterpError::new(format!("expected an integer, got {other:?}"))),
        }
    }

    /// Deep copy: aggregates get fresh slots so assignment keeps value
    /// semantics.
    fn deep_copy(&self) -> Value {
        match self {
            Value::Struct { name, fields } => Value::Struct {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|f| slot(f.borrow().deep_copy()))
                    .collect(),
            },
            Value::Array(elems) => Value::Array(
                elems.iter().map(|e| slot(e.borrow().deep_copy())).collect(),
            ),
            Value::Enum { name, tag, payload } => Value::Enum {
                name: name.clone(),
                tag: slot(tag.borrow().deep_copy()),
                payload: slot(payload.borrow().deep_copy()),
            },
            other => other.clone(),
        }
    }

    fn display(&self) -> String {
        match self {
            Value::Unit => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Null => "null".to_string(),
            Value::Struct { name, .. } => format!("<{name}>"),
            Value::Array(elems) => format!("<array[{}]>", elems.len()),
            Value::Enum { name, .. } => format!("<{name}>"),
            Value::Ptr(_) => "<ptr>".to_string(),
            Value::FnRef(name) => format!("<fn {name}>"),
            Value::Iface { type_name, .. } => format!("<dyn {type_name}>"),
        }
    }
}

struct Frame {
    locals: FxHashMap<String, Slot>,
    prev_block: Option<BlockId>,
}

/// What a function body evaluation produced.
enum Flow {
    Return(Value),
}

pub struct Interpreter<'p, 'w> {
    program: &'p MirProgram,
    globals: FxHashMap<String, Slot>,
    output: &'w mut dyn Write,
    depth: usize,
}

impl<'p, 'w> Interpreter<'p, 'w> {
    pub fn new(program: &'p MirProgram, output: &'w mut dyn Write) -> Self {
        let mut globals = FxHashMap::default();
        for g in &program.globals {
            let value = g
                .init
                .as_ref()
                .map(const_value)
                .unwrap_or(Value::Int(0));
            globals.insert(g.name.clone(), slot(value));
        }
        Self {
            program,
            globals,
            output,
            depth: 0,
        }
    }

    /// Run `main`; its integer return becomes the exit code.
    pub fn execute(&mut self) -> Result<i64, InterpError> {
        let Some(main) = self.program.function("main") else {
            return Err(InterpError::new("no `main` function"));
        };
        let result = self.call(main, Vec::new())?;
        Ok(match result {
            Value::Int(code) => code,
            Value::Bool(b) => i64::from(b),
            _ => 0,
        })
    }

    fn call_by_name(&mut self, name: &str, args: Vec<Value>) -> Result<Value, InterpError> {
        if let Some(result) = self.builtin(name, &args)? {
            return Ok(result);
        }
        let Some(func) = self.program.function(name) else {
            return Err(InterpError::new(format!("undefined function `{name}`")));
        };
        self.call(func, args)
    }

    fn call(&mut self, func: &'p MirFunction, args: Vec<Value>) -> Result<Value, InterpError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpError::new("call stack overflow"));
        }
        self.depth += 1;

        let mut frame = Frame {
            locals: FxHashMap::default(),
            prev_block: None,
        };
        for ((name, ty), value) in func.params.iter().zip(args) {
            // Deep copy keeps value semantics for aggregate arguments;
            // pointers still share their target.
            let value = coerce_param(value.deep_copy(), ty);
            frame.locals.insert(name.clone(), slot(value));
        }

        let result = self.run_blocks(func, &mut frame);
        self.depth -= 1;
        result.map(|Flow::Return(v)| v)
    }

    fn run_blocks(&mut self, func: &'p MirFunction, frame: &mut Frame) -> Result<Flow, InterpError> {
        let mut block_id = BlockId(0);
        loop {
            let block = func
                .blocks
                .get(block_id.0)
                .ok_or_else(|| InterpError::new(format!("missing block bb{}", block_id.0)))?;

            for inst in &block.instructions {
                self.exec_inst(&inst.kind, frame)?;
            }

            match &block.terminator {
                Terminator::Branch(next) => {
                    frame.prev_block = Some(block_id);
                    block_id = *next;
                }
                Terminator::CondBranch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let next = if self.eval(cond, frame)?.truthy() {
                        *then_block
                    } else {
                        *else_block
                    };
                    frame.prev_block = Some(block_id);
                    block_id = next;
                }
                Terminator::Return(value) => {
                    let value = match value {
                        Some(v) => self.eval(v, frame)?,
                        None => Value::Unit,
                    };
                    return Ok(Flow::Return(value));
                }
                Terminator::Switch {
                    value,
                    cases,
                    default,
                } => {
                    let v = self.eval(value, frame)?.as_int()?;
                    let next = cases
                        .iter()
                        .find(|(case, _)| *case == v)
                        .map(|(_, bb)| *bb)
                        .unwrap_or(*default);
                    frame.prev_block = Some(block_id);
                    block_id = next;
                }
                Terminator::Unreachable => {
                    return Err(InterpError::new(format!(
                        "reached unreachable code in `{}`",
                        func.name
                    )));
                }
            }
        }
    }

    // ── Instructions ───────────────────────────────────────────────────

    fn exec_inst(&mut self, inst: &InstKind, frame: &mut Frame) -> Result<(), InterpError> {
        match inst {
            InstKind::Assign { dst, value } => {
                let v = self.eval(value, frame)?.deep_copy();
                self.set_local(frame, dst, v);
            }
            InstKind::Binary { dst, op, lhs, rhs } => {
                let a = self.eval(lhs, frame)?;
                let b = self.eval(rhs, frame)?;
                let v = binary(*op, a, b)?;
                self.set_local(frame, dst, v);
            }
            InstKind::Unary { dst, op, operand } => {
                let a = self.eval(operand, frame)?;
                let v = match op {
                    UnOp::Neg => match a {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(InterpError::new(format!("cannot negate {other:?}")))
                        }
                    },
                    UnOp::Not => Value::Bool(!a.truthy()),
                    UnOp::BitNot => Value::Int(!a.as_int()?),
                };
                self.set_local(frame, dst, v);
            }
            InstKind::Call { dst, func: name, args } => {
                let args = self.eval_args(args, frame)?;
                let result = self.call_by_name(name, args)?;
                if let Some(dst) = dst {
                    self.set_local(frame, dst, result);
                }
            }
            InstKind::CallIndirect { dst, callee, args } => {
                let target = self.eval(callee, frame)?;
                let Value::FnRef(name) = target else {
                    return Err(InterpError::new("indirect call through a non-function value"));
                };
                let args = self.eval_args(args, frame)?;
                let result = self.call_by_name(&name, args)?;
                if let Some(dst) = dst {
                    self.set_local(frame, dst, result);
                }
            }
            InstKind::CallVirtual {
                dst,
                interface,
                method,
                receiver,
                args,
                ..
            } => {
                let receiver = self.eval(receiver, frame)?;
                let (data, type_name) = match receiver {
                    Value::Iface { data, type_name } => (Value::Ptr(data), type_name),
                    Value::Struct { ref name, .. } => (receiver.clone(), name.clone()),
                    Value::Ptr(ref inner) => {
                        let type_name = match &*inner.borrow() {
                            Value::Struct { name, .. } => name.clone(),
                            Value::Iface { type_name, .. } => type_name.clone(),
                            other => {
                                return Err(InterpError::new(format!(
                                    "virtual call through non-struct pointer: {other:?}"
                                )))
                            }
                        };
                        (Value::Ptr(Rc::clone(inner)), type_name)
                    }
                    other => {
                        return Err(InterpError::new(format!(
                            "virtual call on non-interface value: {other:?}"
                        )))
                    }
                };

                // Dynamic resolution at the call point.
                let target = format!("{type_name}__{method}__{interface}");
                let mut call_args = vec![data];
                call_args.extend(self.eval_args(args, frame)?);
                let result = self.call_by_name(&target, call_args)?;
                if let Some(dst) = dst {
                    self.set_local(frame, dst, result);
                }
            }
            InstKind::Load { dst, ptr, .. } => {
                let target = self.eval(ptr, frame)?;
                let Value::Ptr(target_slot) = target else {
                    return Err(InterpError::new("load through a non-pointer value"));
                };
                let v = target_slot.borrow().deep_copy();
                self.set_local(frame, dst, v);
            }
            InstKind::Store { ptr, value, .. } => {
                let v = self.eval(value, frame)?.deep_copy();
                let target = self.eval(ptr, frame)?;
                let Value::Ptr(target_slot) = target else {
                    return Err(InterpError::new("store through a non-pointer value"));
                };
                *target_slot.borrow_mut() = v;
            }
            InstKind::Gep { dst, base, index } => {
                let base_slot = match base {
                    GepBase::Local(name) => self.local_slot(frame, name),
                    GepBase::Ptr(op) => match self.eval(op, frame)? {
                        Value::Ptr(s) => s,
                        other => {
                            return Err(InterpError::new(format!(
                                "gep through a non-pointer value: {other:?}"
                            )))
                        }
                    },
                };
                let target = self.gep_index(base_slot, index, frame)?;
                self.set_local(frame, dst, Value::Ptr(target));
            }
            InstKind::Cast { dst, value, to } => {
                let v = self.eval(value, frame)?;
                let v = cast(v, to)?;
                self.set_local(frame, dst, v);
            }
            InstKind::Phi { dst, incoming } => {
                let prev = frame
                    .prev_block
                    .ok_or_else(|| InterpError::new("phi with no predecessor"))?;
                let op = incoming
                    .iter()
                    .find(|(bb, _)| *bb == prev)
                    .map(|(_, op)| op)
                    .ok_or_else(|| {
                        InterpError::new(format!("phi has no incoming edge for bb{}", prev.0))
                    })?;
                let v = self.eval(op, frame)?;
                self.set_local(frame, dst, v);
            }
            InstKind::Select {
                dst,
                cond,
                then_value,
                else_value,
            } => {
                let v = if self.eval(cond, frame)?.truthy() {
                    self.eval(then_value, frame)?
                } else {
                    self.eval(else_value, frame)?
                };
                self.set_local(frame, dst, v);
            }
            InstKind::Aggregate { dst, kind, elems } => {
                let values: Vec<Slot> = elems
                    .iter()
                    .map(|e| Ok(slot(self.eval(e, frame)?.deep_copy())))
                    .collect::<Result<_, InterpError>>()?;
                let v = match kind {
                    AggregateKind::Struct(name) => Value::Struct {
                        name: name.clone(),
                        fields: values,
                    },
                    AggregateKind::Array(_) => Value::Array(values),
                    AggregateKind::Enum { enum_name, tag, .. } => Value::Enum {
                        name: enum_name.clone(),
                        tag: slot(Value::Int(*tag as i64)),
                        payload: slot(Value::Struct {
                            name: String::new(),
                            fields: values,
                        }),
                    },
                };
                self.set_local(frame, dst, v);
            }
            InstKind::InlineAsm { .. } => {
                return Err(InterpError::new(
                    "__llvm__ inline assembly is not supported by the interpreter",
                ));
            }
            InstKind::DebugMarker(_) => {}
        }
        Ok(())
    }

    fn gep_index(
        &mut self,
        base: Slot,
        index: &GepIndex,
        frame: &mut Frame,
    ) -> Result<Slot, InterpError> {
        match index {
            GepIndex::None => Ok(base),
            GepIndex::Field(i) => {
                let inner = base.borrow();
                match &*inner {
                    Value::Struct { fields, .. } => fields.get(*i).cloned().ok_or_else(|| {
                        InterpError::new(format!("field index {i} out of bounds"))
                    }),
                    Value::Enum { tag, payload, .. } => Ok(if *i == 0 {
                        Rc::clone(tag)
                    } else {
                        Rc::clone(payload)
                    }),
                    // One level of pointer indirection is transparent.
                    Value::Ptr(next) => {
                        let next = Rc::clone(next);
                        drop(inner);
                        self.gep_index(next, index, frame)
                    }
                    Value::Iface { data, .. } => {
                        let next = Rc::clone(data);
                        drop(inner);
                        self.gep_index(next, index, frame)
                    }
                    other => Err(InterpError::new(format!(
                        "field access on non-aggregate value: {other:?}"
                    ))),
                }
            }
            GepIndex::Element(op) => {
                let idx = self.eval(op, frame)?.as_int()?;
                let inner = base.borrow();
                match &*inner {
                    Value::Array(elems) => {
                        elems.get(idx as usize).cloned().ok_or_else(|| {
                            InterpError::new(format!(
                                "index {idx} out of bounds (len {})",
                                elems.len()
                            ))
                        })
                    }
                    Value::Ptr(next) => {
                        let next = Rc::clone(next);
                        drop(inner);
                        self.gep_index(next, index, frame)
                    }
                    other => Err(InterpError::new(format!(
                        "element access on non-array value: {other:?}"
                    ))),
                }
            }
        }
    }

    fn eval_args(&mut self, args: &[Operand], frame: &mut Frame) -> Result<Vec<Value>, InterpError> {
        args.iter().map(|a| self.eval(a, frame)).collect()
    }

    fn eval(&mut self, op: &Operand, frame: &mut Frame) -> Result<Value, InterpError> {
        Ok(match op {
            Operand::ConstInt(v) => Value::Int(*v),
            Operand::ConstFloat(v) => Value::Float(*v),
            Operand::ConstBool(v) => Value::Bool(*v),
            Operand::ConstStr(s) => Value::Str(s.clone()),
            Operand::ConstNull => Value::Null,
            Operand::FuncRef(name) => Value::FnRef(name.clone()),
            Operand::Local(name) => {
                let local = self.local_slot(frame, name);
                let v = local.borrow().clone();
                v
            }
        })
    }

    /// A local's slot, falling back to globals, creating on first write.
    fn local_slot(&mut self, frame: &mut Frame, name: &str) -> Slot {
        if let Some(existing) = frame.locals.get(name) {
            return Rc::clone(existing);
        }
        if let Some(global) = self.globals.get(name) {
            return Rc::clone(global);
        }
        let fresh = slot(Value::Unit);
        frame.locals.insert(name.to_string(), Rc::clone(&fresh));
        fresh
    }

    fn set_local(&mut self, frame: &mut Frame, name: &str, value: Value) {
        let target = self.local_slot(frame, name);
        *target.borrow_mut() = value;
    }

    // ── Builtins ───────────────────────────────────────────────────────

    fn builtin(&mut self, name: &str, args: &[Value]) -> Result<Option<Value>, InterpError> {
        match name {
            "println" => {
                let text = args.first().map(Value::display).unwrap_or_default();
                writeln!(self.output, "{text}")
                    .map_err(|e| InterpError::new(format!("write failed: {e}")))?;
                Ok(Some(Value::Unit))
            }
            "print" => {
                let text = args.first().map(Value::display).unwrap_or_default();
                write!(self.output, "{text}")
                    .map_err(|e| InterpError::new(format!("write failed: {e}")))?;
                Ok(Some(Value::Unit))
            }
            "__builtin_slice_len" => {
                let len = match args.first() {
                    Some(Value::Array(elems)) => elems.len() as i64,
                    Some(Value::Str(s)) => s.len() as i64,
                    _ => 0,
                };
                Ok(Some(Value::Int(len)))
            }
            _ => Ok(None),
        }
    }
}

/// Wrap a value for an interface-typed parameter.
fn coerce_param(value: Value, ty: &MirType) -> Value {
    if let MirType::Interface(_) = ty {
        match value {
            Value::Iface { .. } => value,
            Value::Struct { ref name, .. } => {
                let type_name = name.clone();
                Value::Iface {
                    data: slot(value),
                    type_name,
                }
            }
            other => other,
        }
    } else {
        value
    }
}

fn const_value(op: &Operand) -> Value {
    match op {
        Operand::ConstInt(v) => Value::Int(*v),
        Operand::ConstFloat(v) => Value::Float(*v),
        Operand::ConstBool(v) => Value::Bool(*v),
        Operand::ConstStr(s) => Value::Str(s.clone()),
        Operand::ConstNull => Value::Null,
        Operand::FuncRef(name) => Value::FnRef(name.clone()),
        Operand::Local(_) => Value::Int(0),
    }
}

fn binary(op: BinOp, a: Value, b: Value) -> Result<Value, InterpError> {
    // String and float forms first; everything else is integer arithmetic
    // with wrapping semantics.
    match (&a, &b) {
        (Value::Str(x), Value::Str(y)) => {
            return Ok(match op {
                BinOp::Add => Value::Str(format!("{x}{y}")),
                BinOp::Eq => Value::Bool(x == y),
                BinOp::Ne => Value::Bool(x != y),
                BinOp::Lt => Value::Bool(x < y),
                BinOp::Le => Value::Bool(x <= y),
                BinOp::Gt => Value::Bool(x > y),
                BinOp::Ge => Value::Bool(x >= y),
                _ => {
                    return Err(InterpError::new(format!(
                        "operator {op:?} is not defined for strings"
                    )))
                }
            });
        }
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let x = match a {
                Value::Float(f) => f,
                ref other => other.as_int()? as f64,
            };
            let y = match b {
                Value::Float(f) => f,
                ref other => other.as_int()? as f64,
            };
            return Ok(match op {
                BinOp::Add => Value::Float(x + y),
                BinOp::Sub => Value::Float(x - y),
                BinOp::Mul => Value::Float(x * y),
                BinOp::Div => Value::Float(x / y),
                BinOp::Rem => Value::Float(x % y),
                BinOp::Eq => Value::Bool(x == y),
                BinOp::Ne => Value::Bool(x != y),
                BinOp::Lt => Value::Bool(x < y),
                BinOp::Le => Value::Bool(x <= y),
                BinOp::Gt => Value::Bool(x > y),
                BinOp::Ge => Value::Bool(x >= y),
                _ => {
                    return Err(InterpError::new(format!(
                        "operator {op:?} is not defined for floats"
                    )))
                }
            });
        }
        _ => {}
    }

    let x = a.as_int()?;
    let y = b.as_int()?;
    Ok(match op {
        BinOp::Add => Value::Int(x.wrapping_add(y)),
        BinOp::Sub => Value::Int(x.wrapping_sub(y)),
        BinOp::Mul => Value::Int(x.wrapping_mul(y)),
        BinOp::Div => {
            if y == 0 {
                return Err(InterpError::new("division by zero"));
            }
            Value::Int(x.wrapping_div(y))
        }
        BinOp::Rem => {
            if y == 0 {
                return Err(InterpError::new("remainder by zero"));
            }
            Value::Int(x.wrapping_rem(y))
        }
        BinOp::BitAnd => Value::Int(x & y),
        BinOp::BitOr => Value::Int(x | y),
        BinOp::BitXor => Value::Int(x ^ y),
        BinOp::Shl => Value::Int(x.wrapping_shl(y as u32)),
        BinOp::Shr => Value::Int(x.wrapping_shr(y as u32)),
        BinOp::Eq => Value::Bool(x == y),
        BinOp::Ne => Value::Bool(x != y),
        BinOp::Lt => Value::Bool(x < y),
        BinOp::Le => Value::Bool(x <= y),
        BinOp::Gt => Value::Bool(x > y),
        BinOp::Ge => Value::Bool(x >= y),
    })
}

fn cast(value: Value, to: &MirType) -> Result<Value, InterpError> {
    Ok(match to {
        MirType::Int { width, signed } => {
            let raw = match value {
                Value::Float(f) => f as i64,
                other => other.as_int()?,
            };
            let truncated = match width {
                8 => {
                    if *signed {
                        raw as i8 as i64
                    } else {
                        raw as u8 as i64
                    }
                }
                16 => {
                    if *signed {
                        raw as i16 as i64
                    } else {
                        raw as u16 as i64
                    }
                }
                32 => {
                    if *signed {
                        raw as i32 as i64
                    } else {
                        raw as u32 as i64
                    }
                }
                _ => raw,
            };
            Value::Int(truncated)
        }
        MirType::Float32 | MirType::Float64 => match value {
            Value::Float(f) => Value::Float(f),
            other => Value::Float(other.as_int()? as f64),
        },
        MirType::Bool => Value::Bool(value.truthy()),
        MirType::Str => Value::Str(value.display()),
        _ => value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_hir::HirLowering;
    use cm_parser::parse_source;

    fn run(source: &str) -> (i64, String) {
        let (program, diags) = parse_source(source, "test.cm");
        assert!(diags.is_empty(), "parse: {diags:?}");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        assert!(
            lowering.diagnostics().is_empty(),
            "lowering: {:?}",
            lowering.diagnostics()
        );
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();

        let mut output = Vec::new();
        let code = Interpreter::new(&mir, &mut output).execute().unwrap();
        (code, String::from_utf8(output).unwrap())
    }

    #[test]
    fn hello_world() {
        let (code, out) = run("int main() { println(\"hello\"); return 0; }");
        assert_eq!(code, 0);
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn exit_code_is_forwarded() {
        let (code, _) = run("int main() { return 42; }");
        assert_eq!(code, 42);
    }

    #[test]
    fn arithmetic_and_branches() {
        let (code, _) = run("int main() { int x = 10; if x > 5 { return x * 2; } return 0; }");
        assert_eq!(code, 20);
    }

    #[test]
    fn while_loop_sums() {
        let (code, _) = run(
            "int main() { int i = 0; int total = 0; while i < 5 { total = total + i; i = i + 1; } return total; }",
        );
        assert_eq!(code, 10);
    }

    #[test]
    fn generic_identity_runs() {
        let (code, _) = run("<T> T id(T x) { return x; }\nint main() { return id<int>(7); }");
        assert_eq!(code, 7);
    }

    #[test]
    fn defer_lifo_order() {
        let (_, out) = run(
            "int main() { defer println(\"1\"); defer println(\"2\"); return 0; }",
        );
        assert_eq!(out, "2\n1\n");
    }

    #[test]
    fn match_with_binding_and_guard() {
        let (code, _) = run(
            "enum E { A(int), B }\nint main() { E e = E::A(42); match e { A(n) if n > 0 => return n; _ => return -1; } return 0; }",
        );
        assert_eq!(code, 42);
    }

    #[test]
    fn match_guard_failure_falls_through() {
        let (code, _) = run(
            "enum E { A(int), B }\nint main() { E e = E::A(-5); match e { A(n) if n > 0 => return n; _ => return 1; } return 0; }",
        );
        assert_eq!(code, 1);
    }

    #[test]
    fn struct_fields_and_methods() {
        let (code, _) = run(
            "struct Point { int x; int y; }\n\
             impl Point { int sum() { return this.x + this.y; } }\n\
             int main() { Point p = Point { x: 3, y: 4 }; return p.sum(); }",
        );
        assert_eq!(code, 7);
    }

    #[test]
    fn constructor_sugar_runs() {
        let (code, _) = run(
            "struct Point { int x; int y; }\n\
             impl Point { self(int x, int y) { this.x = x; this.y = y; } }\n\
             int main() { Point p = Point(3, 9); return p.x + p.y; }",
        );
        assert_eq!(code, 12);
    }

    #[test]
    fn interface_dynamic_dispatch() {
        let (code, _) = run(
            "interface Shape { int area(); }\n\
             struct Square { int side; }\n\
             impl Shape for Square { int area() { return this.side * this.side; } }\n\
             int measure(Shape s) { return s.area(); }\n\
             int main() { Square q = Square { side: 5 }; return measure(q); }",
        );
        assert_eq!(code, 25);
    }

    #[test]
    fn array_for_in_iteration() {
        let (code, _) = run(
            "int main() { [int; 3] xs = [1, 2, 3]; int total = 0; for x in xs { total = total + x; } return total; }",
        );
        assert_eq!(code, 6);
    }

    #[test]
    fn switch_statement_runs() {
        let (code, _) = run(
            "int main() { int x = 2; switch (x) { case 1: return 10; case 2: return 20; default: return 0; } return -1; }",
        );
        assert_eq!(code, 20);
    }

    #[test]
    fn ternary_select() {
        let (code, _) = run("int main() { int a = 3; int b = 9; return a > b ? a : b; }");
        assert_eq!(code, 9);
    }

    #[test]
    fn function_pointer_call() {
        let (code, _) = run(
            "int double_it(int x) { return x * 2; }\nint main() { int(int) f = double_it; return f(21); }",
        );
        assert_eq!(code, 42);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let (program, _) = parse_source("int main() { int z = 0; return 1 / z; }", "t.cm");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut output = Vec::new();
        let err = Interpreter::new(&mir, &mut output).execute().unwrap_err();
        assert!(err.message.contains("division by zero"), "{err}");
    }

    #[test]
    fn infinite_recursion_overflows_cleanly() {
        let (program, _) = parse_source("int f() { return f(); }\nint main() { return f(); }", "t.cm");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut output = Vec::new();
        let err = Interpreter::new(&mir, &mut output).execute().unwrap_err();
        assert!(err.message.contains("stack overflow"), "{err}");
    }

    #[test]
    fn missing_main_is_reported() {
        let (program, _) = parse_source("int helper() { return 1; }", "t.cm");
        let mut lowering = HirLowering::new();
        let hir = lowering.lower(&program).unwrap();
        let mono = cm_mir::mono::monomorphize(&hir).unwrap();
        let mir = cm_mir::lower::lower_program(&mono).unwrap();
        let mut output = Vec::new();
        let err = Interpreter::new(&mir, &mut output).execute().unwrap_err();
        assert!(err.message.contains("main"), "{err}");
    }
}
