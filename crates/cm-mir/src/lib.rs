//! The Cm mid-level IR.
//!
//! MIR is a flat control-flow-graph representation: each function is a list
//! of basic blocks, each block a list of three-address instructions closed
//! by exactly one terminator. Generics are gone (monomorphization runs on
//! HIR just before lowering), interface calls carry their vtable slot, and
//! tagged unions are laid out as `tag(int32) + payload`.
//!
//! Invariants the rest of the pipeline relies on:
//! - every block ends in exactly one [`Terminator`];
//! - no instruction references a generic parameter name;
//! - instructions inside a `must` region carry `in_must = true` and are
//!   untouchable by every optimizer pass.

pub mod dce;
pub mod lower;
pub mod mono;
pub mod opt;
pub mod printer;

use serde::Serialize;

use cm_common::Span;

// ── Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MirType {
    Void,
    Bool,
    Int { width: u8, signed: bool },
    Float32,
    Float64,
    Char,
    Str,
    CStr,
    Ptr(Box<MirType>),
    Struct(String),
    Enum(String),
    Array {
        elem: Box<MirType>,
        size: Option<u64>,
    },
    FnPtr {
        params: Vec<MirType>,
        ret: Box<MirType>,
    },
    /// Fat reference `(data_ptr, vtable_ptr)` to a dynamic interface value.
    Interface(String),
    Unknown,
}

impl MirType {
    pub fn int() -> Self {
        MirType::Int {
            width: 32,
            signed: true,
        }
    }

    pub fn long() -> Self {
        MirType::Int {
            width: 64,
            signed: true,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, MirType::Void)
    }

    /// Short suffix used in mangled names (`Int`, `String`, struct names).
    pub fn suffix(&self) -> String {
        match self {
            MirType::Void => "Void".into(),
            MirType::Bool => "Bool".into(),
            MirType::Int { width, signed } => match (width, signed) {
                (8, true) => "Tiny".into(),
                (8, false) => "Utiny".into(),
                (16, true) => "Short".into(),
                (16, false) => "Ushort".into(),
                (32, true) => "Int".into(),
                (32, false) => "Uint".into(),
                (64, true) => "Long".into(),
                (64, false) => "Ulong".into(),
                _ => format!("I{width}"),
            },
            MirType::Float32 => "Float".into(),
            MirType::Float64 => "Double".into(),
            MirType::Char => "Char".into(),
            MirType::Str => "String".into(),
            MirType::CStr => "CString".into(),
            MirType::Ptr(inner) => format!("Ptr_{}", inner.suffix()),
            MirType::Struct(name) | MirType::Enum(name) | MirType::Interface(name) => {
                name.replace("::", "_")
            }
            MirType::Array { elem, size } => match size {
                Some(n) => format!("Arr{n}_{}", elem.suffix()),
                None => format!("Slice_{}", elem.suffix()),
            },
            MirType::FnPtr { .. } => "Fn".into(),
            MirType::Unknown => "Unknown".into(),
        }
    }
}

// ── Operands and instructions ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Operand {
    ConstInt(i64),
    ConstFloat(f64),
    ConstBool(bool),
    ConstStr(String),
    ConstNull,
    /// A named local (parameters, user variables, `%tN` temporaries).
    Local(String),
    /// The address of a function, for indirect calls.
    FuncRef(String),
}

impl Operand {
    pub fn is_const(&self) -> bool {
        !matches!(self, Operand::Local(_))
    }

    pub fn as_local(&self) -> Option<&str> {
        match self {
            Operand::Local(name) => Some(name),
            _ => None,
        }
    }
}

/// Base of a `gep`: a named local (yielding its address) or an existing
/// pointer value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GepBase {
    Local(String),
    Ptr(Operand),
}

/// One address computation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GepIndex {
    /// Field access by index; for enums, field 0 is the tag and field 1 the
    /// payload record.
    Field(usize),
    /// Array element by dynamic index.
    Element(Operand),
    /// No step: the bare address of the base.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// What an `Aggregate` instruction builds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AggregateKind {
    Struct(String),
    Array(MirType),
    /// Tagged-union construction with the variant's tag value.
    Enum {
        enum_name: String,
        variant: String,
        tag: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InstKind {
    /// `dst = value`
    Assign { dst: String, value: Operand },
    Binary {
        dst: String,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        dst: String,
        op: UnOp,
        operand: Operand,
    },
    Call {
        dst: Option<String>,
        func: String,
        args: Vec<Operand>,
    },
    CallIndirect {
        dst: Option<String>,
        callee: Operand,
        args: Vec<Operand>,
    },
    /// Dynamic dispatch through an interface reference. The slot is the
    /// method's index in the interface's declared order; backends expand
    /// this to a vtable load plus indirect call, the interpreter resolves
    /// `Type__method__Interface` at the call point.
    CallVirtual {
        dst: Option<String>,
        interface: String,
        method: String,
        slot: usize,
        receiver: Operand,
        args: Vec<Operand>,
    },
    Load {
        dst: String,
        ptr: Operand,
        volatile: bool,
    },
    Store {
        ptr: Operand,
        value: Operand,
        volatile: bool,
    },
    /// Computed field/element address.
    Gep {
        dst: String,
        base: GepBase,
        index: GepIndex,
    },
    Cast {
        dst: String,
        value: Operand,
        to: MirType,
    },
    Phi {
        dst: String,
        incoming: Vec<(BlockId, Operand)>,
    },
    /// Branch-free conditional value; produced for ternaries whose arms are
    /// pure operands.
    Select {
        dst: String,
        cond: Operand,
        then_value: Operand,
        else_value: Operand,
    },
    /// First-class aggregate construction (struct/array/tagged-union).
    Aggregate {
        dst: String,
        kind: AggregateKind,
        elems: Vec<Operand>,
    },
    InlineAsm {
        template: String,
        constraints: String,
        operands: Vec<Operand>,
    },
    DebugMarker(String),
}

impl InstKind {
    /// The local this instruction defines, if any.
    pub fn dst(&self) -> Option<&str> {
        match self {
            InstKind::Assign { dst, .. }
            | InstKind::Binary { dst, .. }
            | InstKind::Unary { dst, .. }
            | InstKind::Load { dst, .. }
            | InstKind::Gep { dst, .. }
            | InstKind::Cast { dst, .. }
            | InstKind::Phi { dst, .. }
            | InstKind::Select { dst, .. }
            | InstKind::Aggregate { dst, .. } => Some(dst),
            InstKind::Call { dst, .. }
            | InstKind::CallIndirect { dst, .. }
            | InstKind::CallVirtual { dst, .. } => dst.as_deref(),
            _ => None,
        }
    }

    /// Whether removing this instruction could change observable behavior
    /// even if its result is unused.
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            InstKind::Call { .. }
                | InstKind::CallIndirect { .. }
                | InstKind::CallVirtual { .. }
                | InstKind::Store { .. }
                | InstKind::InlineAsm { .. }
        )
    }

    /// Operands read by this instruction.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            InstKind::Assign { value, .. } => vec![value],
            InstKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Unary { operand, .. } => vec![operand],
            InstKind::Call { args, .. } => args.iter().collect(),
            InstKind::CallIndirect { callee, args, .. } => {
                let mut ops = vec![callee];
                ops.extend(args.iter());
                ops
            }
            InstKind::CallVirtual { receiver, args, .. } => {
                let mut ops = vec![receiver];
                ops.extend(args.iter());
                ops
            }
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { ptr, value, .. } => vec![ptr, value],
            InstKind::Gep { base, index, .. } => {
                let mut ops = Vec::new();
                if let GepBase::Ptr(p) = base {
                    ops.push(p);
                }
                if let GepIndex::Element(i) = index {
                    ops.push(i);
                }
                ops
            }
            InstKind::Cast { value, .. } => vec![value],
            InstKind::Phi { incoming, .. } => incoming.iter().map(|(_, op)| op).collect(),
            InstKind::Select {
                cond,
                then_value,
                else_value,
                ..
            } => vec![cond, then_value, else_value],
            InstKind::Aggregate { elems, .. } => elems.iter().collect(),
            InstKind::InlineAsm { operands, .. } => operands.iter().collect(),
            InstKind::DebugMarker(_) => Vec::new(),
        }
    }
}

/// An instruction with its source span and `must`-region flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub kind: InstKind,
    pub span: Span,
    /// Set for instructions inside a `must { ... }` block; optimizer passes
    /// must not remove, replace or reorder these.
    pub in_must: bool,
}

impl Instruction {
    pub fn new(kind: InstKind, span: Span) -> Self {
        Self {
            kind,
            span,
            in_must: false,
        }
    }
}

// ── Blocks and functions ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Terminator {
    Branch(BlockId),
    CondBranch {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<Operand>),
    Switch {
        value: Operand,
        cases: Vec<(i64, BlockId)>,
        default: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(b) => vec![*b],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Switch { cases, default, .. } => {
                let mut out: Vec<BlockId> = cases.iter().map(|(_, b)| *b).collect();
                out.push(*default);
                out
            }
            Terminator::Return(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BasicBlock {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirFunction {
    pub name: String,
    pub params: Vec<(String, MirType)>,
    pub return_type: MirType,
    /// Named locals (user variables and temporaries) with their types.
    pub locals: Vec<(String, MirType)>,
    pub blocks: Vec<BasicBlock>,
    pub is_export: bool,
    /// Backend hint: never inline this function (recursion limiter).
    pub no_inline: bool,
    /// Backend hint: skip aggressive optimization for this function.
    pub no_optimize: bool,
    pub span: Span,
}

impl MirFunction {
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

// ── Program-level items ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MirStruct {
    pub name: String,
    pub fields: Vec<(String, MirType)>,
    /// Byte offset of each field, in declaration order.
    pub offsets: Vec<u64>,
    pub size: u64,
    pub align: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirVariant {
    pub name: String,
    pub tag: i32,
    pub payload: Vec<MirType>,
}

/// An enum lowered as `struct { int32 tag; union payload; }`.
#[derive(Debug, Clone, Serialize)]
pub struct MirEnum {
    pub name: String,
    pub variants: Vec<MirVariant>,
    pub has_payload: bool,
    pub payload_offset: u64,
    pub size: u64,
    pub align: u64,
}

impl MirEnum {
    pub fn variant(&self, name: &str) -> Option<&MirVariant> {
        self.variants.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MirGlobal {
    pub name: String,
    pub ty: MirType,
    pub init: Option<Operand>,
    pub is_const: bool,
}

/// A concrete type's function table for one interface. Slot order is the
/// interface's declared method order and is stable across compilations.
#[derive(Debug, Clone, Serialize)]
pub struct MirVtable {
    pub interface: String,
    pub type_name: String,
    /// Mangled function names in slot order.
    pub slots: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MirProgram {
    pub functions: Vec<MirFunction>,
    pub structs: Vec<MirStruct>,
    pub enums: Vec<MirEnum>,
    pub globals: Vec<MirGlobal>,
    /// Extern function names the backend must import.
    pub imports: Vec<String>,
    pub vtables: Vec<MirVtable>,
}

impl MirProgram {
    pub fn function(&self, name: &str) -> Option<&MirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&MirStruct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&MirEnum> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn vtable(&self, interface: &str, type_name: &str) -> Option<&MirVtable> {
        self.vtables
            .iter()
            .find(|v| v.interface == interface && v.type_name == type_name)
    }

    /// Total instruction count, a cheap size metric for the drivers.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instruction_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_successors() {
        assert_eq!(Terminator::Branch(BlockId(3)).successors(), vec![BlockId(3)]);
        assert_eq!(Terminator::Return(None).successors(), vec![]);
        let sw = Terminator::Switch {
            value: Operand::ConstInt(1),
            cases: vec![(1, BlockId(1)), (2, BlockId(2))],
            default: BlockId(0),
        };
        assert_eq!(sw.successors(), vec![BlockId(1), BlockId(2), BlockId(0)]);
    }

    #[test]
    fn inst_dst_and_side_effects() {
        let assign = InstKind::Assign {
            dst: "%t0".into(),
            value: Operand::ConstInt(1),
        };
        assert_eq!(assign.dst(), Some("%t0"));
        assert!(!assign.has_side_effects());

        let call = InstKind::Call {
            dst: None,
            func: "println".into(),
            args: vec![],
        };
        assert!(call.has_side_effects());

        let store = InstKind::Store {
            ptr: Operand::Local("p".into()),
            value: Operand::ConstInt(0),
            volatile: false,
        };
        assert!(store.has_side_effects());
        assert!(store.dst().is_none());
    }

    #[test]
    fn type_suffixes_for_mangling() {
        assert_eq!(MirType::int().suffix(), "Int");
        assert_eq!(MirType::long().suffix(), "Long");
        assert_eq!(MirType::Str.suffix(), "String");
        assert_eq!(MirType::Struct("ns::Point".into()).suffix(), "ns_Point");
        assert_eq!(
            MirType::Ptr(Box::new(MirType::int())).suffix(),
            "Ptr_Int"
        );
    }
}
