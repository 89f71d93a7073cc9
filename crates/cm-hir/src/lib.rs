//! The Cm high-level IR.
//!
//! HIR is the AST with the sugar boiled off: `for-in` is an explicit loop,
//! `match` statements are if/else chains with payload extraction, compound
//! assignments are read-modify-write, constructor calls are explicit, and
//! `sizeof`/`alignof` are already integers. Types are still the source-level
//! [`Type`]s — generics survive HIR and are erased later by
//! monomorphization during MIR lowering.

pub mod layout;
mod lower;

use serde::Serialize;

use cm_common::Span;
pub use cm_parser::ast::{GenericParams, Type, TypeKind, UnaryOp};
pub use lower::{substitute_type, HirLowering, LoweringError};

/// A lowered compilation unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HirProgram {
    pub functions: Vec<HirFunction>,
    pub structs: Vec<HirStruct>,
    pub enums: Vec<HirEnum>,
    pub interfaces: Vec<HirInterface>,
    pub impls: Vec<HirImplInfo>,
    pub globals: Vec<HirGlobal>,
    /// Extern prototypes (no body, resolved by the backend or interpreter).
    pub externs: Vec<HirFunctionSig>,
}

impl HirProgram {
    pub fn function(&self, name: &str) -> Option<&HirFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&HirEnum> {
        self.enums.iter().find(|e| e.name == name)
    }
}

/// A function signature without a body.
#[derive(Debug, Clone, Serialize)]
pub struct HirFunctionSig {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirFunction {
    /// Fully qualified (namespace-flattened, impl-mangled) name.
    pub name: String,
    /// Generic parameter names; non-empty functions are templates awaiting
    /// monomorphization.
    pub generics: GenericParams,
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    pub body: Vec<HirStmt>,
    pub is_export: bool,
    /// From `#[noinline]`; carried through to the backend driver.
    pub no_inline: bool,
    /// From `#[no_optimize]`; carried through to the backend driver.
    pub no_optimize: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirStruct {
    pub name: String,
    pub generics: GenericParams,
    pub fields: Vec<(String, Type)>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirEnumMember {
    pub name: String,
    pub value: i64,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirEnum {
    pub name: String,
    pub generics: GenericParams,
    pub members: Vec<HirEnumMember>,
    /// Whether any member carries a payload (lowered as a tagged union).
    pub has_payload: bool,
}

impl HirEnum {
    pub fn member(&self, name: &str) -> Option<&HirEnumMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Interface method order is the vtable slot order; it must not be
/// reordered after parsing.
#[derive(Debug, Clone, Serialize)]
pub struct HirInterface {
    pub name: String,
    pub methods: Vec<HirFunctionSig>,
}

/// One `impl` block's contribution: where each concrete method landed.
#[derive(Debug, Clone, Serialize)]
pub struct HirImplInfo {
    /// `None` for inherent impls.
    pub interface: Option<String>,
    pub type_name: String,
    /// Method name -> mangled function name (`T__m__I` / `T__m`).
    pub methods: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirGlobal {
    pub name: String,
    pub ty: Type,
    pub init: Option<HirExpr>,
    pub is_const: bool,
}

// ── Statements ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct HirLet {
    pub name: String,
    pub ty: Type,
    pub init: Option<HirExpr>,
    /// Post-init constructor call (`T__ctor[_N]`), when the declaration was
    /// constructor sugar.
    pub ctor_call: Option<HirExpr>,
    pub is_const: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum HirSwitchPattern {
    Value(HirExpr),
    Range {
        start: HirExpr,
        end: HirExpr,
        inclusive: bool,
    },
    Or(Vec<HirSwitchPattern>),
}

#[derive(Debug, Clone, Serialize)]
pub struct HirSwitchCase {
    /// `None` is the default case.
    pub pattern: Option<HirSwitchPattern>,
    pub stmts: Vec<HirStmt>,
}

/// One operand of an inline-asm template: constraint string plus the
/// variable it binds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsmOperand {
    pub constraint: String,
    pub var_name: String,
}

/// Lowered `__llvm__(template)`: the template text with `$N` placeholders
/// plus the operand list in placeholder order.
#[derive(Debug, Clone, Serialize)]
pub struct HirAsm {
    pub code: String,
    pub operands: Vec<AsmOperand>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum HirStmt {
    Let(HirLet),
    Return(Option<HirExpr>, Span),
    If {
        cond: HirExpr,
        then_block: Vec<HirStmt>,
        else_block: Vec<HirStmt>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    For {
        init: Option<Box<HirStmt>>,
        cond: Option<HirExpr>,
        update: Option<HirExpr>,
        body: Vec<HirStmt>,
    },
    Switch {
        expr: HirExpr,
        cases: Vec<HirSwitchCase>,
    },
    Block(Vec<HirStmt>),
    Break,
    Continue,
    /// Deferred statement; MIR emits these LIFO on every return path.
    Defer(Box<HirStmt>),
    /// Optimization-inhibited region; the span marks the protected range.
    MustBlock {
        body: Vec<HirStmt>,
        span: Span,
    },
    Expr(HirExpr),
    Asm(HirAsm),
}

// ── Expressions ────────────────────────────────────────────────────────

/// Binary operators surviving into HIR (assignment and compound forms are
/// desugared away).
pub use cm_parser::ast::BinaryOp;

#[derive(Debug, Clone, Serialize)]
pub enum HirExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    CharLit(char),
    NullLit,
    Var(String),
    Binary {
        op: BinaryOp,
        lhs: Box<HirExpr>,
        rhs: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    Assign {
        target: Box<HirExpr>,
        value: Box<HirExpr>,
    },
    /// Direct call to a known function (possibly generic, with explicit or
    /// inferred type arguments).
    Call {
        func: String,
        type_args: Vec<Type>,
        args: Vec<HirExpr>,
    },
    /// Dynamic dispatch through an interface reference; resolved to a
    /// vtable load at MIR lowering, or a name lookup in the interpreter.
    MethodCall {
        receiver: Box<HirExpr>,
        interface: String,
        method: String,
        args: Vec<HirExpr>,
    },
    /// Call through a function-pointer value.
    IndirectCall {
        callee: Box<HirExpr>,
        args: Vec<HirExpr>,
    },
    Member {
        object: Box<HirExpr>,
        field: String,
    },
    Index {
        object: Box<HirExpr>,
        index: Box<HirExpr>,
    },
    StructLit {
        type_name: String,
        fields: Vec<(String, HirExpr)>,
    },
    ArrayLit(Vec<HirExpr>),
    Ternary {
        cond: Box<HirExpr>,
        then_value: Box<HirExpr>,
        else_value: Box<HirExpr>,
    },
    Cast {
        value: Box<HirExpr>,
        ty: Type,
    },
    /// Enum construction `E::A(payload...)`.
    EnumVariant {
        enum_name: String,
        variant: String,
        payload: Vec<HirExpr>,
    },
    /// Tag test: is the scrutinee the given variant?
    EnumIs {
        scrutinee: Box<HirExpr>,
        enum_name: String,
        variant: String,
    },
    /// Payload extraction from a matched variant.
    EnumPayload {
        scrutinee: Box<HirExpr>,
        enum_name: String,
        variant: String,
    },
    Move(Box<HirExpr>),
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct HirExpr {
    pub kind: HirExprKind,
    /// The expression's type, as far as local propagation resolved it.
    pub ty: Type,
    pub span: Span,
}

impl HirExpr {
    pub fn new(kind: HirExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    pub fn int(value: i64, span: Span) -> Self {
        Self::new(HirExprKind::IntLit(value), Type::int(), span)
    }

    pub fn bool(value: bool, span: Span) -> Self {
        Self::new(HirExprKind::BoolLit(value), Type::bool(), span)
    }

    pub fn var(name: impl Into<String>, ty: Type, span: Span) -> Self {
        Self::new(HirExprKind::Var(name.into()), ty, span)
    }
}
