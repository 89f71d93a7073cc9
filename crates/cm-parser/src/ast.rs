//! The Cm abstract syntax tree.
//!
//! Produced by the parser, consumed by the target filter and HIR lowering.
//! Every node carries its byte span into the unified source. Parse errors
//! appear in the tree as `Error` kinds so downstream passes can short-circuit
//! without unwinding.

use serde::Serialize;

use cm_common::Span;

// ── Types ──────────────────────────────────────────────────────────────

/// Width of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
    /// Architecture word size (pointer-sized).
    Word,
}

impl IntWidth {
    /// Size in bytes; the architecture word is 8 on every supported target.
    pub fn size(self) -> u64 {
        match self {
            IntWidth::W8 => 1,
            IntWidth::W16 => 2,
            IntWidth::W32 => 4,
            IntWidth::W64 | IntWidth::Word => 8,
        }
    }
}

/// A source-level type with qualifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Type {
    pub kind: TypeKind,
    pub is_const: bool,
    pub span: Span,
}

impl Type {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self {
            kind,
            is_const: false,
            span,
        }
    }

    /// Shorthand for the `int` type at a synthetic position.
    pub fn int() -> Self {
        Self::new(TypeKind::Int { width: IntWidth::W32, signed: true }, Span::dummy())
    }

    /// Shorthand for `bool` at a synthetic position.
    pub fn bool() -> Self {
        Self::new(TypeKind::Bool, Span::dummy())
    }

    /// Shorthand for `void` at a synthetic position.
    pub fn void() -> Self {
        Self::new(TypeKind::Void, Span::dummy())
    }

    /// Shorthand for a named (struct/enum/interface/typedef) type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(
            TypeKind::Named {
                name: name.into(),
                type_args: Vec::new(),
            },
            Span::dummy(),
        )
    }

    /// The bare name of a named type, or `""` for structural types.
    pub fn name(&self) -> &str {
        match &self.kind {
            TypeKind::Named { name, .. } | TypeKind::Alias(name) => name,
            _ => "",
        }
    }
}

/// Size of an array type: a literal, a const generic parameter, or absent
/// for slices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArraySize {
    Literal(u64),
    Generic(String),
}

/// One variant of a structural union type: tag name plus field types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnionVariant {
    pub tag: String,
    pub fields: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeKind {
    Bool,
    Int { width: IntWidth, signed: bool },
    Float32,
    Float64,
    Char,
    String,
    CString,
    Void,
    Null,
    /// Placeholder for `let` declarations without an annotation.
    Inferred,
    Pointer(Box<Type>),
    Reference(Box<Type>),
    Array {
        elem: Box<Type>,
        size: Option<ArraySize>,
    },
    FunctionPointer {
        ret: Box<Type>,
        params: Vec<Type>,
    },
    /// A struct/enum/interface/typedef instantiation.
    Named {
        name: String,
        type_args: Vec<Type>,
    },
    /// Structural tagged union.
    Union(Vec<UnionVariant>),
    /// String-tag union: `"a" | "b"`.
    LiteralUnion(Vec<String>),
    /// A reference to a typedef before resolution.
    Alias(String),
    /// Produced by error recovery.
    Error,
}

// ── Declarations ───────────────────────────────────────────────────────

/// A whole compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub declarations: Vec<Decl>,
    pub filename: String,
}

/// An attribute: `#[name(arg, ...)]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Export,
    Private,
}

/// Constraint on a generic parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GenericConstraint {
    /// `T: I`
    Interface(String),
    /// `T: I | J` — any of the listed interfaces.
    Or(Vec<String>),
    /// `T: I + J` — all of the listed interfaces.
    And(Vec<String>),
    /// `N: const int` — a compile-time value parameter.
    ConstValue(Type),
}

/// A generic parameter with its optional constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericParam {
    pub name: String,
    pub constraint: Option<GenericConstraint>,
    pub span: Span,
}

/// Generic parameters in both forms the pipeline consumes: the full
/// constraint list and its flat name projection.
///
/// Invariant: `names` is always exactly the `name` projection of `params`.
/// Construct through [`GenericParams::new`] to keep the two in sync.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GenericParams {
    pub params: Vec<GenericParam>,
    pub names: Vec<String>,
}

impl GenericParams {
    pub fn new(params: Vec<GenericParam>) -> Self {
        let names = params.iter().map(|p| p.name.clone()).collect();
        Self { params, names }
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// `where T: I, U: J | K` on a struct or impl.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhereClause {
    pub param: String,
    pub constraint: GenericConstraint,
}

/// Overloadable operator symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperatorKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Index,
}

impl OperatorKind {
    /// Map an operator symbol to its kind, as written in `operator +`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            "%" => Some(Self::Rem),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "[]" => Some(Self::Index),
            _ => None,
        }
    }

    /// The mangled-name suffix for this operator.
    pub fn mangle(self) -> &'static str {
        match self {
            Self::Add => "op_add",
            Self::Sub => "op_sub",
            Self::Mul => "op_mul",
            Self::Div => "op_div",
            Self::Rem => "op_rem",
            Self::Eq => "op_eq",
            Self::Ne => "op_ne",
            Self::Lt => "op_lt",
            Self::Le => "op_le",
            Self::Gt => "op_gt",
            Self::Ge => "op_ge",
            Self::Index => "op_index",
        }
    }
}

/// What kind of callable a function declaration is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FunctionKind {
    Normal,
    /// `operator + (...)` inside an interface or impl.
    Operator(OperatorKind),
    /// `self(...)` in a constructor impl.
    Constructor,
    /// `~self()` in a constructor impl.
    Destructor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub kind: FunctionKind,
    pub generics: GenericParams,
    pub params: Vec<Param>,
    pub return_type: Type,
    /// `None` for prototypes (extern declarations).
    pub body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDecl {
    pub name: String,
    pub generics: GenericParams,
    pub where_clauses: Vec<WhereClause>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterfaceDecl {
    pub name: String,
    pub generics: GenericParams,
    /// Method signatures in declared order; this order fixes vtable slots.
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImplDecl {
    /// `None` for inherent (constructor/destructor) impls.
    pub interface: Option<String>,
    pub type_name: String,
    pub generics: GenericParams,
    pub where_clauses: Vec<WhereClause>,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumMember {
    pub name: String,
    /// Explicit discriminant, when written.
    pub value: Option<i64>,
    /// Payload field types; empty for plain members.
    pub fields: Vec<Type>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumDecl {
    pub name: String,
    pub generics: GenericParams,
    pub members: Vec<EnumMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedefDecl {
    pub name: String,
    pub generics: GenericParams,
    pub target: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalVarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub is_const: bool,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UseDecl {
    pub path: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportDecl {
    pub specifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternBlockDecl {
    /// ABI string, e.g. `"C"`, when written.
    pub abi: Option<String>,
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleDecl {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceDecl {
    pub name: String,
    pub declarations: Vec<Decl>,
}

/// Recognized but not expanded; kept in the AST for tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroDecl {
    pub name: String,
    pub body_span: Span,
}

/// Recognized but not expanded; kept in the AST for tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateDecl {
    pub name: String,
    pub body_span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DeclKind {
    Function(FunctionDecl),
    Struct(StructDecl),
    Interface(InterfaceDecl),
    Impl(ImplDecl),
    Enum(EnumDecl),
    Typedef(TypedefDecl),
    GlobalVar(GlobalVarDecl),
    Use(UseDecl),
    Import(ImportDecl),
    ExternBlock(ExternBlockDecl),
    Module(ModuleDecl),
    Namespace(NamespaceDecl),
    Macro(MacroDecl),
    Template(TemplateDecl),
    /// Produced by error recovery.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decl {
    pub kind: DeclKind,
    pub attributes: Vec<Attribute>,
    pub visibility: Visibility,
    pub span: Span,
}

impl Decl {
    /// The declared name, where one exists.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Function(f) => Some(&f.name),
            DeclKind::Struct(s) => Some(&s.name),
            DeclKind::Interface(i) => Some(&i.name),
            DeclKind::Impl(i) => Some(&i.type_name),
            DeclKind::Enum(e) => Some(&e.name),
            DeclKind::Typedef(t) => Some(&t.name),
            DeclKind::GlobalVar(g) => Some(&g.name),
            DeclKind::Module(m) => Some(&m.name),
            DeclKind::Namespace(n) => Some(&n.name),
            DeclKind::Macro(m) => Some(&m.name),
            DeclKind::Template(t) => Some(&t.name),
            _ => None,
        }
    }
}

// ── Statements ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetStmt {
    pub name: String,
    pub ty: Option<Type>,
    pub init: Option<Expr>,
    pub is_const: bool,
    pub is_static: bool,
}

/// A `switch` case pattern: a value, a range, or an OR of sub-patterns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SwitchPattern {
    Value(Box<Expr>),
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Or(Vec<SwitchPattern>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCase {
    /// `None` for `default:`.
    pub pattern: Option<SwitchPattern>,
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    Let(LetStmt),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_block: Vec<Stmt>,
        else_block: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForIn {
        var: String,
        var_type: Option<Type>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        expr: Expr,
        cases: Vec<SwitchCase>,
    },
    /// `defer <stmt>`; runs at scope exit in LIFO order.
    Defer(Box<Stmt>),
    /// `must { ... }`; optimization-inhibited region.
    Must(Vec<Stmt>),
    Block(Vec<Stmt>),
    Break,
    Continue,
    Expr(Expr),
    /// Produced by error recovery.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

// ── Expressions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
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
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    AddrOf,
    Deref,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

/// A `match` arm pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatchPattern {
    /// `_`
    Wildcard,
    /// A literal or path compared by equality.
    Value(Box<Expr>),
    /// `a..b` / `a..=b`
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    /// `p1 | p2 | ...`
    Or(Vec<MatchPattern>),
    /// `E::A` — tag comparison against an enum variant.
    EnumVariant { path: String },
    /// `E::A(x)` — tag comparison plus payload binding.
    EnumVariantBinding { path: String, binding: String },
    /// A bare lower-case identifier binding the scrutinee.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArmBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub guard: Option<Expr>,
    pub body: ArmBody,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchExpr {
    pub scrutinee: Box<Expr>,
    pub arms: Vec<MatchArm>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    CharLit(char),
    NullLit,
    /// An identifier or `::`-qualified path, stored pre-joined.
    Ident(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Plain or compound assignment; `op` is the compound operator.
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    StructLiteral {
        /// Empty for implicit literals whose type comes from context.
        type_name: String,
        fields: Vec<(String, Expr)>,
    },
    ArrayLiteral(Vec<Expr>),
    Match(MatchExpr),
    Ternary {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    Cast {
        value: Box<Expr>,
        ty: Type,
    },
    Sizeof(Type),
    Alignof(Type),
    Move(Box<Expr>),
    /// Produced by error recovery.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_params_projection_stays_in_sync() {
        let generics = GenericParams::new(vec![
            GenericParam {
                name: "T".into(),
                constraint: Some(GenericConstraint::Interface("Ord".into())),
                span: Span::dummy(),
            },
            GenericParam {
                name: "U".into(),
                constraint: None,
                span: Span::dummy(),
            },
        ]);
        assert_eq!(generics.names, vec!["T", "U"]);
    }

    #[test]
    fn operator_symbols_map_to_kinds() {
        assert_eq!(OperatorKind::from_symbol("+"), Some(OperatorKind::Add));
        assert_eq!(OperatorKind::from_symbol("=="), Some(OperatorKind::Eq));
        assert_eq!(OperatorKind::from_symbol("[]"), Some(OperatorKind::Index));
        assert_eq!(OperatorKind::from_symbol("**"), None);
    }

    #[test]
    fn decl_name_lookup() {
        let decl = Decl {
            kind: DeclKind::Struct(StructDecl {
                name: "Point".into(),
                generics: GenericParams::default(),
                where_clauses: Vec::new(),
                fields: Vec::new(),
            }),
            attributes: Vec::new(),
            visibility: Visibility::Private,
            span: Span::dummy(),
        };
        assert_eq!(decl.name(), Some("Point"));
    }

    #[test]
    fn int_widths() {
        assert_eq!(IntWidth::W8.size(), 1);
        assert_eq!(IntWidth::W16.size(), 2);
        assert_eq!(IntWidth::W32.size(), 4);
        assert_eq!(IntWidth::W64.size(), 8);
        assert_eq!(IntWidth::Word.size(), 8);
    }
}
