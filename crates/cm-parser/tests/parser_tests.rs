use cm_parser::ast::*;
use cm_parser::parse_source;

fn parse_ok(source: &str) -> Program {
    let (program, diags) = parse_source(source, "test.cm");
    assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    program
}

fn first_fn(program: &Program) -> &FunctionDecl {
    program
        .declarations
        .iter()
        .find_map(|d| match &d.kind {
            DeclKind::Function(f) => Some(f),
            _ => None,
        })
        .expect("no function in program")
}

#[test]
fn empty_program() {
    let program = parse_ok("");
    assert!(program.declarations.is_empty());
    assert_eq!(program.filename, "test.cm");
}

#[test]
fn hello_world() {
    let program = parse_ok("int main() { println(\"hello\"); return 0; }");
    let main = first_fn(&program);
    assert_eq!(main.name, "main");
    assert!(main.params.is_empty());
    let body = main.body.as_ref().unwrap();
    assert_eq!(body.len(), 2);
    assert!(matches!(body[1].kind, StmtKind::Return(Some(_))));
}

#[test]
fn generic_function_with_constraint() {
    let program = parse_ok("<T: Ord> T max2(T a, T b) { return a; }");
    let f = first_fn(&program);
    assert_eq!(f.generics.names, vec!["T"]);
    assert_eq!(
        f.generics.params[0].constraint,
        Some(GenericConstraint::Interface("Ord".into()))
    );
}

#[test]
fn or_and_const_constraints() {
    let program = parse_ok(
        "<T: A | B> void f(T x) {}\n<U: A + B> void g(U x) {}\n<N: const int> void h() {}",
    );
    let constraints: Vec<_> = program
        .declarations
        .iter()
        .filter_map(|d| match &d.kind {
            DeclKind::Function(f) => f.generics.params[0].constraint.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(constraints.len(), 3);
    assert_eq!(constraints[0], GenericConstraint::Or(vec!["A".into(), "B".into()]));
    assert_eq!(constraints[1], GenericConstraint::And(vec!["A".into(), "B".into()]));
    assert!(matches!(constraints[2], GenericConstraint::ConstValue(_)));
}

#[test]
fn nested_generic_type_splits_gtgt() {
    let program = parse_ok("Map<string, List<int>> table;");
    let DeclKind::GlobalVar(var) = &program.declarations[0].kind else {
        panic!("expected global var");
    };
    let TypeKind::Named { name, type_args } = &var.ty.kind else {
        panic!("expected named type");
    };
    assert_eq!(name, "Map");
    assert_eq!(type_args.len(), 2);
    let TypeKind::Named { name: inner, type_args: inner_args } = &type_args[1].kind else {
        panic!("expected nested named type");
    };
    assert_eq!(inner, "List");
    assert_eq!(inner_args.len(), 1);
}

#[test]
fn generic_call_vs_comparison() {
    let program = parse_ok("int main() { int a = id<int>(7); bool b = x < y; return a; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Let(let_a) = &body[0].kind else {
        panic!("expected let");
    };
    let ExprKind::Call { type_args, .. } = &let_a.init.as_ref().unwrap().kind else {
        panic!("expected generic call, got {:?}", let_a.init);
    };
    assert_eq!(type_args.len(), 1);

    let StmtKind::Let(let_b) = &body[1].kind else {
        panic!("expected let");
    };
    assert!(matches!(
        let_b.init.as_ref().unwrap().kind,
        ExprKind::Binary { op: BinaryOp::Lt, .. }
    ));
}

#[test]
fn struct_with_where_clause() {
    let program = parse_ok("struct Pair<T> where T: Clone { T first; T second; }");
    let DeclKind::Struct(s) = &program.declarations[0].kind else {
        panic!("expected struct");
    };
    assert_eq!(s.name, "Pair");
    assert_eq!(s.fields.len(), 2);
    assert_eq!(s.where_clauses.len(), 1);
    assert_eq!(s.where_clauses[0].param, "T");
}

#[test]
fn interface_and_impl_with_operator() {
    let program = parse_ok(
        "interface Add { operator + (Add other) -> Add; }\n\
         impl Add for Vec2 { operator + (Vec2 other) -> Vec2 { return other; } }",
    );
    let DeclKind::Interface(iface) = &program.declarations[0].kind else {
        panic!("expected interface");
    };
    assert_eq!(iface.methods[0].kind, FunctionKind::Operator(OperatorKind::Add));

    let DeclKind::Impl(imp) = &program.declarations[1].kind else {
        panic!("expected impl");
    };
    assert_eq!(imp.interface.as_deref(), Some("Add"));
    assert_eq!(imp.type_name, "Vec2");
    assert_eq!(imp.methods[0].name, "op_add");
}

#[test]
fn constructor_and_destructor_impl() {
    let program = parse_ok(
        "impl Point { self(int x) { } overload self(int x, int y) { } ~self() { } }",
    );
    let DeclKind::Impl(imp) = &program.declarations[0].kind else {
        panic!("expected impl");
    };
    assert!(imp.interface.is_none());
    let kinds: Vec<_> = imp.methods.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FunctionKind::Constructor,
            FunctionKind::Constructor,
            FunctionKind::Destructor
        ]
    );
}

#[test]
fn enum_with_payload_and_discriminant() {
    let program = parse_ok("enum E { A(int), B, C = 5 }");
    let DeclKind::Enum(e) = &program.declarations[0].kind else {
        panic!("expected enum");
    };
    assert_eq!(e.members.len(), 3);
    assert_eq!(e.members[0].fields.len(), 1);
    assert!(e.members[1].fields.is_empty());
    assert_eq!(e.members[2].value, Some(5));
}

#[test]
fn match_with_binding_and_guard() {
    let program = parse_ok(
        "int main() { E e = E::A(42); match e { A(n) if n > 0 => return n; _ => return -1; } }",
    );
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Expr(expr) = &body[1].kind else {
        panic!("expected match statement, got {:?}", body[1].kind);
    };
    let ExprKind::Match(m) = &expr.kind else {
        panic!("expected match expression");
    };
    assert_eq!(m.arms.len(), 2);
    assert_eq!(
        m.arms[0].pattern,
        MatchPattern::EnumVariantBinding {
            path: "A".into(),
            binding: "n".into()
        }
    );
    assert!(m.arms[0].guard.is_some());
    assert_eq!(m.arms[1].pattern, MatchPattern::Wildcard);
}

#[test]
fn defer_and_must() {
    let program = parse_ok("int main() { defer println(\"1\"); must { int x = 0; } return 0; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    assert!(matches!(body[0].kind, StmtKind::Defer(_)));
    assert!(matches!(body[1].kind, StmtKind::Must(_)));
}

#[test]
fn for_in_and_c_style_for() {
    let program = parse_ok(
        "int main() { for x in arr { } for (int i = 0; i < 10; i = i + 1) { } return 0; }",
    );
    let body = first_fn(&program).body.as_ref().unwrap();
    assert!(matches!(body[0].kind, StmtKind::ForIn { .. }));
    assert!(matches!(body[1].kind, StmtKind::For { .. }));
}

#[test]
fn switch_with_patterns() {
    let program = parse_ok(
        "int main() { switch (x) { case 1: return 1; case 2..=5: return 2; case 6 | 7: return 3; default: return 0; } }",
    );
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Switch { cases, .. } = &body[0].kind else {
        panic!("expected switch, got {:?}", body[0].kind);
    };
    assert_eq!(cases.len(), 4);
    assert!(matches!(cases[0].pattern, Some(SwitchPattern::Value(_))));
    assert!(matches!(
        cases[1].pattern,
        Some(SwitchPattern::Range { inclusive: true, .. })
    ));
    assert!(matches!(cases[2].pattern, Some(SwitchPattern::Or(_))));
    assert!(cases[3].pattern.is_none());
}

#[test]
fn compound_assignment_and_ternary() {
    let program = parse_ok("int main() { x += 2; int y = a > b ? a : b; return y; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Expr(expr) = &body[0].kind else {
        panic!("expected expr stmt");
    };
    assert!(matches!(
        expr.kind,
        ExprKind::Assign { op: Some(BinaryOp::Add), .. }
    ));
    let StmtKind::Let(let_y) = &body[1].kind else {
        panic!("expected let");
    };
    assert!(matches!(let_y.init.as_ref().unwrap().kind, ExprKind::Ternary { .. }));
}

#[test]
fn sizeof_and_cast() {
    let program = parse_ok("int main() { long n = sizeof(int) as long; return 0; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Let(l) = &body[0].kind else {
        panic!("expected let");
    };
    let ExprKind::Cast { value, .. } = &l.init.as_ref().unwrap().kind else {
        panic!("expected cast");
    };
    assert!(matches!(value.kind, ExprKind::Sizeof(_)));
}

#[test]
fn struct_literal_and_member_access() {
    let program = parse_ok("int main() { Point p = Point { x: 1, y: 2 }; return p.x; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Let(l) = &body[0].kind else {
        panic!("expected let");
    };
    let ExprKind::StructLiteral { type_name, fields } = &l.init.as_ref().unwrap().kind else {
        panic!("expected struct literal");
    };
    assert_eq!(type_name, "Point");
    assert_eq!(fields.len(), 2);
}

#[test]
fn namespace_and_qualified_call() {
    let program = parse_ok("namespace math { export int abs(int x) { return x; } }\nint main() { return math::abs(1); }");
    assert!(matches!(
        program.declarations[0].kind,
        DeclKind::Namespace(_)
    ));
    let main = first_fn(&program);
    let body = main.body.as_ref().unwrap();
    let StmtKind::Return(Some(expr)) = &body[0].kind else {
        panic!("expected return");
    };
    let ExprKind::Call { callee, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(callee.kind, ExprKind::Ident("math::abs".into()));
}

#[test]
fn extern_block_prototypes() {
    let program = parse_ok("extern \"C\" { int puts(cstring s); void exit(int code); }");
    let DeclKind::ExternBlock(block) = &program.declarations[0].kind else {
        panic!("expected extern block");
    };
    assert_eq!(block.abi.as_deref(), Some("C"));
    assert_eq!(block.functions.len(), 2);
    assert!(block.functions[0].body.is_none());
}

#[test]
fn export_main_is_rejected() {
    let (_, diags) = parse_source("export int main() { return 0; }", "test.cm");
    assert!(diags.iter().any(|d| d.message.contains("main")), "{diags:?}");
}

#[test]
fn negative_int64_min_round_trips() {
    let program = parse_ok("long x = -9223372036854775808;");
    let DeclKind::GlobalVar(var) = &program.declarations[0].kind else {
        panic!("expected global");
    };
    assert_eq!(var.init.as_ref().unwrap().kind, ExprKind::IntLit(i64::MIN));
}

#[test]
fn error_recovery_keeps_later_decls() {
    let (program, diags) = parse_source("int broken( { ;;; }\nint ok() { return 1; }", "test.cm");
    assert!(!diags.is_empty());
    assert!(program
        .declarations
        .iter()
        .any(|d| d.name() == Some("ok")));
}

#[test]
fn pointer_decl_and_deref() {
    let program = parse_ok("int main() { int* p = &x; return *p; }");
    let body = first_fn(&program).body.as_ref().unwrap();
    let StmtKind::Let(l) = &body[0].kind else {
        panic!("expected let, got {:?}", body[0].kind);
    };
    assert!(matches!(
        l.ty.as_ref().unwrap().kind,
        TypeKind::Pointer(_)
    ));
}
