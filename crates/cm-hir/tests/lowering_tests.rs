use cm_hir::*;
use cm_parser::parse_source;

fn lower(source: &str) -> HirProgram {
    let (program, diags) = parse_source(source, "test.cm");
    assert!(diags.is_empty(), "parse diagnostics: {diags:?}");
    let mut lowering = HirLowering::new();
    let hir = lowering.lower(&program).expect("lowering failed");
    assert!(
        lowering.diagnostics().is_empty(),
        "lowering diagnostics: {:?}",
        lowering.diagnostics()
    );
    hir
}

fn body_of<'a>(hir: &'a HirProgram, name: &str) -> &'a [HirStmt] {
    &hir.function(name).unwrap_or_else(|| panic!("no function {name}")).body
}

#[test]
fn hello_world_lowers_to_direct_call() {
    let hir = lower("int main() { println(\"hello\"); return 0; }");
    let body = body_of(&hir, "main");
    assert_eq!(body.len(), 2);
    let HirStmt::Expr(expr) = &body[0] else {
        panic!("expected expression statement");
    };
    let HirExprKind::Call { func, args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(func, "println");
    assert_eq!(args.len(), 1);
    assert!(matches!(body[1], HirStmt::Return(Some(_), _)));
}

#[test]
fn compound_assignment_becomes_read_modify_write() {
    let hir = lower("int main() { int x = 1; x += 2; return x; }");
    let body = body_of(&hir, "main");
    let HirStmt::Expr(expr) = &body[1] else {
        panic!("expected expr stmt");
    };
    let HirExprKind::Assign { target, value } = &expr.kind else {
        panic!("expected assignment");
    };
    assert!(matches!(target.kind, HirExprKind::Var(_)));
    let HirExprKind::Binary { op, lhs, .. } = &value.kind else {
        panic!("expected binary rhs, got {:?}", value.kind);
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(lhs.kind, HirExprKind::Var(_)));
}

#[test]
fn increment_desugars_to_assignment() {
    let hir = lower("int main() { int x = 0; x++; return x; }");
    let body = body_of(&hir, "main");
    let HirStmt::Expr(expr) = &body[1] else {
        panic!("expected expr stmt");
    };
    assert!(matches!(expr.kind, HirExprKind::Assign { .. }));
}

#[test]
fn fixed_array_for_in_becomes_index_loop() {
    let hir = lower("int main() { [int; 3] arr = [1, 2, 3]; for x in arr { println(\"\"); } return 0; }");
    let body = body_of(&hir, "main");
    let HirStmt::For {
        init, cond, update, body: loop_body,
    } = &body[1]
    else {
        panic!("expected for loop, got {:?}", body[1]);
    };
    // init: __for_in_idx_x = 0
    let Some(init) = init else { panic!("missing init") };
    let HirStmt::Let(idx_let) = init.as_ref() else {
        panic!("expected index let");
    };
    assert_eq!(idx_let.name, "__for_in_idx_x");
    // cond: idx < 3
    let HirExprKind::Binary { op: BinaryOp::Lt, rhs, .. } = &cond.as_ref().unwrap().kind else {
        panic!("expected < condition");
    };
    assert!(matches!(rhs.kind, HirExprKind::IntLit(3)));
    assert!(update.is_some());
    // First body stmt binds the element.
    let HirStmt::Let(elem_let) = &loop_body[0] else {
        panic!("expected element let");
    };
    assert_eq!(elem_let.name, "x");
    assert!(matches!(
        elem_let.init.as_ref().unwrap().kind,
        HirExprKind::Index { .. }
    ));
}

#[test]
fn slice_for_in_uses_builtin_len() {
    let hir = lower("int sum([int] xs) { int t = 0; for x in xs { t += x; } return t; }");
    let body = body_of(&hir, "sum");
    let HirStmt::For { cond, .. } = &body[1] else {
        panic!("expected for loop");
    };
    let HirExprKind::Binary { rhs, .. } = &cond.as_ref().unwrap().kind else {
        panic!("expected binary cond");
    };
    let HirExprKind::Call { func, .. } = &rhs.kind else {
        panic!("expected call bound, got {:?}", rhs.kind);
    };
    assert_eq!(func, "__builtin_slice_len");
}

#[test]
fn iterator_protocol_for_in_becomes_while() {
    let src = "\
struct Counter { int n; }
struct CounterIter { int i; int n; }
impl Counter {
    CounterIter iter() { return CounterIter { i: 0, n: 3 }; }
}
impl CounterIter {
    bool has_next() { return true; }
    int next() { return 1; }
}
int main() {
    Counter c = Counter { n: 3 };
    for x in c { }
    return 0;
}
";
    let hir = lower(src);
    let body = body_of(&hir, "main");
    let HirStmt::Block(block) = &body[1] else {
        panic!("expected block wrapping iterator loop, got {:?}", body[1]);
    };
    let HirStmt::Let(iter_let) = &block[0] else {
        panic!("expected iterator let");
    };
    assert_eq!(iter_let.name, "__for_in_iter_x");
    let HirExprKind::Call { func, .. } = &iter_let.init.as_ref().unwrap().kind else {
        panic!("expected iter() call");
    };
    assert_eq!(func, "Counter__iter");
    let HirStmt::While { cond, body: loop_body } = &block[1] else {
        panic!("expected while");
    };
    let HirExprKind::Call { func, .. } = &cond.kind else {
        panic!("expected has_next call");
    };
    assert_eq!(func, "CounterIter__has_next");
    let HirStmt::Let(elem) = &loop_body[0] else {
        panic!("expected next() binding");
    };
    let HirExprKind::Call { func, .. } = &elem.init.as_ref().unwrap().kind else {
        panic!("expected next call");
    };
    assert_eq!(func, "CounterIter__next");
}

#[test]
fn match_with_binding_extracts_payload_and_substitutes_guard() {
    let src = "\
enum E { A(int), B }
int main() {
    E e = E::A(42);
    match e {
        A(n) if n > 0 => return n;
        _ => return -1;
    }
}
";
    let hir = lower(src);
    let body = body_of(&hir, "main");
    let HirStmt::If {
        cond, then_block, else_block,
    } = &body[1]
    else {
        panic!("expected if/else chain, got {:?}", body[1]);
    };

    // Condition: EnumIs(A) && guard-with-payload.
    let HirExprKind::Binary { op: BinaryOp::And, lhs, rhs } = &cond.kind else {
        panic!("expected tag && guard, got {:?}", cond.kind);
    };
    assert!(matches!(lhs.kind, HirExprKind::EnumIs { .. }));
    // The guard references the payload extraction, not the binding name.
    let HirExprKind::Binary { lhs: guard_lhs, .. } = &rhs.kind else {
        panic!("expected comparison guard");
    };
    assert!(
        matches!(guard_lhs.kind, HirExprKind::EnumPayload { .. }),
        "guard lhs should be a payload extraction, got {:?}",
        guard_lhs.kind
    );

    // Arm body starts with the payload binding.
    let HirStmt::Let(binding) = &then_block[0] else {
        panic!("expected payload binding let");
    };
    assert_eq!(binding.name, "n");
    assert!(matches!(
        binding.init.as_ref().unwrap().kind,
        HirExprKind::EnumPayload { .. }
    ));

    // Wildcard arm became the else branch.
    assert!(!else_block.is_empty());
}

#[test]
fn enum_construction_and_discriminants() {
    let hir = lower("enum E { A(int), B, C = 7 }\nint main() { E e = E::B; return 0; }");
    let e = hir.enum_def("E").unwrap();
    assert!(e.has_payload);
    assert_eq!(e.member("A").unwrap().value, 0);
    assert_eq!(e.member("B").unwrap().value, 1);
    assert_eq!(e.member("C").unwrap().value, 7);

    let body = body_of(&hir, "main");
    let HirStmt::Let(l) = &body[0] else {
        panic!("expected let");
    };
    assert!(matches!(
        l.init.as_ref().unwrap().kind,
        HirExprKind::EnumVariant { .. }
    ));
}

#[test]
fn sizeof_folds_to_int() {
    let hir = lower("struct P { int x; long y; }\nint main() { long s = sizeof(P); long a = alignof(P); return 0; }");
    let body = body_of(&hir, "main");
    let HirStmt::Let(s) = &body[0] else { panic!() };
    // { int; long } -> 0, 8 -> total 16.
    assert!(matches!(s.init.as_ref().unwrap().kind, HirExprKind::IntLit(16)));
    let HirStmt::Let(a) = &body[1] else { panic!() };
    assert!(matches!(a.init.as_ref().unwrap().kind, HirExprKind::IntLit(8)));
}

#[test]
fn constructor_sugar_calls_mangled_ctor() {
    let src = "\
struct Point { int x; int y; }
impl Point {
    self(int x, int y) { }
}
int main() { Point p = Point(1, 2); return 0; }
";
    let hir = lower(src);
    let body = body_of(&hir, "main");
    let HirStmt::Let(l) = &body[0] else {
        panic!("expected let");
    };
    assert!(l.init.is_none());
    let ctor = l.ctor_call.as_ref().expect("expected ctor call");
    let HirExprKind::Call { func, args, .. } = &ctor.kind else {
        panic!("expected ctor call expr");
    };
    assert_eq!(func, "Point__ctor_2");
    // Receiver + two arguments.
    assert_eq!(args.len(), 3);
    assert!(matches!(
        args[0].kind,
        HirExprKind::Unary { op: UnaryOp::AddrOf, .. }
    ));
}

#[test]
fn implicit_default_ctor() {
    let src = "\
struct Point { int x; int y; }
impl Point { self() { } }
int main() { Point p; return 0; }
";
    let hir = lower(src);
    let body = body_of(&hir, "main");
    let HirStmt::Let(l) = &body[0] else { panic!() };
    let ctor = l.ctor_call.as_ref().expect("expected implicit ctor");
    let HirExprKind::Call { func, .. } = &ctor.kind else {
        panic!()
    };
    assert_eq!(func, "Point__ctor");
}

#[test]
fn defer_and_must_survive_lowering() {
    let hir = lower("int main() { defer println(\"1\"); must { int x = 0; } return 0; }");
    let body = body_of(&hir, "main");
    assert!(matches!(body[0], HirStmt::Defer(_)));
    assert!(matches!(body[1], HirStmt::MustBlock { .. }));
}

#[test]
fn namespace_functions_are_flattened() {
    let hir = lower("namespace math { export int abs(int x) { return x; } }\nint main() { return math::abs(3); }");
    assert!(hir.function("math::abs").is_some());
    let body = body_of(&hir, "main");
    let HirStmt::Return(Some(expr), _) = &body[0] else {
        panic!("expected return");
    };
    let HirExprKind::Call { func, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(func, "math::abs");
}

#[test]
fn interface_dispatch_vs_direct_call() {
    let src = "\
interface Shape { int area(); }
struct Square { int side; }
impl Shape for Square {
    int area() { return 9; }
}
int call_direct(Square s) { return s.area(); }
int call_dynamic(Shape s) { return s.area(); }
";
    let hir = lower(src);

    let direct = body_of(&hir, "call_direct");
    let HirStmt::Return(Some(expr), _) = &direct[0] else {
        panic!()
    };
    let HirExprKind::Call { func, .. } = &expr.kind else {
        panic!("expected direct call, got {:?}", expr.kind);
    };
    assert_eq!(func, "Square__area__Shape");

    let dynamic = body_of(&hir, "call_dynamic");
    let HirStmt::Return(Some(expr), _) = &dynamic[0] else {
        panic!()
    };
    assert!(matches!(expr.kind, HirExprKind::MethodCall { .. }));
}

#[test]
fn operator_overload_rewrites_to_call() {
    let src = "\
struct Vec2 { int x; int y; }
interface Add { operator + (Vec2 other) -> Vec2; }
impl Add for Vec2 {
    operator + (Vec2 other) -> Vec2 { return other; }
}
Vec2 add2(Vec2 a, Vec2 b) { return a + b; }
";
    let hir = lower(src);
    let body = body_of(&hir, "add2");
    let HirStmt::Return(Some(expr), _) = &body[0] else {
        panic!()
    };
    let HirExprKind::Call { func, args, .. } = &expr.kind else {
        panic!("expected overload call, got {:?}", expr.kind);
    };
    assert_eq!(func, "Vec2__op_add__Add");
    assert_eq!(args.len(), 2);
}

#[test]
fn llvm_template_becomes_asm_node() {
    let hir = lower("int main() { __llvm__(\"mov ${+r:x}, ${r:y}; add ${+r:x}\"); return 0; }");
    let body = body_of(&hir, "main");
    let HirStmt::Asm(asm) = &body[0] else {
        panic!("expected asm node, got {:?}", body[0]);
    };
    // Unique (constraint, var) pairs get numbered; the repeat reuses $0.
    assert_eq!(asm.code, "mov $0, $1; add $0");
    assert_eq!(asm.operands.len(), 2);
    assert_eq!(asm.operands[0], AsmOperand { constraint: "+r".into(), var_name: "x".into() });
    assert_eq!(asm.operands[1], AsmOperand { constraint: "r".into(), var_name: "y".into() });
}

#[test]
fn generic_function_keeps_generics_for_mono() {
    let hir = lower("<T> T id(T x) { return x; }\nint main() { return id<int>(7); }");
    let id = hir.function("id").unwrap();
    assert_eq!(id.generics.names, vec!["T"]);

    let body = body_of(&hir, "main");
    let HirStmt::Return(Some(expr), _) = &body[0] else {
        panic!()
    };
    let HirExprKind::Call { func, type_args, .. } = &expr.kind else {
        panic!("expected call");
    };
    assert_eq!(func, "id");
    assert_eq!(type_args.len(), 1);
    // Return type resolved through the substitution.
    assert!(matches!(expr.ty.kind, TypeKind::Int { .. }));
}
