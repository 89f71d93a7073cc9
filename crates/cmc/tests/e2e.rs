//! End-to-end tests driving the `cm` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn cm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cm"))
}

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn run_file(path: &Path) -> Output {
    cm().arg("run").arg(path).output().expect("failed to spawn cm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn hello_world_prints_and_exits_zero() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "hello.cm",
        "int main() { println(\"hello\"); return 0; }\n",
    );
    let output = run_file(&file);
    assert_eq!(stdout(&output), "hello\n", "stderr: {}", stderr(&output));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn hello_world_through_std_import() {
    let dir = TempDir::new().unwrap();
    write(&dir, "modules/std/io.cm", "export void println(string s);\n");
    let file = write(
        &dir,
        "hello.cm",
        "import std::io::println;\nint main() { println(\"hello\"); return 0; }\n",
    );
    let output = cm()
        .arg("run")
        .arg(&file)
        .env("CM_MODULE_PATH", dir.path().join("modules"))
        .output()
        .unwrap();
    assert_eq!(stdout(&output), "hello\n", "stderr: {}", stderr(&output));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn generic_identity_returns_seven() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "id.cm",
        "<T> T id(T x) { return x; }\nint main() { return id<int>(7); }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(7), "stderr: {}", stderr(&output));
}

#[test]
fn generic_identity_monomorphizes_once() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "id.cm",
        "<T> T id(T x) { return x; }\nint main() { int a = id<int>(1); int b = id<int>(2); return a + b; }\n",
    );
    let output = cm().arg("run").arg(&file).arg("--mir").output().unwrap();
    let out = stdout(&output);
    let count = out.matches("fn id__T=Int(").count();
    assert_eq!(count, 1, "{out}");
}

#[test]
fn circular_import_reports_both_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "b.cm", "import ./a;\n");
    let file = write(&dir, "a.cm", "import ./b;\nint main() { return 0; }\n");
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("Circular dependency"), "{err}");
    assert!(err.contains("a.cm"), "{err}");
    assert!(err.contains("b.cm"), "{err}");
}

#[test]
fn match_with_binding_returns_payload() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "match.cm",
        "enum E { A(int), B }\n\
         int main() {\n\
           E e = E::A(42);\n\
           match e {\n\
             A(n) if n > 0 => return n;\n\
             _             => return -1;\n\
           }\n\
           return 0;\n\
         }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(42), "stderr: {}", stderr(&output));
}

#[test]
fn defer_runs_lifo() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "defer.cm",
        "int main() { defer println(\"1\"); defer println(\"2\"); return 0; }\n",
    );
    let output = run_file(&file);
    assert_eq!(stdout(&output), "2\n1\n", "stderr: {}", stderr(&output));
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn must_block_survives_o3() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "must.cm",
        "int f() { must { int x = 0; x = x + 0; return x; } }\nint main() { return f(); }\n",
    );
    let output = cm()
        .arg("run")
        .arg(&file)
        .arg("-O3")
        .arg("--mir-opt")
        .output()
        .unwrap();
    let out = stdout(&output);
    // The x + 0 instruction is still present after -O3.
    assert!(out.contains("add x, 0"), "{out}");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn optimizer_folds_constants_outside_must() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "fold.cm",
        "int main() { int x = 2 + 3; return x; }\n",
    );
    let output = cm()
        .arg("run")
        .arg(&file)
        .arg("-O2")
        .arg("--mir-opt")
        .output()
        .unwrap();
    let out = stdout(&output);
    assert!(!out.contains("add 2, 3"), "constant should be folded: {out}");
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn empty_file_compiles_quietly() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "empty.cm", "");
    let output = cm()
        .arg("check")
        .arg(&file)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
}

#[test]
fn self_import_is_circular() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "this.cm", "import ./this;\nint main() { return 0; }\n");
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Circular dependency"), "{}", stderr(&output));
}

#[test]
fn missing_module_fails_with_location() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "main.cm", "import ./nothing;\nint main() { return 0; }\n");
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("module not found"), "{err}");
    assert!(err.contains("./nothing"), "{err}");
}

#[test]
fn parse_error_reports_and_fails() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "broken.cm", "int main( { return 0; }\n");
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1));
    assert!(!stderr(&output).is_empty());
}

#[test]
fn compile_emits_llvm_ir_text() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "hello.cm", "int main() { return 0; }\n");
    let out_path = dir.path().join("hello.ll");
    let output = cm()
        .arg("compile")
        .arg(&file)
        .arg("-o")
        .arg(&out_path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let ir = fs::read_to_string(&out_path).unwrap();
    assert!(ir.contains("define i64 @main()"), "{ir}");
}

#[test]
fn compile_emits_js_and_node_runs_it() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "hello.cm",
        "int main() { println(\"from js\"); return 3; }\n",
    );
    let out_path = dir.path().join("hello.js");
    let output = cm()
        .arg("compile")
        .arg(&file)
        .arg("--emit-js")
        .arg("-o")
        .arg(&out_path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let js = fs::read_to_string(&out_path).unwrap();
    assert!(js.contains("cm_println"), "{js}");

    // When node is available, the artifact actually runs.
    if let Ok(node) = Command::new("node").arg(&out_path).output() {
        assert_eq!(String::from_utf8_lossy(&node.stdout), "from js\n");
        assert_eq!(node.status.code(), Some(3));
    }
}

#[test]
fn interface_dispatch_end_to_end() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "shapes.cm",
        "interface Shape { int area(); }\n\
         struct Square { int side; }\n\
         impl Shape for Square { int area() { return this.side * this.side; } }\n\
         struct Rect { int w; int h; }\n\
         impl Shape for Rect { int area() { return this.w * this.h; } }\n\
         int measure(Shape s) { return s.area(); }\n\
         int main() {\n\
           Square q = Square { side: 3 };\n\
           Rect r = Rect { w: 2, h: 5 };\n\
           return measure(q) + measure(r);\n\
         }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(19), "stderr: {}", stderr(&output));
}

#[test]
fn module_import_namespaced_call() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "mathlib.cm",
        "export int triple(int x) { return x * 3; }\n",
    );
    let file = write(
        &dir,
        "main.cm",
        "import ./mathlib;\nint main() { return mathlib::triple(4); }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(12), "stderr: {}", stderr(&output));
}

#[test]
fn target_filtering_picks_interpreter_variant() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "targets.cm",
        "#[target(intr)]\nint pick() { return 1; }\n\
         #[target(!intr)]\nint pick() { return 2; }\n\
         int main() { return pick(); }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
}

#[test]
fn check_mode_stops_before_execution() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "check.cm",
        "int main() { println(\"should not print\"); return 0; }\n",
    );
    let output = cm().arg("check").arg(&file).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "");
}

#[test]
fn int64_min_literal_round_trips() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "min.cm",
        "int main() { long x = -9223372036854775808; if x < 0 { return 1; } return 0; }\n",
    );
    let output = run_file(&file);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
}
