//! The Cm compiler CLI.
//!
//! Provides the `cm` command:
//!
//! - `cm run <file>` — execute via the MIR interpreter
//! - `cm compile <file>` — emit a compiled artifact (LLVM IR or JavaScript)
//! - `cm check <file>` — preprocess, parse and lower only
//!
//! The pipeline is: import preprocessing, lexing, parsing, target
//! filtering, HIR lowering, monomorphization, MIR lowering, the optimizer
//! (at `-O1`..`-O3`), program DCE (compile only), then the interpreter or
//! a backend. Diagnostics are back-mapped to original files through the
//! preprocessor's source map.

use std::path::{Path, PathBuf};
use std::process::{self, Command};

use clap::{Args, Parser, Subcommand};
use rustc_hash::FxHashMap;

use cm_common::debug::{Level, Stage, Tracer};
use cm_common::diagnostics::{self, Diagnostic, Lang};
use cm_common::source_map::SourceMap;
use cm_common::Target;

#[derive(Parser)]
#[command(name = "cm", version, about = "The Cm compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct BuildArgs {
    /// Input source file
    file: PathBuf,

    /// Output path
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Optimization level (0-3); 0 disables the MIR optimizer
    #[arg(short = 'O', default_value = "0", value_parser = clap::value_parser!(u8).range(0..=3))]
    opt_level: u8,

    /// Build target (native/wasm/js/web)
    #[arg(long)]
    target: Option<String>,

    /// Emit LLVM IR
    #[arg(long = "emit-llvm")]
    emit_llvm: bool,

    /// Emit JavaScript
    #[arg(long = "emit-js")]
    emit_js: bool,

    /// Execute after emitting (JS via node)
    #[arg(long = "run")]
    run_after_emit: bool,

    /// Dump the AST after target filtering
    #[arg(long)]
    ast: bool,

    /// Dump an HIR summary
    #[arg(long)]
    hir: bool,

    /// Dump MIR before optimization
    #[arg(long)]
    mir: bool,

    /// Dump MIR after optimization
    #[arg(long = "mir-opt")]
    mir_opt: bool,

    /// Debug tracing; optionally a level (trace/debug/info/warn/error)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", num_args = 0..=1, default_missing_value = "info")]
    debug: Option<String>,

    /// Diagnostic language (en/ja)
    #[arg(long, default_value = "en")]
    lang: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program with the interpreter
    Run(BuildArgs),
    /// Compile a program to an artifact
    Compile(BuildArgs),
    /// Check syntax and lowering without emitting anything
    Check(BuildArgs),
}

fn main() {
    let cli = Cli::parse();
    let (mode, args) = match cli.command {
        Commands::Run(args) => (Mode::Run, args),
        Commands::Compile(args) => (Mode::Compile, args),
        Commands::Check(args) => (Mode::Check, args),
    };
    match drive(mode, &args) {
        Ok(code) => process::exit(code),
        Err(message) => {
            eprintln!("{message}");
            process::exit(1);
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Run,
    Compile,
    Check,
}

/// The whole pipeline; returns the process exit code.
fn drive(mode: Mode, args: &BuildArgs) -> Result<i32, String> {
    let tracer = match &args.debug {
        Some(level) => Tracer::enabled(Level::from_str_lossy(level)),
        None => Tracer::disabled(),
    };
    let lang = if args.lang == "ja" { Lang::Ja } else { Lang::En };

    let source = std::fs::read_to_string(&args.file)
        .map_err(|e| format!("cannot open {}: {e}", args.file.display()))?;

    // ── Import preprocessing ───────────────────────────────────────────
    let search_paths = cm_preprocessor::resolve::standard_search_paths(&args.file);
    let mut preprocessor =
        cm_preprocessor::ImportPreprocessor::new(search_paths, tracer.clone());
    let processed = preprocessor
        .process(&source, &args.file)
        .map_err(|e| e.to_string())?;
    tracer.log(
        Stage::Preprocess,
        Level::Info,
        format!("{} imported modules", processed.imported_modules.len()),
    );

    let unified = &processed.processed_source;
    let file_contents = load_referenced_files(&processed.source_map, &source, &args.file);

    // ── Lex + parse ────────────────────────────────────────────────────
    let (mut program, parse_diags) =
        cm_parser::parse_source(unified, &args.file.display().to_string());
    if report(&parse_diags, unified, &processed.source_map, &file_contents, lang) {
        return Ok(1);
    }
    tracer.log(
        Stage::Parse,
        Level::Info,
        format!("{} declarations", program.declarations.len()),
    );

    // ── Target filtering ───────────────────────────────────────────────
    let active_target = match mode {
        Mode::Run => Target::Interpreter,
        _ => match &args.target {
            Some(t) => Target::from_str_lossy(t),
            None if args.emit_js => Target::Js,
            None => Target::Native,
        },
    };
    cm_parser::target_filter::filter_program(&mut program, active_target);

    if args.ast {
        println!("=== AST ===");
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("cannot serialize AST: {e}"),
        }
    }

    // ── HIR lowering ───────────────────────────────────────────────────
    let mut lowering = cm_hir::HirLowering::new();
    let hir = lowering.lower(&program).map_err(|e| e.to_string())?;
    if report(
        lowering.diagnostics(),
        unified,
        &processed.source_map,
        &file_contents,
        lang,
    ) {
        return Ok(1);
    }
    tracer.log(
        Stage::Hir,
        Level::Info,
        format!("{} functions", hir.functions.len()),
    );

    if args.hir {
        println!("=== HIR ===");
        for f in &hir.functions {
            println!(
                "fn {} ({} params, {} stmts{})",
                f.name,
                f.params.len(),
                f.body.len(),
                if f.generics.is_empty() { "" } else { ", generic" }
            );
        }
    }

    if mode == Mode::Check {
        if args.verbose {
            println!("check passed");
        }
        return Ok(0);
    }

    // ── Monomorphization + MIR lowering ────────────────────────────────
    let mono = cm_mir::mono::monomorphize(&hir).map_err(|e| e.to_string())?;
    let mut mir = cm_mir::lower::lower_program(&mono).map_err(|e| e.to_string())?;
    tracer.log(
        Stage::Mir,
        Level::Info,
        format!(
            "{} functions, {} instructions",
            mir.functions.len(),
            mir.instruction_count()
        ),
    );

    if args.mir && !args.mir_opt {
        println!("=== MIR ===");
        print!("{}", cm_mir::printer::print_program(&mir));
    }

    // ── Optimization ───────────────────────────────────────────────────
    if args.opt_level > 0 {
        let mut manager = cm_mir::opt::PassManager::new();
        manager.add_standard_passes(args.opt_level);
        if args.opt_level >= 2 {
            let result = manager.run_until_fixpoint(&mut mir);
            if !result.converged {
                tracer.log(
                    Stage::Opt,
                    Level::Warn,
                    format!("fixpoint not reached in {} iterations", result.iterations),
                );
            }
        } else {
            manager.run(&mut mir);
        }
    }

    // Program DCE only for compiled output: the interpreter dispatches
    // interfaces dynamically and may reach anything.
    if mode == Mode::Compile {
        let removed = cm_mir::dce::run(&mut mir);
        tracer.log(
            Stage::Mir,
            Level::Debug,
            format!(
                "DCE removed {} functions, {} structs",
                removed.removed_functions, removed.removed_structs
            ),
        );
    }

    if args.mir_opt {
        println!("=== MIR (optimized) ===");
        print!("{}", cm_mir::printer::print_program(&mir));
    }

    // ── Execution / emission ───────────────────────────────────────────
    match mode {
        Mode::Run => {
            let mut stdout = std::io::stdout();
            let mut interpreter = cm_interp::Interpreter::new(&mir, &mut stdout);
            let code = interpreter.execute().map_err(|e| format!("runtime error: {e}"))?;
            Ok((code & 0xff) as i32)
        }
        Mode::Compile => compile_artifact(args, &mut mir, active_target, &tracer),
        Mode::Check => unreachable!(),
    }
}

fn compile_artifact(
    args: &BuildArgs,
    mir: &mut cm_mir::MirProgram,
    active_target: Target,
    tracer: &Tracer,
) -> Result<i32, String> {
    use cm_codegen::BuildTarget;

    let build_target = match active_target {
        Target::Js => BuildTarget::Js,
        Target::Web => BuildTarget::Web,
        Target::Wasm => BuildTarget::Wasm,
        _ if args.emit_js => BuildTarget::Js,
        _ => BuildTarget::Native,
    };

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(match build_target {
            BuildTarget::Js => "output.js",
            BuildTarget::Web => "output.html",
            BuildTarget::Wasm => "a.wasm.ll",
            BuildTarget::Native => {
                if args.emit_llvm {
                    "a.ll"
                } else {
                    "a.out.ll"
                }
            }
        })
    });

    let mut options = cm_codegen::CodegenOptions::new(build_target, output.clone(), args.opt_level);
    options.verbose = args.verbose;
    cm_codegen::compile(mir, &options, tracer).map_err(|e| e.to_string())?;

    if args.verbose {
        println!("compiled: {}", output.display());
    }

    if args.run_after_emit {
        match build_target {
            BuildTarget::Js => {
                let status = Command::new("node")
                    .arg(&output)
                    .status()
                    .map_err(|e| format!("cannot run node: {e}"))?;
                return Ok(status.code().unwrap_or(1));
            }
            _ => {
                // Native execution goes through the platform toolchain; the
                // interpreter gives the same observable behavior here.
                let mut stdout = std::io::stdout();
                let mut interpreter = cm_interp::Interpreter::new(mir, &mut stdout);
                let code = interpreter
                    .execute()
                    .map_err(|e| format!("runtime error: {e}"))?;
                return Ok((code & 0xff) as i32);
            }
        }
    }

    Ok(0)
}

/// Print diagnostics (back-mapped through the source map); returns whether
/// any error-severity diagnostic was present.
fn report(
    diags: &[Diagnostic],
    unified: &str,
    map: &SourceMap,
    file_contents: &FxHashMap<String, String>,
    lang: Lang,
) -> bool {
    for diag in diags {
        if map.is_empty() {
            eprint!("{}", diagnostics::render(diag, unified, lang));
        } else {
            eprint!(
                "{}",
                diagnostics::render_with_source_map(diag, unified, map, file_contents, lang)
            );
        }
    }
    diagnostics::has_errors(diags)
}

/// Load every original file the source map references, for diagnostic
/// snippets.
fn load_referenced_files(
    map: &SourceMap,
    root_source: &str,
    root_path: &Path,
) -> FxHashMap<String, String> {
    let mut contents = FxHashMap::default();
    contents.insert(root_path.display().to_string(), root_source.to_string());
    for file in map.referenced_files() {
        if !contents.contains_key(file) {
            if let Ok(text) = std::fs::read_to_string(file) {
                contents.insert(file.to_string(), text);
            }
        }
    }
    contents
}
