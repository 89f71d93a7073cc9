//! The backend optimization driver.
//!
//! Sits between the optimized MIR and the actual emitters. Before any code
//! is produced it:
//!
//! 1. runs the MIR pattern detector (informational; it never changes the
//!    user's optimization level),
//! 2. runs the recursion limiter, marking cyclic and oversized functions
//!    `no_inline`/`no_optimize`,
//! 3. validates the module against infinite-loop and complexity limits
//!    (bypassed for bare-metal triples, where busy-loops are legitimate),
//! 4. hands the program to a [`Backend`] under a wall-clock deadline and
//!    an output-size cap.
//!
//! Native object emission is delegated to the platform toolchain; the
//! in-tree backends produce LLVM IR text and JavaScript.

pub mod emit;
pub mod js;
pub mod limiter;
pub mod llvm_ir;
pub mod pattern;
pub mod validate;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use cm_common::debug::{Level, Stage, Tracer};
use cm_mir::MirProgram;

#[derive(Debug, Clone, PartialEq)]
pub enum CodegenError {
    /// The pre-codegen validator rejected the module.
    Validation(String),
    /// Emission exceeded the wall-clock deadline.
    Timeout { seconds: u64 },
    /// Emission exceeded the output-size cap.
    OutputTooLarge { limit_mb: usize },
    /// A construct the selected backend cannot express.
    Unsupported(String),
    Io(String),
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => {
                write!(f, "code generation aborted: {msg}")
            }
            Self::Timeout { seconds } => write!(
                f,
                "code generation timeout after {seconds} seconds; try a lower -O level"
            ),
            Self::OutputTooLarge { limit_mb } => {
                write!(f, "output size exceeded {limit_mb}MB limit; try a lower -O level")
            }
            Self::Unsupported(what) => write!(f, "unsupported construct: {what}"),
            Self::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CodegenError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTarget {
    Native,
    Wasm,
    Js,
    Web,
}

impl BuildTarget {
    /// The default triple string handed to the backend.
    pub fn triple(self) -> &'static str {
        match self {
            BuildTarget::Native => "x86_64-unknown-linux-gnu",
            BuildTarget::Wasm => "wasm32-unknown-unknown",
            BuildTarget::Js | BuildTarget::Web => "js-unknown-unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub target: BuildTarget,
    pub triple: String,
    pub opt_level: u8,
    pub output: PathBuf,
    pub timeout: Duration,
    pub max_output_size: usize,
    pub verbose: bool,
}

impl CodegenOptions {
    pub fn new(target: BuildTarget, output: PathBuf, opt_level: u8) -> Self {
        Self {
            target,
            triple: target.triple().to_string(),
            opt_level,
            output,
            timeout: emit::DEFAULT_TIMEOUT,
            max_output_size: emit::MAX_OUTPUT_SIZE,
            verbose: false,
        }
    }
}

/// A code emitter. `emit` writes the artifact incrementally so the driver
/// can poll output growth against the size cap.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
    fn emit(
        &self,
        program: &MirProgram,
        triple: &str,
        opt_level: u8,
        out: &mut dyn io::Write,
    ) -> Result<(), CodegenError>;
}

/// Drive the full backend pipeline and write the artifact to
/// `options.output`.
pub fn compile(
    program: &mut MirProgram,
    options: &CodegenOptions,
    tracer: &Tracer,
) -> Result<(), CodegenError> {
    // 1. Pattern detection: report only, never downgrade silently.
    let report = pattern::detect(program, options.opt_level);
    if options.verbose || tracer.is_enabled() {
        eprint!("{report}");
    }
    if report.recommended_level < options.opt_level {
        eprintln!(
            "note: pattern detector recommends -O{} (keeping requested -O{})",
            report.recommended_level, options.opt_level
        );
    }

    // 2. Recursion limiting.
    let limits = limiter::apply(program, options.opt_level);
    tracer.log(
        Stage::Codegen,
        Level::Debug,
        format!(
            "recursion limiter: {} recursive, {} marked no-inline",
            limits.recursive_functions.len(),
            limits.no_inline_count
        ),
    );

    // 3. Pre-codegen validation. Bare-metal and UEFI triples bypass it:
    // intentional busy-loops are legitimate there.
    let bare_metal = options.triple.contains("none") || options.triple.contains("uefi");
    if !bare_metal {
        validate::validate(program).map_err(CodegenError::Validation)?;
    }

    // 4. Timeout-guarded emission.
    let backend: Box<dyn Backend> = match options.target {
        BuildTarget::Js | BuildTarget::Web => Box::new(js::JsBackend::new(
            options.target == BuildTarget::Web,
        )),
        _ => Box::new(llvm_ir::LlvmIrBackend),
    };
    tracer.log(
        Stage::Codegen,
        Level::Info,
        format!("emitting via {} backend", backend.name()),
    );

    let data = emit::generate_guarded(
        backend,
        program.clone(),
        options.triple.clone(),
        options.opt_level,
        options.timeout,
        options.max_output_size,
    )?;

    std::fs::write(&options.output, data)
        .map_err(|e| CodegenError::Io(format!("cannot write {}: {e}", options.output.display())))?;
    Ok(())
}
