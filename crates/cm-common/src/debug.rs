//! Leveled debug tracing.
//!
//! The tracer is configured once at startup from `--debug`/`-d=LEVEL` and is
//! read-only afterwards; components receive it by reference and never mutate
//! it. Output goes to stderr so it interleaves with diagnostics rather than
//! program output.

use std::fmt;

/// Trace verbosity, most verbose first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Parse a `-d=LEVEL` value. Unknown strings fall back to `Info`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        f.write_str(s)
    }
}

/// The pipeline stage a trace message belongs to, used as the line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Lex,
    Parse,
    Hir,
    Mir,
    Opt,
    Codegen,
    Interp,
}

impl Stage {
    fn tag(self) -> &'static str {
        match self {
            Stage::Preprocess => "PREPROCESS",
            Stage::Lex => "LEX",
            Stage::Parse => "PARSE",
            Stage::Hir => "HIR",
            Stage::Mir => "MIR",
            Stage::Opt => "OPT",
            Stage::Codegen => "CODEGEN",
            Stage::Interp => "INTERP",
        }
    }
}

/// Immutable tracing configuration, set once at startup.
#[derive(Debug, Clone)]
pub struct Tracer {
    enabled: bool,
    level: Level,
}

impl Tracer {
    /// A tracer that drops everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            level: Level::Info,
        }
    }

    /// A tracer printing messages at `level` and above.
    pub fn enabled(level: Level) -> Self {
        Self {
            enabled: true,
            level,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit a message if tracing is on and `level` is at or above the
    /// configured threshold.
    pub fn log(&self, stage: Stage, level: Level, message: impl AsRef<str>) {
        if self.enabled && level >= self.level {
            eprintln!("[{}] {}", stage.tag(), message.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(Level::from_str_lossy("trace"), Level::Trace);
        assert_eq!(Level::from_str_lossy("error"), Level::Error);
        assert_eq!(Level::from_str_lossy("bogus"), Level::Info);
    }

    #[test]
    fn level_ordering_filters() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn disabled_tracer_reports_disabled() {
        assert!(!Tracer::disabled().is_enabled());
        assert!(Tracer::enabled(Level::Debug).is_enabled());
    }
}
