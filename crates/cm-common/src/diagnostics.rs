//! Diagnostic types and rendering.
//!
//! Every pipeline stage collects non-fatal [`Diagnostic`]s; the driver prints
//! them all at the end of the stage and exits non-zero if any has
//! [`Severity::Error`]. Rendering goes through ariadne with a labeled span
//! into the unified source, and is back-mapped to the original file and line
//! through the preprocessor's [`SourceMap`] when one is available.

use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::source_map::{SourceMap, GENERATED};
use crate::span::{LineIndex, Span};

/// How serious a diagnostic is. A non-empty `Error` list fails the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Diagnostic message language, switched by `--lang=ja`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    En,
    Ja,
}

impl Lang {
    /// The localized severity label.
    pub fn severity_word(self, severity: Severity) -> &'static str {
        match (self, severity) {
            (Lang::En, Severity::Error) => "error",
            (Lang::En, Severity::Warning) => "warning",
            (Lang::En, Severity::Note) => "note",
            (Lang::Ja, Severity::Error) => "エラー",
            (Lang::Ja, Severity::Warning) => "警告",
            (Lang::Ja, Severity::Note) => "注記",
        }
    }
}

/// A single diagnostic with a span into the unified source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }
}

/// Whether a diagnostic list contains at least one hard error.
pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(|d| d.severity == Severity::Error)
}

/// Render a diagnostic against the unified source with ariadne.
///
/// Output is colorless so tests can snapshot it.
pub fn render(diag: &Diagnostic, source: &str, lang: Lang) -> String {
    let kind = match diag.severity {
        Severity::Error => ReportKind::Error,
        Severity::Warning => ReportKind::Warning,
        Severity::Note => ReportKind::Advice,
    };
    let span = clamp(diag.span.start as usize..diag.span.end as usize, source.len());

    let report = Report::build(kind, span.clone())
        .with_message(format!("{}: {}", lang.severity_word(diag.severity), diag.message))
        .with_config(Config::default().with_color(false))
        .with_label(Label::new(span).with_message(&diag.message))
        .finish();

    let mut buf = Vec::new();
    if report.write(Source::from(source), &mut buf).is_err() {
        return format!("{}: {}\n", lang.severity_word(diag.severity), diag.message);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Render a diagnostic back-mapped through the preprocessor source map.
///
/// Resolves the diagnostic's unified-source line to its original file and
/// line, prints the offending original line with a caret underline, and
/// appends the import chain when the line came from an inlined module.
/// Falls back to [`render`] when the line has no usable mapping.
pub fn render_with_source_map(
    diag: &Diagnostic,
    unified_source: &str,
    map: &SourceMap,
    file_contents: &FxHashMap<String, String>,
    lang: Lang,
) -> String {
    let index = LineIndex::new(unified_source);
    let (line, col) = index.line_col(diag.span.start);

    let Some(entry) = map.lookup(line as usize) else {
        return render(diag, unified_source, lang);
    };
    if entry.original_file == GENERATED || entry.original_file.is_empty() {
        return render(diag, unified_source, lang);
    }

    let mut out = format!(
        "{}:{}:{}: {}: {}\n",
        entry.original_file,
        entry.original_line,
        col,
        lang.severity_word(diag.severity),
        diag.message
    );

    // Print the original line with a caret underline when we have the file.
    if let Some(content) = file_contents.get(&entry.original_file) {
        if let Some(text) = content.lines().nth(entry.original_line.saturating_sub(1)) {
            out.push_str("  ");
            out.push_str(text);
            out.push('\n');
            let width = (diag.span.len() as usize).max(1).min(text.len().max(1));
            out.push_str("  ");
            out.push_str(&" ".repeat((col as usize).saturating_sub(1)));
            out.push('^');
            out.push_str(&"~".repeat(width.saturating_sub(1)));
            out.push('\n');
        }
    }

    if !entry.import_chain.is_empty() && entry.import_chain.contains(" -> ") {
        match lang {
            Lang::En => out.push_str(&format!("  imported via: {}\n", entry.import_chain)),
            Lang::Ja => out.push_str(&format!("  インポート経路: {}\n", entry.import_chain)),
        }
    }

    out
}

fn clamp(r: Range<usize>, len: usize) -> Range<usize> {
    let s = r.start.min(len);
    let e = r.end.min(len).max(s);
    if s == e {
        s..e.saturating_add(1).min(len.max(1))
    } else {
        s..e
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_ignores_warnings() {
        let diags = vec![Diagnostic::warning("w", Span::new(0, 1))];
        assert!(!has_errors(&diags));
        let diags = vec![
            Diagnostic::warning("w", Span::new(0, 1)),
            Diagnostic::error("e", Span::new(0, 1)),
        ];
        assert!(has_errors(&diags));
    }

    #[test]
    fn render_mentions_message() {
        let src = "int main() { retrun 0; }\n";
        let diag = Diagnostic::error("unexpected token", Span::new(13, 19));
        let out = render(&diag, src, Lang::En);
        assert!(out.contains("unexpected token"), "{out}");
        assert!(out.contains("error"), "{out}");
    }

    #[test]
    fn source_map_back_mapping() {
        let unified = "// Begin module\nbad line here\n";
        let mut map = SourceMap::new();
        map.push_generated("main.cm");
        map.push("lib.cm", 12, "main.cm -> lib.cm");

        let mut contents = FxHashMap::default();
        contents.insert(
            "lib.cm".to_string(),
            "line one\nline two\n".repeat(6),
        );

        let diag = Diagnostic::error("bad thing", Span::new(16, 19));
        let out = render_with_source_map(&diag, unified, &map, &contents, Lang::En);
        assert!(out.starts_with("lib.cm:12:1: error: bad thing"), "{out}");
        assert!(out.contains("imported via: main.cm -> lib.cm"), "{out}");
    }

    #[test]
    fn japanese_severity_words() {
        assert_eq!(Lang::Ja.severity_word(Severity::Error), "エラー");
        assert_eq!(Lang::En.severity_word(Severity::Warning), "warning");
    }
}
