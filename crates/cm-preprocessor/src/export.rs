//! Text-level export rewriting for inlined modules.
//!
//! The preprocessor works on raw text, before the parser runs. These
//! transforms operate on top-level declaration chunks found by brace
//! counting:
//!
//! - selective-import filtering (keep only the requested items),
//! - `export { x, y };` late-binding lists (reorder the named definitions
//!   ahead of the list, comment the statement out),
//! - `export { ns::{a, b} };` hierarchical re-exports (regroup the inner
//!   namespaces under a new `namespace ns`),
//! - `export NS { ... }` blocks (rewritten to `namespace NS { ... }`),
//! - commenting out `module X;` and leftover `import` lines.
//!
//! The `export` keyword on individual declarations is preserved: the parser
//! consumes it as visibility, and program DCE later keys off it.

/// One top-level region of a module's text. Declarations get their name
/// extracted; blank lines, comments and anything unrecognized become
/// single-line chunks with no name.
#[derive(Debug)]
pub(crate) struct DeclChunk {
    pub name: Option<String>,
    /// Line range, end-exclusive.
    pub start: usize,
    pub end: usize,
    /// Whether the first declaration line carries the `export` keyword.
    pub exported: bool,
}

/// Split a module's text into top-level chunks by brace counting.
pub(crate) fn scan_decls(lines: &[&str]) -> Vec<DeclChunk> {
    let mut chunks = Vec::new();
    let mut i = 0;
    // Attribute lines (`#[...]`) attach to the declaration that follows.
    let mut pending_attr_start: Option<usize> = None;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if trimmed.starts_with("#[") {
            if pending_attr_start.is_none() {
                pending_attr_start = Some(i);
            }
            i += 1;
            continue;
        }

        let Some(name) = decl_name(trimmed) else {
            // Flush any dangling attributes as plain lines.
            if let Some(start) = pending_attr_start.take() {
                for j in start..i {
                    chunks.push(DeclChunk {
                        name: None,
                        start: j,
                        end: j + 1,
                        exported: false,
                    });
                }
            }
            chunks.push(DeclChunk {
                name: None,
                start: i,
                end: i + 1,
                exported: false,
            });
            i += 1;
            continue;
        };

        let start = pending_attr_start.take().unwrap_or(i);
        let exported = trimmed.starts_with("export ") || trimmed.starts_with("export\t");

        // Consume the declaration body: brace-balanced if a `{` appears
        // before the terminating `;`, otherwise up to the first `;`.
        let mut depth: i32 = 0;
        let mut saw_brace = false;
        let mut end = i;
        for (j, line) in lines.iter().enumerate().skip(i) {
            let code = strip_line_comment(line);
            for c in code.chars() {
                match c {
                    '{' => {
                        depth += 1;
                        saw_brace = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if saw_brace {
                if depth == 0 {
                    end = j + 1;
                    break;
                }
            } else if code.contains(';') {
                end = j + 1;
                break;
            }
            end = j + 1;
        }

        chunks.push(DeclChunk {
            name: Some(name),
            start,
            end,
            exported,
        });
        i = end;
    }

    chunks
}

/// Extract the declared name from a declaration's first line, or `None` if
/// the line does not start a declaration.
fn decl_name(line: &str) -> Option<String> {
    let mut rest = line;
    if let Some(stripped) = rest.strip_prefix("export") {
        if stripped.starts_with(char::is_whitespace) {
            rest = stripped.trim_start();
        }
    }

    if rest.is_empty() || rest.starts_with("//") || rest.starts_with('}') {
        return None;
    }
    // `export { ... }` lists and namespaces are handled by their own passes.
    if rest.starts_with('{') {
        return None;
    }

    let first_word = rest.split_whitespace().next()?;
    match first_word {
        "import" | "from" | "module" | "return" | "if" | "else" | "while" | "for" | "match"
        | "defer" | "must" | "break" | "continue" => return None,
        "impl" => {
            // `impl Type { ... }` or `impl Interface for Type { ... }`.
            return ident_after(rest, "impl");
        }
        "struct" | "enum" | "interface" | "namespace" | "typedef" | "template" | "macro"
        | "use" | "extern" => {
            return ident_after(rest, first_word);
        }
        _ => {}
    }

    // Function definition or prototype: identifier directly before `(`.
    if let Some(paren) = rest.find('(') {
        let before_eq = rest.find('=').map(|e| paren < e).unwrap_or(true);
        if before_eq {
            let head = &rest[..paren];
            let name = head.split_whitespace().last()?;
            // Generic markers stick to the name (`<T> T id(` -> `id`).
            let name = name.rsplit(['>', '*', '&']).next().unwrap_or(name);
            if is_ident(name) && head.split_whitespace().count() >= 1 {
                return Some(name.to_string());
            }
        }
    }

    // Global variable: `const int NAME = ...;` / `int NAME;` / `let NAME = ...`.
    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.len() >= 2 && rest.contains(';') {
        let candidate = if let Some(eq_pos) = words.iter().position(|w| w.starts_with('=')) {
            words.get(eq_pos.wrapping_sub(1)).copied()
        } else {
            words.last().map(|w| w.trim_end_matches(';'))
        };
        if let Some(name) = candidate {
            let name = name.trim_end_matches(';');
            let starts_like_decl = matches!(words[0], "const" | "static" | "let")
                || words[0].chars().next().is_some_and(|c| c.is_ascii_lowercase());
            if is_ident(name) && starts_like_decl {
                return Some(name.to_string());
            }
        }
    }

    None
}

fn ident_after(text: &str, keyword: &str) -> Option<String> {
    let rest = text.strip_prefix(keyword)?.trim_start();
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// Keep only the chunks whose declared name is in `items`.
///
/// Unnamed lines (comments, blanks) survive; named declarations that are
/// neither requested nor plain helpers are dropped when they are exported
/// or are `impl` blocks (which travel with their type).
pub(crate) fn filter_exports(source: &str, items: &[String]) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let chunks = scan_decls(&lines);
    let mut out = String::new();

    for chunk in &chunks {
        let keep = match &chunk.name {
            Some(name) => items.iter().any(|i| i == name),
            None => !lines[chunk.start].contains("export"),
        };
        if keep {
            for line in &lines[chunk.start..chunk.end] {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out
}

/// Rewrite `export { a, b };` late-binding lists: the named definitions are
/// moved ahead of the list position and the statement becomes a comment.
pub(crate) fn process_export_syntax(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();

    // Find a late-binding export list (no `::` inside).
    let Some((list_idx, names)) = lines.iter().enumerate().find_map(|(i, line)| {
        parse_export_list(line).filter(|(_, raw)| !raw.contains("::")).map(|(names, _)| (i, names))
    }) else {
        return source.to_string();
    };

    let chunks = scan_decls(&lines);
    let exported: Vec<&DeclChunk> = names
        .iter()
        .filter_map(|n| {
            chunks
                .iter()
                .find(|c| c.name.as_deref() == Some(n.as_str()))
        })
        .collect();
    let exported_lines: Vec<usize> = exported
        .iter()
        .flat_map(|c| c.start..c.end)
        .collect();

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == list_idx {
            // Splice the exported definitions first, then the processed marker.
            for chunk in &exported {
                for l in &lines[chunk.start..chunk.end] {
                    out.push_str(l);
                    out.push('\n');
                }
            }
            out.push_str("// ");
            out.push_str(line.trim());
            out.push_str(" (processed)\n");
            continue;
        }
        if exported_lines.contains(&i) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Rewrite `export { ns::{a, b} };` hierarchical re-exports: the inner
/// namespaces move under a fresh `namespace ns { ... }` at the statement's
/// position.
pub(crate) fn process_hierarchical_reexport(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();

    let Some((list_idx, outer, inner_names)) = lines.iter().enumerate().find_map(|(i, line)| {
        parse_hierarchical_export(line).map(|(outer, inner)| (i, outer, inner))
    }) else {
        return source.to_string();
    };

    let chunks = scan_decls(&lines);
    let moved: Vec<&DeclChunk> = inner_names
        .iter()
        .filter_map(|n| {
            chunks.iter().find(|c| {
                c.name.as_deref() == Some(n.as_str())
                    && lines[c.start].trim_start().starts_with("namespace")
            })
        })
        .collect();
    let moved_lines: Vec<usize> = moved.iter().flat_map(|c| c.start..c.end).collect();

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i == list_idx {
            out.push_str(&format!("namespace {outer} {{\n"));
            for chunk in &moved {
                for l in &lines[chunk.start..chunk.end] {
                    out.push_str(l);
                    out.push('\n');
                }
            }
            out.push_str(&format!("}} // namespace {outer}\n"));
            continue;
        }
        if moved_lines.contains(&i) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Rewrite `export NS { ... }` blocks to `namespace NS { ... }`.
pub(crate) fn process_namespace_exports(source: &str) -> String {
    let mut out = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        if let Some(rest) = trimmed.strip_prefix("export ") {
            let rest = rest.trim_start();
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            let after = rest[name.len()..].trim_start();
            if !name.is_empty() && after.starts_with('{') && !is_decl_keyword(&name) {
                out.push_str(indent);
                out.push_str(&format!("namespace {name} {after}"));
                out.push('\n');
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_decl_keyword(word: &str) -> bool {
    matches!(
        word,
        "struct"
            | "enum"
            | "interface"
            | "impl"
            | "typedef"
            | "const"
            | "static"
            | "let"
            | "extern"
            | "use"
            | "namespace"
            | "template"
            | "macro"
            | "int"
            | "uint"
            | "void"
            | "bool"
            | "char"
            | "string"
            | "float"
            | "double"
            | "long"
            | "ulong"
            | "short"
            | "ushort"
            | "tiny"
            | "utiny"
    )
}

/// Apply all export rewrites, then comment out `module X;` declarations and
/// leftover import lines. The per-declaration `export` keyword is kept.
pub(crate) fn rewrite_module_text(source: &str) -> String {
    let processed = process_export_syntax(source);
    let processed = process_namespace_exports(&processed);
    let processed = process_hierarchical_reexport(&processed);

    let mut out = String::new();
    for line in processed.lines() {
        let trimmed = line.trim();
        if is_module_decl_line(trimmed) {
            out.push_str(&format!("// {trimmed} (removed)\n"));
            continue;
        }
        if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            out.push_str(&format!("// {trimmed}\n"));
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn is_module_decl_line(trimmed: &str) -> bool {
    trimmed
        .strip_prefix("module")
        .and_then(|rest| rest.strip_suffix(';'))
        .map(|name| {
            let name = name.trim();
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.')
        })
        .unwrap_or(false)
}

/// Parse `export { a, b as c };` into item names. Returns the names and the
/// raw list text.
fn parse_export_list(line: &str) -> Option<(Vec<String>, String)> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("export")?.trim_start();
    let rest = rest.strip_prefix('{')?;
    let close = rest.find('}')?;
    let list = &rest[..close];
    let names: Vec<String> = list
        .split(',')
        .map(|item| {
            let item = item.trim();
            match item.find(" as ") {
                Some(pos) => item[..pos].trim().to_string(),
                None => item.to_string(),
            }
        })
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return None;
    }
    Some((names, list.to_string()))
}

/// Parse `export { ns::{a, b} };` into (ns, [a, b]).
fn parse_hierarchical_export(line: &str) -> Option<(String, Vec<String>)> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix("export")?.trim_start();
    let rest = rest.strip_prefix('{')?.trim_start();
    let sep = rest.find("::")?;
    let outer = rest[..sep].trim().to_string();
    if !is_ident(&outer) {
        return None;
    }
    let inner = rest[sep + 2..].trim_start().strip_prefix('{')?;
    let close = inner.find('}')?;
    let names: Vec<String> = inner[..close]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if names.is_empty() {
        return None;
    }
    Some((outer, names))
}

/// Extract the body lines of a top-level `namespace <name> { ... }` block.
pub(crate) fn extract_namespace_content(source: &str, name: &str) -> Option<String> {
    let lines: Vec<&str> = source.lines().collect();
    let open = lines.iter().position(|line| {
        let t = line.trim();
        t.strip_prefix("namespace")
            .map(|rest| rest.trim_start().starts_with(name))
            .unwrap_or(false)
            && t.contains('{')
    })?;

    let mut depth: i32 = 0;
    for (j, line) in lines.iter().enumerate().skip(open) {
        for c in strip_line_comment(line).chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        if depth == 0 && j > open {
            return Some(lines[open + 1..j].join("\n") + "\n");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_function_and_struct_names() {
        let src = "\
// helper module
export int add(int a, int b) {
    return a + b;
}

struct Point {
    int x;
    int y;
}
";
        let lines: Vec<&str> = src.lines().collect();
        let chunks = scan_decls(&lines);
        let names: Vec<_> = chunks.iter().filter_map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["add", "Point"]);
    }

    #[test]
    fn scan_attaches_attributes_to_decl() {
        let src = "#[target(js)]\nint only_js() { return 1; }\n";
        let lines: Vec<&str> = src.lines().collect();
        let chunks = scan_decls(&lines);
        let decl = chunks.iter().find(|c| c.name.is_some()).unwrap();
        assert_eq!(decl.start, 0);
        assert_eq!(decl.end, 2);
    }

    #[test]
    fn filter_keeps_only_requested_items() {
        let src = "\
export int add(int a, int b) { return a + b; }
export int sub(int a, int b) { return a - b; }
int helper() { return 0; }
";
        let out = filter_exports(src, &["add".to_string()]);
        assert!(out.contains("add"));
        assert!(!out.contains("sub"));
        assert!(out.contains("helper"));
    }

    #[test]
    fn export_list_reorders_definitions() {
        let src = "\
export { late };
int other() { return 1; }
int late() { return 2; }
";
        let out = process_export_syntax(src);
        let late_pos = out.find("int late").unwrap();
        let other_pos = out.find("int other").unwrap();
        assert!(late_pos < other_pos, "{out}");
        assert!(out.contains("// export { late }; (processed)"), "{out}");
    }

    #[test]
    fn namespace_export_block_rewritten() {
        let src = "export util {\n    int f() { return 1; }\n}\n";
        let out = process_namespace_exports(src);
        assert!(out.starts_with("namespace util {"), "{out}");
    }

    #[test]
    fn export_struct_is_not_a_namespace_block() {
        let src = "export struct P {\n    int x;\n}\n";
        let out = process_namespace_exports(src);
        assert!(out.contains("export struct P {"), "{out}");
    }

    #[test]
    fn hierarchical_reexport_regroups() {
        let src = "\
export { net::{http, tcp} };
namespace http {
    int get() { return 1; }
}
namespace tcp {
    int connect() { return 2; }
}
";
        let out = process_hierarchical_reexport(src);
        assert!(out.starts_with("namespace net {"), "{out}");
        let net_close = out.find("} // namespace net").unwrap();
        let http_pos = out.find("namespace http").unwrap();
        let tcp_pos = out.find("namespace tcp").unwrap();
        assert!(http_pos < net_close && tcp_pos < net_close, "{out}");
    }

    #[test]
    fn rewrite_comments_out_module_and_imports() {
        let src = "module math;\nimport ./other;\nint f() { return 1; }\n";
        let out = rewrite_module_text(src);
        assert!(out.contains("// module math; (removed)"));
        assert!(out.contains("// import ./other;"));
        assert!(out.contains("int f()"));
    }

    #[test]
    fn namespace_content_extraction() {
        let src = "namespace io {\nint read() { return 0; }\n}\nint outside() { return 1; }\n";
        let content = extract_namespace_content(src, "io").unwrap();
        assert_eq!(content, "int read() { return 0; }\n");
    }
}
