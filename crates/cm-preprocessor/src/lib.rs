//! Import preprocessing: the first pipeline stage.
//!
//! Takes a root source file and produces one unified source string with every
//! `import` recursively inlined, plus a line-accurate [`SourceMap`] for
//! diagnostic back-mapping. Modules are wrapped in `namespace` blocks (or
//! spliced bare, per import form), exports are rewritten, and duplicate or
//! circular imports are detected here, before the lexer ever runs.

mod export;
pub mod resolve;

use std::fmt;
use std::path::{Path, PathBuf};

use cm_common::debug::{Stage, Tracer};
use cm_common::source_map::{ModuleRange, SourceMap};
use rustc_hash::{FxHashMap, FxHashSet};

use export::{extract_namespace_content, filter_exports, rewrite_module_text};
use resolve::{extract_module_decl, find_all_modules_recursive, resolve_module_path};

/// A fatal preprocessing error. Any of these aborts the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PreprocessError {
    /// No candidate file found for an import specifier.
    ModuleNotFound {
        specifier: String,
        file: String,
        line: usize,
    },
    /// An import re-entered a module currently being inlined.
    CircularDependency {
        /// The import stack at the point of detection, root first.
        chain: Vec<String>,
        specifier: String,
        file: String,
        line: usize,
    },
    /// A module file could not be read.
    Io { path: String, message: String },
}

impl fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleNotFound {
                specifier,
                file,
                line,
            } => {
                write!(f, "{file}:{line}: module not found: {specifier}")
            }
            Self::CircularDependency {
                chain,
                specifier,
                file,
                line,
            } => {
                writeln!(f, "Circular dependency detected:")?;
                writeln!(f, "{file}:{line}: import of {specifier} closes a cycle")?;
                writeln!(f, "dependency chain:")?;
                for (i, entry) in chain.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, entry)?;
                }
                write!(f, "  {}. {} (circular reference)", chain.len() + 1, specifier)
            }
            Self::Io { path, message } => write!(f, "failed to read {path}: {message}"),
        }
    }
}

impl std::error::Error for PreprocessError {}

/// Everything the preprocessor hands to the rest of the pipeline.
#[derive(Debug)]
pub struct ProcessResult {
    pub processed_source: String,
    pub source_map: SourceMap,
    /// Canonical paths of every module that contributed text, in first-use
    /// order.
    pub imported_modules: Vec<String>,
    /// Unified-source line ranges of fully inlined modules.
    pub module_ranges: Vec<ModuleRange>,
}

/// Accumulates output lines and their source-map entries in lockstep.
///
/// Invariant: one map entry per emitted line, so the unified source's line
/// count always equals the source map's length.
struct Emitter {
    out: String,
    map: SourceMap,
}

impl Emitter {
    fn new() -> Self {
        Self {
            out: String::new(),
            map: SourceMap::new(),
        }
    }

    /// 1-based line number the next emitted line will get.
    fn next_line(&self) -> usize {
        self.map.len() + 1
    }

    fn line(&mut self, text: &str, file: &str, line: usize, chain: &str) {
        debug_assert!(!text.contains('\n'));
        self.out.push_str(text);
        self.out.push('\n');
        self.map.push(file, line, chain);
    }

    fn generated(&mut self, text: &str, chain: &str) {
        debug_assert!(!text.contains('\n'));
        self.out.push_str(text);
        self.out.push('\n');
        self.map.push_generated(chain);
    }

    /// Emit multi-line text, mapping line `i` of `src` to `(file, i)`.
    fn source(&mut self, src: &str, file: &str, chain: &str) {
        for (i, line) in src.lines().enumerate() {
            self.line(line, file, i + 1, chain);
        }
    }
}

/// A parsed import statement.
#[derive(Debug, Default)]
struct ImportInfo {
    module_name: String,
    alias: Option<String>,
    items: Vec<String>,
    is_wildcard: bool,
    is_recursive_wildcard: bool,
    is_from_import: bool,
    is_relative: bool,
}

/// The import preprocessor. One instance per compilation; its caches and
/// cycle stack persist across the whole recursive inlining walk.
pub struct ImportPreprocessor {
    search_paths: Vec<PathBuf>,
    tracer: Tracer,
    project_root: PathBuf,
    /// Per-module sets of symbols already spliced by selective imports.
    imported_symbols: FxHashMap<String, FxHashSet<String>>,
    /// Modules fully inlined once; a second full import emits a comment.
    imported_modules: FxHashSet<String>,
    /// Canonical paths currently being inlined, for cycle detection.
    import_stack: Vec<String>,
    /// Cache of recursively-preprocessed module text.
    module_cache: FxHashMap<String, String>,
    /// All modules that contributed text, in first-use order.
    contributed: Vec<String>,
    module_ranges: Vec<ModuleRange>,
}

impl ImportPreprocessor {
    pub fn new(search_paths: Vec<PathBuf>, tracer: Tracer) -> Self {
        Self {
            search_paths,
            tracer,
            project_root: PathBuf::from("."),
            imported_symbols: FxHashMap::default(),
            imported_modules: FxHashSet::default(),
            import_stack: Vec::new(),
            module_cache: FxHashMap::default(),
            contributed: Vec::new(),
            module_ranges: Vec::new(),
        }
    }

    /// Process a root source file into the unified source plus source map.
    pub fn process(
        &mut self,
        source: &str,
        source_file: &Path,
    ) -> Result<ProcessResult, PreprocessError> {
        self.project_root = resolve::find_project_root(source_file);

        // The root file goes on the stack so a direct self-import is a cycle.
        let root_canonical = source_file
            .canonicalize()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| source_file.to_string_lossy().into_owned());
        self.import_stack.push(root_canonical);

        let mut emitter = Emitter::new();
        let chain = display_path(source_file);
        let result = self.process_imports(source, source_file, &chain, &mut emitter);
        self.import_stack.pop();
        result?;

        self.tracer.log(
            Stage::Preprocess,
            cm_common::debug::Level::Debug,
            format!(
                "unified {} lines from {} modules",
                emitter.map.len(),
                self.contributed.len()
            ),
        );

        Ok(ProcessResult {
            processed_source: emitter.out,
            source_map: emitter.map,
            imported_modules: self.contributed.clone(),
            module_ranges: std::mem::take(&mut self.module_ranges),
        })
    }

    /// Scan one file's text, passing plain lines through and expanding
    /// import statements in place.
    fn process_imports(
        &mut self,
        source: &str,
        current_file: &Path,
        chain: &str,
        em: &mut Emitter,
    ) -> Result<(), PreprocessError> {
        let lines: Vec<&str> = source.lines().collect();
        let current_file_str = display_path(current_file);

        let mut idx = 0;
        while idx < lines.len() {
            let line = lines[idx];
            let line_number = idx + 1;
            let trimmed = line.trim_start();

            let is_import = trimmed.starts_with("import ")
                || trimmed.starts_with("from ")
                || trimmed == "import";
            if !is_import {
                em.line(line, &current_file_str, line_number, chain);
                idx += 1;
                continue;
            }

            // Join physical lines until brace depth returns to zero and a
            // terminating semicolon is seen (comments stripped first).
            let mut stmt = strip_comment(line).to_string();
            let mut brace_depth = count_braces(&stmt);
            let mut has_semicolon = stmt.contains(';');
            let import_line = line_number;
            while (!has_semicolon || brace_depth > 0) && idx + 1 < lines.len() {
                idx += 1;
                let part = strip_comment(lines[idx]);
                stmt.push(' ');
                stmt.push_str(part);
                brace_depth += count_braces(part);
                if part.contains(';') {
                    has_semicolon = true;
                }
            }
            idx += 1;

            let stmt = stmt.trim().trim_end_matches(';').trim_end().to_string();
            let info = parse_import_statement(&stmt);

            self.tracer.log(
                Stage::Preprocess,
                cm_common::debug::Level::Trace,
                format!("import: {} (from {current_file_str}:{import_line})", info.module_name),
            );

            if info.is_recursive_wildcard {
                self.expand_recursive_wildcard(
                    &info,
                    current_file,
                    &current_file_str,
                    import_line,
                    chain,
                    em,
                )?;
                continue;
            }

            self.expand_import(&info, current_file, &current_file_str, import_line, chain, em)?;
        }

        Ok(())
    }

    /// Expand one non-recursive import.
    fn expand_import(
        &mut self,
        info: &ImportInfo,
        current_file: &Path,
        current_file_str: &str,
        import_line: usize,
        chain: &str,
        em: &mut Emitter,
    ) -> Result<(), PreprocessError> {
        let Some(module_path) =
            resolve_module_path(&info.module_name, current_file, &self.search_paths)
        else {
            return Err(PreprocessError::ModuleNotFound {
                specifier: info.module_name.clone(),
                file: current_file_str.to_string(),
                line: import_line,
            });
        };
        let canonical = canonical_string(&module_path);

        // Cycle check comes before the re-import check so a true cycle is
        // always reported even for a module that was partially spliced.
        if self.import_stack.contains(&canonical) {
            return Err(PreprocessError::CircularDependency {
                chain: self.import_stack.clone(),
                specifier: display_path(&module_path),
                file: current_file_str.to_string(),
                line: import_line,
            });
        }

        let selective = !info.items.is_empty() && !info.is_wildcard;
        let new_items: Vec<String> = if selective {
            let seen = self.imported_symbols.entry(canonical.clone()).or_default();
            let fresh: Vec<String> = info
                .items
                .iter()
                .filter(|item| !seen.contains(*item))
                .cloned()
                .collect();
            for item in &fresh {
                seen.insert(item.clone());
            }
            if fresh.is_empty() {
                em.generated(
                    &format!("// All symbols already imported from: {}", info.module_name),
                    chain,
                );
                return Ok(());
            }
            fresh
        } else {
            if self.imported_modules.contains(&canonical) {
                em.generated(&format!("// Already imported: {}", info.module_name), chain);
                return Ok(());
            }
            self.imported_modules.insert(canonical.clone());
            Vec::new()
        };

        let module_source = self.load_and_expand(&module_path, &canonical, chain)?;
        let module_file_str = display_path(&module_path);
        let module_chain = format!("{chain} -> {module_file_str}");
        if !self.contributed.contains(&canonical) {
            self.contributed.push(canonical.clone());
        }

        // A `./path/module::sub` specifier asks for the `sub` namespace of
        // the resolved file rather than the whole module.
        let submodule_ns = submodule_of(&info.module_name);

        if let Some(alias) = &info.alias {
            em.generated("", chain);
            em.generated(
                &format!("// ===== Begin module: {} (as {}) =====", info.module_name, alias),
                chain,
            );
            em.generated(&format!("namespace {alias} {{"), chain);
            let start_line = em.next_line();
            em.source(&rewrite_module_text(&module_source), &module_file_str, &module_chain);
            self.record_range(&canonical, current_file_str, import_line, start_line, em);
            em.generated(&format!("}} // namespace {alias}"), chain);
            em.generated(&format!("// ===== End module: {} =====", info.module_name), chain);
            em.generated("", chain);
        } else if selective {
            em.generated("", chain);
            em.generated(
                &format!("// ===== Selective import from {} =====", info.module_name),
                chain,
            );
            let scoped = submodule_ns
                .as_deref()
                .and_then(|ns| extract_namespace_content(&module_source, ns))
                .unwrap_or_else(|| module_source.clone());
            let body = rewrite_module_text(&filter_exports(&scoped, &new_items));
            em.source(&body, &module_file_str, &module_chain);
            em.generated(
                &format!("// ===== End selective import from {} =====", info.module_name),
                chain,
            );
            em.generated("", chain);
        } else if info.is_wildcard {
            em.generated("", chain);
            em.generated(
                &format!("// ===== Wildcard import from {} =====", info.module_name),
                chain,
            );
            let scoped = submodule_ns
                .as_deref()
                .and_then(|ns| extract_namespace_content(&module_source, ns))
                .unwrap_or_else(|| module_source.clone());
            let start_line = em.next_line();
            em.source(&rewrite_module_text(&scoped), &module_file_str, &module_chain);
            self.record_range(&canonical, current_file_str, import_line, start_line, em);
            em.generated(
                &format!("// ===== End wildcard import from {} =====", info.module_name),
                chain,
            );
            em.generated("", chain);
        } else {
            // Plain import: wrap in the module's namespace.
            em.generated("", chain);
            em.generated(
                &format!("// ===== Begin module: {} =====", info.module_name),
                chain,
            );

            let namespace = match &submodule_ns {
                Some(ns) => ns.clone(),
                None => extract_module_decl(&module_source)
                    .unwrap_or_else(|| last_path_component(&info.module_name)),
            };
            let parts: Vec<&str> = if submodule_ns.is_some() {
                // The module source already carries its namespace structure.
                Vec::new()
            } else {
                namespace.split("::").filter(|p| !p.is_empty()).collect()
            };

            for part in &parts {
                em.generated(&format!("namespace {part} {{"), chain);
            }
            let start_line = em.next_line();
            em.source(&rewrite_module_text(&module_source), &module_file_str, &module_chain);
            self.record_range(&canonical, current_file_str, import_line, start_line, em);
            for part in parts.iter().rev() {
                em.generated(&format!("}} // namespace {part}"), chain);
            }
            em.generated(&format!("// ===== End module: {} =====", info.module_name), chain);
            em.generated("", chain);
        }

        Ok(())
    }

    /// Expand `import ./dir/*;`: inline every module file under the
    /// directory, each wrapped by its relative-path-derived namespace.
    fn expand_recursive_wildcard(
        &mut self,
        info: &ImportInfo,
        current_file: &Path,
        current_file_str: &str,
        import_line: usize,
        chain: &str,
        em: &mut Emitter,
    ) -> Result<(), PreprocessError> {
        let base_dir = if info.is_relative {
            current_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&info.module_name)
        } else {
            self.project_root.join(&info.module_name)
        };
        if !base_dir.is_dir() {
            return Err(PreprocessError::ModuleNotFound {
                specifier: info.module_name.clone(),
                file: current_file_str.to_string(),
                line: import_line,
            });
        }
        let base_dir = base_dir.canonicalize().unwrap_or(base_dir);

        for module_path in find_all_modules_recursive(&base_dir) {
            let canonical = canonical_string(&module_path);
            if self.imported_modules.contains(&canonical)
                || self.import_stack.contains(&canonical)
            {
                continue;
            }
            self.imported_modules.insert(canonical.clone());

            let module_file_str = display_path(&module_path);
            em.generated(&format!("// Recursive import: {module_file_str}"), chain);

            let module_source = self.load_and_expand(&module_path, &canonical, chain)?;
            if !self.contributed.contains(&canonical) {
                self.contributed.push(canonical.clone());
            }
            let module_chain = format!("{chain} -> {module_file_str}");

            // Namespace parts come from the directory structure below the
            // wildcard base.
            let ns_parts: Vec<String> = module_path
                .parent()
                .and_then(|p| p.strip_prefix(&base_dir).ok())
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();

            for part in &ns_parts {
                em.generated(&format!("namespace {part} {{"), chain);
            }
            let start_line = em.next_line();
            em.source(&rewrite_module_text(&module_source), &module_file_str, &module_chain);
            self.record_range(&canonical, current_file_str, import_line, start_line, em);
            for part in ns_parts.iter().rev() {
                em.generated(&format!("}} // namespace {part}"), chain);
            }
        }

        Ok(())
    }

    /// Read a module and recursively expand its own imports, going through
    /// the per-compilation cache.
    fn load_and_expand(
        &mut self,
        module_path: &Path,
        canonical: &str,
        chain: &str,
    ) -> Result<String, PreprocessError> {
        if let Some(cached) = self.module_cache.get(canonical) {
            return Ok(cached.clone());
        }

        let raw = std::fs::read_to_string(module_path).map_err(|e| PreprocessError::Io {
            path: display_path(module_path),
            message: e.to_string(),
        })?;

        let module_chain = format!("{chain} -> {}", display_path(module_path));
        self.import_stack.push(canonical.to_string());
        // Nested imports land in a scratch emitter; only the final filtered
        // text is mapped at the splice site.
        let mut scratch = Emitter::new();
        let result = self.process_imports(&raw, module_path, &module_chain, &mut scratch);
        self.import_stack.pop();
        result?;

        self.module_cache.insert(canonical.to_string(), scratch.out.clone());
        Ok(scratch.out)
    }

    fn record_range(
        &mut self,
        canonical: &str,
        import_from: &str,
        import_line: usize,
        start_line: usize,
        em: &Emitter,
    ) {
        self.module_ranges.push(ModuleRange {
            file_path: canonical.to_string(),
            import_from: import_from.to_string(),
            import_line,
            start_line,
            end_line: em.map.len(),
        });
    }
}

// ── Import statement parsing ───────────────────────────────────────────

/// Parse a joined, semicolon-stripped import statement.
fn parse_import_statement(stmt: &str) -> ImportInfo {
    let mut info = ImportInfo {
        is_relative: stmt.contains("./") || stmt.contains("../"),
        ..ImportInfo::default()
    };

    let stmt = stmt.trim();

    // `from M import { a, b }`
    if let Some(rest) = stmt.strip_prefix("from ") {
        if let Some(import_pos) = rest.find(" import") {
            info.module_name = rest[..import_pos].trim().to_string();
            info.is_from_import = true;
            let after = rest[import_pos + " import".len()..].trim();
            if let Some(list) = between_braces(after) {
                parse_items(list, &mut info);
            } else if after == "*" {
                info.is_wildcard = true;
            }
            strip_quotes(&mut info.module_name);
            return info;
        }
    }

    let Some(rest) = stmt.strip_prefix("import ") else {
        return info;
    };
    let rest = rest.trim();

    // `import { a, b } from M`
    if rest.starts_with('{') {
        if let Some(close) = rest.find('}') {
            if let Some(module) = rest[close + 1..].trim().strip_prefix("from ") {
                info.module_name = module.trim().to_string();
                info.is_from_import = true;
                parse_items(&rest[1..close], &mut info);
                strip_quotes(&mut info.module_name);
                return info;
            }
        }
    }

    // `import * from M`
    if let Some(module) = rest.strip_prefix("* from ") {
        info.module_name = module.trim().to_string();
        info.is_wildcard = true;
        info.is_from_import = true;
        strip_quotes(&mut info.module_name);
        return info;
    }

    // `import M as A`
    if let Some(as_pos) = rest.find(" as ") {
        if !rest[..as_pos].contains('{') {
            info.module_name = rest[..as_pos].trim().to_string();
            info.alias = Some(rest[as_pos + 4..].trim().to_string());
            strip_quotes(&mut info.module_name);
            return info;
        }
    }

    // `import ./dir/*` (recursive wildcard over a directory tree)
    if let Some(prefix) = rest.strip_suffix("/*") {
        info.module_name = prefix.trim().to_string();
        info.is_wildcard = true;
        info.is_recursive_wildcard = true;
        strip_quotes(&mut info.module_name);
        return info;
    }

    // `import M::*`
    if let Some(prefix) = rest.strip_suffix("::*") {
        info.module_name = prefix.trim().to_string();
        info.is_wildcard = true;
        strip_quotes(&mut info.module_name);
        return info;
    }

    // `import M::{a, b}`
    if let Some(brace) = rest.find("::{") {
        if let Some(list) = between_braces(&rest[brace + 2..]) {
            info.module_name = rest[..brace].trim().to_string();
            parse_items(list, &mut info);
            strip_quotes(&mut info.module_name);
            return info;
        }
    }

    // `import M` (simple)
    info.module_name = rest.to_string();
    strip_quotes(&mut info.module_name);

    // A lower-case final `::segment` is a function/variable import and
    // drops out of the path. A relative path with a single `::` keeps its
    // segment as a submodule namespace instead.
    if let Some(last_colon) = info.module_name.rfind("::") {
        let last_part = info.module_name[last_colon + 2..].to_string();
        if last_part
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
        {
            let first_colon = info.module_name.find("::").unwrap_or(last_colon);
            if !info.is_relative || first_colon != last_colon {
                info.items.push(last_part);
                info.module_name.truncate(last_colon);
            }
        }
    }

    info
}

/// Parse an item list `a, b as c`: aliases keep the original name for
/// filtering; the alias itself is resolved by the parser's `use` handling.
fn parse_items(list: &str, info: &mut ImportInfo) {
    for item in list.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.find(" as ") {
            Some(pos) => info.items.push(item[..pos].trim().to_string()),
            None => info.items.push(item.to_string()),
        }
    }
}

fn between_braces(text: &str) -> Option<&str> {
    let open = text.find('{')?;
    let close = text[open..].find('}')? + open;
    Some(&text[open + 1..close])
}

fn strip_quotes(name: &mut String) {
    if name.len() >= 2
        && ((name.starts_with('"') && name.ends_with('"'))
            || (name.starts_with('\'') && name.ends_with('\'')))
    {
        *name = name[1..name.len() - 1].to_string();
    }
}

/// The `sub` of `./path/module::sub`, when the specifier has both a slash
/// path and a `::` suffix.
fn submodule_of(specifier: &str) -> Option<String> {
    let slash = specifier.rfind('/')?;
    let colon = specifier[slash..].find("::")? + slash;
    Some(specifier[colon + 2..].to_string())
}

fn last_path_component(specifier: &str) -> String {
    let mut name = specifier;
    if let Some(stripped) = name.strip_prefix("./") {
        name = stripped;
    } else if let Some(stripped) = name.strip_prefix("../") {
        name = stripped;
    }
    let name = name.rsplit('/').next().unwrap_or(name);
    let name = name.rsplit("::").next().unwrap_or(name);
    name.to_string()
}

fn strip_comment(line: &str) -> &str {
    match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn count_braces(text: &str) -> i32 {
    let mut count = 0;
    for c in text.chars() {
        match c {
            '{' => count += 1,
            '}' => count -= 1,
            _ => {}
        }
    }
    count
}

fn canonical_string(path: &Path) -> String {
    path.canonicalize()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

fn display_path(path: &Path) -> String {
    if let Ok(cwd) = std::env::current_dir() {
        if let Ok(rel) = path.canonicalize().unwrap_or_else(|_| path.to_path_buf()).strip_prefix(&cwd) {
            return rel.to_string_lossy().into_owned();
        }
    }
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_common::debug::Tracer;
    use std::fs;
    use tempfile::TempDir;

    fn preprocess(dir: &TempDir, root: &str) -> Result<ProcessResult, PreprocessError> {
        let root_path = dir.path().join(root);
        let source = fs::read_to_string(&root_path).unwrap();
        let mut pp = ImportPreprocessor::new(vec![dir.path().to_path_buf()], Tracer::disabled());
        pp.process(&source, &root_path)
    }

    #[test]
    fn passthrough_without_imports() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "int main() {\n    return 0;\n}\n").unwrap();
        let result = preprocess(&dir, "main.cm").unwrap();
        assert_eq!(result.processed_source, "int main() {\n    return 0;\n}\n");
        assert_eq!(result.source_map.len(), 3);
    }

    #[test]
    fn line_count_matches_source_map() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cm"),
            "import ./util;\nint main() { return util::f(); }\n",
        )
        .unwrap();
        fs::write(dir.path().join("util.cm"), "export int f() { return 3; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert_eq!(
            result.processed_source.lines().count(),
            result.source_map.len()
        );
    }

    #[test]
    fn plain_import_wraps_in_namespace() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./util;\n").unwrap();
        fs::write(dir.path().join("util.cm"), "export int f() { return 3; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("namespace util {"));
        assert!(result.processed_source.contains("} // namespace util"));
        assert!(result.processed_source.contains("export int f()"));
        assert_eq!(result.imported_modules.len(), 1);
        assert_eq!(result.module_ranges.len(), 1);
    }

    #[test]
    fn module_decl_overrides_namespace_name() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./impl_file;\n").unwrap();
        fs::write(
            dir.path().join("impl_file.cm"),
            "module mathlib;\nexport int f() { return 3; }\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("namespace mathlib {"));
        assert!(result.processed_source.contains("// module mathlib; (removed)"));
    }

    #[test]
    fn aliased_import_uses_alias_namespace() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./util as u;\n").unwrap();
        fs::write(dir.path().join("util.cm"), "export int f() { return 3; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("namespace u {"));
    }

    #[test]
    fn selective_import_splices_only_named_items() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./util::{add};\n").unwrap();
        fs::write(
            dir.path().join("util.cm"),
            "export int add(int a, int b) { return a + b; }\nexport int sub(int a, int b) { return a - b; }\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("add"));
        assert!(!result.processed_source.contains("int sub"));
        // Selective imports are spliced bare.
        assert!(!result.processed_source.contains("namespace util"));
    }

    #[test]
    fn selective_reimport_only_splices_new_symbols() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cm"),
            "import ./util::{add};\nimport ./util::{add, sub};\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("util.cm"),
            "export int add(int a, int b) { return a + b; }\nexport int sub(int a, int b) { return a - b; }\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        let add_count = result.processed_source.matches("int add").count();
        assert_eq!(add_count, 1, "{}", result.processed_source);
        assert!(result.processed_source.contains("int sub"));
    }

    #[test]
    fn duplicate_full_import_emits_comment() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./util;\nimport ./util;\n").unwrap();
        fs::write(dir.path().join("util.cm"), "export int f() { return 3; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert_eq!(result.processed_source.matches("namespace util {").count(), 1);
        assert!(result.processed_source.contains("// Already imported: ./util"));
    }

    #[test]
    fn lowercase_tail_becomes_selective_import() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("std")).unwrap();
        fs::write(dir.path().join("main.cm"), "import std::io::println;\n").unwrap();
        fs::write(
            dir.path().join("std/io.cm"),
            "export void println(string s);\nexport void eprint(string s);\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("println"));
        assert!(!result.processed_source.contains("eprint"));
    }

    #[test]
    fn circular_import_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.cm"), "import ./b;\nint main() { return 0; }\n").unwrap();
        fs::write(dir.path().join("b.cm"), "import ./a;\n").unwrap();

        let err = preprocess(&dir, "a.cm").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Circular dependency"), "{message}");
        assert!(message.contains("a.cm"), "{message}");
        assert!(message.contains("b.cm"), "{message}");
    }

    #[test]
    fn self_import_is_circular() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("this.cm"), "import ./this;\n").unwrap();

        let err = preprocess(&dir, "this.cm").unwrap_err();
        assert!(matches!(err, PreprocessError::CircularDependency { .. }));
    }

    #[test]
    fn missing_module_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./nothing;\n").unwrap();

        let err = preprocess(&dir, "main.cm").unwrap_err();
        assert!(matches!(err, PreprocessError::ModuleNotFound { .. }));
        assert!(err.to_string().contains("./nothing"));
    }

    #[test]
    fn nested_imports_expand_transitively() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./a;\n").unwrap();
        fs::write(dir.path().join("a.cm"), "import ./b;\nexport int fa() { return 1; }\n").unwrap();
        fs::write(dir.path().join("b.cm"), "export int fb() { return 2; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("fa"));
        assert!(result.processed_source.contains("fb"));
        assert_eq!(result.imported_modules.len(), 2);
        assert_eq!(
            result.processed_source.lines().count(),
            result.source_map.len()
        );
    }

    #[test]
    fn multi_line_import_statement_is_joined() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("main.cm"),
            "import ./util::{\n    add,\n    sub\n};\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("util.cm"),
            "export int add(int a, int b) { return a + b; }\nexport int sub(int a, int b) { return a - b; }\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("int add"));
        assert!(result.processed_source.contains("int sub"));
    }

    #[test]
    fn recursive_wildcard_imports_directory_tree() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("mods/sub")).unwrap();
        fs::write(dir.path().join("main.cm"), "import ./mods/*;\n").unwrap();
        fs::write(
            dir.path().join("mods/m1.cm"),
            "module m1;\nexport int one() { return 1; }\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("mods/sub/m2.cm"),
            "module m2;\nexport int two() { return 2; }\n",
        )
        .unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        assert!(result.processed_source.contains("int one"));
        assert!(result.processed_source.contains("int two"));
        assert!(result.processed_source.contains("namespace sub {"));
        assert_eq!(
            result.processed_source.lines().count(),
            result.source_map.len()
        );
    }

    #[test]
    fn source_map_points_into_imported_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.cm"), "import ./util;\n").unwrap();
        fs::write(dir.path().join("util.cm"), "export int f() { return 3; }\n").unwrap();

        let result = preprocess(&dir, "main.cm").unwrap();
        let body_line = result
            .processed_source
            .lines()
            .position(|l| l.contains("export int f()"))
            .unwrap()
            + 1;
        let entry = result.source_map.lookup(body_line).unwrap();
        assert!(entry.original_file.ends_with("util.cm"));
        assert_eq!(entry.original_line, 1);
        assert!(entry.import_chain.contains(" -> "));
    }
}
