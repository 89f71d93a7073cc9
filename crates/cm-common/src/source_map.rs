use serde::Serialize;

/// Where a line of the unified source came from.
///
/// The preprocessor records one entry per output line. Compiler-generated
/// lines (namespace wrappers, import markers) use [`GENERATED`] as the file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMapEntry {
    /// Path of the original file, or [`GENERATED`].
    pub original_file: String,
    /// 1-based line number in the original file (0 for generated lines).
    pub original_line: usize,
    /// The chain of imports that pulled this line in, " -> "-separated.
    pub import_chain: String,
}

/// File name used for lines the preprocessor synthesizes itself.
pub const GENERATED: &str = "<generated>";

/// Line-indexed table mapping unified-source lines back to original files.
///
/// Invariant: after preprocessing, `map.len() == number of lines in the
/// unified source`. Entry `i` describes line `i + 1` (lines are 1-based).
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the origin of the next output line.
    pub fn push(&mut self, original_file: impl Into<String>, original_line: usize, import_chain: impl Into<String>) {
        self.entries.push(SourceMapEntry {
            original_file: original_file.into(),
            original_line,
            import_chain: import_chain.into(),
        });
    }

    /// Record a compiler-generated line.
    pub fn push_generated(&mut self, import_chain: impl Into<String>) {
        self.push(GENERATED, 0, import_chain);
    }

    /// Look up the origin of a 1-based unified-source line.
    pub fn lookup(&self, line: usize) -> Option<&SourceMapEntry> {
        if line == 0 {
            return None;
        }
        self.entries.get(line - 1)
    }

    /// Number of mapped lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All distinct original files referenced by the map, excluding
    /// generated lines. Used to load original sources for diagnostics.
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if entry.original_file != GENERATED
                && !entry.original_file.is_empty()
                && !files.contains(&entry.original_file.as_str())
            {
                files.push(&entry.original_file);
            }
        }
        files
    }
}

/// Range of the unified source occupied by one inlined module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleRange {
    /// Canonical path of the module file.
    pub file_path: String,
    /// The file whose import statement pulled this module in.
    pub import_from: String,
    /// Line number of the import statement in the importing file.
    pub import_line: usize,
    /// First unified-source line of the module body (1-based).
    pub start_line: usize,
    /// Last unified-source line of the module body (1-based, inclusive).
    pub end_line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_one_based() {
        let mut map = SourceMap::new();
        map.push("a.cm", 1, "a.cm");
        map.push("b.cm", 7, "a.cm -> b.cm");

        assert!(map.lookup(0).is_none());
        assert_eq!(map.lookup(1).unwrap().original_file, "a.cm");
        assert_eq!(map.lookup(2).unwrap().original_line, 7);
        assert!(map.lookup(3).is_none());
    }

    #[test]
    fn generated_lines_use_marker() {
        let mut map = SourceMap::new();
        map.push_generated("a.cm");
        let entry = map.lookup(1).unwrap();
        assert_eq!(entry.original_file, GENERATED);
        assert_eq!(entry.original_line, 0);
    }

    #[test]
    fn referenced_files_skips_generated_and_dedups() {
        let mut map = SourceMap::new();
        map.push("a.cm", 1, "a.cm");
        map.push_generated("a.cm");
        map.push("b.cm", 1, "a.cm -> b.cm");
        map.push("a.cm", 2, "a.cm");

        assert_eq!(map.referenced_files(), vec!["a.cm", "b.cm"]);
    }
}
