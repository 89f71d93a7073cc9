//! Module path resolution.
//!
//! Turns an import specifier into the canonical path of a `.cm` file. For
//! each candidate directory the probe order is: `PATH.cm`, then `PATH/` as a
//! directory whose entry point is a file starting with `module NAME;`, then
//! `PATH/mod.cm`. The canonical path is the module's identity for caching,
//! de-duplication and cycle detection.

use std::path::{Path, PathBuf};

/// Find the project root for a source file.
///
/// Walks up from the file's directory looking for `cm.toml` or `.git`;
/// falls back to `CM_PROJECT_ROOT`, then the current directory.
pub fn find_project_root(source_file: &Path) -> PathBuf {
    let mut dir = source_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if let Ok(abs) = dir.canonicalize() {
        dir = abs;
    }

    let mut cursor = dir.clone();
    loop {
        if cursor.join("cm.toml").exists() || cursor.join(".git").exists() {
            return cursor;
        }
        match cursor.parent() {
            Some(parent) => cursor = parent.to_path_buf(),
            None => break,
        }
    }

    if let Ok(env_root) = std::env::var("CM_PROJECT_ROOT") {
        let path = PathBuf::from(env_root);
        if path.exists() {
            return path.canonicalize().unwrap_or(path);
        }
    }

    std::env::current_dir().unwrap_or(dir)
}

/// Build the standard search-path list for a compilation.
///
/// Order: project root, current directory, each `CM_MODULE_PATH` entry
/// (platform path-list delimiter), then the standard-library location
/// (`CM_STD_PATH` override or the platform defaults).
pub fn standard_search_paths(source_file: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(find_project_root(source_file));
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    if let Ok(module_path) = std::env::var("CM_MODULE_PATH") {
        for entry in std::env::split_paths(&module_path) {
            if !entry.as_os_str().is_empty() {
                paths.push(entry);
            }
        }
    }

    if let Ok(std_path) = std::env::var("CM_STD_PATH") {
        paths.push(PathBuf::from(std_path));
    } else {
        paths.push(PathBuf::from("/usr/local/lib/cm"));
        paths.push(PathBuf::from("/usr/lib/cm"));
    }

    paths
}

/// Resolve a module specifier to a canonical file path.
///
/// Relative specifiers (`./`, `../`) resolve against the importing file's
/// directory only. Other specifiers convert `::` to `/` and probe the
/// importing file's directory first, then every search path.
pub fn resolve_module_path(
    specifier: &str,
    current_file: &Path,
    search_paths: &[PathBuf],
) -> Option<PathBuf> {
    if specifier.starts_with("./") || specifier.starts_with("../") {
        // `./path/module::sub` keeps only the filesystem part.
        let path_part = specifier.split("::").next().unwrap_or(specifier);
        let base = current_file.parent().unwrap_or_else(|| Path::new("."));
        return probe(&base.join(path_part));
    }

    let rel = specifier.replace("::", "/");
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(parent) = current_file.parent() {
        candidates.push(parent.to_path_buf());
    }
    candidates.extend(search_paths.iter().cloned());

    for dir in candidates {
        if let Some(found) = probe(&dir.join(&rel)) {
            return Some(found);
        }
    }
    None
}

/// Probe one candidate path: `p.cm`, then `p/` with an entry-point file,
/// then `p/mod.cm`. Returns a canonical path.
fn probe(candidate: &Path) -> Option<PathBuf> {
    let with_ext = candidate.with_extension("cm");
    if with_ext.is_file() {
        return with_ext.canonicalize().ok();
    }
    if candidate.is_dir() {
        if let Some(entry) = find_module_entry_point(candidate) {
            return entry.canonicalize().ok();
        }
        let mod_file = candidate.join("mod.cm");
        if mod_file.is_file() {
            return mod_file.canonicalize().ok();
        }
    }
    None
}

/// Find a directory's entry point: the first `.cm` file (sorted by name)
/// whose first non-comment line is a `module NAME;` declaration.
pub fn find_module_entry_point(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "cm"))
        .collect();
    files.sort();

    files.into_iter().find(|path| {
        std::fs::read_to_string(path)
            .ok()
            .is_some_and(|src| first_line_is_module_decl(&src))
    })
}

/// Whether the first non-comment, non-blank line is `module NAME;`.
pub fn first_line_is_module_decl(source: &str) -> bool {
    extract_module_decl(source).is_some()
}

/// Extract the declared module name from a `module NAME;` first line, if any.
pub fn extract_module_decl(source: &str) -> Option<String> {
    for line in source.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        let rest = trimmed.strip_prefix("module")?;
        let rest = rest.strip_suffix(';')?.trim();
        if !rest.is_empty()
            && rest
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.')
        {
            return Some(rest.to_string());
        }
        return None;
    }
    None
}

/// Collect every `.cm` file under `dir` (recursively, sorted) that begins
/// with a `module NAME;` declaration. Used by recursive wildcard imports.
pub fn find_all_modules_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_modules(dir, &mut found);
    found.sort();
    found
}

fn collect_modules(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_modules(&path, out);
        } else if path.extension().is_some_and(|ext| ext == "cm") {
            if let Ok(src) = std::fs::read_to_string(&path) {
                if first_line_is_module_decl(&src) {
                    out.push(path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn module_decl_extraction() {
        assert_eq!(extract_module_decl("module math;\n"), Some("math".into()));
        assert_eq!(
            extract_module_decl("// comment\n\nmodule net.http;\n"),
            Some("net.http".into())
        );
        assert_eq!(extract_module_decl("int main() {}\n"), None);
        assert_eq!(extract_module_decl("module ;\n"), None);
    }

    #[test]
    fn probe_prefers_file_over_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("util.cm"), "int helper() { return 1; }\n").unwrap();
        fs::create_dir(dir.path().join("util")).unwrap();
        fs::write(dir.path().join("util/mod.cm"), "module util;\n").unwrap();

        let current = dir.path().join("main.cm");
        let resolved = resolve_module_path("./util", &current, &[]).unwrap();
        assert!(resolved.ends_with("util.cm"));
    }

    #[test]
    fn directory_entry_point_via_module_decl() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("net")).unwrap();
        fs::write(dir.path().join("net/aux.cm"), "int x() { return 0; }\n").unwrap();
        fs::write(dir.path().join("net/core.cm"), "module net;\nint y() { return 0; }\n").unwrap();

        let current = dir.path().join("main.cm");
        let resolved = resolve_module_path("./net", &current, &[]).unwrap();
        assert!(resolved.ends_with("core.cm"), "{resolved:?}");
    }

    #[test]
    fn directory_falls_back_to_mod_cm() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/mod.cm"), "int z() { return 0; }\n").unwrap();

        let current = dir.path().join("main.cm");
        let resolved = resolve_module_path("./pkg", &current, &[]).unwrap();
        assert!(resolved.ends_with("mod.cm"));
    }

    #[test]
    fn double_colon_resolves_through_search_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("std/io")).unwrap();
        fs::write(dir.path().join("std/io.cm"), "export void println(string s);\n").unwrap();

        let current = PathBuf::from("/nonexistent/main.cm");
        let resolved =
            resolve_module_path("std::io", &current, &[dir.path().to_path_buf()]).unwrap();
        assert!(resolved.ends_with("io.cm"));
    }

    #[test]
    fn missing_module_is_none() {
        let current = PathBuf::from("/nonexistent/main.cm");
        assert!(resolve_module_path("no::such::module", &current, &[]).is_none());
    }

    #[test]
    fn recursive_module_listing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/m1.cm"), "module m1;\n").unwrap();
        fs::write(dir.path().join("a/plain.cm"), "int f() { return 0; }\n").unwrap();
        fs::write(dir.path().join("a/b/m2.cm"), "module m2;\n").unwrap();

        let modules = find_all_modules_recursive(dir.path());
        let names: Vec<_> = modules
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["m2.cm", "m1.cm"]);
    }
}
