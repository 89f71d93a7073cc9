//! Target filtering over the AST.
//!
//! Removes declarations whose `#[target(...)]` attributes do not match the
//! active build target. Arguments of one attribute are OR'd; multiple
//! `target` attributes on one declaration are AND'd. Runs before HIR
//! lowering so excluded code never reaches name resolution.

use cm_common::Target;

use crate::ast::{Decl, DeclKind, Program};

/// Prune declarations that do not apply to `target`, recursing into
/// namespaces.
pub fn filter_program(program: &mut Program, target: Target) {
    filter_decls(&mut program.declarations, target);
}

fn filter_decls(decls: &mut Vec<Decl>, target: Target) {
    decls.retain(|decl| should_keep(decl, target));
    for decl in decls {
        if let DeclKind::Namespace(ns) = &mut decl.kind {
            filter_decls(&mut ns.declarations, target);
        }
    }
}

fn should_keep(decl: &Decl, target: Target) -> bool {
    // Every `target` attribute must pass (AND); within one attribute any
    // matching atom passes (OR).
    decl.attributes
        .iter()
        .filter(|attr| attr.name == "target")
        .all(|attr| attr.args.iter().any(|atom| target.matches_atom(atom)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn names(program: &Program) -> Vec<&str> {
        program
            .declarations
            .iter()
            .filter_map(|d| d.name())
            .collect()
    }

    #[test]
    fn unattributed_decls_survive_every_target() {
        let (mut program, diags) = parse_source("int f() { return 1; }", "t.cm");
        assert!(diags.is_empty(), "{diags:?}");
        filter_program(&mut program, Target::Native);
        assert_eq!(names(&program), vec!["f"]);
    }

    #[test]
    fn mismatched_target_is_pruned() {
        let src = "#[target(js)]\nint only_js() { return 1; }\nint both() { return 2; }\n";
        let (mut program, diags) = parse_source(src, "t.cm");
        assert!(diags.is_empty(), "{diags:?}");

        let mut native = program.clone();
        filter_program(&mut native, Target::Native);
        assert_eq!(names(&native), vec!["both"]);

        filter_program(&mut program, Target::Js);
        assert_eq!(names(&program), vec!["only_js", "both"]);
    }

    #[test]
    fn js_atom_covers_web() {
        let src = "#[target(js)]\nint f() { return 1; }\n";
        let (mut program, _) = parse_source(src, "t.cm");
        filter_program(&mut program, Target::Web);
        assert_eq!(names(&program), vec!["f"]);
    }

    #[test]
    fn or_within_one_attribute() {
        let src = "#[target(js, native)]\nint f() { return 1; }\n";
        let (mut program, _) = parse_source(src, "t.cm");
        filter_program(&mut program, Target::Native);
        assert_eq!(names(&program), vec!["f"]);
    }

    #[test]
    fn and_across_attributes() {
        // `active` matches everything, `!native` excludes Native: the AND
        // leaves the decl only on non-native targets.
        let src = "#[target(active)]\n#[target(!native)]\nint f() { return 1; }\n";
        let (mut program, _) = parse_source(src, "t.cm");

        let mut js = program.clone();
        filter_program(&mut js, Target::Js);
        assert_eq!(names(&js), vec!["f"]);

        filter_program(&mut program, Target::Native);
        assert!(names(&program).is_empty());
    }

    #[test]
    fn namespaces_are_filtered_recursively() {
        let src = "namespace ns {\n#[target(wasm)]\nint w() { return 1; }\nint n() { return 2; }\n}\n";
        let (mut program, diags) = parse_source(src, "t.cm");
        assert!(diags.is_empty(), "{diags:?}");
        filter_program(&mut program, Target::Native);
        let DeclKind::Namespace(ns) = &program.declarations[0].kind else {
            panic!("expected namespace");
        };
        let inner: Vec<_> = ns.declarations.iter().filter_map(|d| d.name()).collect();
        assert_eq!(inner, vec!["n"]);
    }
}
