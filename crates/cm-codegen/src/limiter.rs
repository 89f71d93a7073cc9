//! Recursion and inlining limits.
//!
//! Builds the call graph, finds cycles with a path-set DFS, and marks every
//! function on a cycle `no_inline` + `no_optimize`. Size thresholds then
//! mark large functions non-inlinable (over 50 instructions at O3, over 100
//! at O2), and closure/iterator-named functions with many call sites are
//! capped too. The marks are hints carried on [`cm_mir::MirFunction`]; the
//! in-tree backends honor `no_inline` by never inlining.

use rustc_hash::{FxHashMap, FxHashSet};

use cm_mir::{InstKind, MirProgram, Operand};

/// Inline threshold by optimization level.
fn inline_threshold(opt_level: u8) -> Option<usize> {
    match opt_level {
        3.. => Some(50),
        2 => Some(100),
        _ => None,
    }
}

/// Call-site count above which closure-like functions stop inlining.
const CLOSURE_CALL_LIMIT: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct LimiterResult {
    pub recursive_functions: Vec<String>,
    pub no_inline_count: usize,
}

/// Apply recursion and size limits, mutating the functions' hint flags.
pub fn apply(program: &mut MirProgram, opt_level: u8) -> LimiterResult {
    let graph = build_call_graph(program);
    let mut result = LimiterResult::default();

    // Cycle detection over every root.
    let mut in_cycle: FxHashSet<String> = FxHashSet::default();
    for name in graph.keys() {
        if has_recursion(&graph, name) {
            in_cycle.insert(name.clone());
        }
    }

    for func in &mut program.functions {
        if in_cycle.contains(&func.name) {
            func.no_inline = true;
            func.no_optimize = true;
            result.recursive_functions.push(func.name.clone());
        }

        // Size-based threshold.
        if let Some(threshold) = inline_threshold(opt_level) {
            if func.instruction_count() > threshold {
                func.no_inline = true;
            }
        }

        // Closure/iterator-shaped functions with many call sites.
        let name = func.name.as_str();
        let closure_like = name.contains("closure")
            || name.contains("iter")
            || name.contains("lambda")
            || name.contains("$_");
        if closure_like {
            let call_count = func
                .blocks
                .iter()
                .flat_map(|b| &b.instructions)
                .filter(|i| {
                    matches!(
                        i.kind,
                        InstKind::Call { .. }
                            | InstKind::CallIndirect { .. }
                            | InstKind::CallVirtual { .. }
                    )
                })
                .count();
            if call_count > CLOSURE_CALL_LIMIT {
                func.no_inline = true;
            }
        }
    }

    result.no_inline_count = program.functions.iter().filter(|f| f.no_inline).count();
    result.recursive_functions.sort();
    result
}

/// The call graph as name -> callee-name set (never a pointer graph).
fn build_call_graph(program: &MirProgram) -> FxHashMap<String, FxHashSet<String>> {
    let mut graph: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
    for func in &program.functions {
        let edges = graph.entry(func.name.clone()).or_default();
        for block in &func.blocks {
            for inst in &block.instructions {
                match &inst.kind {
                    InstKind::Call { func: callee, .. } => {
                        edges.insert(callee.clone());
                    }
                    InstKind::CallVirtual { interface, .. } => {
                        for vt in &program.vtables {
                            if &vt.interface == interface {
                                edges.extend(vt.slots.iter().cloned());
                            }
                        }
                    }
                    _ => {}
                }
                for op in inst.kind.operands() {
                    if let Operand::FuncRef(target) = op {
                        edges.insert(target.clone());
                    }
                }
            }
        }
    }
    graph
}

/// Whether `start` can reach itself: DFS with a path set.
fn has_recursion(graph: &FxHashMap<String, FxHashSet<String>>, start: &str) -> bool {
    let mut visited = FxHashSet::default();
    let mut path = FxHashSet::default();
    detect_cycle(graph, start, start, &mut visited, &mut path)
}

fn detect_cycle(
    graph: &FxHashMap<String, FxHashSet<String>>,
    node: &str,
    target: &str,
    visited: &mut FxHashSet<String>,
    path: &mut FxHashSet<String>,
) -> bool {
    visited.insert(node.to_string());
    path.insert(node.to_string());

    if let Some(callees) = graph.get(node) {
        for callee in callees {
            if callee == target {
                return true;
            }
            if path.contains(callee) {
                continue;
            }
            if !visited.contains(callee) && detect_cycle(graph, callee, target, visited, path) {
                return true;
            }
        }
    }

    path.remove(node);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_common::Span;
    use cm_mir::{BasicBlock, BlockId, Instruction, MirFunction, MirType, Terminator};

    fn call(to: &str) -> Instruction {
        Instruction::new(
            InstKind::Call {
                dst: None,
                func: to.into(),
                args: vec![],
            },
            Span::dummy(),
        )
    }

    fn fn_calling(name: &str, callees: &[&str]) -> MirFunction {
        MirFunction {
            name: name.into(),
            params: vec![],
            return_type: MirType::Void,
            locals: vec![],
            blocks: vec![BasicBlock {
                id: BlockId(0),
                instructions: callees.iter().map(|c| call(c)).collect(),
                terminator: Terminator::Return(None),
            }],
            is_export: false,
            no_inline: false,
            no_optimize: false,
            span: Span::dummy(),
        }
    }

    #[test]
    fn direct_recursion_is_marked() {
        let mut p = MirProgram {
            functions: vec![fn_calling("fact", &["fact"]), fn_calling("main", &["fact"])],
            ..MirProgram::default()
        };
        let result = apply(&mut p, 2);
        assert_eq!(result.recursive_functions, vec!["fact"]);
        let fact = p.function("fact").unwrap();
        assert!(fact.no_inline);
        assert!(fact.no_optimize);
        assert!(!p.function("main").unwrap().no_inline);
    }

    #[test]
    fn mutual_recursion_marks_both() {
        let mut p = MirProgram {
            functions: vec![
                fn_calling("ping", &["pong"]),
                fn_calling("pong", &["ping"]),
                fn_calling("main", &["ping"]),
            ],
            ..MirProgram::default()
        };
        let result = apply(&mut p, 2);
        assert_eq!(result.recursive_functions, vec!["ping", "pong"]);
    }

    #[test]
    fn size_threshold_depends_on_level() {
        let make = || {
            let mut f = fn_calling("big", &[]);
            f.blocks[0].instructions = (0..60).map(|_| call("x")).collect();
            MirProgram {
                functions: vec![f],
                ..MirProgram::default()
            }
        };

        // 60 instructions: above the O3 threshold (50)...
        let mut p = make();
        apply(&mut p, 3);
        assert!(p.function("big").unwrap().no_inline);

        // ...but below the O2 threshold (100).
        let mut p = make();
        apply(&mut p, 2);
        assert!(!p.function("big").unwrap().no_inline);

        // O1 has no size threshold.
        let mut p = make();
        apply(&mut p, 1);
        assert!(!p.function("big").unwrap().no_inline);
    }

    #[test]
    fn chatty_closure_is_capped() {
        let mut f = fn_calling("worker_closure", &["a", "b", "c", "d", "e", "f"]);
        f.blocks[0].instructions.truncate(6);
        let mut p = MirProgram {
            functions: vec![f],
            ..MirProgram::default()
        };
        apply(&mut p, 1);
        assert!(p.function("worker_closure").unwrap().no_inline);
    }

    #[test]
    fn plain_function_with_many_calls_is_fine() {
        let f = fn_calling("orchestrate", &["a", "b", "c", "d", "e", "f"]);
        let mut p = MirProgram {
            functions: vec![f],
            ..MirProgram::default()
        };
        apply(&mut p, 1);
        assert!(!p.function("orchestrate").unwrap().no_inline);
    }
}
