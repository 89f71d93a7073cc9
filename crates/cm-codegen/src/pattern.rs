//! MIR-level pattern detection.
//!
//! Classifies functions by name substrings and tallies the combinations
//! that historically destabilized aggressive optimization (iterator +
//! closure + map/filter chains). The detector only *recommends* a level;
//! the user's choice is never downgraded silently.

use std::fmt;

use cm_mir::MirProgram;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternReport {
    pub closure_count: usize,
    pub iterator_count: usize,
    pub lambda_count: usize,
    pub map_filter_count: usize,
    /// Iterator, closure and map/filter functions all present.
    pub iter_closure_pattern: bool,
    /// More than 5 closures or more than 3 lambdas.
    pub complex_closure_pattern: bool,
    /// Size of `main`'s entry block, when oversized.
    pub large_main_entry: Option<usize>,
    pub requested_level: u8,
    pub recommended_level: u8,
}

/// Scan the program and compute the level recommendation.
pub fn detect(program: &MirProgram, requested_level: u8) -> PatternReport {
    let mut closure_count = 0;
    let mut iterator_count = 0;
    let mut lambda_count = 0;
    let mut map_filter_count = 0;

    for func in &program.functions {
        let name = func.name.as_str();
        if name.contains("closure") || name.contains("$_") {
            closure_count += 1;
        }
        if name.contains("iter") || name.contains("Iterator") || name.contains("next") {
            iterator_count += 1;
        }
        if name.contains("lambda") || name.contains("anon") {
            lambda_count += 1;
        }
        if name.contains("map")
            || name.contains("filter")
            || name.contains("fold")
            || name.contains("reduce")
        {
            map_filter_count += 1;
        }
    }

    let iter_closure_pattern =
        iterator_count > 0 && closure_count > 0 && map_filter_count > 0;
    let complex_closure_pattern = closure_count > 5 || lambda_count > 3;

    let large_main_entry = program
        .function("main")
        .and_then(|main| main.blocks.first())
        .map(|entry| entry.instructions.len())
        .filter(|&n| n > 100);

    let mut recommended_level = requested_level;
    if requested_level > 0 {
        if complex_closure_pattern && requested_level >= 3 {
            recommended_level = 1;
        }
        if iter_closure_pattern && requested_level >= 2 {
            recommended_level = 0;
        }
        if large_main_entry.is_some() && recommended_level >= 3 {
            recommended_level = 2;
        }
    }

    PatternReport {
        closure_count,
        iterator_count,
        lambda_count,
        map_filter_count,
        iter_closure_pattern,
        complex_closure_pattern,
        large_main_entry,
        requested_level,
        recommended_level,
    }
}

impl fmt::Display for PatternReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[pattern] closures: {}", self.closure_count)?;
        writeln!(f, "[pattern] iterators: {}", self.iterator_count)?;
        writeln!(f, "[pattern] lambdas: {}", self.lambda_count)?;
        writeln!(f, "[pattern] map/filter: {}", self.map_filter_count)?;
        if self.iter_closure_pattern {
            writeln!(f, "[pattern] iterator-closure combination detected")?;
        }
        if self.complex_closure_pattern {
            writeln!(f, "[pattern] complex closure pattern detected")?;
        }
        if let Some(n) = self.large_main_entry {
            writeln!(f, "[pattern] main entry block is large ({n} instructions)")?;
        }
        if self.recommended_level != self.requested_level {
            writeln!(
                f,
                "[pattern] recommendation: -O{} (requested -O{})",
                self.recommended_level, self.requested_level
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_common::Span;
    use cm_mir::{BasicBlock, BlockId, MirFunction, MirType, Terminator};

    fn named_fn(name: &str) -> MirFunction {
        MirFunction {
            name: name.into(),
            params: vec![],
            return_type: MirType::Void,
            locals: vec![],
            blocks: vec![BasicBlock {
                id: BlockId(0),
                instructions: vec![],
                terminator: Terminator::Return(None),
            }],
            is_export: false,
            no_inline: false,
            no_optimize: false,
            span: Span::dummy(),
        }
    }

    fn program_of(names: &[&str]) -> MirProgram {
        MirProgram {
            functions: names.iter().map(|n| named_fn(n)).collect(),
            ..MirProgram::default()
        }
    }

    #[test]
    fn counts_by_name_substring() {
        let p = program_of(&["my_closure", "list_iter", "map_values", "plain"]);
        let report = detect(&p, 2);
        assert_eq!(report.closure_count, 1);
        assert_eq!(report.iterator_count, 1);
        assert_eq!(report.map_filter_count, 1);
        assert!(report.iter_closure_pattern);
    }

    #[test]
    fn iter_closure_recommends_o0_but_keeps_request() {
        let p = program_of(&["closure_1", "iter_2", "filter_3"]);
        let report = detect(&p, 2);
        assert_eq!(report.requested_level, 2);
        assert_eq!(report.recommended_level, 0);
    }

    #[test]
    fn complex_closures_recommend_o1() {
        let names: Vec<String> = (0..6).map(|i| format!("closure_{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let report = detect(&program_of(&refs), 3);
        assert!(report.complex_closure_pattern);
        assert_eq!(report.recommended_level, 1);
    }

    #[test]
    fn clean_program_keeps_level() {
        let p = program_of(&["main", "helper"]);
        let report = detect(&p, 3);
        assert_eq!(report.recommended_level, 3);
        assert!(!report.iter_closure_pattern);
    }

    #[test]
    fn o0_is_never_adjusted() {
        let p = program_of(&["closure_a", "iter_b", "map_c"]);
        let report = detect(&p, 0);
        assert_eq!(report.recommended_level, 0);
    }
}
