//! The MIR optimization pipeline.
//!
//! Each pass implements [`Pass`] and reports whether it changed anything.
//! The [`PassManager`] runs its registered passes linearly or to a
//! fixpoint with an iteration cap. Instructions flagged `in_must` are out
//! of bounds for every pass.

mod passes;

pub use passes::{
    AlgebraicSimplification, CastSimplification, ConstantFolding, DeadInstructionElimination,
    DeadStoreElimination, LoadAfterStoreForwarding, PhiSimplification, SelectSimplification,
    StrengthReduction,
};

use crate::MirProgram;

pub trait Pass {
    fn name(&self) -> &'static str;
    /// Run over the whole program; return whether anything changed.
    fn run(&mut self, program: &mut MirProgram) -> bool;
}

/// Outcome of a fixpoint run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixpointResult {
    pub changed: bool,
    pub iterations: usize,
    /// False when the iteration cap cut the loop before a quiet round.
    /// Not fatal: the program is still valid, just not fully optimized.
    pub converged: bool,
}

pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    max_iterations: usize,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: 2,
        }
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Populate the standard pipeline for an optimization level (0..3).
    /// Level 0 registers nothing. The iteration cap is 3 at O3, else 2.
    pub fn add_standard_passes(&mut self, level: u8) {
        if level == 0 {
            return;
        }
        self.max_iterations = if level >= 3 { 3 } else { 2 };

        self.add_pass(Box::new(ConstantFolding));
        self.add_pass(Box::new(AlgebraicSimplification));
        self.add_pass(Box::new(DeadInstructionElimination));
        if level >= 2 {
            self.add_pass(Box::new(StrengthReduction));
            self.add_pass(Box::new(LoadAfterStoreForwarding));
            self.add_pass(Box::new(DeadStoreElimination));
            self.add_pass(Box::new(PhiSimplification));
            self.add_pass(Box::new(SelectSimplification));
            self.add_pass(Box::new(CastSimplification));
        }
    }

    /// One linear pass over the registered passes, in registration order.
    pub fn run(&mut self, program: &mut MirProgram) -> bool {
        let mut changed = false;
        for pass in &mut self.passes {
            if pass.run(program) {
                changed = true;
            }
        }
        changed
    }

    /// Repeat the pass sequence until a full round reports no change, or
    /// the iteration cap is reached.
    pub fn run_until_fixpoint(&mut self, program: &mut MirProgram) -> FixpointResult {
        let mut any_changed = false;
        for iteration in 1..=self.max_iterations {
            if !self.run(program) {
                return FixpointResult {
                    changed: any_changed,
                    iterations: iteration,
                    converged: true,
                };
            }
            any_changed = true;
        }
        FixpointResult {
            changed: any_changed,
            iterations: self.max_iterations,
            converged: false,
        }
    }
}
