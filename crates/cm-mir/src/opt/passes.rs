//! The standard MIR passes.
//!
//! Every pass walks functions (honoring the `no_optimize` hint) and skips
//! instructions flagged `in_must`. Integer arithmetic folds with wrapping
//! semantics, matching the defined-wrap behavior the language gives MIR.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::opt::Pass;
use crate::{BinOp, InstKind, MirFunction, MirProgram, MirType, Operand, UnOp};

/// Run a per-function rewrite across the program.
fn for_each_function(
    program: &mut MirProgram,
    mut apply: impl FnMut(&mut MirFunction) -> bool,
) -> bool {
    let mut changed = false;
    for func in &mut program.functions {
        if func.no_optimize {
            continue;
        }
        if apply(func) {
            changed = true;
        }
    }
    changed
}

/// Whether the local is signed/unsigned, from the function's local table.
fn local_signedness(func: &MirFunction, name: &str) -> Option<bool> {
    func.params
        .iter()
        .chain(&func.locals)
        .find(|(n, _)| n == name)
        .and_then(|(_, ty)| match ty {
            MirType::Int { signed, .. } => Some(*signed),
            _ => None,
        })
}

fn operand_signedness(func: &MirFunction, op: &Operand) -> bool {
    match op {
        Operand::Local(name) => local_signedness(func, name).unwrap_or(true),
        _ => true,
    }
}

// ── 1. Constant folding ────────────────────────────────────────────────

/// Evaluate operations whose operands are literal. Integer arithmetic uses
/// wrapping semantics; comparisons fold to booleans.
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.in_must {
                        continue;
                    }
                    if let Some(folded) = fold_inst(&inst.kind) {
                        inst.kind = folded;
                        changed = true;
                    }
                }
            }
            changed
        })
    }
}

fn fold_inst(kind: &InstKind) -> Option<InstKind> {
    match kind {
        InstKind::Binary { dst, op, lhs, rhs } => {
            let value = match (lhs, rhs) {
                (Operand::ConstInt(a), Operand::ConstInt(b)) => fold_int(*op, *a, *b)?,
                (Operand::ConstBool(a), Operand::ConstBool(b)) => fold_bool(*op, *a, *b)?,
                _ => return None,
            };
            Some(InstKind::Assign {
                dst: dst.clone(),
                value,
            })
        }
        InstKind::Unary { dst, op, operand } => {
            let value = match (op, operand) {
                (UnOp::Neg, Operand::ConstInt(v)) => Operand::ConstInt(v.wrapping_neg()),
                (UnOp::BitNot, Operand::ConstInt(v)) => Operand::ConstInt(!v),
                (UnOp::Not, Operand::ConstBool(v)) => Operand::ConstBool(!v),
                _ => return None,
            };
            Some(InstKind::Assign {
                dst: dst.clone(),
                value,
            })
        }
        _ => None,
    }
}

fn fold_int(op: BinOp, a: i64, b: i64) -> Option<Operand> {
    Some(match op {
        BinOp::Add => Operand::ConstInt(a.wrapping_add(b)),
        BinOp::Sub => Operand::ConstInt(a.wrapping_sub(b)),
        BinOp::Mul => Operand::ConstInt(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return None;
            }
            Operand::ConstInt(a.wrapping_div(b))
        }
        BinOp::Rem => {
            if b == 0 {
                return None;
            }
            Operand::ConstInt(a.wrapping_rem(b))
        }
        BinOp::BitAnd => Operand::ConstInt(a & b),
        BinOp::BitOr => Operand::ConstInt(a | b),
        BinOp::BitXor => Operand::ConstInt(a ^ b),
        BinOp::Shl => Operand::ConstInt(a.wrapping_shl(b as u32)),
        BinOp::Shr => Operand::ConstInt(a.wrapping_shr(b as u32)),
        BinOp::Eq => Operand::ConstBool(a == b),
        BinOp::Ne => Operand::ConstBool(a != b),
        BinOp::Lt => Operand::ConstBool(a < b),
        BinOp::Le => Operand::ConstBool(a <= b),
        BinOp::Gt => Operand::ConstBool(a > b),
        BinOp::Ge => Operand::ConstBool(a >= b),
    })
}

fn fold_bool(op: BinOp, a: bool, b: bool) -> Option<Operand> {
    Some(match op {
        BinOp::BitAnd => Operand::ConstBool(a && b),
        BinOp::BitOr => Operand::ConstBool(a || b),
        BinOp::BitXor => Operand::ConstBool(a != b),
        BinOp::Eq => Operand::ConstBool(a == b),
        BinOp::Ne => Operand::ConstBool(a != b),
        _ => return None,
    })
}

// ── 2. Algebraic simplification ────────────────────────────────────────

/// Identity and annihilator rules: `x+0`, `x-0`, `x*0`, `x*1`, `x/1`,
/// `x&0`, `x&-1`, `x|0`, `x^x`, `x==x`, `x!=x`.
pub struct AlgebraicSimplification;

impl Pass for AlgebraicSimplification {
    fn name(&self) -> &'static str {
        "algebraic-simplification"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.in_must {
                        continue;
                    }
                    if let InstKind::Binary { dst, op, lhs, rhs } = &inst.kind {
                        if let Some(value) = simplify_binary(*op, lhs, rhs) {
                            inst.kind = InstKind::Assign {
                                dst: dst.clone(),
                                value,
                            };
                            changed = true;
                        }
                    }
                }
            }
            changed
        })
    }
}

fn is_int(op: &Operand, v: i64) -> bool {
    matches!(op, Operand::ConstInt(n) if *n == v)
}

fn same_operand(a: &Operand, b: &Operand) -> bool {
    a == b && matches!(a, Operand::Local(_) | Operand::ConstInt(_) | Operand::ConstBool(_))
}

fn simplify_binary(op: BinOp, lhs: &Operand, rhs: &Operand) -> Option<Operand> {
    match op {
        BinOp::Add => {
            if is_int(rhs, 0) {
                return Some(lhs.clone());
            }
            if is_int(lhs, 0) {
                return Some(rhs.clone());
            }
            None
        }
        BinOp::Sub if is_int(rhs, 0) => Some(lhs.clone()),
        BinOp::Mul => {
            if is_int(rhs, 0) || is_int(lhs, 0) {
                return Some(Operand::ConstInt(0));
            }
            if is_int(rhs, 1) {
                return Some(lhs.clone());
            }
            if is_int(lhs, 1) {
                return Some(rhs.clone());
            }
            None
        }
        BinOp::Div if is_int(rhs, 1) => Some(lhs.clone()),
        BinOp::BitAnd => {
            if is_int(rhs, 0) || is_int(lhs, 0) {
                return Some(Operand::ConstInt(0));
            }
            if is_int(rhs, -1) {
                return Some(lhs.clone());
            }
            if is_int(lhs, -1) {
                return Some(rhs.clone());
            }
            None
        }
        BinOp::BitOr => {
            if is_int(rhs, 0) {
                return Some(lhs.clone());
            }
            if is_int(lhs, 0) {
                return Some(rhs.clone());
            }
            None
        }
        BinOp::BitXor if same_operand(lhs, rhs) => Some(Operand::ConstInt(0)),
        BinOp::Eq if same_operand(lhs, rhs) => Some(Operand::ConstBool(true)),
        BinOp::Ne if same_operand(lhs, rhs) => Some(Operand::ConstBool(false)),
        _ => None,
    }
}

// ── 3. Strength reduction ──────────────────────────────────────────────

/// Power-of-two multiplies become shifts; unsigned divides and remainders
/// by powers of two become shifts and masks; `x * -1` becomes negation.
pub struct StrengthReduction;

impl Pass for StrengthReduction {
    fn name(&self) -> &'static str {
        "strength-reduction"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for bi in 0..func.blocks.len() {
                for ii in 0..func.blocks[bi].instructions.len() {
                    if func.blocks[bi].instructions[ii].in_must {
                        continue;
                    }
                    let replacement = {
                        let inst = &func.blocks[bi].instructions[ii];
                        reduce_strength(func, &inst.kind)
                    };
                    if let Some(kind) = replacement {
                        func.blocks[bi].instructions[ii].kind = kind;
                        changed = true;
                    }
                }
            }
            changed
        })
    }
}

fn power_of_two(v: i64) -> Option<u32> {
    if v > 0 && (v & (v - 1)) == 0 {
        Some(v.trailing_zeros())
    } else {
        None
    }
}

fn reduce_strength(func: &MirFunction, kind: &InstKind) -> Option<InstKind> {
    let InstKind::Binary { dst, op, lhs, rhs } = kind else {
        return None;
    };
    let Operand::ConstInt(c) = rhs else {
        return None;
    };

    match op {
        BinOp::Mul => {
            if *c == -1 {
                return Some(InstKind::Unary {
                    dst: dst.clone(),
                    op: UnOp::Neg,
                    operand: lhs.clone(),
                });
            }
            let shift = power_of_two(*c)?;
            Some(InstKind::Binary {
                dst: dst.clone(),
                op: BinOp::Shl,
                lhs: lhs.clone(),
                rhs: Operand::ConstInt(shift as i64),
            })
        }
        BinOp::Div => {
            // Only unsigned division is a plain shift.
            if operand_signedness(func, lhs) {
                return None;
            }
            let shift = power_of_two(*c)?;
            Some(InstKind::Binary {
                dst: dst.clone(),
                op: BinOp::Shr,
                lhs: lhs.clone(),
                rhs: Operand::ConstInt(shift as i64),
            })
        }
        BinOp::Rem => {
            if operand_signedness(func, lhs) {
                return None;
            }
            power_of_two(*c)?;
            Some(InstKind::Binary {
                dst: dst.clone(),
                op: BinOp::BitAnd,
                lhs: lhs.clone(),
                rhs: Operand::ConstInt(c - 1),
            })
        }
        _ => None,
    }
}

// ── 4. Dead instruction elimination ────────────────────────────────────

/// Remove side-effect-free temporaries (`%tN`) with no readers.
pub struct DeadInstructionElimination;

impl Pass for DeadInstructionElimination {
    fn name(&self) -> &'static str {
        "dead-instruction-elimination"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut used: FxHashSet<String> = FxHashSet::default();
            for block in &func.blocks {
                for inst in &block.instructions {
                    for op in inst.kind.operands() {
                        if let Operand::Local(name) = op {
                            used.insert(name.clone());
                        }
                    }
                    // Gep on a named local keeps that local alive.
                    if let InstKind::Gep {
                        base: crate::GepBase::Local(name),
                        ..
                    } = &inst.kind
                    {
                        used.insert(name.clone());
                    }
                    // Stores through pointers may feed any local; handled
                    // by the ptr operand above.
                }
                match &block.terminator {
                    crate::Terminator::CondBranch { cond, .. } => {
                        if let Operand::Local(name) = cond {
                            used.insert(name.clone());
                        }
                    }
                    crate::Terminator::Return(Some(Operand::Local(name))) => {
                        used.insert(name.clone());
                    }
                    crate::Terminator::Switch {
                        value: Operand::Local(name),
                        ..
                    } => {
                        used.insert(name.clone());
                    }
                    _ => {}
                }
            }

            let mut changed = false;
            for block in &mut func.blocks {
                let before = block.instructions.len();
                block.instructions.retain(|inst| {
                    if inst.in_must || inst.kind.has_side_effects() {
                        return true;
                    }
                    match inst.kind.dst() {
                        Some(dst) => !(dst.starts_with("%t") && !used.contains(dst)),
                        None => true,
                    }
                });
                if block.instructions.len() != before {
                    changed = true;
                }
            }
            changed
        })
    }
}

// ── 5. Load-after-store forwarding ─────────────────────────────────────

/// Within one block: a non-volatile load from a pointer that was just
/// stored through, with no intervening memory write, becomes the stored
/// value.
pub struct LoadAfterStoreForwarding;

impl Pass for LoadAfterStoreForwarding {
    fn name(&self) -> &'static str {
        "load-after-store-forwarding"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                // pointer local -> last stored value.
                let mut stored: FxHashMap<String, Operand> = FxHashMap::default();
                for inst in &mut block.instructions {
                    if inst.in_must {
                        stored.clear();
                        continue;
                    }
                    let mut replacement: Option<InstKind> = None;
                    match &inst.kind {
                        InstKind::Store {
                            ptr: Operand::Local(name),
                            value,
                            volatile: false,
                        } => {
                            stored.insert(name.clone(), value.clone());
                        }
                        InstKind::Store { .. } => {
                            stored.clear();
                        }
                        InstKind::Load {
                            dst,
                            ptr: Operand::Local(name),
                            volatile: false,
                        } => {
                            if let Some(value) = stored.get(name) {
                                replacement = Some(InstKind::Assign {
                                    dst: dst.clone(),
                                    value: value.clone(),
                                });
                            }
                        }
                        // Calls may write any memory.
                        InstKind::Call { .. }
                        | InstKind::CallIndirect { .. }
                        | InstKind::CallVirtual { .. }
                        | InstKind::InlineAsm { .. } => {
                            stored.clear();
                        }
                        _ => {}
                    }
                    if let Some(kind) = replacement {
                        inst.kind = kind;
                        changed = true;
                    }
                }
            }
            changed
        })
    }
}

// ── 6. Dead store elimination ──────────────────────────────────────────

/// A non-volatile store immediately overwritten by another store to the
/// same pointer, with no intervening read or call, is removed.
pub struct DeadStoreElimination;

impl Pass for DeadStoreElimination {
    fn name(&self) -> &'static str {
        "dead-store-elimination"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                let mut dead: Vec<usize> = Vec::new();
                let insts = &block.instructions;
                for i in 0..insts.len() {
                    let InstKind::Store {
                        ptr,
                        volatile: false,
                        ..
                    } = &insts[i].kind
                    else {
                        continue;
                    };
                    if insts[i].in_must {
                        continue;
                    }
                    for later in &insts[i + 1..] {
                        match &later.kind {
                            InstKind::Store {
                                ptr: later_ptr,
                                volatile: false,
                                ..
                            } if later_ptr == ptr && !later.in_must => {
                                dead.push(i);
                                break;
                            }
                            InstKind::Load { .. }
                            | InstKind::Store { .. }
                            | InstKind::Call { .. }
                            | InstKind::CallIndirect { .. }
                            | InstKind::CallVirtual { .. }
                            | InstKind::InlineAsm { .. } => break,
                            _ => {}
                        }
                    }
                }
                for &i in dead.iter().rev() {
                    block.instructions.remove(i);
                    changed = true;
                }
            }
            changed
        })
    }
}

// ── 7. Phi simplification ──────────────────────────────────────────────

/// A phi whose incoming values are all identical reduces to that value.
pub struct PhiSimplification;

impl Pass for PhiSimplification {
    fn name(&self) -> &'static str {
        "phi-simplification"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.in_must {
                        continue;
                    }
                    if let InstKind::Phi { dst, incoming } = &inst.kind {
                        let Some((_, first)) = incoming.first() else {
                            continue;
                        };
                        if incoming.iter().all(|(_, op)| op == first) {
                            inst.kind = InstKind::Assign {
                                dst: dst.clone(),
                                value: first.clone(),
                            };
                            changed = true;
                        }
                    }
                }
            }
            changed
        })
    }
}

// ── 8. Select simplification ───────────────────────────────────────────

/// `select true, a, b` -> `a`; `select c, x, x` -> `x`;
/// `select c, true, false` -> `c`; `select c, false, true` -> `!c`.
pub struct SelectSimplification;

impl Pass for SelectSimplification {
    fn name(&self) -> &'static str {
        "select-simplification"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            let mut changed = false;
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.in_must {
                        continue;
                    }
                    let InstKind::Select {
                        dst,
                        cond,
                        then_value,
                        else_value,
                    } = &inst.kind
                    else {
                        continue;
                    };

                    let new_kind = if let Operand::ConstBool(c) = cond {
                        Some(InstKind::Assign {
                            dst: dst.clone(),
                            value: if *c {
                                then_value.clone()
                            } else {
                                else_value.clone()
                            },
                        })
                    } else if then_value == else_value {
                        Some(InstKind::Assign {
                            dst: dst.clone(),
                            value: then_value.clone(),
                        })
                    } else if matches!(then_value, Operand::ConstBool(true))
                        && matches!(else_value, Operand::ConstBool(false))
                    {
                        Some(InstKind::Assign {
                            dst: dst.clone(),
                            value: cond.clone(),
                        })
                    } else if matches!(then_value, Operand::ConstBool(false))
                        && matches!(else_value, Operand::ConstBool(true))
                    {
                        Some(InstKind::Unary {
                            dst: dst.clone(),
                            op: UnOp::Not,
                            operand: cond.clone(),
                        })
                    } else {
                        None
                    };

                    if let Some(kind) = new_kind {
                        inst.kind = kind;
                        changed = true;
                    }
                }
            }
            changed
        })
    }
}

// ── 9. Cast simplification ─────────────────────────────────────────────

/// Identity casts are removed; a cast back to the source type of an inner
/// cast collapses to the original value.
pub struct CastSimplification;

impl Pass for CastSimplification {
    fn name(&self) -> &'static str {
        "cast-simplification"
    }

    fn run(&mut self, program: &mut MirProgram) -> bool {
        for_each_function(program, |func| {
            // Local -> declared type, for identity detection.
            let types: FxHashMap<&str, &MirType> = func
                .params
                .iter()
                .chain(&func.locals)
                .map(|(n, t)| (n.as_str(), t))
                .collect();

            // dst -> (source operand, source type) for cast-of-cast.
            let mut cast_defs: FxHashMap<String, (Operand, MirType)> = FxHashMap::default();
            for block in &func.blocks {
                for inst in &block.instructions {
                    if let InstKind::Cast { dst, value, .. } = &inst.kind {
                        let src_ty = match value {
                            Operand::Local(name) => {
                                types.get(name.as_str()).map(|t| (*t).clone())
                            }
                            _ => None,
                        };
                        if let Some(src_ty) = src_ty {
                            cast_defs.insert(dst.clone(), (value.clone(), src_ty));
                        }
                    }
                }
            }

            let mut changed = false;
            for block in &mut func.blocks {
                for inst in &mut block.instructions {
                    if inst.in_must {
                        continue;
                    }
                    let InstKind::Cast { dst, value, to } = &inst.kind else {
                        continue;
                    };

                    // Identity cast.
                    if let Operand::Local(name) = value {
                        if types.get(name.as_str()).is_some_and(|t| *t == to) {
                            inst.kind = InstKind::Assign {
                                dst: dst.clone(),
                                value: value.clone(),
                            };
                            changed = true;
                            continue;
                        }
                    }

                    // cast(cast(x, T1), T0) -> x when x: T0.
                    if let Operand::Local(name) = value {
                        if let Some((origin, origin_ty)) = cast_defs.get(name.as_str()) {
                            if origin_ty == to {
                                inst.kind = InstKind::Assign {
                                    dst: dst.clone(),
                                    value: origin.clone(),
                                };
                                changed = true;
                            }
                        }
                    }
                }
            }
            changed
        })
    }
}
