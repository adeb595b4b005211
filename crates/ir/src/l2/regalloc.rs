//! Register allocation by iterated graph colouring with conservative
//! spilling (spec.md §4.3): liveness → interference → simplify/select →
//! spill-rewrite, looped until every node colours or a hard fallback
//! kicks in.

use super::ast::{Function, Instruction, Operand};
use super::interference::{self, InterferenceGraph};
use super::liveness;
use crate::common::{Reg, Var};
use lnc_support::registers::PhysReg;
use lnc_support::CompileError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt::Write as _;

/// The stack slot map and reserved-prefix generator state for spilled
/// variables (SPEC_FULL.md §4): a `-s` (spill-only) invocation of `l22l1`
/// can report exactly this without re-running the rest of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SpillInfo {
    /// Stack-relative byte offset (from `rsp`, negative, multiple of 8)
    /// that holds a spilled variable's value between uses.
    pub slots: FxHashMap<Var, i64>,
    /// A variable-name prefix guaranteed not to collide with any name the
    /// source program could have produced, so the spiller can recognise
    /// its own previously-introduced temporaries (spec.md §4.3 step 1).
    pub prefix: String,
    next_suffix: u32,
    /// The most negative `rsp`-relative displacement `func` already used
    /// before any spill slot existed — `CallTile`'s outgoing-argument
    /// slots (spec.md §4.6) live here. Spill slots are carved out below
    /// this floor so a spilled variable's slot can never alias a call's
    /// argument slot.
    floor: i64,
}

impl SpillInfo {
    fn fresh_name(&mut self) -> String {
        let n = self.next_suffix;
        self.next_suffix += 1;
        format!("{}{}", self.prefix, n)
    }
}

/// The completed allocation: every `Var` mentioned in `func` maps to a
/// physical register by the time `allocate` returns successfully.
pub struct Allocation {
    pub colors: FxHashMap<Var, PhysReg>,
    pub spills: SpillInfo,
}

/// A prefix that is not a prefix of any variable name already in `func`
/// (spec.md §4.3 step 1). Built from the longest observed name plus a
/// marker no source identifier can contain, mirroring `lb::lower`'s
/// longest-observed-name-plus-suffix generator (spec.md §4.7).
fn fresh_prefix(func: &Function) -> String {
    let longest = func.vars.values().map(|v| v.name.len()).max().unwrap_or(0);
    let mut prefix = "spill_".to_string();
    while func.vars.values().any(|v| v.name.starts_with(&prefix)) {
        prefix.push('_');
    }
    // Pad so the prefix is at least as long as any existing name, which
    // together with the `starts_with` check above rules out the prefix
    // ever being a prefix of a pre-existing (shorter) identifier.
    while prefix.len() <= longest {
        prefix.push('_');
    }
    prefix
}

/// The lowest `rsp`-relative displacement any `Load`/`Store` in `func`
/// already addresses, or `0` if none does. `CallTile` writes outgoing
/// arguments past the sixth at exactly these displacements before the
/// allocator ever runs (spec.md §4.6), so the spiller must not hand out
/// a slot at or above this floor.
fn outgoing_arg_floor(func: &Function) -> i64 {
    let mut floor = 0i64;
    for (_, bb) in func.blocks.iter() {
        for inst in &bb.insts {
            let disp = match inst {
                Instruction::Load(_, Reg::Physical(PhysReg::Rsp), d) => Some(*d),
                Instruction::Store(Reg::Physical(PhysReg::Rsp), d, _) => Some(*d),
                _ => None,
            };
            if let Some(d) = disp {
                floor = floor.min(d);
            }
        }
    }
    floor
}

const K: usize = PhysReg::ALLOCATABLE.len();

enum StackEntry {
    Simplify(Reg),
    PotentialSpill(Reg),
}

/// Simplify/select (spec.md §4.3 steps 3b-3e): reduce the graph to a
/// stack by repeatedly removing low-degree nodes (falling back to a
/// highest-degree "potential spill" push when stuck), then colour by
/// popping the stack. The simplify phase works on a mutable clone of `g`
/// — [`InterferenceGraph::remove`] pops a node and its incident edges,
/// [`InterferenceGraph::degree`] reads the resulting degree of what's
/// left — so a node's remaining neighbours are exactly those not yet
/// popped, without separately tracking an `in_graph` membership set.
fn simplify_and_select(
    g: &InterferenceGraph,
    pre_colored: &FxHashMap<Reg, PhysReg>,
) -> FxHashMap<Reg, PhysReg> {
    let mut work = g.clone();
    let mut in_graph: FxHashSet<Reg> = g
        .nodes()
        .filter(|r| r.as_virtual().is_some() && !pre_colored.contains_key(r))
        .collect();
    let mut stack = Vec::new();

    while !in_graph.is_empty() {
        if let Some(&low) = in_graph.iter().find(|&&r| work.degree(r) < K) {
            stack.push(StackEntry::Simplify(low));
            in_graph.remove(&low);
            work.remove(low);
            continue;
        }
        // Stuck: everything remaining has degree >= K. Push the
        // highest-degree node as a potential spill (spec.md §4.3 step 3c)
        // and keep simplifying the now-smaller graph.
        let spill = *in_graph
            .iter()
            .max_by_key(|&&r| work.degree(r))
            .expect("in_graph is non-empty");
        stack.push(StackEntry::PotentialSpill(spill));
        in_graph.remove(&spill);
        work.remove(spill);
    }

    let mut colors = pre_colored.clone();
    for r in PhysReg::ALLOCATABLE {
        colors.insert(Reg::Physical(r), r);
    }

    while let Some(entry) = stack.pop() {
        let r = match entry {
            StackEntry::Simplify(r) | StackEntry::PotentialSpill(r) => r,
        };
        let used: FxHashSet<PhysReg> = g.neighbors(r).filter_map(|n| colors.get(&n).copied()).collect();
        if let Some(c) = PhysReg::preference_order().find(|c| !used.contains(c)) {
            colors.insert(r, c);
        }
        // Otherwise left uncoloured: spec.md §4.3 step 3d, "or is marked
        // uncoloured" — the caller's spill-rewrite pass picks this up.
    }
    colors
}

/// Which positions of `inst` mention `v`, split into reads (need a
/// pre-load) and a write (needs a post-store). Two-address `Arith` can
/// report the same instruction in both (spec.md §4.3's "produces both a
/// pre-load and a post-store around a single rewritten instruction").
struct Mention {
    reads: bool,
    writes: bool,
}

fn mentions(inst: &Instruction, v: Var) -> Mention {
    let is = |r: Reg| r == Reg::Virtual(v);
    let is_op = |o: Operand| matches!(o, Operand::Reg(r) if is(r));
    match inst {
        Instruction::Assign(d, s) => Mention { reads: is_op(*s), writes: is(*d) },
        Instruction::Arith(d, _, rhs) => Mention { reads: is(*d) || is_op(*rhs), writes: is(*d) },
        Instruction::Compare(d, _, l, r) => Mention { reads: is_op(*l) || is_op(*r), writes: is(*d) },
        Instruction::Load(d, base, _) => Mention { reads: is(*base), writes: is(*d) },
        Instruction::Store(base, _, s) => Mention { reads: is(*base) || is_op(*s), writes: false },
        Instruction::Call(..) => Mention { reads: false, writes: false },
        Instruction::CallAssign(d, _, _) => Mention { reads: false, writes: is(*d) },
        Instruction::CondJump(_, l, r, _) => Mention { reads: is_op(*l) || is_op(*r), writes: false },
    }
}

fn substitute(inst: Instruction, v: Var, fresh: Reg) -> Instruction {
    let sub_reg = |r: Reg| if r == Reg::Virtual(v) { fresh } else { r };
    let sub_op = |o: Operand| match o {
        Operand::Reg(r) => Operand::Reg(sub_reg(r)),
        Operand::Num(n) => Operand::Num(n),
    };
    match inst {
        Instruction::Assign(d, s) => Instruction::Assign(sub_reg(d), sub_op(s)),
        Instruction::Arith(d, op, rhs) => Instruction::Arith(sub_reg(d), op, sub_op(rhs)),
        Instruction::Compare(d, op, l, r) => Instruction::Compare(sub_reg(d), op, sub_op(l), sub_op(r)),
        Instruction::Load(d, base, disp) => Instruction::Load(sub_reg(d), sub_reg(base), disp),
        Instruction::Store(base, disp, s) => Instruction::Store(sub_reg(base), disp, sub_op(s)),
        Instruction::Call(c, n) => Instruction::Call(c, n),
        Instruction::CallAssign(d, c, n) => Instruction::CallAssign(sub_reg(d), c, n),
        Instruction::CondJump(op, l, r, lbl) => Instruction::CondJump(op, sub_op(l), sub_op(r), lbl),
    }
}

/// Rewrite every mention of each variable in `to_spill` into a fresh
/// per-instruction temporary, loaded from and stored to a reserved stack
/// slot (spec.md §4.3 step 3f). Each instruction gets its own fresh
/// temporary per spilled variable it mentions, even across several
/// instructions that mention the same variable — the slot is what
/// survives between them, not a shared register.
fn rewrite_spills(func: &mut Function, to_spill: &FxHashSet<Var>, spills: &mut SpillInfo) {
    for &v in to_spill {
        let next_slot = spills.floor - 8 * (spills.slots.len() as i64 + 1);
        spills.slots.entry(v).or_insert(next_slot);
    }
    let rsp = Reg::Physical(PhysReg::Rsp);

    for bb in func.blocks.values_mut() {
        let mut rewritten = Vec::with_capacity(bb.insts.len());
        for inst in bb.insts.drain(..) {
            let spilled_here: Vec<Var> =
                to_spill.iter().copied().filter(|&v| { let m = mentions(&inst, v); m.reads || m.writes }).collect();
            if spilled_here.is_empty() {
                rewritten.push(inst);
                continue;
            }

            let mut pre_loads = Vec::new();
            let mut post_stores = Vec::new();
            let mut cur = inst;
            for v in spilled_here {
                let m = mentions(&cur, v);
                let slot = spills.slots[&v];
                let fresh_name = spills.fresh_name();
                let fresh_var = func.vars.push(super::ast::VarInfo { name: fresh_name });
                let fresh = Reg::Virtual(fresh_var);
                if m.reads {
                    pre_loads.push(Instruction::Load(fresh, rsp, slot));
                }
                cur = substitute(cur, v, fresh);
                if m.writes {
                    post_stores.push(Instruction::Store(rsp, slot, Operand::Reg(fresh)));
                }
            }
            rewritten.extend(pre_loads);
            rewritten.push(cur);
            rewritten.extend(post_stores);
        }
        bb.insts = rewritten;
    }
}

/// Iteratively allocate registers for `func`, mutating it in place with
/// spill-rewrites and dead-code elimination between rounds, until every
/// variable colours or the hard fallback (spec.md §4.3 step 4) applies.
pub fn allocate(func: &mut Function) -> Result<Allocation, CompileError> {
    let mut spills = SpillInfo {
        prefix: fresh_prefix(func),
        floor: outgoing_arg_floor(func),
        ..Default::default()
    };

    let max_rounds = func.vars.len() + 64;
    for round in 0..max_rounds {
        let live = liveness::analyze(func);
        let graph = interference::build(func, &live);

        let mut pre_colored = FxHashMap::default();
        for (i, &p) in func.params.iter().enumerate().take(PhysReg::ARGUMENT.len()) {
            pre_colored.insert(Reg::Virtual(p), PhysReg::ARGUMENT[i]);
        }

        let colors = simplify_and_select(&graph, &pre_colored);

        let uncolored: FxHashSet<Var> = graph
            .nodes()
            .filter_map(|r| r.as_virtual())
            .filter(|v| !colors.contains_key(&Reg::Virtual(*v)))
            .collect();

        if uncolored.is_empty() {
            let mut var_colors = FxHashMap::default();
            for (r, c) in &colors {
                if let Some(v) = r.as_virtual() {
                    var_colors.insert(v, *c);
                }
            }
            return Ok(Allocation { colors: var_colors, spills });
        }

        if round + 1 == max_rounds {
            log::warn!(
                "{}",
                CompileError::ResourceExhausted(func.name.clone())
            );
            rewrite_spills(func, &uncolored, &mut spills);
            super::dce::eliminate(func);
            let live = liveness::analyze(func);
            let graph = interference::build(func, &live);
            let colors = simplify_and_select(&graph, &pre_colored);
            let still_uncolored = graph
                .nodes()
                .filter_map(|r| r.as_virtual())
                .any(|v| !colors.contains_key(&Reg::Virtual(v)));
            if still_uncolored {
                return Err(CompileError::AnalysisInvariantViolated(format!(
                    "{} still has uncolourable variables after unconditional spill-all",
                    func.name
                )));
            }
            let mut var_colors = FxHashMap::default();
            for (r, c) in &colors {
                if let Some(v) = r.as_virtual() {
                    var_colors.insert(v, *c);
                }
            }
            return Ok(Allocation { colors: var_colors, spills });
        }

        rewrite_spills(func, &uncolored, &mut spills);
        super::dce::eliminate(func);
    }

    Err(CompileError::AnalysisInvariantViolated(format!(
        "register allocation for {} did not converge",
        func.name
    )))
}

/// Render `colors`/`spills` as a human-readable summary, used by the
/// `-s` restricted-output mode (spec.md §6).
pub fn describe(func: &Function, alloc: &Allocation) -> String {
    let mut out = String::new();
    for (v, r) in &alloc.colors {
        let _ = writeln!(out, "%{} -> {}", func.var_name(*v), r);
    }
    for (v, slot) in &alloc.spills.slots {
        let _ = writeln!(out, "%{} -> mem[rsp, {}]", func.var_name(*v), slot);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ArithOp;
    use crate::l2::ast::{BasicBlock, Terminator, VarInfo};
    use lnc_entity::{EntityRef, PrimaryMap, SecondaryMap};

    fn one_block_function(insts: Vec<Instruction>, term: Terminator, nvars: usize) -> Function {
        let mut vars = PrimaryMap::new();
        for i in 0..nvars {
            vars.push(VarInfo { name: format!("v{i}") });
        }
        let mut labels: PrimaryMap<crate::common::Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock { label: entry_label, insts, term });
        let mut label_block = SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        Function {
            name: "f".into(),
            params: vec![],
            returns_value: true,
            vars,
            label_names: SecondaryMap::new(),
            blocks,
            entry,
            label_block,
            next_var_suffix: 0,
        }
    }

    #[test]
    fn two_independent_vars_get_distinct_registers() {
        let a = Var::new(0);
        let b = Var::new(1);
        let c = Var::new(2);
        let mut func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(a), Operand::Num(1)),
                Instruction::Assign(Reg::Virtual(b), Operand::Num(2)),
                Instruction::Assign(Reg::Virtual(c), Operand::Reg(Reg::Virtual(a))),
                Instruction::Arith(Reg::Virtual(c), ArithOp::Add, Operand::Reg(Reg::Virtual(b))),
            ],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(c))),
            3,
        );
        let alloc = allocate(&mut func).expect("should colour without spilling");
        assert!(alloc.spills.slots.is_empty());
        assert_ne!(alloc.colors.get(&a), alloc.colors.get(&b));
    }

    #[test]
    fn first_parameter_is_pre_coloured_to_rdi() {
        let p = Var::new(0);
        let mut func = one_block_function(
            vec![],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(p))),
            1,
        );
        func.params = vec![p];
        let alloc = allocate(&mut func).expect("single-parameter identity should colour");
        assert_eq!(alloc.colors[&p], PhysReg::Rdi);
    }

    /// More simultaneously-live variables than there are allocatable
    /// registers forces at least one spill (spec.md §4.3 step 3c/3f;
    /// SPEC_FULL.md's 17-simultaneously-live-variables scenario).
    #[test]
    fn more_live_vars_than_registers_forces_a_spill() {
        let n = PhysReg::ALLOCATABLE.len() + 3;
        let vars: Vec<Var> = (0..n).map(Var::new).collect();
        let mut insts = Vec::new();
        for &v in &vars {
            insts.push(Instruction::Assign(Reg::Virtual(v), Operand::Num(1)));
        }
        // Sum all of them so every one is simultaneously live going into
        // the final accumulation.
        let acc = vars[0];
        for &v in &vars[1..] {
            insts.push(Instruction::Arith(Reg::Virtual(acc), ArithOp::Add, Operand::Reg(Reg::Virtual(v))));
        }
        let mut func = one_block_function(insts, Terminator::ReturnValue(Operand::Reg(Reg::Virtual(acc))), n);
        let alloc = allocate(&mut func).expect("spill-all fallback always succeeds");
        assert!(!alloc.spills.slots.is_empty());
    }

    #[test]
    fn spill_rewrite_never_leaves_a_spilled_var_in_the_instruction_stream() {
        let a = Var::new(0);
        let b = Var::new(1);
        let mut func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(a), Operand::Num(1)),
                Instruction::Assign(Reg::Virtual(b), Operand::Reg(Reg::Virtual(a))),
            ],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(b))),
            2,
        );
        let mut to_spill = FxHashSet::default();
        to_spill.insert(a);
        let mut spills = SpillInfo { prefix: fresh_prefix(&func), ..Default::default() };
        rewrite_spills(&mut func, &to_spill, &mut spills);
        for bb in func.blocks.values() {
            for inst in &bb.insts {
                assert!(!dest_or_use_is(inst, a));
            }
        }
    }

    fn dest_or_use_is(inst: &Instruction, v: Var) -> bool {
        let m = mentions(inst, v);
        m.reads || m.writes
    }
}
