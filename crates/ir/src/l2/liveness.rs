//! Backward per-instruction liveness (spec.md §4.1), computed directly
//! over program points rather than block-level summaries first: each
//! point is `(block, instruction-index)`, where `instruction-index ==
//! insts.len()` denotes the block's terminator. This keeps the
//! implementation a literal transcription of the two equations the spec
//! gives —
//!
//! ```text
//! IN(i)  = GEN(i) ∪ (OUT(i) \ KILL(i))
//! OUT(i) = ⋃ { IN(s) : s immediately follows i in its block, or is the
//!              first instruction of a successor block }
//! ```
//!
//! — without first having to prove a block-level summary is equivalent,
//! which matters for a teaching compiler whose liveness module other
//! code (interference, DCE, the spiller) reads as a reference
//! implementation.
//!
//! Re-exported standalone so `-l` (liveness-only output, spec.md §6) can
//! run without also building the interference graph (SPEC_FULL.md §2).

use super::ast::{Function, Instruction, Terminator};
use crate::common::{Blk, Reg};
use lnc_entity::EntityRef;
use lnc_support::registers::PhysReg;
use rustc_hash::FxHashSet;

/// A program point: an instruction index into a block's body, or
/// `insts.len()` for the block's terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub blk: Blk,
    pub idx: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PointSets {
    pub gen: FxHashSet<Reg>,
    pub kill: FxHashSet<Reg>,
    pub inn: FxHashSet<Reg>,
    pub out: FxHashSet<Reg>,
}

pub struct Liveness {
    points: Vec<(Point, PointSets)>,
    index: rustc_hash::FxHashMap<Point, usize>,
}

impl Liveness {
    pub fn gen_at(&self, p: Point) -> &FxHashSet<Reg> {
        &self.points[self.index[&p]].1.gen
    }
    pub fn kill_at(&self, p: Point) -> &FxHashSet<Reg> {
        &self.points[self.index[&p]].1.kill
    }
    pub fn in_at(&self, p: Point) -> &FxHashSet<Reg> {
        &self.points[self.index[&p]].1.inn
    }
    pub fn out_at(&self, p: Point) -> &FxHashSet<Reg> {
        &self.points[self.index[&p]].1.out
    }

    /// Every point in the function, in arena/program order.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().map(|(p, _)| *p)
    }
}

/// The stack pointer is never live (spec.md §4.1): it is always available
/// without being tracked, so it never enters a GEN/KILL/IN/OUT set.
fn trackable(r: Reg) -> bool {
    !matches!(r, Reg::Physical(PhysReg::Rsp))
}

fn insert(set: &mut FxHashSet<Reg>, r: Reg) {
    if trackable(r) {
        set.insert(r);
    }
}

fn gen_of_operand(set: &mut FxHashSet<Reg>, op: super::ast::Operand) {
    if let Some(r) = op.as_reg() {
        insert(set, r);
    }
}

/// GEN/KILL of a non-terminating instruction (spec.md §4.1's per-kind
/// table, specialised to L2's already-two-address `Arith` and
/// already-linearised `Load`/`Store`).
fn gen_kill_inst(inst: &Instruction) -> (FxHashSet<Reg>, FxHashSet<Reg>) {
    let mut gen = FxHashSet::default();
    let mut kill = FxHashSet::default();
    match inst {
        Instruction::Assign(dst, src) => {
            insert(&mut kill, *dst);
            gen_of_operand(&mut gen, *src);
        }
        Instruction::Arith(dst, _, rhs) => {
            // Two-address: `dst` is read (as the left operand) and then
            // overwritten, so it belongs in both GEN and KILL.
            insert(&mut kill, *dst);
            insert(&mut gen, *dst);
            gen_of_operand(&mut gen, *rhs);
        }
        Instruction::Compare(dst, _, l, r) => {
            insert(&mut kill, *dst);
            gen_of_operand(&mut gen, *l);
            gen_of_operand(&mut gen, *r);
        }
        Instruction::Load(dst, base, _) => {
            insert(&mut kill, *dst);
            insert(&mut gen, *base);
        }
        Instruction::Store(base, _, src) => {
            insert(&mut gen, *base);
            gen_of_operand(&mut gen, *src);
        }
        Instruction::Call(_, argc) => {
            for r in PhysReg::ARGUMENT.iter().take((*argc).min(6)) {
                insert(&mut gen, Reg::Physical(*r));
            }
            for r in PhysReg::CALLER_SAVED {
                insert(&mut kill, Reg::Physical(r));
            }
        }
        Instruction::CallAssign(dst, _, argc) => {
            for r in PhysReg::ARGUMENT.iter().take((*argc).min(6)) {
                insert(&mut gen, Reg::Physical(*r));
            }
            for r in PhysReg::CALLER_SAVED {
                insert(&mut kill, Reg::Physical(r));
            }
            insert(&mut kill, *dst);
        }
        Instruction::CondJump(_, l, r, _) => {
            gen_of_operand(&mut gen, *l);
            gen_of_operand(&mut gen, *r);
        }
    }
    (gen, kill)
}

/// GEN/KILL of a terminator. Spec.md §4.1: "return with value: GEN={rax,
/// callee-saved, value-vars}; return: GEN={rax, callee-saved}" — the
/// epilogue is modeled as reading the return-value register and every
/// callee-saved register, so the allocator never lets a callee-saved
/// register die (and thus go unrestored) before the function actually
/// returns.
fn gen_kill_term(term: &Terminator) -> (FxHashSet<Reg>, FxHashSet<Reg>) {
    let mut gen = FxHashSet::default();
    let kill = FxHashSet::default();
    match term {
        Terminator::ReturnValue(v) => {
            insert(&mut gen, Reg::Physical(PhysReg::RETURN_VALUE));
            for r in PhysReg::CALLEE_SAVED {
                insert(&mut gen, Reg::Physical(r));
            }
            gen_of_operand(&mut gen, *v);
        }
        Terminator::ReturnVoid => {
            insert(&mut gen, Reg::Physical(PhysReg::RETURN_VALUE));
            for r in PhysReg::CALLEE_SAVED {
                insert(&mut gen, Reg::Physical(r));
            }
        }
        Terminator::Jump(_) | Terminator::Fallthrough => {}
    }
    (gen, kill)
}

/// Points `p` transfers control to: the spec's "immediately following
/// instruction within its block, or the first instruction of a successor
/// block."
fn successors_of(func: &Function, p: Point) -> Vec<Point> {
    let bb = &func.blocks[p.blk];
    if p.idx < bb.insts.len() {
        let mut out = vec![Point { blk: p.blk, idx: p.idx + 1 }];
        if let Instruction::CondJump(_, _, _, label) = &bb.insts[p.idx] {
            out.push(Point { blk: func.block_of_label(*label), idx: 0 });
        }
        return out;
    }
    match &bb.term {
        Terminator::Jump(l) => vec![Point { blk: func.block_of_label(*l), idx: 0 }],
        Terminator::ReturnVoid | Terminator::ReturnValue(_) => vec![],
        Terminator::Fallthrough => {
            let next = Blk::new(p.blk.index() + 1);
            if next.index() < func.blocks.len() {
                vec![Point { blk: next, idx: 0 }]
            } else {
                vec![]
            }
        }
    }
}

pub fn analyze(func: &Function) -> Liveness {
    let mut order: Vec<Point> = Vec::new();
    let mut index = rustc_hash::FxHashMap::default();
    let mut sets: Vec<PointSets> = Vec::new();

    for (blk, bb) in func.blocks.iter() {
        for idx in 0..=bb.insts.len() {
            let p = Point { blk, idx };
            let (gen, kill) = if idx < bb.insts.len() {
                gen_kill_inst(&bb.insts[idx])
            } else {
                gen_kill_term(&bb.term)
            };
            index.insert(p, order.len());
            order.push(p);
            sets.push(PointSets { gen, kill, inn: FxHashSet::default(), out: FxHashSet::default() });
        }
    }

    // Precompute successors once; they don't change across iterations.
    let succs: Vec<Vec<Point>> = order.iter().map(|p| successors_of(func, *p)).collect();

    let mut changed = true;
    while changed {
        changed = false;
        // Reverse program order, as spec.md §4.1 prescribes.
        for i in (0..order.len()).rev() {
            let mut out = FxHashSet::default();
            for s in &succs[i] {
                out.extend(sets[index[s]].inn.iter().copied());
            }
            let mut inn = sets[i].gen.clone();
            for r in &out {
                if !sets[i].kill.contains(r) {
                    inn.insert(*r);
                }
            }
            if inn != sets[i].inn || out != sets[i].out {
                changed = true;
            }
            sets[i].inn = inn;
            sets[i].out = out;
        }
    }

    Liveness {
        points: order.into_iter().zip(sets).collect(),
        index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Var;
    use crate::l2::ast::*;
    use lnc_entity::{PrimaryMap, SecondaryMap};

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
    fn assign_then_use_keeps_source_live_into_the_assign() {
        let a = Var::new(0);
        let b = Var::new(1);
        let func = one_block_function(
            vec![Instruction::Assign(Reg::Virtual(a), Operand::Reg(Reg::Virtual(b)))],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(a))),
            2,
        );
        let live = analyze(&func);
        let p0 = Point { blk: func.entry, idx: 0 };
        assert!(live.in_at(p0).contains(&Reg::Virtual(b)));
        assert!(!live.out_at(p0).contains(&Reg::Virtual(b)));
        assert!(live.out_at(p0).contains(&Reg::Virtual(a)));
    }

    #[test]
    fn dead_assign_is_not_live_out() {
        let a = Var::new(0);
        let func = one_block_function(
            vec![Instruction::Assign(Reg::Virtual(a), Operand::Num(5))],
            Terminator::ReturnVoid,
            1,
        );
        let live = analyze(&func);
        let p0 = Point { blk: func.entry, idx: 0 };
        assert!(!live.out_at(p0).contains(&Reg::Virtual(a)));
    }

    #[test]
    fn stack_pointer_is_never_live() {
        let a = Var::new(0);
        let func = one_block_function(
            vec![Instruction::Load(Reg::Virtual(a), Reg::Physical(PhysReg::Rsp), 0)],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(a))),
            1,
        );
        let live = analyze(&func);
        let p0 = Point { blk: func.entry, idx: 0 };
        assert!(!live.in_at(p0).contains(&Reg::Physical(PhysReg::Rsp)));
    }
}
