//! Interference graph construction (spec.md §4.2): an undirected graph on
//! `variables ∪ physical registers` whose edges say "these two may never
//! share a register."

use super::ast::{Function, Instruction};
use super::liveness::Liveness;
use crate::common::Reg;
use lnc_support::registers::PhysReg;
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Default, Clone)]
pub struct InterferenceGraph {
    adj: FxHashMap<Reg, FxHashSet<Reg>>,
}

impl InterferenceGraph {
    pub fn neighbors(&self, r: Reg) -> impl Iterator<Item = Reg> + '_ {
        self.adj.get(&r).into_iter().flatten().copied()
    }

    pub fn degree(&self, r: Reg) -> usize {
        self.adj.get(&r).map(|s| s.len()).unwrap_or(0)
    }

    pub fn interferes(&self, a: Reg, b: Reg) -> bool {
        self.adj.get(&a).is_some_and(|s| s.contains(&b))
    }

    pub fn nodes(&self) -> impl Iterator<Item = Reg> + '_ {
        self.adj.keys().copied()
    }

    fn ensure(&mut self, r: Reg) {
        self.adj.entry(r).or_default();
    }

    /// Self-edges are never inserted (spec.md §4.2).
    fn add_edge(&mut self, a: Reg, b: Reg) {
        if a == b {
            return;
        }
        self.adj.entry(a).or_default().insert(b);
        self.adj.entry(b).or_default().insert(a);
    }

    fn add_clique<'a>(&mut self, members: impl IntoIterator<Item = &'a Reg>) {
        let members: Vec<Reg> = members.into_iter().copied().collect();
        for (i, &a) in members.iter().enumerate() {
            self.ensure(a);
            for &b in &members[i + 1..] {
                self.add_edge(a, b);
            }
        }
    }

    /// Remove a node entirely (used by the colourer's simplify phase,
    /// spec.md §4.3 step 3b, to pop low-degree nodes off the graph).
    pub fn remove(&mut self, r: Reg) {
        if let Some(ns) = self.adj.remove(&r) {
            for n in ns {
                if let Some(set) = self.adj.get_mut(&n) {
                    set.remove(&r);
                }
            }
        }
    }
}

/// Build the interference graph for `func` from its liveness result.
/// Keeping this a separate pass over `liveness`'s output (rather than
/// folding edge insertion into the liveness fixpoint itself) mirrors
/// spec.md's own component table, which treats the two as separate
/// analysers with separate effort shares.
pub fn build(func: &Function, live: &Liveness) -> InterferenceGraph {
    let mut g = InterferenceGraph::default();

    // Registers are mutually distinct (spec.md §4.2: "clique over all
    // general-purpose registers").
    let allocatable: Vec<Reg> = PhysReg::ALLOCATABLE.iter().map(|r| Reg::Physical(*r)).collect();
    g.add_clique(&allocatable);

    for p in live.points() {
        g.add_clique(live.in_at(p));
        g.add_clique(live.out_at(p));
        let kill = live.kill_at(p);
        let out = live.out_at(p);
        for &k in kill {
            g.ensure(k);
            for &o in out {
                if !kill.contains(&o) {
                    g.add_edge(k, o);
                }
            }
        }
    }

    // Shift-by-variable: pin the shift amount to the shift-count register
    // by making it interfere with every other general-purpose register
    // (spec.md §4.2, §4.6).
    for (_, bb) in func.blocks.iter() {
        for inst in &bb.insts {
            if let Instruction::Arith(_, op, super::ast::Operand::Reg(amount)) = inst {
                if op.is_shift() {
                    g.ensure(*amount);
                    for r in PhysReg::ALLOCATABLE {
                        if r != PhysReg::SHIFT_COUNT {
                            g.add_edge(*amount, Reg::Physical(r));
                        }
                    }
                }
            }
        }
    }

    g
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Var;
    use crate::l2::ast::*;
    use crate::l2::liveness;
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
    fn simultaneously_live_vars_interfere() {
        let a = Var::new(0);
        let b = Var::new(1);
        let c = Var::new(2);
        // c <- a + b: a and b are both live into this instruction, so
        // they must interfere; c and a/b do not (a, b die here).
        let func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(c), Operand::Reg(Reg::Virtual(a))),
                Instruction::Arith(Reg::Virtual(c), crate::common::ArithOp::Add, Operand::Reg(Reg::Virtual(b))),
            ],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(c))),
            3,
        );
        let live = liveness::analyze(&func);
        let g = build(&func, &live);
        assert!(g.interferes(Reg::Virtual(a), Reg::Virtual(b)));
    }

    #[test]
    fn shift_amount_interferes_with_all_but_shift_count_register() {
        let amount = Var::new(0);
        let dst = Var::new(1);
        let func = one_block_function(
            vec![Instruction::Arith(
                Reg::Virtual(dst),
                crate::common::ArithOp::Shl,
                Operand::Reg(Reg::Virtual(amount)),
            )],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(dst))),
            2,
        );
        let live = liveness::analyze(&func);
        let g = build(&func, &live);
        assert!(g.interferes(Reg::Virtual(amount), Reg::Physical(PhysReg::Rax)));
        assert!(!g.interferes(Reg::Virtual(amount), Reg::Physical(PhysReg::SHIFT_COUNT)));
    }

    #[test]
    fn no_self_edges() {
        let a = Var::new(0);
        let func = one_block_function(
            vec![Instruction::Assign(Reg::Virtual(a), Operand::Num(1))],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(a))),
            1,
        );
        let live = liveness::analyze(&func);
        let g = build(&func, &live);
        assert!(!g.interferes(Reg::Virtual(a), Reg::Virtual(a)));
    }
}
