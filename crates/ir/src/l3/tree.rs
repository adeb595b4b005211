//! The expression-tree half of the tiler (spec.md §4.5): decide, for
//! each block, which instruction boundaries maximal munch is allowed to
//! cross.
//!
//! L2's instruction set is already two-address and already
//! single-displacement-addressed, so almost nothing upstream of it tiles
//! as more than "one IR instruction becomes one L2 instruction plus
//! maybe a setup move" (see `super::tile`). The one shape actually worth
//! recognising here is a `Compare` that feeds a `Branch` immediately
//! following it and nowhere else: fusing the two saves materialising the
//! boolean into a register at all, the same way a real `cmp`/`jcc` pair
//! never stores its flag to memory. Every other instruction kind is tiled
//! purely locally by `super::tile`, so this module's "forest" is really
//! just that one fusion bit per block.

use crate::common::Var;
use crate::ir::{Function, Instruction, Operand, Terminator};
use lnc_support::Location;
use rustc_hash::FxHashMap;

/// How many operand-position reads each variable has across the whole
/// function. A `Compare` may fuse into its block's terminator only when
/// its result is read exactly once — by the `Branch` itself — since
/// fusing drops the separate instruction that would otherwise have made
/// the value available to any other reader.
pub fn count_uses(func: &Function) -> FxHashMap<Var, u32> {
    let mut uses: FxHashMap<Var, u32> = FxHashMap::default();
    let mut bump = |o: &Operand, uses: &mut FxHashMap<Var, u32>| {
        if let Operand::Var(v) = o {
            *uses.entry(*v).or_insert(0) += 1;
        }
    };
    let bump_var = |v: &Var, uses: &mut FxHashMap<Var, u32>| {
        *uses.entry(*v).or_insert(0) += 1;
    };

    for (_, bb) in func.blocks.iter() {
        for (inst, _) in &bb.insts {
            match inst {
                Instruction::Decl(_) => {}
                Instruction::Assign(_, s) => bump(s, &mut uses),
                Instruction::BinOp(_, _, l, r) | Instruction::Compare(_, _, l, r) => {
                    bump(l, &mut uses);
                    bump(r, &mut uses);
                }
                Instruction::Load(_, base, idx) => {
                    bump_var(base, &mut uses);
                    for i in idx {
                        bump(i, &mut uses);
                    }
                }
                Instruction::Store(base, idx, v) => {
                    bump_var(base, &mut uses);
                    for i in idx {
                        bump(i, &mut uses);
                    }
                    bump(v, &mut uses);
                }
                Instruction::ArrayLen(_, base, dim) => {
                    bump_var(base, &mut uses);
                    bump(dim, &mut uses);
                }
                Instruction::TupleLen(_, base) => bump_var(base, &mut uses),
                Instruction::NewArray(_, dims) => {
                    for d in dims {
                        bump(d, &mut uses);
                    }
                }
                Instruction::NewTuple(_, c) => bump(c, &mut uses),
                Instruction::Call(_, args) => {
                    for a in args {
                        bump(a, &mut uses);
                    }
                }
                Instruction::CallAssign(_, _, args) => {
                    for a in args {
                        bump(a, &mut uses);
                    }
                }
            }
        }
        match &bb.term {
            Terminator::ReturnValue(v) => bump(v, &mut uses),
            Terminator::Branch(v, _, _) => bump_var(v, &mut uses),
            Terminator::ReturnVoid | Terminator::Jump(_) => {}
        }
    }
    uses
}

/// The one cross-instruction tiling decision made for a block: whether
/// its last instruction is a `Compare` that fuses directly into the
/// block's own `Branch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forest {
    pub fused_compare_idx: Option<usize>,
}

/// Decide `fused_compare_idx` for one block. Only the block's *last*
/// instruction is ever a fusion candidate: a `Branch` reads its condition
/// immediately, so anything computed earlier than the last instruction
/// is, by definition, not "immediately preceding" it.
pub fn build_block_forest(
    insts: &[(Instruction, Location)],
    term: &Terminator,
    uses: &FxHashMap<Var, u32>,
) -> Forest {
    let fused_compare_idx = match term {
        Terminator::Branch(cond, _, _) => insts.last().and_then(|(inst, _)| match inst {
            Instruction::Compare(dst, _, _, _)
                if dst == cond && uses.get(dst).copied().unwrap_or(0) == 1 =>
            {
                Some(insts.len() - 1)
            }
            _ => None,
        }),
        _ => None,
    };
    Forest { fused_compare_idx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ArithOp, Blk, CmpOp, Lbl};
    use crate::ir::{BasicBlock, VarInfo};
    use lnc_entity::{EntityRef, PrimaryMap, SecondaryMap};

    fn test_function(insts: Vec<(Instruction, Location)>, term: Terminator) -> Function {
        let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
        vars.push(VarInfo { name: "a".into() });
        vars.push(VarInfo { name: "b".into() });
        vars.push(VarInfo { name: "cond".into() });
        let mut labels: PrimaryMap<Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let t_label = labels.push(());
        let f_label = labels.push(());
        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
        let entry = blocks.push(BasicBlock {
            label: entry_label,
            insts,
            term,
            falls_through: false,
        });
        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        let _ = (t_label, f_label);
        Function {
            name: "f".into(),
            params: vec![],
            returns_value: true,
            vars,
            label_names: SecondaryMap::new(),
            blocks,
            entry,
            label_block,
        }
    }

    #[test]
    fn single_use_compare_fuses_into_its_branch() {
        let a = Var::new(0);
        let b = Var::new(1);
        let cond = Var::new(2);
        let t = Lbl::new(1);
        let fl = Lbl::new(2);
        let insts = vec![(
            Instruction::Compare(cond, CmpOp::Lt, Operand::Var(a), Operand::Var(b)),
            Location::default(),
        )];
        let term = Terminator::Branch(cond, t, fl);
        let func = test_function(insts.clone(), term.clone());
        let uses = count_uses(&func);
        let forest = build_block_forest(&insts, &term, &uses);
        assert_eq!(forest.fused_compare_idx, Some(0));
    }

    #[test]
    fn compare_reused_elsewhere_does_not_fuse() {
        let a = Var::new(0);
        let b = Var::new(1);
        let cond = Var::new(2);
        let t = Lbl::new(1);
        let fl = Lbl::new(2);
        let insts = vec![
            (
                Instruction::Compare(cond, CmpOp::Lt, Operand::Var(a), Operand::Var(b)),
                Location::default(),
            ),
            (
                Instruction::BinOp(a, ArithOp::Add, Operand::Var(cond), Operand::Num(1)),
                Location::default(),
            ),
        ];
        let term = Terminator::Branch(cond, t, fl);
        let func = test_function(insts.clone(), term.clone());
        let uses = count_uses(&func);
        let forest = build_block_forest(&insts, &term, &uses);
        assert_eq!(forest.fused_compare_idx, None);
    }

    #[test]
    fn jump_terminator_never_fuses() {
        let a = Var::new(0);
        let l = Lbl::new(1);
        let insts = vec![(Instruction::Assign(a, Operand::Num(1)), Location::default())];
        let term = Terminator::Jump(l);
        let func = test_function(insts.clone(), term.clone());
        let uses = count_uses(&func);
        let forest = build_block_forest(&insts, &term, &uses);
        assert_eq!(forest.fused_compare_idx, None);
    }
}
