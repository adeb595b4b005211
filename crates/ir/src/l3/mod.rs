//! L3: the in-memory three-address view built and consumed entirely
//! inside the `ir2l2` pass (spec.md §0) — never its own textual file, per
//! SPEC_FULL.md §14's resolution of that open question. `lower_function`
//! is the single entry point `ir2l2` calls, composing the three pieces
//! below exactly the way `la::lower::lower_program` composes `lb::lower`'s
//! output into `IR`:
//!
//! 1. [`expand`] rewrites structural/memory instructions (`ArrayLen`,
//!    `NewArray`, multi-index `Load`/`Store`, ...) down to the base
//!    three-address forms.
//! 2. [`tree`] decides, per block, the one cross-instruction fusion this
//!    tiler recognises (a `Compare` feeding its block's own `Branch`).
//! 3. [`tile`] performs the actual maximal munch, instruction by
//!    instruction, consulting that fusion decision.
//!
//! `lower_function` expects `f` to already be scheduled (`ir::trace::
//! schedule` must have run and set `falls_through` on every block):
//! scheduling is a property of the whole function's block order, which
//! this module has no reason to recompute once per lowering.

mod expand;
mod tile;
mod tree;

use crate::common::{Blk, Lbl, Var};
use crate::ir;
use crate::l2;
use lnc_entity::{EntityRef, PrimaryMap, SecondaryMap};
use tile::Tiler;

pub fn lower_program(prog: &ir::Program) -> l2::Program {
    l2::Program {
        functions: prog.functions.iter().map(lower_function).collect(),
    }
}

pub fn lower_function(f: &ir::Function) -> l2::Function {
    let expanded = expand::expand_function(f);
    let uses = tree::count_uses(&expanded);

    let mut vars: PrimaryMap<Var, l2::VarInfo> = PrimaryMap::new();
    for (_, info) in expanded.vars.iter() {
        vars.push(l2::VarInfo { name: info.name.clone() });
    }
    let mut tiler = Tiler::new(vars);

    // `expand::expand_function` never adds, removes, or reorders blocks —
    // only lengthens their instruction lists in place — so each block's
    // `Blk` index here is the same one `expanded.label_block` and
    // `expanded.entry` already point at; nothing needs remapping.
    let mut blocks: PrimaryMap<Blk, l2::BasicBlock> = PrimaryMap::new();
    for (_, bb) in expanded.blocks.iter() {
        let forest = tree::build_block_forest(&bb.insts, &bb.term, &uses);
        blocks.push(tiler.lower_block(bb.label, &bb.insts, &bb.term, bb.falls_through, &forest));
    }

    let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
    for i in 0..expanded.label_block.len() {
        let l = Lbl::new(i);
        label_block[l] = expanded.label_block[l];
    }

    l2::Function {
        name: expanded.name,
        params: expanded.params,
        returns_value: expanded.returns_value,
        vars: tiler.into_vars(),
        label_names: expanded.label_names,
        blocks,
        entry: expanded.entry,
        label_block,
        next_var_suffix: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ArithOp, CmpOp};
    use crate::ir::{BasicBlock, Instruction, Operand, Terminator, VarInfo};
    use lnc_support::Location;

    fn two_block_branch_function() -> ir::Function {
        let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
        let a = vars.push(VarInfo { name: "a".into() });
        let b = vars.push(VarInfo { name: "b".into() });
        let cond = vars.push(VarInfo { name: "cond".into() });

        let mut labels: PrimaryMap<Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let t_label = labels.push(());
        let f_label = labels.push(());

        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
        let entry = blocks.push(BasicBlock {
            label: entry_label,
            insts: vec![(
                Instruction::Compare(cond, CmpOp::Lt, Operand::Var(a), Operand::Var(b)),
                Location::default(),
            )],
            term: Terminator::Branch(cond, t_label, f_label),
            falls_through: true,
        });
        let t_blk = blocks.push(BasicBlock {
            label: t_label,
            insts: vec![],
            term: Terminator::ReturnValue(Operand::Var(a)),
            falls_through: false,
        });
        let f_blk = blocks.push(BasicBlock {
            label: f_label,
            insts: vec![],
            term: Terminator::ReturnValue(Operand::Var(b)),
            falls_through: false,
        });

        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        label_block[t_label] = Some(t_blk);
        label_block[f_label] = Some(f_blk);

        ir::Function {
            name: "branch".into(),
            params: vec![a, b],
            returns_value: true,
            vars,
            label_names: SecondaryMap::new(),
            blocks,
            entry,
            label_block,
        }
    }

    #[test]
    fn fused_compare_branch_becomes_a_single_condjump() {
        let f = two_block_branch_function();
        let lowered = lower_function(&f);
        let entry = &lowered.blocks[lowered.entry];
        assert_eq!(entry.insts.len(), 1);
        assert!(matches!(entry.insts[0], l2::Instruction::CondJump(CmpOp::Lt, ..)));
        // The entry block's Branch had its false edge fall through.
        assert_eq!(entry.term, l2::Terminator::Fallthrough);
    }

    #[test]
    fn arith_tiling_survives_a_full_function_lowering() {
        let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
        let x = vars.push(VarInfo { name: "x".into() });
        let y = vars.push(VarInfo { name: "y".into() });
        let z = vars.push(VarInfo { name: "z".into() });
        let mut labels: PrimaryMap<Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
        let entry = blocks.push(BasicBlock {
            label: entry_label,
            insts: vec![
                (
                    Instruction::BinOp(z, ArithOp::Add, Operand::Var(x), Operand::Var(y)),
                    Location::default(),
                ),
                (
                    Instruction::BinOp(z, ArithOp::Mul, Operand::Var(z), Operand::Num(2)),
                    Location::default(),
                ),
            ],
            term: Terminator::ReturnValue(Operand::Var(z)),
            falls_through: false,
        });
        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        let f = ir::Function {
            name: "arith".into(),
            params: vec![x, y],
            returns_value: true,
            vars,
            label_names: SecondaryMap::new(),
            blocks,
            entry,
            label_block,
        };

        let lowered = lower_function(&f);
        let bb = &lowered.blocks[lowered.entry];
        // `z <- x + y` needs a setup move (z is fresh); `z <- z * 2` does
        // not, since z already holds the left operand.
        assert_eq!(bb.insts.len(), 3);
        assert!(matches!(bb.insts[2], l2::Instruction::Arith(_, ArithOp::Mul, _)));
    }
}
