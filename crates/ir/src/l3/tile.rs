//! Maximal munch: turn one (already-expanded) IR instruction into the
//! L2 instruction(s) it tiles to (spec.md §4.6). Each `*Tile` rule below
//! corresponds to one instruction kind; `lower_block` drives them in
//! order over a block's body and then handles its terminator, consulting
//! `super::tree::Forest` for the one cross-instruction fusion this
//! tiler knows about.

use super::tree::Forest;
use crate::common::{ArithOp, CmpOp, Reg, Var};
use crate::ir::{Instruction, Operand, Terminator};
use crate::l2;
use lnc_entity::PrimaryMap;
use lnc_support::registers::PhysReg;
use lnc_support::Location;

pub struct Tiler {
    vars: PrimaryMap<Var, l2::VarInfo>,
}

impl Tiler {
    pub fn new(vars: PrimaryMap<Var, l2::VarInfo>) -> Self {
        Tiler { vars }
    }

    pub fn into_vars(self) -> PrimaryMap<Var, l2::VarInfo> {
        self.vars
    }

    fn fresh(&mut self, hint: &str) -> Var {
        self.vars.push(l2::VarInfo {
            name: format!("_{}{}", hint, self.vars.len()),
        })
    }

    /// `ArithTile` (spec.md §4.6): emit the two-address `dst op= rhs`
    /// sequence `l2::Instruction::Arith` needs, given the three-address
    /// `dst <- lhs op rhs` IR carries. A shift's count must already be a
    /// register by the time it reaches `l2::interference`, which only
    /// special-cases `Arith` whose rhs is a `Reg` — a literal shift count
    /// is therefore materialised here, never left as an immediate.
    fn emit_arith(&mut self, dst: Var, op: ArithOp, lhs: Operand, rhs: Operand, out: &mut Vec<l2::Instruction>) {
        let dst_reg = Reg::Virtual(dst);

        let rhs_operand = if op.is_shift() {
            match rhs {
                Operand::Var(v) => l2::Operand::Reg(Reg::Virtual(v)),
                Operand::Num(n) => {
                    let tmp = self.fresh("shamt");
                    out.push(l2::Instruction::Assign(Reg::Virtual(tmp), l2::Operand::Num(n)));
                    l2::Operand::Reg(Reg::Virtual(tmp))
                }
            }
        } else {
            tile_operand(rhs)
        };

        // `dst op= rhs` clobbers `dst` before `rhs` is read, so if `rhs`
        // happens to alias `dst` its original value must be stashed
        // before anything else touches `dst`.
        let rhs_is_dst = matches!(rhs_operand, l2::Operand::Reg(r) if r == dst_reg);
        let final_rhs = if rhs_is_dst {
            let tmp = self.fresh("stash");
            out.push(l2::Instruction::Assign(Reg::Virtual(tmp), rhs_operand));
            l2::Operand::Reg(Reg::Virtual(tmp))
        } else {
            rhs_operand
        };

        let lhs_operand = tile_operand(lhs);
        let lhs_is_dst = matches!(lhs_operand, l2::Operand::Reg(r) if r == dst_reg);
        if !lhs_is_dst {
            out.push(l2::Instruction::Assign(dst_reg, lhs_operand));
        }

        out.push(l2::Instruction::Arith(dst_reg, op, final_rhs));
    }

    /// `CallTile` (spec.md §4.6): move the first six arguments into the
    /// System V argument registers, and store every argument past that
    /// into its outgoing stack slot at `rsp - 8*k`, `k` counted from 1
    /// for the first argument past the sixth (DESIGN.md).
    fn emit_call_args(&mut self, args: &[Operand], out: &mut Vec<l2::Instruction>) {
        for (i, &a) in args.iter().enumerate() {
            let op = tile_operand(a);
            if i < PhysReg::ARGUMENT.len() {
                out.push(l2::Instruction::Assign(Reg::Physical(PhysReg::ARGUMENT[i]), op));
            } else {
                let k = (i - PhysReg::ARGUMENT.len() + 1) as i64;
                out.push(l2::Instruction::Store(Reg::Physical(PhysReg::Rsp), -8 * k, op));
            }
        }
    }

    /// Every non-fused, non-terminator instruction of an (expanded)
    /// block tiles one-to-one, possibly with setup instructions ahead of
    /// it (`ArithTile`'s moves, `CallTile`'s argument distribution).
    fn emit_inst(&mut self, inst: &Instruction, out: &mut Vec<l2::Instruction>) {
        match inst {
            Instruction::Decl(_) => unreachable!("super::expand already dropped Decl"),
            Instruction::Assign(dst, src) => {
                out.push(l2::Instruction::Assign(Reg::Virtual(*dst), tile_operand(*src)));
            }
            Instruction::BinOp(dst, op, l, r) => self.emit_arith(*dst, *op, *l, *r, out),
            Instruction::Compare(dst, op, l, r) => {
                let (op, l, r) = normalize_cmp(*op, *l, *r);
                out.push(l2::Instruction::Compare(Reg::Virtual(*dst), op, tile_operand(l), tile_operand(r)));
            }
            Instruction::Load(dst, base, indices) => {
                out.push(l2::Instruction::Load(Reg::Virtual(*dst), Reg::Virtual(*base), single_disp(indices)));
            }
            Instruction::Store(base, indices, src) => {
                out.push(l2::Instruction::Store(Reg::Virtual(*base), single_disp(indices), tile_operand(*src)));
            }
            Instruction::Call(callee, args) => {
                self.emit_call_args(args, out);
                out.push(l2::Instruction::Call(*callee, args.len()));
            }
            Instruction::CallAssign(dst, callee, args) => {
                self.emit_call_args(args, out);
                out.push(l2::Instruction::CallAssign(Reg::Virtual(*dst), *callee, args.len()));
            }
            Instruction::ArrayLen(..)
            | Instruction::TupleLen(..)
            | Instruction::NewArray(..)
            | Instruction::NewTuple(..) => {
                unreachable!("super::expand already lowered this into base instruction forms")
            }
        }
    }

    /// Lower one (already-expanded) block, folding `forest`'s fused
    /// `Compare` directly into the `CondJump` its `Branch` tiles to.
    pub fn lower_block(
        &mut self,
        label: crate::common::Lbl,
        insts: &[(Instruction, Location)],
        term: &Terminator,
        falls_through: bool,
        forest: &Forest,
    ) -> l2::BasicBlock {
        let mut out = Vec::with_capacity(insts.len() + 1);
        for (idx, (inst, _loc)) in insts.iter().enumerate() {
            if forest.fused_compare_idx == Some(idx) {
                continue;
            }
            self.emit_inst(inst, &mut out);
        }

        let term_out = match term {
            Terminator::ReturnVoid => l2::Terminator::ReturnVoid,
            Terminator::ReturnValue(v) => l2::Terminator::ReturnValue(tile_operand(*v)),
            Terminator::Jump(target) => {
                if falls_through {
                    l2::Terminator::Fallthrough
                } else {
                    l2::Terminator::Jump(*target)
                }
            }
            Terminator::Branch(cond, true_lbl, false_lbl) => {
                let (op, l, r) = match forest.fused_compare_idx {
                    Some(idx) => match &insts[idx].0 {
                        Instruction::Compare(_, op, l, r) => normalize_cmp(*op, *l, *r),
                        _ => unreachable!("forest marked a non-Compare instruction as fused"),
                    },
                    // Branch condition is an ordinary raw (decoded)
                    // boolean, always exactly 0 or 1 (spec.md §4.8) — so
                    // testing equality with the encoded-true value 1
                    // exactly recovers "condition is true".
                    None => (CmpOp::Eq, Operand::Var(*cond), Operand::Num(1)),
                };
                out.push(l2::Instruction::CondJump(op, tile_operand(l), tile_operand(r), *true_lbl));
                if falls_through {
                    l2::Terminator::Fallthrough
                } else {
                    l2::Terminator::Jump(*false_lbl)
                }
            }
        };

        l2::BasicBlock {
            label,
            insts: out,
            term: term_out,
        }
    }
}

fn tile_operand(o: Operand) -> l2::Operand {
    match o {
        Operand::Num(n) => l2::Operand::Num(n),
        Operand::Var(v) => l2::Operand::Reg(Reg::Virtual(v)),
    }
}

/// `CompareTile` (spec.md §4.6): the target only has `<`, `<=`, `=`
/// natively, so `>=`/`>` are rewritten into `<=`/`<` with their operands
/// swapped (`a > b` iff `b < a`).
fn normalize_cmp(op: CmpOp, l: Operand, r: Operand) -> (CmpOp, Operand, Operand) {
    if op.is_base() {
        (op, l, r)
    } else {
        (op.flip(), r, l)
    }
}

/// `super::expand` always resolves a multi-index access down to a single
/// already-computed address with a literal zero displacement (spec.md
/// §4.6: `LoadTile`/`StoreTile` address at a fixed offset).
fn single_disp(indices: &[Operand]) -> i64 {
    match indices {
        [Operand::Num(0)] => 0,
        other => unreachable!(
            "super::expand should have reduced indices to a single zero displacement, got {:?}",
            other
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lnc_entity::EntityRef;

    fn new_tiler() -> Tiler {
        Tiler::new(PrimaryMap::new())
    }

    #[test]
    fn ge_normalises_to_le_with_swapped_operands() {
        let a = Operand::Var(Var::new(0));
        let b = Operand::Var(Var::new(1));
        let (op, l, r) = normalize_cmp(CmpOp::Ge, a, b);
        assert_eq!(op, CmpOp::Le);
        assert_eq!(l, b);
        assert_eq!(r, a);
    }

    #[test]
    fn lt_is_left_alone() {
        let a = Operand::Var(Var::new(0));
        let b = Operand::Var(Var::new(1));
        let (op, l, r) = normalize_cmp(CmpOp::Lt, a, b);
        assert_eq!(op, CmpOp::Lt);
        assert_eq!(l, a);
        assert_eq!(r, b);
    }

    #[test]
    fn arith_skips_the_setup_move_when_lhs_already_is_dst() {
        let mut t = new_tiler();
        let x = Var::new(0);
        let y = Var::new(1);
        let mut out = Vec::new();
        t.emit_arith(x, ArithOp::Add, Operand::Var(x), Operand::Var(y), &mut out);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], l2::Instruction::Arith(d, ArithOp::Add, _) if d == Reg::Virtual(x)));
    }

    #[test]
    fn arith_stashes_rhs_when_rhs_aliases_dst() {
        let mut t = new_tiler();
        let x = Var::new(0);
        let y = Var::new(1);
        let mut out = Vec::new();
        t.emit_arith(x, ArithOp::Add, Operand::Var(y), Operand::Var(x), &mut out);
        // stash, move(y->x), arith(x += stash)
        assert_eq!(out.len(), 3);
        assert!(matches!(out[2], l2::Instruction::Arith(d, ArithOp::Add, _) if d == Reg::Virtual(x)));
    }

    #[test]
    fn shift_by_literal_materialises_into_a_register() {
        let mut t = new_tiler();
        let x = Var::new(0);
        let mut out = Vec::new();
        t.emit_arith(x, ArithOp::Shl, Operand::Var(x), Operand::Num(3), &mut out);
        assert!(out.iter().any(|i| matches!(i, l2::Instruction::Assign(_, l2::Operand::Num(3)))));
        assert!(matches!(
            out.last().unwrap(),
            l2::Instruction::Arith(_, ArithOp::Shl, l2::Operand::Reg(_))
        ));
    }

    #[test]
    fn call_args_beyond_six_spill_to_stack_slots() {
        let mut t = new_tiler();
        let args: Vec<Operand> = (0..8).map(|n| Operand::Num(n)).collect();
        let mut out = Vec::new();
        t.emit_call_args(&args, &mut out);
        assert_eq!(out.len(), 8);
        assert!(matches!(out[6], l2::Instruction::Store(_, -8, _)));
        assert!(matches!(out[7], l2::Instruction::Store(_, -16, _)));
    }
}
