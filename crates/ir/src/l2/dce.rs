//! Dead-code elimination (spec.md §4.4): removes instructions whose only
//! effect is a write nothing reads afterward. Run to fixpoint after every
//! spill-rewrite iteration, so stale moves the spiller introduced are
//! cleaned before the next liveness recomputation (spec.md §4.3 step 3f
//! looping back to 3a; SPEC_FULL.md §5).

use super::ast::{Function, Instruction, Operand};
use super::liveness;
use crate::common::Reg;

fn is_self_move(inst: &Instruction) -> bool {
    matches!(inst, Instruction::Assign(dst, Operand::Reg(src)) if dst == src)
}

/// Whether `inst`'s write is the instruction's *sole* observable effect,
/// i.e. it is eligible for removal at all once we know its destination
/// isn't live-out. Calls, stores, branches, and (by construction — they
/// have no destination) returns, labels are always retained per spec.md
/// §4.4.
fn dest_of(inst: &Instruction) -> Option<Reg> {
    match inst {
        Instruction::Assign(d, _) | Instruction::Arith(d, _, _) | Instruction::Compare(d, _, _, _) => Some(*d),
        Instruction::Load(d, _, _) => Some(*d),
        Instruction::Store(..) | Instruction::Call(..) | Instruction::CallAssign(..) | Instruction::CondJump(..) => {
            None
        }
    }
}

pub fn eliminate(func: &mut Function) {
    loop {
        let live = liveness::analyze(func);
        let mut changed = false;
        for (blk, bb) in func.blocks.iter_mut() {
            let mut kept = Vec::with_capacity(bb.insts.len());
            for (idx, inst) in bb.insts.drain(..).enumerate() {
                if is_self_move(&inst) {
                    changed = true;
                    continue;
                }
                let removable = match dest_of(&inst) {
                    None => false,
                    Some(d) => {
                        let p = liveness::Point { blk, idx };
                        !live.out_at(p).contains(&d)
                    }
                };
                if removable {
                    changed = true;
                } else {
                    kept.push(inst);
                }
            }
            bb.insts = kept;
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ArithOp, Var};
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
    fn dead_assign_is_removed() {
        let a = Var::new(0);
        let b = Var::new(1);
        let mut func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(a), Operand::Num(1)),
                Instruction::Assign(Reg::Virtual(b), Operand::Num(2)),
            ],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(b))),
            2,
        );
        eliminate(&mut func);
        assert_eq!(func.blocks[func.entry].insts.len(), 1);
    }

    #[test]
    fn self_move_is_always_removed() {
        let a = Var::new(0);
        let mut func = one_block_function(
            vec![Instruction::Assign(Reg::Virtual(a), Operand::Reg(Reg::Virtual(a)))],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(a))),
            1,
        );
        eliminate(&mut func);
        assert!(func.blocks[func.entry].insts.is_empty());
    }

    #[test]
    fn store_is_never_removed() {
        let a = Var::new(0);
        let mut func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(a), Operand::Num(1)),
                Instruction::Store(Reg::Virtual(a), 0, Operand::Num(9)),
            ],
            Terminator::ReturnVoid,
            1,
        );
        eliminate(&mut func);
        assert_eq!(func.blocks[func.entry].insts.len(), 2);
    }

    #[test]
    fn call_is_never_removed_even_if_result_unused() {
        let a = Var::new(0);
        let mut func = one_block_function(
            vec![Instruction::CallAssign(
                Reg::Virtual(a),
                crate::common::Callee::Runtime(lnc_support::runtime::RuntimeFn::Input),
                0,
            )],
            Terminator::ReturnVoid,
            1,
        );
        eliminate(&mut func);
        assert_eq!(func.blocks[func.entry].insts.len(), 1);
    }

    #[test]
    fn dead_arith_still_leaves_live_chain() {
        let a = Var::new(0);
        let b = Var::new(1);
        let mut func = one_block_function(
            vec![
                Instruction::Assign(Reg::Virtual(a), Operand::Num(1)),
                Instruction::Arith(Reg::Virtual(a), ArithOp::Add, Operand::Reg(Reg::Virtual(b))),
            ],
            Terminator::ReturnValue(Operand::Reg(Reg::Virtual(a))),
            2,
        );
        eliminate(&mut func);
        assert_eq!(func.blocks[func.entry].insts.len(), 2);
    }
}
