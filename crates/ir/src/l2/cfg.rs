//! Control flow graph for L2. Unlike LA/IR, a block's terminator gives
//! only *one* explicit edge at most (`Jump`) or none (`ReturnVoid`,
//! `ReturnValue`, `Fallthrough`); a `CondJump` inside the body contributes
//! a second edge to whatever block owns its target label. The graph is
//! still derived rather than hand-maintained (see `ir::cfg`), it just has
//! to look inside the instruction list as well as at the terminator.

use super::ast::{Function, Instruction, Terminator};
use crate::common::Blk;
use lnc_entity::{EntityRef, SecondaryMap};

#[derive(Debug, Clone, Default)]
struct Node {
    preds: Vec<Blk>,
    succs: Vec<Blk>,
}

pub struct ControlFlowGraph {
    data: SecondaryMap<Blk, Node>,
}

impl ControlFlowGraph {
    pub fn compute(func: &Function) -> Self {
        let mut data: SecondaryMap<Blk, Node> = SecondaryMap::new();
        let n = func.blocks.len();
        for (blk, bb) in func.blocks.iter() {
            let mut targets = Vec::new();
            for inst in &bb.insts {
                if let Instruction::CondJump(_, _, _, l) = inst {
                    targets.push(*l);
                }
            }
            targets.extend(bb.term.explicit_targets());
            if matches!(bb.term, Terminator::Fallthrough) && blk.index() + 1 < n {
                targets.push(func.blocks[Blk::new(blk.index() + 1)].label);
            }
            for target_label in targets {
                let target = func.block_of_label(target_label);
                data[blk].succs.push(target);
                data[target].preds.push(blk);
            }
        }
        Self { data }
    }

    pub fn successors(&self, blk: Blk) -> &[Blk] {
        &self.data[blk].succs
    }

    pub fn predecessors(&self, blk: Blk) -> &[Blk] {
        &self.data[blk].preds
    }
}
