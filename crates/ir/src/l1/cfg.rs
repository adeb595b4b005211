//! Control flow graph for L1. Identical in shape to `l2::cfg`: a
//! `CondJump` inside a block's body contributes a second edge beyond
//! whatever the terminator gives explicitly, and a `Fallthrough`
//! terminator's implicit edge goes to the next block in arena order.

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
