//! Control flow graph for IR, computed the same way as LA's (see
//! `la::cfg`): derived from terminators rather than hand-maintained, so
//! it stays correct across the trace scheduler's in-place reordering of
//! `Function::blocks` (spec.md §3, §4.9).

use super::ast::Function;
use crate::common::Blk;
use lnc_entity::SecondaryMap;

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
        for (blk, bb) in func.blocks.iter() {
            for target_label in bb.term.targets() {
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
