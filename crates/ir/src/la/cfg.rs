//! A control flow graph computed from an LA function's terminators.
//!
//! Grounded in `cranelift-codegen::flowgraph::ControlFlowGraph`: rather
//! than maintaining predecessor/successor sets by hand as blocks are
//! edited, the graph is (re)computed from each block's terminator. This
//! makes the invariant from spec.md §3 — "successors are exactly the
//! terminator's jump targets; predecessors are consistent with all other
//! blocks' successors" — true by construction instead of by bookkeeping
//! discipline.

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::la::*;
    use lnc_entity::{EntityRef, PrimaryMap};

    fn empty_function() -> Function {
        Function {
            name: "f".into(),
            params: vec![],
            ret: crate::common::Type::Void,
            vars: PrimaryMap::new(),
            label_names: SecondaryMap::new(),
            blocks: PrimaryMap::new(),
            entry: crate::common::Blk::new(0),
            label_block: SecondaryMap::new(),
        }
    }

    #[test]
    fn diamond_edges() {
        let mut f = empty_function();
        let mut labels: PrimaryMap<crate::common::Lbl, ()> = PrimaryMap::new();
        let la = labels.push(());
        let lb_ = labels.push(());
        let lc = labels.push(());
        let ld = labels.push(());

        let a = f.blocks.push(BasicBlock {
            label: la,
            insts: vec![],
            term: Terminator::Jump(lb_),
        });
        f.label_block[la] = Some(a);
        let b = f.blocks.push(BasicBlock {
            label: lb_,
            insts: vec![],
            term: Terminator::Jump(ld),
        });
        f.label_block[lb_] = Some(b);
        let c = f.blocks.push(BasicBlock {
            label: lc,
            insts: vec![],
            term: Terminator::Jump(ld),
        });
        f.label_block[lc] = Some(c);
        let d = f.blocks.push(BasicBlock {
            label: ld,
            insts: vec![],
            term: Terminator::ReturnVoid,
        });
        f.label_block[ld] = Some(d);
        f.entry = a;

        let cfg = ControlFlowGraph::compute(&f);
        assert_eq!(cfg.successors(a), &[b]);
        assert_eq!(cfg.predecessors(d), &[b]);
        assert!(cfg.successors(d).is_empty());
        let _ = c; // unreachable in this tiny graph, present only for shape
    }
}
