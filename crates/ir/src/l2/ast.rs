//! L2's data model: the tiler's target language. Every operand is either
//! a not-yet-allocated virtual variable or a physical register
//! (`crate::common::Reg`); every instruction is already in the
//! two-address, base+displacement-addressed shape the register allocator
//! and, eventually, the target ISA expect (spec.md §4.6).
//!
//! Unlike LA/IR, a conditional branch here does *not* end its block: only
//! its true edge is explicit (`cjump`), and control falls through to the
//! next instruction when the test fails, exactly as a real `cmp`/`jcc`
//! pair behaves. A block's [`Terminator`] therefore only ever needs an
//! *unconditional* shape — jump, return, or an implicit fall to the next
//! block in arena order — which is also why `Terminator` here is, once
//! again, its own enum rather than one shared with LA/IR/L3 (spec.md §9).

use crate::common::{ArithOp, Blk, Callee, CmpOp, Lbl, Reg};
use lnc_entity::{PrimaryMap, SecondaryMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Num(i64),
    Reg(Reg),
}

impl Operand {
    pub fn as_reg(self) -> Option<Reg> {
        match self {
            Operand::Reg(r) => Some(r),
            Operand::Num(_) => None,
        }
    }
}

/// A non-terminating instruction. `CondJump` lives here, not in
/// [`Terminator`]: execution continues past it when the comparison is
/// false (spec.md §4.6's `cjump cond = 1 label` convention, generalised to
/// any of the three base comparisons `CompareTile` can normalise down to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `dst <- src`.
    Assign(Reg, Operand),
    /// `dst <- dst op rhs` — two-address arithmetic. `ArithTile` (spec.md
    /// §4.6) guarantees `dst` already holds the left operand's value by
    /// construction (stashing or pre-moving as needed), so this variant
    /// never carries a separate left operand.
    Arith(Reg, ArithOp, Operand),
    /// `dst <- lhs op rhs`, `op` always one of `<`, `<=`, `=` (the target's
    /// three native comparisons; `CompareTile` normalises `>=`/`>` before
    /// reaching this point).
    Compare(Reg, CmpOp, Operand, Operand),
    /// `dst <- mem[base + disp]`.
    Load(Reg, Reg, i64),
    /// `mem[base + disp] <- src`.
    Store(Reg, i64, Operand),
    /// `call callee, argc` — arguments have already been distributed into
    /// the argument registers / outgoing stack slots by preceding
    /// instructions (spec.md §4.6's `CallTile`); `argc` is carried only so
    /// the printer can show it and the interference pass knows how many
    /// stack-passed slots of "red zone" the call clobbers.
    Call(Callee, usize),
    /// `dst <- call callee, argc` (`CallAssignTile`: `CallTile` plus a
    /// post-move from the return-value register).
    CallAssign(Reg, Callee, usize),
    /// `cjump lhs op rhs, label` — jump to `label` if the comparison
    /// holds; otherwise fall through to the next instruction.
    CondJump(CmpOp, Operand, Operand, Lbl),
}

/// Always exactly one per block, always unconditional control transfer
/// (spec.md §3: "a block has exactly one terminator").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    ReturnVoid,
    ReturnValue(Operand),
    Jump(Lbl),
    /// No explicit jump was emitted: control reaches this point and simply
    /// continues into the next block in arena order. Produced when the
    /// IR trace scheduler (spec.md §4.9) already placed this block's
    /// successor immediately after it.
    Fallthrough,
}

impl Terminator {
    /// Labels this terminator can transfer to directly (not counting an
    /// implicit `Fallthrough`, which has no label to report — callers that
    /// need the fallthrough edge consult block adjacency instead).
    pub fn explicit_targets(&self) -> Vec<Lbl> {
        match self {
            Terminator::ReturnVoid | Terminator::ReturnValue(_) | Terminator::Fallthrough => {
                vec![]
            }
            Terminator::Jump(l) => vec![*l],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Lbl,
    pub insts: Vec<Instruction>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    /// Parameters, still ordinary virtual variables in the instruction
    /// stream (the tiler never special-cases them). The allocator
    /// pre-colours the first six to the System V argument registers
    /// before running simplify/select (spec.md §4.3: "the
    /// parameter-passing registers are pre-coloured").
    pub params: Vec<crate::common::Var>,
    pub returns_value: bool,
    pub vars: PrimaryMap<crate::common::Var, VarInfo>,
    pub label_names: SecondaryMap<Lbl, String>,
    pub blocks: PrimaryMap<Blk, BasicBlock>,
    pub entry: Blk,
    pub label_block: SecondaryMap<Lbl, Option<Blk>>,
    /// The name-generator state inherited from earlier passes, continued
    /// here so spill-introduced variables (spec.md §4.3 step 1) never
    /// collide with a name already in use.
    pub next_var_suffix: u32,
}

impl Function {
    pub fn var_name(&self, v: crate::common::Var) -> &str {
        &self.vars[v].name
    }

    pub fn block_of_label(&self, l: Lbl) -> Blk {
        self.label_block[l].expect("unresolved label reference")
    }

    pub fn blocks_in_order(&self) -> impl Iterator<Item = (Blk, &BasicBlock)> {
        self.blocks.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}
