//! L1's data model: L2 with every virtual variable replaced by the
//! physical register the allocator assigned it (spec.md §4.3). There is
//! no `Var` left anywhere in this tree — every operand is either a
//! literal or one of the sixteen x86-64 general-purpose registers — which
//! is exactly what makes `l12s`'s lowering to assembly text trivial
//! (SPEC_FULL.md §13: "the substance of L1 -> assembly lowering... not
//! formatting/linking polish").
//!
//! Shape otherwise mirrors `l2::ast` instruction-for-instruction: the
//! allocator only ever rewrites *which register* an operand names, never
//! the instruction it appears in (spec.md §4.3's contract is "an
//! assignment `Variable -> PhysicalRegister`", nothing about restructuring
//! the program).

use crate::common::{ArithOp, Blk, Callee, CmpOp, Lbl};
use lnc_entity::{PrimaryMap, SecondaryMap};
use lnc_support::registers::PhysReg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Num(i64),
    Reg(PhysReg),
}

impl Operand {
    pub fn as_reg(self) -> Option<PhysReg> {
        match self {
            Operand::Reg(r) => Some(r),
            Operand::Num(_) => None,
        }
    }
}

/// Non-terminating instructions, identical in shape to `l2::Instruction`
/// with `Reg` narrowed to `PhysReg` (spec.md §9: `CondJump` still does not
/// end its block here — only its true edge is explicit).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Assign(PhysReg, Operand),
    Arith(PhysReg, ArithOp, Operand),
    Compare(PhysReg, CmpOp, Operand, Operand),
    Load(PhysReg, PhysReg, i64),
    Store(PhysReg, i64, Operand),
    Call(Callee, usize),
    CallAssign(PhysReg, Callee, usize),
    CondJump(CmpOp, Operand, Operand, Lbl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    ReturnVoid,
    ReturnValue(Operand),
    Jump(Lbl),
    /// Control falls to the next block in arena order without an explicit
    /// jump — either because the IR trace scheduler already placed it
    /// there (spec.md §4.9), or because `l22l1` never needed a jump for a
    /// block that was already adjacent in `L2`.
    Fallthrough,
}

impl Terminator {
    pub fn explicit_targets(&self) -> Vec<Lbl> {
        match self {
            Terminator::ReturnVoid | Terminator::ReturnValue(_) | Terminator::Fallthrough => vec![],
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
pub struct Function {
    pub name: String,
    /// The System V argument registers actually bound to this function's
    /// parameters, in declaration order (at most six — spec.md §4.6 never
    /// lets a seventh parameter reach a register). Carried only for `-v`
    /// dumps and `l12s`'s prologue; the body never needs to consult it,
    /// since every parameter reference was already rewritten to its
    /// register by `l1::lower`.
    pub param_regs: Vec<PhysReg>,
    pub returns_value: bool,
    pub label_names: SecondaryMap<Lbl, String>,
    pub blocks: PrimaryMap<Blk, BasicBlock>,
    pub entry: Blk,
    pub label_block: SecondaryMap<Lbl, Option<Blk>>,
    /// The lowest (most negative) `rsp`-relative displacement this
    /// function's body addresses — outgoing call-argument slots and spill
    /// slots alike (`l2::regalloc::SpillInfo`) — so `l12s` knows how much
    /// stack space the prologue must reserve.
    pub frame_size: u32,
}

impl Function {
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
