//! IR's data model: LA with every value now a tagged machine word
//! (spec.md §4.8). There is no longer a `Type` on anything — the only
//! distinction a value carries is structural (its low bit), and that
//! distinction is already baked into the instruction sequence itself
//! (every arithmetic operand was decoded, every result re-encoded, by the
//! `la::lower` pass that produced this tree) rather than recorded on the
//! variable. Terminators remain two-target (spec.md §9): IR is still
//! "upstream" of the single-target `L3`/`L2`/`L1` levels.

use crate::common::{ArithOp, Blk, Callee, CmpOp, Lbl, Var};
use lnc_entity::{PrimaryMap, SecondaryMap};
use lnc_support::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Num(i64),
    Var(Var),
}

impl Operand {
    pub fn as_var(self) -> Option<Var> {
        match self {
            Operand::Var(v) => Some(v),
            Operand::Num(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Decl(Var),
    Assign(Var, Operand),
    BinOp(Var, ArithOp, Operand, Operand),
    Compare(Var, CmpOp, Operand, Operand),
    Load(Var, Var, Vec<Operand>),
    Store(Var, Vec<Operand>, Operand),
    ArrayLen(Var, Var, Operand),
    TupleLen(Var, Var),
    NewArray(Var, Vec<Operand>),
    NewTuple(Var, Operand),
    Call(Callee, Vec<Operand>),
    CallAssign(Var, Callee, Vec<Operand>),
}

/// Two-target conditional branch, shared in shape with LA (spec.md §9
/// forbids sharing the *variant* across ILs, not the shape — each level
/// defines its own `Terminator` enum, as this one does).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    ReturnVoid,
    ReturnValue(Operand),
    Jump(Lbl),
    Branch(Var, Lbl, Lbl),
}

impl Terminator {
    pub fn targets(&self) -> Vec<Lbl> {
        match self {
            Terminator::ReturnVoid | Terminator::ReturnValue(_) => vec![],
            Terminator::Jump(l) => vec![*l],
            Terminator::Branch(_, t, f) => vec![*t, *f],
        }
    }

    pub fn targets_mut(&mut self) -> Vec<&mut Lbl> {
        match self {
            Terminator::ReturnVoid | Terminator::ReturnValue(_) => vec![],
            Terminator::Jump(l) => vec![l],
            Terminator::Branch(_, t, f) => vec![t, f],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Lbl,
    pub insts: Vec<(Instruction, Location)>,
    pub term: Terminator,
    /// Set by [`super::trace::schedule`] when this block's terminator now
    /// targets the block immediately following it in arena order, so
    /// later passes know the edge needs no explicit jump/branch emitted.
    pub falls_through: bool,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Var>,
    /// Whether the function returns a value (carried over from LA's
    /// `Type::Void` vs. everything-else distinction, since IR no longer
    /// has a `Type` to ask).
    pub returns_value: bool,
    pub vars: PrimaryMap<Var, VarInfo>,
    pub label_names: SecondaryMap<Lbl, String>,
    /// Block order here is significant after the trace scheduler runs
    /// (spec.md §4.9): unlike LA, where block order is whatever the
    /// parser or lowerer happened to produce, IR's block order is the
    /// function's *emission* order, and `ir2l2` reorders this arena in
    /// place (spec.md §3: "block ordering may be mutated by the trace
    /// scheduler").
    pub blocks: PrimaryMap<Blk, BasicBlock>,
    pub entry: Blk,
    pub label_block: SecondaryMap<Lbl, Option<Blk>>,
}

impl Function {
    pub fn var_name(&self, v: Var) -> &str {
        &self.vars[v].name
    }

    pub fn block_of_label(&self, l: Lbl) -> Blk {
        self.label_block[l].expect("unresolved label reference")
    }

    /// Blocks in their current arena order — the order that matters for
    /// printing and for the trace scheduler (spec.md §4.9).
    pub fn blocks_in_order(&self) -> impl Iterator<Item = (Blk, &BasicBlock)> {
        self.blocks.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}
