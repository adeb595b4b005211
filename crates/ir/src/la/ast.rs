//! LA's data model: typed, flat basic blocks over globally-unique
//! variable and label names (spec.md §3, §4.7).

use crate::common::{ArithOp, Blk, Callee, CmpOp, Lbl, Type, Var};
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

/// A non-terminating instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Decl(Var, Type),
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

/// A block-ending instruction. LA and its neighbours (LB conceptually,
/// IR concretely) use a *two*-target conditional branch; L3 uses a
/// single-target one. Per spec.md §9 these must never share a variant
/// across ILs, so each level defines its own `Terminator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    ReturnVoid,
    ReturnValue(Operand),
    Jump(Lbl),
    /// `cbranch %cond, true_label, false_label` — branch to `true_label`
    /// if `cond` is nonzero, else fall to `false_label`.
    Branch(Var, Lbl, Lbl),
}

impl Terminator {
    /// The block labels this terminator can jump to, in a fixed order
    /// (true edge before false edge for `Branch`).
    pub fn targets(&self) -> Vec<Lbl> {
        match self {
            Terminator::ReturnVoid | Terminator::ReturnValue(_) => vec![],
            Terminator::Jump(l) => vec![*l],
            Terminator::Branch(_, t, f) => vec![*t, *f],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Lbl,
    pub insts: Vec<(Instruction, Location)>,
    pub term: Terminator,
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<Var>,
    pub ret: Type,
    pub vars: PrimaryMap<Var, VarInfo>,
    pub label_names: SecondaryMap<Lbl, String>,
    pub blocks: PrimaryMap<Blk, BasicBlock>,
    pub entry: Blk,
    /// Map from a label to the block that declares it, used by the
    /// `ControlFlowGraph` and by branch-target resolution during lowering.
    pub label_block: SecondaryMap<Lbl, Option<Blk>>,
}

impl Function {
    pub fn var_name(&self, v: Var) -> &str {
        &self.vars[v].name
    }

    pub fn block_of_label(&self, l: Lbl) -> Blk {
        self.label_block[l].expect("unresolved label reference")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}
