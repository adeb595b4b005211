//! LB's abstract syntax: a tree of scopes, not a graph of basic blocks.

use crate::common::{ArithOp, CmpOp, Type};
use lnc_support::Location;

/// A raw, not-yet-uniquified variable name as it appears in LB source.
pub type RawName = String;

/// An operand: either a literal or a reference to a variable visible in
/// the current scope chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Num(i64),
    Var(RawName),
}

/// A callable: a user function or one of the five runtime entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Func(RawName),
    Runtime(RawName),
}

/// `if (lhs op rhs)` / `while (lhs op rhs)` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cond {
    pub op: CmpOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// A single straight-line instruction, restricted to the variants spec.md
/// §3's instruction taxonomy allows at this level (declarations and
/// control flow are carried by [`Stmt`] instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatInst {
    Assign {
        dst: RawName,
        src: Operand,
    },
    BinOp {
        dst: RawName,
        op: ArithOp,
        lhs: Operand,
        rhs: Operand,
    },
    Compare {
        dst: RawName,
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
    Load {
        dst: RawName,
        base: RawName,
        indices: Vec<Operand>,
    },
    Store {
        base: RawName,
        indices: Vec<Operand>,
        src: Operand,
    },
    ArrayLen {
        dst: RawName,
        base: RawName,
        dim: Operand,
    },
    TupleLen {
        dst: RawName,
        base: RawName,
    },
    NewArray {
        dst: RawName,
        dims: Vec<Operand>,
    },
    NewTuple {
        dst: RawName,
        len: Operand,
    },
    Call {
        callee: Callee,
        args: Vec<Operand>,
    },
    CallAssign {
        dst: RawName,
        callee: Callee,
        args: Vec<Operand>,
    },
    ReturnVoid,
    ReturnValue(Operand),
}

/// One statement within a [`Block`]. Declarations open a new binding for
/// the remainder of the enclosing block (spec.md §4.7's scope walk);
/// `if`/`while` introduce genuinely nested child scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Decl(RawName, Type, Location),
    Flat(FlatInst, Location),
    If {
        cond: Cond,
        then_blk: Block,
        else_blk: Block,
        loc: Location,
    },
    While {
        cond: Cond,
        body: Block,
        loc: Location,
    },
    Continue(Location),
    Break(Location),
}

/// A lexical scope: an ordered list of statements. Entering a `Block`
/// pushes a fresh child scope (spec.md §3's `Scope`); leaving it discards
/// any names declared within.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

/// A typed parameter of an LB function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: RawName,
    pub ty: Type,
}

/// An LB function: a name, a parameter list, a return type, and a body
/// scope that is the function's outermost `Block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
}

/// An LB program: an ordered list of functions. The first is the entry
/// point (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub functions: Vec<Function>,
}
