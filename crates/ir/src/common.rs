//! Types and entity references shared by the flat ILs (LA, IR, L2, L1) and
//! by L3, the in-memory three-address view built inside the `ir2l2` pass.
//!
//! `LB` is deliberately excluded: before lowering, its variables are raw,
//! possibly-shadowed source names resolved through a scope chain, not yet
//! the globally-unique entities the rest of the pipeline assumes (spec.md
//! §3, §4.7).

use lnc_entity::entity_impl;
use std::fmt;

entity_impl!(Var);
entity_impl!(Lbl);
entity_impl!(Blk);
entity_impl!(FuncRef);

/// The four level-bearing static types of LA/LB (spec.md §3). `IR`, `L3`,
/// `L2`, and `L1` no longer carry static types — by the time IR tags every
/// runtime value, there is nothing left for a type to describe beyond
/// "pointer-shaped" vs. "tagged integer," which is represented structurally
/// (the low bit), not by a `Type` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    /// A 64-bit signed integer.
    Int64,
    /// An array of `Int64` with the given positive rank.
    Array(u32),
    /// A tuple (rank-1 array with per-index, not per-dimension, length).
    Tuple,
    /// A function pointer.
    Code,
    /// Valid only as a function's return type.
    Void,
}

impl Type {
    /// Is this a reference type (tagged as a pointer: low bit 0) rather
    /// than an integer (low bit 1)? Spec.md §4.8.
    pub fn is_pointer_shaped(self) -> bool {
        matches!(self, Type::Array(_) | Type::Tuple | Type::Code)
    }

    /// The rank of an access into this type: 1 for a tuple, the declared
    /// rank for an array. Panics on `Int64`/`Code`/`Void`, which are never
    /// indexable (spec.md §7: "attempt to decode a non-decodable type" is
    /// an analysis-invariant violation, i.e. a compiler bug if it occurs).
    pub fn rank(self) -> u32 {
        match self {
            Type::Array(r) => r,
            Type::Tuple => 1,
            Type::Int64 | Type::Code | Type::Void => {
                unreachable!("{:?} has no indexable rank", self)
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Int64 => write!(f, "int64"),
            Type::Array(r) => write!(f, "int64{}", "[]".repeat(*r as usize)),
            Type::Tuple => write!(f, "tuple"),
            Type::Code => write!(f, "code"),
            Type::Void => write!(f, "void"),
        }
    }
}

/// Comparison operators, a disjoint enum from [`ArithOp`] per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl CmpOp {
    /// Swap operand order: `a > b` becomes `b < a`, etc. Used by
    /// `CompareTile` (spec.md §4.6) to normalise `>=`/`>` into `<=`/`<`.
    pub fn flip(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ge => CmpOp::Le,
            CmpOp::Gt => CmpOp::Lt,
        }
    }

    /// Is this one of the three comparisons the target ISA has natively
    /// (`<`, `<=`, `=`)? `CompareTile` normalises everything else into one
    /// of these with swapped operands (spec.md §4.6).
    pub fn is_base(self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le | CmpOp::Eq)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Eq => "=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arithmetic operators, a disjoint enum from [`CmpOp`] per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    And,
    Shl,
    Shr,
}

impl ArithOp {
    /// Is this a shift? Shifts need the right-hand operand pinned to the
    /// shift-count register before emission (spec.md §4.6).
    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::And => "&",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A symbolic callable: either a function defined in this program, or one
/// of the five fixed runtime entry points (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Func(FuncRef),
    Runtime(lnc_support::runtime::RuntimeFn),
}

/// A register-file slot: either a not-yet-allocated virtual variable, or
/// one of the sixteen physical registers a parameter or a colouring
/// decision has already pinned it to.
///
/// `L2`'s nodes are `Var ∪ PhysReg` (spec.md §4.2: "an undirected graph on
/// variables ∪ physical registers"); this is the one operand shape shared
/// by `l2::liveness`, `l2::interference`, and `l2::regalloc`, so those
/// modules never juggle two separate "is this a register or a variable"
/// representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Virtual(Var),
    Physical(lnc_support::registers::PhysReg),
}

impl Reg {
    pub fn as_virtual(self) -> Option<Var> {
        match self {
            Reg::Virtual(v) => Some(v),
            Reg::Physical(_) => None,
        }
    }

    pub fn is_physical(self) -> bool {
        matches!(self, Reg::Physical(_))
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reg::Virtual(v) => write!(f, "{:?}", v),
            Reg::Physical(r) => write!(f, "{}", r),
        }
    }
}
