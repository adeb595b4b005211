//! Expands IR's structural and memory-shaped instructions — `Decl`,
//! `ArrayLen`, `TupleLen`, `NewArray`, `NewTuple`, and any multi-index
//! `Load`/`Store` — into the base three-address forms the expression-tree
//! builder and tile matcher (spec.md §4.5, §4.6) know how to tile:
//! `Assign`, `BinOp`, `Compare`, a `Load`/`Store` at a single
//! already-computed address, and `Call`/`CallAssign`.
//!
//! This is the concrete answer SPEC_FULL.md §0 promises but defers: IR
//! still carries a per-access `Vec<Operand>` of indices because
//! `la::lower` already dropped static types (`common.rs` — by IR, an
//! array and a tuple are both just an untagged pointer), so the
//! rank-specific addressing arithmetic can only happen once the access
//! site's index *count* is in hand. That count never stops being
//! available — it is `indices.len()` at every call site, known from the
//! moment `la::lower` emitted the access — so nothing is lost by waiting
//! until here to compute it.
//!
//! ## Memory layout (see DESIGN.md)
//!
//! Every array or tuple value still alive at this point is a raw pointer
//! to a contiguous block of 8-byte words:
//!
//! ```text
//! [ dim_0, dim_1, ..., dim_{rank-1}, element_0, element_1, ... ]
//! ```
//!
//! `rank` is never stored on the object itself: it is always exactly the
//! index count the access site supplies, which LA's static type checker
//! already fixed for that site. A tuple is the rank-1 case of the same
//! layout (one length word, then its elements) — `TupleLen` and a
//! 1-index `ArrayLen` therefore read the identical header word, and
//! `emit_checks` (`la::lower`) already relies on that coincidence by
//! giving both the same one-length-check shape.
//!
//! Every register this module allocates (dimension temporaries, address
//! arithmetic, decoded sizes) is a fresh scratch `Var`, never reused
//! across instructions — this is deliberately not optimised (spec.md §1:
//! "optimisation beyond trace scheduling" is out of scope), so no
//! constant folding happens here even when an index is a literal.

use crate::common::{ArithOp, Callee, Var};
use crate::ir::{BasicBlock, Function, Instruction, Operand, VarInfo};
use lnc_entity::PrimaryMap;
use lnc_support::runtime::RuntimeFn;
use lnc_support::Location;

struct Expander {
    vars: PrimaryMap<Var, VarInfo>,
}

impl Expander {
    fn fresh(&mut self, hint: &str) -> Var {
        self.vars.push(VarInfo {
            name: format!("_{}{}", hint, self.vars.len()),
        })
    }

    /// Emit `dst <- l op r` for a fresh `dst`, returning it.
    fn binop(&mut self, op: ArithOp, l: Operand, r: Operand, out: &mut Vec<(Instruction, Location)>, loc: Location) -> Var {
        let dst = self.fresh("addr");
        out.push((Instruction::BinOp(dst, op, l, r), loc));
        dst
    }

    /// Compute the effective element address of `base[indices]` (rank =
    /// `indices.len()`), reading whatever header words the row-major
    /// stride computation needs along the way. Spec.md §4.6's "fixed
    /// offset 0" rule for `LoadTile`/`StoreTile` holds because this is
    /// the only place an access's address is ever computed — every
    /// `Load`/`Store` downstream of `expand_function` addresses at
    /// displacement 0 from the register this returns.
    fn address(&mut self, base: Var, indices: &[Operand], out: &mut Vec<(Instruction, Location)>, loc: Location) -> Var {
        let rank = indices.len();
        let mut flat = indices[0];
        for d in 1..rank {
            let hdr_addr = self.binop(ArithOp::Add, Operand::Var(base), Operand::Num(8 * d as i64), out, loc);
            let dim_len = self.fresh("dimlen");
            out.push((Instruction::Load(dim_len, hdr_addr, vec![Operand::Num(0)]), loc));
            let scaled = self.binop(ArithOp::Mul, flat, Operand::Var(dim_len), out, loc);
            flat = Operand::Var(self.binop(ArithOp::Add, Operand::Var(scaled), indices[d], out, loc));
        }
        let byte_off = self.binop(ArithOp::Mul, flat, Operand::Num(8), out, loc);
        let header = self.binop(ArithOp::Add, Operand::Var(base), Operand::Num(8 * rank as i64), out, loc);
        self.binop(ArithOp::Add, Operand::Var(header), Operand::Var(byte_off), out, loc)
    }

    fn expand_inst(&mut self, inst: &Instruction, loc: Location, out: &mut Vec<(Instruction, Location)>) {
        match inst {
            // A declaration has no runtime effect by this point: the
            // initialising `Assign` `la::lower` always pairs it with
            // (spec.md §4.8) is what actually sets the value.
            Instruction::Decl(_) => {}

            Instruction::Assign(..)
            | Instruction::BinOp(..)
            | Instruction::Compare(..)
            | Instruction::Call(..)
            | Instruction::CallAssign(..) => out.push((inst.clone(), loc)),

            Instruction::Load(v, base, indices) => {
                let addr = self.address(*base, indices, out, loc);
                out.push((Instruction::Load(*v, addr, vec![Operand::Num(0)]), loc));
            }
            Instruction::Store(base, indices, value) => {
                let addr = self.address(*base, indices, out, loc);
                out.push((Instruction::Store(addr, vec![Operand::Num(0)], *value), loc));
            }

            // `ArrayLen(v, base, dim)`: header word `dim` is at
            // `base + 8*dim`. `dim` here is already the raw (decoded)
            // index `la::lower` produced, never a tagged one.
            Instruction::ArrayLen(v, base, dim) => {
                let off = self.binop(ArithOp::Mul, *dim, Operand::Num(8), out, loc);
                let addr = self.binop(ArithOp::Add, Operand::Var(*base), Operand::Var(off), out, loc);
                out.push((Instruction::Load(*v, addr, vec![Operand::Num(0)]), loc));
            }
            // `TupleLen` always reads dimension 0, i.e. the header word
            // at offset 0 — the base pointer itself needs no arithmetic.
            Instruction::TupleLen(v, base) => {
                out.push((Instruction::Load(*v, *base, vec![Operand::Num(0)]), loc));
            }

            Instruction::NewArray(v, dims) => self.expand_new_array(*v, dims, out, loc),
            Instruction::NewTuple(v, count) => self.expand_new_tuple(*v, *count, out, loc),
        }
    }

    /// `dims` arrived as tagged (encoded) `Int64` operands — `la::lower`
    /// passes every value-context operand through `int_operand`, which
    /// encodes literals and trusts already-encoded variables (see
    /// `la::lower` module docs) — so each is decoded before use in size
    /// arithmetic. The allocation byte count itself is never a
    /// user-visible `Int64` value, so it is computed and passed to
    /// `allocate` raw; the fill value *is* later exposed to the program
    /// as an ordinary element read, so it is the encoded zero (`1`),
    /// matching every other `int64` initialiser (spec.md §4.8).
    fn expand_new_array(&mut self, v: Var, dims: &[Operand], out: &mut Vec<(Instruction, Location)>, loc: Location) {
        let raw_dims: Vec<Var> = dims
            .iter()
            .map(|d| {
                let t = self.fresh("dim");
                out.push((Instruction::BinOp(t, ArithOp::Shr, *d, Operand::Num(1)), loc));
                t
            })
            .collect();

        let mut prod = raw_dims[0];
        for &d in &raw_dims[1..] {
            prod = self.binop(ArithOp::Mul, Operand::Var(prod), Operand::Var(d), out, loc);
        }
        let bytes = self.binop(ArithOp::Mul, Operand::Var(prod), Operand::Num(8), out, loc);
        let rank = raw_dims.len() as i64;
        let size = self.binop(ArithOp::Add, Operand::Var(bytes), Operand::Num(8 * rank), out, loc);

        let ptr = self.fresh("ptr");
        out.push((
            Instruction::CallAssign(
                ptr,
                Callee::Runtime(RuntimeFn::Allocate),
                vec![Operand::Var(size), Operand::Num(1)],
            ),
            loc,
        ));
        out.push((Instruction::Assign(v, Operand::Var(ptr)), loc));

        for (i, &d) in raw_dims.iter().enumerate() {
            let addr = if i == 0 {
                v
            } else {
                self.binop(ArithOp::Add, Operand::Var(v), Operand::Num(8 * i as i64), out, loc)
            };
            out.push((Instruction::Store(addr, vec![Operand::Num(0)], Operand::Var(d)), loc));
        }
    }

    fn expand_new_tuple(&mut self, v: Var, count: Operand, out: &mut Vec<(Instruction, Location)>, loc: Location) {
        let raw_count = self.fresh("cnt");
        out.push((Instruction::BinOp(raw_count, ArithOp::Shr, count, Operand::Num(1)), loc));
        let bytes = self.binop(ArithOp::Mul, Operand::Var(raw_count), Operand::Num(8), out, loc);
        let size = self.binop(ArithOp::Add, Operand::Var(bytes), Operand::Num(8), out, loc);

        let ptr = self.fresh("ptr");
        out.push((
            Instruction::CallAssign(
                ptr,
                Callee::Runtime(RuntimeFn::Allocate),
                vec![Operand::Var(size), Operand::Num(1)],
            ),
            loc,
        ));
        out.push((Instruction::Assign(v, Operand::Var(ptr)), loc));
        out.push((Instruction::Store(v, vec![Operand::Num(0)], Operand::Var(raw_count)), loc));
    }
}

/// Rewrite every instruction of `f` into the base three-address forms
/// `super::tree` and `super::tile` consume. Block structure, labels, and
/// terminators are untouched: none of the expansions above introduce
/// control flow, only longer straight-line instruction sequences within
/// the same block (see module docs).
pub fn expand_function(f: &Function) -> Function {
    let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
    for (_, info) in f.vars.iter() {
        vars.push(VarInfo { name: info.name.clone() });
    }
    let mut ex = Expander { vars };

    let mut blocks = f.blocks.clone();
    for (_, bb) in blocks.iter_mut() {
        let mut out = Vec::with_capacity(bb.insts.len());
        for (inst, loc) in &bb.insts {
            ex.expand_inst(inst, *loc, &mut out);
        }
        *bb = BasicBlock {
            label: bb.label,
            insts: out,
            term: bb.term.clone(),
            falls_through: bb.falls_through,
        };
    }

    Function {
        name: f.name.clone(),
        params: f.params.clone(),
        returns_value: f.returns_value,
        vars: ex.vars,
        label_names: f.label_names.clone(),
        blocks,
        entry: f.entry,
        label_block: f.label_block.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Blk, Lbl};
    use crate::ir::Terminator;
    use lnc_entity::{EntityRef, SecondaryMap};

    fn one_block_function(insts: Vec<(Instruction, Location)>, term: Terminator) -> Function {
        let mut vars: PrimaryMap<Var, VarInfo> = PrimaryMap::new();
        let base = vars.push(VarInfo { name: "base".into() });
        let mut labels: PrimaryMap<Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let mut blocks: PrimaryMap<Blk, BasicBlock> = PrimaryMap::new();
        let entry = blocks.push(BasicBlock {
            label: entry_label,
            insts,
            term,
            falls_through: false,
        });
        let mut label_block: SecondaryMap<Lbl, Option<Blk>> = SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        let _ = base;
        Function {
            name: "f".into(),
            params: vec![],
            returns_value: true,
            vars,
            label_names: SecondaryMap::new(),
            blocks,
            entry,
            label_block,
        }
    }

    #[test]
    fn decl_is_dropped() {
        let v = Var::new(0);
        let f = one_block_function(
            vec![(Instruction::Decl(v), Location::default())],
            Terminator::ReturnVoid,
        );
        let out = expand_function(&f);
        assert!(out.blocks[out.entry].insts.is_empty());
    }

    #[test]
    fn single_index_load_computes_header_plus_index_address() {
        let base = Var::new(0);
        let v = Var::new(1);
        let f = one_block_function(
            vec![(
                Instruction::Load(v, base, vec![Operand::Num(2)]),
                Location::default(),
            )],
            Terminator::ReturnValue(Operand::Var(v)),
        );
        let out = expand_function(&f);
        let insts = &out.blocks[out.entry].insts;
        assert!(matches!(insts.last().unwrap().0, Instruction::Load(..)));
        // Address arithmetic plus the final load.
        assert!(insts.len() > 1);
    }

    #[test]
    fn tuple_len_reads_header_word_zero_directly() {
        let base = Var::new(0);
        let v = Var::new(1);
        let f = one_block_function(
            vec![(Instruction::TupleLen(v, base), Location::default())],
            Terminator::ReturnValue(Operand::Var(v)),
        );
        let out = expand_function(&f);
        let insts = &out.blocks[out.entry].insts;
        assert_eq!(insts.len(), 1);
        assert!(matches!(insts[0].0, Instruction::Load(dst, b, _) if dst == v && b == base));
    }

    #[test]
    fn new_tuple_allocates_and_stores_its_length() {
        let v = Var::new(0);
        let f = one_block_function(
            vec![(
                Instruction::NewTuple(v, Operand::Num(7)),
                Location::default(),
            )],
            Terminator::ReturnVoid,
        );
        let out = expand_function(&f);
        let insts = &out.blocks[out.entry].insts;
        assert!(insts.iter().any(|(i, _)| matches!(
            i,
            Instruction::CallAssign(_, Callee::Runtime(RuntimeFn::Allocate), _)
        )));
        assert!(insts.iter().any(|(i, _)| matches!(i, Instruction::Store(b, _, _) if *b == v)));
    }
}
