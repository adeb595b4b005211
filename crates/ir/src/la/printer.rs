//! Pretty-printer for LA, the typed flat control-flow graph.
//!
//! Printing walks blocks in arena order (not necessarily the order a
//! `ControlFlowGraph` traversal would visit them), which is fine: LA's
//! surface syntax identifies blocks by label, not by position, so
//! round-tripping through parse/print/parse reproduces an equivalent CFG
//! (spec.md §8) even though block order in the text may differ from the
//! order they were built in.

use super::ast::*;
use std::fmt::Write;

pub fn print_program(prog: &Program) -> String {
    let mut out = String::new();
    for f in &prog.functions {
        print_function(&mut out, f);
        out.push('\n');
    }
    out
}

fn print_function(out: &mut String, f: &Function) {
    let params = f
        .params
        .iter()
        .map(|v| format!("{} %{}", f.vars[*v].ty, f.var_name(*v)))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "{} @{}({}) {{", f.ret, f.name, params).unwrap();
    for (blk, bb) in f.blocks.iter() {
        if blk != f.entry {
            writeln!(out, ":{}", f.label_names[bb.label]).unwrap();
        }
        for (inst, _loc) in &bb.insts {
            print_inst(out, f, inst);
        }
        print_term(out, f, &bb.term);
    }
    writeln!(out, "}}").unwrap();
}

fn print_operand(f: &Function, o: &Operand) -> String {
    match o {
        Operand::Num(n) => n.to_string(),
        Operand::Var(v) => format!("%{}", f.var_name(*v)),
    }
}

fn print_args(f: &Function, args: &[Operand]) -> String {
    args.iter()
        .map(|a| print_operand(f, a))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_inst(out: &mut String, f: &Function, inst: &Instruction) {
    write!(out, "    ").unwrap();
    match inst {
        Instruction::Decl(v, ty) => writeln!(out, "{} %{};", ty, f.var_name(*v)).unwrap(),
        Instruction::Assign(v, src) => {
            writeln!(out, "%{} <- {};", f.var_name(*v), print_operand(f, src)).unwrap()
        }
        Instruction::BinOp(v, op, l, r) => writeln!(
            out,
            "%{} <- {} {} {};",
            f.var_name(*v),
            print_operand(f, l),
            op,
            print_operand(f, r)
        )
        .unwrap(),
        Instruction::Compare(v, op, l, r) => writeln!(
            out,
            "%{} <- {} {} {};",
            f.var_name(*v),
            print_operand(f, l),
            op,
            print_operand(f, r)
        )
        .unwrap(),
        Instruction::Load(v, base, idx) => writeln!(
            out,
            "%{} <- %{}[{}];",
            f.var_name(*v),
            f.var_name(*base),
            print_args(f, idx)
        )
        .unwrap(),
        Instruction::Store(base, idx, src) => writeln!(
            out,
            "%{}[{}] <- {};",
            f.var_name(*base),
            print_args(f, idx),
            print_operand(f, src)
        )
        .unwrap(),
        Instruction::ArrayLen(v, base, dim) => writeln!(
            out,
            "%{} <- length %{} {};",
            f.var_name(*v),
            f.var_name(*base),
            print_operand(f, dim)
        )
        .unwrap(),
        Instruction::TupleLen(v, base) => {
            writeln!(out, "%{} <- length %{};", f.var_name(*v), f.var_name(*base)).unwrap()
        }
        Instruction::NewArray(v, dims) => {
            writeln!(out, "%{} <- new Array({});", f.var_name(*v), print_args(f, dims)).unwrap()
        }
        Instruction::NewTuple(v, len) => writeln!(
            out,
            "%{} <- new Tuple({});",
            f.var_name(*v),
            print_operand(f, len)
        )
        .unwrap(),
        Instruction::Call(callee, args) => {
            writeln!(out, "call {}({});", callee_text(callee), print_args(f, args)).unwrap()
        }
        Instruction::CallAssign(v, callee, args) => writeln!(
            out,
            "%{} <- call {}({});",
            f.var_name(*v),
            callee_text(callee),
            print_args(f, args)
        )
        .unwrap(),
    }
}

/// Render a callee. User functions print as `@f<index>` — the LA text
/// format has no global function-name table to consult at print time, so
/// function references round-trip through their `FuncRef` index rather
/// than a human name (the same index the driver resolved names to when
/// parsing, see `la::parser`'s `name_hash` note).
fn callee_text(c: &crate::common::Callee) -> String {
    match c {
        crate::common::Callee::Func(fr) => format!("@f{}", fr.as_u32()),
        crate::common::Callee::Runtime(rt) => rt.name().to_string(),
    }
}

fn print_term(out: &mut String, f: &Function, term: &Terminator) {
    write!(out, "    ").unwrap();
    match term {
        Terminator::ReturnVoid => writeln!(out, "return;").unwrap(),
        Terminator::ReturnValue(v) => writeln!(out, "return {};", print_operand(f, v)).unwrap(),
        Terminator::Jump(l) => writeln!(out, "jump :{};", f.label_names[*l]).unwrap(),
        Terminator::Branch(c, t, e) => writeln!(
            out,
            "cbranch %{}, :{}, :{};",
            f.var_name(*c),
            f.label_names[*t],
            f.label_names[*e]
        )
        .unwrap(),
    }
}
