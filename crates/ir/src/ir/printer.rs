//! Pretty-printer for IR, the inverse of [`super::parser::parse_program`].

use super::ast::*;
use crate::common::Callee;
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
        .map(|v| format!("%{}", f.var_name(*v)))
        .collect::<Vec<_>>()
        .join(", ");
    let kind = if f.returns_value { "value" } else { "void" };
    writeln!(out, "{} @{}({}) {{", kind, f.name, params).unwrap();
    for (blk, bb) in f.blocks_in_order() {
        if blk != f.entry {
            writeln!(out, ":{}", f.label_names[bb.label]).unwrap();
        }
        for (inst, _loc) in &bb.insts {
            print_inst(out, f, inst);
        }
        print_term(out, f, &bb.term, bb.falls_through);
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

fn callee_text(c: &Callee) -> String {
    match c {
        Callee::Func(fr) => format!("@f{}", fr.as_u32()),
        Callee::Runtime(rt) => rt.name().to_string(),
    }
}

fn print_inst(out: &mut String, f: &Function, inst: &Instruction) {
    write!(out, "    ").unwrap();
    match inst {
        Instruction::Decl(v) => writeln!(out, "var %{};", f.var_name(*v)).unwrap(),
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

/// `falls_through` is set by the trace scheduler once block order is
/// final: a jump whose target is the very next block, or a branch whose
/// false edge is, needs no text at all (`l3::tree` reads the next block
/// in arena order for that edge instead). Printing still shows the
/// original target in a comment so a scheduled program remains readable.
fn print_term(out: &mut String, f: &Function, term: &Terminator, falls_through: bool) {
    write!(out, "    ").unwrap();
    match term {
        Terminator::ReturnVoid => writeln!(out, "return;").unwrap(),
        Terminator::ReturnValue(v) => writeln!(out, "return {};", print_operand(f, v)).unwrap(),
        Terminator::Jump(l) => {
            if falls_through {
                writeln!(out, "// falls through to :{}", f.label_names[*l]).unwrap();
            } else {
                writeln!(out, "jump :{};", f.label_names[*l]).unwrap();
            }
        }
        Terminator::Branch(c, t, e) => {
            if falls_through {
                writeln!(
                    out,
                    "cbranch %{}, :{}; // falls through to :{}",
                    f.var_name(*c),
                    f.label_names[*t],
                    f.label_names[*e]
                )
                .unwrap();
            } else {
                writeln!(
                    out,
                    "cbranch %{}, :{}, :{};",
                    f.var_name(*c),
                    f.label_names[*t],
                    f.label_names[*e]
                )
                .unwrap();
            }
        }
    }
}
