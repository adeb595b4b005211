//! Pretty-printer for L2. A [`crate::common::Reg`] prints as `%name` when
//! virtual, or as a bare register mnemonic (`rax`, `r12`, ...) when
//! physical — the lexer already tokenizes the former as `Token::Var` and
//! the latter as `Token::Ident`, so [`super::parser`] can tell them apart
//! without extra punctuation.

use super::ast::*;
use crate::common::{Callee, Reg};
use std::fmt::Write;

pub fn print_program(prog: &Program) -> String {
    let mut out = String::new();
    for f in &prog.functions {
        print_function(&mut out, f);
        out.push('\n');
    }
    out
}

fn print_reg(f: &Function, r: Reg) -> String {
    match r {
        Reg::Virtual(v) => format!("%{}", f.var_name(v)),
        Reg::Physical(p) => p.to_string(),
    }
}

fn print_operand(f: &Function, o: &Operand) -> String {
    match o {
        Operand::Num(n) => n.to_string(),
        Operand::Reg(r) => print_reg(f, *r),
    }
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
        for inst in &bb.insts {
            print_inst(out, f, inst);
        }
        print_term(out, f, &bb.term);
    }
    writeln!(out, "}}").unwrap();
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
        Instruction::Assign(d, s) => {
            writeln!(out, "{} <- {};", print_reg(f, *d), print_operand(f, s)).unwrap()
        }
        Instruction::Arith(d, op, rhs) => {
            writeln!(out, "{} {}= {};", print_reg(f, *d), op, print_operand(f, rhs)).unwrap()
        }
        Instruction::Compare(d, op, l, r) => writeln!(
            out,
            "{} <- {} {} {};",
            print_reg(f, *d),
            print_operand(f, l),
            op,
            print_operand(f, r)
        )
        .unwrap(),
        Instruction::Load(d, base, disp) => {
            writeln!(out, "{} <- mem[{}, {}];", print_reg(f, *d), print_reg(f, *base), disp).unwrap()
        }
        Instruction::Store(base, disp, s) => writeln!(
            out,
            "mem[{}, {}] <- {};",
            print_reg(f, *base),
            disp,
            print_operand(f, s)
        )
        .unwrap(),
        Instruction::Call(callee, argc) => {
            writeln!(out, "call {}, {};", callee_text(callee), argc).unwrap()
        }
        Instruction::CallAssign(d, callee, argc) => writeln!(
            out,
            "{} <- call {}, {};",
            print_reg(f, *d),
            callee_text(callee),
            argc
        )
        .unwrap(),
        Instruction::CondJump(op, l, r, lbl) => writeln!(
            out,
            "cjump {} {} {}, :{};",
            print_operand(f, l),
            op,
            print_operand(f, r),
            f.label_names[*lbl]
        )
        .unwrap(),
    }
}

fn print_term(out: &mut String, f: &Function, term: &Terminator) {
    write!(out, "    ").unwrap();
    match term {
        Terminator::ReturnVoid => writeln!(out, "return;").unwrap(),
        Terminator::ReturnValue(v) => writeln!(out, "return {};", print_operand(f, v)).unwrap(),
        Terminator::Jump(l) => writeln!(out, "jump :{};", f.label_names[*l]).unwrap(),
        Terminator::Fallthrough => writeln!(out, "// falls through").unwrap(),
    }
}
