//! Pretty-printer for L1. Same surface shape as `l2::printer` with every
//! register printed as a bare mnemonic — there is no `%name` case left to
//! distinguish, since `l1::lower` has already resolved every variable to a
//! physical register.

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

fn print_operand(o: &Operand) -> String {
    match o {
        Operand::Num(n) => n.to_string(),
        Operand::Reg(r) => r.to_string(),
    }
}

fn callee_text(c: &Callee) -> String {
    match c {
        Callee::Func(fr) => format!("@f{}", fr.as_u32()),
        Callee::Runtime(rt) => rt.name().to_string(),
    }
}

fn print_function(out: &mut String, f: &Function) {
    let params = f.param_regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ");
    let kind = if f.returns_value { "value" } else { "void" };
    writeln!(out, "{} @{}({}) {{ // frame {}", kind, f.name, params, f.frame_size).unwrap();
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

fn print_inst(out: &mut String, f: &Function, inst: &Instruction) {
    write!(out, "    ").unwrap();
    match inst {
        Instruction::Assign(d, s) => writeln!(out, "{} <- {};", d, print_operand(s)).unwrap(),
        Instruction::Arith(d, op, rhs) => writeln!(out, "{} {}= {};", d, op, print_operand(rhs)).unwrap(),
        Instruction::Compare(d, op, l, r) => {
            writeln!(out, "{} <- {} {} {};", d, print_operand(l), op, print_operand(r)).unwrap()
        }
        Instruction::Load(d, base, disp) => writeln!(out, "{} <- mem[{}, {}];", d, base, disp).unwrap(),
        Instruction::Store(base, disp, s) => {
            writeln!(out, "mem[{}, {}] <- {};", base, disp, print_operand(s)).unwrap()
        }
        Instruction::Call(callee, argc) => writeln!(out, "call {}, {};", callee_text(callee), argc).unwrap(),
        Instruction::CallAssign(d, callee, argc) => {
            writeln!(out, "{} <- call {}, {};", d, callee_text(callee), argc).unwrap()
        }
        Instruction::CondJump(op, l, r, lbl) => writeln!(
            out,
            "cjump {} {} {}, :{};",
            print_operand(l),
            op,
            print_operand(r),
            f.label_names[*lbl]
        )
        .unwrap(),
    }
}

fn print_term(out: &mut String, f: &Function, term: &Terminator) {
    write!(out, "    ").unwrap();
    match term {
        Terminator::ReturnVoid => writeln!(out, "return;").unwrap(),
        Terminator::ReturnValue(v) => writeln!(out, "return {};", print_operand(v)).unwrap(),
        Terminator::Jump(l) => writeln!(out, "jump :{};", f.label_names[*l]).unwrap(),
        Terminator::Fallthrough => writeln!(out, "// falls through").unwrap(),
    }
}
