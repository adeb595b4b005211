//! `l12s`: trivial instruction-to-text lowering from `L1` to AT&T-syntax
//! x86-64 assembly. Every `L1` instruction already names only physical
//! registers and fixed displacements (spec.md §4.3's contract, applied by
//! [`super::lower`]), so this module does no analysis of its own — it is
//! the "substance of L1 -> assembly lowering" SPEC_FULL.md §13 carves out
//! from the "final assembly emission formatting" spec.md §1 treats as an
//! external collaborator's concern. The output is a textual listing only:
//! `lnc` never assembles, links, or executes it.

use super::ast::*;
use crate::common::{ArithOp, Callee, CmpOp};
use lnc_support::registers::PhysReg;
use std::fmt::Write as _;

pub fn emit_program(prog: &Program) -> String {
    let mut out = String::new();
    for f in &prog.functions {
        emit_function(&mut out, f);
        out.push('\n');
    }
    out
}

/// AT&T register syntax: `%rax`, `%r12`, and so on.
fn reg(r: PhysReg) -> String {
    format!("%{}", r)
}

/// The 8-bit sub-register `setcc` writes into, which `movzbq` then
/// zero-extends into the full 64-bit destination (spec.md §4.6's
/// `CompareTile` always produces a 0/1 integer result, never a raw flag).
fn byte_reg(r: PhysReg) -> &'static str {
    match r {
        PhysReg::Rax => "%al",
        PhysReg::Rbx => "%bl",
        PhysReg::Rcx => "%cl",
        PhysReg::Rdx => "%dl",
        PhysReg::Rsi => "%sil",
        PhysReg::Rdi => "%dil",
        PhysReg::Rbp => "%bpl",
        PhysReg::Rsp => "%spl",
        PhysReg::R8 => "%r8b",
        PhysReg::R9 => "%r9b",
        PhysReg::R10 => "%r10b",
        PhysReg::R11 => "%r11b",
        PhysReg::R12 => "%r12b",
        PhysReg::R13 => "%r13b",
        PhysReg::R14 => "%r14b",
        PhysReg::R15 => "%r15b",
    }
}

fn operand(o: Operand) -> String {
    match o {
        Operand::Num(n) => format!("${}", n),
        Operand::Reg(r) => reg(r),
    }
}

fn arith_mnemonic(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "imul",
        ArithOp::And => "and",
        ArithOp::Shl => "shl",
        ArithOp::Shr => "sar",
    }
}

/// `setcc` suffix for each of the three base comparisons `CompareTile`
/// ever leaves in place (spec.md §4.6 normalises `>=`/`>` away before this
/// point, but all five are handled here for robustness against a
/// hand-written `L1` program that skipped the tiler).
fn setcc_suffix(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "setl",
        CmpOp::Le => "setle",
        CmpOp::Eq => "sete",
        CmpOp::Ge => "setge",
        CmpOp::Gt => "setg",
    }
}

fn jcc_mnemonic(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "jl",
        CmpOp::Le => "jle",
        CmpOp::Eq => "je",
        CmpOp::Ge => "jge",
        CmpOp::Gt => "jg",
    }
}

fn callee_label(c: Callee) -> String {
    match c {
        Callee::Func(fr) => format!("f{}", fr.as_u32()),
        Callee::Runtime(rt) => rt.name().replace('-', "_"),
    }
}

/// The stack frame's aligned size: `frame_size` rounded up to the next
/// multiple of 16, preserving the System V ABI's 16-byte `call`-time stack
/// alignment (the outgoing-argument slots `l3::tile`'s `CallTile` already
/// placed at `rsp`-relative displacements count toward `frame_size`, so
/// rounding it is enough — no separate alignment pass is needed).
fn aligned_frame(frame_size: u32) -> u32 {
    (frame_size + 15) & !15
}

fn emit_function(out: &mut String, f: &Function) {
    writeln!(out, ".globl f{}", label_id(f)).unwrap();
    writeln!(out, "f{}:", label_id(f)).unwrap();
    writeln!(out, "    push {}", reg(PhysReg::Rbp)).unwrap();
    writeln!(out, "    mov {}, {}", reg(PhysReg::Rsp), reg(PhysReg::Rbp)).unwrap();
    let frame = aligned_frame(f.frame_size);
    if frame > 0 {
        writeln!(out, "    sub ${}, {}", frame, reg(PhysReg::Rsp)).unwrap();
    }

    for (blk, bb) in f.blocks_in_order() {
        if blk != f.entry {
            writeln!(out, ".L{}_{}:", label_id(f), f.label_names[bb.label]).unwrap();
        }
        for inst in &bb.insts {
            emit_inst(out, f, inst);
        }
        emit_term(out, f, &bb.term);
    }
}

/// `L1`'s function name is already globally unique (spec.md §3: "unique
/// within a function" plus the lowerer's naming discipline), but assembly
/// labels share one flat namespace across the whole object file, so every
/// label this pass emits is additionally prefixed with the owning
/// function's identity.
fn label_id(f: &Function) -> String {
    f.name.replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_")
}

fn emit_inst(out: &mut String, f: &Function, inst: &Instruction) {
    match inst {
        Instruction::Assign(d, s) => writeln!(out, "    mov {}, {}", operand(*s), reg(*d)).unwrap(),
        Instruction::Arith(d, op, rhs) if op.is_shift() => {
            // The allocator's shift-by-variable interference edges force
            // a register shift amount into `%cl` specifically (spec.md
            // §4.2); an immediate count needs no register at all.
            let amount = match rhs {
                Operand::Reg(PhysReg::Rcx) => "%cl".to_string(),
                Operand::Num(n) => format!("${}", n),
                Operand::Reg(other) => reg(*other),
            };
            writeln!(out, "    {} {}, {}", arith_mnemonic(*op), amount, reg(*d)).unwrap();
        }
        Instruction::Arith(d, op, rhs) => {
            writeln!(out, "    {} {}, {}", arith_mnemonic(*op), operand(*rhs), reg(*d)).unwrap()
        }
        Instruction::Compare(d, op, l, r) => {
            writeln!(out, "    cmp {}, {}", operand(*r), operand(*l)).unwrap();
            writeln!(out, "    {} {}", setcc_suffix(*op), byte_reg(*d)).unwrap();
            writeln!(out, "    movzbq {}, {}", byte_reg(*d), reg(*d)).unwrap();
        }
        Instruction::Load(d, base, disp) => {
            writeln!(out, "    mov {}({}), {}", disp, reg(*base), reg(*d)).unwrap()
        }
        Instruction::Store(base, disp, s) => {
            writeln!(out, "    mov {}, {}({})", operand(*s), disp, reg(*base)).unwrap()
        }
        Instruction::Call(callee, _) => writeln!(out, "    call {}", callee_label(*callee)).unwrap(),
        Instruction::CallAssign(d, callee, _) => {
            writeln!(out, "    call {}", callee_label(*callee)).unwrap();
            if *d != PhysReg::Rax {
                writeln!(out, "    mov {}, {}", reg(PhysReg::Rax), reg(*d)).unwrap();
            }
        }
        Instruction::CondJump(op, l, r, lbl) => {
            writeln!(out, "    cmp {}, {}", operand(*r), operand(*l)).unwrap();
            writeln!(out, "    {} .L{}_{}", jcc_mnemonic(*op), label_id(f), f.label_names[*lbl]).unwrap();
        }
    }
}

fn emit_term(out: &mut String, f: &Function, term: &Terminator) {
    match term {
        Terminator::ReturnVoid => emit_epilogue(out),
        Terminator::ReturnValue(v) => {
            if !matches!(v, Operand::Reg(PhysReg::Rax)) {
                writeln!(out, "    mov {}, {}", operand(*v), reg(PhysReg::Rax)).unwrap();
            }
            emit_epilogue(out);
        }
        Terminator::Jump(l) => writeln!(out, "    jmp .L{}_{}", label_id(f), f.label_names[*l]).unwrap(),
        Terminator::Fallthrough => {}
    }
}

fn emit_epilogue(out: &mut String) {
    writeln!(out, "    leave").unwrap();
    writeln!(out, "    ret").unwrap();
}
