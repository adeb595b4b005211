//! `l22l1`: run the register allocator to completion on each `L2`
//! function, then rewrite every `Reg::Virtual` it leaves behind into the
//! `PhysReg` the allocator assigned it (spec.md §4.3's contract —
//! "`Variable -> PhysicalRegister`" — applied directly to the
//! instruction stream, since by construction every variable in an
//! allocator-returned function is either precoloured or was coloured by
//! `simplify_and_select`).

use super::ast::{self as l1, Function, Program};
use crate::common::Reg;
use crate::l2::{self, regalloc::Allocation};
use lnc_entity::EntityRef;
use lnc_support::registers::PhysReg;
use lnc_support::CompileError;
use rustc_hash::FxHashMap;

/// Run allocation on every function of `prog` (mutating it with
/// spill-rewrites along the way, per `l2::regalloc::allocate`) and lower
/// the result to `L1`.
pub fn lower_program(prog: &mut l2::Program) -> Result<Program, CompileError> {
    let mut functions = Vec::with_capacity(prog.functions.len());
    for func in &mut prog.functions {
        let alloc = l2::regalloc::allocate(func)?;
        functions.push(lower_function(func, &alloc));
    }
    Ok(Program { functions })
}

fn phys_of(colors: &FxHashMap<crate::common::Var, PhysReg>, r: Reg) -> PhysReg {
    match r {
        Reg::Physical(p) => p,
        Reg::Virtual(v) => colors[&v],
    }
}

fn lower_operand(colors: &FxHashMap<crate::common::Var, PhysReg>, o: l2::Operand) -> l1::Operand {
    match o {
        l2::Operand::Num(n) => l1::Operand::Num(n),
        l2::Operand::Reg(r) => l1::Operand::Reg(phys_of(colors, r)),
    }
}

fn lower_inst(colors: &FxHashMap<crate::common::Var, PhysReg>, inst: &l2::Instruction) -> l1::Instruction {
    let reg = |r: Reg| phys_of(colors, r);
    let op = |o: l2::Operand| lower_operand(colors, o);
    match *inst {
        l2::Instruction::Assign(d, s) => l1::Instruction::Assign(reg(d), op(s)),
        l2::Instruction::Arith(d, a, rhs) => l1::Instruction::Arith(reg(d), a, op(rhs)),
        l2::Instruction::Compare(d, c, l, r) => l1::Instruction::Compare(reg(d), c, op(l), op(r)),
        l2::Instruction::Load(d, base, disp) => l1::Instruction::Load(reg(d), reg(base), disp),
        l2::Instruction::Store(base, disp, s) => l1::Instruction::Store(reg(base), disp, op(s)),
        l2::Instruction::Call(c, argc) => l1::Instruction::Call(c, argc),
        l2::Instruction::CallAssign(d, c, argc) => l1::Instruction::CallAssign(reg(d), c, argc),
        l2::Instruction::CondJump(c, l, r, lbl) => l1::Instruction::CondJump(c, op(l), op(r), lbl),
    }
}

fn lower_term(colors: &FxHashMap<crate::common::Var, PhysReg>, term: &l2::Terminator) -> l1::Terminator {
    match term {
        l2::Terminator::ReturnVoid => l1::Terminator::ReturnVoid,
        l2::Terminator::ReturnValue(v) => l1::Terminator::ReturnValue(lower_operand(colors, *v)),
        l2::Terminator::Jump(l) => l1::Terminator::Jump(*l),
        l2::Terminator::Fallthrough => l1::Terminator::Fallthrough,
    }
}

/// The deepest `rsp`-relative displacement `func`'s body addresses —
/// outgoing call-argument slots (`l3::tile::Tiler::emit_call_args`) and
/// spill slots (`l2::regalloc::SpillInfo`) alike — so `l12s` knows how
/// much stack space a prologue must reserve (SPEC_FULL.md §13).
fn frame_size(func: &l2::Function) -> u32 {
    let mut floor = 0i64;
    for (_, bb) in func.blocks.iter() {
        for inst in &bb.insts {
            let disp = match inst {
                l2::Instruction::Load(_, Reg::Physical(PhysReg::Rsp), d) => Some(*d),
                l2::Instruction::Store(Reg::Physical(PhysReg::Rsp), d, _) => Some(*d),
                _ => None,
            };
            if let Some(d) = disp {
                floor = floor.min(d);
            }
        }
    }
    (-floor) as u32
}

/// The same deepest-displacement scan as [`frame_size`], applied directly
/// to an already-lowered `L1` function — used by `super::parser` to
/// recover `frame_size` for a program parsed straight from text, which
/// never goes through [`lower_function`].
pub(crate) fn frame_size_of(func: &Function) -> u32 {
    let mut floor = 0i64;
    for (_, bb) in func.blocks.iter() {
        for inst in &bb.insts {
            let disp = match inst {
                l1::Instruction::Load(_, PhysReg::Rsp, d) => Some(*d),
                l1::Instruction::Store(PhysReg::Rsp, d, _) => Some(*d),
                _ => None,
            };
            if let Some(d) = disp {
                floor = floor.min(d);
            }
        }
    }
    (-floor) as u32
}

pub fn lower_function(func: &l2::Function, alloc: &Allocation) -> Function {
    let frame_size = frame_size(func);
    let param_regs = func.params.iter().map(|v| alloc.colors[v]).collect();

    let mut blocks = lnc_entity::PrimaryMap::new();
    for (_, bb) in func.blocks.iter() {
        blocks.push(l1::BasicBlock {
            label: bb.label,
            insts: bb.insts.iter().map(|i| lower_inst(&alloc.colors, i)).collect(),
            term: lower_term(&alloc.colors, &bb.term),
        });
    }

    let mut label_block = lnc_entity::SecondaryMap::new();
    for i in 0..func.label_block.len() {
        let l = crate::common::Lbl::new(i);
        label_block[l] = func.label_block[l];
    }

    Function {
        name: func.name.clone(),
        param_regs,
        returns_value: func.returns_value,
        label_names: func.label_names.clone(),
        blocks,
        entry: func.entry,
        label_block,
        frame_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ArithOp, Var};
    use crate::l2::ast::{BasicBlock, Terminator, VarInfo};
    use lnc_entity::PrimaryMap;

    fn one_block_function() -> l2::Function {
        let a = Var::new(0);
        let b = Var::new(1);
        let mut vars = PrimaryMap::new();
        vars.push(VarInfo { name: "a".into() });
        vars.push(VarInfo { name: "b".into() });
        let mut labels: PrimaryMap<crate::common::Lbl, ()> = PrimaryMap::new();
        let entry_label = labels.push(());
        let mut blocks = PrimaryMap::new();
        let entry = blocks.push(BasicBlock {
            label: entry_label,
            insts: vec![
                l2::Instruction::Assign(Reg::Virtual(a), l2::Operand::Num(1)),
                l2::Instruction::Arith(Reg::Virtual(a), ArithOp::Add, l2::Operand::Reg(Reg::Virtual(b))),
            ],
            term: Terminator::ReturnValue(l2::Operand::Reg(Reg::Virtual(a))),
        });
        let mut label_block = lnc_entity::SecondaryMap::new();
        label_block[entry_label] = Some(entry);
        l2::Function {
            name: "f".into(),
            params: vec![a, b],
            returns_value: true,
            vars,
            label_names: lnc_entity::SecondaryMap::new(),
            blocks,
            entry,
            label_block,
            next_var_suffix: 0,
        }
    }

    #[test]
    fn every_operand_is_physical_after_lowering() {
        let mut func = one_block_function();
        let alloc = l2::regalloc::allocate(&mut func).unwrap();
        let lowered = lower_function(&func, &alloc);
        let bb = &lowered.blocks[lowered.entry];
        assert_eq!(bb.insts.len(), 2);
        assert_eq!(lowered.param_regs.len(), 2);
        assert_eq!(lowered.param_regs[0], PhysReg::Rdi);
    }

    #[test]
    fn frame_size_reflects_deepest_spill_slot() {
        let mut func = one_block_function();
        let alloc = l2::regalloc::allocate(&mut func).unwrap();
        let lowered = lower_function(&func, &alloc);
        assert_eq!(lowered.frame_size, frame_size(&func));
    }
}
