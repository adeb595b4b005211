//! The physical x86-64 general-purpose register bank.
//!
//! Modeled after `cranelift-codegen::isa::registers::RegBank` /
//! `RegClassData`, flattened to the one register bank this teaching
//! compiler targets (integer GPRs; there are no floating-point values in
//! the source language). `rsp` and `rbp` are reserved for the stack and
//! frame pointer and are never handed out by the allocator (spec.md §4.1:
//! "the stack pointer register is never considered live").

use std::fmt;

/// One of the sixteen x86-64 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PhysReg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl PhysReg {
    /// All sixteen registers, in a fixed canonical order used for
    /// deterministic iteration (interference-graph clique construction,
    /// printing).
    pub const ALL: [PhysReg; 16] = [
        PhysReg::Rax,
        PhysReg::Rbx,
        PhysReg::Rcx,
        PhysReg::Rdx,
        PhysReg::Rsi,
        PhysReg::Rdi,
        PhysReg::Rbp,
        PhysReg::Rsp,
        PhysReg::R8,
        PhysReg::R9,
        PhysReg::R10,
        PhysReg::R11,
        PhysReg::R12,
        PhysReg::R13,
        PhysReg::R14,
        PhysReg::R15,
    ];

    /// Registers available to the allocator: every GPR except `rsp`/`rbp`,
    /// which are reserved for the stack and frame pointers.
    pub const ALLOCATABLE: [PhysReg; 14] = [
        PhysReg::Rax,
        PhysReg::Rbx,
        PhysReg::Rcx,
        PhysReg::Rdx,
        PhysReg::Rsi,
        PhysReg::Rdi,
        PhysReg::R8,
        PhysReg::R9,
        PhysReg::R10,
        PhysReg::R11,
        PhysReg::R12,
        PhysReg::R13,
        PhysReg::R14,
        PhysReg::R15,
    ];

    /// Caller-saved (volatile) registers, preferred first by the allocator
    /// (spec.md §4.3 step 2: "caller-saved first, then callee-saved").
    pub const CALLER_SAVED: [PhysReg; 9] = [
        PhysReg::Rax,
        PhysReg::Rcx,
        PhysReg::Rdx,
        PhysReg::Rsi,
        PhysReg::Rdi,
        PhysReg::R8,
        PhysReg::R9,
        PhysReg::R10,
        PhysReg::R11,
    ];

    /// Callee-saved (non-volatile) registers.
    pub const CALLEE_SAVED: [PhysReg; 5] = [
        PhysReg::Rbx,
        PhysReg::R12,
        PhysReg::R13,
        PhysReg::R14,
        PhysReg::R15,
    ];

    /// The System V x86-64 integer argument registers, in argument order.
    /// Spec.md §4.6: "move the first six arguments into the argument
    /// registers."
    pub const ARGUMENT: [PhysReg; 6] = [
        PhysReg::Rdi,
        PhysReg::Rsi,
        PhysReg::Rdx,
        PhysReg::Rcx,
        PhysReg::R8,
        PhysReg::R9,
    ];

    /// The register a variable-count shift amount must be loaded into.
    /// Spec.md §4.2 / §4.6: "the shift-amount variable is made to
    /// interfere with every general-purpose register except the
    /// designated shift-count register."
    pub const SHIFT_COUNT: PhysReg = PhysReg::Rcx;

    /// The register that holds a function's return value.
    pub const RETURN_VALUE: PhysReg = PhysReg::Rax;

    /// Allocation preference order: caller-saved registers first, then
    /// callee-saved, with the shift-count register pushed to the very end
    /// so it is only assigned when nothing else remains (spec.md §4.3
    /// step 2: "avoiding the shift-count register unless needed").
    pub fn preference_order() -> impl Iterator<Item = PhysReg> {
        Self::CALLER_SAVED
            .into_iter()
            .chain(Self::CALLEE_SAVED)
            .filter(|r| *r != Self::SHIFT_COUNT)
            .chain(std::iter::once(Self::SHIFT_COUNT))
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PhysReg::Rax => "rax",
            PhysReg::Rbx => "rbx",
            PhysReg::Rcx => "rcx",
            PhysReg::Rdx => "rdx",
            PhysReg::Rsi => "rsi",
            PhysReg::Rdi => "rdi",
            PhysReg::Rbp => "rbp",
            PhysReg::Rsp => "rsp",
            PhysReg::R8 => "r8",
            PhysReg::R9 => "r9",
            PhysReg::R10 => "r10",
            PhysReg::R11 => "r11",
            PhysReg::R12 => "r12",
            PhysReg::R13 => "r13",
            PhysReg::R14 => "r14",
            PhysReg::R15 => "r15",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PhysReg {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        Ok(match s {
            "rax" => PhysReg::Rax,
            "rbx" => PhysReg::Rbx,
            "rcx" => PhysReg::Rcx,
            "rdx" => PhysReg::Rdx,
            "rsi" => PhysReg::Rsi,
            "rdi" => PhysReg::Rdi,
            "rbp" => PhysReg::Rbp,
            "rsp" => PhysReg::Rsp,
            "r8" => PhysReg::R8,
            "r9" => PhysReg::R9,
            "r10" => PhysReg::R10,
            "r11" => PhysReg::R11,
            "r12" => PhysReg::R12,
            "r13" => PhysReg::R13,
            "r14" => PhysReg::R14,
            "r15" => PhysReg::R15,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_count_is_last_in_preference_order() {
        let order: Vec<_> = PhysReg::preference_order().collect();
        assert_eq!(order.last(), Some(&PhysReg::SHIFT_COUNT));
        assert_eq!(order.len(), PhysReg::ALLOCATABLE.len());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for r in PhysReg::ALL {
            let s = r.to_string();
            assert_eq!(s.parse::<PhysReg>().unwrap(), r);
        }
    }
}
