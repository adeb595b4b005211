//! L1: `L2` with every variable resolved to a physical register (spec.md
//! §4.3). Produced from `L2` by [`lower::lower_program`], which drives
//! [`crate::l2::regalloc::allocate`] to completion; consumed by
//! [`asm::emit_program`] (`l12s`) to produce the final textual assembly
//! listing.

pub mod asm;
mod ast;
mod cfg;
mod lower;
mod parser;
mod printer;

pub use ast::*;
pub use cfg::ControlFlowGraph;
pub use lower::{lower_function, lower_program};
pub use parser::parse_program;
pub use printer::print_program;
