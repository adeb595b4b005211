//! L2: the tiler's target language — two-address arithmetic, one-sided
//! conditional jumps, and a register file of `variables ∪ physical
//! registers` (spec.md §4.6, §3). Produced from a scheduled `IR` function
//! by [`crate::l3::lower_function`]; consumed by [`regalloc::allocate`]
//! to produce `L1`.

pub mod ast;
pub mod cfg;
pub mod dce;
pub mod interference;
pub mod liveness;
pub mod parser;
pub mod printer;
pub mod regalloc;

pub use ast::*;
pub use cfg::ControlFlowGraph;
pub use parser::parse_program;
pub use printer::print_program;
