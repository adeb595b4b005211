//! LA: a typed, flat control-flow graph — the first level with real basic
//! blocks, labels, and two-target conditional branches. Produced from LB
//! by [`crate::lb::lower_program`]; consumed by [`lower::lower_program`]
//! to produce `IR`.

mod ast;
mod cfg;
mod lower;
mod parser;
mod printer;

pub use ast::*;
pub use cfg::ControlFlowGraph;
pub use lower::lower_program;
pub use parser::parse_program;
pub use printer::print_program;
