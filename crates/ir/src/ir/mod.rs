mod ast;
mod cfg;
pub mod trace;
mod parser;
mod printer;

pub use ast::*;
pub use cfg::ControlFlowGraph;
pub use parser::parse_program;
pub use printer::print_program;
