//! LB: block-structured variable scopes with shadowing, plus structured
//! `if`/`while`/`continue`/`break` control flow (spec.md §4.7).
//!
//! LB is the highest-level IL in the pipeline. Its variables are raw
//! source names, not yet the globally-unique entities the rest of the
//! pipeline uses — the same name may be declared more than once across
//! nested scopes, and which declaration a use resolves to depends on
//! lexical position. That resolution, and the minting of globally-unique
//! names, is the job of [`lower`], not of the parser.

mod ast;
mod lower;
mod parser;
mod printer;

pub use ast::*;
pub use lower::lower_program;
pub use parser::parse_program;
pub use printer::print_program;
