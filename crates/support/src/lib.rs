//! Diagnostics, the runtime-function table, and the x86-64 register model
//! shared by every pass in the `lnc` pipeline.

pub mod error;
pub mod registers;
pub mod runtime;

pub use error::{CompileError, Location, ParseError, ParseResult};
