//! The core transformations of the `lnc` teaching compiler.
//!
//! Five progressively simpler intermediate languages, one module per
//! level plus the glue between adjacent levels:
//!
//! ```text
//! lb  --lower-->  la  --lower-->  ir  --schedule+tile-->  l2  --allocate-->  l1
//! ```
//!
//! `l3` is not a top-level pipeline stage with its own textual file; it is
//! the in-memory three-address view built and consumed entirely inside
//! `ir::lower` immediately before tiling (see SPEC_FULL.md §0).

pub mod common;
mod lexer;
pub mod l1;
pub mod l2;
pub mod l3;
pub mod la;
pub mod lb;
pub mod ir;
