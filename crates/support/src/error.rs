//! Source locations and the error taxonomy of spec.md §7.
//!
//! `Location` and `ParseError` follow `cranelift-reader`'s error module:
//! a location is just a line number (command-line arguments are line 0,
//! source lines start at 1), and a parse error pairs that location with a
//! message. `CompileError` generalizes this to the three error kinds a
//! pass can produce; the fourth kind from spec.md §7 ("user-runtime") is
//! not a Rust error at all — it is lowered into branches to a runtime
//! error handler and never escapes the compiler (see `lnc_ir::la::lower`).

use std::fmt;

/// The location of a token or error: a 1-based source line, or 0 for
/// command-line arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct Location {
    /// Line number. Command-line arguments are line 0 and source file
    /// lines start from 1.
    pub line_number: u32,
}

impl Location {
    /// Construct a location at a 1-based source line.
    pub fn at_line(line_number: u32) -> Self {
        Self { line_number }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.line_number == 0 {
            write!(f, "command-line arguments")
        } else {
            write!(f, "line {}", self.line_number)
        }
    }
}

/// A parse error: grammar mismatch, duplicate declaration, or reference to
/// an undeclared name. Always fatal to the enclosing pass — spec.md §7
/// classifies these as "input-malformed" and says "abort with message; do
/// not attempt recovery."
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Where the error was found.
    pub location: Location,
    /// Human-readable message.
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Result of a parser operation.
pub type ParseResult<T> = Result<T, ParseError>;

/// Build a `ParseError` at `loc` with a formatted message.
#[macro_export]
macro_rules! parse_err {
    ( $loc:expr, $msg:expr ) => {
        Err($crate::ParseError {
            location: $loc,
            message: $msg.to_string(),
        })
    };
    ( $loc:expr, $fmt:expr, $( $arg:expr ),+ ) => {
        Err($crate::ParseError {
            location: $loc,
            message: format!( $fmt, $( $arg ),+ ),
        })
    };
}

/// The three error kinds a pass can surface, per spec.md §7. A fourth kind,
/// "user-runtime" (null pointer, out-of-range index, tuple misuse), is
/// intentionally absent: those are not compiler errors, they are lowered
/// into deterministic branches to a runtime error entry point.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    /// Grammar mismatch, duplicate declaration, or undeclared reference.
    #[error("{0}")]
    InputMalformed(#[from] ParseError),

    /// An internal invariant was violated: a malformed CFG, an unmatched
    /// tile, an attempt to decode a non-decodable type. Spec.md §7 treats
    /// these as compiler bugs, not user errors.
    #[error("internal invariant violated: {0}")]
    AnalysisInvariantViolated(String),

    /// Iterated graph colouring could not make progress through the normal
    /// simplify/spill loop and fell back to spilling every remaining
    /// uncoloured variable unconditionally. Not fatal — spec.md §7 calls
    /// this "not fatal; falls back to spill-all" — callers that want to
    /// surface it as a diagnostic can match on this variant; the pipeline
    /// itself proceeds.
    #[error("register allocation exhausted normal spilling, spilled all remaining variables in {0}")]
    ResourceExhausted(String),
}
