//! The runtime function table (spec.md §1, §6).
//!
//! The runtime is "an opaque library" outside this system's scope: `lnc`
//! never links or executes it. All a lowering pass needs is each entry
//! point's name and arity so it can emit a correctly-shaped call.

use std::fmt;

/// One of the five fixed runtime entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeFn {
    /// `print(value)` — 1 argument.
    Print,
    /// `input()` — 0 arguments.
    Input,
    /// `allocate(size, fill)` — 2 arguments.
    Allocate,
    /// `tuple-error(...)` — exactly 3 arguments.
    TupleError,
    /// `tensor-error(...)` — 1, 3, or 4 arguments depending on context.
    TensorError,
}

impl RuntimeFn {
    /// The symbolic name used in IL text and in emitted calls.
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::Print => "print",
            RuntimeFn::Input => "input",
            RuntimeFn::Allocate => "allocate",
            RuntimeFn::TupleError => "tuple-error",
            RuntimeFn::TensorError => "tensor-error",
        }
    }

    /// Whether `argc` is an arity this runtime function accepts.
    pub fn accepts_arity(self, argc: usize) -> bool {
        match self {
            RuntimeFn::Print => argc == 1,
            RuntimeFn::Input => argc == 0,
            RuntimeFn::Allocate => argc == 2,
            RuntimeFn::TupleError => argc == 3,
            RuntimeFn::TensorError => matches!(argc, 1 | 3 | 4),
        }
    }

    /// Look up a runtime function by its textual name.
    pub fn from_name(name: &str) -> Option<RuntimeFn> {
        Some(match name {
            "print" => RuntimeFn::Print,
            "input" => RuntimeFn::Input,
            "allocate" => RuntimeFn::Allocate,
            "tuple-error" => RuntimeFn::TupleError,
            "tensor-error" => RuntimeFn::TensorError,
            _ => return None,
        })
    }
}

impl fmt::Display for RuntimeFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_error_is_variadic_over_fixed_arities() {
        assert!(RuntimeFn::TensorError.accepts_arity(1));
        assert!(RuntimeFn::TensorError.accepts_arity(3));
        assert!(RuntimeFn::TensorError.accepts_arity(4));
        assert!(!RuntimeFn::TensorError.accepts_arity(2));
    }

    #[test]
    fn name_round_trips() {
        for f in [
            RuntimeFn::Print,
            RuntimeFn::Input,
            RuntimeFn::Allocate,
            RuntimeFn::TupleError,
            RuntimeFn::TensorError,
        ] {
            assert_eq!(RuntimeFn::from_name(f.name()), Some(f));
        }
    }
}
