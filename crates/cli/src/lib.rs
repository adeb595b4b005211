//! The shared shell of the five pass executables (spec.md §6; SPEC_FULL.md
//! §11). Each binary in `src/bin/` is a thin driver: it flattens
//! [`PassArgs`] into its own `clap::Parser`, reads `SOURCE`, calls into
//! `lnc_ir`, and writes the fixed-name output file of the next IL.
//!
//! Exit-code and abort discipline follows spec.md §7 directly: a CLI
//! usage error (bad flags, missing file) is caught by `main` and turned
//! into exit code 1 via `anyhow::Result`; an `InputMalformed` or
//! `ResourceExhausted` `CompileError` is also reported that way, since
//! both are genuine possibilities for well-formed but invalid/large
//! input; an `AnalysisInvariantViolated` is instead allowed to panic,
//! matching "abort; indicates a bug" — see [`expect_sound`].

use anyhow::Context;
use clap::Args;
use lnc_support::CompileError;
use std::path::{Path, PathBuf};

/// Flags shared by every pass executable (spec.md §6: `-v -g -O -s -l -i
/// -d SOURCE`). Flattened with `#[command(flatten)]` into each binary's
/// own `clap::Parser` struct rather than duplicated, following the
/// teacher's pattern of sharing one flag struct across a family of
/// related binaries.
#[derive(Args, Debug)]
pub struct PassArgs {
    /// Dump the parsed input program's pretty-printed form to stdout
    /// before lowering.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Enable code generation. Advisory for most passes; on by default.
    #[arg(short = 'g', value_name = "0|1")]
    pub codegen: Option<u8>,

    /// Optimisation level. Advisory only — no optimisation beyond trace
    /// scheduling and dead-move elimination is implemented regardless of
    /// this flag's value (spec.md §7, SPEC_FULL.md §13).
    #[arg(short = 'O', value_name = "0|1|2")]
    pub opt_level: Option<u8>,

    /// Restrict `l22l1` to spill-summary-only output (mutually exclusive
    /// with `-l`/`-i`; spec.md §6, "used for testing").
    #[arg(short = 's', conflicts_with_all = ["liveness_only", "interference_only"])]
    pub spill_only: bool,

    /// Restrict `l22l1` to liveness-only output.
    #[arg(short = 'l', conflicts_with_all = ["spill_only", "interference_only"])]
    pub liveness_only: bool,

    /// Restrict `l22l1` to interference-graph-only output.
    #[arg(short = 'i', conflicts_with_all = ["spill_only", "liveness_only"])]
    pub interference_only: bool,

    /// Enable debug logging on stderr.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// The input source file for this pass.
    pub source: PathBuf,
}

impl PassArgs {
    /// Any of `-s`/`-l`/`-i` requested a restricted-output mode.
    pub fn restricted_mode(&self) -> bool {
        self.spill_only || self.liveness_only || self.interference_only
    }
}

/// Install `env_logger`, yellow debug records on stderr when `-d` is set
/// (spec.md §6), quiet (warnings and above only) otherwise.
pub fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Read `path`'s contents, wrapping any I/O failure as a CLI usage error
/// (spec.md §7 does not cover "file does not exist" — it is not a
/// compiler error at all, just the ordinary `anyhow::Context` path every
/// CLI takes).
pub fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Write `content` to `name` in the current working directory — the
/// fixed output-file convention of spec.md §6.
pub fn write_output(name: &str, content: &str) -> anyhow::Result<()> {
    std::fs::write(name, content).with_context(|| format!("failed to write {name}"))
}

/// A pass whose only possible `CompileError` outcomes are
/// `InputMalformed` (a CLI-reportable error, spec.md §7) or
/// `AnalysisInvariantViolated` (a bug: panic, don't report). Most passes
/// see only the first in practice, since their input has already survived
/// the previous pass's own invariants, but this still surfaces a clean
/// message for the input-malformed case instead of panicking on it too.
pub fn report_compile_error(err: CompileError) -> anyhow::Error {
    match err {
        CompileError::AnalysisInvariantViolated(msg) => {
            panic!("internal invariant violated: {msg}")
        }
        other => anyhow::Error::from(other),
    }
}
