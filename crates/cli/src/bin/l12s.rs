//! `l12s`: parse `L1` and emit a textual AT&T-syntax assembly listing
//! (spec.md §4.6, SPEC_FULL.md §13). No assembling, linking, or
//! execution — the output is written as `prog.S` and nothing more is
//! done with it.

use clap::Parser;
use lnc_cli::{init_logging, read_source, report_compile_error, write_output, PassArgs};
use lnc_ir::l1;

#[derive(Parser, Debug)]
#[command(about = "Emit L1 as a textual AT&T assembly listing")]
struct Cli {
    #[command(flatten)]
    pass: PassArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.pass.debug);

    let source = read_source(&cli.pass.source)?;
    let program = l1::parse_program(&source)
        .map_err(lnc_support::CompileError::from)
        .map_err(report_compile_error)?;
    log::debug!("parsed {} function(s) from {}", program.functions.len(), cli.pass.source.display());

    if cli.pass.verbose {
        print!("{}", l1::print_program(&program));
    }

    write_output("prog.S", &l1::asm::emit_program(&program))?;
    Ok(())
}
