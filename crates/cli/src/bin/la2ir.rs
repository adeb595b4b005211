//! `la2ir`: parse `LA`, encode every value as a tagged integer and lower
//! structural/array/tuple operations into explicit runtime-error branches
//! (spec.md §4.8), write the result as `prog.IR`.

use clap::Parser;
use lnc_cli::{init_logging, read_source, report_compile_error, write_output, PassArgs};
use lnc_ir::la;

#[derive(Parser, Debug)]
#[command(about = "Lower LA (typed flat CFG) to IR (tagged, safety-checked)")]
struct Cli {
    #[command(flatten)]
    pass: PassArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.pass.debug);

    let source = read_source(&cli.pass.source)?;
    let program = la::parse_program(&source)
        .map_err(lnc_support::CompileError::from)
        .map_err(report_compile_error)?;
    log::debug!("parsed {} function(s) from {}", program.functions.len(), cli.pass.source.display());

    if cli.pass.verbose {
        print!("{}", la::print_program(&program));
    }

    let lowered = la::lower_program(&program);

    write_output("prog.IR", &lnc_ir::ir::print_program(&lowered))?;
    Ok(())
}
