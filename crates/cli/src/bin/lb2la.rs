//! `lb2la`: parse `LB`, resolve scopes/shadowing and lower structured
//! control flow into a flat `CFG` (spec.md §4.7), write the result as
//! `prog.a`.

use clap::Parser;
use lnc_cli::{init_logging, read_source, report_compile_error, write_output, PassArgs};
use lnc_ir::lb;

#[derive(Parser, Debug)]
#[command(about = "Lower LB (structured scopes and control flow) to LA")]
struct Cli {
    #[command(flatten)]
    pass: PassArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.pass.debug);

    let source = read_source(&cli.pass.source)?;
    let program = lb::parse_program(&source)
        .map_err(lnc_support::CompileError::from)
        .map_err(report_compile_error)?;
    log::debug!("parsed {} function(s) from {}", program.functions.len(), cli.pass.source.display());

    if cli.pass.verbose {
        print!("{}", lb::print_program(&program));
    }

    let lowered = lb::lower_program(&program)
        .map_err(lnc_support::CompileError::from)
        .map_err(report_compile_error)?;

    write_output("prog.a", &lnc_ir::la::print_program(&lowered))?;
    Ok(())
}
