//! `ir2l2`: parse `IR`, trace-schedule each function's blocks (spec.md
//! §4.9), tile the scheduled trees into two-address `L2` instructions
//! (spec.md §4.6), and eliminate dead code, writing the result as
//! `prog.L2`.

use clap::Parser;
use lnc_cli::{init_logging, read_source, report_compile_error, write_output, PassArgs};
use lnc_ir::{ir, l2, l3};

#[derive(Parser, Debug)]
#[command(about = "Schedule and tile IR into L2")]
struct Cli {
    #[command(flatten)]
    pass: PassArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.pass.debug);

    let source = read_source(&cli.pass.source)?;
    let mut program = ir::parse_program(&source)
        .map_err(lnc_support::CompileError::from)
        .map_err(report_compile_error)?;
    log::debug!("parsed {} function(s) from {}", program.functions.len(), cli.pass.source.display());

    if cli.pass.verbose {
        print!("{}", ir::print_program(&program));
    }

    for func in &mut program.functions {
        ir::trace::schedule(func).map_err(report_compile_error)?;
        log::debug!("scheduled {} into {} block(s)", func.name, func.blocks.len());
    }

    let mut lowered: l2::Program = l3::lower_program(&program);
    for func in &mut lowered.functions {
        l2::dce::eliminate(func);
    }

    write_output("prog.L2", &l2::print_program(&lowered))?;
    Ok(())
}
