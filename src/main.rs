use clap::Parser;

mod assembler;
mod cli;
mod error;
mod script;

use crate::assembler::Assembler;
use crate::cli::Args;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let assembler = Assembler::from_args(args)?;
    assembler.assemble()?;

    Ok(())
}
