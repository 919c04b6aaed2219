use std::process::ExitCode;

use clap::Parser;
use sciipaint::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    logger::init(args.log_level(), args.log_file);

    cli::run(args)
}
