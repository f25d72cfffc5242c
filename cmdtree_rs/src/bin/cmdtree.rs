use std::process::ExitCode;

use clap::Parser;
use cmdtree::cli::{CliArgs, run};

fn main() -> ExitCode {
    run(CliArgs::parse())
}
