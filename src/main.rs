use clap::Parser;
use rebaltrader::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
