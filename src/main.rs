use clap::Parser;
use rotator::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    rotator::cli::init_tracing();
    run(Cli::parse())
}
