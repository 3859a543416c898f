use backflow::cli::{Cli, init_tracing, run};
use clap::Parser;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
