use clap::Parser;
use routeforge::cli::{run_cli, Cli};
use routeforge::logging::init_logging;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("warning: {e:#}");
    }
    if let Err(e) = run_cli(cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
