//! Souschef CLI: evaluate recipes into a resource plan.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "souschef",
    version,
    about = "Evaluate configuration recipes into an ordered resource plan"
)]
struct Cli {
    #[command(subcommand)]
    command: souschef::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = souschef::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
