//! musorg - sample-library organizer.
//!
//! Entry point for the CLI.

use clap::Parser;
use musorg::cli::Cli;
use musorg::error::ExitCode;

fn main() {
    let cli = Cli::parse();

    match musorg::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    }
}
