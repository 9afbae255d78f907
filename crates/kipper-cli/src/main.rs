//! Kipper-Log - automatic truck load logging for construction sites
//!
//! A CLI tool that manages sites, loading zones and recorded loads, and
//! replays position tracks through the geofence detector.

mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();
    kipper_app::logging::init_logging(cli.verbose);

    if let Err(e) = commands::execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
