//! geotrack CLI
//!
//! Drives the tracking controller against the simulated platform and
//! manages the configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "geotrack")]
#[command(version, about = "Background location tracking controller", long_about = None)]
struct Cli {
    /// Force debug-level logging (overrides RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against a simulated device
    Simulate(SimulateArgs),

    /// Manage ~/.geotrack/config.ini
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args, cli.debug),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
