//! VM scenario CLI - runs guest save/restore and time drift tests
//!
//! Each run drives a VM through a scripted scenario and exits with 0 on
//! pass, 1 on failure and 2 when the run was aborted.

use clap::Parser;
use commands::Commands;
use vmscenario::{cli, commands, common::logging};

#[derive(Parser)]
#[command(name = "vmscenario", about = "VM save/restore and time drift test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (verbose, log_file) = match &cli.command {
        Commands::Run {
            verbose, log_file, ..
        } => (*verbose, log_file.clone()),
        Commands::Check { .. } => (false, None),
    };

    // Keep the guard alive so the log file is flushed on exit
    let guard = match logging::init_cli(verbose, log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e}");
            std::process::exit(2);
        }
    };

    match cli::dispatch(cli.command).await {
        Ok(code) => {
            drop(guard);
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            drop(guard);
            std::process::exit(2);
        }
    }
}
