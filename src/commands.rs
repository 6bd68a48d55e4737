//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a YAML test scenario against the configured VM
    ///
    /// Exits 0 when the test passed, 1 when it failed and 2 when it aborted.
    Run {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Print the run report as JSON instead of the step list
        #[arg(long)]
        json: bool,

        /// Configuration file (default: the user config dir)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Directory for the keyval result file
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Also write logs to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Validate a scenario file and check the configured commands exist
    Check {
        /// Path to the YAML test scenario file
        path: PathBuf,

        /// Configuration file (default: the user config dir)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}
