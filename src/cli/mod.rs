//! CLI command handling
//!
//! Dispatches CLI commands and maps run outcomes to exit codes.

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::testing::{self, RunOptions};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            path,
            verbose,
            json,
            config,
            results_dir,
            log_file: _,
        } => {
            let config = Config::load(config.as_deref())?;
            let options = RunOptions {
                verbose,
                json,
                results_dir,
            };

            let report = testing::run_scenario(&path, &config, &options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            if let Some(failure) = report.outcome.failure() {
                tracing::error!("{}", failure);
            }

            Ok(report.outcome.exit_code())
        }

        Commands::Check { path, config } => {
            let config = Config::load(config.as_deref())?;
            let missing = testing::check_scenario(&path, &config)?;
            testing::require_programs(missing)?;
            println!("\nScenario is valid and all programs were found.");
            Ok(0)
        }
    }
}
