//! VM test cases
//!
//! Reads YAML test scenarios, builds one of the known cases from their
//! parameters and runs it against the VM named in the configuration.

mod config;
mod runner;
pub mod save_restore;
pub mod time_drift;

pub use config::*;
pub use runner::{
    backend_env, build_scenario, check_scenario, print_report, require_programs, run_scenario,
    RunOptions,
};
