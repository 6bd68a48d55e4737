//! VM scenario runner - guest save/restore and time drift tests
//!
//! A scenario is an ordered list of labelled steps run against a VM, its
//! guest OS and the host. The runner reports a single outcome per run,
//! always runs cleanup steps and flags when the guest image needs restoring.

pub mod backend;
pub mod cli;
pub mod commands;
pub mod common;
pub mod guest;
pub mod scenario;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use scenario::{Outcome, RunReport, Scenario, ScenarioRunner, Step};
