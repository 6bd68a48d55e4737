//! Scenario runner core
//!
//! A scenario is an ordered list of labelled steps run against injected
//! collaborators. The runner tracks which step is active so every failure is
//! reported with its context, bounds waits by per-step and overall timeouts,
//! always runs finalizers, and classifies the end of a run as passed, failed
//! or aborted.

mod context;
mod outcome;
mod params;
mod runner;
mod step;

pub use context::{ExecutionContext, Metrics};
pub use outcome::{ErrorKind, Failure, Outcome, Remediation, RunReport, StepError, Warning};
pub use params::{ParamValue, Parameters};
pub use runner::ScenarioRunner;
pub use step::{Check, Scenario, Step, StepFuture, StepResult};
