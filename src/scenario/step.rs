//! Scenario definition: steps, closing checks and the scenario builder

use futures_util::future::BoxFuture;
use std::fmt;
use std::time::Duration;

use super::context::ExecutionContext;
use super::outcome::{Remediation, StepError};
use super::params::Parameters;

/// What a step action yields: an optional measured value
pub type StepResult = Result<Option<f64>, StepError>;

/// Boxed future returned by a step action
pub type StepFuture<'a> = BoxFuture<'a, StepResult>;

type Action<E> =
    Box<dyn for<'a> FnOnce(&'a mut E, &'a mut ExecutionContext) -> StepFuture<'a> + Send>;

/// One labelled unit of scenario execution
///
/// The action receives the collaborators `E` and the execution context. It
/// runs at most once.
pub struct Step<E> {
    pub(crate) label: String,
    pub(crate) action: Action<E>,
    pub(crate) metric: Option<String>,
    pub(crate) timeout: Option<Duration>,
}

impl<E> Step<E> {
    pub fn new<F>(label: impl Into<String>, action: F) -> Self
    where
        F: for<'a> FnOnce(&'a mut E, &'a mut ExecutionContext) -> StepFuture<'a> + Send + 'static,
    {
        Self {
            label: label.into(),
            action: Box::new(action),
            metric: None,
            timeout: None,
        }
    }

    /// Store the value produced by the action under `name`
    pub fn record_as(mut self, name: &str) -> Self {
        self.metric = Some(name.to_string());
        self
    }

    /// Bound the whole action by `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<E> fmt::Debug for Step<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("label", &self.label)
            .field("metric", &self.metric)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Closing assertion evaluated after every step has run
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub label: String,
    pub metric: String,
    /// Inclusive upper bound
    pub bound: f64,
}

impl Check {
    /// Passes when `metric <= bound`
    pub fn at_most(label: impl Into<String>, metric: &str, bound: f64) -> Self {
        Self {
            label: label.into(),
            metric: metric.to_string(),
            bound,
        }
    }
}

/// An ordered, named list of steps
pub struct Scenario<E> {
    pub(crate) name: String,
    pub(crate) params: Parameters,
    pub(crate) setup: Vec<Step<E>>,
    pub(crate) steps: Vec<Step<E>>,
    pub(crate) finalizers: Vec<Step<E>>,
    pub(crate) checks: Vec<Check>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) remediation: Remediation,
}

impl<E> Scenario<E> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Parameters::default(),
            setup: Vec::new(),
            steps: Vec::new(),
            finalizers: Vec::new(),
            checks: Vec::new(),
            deadline: None,
            remediation: Remediation::RestoreImage,
        }
    }

    pub fn params(mut self, params: Parameters) -> Self {
        self.params = params;
        self
    }

    /// Runs before the main steps; a failure here skips the finalizers
    pub fn setup(mut self, step: Step<E>) -> Self {
        self.setup.push(step);
        self
    }

    pub fn step(mut self, step: Step<E>) -> Self {
        self.steps.push(step);
        self
    }

    /// Runs after the main steps even if one of them failed
    pub fn finally(mut self, step: Step<E>) -> Self {
        self.finalizers.push(step);
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Overall bound on setup and main steps, measured by the runner's clock
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Remediation flagged when a finalizer fails
    pub fn on_cleanup_failure(mut self, remediation: Remediation) -> Self {
        self.remediation = remediation;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of setup, main and finalizer steps
    pub fn len(&self) -> usize {
        self.setup.len() + self.steps.len() + self.finalizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.steps.is_empty()
    }

    /// Labels of all steps in execution order
    pub fn labels(&self) -> Vec<&str> {
        self.setup
            .iter()
            .chain(&self.steps)
            .chain(&self.finalizers)
            .map(|s| s.label())
            .collect()
    }
}
