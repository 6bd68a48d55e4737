//! Step errors, terminal outcomes and the run report

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::context::Metrics;
use crate::common;

/// Classification of a step failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A bounded wait expired
    Timeout,
    /// The guest survived an action that should have crashed it
    UnexpectedAlive,
    /// More crash markers than the one intentionally induced
    MultipleCrashes,
    /// A measured value is beyond its configured bound
    ThresholdExceeded,
    /// A finalizer could not release a resource
    ResourceCleanupFailed,
    /// A collaborator (VM, guest, host, sink) raised an error
    Collaborator,
    /// Harness misuse, e.g. a metric written twice
    Internal,
}

impl ErrorKind {
    /// Fatal kinds abort the run instead of failing it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Collaborator | Self::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::UnexpectedAlive => "unexpected alive",
            Self::MultipleCrashes => "multiple crashes",
            Self::ThresholdExceeded => "threshold exceeded",
            Self::ResourceCleanupFailed => "resource cleanup failed",
            Self::Collaborator => "collaborator error",
            Self::Internal => "internal error",
        };
        write!(f, "{}", name)
    }
}

/// Error returned by a step action
#[derive(Error, Debug)]
pub enum StepError {
    #[error("{what} timed out after {}s", .after.as_secs_f64())]
    Timeout { what: String, after: Duration },

    #[error(
        "Scenario deadline of {}s exceeded after {}s",
        .limit.as_secs_f64(),
        .elapsed.as_secs_f64()
    )]
    DeadlineExceeded { elapsed: Duration, limit: Duration },

    #[error("Guest OS still alive after {0}")]
    UnexpectedAlive(String),

    #[error(
        "Got multiple kernel crashes ({count} markers). Please note that one of them was \
         intentionally generated by this test.\n{details}"
    )]
    MultipleCrashes { count: usize, details: String },

    #[error("{metric} = {value} exceeds bound {bound}")]
    ThresholdExceeded {
        metric: String,
        value: f64,
        bound: f64,
    },

    #[error("Cleanup failed: {0}")]
    ResourceCleanupFailed(String),

    #[error(transparent)]
    Collaborator(common::Error),

    #[error("Metric '{0}' already recorded")]
    DuplicateMetric(String),

    #[error("{0}")]
    Internal(String),
}

impl StepError {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Timeout,
            Self::UnexpectedAlive(_) => ErrorKind::UnexpectedAlive,
            Self::MultipleCrashes { .. } => ErrorKind::MultipleCrashes,
            Self::ThresholdExceeded { .. } => ErrorKind::ThresholdExceeded,
            Self::ResourceCleanupFailed(_) => ErrorKind::ResourceCleanupFailed,
            Self::Collaborator(_) => ErrorKind::Collaborator,
            Self::DuplicateMetric(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<common::Error> for StepError {
    fn from(e: common::Error) -> Self {
        match e {
            common::Error::CommandTimeout { command, after } => Self::Timeout {
                what: format!("Command '{}'", command),
                after,
            },
            other => Self::Collaborator(other),
        }
    }
}

/// A failure together with the step it happened in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    /// Label of the step active when the failure occurred
    pub label: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(label: &str, error: &StepError) -> Self {
        Self {
            label: label.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.label, self.message)
    }
}

/// Terminal result of a scenario run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(Failure),
    Aborted(Failure),
}

impl Outcome {
    /// Classify a step error raised while `label` was active
    pub fn from_error(label: &str, error: &StepError) -> Self {
        let failure = Failure::new(label, error);
        if failure.kind.is_fatal() {
            Self::Aborted(failure)
        } else {
            Self::Failed(failure)
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Passed => None,
            Self::Failed(f) | Self::Aborted(f) => Some(f),
        }
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Failed(_) => 1,
            Self::Aborted(_) => 2,
        }
    }
}

/// Action the surrounding infrastructure must take after the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Remediation {
    /// The guest image may be left in a bad state and must be restored
    RestoreImage,
}

/// A recoverable problem recorded during cleanup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub label: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub outcome: Outcome,
    pub metrics: Metrics,
    pub warnings: Vec<Warning>,
    pub remediation: Option<Remediation>,
    /// Labels of the steps that ran, in order, finalizers included
    pub steps_run: Vec<String>,
    pub steps_total: usize,
}

impl RunReport {
    pub fn needs_remediation(&self) -> bool {
        self.remediation.is_some()
    }
}
