//! Execution context for a single scenario run

use serde::Serialize;
use std::collections::BTreeMap;

use super::outcome::StepError;
use super::params::Parameters;

/// Measured values keyed by name
///
/// Append-only: a value, once recorded, is never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, f64>);

impl Metrics {
    /// Record a new value; writing the same name twice is an error
    pub fn record(&mut self, name: &str, value: f64) -> Result<(), StepError> {
        if self.0.contains_key(name) {
            return Err(StepError::DuplicateMetric(name.to_string()));
        }
        self.0.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

/// State shared by all steps of one run
#[derive(Debug)]
pub struct ExecutionContext {
    current_label: Option<String>,
    params: Parameters,
    metrics: Metrics,
}

impl ExecutionContext {
    pub(crate) fn new(params: Parameters) -> Self {
        Self {
            current_label: None,
            params,
            metrics: Metrics::default(),
        }
    }

    /// Label of the step currently executing (or the last one that failed)
    pub fn current_label(&self) -> Option<&str> {
        self.current_label.as_deref()
    }

    pub(crate) fn enter(&mut self, label: &str) {
        self.current_label = Some(label.to_string());
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Record a measured value for reporting and closing checks
    pub fn record(&mut self, name: &str, value: f64) -> Result<(), StepError> {
        tracing::debug!(metric = name, value, "Recorded metric");
        self.metrics.record(name, value)
    }

    pub(crate) fn into_metrics(self) -> Metrics {
        self.metrics
    }
}
