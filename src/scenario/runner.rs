//! Scenario runner
//!
//! Runs setup steps, main steps and finalizers strictly in order, then
//! evaluates the closing checks. The first setup or main step error decides
//! the outcome; finalizer errors only produce warnings and flag remediation.

use std::sync::Arc;
use std::time::Duration;

use super::context::ExecutionContext;
use super::outcome::{ErrorKind, Failure, Outcome, RunReport, StepError, Warning};
use super::step::{Check, Scenario, Step};
use crate::guest::clock::Clock;

/// Executes scenarios against injected collaborators
pub struct ScenarioRunner {
    clock: Arc<dyn Clock>,
}

/// Overall deadline of a run, measured from its start
#[derive(Clone, Copy)]
struct Deadline {
    started: Duration,
    limit: Option<Duration>,
}

impl ScenarioRunner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run `scenario` to completion and report its single outcome
    #[tracing::instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run<E>(&self, scenario: Scenario<E>, env: &mut E) -> RunReport {
        let Scenario {
            name,
            params,
            setup,
            steps,
            finalizers,
            checks,
            deadline,
            remediation,
        } = scenario;

        let steps_total = setup.len() + steps.len() + finalizers.len();
        let mut ctx = ExecutionContext::new(params);
        let mut steps_run = Vec::with_capacity(steps_total);
        let mut warnings = Vec::new();
        let mut flagged = None;

        if setup.is_empty() && steps.is_empty() {
            return RunReport {
                outcome: Outcome::Aborted(Failure {
                    label: name.clone(),
                    kind: ErrorKind::Internal,
                    message: "Scenario has no steps".to_string(),
                }),
                scenario: name,
                metrics: ctx.into_metrics(),
                warnings,
                remediation: None,
                steps_run,
                steps_total,
            };
        }

        let deadline = Deadline {
            started: self.clock.now(),
            limit: deadline,
        };

        let mut outcome = None;

        for step in setup {
            steps_run.push(step.label.clone());
            if let Err(e) = self.execute(step, env, &mut ctx, Some(deadline)).await {
                outcome = Some(e);
                break;
            }
        }

        // Finalizers guard what the main steps create, so they only run
        // once setup succeeded.
        if outcome.is_none() {
            for step in steps {
                steps_run.push(step.label.clone());
                if let Err(e) = self.execute(step, env, &mut ctx, Some(deadline)).await {
                    outcome = Some(e);
                    break;
                }
            }

            for step in finalizers {
                steps_run.push(step.label.clone());
                let label = step.label.clone();
                if let Err(cleanup) = self.execute(step, env, &mut ctx, None).await {
                    let message = cleanup
                        .failure()
                        .map(|f| f.message.clone())
                        .unwrap_or_default();
                    tracing::warn!("Cleanup step '{}' failed: {}", label, message);
                    warnings.push(Warning {
                        label,
                        kind: ErrorKind::ResourceCleanupFailed,
                        message,
                    });
                    flagged = Some(remediation);
                    break;
                }
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => evaluate_checks(&checks, &mut ctx),
        };

        match &outcome {
            Outcome::Passed => tracing::info!("Scenario '{}' passed", name),
            Outcome::Failed(f) => tracing::error!("Scenario '{}' failed: {}", name, f),
            Outcome::Aborted(f) => tracing::error!("Scenario '{}' aborted: {}", name, f),
        }
        if let Some(remediation) = flagged {
            tracing::warn!("Remediation required after cleanup failure: {:?}", remediation);
        }

        RunReport {
            scenario: name,
            outcome,
            metrics: ctx.into_metrics(),
            warnings,
            remediation: flagged,
            steps_run,
            steps_total,
        }
    }

    /// Execute a single step, returning the terminal outcome on error
    async fn execute<E>(
        &self,
        step: Step<E>,
        env: &mut E,
        ctx: &mut ExecutionContext,
        deadline: Option<Deadline>,
    ) -> Result<(), Outcome> {
        let Step {
            label,
            action,
            metric,
            timeout,
        } = step;

        ctx.enter(&label);
        tracing::info!("Context: {}", label);

        let budget = deadline.and_then(|d| d.limit.map(|limit| (d.started, limit)));
        let remaining = match budget {
            Some((started, limit)) => {
                let elapsed = self.clock.now().saturating_sub(started);
                if elapsed > limit {
                    let err = StepError::DeadlineExceeded { elapsed, limit };
                    return Err(Outcome::from_error(&label, &err));
                }
                Some(limit - elapsed)
            }
            None => None,
        };

        // The step runs against whichever bound expires first
        let bound = match (timeout, remaining) {
            (Some(step), Some(rest)) => Some(step.min(rest)),
            (step, rest) => step.or(rest),
        };

        let fut = action(&mut *env, &mut *ctx);
        let result = match bound {
            Some(bound) => match tokio::time::timeout(bound, fut).await {
                Ok(result) => result,
                Err(_) => Err(match (timeout, budget) {
                    (Some(step), _) if remaining.map_or(true, |rest| step < rest) => {
                        StepError::timeout(format!("Step '{}'", label), step)
                    }
                    (_, Some((started, limit))) => StepError::DeadlineExceeded {
                        elapsed: self.clock.now().saturating_sub(started),
                        limit,
                    },
                    _ => StepError::timeout(format!("Step '{}'", label), bound),
                }),
            },
            None => fut.await,
        };

        let value = result.map_err(|e| Outcome::from_error(&label, &e))?;

        // A step may overrun the deadline without awaiting the timer
        if let Some((started, limit)) = budget {
            let elapsed = self.clock.now().saturating_sub(started);
            if elapsed > limit {
                let err = StepError::DeadlineExceeded { elapsed, limit };
                return Err(Outcome::from_error(&label, &err));
            }
        }

        match (metric, value) {
            (Some(name), Some(value)) => ctx
                .record(&name, value)
                .map_err(|e| Outcome::from_error(&label, &e))?,
            (Some(name), None) => {
                tracing::debug!("Step '{}' produced no value for metric '{}'", label, name)
            }
            _ => {}
        }

        Ok(())
    }
}

/// Evaluate closing checks in order; the first violation fails the run
fn evaluate_checks(checks: &[Check], ctx: &mut ExecutionContext) -> Outcome {
    for check in checks {
        ctx.enter(&check.label);
        let Some(value) = ctx.metrics().get(&check.metric) else {
            let err = StepError::Internal(format!("Metric '{}' was never recorded", check.metric));
            return Outcome::from_error(&check.label, &err);
        };
        if value > check.bound {
            let err = StepError::ThresholdExceeded {
                metric: check.metric.clone(),
                value,
                bound: check.bound,
            };
            return Outcome::from_error(&check.label, &err);
        }
        tracing::debug!(
            "Check '{}' passed: {} = {} <= {}",
            check.label,
            check.metric,
            value,
            check.bound
        );
    }
    Outcome::Passed
}
