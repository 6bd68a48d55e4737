//! Guest login with timeouts and crash-aware polling

use std::time::Duration;

use super::clock::Clock;
use super::crash;
use super::{GuestAccess, GuestSession, LoginResult};
use crate::common::Error;
use crate::scenario::StepError;

/// Bounds for polling a rebooting guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Overall time allowed for the guest to come back
    pub timeout: Duration,
    /// Pause between failed attempts
    pub retry_interval: Duration,
}

/// Single login attempt; a crash here is unexpected and aborts the run
pub async fn login_once(
    guest: &mut dyn GuestAccess,
    timeout: Duration,
) -> Result<Box<dyn GuestSession>, StepError> {
    match guest.wait_for_login(timeout).await? {
        LoginResult::Success(session) => Ok(session),
        LoginResult::Timeout => Err(StepError::timeout("Login", timeout)),
        LoginResult::CrashDetected(text) => Err(StepError::Collaborator(Error::GuestCrashed(text))),
    }
}

/// Keep trying to log in until it works or the deadline passes
///
/// The deadline is `now() + policy.timeout` at entry. No new attempt starts
/// once `now() >= deadline`, but an attempt that succeeds exactly at the
/// deadline is accepted. Crash reports with a single marker are the crash the
/// caller induced and are retried; more than one marker is a failure.
pub async fn poll_login(
    guest: &mut dyn GuestAccess,
    clock: &dyn Clock,
    policy: LoginPolicy,
) -> Result<Box<dyn GuestSession>, StepError> {
    let deadline = clock.now().saturating_add(policy.timeout);
    let mut attempts = 0u32;

    loop {
        let remaining = deadline.saturating_sub(clock.now());
        attempts += 1;

        match guest.wait_for_login(remaining).await? {
            LoginResult::Success(session) => {
                tracing::info!("Guest login succeeded after {} attempt(s)", attempts);
                return Ok(session);
            }
            LoginResult::Timeout => {
                tracing::debug!("Login attempt {} timed out", attempts);
            }
            LoginResult::CrashDetected(text) => {
                let markers = crash::check_single_crash(&text)?;
                tracing::debug!(
                    "Login attempt {} saw guest crash ({} marker(s), sysrq: {}), still waiting",
                    attempts,
                    markers,
                    crash::induced_by_sysrq(&text)
                );
            }
        }

        let now = clock.now();
        if now >= deadline {
            break;
        }
        clock.sleep(policy.retry_interval.min(deadline - now)).await;
        if clock.now() >= deadline {
            break;
        }
    }

    Err(StepError::timeout(
        format!("Login ({} attempts)", attempts),
        policy.timeout,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Result;
    use crate::guest::clock::ManualClock;
    use crate::guest::CommandOutput;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct NullSession;

    #[async_trait]
    impl GuestSession for NullSession {
        async fn cmd_output(&mut self, _cmd: &str, _timeout: Duration) -> Result<CommandOutput> {
            Ok(CommandOutput {
                status: Some(0),
                output: String::new(),
            })
        }
        async fn send_line(&mut self, _line: &str) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    enum Attempt {
        Ok,
        Timeout,
        Crash(&'static str),
    }

    /// Replays scripted attempts; each one takes `cost` on the clock
    struct Scripted {
        clock: Arc<ManualClock>,
        cost: Duration,
        attempts: VecDeque<Attempt>,
        made: usize,
    }

    #[async_trait]
    impl GuestAccess for Scripted {
        async fn wait_for_login(&mut self, _timeout: Duration) -> Result<LoginResult> {
            self.made += 1;
            self.clock.advance(self.cost);
            Ok(match self.attempts.pop_front().unwrap_or(Attempt::Timeout) {
                Attempt::Ok => LoginResult::Success(Box::new(NullSession)),
                Attempt::Timeout => LoginResult::Timeout,
                Attempt::Crash(text) => LoginResult::CrashDetected(text.to_string()),
            })
        }
    }

    fn scripted(clock: &Arc<ManualClock>, cost: u64, attempts: Vec<Attempt>) -> Scripted {
        Scripted {
            clock: clock.clone(),
            cost: Duration::from_secs(cost),
            attempts: attempts.into(),
            made: 0,
        }
    }

    fn policy(timeout: u64, retry: u64) -> LoginPolicy {
        LoginPolicy {
            timeout: Duration::from_secs(timeout),
            retry_interval: Duration::from_secs(retry),
        }
    }

    #[tokio::test]
    async fn test_single_crash_marker_keeps_polling() {
        let clock = Arc::new(ManualClock::new());
        let mut guest = scripted(
            &clock,
            10,
            vec![
                Attempt::Crash("sysrq: Trigger a crash\nBUG: unable to handle"),
                Attempt::Crash("sysrq: Trigger a crash\nBUG: unable to handle"),
                Attempt::Crash("no markers yet"),
                Attempt::Ok,
            ],
        );

        let result = poll_login(&mut guest, clock.as_ref(), policy(360, 5)).await;
        assert!(result.is_ok());
        assert_eq!(guest.made, 4);
    }

    #[tokio::test]
    async fn test_multiple_crash_markers_fail_on_any_attempt() {
        let clock = Arc::new(ManualClock::new());
        let mut guest = scripted(
            &clock,
            10,
            vec![
                Attempt::Timeout,
                Attempt::Crash("BUG: one"),
                Attempt::Crash("BUG: one\nBUG: two"),
                Attempt::Ok,
            ],
        );

        let err = poll_login(&mut guest, clock.as_ref(), policy(360, 5))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StepError::MultipleCrashes { count: 2, .. }));
        assert_eq!(guest.made, 3);
    }

    #[tokio::test]
    async fn test_success_at_deadline_is_accepted() {
        let clock = Arc::new(ManualClock::new());
        // Two failing attempts of 50s, then one finishing exactly at 100s.
        let mut guest = scripted(&clock, 50, vec![Attempt::Timeout, Attempt::Ok]);

        let result = poll_login(&mut guest, clock.as_ref(), policy(100, 0)).await;
        assert!(result.is_ok());
        assert_eq!(clock.now(), Duration::from_secs(100));
    }

    #[tokio::test]
    async fn test_no_attempt_starts_at_deadline() {
        let clock = Arc::new(ManualClock::new());
        let mut guest = scripted(&clock, 50, vec![Attempt::Timeout, Attempt::Timeout, Attempt::Ok]);

        let err = poll_login(&mut guest, clock.as_ref(), policy(100, 0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StepError::Timeout { .. }));
        assert_eq!(guest.made, 2);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_overflow() {
        let clock = Arc::new(ManualClock::new());
        clock.advance(Duration::from_secs(10));
        let mut guest = scripted(&clock, 1, vec![Attempt::Timeout, Attempt::Ok]);
        let policy = LoginPolicy {
            timeout: Duration::MAX,
            retry_interval: Duration::from_secs(5),
        };

        let result = poll_login(&mut guest, clock.as_ref(), policy).await;
        assert!(result.is_ok());
        assert_eq!(guest.made, 2);
    }

    #[tokio::test]
    async fn test_retry_interval_is_clamped_to_deadline() {
        let clock = Arc::new(ManualClock::new());
        let mut guest = scripted(&clock, 8, vec![Attempt::Timeout, Attempt::Ok]);

        let err = poll_login(&mut guest, clock.as_ref(), policy(10, 30))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StepError::Timeout { .. }));
        assert_eq!(guest.made, 1);
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_login_once_classifies() {
        let clock = Arc::new(ManualClock::new());

        let mut guest = scripted(&clock, 1, vec![Attempt::Timeout]);
        let err = login_once(&mut guest, Duration::from_secs(360)).await.err().unwrap();
        assert!(matches!(err, StepError::Timeout { .. }));

        let mut guest = scripted(&clock, 1, vec![Attempt::Crash("BUG: x")]);
        let err = login_once(&mut guest, Duration::from_secs(360)).await.err().unwrap();
        assert!(matches!(err, StepError::Collaborator(Error::GuestCrashed(_))));

        let mut guest = scripted(&clock, 1, vec![Attempt::Ok]);
        assert!(login_once(&mut guest, Duration::from_secs(360)).await.is_ok());
    }
}
