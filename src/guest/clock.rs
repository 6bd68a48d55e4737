//! Monotonic clocks
//!
//! Deadlines and measured durations go through [`Clock`] so runs can be
//! replayed against a manual clock.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// Monotonic time source
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when told to
///
/// `sleep` returns immediately after advancing the clock by the requested
/// duration, so multi-hour scenarios replay instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = to;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_secs(1800)).await;
        assert_eq!(clock.now(), Duration::from_secs(1800));
        clock.set(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_timer() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_secs(10)).await;
        assert!(clock.now() >= Duration::from_secs(10));
    }
}
