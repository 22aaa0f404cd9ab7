//! Backoff scheduler
//!
//! Owns the attempt counter and the two timers guarding a connect cycle:
//!
//! ```text
//!  connect() ──arm──> connect timer ──fires──> timeout, retry-labeled close
//!      │
//!      └─ close ──> schedule_reconnect() ──arm──> reconnect timer ──fires──> connect()
//! ```
//!
//! Timers are plain `tokio::time::Sleep` values; cancelling one drops it.

use crate::traits::ReconnectionStrategy;
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant, Sleep};
use tracing::debug;

/// A cancellable one-shot timer
#[derive(Debug, Default)]
pub struct Timer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timer {
    pub fn new() -> Self {
        Self { sleep: None }
    }

    /// Arm (or re-arm) to fire after `after`
    pub fn arm(&mut self, after: Duration) {
        self.sleep = Some(Box::pin(sleep(after)));
    }

    /// Arm (or re-arm) to fire at `deadline`
    pub fn arm_at(&mut self, deadline: Instant) {
        self.sleep = Some(Box::pin(sleep_until(deadline)));
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Resolves when the armed timer fires, then disarms it
    ///
    /// Never resolves while disarmed. Cancel-safe: dropping the future
    /// leaves the timer armed.
    pub async fn fired(&mut self) {
        match self.sleep.as_mut() {
            Some(s) => {
                s.as_mut().await;
                self.sleep = None;
            }
            None => pending().await,
        }
    }
}

/// Computes reconnect delays and manages the connect-timeout timer
pub struct BackoffScheduler {
    strategy: Box<dyn ReconnectionStrategy>,
    connect_timeout: Duration,
    attempt: u32,
    pub(crate) connect_timer: Timer,
    pub(crate) reconnect_timer: Timer,
}

impl BackoffScheduler {
    pub fn new(strategy: Box<dyn ReconnectionStrategy>, connect_timeout: Duration) -> Self {
        Self {
            strategy,
            connect_timeout,
            attempt: 1,
            connect_timer: Timer::new(),
            reconnect_timer: Timer::new(),
        }
    }

    /// Current attempt count (starts at 1)
    #[inline]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay the strategy gives for `attempt`
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.strategy.next_delay(attempt)
    }

    /// Start the budget for a fresh connect attempt
    pub fn arm_connect_timeout(&mut self) {
        self.connect_timer.arm(self.connect_timeout);
    }

    pub fn cancel_connect_timeout(&mut self) {
        self.connect_timer.cancel();
    }

    /// Close out a failed cycle: arm the reconnect timer and bump the attempt count
    ///
    /// Returns the delay that was armed.
    pub fn schedule_reconnect(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        debug!("Reconnect attempt {} failed, retrying in {:?}", self.attempt, delay);
        self.reconnect_timer.arm(delay);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn cancel_reconnect(&mut self) {
        self.reconnect_timer.cancel();
    }

    /// Back to the first attempt; called on reaching open
    pub fn reset(&mut self) {
        self.attempt = 1;
    }

    /// Drop every pending timer
    pub fn cancel_all(&mut self) {
        self.connect_timer.cancel();
        self.reconnect_timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ExponentialBackoff;

    fn scheduler(max_ms: u64) -> BackoffScheduler {
        BackoffScheduler::new(
            Box::new(ExponentialBackoff::new(Duration::from_millis(max_ms))),
            Duration::from_millis(2500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_grows_by_one_per_failed_cycle() {
        let mut backoff = scheduler(60_000);
        let mut delays = Vec::new();
        for expected in 1..=4 {
            assert_eq!(backoff.attempt(), expected);
            delays.push(backoff.schedule_reconnect().as_millis() as u64);
        }
        assert_eq!(delays, vec![1000, 3000, 7000, 15_000]);
        assert_eq!(backoff.attempt(), 5);

        backoff.reset();
        assert_eq!(backoff.attempt(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_never_exceeds_cap() {
        let mut backoff = scheduler(5000);
        for _ in 0..70 {
            assert!(backoff.schedule_reconnect() <= Duration::from_millis(5000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_then_disarms() {
        let mut timer = Timer::new();
        timer.arm(Duration::from_millis(100));
        let start = Instant::now();
        timer.fired().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let mut backoff = scheduler(1000);
        backoff.arm_connect_timeout();
        backoff.cancel_connect_timeout();
        let fired = tokio::time::timeout(
            Duration::from_secs(10),
            backoff.connect_timer.fired(),
        )
        .await;
        assert!(fired.is_err());
    }
}
