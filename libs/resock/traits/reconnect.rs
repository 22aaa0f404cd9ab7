use std::time::Duration;

/// Trait for defining reconnection delays
///
/// Implement this trait to control how long the connection waits
/// between a failed cycle and the next connect attempt.
pub trait ReconnectionStrategy: Send + Sync {
    /// Get the delay before the next connect attempt
    ///
    /// # Arguments
    /// * `attempt` - The attempt count of the cycle that just failed (starts at 1)
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection strategy
///
/// Delay for attempt `n` is `(2^n - 1) * unit`, capped at `max_delay`.
/// With the default one-second unit that gives 1s, 3s, 7s, 15s...
///
/// Note that with a cap of one second the very first delay already equals
/// the cap, so growth only shows with a larger `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    unit: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Default growth unit
    pub const DEFAULT_UNIT: Duration = Duration::from_millis(1000);

    /// Create a new exponential backoff strategy with the default unit
    ///
    /// # Arguments
    /// * `max_delay` - The maximum delay between reconnects
    pub fn new(max_delay: Duration) -> Self {
        Self::with_unit(Self::DEFAULT_UNIT, max_delay)
    }

    /// Create a new exponential backoff strategy with a custom unit
    pub fn with_unit(unit: Duration, max_delay: Duration) -> Self {
        Self { unit, max_delay }
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64
            .checked_pow(attempt)
            .map(|p| p.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let unit_ms = self.unit.as_millis() as u64;
        let delay = Duration::from_millis(unit_ms.saturating_mul(factor));
        delay.min(self.max_delay)
    }
}

/// Fixed delay reconnection strategy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
