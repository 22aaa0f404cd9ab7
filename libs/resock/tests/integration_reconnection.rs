//! Integration tests for reconnection strategies
//!
//! These tests verify delay sequences and that a connection honours a
//! custom strategy.

#[macro_use]
mod common;

use common::*;
use resock::traits::reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
use resock::Lifecycle;
use std::time::Duration;

#[test]
fn test_exponential_backoff_full_sequence() {
    verbose_println!("Testing exponential backoff full sequence...");

    let strategy = ExponentialBackoff::new(Duration::from_secs(60));
    let expected_delays = [1000, 3000, 7000, 15_000, 31_000, 60_000];

    for (i, &expected_ms) in expected_delays.iter().enumerate() {
        let attempt = i as u32 + 1;
        let delay = strategy.next_delay(attempt);
        verbose_println!("  Attempt {}: {:?}", attempt, delay);
        assert_eq!(
            delay.as_millis() as u64,
            expected_ms,
            "Unexpected delay at attempt {}",
            attempt
        );
    }
}

#[test]
fn test_exponential_backoff_custom_unit() {
    let strategy =
        ExponentialBackoff::with_unit(Duration::from_millis(100), Duration::from_secs(2));

    let delays: Vec<u64> = (1..=6)
        .map(|attempt| strategy.next_delay(attempt).as_millis() as u64)
        .collect();

    verbose_println!("  Delays: {:?}", delays);
    assert_eq!(delays, vec![100, 300, 700, 1500, 2000, 2000]);
}

#[test]
fn test_exponential_backoff_overflow_safety() {
    verbose_println!("Testing exponential backoff overflow safety...");

    let strategy = ExponentialBackoff::new(Duration::from_secs(3600));

    for attempt in [30, 63, 64, 100, u32::MAX] {
        let delay = strategy.next_delay(attempt);
        assert_eq!(delay, Duration::from_secs(3600), "attempt {}", attempt);
    }

    verbose_println!("  Overflow safety verified");
}

#[test]
fn test_fixed_delay_consistency() {
    let strategy = FixedDelay::new(Duration::from_millis(750));

    for attempt in 0..100 {
        assert_eq!(
            strategy.next_delay(attempt),
            Duration::from_millis(750),
            "Fixed delay should be constant"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_connection_uses_custom_strategy() {
    verbose_println!("Testing a connection with a fixed reconnect delay...");

    let factory = MockTransportFactory::new();
    let (conn, _events) = mock_connection(&factory, |b| {
        b.reconnect_strategy(FixedDelay::new(Duration::from_millis(250)))
    });

    settle().await;
    for cycle in 0..3 {
        factory.socket(cycle).drop_connection(1006);
        settle().await;
        assert_eq!(conn.lifecycle(), Lifecycle::ReconnectWait);

        advance(Duration::from_millis(249)).await;
        assert_eq!(factory.attempts(), cycle + 1);
        advance(Duration::from_millis(1)).await;
        assert_eq!(factory.attempts(), cycle + 2);
    }
}
